//! # codeshard - trigram shard search core
//!
//! A shard is a single immutable file holding the content, filenames and
//! trigram posting-list index of one or more source repositories. This
//! crate implements the shard format, the bucket B-tree over its ngram set,
//! the matching engine that resolves substring/regex queries with
//! sub-linear scanning, and the multi-shard searcher.
//!
//! ## Architecture
//!
//! - [`shard`] - file format, builder, reader, merge/explode
//! - [`query`] - the query algebra the core consumes
//! - [`search`] - per-shard matching, fan-out, streaming
//! - [`utils`] - ngram codec and varint/delta coding
//!
//! ## Quick start
//!
//! ```no_run
//! use codeshard::query::Query;
//! use codeshard::search::{SearchContext, SearchOptions, ShardCollection};
//! use std::path::Path;
//!
//! let collection = ShardCollection::open(Path::new("/var/lib/shards")).unwrap();
//! let result = collection
//!     .search(
//!         &SearchContext::new(),
//!         &Query::substring("fn main"),
//!         &SearchOptions::default(),
//!     )
//!     .unwrap();
//! for file in &result.files {
//!     println!("{}:{}", file.repo, file.file_name);
//! }
//! ```
//!
//! ## Read path
//!
//! Queries are answered by decomposing patterns into 8-byte ngrams, walking
//! the in-memory B-tree to one mmap'd bucket per lookup, intersecting
//! posting lists aligned on pattern offsets, and verifying the surviving
//! candidates against the mmap'd content. Shards are write-once; the only
//! mutations are the explicit offline merge/explode transforms.

pub mod error;
pub mod query;
pub mod search;
pub mod shard;
pub mod utils;

pub use error::{Result, ShardError};
pub use query::Query;
pub use search::{
    FileMatch, LineMatch, MatchSpan, SearchContext, SearchOptions, SearchResult, ShardCollection,
};
pub use shard::{BuilderOptions, DocumentOptions, RepoDescriptor, Shard, ShardBuilder};
