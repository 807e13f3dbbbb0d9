//! The shard: an immutable single-file index over one or more repositories.
//!
//! - [`format`] - magic, versions, section TOC and footer
//! - [`types`] - document/repository records and builder options
//! - [`btree`] - bucket B-tree over the ngram set
//! - [`postings`] - delta-varint posting lists
//! - [`writer`] - `ShardBuilder`, documents in, `.shard` file out
//! - [`reader`] - `Shard`, mmap'd read path
//! - [`merge`] - offline compound/explode transforms

pub mod btree;
pub mod format;
pub mod merge;
pub mod postings;
pub mod reader;
pub mod types;
pub mod writer;

pub use merge::{explode, merge};
pub use reader::{Shard, ShardMetadata};
pub use types::{
    BuilderOptions, DocFlags, DocId, DocMeta, DocumentOptions, IndexMetadata, Language, Ngram,
    RepoBranch, RepoDescriptor, RepoId,
};
pub use writer::ShardBuilder;
