//! Search: per-shard matching, multi-shard fan-out, and result streaming.
//!
//! The pipeline per shard is posting-list intersection (candidates) then
//! content verification (exact spans); the collection fans a query out over
//! its shard set and aggregates stats, warnings and file matches.

pub mod collection;
pub mod matcher;
pub mod scorer;
pub mod stats;
pub mod stream;

pub use collection::{CollectionOptions, RepoListEntry, ShardCollection, WatchHandle};
pub use matcher::{search_shard, ShardSearchResult};
pub use scorer::{ScoreInput, Scorer, ScoreWeights};
pub use stats::{MetricsSink, Progress, SearchContext, SearchOptions, Stats};
pub use stream::{concat_chunks, ChunkSink, Chunker, SearchChunk, VecSink};

use crate::shard::types::{DocId, Language, RepoId};
use serde::{Deserialize, Serialize};

/// Byte span of one match, relative to the document start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub start: u32,
    pub end: u32,
}

/// All match spans on a single line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatch {
    /// 1-based line number
    pub line_number: u32,
    /// Byte range of the line within the document (end excludes the newline)
    pub line_start: u32,
    pub line_end: u32,
    /// Spans on this line, ordered by start offset
    pub spans: Vec<MatchSpan>,
}

/// One matching document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMatch {
    pub file_name: String,
    pub repo: String,
    pub repo_id: RepoId,
    pub doc: DocId,
    pub language: Language,
    /// Branches the document exists on
    pub branches: Vec<String>,
    pub score: f64,
    /// Present when the query ran with `debug_score`
    pub score_debug: Option<String>,
    /// The query matched the filename itself
    pub filename_match: bool,
    /// Line matches ordered by offset within the document
    pub lines: Vec<LineMatch>,
}

impl FileMatch {
    pub fn match_count(&self) -> usize {
        self.lines.iter().map(|l| l.spans.len()).sum()
    }
}

/// Aggregated result of a batched search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub files: Vec<FileMatch>,
    pub stats: Stats,
    pub progress: Progress,
    /// Per-shard warnings for excluded/degraded shards
    pub warnings: Vec<String>,
    /// The query was cancelled or hit its deadline; results are partial
    pub cancelled: bool,
}
