//! Query statistics, progress, options and the per-query context.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Aggregate counters for one query.
///
/// All fields except `duration` are associative and commutative: summing
/// per-shard stats in any order yields the same totals. `duration` is
/// wall-clock and excluded from that law.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Content bytes fed to verification
    pub content_bytes_loaded: u64,
    /// Posting-list bytes fetched from shards
    pub index_bytes_loaded: u64,
    /// Ngram lookups against bucket B-trees
    pub ngram_lookups: u64,
    /// Posting entries decoded during intersection
    pub ngram_matches: u64,
    /// Documents that entered verification
    pub candidate_docs: u64,
    /// Documents whose content was actually scanned
    pub files_loaded: u64,
    /// Documents cut off by match limits before verification
    pub docs_skipped: u64,
    /// Documents with at least one match
    pub file_count: u64,
    /// Total match spans
    pub match_count: u64,
    pub shards_scanned: u64,
    /// Shards eliminated before evaluation (repo-level mismatch)
    pub shards_skipped: u64,
    /// Shards excluded after read/format/checksum failures
    pub shards_failed: u64,
    /// Wall-clock time; not additive across a partition of the shard set
    pub duration: Duration,
}

impl Add for Stats {
    type Output = Stats;

    fn add(mut self, rhs: Stats) -> Stats {
        self += rhs;
        self
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Stats) {
        self.content_bytes_loaded += rhs.content_bytes_loaded;
        self.index_bytes_loaded += rhs.index_bytes_loaded;
        self.ngram_lookups += rhs.ngram_lookups;
        self.ngram_matches += rhs.ngram_matches;
        self.candidate_docs += rhs.candidate_docs;
        self.files_loaded += rhs.files_loaded;
        self.docs_skipped += rhs.docs_skipped;
        self.file_count += rhs.file_count;
        self.match_count += rhs.match_count;
        self.shards_scanned += rhs.shards_scanned;
        self.shards_skipped += rhs.shards_skipped;
        self.shards_failed += rhs.shards_failed;
        self.duration += rhs.duration;
    }
}

/// Streaming progress. Every non-final chunk satisfies
/// `priority <= max_pending_priority`; the final chunk has them equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Priority of the shard whose results this chunk carries
    pub priority: f64,
    /// Highest priority among shards not yet fully emitted
    pub max_pending_priority: f64,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            priority: 0.0,
            max_pending_priority: 0.0,
        }
    }
}

/// Caller-supplied limits and toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Max matching documents per shard; 0 means unlimited
    pub max_document_matches: usize,
    /// Max files in the aggregated result; 0 means unlimited
    pub max_file_matches: usize,
    /// Max line matches per file record within one chunk
    pub chunk_matches_per_file: usize,
    /// Max file records per streamed chunk
    pub file_matches_per_chunk: usize,
    /// Attach a score breakdown string to every file match
    pub debug_score: bool,
    /// Only count matches on word boundaries
    pub whole_word: bool,
    /// Absolute wall-time budget; enforced like cancellation
    pub max_wall_time: Option<Duration>,
    /// Soft per-shard span budget; 0 means unlimited
    pub shard_max_match_count: usize,
    /// Global span budget; 0 means unlimited
    pub total_max_match_count: usize,
    /// Worker pool width for shard fan-out; 0 means CPU count
    pub parallelism: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_document_matches: 0,
            max_file_matches: 0,
            chunk_matches_per_file: 50,
            file_matches_per_chunk: 50,
            debug_score: false,
            whole_word: false,
            max_wall_time: None,
            shard_max_match_count: 0,
            total_max_match_count: 0,
            parallelism: 0,
        }
    }
}

/// Per-query context threaded through every search entry point: the
/// cooperative cancellation token, the optional deadline, and the opaque
/// tenant id. Nothing here is ambient process state.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    cancel: Arc<AtomicBool>,
    pub deadline: Option<Instant>,
    pub tenant: Option<u64>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    /// Request cancellation; clones of this context observe it
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Checked by workers between document verifications and between
    /// intersection steps
    pub fn should_stop(&self) -> bool {
        if self.cancel.load(Ordering::Relaxed) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Injected observer for query completion; replaces any process-global
/// metrics registry.
pub trait MetricsSink: Send + Sync {
    fn query_finished(&self, tenant: Option<u64>, stats: &Stats);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_additive() {
        let a = Stats {
            match_count: 3,
            file_count: 1,
            ngram_lookups: 7,
            ..Default::default()
        };
        let b = Stats {
            match_count: 5,
            file_count: 2,
            shards_scanned: 1,
            ..Default::default()
        };
        let ab = a.clone() + b.clone();
        let ba = b + a;
        assert_eq!(ab, ba);
        assert_eq!(ab.match_count, 8);
        assert_eq!(ab.ngram_lookups, 7);
    }

    #[test]
    fn test_cancel_is_shared_across_clones() {
        let ctx = SearchContext::new();
        let clone = ctx.clone();
        assert!(!clone.should_stop());
        ctx.cancel();
        assert!(clone.should_stop());
    }
}
