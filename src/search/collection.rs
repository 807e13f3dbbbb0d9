//! Multi-shard open set and the directory searcher.
//!
//! A `ShardCollection` owns every open `.shard` file under one directory.
//! The shard set sits behind a single reader-writer lock that is written
//! only during open/close; queries snapshot the set at start and share the
//! `Arc`'d shards, so the query path itself takes no locks. A background
//! watch thread rescans the directory on an interval, opening new shards
//! and dropping vanished ones; the adjacent `.trash` directory (where
//! compacted-away shards await cleanup) is never scanned.

use crate::error::{Result, ShardError};
use crate::query::Query;
use crate::search::matcher::{search_shard, ShardSearchResult};
use crate::search::stats::{MetricsSink, SearchContext, SearchOptions, Stats};
use crate::search::stream::{ChunkSink, Chunker};
use crate::search::{FileMatch, SearchResult};
use crate::shard::reader::Shard;
use crate::shard::types::{RepoBranch, RepoId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shard file extension
pub const SHARD_EXTENSION: &str = "shard";
/// Directory for compacted-away shards awaiting cleanup
pub const TRASH_DIR: &str = ".trash";

#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// Poll interval of the watch thread
    pub watch_interval: Duration,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            watch_interval: Duration::from_secs(1),
        }
    }
}

/// One repository from `list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoListEntry {
    pub name: String,
    pub id: RepoId,
    pub branches: Vec<RepoBranch>,
    pub latest_commit_date: u64,
}

pub struct ShardCollection {
    dir: PathBuf,
    opts: CollectionOptions,
    shards: RwLock<BTreeMap<PathBuf, Arc<Shard>>>,
    /// Shards that failed to open, with the failure message; surfaced as
    /// per-query warnings until the file disappears or opens cleanly
    degraded: RwLock<BTreeMap<PathBuf, String>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl ShardCollection {
    /// Open a collection over a directory of `.shard` files
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_with(dir, CollectionOptions::default())
    }

    pub fn open_with(dir: &Path, opts: CollectionOptions) -> Result<Self> {
        let collection = Self {
            dir: dir.to_path_buf(),
            opts,
            shards: RwLock::new(BTreeMap::new()),
            degraded: RwLock::new(BTreeMap::new()),
            metrics: None,
        };
        collection.rescan()?;
        Ok(collection)
    }

    /// Inject a metrics observer for query completions
    pub fn set_metrics(&mut self, sink: Arc<dyn MetricsSink>) {
        self.metrics = Some(sink);
    }

    /// Reconcile the open set with the directory: open new `.shard` files,
    /// drop vanished ones. Open failures degrade the shard rather than
    /// failing the rescan.
    pub fn rescan(&self) -> Result<()> {
        let mut present = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(SHARD_EXTENSION) {
                continue;
            }
            present.push(path);
        }

        for path in &present {
            let already_open = self.shards.read().unwrap().contains_key(path);
            if already_open {
                continue;
            }
            match open_with_retry(path) {
                Ok(shard) => {
                    log::debug!("opened shard {}", path.display());
                    self.degraded.write().unwrap().remove(path);
                    self.shards
                        .write()
                        .unwrap()
                        .insert(path.clone(), Arc::new(shard));
                }
                Err(err) => {
                    log::warn!("excluding shard {}: {err}", path.display());
                    self.degraded
                        .write()
                        .unwrap()
                        .insert(path.clone(), err.to_string());
                }
            }
        }

        // Drop shards whose files disappeared; the mmap is unmapped when
        // the last in-flight query releases its Arc.
        self.shards
            .write()
            .unwrap()
            .retain(|path, _| present.contains(path));
        self.degraded
            .write()
            .unwrap()
            .retain(|path, _| present.contains(path));
        Ok(())
    }

    /// Move a shard file into the adjacent `.trash` directory
    pub fn trash_shard(&self, path: &Path) -> Result<()> {
        let trash = self.dir.join(TRASH_DIR);
        std::fs::create_dir_all(&trash)?;
        let name = path
            .file_name()
            .ok_or_else(|| ShardError::format("shard path has no file name"))?;
        std::fs::rename(path, trash.join(name))?;
        self.shards.write().unwrap().remove(path);
        Ok(())
    }

    /// Start a background thread that rescans on an interval
    pub fn watch(self: &Arc<Self>) -> WatchHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let collection = Arc::clone(self);
        let interval = collection.opts.watch_interval;
        let thread = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                if let Err(err) = collection.rescan() {
                    log::warn!("shard rescan failed: {err}");
                }
                thread::sleep(interval);
            }
        });
        WatchHandle {
            stop,
            thread: Some(thread),
        }
    }

    /// Snapshot the open shard set
    pub fn snapshot(&self) -> Vec<Arc<Shard>> {
        self.shards.read().unwrap().values().cloned().collect()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.read().unwrap().len()
    }

    fn warnings(&self) -> Vec<String> {
        self.degraded
            .read()
            .unwrap()
            .iter()
            .map(|(path, err)| format!("shard {} excluded: {err}", path.display()))
            .collect()
    }

    fn effective_ctx(&self, ctx: &SearchContext, opts: &SearchOptions) -> SearchContext {
        let mut ctx = ctx.clone();
        if let Some(budget) = opts.max_wall_time {
            let deadline = Instant::now() + budget;
            ctx.deadline = Some(match ctx.deadline {
                Some(existing) => existing.min(deadline),
                None => deadline,
            });
        }
        ctx
    }

    /// Synchronous batched search across every open shard
    pub fn search(
        &self,
        ctx: &SearchContext,
        query: &Query,
        opts: &SearchOptions,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        let query = query.clone().simplify();
        let shards = self.snapshot();
        if shards.is_empty() && self.degraded.read().unwrap().is_empty() {
            return Err(ShardError::NoShards);
        }
        let ctx = self.effective_ctx(ctx, opts);

        let mut result = SearchResult {
            warnings: self.warnings(),
            ..Default::default()
        };

        let outcomes = self.run_shards(&shards, &query, opts, &ctx)?;
        for (shard, outcome) in shards.iter().zip(outcomes) {
            match outcome {
                Outcome::Done(shard_result) => {
                    result.stats += shard_result.stats;
                    result.cancelled |= shard_result.cancelled;
                    result.files.extend(shard_result.files);
                }
                Outcome::Skipped => result.stats.shards_skipped += 1,
                Outcome::Failed(msg) => {
                    result.stats.shards_failed += 1;
                    result
                        .warnings
                        .push(format!("shard {} excluded: {msg}", shard.path().display()));
                }
                Outcome::Fatal(err) => return Err(err),
            }
        }

        sort_files(&mut result.files);
        apply_limits(&mut result.files, opts);
        result.stats.duration = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.query_finished(ctx.tenant, &result.stats);
        }
        Ok(result)
    }

    /// Streaming search: per-shard results go out as bounded chunks the
    /// moment their shard finishes; a terminal stats chunk closes the
    /// stream. Cross-shard ordering is not guaranteed before that final
    /// chunk.
    pub fn stream_search(
        &self,
        ctx: &SearchContext,
        query: &Query,
        opts: &SearchOptions,
        sink: &mut dyn ChunkSink,
    ) -> Result<()> {
        let started = Instant::now();
        let query = query.clone().simplify();
        let shards = self.snapshot();
        if shards.is_empty() && self.degraded.read().unwrap().is_empty() {
            return Err(ShardError::NoShards);
        }
        let ctx = self.effective_ctx(ctx, opts);
        let parallelism = effective_parallelism(opts);

        let mut chunker = Chunker::new(
            sink,
            opts.file_matches_per_chunk,
            opts.chunk_matches_per_file,
        );

        let mut stats = Stats::default();
        let mut cancelled = false;
        // Priorities of shards not yet fully emitted
        let mut pending: Vec<Option<f64>> =
            shards.iter().map(|s| Some(s.max_priority())).collect();

        let send_result = thread::scope(|scope| -> Result<()> {
            let (tx, rx) = mpsc::sync_channel::<(usize, Outcome)>(parallelism);
            let workers = parallelism.min(shards.len()).max(1);
            for worker in 0..workers {
                let tx = tx.clone();
                let shards = &shards;
                let query = &query;
                let ctx = &ctx;
                scope.spawn(move || {
                    for (idx, shard) in shards.iter().enumerate() {
                        if idx % workers != worker {
                            continue;
                        }
                        let outcome = run_one_shard(shard, query, opts, ctx);
                        if tx.send((idx, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for _ in 0..shards.len() {
                let Ok((idx, outcome)) = rx.recv() else {
                    break;
                };
                let max_pending = pending
                    .iter()
                    .flatten()
                    .fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                match outcome {
                    Outcome::Done(mut shard_result) => {
                        stats += shard_result.stats;
                        cancelled |= shard_result.cancelled;
                        sort_files(&mut shard_result.files);
                        chunker.send_files(
                            shard_result.files,
                            shards[idx].max_priority(),
                            max_pending,
                        )?;
                    }
                    Outcome::Skipped => stats.shards_skipped += 1,
                    Outcome::Failed(msg) => {
                        stats.shards_failed += 1;
                        log::warn!("shard {} excluded: {msg}", shards[idx].path().display());
                    }
                    Outcome::Fatal(err) => return Err(err),
                }
                pending[idx] = None;
            }
            Ok(())
        });
        send_result?;

        stats.duration = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.query_finished(ctx.tenant, &stats);
        }
        chunker.finish(stats, cancelled)
    }

    /// Enumerate repositories matching repository-level predicates; never
    /// scans content.
    pub fn list(&self, _ctx: &SearchContext, query: &Query) -> Result<Vec<RepoListEntry>> {
        let query = query.clone().simplify();
        if !query.is_repo_level() {
            return Err(ShardError::InvalidQuery(
                "list accepts only repository-level predicates".to_string(),
            ));
        }
        let shards = self.snapshot();
        if shards.is_empty() && self.degraded.read().unwrap().is_empty() {
            return Err(ShardError::NoShards);
        }

        let mut seen = std::collections::BTreeMap::new();
        for shard in &shards {
            for repo in shard.repos() {
                if repo_matches(&query, repo) {
                    seen.entry(repo.id).or_insert_with(|| RepoListEntry {
                        name: repo.name.clone(),
                        id: repo.id,
                        branches: repo.branches.clone(),
                        latest_commit_date: repo.latest_commit_date,
                    });
                }
            }
        }
        Ok(seen.into_values().collect())
    }

    /// Fan a query out over the shard list with a bounded worker pool
    fn run_shards(
        &self,
        shards: &[Arc<Shard>],
        query: &Query,
        opts: &SearchOptions,
        ctx: &SearchContext,
    ) -> Result<Vec<Outcome>> {
        let parallelism = effective_parallelism(opts);
        let mut outcomes: Vec<Option<Outcome>> = (0..shards.len()).map(|_| None).collect();

        thread::scope(|scope| {
            let mut chunks: Vec<&mut [Option<Outcome>]> = Vec::new();
            let mut rest = outcomes.as_mut_slice();
            let per_worker = shards.len().div_ceil(parallelism).max(1);
            while !rest.is_empty() {
                let take = per_worker.min(rest.len());
                let (head, tail) = rest.split_at_mut(take);
                chunks.push(head);
                rest = tail;
            }

            for (worker, chunk) in chunks.into_iter().enumerate() {
                let base = worker * per_worker;
                scope.spawn(move || {
                    for (i, slot) in chunk.iter_mut().enumerate() {
                        *slot = Some(run_one_shard(&shards[base + i], query, opts, ctx));
                    }
                });
            }
        });

        Ok(outcomes.into_iter().map(|o| o.expect("worker filled slot")).collect())
    }
}

enum Outcome {
    Done(ShardSearchResult),
    Skipped,
    /// Shard-local failure; the shard is excluded and the query goes on
    Failed(String),
    /// Caller-facing failure (invalid query); aborts the whole query
    Fatal(ShardError),
}

/// Evaluate one shard, excluding it (fail open) on shard-local errors.
/// I/O-class failures get one retry against a fresh mmap of the same file.
fn run_one_shard(
    shard: &Arc<Shard>,
    query: &Query,
    opts: &SearchOptions,
    ctx: &SearchContext,
) -> Outcome {
    if !query_may_match(query, shard) {
        return Outcome::Skipped;
    }
    match search_shard(shard, query, opts, ctx) {
        Ok(result) => Outcome::Done(result),
        Err(err) if err.is_shard_local() => {
            log::warn!(
                "shard {} error ({err}), retrying with fresh mmap",
                shard.path().display()
            );
            match Shard::open(shard.path()) {
                Ok(fresh) => match search_shard(&fresh, query, opts, ctx) {
                    Ok(result) => Outcome::Done(result),
                    Err(err2) if err2.is_shard_local() => Outcome::Failed(err2.to_string()),
                    Err(err2) => Outcome::Fatal(err2),
                },
                Err(reopen) => Outcome::Failed(reopen.to_string()),
            }
        }
        Err(err) => Outcome::Fatal(err),
    }
}

/// Conservative repository-level pre-filter: false only when no repo in
/// the shard can satisfy the query
fn query_may_match(query: &Query, shard: &Shard) -> bool {
    match query {
        Query::RepoIds(ids) => shard.repos().iter().any(|r| ids.contains(&r.id)),
        Query::RepoName(name) => shard.repos().iter().any(|r| r.name.contains(name)),
        Query::Branch(branch) => shard
            .repos()
            .iter()
            .any(|r| r.branch_index(branch).is_some()),
        Query::And(children) => children.iter().all(|c| query_may_match(c, shard)),
        Query::Or(children) => children.iter().any(|c| query_may_match(c, shard)),
        Query::Const(false) => false,
        _ => true,
    }
}

/// Exact repository-level predicate evaluation for `list`
fn repo_matches(query: &Query, repo: &crate::shard::types::RepoDescriptor) -> bool {
    match query {
        Query::RepoIds(ids) => ids.contains(&repo.id),
        Query::RepoName(name) => repo.name.contains(name),
        Query::Branch(branch) => repo.branch_index(branch).is_some(),
        Query::And(children) => children.iter().all(|c| repo_matches(c, repo)),
        Query::Or(children) => children.iter().any(|c| repo_matches(c, repo)),
        Query::Not(inner) => !repo_matches(inner, repo),
        Query::Const(b) => *b,
        _ => false,
    }
}

fn effective_parallelism(opts: &SearchOptions) -> usize {
    if opts.parallelism > 0 {
        opts.parallelism
    } else {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }
}

fn open_with_retry(path: &Path) -> Result<Shard> {
    match Shard::open(path) {
        Ok(shard) => Ok(shard),
        Err(err) if matches!(err, ShardError::Io(_)) => Shard::open(path),
        Err(err) => Err(err),
    }
}

/// Cross-shard ordering: score descending, then (repo id, doc id) ascending
fn sort_files(files: &mut [FileMatch]) {
    files.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.repo_id.cmp(&b.repo_id))
            .then(a.doc.cmp(&b.doc))
    });
}

fn apply_limits(files: &mut Vec<FileMatch>, opts: &SearchOptions) {
    if opts.max_file_matches > 0 && files.len() > opts.max_file_matches {
        files.truncate(opts.max_file_matches);
    }
    if opts.total_max_match_count > 0 {
        let mut total = 0usize;
        files.retain(|f| {
            if total >= opts.total_max_match_count {
                return false;
            }
            total += f.match_count().max(1);
            true
        });
    }
}

/// Handle to the background watch thread; stops and joins on drop
pub struct WatchHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
