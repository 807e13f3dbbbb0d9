//! Streaming result delivery.
//!
//! The searcher hands per-shard results to a [`Chunker`], which bounds every
//! emission (`file_matches_per_chunk` file records per chunk, at most
//! `chunk_matches_per_file` line matches per record, the rest as
//! continuation records) and forwards them to a caller-supplied
//! [`ChunkSink`]. The sink abstraction is the seam to an upstream
//! transport: `send` delivers one chunk, `flush` terminates the stream
//! after the final stats chunk.

use crate::error::Result;
use crate::search::stats::{Progress, Stats};
use crate::search::FileMatch;

/// One streamed emission
#[derive(Debug, Clone, Default)]
pub struct SearchChunk {
    pub files: Vec<FileMatch>,
    pub progress: Progress,
    /// Cumulative stats; present and authoritative on the final chunk
    pub stats: Option<Stats>,
    pub is_final: bool,
    /// Set on the final chunk when the query was cut short
    pub cancelled: bool,
}

/// Receiver of streamed chunks
pub trait ChunkSink {
    fn send(&mut self, chunk: SearchChunk) -> Result<()>;
    /// Called exactly once, after the final chunk
    fn flush(&mut self) -> Result<()>;
}

/// Sink that collects chunks in memory
#[derive(Debug, Default)]
pub struct VecSink {
    pub chunks: Vec<SearchChunk>,
    pub flushed: bool,
}

impl ChunkSink for VecSink {
    fn send(&mut self, chunk: SearchChunk) -> Result<()> {
        self.chunks.push(chunk);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}

/// Bounds emissions and adapts them to a sink
pub struct Chunker<'a> {
    sink: &'a mut dyn ChunkSink,
    file_matches_per_chunk: usize,
    chunk_matches_per_file: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(
        sink: &'a mut dyn ChunkSink,
        file_matches_per_chunk: usize,
        chunk_matches_per_file: usize,
    ) -> Self {
        Self {
            sink,
            file_matches_per_chunk: file_matches_per_chunk.max(1),
            chunk_matches_per_file,
        }
    }

    /// Emit one shard's file matches as bounded chunks. `priority` is the
    /// emitting shard's priority; `max_pending_priority` covers every shard
    /// not yet fully emitted, including this one.
    pub fn send_files(
        &mut self,
        files: Vec<FileMatch>,
        priority: f64,
        max_pending_priority: f64,
    ) -> Result<()> {
        let mut records = Vec::new();
        for mut file in files {
            if self.chunk_matches_per_file == 0 || file.lines.len() <= self.chunk_matches_per_file
            {
                records.push(file);
                continue;
            }
            // Split oversized files into continuation records
            let mut lines = std::mem::take(&mut file.lines);
            while !lines.is_empty() {
                let rest = lines.split_off(lines.len().min(self.chunk_matches_per_file));
                let mut record = file.clone();
                record.lines = lines;
                records.push(record);
                lines = rest;
            }
        }

        let mut iter = records.into_iter().peekable();
        while iter.peek().is_some() {
            let files: Vec<FileMatch> =
                iter.by_ref().take(self.file_matches_per_chunk).collect();
            self.sink.send(SearchChunk {
                files,
                progress: Progress {
                    priority,
                    max_pending_priority,
                },
                stats: None,
                is_final: false,
                cancelled: false,
            })?;
        }
        Ok(())
    }

    /// Emit the terminal stats chunk and flush the sink. With no shards
    /// pending, priority and max_pending_priority coincide.
    pub fn finish(&mut self, stats: Stats, cancelled: bool) -> Result<()> {
        self.sink.send(SearchChunk {
            files: Vec::new(),
            progress: Progress::default(),
            stats: Some(stats),
            is_final: true,
            cancelled,
        })?;
        self.sink.flush()
    }
}

/// Reassemble streamed chunks into the batched file list, merging
/// continuation records of the same document
pub fn concat_chunks(chunks: &[SearchChunk]) -> Vec<FileMatch> {
    let mut out: Vec<FileMatch> = Vec::new();
    for chunk in chunks {
        for file in &chunk.files {
            match out.last_mut() {
                Some(last) if last.repo_id == file.repo_id && last.doc == file.doc => {
                    last.lines.extend(file.lines.iter().cloned());
                }
                _ => out.push(file.clone()),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{LineMatch, MatchSpan};

    fn file_with_lines(doc: u32, n: usize) -> FileMatch {
        FileMatch {
            file_name: format!("f{doc}"),
            repo: "r".into(),
            repo_id: 1,
            doc,
            language: Default::default(),
            branches: Vec::new(),
            score: 1.0,
            score_debug: None,
            filename_match: false,
            lines: (0..n)
                .map(|i| LineMatch {
                    line_number: i as u32 + 1,
                    line_start: 0,
                    line_end: 10,
                    spans: vec![MatchSpan { start: 0, end: 3 }],
                })
                .collect(),
        }
    }

    #[test]
    fn test_chunks_are_bounded() {
        let mut sink = VecSink::default();
        let mut chunker = Chunker::new(&mut sink, 2, 3);
        let files: Vec<FileMatch> = (0..5).map(|d| file_with_lines(d, 1)).collect();
        chunker.send_files(files, 1.0, 2.0).unwrap();
        chunker.finish(Stats::default(), false).unwrap();

        assert_eq!(sink.chunks.len(), 4); // ceil(5/2) + final
        assert!(sink.flushed);
        for chunk in &sink.chunks[..3] {
            assert!(chunk.files.len() <= 2);
            assert!(chunk.progress.priority <= chunk.progress.max_pending_priority);
        }
        let last = sink.chunks.last().unwrap();
        assert!(last.is_final);
        assert_eq!(last.progress.priority, last.progress.max_pending_priority);
    }

    #[test]
    fn test_oversized_file_splits_and_reassembles() {
        let mut sink = VecSink::default();
        let mut chunker = Chunker::new(&mut sink, 2, 3);
        let original = vec![file_with_lines(0, 8)];
        chunker.send_files(original.clone(), 0.0, 0.0).unwrap();
        chunker.finish(Stats::default(), false).unwrap();

        for chunk in &sink.chunks {
            for file in &chunk.files {
                assert!(file.lines.len() <= 3);
            }
        }
        let merged = concat_chunks(&sink.chunks);
        assert_eq!(merged, original);
    }
}
