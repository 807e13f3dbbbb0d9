//! Posting-list encoding.
//!
//! For each ngram the shard stores the ascending byte offsets (into the
//! content blob) where that trigram window begins, delta-varint encoded.
//! A parallel offsets array with a trailing sentinel locates list `i` at
//! `posting_offsets[i] .. posting_offsets[i+1]`.

use crate::utils::encoding::{encode_varint, DeltaIter};
use crate::shard::types::Ngram;

/// Streaming writer over `(ngram, offset)` pairs sorted by ngram then
/// offset. Emits one delta list per distinct ngram and records its start
/// into the offsets array.
pub struct PostingWriter {
    data: Vec<u8>,
    offsets: Vec<u64>,
    current: Option<Ngram>,
    prev_offset: u32,
}

impl PostingWriter {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            offsets: Vec::new(),
            current: None,
            prev_offset: 0,
        }
    }

    pub fn add(&mut self, ngram: Ngram, offset: u32) {
        match self.current {
            Some(cur) if cur == ngram => {
                debug_assert!(offset > self.prev_offset, "posting offsets must increase");
                encode_varint(offset - self.prev_offset, &mut self.data);
            }
            cur => {
                debug_assert!(cur.is_none_or(|c| c < ngram), "ngrams must arrive sorted");
                self.offsets.push(self.data.len() as u64);
                self.current = Some(ngram);
                encode_varint(offset, &mut self.data);
            }
        }
        self.prev_offset = offset;
    }

    pub fn ngram_count(&self) -> usize {
        self.offsets.len()
    }

    /// Finish, returning (posting data, offsets array with sentinel)
    pub fn finish(mut self) -> (Vec<u8>, Vec<u64>) {
        self.offsets.push(self.data.len() as u64);
        (self.data, self.offsets)
    }
}

impl Default for PostingWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of one posting list's byte range
#[derive(Clone, Copy)]
pub struct PostingList<'a> {
    bytes: &'a [u8],
}

impl<'a> PostingList<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Restartable iterator of absolute content offsets; decodes on demand
    /// without per-element allocation.
    pub fn iter(&self) -> DeltaIter<'a> {
        DeltaIter::new(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_groups_by_ngram() {
        let mut w = PostingWriter::new();
        w.add(10, 0);
        w.add(10, 7);
        w.add(10, 9);
        w.add(42, 3);
        let (data, offsets) = w.finish();

        assert_eq!(offsets.len(), 3); // two lists + sentinel
        assert_eq!(*offsets.last().unwrap() as usize, data.len());

        let first = PostingList::new(&data[offsets[0] as usize..offsets[1] as usize]);
        assert_eq!(first.iter().collect::<Vec<_>>(), vec![0, 7, 9]);

        let second = PostingList::new(&data[offsets[1] as usize..offsets[2] as usize]);
        assert_eq!(second.iter().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_empty_writer() {
        let (data, offsets) = PostingWriter::new().finish();
        assert!(data.is_empty());
        assert_eq!(offsets, vec![0]);
    }

    #[test]
    fn test_lists_are_nonempty_and_increasing() {
        let mut w = PostingWriter::new();
        for (n, off) in [(5u64, 1u32), (5, 100), (5, 100_000), (9, 2)] {
            w.add(n, off);
        }
        let (data, offsets) = w.finish();
        for pair in offsets.windows(2) {
            let list = PostingList::new(&data[pair[0] as usize..pair[1] as usize]);
            let decoded: Vec<u32> = list.iter().collect();
            assert!(!decoded.is_empty());
            assert!(decoded.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
