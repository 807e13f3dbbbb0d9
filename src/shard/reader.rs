//! Read path for a single shard.
//!
//! `Shard::open` mmaps the file, validates the footer, parses the TOC and
//! the small metadata sections, and bulk-loads the B-tree inner nodes from
//! each bucket's first ngram. The shard exclusively owns the mmap; bucket
//! slices, posting byte ranges and document content are borrowed views
//! bounded by the shard's lifetime. Searchers share shards via `Arc` and
//! the region is unmapped when the last reference drops.

use crate::error::{Result, ShardError};
use crate::shard::btree::Btree;
use crate::shard::format::{self, SectionKind, Toc, TAIL_LEN};
use crate::shard::postings::PostingList;
use crate::shard::types::*;
use crate::utils::encoding::{DeltaIter, SliceReader};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Fanout used when rebuilding inner nodes at open; independent of the
/// writer's split parameter.
const READER_BTREE_V: usize = 16;

#[derive(Debug)]
pub struct Shard {
    path: PathBuf,
    mmap: Mmap,
    flags: u32,
    version: u32,
    docs: Vec<DocMeta>,
    content: Range<usize>,
    filenames: Range<usize>,
    /// Per-document (offset, len) into the newlines section
    newline_ranges: Vec<(u32, u32)>,
    /// Per-document (offset, len) of the fold bitmap within the doc
    /// metadata section
    fold_ranges: Vec<(u32, u32)>,
    buckets: Range<usize>,
    bucket_offsets: Range<usize>,
    bucket_count: usize,
    posting_data: Range<usize>,
    posting_offsets: Range<usize>,
    ngram_count: usize,
    repos: Vec<RepoDescriptor>,
    metadata: IndexMetadata,
    btree: Btree,
}

/// Result of a metadata-only read: footer, repositories, and the global
/// metadata section; content and index sections stay untouched.
#[derive(Debug, Clone)]
pub struct ShardMetadata {
    pub version: u32,
    pub repos: Vec<RepoDescriptor>,
    pub metadata: IndexMetadata,
}

impl Shard {
    /// Open and fully validate a shard (including the content checksum)
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap;

        let tail = format::parse_tail(buf)?;
        format::verify_checksum(buf, &tail)?;
        let toc = Toc::decode(&buf[tail.toc_offset as usize..buf.len() - TAIL_LEN])?;

        let header = toc.range(SectionKind::Header, buf.len())?;
        let flags = format::parse_header(&buf[header])?;

        let content = toc.range(SectionKind::Content, buf.len())?;
        let filenames = toc.range(SectionKind::Filenames, buf.len())?;

        // Doc metadata: fixed records, then per-doc fold bitmaps
        let docmeta_range = toc.range(SectionKind::DocMeta, buf.len())?;
        let section_base = docmeta_range.start;
        let mut r = SliceReader::new(&buf[docmeta_range]);
        let doc_count = r.read_u32_be()? as usize;
        let mut docs = Vec::with_capacity(doc_count);
        for _ in 0..doc_count {
            docs.push(DocMeta {
                content_off: r.read_u32_be()?,
                content_len: r.read_u32_be()?,
                name_off: r.read_u32_be()?,
                name_len: r.read_u32_be()?,
                mod_time: r.read_u64_be()?,
                language: Language::from_u16(r.read_u16_be()?),
                branch_mask: r.read_u64_be()?,
                flags: DocFlags(r.read_u16_be()?),
                repo_index: r.read_u16_be()?,
            });
        }
        let mut fold_ranges = Vec::with_capacity(doc_count);
        let mut pos = 4 + doc_count * DocMeta::SIZE;
        for _ in 0..doc_count {
            let len = r.read_u32_be()? as usize;
            r.read_bytes(len)?;
            fold_ranges.push(((section_base + pos + 4) as u32, len as u32));
            pos += 4 + len;
        }

        // Newlines: per-doc delta-varint arrays
        let newlines_range = toc.range(SectionKind::Newlines, buf.len())?;
        let section_base = newlines_range.start;
        let mut r = SliceReader::new(&buf[newlines_range]);
        let nl_count = r.read_u32_be()? as usize;
        if nl_count != doc_count {
            return Err(ShardError::format("newlines index count != doc count"));
        }
        let mut newline_ranges = Vec::with_capacity(doc_count);
        let mut pos = 4;
        for _ in 0..doc_count {
            let len = r.read_u32_be()? as usize;
            r.read_bytes(len)?;
            newline_ranges.push(((section_base + pos + 4) as u32, len as u32));
            pos += 4 + len;
        }

        // Ngram buckets + offsets
        let buckets = toc.range(SectionKind::NgramBuckets, buf.len())?;
        let bucket_offsets = toc.range(SectionKind::BucketOffsets, buf.len())?;
        let mut r = SliceReader::new(&buf[bucket_offsets.clone()]);
        let bucket_count = r.read_u32_be()? as usize;
        if bucket_offsets.len() != 4 + (bucket_count + 1) * 8 {
            return Err(ShardError::format("bucket offsets section size mismatch"));
        }

        let posting_data = toc.range(SectionKind::PostingData, buf.len())?;
        let posting_offsets = toc.range(SectionKind::PostingOffsets, buf.len())?;
        let mut r = SliceReader::new(&buf[posting_offsets.clone()]);
        let ngram_count = r.read_u32_be()? as usize;
        if posting_offsets.len() != 4 + (ngram_count + 1) * 8 {
            return Err(ShardError::format("posting offsets section size mismatch"));
        }

        let (repos, metadata) = parse_repos_and_metadata(buf, &toc)?;

        let mut shard = Self {
            path: path.to_path_buf(),
            mmap,
            flags,
            version: tail.version,
            docs,
            content,
            filenames,
            newline_ranges,
            fold_ranges,
            buckets,
            bucket_offsets,
            bucket_count,
            posting_data,
            posting_offsets,
            ngram_count,
            repos,
            metadata,
            btree: Btree::bulk_load(&[], &[], READER_BTREE_V),
        };
        shard.load_btree()?;

        log::debug!(
            "opened shard {}: {} repos, {} docs, {} ngrams, {} buckets",
            path.display(),
            shard.repos.len(),
            shard.docs.len(),
            shard.ngram_count,
            shard.bucket_count
        );
        Ok(shard)
    }

    /// Parse only the footer, repository descriptors and global metadata.
    /// Skips the checksum, so it stays cheap on cold files.
    pub fn read_metadata(path: &Path) -> Result<ShardMetadata> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap;
        let tail = format::parse_tail(buf)?;
        let toc = Toc::decode(&buf[tail.toc_offset as usize..buf.len() - TAIL_LEN])?;
        let (repos, metadata) = parse_repos_and_metadata(buf, &toc)?;
        Ok(ShardMetadata {
            version: tail.version,
            repos,
            metadata,
        })
    }

    /// Rebuild inner nodes from the bucket minimum keys. One 8-byte read
    /// per bucket; the tree's footprint is O(number of buckets).
    fn load_btree(&mut self) -> Result<()> {
        let mut min_keys = Vec::with_capacity(self.bucket_count);
        let mut counts = Vec::with_capacity(self.bucket_count);
        for i in 0..self.bucket_count {
            let start = self.bucket_offset(i)?;
            let end = self.bucket_offset(i + 1)?;
            if end <= start || (end - start) % 8 != 0 {
                return Err(ShardError::format("invalid bucket byte range"));
            }
            let bytes = self
                .buckets_bytes()
                .get(start as usize..start as usize + 8)
                .ok_or_else(|| ShardError::format("bucket range past section end"))?;
            min_keys.push(u64::from_be_bytes(bytes.try_into().unwrap()));
            counts.push(((end - start) / 8) as u32);
        }
        self.btree = Btree::bulk_load(&min_keys, &counts, READER_BTREE_V);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn case_folded(&self) -> bool {
        self.flags & format::FLAG_CASE_FOLDED != 0
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    pub fn docs(&self) -> &[DocMeta] {
        &self.docs
    }

    pub fn doc(&self, id: DocId) -> &DocMeta {
        &self.docs[id as usize]
    }

    pub fn repos(&self) -> &[RepoDescriptor] {
        &self.repos
    }

    pub fn repo_of(&self, id: DocId) -> &RepoDescriptor {
        &self.repos[self.doc(id).repo_index as usize]
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn ngram_count(&self) -> usize {
        self.ngram_count
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Highest repository priority in this shard; used for stream progress
    pub fn max_priority(&self) -> f64 {
        self.repos
            .iter()
            .map(|r| r.priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn content(&self) -> &[u8] {
        &self.mmap[self.content.clone()]
    }

    pub fn doc_content(&self, id: DocId) -> &[u8] {
        let meta = self.doc(id);
        &self.content()[meta.content_off as usize..(meta.content_off + meta.content_len) as usize]
    }

    pub fn doc_name(&self, id: DocId) -> &[u8] {
        let meta = self.doc(id);
        &self.mmap[self.filenames.clone()]
            [meta.name_off as usize..(meta.name_off + meta.name_len) as usize]
    }

    pub fn doc_name_str(&self, id: DocId) -> String {
        String::from_utf8_lossy(self.doc_name(id)).into_owned()
    }

    /// Newline byte offsets of a document, decoded on demand
    pub fn newlines(&self, id: DocId) -> DeltaIter<'_> {
        let (off, len) = self.newline_ranges[id as usize];
        DeltaIter::new(&self.mmap[off as usize..(off + len) as usize])
    }

    pub fn fold_bitmap(&self, id: DocId) -> &[u8] {
        let (off, len) = self.fold_ranges[id as usize];
        &self.mmap[off as usize..(off + len) as usize]
    }

    /// Map an absolute content offset to the document containing it
    pub fn doc_at_offset(&self, offset: u32) -> Option<DocId> {
        if self.docs.is_empty() {
            return None;
        }
        let idx = self.docs.partition_point(|d| d.content_off <= offset);
        if idx == 0 {
            return None;
        }
        let id = (idx - 1) as DocId;
        let meta = self.doc(id);
        (offset < meta.content_off + meta.content_len.max(1)).then_some(id)
    }

    fn buckets_bytes(&self) -> &[u8] {
        &self.mmap[self.buckets.clone()]
    }

    fn bucket_offset(&self, i: usize) -> Result<u64> {
        let base = self.bucket_offsets.start + 4 + i * 8;
        let bytes = self
            .mmap
            .get(base..base + 8)
            .ok_or_else(|| ShardError::format("bucket offset index out of range"))?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn posting_offset(&self, i: usize) -> Result<u64> {
        if i > self.ngram_count {
            return Err(ShardError::format("posting offset index out of range"));
        }
        let base = self.posting_offsets.start + 4 + i * 8;
        let bytes = self
            .mmap
            .get(base..base + 8)
            .ok_or_else(|| ShardError::format("posting offsets section truncated"))?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    /// Locate an ngram: B-tree descent to one bucket, then binary search of
    /// that bucket's disk bytes. Returns the global posting index, or None
    /// when the ngram is absent.
    pub fn find_ngram(&self, ngram: Ngram) -> Result<Option<u32>> {
        let Some(bref) = self.btree.find(ngram) else {
            return Ok(None);
        };
        let start = self.bucket_offset(bref.bucket_index as usize)? as usize;
        let end = self.bucket_offset(bref.bucket_index as usize + 1)? as usize;
        let bucket = self
            .buckets_bytes()
            .get(start..end)
            .ok_or_else(|| ShardError::format("bucket range past section end"))?;

        let entries = bucket.len() / 8;
        let (mut lo, mut hi) = (0usize, entries);
        while lo < hi {
            let mid = (lo + hi) / 2;
            let val = u64::from_be_bytes(bucket[mid * 8..mid * 8 + 8].try_into().unwrap());
            match val.cmp(&ngram) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    return Ok(Some(bref.posting_index_offset + mid as u32));
                }
            }
        }
        Ok(None)
    }

    /// Posting list byte range for the ngram at global index `i`
    pub fn posting(&self, i: u32) -> Result<PostingList<'_>> {
        let start = self.posting_offset(i as usize)? as usize;
        let end = self.posting_offset(i as usize + 1)? as usize;
        let data = &self.mmap[self.posting_data.clone()];
        let bytes = data
            .get(start..end)
            .ok_or_else(|| ShardError::format("posting range past section end"))?;
        Ok(PostingList::new(bytes))
    }
}

fn parse_repos_and_metadata(buf: &[u8], toc: &Toc) -> Result<(Vec<RepoDescriptor>, IndexMetadata)> {
    let repos_range = toc.range(SectionKind::Repos, buf.len())?;
    let mut r = SliceReader::new(&buf[repos_range]);
    let count = r.read_u32_be()? as usize;
    let mut repos = Vec::with_capacity(count);
    for _ in 0..count {
        repos.push(decode_repo(&mut r)?);
    }
    for pair in repos.windows(2) {
        if pair[1].id <= pair[0].id {
            return Err(ShardError::format(
                "repository descriptors not in ascending id order",
            ));
        }
    }

    let meta_range = toc.range(SectionKind::Metadata, buf.len())?;
    let mut r = SliceReader::new(&buf[meta_range]);
    let metadata = IndexMetadata {
        build_id: r.read_str()?,
        build_timestamp: r.read_u64_be()?,
        latest_commit_date: r.read_u64_be()?,
    };
    Ok((repos, metadata))
}

fn decode_repo(r: &mut SliceReader<'_>) -> Result<RepoDescriptor> {
    let name = r.read_str()?;
    let id = r.read_u32_be()?;
    let priority = r.read_f64_be()?;
    let branch_count = r.read_u32_be()? as usize;
    let mut branches = Vec::with_capacity(branch_count);
    for _ in 0..branch_count {
        branches.push(RepoBranch {
            name: r.read_str()?,
            version: r.read_str()?,
        });
    }
    let latest_commit_date = r.read_u64_be()?;
    let config_count = r.read_u32_be()? as usize;
    let mut config = std::collections::BTreeMap::new();
    for _ in 0..config_count {
        let k = r.read_str()?;
        let v = r.read_str()?;
        config.insert(k, v);
    }
    let source_build_id = r.read_str()?;
    let source_build_timestamp = r.read_u64_be()?;
    Ok(RepoDescriptor {
        name,
        id,
        priority,
        branches,
        latest_commit_date,
        config,
        source_build_id,
        source_build_timestamp,
    })
}
