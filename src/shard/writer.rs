//! Shard construction.
//!
//! `ShardBuilder` accumulates repositories and documents, then emits the
//! sectioned binary file described in [`crate::shard::format`]. Output
//! bytes are a pure function of the inputs, the builder options and the
//! build id/timestamp, which is what makes merge followed by explode
//! byte-identical.

use crate::error::{Result, ShardError};
use crate::shard::btree::BtreeBuilder;
use crate::shard::format::{self, SectionKind, Toc, FLAG_CASE_FOLDED};
use crate::shard::postings::PostingWriter;
use crate::shard::types::*;
use crate::utils::encoding::{delta_encode, put_str, put_u16_be, put_u32_be, put_u64_be};
use crate::utils::ngram::{fold_bitmap, NgramIter};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;

pub struct ShardBuilder {
    opts: BuilderOptions,
    large_files: LargeFileFilter,
    repos: Vec<RepoDescriptor>,
    docs: Vec<DocMeta>,
    content: Vec<u8>,
    filenames: Vec<u8>,
    /// Per-document delta-varint encoded newline offsets
    newlines: Vec<Vec<u8>>,
    /// Per-document case-fold bitmaps
    fold_bitmaps: Vec<Vec<u8>>,
}

impl ShardBuilder {
    pub fn new(opts: BuilderOptions) -> Result<Self> {
        let large_files = LargeFileFilter::compile(&opts.large_file_patterns)?;
        Ok(Self {
            opts,
            large_files,
            repos: Vec::new(),
            docs: Vec::new(),
            content: Vec::new(),
            filenames: Vec::new(),
            newlines: Vec::new(),
            fold_bitmaps: Vec::new(),
        })
    }

    /// Register a repository. Documents added afterwards belong to it.
    /// Repositories must arrive in ascending id order so compound document
    /// ids stay contiguous per repository.
    pub fn add_repo(&mut self, desc: RepoDescriptor) -> Result<u16> {
        if let Some(last) = self.repos.last() {
            if desc.id <= last.id {
                return Err(ShardError::format(format!(
                    "repository ids must be strictly ascending: {} after {}",
                    desc.id, last.id
                )));
            }
        }
        if self.repos.len() == u16::MAX as usize {
            return Err(ShardError::format("too many repositories in one shard"));
        }
        self.repos.push(desc);
        Ok((self.repos.len() - 1) as u16)
    }

    /// Add a document to the most recently registered repository.
    /// Returns None when the size limit skips it.
    pub fn add_document(
        &mut self,
        name: &str,
        content: &[u8],
        doc: &DocumentOptions,
    ) -> Result<Option<DocId>> {
        let mut flags = DocFlags::new();
        if self.opts.max_document_size > 0 && content.len() as u64 > self.opts.max_document_size {
            match self.large_files.decide(name) {
                Some(true) => flags.set_large(),
                _ => return Ok(None),
            }
        }
        if content.iter().take(1024).any(|&b| b == 0) {
            flags.set_binary();
        }
        self.push_document(name, content, doc, flags).map(Some)
    }

    /// Add a document with caller-supplied flags, bypassing the size limit.
    /// Merge and explode use this so flags survive re-encoding byte-exactly.
    pub(crate) fn push_document(
        &mut self,
        name: &str,
        content: &[u8],
        doc: &DocumentOptions,
        flags: DocFlags,
    ) -> Result<DocId> {
        let repo_index = match self.repos.len() {
            0 => return Err(ShardError::format("add_repo before add_document")),
            n => (n - 1) as u16,
        };
        let repo = &self.repos[repo_index as usize];

        let mut branch_mask = 0u64;
        for branch in &doc.branches {
            let idx = repo.branch_index(branch).ok_or_else(|| {
                ShardError::format(format!(
                    "document branch {branch:?} not in repository {} branch list",
                    repo.name
                ))
            })?;
            branch_mask |= 1 << idx;
        }

        let content_off = self.blob_offset(self.content.len(), content.len())?;
        let name_off = self.blob_offset(self.filenames.len(), name.len())?;

        let mut newline_buf = Vec::new();
        let offsets: Vec<u32> = memchr::memchr_iter(b'\n', content)
            .map(|i| i as u32)
            .collect();
        delta_encode(&offsets, &mut newline_buf);

        self.docs.push(DocMeta {
            content_off,
            content_len: content.len() as u32,
            name_off,
            name_len: name.len() as u32,
            mod_time: doc.mod_time,
            language: doc.language,
            branch_mask,
            flags,
            repo_index,
        });
        self.content.extend_from_slice(content);
        self.filenames.extend_from_slice(name.as_bytes());
        self.newlines.push(newline_buf);
        self.fold_bitmaps.push(fold_bitmap(content));

        Ok((self.docs.len() - 1) as DocId)
    }

    fn blob_offset(&self, current: usize, adding: usize) -> Result<u32> {
        if current + adding > u32::MAX as usize {
            return Err(ShardError::format("content blob exceeds 4 GiB"));
        }
        Ok(current as u32)
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Produce the complete shard file bytes
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.repos.is_empty() {
            return Err(ShardError::format("shard needs at least one repository"));
        }

        // Ngram pass: every 3-codepoint window of every document, with the
        // window's absolute content offset. Sorting by (ngram, offset)
        // yields both the ascending ngram stream for the B-tree and the
        // per-ngram ascending offsets for the posting writer.
        let mut pairs: Vec<(Ngram, u32)> = Vec::new();
        for meta in &self.docs {
            let slice =
                &self.content[meta.content_off as usize..(meta.content_off + meta.content_len) as usize];
            pairs.extend(
                NgramIter::new(slice).map(|(n, off)| (n, meta.content_off + off)),
            );
        }
        pairs.par_sort_unstable();

        let mut btree = BtreeBuilder::new(self.opts.bucket_size, self.opts.btree_v);
        let mut postings = PostingWriter::new();
        let mut last: Option<Ngram> = None;
        for &(ngram, off) in &pairs {
            if last != Some(ngram) {
                btree.insert(ngram);
                last = Some(ngram);
            }
            postings.add(ngram, off);
        }
        // A shard with no ngrams has no buckets at all, not one empty one
        let buckets: Vec<&[Ngram]> = btree
            .buckets()
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect();
        let (posting_data, posting_offsets) = postings.finish();

        // Repositories with derived latest commit dates
        let repos = self.finalized_repos();
        let latest_commit_date = repos.iter().map(|r| r.latest_commit_date).max().unwrap_or(0);

        let mut out = Vec::with_capacity(self.content.len() * 3);
        let mut toc = Toc::default();

        format::encode_header(&mut out, FLAG_CASE_FOLDED);
        toc.push(SectionKind::Header, 0, out.len() as u64);

        let start = out.len();
        out.extend_from_slice(&self.content);
        toc.push(SectionKind::Content, start as u64, self.content.len() as u64);

        let start = out.len();
        out.extend_from_slice(&self.filenames);
        toc.push(
            SectionKind::Filenames,
            start as u64,
            self.filenames.len() as u64,
        );

        let start = out.len();
        put_u32_be(&mut out, self.newlines.len() as u32);
        for nl in &self.newlines {
            put_u32_be(&mut out, nl.len() as u32);
            out.extend_from_slice(nl);
        }
        toc.push(
            SectionKind::Newlines,
            start as u64,
            (out.len() - start) as u64,
        );

        let start = out.len();
        put_u32_be(&mut out, self.docs.len() as u32);
        for meta in &self.docs {
            put_u32_be(&mut out, meta.content_off);
            put_u32_be(&mut out, meta.content_len);
            put_u32_be(&mut out, meta.name_off);
            put_u32_be(&mut out, meta.name_len);
            put_u64_be(&mut out, meta.mod_time);
            put_u16_be(&mut out, meta.language as u16);
            put_u64_be(&mut out, meta.branch_mask);
            put_u16_be(&mut out, meta.flags.0);
            put_u16_be(&mut out, meta.repo_index);
        }
        for bm in &self.fold_bitmaps {
            put_u32_be(&mut out, bm.len() as u32);
            out.extend_from_slice(bm);
        }
        toc.push(
            SectionKind::DocMeta,
            start as u64,
            (out.len() - start) as u64,
        );

        let start = out.len();
        for bucket in &buckets {
            for &n in bucket.iter() {
                put_u64_be(&mut out, n);
            }
        }
        toc.push(
            SectionKind::NgramBuckets,
            start as u64,
            (out.len() - start) as u64,
        );

        let start = out.len();
        put_u32_be(&mut out, buckets.len() as u32);
        let mut bucket_off = 0u64;
        for bucket in &buckets {
            put_u64_be(&mut out, bucket_off);
            bucket_off += (bucket.len() * 8) as u64;
        }
        put_u64_be(&mut out, bucket_off);
        toc.push(
            SectionKind::BucketOffsets,
            start as u64,
            (out.len() - start) as u64,
        );

        let start = out.len();
        out.extend_from_slice(&posting_data);
        toc.push(
            SectionKind::PostingData,
            start as u64,
            posting_data.len() as u64,
        );

        let start = out.len();
        put_u32_be(&mut out, (posting_offsets.len() - 1) as u32);
        for &off in &posting_offsets {
            put_u64_be(&mut out, off);
        }
        toc.push(
            SectionKind::PostingOffsets,
            start as u64,
            (out.len() - start) as u64,
        );

        let start = out.len();
        put_u32_be(&mut out, repos.len() as u32);
        for repo in &repos {
            encode_repo(&mut out, repo);
        }
        toc.push(SectionKind::Repos, start as u64, (out.len() - start) as u64);

        let start = out.len();
        put_str(&mut out, &self.opts.build_id);
        put_u64_be(&mut out, self.opts.build_timestamp);
        put_u64_be(&mut out, latest_commit_date);
        toc.push(
            SectionKind::Metadata,
            start as u64,
            (out.len() - start) as u64,
        );

        format::encode_footer(&mut out, &toc);
        let pos = format::checksum_pos(out.len());
        let checksum = format::file_checksum(&out);
        out[pos..pos + 4].copy_from_slice(&checksum.to_be_bytes());

        log::debug!(
            "built shard: {} repos, {} docs, {} ngrams, {} buckets, {} bytes",
            repos.len(),
            self.docs.len(),
            posting_offsets.len() - 1,
            buckets.len(),
            out.len()
        );

        Ok(out)
    }

    /// Atomic write: temp file in the target directory, then rename
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let bytes = self.build()?;
        let tmp = path.with_extension("shard.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Descriptors with latest commit dates derived from document mod times
    /// where the caller left them unset
    fn finalized_repos(&self) -> Vec<RepoDescriptor> {
        let mut repos = self.repos.clone();
        for (idx, repo) in repos.iter_mut().enumerate() {
            if repo.latest_commit_date == 0 {
                repo.latest_commit_date = self
                    .docs
                    .iter()
                    .filter(|d| d.repo_index as usize == idx)
                    .map(|d| d.mod_time)
                    .max()
                    .unwrap_or(0);
            }
        }
        repos
    }
}

fn encode_repo(buf: &mut Vec<u8>, repo: &RepoDescriptor) {
    put_str(buf, &repo.name);
    put_u32_be(buf, repo.id);
    put_u64_be(buf, repo.priority.to_bits());
    put_u32_be(buf, repo.branches.len() as u32);
    for b in &repo.branches {
        put_str(buf, &b.name);
        put_str(buf, &b.version);
    }
    put_u64_be(buf, repo.latest_commit_date);
    put_u32_be(buf, repo.config.len() as u32);
    for (k, v) in &repo.config {
        put_str(buf, k);
        put_str(buf, v);
    }
    put_str(buf, &repo.source_build_id);
    put_u64_be(buf, repo.source_build_timestamp);
}
