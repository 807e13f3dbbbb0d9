//! Per-shard query evaluation.
//!
//! Evaluation is two-phase. The candidate phase turns the query tree into a
//! document bitmap using posting-list intersection (for content substrings
//! it also keeps the aligned candidate positions). The verification phase
//! re-checks every candidate document against the mmap'd content and
//! produces exact match spans. Negation and sub-trigram patterns cannot be
//! narrowed by the index, so their candidate set is every document in the
//! shard; that full-scan path is O(total content).

use crate::error::{Result, ShardError};
use crate::query::regex_analyze::{required_literals, NgramCond};
use crate::query::Query;
use crate::search::scorer::{ScoreInput, Scorer};
use crate::search::stats::{SearchContext, SearchOptions, Stats};
use crate::search::{FileMatch, LineMatch, MatchSpan};
use crate::shard::reader::Shard;
use crate::shard::types::{DocId, DocMeta};
use crate::utils::ngram::{bitmap_bit, decode_codepoint, fold_codepoint, CodepointIter, NgramIter};
use memchr::memmem;
use regex::bytes::{Regex, RegexBuilder};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

/// How often tight loops poll the cancellation token
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Result of evaluating one query against one shard
#[derive(Debug, Default)]
pub struct ShardSearchResult {
    pub files: Vec<FileMatch>,
    pub stats: Stats,
    pub cancelled: bool,
}

/// Evaluate a query against a single shard
pub fn search_shard(
    shard: &Shard,
    query: &Query,
    opts: &SearchOptions,
    ctx: &SearchContext,
) -> Result<ShardSearchResult> {
    let query = query.clone().simplify();
    let mut m = Matcher {
        shard,
        opts,
        ctx,
        stats: Stats {
            shards_scanned: 1,
            ..Default::default()
        },
        scorer: Scorer::with_defaults(),
        cancelled: false,
    };

    let cand = m.candidates(&query)?;
    let files = m.verify(&query, cand)?;

    Ok(ShardSearchResult {
        files,
        stats: m.stats,
        cancelled: m.cancelled,
    })
}

/// Candidate documents plus, for a single content substring, the aligned
/// candidate start offsets (doc-relative) keyed by the pattern that
/// produced them.
struct CandSet {
    docs: RoaringBitmap,
    positions: Option<(String, FxHashMap<DocId, Vec<u32>>)>,
}

impl CandSet {
    fn docs_only(docs: RoaringBitmap) -> Self {
        Self {
            docs,
            positions: None,
        }
    }
}

struct Matcher<'a> {
    shard: &'a Shard,
    opts: &'a SearchOptions,
    ctx: &'a SearchContext,
    stats: Stats,
    scorer: Scorer,
    cancelled: bool,
}

/// Outcome of verifying one query subtree against one document
struct DocEval {
    spans: Vec<MatchSpan>,
    filename_hit: bool,
}

impl DocEval {
    fn empty() -> Self {
        Self {
            spans: Vec::new(),
            filename_hit: false,
        }
    }
}

impl<'a> Matcher<'a> {
    fn all_docs(&self) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        if self.shard.doc_count() > 0 {
            docs.insert_range(0..self.shard.doc_count() as u32);
        }
        docs
    }

    fn docs_where(&self, pred: impl Fn(&DocMeta) -> bool) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        for (id, meta) in self.shard.docs().iter().enumerate() {
            if pred(meta) {
                docs.insert(id as u32);
            }
        }
        docs
    }

    // ---------------------------------------------------------------
    // Candidate phase
    // ---------------------------------------------------------------

    fn candidates(&mut self, q: &Query) -> Result<CandSet> {
        match q {
            Query::Const(true) => Ok(CandSet::docs_only(self.all_docs())),
            Query::Const(false) => Ok(CandSet::docs_only(RoaringBitmap::new())),

            Query::RepoIds(ids) => {
                let repos = self.shard.repos();
                Ok(CandSet::docs_only(self.docs_where(|d| {
                    ids.contains(&repos[d.repo_index as usize].id)
                })))
            }
            Query::RepoName(name) => {
                let repos = self.shard.repos();
                Ok(CandSet::docs_only(self.docs_where(|d| {
                    repos[d.repo_index as usize].name.contains(name)
                })))
            }
            Query::Branch(branch) => {
                let repos = self.shard.repos();
                Ok(CandSet::docs_only(self.docs_where(|d| {
                    match repos[d.repo_index as usize].branch_index(branch) {
                        Some(i) => d.branch_mask == 0 || d.branch_mask & (1 << i) != 0,
                        None => false,
                    }
                })))
            }

            Query::Substring {
                pattern,
                case_sensitive,
                file_name,
            } => {
                if *file_name {
                    let docs = self.filename_substring_docs(pattern, *case_sensitive);
                    Ok(CandSet::docs_only(docs))
                } else {
                    self.substring_candidates(pattern)
                }
            }

            Query::Regex {
                pattern,
                case_sensitive,
                file_name,
            } => {
                if *file_name {
                    let re = compile_regex(pattern, *case_sensitive)?;
                    let shard = self.shard;
                    let mut docs = RoaringBitmap::new();
                    for id in 0..shard.doc_count() as u32 {
                        if re.is_match(shard.doc_name(id)) {
                            docs.insert(id);
                        }
                    }
                    Ok(CandSet::docs_only(docs))
                } else {
                    let cond = required_literals(pattern)?;
                    let docs = self.cond_candidates(&cond)?;
                    Ok(CandSet::docs_only(docs))
                }
            }

            Query::And(children) => {
                let mut docs: Option<RoaringBitmap> = None;
                let mut positions = None;
                let mut with_positions = 0usize;
                for child in children {
                    let cand = self.candidates(child)?;
                    if cand.positions.is_some() {
                        with_positions += 1;
                        positions = cand.positions;
                    }
                    docs = Some(match docs {
                        Some(d) => d & cand.docs,
                        None => cand.docs,
                    });
                }
                Ok(CandSet {
                    docs: docs.unwrap_or_else(|| self.all_docs()),
                    // Positions stay usable only when exactly one child
                    // produced them
                    positions: if with_positions == 1 { positions } else { None },
                })
            }
            Query::Or(children) => {
                let mut docs = RoaringBitmap::new();
                for child in children {
                    docs |= self.candidates(child)?.docs;
                }
                Ok(CandSet::docs_only(docs))
            }
            // Candidate sets over-approximate matches, so a complement
            // cannot be narrowed through the index: scan everything and
            // let verification apply the exact negation.
            Query::Not(_) => Ok(CandSet::docs_only(self.all_docs())),
        }
    }

    /// Posting-list intersection for a content substring.
    ///
    /// Decomposes the folded pattern into ngrams with intra-pattern byte
    /// offsets, selects the two rarest by posting-list length, and
    /// merge-intersects them aligned on (content offset - pattern offset).
    fn substring_candidates(&mut self, pattern: &str) -> Result<CandSet> {
        let pat_ngrams: Vec<(u64, u32)> = NgramIter::new(pattern.as_bytes()).collect();
        if pat_ngrams.is_empty() {
            if pattern.is_empty() {
                // Empty pattern matches nothing
                return Ok(CandSet::docs_only(RoaringBitmap::new()));
            }
            // Sub-trigram pattern: no index help, scan every document
            return Ok(CandSet::docs_only(self.all_docs()));
        }

        // Distinct ngrams, keeping the first intra-pattern offset of each
        let mut distinct: Vec<(u64, u32)> = Vec::with_capacity(pat_ngrams.len());
        for &(n, off) in &pat_ngrams {
            if !distinct.iter().any(|&(seen, _)| seen == n) {
                distinct.push((n, off));
            }
        }

        // Look up each ngram; one absent ngram proves there is no match
        let mut lists = Vec::with_capacity(distinct.len());
        for &(n, pat_off) in &distinct {
            self.stats.ngram_lookups += 1;
            match self.shard.find_ngram(n)? {
                Some(posting_index) => {
                    let list = self.shard.posting(posting_index)?;
                    lists.push((list.byte_len(), pat_off, list));
                }
                None => return Ok(CandSet::docs_only(RoaringBitmap::new())),
            }
        }

        // Minimum-cost covering set: the two rarest lists
        lists.sort_by_key(|&(len, _, _)| len);
        lists.truncate(2);
        for &(len, _, _) in &lists {
            self.stats.index_bytes_loaded += len as u64;
        }

        let starts = match lists.as_slice() {
            [(_, shift, list)] => {
                let mut out = Vec::new();
                for off in list.iter() {
                    self.stats.ngram_matches += 1;
                    if let Some(start) = off.checked_sub(*shift) {
                        out.push(start);
                    }
                }
                out
            }
            [(_, shift_a, list_a), (_, shift_b, list_b)] => {
                self.intersect_aligned(list_a.iter(), *shift_a, list_b.iter(), *shift_b)
            }
            _ => unreachable!("lists is nonempty and truncated to two"),
        };

        let mut docs = RoaringBitmap::new();
        let mut positions: FxHashMap<DocId, Vec<u32>> = FxHashMap::default();
        for start in starts {
            if let Some(doc) = self.shard.doc_at_offset(start) {
                let rel = start - self.shard.doc(doc).content_off;
                positions.entry(doc).or_default().push(rel);
                docs.insert(doc);
            }
        }

        Ok(CandSet {
            docs,
            positions: Some((pattern.to_string(), positions)),
        })
    }

    /// Merge-intersect two ascending posting iterators after shifting each
    /// offset back to the candidate pattern start
    fn intersect_aligned(
        &mut self,
        a: impl Iterator<Item = u32>,
        shift_a: u32,
        b: impl Iterator<Item = u32>,
        shift_b: u32,
    ) -> Vec<u32> {
        let mut out = Vec::new();
        let mut a = a.filter_map(|off| off.checked_sub(shift_a));
        let mut b = b.filter_map(|off| off.checked_sub(shift_b));
        let mut x = a.next();
        let mut y = b.next();
        let mut steps = 0u64;
        while let (Some(xa), Some(yb)) = (x, y) {
            steps += 1;
            if steps % CANCEL_CHECK_INTERVAL == 0 && self.ctx.should_stop() {
                self.cancelled = true;
                break;
            }
            match xa.cmp(&yb) {
                std::cmp::Ordering::Less => x = a.next(),
                std::cmp::Ordering::Greater => y = b.next(),
                std::cmp::Ordering::Equal => {
                    out.push(xa);
                    x = a.next();
                    y = b.next();
                }
            }
        }
        self.stats.ngram_matches += steps;
        out
    }

    /// Candidate docs for a regex's required-literal condition
    fn cond_candidates(&mut self, cond: &NgramCond) -> Result<RoaringBitmap> {
        match cond {
            NgramCond::Any => Ok(self.all_docs()),
            NgramCond::Literal(lit) => Ok(self.substring_candidates(lit)?.docs),
            NgramCond::And(children) => {
                let mut docs: Option<RoaringBitmap> = None;
                for child in children {
                    let d = self.cond_candidates(child)?;
                    docs = Some(match docs {
                        Some(acc) => acc & d,
                        None => d,
                    });
                }
                Ok(docs.unwrap_or_else(|| self.all_docs()))
            }
            NgramCond::Or(children) => {
                let mut docs = RoaringBitmap::new();
                for child in children {
                    docs |= self.cond_candidates(child)?;
                }
                Ok(docs)
            }
        }
    }

    fn filename_substring_docs(&mut self, pattern: &str, case_sensitive: bool) -> RoaringBitmap {
        let shard = self.shard;
        let mut docs = RoaringBitmap::new();
        for id in 0..shard.doc_count() as u32 {
            let name = shard.doc_name(id);
            if !find_literal(name, pattern.as_bytes(), case_sensitive).is_empty() {
                docs.insert(id);
            }
        }
        docs
    }

    // ---------------------------------------------------------------
    // Verification phase
    // ---------------------------------------------------------------

    fn verify(&mut self, q: &Query, cand: CandSet) -> Result<Vec<FileMatch>> {
        let mut files = Vec::new();
        let total = cand.docs.len();
        let mut processed = 0u64;

        for doc in cand.docs.iter() {
            if self.cancelled || self.ctx.should_stop() {
                self.cancelled = true;
                self.stats.docs_skipped += total - processed;
                break;
            }
            if self.limits_reached(files.len()) {
                self.stats.docs_skipped += total - processed;
                break;
            }
            processed += 1;
            self.stats.candidate_docs += 1;

            let doc_positions = cand
                .positions
                .as_ref()
                .and_then(|(pat, map)| map.get(&doc).map(|v| (pat.as_str(), v.as_slice())));
            if let Some(eval) = self.doc_eval(q, doc, doc_positions)? {
                files.push(self.build_file_match(doc, eval));
            }
        }

        // (score desc, doc id asc)
        files.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.doc.cmp(&b.doc))
        });
        Ok(files)
    }

    fn limits_reached(&self, files_found: usize) -> bool {
        if self.opts.max_document_matches > 0 && files_found >= self.opts.max_document_matches {
            return true;
        }
        if self.opts.shard_max_match_count > 0
            && self.stats.match_count >= self.opts.shard_max_match_count as u64
        {
            return true;
        }
        false
    }

    /// Exact evaluation of the query tree against one document.
    /// None means the document does not match.
    fn doc_eval(
        &mut self,
        q: &Query,
        doc: DocId,
        positions: Option<(&str, &[u32])>,
    ) -> Result<Option<DocEval>> {
        match q {
            Query::Const(true) => Ok(Some(DocEval::empty())),
            Query::Const(false) => Ok(None),

            Query::RepoIds(ids) => {
                let ok = ids.contains(&self.shard.repo_of(doc).id);
                Ok(ok.then(DocEval::empty))
            }
            Query::RepoName(name) => {
                let ok = self.shard.repo_of(doc).name.contains(name);
                Ok(ok.then(DocEval::empty))
            }
            Query::Branch(branch) => {
                let meta = self.shard.doc(doc);
                let ok = match self.shard.repo_of(doc).branch_index(branch) {
                    Some(i) => meta.branch_mask == 0 || meta.branch_mask & (1 << i) != 0,
                    None => false,
                };
                Ok(ok.then(DocEval::empty))
            }

            Query::Substring {
                pattern,
                case_sensitive,
                file_name,
            } => {
                if *file_name {
                    let hit = !find_literal(
                        self.shard.doc_name(doc),
                        pattern.as_bytes(),
                        *case_sensitive,
                    )
                    .is_empty();
                    return Ok(hit.then(|| DocEval {
                        spans: Vec::new(),
                        filename_hit: true,
                    }));
                }
                let usable = positions.filter(|(pat, _)| *pat == pattern.as_str());
                let spans =
                    self.literal_spans(doc, pattern, *case_sensitive, usable.map(|(_, p)| p));
                Ok((!spans.is_empty()).then_some(DocEval {
                    spans,
                    filename_hit: false,
                }))
            }

            Query::Regex {
                pattern,
                case_sensitive,
                file_name,
            } => {
                let re = compile_regex(pattern, *case_sensitive)?;
                if *file_name {
                    let hit = re.is_match(self.shard.doc_name(doc));
                    return Ok(hit.then(|| DocEval {
                        spans: Vec::new(),
                        filename_hit: true,
                    }));
                }
                let spans = self.regex_spans(doc, &re);
                Ok((!spans.is_empty()).then_some(DocEval {
                    spans,
                    filename_hit: false,
                }))
            }

            Query::And(children) => {
                let mut spans = Vec::new();
                let mut filename_hit = false;
                for child in children {
                    match self.doc_eval(child, doc, positions)? {
                        Some(eval) => {
                            spans.extend(eval.spans);
                            filename_hit |= eval.filename_hit;
                        }
                        None => return Ok(None),
                    }
                }
                spans.sort_unstable_by_key(|s: &MatchSpan| (s.start, s.end));
                spans.dedup();
                Ok(Some(DocEval {
                    spans,
                    filename_hit,
                }))
            }
            Query::Or(children) => {
                let mut spans = Vec::new();
                let mut filename_hit = false;
                let mut matched = false;
                for child in children {
                    if let Some(eval) = self.doc_eval(child, doc, positions)? {
                        matched = true;
                        spans.extend(eval.spans);
                        filename_hit |= eval.filename_hit;
                    }
                }
                if !matched {
                    return Ok(None);
                }
                spans.sort_unstable_by_key(|s: &MatchSpan| (s.start, s.end));
                spans.dedup();
                Ok(Some(DocEval {
                    spans,
                    filename_hit,
                }))
            }
            Query::Not(inner) => match self.doc_eval(inner, doc, positions)? {
                Some(_) => Ok(None),
                None => Ok(Some(DocEval::empty())),
            },
        }
    }

    /// Literal spans in a document, either by verifying aligned candidate
    /// positions or by scanning the content
    fn literal_spans(
        &mut self,
        doc: DocId,
        pattern: &str,
        case_sensitive: bool,
        positions: Option<&[u32]>,
    ) -> Vec<MatchSpan> {
        let shard = self.shard;
        let content = shard.doc_content(doc);
        self.stats.files_loaded += 1;
        self.stats.content_bytes_loaded += content.len() as u64;

        let mut spans = match positions {
            Some(starts) => {
                let bitmap = shard.fold_bitmap(doc);
                let mut spans = Vec::new();
                for &start in starts {
                    if case_sensitive && !case_precheck(bitmap, start, pattern.as_bytes()) {
                        continue;
                    }
                    if let Some(end) =
                        verify_literal_at(content, start, pattern.as_bytes(), case_sensitive)
                    {
                        spans.push(MatchSpan { start, end });
                    }
                }
                spans
            }
            None => find_literal(content, pattern.as_bytes(), case_sensitive),
        };

        if self.opts.whole_word {
            spans.retain(|s| is_whole_word(content, s));
        }
        spans
    }

    fn regex_spans(&mut self, doc: DocId, re: &Regex) -> Vec<MatchSpan> {
        let content = self.shard.doc_content(doc);
        self.stats.files_loaded += 1;
        self.stats.content_bytes_loaded += content.len() as u64;
        let mut spans: Vec<MatchSpan> = re
            .find_iter(content)
            .map(|m| MatchSpan {
                start: m.start() as u32,
                end: m.end() as u32,
            })
            .collect();
        if self.opts.whole_word {
            spans.retain(|s| is_whole_word(content, s));
        }
        spans
    }

    fn build_file_match(&mut self, doc: DocId, eval: DocEval) -> FileMatch {
        let shard = self.shard;
        let meta = shard.doc(doc);
        let repo = shard.repo_of(doc);
        let content = shard.doc_content(doc);

        let lines = self.line_matches(doc, &eval.spans);
        let word_boundary_hit = eval
            .spans
            .iter()
            .any(|s| starts_on_boundary(content, s) || ends_on_boundary(content, s));

        let input = ScoreInput {
            match_count: eval.spans.len(),
            word_boundary_hit,
            filename_match: eval.filename_hit,
            repo_priority: repo.priority,
        };
        let (score, score_debug) = if self.opts.debug_score {
            let (s, d) = self.scorer.score_debug(&input);
            (s, Some(d))
        } else {
            (self.scorer.score(&input), None)
        };

        let branches = repo
            .branches
            .iter()
            .enumerate()
            .filter(|(i, _)| meta.branch_mask & (1 << i) != 0)
            .map(|(_, b)| b.name.clone())
            .collect();

        self.stats.file_count += 1;
        self.stats.match_count += eval.spans.len() as u64;

        FileMatch {
            file_name: shard.doc_name_str(doc),
            repo: repo.name.clone(),
            repo_id: repo.id,
            doc,
            language: meta.language,
            branches,
            score,
            score_debug,
            filename_match: eval.filename_hit,
            lines,
        }
    }

    /// Group spans into per-line match records by walking the newline
    /// index once. Spans are assigned to the line they start on.
    fn line_matches(&self, doc: DocId, spans: &[MatchSpan]) -> Vec<LineMatch> {
        if spans.is_empty() {
            return Vec::new();
        }
        let content_len = self.shard.doc(doc).content_len;
        let mut newlines = self.shard.newlines(doc);
        let mut line_number = 1u32;
        let mut line_start = 0u32;
        let mut next_newline = newlines.next();

        let mut out: Vec<LineMatch> = Vec::new();
        for span in spans {
            while let Some(nl) = next_newline {
                if nl >= span.start {
                    break;
                }
                line_number += 1;
                line_start = nl + 1;
                next_newline = newlines.next();
            }
            let line_end = next_newline.unwrap_or(content_len);
            match out.last_mut() {
                Some(last) if last.line_number == line_number => last.spans.push(*span),
                _ => out.push(LineMatch {
                    line_number,
                    line_start,
                    line_end,
                    spans: vec![*span],
                }),
            }
        }
        out
    }
}

fn compile_regex(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| ShardError::InvalidQuery(format!("bad regex {pattern:?}: {e}")))
}

/// Cheap case check against the fold bitmap before touching content pages.
/// Only constrains ASCII letters; everything else defers to the byte
/// comparison.
fn case_precheck(bitmap: &[u8], start: u32, pattern: &[u8]) -> bool {
    for (i, &b) in pattern.iter().enumerate() {
        let pos = start as usize + i;
        if b.is_ascii_uppercase() && !bitmap_bit(bitmap, pos) {
            return false;
        }
        if b.is_ascii_lowercase() && bitmap_bit(bitmap, pos) {
            return false;
        }
    }
    true
}

/// Verify a literal at a candidate start; returns the end offset on match
fn verify_literal_at(
    content: &[u8],
    start: u32,
    pattern: &[u8],
    case_sensitive: bool,
) -> Option<u32> {
    let start = start as usize;
    if case_sensitive {
        let end = start + pattern.len();
        (content.get(start..end)? == pattern).then_some(end as u32)
    } else {
        fold_match_at(content, start, pattern).map(|end| end as u32)
    }
}

/// Case-insensitive comparison of folded codepoints starting at `start`;
/// returns the end byte offset of the matched region
fn fold_match_at(content: &[u8], start: usize, pattern: &[u8]) -> Option<usize> {
    let mut pos = start;
    for (pcp, _, _) in CodepointIter::new(pattern) {
        let rest = content.get(pos..)?;
        if rest.is_empty() {
            return None;
        }
        let (ccp, len) = decode_codepoint(rest);
        if fold_codepoint(ccp) != fold_codepoint(pcp) {
            return None;
        }
        pos += len;
    }
    Some(pos)
}

/// All occurrences of a literal in a haystack, overlapping included, so the
/// result agrees with a position-by-position brute-force scan
pub(crate) fn find_literal(haystack: &[u8], pattern: &[u8], case_sensitive: bool) -> Vec<MatchSpan> {
    if pattern.is_empty() || haystack.len() < pattern.len() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    if case_sensitive {
        let finder = memmem::Finder::new(pattern);
        let mut base = 0usize;
        while let Some(found) = finder.find(&haystack[base..]) {
            let start = base + found;
            spans.push(MatchSpan {
                start: start as u32,
                end: (start + pattern.len()) as u32,
            });
            base = start + 1;
        }
    } else {
        for (_, off, _) in CodepointIter::new(haystack) {
            if let Some(end) = fold_match_at(haystack, off as usize, pattern) {
                spans.push(MatchSpan {
                    start: off,
                    end: end as u32,
                });
            }
        }
    }
    spans
}

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn starts_on_boundary(content: &[u8], span: &MatchSpan) -> bool {
    span.start == 0 || !is_word_byte(content[span.start as usize - 1])
}

fn ends_on_boundary(content: &[u8], span: &MatchSpan) -> bool {
    span.end as usize >= content.len() || !is_word_byte(content[span.end as usize])
}

fn is_whole_word(content: &[u8], span: &MatchSpan) -> bool {
    starts_on_boundary(content, span) && ends_on_boundary(content, span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_literal_overlapping() {
        let spans = find_literal(b"aaaa", b"aaa", true);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], MatchSpan { start: 0, end: 3 });
        assert_eq!(spans[1], MatchSpan { start: 1, end: 4 });
    }

    #[test]
    fn test_find_literal_case_insensitive() {
        let spans = find_literal(b"Foo fOO foo", b"foo", false);
        assert_eq!(spans.len(), 3);
        let spans = find_literal(b"Foo fOO foo", b"foo", true);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_case_precheck() {
        let bitmap = crate::utils::ngram::fold_bitmap(b"aBcD");
        assert!(case_precheck(&bitmap, 0, b"aBcD"));
        assert!(!case_precheck(&bitmap, 0, b"abcd"));
        assert!(!case_precheck(&bitmap, 0, b"ABcD"));
        // Non-letters are unconstrained
        assert!(case_precheck(&bitmap, 0, b"a#cD"));
    }

    #[test]
    fn test_whole_word() {
        let content = b"foo foobar (foo)";
        let spans = find_literal(content, b"foo", true);
        assert_eq!(spans.len(), 3);
        let whole: Vec<_> = spans
            .iter()
            .filter(|s| is_whole_word(content, s))
            .collect();
        assert_eq!(whole.len(), 2);
    }
}
