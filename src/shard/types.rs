use crate::error::{Result, ShardError};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a document within a shard
pub type DocId = u32;

/// Numeric repository identifier
pub type RepoId = u32;

/// An ngram is three case-folded codepoints packed into a u64
/// (21 bits per codepoint). Stored big-endian on disk so byte order
/// equals integer order.
pub type Ngram = u64;

/// Language tag recorded per document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u16)]
pub enum Language {
    #[default]
    Unknown = 0,
    Rust = 1,
    Python = 2,
    JavaScript = 3,
    TypeScript = 4,
    Go = 5,
    C = 6,
    Cpp = 7,
    Java = 8,
    Ruby = 9,
    Shell = 10,
    Markdown = 11,
    Json = 12,
    Yaml = 13,
    Html = 14,
    Css = 15,
    Sql = 16,
    Kotlin = 17,
    Swift = 18,
    Php = 19,
    CSharp = 20,
    Scala = 21,
    Lua = 22,
    Zig = 23,
    Ocaml = 24,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "jsx" => Language::TypeScript,
            "go" => Language::Go,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "java" => Language::Java,
            "rb" => Language::Ruby,
            "sh" | "bash" | "zsh" => Language::Shell,
            "md" | "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "html" | "htm" => Language::Html,
            "css" | "scss" => Language::Css,
            "sql" => Language::Sql,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "php" => Language::Php,
            "cs" => Language::CSharp,
            "scala" => Language::Scala,
            "lua" => Language::Lua,
            "zig" => Language::Zig,
            "ml" | "mli" => Language::Ocaml,
            _ => Language::Unknown,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        if v <= Language::Ocaml as u16 {
            // repr(u16) with contiguous discriminants
            unsafe { std::mem::transmute::<u16, Language>(v) }
        } else {
            Language::Unknown
        }
    }
}

/// Per-document flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocFlags(pub u16);

impl DocFlags {
    pub const NONE: u16 = 0;
    /// Content looks binary (ngrams still indexed; verification is byte-exact)
    pub const BINARY: u16 = 1 << 0;
    /// Admitted past the size limit by a large-file override pattern
    pub const LARGE: u16 = 1 << 1;

    pub fn new() -> Self {
        Self(Self::NONE)
    }

    pub fn is_binary(&self) -> bool {
        self.0 & Self::BINARY != 0
    }

    pub fn is_large(&self) -> bool {
        self.0 & Self::LARGE != 0
    }

    pub fn set_binary(&mut self) {
        self.0 |= Self::BINARY;
    }

    pub fn set_large(&mut self) {
        self.0 |= Self::LARGE;
    }
}

/// Fixed-size per-document record in the doc metadata section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocMeta {
    pub content_off: u32,
    pub content_len: u32,
    pub name_off: u32,
    pub name_len: u32,
    pub mod_time: u64,
    pub language: Language,
    /// Bit i set when the document exists on branch i of its repository's
    /// branch list. Zero means "all branches" for repos without branches.
    pub branch_mask: u64,
    pub flags: DocFlags,
    /// Index into the shard's repository descriptor list
    pub repo_index: u16,
}

impl DocMeta {
    /// On-disk record size in bytes
    pub const SIZE: usize = 4 + 4 + 4 + 4 + 8 + 2 + 8 + 2 + 2;
}

/// A branch a repository was indexed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoBranch {
    pub name: String,
    /// Opaque version identifier (commit hash or tag)
    pub version: String,
}

/// Descriptor of one indexed repository.
///
/// A compound shard carries one descriptor per constituent repository,
/// ordered by ascending `id`. The `source_build_*` fields are populated by
/// merge from each input shard's metadata and consumed by explode to restore
/// the original bytes; they are empty/zero on freshly built shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub name: String,
    pub id: RepoId,
    /// Ranking priority; feeds the score's repository term
    pub priority: f64,
    pub branches: Vec<RepoBranch>,
    /// Unix seconds; 0 lets the builder derive it from document mod times
    pub latest_commit_date: u64,
    /// Opaque per-repository configuration
    pub config: BTreeMap<String, String>,
    pub source_build_id: String,
    pub source_build_timestamp: u64,
}

impl RepoDescriptor {
    pub fn new(name: impl Into<String>, id: RepoId) -> Self {
        Self {
            name: name.into(),
            id,
            priority: 0.0,
            branches: Vec::new(),
            latest_commit_date: 0,
            config: BTreeMap::new(),
            source_build_id: String::new(),
            source_build_timestamp: 0,
        }
    }

    pub fn branch_index(&self, name: &str) -> Option<usize> {
        self.branches.iter().position(|b| b.name == name)
    }
}

/// Global index metadata section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub build_id: String,
    pub build_timestamp: u64,
    pub latest_commit_date: u64,
}

/// Options controlling shard construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderOptions {
    /// Max ngrams per bucket; a bucket's byte footprint is 8x this
    pub bucket_size: usize,
    /// B-tree fanout parameter: inner nodes hold v..=2v children
    pub btree_v: usize,
    /// Documents larger than this are skipped unless a large-file pattern
    /// admits them; 0 disables the limit
    pub max_document_size: u64,
    /// Ordered override patterns for oversized documents. A leading `!`
    /// re-excludes, `\!` escapes a literal `!`; the last matching pattern
    /// wins.
    pub large_file_patterns: Vec<String>,
    pub build_id: String,
    /// Unix seconds; part of the output bytes, so merge/explode set it
    /// explicitly for deterministic output
    pub build_timestamp: u64,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            bucket_size: 1024,
            btree_v: 16,
            max_document_size: 0,
            large_file_patterns: Vec::new(),
            build_id: String::new(),
            build_timestamp: 0,
        }
    }
}

/// Per-document inputs to the builder
#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    pub mod_time: u64,
    pub language: Language,
    /// Branch names; must appear in the repository's branch list
    pub branches: Vec<String>,
}

/// Compiled large-file override list
pub struct LargeFileFilter {
    entries: Vec<(GlobMatcher, bool)>,
}

impl LargeFileFilter {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut entries = Vec::with_capacity(patterns.len());
        for pat in patterns {
            let (glob, include) = if let Some(rest) = pat.strip_prefix('!') {
                (rest.to_string(), false)
            } else if let Some(rest) = pat.strip_prefix("\\!") {
                (format!("!{rest}"), true)
            } else {
                (pat.clone(), true)
            };
            let matcher = Glob::new(&glob)
                .map_err(|e| ShardError::format(format!("bad large-file pattern {pat:?}: {e}")))?
                .compile_matcher();
            entries.push((matcher, include));
        }
        Ok(Self { entries })
    }

    /// Last matching pattern wins; None when nothing matches
    pub fn decide(&self, name: &str) -> Option<bool> {
        let mut decision = None;
        for (matcher, include) in &self.entries {
            if matcher.is_match(name) {
                decision = Some(*include);
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_roundtrip() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_u16(Language::Go as u16), Language::Go);
        assert_eq!(Language::from_u16(999), Language::Unknown);
    }

    #[test]
    fn test_large_file_filter_order() {
        let f = LargeFileFilter::compile(&[
            "F?".to_string(),
            "!F2".to_string(),
            "\\!F0".to_string(),
        ])
        .unwrap();
        assert_eq!(f.decide("F0"), Some(true));
        assert_eq!(f.decide("F2"), Some(false));
        assert_eq!(f.decide("!F0"), Some(true));
        assert_eq!(f.decide("!F1"), None);
        assert_eq!(f.decide("other"), None);
    }

    #[test]
    fn test_large_file_filter_override_back() {
        let f = LargeFileFilter::compile(&["!F2".to_string(), "F2".to_string()]).unwrap();
        assert_eq!(f.decide("F2"), Some(true));
    }
}
