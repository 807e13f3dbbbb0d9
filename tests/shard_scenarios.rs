//! End-to-end scenarios over real shard files: build, search, stream,
//! merge/explode, and the cross-cutting laws (stats additivity, progress
//! monotonicity, cancellation liveness).

use codeshard::query::Query;
use codeshard::search::{
    concat_chunks, SearchContext, SearchOptions, ShardCollection, VecSink,
};
use codeshard::shard::{
    explode, merge, BuilderOptions, DocumentOptions, RepoBranch, RepoDescriptor, Shard,
    ShardBuilder,
};
use codeshard::ShardError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

// 2024-09-26T00:00:00Z
const MOD_TIME: u64 = 1_727_308_800;

fn write_shard(
    dir: &Path,
    file_name: &str,
    repo: RepoDescriptor,
    docs: &[(&str, &[u8])],
    opts: BuilderOptions,
) -> PathBuf {
    let mut builder = ShardBuilder::new(opts).unwrap();
    builder.add_repo(repo).unwrap();
    for (name, content) in docs {
        let doc = DocumentOptions {
            mod_time: MOD_TIME,
            ..Default::default()
        };
        builder.add_document(name, content, &doc).unwrap();
    }
    let path = dir.join(file_name);
    builder.write_to_path(&path).unwrap();
    path
}

fn default_opts(build_id: &str, ts: u64) -> BuilderOptions {
    BuilderOptions {
        build_id: build_id.to_string(),
        build_timestamp: ts,
        ..Default::default()
    }
}

fn search_all(dir: &Path, query: &Query) -> codeshard::SearchResult {
    let collection = ShardCollection::open(dir).unwrap();
    collection
        .search(&SearchContext::new(), query, &SearchOptions::default())
        .unwrap()
}

// ---------------------------------------------------------------------
// Size limit with ordered large-file overrides
// ---------------------------------------------------------------------

fn s1_file_count(patterns: &[&str]) -> usize {
    let tmp = TempDir::new().unwrap();
    let body = vec![b'a'; 1000];
    let docs: Vec<(&str, &[u8])> = vec![
        ("F0", &body[..]),
        ("F1", &body[..]),
        ("F2", &body[..]),
        ("F3", &body[..]),
        ("!F0", &body[..]),
        ("!F1", &body[..]),
        ("!F2", &body[..]),
        ("!F3", &body[..]),
    ];
    let opts = BuilderOptions {
        max_document_size: 999,
        large_file_patterns: patterns.iter().map(|p| p.to_string()).collect(),
        ..default_opts("s1", 1)
    };
    write_shard(tmp.path(), "s1.shard", RepoDescriptor::new("r", 1), &docs, opts);
    search_all(tmp.path(), &Query::substring("aaa")).files.len()
}

#[test]
fn test_large_file_overrides() {
    assert_eq!(s1_file_count(&[]), 0);
    assert_eq!(s1_file_count(&["F0", "F2"]), 2);
    assert_eq!(s1_file_count(&["F?", "!F2"]), 3);
    assert_eq!(s1_file_count(&["F?", "!F2", "\\!F0"]), 4);
    assert_eq!(s1_file_count(&["F?", "!F2", "\\!F0", "F2"]), 5);
}

// ---------------------------------------------------------------------
// Merge-explode round trips and metadata reads
// ---------------------------------------------------------------------

fn two_repo_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let r1_docs: Vec<(&str, &[u8])> = vec![
        ("main.go", b"package main\n\nfunc main() {\n\tprintln(\"hello\")\n}\n"),
        ("util.go", b"package main\n\nfunc helper() int { return 42 }\n"),
    ];
    let r2_docs: Vec<(&str, &[u8])> = vec![
        ("lib.rs", b"pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n"),
        ("empty.rs", b""),
    ];
    let r1 = write_shard(
        dir,
        "r1.shard",
        RepoDescriptor::new("repo-one", 1),
        &r1_docs,
        default_opts("build-r1", 101),
    );
    let r2 = write_shard(
        dir,
        "r2.shard",
        RepoDescriptor::new("repo-two", 2),
        &r2_docs,
        default_opts("build-r2", 202),
    );
    (r1, r2)
}

#[test]
fn test_explode_inverts_merge_byte_for_byte() {
    let tmp = TempDir::new().unwrap();
    let (r1, r2) = two_repo_fixture(tmp.path());
    let original_r1 = std::fs::read(&r1).unwrap();
    let original_r2 = std::fs::read(&r2).unwrap();

    let out = TempDir::new().unwrap();
    let compound = merge(&[r1, r2], out.path(), "compound-build", 999).unwrap();

    let exploded_dir = TempDir::new().unwrap();
    let mut outputs = explode(&compound, exploded_dir.path()).unwrap();
    outputs.sort();
    assert_eq!(outputs.len(), 2);

    assert_eq!(std::fs::read(&outputs[0]).unwrap(), original_r1);
    assert_eq!(std::fs::read(&outputs[1]).unwrap(), original_r2);
}

#[test]
fn test_merge_is_associative_under_explode() {
    let tmp = TempDir::new().unwrap();
    let (r1, r2) = two_repo_fixture(tmp.path());
    let r3 = write_shard(
        tmp.path(),
        "r3.shard",
        RepoDescriptor::new("repo-three", 3),
        &[("x.py", b"def f():\n    return 1\n")],
        default_opts("build-r3", 303),
    );
    let originals: std::collections::BTreeMap<String, Vec<u8>> = [&r1, &r2, &r3]
        .iter()
        .map(|p| {
            (
                p.file_name().unwrap().to_string_lossy().into_owned(),
                std::fs::read(p).unwrap(),
            )
        })
        .collect();

    let left_dir = TempDir::new().unwrap();
    let ab = merge(&[r1.clone(), r2.clone()], left_dir.path(), "ab", 1).unwrap();
    let ab_c = merge(&[ab, r3.clone()], left_dir.path(), "final", 7).unwrap();

    let right_dir = TempDir::new().unwrap();
    let bc = merge(&[r2.clone(), r3.clone()], right_dir.path(), "bc", 2).unwrap();
    let a_bc = merge(&[r1.clone(), bc], right_dir.path(), "final", 7).unwrap();

    for compound in [ab_c, a_bc] {
        let exploded = TempDir::new().unwrap();
        let outputs = explode(&compound, exploded.path()).unwrap();
        assert_eq!(outputs.len(), 3);
        for output in outputs {
            // Outputs are named after their repository; the fixture names
            // the shard files the same way
            let name = output
                .file_name()
                .unwrap()
                .to_string_lossy()
                .replace("repo-one", "r1")
                .replace("repo-two", "r2")
                .replace("repo-three", "r3");
            assert_eq!(&std::fs::read(&output).unwrap(), &originals[&name]);
        }
    }
}

#[test]
fn test_compound_repos_sorted_by_id() {
    let tmp = TempDir::new().unwrap();
    let (r1, r2) = two_repo_fixture(tmp.path());
    let out = TempDir::new().unwrap();
    // Inputs deliberately out of id order
    let compound = merge(&[r2, r1], out.path(), "c", 1).unwrap();
    let meta = Shard::read_metadata(&compound).unwrap();
    let ids: Vec<u32> = meta.repos.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(meta.repos[0].source_build_id, "build-r1");
    assert_eq!(meta.repos[1].source_build_id, "build-r2");
}

#[test]
fn test_metadata_latest_commit_date_from_mod_times() {
    let tmp = TempDir::new().unwrap();
    let (r1, _) = two_repo_fixture(tmp.path());
    let meta = Shard::read_metadata(&r1).unwrap();
    assert_eq!(meta.metadata.latest_commit_date, MOD_TIME);
    assert_eq!(meta.repos[0].latest_commit_date, MOD_TIME);
}

// ---------------------------------------------------------------------
// Search semantics
// ---------------------------------------------------------------------

#[test]
fn test_substring_matches_brute_force() {
    let tmp = TempDir::new().unwrap();
    let content = b"abababab\nthe needle sits here: abab\n";
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", content)],
        default_opts("b", 1),
    );

    let result = search_all(tmp.path(), &Query::substring("abab"));
    assert_eq!(result.files.len(), 1);
    // Overlapping brute force: positions 0, 2, 4 on line one, one more on
    // line two
    let total: usize = result.files[0].lines.iter().map(|l| l.spans.len()).sum();
    let brute = (0..content.len() - 3)
        .filter(|&i| &content[i..i + 4] == b"abab")
        .count();
    assert_eq!(total, brute);
    assert_eq!(result.stats.match_count, brute as u64);
}

#[test]
fn test_short_pattern_full_scan_fallback() {
    let tmp = TempDir::new().unwrap();
    let docs: Vec<(&str, &[u8])> = vec![
        ("one.txt", b"xylophone\n"),
        ("two.txt", b"no letter here\n"),
        ("three.txt", b"axe\n"),
    ];
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &docs,
        default_opts("b", 1),
    );

    // Pattern below trigram size cannot use the index
    let result = search_all(tmp.path(), &Query::substring("x"));
    let mut matched: Vec<String> = result.files.iter().map(|f| f.file_name.clone()).collect();
    matched.sort();
    assert_eq!(matched, vec!["one.txt", "three.txt"]);
    // Brute-force agreement on span offsets
    let one = result.files.iter().find(|f| f.file_name == "one.txt").unwrap();
    assert_eq!(one.lines[0].spans[0].start, 0);
}

#[test]
fn test_case_sensitivity() {
    let tmp = TempDir::new().unwrap();
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", b"Foo foo FOO\n")],
        default_opts("b", 1),
    );

    let insensitive = search_all(tmp.path(), &Query::substring("foo"));
    assert_eq!(insensitive.stats.match_count, 3);

    let sensitive = search_all(
        tmp.path(),
        &Query::Substring {
            pattern: "foo".to_string(),
            case_sensitive: true,
            file_name: false,
        },
    );
    assert_eq!(sensitive.stats.match_count, 1);
}

#[test]
fn test_regex_search() {
    let tmp = TempDir::new().unwrap();
    let docs: Vec<(&str, &[u8])> = vec![
        ("a.rs", b"fn alpha() {}\nfn beta() {}\n"),
        ("b.rs", b"struct Gamma;\n"),
    ];
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &docs,
        default_opts("b", 1),
    );

    let result = search_all(tmp.path(), &Query::regex(r"fn [a-z]+\(\)"));
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].file_name, "a.rs");
    assert_eq!(result.files[0].match_count(), 2);

    // Regex factors keep the other document out of verification
    assert!(result.stats.files_loaded <= 1);
}

#[test]
fn test_boolean_composition_and_negation() {
    let tmp = TempDir::new().unwrap();
    let docs: Vec<(&str, &[u8])> = vec![
        ("both.txt", b"alpha and beta\n"),
        ("only_a.txt", b"alpha alone\n"),
        ("only_b.txt", b"beta alone\n"),
        ("neither.txt", b"gamma\n"),
    ];
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &docs,
        default_opts("b", 1),
    );

    let and = search_all(
        tmp.path(),
        &Query::and([Query::substring("alpha"), Query::substring("beta")]),
    );
    assert_eq!(and.files.len(), 1);
    assert_eq!(and.files[0].file_name, "both.txt");

    let or = search_all(
        tmp.path(),
        &Query::or([Query::substring("alpha"), Query::substring("beta")]),
    );
    assert_eq!(or.files.len(), 3);

    // Negation-only: full scan, matches the complement
    let not = search_all(tmp.path(), &Query::not(Query::substring("alpha")));
    let mut names: Vec<&str> = not.files.iter().map(|f| f.file_name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["neither.txt", "only_b.txt"]);
}

#[test]
fn test_filename_scope_and_branch_restriction() {
    let tmp = TempDir::new().unwrap();
    let mut builder = ShardBuilder::new(default_opts("b", 1)).unwrap();
    let mut repo = RepoDescriptor::new("r", 1);
    repo.branches = vec![
        RepoBranch {
            name: "main".to_string(),
            version: "c0ffee".to_string(),
        },
        RepoBranch {
            name: "dev".to_string(),
            version: "deadbe".to_string(),
        },
    ];
    builder.add_repo(repo).unwrap();
    builder
        .add_document(
            "handlers/search.go",
            b"package handlers // search endpoint\n",
            &DocumentOptions {
                branches: vec!["main".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
    builder
        .add_document(
            "readme.md",
            b"search docs\n",
            &DocumentOptions {
                branches: vec!["dev".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
    builder.write_to_path(&tmp.path().join("s.shard")).unwrap();

    let by_name = search_all(
        tmp.path(),
        &Query::Substring {
            pattern: "search".to_string(),
            case_sensitive: false,
            file_name: true,
        },
    );
    assert_eq!(by_name.files.len(), 1);
    assert!(by_name.files[0].filename_match);
    assert_eq!(by_name.files[0].file_name, "handlers/search.go");

    let on_main = search_all(
        tmp.path(),
        &Query::and([Query::substring("search"), Query::Branch("main".to_string())]),
    );
    assert_eq!(on_main.files.len(), 1);
    assert_eq!(on_main.files[0].branches, vec!["main".to_string()]);
}

#[test]
fn test_whole_word_option() {
    let tmp = TempDir::new().unwrap();
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", b"foo foobar (foo)\n")],
        default_opts("b", 1),
    );
    let collection = ShardCollection::open(tmp.path()).unwrap();
    let result = collection
        .search(
            &SearchContext::new(),
            &Query::substring("foo"),
            &SearchOptions {
                whole_word: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.stats.match_count, 2);
}

#[test]
fn test_find_posting_coherence() {
    let tmp = TempDir::new().unwrap();
    let docs: Vec<(&str, &[u8])> = vec![
        ("a.rs", b"fn main() { let velocity = 9; }\n"),
        ("b.rs", b"static GRAVITY: f64 = 9.81;\n"),
    ];
    let path = write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &docs,
        default_opts("b", 1),
    );
    let shard = Shard::open(&path).unwrap();

    for id in 0..shard.doc_count() as u32 {
        let content = shard.doc_content(id).to_vec();
        for (ngram, _) in codeshard::utils::NgramIter::new(&content) {
            let idx = shard
                .find_ngram(ngram)
                .unwrap()
                .unwrap_or_else(|| panic!("present ngram {ngram:#x} not found"));
            let offsets: Vec<u32> = shard.posting(idx).unwrap().iter().collect();
            assert!(!offsets.is_empty());
            assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    // Absent ngram resolves to absence, not a wrong bucket
    let absent = codeshard::utils::pack_ngram(0x10FF00, 0x10FF01, 0x10FF02);
    assert!(shard.find_ngram(absent).unwrap().is_none());
}

// ---------------------------------------------------------------------
// Streaming and the progress contract
// ---------------------------------------------------------------------

#[test]
fn test_streaming_chunks_and_progress() {
    let tmp = TempDir::new().unwrap();
    let contents: Vec<Vec<u8>> = (0..200)
        .map(|i| format!("needle number {i}\n").into_bytes())
        .collect();
    let docs: Vec<(String, &[u8])> = contents
        .iter()
        .enumerate()
        .map(|(i, c)| (format!("f{i:03}.txt"), c.as_slice()))
        .collect();

    let mut builder = ShardBuilder::new(default_opts("b", 1)).unwrap();
    builder.add_repo(RepoDescriptor::new("r", 1)).unwrap();
    for (name, content) in &docs {
        builder
            .add_document(name, content, &DocumentOptions::default())
            .unwrap();
    }
    builder.write_to_path(&tmp.path().join("s.shard")).unwrap();

    let collection = ShardCollection::open(tmp.path()).unwrap();
    let opts = SearchOptions {
        chunk_matches_per_file: 3,
        file_matches_per_chunk: 6,
        ..Default::default()
    };
    let query = Query::substring("needle");

    let mut sink = VecSink::default();
    collection
        .stream_search(&SearchContext::new(), &query, &opts, &mut sink)
        .unwrap();
    assert!(sink.flushed);

    let non_final = &sink.chunks[..sink.chunks.len() - 1];
    assert!(non_final.len() >= 34, "got {} chunks", non_final.len());
    for chunk in non_final {
        assert!(!chunk.is_final);
        assert!(chunk.files.len() <= 6);
        assert!(chunk.progress.priority <= chunk.progress.max_pending_priority);
    }

    let last = sink.chunks.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.progress.priority, last.progress.max_pending_priority);

    // Concatenation equals the batched result
    let batched = collection
        .search(&SearchContext::new(), &query, &opts)
        .unwrap();
    let streamed = concat_chunks(&sink.chunks);
    assert_eq!(streamed, batched.files);

    // The final chunk's stats are authoritative (duration excepted)
    let mut chunk_stats = last.stats.clone().unwrap();
    let mut batch_stats = batched.stats.clone();
    chunk_stats.duration = Duration::ZERO;
    batch_stats.duration = Duration::ZERO;
    assert_eq!(chunk_stats, batch_stats);
}

// ---------------------------------------------------------------------
// Stats additivity across a partition of the shard set
// ---------------------------------------------------------------------

#[test]
fn test_stats_additivity() {
    let whole = TempDir::new().unwrap();
    let part1 = TempDir::new().unwrap();
    let part2 = TempDir::new().unwrap();

    let docs1: Vec<(&str, &[u8])> = vec![("a.txt", b"shared token alpha\n")];
    let docs2: Vec<(&str, &[u8])> = vec![("b.txt", b"shared token beta\n")];

    for (dir, file, id, docs) in [
        (&whole, "s1.shard", 1u32, &docs1),
        (&whole, "s2.shard", 2u32, &docs2),
        (&part1, "s1.shard", 1u32, &docs1),
        (&part2, "s2.shard", 2u32, &docs2),
    ] {
        write_shard(
            dir.path(),
            file,
            RepoDescriptor::new(format!("r{id}"), id),
            docs,
            default_opts("b", 1),
        );
    }

    let query = Query::substring("shared token");
    let whole_stats = search_all(whole.path(), &query).stats;
    let sum = search_all(part1.path(), &query).stats + search_all(part2.path(), &query).stats;

    let mut whole_stats = whole_stats;
    let mut sum = sum;
    whole_stats.duration = Duration::ZERO;
    sum.duration = Duration::ZERO;
    assert_eq!(whole_stats, sum);
}

// ---------------------------------------------------------------------
// Cancellation, deadlines, failure semantics
// ---------------------------------------------------------------------

#[test]
fn test_cancelled_query_returns_partial_flag() {
    let tmp = TempDir::new().unwrap();
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", b"some content here\n")],
        default_opts("b", 1),
    );
    let collection = ShardCollection::open(tmp.path()).unwrap();

    let ctx = SearchContext::new();
    ctx.cancel();
    let result = collection
        .search(&ctx, &Query::substring("content"), &SearchOptions::default())
        .unwrap();
    assert!(result.cancelled);
    assert!(result.files.is_empty());
}

#[test]
fn test_deadline_enforced_like_cancellation() {
    let tmp = TempDir::new().unwrap();
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", b"some content here\n")],
        default_opts("b", 1),
    );
    let collection = ShardCollection::open(tmp.path()).unwrap();
    let result = collection
        .search(
            &SearchContext::new(),
            &Query::substring("content"),
            &SearchOptions {
                max_wall_time: Some(Duration::ZERO),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(result.cancelled);
}

#[test]
fn test_corrupt_shard_excluded_with_warning() {
    let tmp = TempDir::new().unwrap();
    write_shard(
        tmp.path(),
        "good.shard",
        RepoDescriptor::new("good", 1),
        &[("a.txt", b"hello corruption test\n")],
        default_opts("b", 1),
    );
    let bad = write_shard(
        tmp.path(),
        "bad.shard",
        RepoDescriptor::new("bad", 2),
        &[("b.txt", b"hello corruption test\n")],
        default_opts("b", 1),
    );

    // Flip one content byte; the checksum catches it at open
    let mut bytes = std::fs::read(&bad).unwrap();
    bytes[40] ^= 0xFF;
    std::fs::write(&bad, bytes).unwrap();

    let result = search_all(tmp.path(), &Query::substring("corruption"));
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].repo, "good");
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("bad.shard"));
}

#[test]
fn test_version_mismatch_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", b"versioned content\n")],
        default_opts("b", 1),
    );

    // Bump the version field in the fixed tail (offset -8..-4), keeping
    // the checksum valid for the new bytes
    let mut bytes = std::fs::read(&path).unwrap();
    let n = bytes.len();
    bytes[n - 8..n - 4].copy_from_slice(&999u32.to_be_bytes());
    let pos = n - 12;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..pos]);
    hasher.update(&bytes[pos + 4..]);
    let checksum = hasher.finalize();
    bytes[pos..pos + 4].copy_from_slice(&checksum.to_be_bytes());
    std::fs::write(&path, bytes).unwrap();

    match Shard::open(&path) {
        Err(ShardError::Version { found, .. }) => assert_eq!(found, 999),
        other => panic!("expected version error, got {other:?}"),
    }
}

#[test]
fn test_invalid_query_surfaces_to_caller() {
    let tmp = TempDir::new().unwrap();
    write_shard(
        tmp.path(),
        "s.shard",
        RepoDescriptor::new("r", 1),
        &[("a.txt", b"text\n")],
        default_opts("b", 1),
    );
    let collection = ShardCollection::open(tmp.path()).unwrap();
    let err = collection
        .search(
            &SearchContext::new(),
            &Query::regex("(unclosed"),
            &SearchOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ShardError::InvalidQuery(_)));
}

#[test]
fn test_empty_directory_is_no_shards() {
    let tmp = TempDir::new().unwrap();
    let collection = ShardCollection::open(tmp.path()).unwrap();
    let err = collection
        .search(
            &SearchContext::new(),
            &Query::substring("anything"),
            &SearchOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ShardError::NoShards));
}

// ---------------------------------------------------------------------
// Repository enumeration and rescan
// ---------------------------------------------------------------------

#[test]
fn test_list_repositories() {
    let tmp = TempDir::new().unwrap();
    two_repo_fixture(tmp.path());
    let collection = ShardCollection::open(tmp.path()).unwrap();

    let all = collection
        .list(&SearchContext::new(), &Query::Const(true))
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, 1);
    assert_eq!(all[1].id, 2);

    let named = collection
        .list(&SearchContext::new(), &Query::RepoName("two".to_string()))
        .unwrap();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].name, "repo-two");

    // Content predicates are rejected
    let err = collection
        .list(&SearchContext::new(), &Query::substring("x"))
        .unwrap_err();
    assert!(matches!(err, ShardError::InvalidQuery(_)));
}

#[test]
fn test_rescan_tracks_directory() {
    let tmp = TempDir::new().unwrap();
    let (r1, _) = two_repo_fixture(tmp.path());
    let collection = ShardCollection::open(tmp.path()).unwrap();
    assert_eq!(collection.shard_count(), 2);

    std::fs::remove_file(&r1).unwrap();
    collection.rescan().unwrap();
    assert_eq!(collection.shard_count(), 1);

    // .trash content is never scanned
    let trash = tmp.path().join(".trash");
    std::fs::create_dir_all(&trash).unwrap();
    collection.rescan().unwrap();
    assert_eq!(collection.shard_count(), 1);
}

#[test]
fn test_repo_restriction_skips_shards() {
    let tmp = TempDir::new().unwrap();
    two_repo_fixture(tmp.path());
    let collection = ShardCollection::open(tmp.path()).unwrap();
    let result = collection
        .search(
            &SearchContext::new(),
            &Query::and([Query::substring("package"), Query::RepoIds(vec![1])]),
            &SearchOptions::default(),
        )
        .unwrap();
    assert!(result.files.iter().all(|f| f.repo_id == 1));
    assert_eq!(result.stats.shards_skipped, 1);
}
