//! Offline merge and explode transforms.
//!
//! Merge combines N shards into one compound shard: repositories ordered by
//! ascending numeric id, document ids reassigned contiguously per
//! repository, posting lists re-derived by feeding every document back
//! through the builder. Each input's build id and timestamp are preserved
//! on its descriptors, which is what lets explode reproduce the original
//! files byte-for-byte: those two fields are the only metadata merge
//! overwrites.
//!
//! Both transforms use the builder's default bucket geometry, so the
//! round-trip law holds for shards built with defaults.

use crate::error::{Result, ShardError};
use crate::shard::reader::Shard;
use crate::shard::types::{BuilderOptions, DocFlags, DocumentOptions, RepoDescriptor};
use crate::shard::writer::ShardBuilder;
use std::path::{Path, PathBuf};

/// One repository's documents lifted out of a shard
struct RepoGroup {
    desc: RepoDescriptor,
    docs: Vec<ExtractedDoc>,
}

struct ExtractedDoc {
    name: String,
    content: Vec<u8>,
    options: DocumentOptions,
    flags: DocFlags,
}

/// Merge input shards into a compound shard inside `out_dir`.
/// Deterministic: identical inputs and overrides produce identical bytes.
pub fn merge(
    inputs: &[PathBuf],
    out_dir: &Path,
    build_id: &str,
    build_timestamp: u64,
) -> Result<PathBuf> {
    if inputs.is_empty() {
        return Err(ShardError::format("merge needs at least one input shard"));
    }

    let mut groups: Vec<RepoGroup> = Vec::new();
    for path in inputs {
        let shard = Shard::open(path)?;
        for group in extract_groups(&shard) {
            if groups.iter().any(|g| g.desc.id == group.desc.id) {
                return Err(ShardError::format(format!(
                    "repository id {} appears in more than one input",
                    group.desc.id
                )));
            }
            groups.push(group);
        }
        log::debug!("merge: read {} ({} docs)", path.display(), shard.doc_count());
    }
    groups.sort_by_key(|g| g.desc.id);

    let mut builder = ShardBuilder::new(BuilderOptions {
        build_id: build_id.to_string(),
        build_timestamp,
        ..Default::default()
    })?;
    for group in &groups {
        builder.add_repo(group.desc.clone())?;
        for doc in &group.docs {
            builder.push_document(&doc.name, &doc.content, &doc.options, doc.flags)?;
        }
    }

    let ids: Vec<u32> = groups.iter().map(|g| g.desc.id).collect();
    let out_path = out_dir.join(format!(
        "compound-{:06}-{:06}-{}.shard",
        ids.first().unwrap(),
        ids.last().unwrap(),
        ids.len()
    ));
    builder.write_to_path(&out_path)?;
    Ok(out_path)
}

/// Split a compound shard back into its constituent single-repository
/// shards, restoring each one's original build id and timestamp.
pub fn explode(input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let shard = Shard::open(input)?;
    if shard.repos().len() < 2 {
        return Err(ShardError::format(format!(
            "{} is not a compound shard",
            input.display()
        )));
    }

    let mut outputs = Vec::new();
    for mut group in extract_groups(&shard) {
        let build_id = std::mem::take(&mut group.desc.source_build_id);
        let build_timestamp = std::mem::take(&mut group.desc.source_build_timestamp);

        let mut builder = ShardBuilder::new(BuilderOptions {
            build_id,
            build_timestamp,
            ..Default::default()
        })?;
        builder.add_repo(group.desc.clone())?;
        for doc in &group.docs {
            builder.push_document(&doc.name, &doc.content, &doc.options, doc.flags)?;
        }

        let out_path = out_dir.join(format!("{}.shard", sanitize_name(&group.desc.name)));
        builder.write_to_path(&out_path)?;
        outputs.push(out_path);
    }
    Ok(outputs)
}

/// Lift every repository and its documents out of a shard, preserving the
/// source build id/timestamp on descriptors that do not carry one yet
/// (descriptors from an already-compound input keep theirs).
fn extract_groups(shard: &Shard) -> Vec<RepoGroup> {
    let metadata = shard.metadata();
    let mut groups: Vec<RepoGroup> = shard
        .repos()
        .iter()
        .map(|desc| {
            let mut desc = desc.clone();
            if desc.source_build_id.is_empty() {
                desc.source_build_id = metadata.build_id.clone();
                desc.source_build_timestamp = metadata.build_timestamp;
            }
            RepoGroup {
                desc,
                docs: Vec::new(),
            }
        })
        .collect();

    for id in 0..shard.doc_count() as u32 {
        let meta = shard.doc(id);
        let repo = &groups[meta.repo_index as usize].desc;
        let branches = repo
            .branches
            .iter()
            .enumerate()
            .filter(|(i, _)| meta.branch_mask & (1 << i) != 0)
            .map(|(_, b)| b.name.clone())
            .collect();
        groups[meta.repo_index as usize].docs.push(ExtractedDoc {
            name: shard.doc_name_str(id),
            content: shard.doc_content(id).to_vec(),
            options: DocumentOptions {
                mod_time: meta.mod_time,
                language: meta.language,
                branches,
            },
            flags: meta.flags,
        });
    }
    groups
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
