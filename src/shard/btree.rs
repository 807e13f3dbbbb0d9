//! Bucket B-tree over the shard's ngram set.
//!
//! The tree exists in two forms. [`BtreeBuilder`] is the write-side
//! structure: it holds real ngram buckets and splits nodes top-down on the
//! way to the leaf, so the left half of a split leaf is frozen at
//! `bucket_size / 2` entries and never revisited (shard builds feed ngrams
//! in ascending order, which makes every split a freeze of the left half).
//! [`Btree`] is the read-side form: inner nodes only, bulk-loaded on shard
//! open from each bucket's first ngram; leaves carry just
//! `(bucket_index, posting_index_offset)` and the bucket bytes stay in the
//! mmap. The serialized representation stores no ngrams outside the bucket
//! section.
//!
//! Lookup does exactly one bucket read: `find` resolves coordinates
//! in-memory, and the caller binary-searches the 8-byte entries of that one
//! bucket.

use crate::shard::types::Ngram;

/// Write-side tree
pub struct BtreeBuilder {
    bucket_size: usize,
    v: usize,
    root: Node,
}

enum Node {
    Inner {
        /// keys[i] separates children[i] (< key) from children[i+1] (>= key)
        keys: Vec<Ngram>,
        children: Vec<Node>,
    },
    Leaf {
        bucket: Vec<Ngram>,
    },
}

impl Node {
    fn is_full(&self, bucket_size: usize, v: usize) -> bool {
        match self {
            Node::Inner { children, .. } => children.len() >= 2 * v,
            Node::Leaf { bucket } => bucket.len() >= bucket_size,
        }
    }

    /// Split a full node; returns (left, split_key, right). For a leaf the
    /// left half is frozen at bucket_size/2 entries and the split key is the
    /// first ngram of the right half, recorded at the insert that
    /// triggered the split.
    fn split(self, bucket_size: usize, v: usize) -> (Node, Ngram, Node) {
        match self {
            Node::Leaf { mut bucket } => {
                debug_assert_eq!(bucket.len(), bucket_size);
                let right = bucket.split_off(bucket_size / 2);
                let split_key = right[0];
                (Node::Leaf { bucket }, split_key, Node::Leaf { bucket: right })
            }
            Node::Inner {
                mut keys,
                mut children,
            } => {
                debug_assert_eq!(children.len(), 2 * v);
                let right_children = children.split_off(v);
                let right_keys = keys.split_off(v);
                let split_key = keys.pop().expect("inner node with 2v children has keys");
                (
                    Node::Inner { keys, children },
                    split_key,
                    Node::Inner {
                        keys: right_keys,
                        children: right_children,
                    },
                )
            }
        }
    }
}

impl BtreeBuilder {
    pub fn new(bucket_size: usize, v: usize) -> Self {
        assert!(bucket_size >= 2, "bucket_size must be at least 2");
        assert!(v >= 2, "v must be at least 2");
        Self {
            bucket_size,
            v,
            root: Node::Leaf { bucket: Vec::new() },
        }
    }

    pub fn insert(&mut self, ngram: Ngram) {
        if self.root.is_full(self.bucket_size, self.v) {
            let old = std::mem::replace(&mut self.root, Node::Leaf { bucket: Vec::new() });
            let (left, split_key, right) = old.split(self.bucket_size, self.v);
            self.root = Node::Inner {
                keys: vec![split_key],
                children: vec![left, right],
            };
        }
        Self::insert_nonfull(&mut self.root, ngram, self.bucket_size, self.v);
    }

    fn insert_nonfull(node: &mut Node, ngram: Ngram, bucket_size: usize, v: usize) {
        match node {
            Node::Leaf { bucket } => {
                let pos = bucket.partition_point(|&x| x < ngram);
                if bucket.get(pos) != Some(&ngram) {
                    bucket.insert(pos, ngram);
                }
            }
            Node::Inner { keys, children } => {
                let mut idx = keys.partition_point(|&k| k <= ngram);
                if children[idx].is_full(bucket_size, v) {
                    let child = std::mem::replace(
                        &mut children[idx],
                        Node::Leaf { bucket: Vec::new() },
                    );
                    let (left, split_key, right) = child.split(bucket_size, v);
                    children[idx] = left;
                    children.insert(idx + 1, right);
                    keys.insert(idx, split_key);
                    if ngram >= split_key {
                        idx += 1;
                    }
                }
                Self::insert_nonfull(&mut children[idx], ngram, bucket_size, v);
            }
        }
    }

    /// In-order leaf buckets. The concatenation is the shard's sorted ngram
    /// set; the per-bucket lengths slice the bucket section.
    pub fn buckets(&self) -> Vec<&[Ngram]> {
        let mut out = Vec::new();
        collect_buckets(&self.root, &mut out);
        out
    }

    /// Per-bucket entry counts, in order
    pub fn bucket_counts(&self) -> Vec<u32> {
        self.buckets().iter().map(|b| b.len() as u32).collect()
    }
}

fn collect_buckets<'a>(node: &'a Node, out: &mut Vec<&'a [Ngram]>) {
    match node {
        Node::Leaf { bucket } => out.push(bucket),
        Node::Inner { children, .. } => {
            for child in children {
                collect_buckets(child, out);
            }
        }
    }
}

/// Read-side tree: immutable after shard open, shared freely.
#[derive(Debug)]
pub struct Btree {
    root: Option<FrozenNode>,
}

#[derive(Debug)]
enum FrozenNode {
    Inner {
        keys: Vec<Ngram>,
        children: Vec<FrozenNode>,
    },
    Leaf {
        bucket_index: u32,
        posting_index_offset: u32,
    },
}

/// Coordinates of the bucket a lookup lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRef {
    pub bucket_index: u32,
    /// Index into the global posting offset array of the bucket's first ngram
    pub posting_index_offset: u32,
}

impl Btree {
    /// Bulk-load from ascending bucket minimum keys and per-bucket entry
    /// counts. Memory is O(number of buckets).
    pub fn bulk_load(min_keys: &[Ngram], counts: &[u32], v: usize) -> Self {
        debug_assert_eq!(min_keys.len(), counts.len());
        if min_keys.is_empty() {
            return Self { root: None };
        }

        let mut posting_index_offset = 0u32;
        let mut level: Vec<(Ngram, FrozenNode)> = Vec::with_capacity(min_keys.len());
        for (i, (&key, &count)) in min_keys.iter().zip(counts).enumerate() {
            level.push((
                key,
                FrozenNode::Leaf {
                    bucket_index: i as u32,
                    posting_index_offset,
                },
            ));
            posting_index_offset += count;
        }

        while level.len() > 1 {
            let num_groups = level.len().div_ceil(2 * v);
            let base = level.len() / num_groups;
            let mut rem = level.len() % num_groups;
            let mut next = Vec::with_capacity(num_groups);
            let mut iter = level.into_iter();
            for _ in 0..num_groups {
                let take = if rem > 0 {
                    rem -= 1;
                    base + 1
                } else {
                    base
                };
                let group: Vec<(Ngram, FrozenNode)> = iter.by_ref().take(take).collect();
                let min_key = group[0].0;
                let keys = group.iter().skip(1).map(|(k, _)| *k).collect();
                let children = group.into_iter().map(|(_, n)| n).collect();
                next.push((min_key, FrozenNode::Inner { keys, children }));
            }
            level = next;
        }

        Self {
            root: level.pop().map(|(_, n)| n),
        }
    }

    /// Resolve the bucket an ngram lives in (or would live in). Presence is
    /// decided by the caller's binary search inside the bucket bytes.
    pub fn find(&self, ngram: Ngram) -> Option<BucketRef> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                FrozenNode::Inner { keys, children } => {
                    let idx = keys.partition_point(|&k| k <= ngram);
                    node = &children[idx];
                }
                FrozenNode::Leaf {
                    bucket_index,
                    posting_index_offset,
                } => {
                    return Some(BucketRef {
                        bucket_index: *bucket_index,
                        posting_index_offset: *posting_index_offset,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_values(b: &BtreeBuilder) -> Vec<Ngram> {
        b.buckets().concat()
    }

    #[test]
    fn test_unordered_inserts_stay_sorted() {
        // bucket_size 2, v 2: every insert order must keep leaf buckets
        // in sorted order
        let inserts = [9u64, 3, 4, 2, 6, 8, 7, 5, 1];
        let mut tree = BtreeBuilder::new(2, 2);
        let mut inserted: Vec<Ngram> = Vec::new();
        for &n in &inserts {
            tree.insert(n);
            inserted.push(n);
            inserted.sort_unstable();
            assert_eq!(all_values(&tree), inserted, "after inserting {n}");
        }
    }

    #[test]
    fn test_ascending_freezes_left_half() {
        let mut tree = BtreeBuilder::new(4, 2);
        for n in 0..64u64 {
            tree.insert(n);
        }
        let buckets = tree.buckets();
        // All but the rightmost bucket are frozen halves
        for b in &buckets[..buckets.len() - 1] {
            assert_eq!(b.len(), 2);
        }
        assert_eq!(all_values(&tree), (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_duplicate_insert_ignored() {
        let mut tree = BtreeBuilder::new(4, 2);
        tree.insert(5);
        tree.insert(5);
        assert_eq!(all_values(&tree), vec![5]);
    }

    #[test]
    fn test_bulk_load_find() {
        let mut tree = BtreeBuilder::new(4, 2);
        let values: Vec<Ngram> = (0..200).map(|i| i * 3).collect();
        for &n in &values {
            tree.insert(n);
        }
        let buckets = tree.buckets();
        let min_keys: Vec<Ngram> = buckets.iter().map(|b| b[0]).collect();
        let counts = tree.bucket_counts();
        let frozen = Btree::bulk_load(&min_keys, &counts, 2);

        let mut posting_index = 0u32;
        for (i, bucket) in buckets.iter().enumerate() {
            for &n in bucket.iter() {
                let r = frozen.find(n).unwrap();
                assert_eq!(r.bucket_index, i as u32, "ngram {n}");
                assert_eq!(r.posting_index_offset, posting_index);
            }
            posting_index += bucket.len() as u32;
        }

        // Absent ngram resolves to the bucket it would lie in
        let r = frozen.find(4).unwrap();
        assert_eq!(r.bucket_index, 0);
    }

    #[test]
    fn test_empty_tree() {
        let frozen = Btree::bulk_load(&[], &[], 2);
        assert!(frozen.find(42).is_none());
    }

    #[test]
    fn test_bulk_load_single_bucket() {
        let frozen = Btree::bulk_load(&[10], &[3], 2);
        let r = frozen.find(11).unwrap();
        assert_eq!(r.bucket_index, 0);
        assert_eq!(r.posting_index_offset, 0);
    }
}
