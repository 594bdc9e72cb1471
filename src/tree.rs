//! Authenticated sparse Merkle tree over 256-bit keys (spec §3, §6 "Tree").
//!
//! Out of scope as a cryptographic protocol concern (spec §1), but — like
//! the chain and the object store — no published crate implements exactly
//! this shape, so it is hand-rolled here, the same way the teacher crate
//! hand-rolls `calculate_receipts_root`'s pairwise-hash Merkle tree instead
//! of pulling in a Patricia-trie crate for a simplified need.
//!
//! Internal nodes and leaves are content-addressed blobs in the
//! [`ObjectStore`], encoded so that a node's address is exactly the
//! canonical hash used to check inclusion evidence against; absent
//! subtrees are never materialized, represented instead by a precomputed
//! "empty hash" per depth, so a tree with a handful of entries costs
//! O(n · 256) node touches rather than 2^256.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::crypto::{Hash, sha256};
use crate::store::{ObjectStore, StoreError};

const DEPTH: usize = 256;
const LEAF_TAG: u8 = 0;
const INTERNAL_TAG: u8 = 1;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("corrupt tree node")]
    CorruptNode,
}

enum Node {
    Leaf { key: Hash, value_hash: Hash },
    Internal { left: Hash, right: Hash },
}

impl Node {
    fn encode(&self) -> Vec<u8> {
        match self {
            Node::Leaf { key, value_hash } => {
                let mut buf = Vec::with_capacity(65);
                buf.push(LEAF_TAG);
                buf.extend_from_slice(key);
                buf.extend_from_slice(value_hash);
                buf
            }
            Node::Internal { left, right } => {
                let mut buf = Vec::with_capacity(65);
                buf.push(INTERNAL_TAG);
                buf.extend_from_slice(left);
                buf.extend_from_slice(right);
                buf
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, TreeError> {
        if bytes.len() != 65 {
            return Err(TreeError::CorruptNode);
        }
        let a: Hash = bytes[1..33].try_into().map_err(|_| TreeError::CorruptNode)?;
        let b: Hash = bytes[33..65].try_into().map_err(|_| TreeError::CorruptNode)?;
        match bytes[0] {
            LEAF_TAG => Ok(Node::Leaf { key: a, value_hash: b }),
            INTERNAL_TAG => Ok(Node::Internal { left: a, right: b }),
            _ => Err(TreeError::CorruptNode),
        }
    }
}

fn leaf_hash(key: &Hash, value_hash: &Hash) -> Hash {
    sha256(&[&[LEAF_TAG], key, value_hash])
}

fn internal_hash(left: &Hash, right: &Hash) -> Hash {
    sha256(&[&[INTERNAL_TAG], left, right])
}

/// `empty_hashes()[d]` is the root hash of an empty subtree `d` levels
/// above the leaf level; `empty_hashes()[0]` is the "no leaf here" sentinel.
fn empty_hashes() -> &'static [Hash; DEPTH + 1] {
    static TABLE: OnceLock<[Hash; DEPTH + 1]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0u8; 32]; DEPTH + 1];
        for depth in 1..=DEPTH {
            table[depth] = internal_hash(&table[depth - 1], &table[depth - 1]);
        }
        table
    })
}

fn bit(key: &Hash, index: usize) -> bool {
    (key[index / 8] >> (7 - index % 8)) & 1 == 1
}

fn load_node(store: &dyn ObjectStore, hash: &Hash) -> Result<Option<Node>, TreeError> {
    let Some(bytes) = store.get(hash)? else {
        return Ok(None);
    };
    Node::decode(&bytes).map(Some)
}

fn store_node(store: &dyn ObjectStore, node: &Node) -> Result<Hash, TreeError> {
    Ok(store.put(&node.encode())?)
}

/// Sibling-hash inclusion path for one key, root to leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evidence {
    /// `siblings[d]` is the hash of the subtree NOT containing the key at
    /// depth `d` (0 = nearest the root, `DEPTH - 1` = nearest the leaf).
    pub siblings: Vec<Hash>,
    pub value_hash: Hash,
}

impl Evidence {
    /// Recompute the root implied by this evidence for `key` and check it
    /// against `expected_root`.
    pub fn verify(&self, key: &Hash, expected_root: &Hash) -> bool {
        if self.siblings.len() != DEPTH {
            return false;
        }
        let mut hash = leaf_hash(key, &self.value_hash);
        for depth in (0..DEPTH).rev() {
            let sibling = &self.siblings[depth];
            hash = if bit(key, depth) {
                internal_hash(sibling, &hash)
            } else {
                internal_hash(&hash, sibling)
            };
        }
        hash == *expected_root
    }
}

/// A built, queryable tree rooted at a known hash.
pub struct SparseTree {
    store: Arc<dyn ObjectStore>,
    root: Option<Hash>,
}

impl SparseTree {
    /// Reconstruct a handle onto an already-built tree from its root hash
    /// and the backing store (spec §4.5 step 3).
    pub fn from_root(store: Arc<dyn ObjectStore>, root: Option<Hash>) -> Self {
        Self { store, root }
    }

    pub fn root_hash(&self) -> Option<Hash> {
        self.root
    }

    /// Build a fresh tree from a complete key→value-blob map, storing both
    /// the ciphertext blobs and the tree's internal nodes in `store` (spec
    /// §4.4 step 4). Empty `entries` yields `root_hash() == None` (spec's
    /// `mtr_hash = null`).
    pub fn build(store: Arc<dyn ObjectStore>, entries: &BTreeMap<Hash, Vec<u8>>) -> Result<Self, TreeError> {
        if entries.is_empty() {
            return Ok(Self { store, root: None });
        }

        let mut leaves: Vec<(Hash, Hash)> = Vec::with_capacity(entries.len());
        for (key, blob) in entries {
            let value_hash = store.put(blob)?;
            leaves.push((*key, value_hash));
        }
        leaves.sort_by_key(|(k, _)| *k);

        let root = build_subtree(store.as_ref(), 0, &leaves)?;
        Ok(Self { store, root: Some(root) })
    }

    pub fn lookup(&self, key: &Hash) -> Result<Option<Vec<u8>>, TreeError> {
        let Some(root) = self.root else { return Ok(None) };
        let Some(value_hash) = walk(self.store.as_ref(), root, key, 0)? else {
            return Ok(None);
        };
        Ok(self.store.get(&value_hash)?)
    }

    /// Produce the inclusion evidence for `key` plus its stored blob (spec
    /// §4.6): a sibling-hash path from root to leaf and the leaf's blob.
    pub fn evidence(&self, key: &Hash) -> Result<Option<(Evidence, Vec<u8>)>, TreeError> {
        let Some(root) = self.root else { return Ok(None) };
        let mut siblings = vec![[0u8; 32]; DEPTH];
        let Some(value_hash) = collect_evidence(self.store.as_ref(), root, key, 0, &mut siblings)?
        else {
            return Ok(None);
        };
        let Some(blob) = self.store.get(&value_hash)? else {
            return Ok(None);
        };
        Ok(Some((Evidence { siblings, value_hash }, blob)))
    }
}

fn build_subtree(store: &dyn ObjectStore, depth: usize, leaves: &[(Hash, Hash)]) -> Result<Hash, TreeError> {
    if leaves.is_empty() {
        return Ok(empty_hashes()[DEPTH - depth]);
    }
    if depth == DEPTH {
        let (key, value_hash) = leaves[0];
        return store_node(store, &Node::Leaf { key, value_hash });
    }

    let split = leaves.partition_point(|(k, _)| !bit(k, depth));
    let (left_leaves, right_leaves) = leaves.split_at(split);
    let left = build_subtree(store, depth + 1, left_leaves)?;
    let right = build_subtree(store, depth + 1, right_leaves)?;
    store_node(store, &Node::Internal { left, right })
}

fn walk(store: &dyn ObjectStore, node_hash: Hash, key: &Hash, depth: usize) -> Result<Option<Hash>, TreeError> {
    if node_hash == empty_hashes()[DEPTH - depth] {
        return Ok(None);
    }
    let Some(node) = load_node(store, &node_hash)? else { return Ok(None) };
    match node {
        Node::Leaf { key: leaf_key, value_hash } => {
            if leaf_key == *key { Ok(Some(value_hash)) } else { Ok(None) }
        }
        Node::Internal { left, right } => {
            let next = if bit(key, depth) { right } else { left };
            walk(store, next, key, depth + 1)
        }
    }
}

fn collect_evidence(
    store: &dyn ObjectStore,
    node_hash: Hash,
    key: &Hash,
    depth: usize,
    siblings: &mut [Hash],
) -> Result<Option<Hash>, TreeError> {
    if node_hash == empty_hashes()[DEPTH - depth] {
        return Ok(None);
    }
    let Some(node) = load_node(store, &node_hash)? else { return Ok(None) };
    match node {
        Node::Leaf { key: leaf_key, value_hash } => {
            if leaf_key == *key { Ok(Some(value_hash)) } else { Ok(None) }
        }
        Node::Internal { left, right } => {
            let (next, sibling) = if bit(key, depth) { (right, left) } else { (left, right) };
            siblings[depth] = sibling;
            collect_evidence(store, next, key, depth + 1, siblings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn key_of(label: &[u8]) -> Hash {
        sha256(&[label])
    }

    #[test]
    fn empty_tree_has_no_root() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemStore::new());
        let tree = SparseTree::build(store, &BTreeMap::new()).unwrap();
        assert_eq!(tree.root_hash(), None);
    }

    #[test]
    fn insert_lookup_and_evidence_roundtrip() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemStore::new());
        let mut entries = BTreeMap::new();
        entries.insert(key_of(b"a"), b"value-a".to_vec());
        entries.insert(key_of(b"b"), b"value-b".to_vec());
        entries.insert(key_of(b"c"), b"value-c".to_vec());
        let tree = SparseTree::build(store.clone(), &entries).unwrap();
        let root = tree.root_hash().unwrap();

        assert_eq!(tree.lookup(&key_of(b"a")).unwrap().unwrap(), b"value-a");
        assert!(tree.lookup(&key_of(b"missing")).unwrap().is_none());

        let (evidence, blob) = tree.evidence(&key_of(b"b")).unwrap().unwrap();
        assert_eq!(blob, b"value-b");
        assert!(evidence.verify(&key_of(b"b"), &root));
        assert!(!evidence.verify(&key_of(b"a"), &root));

        let reopened = SparseTree::from_root(store, Some(root));
        assert_eq!(reopened.lookup(&key_of(b"c")).unwrap().unwrap(), b"value-c");
    }

    #[test]
    fn tampering_with_a_sibling_breaks_verification() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemStore::new());
        let mut entries = BTreeMap::new();
        entries.insert(key_of(b"a"), b"value-a".to_vec());
        entries.insert(key_of(b"b"), b"value-b".to_vec());
        let tree = SparseTree::build(store, &entries).unwrap();
        let root = tree.root_hash().unwrap();
        let (mut evidence, _) = tree.evidence(&key_of(b"a")).unwrap().unwrap();
        evidence.siblings[10][0] ^= 1;
        assert!(!evidence.verify(&key_of(b"a"), &root));
    }
}
