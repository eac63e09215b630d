//! fixed-depth, append-only merkle accumulator of note commitments.
//!
//! mirrors the on-chain accumulator byte-for-byte: same hasher
//! (`field_hash::mimc_hash2`), same zero-subtree values, same
//! insertion algorithm. See SPEC_FULL.md §4.2.

use std::collections::VecDeque;

use field_hash::{mimc_hash2, Fr};
use thiserror::Error;

/// production tree depth: capacity 2^20 leaves.
pub const DEFAULT_DEPTH: usize = 20;
/// production historical-root ring size.
pub const DEFAULT_HISTORY: usize = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree is at capacity (2^{0} leaves)")]
    CapacityExceeded(usize),
    #[error("leaf index {0} not found (tree holds {1} leaves)")]
    NotFound(u64, u64),
}

pub type Result<T> = std::result::Result<T, MerkleError>;

pub type LeafIndex = u64;

/// a merkle authentication path: sibling values and left/right indicators
/// from leaf to root, plus the root it was produced against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    /// sibling hash at each level, leaf to root.
    pub path_elements: Vec<Fr>,
    /// `false` = node is the left child at that level, `true` = right child.
    pub path_indices: Vec<bool>,
    pub root: Fr,
}

impl MerklePath {
    /// fold the path from `leaf` up and check it reaches `self.root`
    /// (spec.md §8 property P2).
    pub fn verify(&self, leaf: Fr) -> bool {
        let mut current = leaf;
        for (sibling, is_right) in self.path_elements.iter().zip(self.path_indices.iter()) {
            current = if *is_right {
                mimc_hash2(*sibling, current)
            } else {
                mimc_hash2(current, *sibling)
            };
        }
        current == self.root
    }
}

/// an incremental (append-only) binary merkle tree over `mimc_hash2`.
///
/// `Clone` is used by the indexer's reorg guard to snapshot a pool before
/// applying each block's events, rather than attempting to un-insert
/// leaves from an accumulator whose append-only-ness is an invariant
/// (I2/I3), not an implementation detail.
#[derive(Clone)]
pub struct IncrementalTree {
    depth: usize,
    history_cap: usize,
    /// `zero[i]` is the root of an empty subtree of height `i`.
    zero: Vec<Fr>,
    /// all inserted leaves, in insertion order.
    leaves: Vec<Fr>,
    /// `filled_subtrees[i]` caches the left-hand value at level `i` the
    /// last time a right-hand insert consumed it — the standard O(depth)
    /// incremental-root algorithm (spec.md §4.2).
    filled_subtrees: Vec<Fr>,
    current_root: Fr,
    /// most recent `history_cap` roots, newest last.
    history: VecDeque<Fr>,
}

impl IncrementalTree {
    pub fn new(depth: usize, history_cap: usize) -> Self {
        let mut zero = Vec::with_capacity(depth + 1);
        zero.push(Fr::zero());
        for i in 0..depth {
            let z = zero[i];
            zero.push(mimc_hash2(z, z));
        }
        let current_root = zero[depth];
        let mut history = VecDeque::with_capacity(history_cap);
        history.push_back(current_root);

        Self {
            depth,
            history_cap,
            zero,
            leaves: Vec::new(),
            filled_subtrees: vec![Fr::zero(); depth],
            current_root,
            history,
        }
    }

    /// a tree sized for production use (`D=20`, `R=30`).
    pub fn production() -> Self {
        Self::new(DEFAULT_DEPTH, DEFAULT_HISTORY)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn root(&self) -> Fr {
        self.current_root
    }

    /// zero-subtree values `Z[0..=depth]`, exposed for tests and for
    /// callers who need to reconstruct the reference recursive hash (P1).
    pub fn zero_values(&self) -> &[Fr] {
        &self.zero
    }

    /// append a leaf, returning its assigned index.
    pub fn insert(&mut self, leaf: Fr) -> Result<LeafIndex> {
        let index = self.leaves.len() as u64;
        if index >= self.capacity() {
            return Err(MerkleError::CapacityExceeded(self.depth));
        }

        self.leaves.push(leaf);

        let mut current = leaf;
        let mut idx = index;
        for level in 0..self.depth {
            if idx & 1 == 0 {
                self.filled_subtrees[level] = current;
                current = mimc_hash2(current, self.zero[level]);
            } else {
                current = mimc_hash2(self.filled_subtrees[level], current);
            }
            idx >>= 1;
        }

        self.current_root = current;
        self.push_historical(current);
        Ok(index)
    }

    fn push_historical(&mut self, root: Fr) {
        if self.history.len() == self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(root);
    }

    /// `true` if `r` is the current root or among the most recent
    /// `history_cap` roots (spec.md I5 / P3).
    pub fn is_known_root(&self, r: Fr) -> bool {
        r == self.current_root || self.history.iter().any(|h| *h == r)
    }

    /// full node value at `(level, index)` within the tree as it stands
    /// right now, padding with the zero-subtree value past the filled
    /// region — used by `path` to serve an authentication path against
    /// the *current* root even for leaves inserted long ago.
    fn node_at(&self, level: usize, index: usize, layers: &[Vec<Fr>]) -> Fr {
        layers[level].get(index).copied().unwrap_or(self.zero[level])
    }

    /// rebuild the full layer structure from `leaves`. O(n) in the leaf
    /// count; mirrors the "keep the full tree in memory" option spec.md
    /// §4.2 allows, invalidated and recomputed fresh for every `path`
    /// call the same way the sibling `StateCommitmentTree` recomputes
    /// its cache after each mutation.
    fn layers(&self) -> Vec<Vec<Fr>> {
        let mut layers = Vec::with_capacity(self.depth + 1);
        layers.push(self.leaves.clone());
        for level in 0..self.depth {
            let cur = &layers[level];
            let mut next = Vec::with_capacity(cur.len().div_ceil(2));
            let mut i = 0;
            while i < cur.len() {
                let left = cur[i];
                let right = cur.get(i + 1).copied().unwrap_or(self.zero[level]);
                next.push(mimc_hash2(left, right));
                i += 2;
            }
            layers.push(next);
        }
        layers
    }

    /// authentication path for `leaf_index`, verified against the
    /// *current* root (spec.md §4.2 edge case: a path for an index whose
    /// root is no longer in history is still served).
    pub fn path(&self, leaf_index: LeafIndex) -> Result<MerklePath> {
        if leaf_index >= self.len() {
            return Err(MerkleError::NotFound(leaf_index, self.len()));
        }

        let layers = self.layers();
        let mut idx = leaf_index as usize;
        let mut path_elements = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);

        for level in 0..self.depth {
            let is_right = idx & 1 == 1;
            let sibling_index = idx ^ 1;
            path_elements.push(self.node_at(level, sibling_index, &layers));
            path_indices.push(is_right);
            idx >>= 1;
        }

        Ok(MerklePath {
            path_elements,
            path_indices,
            root: self.current_root,
        })
    }
}

/// reference recursive hash from spec.md §8 property P1, used by tests to
/// cross-check the incremental algorithm against a naive definition.
pub fn reference_root(depth: usize, leaves: &[Fr], zero: &[Fr]) -> Fr {
    fn h(level: usize, index: usize, leaves: &[Fr], zero: &[Fr]) -> Fr {
        if level == 0 {
            return leaves.get(index).copied().unwrap_or(zero[0]);
        }
        let left = h(level - 1, index * 2, leaves, zero);
        let right = h(level - 1, index * 2 + 1, leaves, zero);
        mimc_hash2(left, right)
    }
    h(depth, 0, leaves, zero)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_root_is_top_zero_subtree() {
        let tree = IncrementalTree::new(4, 30);
        assert_eq!(tree.root(), tree.zero_values()[4]);
    }

    /// spec.md §8 vector 2.
    #[test]
    fn single_insert_matches_hand_derivation() {
        let mut tree = IncrementalTree::new(4, 30);
        let leaf = Fr::from_u64(7);
        let idx = tree.insert(leaf).unwrap();
        assert_eq!(idx, 0);

        let z = tree.zero_values().to_vec();
        let expected = mimc_hash2(
            mimc_hash2(mimc_hash2(mimc_hash2(leaf, z[0]), z[1]), z[2]),
            z[3],
        );
        assert_eq!(tree.root(), expected);
    }

    /// spec.md §8 vector 3.
    #[test]
    fn path_matches_hand_derivation() {
        let mut tree = IncrementalTree::new(3, 30);
        let leaves = [10u64, 20, 30, 40].map(Fr::from_u64);
        for l in leaves {
            tree.insert(l).unwrap();
        }

        let path = tree.path(2).unwrap();
        let z = tree.zero_values().to_vec();
        assert_eq!(
            path.path_elements,
            vec![leaves[3], mimc_hash2(leaves[0], leaves[1]), z[2]]
        );
        assert_eq!(path.path_indices, vec![false, true, false]);
        assert!(path.verify(leaves[2]));
    }

    #[test]
    fn path_rejects_out_of_range_index() {
        let tree = IncrementalTree::new(4, 30);
        assert!(matches!(tree.path(0), Err(MerkleError::NotFound(0, 0))));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut tree = IncrementalTree::new(2, 30);
        for i in 0..4 {
            tree.insert(Fr::from_u64(i)).unwrap();
        }
        assert!(matches!(
            tree.insert(Fr::from_u64(99)),
            Err(MerkleError::CapacityExceeded(2))
        ));
    }

    /// spec.md §8 vector 4 / property P3.
    #[test]
    fn historical_root_ring_evicts_oldest() {
        let history = 3;
        let mut tree = IncrementalTree::new(10, history);
        let mut roots = Vec::new();
        for i in 0..(history as u64 + 1) {
            tree.insert(Fr::from_u64(i)).unwrap();
            roots.push(tree.root());
        }
        // current root and the last `history` roots are known...
        assert!(tree.is_known_root(roots[roots.len() - 1]));
        for r in &roots[roots.len() - history..] {
            assert!(tree.is_known_root(*r));
        }
        // ...but the (history+1)-th-oldest is not.
        assert!(!tree.is_known_root(roots[0]));
    }

    use proptest::prelude::any;

    proptest::proptest! {
        #[test]
        fn root_matches_reference_hash(leaves in proptest::collection::vec(any::<u64>(), 0..20)) {
            let depth = 6;
            let mut tree = IncrementalTree::new(depth, 30);
            let mut fr_leaves = Vec::new();
            for l in &leaves {
                let fr = Fr::from_u64(*l);
                tree.insert(fr).unwrap();
                fr_leaves.push(fr);
            }
            let expected = reference_root(depth, &fr_leaves, tree.zero_values());
            prop_assert_eq!(tree.root(), expected);
        }

        #[test]
        fn every_inserted_leaf_has_a_verifying_path(leaves in proptest::collection::vec(any::<u64>(), 1..20)) {
            let depth = 6;
            let mut tree = IncrementalTree::new(depth, 30);
            let mut fr_leaves = Vec::new();
            for l in &leaves {
                let fr = Fr::from_u64(*l);
                tree.insert(fr).unwrap();
                fr_leaves.push(fr);
            }
            for (i, leaf) in fr_leaves.iter().enumerate() {
                let path = tree.path(i as u64).unwrap();
                prop_assert!(path.verify(*leaf));
            }
        }
    }
}
