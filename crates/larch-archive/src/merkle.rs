//! Merkle tree hashing per [RFC 6962 §2.1](https://www.rfc-editor.org/rfc/rfc6962#section-2.1).
//!
//! The tree is the specific unbalanced binary tree the RFC defines: a node
//! over `n` children splits at the largest power of two strictly below
//! `n`. Leaf and interior hashes live in separate domains through their
//! one-byte prefixes.

use crate::error::ArchiveError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

/// A SHA-256 tree node.
pub type Hash = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash one entry's `leaf_input` bytes into its leaf node.
pub fn leaf_hash(leaf_input: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(leaf_input);
    hasher.finalize().into()
}

/// Hash two child nodes into their parent.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Merkle tree hash over already-hashed nodes.
///
/// Splits at the largest power of two below the node count, which keeps
/// the result correct for counts that are not powers of two — the partial
/// tail bundle of a log view hashes this way too.
pub fn tree_root(nodes: &[Hash]) -> Hash {
    match nodes {
        [] => Sha256::digest(b"").into(),
        [node] => *node,
        _ => {
            let (left, right) = nodes.split_at(split_point(nodes.len()));
            node_hash(&tree_root(left), &tree_root(right))
        }
    }
}

/// Largest power of two strictly below `count`. `count` must be ≥ 2.
fn split_point(count: usize) -> usize {
    1 << (count - 1).ilog2()
}

/// The root over `nodes` plus one audit path per requested position.
///
/// Works level by level: nodes pair left to right and an odd tail carries
/// up unchanged, which builds the same left-balanced tree as [`tree_root`]
/// (complete levels on the left never leave an element unpaired, so the
/// carried tail merges exactly at the RFC split boundary). At every level
/// each target's sibling, when it has one, joins that target's path.
pub fn inclusion_proofs(nodes: &[Hash], targets: &[u64]) -> (Hash, Vec<Vec<Hash>>) {
    let mut proofs = vec![Vec::new(); targets.len()];
    if nodes.is_empty() {
        return (Sha256::digest(b"").into(), proofs);
    }

    let mut positions: Vec<usize> = targets.iter().map(|&target| target as usize).collect();
    let mut level = nodes.to_vec();
    while level.len() > 1 {
        for (position, proof) in positions.iter_mut().zip(&mut proofs) {
            let sibling = *position ^ 1;
            if sibling < level.len() {
                proof.push(level[sibling]);
            }
            *position /= 2;
        }

        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut pairs = level.chunks_exact(2);
        for pair in &mut pairs {
            next.push(node_hash(&pair[0], &pair[1]));
        }
        if let [tail] = pairs.remainder() {
            next.push(*tail);
        }
        level = next;
    }
    (level[0], proofs)
}

/// Fold an audit path from the node at `index` back up to the root of a
/// tree over `count` nodes. `None` if the path length does not fit the
/// tree shape.
pub fn verify_inclusion(node: &Hash, index: u64, count: u64, proof: &[Hash]) -> Option<Hash> {
    let mut current = *node;
    let mut position = index;
    let mut width = count;
    let mut path = proof.iter();
    while width > 1 {
        if position ^ 1 < width {
            let sibling = path.next()?;
            current = if position % 2 == 0 {
                node_hash(&current, sibling)
            } else {
                node_hash(sibling, &current)
            };
        }
        position /= 2;
        width = width / 2 + width % 2;
    }
    path.next().is_none().then_some(current)
}

/// Decode a base64 hash field into a [`Hash`].
pub fn decode_hash(encoded: &str) -> Result<Hash, ArchiveError> {
    let bytes = BASE64.decode(encoded)?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| ArchiveError::HashLength(bytes.len()))
}
