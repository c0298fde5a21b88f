//! End-to-end hashing over a fabricated on-disk archive.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use larch_archive::{
    bundle::{write_bundle, LogEntry},
    error::ArchiveError,
    hash::{compute_packages, compute_proofs, load_package_hashes},
    info::PackageInfo,
    layout::InfoName,
    merkle::{self, Hash},
    ArchiveParams,
};
use std::path::Path;

fn entry(leaf: &[u8]) -> LogEntry {
    LogEntry {
        leaf_input: STANDARD.encode(leaf),
        extra_data: STANDARD.encode(b"chain"),
    }
}

fn leaf_hashes(leaves: &[&[u8]]) -> Vec<Hash> {
    leaves.iter().map(|leaf| merkle::leaf_hash(leaf)).collect()
}

fn read_info(pkg_root: &Path, package: u64, tree_size: u64) -> PackageInfo {
    PackageInfo::read(
        pkg_root,
        &InfoName {
            package,
            tree_size,
        },
    )
    .expect("info file exists")
}

#[test]
fn single_entry_tree() -> Result<(), ArchiveError> {
    let params = ArchiveParams::new(4, 2)?;
    let dir = tempfile::tempdir()?;
    let leaf: &[u8] = &[0x01, 0x02, 0x03];
    write_bundle(&dir.path().join("000"), 0, &[entry(leaf)])?;

    compute_packages(dir.path(), 0, 0, 1, &params, Some(1))?;
    let root = compute_proofs(dir.path(), 1, 0, 0)?;

    // A one-entry tree's root is the leaf hash itself.
    assert_eq!(root, merkle::leaf_hash(leaf));
    let info = read_info(dir.path(), 0, 1);
    assert_eq!(info.pkg_hash_bytes()?, root);
    assert!(info.merkle_proof.is_empty());
    Ok(())
}

#[test]
fn two_entries_in_one_bundle() -> Result<(), ArchiveError> {
    let params = ArchiveParams::new(4, 2)?;
    let dir = tempfile::tempdir()?;
    write_bundle(
        &dir.path().join("000"),
        0,
        &[entry(&[0x00]), entry(&[0xFF])],
    )?;

    compute_packages(dir.path(), 0, 0, 2, &params, Some(1))?;
    let root = compute_proofs(dir.path(), 2, 0, 0)?;

    let hashes = leaf_hashes(&[&[0x00], &[0xFF]]);
    assert_eq!(root, merkle::node_hash(&hashes[0], &hashes[1]));
    assert_eq!(read_info(dir.path(), 0, 2).pkg_hash_bytes()?, root);
    Ok(())
}

#[test]
fn partial_tail_bundle_splits_per_rfc6962() -> Result<(), ArchiveError> {
    let params = ArchiveParams::new(4, 2)?;
    let dir = tempfile::tempdir()?;
    write_bundle(
        &dir.path().join("000"),
        0,
        &[entry(&[0]), entry(&[1]), entry(&[2])],
    )?;

    compute_packages(dir.path(), 0, 0, 3, &params, Some(1))?;
    let root = compute_proofs(dir.path(), 3, 0, 0)?;

    // MTH over three leaves: H(H(L0, L1), L2).
    let hashes = leaf_hashes(&[&[0], &[1], &[2]]);
    let expected = merkle::node_hash(&merkle::node_hash(&hashes[0], &hashes[1]), &hashes[2]);
    assert_eq!(root, expected);
    Ok(())
}

#[test]
fn two_packages_with_proofs() -> Result<(), ArchiveError> {
    // One four-entry bundle per package: package 0 holds entries 0..4 and
    // package 1 holds the single tail entry.
    let params = ArchiveParams::new(4, 1)?;
    let tree_size = 5;
    let dir = tempfile::tempdir()?;
    let leaves: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i, i + 10]).collect();

    write_bundle(
        &dir.path().join("000"),
        0,
        &leaves[..4].iter().map(|leaf| entry(leaf)).collect::<Vec<_>>(),
    )?;
    write_bundle(&dir.path().join("001"), 4, &[entry(&leaves[4])])?;

    compute_packages(dir.path(), 0, 1, tree_size, &params, Some(2))?;
    let root = compute_proofs(dir.path(), tree_size, 0, 1)?;

    let leaf_hash_list: Vec<Hash> = leaves.iter().map(|leaf| merkle::leaf_hash(leaf)).collect();
    let pkg_hash_0 = merkle::tree_root(&leaf_hash_list[..4]);
    let pkg_hash_1 = leaf_hash_list[4];
    assert_eq!(root, merkle::node_hash(&pkg_hash_0, &pkg_hash_1));

    // The global root over package hashes equals the MTH over all leaves
    // in index order, because packages sit on power-of-two boundaries.
    assert_eq!(root, merkle::tree_root(&leaf_hash_list));

    let info_0 = read_info(dir.path(), 0, tree_size);
    let info_1 = read_info(dir.path(), 1, tree_size);
    assert_eq!(info_0.pkg_hash_bytes()?, pkg_hash_0);
    assert_eq!(info_1.pkg_hash_bytes()?, pkg_hash_1);
    assert_eq!(info_0.proof_bytes()?, vec![pkg_hash_1]);
    assert_eq!(info_1.proof_bytes()?, vec![pkg_hash_0]);

    // Each audit path folds back to the root.
    for (package, info) in [(0u64, &info_0), (1, &info_1)] {
        let folded = merkle::verify_inclusion(
            &info.pkg_hash_bytes()?,
            package,
            2,
            &info.proof_bytes()?,
        )
        .expect("path fits the tree");
        assert_eq!(folded, root);
    }

    assert_eq!(
        load_package_hashes(dir.path(), tree_size)?,
        vec![pkg_hash_0, pkg_hash_1]
    );
    Ok(())
}

#[test]
fn superseded_partial_bundles_are_ignored() -> Result<(), ArchiveError> {
    let params = ArchiveParams::new(4, 2)?;
    let dir = tempfile::tempdir()?;
    let leaves: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i]).collect();

    // A crash left a two-entry bundle; the rerun wrote the full one.
    write_bundle(
        &dir.path().join("000"),
        0,
        &leaves[..2].iter().map(|leaf| entry(leaf)).collect::<Vec<_>>(),
    )?;
    write_bundle(
        &dir.path().join("000"),
        0,
        &leaves.iter().map(|leaf| entry(leaf)).collect::<Vec<_>>(),
    )?;

    compute_packages(dir.path(), 0, 0, 4, &params, Some(1))?;
    let root = compute_proofs(dir.path(), 4, 0, 0)?;

    let leaf_hash_list: Vec<Hash> = leaves.iter().map(|leaf| merkle::leaf_hash(leaf)).collect();
    assert_eq!(root, merkle::tree_root(&leaf_hash_list));
    Ok(())
}

#[test]
fn a_gap_between_bundles_is_an_error() -> Result<(), ArchiveError> {
    let params = ArchiveParams::new(4, 2)?;
    let dir = tempfile::tempdir()?;
    write_bundle(
        &dir.path().join("000"),
        4,
        &[entry(&[4]), entry(&[5]), entry(&[6]), entry(&[7])],
    )?;

    let outcome = compute_packages(dir.path(), 0, 0, 8, &params, Some(1));
    assert!(matches!(
        outcome,
        Err(ArchiveError::BundleGap {
            expected: 0,
            actual: 4
        })
    ));
    Ok(())
}
