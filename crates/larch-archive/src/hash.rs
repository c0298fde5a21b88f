//! Hash packages and link them to the signed tree head.

use crate::{
    bundle,
    error::ArchiveError,
    info::PackageInfo,
    layout::{self, InfoName},
    merkle::{self, Hash},
    params::ArchiveParams,
};
use log::info;
use rayon::prelude::*;
use std::path::Path;

const HASH_TARGET: &str = "larch_archive::hash";

fn worker_pool(workers: Option<usize>) -> Result<rayon::ThreadPool, ArchiveError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(0))
        .build()?)
}

/// Hash every package in `start_package..=last_package` at `tree_size` and
/// write each one's proof-less info file.
///
/// Packages are independent jobs; a failing package aborts the stage.
pub fn compute_packages(
    pkg_root_dir: &Path,
    start_package: u64,
    last_package: u64,
    tree_size: u64,
    params: &ArchiveParams,
    workers: Option<usize>,
) -> Result<(), ArchiveError> {
    let pool = worker_pool(workers)?;
    pool.install(|| {
        (start_package..=last_package)
            .into_par_iter()
            .try_for_each(|package| compute_package(pkg_root_dir, package, tree_size, params))
    })
}

/// Reduce one package to its Merkle root: leaf hashes per bundle, bundle
/// roots, then the package root over those.
fn compute_package(
    pkg_root_dir: &Path,
    package: u64,
    tree_size: u64,
    params: &ArchiveParams,
) -> Result<(), ArchiveError> {
    info!(target: HASH_TARGET, "hashing package {package}");
    let package_dir = pkg_root_dir.join(layout::package_name(package));
    let bundles = layout::canonical_bundles(&package_dir, tree_size)?;
    if bundles.is_empty() {
        return Err(ArchiveError::PackageEmpty(package));
    }

    let mut expected = package * params.entries_per_package();
    let mut bundle_roots = Vec::with_capacity(bundles.len());
    for name in &bundles {
        if name.start != expected {
            return Err(ArchiveError::BundleGap {
                expected,
                actual: name.start,
            });
        }
        let path = package_dir.join(name.file_name());
        let entries = bundle::read_bundle(&path)?;
        if entries.len() as u64 != name.count() {
            return Err(ArchiveError::BundleEntryCount {
                path,
                expected: name.count(),
                actual: entries.len() as u64,
            });
        }

        let mut leaves = Vec::with_capacity(entries.len());
        for entry in &entries {
            leaves.push(merkle::leaf_hash(&entry.leaf_bytes()?));
        }
        bundle_roots.push(merkle::tree_root(&leaves));
        expected = name.end + 1;
    }

    let pkg_hash = merkle::tree_root(&bundle_roots);
    PackageInfo::new(pkg_hash).write(
        pkg_root_dir,
        &InfoName {
            package,
            tree_size,
        },
    )
}

/// Package hashes `0..=last` as selected at `tree_size`, in package order.
pub fn load_package_hashes(
    pkg_root_dir: &Path,
    tree_size: u64,
) -> Result<Vec<Hash>, ArchiveError> {
    let selected = layout::info_files_at(pkg_root_dir, tree_size)?;
    let mut hashes = Vec::with_capacity(selected.len());
    for (position, name) in selected.iter().enumerate() {
        if name.package != position as u64 {
            return Err(ArchiveError::MissingPackageInfo(position as u64));
        }
        hashes.push(PackageInfo::read(pkg_root_dir, name)?.pkg_hash_bytes()?);
    }
    Ok(hashes)
}

/// Compute the global root over every package hash and rewrite the info
/// files of `start_package..=last_package` with their audit paths.
///
/// Returns the root so the caller can hold it against the signed tree
/// head before anything gets packaged.
pub fn compute_proofs(
    pkg_root_dir: &Path,
    tree_size: u64,
    start_package: u64,
    last_package: u64,
) -> Result<Hash, ArchiveError> {
    let hashes = load_package_hashes(pkg_root_dir, tree_size)?;
    if (hashes.len() as u64) <= last_package {
        return Err(ArchiveError::MissingPackageInfo(hashes.len() as u64));
    }
    if hashes.len() as u64 > last_package + 1 {
        return Err(ArchiveError::StrayPackageInfo {
            found: hashes.len() as u64 - 1,
            last: last_package,
        });
    }

    let targets: Vec<u64> = (start_package..=last_package).collect();
    let (root, proofs) = merkle::inclusion_proofs(&hashes, &targets);
    for (package, proof) in targets.into_iter().zip(proofs) {
        let name = InfoName {
            package,
            tree_size,
        };
        let mut package_info = PackageInfo::read(pkg_root_dir, &name)?;
        package_info.set_proof(&proof);
        package_info.write(pkg_root_dir, &name)?;
    }
    info!(
        target: HASH_TARGET,
        "proofs written for packages {start_package}..={last_package}"
    );
    Ok(root)
}
