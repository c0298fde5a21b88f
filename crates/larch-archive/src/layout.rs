//! Deterministic names and directories for everything the archiver writes.
//!
//! All artifacts are addressed by fixed-width, zero-padded decimal names so
//! that lexicographic order coincides with numeric order and resume
//! discovery can work from a directory listing alone. Parsing is strict:
//! a name either matches its fixed-width shape exactly or is not ours and
//! gets ignored.

use crate::params::ArchiveParams;
use itertools::Itertools;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Parsed `SSSSSSSSSS-EEEEEEEEEE.json.gz` bundle file name.
///
/// `start` and `end` are entry indexes, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BundleName {
    pub start: u64,
    pub end: u64,
}

impl BundleName {
    /// Number of entries the bundle holds.
    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn file_name(&self) -> String {
        bundle_file_name(self.start, self.end)
    }

    /// Strict parse of a bundle file name; `None` for anything else.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".json.gz")?;
        if stem.len() != 21 || stem.as_bytes()[10] != b'-' {
            return None;
        }
        let start = fixed_decimal(&stem[..10])?;
        let end = fixed_decimal(&stem[11..])?;
        (start <= end).then_some(Self { start, end })
    }
}

/// Parsed `NNN-TTTTTTTTTT.info` package info file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InfoName {
    pub package: u64,
    pub tree_size: u64,
}

impl InfoName {
    pub fn file_name(&self) -> String {
        info_file_name(self.package, self.tree_size)
    }

    /// Strict parse of an info file name; `None` for anything else.
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".info")?;
        let (package, tree_size) = stem.split_once('-')?;
        if package.len() < 3 || tree_size.len() != 10 {
            return None;
        }
        Some(Self {
            package: fixed_decimal(package)?,
            tree_size: fixed_decimal(tree_size)?,
        })
    }
}

fn fixed_decimal(text: &str) -> Option<u64> {
    text.bytes()
        .all(|byte| byte.is_ascii_digit())
        .then(|| text.parse().ok())
        .flatten()
}

pub fn bundle_file_name(start: u64, end: u64) -> String {
    format!("{start:010}-{end:010}.json.gz")
}

/// Package directory name. The width grows past three digits on its own
/// for logs larger than a thousand packages.
pub fn package_name(package: u64) -> String {
    format!("{package:03}")
}

/// Package directory names are all-digit and at least three wide.
pub fn parse_package_name(name: &str) -> Option<u64> {
    (name.len() >= 3).then(|| fixed_decimal(name)).flatten()
}

pub fn sth_file_name(tree_size: u64) -> String {
    format!("sth-{tree_size:010}.json")
}

pub fn info_file_name(package: u64, tree_size: u64) -> String {
    format!("{package:03}-{tree_size:010}.info")
}

/// Split a schemeless log URL (`ct.example.net/2025h2`) into the host name
/// and its path segments.
pub fn parse_log_url(url: &str) -> (String, Vec<String>) {
    match url.split_once('/') {
        Some((host, path)) => (
            host.to_owned(),
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        ),
        None => (url.to_owned(), Vec::new()),
    }
}

/// `host_segment_segment`, the directory and artifact name for a log.
pub fn log_name(host: &str, path: &[String]) -> String {
    let mut name = host.to_owned();
    for segment in path {
        name.push('_');
        name.push_str(segment);
    }
    name
}

pub fn log_name_for_url(url: &str) -> String {
    let (host, path) = parse_log_url(url);
    log_name(&host, &path)
}

/// Directory holding every package of the log at `url`.
pub fn package_root_dir(root_dir: &Path, url: &str) -> PathBuf {
    root_dir.join(log_name_for_url(url))
}

/// Directory of the package holding `entry_index`.
pub fn package_dir_for_entry(
    pkg_root_dir: &Path,
    entry_index: u64,
    params: &ArchiveParams,
) -> PathBuf {
    pkg_root_dir.join(package_name(params.package_for_entry(entry_index)))
}

/// Package numbers present under `pkg_root_dir`, sorted numerically.
pub fn package_dirs(pkg_root_dir: &Path) -> io::Result<Vec<u64>> {
    let mut packages = Vec::new();
    for entry in fs::read_dir(pkg_root_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(package) = entry.file_name().to_str().and_then(parse_package_name) {
            packages.push(package);
        }
    }
    packages.sort_unstable();
    Ok(packages)
}

/// The canonical bundles of one package directory at `tree_size`.
///
/// A partial bundle that was later overwritten by a longer one with the
/// same start index stays on disk; only the longest bundle per start index
/// that still fits under `tree_size` counts. Returned sorted by start.
pub fn canonical_bundles(package_dir: &Path, tree_size: u64) -> io::Result<Vec<BundleName>> {
    let mut bundles = Vec::new();
    for entry in fs::read_dir(package_dir)? {
        let entry = entry?;
        if let Some(bundle) = entry.file_name().to_str().and_then(BundleName::parse) {
            if bundle.end < tree_size {
                bundles.push(bundle);
            }
        }
    }
    bundles.sort_unstable();
    let groups = bundles.into_iter().group_by(|bundle| bundle.start);
    let canonical = groups
        .into_iter()
        .filter_map(|(_, group)| group.last())
        .collect();
    Ok(canonical)
}

/// Canonical bundles with no tree size bound, for resume discovery.
pub fn all_canonical_bundles(package_dir: &Path) -> io::Result<Vec<BundleName>> {
    canonical_bundles(package_dir, u64::MAX)
}

/// Per package, the most recent info file whose encoded tree size does not
/// exceed `tree_size`. Returned sorted by package number.
pub fn info_files_at(pkg_root_dir: &Path, tree_size: u64) -> io::Result<Vec<InfoName>> {
    let mut infos = Vec::new();
    for entry in fs::read_dir(pkg_root_dir)? {
        let entry = entry?;
        if let Some(info) = entry.file_name().to_str().and_then(InfoName::parse) {
            if info.tree_size <= tree_size {
                infos.push(info);
            }
        }
    }
    infos.sort_unstable();
    let groups = infos.into_iter().group_by(|info| info.package);
    let selected = groups
        .into_iter()
        .filter_map(|(_, group)| group.last())
        .collect();
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ArchiveParams;
    use std::fs::{self, File};

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(bundle_file_name(0, 1023), "0000000000-0000001023.json.gz");
        assert_eq!(package_name(7), "007");
        assert_eq!(package_name(1234), "1234");
        assert_eq!(sth_file_name(42), "sth-0000000042.json");
        assert_eq!(info_file_name(3, 5_000_000), "003-0005000000.info");
    }

    #[test]
    fn bundle_names_parse_strictly() {
        let bundle = BundleName::parse("0000001024-0000002047.json.gz").expect("canonical name");
        assert_eq!(bundle.start, 1024);
        assert_eq!(bundle.end, 2047);
        assert_eq!(bundle.count(), 1024);

        assert_eq!(BundleName::parse("1024-2047.json.gz"), None);
        assert_eq!(BundleName::parse("0000001024-0000002047.json"), None);
        assert_eq!(BundleName::parse("0000001024_0000002047.json.gz"), None);
        assert_eq!(BundleName::parse("00000010x4-0000002047.json.gz"), None);
        // End below start cannot name a bundle.
        assert_eq!(BundleName::parse("0000000010-0000000001.json.gz"), None);
    }

    #[test]
    fn info_names_parse_strictly() {
        let info = InfoName::parse("003-0000001234.info").expect("canonical name");
        assert_eq!(info.package, 3);
        assert_eq!(info.tree_size, 1234);
        // Width self-extends along with the package directory names.
        assert!(InfoName::parse("1234-0000001234.info").is_some());

        assert_eq!(InfoName::parse("03-0000001234.info"), None);
        assert_eq!(InfoName::parse("003-1234.info"), None);
        assert_eq!(InfoName::parse("003-0000001234.torrent"), None);
    }

    #[test]
    fn package_names_parse_strictly() {
        assert_eq!(parse_package_name("000"), Some(0));
        assert_eq!(parse_package_name("999"), Some(999));
        assert_eq!(parse_package_name("1000"), Some(1000));
        assert_eq!(parse_package_name("07"), None);
        assert_eq!(parse_package_name("0x7"), None);
    }

    #[test]
    fn log_names_join_url_segments() {
        let (host, path) = parse_log_url("ct.googleapis.com/pilot");
        assert_eq!(host, "ct.googleapis.com");
        assert_eq!(path, vec!["pilot".to_owned()]);
        assert_eq!(log_name(&host, &path), "ct.googleapis.com_pilot");

        assert_eq!(log_name_for_url("ct.example.net"), "ct.example.net");
        assert_eq!(
            log_name_for_url("ct.example.net/logs/2025h2/"),
            "ct.example.net_logs_2025h2"
        );
    }

    #[test]
    fn package_dir_is_derived_from_the_entry_index() {
        let params = ArchiveParams::new(4, 2).expect("powers of two");
        let root = Path::new("/archive/log");
        assert_eq!(
            package_dir_for_entry(root, 0, &params),
            root.join("000")
        );
        assert_eq!(
            package_dir_for_entry(root, 7, &params),
            root.join("000")
        );
        assert_eq!(
            package_dir_for_entry(root, 8, &params),
            root.join("001")
        );
    }

    #[test]
    fn canonical_selection_keeps_the_longest_bundle() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "0000000000-0000000199.json.gz",
            "0000000000-0000000899.json.gz",
            "0000000000-0000001023.json.gz",
            "0000001024-0000001499.json.gz",
            "not-a-bundle.json.gz",
            "0000001024-0000002047.torrent",
        ] {
            File::create(dir.path().join(name))?;
        }

        let canonical = canonical_bundles(dir.path(), 2048)?;
        assert_eq!(
            canonical,
            vec![
                BundleName {
                    start: 0,
                    end: 1023
                },
                BundleName {
                    start: 1024,
                    end: 1499
                },
            ]
        );

        // At a smaller tree size the longest survivor changes.
        let canonical = canonical_bundles(dir.path(), 900)?;
        assert_eq!(canonical, vec![BundleName { start: 0, end: 899 }]);
        Ok(())
    }

    #[test]
    fn info_selection_keeps_the_most_recent_per_package() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "000-0000001000.info",
            "000-0000002000.info",
            "000-0000009000.info",
            "001-0000002000.info",
            "junk.info",
        ] {
            File::create(dir.path().join(name))?;
        }

        let selected = info_files_at(dir.path(), 2000)?;
        assert_eq!(
            selected,
            vec![
                InfoName {
                    package: 0,
                    tree_size: 2000
                },
                InfoName {
                    package: 1,
                    tree_size: 2000
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn package_dirs_sort_numerically() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["002", "000", "1000", "010", "misc"] {
            fs::create_dir(dir.path().join(name))?;
        }
        File::create(dir.path().join("003"))?;

        // Plain files never count as packages.
        assert_eq!(package_dirs(dir.path())?, vec![0, 2, 10, 1000]);
        Ok(())
    }
}
