//! Drive torrent creation for a range of packages.

use crate::{announce::AnnounceSet, error::TorrentError, feed, magnet, metainfo};
use larch_archive::layout;
use log::info;
use rayon::prelude::*;
use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

const CREATE_TARGET: &str = "larch_torrent::create";
const CREATED_BY: &str = "larch 0.1.0 (https://github.com/joshuamegnauth54/larch)";

/// Everything fixed across one packaging run.
#[derive(Debug, Clone)]
pub struct Packager {
    /// Where the .torrent, .magnet, and aggregate files land.
    pub torrent_dir: PathBuf,
    /// The archived log's package root.
    pub pkg_root_dir: PathBuf,
    /// Log name; used for artifact names and the metainfo `name`.
    pub name: String,
    /// Log URL, for the feed header.
    pub url: String,
    /// HTTP prefix under which the .torrent files are published.
    pub download_url: String,
    pub announce: AnnounceSet,
    /// Autonomous system the archive was fetched from, if known.
    pub asn: Option<String>,
    pub workers: Option<usize>,
}

/// What the aggregate writers need to know about one finished torrent.
#[derive(Debug, Clone)]
pub struct TorrentSummary {
    pub package: u64,
    pub infohash: [u8; 20],
    /// Total content length across the torrent's files.
    pub total_size: u64,
    pub comment: Option<String>,
    pub creation_date: u64,
}

impl Packager {
    /// Create one torrent and magnet per package in
    /// `start_package..=last_package`, then rebuild the magnet aggregate
    /// and the RSS feed once the pool has joined.
    pub fn create_torrents(
        &self,
        start_package: u64,
        last_package: u64,
        tree_size: u64,
    ) -> Result<Vec<TorrentSummary>, TorrentError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.unwrap_or(0))
            .build()?;
        let mut summaries: Vec<TorrentSummary> = pool.install(|| {
            (start_package..=last_package)
                .into_par_iter()
                .map(|package| self.create_torrent(package, tree_size))
                .collect::<Result<_, _>>()
        })?;
        summaries.sort_unstable_by_key(|summary| summary.package);

        feed::merge_magnets(&self.torrent_dir, &self.name)?;
        feed::update_feed(self, tree_size, &summaries)?;
        Ok(summaries)
    }

    fn create_torrent(
        &self,
        package: u64,
        tree_size: u64,
    ) -> Result<TorrentSummary, TorrentError> {
        info!(target: CREATE_TARGET, "creating torrent for package {package}");
        let files = metainfo::file_list(&self.pkg_root_dir, package, tree_size)?;
        let total_size = files.iter().map(|file| file.length).sum();
        let piece_length = metainfo::piece_length(total_size);
        let pieces = metainfo::piece_hashes(&self.pkg_root_dir, &files, piece_length)?;

        let creation_date = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let comment = self
            .asn
            .as_ref()
            .map(|asn| format!("Downloaded from AS{asn}"));
        let (torrent, infohash) = metainfo::build_metainfo(
            &self.name,
            &files,
            piece_length,
            pieces,
            creation_date,
            comment.as_deref(),
            CREATED_BY,
            &self.announce,
        );

        fs::write(
            self.torrent_dir.join(self.torrent_file_name(package, tree_size)),
            torrent.encode(),
        )?;
        fs::write(
            self.torrent_dir.join(self.artifact_name(package, tree_size, "magnet")),
            magnet::magnet_link(&infohash, &self.name, &self.announce),
        )?;

        Ok(TorrentSummary {
            package,
            infohash,
            total_size,
            comment,
            creation_date,
        })
    }

    /// `<log_name>_<pkg>-<tree_size>.torrent`, as referenced by the feed.
    pub(crate) fn torrent_file_name(&self, package: u64, tree_size: u64) -> String {
        self.artifact_name(package, tree_size, "torrent")
    }

    fn artifact_name(&self, package: u64, tree_size: u64, extension: &str) -> String {
        format!(
            "{}_{}-{tree_size:010}.{extension}",
            self.name,
            layout::package_name(package)
        )
    }
}
