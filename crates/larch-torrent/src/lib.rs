//! BitTorrent packaging of larch archives.
//!
//! Each archived package becomes one
//! [BEP-0003](https://www.bittorrent.org/beps/bep_0003.html) torrent whose
//! contents — the package's bundles, the signed tree head, and the package
//! info file — let a downloader re-verify the archive against the log's
//! public key with nothing else in hand. On top of the per-package
//! metainfo and magnet files the packager maintains two aggregates per
//! log: a flat list of magnet links and an RSS 2.0 feed of torrents.

pub mod announce;
pub mod create;
pub mod error;
pub mod feed;
pub mod magnet;
pub mod metainfo;

pub use announce::{AnnounceSet, Peer};
pub use create::{Packager, TorrentSummary};
pub use error::TorrentError;
