//! BitTorrent v1 metainfo for one archived package.

use crate::{announce::AnnounceSet, error::TorrentError};
use larch_bencode::{Dict, Value};
use larch_archive::layout;
use sha1::{Digest, Sha1};
use std::{
    fs::{self, File},
    io::Read,
    path::Path,
};

/// Smallest allowed piece size, 32 KiB.
const MIN_PIECE_LENGTH: u64 = 1 << 15;
/// Rough piece count a torrent should land on.
const TARGET_PIECE_COUNT: u64 = 1500;

/// One file in the torrent, with its path relative to the package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub length: u64,
    pub path: Vec<String>,
}

/// The torrent's file list in canonical order: every canonical bundle of
/// the package, then the STH file, then the package info file.
pub fn file_list(
    pkg_root_dir: &Path,
    package: u64,
    tree_size: u64,
) -> Result<Vec<TorrentFile>, TorrentError> {
    let package_name = layout::package_name(package);
    let package_dir = pkg_root_dir.join(&package_name);

    let mut files = Vec::new();
    for bundle in layout::canonical_bundles(&package_dir, tree_size)? {
        let name = bundle.file_name();
        files.push(TorrentFile {
            length: fs::metadata(package_dir.join(&name))?.len(),
            path: vec![package_name.clone(), name],
        });
    }

    let sth_name = layout::sth_file_name(tree_size);
    files.push(TorrentFile {
        length: fs::metadata(pkg_root_dir.join(&sth_name))?.len(),
        path: vec![sth_name],
    });

    let info_name = layout::info_file_name(package, tree_size);
    files.push(TorrentFile {
        length: fs::metadata(pkg_root_dir.join(&info_name))?.len(),
        path: vec![info_name],
    });
    Ok(files)
}

/// Piece length for `total` content bytes: at least 32 KiB, otherwise the
/// largest 8 KiB multiple that lands near the target piece count.
pub fn piece_length(total: u64) -> u64 {
    MIN_PIECE_LENGTH.max(((total / TARGET_PIECE_COUNT) >> 13) << 13)
}

/// Concatenated SHA-1 digests of the torrent's pieces.
///
/// Files run together with no padding, so a piece can span a file
/// boundary. A final partial piece is hashed as-is; an exactly aligned
/// total has no tail piece.
pub fn piece_hashes(
    pkg_root_dir: &Path,
    files: &[TorrentFile],
    piece_length: u64,
) -> Result<Vec<u8>, TorrentError> {
    let piece_length = piece_length as usize;
    let mut pieces = Vec::new();
    let mut pending = Vec::with_capacity(piece_length);
    let mut read_buffer = vec![0u8; 64 * 1024];

    for file in files {
        let mut path = pkg_root_dir.to_path_buf();
        for segment in &file.path {
            path.push(segment);
        }
        let mut reader = File::open(&path)?;
        loop {
            let count = reader.read(&mut read_buffer)?;
            if count == 0 {
                break;
            }
            pending.extend_from_slice(&read_buffer[..count]);
            while pending.len() >= piece_length {
                pieces.extend_from_slice(Sha1::digest(&pending[..piece_length]).as_slice());
                pending.drain(..piece_length);
            }
        }
    }
    if !pending.is_empty() {
        pieces.extend_from_slice(Sha1::digest(&pending).as_slice());
    }
    Ok(pieces)
}

/// Assemble the metainfo dictionary and its infohash.
///
/// The info dictionary is encoded exactly once; the BTIH is the SHA-1 of
/// those bytes and the outer dictionary reuses them through
/// [`Value::Raw`], so the hash cannot drift from what is written.
pub fn build_metainfo(
    name: &str,
    files: &[TorrentFile],
    piece_length: u64,
    pieces: Vec<u8>,
    creation_date: u64,
    comment: Option<&str>,
    created_by: &str,
    announce: &AnnounceSet,
) -> (Value, [u8; 20]) {
    let file_values: Vec<Value> = files
        .iter()
        .map(|file| {
            let mut entry = Dict::new();
            entry.insert(b"length".to_vec(), Value::Int(file.length as i64));
            entry.insert(
                b"path".to_vec(),
                Value::List(
                    file.path
                        .iter()
                        .map(|segment| Value::from(segment.as_str()))
                        .collect(),
                ),
            );
            Value::Dict(entry)
        })
        .collect();

    let mut info = Dict::new();
    info.insert(b"files".to_vec(), Value::List(file_values));
    info.insert(b"name".to_vec(), Value::from(name));
    info.insert(b"piece length".to_vec(), Value::Int(piece_length as i64));
    info.insert(b"pieces".to_vec(), Value::Bytes(pieces));
    let info_bytes = Value::Dict(info).encode();
    let infohash: [u8; 20] = Sha1::digest(&info_bytes).into();

    let mut torrent = Dict::new();
    torrent.insert(b"info".to_vec(), Value::Raw(info_bytes));
    torrent.insert(b"creation date".to_vec(), Value::Int(creation_date as i64));
    torrent.insert(b"created by".to_vec(), Value::from(created_by));
    if let Some(comment) = comment {
        torrent.insert(b"comment".to_vec(), Value::from(comment));
    }
    if let Some((first, _)) = announce.trackers.split_first() {
        torrent.insert(b"announce".to_vec(), Value::from(first.as_str()));
        torrent.insert(
            b"announce-list".to_vec(),
            Value::List(vec![Value::List(
                announce
                    .trackers
                    .iter()
                    .map(|tracker| Value::from(tracker.as_str()))
                    .collect(),
            )]),
        );
    } else if !announce.peers.is_empty() {
        // Tracker-less torrent; fall back to bare peer addresses.
        torrent.insert(
            b"peers".to_vec(),
            Value::List(
                announce
                    .peers
                    .iter()
                    .map(|peer| {
                        Value::List(vec![
                            Value::from(peer.host.as_str()),
                            Value::Int(i64::from(peer.port)),
                        ])
                    })
                    .collect(),
            ),
        );
    }
    (Value::Dict(torrent), infohash)
}
