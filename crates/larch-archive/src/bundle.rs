//! Gzipped bundle files: the on-disk unit of fetched entries.

use crate::{error::ArchiveError, layout};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::BufReader,
    path::Path,
};

const BUNDLE_TARGET: &str = "larch_archive::bundle";

/// One log entry exactly as the log returned it.
///
/// Both fields stay base64 so that a bundle mirrors the `get-entries`
/// response and remains readable by third-party tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub leaf_input: String,
    pub extra_data: String,
}

impl LogEntry {
    /// Decoded `leaf_input` bytes, the preimage of the leaf hash.
    pub fn leaf_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        Ok(BASE64.decode(&self.leaf_input)?)
    }
}

/// `{"entries": […]}`, the shape shared by the `get-entries` response and
/// the bundle payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntryBatch {
    pub entries: Vec<LogEntry>,
}

#[derive(Serialize)]
struct EntryBatchRef<'a> {
    entries: &'a [LogEntry],
}

/// Write `entries` as the bundle starting at entry `start`, creating the
/// package directory on demand.
pub fn write_bundle(
    package_dir: &Path,
    start: u64,
    entries: &[LogEntry],
) -> Result<(), ArchiveError> {
    debug_assert!(!entries.is_empty());
    fs::create_dir_all(package_dir)?;

    let end = start + entries.len() as u64 - 1;
    let path = package_dir.join(layout::bundle_file_name(start, end));
    info!(target: BUNDLE_TARGET, "writing bundle {}", path.display());

    let mut encoder = GzEncoder::new(File::create(&path)?, Compression::default());
    serde_json::to_writer(&mut encoder, &EntryBatchRef { entries })?;
    encoder.finish()?;
    Ok(())
}

/// Read a bundle file back into its entries.
pub fn read_bundle(path: &Path) -> Result<Vec<LogEntry>, ArchiveError> {
    let reader = GzDecoder::new(BufReader::new(File::open(path)?));
    let batch: EntryBatch = serde_json::from_reader(reader)?;
    Ok(batch.entries)
}
