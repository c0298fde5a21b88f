//! Fetch log entries over HTTPS into the on-disk bundle layout.

use crate::{
    bundle::{self, EntryBatch, LogEntry},
    error::ArchiveError,
    layout,
    params::ArchiveParams,
    sth::{self, Sth},
};
use log::{info, warn};
use reqwest::blocking::Client;
use std::{fs, io, path::Path, thread, time::Duration};

const FETCH_TARGET: &str = "larch_archive::fetch";

/// Retry policy for log HTTP: retry without bound.
///
/// CT logs throttle aggressively; an archiver that gives up never
/// completes. The TLS connection is reopened before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryForever {
    pub backoff: Duration,
}

impl Default for RetryForever {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(2),
        }
    }
}

/// Blocking HTTPS transport for one log.
pub struct LogClient {
    http: Client,
    host: String,
    path: Vec<String>,
    retry: RetryForever,
}

impl LogClient {
    pub fn new(url: &str, retry: RetryForever) -> Result<Self, ArchiveError> {
        let (host, path) = layout::parse_log_url(url);
        Ok(Self {
            http: Self::connect()?,
            host,
            path,
            retry,
        })
    }

    // rustls only negotiates modern AEAD cipher suites.
    fn connect() -> Result<Client, ArchiveError> {
        Ok(Client::builder()
            .use_rustls_tls()
            .https_only(true)
            .timeout(Duration::from_secs(30))
            .build()?)
    }

    fn endpoint(&self, command: &str) -> String {
        let mut url = format!("https://{}", self.host);
        for segment in &self.path {
            url.push('/');
            url.push_str(segment);
        }
        url.push_str("/ct/v1/");
        url.push_str(command);
        url
    }

    /// GET `command`, retrying per the policy until the log answers 200.
    fn get(&mut self, command: &str, query: &[(&str, u64)]) -> Result<Vec<u8>, ArchiveError> {
        let url = self.endpoint(command);
        loop {
            let outcome = self
                .http
                .get(&url)
                .query(query)
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.bytes());
            match outcome {
                Ok(body) => return Ok(body.to_vec()),
                Err(error) => {
                    warn!(
                        target: FETCH_TARGET,
                        "{url}: {error}; retrying in {:?}", self.retry.backoff
                    );
                    thread::sleep(self.retry.backoff);
                    self.http = Self::connect()?;
                }
            }
        }
    }

    pub fn get_sth(&mut self) -> Result<Sth, ArchiveError> {
        Sth::from_response(self.get("get-sth", &[])?)
    }

    pub fn get_entries(&mut self, start: u64, end: u64) -> Result<Vec<LogEntry>, ArchiveError> {
        let body = self.get("get-entries", &[("start", start), ("end", end)])?;
        let batch: EntryBatch = serde_json::from_slice(&body)?;
        Ok(batch.entries)
    }
}

/// Resume index for an interrupted run.
///
/// The last bundle of the last package decides everything: a full bundle
/// means the next entry after it, a partial bundle is discarded and
/// refetched from its own start, and a package directory that never
/// received a bundle is refetched from its boundary.
pub fn discover_start_index(
    pkg_root_dir: &Path,
    params: &ArchiveParams,
) -> Result<u64, ArchiveError> {
    let packages = match layout::package_dirs(pkg_root_dir) {
        Ok(packages) => packages,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error.into()),
    };
    let Some(&last_package) = packages.last() else {
        return Ok(0);
    };

    let package_dir = pkg_root_dir.join(layout::package_name(last_package));
    let bundles = layout::all_canonical_bundles(&package_dir)?;
    let Some(last) = bundles.last() else {
        return Ok(last_package * params.entries_per_package());
    };

    if last.count() == params.bundle_size() {
        Ok(last.end + 1)
    } else {
        Ok(last.start)
    }
}

/// Largest power of two no greater than the probe's entry count.
fn effective_step(entry_count: usize) -> u64 {
    1 << entry_count.ilog2()
}

/// Fetch all entries of the current log view into `pkg_root_dir`.
///
/// Fetches, verifies, and persists the STH, then streams entries from the
/// resume point (or `start_index`, whichever is lower, rounded down to a
/// bundle boundary) up to the STH's tree size, flushing a bundle to disk
/// whenever enough entries accumulate. Idempotent across runs: a killed
/// run resumes, and a trailing partial bundle is refetched whole and
/// superseded on disk.
pub fn fetch(
    pkg_root_dir: &Path,
    url: &str,
    log_list_file: &Path,
    start_index: u64,
    desired_step: u64,
    params: &ArchiveParams,
) -> Result<Sth, ArchiveError> {
    fs::create_dir_all(pkg_root_dir)?;

    let mut client = LogClient::new(url, RetryForever::default())?;
    let sth = client.get_sth()?;
    let public_key = sth::log_public_key(log_list_file, url)?;
    sth.verify(&public_key)?;
    sth.write(pkg_root_dir)?;

    let tree_size = sth.head.tree_size;
    if tree_size == 0 {
        info!(target: FETCH_TARGET, "{url}: the log view is empty");
        return Ok(sth);
    }

    let resume = discover_start_index(pkg_root_dir, params)?;
    let start = params.bundle_floor(resume.min(start_index));
    if start >= tree_size {
        info!(
            target: FETCH_TARGET,
            "{url}: all {tree_size} entries are already on disk"
        );
        return Ok(sth);
    }

    let probe = client.get_entries(0, desired_step - 1)?;
    if probe.is_empty() {
        return Err(ArchiveError::EmptyBatch(0));
    }
    let step = effective_step(probe.len());
    if step != desired_step {
        info!(
            target: FETCH_TARGET,
            "{url}: the log serves {step} entries per request"
        );
    }

    let bundle_size = params.bundle_size() as usize;
    let mut buffer: Vec<LogEntry> = Vec::with_capacity(bundle_size + step as usize);
    let mut bundle_start = start;
    let mut index = start;
    while index < tree_size {
        let end = (index + step - 1).min(tree_size - 1);
        info!(
            target: FETCH_TARGET,
            "{url}: fetching entries {index}..={end} of {tree_size}"
        );
        let entries = client.get_entries(index, end)?;
        if entries.is_empty() {
            return Err(ArchiveError::EmptyBatch(index));
        }
        index += entries.len() as u64;
        buffer.extend(entries);

        while buffer.len() >= bundle_size {
            let package_dir = layout::package_dir_for_entry(pkg_root_dir, bundle_start, params);
            let flushed: Vec<LogEntry> = buffer.drain(..bundle_size).collect();
            bundle::write_bundle(&package_dir, bundle_start, &flushed)?;
            bundle_start += params.bundle_size();
        }
    }

    if !buffer.is_empty() {
        let package_dir = layout::package_dir_for_entry(pkg_root_dir, bundle_start, params);
        bundle::write_bundle(&package_dir, bundle_start, &buffer)?;
    }
    Ok(sth)
}

#[cfg(test)]
mod tests {
    use super::{discover_start_index, effective_step};
    use crate::{
        bundle::{write_bundle, LogEntry},
        error::ArchiveError,
        params::ArchiveParams,
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::fs;

    fn entries(count: usize) -> Vec<LogEntry> {
        (0..count)
            .map(|i| LogEntry {
                leaf_input: STANDARD.encode([i as u8]),
                extra_data: String::new(),
            })
            .collect()
    }

    #[test]
    fn step_rounds_down_to_a_power_of_two() {
        assert_eq!(effective_step(1), 1);
        assert_eq!(effective_step(3), 2);
        assert_eq!(effective_step(512), 512);
        assert_eq!(effective_step(1000), 512);
        assert_eq!(effective_step(1024), 1024);
    }

    #[test]
    fn resume_starts_at_zero_without_packages() -> Result<(), ArchiveError> {
        let params = ArchiveParams::new(4, 2)?;
        let dir = tempfile::tempdir()?;
        assert_eq!(
            discover_start_index(&dir.path().join("missing"), &params)?,
            0
        );
        assert_eq!(discover_start_index(dir.path(), &params)?, 0);
        Ok(())
    }

    #[test]
    fn resume_refetches_an_empty_package_from_its_boundary() -> Result<(), ArchiveError> {
        let params = ArchiveParams::new(4, 2)?;
        let dir = tempfile::tempdir()?;
        write_bundle(&dir.path().join("000"), 0, &entries(4))?;
        fs::create_dir(dir.path().join("001"))?;
        assert_eq!(discover_start_index(dir.path(), &params)?, 8);
        Ok(())
    }

    #[test]
    fn resume_continues_after_a_full_bundle() -> Result<(), ArchiveError> {
        let params = ArchiveParams::new(4, 2)?;
        let dir = tempfile::tempdir()?;
        write_bundle(&dir.path().join("000"), 0, &entries(4))?;
        write_bundle(&dir.path().join("000"), 4, &entries(4))?;
        assert_eq!(discover_start_index(dir.path(), &params)?, 8);
        Ok(())
    }

    #[test]
    fn resume_refetches_a_partial_bundle() -> Result<(), ArchiveError> {
        let params = ArchiveParams::new(4, 2)?;
        let dir = tempfile::tempdir()?;
        write_bundle(&dir.path().join("000"), 0, &entries(4))?;
        write_bundle(&dir.path().join("000"), 4, &entries(2))?;
        assert_eq!(discover_start_index(dir.path(), &params)?, 4);
        Ok(())
    }

    #[test]
    fn resume_looks_only_at_the_last_package() -> Result<(), ArchiveError> {
        let params = ArchiveParams::new(4, 2)?;
        let dir = tempfile::tempdir()?;
        // A partial bundle in an older package is already superseded.
        write_bundle(&dir.path().join("000"), 4, &entries(2))?;
        write_bundle(&dir.path().join("000"), 4, &entries(4))?;
        write_bundle(&dir.path().join("001"), 8, &entries(4))?;
        assert_eq!(discover_start_index(dir.path(), &params)?, 12);
        Ok(())
    }
}
