use std::path::PathBuf;
use thiserror::Error;

/// Errors from fetching, storing, or hashing a log archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("base64 field could not be decoded: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("bundle {path} holds {actual} entries but its name claims {expected}")]
    BundleEntryCount {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("bundle starting at entry {actual} does not follow on from entry {expected}")]
    BundleGap { expected: u64, actual: u64 },
    #[error("bundle size {0} is not a power of two")]
    BundleSizeInvalid(u64),
    #[error("log returned an empty entry batch at index {0}")]
    EmptyBatch(u64),
    #[error("hash is {0} bytes long; expected 32")]
    HashLength(usize),
    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("log public key could not be decoded: {0}")]
    Key(#[from] spki::Error),
    #[error("log {url} has no entry in the log list")]
    LogUnknown { url: String },
    #[error("package {0} has no info file at this tree size")]
    MissingPackageInfo(u64),
    #[error("package {0} holds no canonical bundles")]
    PackageEmpty(u64),
    #[error("package size {0} is not a power of two")]
    PackageSizeInvalid(u64),
    #[error("worker pool could not be built: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("tree head signature algorithms are unsupported: hash {hash_algo}, signature {sig_algo}")]
    SignatureAlgorithm { hash_algo: u8, sig_algo: u8 },
    #[error("tree head signature is malformed: {0}")]
    SignatureFormat(&'static str),
    #[error("tree head signature does not verify: {0}")]
    SthSignatureInvalid(#[source] signature::Error),
    #[error("found an info file for package {found} beyond the last package {last}")]
    StrayPackageInfo { found: u64, last: u64 },
}
