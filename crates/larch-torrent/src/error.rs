use thiserror::Error;

/// Errors from torrent, magnet, or feed creation.
#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("feed XML: {0}")]
    Feed(#[from] quick_xml::Error),
    #[error("feed structure: {0}")]
    FeedStructure(&'static str),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer address {0:?} is not host:port")]
    PeerAddress(String),
    #[error("worker pool could not be built: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
