//! Trackers and peers advertised by the torrents.

use crate::error::TorrentError;
use std::fmt::{self, Display, Formatter};

/// Tracker URLs and bare peers for a packaging run.
///
/// Trackers win when both are configured; peers only matter for
/// tracker-less torrents.
#[derive(Debug, Clone, Default)]
pub struct AnnounceSet {
    pub trackers: Vec<String>,
    pub peers: Vec<Peer>,
}

/// A peer in `host:port` form, as in
/// [BEP-0009](https://www.bittorrent.org/beps/bep_0009.html)'s `x.pe`
/// magnet parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

impl Peer {
    /// Parse `host:port`, accepting square brackets around IPv6 hosts.
    pub fn parse(address: &str) -> Result<Self, TorrentError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| TorrentError::PeerAddress(address.to_owned()))?;
        let port = port
            .parse()
            .map_err(|_| TorrentError::PeerAddress(address.to_owned()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(TorrentError::PeerAddress(address.to_owned()));
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
