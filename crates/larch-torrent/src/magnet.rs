//! Magnet links for the per-package torrents.

use crate::announce::AnnounceSet;
use std::fmt::Write as _;

/// `magnet:?xt=urn:btih:…&dn=…`, then one `x.pe` per peer and one `tr`
/// per tracker, in that order.
pub fn magnet_link(infohash: &[u8; 20], name: &str, announce: &AnnounceSet) -> String {
    let mut link = format!("magnet:?xt=urn:btih:{}&dn={name}", hex::encode(infohash));
    for peer in &announce.peers {
        let _ = write!(link, "&x.pe={peer}");
    }
    for tracker in &announce.trackers {
        let _ = write!(link, "&tr={tracker}");
    }
    link
}

#[cfg(test)]
mod tests {
    use super::magnet_link;
    use crate::announce::{AnnounceSet, Peer};

    #[test]
    fn bare_magnet() {
        let link = magnet_link(&[0xAB; 20], "ct.example.net_log", &AnnounceSet::default());
        assert_eq!(
            link,
            format!(
                "magnet:?xt=urn:btih:{}&dn=ct.example.net_log",
                "ab".repeat(20)
            )
        );
    }

    #[test]
    fn peers_come_before_trackers() {
        let announce = AnnounceSet {
            trackers: vec!["https://tracker.example.net/announce".to_owned()],
            peers: vec![Peer {
                host: "seed.example.net".to_owned(),
                port: 6881,
            }],
        };
        let link = magnet_link(&[0x00; 20], "log", &announce);
        assert_eq!(
            link,
            format!(
                "magnet:?xt=urn:btih:{}&dn=log&x.pe=seed.example.net:6881&tr=https://tracker.example.net/announce",
                "00".repeat(20)
            )
        );
    }
}
