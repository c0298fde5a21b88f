//! Magnet aggregation and the RSS 2.0 torrent feed.

use crate::{
    create::{Packager, TorrentSummary},
    error::TorrentError,
};
use log::warn;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use std::{fs, path::Path};

const FEED_TARGET: &str = "larch_torrent::feed";
// One day, in minutes.
const FEED_TTL: &str = "1440";
const FEED_LINK: &str = "https://github.com/joshuamegnauth54/larch";

/// Concatenate every magnet body for this log, one per line, into
/// `<log_name>.magnets`.
pub fn merge_magnets(torrent_dir: &Path, log_name: &str) -> Result<(), TorrentError> {
    let prefix = format!("{log_name}_");
    let mut names = Vec::new();
    for entry in fs::read_dir(torrent_dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&prefix) && name.ends_with(".magnet") {
                names.push(name.to_owned());
            }
        }
    }
    names.sort_unstable();

    let mut bodies = Vec::with_capacity(names.len());
    for name in &names {
        bodies.push(fs::read_to_string(torrent_dir.join(name))?);
    }
    fs::write(
        torrent_dir.join(format!("{log_name}.magnets")),
        bodies.join("\n"),
    )?;
    Ok(())
}

/// One `<item>` of the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FeedItem {
    title: String,
    description: String,
    guid: String,
    enclosure_url: String,
    enclosure_len: String,
}

/// Create or update `<log_name>.rss` with this run's torrents.
///
/// Items of an existing feed are kept in place; a feed that is missing or
/// fails to parse is rebuilt carrying only the new items.
pub fn update_feed(
    run: &Packager,
    tree_size: u64,
    summaries: &[TorrentSummary],
) -> Result<(), TorrentError> {
    let path = run.torrent_dir.join(format!("{}.rss", run.name));
    let mut items = match fs::read_to_string(&path) {
        Ok(existing) => match parse_feed(&existing) {
            Ok(items) => items,
            Err(error) => {
                warn!(
                    target: FEED_TARGET,
                    "existing feed is invalid ({error}); rebuilding"
                );
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    };

    let mut download_url = run.download_url.clone();
    if !download_url.ends_with('/') {
        download_url.push('/');
    }

    for summary in summaries {
        let description = match &summary.comment {
            Some(comment) => {
                format!("Comment: {comment} Creation Date: {}", summary.creation_date)
            }
            None => format!("Creation Date: {}", summary.creation_date),
        };
        items.push(FeedItem {
            title: format!("Package {} for tree_size {tree_size}", summary.package),
            description,
            guid: hex::encode(summary.infohash),
            enclosure_url: format!(
                "{download_url}{}",
                run.torrent_file_name(summary.package, tree_size)
            ),
            enclosure_len: summary.total_size.to_string(),
        });
    }

    fs::write(&path, render_feed(&run.url, &items)?)?;
    Ok(())
}

fn render_feed(url: &str, items: &[FeedItem]) -> Result<Vec<u8>, TorrentError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;
    write_text(&mut writer, "ttl", FEED_TTL)?;
    write_text(
        &mut writer,
        "title",
        &format!("Torrent feed for the CT log at {url}"),
    )?;
    write_text(
        &mut writer,
        "description",
        &format!("Lists the torrents that mirror the archive of the CT log at {url}."),
    )?;
    write_text(&mut writer, "link", FEED_LINK)?;

    for item in items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        write_text(&mut writer, "title", &item.title)?;
        write_text(&mut writer, "description", &item.description)?;
        write_text(&mut writer, "guid", &item.guid)?;
        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("url", item.enclosure_url.as_str()));
        enclosure.push_attribute(("type", "application/x-bittorrent"));
        enclosure.push_attribute(("len", item.enclosure_len.as_str()));
        writer.write_event(Event::Empty(enclosure))?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(writer.into_inner())
}

fn write_text<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<(), TorrentError> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

/// Pull the items out of an existing feed, validating the envelope.
pub(crate) fn parse_feed(content: &str) -> Result<Vec<FeedItem>, TorrentError> {
    let mut reader = Reader::from_str(content);
    let mut items = Vec::new();
    let mut item: Option<FeedItem> = None;
    let mut field: Vec<u8> = Vec::new();
    let mut version_ok = false;
    let (mut has_title, mut has_description, mut has_link) = (false, false, false);

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = start.name().as_ref().to_vec();
                match name.as_slice() {
                    b"rss" => {
                        version_ok = match start.try_get_attribute("version")? {
                            Some(attribute) => attribute.unescape_value()? == "2.0",
                            None => false,
                        };
                    }
                    b"item" => item = Some(FeedItem::default()),
                    b"title" if item.is_none() => has_title = true,
                    b"description" if item.is_none() => has_description = true,
                    b"link" if item.is_none() => has_link = true,
                    _ => {}
                }
                field = name;
            }
            Event::Empty(empty) if empty.name().as_ref() == b"enclosure" => {
                if let Some(item) = item.as_mut() {
                    if let Some(attribute) = empty.try_get_attribute("url")? {
                        item.enclosure_url = attribute.unescape_value()?.into_owned();
                    }
                    if let Some(attribute) = empty.try_get_attribute("len")? {
                        item.enclosure_len = attribute.unescape_value()?.into_owned();
                    }
                }
            }
            Event::Text(text) => {
                if let Some(item) = item.as_mut() {
                    let value = text.unescape()?.into_owned();
                    match field.as_slice() {
                        b"title" => item.title = value,
                        b"description" => item.description = value,
                        b"guid" => item.guid = value,
                        _ => {}
                    }
                }
            }
            Event::End(end) => {
                if end.name().as_ref() == b"item" {
                    if let Some(finished) = item.take() {
                        items.push(finished);
                    }
                }
                field.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !version_ok {
        return Err(TorrentError::FeedStructure("not an RSS 2.0 document"));
    }
    if !(has_title && has_description && has_link) {
        return Err(TorrentError::FeedStructure("channel header is incomplete"));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::{merge_magnets, parse_feed, render_feed, FeedItem};
    use crate::error::TorrentError;
    use std::fs;

    fn item(index: u64) -> FeedItem {
        FeedItem {
            title: format!("Package {index} for tree_size 2048"),
            description: "Comment: Downloaded from AS64496 Creation Date: 1700000000".to_owned(),
            guid: format!("{index:040x}"),
            enclosure_url: format!(
                "https://mirror.example.net/torrents/log_{index:03}-0000002048.torrent"
            ),
            enclosure_len: "12345".to_owned(),
        }
    }

    #[test]
    fn feeds_round_trip() -> Result<(), TorrentError> {
        let rendered = render_feed("ct.example.net/log", &[item(0), item(1)])?;
        let parsed = parse_feed(std::str::from_utf8(&rendered).expect("feed is UTF-8"))?;
        assert_eq!(parsed, vec![item(0), item(1)]);
        Ok(())
    }

    #[test]
    fn invalid_feeds_are_detected() {
        assert!(parse_feed("<rss version=\"1.0\"><channel></channel></rss>").is_err());
        assert!(parse_feed("<notrss/>").is_err());
        assert!(parse_feed("garbage").is_err());
        // Channel header without a description.
        assert!(parse_feed(
            "<rss version=\"2.0\"><channel><title>t</title><link>l</link></channel></rss>"
        )
        .is_err());
    }

    #[test]
    fn magnets_merge_per_log() -> Result<(), TorrentError> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("log_000-0000002048.magnet"), "magnet:?a")?;
        fs::write(dir.path().join("log_001-0000002048.magnet"), "magnet:?b")?;
        // Another log and a torrent file must not leak in.
        fs::write(dir.path().join("other_000-0000000001.magnet"), "magnet:?x")?;
        fs::write(dir.path().join("log_000-0000002048.torrent"), "d4:spam4:eggse")?;

        merge_magnets(dir.path(), "log")?;
        assert_eq!(
            fs::read_to_string(dir.path().join("log.magnets"))?,
            "magnet:?a\nmagnet:?b"
        );
        Ok(())
    }
}
