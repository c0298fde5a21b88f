//! larch archives a Certificate Transparency log and reseeds it as
//! BitTorrent swarms: fetch the log view, hash it back to the signed tree
//! head, and emit one torrent per package.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use color_eyre::{
    eyre::{bail, ensure, WrapErr},
    Result,
};
use larch_archive::{fetch, hash, layout, ArchiveParams};
use larch_torrent::{AnnounceSet, Packager, Peer};
use log::info;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Archive a Certificate Transparency log and publish it over BitTorrent.
#[derive(argh::FromArgs)]
struct Args {
    /// path of the configuration file
    #[argh(option, short = 'c')]
    config: PathBuf,
    /// url of the log to operate on (host and path, no scheme)
    #[argh(option, short = 'u')]
    url: String,
    /// archive name override; derived from the url when unset
    #[argh(option, short = 'n')]
    name: Option<String>,
    #[argh(subcommand)]
    action: Option<Action>,
}

#[derive(argh::FromArgs)]
#[argh(subcommand)]
enum Action {
    Auto(AutoArgs),
    GetCt(GetCtArgs),
    Hash(HashArgs),
    Bt(BtArgs),
}

/// fetch, hash, and package in one pass (the default)
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "auto")]
struct AutoArgs {}

/// fetch entries without hashing or packaging
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "getct")]
struct GetCtArgs {
    /// index of the first entry to fetch, rounded down to a bundle multiple
    #[argh(option, short = 's', default = "0")]
    start: u64,
    /// log2 of the number of entries to request per query
    #[argh(option, short = 'S', default = "10")]
    step: u32,
    /// log2 of the number of entries per bundle
    #[argh(option, short = 'b', default = "10")]
    bundle: u32,
    /// log2 of the number of bundles per package
    #[argh(option, short = 'p', default = "10")]
    package: u32,
}

/// hash packages and compute their inclusion proofs
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "hash")]
struct HashArgs {
    /// first package to hash
    #[argh(option, short = 's', default = "0")]
    start: u64,
    /// last package to hash
    #[argh(option, short = 'e', default = "0")]
    end: u64,
    /// tree size to hash at
    #[argh(option, short = 't', default = "0")]
    treesize: u64,
}

/// create torrents for already-hashed packages
#[derive(argh::FromArgs)]
#[argh(subcommand, name = "bt")]
struct BtArgs {
    /// first package to package
    #[argh(option, short = 's', default = "0")]
    start: u64,
    /// last package to package
    #[argh(option, short = 'e', default = "0")]
    end: u64,
    /// tree size the torrents refer to
    #[argh(option, short = 't', default = "0")]
    treesize: u64,
}

#[derive(Debug, Deserialize)]
struct Config {
    general: General,
    #[serde(default)]
    trackers: Vec<String>,
    #[serde(default)]
    peers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct General {
    log_list_file: PathBuf,
    download_url: String,
    #[serde(default = "default_dir")]
    root_dir: PathBuf,
    #[serde(default = "default_dir")]
    torrent_dir: PathBuf,
    #[serde(rename = "ASN")]
    asn: Option<String>,
    workers: Option<usize>,
}

fn default_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn check_paths(config: &Config) -> Result<()> {
    ensure!(
        config.general.log_list_file.is_file(),
        "log list file {} cannot be read; check permissions",
        config.general.log_list_file.display()
    );
    for dir in [&config.general.root_dir, &config.general.torrent_dir] {
        let metadata = fs::metadata(dir)
            .wrap_err_with(|| format!("directory {} is unusable", dir.display()))?;
        ensure!(
            metadata.is_dir() && !metadata.permissions().readonly(),
            "{} is not a writable directory",
            dir.display()
        );
    }
    Ok(())
}

fn packager(config: &Config, url: &str, name: &str) -> Result<Packager> {
    let peers = config
        .peers
        .iter()
        .map(|peer| Peer::parse(peer))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Packager {
        torrent_dir: config.general.torrent_dir.clone(),
        pkg_root_dir: config.general.root_dir.join(name),
        name: name.to_owned(),
        url: url.to_owned(),
        download_url: config.general.download_url.clone(),
        announce: AnnounceSet {
            trackers: config.trackers.clone(),
            peers,
        },
        asn: config.general.asn.clone(),
        workers: config.general.workers,
    })
}

/// The full pipeline: fetch to the tree head, hash back to it, refuse to
/// package unless the recomputed root matches, then emit the torrents.
fn auto(config: &Config, url: &str, name: &str, pkg_root_dir: &Path) -> Result<()> {
    let params = ArchiveParams::default();
    let start_index = fetch::discover_start_index(pkg_root_dir, &params)?;
    let sth = fetch::fetch(
        pkg_root_dir,
        url,
        &config.general.log_list_file,
        start_index,
        params.bundle_size(),
        &params,
    )?;

    let tree_size = sth.head.tree_size;
    if tree_size == 0 {
        info!("{url}: the log is empty; nothing to hash or package");
        return Ok(());
    }

    let start_package = params.package_for_entry(params.bundle_floor(start_index));
    let last_package = params.package_for_entry(tree_size - 1);

    hash::compute_packages(
        pkg_root_dir,
        start_package,
        last_package,
        tree_size,
        &params,
        config.general.workers,
    )?;
    let root = hash::compute_proofs(pkg_root_dir, tree_size, start_package, last_package)?;
    if root != sth.root_hash()? {
        bail!(
            "recomputed root hash does not match the signed tree head for entries \
             {start_index}..{tree_size}; refusing to package"
        );
    }

    packager(config, url, name)?.create_torrents(start_package, last_package, tree_size)?;
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();
    let args: Args = argh::from_env();

    let config: Config = toml::from_str(
        &fs::read_to_string(&args.config).wrap_err("unable to read the configuration file")?,
    )
    .wrap_err("configuration file is invalid")?;
    check_paths(&config)?;

    let name = args
        .name
        .clone()
        .unwrap_or_else(|| layout::log_name_for_url(&args.url));
    let pkg_root_dir = config.general.root_dir.join(&name);

    match args.action.unwrap_or(Action::Auto(AutoArgs {})) {
        Action::Auto(_) => auto(&config, &args.url, &name, &pkg_root_dir),
        Action::GetCt(opts) => {
            let params = ArchiveParams::new(1 << opts.bundle, 1 << opts.package)?;
            fetch::fetch(
                &pkg_root_dir,
                &args.url,
                &config.general.log_list_file,
                opts.start,
                1 << opts.step,
                &params,
            )?;
            Ok(())
        }
        Action::Hash(opts) => {
            let params = ArchiveParams::default();
            hash::compute_packages(
                &pkg_root_dir,
                opts.start,
                opts.end,
                opts.treesize,
                &params,
                config.general.workers,
            )?;
            let root = hash::compute_proofs(&pkg_root_dir, opts.treesize, opts.start, opts.end)?;
            println!("computed tree root hash: {}", BASE64.encode(root));
            Ok(())
        }
        Action::Bt(opts) => {
            packager(&config, &args.url, &name)?.create_torrents(
                opts.start,
                opts.end,
                opts.treesize,
            )?;
            Ok(())
        }
    }
}
