use crate::transport::ReqwestTransport;
use clap::Parser;
use color_eyre::eyre::{Context, Result};
use std::{collections::HashMap, str::FromStr};
use stevedore_core::{image::ConfigImage, manifest_list, registry, Name, Platform};
use tracing::{debug, info};

#[derive(Debug, Parser)]
pub struct Options {
    /// Image reference to enumerate layers and files from.
    ///
    /// Short forms are also accepted, e.g. `ubuntu` or `library/ubuntu:20.04`, which expand
    /// against the `OCI_DEFAULT_BASE`/`OCI_DEFAULT_NAMESPACE` environment variables the same
    /// way `docker pull` expands them.
    #[arg(value_parser = Name::parse_expanding)]
    image: Name,

    /// Platform to inspect, if the image is a manifest list (e.g. linux/amd64)
    #[arg(long, value_parser = Platform::from_str)]
    platform: Option<Platform>,
}

#[tracing::instrument(skip(opts))]
pub fn main(opts: Options) -> Result<()> {
    info!("listing image layers");

    let registry_host = opts.image.registry().to_string();
    let transport = ReqwestTransport::new(&registry_host).context("configure http transport")?;
    let platform = opts.platform.unwrap_or_else(Platform::default_target);

    let list = manifest_list::FromRegistry::new(transport.clone(), opts.image.clone())
        .context("open manifest list view")?;
    let image: Box<dyn ConfigImage> = if list.exists().context("check whether image is a manifest list")? {
        list.resolve(&platform).context("resolve platform from manifest list")?
    } else {
        let view = registry::FromRegistry::new(transport, opts.image).context("open registry view")?;
        Box::new(view)
    };

    let layers = image.fs_layers().context("list layers")?;
    let count = layers.len();
    info!("enumerated {count} {}", if count == 1 { "layer" } else { "layers" });

    let mut listing = HashMap::new();
    for (index, digest) in layers.iter().enumerate() {
        info!(%digest, "reading layer {} of {count}", index + 1);
        let uncompressed = image.uncompressed_blob(digest).context("fetch layer blob")?;
        let names = list_tar_entries(&uncompressed).context("list files in layer")?;
        debug!(%digest, files = %names.len(), "listed files");
        listing.insert(digest.to_string(), names);
    }

    let rendered = serde_json::to_string_pretty(&listing).context("render listing")?;
    println!("{rendered}");

    Ok(())
}

fn list_tar_entries(uncompressed: &[u8]) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(std::io::Cursor::new(uncompressed));
    let mut names = Vec::new();
    for entry in archive.entries().context("read layer tar entries")? {
        let entry = entry.context("read layer tar entry")?;
        names.push(entry.path().context("read entry path")?.to_string_lossy().into_owned());
    }
    Ok(names)
}
