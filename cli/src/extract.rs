use crate::transport::ReqwestTransport;
use clap::Parser;
use color_eyre::eyre::{bail, Context, Result};
use std::{io::Cursor, path::PathBuf, str::FromStr};
use stevedore_core::{flatten, image::ConfigImage, manifest_list, registry, Name, Platform};
use tracing::info;

#[derive(Debug, Parser)]
pub struct Options {
    /// Image reference being extracted (e.g. registry.example.com/library/ubuntu:latest).
    ///
    /// Short forms are also accepted, e.g. `ubuntu` or `library/ubuntu:20.04`, which expand
    /// against the `OCI_DEFAULT_BASE`/`OCI_DEFAULT_NAMESPACE` environment variables the same
    /// way `docker pull` expands them.
    #[arg(value_parser = Name::parse_expanding)]
    image: Name,

    /// Directory to which the extracted contents will be written
    #[arg(default_value = ".")]
    output_dir: String,

    /// Overwrite the existing output directory if it exists.
    #[arg(long, short)]
    overwrite: bool,

    /// Platform to extract (e.g. linux/amd64)
    ///
    /// If the image is a manifest list, this selects which child manifest to resolve.
    /// If the image is a single manifest, this is ignored.
    #[arg(long, value_parser = Platform::from_str)]
    platform: Option<Platform>,
}

#[tracing::instrument(skip(opts))]
pub fn main(opts: Options) -> Result<()> {
    info!("extracting image");

    let output = canonicalize_output_dir(&opts.output_dir, opts.overwrite)?;
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

    let mut tar = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar);
        flatten::extract(image.as_ref(), &mut builder).context("flatten image layers")?;
        builder.finish().context("finish tar stream")?;
    }

    tar::Archive::new(Cursor::new(tar))
        .unpack(&output)
        .context("unpack flattened filesystem")?;

    info!(?output, "extraction complete");
    Ok(())
}

/// Given a (probably relative) path to a directory, canonicalize it to an absolute path.
/// If the path already exists, behavior depends on the `overwrite` flag:
/// - If `overwrite` is true, the existing directory is removed and a new one is created.
/// - If `overwrite` is false, an error is returned.
fn canonicalize_output_dir(path: &str, overwrite: bool) -> Result<PathBuf> {
    let path = PathBuf::from(path);

    // If we're able to canonicalize the path, it already exists.
    // We want to remove its contents and recreate it if `overwrite` is true.
    if let Ok(path) = std::fs::canonicalize(&path) {
        if !overwrite {
            bail!("output directory already exists: {path:?}");
        }

        info!(?path, "removing existing output directory");
        std::fs::remove_dir_all(&path).context("remove existing output directory")?;
        std::fs::create_dir(&path).context("create new directory")?;
        return Ok(path);
    }

    // Failed to canonicalize the path, which means it doesn't exist.
    // We need to create it, then canonicalize it now that it exists.
    info!(?path, "creating new output directory");
    std::fs::create_dir_all(&path).context("create parent dir")?;
    std::fs::canonicalize(&path).context("canonicalize path")
}
