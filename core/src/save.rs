//! Writes image views back out as Docker-save tarballs (v1, v2.2) or the fast on-disk layout
//! `disk::FromDisk` reads (§4.11).
//!
//! Grounded on `original_source/client/docker_image_.py`'s `save`/`save_fast` methods; the v1
//! and v2.2 tarball writers share the per-layer directory emission (`VERSION`/`json`/
//! `layer.tar`) since v2.2 is a strict superset of the v1 layout, and both derive their layer
//! ids and v1 metadata from [`compat::build_v1_layers`] — the same v2→v1 machinery
//! [`compat::V2FromV22`] and [`compat::AncestryFromV22`] are built on, so a v2.2 image and its
//! schema-1 view always agree on layer ids.

use crate::{
    compat::{self, V1Layer},
    image::ConfigImage,
    json, Digest, Error, Name, Result,
};
use std::{
    collections::{BTreeMap, HashSet},
    io::Write,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

/// One image and the names under which it should be recorded in `repositories`/`manifest.json`.
pub struct Tagged<'a> {
    /// The image to save.
    pub image: &'a dyn ConfigImage,
    /// The tags this image is saved under, e.g. `example.com/foo:latest`.
    pub tags: Vec<Name>,
}

fn uncompressed_layer(image: &dyn ConfigImage, digest: &Digest) -> Result<Vec<u8>> {
    if *digest == crate::empty_layer_digest() {
        Ok(crate::gzip::decompress(&crate::EMPTY_LAYER_BYTES)?)
    } else {
        Ok(image.uncompressed_blob(digest)?.to_vec())
    }
}

fn append_file<W: Write>(tar: &mut tar::Builder<W>, name: &str, content: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, name, content)?;
    Ok(())
}

fn append_dir<W: Write>(tar: &mut tar::Builder<W>, name: &str) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_cksum();
    tar.append_data(&mut header, name, std::io::empty())?;
    Ok(())
}

/// Emit `image`'s layer-id directories (`VERSION`/`json`/`layer.tar`) into `tar`, skipping any
/// layer id already present in `written` (a layer id is written at most once across all images
/// in a tarball, per §4.11). Returns the layers in bottom-up order, for callers that also need
/// the top id (for `repositories`) or the filtered layer list (for `manifest.json`).
fn emit_layer_dirs<W: Write>(
    tar: &mut tar::Builder<W>,
    image: &dyn ConfigImage,
    written: &mut HashSet<String>,
) -> Result<Vec<V1Layer>> {
    let layers = compat::build_v1_layers(image)?;
    for layer in &layers {
        if !written.insert(layer.id.clone()) {
            continue;
        }
        let dir = format!("{}/", layer.id);
        append_dir(tar, &dir)?;
        append_file(tar, &format!("{dir}VERSION"), b"1.0\n")?;
        append_file(tar, &format!("{dir}json"), &json::canonicalize(&layer.compat)?)?;
        let content = uncompressed_layer(image, &layer.digest)?;
        append_file(tar, &format!("{dir}layer.tar"), &content)?;
    }
    Ok(layers)
}

/// Build the `repositories` file contents: `registry/repo -> {tag -> top_layer_id}`.
fn repositories_entry(tags: &[Name], top_id: &str, repositories: &mut BTreeMap<String, BTreeMap<String, String>>) {
    for tag in tags {
        if let Name::Tag { registry, repository, tag } = tag {
            repositories
                .entry(format!("{registry}/{repository}"))
                .or_default()
                .insert(tag.clone(), top_id.to_string());
        }
    }
}

/// Write a v1-layout tarball for an arbitrary number of images: per-image layer-id
/// directories plus a single `repositories` file (§4.11). This is `multi_image_tarball` in
/// `original_source/client/v1/save_.py`; the single-image entry point is [`tarball`].
pub fn write_v1<W: Write>(images: &[Tagged<'_>], tar: &mut tar::Builder<W>) -> Result<()> {
    let mut written = HashSet::new();
    let mut repositories = BTreeMap::new();

    for tagged in images {
        let layers = emit_layer_dirs(tar, tagged.image, &mut written)?;
        let top = layers
            .last()
            .ok_or_else(|| Error::ValueError("image has no layers".to_string()))?;
        repositories_entry(&tagged.tags, &top.id, &mut repositories);
    }

    append_file(tar, "repositories", &json::canonicalize(&repositories)?)?;
    Ok(())
}

/// Write a v1-layout tarball for a single image (§11): everything [`write_v1`] writes, plus
/// a top-level `top` file containing that image's top layer id, matching
/// `original_source/client/v1/save_.py`'s single-image `tarball()` entry point.
pub fn write_v1_single<W: Write>(image: &dyn ConfigImage, tags: Vec<Name>, tar: &mut tar::Builder<W>) -> Result<()> {
    let mut written = HashSet::new();
    let mut repositories = BTreeMap::new();
    let layers = emit_layer_dirs(tar, image, &mut written)?;
    let top = layers
        .last()
        .ok_or_else(|| Error::ValueError("image has no layers".to_string()))?;
    repositories_entry(&tags, &top.id, &mut repositories);

    append_file(tar, "repositories", &json::canonicalize(&repositories)?)?;
    append_file(tar, "top", top.id.as_bytes())?;
    Ok(())
}

/// Write a v2.2-layout tarball: the v1 layout plus one `<sha256>.json` config and one
/// `manifest.json` entry per image (§4.11).
pub fn write_v22<W: Write>(images: &[Tagged<'_>], tar: &mut tar::Builder<W>) -> Result<()> {
    let mut written = HashSet::new();
    let mut repositories = BTreeMap::new();
    let mut manifest_entries = Vec::with_capacity(images.len());

    for tagged in images {
        let layers = emit_layer_dirs(tar, tagged.image, &mut written)?;
        let top = layers
            .last()
            .ok_or_else(|| Error::ValueError("image has no layers".to_string()))?;
        repositories_entry(&tagged.tags, &top.id, &mut repositories);

        let config_bytes = tagged.image.config_file()?;
        let config_name = format!("{}.json", Digest::sha256(&config_bytes).as_hex());
        append_file(tar, &config_name, &config_bytes)?;

        let layer_paths: Vec<String> = layers
            .iter()
            .filter(|l| l.compat.throwaway != Some(true))
            .map(|l| format!("{}/layer.tar", l.id))
            .collect();
        let repo_tags: Vec<String> = tagged.tags.iter().map(Name::to_string).collect();

        manifest_entries.push(serde_json::json!({
            "Config": config_name,
            "Layers": layer_paths,
            "RepoTags": repo_tags,
        }));
    }

    append_file(tar, "manifest.json", &json::canonicalize(&manifest_entries)?)?;
    append_file(tar, "repositories", &json::canonicalize(&repositories)?)?;
    Ok(())
}

/// Writes the fast on-disk layout a bounded worker pool can populate concurrently (§4.11).
pub mod fast {
    use super::*;

    /// Write `image` to `dir` as `config.json` plus zero-padded `NNN.sha256`/`NNN.tar.gz`
    /// pairs, one per [`crate::image::Image::fs_layers`] entry (topmost-first, i.e. on-wire
    /// order). Blobs are written by a pool of `width` worker threads; the first worker
    /// failure cancels the remaining writes and its error is returned.
    pub fn write(image: &dyn ConfigImage, dir: &Path, width: usize) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join("config.json"), image.config_file()?)?;

        let layers = image.fs_layers()?;
        let width = width.max(1).min(layers.len().max(1));
        let cancelled = AtomicBool::new(false);
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        let queue: Vec<(usize, Digest)> = layers.into_iter().enumerate().collect();
        let shards = shard(queue, width);

        std::thread::scope(|scope| {
            for shard in shards {
                let cancelled = &cancelled;
                let failure = &failure;
                scope.spawn(move || {
                    for (index, digest) in shard {
                        if cancelled.load(Ordering::SeqCst) {
                            break;
                        }
                        if let Err(e) = write_one(image, dir, index, &digest) {
                            cancelled.store(true, Ordering::SeqCst);
                            let mut guard = failure.lock().expect("lock poisoned");
                            if guard.is_none() {
                                *guard = Some(e);
                            }
                            break;
                        }
                    }
                });
            }
        });

        match failure.into_inner().expect("lock poisoned") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_one(image: &dyn ConfigImage, dir: &Path, index: usize, digest: &Digest) -> Result<()> {
        let blob = image.blob(digest)?;
        let stem = format!("{index:03}");
        std::fs::write(dir.join(format!("{stem}.sha256")), digest.as_hex())?;
        std::fs::write(dir.join(format!("{stem}.tar.gz")), &blob)?;
        Ok(())
    }

    /// Split `items` round-robin across `width` shards, so each worker's share stays roughly
    /// even regardless of item count.
    fn shard<T>(items: Vec<(usize, T)>, width: usize) -> Vec<Vec<(usize, T)>> {
        let mut shards: Vec<Vec<(usize, T)>> = (0..width).map(|_| Vec::new()).collect();
        for (n, item) in items.into_iter().enumerate() {
            shards[n % width].push(item);
        }
        shards
    }
}
