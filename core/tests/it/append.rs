use bytes::Bytes;
use stevedore_core::{
    append::Layer,
    image::{ConfigFile, ConfigImage, Descriptor, HistoryEntry, Image, ManifestV22, RootFs, Static},
    media_type::{ConfigMediaType, LayerMediaType, ManifestMediaType},
    Digest,
};

fn empty_base() -> Box<dyn ConfigImage> {
    let config = ConfigFile {
        architecture: "amd64".to_string(),
        os: "linux".to_string(),
        created: None,
        author: None,
        config: Default::default(),
        container_config: Default::default(),
        container: None,
        docker_version: None,
        history: vec![],
        rootfs: RootFs::default(),
        extra: Default::default(),
    };
    let config_bytes = Bytes::from(serde_json::to_vec(&config).expect("config"));
    let manifest = ManifestV22 {
        schema_version: 2,
        media_type: ManifestMediaType::DockerV22.to_string(),
        config: Descriptor {
            media_type: ConfigMediaType::Docker.to_string(),
            size: config_bytes.len() as u64,
            digest: Digest::sha256(&config_bytes),
        },
        layers: vec![],
    };
    let manifest_bytes = Bytes::from(serde_json::to_vec(&manifest).expect("manifest"));
    Box::new(
        Static::new(manifest_bytes, config_bytes, |d: &Digest| {
            Err(stevedore_core::Error::ValueError(format!("no blobs on the empty base image: {d}")))
        })
        .expect("static"),
    )
}

fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("write");
    encoder.finish().expect("finish")
}

/// A base with one pre-existing layer, to check the new layer lands at index 0 and the old
/// one is still there behind it, rather than only checking the reversed `fs_layers()` view.
fn base_with_one_layer() -> Box<dyn ConfigImage> {
    let raw = b"pre-existing layer contents";
    let gzipped = Bytes::from(gzip(raw));
    let existing_digest = Digest::sha256(&gzipped);
    let existing_diff_id = Digest::sha256(raw);

    let config = ConfigFile {
        architecture: "amd64".to_string(),
        os: "linux".to_string(),
        created: None,
        author: None,
        config: Default::default(),
        container_config: Default::default(),
        container: None,
        docker_version: None,
        history: vec![HistoryEntry {
            created_by: Some("/bin/sh -c echo base".to_string()),
            ..Default::default()
        }],
        rootfs: RootFs {
            kind: "layers".to_string(),
            diff_ids: vec![existing_diff_id],
        },
        extra: Default::default(),
    };
    let config_bytes = Bytes::from(serde_json::to_vec(&config).expect("config"));
    let manifest = ManifestV22 {
        schema_version: 2,
        media_type: ManifestMediaType::DockerV22.to_string(),
        config: Descriptor {
            media_type: ConfigMediaType::Docker.to_string(),
            size: config_bytes.len() as u64,
            digest: Digest::sha256(&config_bytes),
        },
        layers: vec![Descriptor {
            media_type: LayerMediaType::DockerTarGzip.to_string(),
            size: gzipped.len() as u64,
            digest: existing_digest.clone(),
        }],
    };
    let manifest_bytes = Bytes::from(serde_json::to_vec(&manifest).expect("manifest"));
    Box::new(
        Static::new(manifest_bytes, config_bytes, move |d: &Digest| {
            if *d == existing_digest {
                Ok(gzipped.clone())
            } else {
                Err(stevedore_core::Error::ValueError(format!("unexpected digest: {d}")))
            }
        })
        .expect("static"),
    )
}

/// Invariant #6 / S4: appending onto a base that already has a layer must prepend the new
/// descriptor/diff_id/history entry at index 0, not append them at the end.
#[test]
fn append_prepends_onto_non_empty_base() {
    let base = base_with_one_layer();
    let base_manifest = base.manifest_v22().expect("base manifest");
    let base_diff_ids = base.config().expect("base config").rootfs.diff_ids;
    assert_eq!(base_manifest.layers.len(), 1);

    let raw = b"new layer contents";
    let tar_gz = Bytes::from(gzip(raw));
    let new_digest = Digest::sha256(&tar_gz);
    let new_diff_id = Digest::sha256(raw);

    let layer = Layer::new(base, Some(tar_gz)).expect("append");

    let manifest = layer.manifest_v22().expect("manifest");
    assert_eq!(manifest.layers.len(), 2);
    assert_eq!(manifest.layers[0].digest, new_digest);
    assert_eq!(manifest.layers[0].media_type, LayerMediaType::DockerTarGzip.to_string());
    assert_eq!(manifest.layers[1], base_manifest.layers[0]);

    let config = layer.config().expect("config");
    assert_eq!(config.rootfs.diff_ids.len(), 2);
    assert_eq!(config.rootfs.diff_ids[0], new_diff_id);
    assert_eq!(config.rootfs.diff_ids[1..], base_diff_ids[..]);

    assert_eq!(config.history.len(), 2);
    assert_eq!(config.history[0].created_by.as_deref(), Some(stevedore_core::USER_AGENT));
    assert_eq!(config.history[1].created_by.as_deref(), Some("/bin/sh -c echo base"));

    // topmost-first fs_layers() must still put the new layer first.
    let fs_layers = layer.fs_layers().expect("fs_layers");
    assert_eq!(fs_layers[0], new_digest);
    assert_eq!(fs_layers[1], base_manifest.layers[0].digest);
}

/// S4: appending an empty (metadata-only) layer onto a K-layer base yields K+1 layers, whose
/// new entry is the well-known empty-tar digest, and one extra `empty_layer: true` history
/// entry.
#[test]
fn append_empty_layer() {
    let base = empty_base();
    let base_layers = base.fs_layers().expect("fs_layers").len();

    let layer = Layer::new(base, None).expect("append");
    let fs_layers = layer.fs_layers().expect("fs_layers");

    assert_eq!(fs_layers.len(), base_layers + 1);
    assert_eq!(
        fs_layers[0].to_string(),
        "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4"
    );

    let config = layer.config().expect("config");
    let last = config.history.last().expect("history entry");
    assert_eq!(last.empty_layer, Some(true));
}
