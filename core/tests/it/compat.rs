use bytes::Bytes;
use stevedore_core::{
    compat::{v22_from_v2, V2FromV22},
    image::{ConfigFile, ConfigImage, Descriptor, HistoryEntry, Image, ManifestV22, RootFs, Static},
    media_type::{ConfigMediaType, LayerMediaType, ManifestMediaType},
    Digest, Error,
};

/// Builds the minimal v2.2 image S3 (§8) describes: one non-empty layer, one history entry.
fn minimal_v22() -> Box<dyn ConfigImage> {
    let raw_layer = b"hello from a single layer";
    let gzipped = Bytes::from(
        flate2_compress(raw_layer),
    );
    let layer_digest = Digest::sha256(&gzipped);
    let diff_id = Digest::sha256(raw_layer);

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
            created_by: Some("/bin/sh".to_string()),
            ..Default::default()
        }],
        rootfs: RootFs {
            kind: "layers".to_string(),
            diff_ids: vec![diff_id],
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
            digest: layer_digest.clone(),
        }],
    };
    let manifest_bytes = Bytes::from(serde_json::to_vec(&manifest).expect("manifest"));

    Box::new(
        Static::new(manifest_bytes, config_bytes, move |d: &Digest| {
            if *d == layer_digest {
                Ok(gzipped.clone())
            } else {
                Err(Error::ValueError(format!("unexpected digest: {d}")))
            }
        })
        .expect("static"),
    )
}

/// Minimal deterministic gzip without reaching into the crate's private `gzip` module.
fn flate2_compress(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("write");
    encoder.finish().expect("finish")
}

/// S3: transcoding a minimal v2.2 image to v2 and back preserves layer digests and the
/// config's identifying fields.
#[test]
fn v2_v22_idempotent() {
    let v22 = minimal_v22();
    let expected_layers = v22.fs_layers().expect("fs_layers");
    let expected_diff_ids = v22.config().expect("config").rootfs.diff_ids;

    let v2 = V2FromV22::new(v22).expect("v2 view");
    assert_eq!(v2.media_type().expect("media_type"), ManifestMediaType::DockerV1Signed);
    assert_eq!(v2.fs_layers().expect("fs_layers"), expected_layers);

    let back = v22_from_v2(Box::new(v2)).expect("back to v2.2");
    assert_eq!(back.fs_layers().expect("fs_layers"), expected_layers);
    let back_config = back.config().expect("config");
    assert_eq!(back_config.architecture, "amd64");
    assert_eq!(back_config.os, "linux");
    assert_eq!(back_config.rootfs.diff_ids, expected_diff_ids);
}
