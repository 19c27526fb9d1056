use bytes::Bytes;
use stevedore_core::{flatten::extract, image::Image, media_type::ManifestMediaType, Digest, Error, Result};

struct FakeLayers(Vec<(Digest, Vec<u8>)>);

impl Image for FakeLayers {
    fn manifest(&self) -> Result<Bytes> {
        Ok(Bytes::new())
    }

    fn media_type(&self) -> Result<ManifestMediaType> {
        Ok(ManifestMediaType::DockerV22)
    }

    fn blob(&self, digest: &Digest) -> Result<Bytes> {
        self.0
            .iter()
            .find(|(d, _)| d == digest)
            .map(|(_, b)| Bytes::from(b.clone()))
            .ok_or_else(|| Error::ValueError(format!("unknown digest: {digest}")))
    }

    fn fs_layers(&self) -> Result<Vec<Digest>> {
        Ok(self.0.iter().map(|(d, _)| d.clone()).collect())
    }
}

fn tar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).expect("append");
    }
    builder.into_inner().expect("into_inner")
}

fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("write");
    encoder.finish().expect("finish")
}

/// S5 (§8): bottom layer has `/a/x` and `/a/y`; top layer whites out `/a/x` and adds `/a/z`.
/// Flatten must emit `/a/y` and `/a/z`, but neither `/a/x` nor the `.wh.x` marker itself.
#[test]
fn whiteout_scenario_drops_whited_out_file() {
    let bottom = tar_with(&[("a/x", b"x"), ("a/y", b"y")]);
    let top = tar_with(&[("a/.wh.x", b""), ("a/z", b"z")]);

    let bottom_gz = gzip(&bottom);
    let top_gz = gzip(&top);
    let bottom_digest = Digest::sha256(&bottom_gz);
    let top_digest = Digest::sha256(&top_gz);

    // topmost-first, per `Image::fs_layers`'s documented ordering.
    let image = FakeLayers(vec![(top_digest, top_gz), (bottom_digest, bottom_gz)]);

    let mut buf = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut buf);
        extract(&image, &mut builder).expect("extract");
        builder.finish().expect("finish");
    }

    let mut archive = tar::Archive::new(buf.as_slice());
    let names: Vec<String> = archive
        .entries()
        .expect("entries")
        .map(|e| e.expect("entry").path().expect("path").to_string_lossy().into_owned())
        .collect();

    assert!(names.contains(&"a/y".to_string()));
    assert!(names.contains(&"a/z".to_string()));
    assert!(!names.iter().any(|n| n.contains("x")));
    assert!(!names.iter().any(|n| n.contains(".wh.")));
}
