//! Collapses an image's layer stack into a single filesystem tar (§4.12), honoring
//! whiteout (`.wh.`) tombstones.
//!
//! Grounded on `original_source/client/v2_2/docker_image_.py`'s `extract`/`_in_whiteout_dir`.

use crate::{image::Image, Result};
use std::{
    collections::HashMap,
    io::{Cursor, Read},
    path::Path,
};

const WHITEOUT_PREFIX: &str = ".wh.";

fn normalize(dirname: &str, basename: &str) -> String {
    let joined = if dirname.is_empty() || dirname == "." {
        basename.to_string()
    } else {
        format!("{dirname}/{basename}")
    };
    let mut out = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(part),
        }
    }
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

fn in_whiteout_dir(seen: &HashMap<String, bool>, name: &str) -> bool {
    let mut name = name;
    loop {
        let dirname = match name.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => return false,
        };
        if dirname == name || dirname.is_empty() {
            return false;
        }
        if seen.get(dirname).copied().unwrap_or(false) {
            return true;
        }
        name = dirname;
    }
}

/// Extract `image`'s final filesystem into `tar`, applying whiteouts (§4.12).
///
/// Walks layers topmost-first; the first layer to mention a path (by name, post-whiteout-
/// prefix-stripping) wins, and a tombstone or a non-directory entry shadows the same name in
/// every layer below it.
pub fn extract<I: Image + ?Sized, W: std::io::Write>(image: &I, tar: &mut tar::Builder<W>) -> Result<()> {
    let mut seen: HashMap<String, bool> = HashMap::new();

    for layer_digest in image.fs_layers()? {
        let blob = image.uncompressed_blob(&layer_digest)?;
        let mut layer_tar = tar::Archive::new(Cursor::new(blob));

        for entry in layer_tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let (dirname, basename) = match path.rsplit_once('/') {
                Some((d, b)) => (d, b),
                None => ("", path.as_str()),
            };

            let tombstone = basename.starts_with(WHITEOUT_PREFIX);
            let basename = if tombstone {
                &basename[WHITEOUT_PREFIX.len()..]
            } else {
                basename
            };

            let name = normalize(dirname, basename);
            if seen.contains_key(&name) {
                continue;
            }
            if in_whiteout_dir(&seen, &name) {
                continue;
            }

            let is_dir = entry.header().entry_type().is_dir();
            seen.insert(name, tombstone || !is_dir);

            if tombstone {
                continue;
            }

            let header = entry.header().clone();
            if entry.header().entry_type().is_file() {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                tar.append(&header, Cursor::new(buf))?;
            } else {
                tar.append(&header, std::io::empty())?;
            }
        }
    }
    Ok(())
}

/// Extract `image`'s final filesystem directly to the tar file at `path`.
pub fn extract_to_file<I: Image + ?Sized>(image: &I, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut builder = tar::Builder::new(file);
    extract(image, &mut builder)?;
    builder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Digest;
    use bytes::Bytes;

    #[test]
    fn normalize_collapses_dot_and_dotdot() {
        assert_eq!(normalize("a/b", "c"), "a/b/c");
        assert_eq!(normalize(".", "c"), "c");
        assert_eq!(normalize("a/..", "c"), "c");
    }

    #[test]
    fn whiteout_dir_detection() {
        let mut seen = HashMap::new();
        seen.insert("a/b".to_string(), true);
        assert!(in_whiteout_dir(&seen, "a/b/c"));
        assert!(!in_whiteout_dir(&seen, "a/x"));
    }

    struct FakeLayers(Vec<(Digest, Vec<u8>)>);

    impl Image for FakeLayers {
        fn manifest(&self) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        fn media_type(&self) -> Result<crate::media_type::ManifestMediaType> {
            Ok(crate::media_type::ManifestMediaType::DockerV22)
        }

        fn blob(&self, digest: &Digest) -> Result<Bytes> {
            self.0
                .iter()
                .find(|(d, _)| d == digest)
                .map(|(_, b)| Bytes::from(b.clone()))
                .ok_or_else(|| crate::Error::ValueError(format!("unknown digest: {digest}")))
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

    /// S5: bottom layer has `/a/x` and `/a/y`; top layer whites out `/a/x` and adds `/a/z`.
    /// Flatten must emit `/a/y` and `/a/z` but neither `/a/x` nor the `.wh.x` marker itself.
    #[test]
    fn whiteout_scenario_drops_whited_out_file() {
        let bottom = tar_with(&[("a/x", b"x"), ("a/y", b"y")]);
        let top = tar_with(&[("a/.wh.x", b""), ("a/z", b"z")]);

        let bottom_gz = crate::gzip::compress(&bottom, crate::gzip::EPOCH_MTIME).expect("gzip");
        let top_gz = crate::gzip::compress(&top, crate::gzip::EPOCH_MTIME).expect("gzip");
        let bottom_digest = Digest::sha256(&bottom_gz);
        let top_digest = Digest::sha256(&top_gz);

        // topmost-first per `Image::fs_layers`'s documented ordering.
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
}
