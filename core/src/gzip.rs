//! Deterministic gzip compression and decompression over in-memory buffers.
//!
//! `original_source/client/v2_2/docker_image_.py` produces reproducible gzip output by
//! monkeypatching `gzip.time.time` to return a fixed value for the duration of the write —
//! global mutable state that would be a misfeature in a library meant to be used
//! concurrently. REDESIGN FLAG: this crate takes an explicit `mtime` parameter instead
//! (see `SPEC_FULL.md` §5), threaded through every call site that needs byte-exact gzip
//! output (`save.rs`'s tarball writer, `compat.rs`'s round-trip tests).

use crate::Result;
use flate2::{read::GzDecoder, GzBuilder};
use std::io::{Read, Write};

/// The epoch gzip header timestamp the reference implementation hardcodes
/// (`1970-01-01T00:00:00Z`), used whenever a caller doesn't care about a specific mtime.
pub const EPOCH_MTIME: u32 = 0;

/// Gzip-compress `data`, embedding `mtime` (seconds since the Unix epoch) in the gzip
/// header instead of the current time, so that compressing the same bytes twice produces
/// byte-identical output.
pub fn compress(data: &[u8], mtime: u32) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new().mtime(mtime).write(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Gunzip `data` into a fresh buffer.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Whether `data` looks like a gzip stream (checks the two-byte magic number).
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}
