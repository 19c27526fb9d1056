//! The v1 "chain ID": a deterministic identifier for a layer that also commits to every
//! layer beneath it in the stack, used as the `{layer_id}` directory name in a v1 tarball
//! and as the `id`/`parent` fields of each layer's `v1Compatibility` JSON.
//!
//! Computed as `sha256_hex(<layer digest hex> " " <parent chain id> [" " <raw config>])`,
//! where the raw config suffix is appended only for the topmost layer (the one whose
//! v1Compatibility embeds the full container config rather than just history metadata).
//! This formula has to be byte-exact, since two independent images sharing a base must
//! compute the same chain id for every shared layer — get the separator or ordering wrong
//! and two bit-identical layers would be assigned different ids.

use crate::Digest;

/// Compute the chain id for a layer.
///
/// `layer_digest` is the layer's own content digest. `parent` is the parent layer's chain
/// id (empty string for the bottommost layer, matching the reference implementation, which
/// seeds the chain with an empty parent rather than an `Option`). `raw_config` is `Some` only
/// when computing the topmost layer's chain id, and should be the exact bytes of the image's
/// config blob as the registry stored it.
pub fn compute(layer_digest: &Digest, parent: &str, raw_config: Option<&[u8]>) -> String {
    let mut input = format!("{} {}", layer_digest.as_hex(), parent);
    if let Some(config) = raw_config {
        input.push(' ');
        input.push_str(&String::from_utf8_lossy(config));
    }
    Digest::sha256(input.as_bytes()).as_hex()
}

/// Compute the full bottom-to-top chain of ids for a stack of layer digests, given the raw
/// config bytes for the topmost layer.
///
/// Returns one chain id per input layer, in the same bottom-to-top order as `layers`.
pub fn compute_chain(layers: &[Digest], raw_config: &[u8]) -> Vec<String> {
    let mut chain = Vec::with_capacity(layers.len());
    let mut parent = String::new();
    for (i, layer) in layers.iter().enumerate() {
        let is_top = i == layers.len() - 1;
        let id = compute(layer, &parent, is_top.then_some(raw_config));
        chain.push(id.clone());
        parent = id;
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_layer_uses_empty_parent_and_config() {
        let digest = Digest::sha256(b"layer-one");
        let config = br#"{"architecture":"amd64"}"#;
        let chain = compute_chain(&[digest.clone()], config);
        assert_eq!(chain.len(), 1);
        let expected = compute(&digest, "", Some(config));
        assert_eq!(chain[0], expected);
    }

    #[test]
    fn multi_layer_chains_through_parent() {
        let bottom = Digest::sha256(b"bottom");
        let top = Digest::sha256(b"top");
        let config = br#"{"architecture":"amd64"}"#;
        let chain = compute_chain(&[bottom.clone(), top.clone()], config);
        assert_eq!(chain.len(), 2);

        let bottom_id = compute(&bottom, "", None);
        let top_id = compute(&top, &bottom_id, Some(config));
        assert_eq!(chain[0], bottom_id);
        assert_eq!(chain[1], top_id);
    }

    #[test]
    fn is_deterministic() {
        let digest = Digest::sha256(b"same-bytes");
        let a = compute(&digest, "parent", None);
        let b = compute(&digest, "parent", None);
        assert_eq!(a, b);
    }
}
