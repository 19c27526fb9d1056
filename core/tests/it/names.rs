use proptest::prelude::*;
use simple_test_case::test_case;
use std::str::FromStr;
use stevedore_core::Name;

/// S1: a tag name round-trips through parse/display exactly.
#[test]
fn tag_round_trip() {
    let s = "gcr.io/proj/image:latest";
    let name = Name::from_str(s).expect("parse");
    match &name {
        Name::Tag { registry, repository, tag } => {
            assert_eq!(registry, "gcr.io");
            assert_eq!(repository, "proj/image");
            assert_eq!(tag, "latest");
        }
        other => panic!("expected Tag, got {other:?}"),
    }
    assert_eq!(name.to_string(), s);
}

/// S1: a digest name round-trips, preserving the full `sha256:<hex>` digest.
#[test]
fn digest_round_trip() {
    let hex = "a".repeat(64);
    let s = format!("gcr.io/proj/image@sha256:{hex}");
    let name = Name::from_str(&s).expect("parse");
    match &name {
        Name::Digest { digest, .. } => assert_eq!(digest.to_string(), format!("sha256:{hex}")),
        other => panic!("expected Digest, got {other:?}"),
    }
    assert_eq!(name.to_string(), s);
}

#[test_case("gcr.io/proj/image:latest"; "tag with multi-segment repo")]
#[test_case("docker.io/library/ubuntu:20.04"; "simple tag")]
#[test_case("localhost:5000/foo/bar:v1"; "registry with port")]
#[test_case("registry.example.com/a/b/c"; "bare repository")]
fn known_round_trips(s: &str) {
    let name = Name::from_str(s).expect("parse");
    assert_eq!(name.to_string(), s);
}

fn registry_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}(\\.[a-z][a-z0-9-]{0,10}){0,2}"
}

fn repository_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{2,10}(/[a-z0-9_.-]{2,10}){0,2}".prop_filter("at least 4 chars", |s| s.len() >= 4)
}

fn tag_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9_.-]{0,20}"
}

proptest! {
    /// Invariant #3 (§8): every accepted `registry/repository:tag` string round-trips
    /// byte-exactly through parse then display.
    #[test]
    fn tag_name_round_trips(registry in registry_strategy(), repository in repository_strategy(), tag in tag_strategy()) {
        let input = format!("{registry}/{repository}:{tag}");
        let name = Name::from_str(&input).expect("parse");
        prop_assert_eq!(name.to_string(), input);
    }

    /// Invariant #3 (§8): every accepted `registry/repository` string (no tag) round-trips.
    #[test]
    fn repository_name_round_trips(registry in registry_strategy(), repository in repository_strategy()) {
        let input = format!("{registry}/{repository}");
        let name = Name::from_str(&input).expect("parse");
        prop_assert_eq!(name.to_string(), input);
    }

    /// Tag/Digest equality and hashing ignore the registry (§3), so two names built
    /// from different registries but identical repository/tag must compare equal.
    #[test]
    fn tag_equality_ignores_registry(
        registry_a in registry_strategy(),
        registry_b in registry_strategy(),
        repository in repository_strategy(),
        tag in tag_strategy(),
    ) {
        let a = Name::tag_of(registry_a, repository.clone(), tag.clone()).expect("build a");
        let b = Name::tag_of(registry_b, repository, tag).expect("build b");
        prop_assert_eq!(a, b);
    }
}
