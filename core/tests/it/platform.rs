use proptest::prelude::*;
use stevedore_core::Platform;

fn feature_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z0-9]{2,6}", 0..4)
}

fn platform_strategy() -> impl Strategy<Value = Platform> {
    (
        prop_oneof!["amd64".to_string(), "arm64".to_string(), "arm".to_string()],
        prop_oneof!["linux".to_string(), "windows".to_string(), "darwin".to_string()],
        feature_strategy(),
        feature_strategy(),
    )
        .prop_map(|(architecture, os, os_features, features)| Platform {
            architecture,
            os,
            os_version: None,
            os_features,
            variant: None,
            features,
        })
}

proptest! {
    /// Invariant #7 (§8): platform matching is reflexive.
    #[test]
    fn can_run_is_reflexive(platform in platform_strategy()) {
        prop_assert!(platform.can_run(Some(&platform)));
    }

    /// Invariant #7 (§8): a null required platform matches anything.
    #[test]
    fn null_required_always_matches(platform in platform_strategy()) {
        prop_assert!(platform.can_run(None));
    }

    /// Invariant #7 (§8): `can_run` respects the required-subset relation on features —
    /// widening a candidate's feature set can only make it satisfy more requirements, never
    /// fewer, for requirements built from the same base platform.
    #[test]
    fn wider_feature_set_cannot_lose_compatibility(
        mut platform in platform_strategy(),
        extra in "[a-z0-9]{2,6}",
    ) {
        let required = Platform {
            features: platform.features.clone(),
            ..platform.clone()
        };
        prop_assert!(platform.can_run(Some(&required)));
        if !platform.features.contains(&extra) {
            platform.features.push(extra);
        }
        prop_assert!(platform.can_run(Some(&required)));
    }
}

#[test]
fn mismatched_os_never_matches() {
    let linux = Platform::linux_amd64();
    let windows_required = Platform {
        os: Platform::WINDOWS.to_string(),
        ..Platform::default_target()
    };
    assert!(!linux.can_run(Some(&windows_required)));
}
