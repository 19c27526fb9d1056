use serde_json::Value;
use std::collections::BTreeMap;
use stevedore_core::{
    image::{ConfigFile, RootFs},
    metadata::{apply, Overrides},
};

fn config_with_env(env: &[&str]) -> ConfigFile {
    let mut config = serde_json::Map::new();
    config.insert(
        "Env".to_string(),
        Value::from(env.iter().map(|s| s.to_string()).collect::<Vec<_>>()),
    );
    ConfigFile {
        architecture: "amd64".to_string(),
        os: "linux".to_string(),
        created: None,
        author: None,
        config,
        container_config: Default::default(),
        container: None,
        docker_version: None,
        history: vec![],
        rootfs: RootFs::default(),
        extra: Default::default(),
    }
}

/// S6: `Env=["PATH=/bin"]` plus override `{"PATH": "$PATH:/opt/bin", "FOO": "bar"}` yields
/// `Env = ["FOO=bar", "PATH=/bin:/opt/bin"]`, sorted.
#[test]
fn metadata_override_resolves_and_sorts_env() {
    let config = config_with_env(&["PATH=/bin"]);

    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), "$PATH:/opt/bin".to_string());
    env.insert("FOO".to_string(), "bar".to_string());
    let overrides = Overrides {
        env,
        ..Default::default()
    };

    let out = apply(&config, &overrides, "amd64", "linux").expect("apply");
    let env_list: Vec<String> = out
        .config
        .get("Env")
        .and_then(|v| v.as_array())
        .expect("Env array")
        .iter()
        .map(|v| v.as_str().expect("string entry").to_string())
        .collect();

    assert_eq!(env_list, vec!["FOO=bar".to_string(), "PATH=/bin:/opt/bin".to_string()]);
}
