//! Merges build-time overrides into a v2.2 config file (§4.13): entrypoint/cmd/user/workdir
//! replacement, env/label merging with `$VAR` expansion, port/volume additions, and appending
//! one layer's worth of `rootfs.diff_ids`/`history`.
//!
//! Grounded on `original_source/transform/v2_2/metadata_.py`'s `Override`. That source
//! resolves `$VAR` references by temporarily replacing `os.environ`, which is process-global
//! and not thread-safe; [`resolve`] does the same expansion purely against the caller-local
//! environment map instead.

use crate::{
    image::{ConfigFile, HistoryEntry, RootFs},
    Digest, Result,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const EPOCH: &str = "0001-01-01T00:00:00Z";

/// Build-time overrides to merge into an existing config (§4.13).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Bare hex sha256 diff ids of new layers, bottom-up, appended to `rootfs.diff_ids`.
    pub layers: Vec<String>,
    /// Replaces `config.Entrypoint` if set.
    pub entrypoint: Option<Vec<String>>,
    /// Replaces `config.Cmd` if set.
    pub cmd: Option<Vec<String>>,
    /// Replaces `config.User` if set.
    pub user: Option<String>,
    /// Merged into `config.Env`, each value resolved against the env so far.
    pub env: BTreeMap<String, String>,
    /// Merged into `config.Label`.
    pub labels: BTreeMap<String, String>,
    /// Added to `config.ExposedPorts`; a bare port number defaults to `/tcp`.
    pub ports: Vec<String>,
    /// Added to `config.Volumes`.
    pub volumes: Vec<String>,
    /// Replaces `config.WorkingDir` if set.
    pub workdir: Option<String>,
    /// The new config's `author`, and the new history entry's `author`. Defaults to
    /// `"Unknown"`.
    pub author: Option<String>,
    /// The new history entry's `created_by`. Defaults to `"Unknown"`.
    pub created_by: Option<String>,
}

/// Produce a new config from `data` plus `options` (§4.13).
///
/// Only `config`, `rootfs.diff_ids`, and `history` carry over from `data`; every other field
/// (including unrecognized ones in `data.extra`) is dropped, since the result is meant to be
/// a from-scratch spec-conformant config rather than a patch.
pub fn apply(data: &ConfigFile, options: &Overrides, architecture: &str, os: &str) -> Result<ConfigFile> {
    let mut config = data.config.clone();

    if let Some(entrypoint) = &options.entrypoint {
        config.insert("Entrypoint".to_string(), Value::from(entrypoint.clone()));
    }
    if let Some(cmd) = &options.cmd {
        config.insert("Cmd".to_string(), Value::from(cmd.clone()));
    }
    if let Some(user) = &options.user {
        config.insert("User".to_string(), Value::from(user.clone()));
    }

    if !options.env.is_empty() {
        let mut env = key_value_to_map(config.get("Env"));
        for (k, v) in &options.env {
            let resolved = resolve(v, &env);
            env.insert(k.clone(), resolved);
        }
        config.insert("Env".to_string(), map_to_key_value(&env));
    }

    if !options.labels.is_empty() {
        let mut labels = key_value_to_map(config.get("Label"));
        for (k, v) in &options.labels {
            labels.insert(k.clone(), v.clone());
        }
        config.insert("Label".to_string(), map_to_key_value(&labels));
    }

    if !options.ports.is_empty() {
        let mut exposed = config
            .get("ExposedPorts")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        for p in &options.ports {
            let key = if p.contains('/') { p.clone() } else { format!("{p}/tcp") };
            exposed.insert(key, Value::Object(Map::new()));
        }
        config.insert("ExposedPorts".to_string(), Value::Object(exposed));
    }

    if !options.volumes.is_empty() {
        let mut volumes = config
            .get("Volumes")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        for p in &options.volumes {
            volumes.insert(p.clone(), Value::Object(Map::new()));
        }
        config.insert("Volumes".to_string(), Value::Object(volumes));
    }

    if let Some(workdir) = &options.workdir {
        config.insert("WorkingDir".to_string(), Value::from(workdir.clone()));
    }

    let mut diff_ids = data.rootfs.diff_ids.clone();
    for hex in &options.layers {
        diff_ids.push(Digest::from_sha256_hex(hex)?);
    }

    let author = options.author.clone().unwrap_or_else(|| "Unknown".to_string());
    let created_by = options.created_by.clone().unwrap_or_else(|| "Unknown".to_string());

    let mut history = data.history.clone();
    history.push(HistoryEntry {
        created: Some(EPOCH.to_string()),
        created_by: Some(created_by),
        author: Some(author.clone()),
        comment: None,
        empty_layer: None,
    });

    Ok(ConfigFile {
        architecture: architecture.to_string(),
        os: os.to_string(),
        created: Some(EPOCH.to_string()),
        author: Some(author),
        config,
        container_config: Map::new(),
        container: None,
        docker_version: None,
        history,
        rootfs: RootFs {
            kind: "layers".to_string(),
            diff_ids,
        },
        extra: BTreeMap::new(),
    })
}

fn key_value_to_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(Value::Array(items)) = value {
        for item in items {
            if let Some((k, v)) = item.as_str().and_then(|s| s.split_once('=')) {
                out.insert(k.to_string(), v.to_string());
            }
        }
    }
    out
}

fn map_to_key_value(map: &BTreeMap<String, String>) -> Value {
    Value::Array(map.iter().map(|(k, v)| Value::from(format!("{k}={v}"))).collect())
}

/// Expand `$VAR`/`${VAR}` references in `value` against `environment`, leaving unresolved
/// references untouched (matching shell/`expandvars` semantics).
fn resolve(value: &str, environment: &BTreeMap<String, String>) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() {
            if chars[i + 1] == '{' {
                if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    match environment.get(&name) {
                        Some(v) => out.push_str(v),
                        None => out.push_str(&format!("${{{name}}}")),
                    }
                    i += 2 + end + 1;
                    continue;
                }
            } else if chars[i + 1].is_ascii_alphabetic() || chars[i + 1] == '_' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match environment.get(&name) {
                    Some(v) => out.push_str(v),
                    None => {
                        out.push('$');
                        out.push_str(&name);
                    }
                }
                i = end;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}
