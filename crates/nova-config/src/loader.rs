// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/nova/config.yaml"));
    paths.push(PathBuf::from("/etc/nova/config.yml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("nova/config.yaml"));
        paths.push(cfg.join("nova/config.yml"));
    }

    paths.push(PathBuf::from(".nova/config.yaml"));
    paths.push(PathBuf::from(".nova/config.yml"));
    paths.push(PathBuf::from("nova.yaml"));
    paths.push(PathBuf::from("nova.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then an explicit
/// override path (e.g. a `--config` CLI flag), then environment overrides.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Overlays the recognized environment keys from the external-interfaces
/// section: embeddings (optional, degrades gracefully) and the database URL.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(url) = std::env::var("EMBEDDINGS_URL") {
        config.embeddings.url = Some(url);
    }
    if let Ok(model) = std::env::var("EMBEDDINGS_MODEL") {
        config.embeddings.model = Some(model);
    }
    if std::env::var("EMBEDDINGS_API_KEY").is_ok() {
        config.embeddings.api_key_env = Some("EMBEDDINGS_API_KEY".into());
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = Some(url);
    }
    if let Ok(tz) = std::env::var("NOVA_CRON_TZ") {
        config.scheduler.default_tz = tz;
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}
