use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sigmaguard::ServiceConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub default: Option<Profile>,
    pub profiles: Option<HashMap<String, Profile>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Profile {
    /// Postgres connection string. Without one the server keeps everything in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidate_on_train: Option<bool>,
    /// Base URL client commands talk to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl Profile {
    /// Merge another profile into this one (other takes priority for set fields).
    pub fn merge(&mut self, other: &Profile) {
        fn take<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
            if other.is_some() {
                slot.clone_from(other);
            }
        }
        take(&mut self.connection, &other.connection);
        take(&mut self.listen_addr, &other.listen_addr);
        take(&mut self.model_ttl_secs, &other.model_ttl_secs);
        take(&mut self.prediction_ttl_secs, &other.prediction_ttl_secs);
        take(&mut self.store_timeout_ms, &other.store_timeout_ms);
        take(&mut self.invalidate_on_train, &other.invalidate_on_train);
        take(&mut self.server_url, &other.server_url);
    }

    pub fn listen_addr(&self) -> &str {
        self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR)
    }

    pub fn server_url(&self) -> String {
        match &self.server_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen_addr()),
        }
    }

    /// Core settings, with unset fields falling back to the library defaults.
    pub fn service_config(&self) -> ServiceConfig {
        let defaults = ServiceConfig::default();
        ServiceConfig {
            model_ttl: self
                .model_ttl_secs
                .map_or(defaults.model_ttl, Duration::from_secs),
            prediction_ttl: self
                .prediction_ttl_secs
                .map_or(defaults.prediction_ttl, Duration::from_secs),
            store_timeout: self
                .store_timeout_ms
                .map_or(defaults.store_timeout, Duration::from_millis),
            invalidate_on_train: self
                .invalidate_on_train
                .unwrap_or(defaults.invalidate_on_train),
            log_capacity: defaults.log_capacity,
        }
    }
}

/// Walk up from `start` looking for `.sigmaguard/config.toml`.
pub fn find_project_config_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(".sigmaguard").join("config.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn find_project_config() -> Option<PathBuf> {
    find_project_config_from(&std::env::current_dir().ok()?)
}

/// Global config path: `~/.config/sigmaguard/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sigmaguard").join("config.toml"))
}

fn load_file(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            eprintln!("Warning: ignoring {}: {e}", path.display());
            None
        }
    }
}

fn apply(result: &mut Profile, cfg: &ConfigFile, profile_name: &str) {
    if let Some(default) = &cfg.default {
        result.merge(default);
    }
    if profile_name != "default" {
        if let Some(named) = cfg.profiles.as_ref().and_then(|p| p.get(profile_name)) {
            result.merge(named);
        }
    }
}

/// Resolve a profile by name, merging global defaults → project defaults → named profile.
pub fn load_config(profile_name: &str) -> Profile {
    let mut result = Profile::default();

    for path in [global_config_path(), find_project_config()].into_iter().flatten() {
        if let Some(cfg) = load_file(&path) {
            apply(&mut result, &cfg, profile_name);
        }
    }

    result
}

/// Write a project config with a `[default]` profile under `root/.sigmaguard/`.
pub fn write_project_config(root: &Path, profile: &Profile) -> Result<PathBuf, String> {
    let dir = root.join(".sigmaguard");
    std::fs::create_dir_all(&dir).map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;

    let mut doc = toml::Table::new();
    let default = toml::Value::try_from(profile).map_err(|e| format!("Invalid profile: {e}"))?;
    doc.insert("default".into(), default);
    let text = toml::to_string_pretty(&doc).map_err(|e| format!("Invalid profile: {e}"))?;

    let path = dir.join("config.toml");
    std::fs::write(&path, text).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
    Ok(path)
}
