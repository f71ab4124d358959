//! Client configuration.
//!
//! `ToolboxConfig` is read from a JSON file and then overlaid with
//! `TOOLBOX_*` environment variables. It only carries public endpoints and
//! tokens meant for the client; it never holds server secrets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::resolve_optional_supabase_config;
use crate::error::{Error, Result};
use crate::remote::SyncConfig;
use crate::session::SessionOptions;
use crate::sync::GatewayOptions;
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "TOOLBOX_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "TOOLBOX_SUPABASE_ANON_KEY";
pub const ENV_DATABASE_URL: &str = "TOOLBOX_DATABASE_URL";
pub const ENV_DATABASE_TOKEN: &str = "TOOLBOX_DATABASE_TOKEN";
pub const ENV_SYNC_ENABLED: &str = "TOOLBOX_SYNC_ENABLED";
pub const ENV_DATABASE_PATH: &str = "TOOLBOX_DATABASE_PATH";
pub const ENV_CACHE_PATH: &str = "TOOLBOX_CACHE_PATH";

const DATABASE_FILE_NAME: &str = "documents.db";
const CACHE_FILE_NAME: &str = "cache.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolboxConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    /// Remote replica URL (`libsql://` or `https://`)
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub database_token: Option<String>,
    /// Local document database file; defaults to the app data dir
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Local cache file; defaults to the app data dir
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Initial sync flag for a fresh install; defaults to on
    #[serde(default)]
    pub sync_enabled_by_default: Option<bool>,
    /// Background replica sync interval in seconds
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
    /// Remote call timeout in seconds; 0 disables the timeout
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl ToolboxConfig {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))
    }

    /// Load from `path`. A missing file yields the default config.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(payload) => Self::from_json(&payload),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}", path.display());
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overlay values from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`; blank values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| normalize_text_option(lookup(name));
        if let Some(value) = read(ENV_SUPABASE_URL) {
            self.supabase_url = Some(value);
        }
        if let Some(value) = read(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = Some(value);
        }
        if let Some(value) = read(ENV_DATABASE_URL) {
            self.database_url = Some(value);
        }
        if let Some(value) = read(ENV_DATABASE_TOKEN) {
            self.database_token = Some(value);
        }
        if let Some(value) = read(ENV_DATABASE_PATH) {
            self.database_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read(ENV_CACHE_PATH) {
            self.cache_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read(ENV_SYNC_ENABLED) {
            match parse_flag(&value) {
                Some(flag) => self.sync_enabled_by_default = Some(flag),
                None => tracing::warn!(
                    "Ignoring {}={}: expected true or false",
                    ENV_SYNC_ENABLED,
                    compact_text(&value)
                ),
            }
        }
        self
    }

    /// Supabase URL and anon key, when both are present.
    pub fn supabase(&self) -> Result<Option<(String, String)>> {
        let resolved = resolve_optional_supabase_config(
            self.supabase_url.clone(),
            self.supabase_anon_key.clone(),
        )
        .map_err(|_| {
            Error::Config("supabase_url and supabase_anon_key must be set together".to_string())
        })?;
        if let Some((url, _)) = &resolved {
            if !is_http_url(url) {
                return Err(Error::Config(
                    "supabase_url must include http:// or https://".to_string(),
                ));
            }
        }
        Ok(resolved)
    }

    /// Replica settings, when a remote database is configured.
    pub fn replica(&self) -> Result<Option<SyncConfig>> {
        let url = normalize_text_option(self.database_url.clone());
        let token = normalize_text_option(self.database_token.clone());
        match (url, token) {
            (None, None) => Ok(None),
            (Some(url), Some(token)) => {
                if !(url.starts_with("libsql://") || is_http_url(&url)) {
                    return Err(Error::Config(
                        "database_url must use libsql://, http:// or https://".to_string(),
                    ));
                }
                let mut config = SyncConfig::new(url, token);
                if let Some(secs) = self.sync_interval_secs {
                    config = if secs == 0 {
                        config.without_auto_sync()
                    } else {
                        config.with_sync_interval(Duration::from_secs(secs))
                    };
                }
                Ok(Some(config))
            }
            _ => Err(Error::Config(
                "database_url and database_token must be set together".to_string(),
            )),
        }
    }

    /// Local document database file, under `data_dir` unless overridden.
    pub fn database_path_in(&self, data_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DATABASE_FILE_NAME))
    }

    /// Local cache file, under `data_dir` unless overridden.
    pub fn cache_path_in(&self, data_dir: &Path) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| data_dir.join(CACHE_FILE_NAME))
    }

    pub fn session_options(&self) -> SessionOptions {
        let operation_timeout = match self.operation_timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => GatewayOptions::default().operation_timeout,
        };
        SessionOptions {
            sync_enabled_by_default: self.sync_enabled_by_default.unwrap_or(true),
            gateway: GatewayOptions { operation_timeout },
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn unknown_fields_are_rejected() {
        let error = ToolboxConfig::from_json(r#"{"supabase_url": "x", "extra": 1}"#).unwrap_err();
        assert!(error.to_string().contains("invalid config JSON"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env = HashMap::from([
            (ENV_SUPABASE_URL, "https://env.supabase.co"),
            (ENV_SUPABASE_ANON_KEY, "  "),
            (ENV_SYNC_ENABLED, "off"),
        ]);
        let config = ToolboxConfig {
            supabase_url: Some("https://file.supabase.co".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            ..ToolboxConfig::default()
        }
        .with_overrides(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.supabase_url.as_deref(), Some("https://env.supabase.co"));
        assert_eq!(config.supabase_anon_key.as_deref(), Some("anon"));
        assert_eq!(config.sync_enabled_by_default, Some(false));
        assert!(!config.session_options().sync_enabled_by_default);
    }

    #[test]
    fn half_configured_endpoints_are_errors() {
        let config = ToolboxConfig {
            database_url: Some("libsql://db.turso.io".to_string()),
            ..ToolboxConfig::default()
        };
        assert!(config.replica().is_err());

        let config = ToolboxConfig {
            supabase_anon_key: Some("anon".to_string()),
            ..ToolboxConfig::default()
        };
        assert!(config.supabase().is_err());
    }

    #[test]
    fn replica_config_honors_interval() {
        let config = ToolboxConfig {
            database_url: Some("libsql://db.turso.io".to_string()),
            database_token: Some("token".to_string()),
            sync_interval_secs: Some(0),
            ..ToolboxConfig::default()
        };
        let replica = config.replica().unwrap().unwrap();
        assert_eq!(replica.sync_interval, None);
    }

    #[test]
    fn local_paths_default_to_data_dir() {
        let data_dir = Path::new("/data/toolbox");
        let config = ToolboxConfig {
            cache_path: Some(PathBuf::from("/tmp/cache.json")),
            ..ToolboxConfig::default()
        };
        assert_eq!(
            config.database_path_in(data_dir),
            data_dir.join("documents.db")
        );
        assert_eq!(config.cache_path_in(data_dir), PathBuf::from("/tmp/cache.json"));
    }

    #[test]
    fn timeout_defaults_and_can_be_disabled() {
        let defaults = ToolboxConfig::default().session_options();
        assert!(defaults.sync_enabled_by_default);
        assert_eq!(defaults.gateway, GatewayOptions::default());

        let config = ToolboxConfig {
            operation_timeout_secs: Some(0),
            ..ToolboxConfig::default()
        };
        assert_eq!(config.session_options().gateway.operation_timeout, None);
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        assert_eq!(
            ToolboxConfig::load_from_path(&path).unwrap(),
            ToolboxConfig::default()
        );

        let config = ToolboxConfig {
            sync_interval_secs: Some(30),
            ..ToolboxConfig::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(ToolboxConfig::load_from_path(&path).unwrap(), config);
    }
}
