use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub const ENV_PROFILE: &str = "NEXA_PROFILE";
pub const ENV_DESKTOP: &str = "NEXA_DESKTOP";
pub const ENV_BACKEND_URL: &str = "NEXA_BACKEND_URL";
pub const ENV_WS_URL: &str = "NEXA_WS_URL";
pub const ENV_MAX_ATTEMPTS: &str = "NEXA_MAX_RECONNECT_ATTEMPTS";
pub const ENV_BASE_DELAY_MS: &str = "NEXA_RECONNECT_BASE_MS";
pub const ENV_CONFIG_FILE: &str = "NEXA_CONFIG";

/// Deployment profile; selects reconnect constants and the default backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionProfile {
    /// Bundled app with a co-located backend that may still be booting.
    Desktop,
    #[default]
    Browser,
}

impl ConnectionProfile {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" | "tauri" => Some(Self::Desktop),
            "browser" | "web" => Some(Self::Browser),
            _ => None,
        }
    }

    pub fn reconnect(self) -> ReconnectSettings {
        match self {
            Self::Desktop => ReconnectSettings {
                max_attempts: 10,
                base_delay_ms: 1_000,
                initial_delay_ms: 2_000,
            },
            Self::Browser => ReconnectSettings {
                max_attempts: 5,
                base_delay_ms: 3_000,
                initial_delay_ms: 0,
            },
        }
    }

    pub fn default_backend_url(self) -> &'static str {
        match self {
            Self::Desktop => "http://127.0.0.1:8000",
            Self::Browser => "http://localhost:8000",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Delay before the very first connect of a hub.
    pub initial_delay_ms: u64,
}

impl ReconnectSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// On-disk overrides; every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub profile: Option<ConnectionProfile>,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub initial_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub profile: ConnectionProfile,
    pub backend_url: Url,
    pub ws_url: Url,
    pub reconnect: ReconnectSettings,
}

impl SyncConfig {
    pub fn for_profile(profile: ConnectionProfile) -> Self {
        let backend_url = Url::parse(profile.default_backend_url())
            .unwrap_or_else(|_| unreachable!("profile URLs are static and valid"));
        let ws_url = derive_ws_url(&backend_url)
            .unwrap_or_else(|_| unreachable!("profile URLs are http"));
        Self {
            profile,
            backend_url,
            ws_url,
            reconnect: profile.reconnect(),
        }
    }

    /// Absolute URL for a backend REST path such as `/api/canvas/`.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.backend_url.as_str().trim_end_matches('/');
        format!("{base}/{}", path.trim_start_matches('/'))
    }

    /// Profile defaults, then `file`, then environment (read through `lookup`).
    pub fn resolve<F>(file: Option<&FileConfig>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let env_profile = match lookup(ENV_PROFILE) {
            Some(value) => Some(ConnectionProfile::parse(&value).ok_or(ConfigError::InvalidEnv {
                name: ENV_PROFILE,
                value,
            })?),
            None if lookup(ENV_DESKTOP).is_some_and(|v| is_truthy(&v)) => {
                Some(ConnectionProfile::Desktop)
            }
            None => None,
        };
        let profile = env_profile
            .or_else(|| file.and_then(|f| f.profile))
            .unwrap_or_default();

        let mut config = Self::for_profile(profile);

        if let Some(file) = file {
            if let Some(url) = &file.backend_url {
                config.set_backend_url(url)?;
            }
            if let Some(url) = &file.ws_url {
                config.ws_url = parse_url(url)?;
            }
            if let Some(value) = file.max_attempts {
                config.reconnect.max_attempts = value;
            }
            if let Some(value) = file.base_delay_ms {
                config.reconnect.base_delay_ms = value;
            }
            if let Some(value) = file.initial_delay_ms {
                config.reconnect.initial_delay_ms = value;
            }
        }

        if let Some(url) = lookup(ENV_BACKEND_URL) {
            config.set_backend_url(&url)?;
        }
        if let Some(url) = lookup(ENV_WS_URL) {
            config.ws_url = parse_url(&url)?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            config.reconnect.max_attempts = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: ENV_MAX_ATTEMPTS, value })?;
        }
        if let Some(value) = lookup(ENV_BASE_DELAY_MS) {
            config.reconnect.base_delay_ms = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: ENV_BASE_DELAY_MS, value })?;
        }

        Ok(config)
    }

    /// Replaces the backend URL and re-derives the socket URL from it.
    pub fn set_backend_url(&mut self, url: &str) -> Result<(), ConfigError> {
        self.backend_url = parse_url(url)?;
        self.ws_url = derive_ws_url(&self.backend_url)?;
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_url(url: &str) -> Result<Url, ConfigError> {
    Url::parse(url.trim()).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// `http://host:port/prefix` → `ws://host:port/prefix/ws`.
pub fn derive_ws_url(backend: &Url) -> Result<Url, ConfigError> {
    let scheme = match backend.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => backend.scheme(),
        other => {
            return Err(ConfigError::InvalidUrl {
                url: backend.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            });
        }
    };
    let mut ws = backend.clone();
    ws.set_scheme(scheme).map_err(|_| ConfigError::InvalidUrl {
        url: backend.to_string(),
        reason: "cannot switch to a websocket scheme".to_string(),
    })?;
    let path = format!("{}/ws", backend.path().trim_end_matches('/'));
    ws.set_path(&path);
    ws.set_query(None);
    Ok(ws)
}

pub fn config_file_path(dir: &Path) -> PathBuf {
    dir.join("nexa-sync.json")
}

/// A missing file is not an error; a present but malformed one is.
pub fn load_file_config(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
