// src/config/mod.rs
//! Application configuration: `config/predictor.toml` (optional) + env overrides.
//!
//! Resolution order, later wins: built-in defaults, TOML file at
//! `$PREDICTOR_CONFIG_PATH` (default `config/predictor.toml`), environment.
//! A missing TOML file is not an error.

pub mod ai;

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::history::DEFAULT_CACHE_PATH;
use crate::lms::types::CourseFilter;
use crate::lms::RefreshLimits;
use crate::ratings::DEFAULT_RATINGS_ENDPOINT;

pub const DEFAULT_PREDICTOR_CONFIG_PATH: &str = "config/predictor.toml";
pub const ENV_PREDICTOR_CONFIG_PATH: &str = "PREDICTOR_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    pub base_url: String,
    pub api_token: String,
    /// Canvas `enrollment_state` filter; empty means no filter.
    pub enrollment_state: String,
    pub per_page: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: String::new(),
            enrollment_state: String::new(),
            per_page: 100,
        }
    }
}

impl CanvasConfig {
    pub fn course_filter(&self) -> CourseFilter {
        CourseFilter {
            enrollment_state: Some(self.enrollment_state.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RatingsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_RATINGS_ENDPOINT.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub call_timeout_ms: u64,
    pub refresh_concurrency: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            refresh_concurrency: 4,
        }
    }
}

impl LimitsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.max(1))
    }

    pub fn refresh_limits(&self) -> RefreshLimits {
        RefreshLimits {
            call_timeout: self.call_timeout(),
            concurrency: self.refresh_concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub canvas: CanvasConfig,
    pub ratings: RatingsConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load `.env`, the TOML file (if present), then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(ENV_PREDICTOR_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PREDICTOR_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(s) => Self::from_toml_str(&s)
                .with_context(|| format!("parsing predictor config {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no predictor config file; using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading predictor config {}", path.display()))
            }
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(v) = env_nonempty("CANVAS_BASE_URL") {
            self.canvas.base_url = v;
        }
        if let Some(v) = env_nonempty("CANVAS_API_TOKEN") {
            self.canvas.api_token = v;
        }
        if let Some(v) = env_nonempty("PREDICTOR_CACHE_PATH") {
            self.cache.path = PathBuf::from(v);
        }
        if let Some(v) = env_nonempty("APP_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_nonempty("APP_PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("APP_PORT must be a port number, got {v:?}"))?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid listen address {}:{}",
                    self.server.host, self.server.port
                )
            })
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
