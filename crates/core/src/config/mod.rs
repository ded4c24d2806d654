//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SHELLCACHE_*)
//! 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SHELLCACHE_*, nested keys split on `__`)
/// 2. TOML config file (if SHELLCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite store database.
    ///
    /// Set via SHELLCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Identifier of the generation this deploy installs.
    ///
    /// Must change on every deploy; activation deletes every other generation.
    /// Set via SHELLCACHE_GENERATION environment variable.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Origin of the application the worker is attached to.
    ///
    /// Relative manifest entries resolve against it, and it decides whether a
    /// request is same-origin. Set via SHELLCACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SHELLCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SHELLCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes buffered per response.
    ///
    /// Set via SHELLCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Number of manifest assets fetched at once during population.
    ///
    /// Set via SHELLCACHE_POPULATE_CONCURRENCY environment variable.
    #[serde(default = "default_populate_concurrency")]
    pub populate_concurrency: usize,

    /// Take over as soon as population finishes instead of waiting for a
    /// `SKIP_WAITING` message.
    ///
    /// Set via SHELLCACHE_SKIP_WAITING_ON_INSTALL environment variable.
    #[serde(default = "default_true")]
    pub skip_waiting_on_install: bool,

    /// Assets written into a new generation at install time.
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Host and path tables used to pick a strategy per request.
    #[serde(default)]
    pub routes: RouteConfig,
}

/// Asset manifest, split into the offline shell and best-effort data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Shell assets (markup, icons, manifest). SHELLCACHE_MANIFEST__SHELL.
    #[serde(default = "default_shell_assets")]
    pub shell: Vec<String>,

    /// Data assets. SHELLCACHE_MANIFEST__DATA.
    #[serde(default)]
    pub data: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self { shell: default_shell_assets(), data: Vec::new() }
    }
}

/// Classification tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Hosts serving the remote API (network-first).
    #[serde(default = "default_api_hosts")]
    pub api_hosts: Vec<String>,

    /// Path prefixes that denote API calls on any host (network-first).
    #[serde(default = "default_api_path_prefixes")]
    pub api_path_prefixes: Vec<String>,

    /// Path prefix of the tabular data namespace (stale-while-revalidate).
    #[serde(default = "default_data_path_prefix")]
    pub data_path_prefix: String,

    /// File extensions of row-oriented data files under `data_path_prefix`.
    #[serde(default = "default_data_extensions")]
    pub data_extensions: Vec<String>,

    /// Hosts serving images (cache-first).
    #[serde(default = "default_image_hosts")]
    pub image_hosts: Vec<String>,

    /// Image file extensions (cache-first).
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Style, script and markup extensions of the shell (cache-first).
    #[serde(default = "default_shell_extensions")]
    pub shell_extensions: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            api_hosts: default_api_hosts(),
            api_path_prefixes: default_api_path_prefixes(),
            data_path_prefix: default_data_path_prefix(),
            data_extensions: default_data_extensions(),
            image_hosts: default_image_hosts(),
            image_extensions: default_image_extensions(),
            shell_extensions: default_shell_extensions(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./shellcache.sqlite")
}

fn default_generation() -> String {
    "shellcache-v1".into()
}

fn default_origin() -> String {
    "http://localhost:8080/".into()
}

fn default_user_agent() -> String {
    "shellcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_populate_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_shell_assets() -> Vec<String> {
    [
        "./",
        "./index.html",
        "./site.webmanifest",
        "./apple-touch-icon.png",
        "./favicon-32x32.png",
        "./favicon-16x16.png",
        "./favicon.ico",
        "./android-chrome-192x192.png",
        "./android-chrome-512x512.png",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_api_hosts() -> Vec<String> {
    vec!["rebrickable.com".into()]
}

fn default_api_path_prefixes() -> Vec<String> {
    vec!["/api/".into()]
}

fn default_data_path_prefix() -> String {
    "/data/".into()
}

fn default_data_extensions() -> Vec<String> {
    vec!["csv".into(), "tsv".into()]
}

fn default_image_hosts() -> Vec<String> {
    vec!["cdn.rebrickable.com".into(), "m.rebrickable.com".into()]
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_shell_extensions() -> Vec<String> {
    ["css", "js", "html", "webmanifest"].into_iter().map(String::from).collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            generation: default_generation(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            populate_concurrency: default_populate_concurrency(),
            skip_waiting_on_install: true,
            manifest: ManifestConfig::default(),
            routes: RouteConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed application origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        let parsed = url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SHELLCACHE_`
    /// 2. TOML file from `SHELLCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SHELLCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SHELLCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
