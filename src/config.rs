//! Configuration loading for the scopekeep daemon.
//!
//! Loads configuration from TOML files and/or environment variables using figment.
//!
//! # Configuration Sources (in order of priority, lowest to highest)
//!
//! 1. Default values (from `#[serde(default)]` attributes)
//! 2. TOML config file (if provided)
//! 3. Environment variables (prefix: `SCOPEKEEP_`, nested with `__`)
//!
//! # Environment Variable Naming
//!
//! - `SCOPEKEEP_SERVER__LISTEN_ADDR` → `server.listen_addr`
//! - `SCOPEKEEP_SERVER__COOKIE_SECRET` → `server.cookie_secret`
//! - `SCOPEKEEP_DATABASE__PATH` → `database.path`
//! - `SCOPEKEEP_OIDC__CLIENT_ID` → `oidc.client_id`

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the scopekeep daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// WebAuthn relying-party settings.
    ///
    /// When absent, WebAuthn login and credential registration are disabled.
    #[serde(default)]
    pub webauthn: Option<WebauthnConfig>,

    /// OIDC federated-login settings.
    ///
    /// When absent, `/auth/login_oidc` reports "OIDC not enabled".
    #[serde(default)]
    pub oidc: Option<OidcConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Externally visible base URL, used for OIDC redirect URIs and the
    /// WebAuthn origin default.
    #[serde(default = "default_external_url")]
    pub external_url: String,

    /// Session lifetime in seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Base64-encoded key for private (encrypted) cookies; at least 64
    /// bytes once decoded. When empty a random key is generated at boot,
    /// which invalidates in-flight login state across restarts.
    #[serde(default)]
    pub cookie_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            external_url: default_external_url(),
            session_timeout_secs: default_session_timeout(),
            cookie_secret: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_external_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_session_timeout() -> u64 {
    36000
}

/// WebAuthn relying-party configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebauthnConfig {
    /// Relying party id, usually the effective domain (e.g. "example.org").
    pub rp_id: String,

    /// Origin the browser reports (scheme + host + port).
    pub rp_origin: String,

    /// Human-readable relying party name shown by authenticators.
    #[serde(default = "default_rp_name")]
    pub rp_name: String,
}

fn default_rp_name() -> String {
    "scopekeep".to_string()
}

/// OIDC provider configuration (authorization-code flow with PKCE).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OidcConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Authorization endpoint of the provider.
    pub auth_url: String,

    /// Token endpoint of the provider.
    pub token_url: String,

    /// Userinfo endpoint; the `email` claim selects the local account.
    pub userinfo_url: String,

    /// Scopes requested from the provider.
    #[serde(default = "default_oidc_scopes")]
    pub scopes: Vec<String>,
}

fn default_oidc_scopes() -> Vec<String> {
    vec!["openid".to_string(), "email".to_string()]
}

// =============================================================================
// Database Configuration (compile-time feature selection)
// =============================================================================

/// SQLite database configuration (used when compiled with `sqlite` feature).
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    /// If not specified, defaults to `scopekeep.db` in the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// PostgreSQL database configuration (used when compiled with `postgres` feature).
#[cfg(feature = "postgres")]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host (default: "localhost")
    #[serde(default = "default_postgres_host")]
    pub host: String,

    /// Database port (default: 5432)
    #[serde(default = "default_postgres_port")]
    pub port: u16,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name (default: "scopekeep")
    #[serde(default = "default_postgres_database")]
    pub database: String,
}

#[cfg(feature = "postgres")]
fn default_postgres_host() -> String {
    "localhost".to_string()
}

#[cfg(feature = "postgres")]
fn default_postgres_port() -> u16 {
    5432
}

#[cfg(feature = "postgres")]
fn default_postgres_database() -> String {
    "scopekeep".to_string()
}

#[cfg(feature = "postgres")]
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            user: String::new(),
            password: String::new(),
            database: default_postgres_database(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Configuration sources are merged in order (later sources override earlier):
    /// 1. TOML config file (if it exists)
    /// 2. Environment variables (prefix: `SCOPEKEEP_`, nested with `__`)
    pub fn load(path: &Path) -> Result<Self> {
        let mut figment = Figment::new();

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("SCOPEKEEP_").split("__"));

        let config: Config = figment.extract().with_context(|| {
            format!(
                "Failed to load config from {} and environment",
                path.display()
            )
        })?;

        Ok(config)
    }

    /// Get the default config file path
    /// - macOS: ~/Library/Application Support/scopekeep/config.toml
    /// - Linux: ~/.config/scopekeep/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scopekeep")
            .join("config.toml")
    }

    /// Get the default data directory (database, logs)
    /// - macOS: ~/Library/Application Support/scopekeep/
    /// - Linux: ~/.local/share/scopekeep/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scopekeep")
    }
}

/// Create a default configuration template
pub fn default_config_template() -> String {
    let data_dir = Config::default_data_dir();
    let data_dir_str = data_dir.display();

    format!(
        r#"# scopekeep configuration
# Data directory: {data_dir_str}

[server]
listen_addr = "127.0.0.1:8000"
external_url = "http://localhost:8000"
session_timeout_secs = 36000
# Base64 key for encrypted cookies; leave empty to generate at boot.
# cookie_secret = ""

# SQLite configuration (when compiled with --features sqlite)
[database]
# path = "{data_dir_str}/scopekeep.db"  # Optional

# PostgreSQL configuration (when compiled with --features postgres)
# [database]
# host = "localhost"
# port = 5432
# user = "scopekeep"
# password = "secret"
# database = "scopekeep"

# WebAuthn relying party; remove the section to disable WebAuthn login.
[webauthn]
rp_id = "localhost"
rp_origin = "http://localhost:8000"
rp_name = "scopekeep"

# OIDC federated login; remove the section to disable it.
# [oidc]
# client_id = "..."
# client_secret = "..."
# auth_url = "https://idp.example.org/authorize"
# token_url = "https://idp.example.org/token"
# userinfo_url = "https://idp.example.org/userinfo"
# scopes = ["openid", "email"]
"#
    )
}
