//! HTTP server assembly.
//!
//! Builds the shared state (stores, cookie key, optional WebAuthn/OIDC
//! clients), mounts the routers and runs the listener plus the background
//! session reaper.

use crate::auth::oidc::OidcClient;
use crate::auth::store::UserStore;
use crate::auth::{auth_router, webauthn};
use crate::config::Config;
use crate::db::Database;
use crate::storage::{StorageStore, storage_router};
use anyhow::{Context, Result};
use axum::{Router, extract::FromRef, routing::get};
use axum_extra::extract::cookie::Key;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use webauthn_rs::Webauthn;

/// How often the expired-session reaper runs.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// State shared by all routes
#[derive(Clone)]
pub struct AppState {
    /// Users, sessions and WebAuthn credential rows
    pub users: UserStore,
    /// Inventory entities
    pub storage: StorageStore,
    pub config: Arc<Config>,
    /// Key for encrypted (private) cookies
    pub cookie_key: Key,
    /// WebAuthn relying party, when configured
    pub webauthn: Option<Arc<Webauthn>>,
    /// OIDC provider client, when configured
    pub oidc: Option<Arc<OidcClient>>,
    /// Outbound HTTP client (OIDC token/userinfo calls)
    pub http: reqwest::Client,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.cookie_key.clone()
    }
}

/// Build the shared state from configuration and a connected database.
pub fn build_state(config: Config, db: &Database) -> Result<AppState> {
    let cookie_key = if config.server.cookie_secret.is_empty() {
        warn!(
            "No cookie_secret configured; using an ephemeral key (in-flight logins will not survive a restart)"
        );
        Key::generate()
    } else {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&config.server.cookie_secret)
            .context("cookie_secret is not valid base64")?;
        Key::try_from(bytes.as_slice())
            .context("cookie_secret must decode to at least 64 bytes")?
    };

    let webauthn = config
        .webauthn
        .as_ref()
        .map(webauthn::build)
        .transpose()?
        .map(Arc::new);
    if webauthn.is_none() {
        info!("WebAuthn disabled (no [webauthn] configuration)");
    }

    let oidc = config
        .oidc
        .as_ref()
        .map(|c| OidcClient::new(c, &config.server.external_url))
        .transpose()?
        .map(Arc::new);
    if oidc.is_none() {
        info!("OIDC disabled (no [oidc] configuration)");
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("scopekeep/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(15))
        .build()
        .context("Failed to build HTTP client")?;

    let pool = db.pool();
    Ok(AppState {
        users: UserStore::new(pool.clone()),
        storage: StorageStore::new(pool),
        config: Arc::new(config),
        cookie_key,
        webauthn,
        oidc,
        http,
    })
}

/// Assemble the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(crate::storage::routes::dashboard))
        .nest("/auth", auth_router())
        .nest("/storage", storage_router())
        .with_state(state)
}

/// Run the HTTP server until the process is terminated.
pub async fn run_server(config: Config, db: Database) -> Result<()> {
    let listen_addr = config.server.listen_addr.clone();
    let state = build_state(config, &db)?;

    // Reap expired sessions periodically; validation also drops them lazily.
    let cleanup_users = state.users.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            match cleanup_users.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired sessions removed"),
                Err(e) => warn!(error = %e, "Session cleanup failed"),
            }
        }
    });

    let app = build_router(state);
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    info!("HTTP server listening on {}", listen_addr);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}
