//! Authentication module.
//!
//! Provides:
//! - User and session storage (password hashing, session lifecycle)
//! - TOTP second factor
//! - WebAuthn public-key credentials
//! - OIDC federated login
//! - Login/logout/profile routes

pub mod oidc;
pub mod routes;
pub mod session;
pub mod store;
pub mod totp;
pub mod webauthn;

pub use routes::auth_router;
pub use store::{User, UserStore};
