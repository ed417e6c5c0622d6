//! WebAuthn relying-party integration.
//!
//! Thin layer over `webauthn-rs`: builds the relying party from config and
//! converts between stored credential rows and the library's passkey types.
//! Challenge state is serialized by the caller into a short-lived private
//! cookie between the begin and finish steps.

use crate::auth::store::{User, WebauthnCredentialRecord};
use crate::config::WebauthnConfig;
use anyhow::{Context, Result};
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{Passkey, Webauthn, WebauthnBuilder};

/// Build the relying party from configuration.
pub fn build(config: &WebauthnConfig) -> Result<Webauthn> {
    let rp_origin = Url::parse(&config.rp_origin)
        .with_context(|| format!("Invalid webauthn rp_origin: {}", config.rp_origin))?;

    let webauthn = WebauthnBuilder::new(&config.rp_id, &rp_origin)
        .context("Invalid webauthn relying party configuration")?
        .rp_name(&config.rp_name)
        .build()
        .context("Failed to build webauthn relying party")?;

    Ok(webauthn)
}

/// Stable user handle for the authenticator, derived from the row id.
pub fn user_handle(user: &User) -> Uuid {
    Uuid::from_u128(user.id as u128)
}

/// Deserialize stored credential rows into passkeys.
pub fn passkeys(records: &[WebauthnCredentialRecord]) -> Result<Vec<Passkey>> {
    records
        .iter()
        .map(|record| {
            serde_json::from_str(&record.credential)
                .with_context(|| format!("Corrupt webauthn credential row id={}", record.id))
        })
        .collect()
}

/// Serialize a passkey for storage.
pub fn serialize_passkey(passkey: &Passkey) -> Result<String> {
    serde_json::to_string(passkey).context("Failed to serialize passkey")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_config() -> WebauthnConfig {
        WebauthnConfig {
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:8000".to_string(),
            rp_name: "scopekeep".to_string(),
        }
    }

    #[test]
    fn test_build_relying_party() {
        assert!(build(&test_config()).is_ok());
    }

    #[test]
    fn test_build_rejects_bad_origin() {
        let mut config = test_config();
        config.rp_origin = "not a url".to_string();
        assert!(build(&config).is_err());
    }

    #[test]
    fn test_user_handle_is_stable() {
        let user = User {
            id: 42,
            username: "alice".to_string(),
            password_hash: None,
            email: None,
            active: true,
            roles: vec![],
            totp_secret: None,
            created_at: Utc::now(),
        };
        assert_eq!(user_handle(&user), user_handle(&user));
    }

    #[test]
    fn test_corrupt_credential_row_is_an_error() {
        let record = WebauthnCredentialRecord {
            id: 1,
            user_id: 1,
            name: "yubikey".to_string(),
            credential: "{not json".to_string(),
            created_at: Utc::now(),
        };
        assert!(passkeys(&[record]).is_err());
    }
}
