//! OIDC federated login (authorization-code flow with PKCE).
//!
//! The provider is configured with explicit endpoint URLs; the `email`
//! claim from the userinfo endpoint selects the local account.

use crate::config::OidcConfig;
use anyhow::{Context, Result, anyhow};
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use serde_json::Value;
use url::Url;

type ConfiguredClient = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Configured OIDC provider client.
pub struct OidcClient {
    client: ConfiguredClient,
    userinfo_url: Url,
    scopes: Vec<Scope>,
}

impl OidcClient {
    /// Build the provider client from configuration. The redirect URI is
    /// derived from the externally visible base URL.
    pub fn new(config: &OidcConfig, external_url: &str) -> Result<Self> {
        let redirect_uri = format!(
            "{}/auth/login_oidc_callback",
            external_url.trim_end_matches('/')
        );

        let client = OAuth2Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid oidc.auth_url")?)
            .set_token_uri(
                TokenUrl::new(config.token_url.clone()).context("Invalid oidc.token_url")?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri).context("Invalid OIDC redirect URI")?,
            );

        let userinfo_url =
            Url::parse(&config.userinfo_url).context("Invalid oidc.userinfo_url")?;

        Ok(Self {
            client,
            userinfo_url,
            scopes: config.scopes.iter().cloned().map(Scope::new).collect(),
        })
    }

    /// Build the provider authorization URL plus the CSRF token and PKCE
    /// verifier the callback has to present.
    pub fn authorize_url(&self) -> (Url, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned())
            .set_pkce_challenge(pkce_challenge)
            .url();

        (auth_url, csrf_token, pkce_verifier)
    }

    /// Exchange the authorization code for an access token.
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: String,
        http_client: &reqwest::Client,
    ) -> Result<BasicTokenResponse> {
        self.client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(http_client)
            .await
            .map_err(|e| anyhow!("OIDC token exchange failed: {e}"))
    }

    /// Fetch the userinfo document and return its `email` claim.
    pub async fn fetch_email(
        &self,
        token: &BasicTokenResponse,
        http_client: &reqwest::Client,
    ) -> Result<Option<String>> {
        let userinfo: Value = http_client
            .get(self.userinfo_url.as_str())
            .bearer_auth(token.access_token().secret())
            .header("Accept", "application/json")
            .send()
            .await
            .context("OIDC userinfo request failed")?
            .error_for_status()
            .context("OIDC userinfo endpoint returned an error")?
            .json()
            .await
            .context("OIDC userinfo response was not JSON")?;

        Ok(userinfo
            .get("email")
            .and_then(|e| e.as_str())
            .map(|e| e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> OidcConfig {
        OidcConfig {
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            auth_url: "https://idp.example.org/authorize".to_string(),
            token_url: "https://idp.example.org/token".to_string(),
            userinfo_url: "https://idp.example.org/userinfo".to_string(),
            scopes: vec!["openid".to_string(), "email".to_string()],
        }
    }

    #[test]
    fn test_authorize_url_carries_state_and_pkce() {
        let client = OidcClient::new(&test_config(), "http://localhost:8000").unwrap();
        let (url, csrf, _verifier) = client.authorize_url();

        assert!(url.as_str().starts_with("https://idp.example.org/authorize"));
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(query.iter().any(|(k, v)| k == "state" && v == csrf.secret()));
        assert!(query.iter().any(|(k, _)| k == "code_challenge"));
        assert!(
            query
                .iter()
                .any(|(k, v)| k == "redirect_uri"
                    && v == "http://localhost:8000/auth/login_oidc_callback")
        );
        assert!(query.iter().any(|(k, v)| k == "scope" && v.contains("email")));
    }

    #[test]
    fn test_bad_endpoint_url_is_an_error() {
        let mut config = test_config();
        config.auth_url = "::not-a-url::".to_string();
        assert!(OidcClient::new(&config, "http://localhost:8000").is_err());
    }
}
