//! Login, logout and profile route handlers.
//!
//! The login flow branches on what the account carries: password only →
//! session straight away; password + TOTP seed → second-factor step;
//! no password submitted but WebAuthn credentials on file → assertion
//! step; OIDC is a separate entry point that matches accounts by email.

use crate::auth::session::{
    self, CurrentUser, OIDC_CSRF_COOKIE, OIDC_PKCE_COOKIE, SESSION_COOKIE, TOTP_PENDING_COOKIE,
    WEBAUTHN_PENDING_COOKIE, WEBAUTHN_REG_STATE_COOKIE, WEBAUTHN_STATE_COOKIE, clear_login_state,
    clear_session_cookie, pending_user, session_cookie, state_cookie,
};
use crate::auth::store::{User, UserStore};
use crate::auth::{totp, webauthn};
use crate::error::{ApiErrorResponse, WebError};
use crate::server::AppState;
use crate::web::flash;
use crate::web::templates::{
    CredentialSummary, LoginTemplate, ProfileTemplate, TotpTemplate, WebauthnLoginTemplate,
};
use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use webauthn_rs::prelude::{
    PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential,
};

/// Build the auth router, mounted under `/auth`.
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/login_totp", get(login_totp_page).post(login_totp_submit))
        .route("/login_webauthn_pkcro", post(login_webauthn_pkcro))
        .route(
            "/login_webauthn",
            get(login_webauthn_page).post(login_webauthn_submit),
        )
        .route("/login_oidc", get(login_oidc))
        .route("/login_oidc_callback", get(login_oidc_callback))
        .route("/profile", get(profile))
        .route(
            "/profile/webauthn/register_pkcco",
            post(webauthn_register_begin),
        )
        .route("/profile/webauthn/register", post(webauthn_register_finish))
        .route(
            "/profile/webauthn/delete/{credential_id}",
            post(webauthn_delete),
        )
}

fn render<T: Template>(template: T) -> Result<Html<String>, WebError> {
    Ok(Html(template.render()?))
}

fn profile_json(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "roles": user.roles,
    })
}

fn invalid_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorResponse::new(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials.",
        )),
    )
        .into_response()
}

/// Mint a fresh session and drop every pre-auth cookie.
async fn establish_session(
    state: &AppState,
    jar: PrivateCookieJar,
    user: &User,
) -> Result<(PrivateCookieJar, CookieJar), WebError> {
    let session_id = state
        .users
        .create_session(user.id, state.config.server.session_timeout_secs)
        .await?;
    let jar = clear_login_state(jar);
    let cookies = CookieJar::new().add(session_cookie(&session_id));
    Ok((jar, cookies))
}

// -- password ---------------------------------------------------------------

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: Option<String>,
}

async fn login_page(jar: PrivateCookieJar) -> Result<Response, WebError> {
    let (jar, flashes) = flash::take(jar);
    Ok((jar, render(LoginTemplate { flashes })?).into_response())
}

async fn login_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let user = state
        .users
        .get_user_by_username(&form.username)
        .await?
        .filter(|u| u.active);

    let Some(user) = user else {
        return Ok(invalid_credentials());
    };

    match form.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => {
            let password_ok = user
                .password_hash
                .as_deref()
                .is_some_and(|hash| UserStore::verify_password(password, hash));
            if !password_ok {
                return Ok(invalid_credentials());
            }

            if user.totp_secret.is_some() {
                let jar = jar.add(state_cookie(TOTP_PENDING_COOKIE, user.id.to_string()));
                return Ok((jar, Redirect::to("/auth/login_totp")).into_response());
            }

            let (jar, cookies) = establish_session(&state, jar, &user).await?;
            info!("auth.login password");
            Ok((jar, cookies, Json(profile_json(&user))).into_response())
        }
        None => {
            // No password submitted: offer the WebAuthn flow when the
            // account has credentials on file.
            let has_credentials = !state.users.webauthn_credentials(user.id).await?.is_empty();
            if has_credentials && state.webauthn.is_some() {
                let jar = jar.add(state_cookie(WEBAUTHN_PENDING_COOKIE, user.id.to_string()));
                return Ok((jar, Redirect::to("/auth/login_webauthn")).into_response());
            }
            Ok(invalid_credentials())
        }
    }
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, WebError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.users.delete_session(cookie.value()).await?;
    }
    info!("auth.logout");

    let jar = jar.add(clear_session_cookie());
    Ok((jar, Json(json!({"message": "Successfully logged out."}))).into_response())
}

// -- TOTP -------------------------------------------------------------------

#[derive(Deserialize)]
struct TotpForm {
    code: String,
}

async fn login_totp_page(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    if pending_user(&state, &jar, TOTP_PENDING_COOKIE).await?.is_none() {
        return Err(WebError::Unauthenticated);
    }
    Ok(render(TotpTemplate { error: None })?.into_response())
}

async fn login_totp_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<TotpForm>,
) -> Result<Response, WebError> {
    let Some(user) = pending_user(&state, &jar, TOTP_PENDING_COOKIE).await? else {
        return Err(WebError::Unauthenticated);
    };

    let verified = user
        .totp_secret
        .as_deref()
        .is_some_and(|secret| totp::verify_code(secret, &form.code, Utc::now().timestamp()));

    if verified {
        let (jar, cookies) = establish_session(&state, jar, &user).await?;
        info!("auth.login totp");
        return Ok((jar, cookies, Redirect::to("/")).into_response());
    }

    Ok(render(TotpTemplate {
        error: Some("Invalid code".to_string()),
    })?
    .into_response())
}

// -- WebAuthn ---------------------------------------------------------------

/// Begin passkey authentication: returns the JSON challenge the browser
/// passes to `navigator.credentials.get`.
async fn login_webauthn_pkcro(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    let Some(user) = pending_user(&state, &jar, WEBAUTHN_PENDING_COOKIE).await? else {
        return Err(WebError::BadRequest("no pending webauthn login".to_string()));
    };
    let Some(relying_party) = state.webauthn.as_deref() else {
        return Err(WebError::BadRequest("webauthn not enabled".to_string()));
    };

    let records = state.users.webauthn_credentials(user.id).await?;
    let passkeys = webauthn::passkeys(&records)?;
    if passkeys.is_empty() {
        return Err(WebError::BadRequest("no registered credentials".to_string()));
    }

    let (challenge, auth_state) = relying_party
        .start_passkey_authentication(&passkeys)
        .map_err(|e| WebError::Webauthn(e.to_string()))?;

    let jar = jar.add(state_cookie(
        WEBAUTHN_STATE_COOKIE,
        serde_json::to_string(&auth_state)?,
    ));
    Ok((jar, Json(challenge)).into_response())
}

async fn login_webauthn_page(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    if pending_user(&state, &jar, WEBAUTHN_PENDING_COOKIE).await?.is_none() {
        return Err(WebError::Unauthenticated);
    }
    let (jar, flashes) = flash::take(jar);
    Ok((jar, render(WebauthnLoginTemplate { flashes })?).into_response())
}

#[derive(Deserialize)]
struct WebauthnLoginForm {
    /// JSON-encoded `PublicKeyCredential` from the browser.
    assertion: String,
}

async fn login_webauthn_submit(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Form(form): Form<WebauthnLoginForm>,
) -> Result<Response, WebError> {
    let Some(user) = pending_user(&state, &jar, WEBAUTHN_PENDING_COOKIE).await? else {
        return Err(WebError::Unauthenticated);
    };
    let Some(relying_party) = state.webauthn.as_deref() else {
        return Err(WebError::BadRequest("webauthn not enabled".to_string()));
    };

    match verify_assertion(&state, relying_party, &user, &jar, &form.assertion).await {
        Ok(()) => {
            let (jar, cookies) = establish_session(&state, jar, &user).await?;
            info!("auth.login webauthn");
            Ok((jar, cookies, Redirect::to("/")).into_response())
        }
        Err(err) => {
            warn!(error = %err, "webauthn authentication failed");
            let jar = flash::push(jar, "error", "Login error during Webauthn authentication.");
            Ok((jar, Redirect::to("/auth/login_webauthn")).into_response())
        }
    }
}

/// Complete the assertion and persist an updated signature counter.
async fn verify_assertion(
    state: &AppState,
    relying_party: &webauthn_rs::Webauthn,
    user: &User,
    jar: &PrivateCookieJar,
    assertion: &str,
) -> anyhow::Result<()> {
    use anyhow::{Context, anyhow};

    let auth_state: PasskeyAuthentication = jar
        .get(WEBAUTHN_STATE_COOKIE)
        .ok_or_else(|| anyhow!("missing webauthn challenge state"))
        .and_then(|c| serde_json::from_str(c.value()).context("corrupt webauthn challenge state"))?;

    let credential: PublicKeyCredential =
        serde_json::from_str(assertion).context("malformed assertion")?;

    let result = relying_party
        .finish_passkey_authentication(&credential, &auth_state)
        .map_err(|e| anyhow!("assertion rejected: {e}"))?;

    let records = state.users.webauthn_credentials(user.id).await?;
    for record in records {
        let mut passkey = webauthn::passkeys(std::slice::from_ref(&record))?.remove(0);
        if passkey.cred_id() == result.cred_id()
            && passkey.update_credential(&result) == Some(true)
        {
            state
                .users
                .update_webauthn_credential(record.id, &webauthn::serialize_passkey(&passkey)?)
                .await?;
        }
    }

    Ok(())
}

// -- OIDC -------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AuthCallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

async fn login_oidc(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    let Some(oidc) = state.oidc.as_deref() else {
        let jar = flash::push(jar, "error", "OIDC not enabled");
        return Ok((jar, Redirect::to("/auth/login")).into_response());
    };

    let (auth_url, csrf_token, pkce_verifier) = oidc.authorize_url();
    let jar = jar
        .add(state_cookie(OIDC_CSRF_COOKIE, csrf_token.secret().clone()))
        .add(state_cookie(OIDC_PKCE_COOKIE, pkce_verifier.secret().to_string()));

    Ok((jar, Redirect::temporary(auth_url.as_str())).into_response())
}

async fn login_oidc_callback(
    State(state): State<AppState>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    let Some(oidc) = state.oidc.as_deref() else {
        let jar = flash::push(jar, "error", "OIDC not enabled");
        return Ok((jar, Redirect::to("/auth/login")).into_response());
    };

    let csrf_cookie = jar.get(OIDC_CSRF_COOKIE).map(|c| c.value().to_string());
    let pkce_cookie = jar.get(OIDC_PKCE_COOKIE).map(|c| c.value().to_string());
    let jar = clear_login_state(jar);

    let (Some(csrf_cookie), Some(pkce_cookie)) = (csrf_cookie, pkce_cookie) else {
        let jar = flash::push(jar, "error", "OIDC Authentication error");
        return Ok((jar, Redirect::to("/auth/login")).into_response());
    };

    let state_ok = query
        .state
        .as_deref()
        .is_some_and(|s| bool::from(s.as_bytes().ct_eq(csrf_cookie.as_bytes())));
    let Some(code) = query.code else {
        let jar = flash::push(jar, "error", "OIDC Authentication error");
        return Ok((jar, Redirect::to("/auth/login")).into_response());
    };
    if !state_ok {
        let jar = flash::push(jar, "error", "OIDC Authentication error");
        return Ok((jar, Redirect::to("/auth/login")).into_response());
    }

    let email = match exchange_and_fetch_email(&state, oidc, code, pkce_cookie).await {
        Ok(email) => email,
        Err(err) => {
            warn!(error = %err, "OIDC token exchange failed");
            let jar = flash::push(jar, "error", "OIDC Authentication error");
            return Ok((jar, Redirect::to("/auth/login")).into_response());
        }
    };

    if let Some(email) = email
        && let Some(user) = state.users.get_active_user_by_email(&email).await?
    {
        let (jar, cookies) = establish_session(&state, jar, &user).await?;
        info!("auth.login oidc");
        return Ok((jar, cookies, Redirect::to("/")).into_response());
    }

    let jar = flash::push(jar, "error", "OIDC Authentication failed");
    Ok((jar, Redirect::to("/auth/login")).into_response())
}

async fn exchange_and_fetch_email(
    state: &AppState,
    oidc: &crate::auth::oidc::OidcClient,
    code: String,
    pkce_verifier: String,
) -> anyhow::Result<Option<String>> {
    let token = oidc.exchange_code(code, pkce_verifier, &state.http).await?;
    oidc.fetch_email(&token, &state.http).await
}

// -- profile ----------------------------------------------------------------

async fn profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    let credentials = state
        .users
        .webauthn_credentials(user.id)
        .await?
        .into_iter()
        .map(|c| CredentialSummary {
            id: c.id,
            name: c.name,
            created_at: c.created_at,
        })
        .collect();

    let (jar, flashes) = flash::take(jar);
    let template = ProfileTemplate {
        base: session::base_context(&user),
        email: user.email.clone(),
        roles: user.roles.clone(),
        totp_enabled: user.totp_secret.is_some(),
        credentials,
        flashes,
    };
    Ok((jar, render(template)?).into_response())
}

/// Begin passkey registration for the logged-in user.
async fn webauthn_register_begin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: PrivateCookieJar,
) -> Result<Response, WebError> {
    let Some(relying_party) = state.webauthn.as_deref() else {
        return Err(WebError::BadRequest("webauthn not enabled".to_string()));
    };

    let records = state.users.webauthn_credentials(user.id).await?;
    let existing = webauthn::passkeys(&records)?;
    let exclude = (!existing.is_empty())
        .then(|| existing.iter().map(|p| p.cred_id().clone()).collect());

    let (challenge, reg_state) = relying_party
        .start_passkey_registration(
            webauthn::user_handle(&user),
            &user.username,
            &user.username,
            exclude,
        )
        .map_err(|e| WebError::Webauthn(e.to_string()))?;

    let jar = jar.add(state_cookie(
        WEBAUTHN_REG_STATE_COOKIE,
        serde_json::to_string(&reg_state)?,
    ));
    Ok((jar, Json(challenge)).into_response())
}

#[derive(Deserialize)]
struct WebauthnRegisterForm {
    name: String,
    /// JSON-encoded `RegisterPublicKeyCredential` from the browser.
    attestation: String,
}

async fn webauthn_register_finish(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: PrivateCookieJar,
    Form(form): Form<WebauthnRegisterForm>,
) -> Result<Response, WebError> {
    let Some(relying_party) = state.webauthn.as_deref() else {
        return Err(WebError::BadRequest("webauthn not enabled".to_string()));
    };

    let reg_state: PasskeyRegistration = jar
        .get(WEBAUTHN_REG_STATE_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .ok_or_else(|| WebError::BadRequest("missing registration state".to_string()))?;
    let jar = jar.remove(session::clear_state_cookie(WEBAUTHN_REG_STATE_COOKIE));

    let credential: RegisterPublicKeyCredential = serde_json::from_str(&form.attestation)
        .map_err(|_| WebError::BadRequest("malformed attestation".to_string()))?;

    match relying_party.finish_passkey_registration(&credential, &reg_state) {
        Ok(passkey) => {
            let name = if form.name.trim().is_empty() {
                "credential".to_string()
            } else {
                form.name.trim().to_string()
            };
            state
                .users
                .add_webauthn_credential(user.id, &name, &webauthn::serialize_passkey(&passkey)?)
                .await?;
            info!("auth.profile webauthn credential registered");
            let jar = flash::push(jar, "info", "Credential registered.");
            Ok((jar, Redirect::to("/auth/profile")).into_response())
        }
        Err(err) => {
            warn!(error = %err, "webauthn registration failed");
            let jar = flash::push(jar, "error", "Error during Webauthn registration.");
            Ok((jar, Redirect::to("/auth/profile")).into_response())
        }
    }
}

async fn webauthn_delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(credential_id): Path<i64>,
) -> Result<Response, WebError> {
    if !state
        .users
        .delete_webauthn_credential(credential_id, user.id)
        .await?
    {
        return Err(WebError::NotFound);
    }
    Ok(Redirect::to("/auth/profile").into_response())
}
