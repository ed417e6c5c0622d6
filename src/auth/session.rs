//! Session cookies and request guards.
//!
//! The browser holds only an opaque session id; all session state lives in
//! the database. Short-lived login state (pending TOTP/WebAuthn user, OIDC
//! CSRF/PKCE) travels in encrypted private cookies instead.

use crate::auth::store::User;
use crate::error::WebError;
use crate::server::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use time::Duration;

/// Cookie name for the session ID
pub const SESSION_COOKIE: &str = "scopekeep_session";

/// User id waiting for the TOTP second factor.
pub const TOTP_PENDING_COOKIE: &str = "scopekeep_totp_pending";

/// User id waiting for a WebAuthn assertion.
pub const WEBAUTHN_PENDING_COOKIE: &str = "scopekeep_webauthn_pending";

/// Serialized server-side WebAuthn challenge state (login).
pub const WEBAUTHN_STATE_COOKIE: &str = "scopekeep_webauthn_state";

/// Serialized server-side WebAuthn challenge state (credential registration).
pub const WEBAUTHN_REG_STATE_COOKIE: &str = "scopekeep_webauthn_reg_state";

pub const OIDC_CSRF_COOKIE: &str = "scopekeep_oidc_csrf";
pub const OIDC_PKCE_COOKIE: &str = "scopekeep_oidc_pkce";

/// How long pre-auth state stays valid.
const STATE_COOKIE_TTL: Duration = Duration::minutes(5);

/// Session cookie. SameSite=Lax: the OIDC callback arrives as a cross-site
/// redirect and still has to carry it.
pub fn session_cookie(session_id: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .build()
}

/// Short-lived private cookie used between two steps of a login flow.
pub fn state_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(STATE_COOKIE_TTL)
        .build()
}

pub fn clear_state_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::ZERO)
        .build()
}

/// Remove every pre-auth state cookie. Called once a login flow concludes,
/// successfully or not.
pub fn clear_login_state(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_state_cookie(TOTP_PENDING_COOKIE))
        .remove(clear_state_cookie(WEBAUTHN_PENDING_COOKIE))
        .remove(clear_state_cookie(WEBAUTHN_STATE_COOKIE))
        .remove(clear_state_cookie(OIDC_CSRF_COOKIE))
        .remove(clear_state_cookie(OIDC_PKCE_COOKIE))
}

/// Load the active user referenced by a pending-login cookie.
pub async fn pending_user(
    state: &AppState,
    jar: &PrivateCookieJar,
    cookie_name: &str,
) -> Result<Option<User>, WebError> {
    let Some(cookie) = jar.get(cookie_name) else {
        return Ok(None);
    };
    let Ok(user_id) = cookie.value().parse::<i64>() else {
        return Ok(None);
    };

    let user = state.users.get_user_by_id(user_id).await?;
    Ok(user.filter(|u| u.active))
}

/// Template context shared by all authenticated pages.
pub fn base_context(user: &User) -> crate::web::templates::BaseContext {
    crate::web::templates::BaseContext {
        username: user.username.clone(),
    }
}

/// Extractor for any authenticated, active user.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(WebError::Unauthenticated)?;

        let user = state
            .users
            .validate_session(&session_id)
            .await?
            .ok_or(WebError::Unauthenticated)?;

        Ok(Self(user))
    }
}

/// Extractor for users holding the `operator` role; the whole storage
/// surface sits behind it.
pub struct OperatorUser(pub User);

impl FromRequestParts<AppState> for OperatorUser {
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if !user.has_role("operator") && !user.has_role("admin") {
            return Err(WebError::Forbidden);
        }

        Ok(Self(user))
    }
}
