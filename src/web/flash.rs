//! One-shot flash messages.
//!
//! Messages queue up in an encrypted cookie and are drained the next time
//! a page renders them.

use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

const FLASH_COOKIE: &str = "scopekeep_flash";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlashMessage {
    pub level: String,
    pub message: String,
}

/// Append a message to the flash queue.
pub fn push(jar: PrivateCookieJar, level: &str, message: &str) -> PrivateCookieJar {
    let mut messages = peek(&jar);
    messages.push(FlashMessage {
        level: level.to_string(),
        message: message.to_string(),
    });

    let value = serde_json::to_string(&messages).unwrap_or_else(|_| "[]".to_string());
    jar.add(
        Cookie::build((FLASH_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    )
}

/// Drain all queued messages.
pub fn take(jar: PrivateCookieJar) -> (PrivateCookieJar, Vec<FlashMessage>) {
    let messages = peek(&jar);
    let jar = jar.remove(
        Cookie::build((FLASH_COOKIE, ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(Duration::ZERO)
            .build(),
    );
    (jar, messages)
}

fn peek(jar: &PrivateCookieJar) -> Vec<FlashMessage> {
    jar.get(FLASH_COOKIE)
        .and_then(|c| serde_json::from_str(c.value()).ok())
        .unwrap_or_default()
}
