//! Session cookie handling.
//!
//! The session lives entirely in a signed token held by the client. These
//! helpers put that token into, and take it out of, the `cr_session` cookie.

use axum_extra::extract::CookieJar;
use cookie::{Cookie, SameSite};

use crate::config::ServerConfig;
use crate::services::identity::SessionToken;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "cr_session";

/// Build the cookie carrying `token`, valid for the configured session TTL.
#[must_use]
pub fn session_cookie(token: &SessionToken, config: &ServerConfig) -> Cookie<'static> {
    let max_age = time::Duration::seconds(config.session_ttl.num_seconds());

    Cookie::build((SESSION_COOKIE_NAME, token.as_str().to_owned()))
        .http_only(true)
        .secure(config.secure_cookies())
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Add the session cookie for `token` to the jar.
#[must_use]
pub fn set_session_cookie(
    jar: CookieJar,
    token: &SessionToken,
    config: &ServerConfig,
) -> CookieJar {
    jar.add(session_cookie(token, config))
}

/// Expire the session cookie (logout, or a token that failed validation).
///
/// Emits the removal cookie whether or not the request carried one.
#[must_use]
pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    let mut cookie = Cookie::build((SESSION_COOKIE_NAME, "")).path("/").build();
    cookie.make_removal();
    jar.add(cookie)
}

/// The raw session token, if the request carries one.
#[must_use]
pub fn session_token(jar: &CookieJar) -> Option<&str> {
    jar.get(SESSION_COOKIE_NAME)
        .map(Cookie::value)
        .filter(|value| !value.is_empty())
}
