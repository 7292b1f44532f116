//! Session transport: the `auth_token` cookie and the request extractors
//! built on it.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};

use dreamlib_core::store::User;

use super::claims::Claims;
use crate::error::ApiError;
use crate::state::AppState;

pub const COOKIE_NAME: &str = "auth_token";

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The session token from the cookie, falling back to a Bearer header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, COOKIE_NAME).or_else(|| bearer_token(headers))
}

/// Whether the session cookie should carry `Secure`.
pub fn is_secure_request(headers: &HeaderMap, always_secure: bool) -> bool {
    always_secure
        || headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

fn claims_from_parts(parts: &Parts, state: &AppState) -> Result<Claims, ApiError> {
    let token = token_from_headers(&parts.headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    state
        .jwt
        .validate(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired session"))
}

/// A request with a valid session token whose user still exists and is
/// approved.
///
/// Rejects with 401 without a usable token or when the account has been
/// removed, and 403 when the account is no longer approved.
#[derive(Debug, Clone)]
pub struct Session(pub Claims);

impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, state)?;
        match state.store.users.find_by_id(&claims.sub)? {
            Some(user) if user.approved => Ok(Self(claims)),
            Some(_) => Err(ApiError::forbidden("Your account is pending admin approval")),
            None => Err(ApiError::unauthorized("Invalid or expired session")),
        }
    }
}

/// A session if there is a valid one. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Claims>);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(claims_from_parts(parts, state).ok()))
    }
}

/// A session whose user is currently an approved admin.
///
/// The role is re-read from the store so demotions and deletions take effect
/// before the token expires. Rejects with 401 without a session or account
/// and 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub claims: Claims,
    pub user: User,
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, state)?;
        match state.store.users.find_by_id(&claims.sub)? {
            Some(user) if user.approved && user.is_admin() => Ok(Self { claims, user }),
            Some(_) => Err(ApiError::forbidden("Admin access required")),
            None => Err(ApiError::unauthorized("Invalid or expired session")),
        }
    }
}
