//! `/api/auth/*`: login, signup, session and email verification.

use std::sync::LazyLock;

use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use dreamlib_core::store::{User, generate_code};
use dreamlib_core::time::unix_millis;

use super::JsonBody;
use crate::auth::session::{clear_cookie, is_secure_request, session_cookie};
use crate::auth::{MaybeSession, Session, accounts};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex is valid"));

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/change-password", post(change_password))
        .route("/auth/check-username", post(check_username))
        .route("/auth/send-verification", post(send_verification))
        .route("/auth/verify-code", post(verify_code))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct Credentials {
    username: String,
    password: String,
    email: Option<String>,
    remember_me: bool,
}

impl Credentials {
    fn require(&self) -> ApiResult<()> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::bad_request("Username and password are required"));
        }
        Ok(())
    }
}

fn public_user(user: &User) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "role": user.role,
    })
}

/// Issue a token for `user` and attach it as the session cookie.
fn with_session(
    state: &AppState,
    headers: &HeaderMap,
    user: &User,
    remember_me: bool,
    body: Value,
) -> ApiResult<Response> {
    let (token, ttl) = state.jwt.issue(user, remember_me)?;
    let secure = is_secure_request(headers, state.config.server.secure_cookies);
    let cookie = session_cookie(&token, ttl, secure);
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// `POST /api/auth/login`
#[instrument(skip_all, fields(route = "login"))]
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<Credentials>,
) -> ApiResult<Response> {
    req.require()?;
    let user = accounts::authenticate(&state.store, &req.username, &req.password, Utc::now())?;
    with_session(
        &state,
        &headers,
        &user,
        req.remember_me,
        json!({ "success": true, "user": public_user(&user) }),
    )
}

/// `POST /api/auth/signup`
///
/// New accounts wait for approval and get no session. Accounts created with
/// a configured admin email are approved and logged in straight away.
#[instrument(skip_all, fields(route = "signup"))]
async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<Credentials>,
) -> ApiResult<Response> {
    req.require()?;
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    if email.is_some_and(|e| !EMAIL_RE.is_match(e)) {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let user = accounts::create_user(
        &state.store,
        &state.config.auth,
        &req.username,
        &req.password,
        req.email.as_deref(),
        Utc::now(),
    )?;

    if !user.approved {
        return Ok(Json(json!({
            "success": true,
            "pendingApproval": true,
            "message": "Signup complete. An administrator must approve your account before you can log in.",
            "user": public_user(&user),
        }))
        .into_response());
    }

    with_session(
        &state,
        &headers,
        &user,
        req.remember_me,
        json!({
            "success": true,
            "pendingApproval": false,
            "message": "Signup complete.",
            "user": public_user(&user),
        }),
    )
}

/// `POST /api/auth/logout`
#[instrument(skip_all, fields(route = "logout"))]
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let secure = is_secure_request(&headers, state.config.server.secure_cookies);
    (
        [(header::SET_COOKIE, clear_cookie(secure))],
        Json(json!({ "success": true })),
    )
        .into_response()
}

/// `GET /api/auth/me`: `{user: null}` unless the session names a live user.
#[instrument(skip_all, fields(route = "me"))]
async fn me(
    State(state): State<AppState>,
    MaybeSession(claims): MaybeSession,
) -> ApiResult<Json<Value>> {
    let Some(claims) = claims else {
        return Ok(Json(json!({ "user": null })));
    };
    let Some(user) = state.store.users.find_by_id(&claims.sub)? else {
        return Ok(Json(json!({ "user": null })));
    };

    let downloaded_books = state.store.downloads.book_ids_for_user(&user.id)?;
    Ok(Json(json!({
        "user": {
            "id": user.id,
            "username": user.username,
            "role": user.role,
            "downloadedBooks": downloaded_books,
        }
    })))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// `POST /api/auth/change-password`
#[instrument(skip_all, fields(route = "change_password"))]
async fn change_password(
    State(state): State<AppState>,
    Session(claims): Session,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    if req.current_password.is_empty() || req.new_password.is_empty() {
        return Err(ApiError::bad_request(
            "Current password and new password are required",
        ));
    }
    accounts::change_password(
        &state.store,
        &claims.sub,
        &req.current_password,
        &req.new_password,
    )?;
    Ok(Json(json!({
        "success": true,
        "message": "Password changed successfully",
    })))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct UsernameRequest {
    username: String,
}

/// `POST /api/auth/check-username`
#[instrument(skip_all, fields(route = "check_username"))]
async fn check_username(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UsernameRequest>,
) -> ApiResult<Json<Value>> {
    if req.username.trim().is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    let available = accounts::username_available(&state.store, &req.username)?;
    Ok(Json(json!({ "available": available })))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct VerificationRequest {
    email: String,
    code: String,
}

/// `POST /api/auth/send-verification`
#[instrument(skip_all, fields(route = "send_verification"))]
async fn send_verification(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<VerificationRequest>,
) -> ApiResult<Json<Value>> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let now_ms = unix_millis();
    let verification = &state.store.verification;
    verification.sweep_expired(now_ms)?;
    let code = generate_code();
    verification.issue(email, &code, now_ms)?;

    let ttl_minutes = state.config.auth.verification_ttl_secs / 60;
    state
        .mailer
        .send_verification_code(email, &code, ttl_minutes)
        .await?;

    info!(email, "Verification code issued");
    Ok(Json(json!({
        "success": true,
        "message": "Verification code sent",
    })))
}

/// `POST /api/auth/verify-code`
#[instrument(skip_all, fields(route = "verify_code"))]
async fn verify_code(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<VerificationRequest>,
) -> ApiResult<Json<Value>> {
    let email = req.email.trim();
    let code = req.code.trim();
    if email.is_empty() || code.is_empty() {
        return Err(ApiError::bad_request("Email and verification code are required"));
    }

    if !state.store.verification.verify(email, code, unix_millis())? {
        return Err(ApiError::bad_request(
            "Verification code is invalid or expired",
        ));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Email verified",
    })))
}
