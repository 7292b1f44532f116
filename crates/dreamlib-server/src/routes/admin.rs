//! `/api/admin/*`. Every handler takes an [`AdminSession`].

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use dreamlib_core::analytics::Snapshot;
use dreamlib_core::catalog::MetadataPatch;
use dreamlib_core::store::{Role, User};

use super::JsonBody;
use crate::auth::AdminSession;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/pending-users", get(pending_users))
        .route("/all-users", get(all_users))
        .route("/approve-user", post(approve_user))
        .route("/reject-user", post(remove_user))
        .route("/delete-user", post(remove_user))
        .route("/books", get(books))
        .route("/update-book", post(update_book))
        .route("/mark-review", post(mark_review))
        .route("/search-naver-books", post(search_books))
        .route("/analytics", get(analytics))
        .route("/tracking", get(tracking))
        .route("/ranking", get(ranking))
}

/// A user row without the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserSummary {
    id: String,
    username: String,
    email: Option<String>,
    role: Role,
    approved: bool,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            approved: user.approved,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

fn summaries(users: Vec<User>) -> Vec<UserSummary> {
    users.into_iter().map(UserSummary::from).collect()
}

fn snapshot(state: &AppState) -> ApiResult<Snapshot> {
    Ok(Snapshot {
        users: state.store.users.all()?,
        downloads: state.store.downloads.all()?,
        total_books: state.catalog.list(&BTreeMap::new())?.len(),
        now: Utc::now(),
    })
}

/// `GET /api/admin/pending-users`
#[instrument(skip_all, fields(route = "pending_users"))]
async fn pending_users(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<Json<Value>> {
    let users = summaries(state.store.users.pending()?);
    Ok(Json(json!({ "success": true, "users": users })))
}

/// `GET /api/admin/all-users`
#[instrument(skip_all, fields(route = "all_users"))]
async fn all_users(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<Json<Value>> {
    let users = summaries(state.store.users.all()?);
    Ok(Json(json!({ "success": true, "users": users })))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct UserIdRequest {
    user_id: String,
}

impl UserIdRequest {
    fn require(&self) -> ApiResult<&str> {
        let id = self.user_id.trim();
        if id.is_empty() {
            return Err(ApiError::bad_request("User ID is required"));
        }
        Ok(id)
    }
}

/// `POST /api/admin/approve-user`
#[instrument(skip_all, fields(route = "approve_user"))]
async fn approve_user(
    State(state): State<AppState>,
    admin: AdminSession,
    JsonBody(req): JsonBody<UserIdRequest>,
) -> ApiResult<Json<Value>> {
    let user_id = req.require()?;
    if !state
        .store
        .users
        .approve(user_id, &state.config.auth.admin_emails)?
    {
        return Err(ApiError::not_found("User not found"));
    }
    info!(user_id, admin = %admin.user.username, "User approved");
    Ok(Json(json!({ "success": true, "message": "User approved" })))
}

/// `POST /api/admin/reject-user` and `/api/admin/delete-user`
///
/// Removes the account and every download it recorded.
#[instrument(skip_all, fields(route = "remove_user"))]
async fn remove_user(
    State(state): State<AppState>,
    admin: AdminSession,
    JsonBody(req): JsonBody<UserIdRequest>,
) -> ApiResult<Json<Value>> {
    let user_id = req.require()?;
    if user_id == admin.user.id {
        return Err(ApiError::bad_request("You cannot remove your own account"));
    }
    if !state.store.reject_user(user_id)? {
        return Err(ApiError::not_found("User not found"));
    }
    info!(user_id, admin = %admin.user.username, "User removed by admin");
    Ok(Json(json!({ "success": true, "message": "User removed" })))
}

/// `GET /api/admin/books`
#[instrument(skip_all, fields(route = "admin_books"))]
async fn books(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<Json<Value>> {
    let flags = state.store.reviews.all()?;
    let books = state.catalog.admin_list(&flags)?;
    Ok(Json(json!({ "books": books })))
}

/// `POST /api/admin/update-book`
#[instrument(skip_all, fields(route = "update_book"))]
async fn update_book(
    State(state): State<AppState>,
    _admin: AdminSession,
    JsonBody(patch): JsonBody<MetadataPatch>,
) -> ApiResult<Json<Value>> {
    if patch.filename.trim().is_empty() {
        return Err(ApiError::bad_request("filename is required"));
    }
    // Only existing books get a sidecar.
    state.catalog.book_path(&patch.filename)?;
    let metadata = state.catalog.update_metadata(&patch)?;
    info!(filename = %patch.filename, "Book metadata updated");
    Ok(Json(json!({ "success": true, "metadata": metadata })))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MarkReviewRequest {
    filename: String,
    needs_review: Option<bool>,
}

/// `POST /api/admin/mark-review`
#[instrument(skip_all, fields(route = "mark_review"))]
async fn mark_review(
    State(state): State<AppState>,
    _admin: AdminSession,
    JsonBody(req): JsonBody<MarkReviewRequest>,
) -> ApiResult<Json<Value>> {
    let Some(needs_review) = req.needs_review else {
        return Err(ApiError::bad_request("filename and needsReview are required"));
    };
    if req.filename.is_empty() {
        return Err(ApiError::bad_request("filename and needsReview are required"));
    }
    state.catalog.book_path(&req.filename)?;
    state.store.reviews.set(&req.filename, needs_review)?;

    let message = if needs_review {
        "Marked as needing review"
    } else {
        "Marked as reviewed"
    };
    Ok(Json(json!({ "success": true, "message": message })))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchRequest {
    query: String,
}

/// `POST /api/admin/search-naver-books`
#[instrument(skip_all, fields(route = "search_books"))]
async fn search_books(
    State(state): State<AppState>,
    _admin: AdminSession,
    JsonBody(req): JsonBody<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Search query is required"));
    }
    let results = state.lookup.search(query).await?;
    Ok(Json(json!({ "results": results })))
}

/// `GET /api/admin/analytics`
#[instrument(skip_all, fields(route = "analytics"))]
async fn analytics(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<Json<Value>> {
    let report = snapshot(&state)?.summary();
    Ok(Json(json!({ "success": true, "analytics": report })))
}

/// `GET /api/admin/tracking`
#[instrument(skip_all, fields(route = "tracking"))]
async fn tracking(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<Json<Value>> {
    let report = snapshot(&state)?.tracking();
    Ok(Json(json!({ "success": true, "tracking": report })))
}

/// `GET /api/admin/ranking`
#[instrument(skip_all, fields(route = "ranking"))]
async fn ranking(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<Json<Value>> {
    let rankings = snapshot(&state)?.ranking();
    Ok(Json(json!({ "success": true, "rankings": rankings })))
}
