//! Catalog listing, cover images and the downloader status.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::instrument;

use dreamlib_core::catalog::{CrawlerStatus, cover_content_type, etag_for};

use crate::error::ApiResult;
use crate::state::AppState;

const READY_MESSAGE: &str = "New books can be requested now.";
const WAITING_MESSAGE: &str = "The downloader is waiting before the next batch.";

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books))
        .route("/covers/{filename}", get(cover))
}

/// `GET /api/books`
#[instrument(skip_all, fields(route = "books"))]
async fn list_books(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let flags = state.store.reviews.all()?;
    let books = state.catalog.list(&flags)?;
    Ok(Json(json!({ "books": books })))
}

/// `GET /api/covers/{filename}`
#[instrument(skip_all, fields(route = "cover"))]
async fn cover(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    let path = state.catalog.cover_path(&filename)?;
    let bytes = tokio::fs::read(&path).await?;
    let modified = tokio::fs::metadata(&path).await?.modified()?;

    let cache_control = if state.config.server.production {
        "public, max-age=3600, must-revalidate"
    } else {
        "no-cache, no-store, must-revalidate"
    };

    Ok((
        [
            (header::CONTENT_TYPE, cover_content_type(&filename).to_string()),
            (header::CACHE_CONTROL, cache_control.to_string()),
            (header::ETAG, etag_for(modified)),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /api/download-status`
#[instrument(skip_all, fields(route = "crawler_status"))]
pub(super) async fn crawler_status(State(state): State<AppState>) -> Json<Value> {
    let body = match state.catalog.crawler_status(Utc::now()) {
        CrawlerStatus::Ready => json!({
            "status": "ready",
            "message": READY_MESSAGE,
        }),
        CrawlerStatus::Waiting {
            wait_until,
            remaining_ms,
        } => json!({
            "status": "waiting",
            "waitUntil": wait_until,
            "remainingMs": remaining_ms,
            "message": WAITING_MESSAGE,
        }),
    };
    Json(body)
}
