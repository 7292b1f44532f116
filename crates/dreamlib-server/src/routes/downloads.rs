//! Book downloads, the "owned" toggle and per-user history.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use dreamlib_core::store::DownloadContext;

use super::JsonBody;
use crate::auth::Session;
use crate::encoding::encode_uri_component;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/download/{filename}", get(download))
        .route("/downloads/history", get(history))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct DownloadQuery {
    book_id: Option<String>,
    device_type: Option<String>,
    ui_mode: Option<String>,
    session_id: Option<String>,
}

/// Resolve the client context plus a title/author snapshot for `book_id`.
fn download_context(state: &AppState, book_id: u32, query: DownloadQuery) -> DownloadContext {
    let book = state.catalog.find_by_id(book_id).unwrap_or_else(|e| {
        warn!(book_id, error = %e, "Catalog lookup failed; tracking without snapshot");
        None
    });
    DownloadContext {
        device_type: query.device_type,
        ui_mode: query.ui_mode,
        session_id: query.session_id,
        book_title: book.as_ref().map(|b| b.title.clone()),
        book_author: book.and_then(|b| b.author),
        genre: None,
    }
}

/// `GET /api/download/{filename}?bookId=&deviceType=&uiMode=&sessionId=`
///
/// Streams the EPUB and records the first download of each book per user.
/// A missing or non-numeric `bookId` skips tracking.
#[instrument(skip_all, fields(route = "download"))]
async fn download(
    State(state): State<AppState>,
    Session(claims): Session,
    Path(filename): Path<String>,
    Query(mut query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let path = state.catalog.book_path(&filename)?;
    let bytes = tokio::fs::read(&path).await?;

    if let Some(book_id) = query.book_id.take().and_then(|id| id.trim().parse::<u32>().ok()) {
        let context = download_context(&state, book_id, query);
        state
            .store
            .track_download(&claims.sub, book_id, context, Utc::now())?;
    }

    debug!(filename = %filename, user_id = %claims.sub, "Serving book");
    let encoded = encode_uri_component(&filename);
    let disposition = format!("attachment; filename=\"{encoded}\"; filename*=UTF-8''{encoded}");
    Ok((
        [
            (header::CONTENT_TYPE, "application/epub+zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct OwnedToggle {
    book_id: Option<u32>,
    status: bool,
}

/// `POST /api/download-status`: mark a book owned (`status: true`) or not.
#[instrument(skip_all, fields(route = "set_owned"))]
pub(super) async fn set_owned(
    State(state): State<AppState>,
    Session(claims): Session,
    JsonBody(req): JsonBody<OwnedToggle>,
) -> ApiResult<Json<Value>> {
    let book_id = req
        .book_id
        .ok_or_else(|| ApiError::bad_request("bookId is required"))?;
    state
        .store
        .set_owned(&claims.sub, book_id, req.status, Utc::now())?;
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/downloads/history`
#[instrument(skip_all, fields(route = "history"))]
async fn history(
    State(state): State<AppState>,
    Session(claims): Session,
) -> ApiResult<Json<Value>> {
    let downloads = state.store.downloads.for_user(&claims.sub)?;
    Ok(Json(json!({ "downloads": downloads })))
}
