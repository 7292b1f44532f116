#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use dreamlib_core::Config;
use dreamlib_server::{AppState, build_router};

const ADMIN_EMAIL: &str = "admin@example.com";

struct Harness {
    app: Router,
    state: AppState,
    data: TempDir,
    books: TempDir,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// `auth_token=<jwt>` from the `Set-Cookie` header.
    fn session(&self) -> String {
        let cookie = self
            .headers
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap();
        cookie.split(';').next().unwrap().to_string()
    }
}

fn harness() -> Harness {
    let data = tempfile::tempdir().unwrap();
    let books = tempfile::tempdir().unwrap();
    std::fs::write(books.path().join("Alpha.epub"), b"PK\x03\x04alpha").unwrap();
    std::fs::write(books.path().join("Beta.epub"), b"PK\x03\x04beta").unwrap();
    std::fs::create_dir_all(books.path().join("covers")).unwrap();
    std::fs::write(books.path().join("covers").join("alpha.png"), b"\x89PNG").unwrap();

    let mut config = Config::default();
    config.storage.data_dir = data.path().to_path_buf();
    config.storage.books_dir = books.path().to_path_buf();
    config.auth.jwt_secret = "integration-test-secret".into();
    config.auth.admin_emails = vec![ADMIN_EMAIL.into()];

    let state = AppState::from_config(config).unwrap();
    Harness {
        app: build_router(state.clone()),
        state,
        data,
        books,
    }
}

impl Harness {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Reply {
        self.send(Method::GET, uri, None, cookie).await
    }

    async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> Reply {
        self.send(Method::POST, uri, Some(body), cookie).await
    }

    async fn admin_session(&self) -> String {
        let reply = self
            .post(
                "/api/auth/signup",
                json!({ "username": "admin", "password": "adminpass", "email": ADMIN_EMAIL }),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.session()
    }

    /// Sign up `username`, approve it directly in the store and log in.
    async fn reader_session(&self, username: &str) -> String {
        let reply = self
            .post(
                "/api/auth/signup",
                json!({ "username": username, "password": "readerpass" }),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        let user_id = reply.json()["user"]["id"].as_str().unwrap().to_string();
        assert!(self.state.store.users.approve(&user_id, &[]).unwrap());

        let reply = self
            .post(
                "/api/auth/login",
                json!({ "username": username, "password": "readerpass" }),
                None,
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.session()
    }
}

#[tokio::test]
async fn health_reports_version() {
    let h = harness();
    let reply = h.get("/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn signup_waits_for_approval() {
    let h = harness();
    let reply = h
        .post(
            "/api/auth/signup",
            json!({ "username": "reader", "password": "readerpass" }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["pendingApproval"], true);
    assert!(reply.headers.get(header::SET_COOKIE).is_none());

    let login = h
        .post(
            "/api/auth/login",
            json!({ "username": "reader", "password": "readerpass" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);

    let again = h
        .post(
            "/api/auth/signup",
            json!({ "username": "reader", "password": "otherpass" }),
            None,
        )
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.json()["error"], "Username already exists");
}

#[tokio::test]
async fn signup_validates_input() {
    let h = harness();
    let missing = h
        .post("/api/auth/signup", json!({ "username": "reader" }), None)
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let short = h
        .post(
            "/api/auth/signup",
            json!({ "username": "reader", "password": "12345" }),
            None,
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);

    let bad_email = h
        .post(
            "/api/auth/signup",
            json!({ "username": "reader", "password": "readerpass", "email": "not-an-email" }),
            None,
        )
        .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_email_signup_gets_a_session() {
    let h = harness();
    let reply = h
        .post(
            "/api/auth/signup",
            json!({ "username": "admin", "password": "adminpass", "email": ADMIN_EMAIL }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["pendingApproval"], false);

    let cookie = reply.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=86400"));
    assert!(!cookie.contains("Secure"));

    let me = h.get("/api/auth/me", Some(&reply.session())).await.json();
    assert_eq!(me["user"]["username"], "admin");
    assert_eq!(me["user"]["role"], "admin");
    assert_eq!(me["user"]["downloadedBooks"], json!([]));
}

#[tokio::test]
async fn login_sets_secure_cookie_behind_https_proxy() {
    let h = harness();
    h.admin_session().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-proto", "https")
        .body(Body::from(
            json!({ "username": "admin", "password": "adminpass", "rememberMe": true }).to_string(),
        ))
        .unwrap();
    let resp = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains(&format!("Max-Age={}", 30 * 24 * 60 * 60)));

    let user = h.state.store.users.find_by_username("admin").unwrap().unwrap();
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let h = harness();
    h.admin_session().await;
    let reply = h
        .post(
            "/api/auth/login",
            json!({ "username": "admin", "password": "wrongpass" }),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["error"], "Invalid username or password");
}

#[tokio::test]
async fn me_is_null_without_a_valid_session() {
    let h = harness();
    let anonymous = h.get("/api/auth/me", None).await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert_eq!(anonymous.json(), json!({ "user": null }));

    let garbage = h.get("/api/auth/me", Some("auth_token=not.a.jwt")).await;
    assert_eq!(garbage.json(), json!({ "user": null }));
}

#[tokio::test]
async fn logout_clears_cookie() {
    let h = harness();
    let reply = h.post("/api/auth/logout", json!({}), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let cookie = reply.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("auth_token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let h = harness();
    let session = h.admin_session().await;
    let token = session.trim_start_matches("auth_token=");

    let request = Request::builder()
        .uri("/api/downloads/history")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn catalog_lists_books_with_ids_by_filename() {
    let h = harness();
    let reply = h.get("/api/books", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let books = reply.json()["books"].as_array().unwrap().clone();
    assert_eq!(books.len(), 2);
    let alpha = books.iter().find(|b| b["filename"] == "Alpha.epub").unwrap();
    let beta = books.iter().find(|b| b["filename"] == "Beta.epub").unwrap();
    assert_eq!(alpha["id"], 1);
    assert_eq!(beta["id"], 2);
    assert_eq!(alpha["title"], "Alpha");
    assert_eq!(alpha["needsReview"], false);
}

#[tokio::test]
async fn download_requires_session() {
    let h = harness();
    let reply = h.get("/api/download/Alpha.epub?bookId=1", None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(reply.json()["error"].is_string());
}

#[tokio::test]
async fn download_serves_file_and_tracks_once() {
    let h = harness();
    let reader = h.reader_session("reader").await;

    let uri = "/api/download/Alpha.epub?bookId=1&deviceType=eink&uiMode=eink&sessionId=s-1";
    let first = h.get(uri, Some(&reader)).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers[header::CONTENT_TYPE], "application/epub+zip");
    assert_eq!(
        first.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Alpha.epub\"; filename*=UTF-8''Alpha.epub"
    );
    assert_eq!(first.body, b"PK\x03\x04alpha");

    let second = h.get(uri, Some(&reader)).await;
    assert_eq!(second.status, StatusCode::OK);

    let history = h.get("/api/downloads/history", Some(&reader)).await.json();
    let rows = history["downloads"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["bookId"], 1);
    assert_eq!(rows[0]["deviceType"], "eink");
    assert_eq!(rows[0]["sessionId"], "s-1");
    assert_eq!(rows[0]["bookTitle"], "Alpha");

    let me = h.get("/api/auth/me", Some(&reader)).await.json();
    assert_eq!(me["user"]["downloadedBooks"], json!([1]));
}

#[tokio::test]
async fn download_without_book_id_is_not_tracked() {
    let h = harness();
    let reader = h.reader_session("reader").await;
    let reply = h.get("/api/download/Beta.epub", Some(&reader)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(h.state.store.downloads.all().unwrap().is_empty());
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let h = harness();
    let reader = h.reader_session("reader").await;
    std::fs::write(h.data.path().join("secret.epub"), b"nope").unwrap();

    let escape = h.get("/api/download/..%2Fsecret.epub", Some(&reader)).await;
    assert_eq!(escape.status, StatusCode::BAD_REQUEST);

    let not_epub = h.get("/api/download/notes.txt", Some(&reader)).await;
    assert_eq!(not_epub.status, StatusCode::BAD_REQUEST);

    let missing = h.get("/api/download/Gamma.epub", Some(&reader)).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let cover = h.get("/api/covers/..%2F..%2Fusers.json", None).await;
    assert_eq!(cover.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cover_has_type_etag_and_cache_headers() {
    let h = harness();
    let reply = h.get("/api/covers/alpha.png", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        reply.headers[header::CACHE_CONTROL],
        "no-cache, no-store, must-revalidate"
    );
    let etag = reply.headers[header::ETAG].to_str().unwrap();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let missing = h.get("/api/covers/none.jpg", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn crawler_status_ready_then_waiting() {
    let h = harness();
    let ready = h.get("/api/download-status", None).await.json();
    assert_eq!(ready["status"], "ready");
    assert!(ready["message"].is_string());

    let until = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    std::fs::write(
        h.books.path().join("download_status.json"),
        json!({ "waitUntil": until }).to_string(),
    )
    .unwrap();
    let waiting = h.get("/api/download-status", None).await.json();
    assert_eq!(waiting["status"], "waiting");
    assert_eq!(waiting["waitUntil"], until.as_str());
    assert!(waiting["remainingMs"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn owned_toggle_adds_and_removes() {
    let h = harness();
    let reader = h.reader_session("reader").await;

    let on = h
        .post("/api/download-status", json!({ "bookId": 2, "status": true }), Some(&reader))
        .await;
    assert_eq!(on.status, StatusCode::OK);
    let history = h.get("/api/downloads/history", Some(&reader)).await.json();
    assert_eq!(history["downloads"].as_array().unwrap().len(), 1);

    for _ in 0..2 {
        let off = h
            .post("/api/download-status", json!({ "bookId": 2, "status": false }), Some(&reader))
            .await;
        assert_eq!(off.status, StatusCode::OK);
    }
    let history = h.get("/api/downloads/history", Some(&reader)).await.json();
    assert!(history["downloads"].as_array().unwrap().is_empty());

    let missing_id = h
        .post("/api/download-status", json!({ "status": true }), Some(&reader))
        .await;
    assert_eq!(missing_id.status, StatusCode::BAD_REQUEST);

    let anonymous = h
        .post("/api/download-status", json!({ "bookId": 2, "status": true }), None)
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_readers() {
    let h = harness();
    let reader = h.reader_session("reader").await;

    for uri in [
        "/api/admin/pending-users",
        "/api/admin/all-users",
        "/api/admin/books",
        "/api/admin/analytics",
        "/api/admin/tracking",
        "/api/admin/ranking",
    ] {
        assert_eq!(h.get(uri, Some(&reader)).await.status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(h.get(uri, None).await.status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let approve = h
        .post("/api/admin/approve-user", json!({ "userId": "x" }), Some(&reader))
        .await;
    assert_eq!(approve.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_approves_pending_user() {
    let h = harness();
    let admin = h.admin_session().await;
    h.post(
        "/api/auth/signup",
        json!({ "username": "newbie", "password": "newbiepass" }),
        None,
    )
    .await;

    let pending = h.get("/api/admin/pending-users", Some(&admin)).await.json();
    let users = pending["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert!(users[0].get("passwordHash").is_none());
    let user_id = users[0]["id"].as_str().unwrap().to_string();

    let approve = h
        .post("/api/admin/approve-user", json!({ "userId": user_id }), Some(&admin))
        .await;
    assert_eq!(approve.status, StatusCode::OK);

    let login = h
        .post(
            "/api/auth/login",
            json!({ "username": "newbie", "password": "newbiepass" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);

    let unknown = h
        .post("/api/admin/approve-user", json!({ "userId": "nobody" }), Some(&admin))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_user_removes_their_downloads() {
    let h = harness();
    let admin = h.admin_session().await;
    let reader = h.reader_session("reader").await;
    h.get("/api/download/Alpha.epub?bookId=1", Some(&reader)).await;
    h.get("/api/download/Beta.epub?bookId=2", Some(&admin)).await;
    assert_eq!(h.state.store.downloads.all().unwrap().len(), 2);

    let reader_id = h
        .state
        .store
        .users
        .find_by_username("reader")
        .unwrap()
        .unwrap()
        .id;
    let reply = h
        .post("/api/admin/delete-user", json!({ "userId": reader_id }), Some(&admin))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let remaining = h.state.store.downloads.all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].user_id, reader_id);
    assert!(h.state.store.users.find_by_username("reader").unwrap().is_none());

    let me = h.get("/api/auth/me", Some(&reader)).await.json();
    assert_eq!(me, json!({ "user": null }));
}

#[tokio::test]
async fn removed_user_token_cannot_download() {
    let h = harness();
    let admin = h.admin_session().await;
    let reader = h.reader_session("reader").await;
    let reader_id = h
        .state
        .store
        .users
        .find_by_username("reader")
        .unwrap()
        .unwrap()
        .id;

    let reply = h
        .post("/api/admin/reject-user", json!({ "userId": reader_id }), Some(&admin))
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let download = h.get("/api/download/Alpha.epub?bookId=1", Some(&reader)).await;
    assert_eq!(download.status, StatusCode::UNAUTHORIZED);

    let owned = h
        .post("/api/download-status", json!({ "bookId": 2, "status": true }), Some(&reader))
        .await;
    assert_eq!(owned.status, StatusCode::UNAUTHORIZED);

    let history = h.get("/api/downloads/history", Some(&reader)).await;
    assert_eq!(history.status, StatusCode::UNAUTHORIZED);

    assert!(h.state.store.downloads.all().unwrap().is_empty());
    let on_disk = std::fs::read_to_string(h.data.path().join("downloads.json")).unwrap_or_default();
    assert!(!on_disk.contains(&reader_id));
}

#[tokio::test]
async fn analytics_counts_match_downloads() {
    let h = harness();
    let admin = h.admin_session().await;
    let reader = h.reader_session("reader").await;
    h.get("/api/download/Alpha.epub?bookId=1&deviceType=eink&uiMode=eink", Some(&reader))
        .await;
    h.get("/api/download/Beta.epub?bookId=2&deviceType=desktop", Some(&reader))
        .await;
    h.get("/api/download/Alpha.epub?bookId=1&deviceType=mobile", Some(&admin))
        .await;

    let reply = h.get("/api/admin/analytics", Some(&admin)).await;
    assert_eq!(reply.status, StatusCode::OK);
    let analytics = &reply.json()["analytics"];
    let downloads = &analytics["downloads"];
    assert_eq!(downloads["total"], 3);
    let by_device: u64 = downloads["byDeviceType"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    let by_ui: u64 = downloads["byUIMode"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(by_device, 3);
    assert_eq!(by_ui, 3);
    assert_eq!(analytics["userEngagement"]["totalUsers"], 2);

    let tracking = h.get("/api/admin/tracking", Some(&admin)).await;
    assert_eq!(tracking.status, StatusCode::OK);
    assert!(tracking.json()["tracking"]["recentActivity"].is_array());

    let ranking = h.get("/api/admin/ranking", Some(&admin)).await.json();
    let rows = ranking["rankings"].as_array().unwrap();
    assert_eq!(rows[0]["username"], "reader");
    assert_eq!(rows[0]["totalDownloads"], 2);
}

#[tokio::test]
async fn admin_edits_metadata_and_review_flags() {
    let h = harness();
    let admin = h.admin_session().await;

    let update = h
        .post(
            "/api/admin/update-book",
            json!({ "filename": "Alpha.epub", "title": "Alpha Revised", "year": 2021 }),
            Some(&admin),
        )
        .await;
    assert_eq!(update.status, StatusCode::OK);
    assert_eq!(update.json()["metadata"]["title"], "Alpha Revised");

    let mark = h
        .post(
            "/api/admin/mark-review",
            json!({ "filename": "Alpha.epub", "needsReview": true }),
            Some(&admin),
        )
        .await;
    assert_eq!(mark.status, StatusCode::OK);

    let books = h.get("/api/books", None).await.json();
    let alpha = books["books"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["filename"] == "Alpha.epub")
        .unwrap()
        .clone();
    assert_eq!(alpha["title"], "Alpha Revised");
    assert_eq!(alpha["needsReview"], true);

    let admin_books = h.get("/api/admin/books", Some(&admin)).await.json();
    let row = admin_books["books"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["filename"] == "Alpha.epub")
        .unwrap()
        .clone();
    assert!(row["metadataPath"].as_str().unwrap().ends_with("Alpha.json"));

    let traversal = h
        .post(
            "/api/admin/update-book",
            json!({ "filename": "../Alpha.epub", "title": "x" }),
            Some(&admin),
        )
        .await;
    assert_eq!(traversal.status, StatusCode::BAD_REQUEST);

    let missing_flag = h
        .post("/api/admin/mark-review", json!({ "filename": "Alpha.epub" }), Some(&admin))
        .await;
    assert_eq!(missing_flag.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn naver_search_without_credentials_explains() {
    let h = harness();
    let admin = h.admin_session().await;
    let reply = h
        .post("/api/admin/search-naver-books", json!({ "query": "dream" }), Some(&admin))
        .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(reply.json()["error"].as_str().unwrap().contains("NAVER_CLIENT_ID"));

    let empty = h
        .post("/api/admin/search-naver-books", json!({ "query": "  " }), Some(&admin))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn check_username_reports_availability() {
    let h = harness();
    h.admin_session().await;
    let taken = h
        .post("/api/auth/check-username", json!({ "username": "admin" }), None)
        .await
        .json();
    assert_eq!(taken["available"], false);
    let free = h
        .post("/api/auth/check-username", json!({ "username": "someone" }), None)
        .await
        .json();
    assert_eq!(free["available"], true);
}

#[tokio::test]
async fn change_password_round_trip() {
    let h = harness();
    let admin = h.admin_session().await;

    let wrong = h
        .post(
            "/api/auth/change-password",
            json!({ "currentPassword": "nottheone", "newPassword": "freshpass" }),
            Some(&admin),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

    let ok = h
        .post(
            "/api/auth/change-password",
            json!({ "currentPassword": "adminpass", "newPassword": "freshpass" }),
            Some(&admin),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);

    let login = h
        .post(
            "/api/auth/login",
            json!({ "username": "admin", "password": "freshpass" }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn verification_code_is_single_use() {
    let h = harness();
    let bad = h
        .post("/api/auth/send-verification", json!({ "email": "nope" }), None)
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);

    let sent = h
        .post(
            "/api/auth/send-verification",
            json!({ "email": "reader@example.com" }),
            None,
        )
        .await;
    assert_eq!(sent.status, StatusCode::OK);

    let stored: Value = serde_json::from_str(
        &std::fs::read_to_string(h.data.path().join("verification_codes.json")).unwrap(),
    )
    .unwrap();
    let code = stored[0]["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);

    let wrong_code = if code == "000000" { "111111" } else { "000000" };
    let wrong = h
        .post(
            "/api/auth/verify-code",
            json!({ "email": "reader@example.com", "code": wrong_code }),
            None,
        )
        .await;
    assert_eq!(wrong.status, StatusCode::BAD_REQUEST);

    let right = h
        .post(
            "/api/auth/verify-code",
            json!({ "email": "reader@example.com", "code": code }),
            None,
        )
        .await;
    assert_eq!(right.status, StatusCode::OK);

    let reused = h
        .post(
            "/api/auth/verify-code",
            json!({ "email": "reader@example.com", "code": code }),
            None,
        )
        .await;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let h = harness();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());
}
