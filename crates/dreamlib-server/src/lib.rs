//! `Dream Library` HTTP service.
//!
//! An axum application over the flat-file store and the EPUB catalog:
//! - Account signup, approval, login and session cookies
//! - Catalog listing, book download and cover serving
//! - Download tracking and the "owned" toggle
//! - Admin user management, metadata editing and analytics reports

pub mod auth;
pub mod encoding;
pub mod error;
pub mod lookup;
pub mod mail;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
