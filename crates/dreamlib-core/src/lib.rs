//! `Dream Library` Core Library
//!
//! Shared functionality for the `Dream Library` server:
//! - Flat-file JSON record store (users, downloads, verification codes, review flags)
//! - EPUB catalog reader with sidecar metadata
//! - Usage analytics aggregation
//! - Configuration resolution and hierarchy
//! - Common error types

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod error;
pub mod store;
pub mod time;
pub mod tracing_init;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{Error, Result};
pub use store::Store;
