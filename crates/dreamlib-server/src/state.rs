//! Shared application state handed to every handler.

use std::sync::Arc;

use tracing::info;

use dreamlib_core::store::StoreError;
use dreamlib_core::{Catalog, Config, Store};

use crate::auth::JwtManager;
use crate::lookup::BookLookup;
use crate::mail::{MailError, Mailer};

/// Errors raised while assembling [`AppState`].
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to open record store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to set up mailer: {0}")]
    Mail(#[from] MailError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub catalog: Arc<Catalog>,
    pub jwt: Arc<JwtManager>,
    pub mailer: Arc<Mailer>,
    pub lookup: Arc<BookLookup>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the store and build the outbound clients described by `config`.
    pub fn from_config(config: Config) -> Result<Self, StartupError> {
        let store = Store::open(&config.storage.data_dir, config.auth.verification_ttl_secs)?;
        let catalog = Catalog::new(&config.storage.books_dir);
        let jwt = JwtManager::new(
            config.auth.jwt_secret.as_bytes(),
            config.auth.session_ttl_secs,
            config.auth.remember_me_ttl_secs,
        );
        let mailer = Mailer::from_config(&config.mail)?;
        let lookup = BookLookup::from_config(&config.lookup)?;

        info!(
            books_dir = %config.storage.books_dir.display(),
            mailer = mailer.kind(),
            lookup_configured = lookup.is_configured(),
            "Application state ready"
        );

        Ok(Self {
            store: Arc::new(store),
            catalog: Arc::new(catalog),
            jwt: Arc::new(jwt),
            mailer: Arc::new(mailer),
            lookup: Arc::new(lookup),
            config: Arc::new(config),
        })
    }
}
