//! Flat-file JSON storage for Dream Library.
//!
//! Each table is one JSON document on disk, read whole and written whole.
//! Read-modify-write cycles are serialized per file and writes are atomic
//! renames, so concurrent requests inside one process cannot lose updates.

mod downloads;
mod file;
mod models;
mod reviews;
mod users;
mod verification;


use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{error, info};

pub use downloads::DownloadStore;
pub use file::{Edit, JsonFile, Locked};
pub use models::*;
pub use reviews::ReviewFlags;
pub use users::UserStore;
pub use verification::{VerificationStore, generate_code};

/// Errors raised by the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Corrupt JSON document: {0}")]
    Parse(String),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),

    #[error("{0}")]
    Conflict(String),

    #[error("No such user: {0}")]
    UnknownUser(String),
}

/// All JSON tables living under one data directory.
pub struct Store {
    pub users: UserStore,
    pub downloads: DownloadStore,
    pub verification: VerificationStore,
    pub reviews: ReviewFlags,
}

impl Store {
    /// Open (creating the directory if needed) the tables under `data_dir`.
    pub fn open(data_dir: &Path, verification_ttl_secs: i64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            StoreError::Io(format!("create {}: {e}", data_dir.display()))
        })?;

        info!(path = %data_dir.display(), "Record store opened");

        Ok(Self {
            users: UserStore::open(data_dir.join("users.json")),
            downloads: DownloadStore::open(data_dir.join("downloads.json")),
            verification: VerificationStore::open(
                data_dir.join("verification_codes.json"),
                verification_ttl_secs,
            ),
            reviews: ReviewFlags::open(data_dir.join("review_status.json")),
        })
    }

    /// Remove a user and every download they recorded.
    ///
    /// Both tables stay locked for the whole operation, so no download for
    /// the user can be recorded in between. Downloads are written first: if
    /// the user write then fails the account survives without its history,
    /// never the other way round. Returns `false` when no user had that id.
    pub fn reject_user(&self, user_id: &str) -> Result<bool, StoreError> {
        let users_file = self.users.file.lock()?;
        let downloads_file = self.downloads.file.lock()?;

        let mut users = users_file.read()?;
        let before = users.len();
        users.retain(|u| u.id != user_id);
        if users.len() == before {
            return Ok(false);
        }

        let mut downloads = downloads_file.read()?;
        let count = downloads.len();
        downloads.retain(|d| d.user_id != user_id);
        let removed = count - downloads.len();
        if removed > 0 {
            downloads_file.write(&downloads)?;
        }

        if let Err(e) = users_file.write(&users) {
            error!(
                user_id,
                removed_downloads = removed,
                error = %e,
                "Downloads removed but the user row could not be deleted"
            );
            return Err(e);
        }
        info!(user_id, removed_downloads = removed, "User removed");
        Ok(true)
    }

    /// Record a download for an existing user.
    ///
    /// Holds the users lock across the insert so a concurrent
    /// [`Store::reject_user`] cannot leave an orphan row behind.
    pub fn track_download(
        &self,
        user_id: &str,
        book_id: u32,
        context: DownloadContext,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let users = self.users.file.lock()?;
        ensure_user(&users.read()?, user_id)?;
        self.downloads.track(user_id, book_id, context, now)
    }

    /// The "owned" toggle for an existing user. See [`DownloadStore::set_owned`].
    pub fn set_owned(
        &self,
        user_id: &str,
        book_id: u32,
        owned: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let users = self.users.file.lock()?;
        ensure_user(&users.read()?, user_id)?;
        self.downloads.set_owned(user_id, book_id, owned, now)
    }
}

fn ensure_user(users: &[User], user_id: &str) -> Result<(), StoreError> {
    if users.iter().any(|u| u.id == user_id) {
        Ok(())
    } else {
        Err(StoreError::UnknownUser(user_id.to_string()))
    }
}
