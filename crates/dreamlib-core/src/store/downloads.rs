//! `downloads.json` table.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::file::{Edit, JsonFile};
use super::models::{Download, DownloadContext};
use super::StoreError;

pub struct DownloadStore {
    pub(super) file: JsonFile<Vec<Download>>,
}

impl DownloadStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn all(&self) -> Result<Vec<Download>, StoreError> {
        self.file.read()
    }

    /// A user's downloads, newest first.
    pub fn for_user(&self, user_id: &str) -> Result<Vec<Download>, StoreError> {
        let mut rows: Vec<Download> = self
            .all()?
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .collect();
        rows.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at));
        Ok(rows)
    }

    pub fn book_ids_for_user(&self, user_id: &str) -> Result<Vec<u32>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.book_id)
            .collect())
    }

    /// Record a download unless the (user, book) pair is already recorded.
    ///
    /// Returns whether a row was inserted.
    pub fn track(
        &self,
        user_id: &str,
        book_id: u32,
        context: DownloadContext,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let inserted = self.file.update(|rows| {
            if rows.iter().any(|d| d.user_id == user_id && d.book_id == book_id) {
                return Edit::Keep(false);
            }
            rows.push(Download {
                user_id: user_id.to_string(),
                book_id,
                downloaded_at: now,
                context,
            });
            Edit::Write(true)
        })?;
        debug!(user_id, book_id, inserted, "Download tracked");
        Ok(inserted)
    }

    /// The "owned" toggle. Turning ownership off for a pair that does not
    /// exist is a no-op.
    pub fn set_owned(
        &self,
        user_id: &str,
        book_id: u32,
        owned: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if owned {
            self.track(user_id, book_id, DownloadContext::default(), now)?;
            return Ok(());
        }
        self.file.update(|rows| {
            let before = rows.len();
            rows.retain(|d| !(d.user_id == user_id && d.book_id == book_id));
            if rows.len() == before {
                Edit::Keep(())
            } else {
                Edit::Write(())
            }
        })
    }
}
