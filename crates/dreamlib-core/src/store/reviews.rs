//! `review_status.json`: filename to needs-review flag.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::file::{Edit, JsonFile};
use super::StoreError;

pub struct ReviewFlags {
    file: JsonFile<BTreeMap<String, bool>>,
}

impl ReviewFlags {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    pub fn all(&self) -> Result<BTreeMap<String, bool>, StoreError> {
        self.file.read()
    }

    pub fn set(&self, filename: &str, needs_review: bool) -> Result<(), StoreError> {
        self.file.update(|flags| {
            flags.insert(filename.to_string(), needs_review);
            Edit::Write(())
        })
    }
}
