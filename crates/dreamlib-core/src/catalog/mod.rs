//! Read-only view of the EPUB books directory.
//!
//! Layout:
//! - `<books>/*.epub`: the books
//! - `<books>/metadata/<basename>.json`: sidecar overrides
//! - `<books>/covers/<file>`: cover images
//! - `<books>/download_status.json`: downloader wait status
//!
//! Nothing is cached; every call re-reads the directory. Sidecar writes go
//! through one shared lock per sidecar file.

mod metadata;
mod status;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub use metadata::{BookMetadata, MetadataPatch};
pub use status::CrawlerStatus;

use crate::store::{Edit, JsonFile, StoreError};

/// Errors raised while resolving catalog files.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid filename: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Catalog I/O error: {0}")]
    Io(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] StoreError),
}

/// A catalog entry as the library page sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: u32,
    pub title: String,
    pub filename: String,
    pub size: u64,
    pub added_date: DateTime<Utc>,
    pub cover: Option<String>,
    pub cover_updated: Option<Value>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub year: Option<Value>,
    pub needs_review: bool,
}

/// Filename-keyed entry for the admin console.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBook {
    pub filename: String,
    pub title: String,
    pub author: Option<String>,
    pub year: Option<Value>,
    pub description: Option<String>,
    pub cover: Option<String>,
    pub cover_updated: Option<Value>,
    pub needs_review: bool,
    pub size: u64,
    pub added_date: DateTime<Utc>,
    pub metadata_path: Option<String>,
}

/// One `.epub` with its merged sidecar, before ids are assigned.
struct Entry {
    filename: String,
    size: u64,
    added: DateTime<Utc>,
    metadata: BookMetadata,
    metadata_path: Option<PathBuf>,
}

impl Entry {
    fn title(&self) -> String {
        self.metadata
            .text("title")
            .unwrap_or_else(|| base_name(&self.filename).to_string())
    }
}

fn base_name(filename: &str) -> &str {
    filename.strip_suffix(".epub").unwrap_or(filename)
}

/// Reject names that could escape their directory.
fn check_plain_name(filename: &str) -> Result<(), CatalogError> {
    let bad = filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0')
        || filename.contains("..");
    if bad {
        return Err(CatalogError::InvalidName(filename.to_string()));
    }
    Ok(())
}

fn check_book_name(filename: &str) -> Result<(), CatalogError> {
    check_plain_name(filename)?;
    if !filename.ends_with(".epub") {
        return Err(CatalogError::InvalidName(filename.to_string()));
    }
    Ok(())
}

/// Content type for a cover image, by extension.
pub fn cover_content_type(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Quoted ETag derived from a modification time in unix milliseconds.
pub fn etag_for(modified: SystemTime) -> String {
    format!("\"{}\"", DateTime::<Utc>::from(modified).timestamp_millis())
}

type Sidecar = Arc<JsonFile<BookMetadata>>;

pub struct Catalog {
    books_dir: PathBuf,
    sidecars: Mutex<HashMap<PathBuf, Sidecar>>,
}

impl Catalog {
    pub fn new(books_dir: impl Into<PathBuf>) -> Self {
        Self {
            books_dir: books_dir.into(),
            sidecars: Mutex::new(HashMap::new()),
        }
    }

    pub fn books_dir(&self) -> &Path {
        &self.books_dir
    }

    fn metadata_dir(&self) -> PathBuf {
        self.books_dir.join("metadata")
    }

    fn covers_dir(&self) -> PathBuf {
        self.books_dir.join("covers")
    }

    fn metadata_path(&self, filename: &str) -> PathBuf {
        self.metadata_dir().join(format!("{}.json", base_name(filename)))
    }

    /// Every `.epub` sorted by filename. A missing directory is empty.
    fn entries(&self) -> Result<Vec<Entry>, CatalogError> {
        let read_dir = match std::fs::read_dir(&self.books_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CatalogError::Io(format!("{}: {e}", self.books_dir.display())));
            }
        };

        let mut names: Vec<String> = read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".epub"))
            .collect();
        names.sort();

        let mut entries = Vec::with_capacity(names.len());
        for filename in names {
            let path = self.books_dir.join(&filename);
            let stat = match std::fs::metadata(&path) {
                Ok(stat) if stat.is_file() => stat,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable book");
                    continue;
                }
            };
            let added = stat
                .created()
                .or_else(|_| stat.modified())
                .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
            let (metadata, metadata_path) = self.load_sidecar(&filename);
            entries.push(Entry {
                filename,
                size: stat.len(),
                added,
                metadata,
                metadata_path,
            });
        }
        Ok(entries)
    }

    fn load_sidecar(&self, filename: &str) -> (BookMetadata, Option<PathBuf>) {
        let path = self.metadata_path(filename);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return (BookMetadata::default(), None);
        };
        match serde_json::from_str(&content) {
            Ok(meta) => (meta, Some(path)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable metadata");
                (BookMetadata::default(), Some(path))
            }
        }
    }

    /// The public listing: ids by filename order, newest first.
    pub fn list(&self, review_flags: &BTreeMap<String, bool>) -> Result<Vec<Book>, CatalogError> {
        let mut books: Vec<Book> = self
            .entries()?
            .into_iter()
            .zip(1_u32..)
            .map(|(entry, id)| Book {
                id,
                title: entry.title(),
                needs_review: review_flags.get(&entry.filename).copied().unwrap_or(false),
                cover: entry.metadata.text("cover"),
                cover_updated: entry.metadata.scalar("cover_updated"),
                description: entry.metadata.text("description"),
                author: entry.metadata.text("author"),
                year: entry.metadata.scalar("year"),
                size: entry.size,
                added_date: entry.added,
                filename: entry.filename,
            })
            .collect();
        books.sort_by(|a, b| b.added_date.cmp(&a.added_date));
        Ok(books)
    }

    /// The admin listing, keyed by filename, newest first.
    pub fn admin_list(
        &self,
        review_flags: &BTreeMap<String, bool>,
    ) -> Result<Vec<AdminBook>, CatalogError> {
        let mut books: Vec<AdminBook> = self
            .entries()?
            .into_iter()
            .map(|entry| AdminBook {
                title: entry.title(),
                needs_review: review_flags.get(&entry.filename).copied().unwrap_or(false),
                author: entry.metadata.text("author"),
                year: entry.metadata.scalar("year"),
                description: entry.metadata.text("description"),
                cover: entry.metadata.text("cover"),
                cover_updated: entry.metadata.scalar("cover_updated"),
                size: entry.size,
                added_date: entry.added,
                metadata_path: entry.metadata_path.map(|p| p.display().to_string()),
                filename: entry.filename,
            })
            .collect();
        books.sort_by(|a, b| b.added_date.cmp(&a.added_date));
        Ok(books)
    }

    pub fn find_by_id(&self, id: u32) -> Result<Option<Book>, CatalogError> {
        Ok(self.list(&BTreeMap::new())?.into_iter().find(|b| b.id == id))
    }

    /// Path of an existing book file.
    pub fn book_path(&self, filename: &str) -> Result<PathBuf, CatalogError> {
        check_book_name(filename)?;
        let path = self.books_dir.join(filename);
        if !path.is_file() {
            return Err(CatalogError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    /// Path of an existing cover image.
    pub fn cover_path(&self, filename: &str) -> Result<PathBuf, CatalogError> {
        check_plain_name(filename)?;
        let path = self.covers_dir().join(filename);
        if !path.is_file() {
            return Err(CatalogError::NotFound(filename.to_string()));
        }
        Ok(path)
    }

    /// Merge `patch` into the book's sidecar, creating it if needed.
    pub fn update_metadata(&self, patch: &MetadataPatch) -> Result<BookMetadata, CatalogError> {
        check_book_name(&patch.filename)?;
        let file = self.sidecar(self.metadata_path(&patch.filename))?;
        let merged = file.update(|meta| {
            meta.apply(patch);
            Edit::Write(meta.clone())
        })?;
        Ok(merged)
    }

    /// The shared handle for the sidecar at `path`, so concurrent edits of
    /// one book serialize on the same lock.
    fn sidecar(&self, path: PathBuf) -> Result<Sidecar, CatalogError> {
        let mut sidecars = self
            .sidecars
            .lock()
            .map_err(|_| StoreError::Poisoned("sidecar registry".into()))?;
        Ok(Arc::clone(
            sidecars
                .entry(path)
                .or_insert_with_key(|path| Arc::new(JsonFile::new(path.clone()))),
        ))
    }

    /// Downloader wait status at `now`.
    pub fn crawler_status(&self, now: DateTime<Utc>) -> CrawlerStatus {
        let contents = std::fs::read_to_string(self.books_dir.join("download_status.json")).ok();
        status::evaluate(contents.as_deref(), now)
    }
}
