//! Wait status published by the external book downloader.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CrawlerStatus {
    Ready,
    #[serde(rename_all = "camelCase")]
    Waiting {
        /// The raw value from the status file.
        wait_until: String,
        remaining_ms: i64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusFile {
    wait_until: String,
}

/// Parse an RFC 3339 timestamp, or a naive ISO timestamp in local time.
fn parse_wait_until(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

/// Interpret the status file contents at `now`. Anything unreadable is
/// reported as ready.
pub(crate) fn evaluate(contents: Option<&str>, now: DateTime<Utc>) -> CrawlerStatus {
    let Some(contents) = contents else {
        return CrawlerStatus::Ready;
    };
    let Ok(file) = serde_json::from_str::<StatusFile>(contents) else {
        return CrawlerStatus::Ready;
    };
    let Some(until) = parse_wait_until(&file.wait_until) else {
        return CrawlerStatus::Ready;
    };
    if now >= until {
        return CrawlerStatus::Ready;
    }
    CrawlerStatus::Waiting {
        wait_until: file.wait_until,
        remaining_ms: (until - now).num_milliseconds(),
    }
}
