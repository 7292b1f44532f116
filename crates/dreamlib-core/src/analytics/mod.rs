//! Admin reports computed from the user and download tables.
//!
//! Every report is a pure function of a [`Snapshot`]; nothing is cached and
//! the current time is an input, so reports are reproducible in tests.
//! Only approved users count as users.

mod cohorts;
mod engagement;
mod ranking;
mod summary;
mod tracking;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::store::{Download, User};

pub use cohorts::{CohortRow, RetentionMetrics};
pub use engagement::{BehaviorPattern, EngagementBreakdown, EngagementExplanation};
pub use ranking::RankingEntry;
pub use summary::SummaryReport;
pub use tracking::TrackingReport;

/// Everything a report reads, captured once per request.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub downloads: Vec<Download>,
    pub total_books: usize,
    pub now: DateTime<Utc>,
}

impl Snapshot {
    pub fn approved_users(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.approved)
    }

    fn username_of(&self, user_id: &str) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map_or_else(|| "Unknown".to_string(), |u| u.username.clone())
    }

    fn downloads_by_user(&self) -> BTreeMap<&str, Vec<&Download>> {
        let mut map: BTreeMap<&str, Vec<&Download>> = BTreeMap::new();
        for d in &self.downloads {
            map.entry(d.user_id.as_str()).or_default().push(d);
        }
        map
    }

    /// Build the `/api/admin/analytics` report.
    pub fn summary(&self) -> SummaryReport {
        summary::build(self)
    }

    /// Build the `/api/admin/tracking` report.
    pub fn tracking(&self) -> TrackingReport {
        tracking::build(self)
    }

    /// Build the `/api/admin/ranking` table.
    pub fn ranking(&self) -> Vec<RankingEntry> {
        ranking::build(self)
    }
}

/// Round to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as a percentage with two decimals; 0 when `whole` is 0.
#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// `part / whole` as a whole-number percentage; 0 when `whole` is 0.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

/// Count occurrences of each label.
fn tally<'a>(labels: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
}
