//! The admin dashboard summary.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::cohorts::{self, CohortRow, RetentionMetrics};
use super::{Snapshot, percent, round2, tally};
use crate::store::{Download, User};
use crate::time::days_between;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub user_engagement: UserEngagement,
    pub downloads: DownloadSummary,
    pub popular_books: Vec<PopularBook>,
    pub session_analytics: SessionSummary,
    pub user_segmentation: UserSegmentation,
    pub retention_metrics: RetentionMetrics,
    pub cohort_analysis: Vec<CohortRow>,
    pub content_analytics: ContentAnalytics,
    pub platform_metrics: PlatformMetrics,
    pub predictive_insights: PredictiveInsights,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEngagement {
    pub total_users: usize,
    pub daily_active_users: usize,
    pub monthly_active_users: usize,
    pub active_user_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSummary {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub by_device_type: BTreeMap<String, usize>,
    #[serde(rename = "byUIMode")]
    pub by_ui_mode: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularBook {
    pub book_id: u32,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
    pub download_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_sessions: usize,
    pub average_books_per_session: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSegmentation {
    pub power_users: usize,
    pub regular_readers: usize,
    pub casual_readers: usize,
    pub at_risk: usize,
    pub churned: usize,
    pub segment_distribution: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAnalytics {
    pub genre_distribution: BTreeMap<String, usize>,
    pub catalog_coverage: CatalogCoverage,
    pub content_lifecycle: ContentLifecycle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCoverage {
    pub total_books: usize,
    pub downloaded_books: usize,
    pub coverage_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentLifecycle {
    pub hit_concentration: f64,
    pub long_tail_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetrics {
    pub eink_adoption_rate: f64,
    pub cross_platform_users: usize,
    pub session_quality_by_platform: BTreeMap<String, PlatformSessions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSessions {
    pub avg_downloads_per_session: f64,
    pub session_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveInsights {
    pub churn_risk_score: ChurnRisk,
    pub growth_momentum: GrowthMomentum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnRisk {
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthMomentum {
    pub user_growth_rate: f64,
    pub download_growth_rate: f64,
}

const POPULAR_BOOKS: usize = 10;

fn days_since_login(user: &User, now: DateTime<Utc>) -> Option<i64> {
    user.last_login.map(|at| days_between(at, now))
}

fn count_since(times: impl Iterator<Item = DateTime<Utc>>, since: DateTime<Utc>) -> usize {
    times.filter(|at| *at > since).count()
}

pub(super) fn build(snap: &Snapshot) -> SummaryReport {
    let users: Vec<&User> = snap.approved_users().collect();
    let per_user = snap.downloads_by_user();

    SummaryReport {
        user_engagement: user_engagement(&users, snap.now),
        downloads: download_summary(&snap.downloads, snap.now),
        popular_books: popular_books(&snap.downloads),
        session_analytics: session_summary(&snap.downloads),
        user_segmentation: segmentation(&users, &per_user, snap.now),
        retention_metrics: cohorts::retention(&users, snap.now),
        cohort_analysis: cohorts::cohorts(&users),
        content_analytics: content(&snap.downloads, snap.total_books),
        platform_metrics: platform(&snap.downloads, &per_user),
        predictive_insights: PredictiveInsights {
            churn_risk_score: churn_risk(&users, snap.now),
            growth_momentum: growth(&users, &snap.downloads, snap.now),
        },
    }
}

fn user_engagement(users: &[&User], now: DateTime<Utc>) -> UserEngagement {
    let logins = || users.iter().filter_map(|u| u.last_login);
    let monthly = count_since(logins(), now - Duration::days(30));
    UserEngagement {
        total_users: users.len(),
        daily_active_users: count_since(logins(), now - Duration::days(1)),
        monthly_active_users: monthly,
        active_user_rate: percent(monthly, users.len()),
    }
}

fn download_summary(downloads: &[Download], now: DateTime<Utc>) -> DownloadSummary {
    let times = || downloads.iter().map(|d| d.downloaded_at);
    DownloadSummary {
        total: downloads.len(),
        today: count_since(times(), now - Duration::days(1)),
        this_week: count_since(times(), now - Duration::days(7)),
        this_month: count_since(times(), now - Duration::days(30)),
        by_device_type: tally(downloads.iter().map(Download::device_label)),
        by_ui_mode: tally(downloads.iter().map(Download::ui_mode_label)),
    }
}

fn popular_books(downloads: &[Download]) -> Vec<PopularBook> {
    let mut by_book: BTreeMap<u32, PopularBook> = BTreeMap::new();
    for d in downloads {
        by_book
            .entry(d.book_id)
            .or_insert_with(|| PopularBook {
                book_id: d.book_id,
                book_title: d.context.book_title.clone(),
                book_author: d.context.book_author.clone(),
                download_count: 0,
            })
            .download_count += 1;
    }
    let mut books: Vec<PopularBook> = by_book.into_values().collect();
    // Stable sort keeps ascending ids among equal counts.
    books.sort_by(|a, b| b.download_count.cmp(&a.download_count));
    books.truncate(POPULAR_BOOKS);
    books
}

#[allow(clippy::cast_precision_loss)]
fn per_session(downloads: usize, sessions: usize) -> f64 {
    if sessions == 0 {
        return 0.0;
    }
    round2(downloads as f64 / sessions as f64)
}

fn session_summary(downloads: &[Download]) -> SessionSummary {
    let sessions: BTreeSet<&str> = downloads.iter().filter_map(Download::session_id).collect();
    SessionSummary {
        total_sessions: sessions.len(),
        average_books_per_session: per_session(downloads.len(), sessions.len()),
    }
}

fn segmentation(
    users: &[&User],
    per_user: &BTreeMap<&str, Vec<&Download>>,
    now: DateTime<Utc>,
) -> UserSegmentation {
    let (mut power, mut regular, mut casual, mut at_risk, mut churned) = (0, 0, 0, 0, 0);
    for user in users {
        let count = per_user.get(user.id.as_str()).map_or(0, Vec::len);
        match days_since_login(user, now) {
            None => churned += 1,
            Some(d) if d > 30 => churned += 1,
            Some(d) if d > 14 => at_risk += 1,
            Some(_) if count >= 15 => power += 1,
            Some(_) if count >= 5 => regular += 1,
            Some(_) => casual += 1,
        }
    }

    let total = users.len();
    let segment_distribution = BTreeMap::from([
        ("powerUsers".to_string(), percent(power, total)),
        ("regularReaders".to_string(), percent(regular, total)),
        ("casualReaders".to_string(), percent(casual, total)),
        ("atRisk".to_string(), percent(at_risk, total)),
        ("churned".to_string(), percent(churned, total)),
    ]);

    UserSegmentation {
        power_users: power,
        regular_readers: regular,
        casual_readers: casual,
        at_risk,
        churned,
        segment_distribution,
    }
}

fn content(downloads: &[Download], total_books: usize) -> ContentAnalytics {
    let genre_distribution = tally(
        downloads
            .iter()
            .map(|d| d.context.genre.as_deref().filter(|g| !g.is_empty()).unwrap_or("unknown")),
    );

    let mut per_book: BTreeMap<u32, usize> = BTreeMap::new();
    for d in downloads {
        *per_book.entry(d.book_id).or_insert(0) += 1;
    }
    let mut counts: Vec<usize> = per_book.into_values().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let (hit_concentration, long_tail_value) = if downloads.is_empty() {
        (0.0, 0.0)
    } else {
        let top = counts.len().div_ceil(5).max(1);
        let hits: usize = counts.iter().take(top).sum();
        let hit = percent(hits, downloads.len());
        (hit, round2(100.0 - hit))
    };

    ContentAnalytics {
        genre_distribution,
        catalog_coverage: CatalogCoverage {
            total_books,
            downloaded_books: counts.len(),
            coverage_percentage: percent(counts.len(), total_books),
        },
        content_lifecycle: ContentLifecycle {
            hit_concentration,
            long_tail_value,
        },
    }
}

fn platform(downloads: &[Download], per_user: &BTreeMap<&str, Vec<&Download>>) -> PlatformMetrics {
    let eink_users = per_user
        .values()
        .filter(|rows| rows.iter().any(|d| d.ui_mode_label() == "eink"))
        .count();
    let cross_platform_users = per_user
        .values()
        .filter(|rows| {
            let devices: BTreeSet<&str> = rows
                .iter()
                .filter_map(|d| d.context.device_type.as_deref())
                .filter(|t| !t.is_empty())
                .collect();
            devices.len() >= 2
        })
        .count();

    let mut by_device: BTreeMap<&str, (usize, BTreeSet<&str>)> = BTreeMap::new();
    for d in downloads {
        let entry = by_device.entry(d.device_label()).or_default();
        entry.0 += 1;
        if let Some(session) = d.session_id() {
            entry.1.insert(session);
        }
    }
    let session_quality_by_platform = by_device
        .into_iter()
        .map(|(device, (count, sessions))| {
            (
                device.to_string(),
                PlatformSessions {
                    avg_downloads_per_session: per_session(count, sessions.len()),
                    session_count: sessions.len(),
                },
            )
        })
        .collect();

    PlatformMetrics {
        eink_adoption_rate: percent(eink_users, per_user.len()),
        cross_platform_users,
        session_quality_by_platform,
    }
}

fn churn_risk(users: &[&User], now: DateTime<Utc>) -> ChurnRisk {
    let mut risk = ChurnRisk {
        high_risk: 0,
        medium_risk: 0,
        low_risk: 0,
    };
    for user in users {
        match days_since_login(user, now) {
            Some(d) if d <= 7 => risk.low_risk += 1,
            Some(d) if d <= 30 => risk.medium_risk += 1,
            _ => risk.high_risk += 1,
        }
    }
    risk
}

/// Percent change of the last 7 days over the 7 before.
#[allow(clippy::cast_precision_loss)]
fn growth_rate(times: &[DateTime<Utc>], now: DateTime<Utc>) -> f64 {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);
    let current = times.iter().filter(|at| **at > week_ago && **at <= now).count();
    let previous = times
        .iter()
        .filter(|at| **at > two_weeks_ago && **at <= week_ago)
        .count();
    match (previous, current) {
        (0, 0) => 0.0,
        (0, _) => 100.0,
        (p, c) => round2((c as f64 - p as f64) / p as f64 * 100.0),
    }
}

fn growth(users: &[&User], downloads: &[Download], now: DateTime<Utc>) -> GrowthMomentum {
    let signups: Vec<DateTime<Utc>> = users.iter().map(|u| u.created_at).collect();
    let fetched: Vec<DateTime<Utc>> = downloads.iter().map(|d| d.downloaded_at).collect();
    GrowthMomentum {
        user_growth_rate: growth_rate(&signups, now),
        download_growth_rate: growth_rate(&fetched, now),
    }
}
