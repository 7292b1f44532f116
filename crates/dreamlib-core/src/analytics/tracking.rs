//! The per-user activity tracking report.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;

use super::engagement::{self, BehaviorPattern, EngagementBreakdown};
use super::{Snapshot, round2, tally, whole_percent};
use crate::store::{Download, User};
use crate::time::{date_string, days_between, start_of_day, within};

const RECENT_ACTIVITY_LIMIT: usize = 50;
const TOP_SESSIONS: usize = 10;
const TIMELINE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingReport {
    pub recent_activity: Vec<ActivityEvent>,
    pub user_activities: Vec<UserActivity>,
    pub activity_heatmap: ActivityHeatmap,
    pub session_analytics: SessionReport,
    pub user_journey: UserJourney,
    pub behavior_patterns: BehaviorCounts,
    pub time_metrics: TimeMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Signup,
    Login,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub activity_type: ActivityKind,
    pub timestamp: DateTime<Utc>,
    pub metadata: ActivityMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub total_sessions: usize,
    pub total_downloads: usize,
    /// Estimated minutes per session.
    pub avg_session_duration: u32,
    pub last_activity: DateTime<Utc>,
    pub first_activity: DateTime<Utc>,
    pub activity_timeline: Vec<TimelineDay>,
    pub device_preferences: BTreeMap<String, usize>,
    pub ui_mode_preferences: BTreeMap<String, usize>,
    pub engagement_score: u32,
    pub engagement_score_breakdown: EngagementBreakdown,
    pub download_history: Vec<HistoryEntry>,
    pub behavior_pattern: BehaviorPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineDay {
    pub date: String,
    pub logins: usize,
    pub downloads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub book_id: u32,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
    pub downloaded_at: DateTime<Utc>,
    pub device_type: Option<String>,
    pub ui_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityHeatmap {
    /// `[day][hour]`, day 0 is Sunday, hours in UTC.
    pub hourly_pattern: Vec<Vec<usize>>,
    pub peak_hours: Vec<HourCount>,
    pub quiet_hours: Vec<HourCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourCount {
    pub hour: usize,
    pub day: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// Minutes.
    pub avg_session_length: i64,
    pub sessions_per_user: f64,
    pub total_unique_sessions: usize,
    pub session_distribution: SessionDistribution,
    pub top_sessions: Vec<SessionRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionDistribution {
    #[serde(rename = "< 5 min")]
    pub under_5: usize,
    #[serde(rename = "5-15 min")]
    pub from_5_to_15: usize,
    #[serde(rename = "15-30 min")]
    pub from_15_to_30: usize,
    #[serde(rename = "30-60 min")]
    pub from_30_to_60: usize,
    #[serde(rename = "> 60 min")]
    pub over_60: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub session_id: String,
    pub user_id: String,
    pub username: String,
    pub download_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minutes.
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJourney {
    pub signups: usize,
    pub first_login: usize,
    pub first_download: usize,
    pub second_download: usize,
    pub tenth_download: usize,
    pub return_users: usize,
    pub conversion_rates: ConversionRates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRates {
    pub signup_to_first_download: u32,
    pub first_to_second_download: u32,
    pub activation_rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorCounts {
    pub binge_readers: usize,
    pub casual_readers: usize,
    pub explorers: usize,
    pub power_users: usize,
    pub inactive: usize,
    pub download_distribution: DownloadDistribution,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadDistribution {
    #[serde(rename = "0 downloads")]
    pub none: usize,
    #[serde(rename = "1-4 downloads")]
    pub from_1_to_4: usize,
    #[serde(rename = "5-14 downloads")]
    pub from_5_to_14: usize,
    #[serde(rename = "15-29 downloads")]
    pub from_15_to_29: usize,
    #[serde(rename = "30+ downloads")]
    pub over_30: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeMetrics {
    pub daily_active_users: Vec<usize>,
    pub weekly_active_users: Vec<usize>,
    pub monthly_trends: Vec<TrendDay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendDay {
    pub date: String,
    pub users: usize,
    pub downloads: usize,
    pub sessions: usize,
}

pub(super) fn build(snap: &Snapshot) -> TrackingReport {
    let users: Vec<&User> = snap.approved_users().collect();
    let per_user = snap.downloads_by_user();
    let empty = Vec::new();

    let mut user_activities: Vec<UserActivity> = users
        .iter()
        .map(|u| user_activity(u, per_user.get(u.id.as_str()).unwrap_or(&empty), snap.now))
        .collect();
    user_activities.sort_by(|a, b| b.engagement_score.cmp(&a.engagement_score));

    let approved_counts: Vec<usize> = users
        .iter()
        .map(|u| per_user.get(u.id.as_str()).map_or(0, Vec::len))
        .collect();

    TrackingReport {
        recent_activity: recent_activity(snap, &users),
        activity_heatmap: heatmap(&snap.downloads),
        session_analytics: sessions(snap, users.len()),
        user_journey: journey(&users, &approved_counts),
        behavior_patterns: behavior_counts(&user_activities, &approved_counts),
        time_metrics: time_metrics(&users, &snap.downloads, snap.now),
        user_activities,
    }
}

fn recent_activity(snap: &Snapshot, users: &[&User]) -> Vec<ActivityEvent> {
    let since = snap.now - Duration::days(1);
    let mut events = Vec::new();

    for user in users.iter().filter(|u| u.created_at > since) {
        events.push(ActivityEvent {
            id: format!("signup-{}", user.id),
            user_id: user.id.clone(),
            username: user.username.clone(),
            activity_type: ActivityKind::Signup,
            timestamp: user.created_at,
            metadata: ActivityMetadata::default(),
        });
    }
    for user in users {
        if let Some(at) = user.last_login.filter(|at| *at > since) {
            events.push(ActivityEvent {
                id: format!("login-{}-{}", user.id, at.to_rfc3339()),
                user_id: user.id.clone(),
                username: user.username.clone(),
                activity_type: ActivityKind::Login,
                timestamp: at,
                metadata: ActivityMetadata::default(),
            });
        }
    }
    for (idx, d) in snap.downloads.iter().filter(|d| d.downloaded_at > since).enumerate() {
        events.push(ActivityEvent {
            id: format!("download-{idx}-{}", d.downloaded_at.to_rfc3339()),
            user_id: d.user_id.clone(),
            username: snap.username_of(&d.user_id),
            activity_type: ActivityKind::Download,
            timestamp: d.downloaded_at,
            metadata: ActivityMetadata {
                book_title: d.context.book_title.clone(),
                book_id: Some(d.book_id),
                device_type: d.context.device_type.clone(),
                ui_mode: d.context.ui_mode.clone(),
                session_id: d.context.session_id.clone(),
            },
        });
    }

    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events.truncate(RECENT_ACTIVITY_LIMIT);
    events
}

/// Distinct session ids, or one implicit session when there are downloads
/// but no ids.
fn session_count(rows: &[&Download]) -> usize {
    let ids: BTreeSet<&str> = rows.iter().filter_map(|d| d.session_id()).collect();
    if ids.is_empty() && !rows.is_empty() {
        1
    } else {
        ids.len()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn estimated_session_minutes(downloads: usize, sessions: usize) -> u32 {
    if sessions == 0 {
        return 0;
    }
    (downloads as f64 / sessions as f64 * 3.0).round() as u32
}

fn user_activity(user: &User, rows: &[&Download], now: DateTime<Utc>) -> UserActivity {
    let downloads = rows.len();
    let sessions = session_count(rows);
    let device_preferences = tally(rows.iter().map(|d| d.device_label()));
    let ui_mode_preferences = tally(rows.iter().map(|d| d.ui_mode_label()));
    let days_since_login = user.last_login.map(|at| days_between(at, now));

    let breakdown = engagement::score(downloads, days_since_login, sessions, device_preferences.len());

    let activity_timeline = (0..TIMELINE_DAYS)
        .rev()
        .map(|back| {
            let date = date_string(now - Duration::days(back));
            TimelineDay {
                downloads: rows
                    .iter()
                    .filter(|d| date_string(d.downloaded_at) == date)
                    .count(),
                logins: usize::from(user.last_login.is_some_and(|at| date_string(at) == date)),
                date,
            }
        })
        .collect();

    let moments = std::iter::once(user.created_at)
        .chain(user.last_login)
        .chain(rows.iter().map(|d| d.downloaded_at));
    let (first_activity, last_activity) = moments.fold(
        (user.created_at, user.created_at),
        |(lo, hi), at| (lo.min(at), hi.max(at)),
    );

    let mut download_history: Vec<HistoryEntry> = rows
        .iter()
        .map(|d| HistoryEntry {
            book_id: d.book_id,
            book_title: d.context.book_title.clone(),
            book_author: d.context.book_author.clone(),
            downloaded_at: d.downloaded_at,
            device_type: d.context.device_type.clone(),
            ui_mode: d.context.ui_mode.clone(),
        })
        .collect();
    download_history.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at));

    UserActivity {
        user_id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        total_sessions: sessions,
        total_downloads: downloads,
        avg_session_duration: estimated_session_minutes(downloads, sessions),
        last_activity,
        first_activity,
        activity_timeline,
        device_preferences,
        ui_mode_preferences,
        engagement_score: breakdown.total,
        behavior_pattern: engagement::classify(downloads, sessions, days_since_login),
        engagement_score_breakdown: breakdown,
        download_history,
    }
}

fn heatmap(downloads: &[Download]) -> ActivityHeatmap {
    let mut grid = vec![vec![0_usize; 24]; 7];
    for d in downloads {
        let day = d.downloaded_at.weekday().num_days_from_sunday() as usize;
        let hour = d.downloaded_at.hour() as usize;
        grid[day][hour] += 1;
    }

    let mut cells: Vec<HourCount> = grid
        .iter()
        .enumerate()
        .flat_map(|(day, hours)| {
            hours
                .iter()
                .enumerate()
                .map(move |(hour, &count)| HourCount { hour, day, count })
        })
        .collect();
    let quiet_hours: Vec<HourCount> = cells.iter().filter(|c| c.count == 0).take(5).copied().collect();
    cells.sort_by(|a, b| b.count.cmp(&a.count));
    cells.truncate(5);

    ActivityHeatmap {
        hourly_pattern: grid,
        peak_hours: cells,
        quiet_hours,
    }
}

struct SessionAcc {
    user_id: String,
    downloads: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn sessions(snap: &Snapshot, approved_users: usize) -> SessionReport {
    // Keyed by session id, kept in first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut map: BTreeMap<String, SessionAcc> = BTreeMap::new();
    for d in &snap.downloads {
        let key = d
            .session_id()
            .map_or_else(|| format!("nosession-{}", d.user_id), ToString::to_string);
        let acc = map.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            SessionAcc {
                user_id: d.user_id.clone(),
                downloads: 0,
                start: d.downloaded_at,
                end: d.downloaded_at,
            }
        });
        acc.downloads += 1;
        acc.start = acc.start.min(d.downloaded_at);
        acc.end = acc.end.max(d.downloaded_at);
    }

    let mut distribution = SessionDistribution::default();
    let mut total_minutes = 0.0;
    let mut rows = Vec::with_capacity(order.len());
    for key in order {
        let Some(acc) = map.remove(&key) else { continue };
        let minutes = (acc.end - acc.start).num_milliseconds() as f64 / 60_000.0;
        total_minutes += minutes;
        match minutes {
            m if m < 5.0 => distribution.under_5 += 1,
            m if m < 15.0 => distribution.from_5_to_15 += 1,
            m if m < 30.0 => distribution.from_15_to_30 += 1,
            m if m < 60.0 => distribution.from_30_to_60 += 1,
            _ => distribution.over_60 += 1,
        }
        rows.push(SessionRow {
            username: snap.username_of(&acc.user_id),
            session_id: key,
            user_id: acc.user_id,
            download_count: acc.downloads,
            start_time: acc.start,
            end_time: acc.end,
            duration: minutes.round() as i64,
        });
    }

    let total = rows.len();
    rows.sort_by(|a, b| b.download_count.cmp(&a.download_count));
    rows.truncate(TOP_SESSIONS);

    SessionReport {
        avg_session_length: if total == 0 {
            0
        } else {
            (total_minutes / total as f64).round() as i64
        },
        sessions_per_user: if approved_users == 0 {
            0.0
        } else {
            round2(total as f64 / approved_users as f64)
        },
        total_unique_sessions: total,
        session_distribution: distribution,
        top_sessions: rows,
    }
}

fn journey(users: &[&User], download_counts: &[usize]) -> UserJourney {
    let signups = users.len();
    let first_download = download_counts.iter().filter(|c| **c >= 1).count();
    let second_download = download_counts.iter().filter(|c| **c >= 2).count();
    UserJourney {
        signups,
        first_login: users.iter().filter(|u| u.last_login.is_some()).count(),
        first_download,
        second_download,
        tenth_download: download_counts.iter().filter(|c| **c >= 10).count(),
        return_users: users
            .iter()
            .filter(|u| u.last_login.is_some_and(|at| days_between(u.created_at, at) >= 1))
            .count(),
        conversion_rates: ConversionRates {
            signup_to_first_download: whole_percent(first_download, signups),
            first_to_second_download: whole_percent(second_download, first_download),
            activation_rate: whole_percent(second_download, signups),
        },
    }
}

fn behavior_counts(activities: &[UserActivity], download_counts: &[usize]) -> BehaviorCounts {
    let mut counts = BehaviorCounts::default();
    for activity in activities {
        match activity.behavior_pattern {
            BehaviorPattern::PowerUser => counts.power_users += 1,
            BehaviorPattern::BingeReader => counts.binge_readers += 1,
            BehaviorPattern::Explorer => counts.explorers += 1,
            BehaviorPattern::Casual => counts.casual_readers += 1,
            BehaviorPattern::Inactive => counts.inactive += 1,
        }
    }
    let dist = &mut counts.download_distribution;
    for &count in download_counts {
        match count {
            0 => dist.none += 1,
            1..=4 => dist.from_1_to_4 += 1,
            5..=14 => dist.from_5_to_14 += 1,
            15..=29 => dist.from_15_to_29 += 1,
            _ => dist.over_30 += 1,
        }
    }
    counts
}

fn time_metrics(users: &[&User], downloads: &[Download], now: DateTime<Utc>) -> TimeMetrics {
    let today = start_of_day(now);
    let logins_within = |start: DateTime<Utc>, end: DateTime<Utc>| {
        users
            .iter()
            .filter(|u| u.last_login.is_some_and(|at| within(at, start, end)))
            .count()
    };

    let daily_active_users = (0..7)
        .rev()
        .map(|back| {
            let start = today - Duration::days(back);
            logins_within(start, start + Duration::days(1))
        })
        .collect();

    let weekly_active_users = (0..4)
        .rev()
        .map(|back| {
            let end = now - Duration::weeks(back);
            let start = end - Duration::weeks(1);
            users
                .iter()
                .filter(|u| u.last_login.is_some_and(|at| at > start && at <= end))
                .count()
        })
        .collect();

    let monthly_trends = (0..TIMELINE_DAYS)
        .rev()
        .map(|back| {
            let start = today - Duration::days(back);
            let end = start + Duration::days(1);
            let day_rows: Vec<&Download> = downloads
                .iter()
                .filter(|d| within(d.downloaded_at, start, end))
                .collect();
            let sessions: BTreeSet<&str> = day_rows.iter().filter_map(|d| d.session_id()).collect();
            TrendDay {
                date: date_string(start),
                users: logins_within(start, end),
                downloads: day_rows.len(),
                sessions: sessions.len(),
            }
        })
        .collect();

    TimeMetrics {
        daily_active_users,
        weekly_active_users,
        monthly_trends,
    }
}
