//! Per-user engagement scoring and behavior classification.

use serde::Serialize;

/// Points per bucket; the total saturates at 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementBreakdown {
    pub download_score: u32,
    pub recency_score: u32,
    pub session_score: u32,
    pub diversity_score: u32,
    pub total: u32,
    pub explanation: EngagementExplanation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementExplanation {
    pub downloads: String,
    pub recency: String,
    pub sessions: String,
    pub diversity: String,
}

fn download_bucket(downloads: usize) -> (u32, String) {
    match downloads {
        15.. => (40, format!("Power user (15+ books): {downloads} downloads")),
        5..=14 => (25, format!("Active reader (5-14 books): {downloads} downloads")),
        1..=4 => (10, format!("Getting started (1-4 books): {downloads} downloads")),
        0 => (0, "No downloads yet".to_string()),
    }
}

fn recency_bucket(days_since_login: Option<i64>) -> (u32, String) {
    match days_since_login {
        None => (0, "Never logged in".to_string()),
        Some(d) if d <= 1 => (30, format!("Very recent (within 1 day): {d} days ago")),
        Some(d) if d <= 7 => (20, format!("Recent (within 1 week): {d} days ago")),
        Some(d) if d <= 14 => (10, format!("Fading (within 2 weeks): {d} days ago")),
        Some(d) => (0, format!("Long inactive: {d} days ago")),
    }
}

fn session_bucket(sessions: usize) -> (u32, String) {
    match sessions {
        10.. => (20, format!("Very active (10+ sessions): {sessions}")),
        5..=9 => (15, format!("Active (5-9 sessions): {sessions}")),
        2..=4 => (10, format!("Moderate (2-4 sessions): {sessions}")),
        _ => (0, format!("Low activity: {sessions} sessions")),
    }
}

fn diversity_bucket(device_count: usize) -> (u32, String) {
    match device_count {
        0 => (0, "No device information".to_string()),
        1 => (0, "Single device".to_string()),
        n => (10, format!("Multi-device: {n} devices")),
    }
}

/// Score a user's engagement from their activity counts.
pub fn score(
    downloads: usize,
    days_since_login: Option<i64>,
    sessions: usize,
    device_count: usize,
) -> EngagementBreakdown {
    let (download_score, downloads_why) = download_bucket(downloads);
    let (recency_score, recency_why) = recency_bucket(days_since_login);
    let (session_score, sessions_why) = session_bucket(sessions);
    let (diversity_score, diversity_why) = diversity_bucket(device_count);

    EngagementBreakdown {
        download_score,
        recency_score,
        session_score,
        diversity_score,
        total: (download_score + recency_score + session_score + diversity_score).min(100),
        explanation: EngagementExplanation {
            downloads: downloads_why,
            recency: recency_why,
            sessions: sessions_why,
            diversity: diversity_why,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorPattern {
    PowerUser,
    BingeReader,
    Explorer,
    Casual,
    Inactive,
}

/// First matching pattern wins.
pub fn classify(downloads: usize, sessions: usize, days_since_login: Option<i64>) -> BehaviorPattern {
    let Some(days) = days_since_login.filter(|d| *d <= 30) else {
        return BehaviorPattern::Inactive;
    };
    if downloads >= 15 && days <= 7 {
        return BehaviorPattern::PowerUser;
    }
    if sessions > 0 && downloads >= 5 * sessions {
        return BehaviorPattern::BingeReader;
    }
    if sessions >= 5 && downloads < 10 {
        return BehaviorPattern::Explorer;
    }
    BehaviorPattern::Casual
}
