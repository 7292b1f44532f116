//! Reader leaderboard.

use serde::Serialize;

use super::Snapshot;
use crate::store::Role;
use crate::time::month_key;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub total_downloads: usize,
    pub this_month_downloads: usize,
}

pub(super) fn build(snap: &Snapshot) -> Vec<RankingEntry> {
    let per_user = snap.downloads_by_user();
    let this_month = month_key(snap.now);

    let mut rows: Vec<RankingEntry> = snap
        .approved_users()
        .map(|user| {
            let mine = per_user.get(user.id.as_str()).map_or(&[][..], Vec::as_slice);
            RankingEntry {
                username: user.username.clone(),
                email: user.email.clone(),
                role: user.role,
                total_downloads: mine.len(),
                this_month_downloads: mine
                    .iter()
                    .filter(|d| month_key(d.downloaded_at) == this_month)
                    .count(),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_downloads
            .cmp(&a.total_downloads)
            .then_with(|| a.username.cmp(&b.username))
    });
    rows
}
