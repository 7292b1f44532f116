//! Signup retention and weekly cohorts.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::percent;
use crate::store::User;
use crate::time::{date_string, days_between, start_of_week, within};

/// Number of most recent weekly cohorts reported.
const MAX_COHORTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionMetrics {
    pub d1_retention: f64,
    pub d7_retention: f64,
    pub d30_retention: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortRow {
    /// Monday (UTC) starting the signup week, `YYYY-MM-DD`.
    pub cohort_week: String,
    pub signup_count: usize,
    pub week1_retention: f64,
    pub week2_retention: f64,
    pub week3_retention: f64,
    pub week4_retention: f64,
}

/// Of the users who signed up at least `days` ago, the share whose last
/// login came at least `days` after signup.
fn day_n_retention(users: &[&User], days: i64, now: DateTime<Utc>) -> f64 {
    let eligible: Vec<&&User> = users
        .iter()
        .filter(|u| days_between(u.created_at, now) >= days)
        .collect();
    let retained = eligible
        .iter()
        .filter(|u| u.last_login.is_some_and(|at| days_between(u.created_at, at) >= days))
        .count();
    percent(retained, eligible.len())
}

pub fn retention(users: &[&User], now: DateTime<Utc>) -> RetentionMetrics {
    RetentionMetrics {
        d1_retention: day_n_retention(users, 1, now),
        d7_retention: day_n_retention(users, 7, now),
        d30_retention: day_n_retention(users, 30, now),
    }
}

fn week_retention(members: &[&User], week_start: DateTime<Utc>, n: i32) -> f64 {
    let start = week_start + Duration::weeks(i64::from(n));
    let end = start + Duration::weeks(1);
    let active = members
        .iter()
        .filter(|u| u.last_login.is_some_and(|at| within(at, start, end)))
        .count();
    percent(active, members.len())
}

/// Weekly signup cohorts, oldest first, limited to the most recent ones.
pub fn cohorts(users: &[&User]) -> Vec<CohortRow> {
    let mut by_week: BTreeMap<DateTime<Utc>, Vec<&User>> = BTreeMap::new();
    for &user in users {
        by_week.entry(start_of_week(user.created_at)).or_default().push(user);
    }

    let skip = by_week.len().saturating_sub(MAX_COHORTS);
    by_week
        .into_iter()
        .skip(skip)
        .map(|(week_start, members)| CohortRow {
            cohort_week: date_string(week_start),
            signup_count: members.len(),
            week1_retention: week_retention(&members, week_start, 1),
            week2_retention: week_retention(&members, week_start, 2),
            week3_retention: week_retention(&members, week_start, 3),
            week4_retention: week_retention(&members, week_start, 4),
        })
        .collect()
}
