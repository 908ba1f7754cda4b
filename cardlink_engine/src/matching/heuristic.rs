//! Local fallback scorer for when the ranking collaborator is unreachable.
//!
//! A deterministic activity heuristic over data the engine already holds. It deliberately ignores the performance
//! features the remote model uses, so it never blocks matching on history queries.

use chrono::{DateTime, Duration, Utc};

use crate::db_types::Cardholder;

const BASE_SCORE: f64 = 0.5;
const ESTABLISHED_ACCOUNT_DAYS: i64 = 183;

/// Score a cardholder on recency of activity, card portfolio and earnings track record. Result is in `[0, 1]`.
pub fn heuristic_score(cardholder: &Cardholder, active_cards: usize, now: DateTime<Utc>) -> f64 {
    let mut score = BASE_SCORE;
    if cardholder.is_fresh(now) {
        score += 0.2;
    }
    let idle = now - cardholder.last_active_at;
    if idle < Duration::minutes(5) {
        score += 0.15;
    } else if idle < Duration::hours(1) {
        score += 0.10;
    }
    score += (active_cards as f64 * 0.05).min(0.15);
    if cardholder.earnings.total.value() > 0 {
        score += 0.1;
    }
    if now - cardholder.created_at > Duration::days(ESTABLISHED_ACCOUNT_DAYS) {
        score += 0.05;
    }
    score.min(1.0)
}
