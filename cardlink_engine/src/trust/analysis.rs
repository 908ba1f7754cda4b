//! The six behavioural sub-analyses.
//!
//! Each analyser takes the requester's history, oldest first, and produces a 0-100 risk score along with the raw
//! signals the factor lists are built from. Everything in here is a pure function of its inputs; given the same
//! history and clock, the output is identical.

use chrono::{DateTime, Datelike, Timelike, Utc};
use cl_common::Money;
use serde::{Deserialize, Serialize};

use super::tables;
use crate::db_types::{Category, City, DeviceType, PaymentRequest, RequestStatus};

/// Requests above this amount count as high-value for the transaction analysis.
const HIGH_VALUE_THRESHOLD: Money = Money::from_rupees(10_000);
/// Consecutive requests closer together than this count as rapid-fire.
const RAPID_GAP_MINUTES: i64 = 30;

//--------------------------------------    HistoryRecord     --------------------------------------------------------
/// The slice of a prior `PaymentRequest` the trust engine looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub created_at: DateTime<Utc>,
    pub amount: Money,
    pub status: RequestStatus,
    pub city: City,
    pub device: DeviceType,
    pub category: Category,
}

impl HistoryRecord {
    /// The dominant category of a request is the category of its highest-value line.
    pub fn from_request(req: &PaymentRequest) -> Self {
        let category = req
            .line_items
            .iter()
            .max_by_key(|li| li.subtotal().value())
            .map(|li| li.category)
            .unwrap_or(Category::Other);
        Self {
            created_at: req.created_at,
            amount: req.order_amount,
            status: req.status,
            city: req.city,
            device: req.device_type,
            category,
        }
    }
}

//--------------------------------------     Signal sets      --------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoSignals {
    pub change_freq: f64,
    pub unique_cities: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalSignals {
    pub off_hours_ratio: f64,
    pub weekend_ratio: f64,
    pub rapid_ratio: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionSignals {
    pub escalation_rate: f64,
    pub jump_rate: f64,
    pub high_value_ratio: f64,
    pub coefficient_of_variation: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceSignals {
    pub switch_freq: f64,
    pub unique_devices: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CategorySignals {
    pub switch_freq: f64,
    pub luxury_ratio: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalSignals {
    pub account_age_days: i64,
    pub decline_rate: f64,
    pub success_rate: f64,
    pub score: f64,
}

fn clamp(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

fn transition_frequency<T: PartialEq>(values: &[T]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let changes = values.windows(2).filter(|w| w[0] != w[1]).count();
    changes as f64 / (values.len() - 1) as f64
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

//--------------------------------------     Analysers        --------------------------------------------------------

/// City-change churn, city spread and the per-city risk table.
pub fn analyse_geographic(history: &[HistoryRecord]) -> GeoSignals {
    let cities: Vec<City> = history.iter().map(|r| r.city).collect();
    let change_freq = transition_frequency(&cities);
    let mut unique = cities.clone();
    unique.sort_by_key(|c| c.to_string());
    unique.dedup();
    let avg_risk = if cities.is_empty() {
        0.0
    } else {
        cities.iter().map(|c| tables::city_risk(*c)).sum::<f64>() / cities.len() as f64
    };
    let spread = (unique.len() as f64 / 5.0).min(1.0);
    let score = clamp(40.0 * change_freq + 30.0 * spread + 30.0 * avg_risk);
    GeoSignals { change_freq, unique_cities: unique.len(), score }
}

/// Off-hours (23:00-06:00), weekend, and rapid-fire request ratios.
pub fn analyse_temporal(history: &[HistoryRecord]) -> TemporalSignals {
    let n = history.len();
    let off_hours = history.iter().filter(|r| {
        let hour = r.created_at.hour();
        hour >= 23 || hour < 6
    });
    let weekends = history.iter().filter(|r| {
        let wd = r.created_at.weekday();
        wd == chrono::Weekday::Sat || wd == chrono::Weekday::Sun
    });
    let rapid = history
        .windows(2)
        .filter(|w| (w[1].created_at - w[0].created_at) < chrono::Duration::minutes(RAPID_GAP_MINUTES))
        .count();
    let off_hours_ratio = ratio(off_hours.count(), n);
    let weekend_ratio = ratio(weekends.count(), n);
    let rapid_ratio = if n < 2 { 0.0 } else { rapid as f64 / (n - 1) as f64 };
    let score = clamp(40.0 * off_hours_ratio + 25.0 * weekend_ratio + 35.0 * rapid_ratio);
    TemporalSignals { off_hours_ratio, weekend_ratio, rapid_ratio, score }
}

/// Amount escalation, step jumps, high-value share and overall amount volatility.
pub fn analyse_transaction(history: &[HistoryRecord]) -> TransactionSignals {
    let amounts: Vec<f64> = history.iter().map(|r| r.amount.value() as f64).collect();
    let n = amounts.len();
    let pairs = n.saturating_sub(1);
    let escalations = amounts.windows(2).filter(|w| w[1] > w[0]).count();
    let jumps = amounts.windows(2).filter(|w| w[0] > 0.0 && w[1] > 2.0 * w[0]).count();
    let high_value = history.iter().filter(|r| r.amount > HIGH_VALUE_THRESHOLD).count();
    let escalation_rate = if pairs == 0 { 0.0 } else { escalations as f64 / pairs as f64 };
    let jump_rate = if pairs == 0 { 0.0 } else { jumps as f64 / pairs as f64 };
    let high_value_ratio = ratio(high_value, n);
    let coefficient_of_variation = if n < 2 {
        0.0
    } else {
        let mean = amounts.iter().sum::<f64>() / n as f64;
        if mean <= 0.0 {
            0.0
        } else {
            let var = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n as f64;
            var.sqrt() / mean
        }
    };
    let score = clamp(
        30.0 * escalation_rate +
            25.0 * jump_rate +
            25.0 * high_value_ratio +
            20.0 * coefficient_of_variation.min(1.0),
    );
    TransactionSignals { escalation_rate, jump_rate, high_value_ratio, coefficient_of_variation, score }
}

/// Device churn plus the per-device risk table.
pub fn analyse_device(history: &[HistoryRecord]) -> DeviceSignals {
    let devices: Vec<DeviceType> = history.iter().map(|r| r.device).collect();
    let switch_freq = transition_frequency(&devices);
    let mut unique = devices.clone();
    unique.sort_by_key(|d| d.to_string());
    unique.dedup();
    let avg_risk = if devices.is_empty() {
        0.0
    } else {
        devices.iter().map(|d| tables::device_risk(*d)).sum::<f64>() / devices.len() as f64
    };
    let score = clamp(60.0 * switch_freq + 40.0 * avg_risk);
    DeviceSignals { switch_freq, unique_devices: unique.len(), score }
}

/// Category churn, luxury share and the per-category risk table.
pub fn analyse_category(history: &[HistoryRecord]) -> CategorySignals {
    let categories: Vec<Category> = history.iter().map(|r| r.category).collect();
    let switch_freq = transition_frequency(&categories);
    let luxury = categories.iter().filter(|c| c.is_luxury()).count();
    let luxury_ratio = ratio(luxury, categories.len());
    let avg_risk = if categories.is_empty() {
        0.0
    } else {
        categories.iter().map(|c| tables::category_risk(*c)).sum::<f64>() / categories.len() as f64
    };
    let score = clamp(40.0 * switch_freq + 30.0 * luxury_ratio + 30.0 * avg_risk);
    CategorySignals { switch_freq, luxury_ratio, score }
}

/// Account age, decline rate and completion rate. Account age is measured from the earliest request on record, which
/// is the only signal available since identity lives with an external provider.
pub fn analyse_historical(history: &[HistoryRecord], now: DateTime<Utc>) -> HistoricalSignals {
    let account_age_days = history.first().map(|r| (now - r.created_at).num_days()).unwrap_or(0);
    let resolved: Vec<&HistoryRecord> = history.iter().filter(|r| r.status.is_terminal()).collect();
    let declined = resolved.iter().filter(|r| r.status == RequestStatus::Declined).count();
    let completed = resolved.iter().filter(|r| r.status == RequestStatus::Completed).count();
    let decline_rate = ratio(declined, resolved.len());
    let success_rate = ratio(completed, resolved.len());
    let new_account = if account_age_days >= 7 { 0.0 } else { (7 - account_age_days) as f64 / 7.0 };
    let score = clamp(40.0 * new_account + 35.0 * decline_rate + 25.0 * (1.0 - success_rate));
    HistoricalSignals { account_age_days, decline_rate, success_rate, score }
}
