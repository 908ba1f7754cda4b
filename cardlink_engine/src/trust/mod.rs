//! Trust/risk scoring engine.
//!
//! A pure function over a requester's historical payment requests. The engine never fails and never touches the
//! database: callers fetch the history, hand it over, and attach the resulting [`TrustReport`] to the new request.
//! An empty or degenerate history produces the neutral report rather than an error.

pub mod analysis;
mod report;
pub mod tables;

use chrono::{DateTime, Utc};
use log::trace;

pub use self::{
    analysis::HistoryRecord,
    report::{
        Confidence,
        Dimension,
        DimensionScore,
        Recommendation,
        RiskLevel,
        SupplementaryRecommendation,
        TrustReport,
    },
};

/// Score a requester's history as of `now`.
///
/// The history may be in any order; it is sorted by creation time internally. Identical input always produces an
/// identical report.
pub fn score_history(history: &[HistoryRecord], now: DateTime<Utc>) -> TrustReport {
    if history.is_empty() {
        trace!("🔍️ Empty history, returning neutral trust report");
        return TrustReport::neutral();
    }
    let mut records = history.to_vec();
    records.sort_by_key(|r| r.created_at);

    let geo = analysis::analyse_geographic(&records);
    let temporal = analysis::analyse_temporal(&records);
    let transaction = analysis::analyse_transaction(&records);
    let device = analysis::analyse_device(&records);
    let category = analysis::analyse_category(&records);
    let historical = analysis::analyse_historical(&records, now);

    let dimension_scores = vec![
        DimensionScore { dimension: Dimension::Geographic, score: geo.score },
        DimensionScore { dimension: Dimension::Temporal, score: temporal.score },
        DimensionScore { dimension: Dimension::Transaction, score: transaction.score },
        DimensionScore { dimension: Dimension::Device, score: device.score },
        DimensionScore { dimension: Dimension::Category, score: category.score },
        DimensionScore { dimension: Dimension::Historical, score: historical.score },
    ];

    let total_risk: f64 =
        dimension_scores.iter().map(|ds| ds.dimension.weight() * ds.score).sum::<f64>().clamp(0.0, 100.0);
    let trust_score = (100.0 - total_risk).clamp(0.0, 100.0);
    let risk_level = RiskLevel::from_risk_score(total_risk);

    let mut primary_concerns = dimension_scores.clone();
    primary_concerns.retain(|ds| ds.score > 50.0);
    primary_concerns.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    primary_concerns.truncate(3);

    let mut risk_factors = Vec::new();
    if geo.change_freq > 0.3 {
        risk_factors.push("Frequent city changes between requests".to_string());
    }
    if temporal.off_hours_ratio > 0.5 {
        risk_factors.push("Majority of requests made during off-hours".to_string());
    }
    if transaction.escalation_rate > 0.6 {
        risk_factors.push("Request amounts are rapidly escalating".to_string());
    }
    if device.switch_freq > 0.4 {
        risk_factors.push("Frequent device switching".to_string());
    }
    if historical.decline_rate > 0.4 {
        risk_factors.push("High rate of declined requests".to_string());
    }

    let mut positive_factors = Vec::new();
    if historical.success_rate > 0.8 {
        positive_factors.push("High completion rate".to_string());
    }
    if geo.unique_cities <= 2 {
        positive_factors.push("Consistent request locations".to_string());
    }
    if device.unique_devices <= 2 {
        positive_factors.push("Consistent devices".to_string());
    }
    if historical.account_age_days > 30 {
        positive_factors.push("Established request history".to_string());
    }

    let recommendation = match risk_level {
        RiskLevel::High | RiskLevel::Critical => Recommendation::Decline,
        RiskLevel::Medium => Recommendation::ProceedWithCaution,
        RiskLevel::Low | RiskLevel::Minimal => Recommendation::Accept,
    };
    let mut supplementary = Vec::new();
    if geo.score > 60.0 {
        supplementary.push(SupplementaryRecommendation::VerifyAddress);
    }
    if transaction.score > 60.0 {
        supplementary.push(SupplementaryRecommendation::LimitAmount);
    }

    let span_days = records
        .last()
        .zip(records.first())
        .map(|(last, first)| (last.created_at - first.created_at).num_days())
        .unwrap_or(0);
    let confidence = if records.len() >= 10 && span_days >= 30 {
        Confidence::High
    } else if records.len() >= 5 && span_days >= 14 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    trace!("🔍️ Scored {} records: trust={trust_score:.1} risk={risk_level}", records.len());
    TrustReport {
        trust_score,
        risk_level,
        dimension_scores,
        primary_concerns,
        risk_factors,
        positive_factors,
        recommendation,
        supplementary,
        confidence,
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};
    use cl_common::Money;

    use super::*;
    use crate::db_types::{Category, City, DeviceType, RequestStatus};

    fn record(
        days_ago: i64,
        amount: i64,
        status: RequestStatus,
        city: City,
        device: DeviceType,
        category: Category,
    ) -> HistoryRecord {
        HistoryRecord {
            created_at: now() - Duration::days(days_ago),
            amount: Money::from_rupees(amount),
            status,
            city,
            device,
            category,
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn steady_history() -> Vec<HistoryRecord> {
        (0..12)
            .map(|i| {
                record(60 - i * 5, 1500, RequestStatus::Completed, City::Pune, DeviceType::Mobile, Category::Grocery)
            })
            .collect()
    }

    #[test]
    fn empty_history_is_neutral() {
        let report = score_history(&[], now());
        assert_eq!(report.trust_score, 50.0);
        assert_eq!(report.confidence, Confidence::Low);
        assert_eq!(report.recommendation, Recommendation::ProceedWithCaution);
    }

    #[test]
    fn scoring_is_deterministic() {
        let history = steady_history();
        let a = score_history(&history, now());
        let b = score_history(&history, now());
        assert_eq!(a, b);
        // Order of the input must not matter
        let mut reversed = history.clone();
        reversed.reverse();
        let c = score_history(&reversed, now());
        assert_eq!(a, c);
    }

    #[test]
    fn steady_history_scores_well() {
        let report = score_history(&steady_history(), now());
        assert!(report.trust_score > 60.0, "trust was {}", report.trust_score);
        assert_eq!(report.confidence, Confidence::High);
        assert_eq!(report.recommendation, Recommendation::Accept);
        assert!(report.positive_factors.iter().any(|f| f.contains("completion")));
        assert!(report.positive_factors.iter().any(|f| f.contains("Consistent request locations")));
    }

    #[test]
    fn erratic_history_raises_concerns() {
        let cities =
            [City::Mumbai, City::Unknown, City::Delhi, City::Unknown, City::Kolkata, City::Unknown, City::Chennai];
        let devices = [
            DeviceType::Mobile,
            DeviceType::Desktop,
            DeviceType::Tablet,
            DeviceType::Unknown,
            DeviceType::Mobile,
            DeviceType::Desktop,
            DeviceType::Tablet,
        ];
        let history: Vec<HistoryRecord> = (0..7)
            .map(|i| {
                let mut r = record(
                    3,
                    5_000 * (i as i64 + 1) * 3,
                    if i % 2 == 0 { RequestStatus::Declined } else { RequestStatus::Expired },
                    cities[i],
                    devices[i],
                    Category::Jewellery,
                );
                // All within one night, 20 minutes apart, in the small hours
                r.created_at = Utc.with_ymd_and_hms(2024, 6, 2, 1, 0, 0).unwrap() + Duration::minutes(20 * i as i64);
                r
            })
            .collect();
        let report = score_history(&history, now());
        assert!(report.trust_score < 40.0, "trust was {}", report.trust_score);
        assert!(matches!(report.risk_level, RiskLevel::High | RiskLevel::Critical));
        assert_eq!(report.recommendation, Recommendation::Decline);
        assert!(!report.primary_concerns.is_empty());
        assert!(report.primary_concerns.len() <= 3);
        assert!(report.risk_factors.iter().any(|f| f.contains("city")));
        assert!(report.risk_factors.iter().any(|f| f.contains("device")));
        assert!(report.risk_factors.iter().any(|f| f.contains("declined")));
    }

    #[test]
    fn confidence_tiers() {
        let five: Vec<HistoryRecord> = (0..5)
            .map(|i| {
                record(20 - i * 4, 1000, RequestStatus::Completed, City::Pune, DeviceType::Mobile, Category::Food)
            })
            .collect();
        assert_eq!(score_history(&five, now()).confidence, Confidence::Medium);

        let two: Vec<HistoryRecord> = five[..2].to_vec();
        assert_eq!(score_history(&two, now()).confidence, Confidence::Low);
    }
}
