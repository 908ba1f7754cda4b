//! Performance features derived from a candidate cardholder's own request history.
//!
//! These are the inputs the external ranking collaborator scores on. Everything is computed from the candidate's
//! prior `PaymentRequest`s; nothing here consults a live feed.

use chrono::{DateTime, Duration, Utc};
use cl_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{PaymentRequest, RequestStatus};

/// An accepted request that has not settled within this window counts as a default.
const DEFAULT_WINDOW_HOURS: i64 = 48;
/// The scoring model only accepts repayment times in this range (days).
const REPAYMENT_DAYS_RANGE: (f64, f64) = (1.0, 60.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    /// The cardholder this feature row describes.
    pub user_id: String,
    /// The card's monthly limit, in whole rupees.
    pub credit_limit: f64,
    /// Mean days between acceptance and settlement over settled requests, clamped to the model's 1-60 range.
    pub avg_repayment_time: f64,
    /// Completed requests as a fraction of resolved ones.
    pub transaction_success_rate: f64,
    /// Mean seconds between creation and acceptance, over requests that were accepted at all.
    pub response_speed: f64,
    /// Fraction of all requests the cardholder accepted (discount honoured).
    pub discount_hit_rate: f64,
    /// Fraction of accepted requests that went on to settle (commission actually earned).
    pub commission_acceptance_rate: f64,
    /// 1-5, inferred from the success rate.
    pub user_rating: u8,
    /// Accepted requests that never settled within the default window.
    pub default_count: u32,
}

impl CandidateFeatures {
    /// Derive the feature row for a cardholder from their history as of `now`. `credit_limit` is the offered card's
    /// monthly limit.
    pub fn derive(email: &str, credit_limit: Money, history: &[PaymentRequest], now: DateTime<Utc>) -> Self {
        let total = history.len();
        let resolved: Vec<&PaymentRequest> = history.iter().filter(|r| r.status.is_terminal()).collect();
        let completed = resolved.iter().filter(|r| r.status == RequestStatus::Completed).count();
        let ever_accepted: Vec<&PaymentRequest> = history
            .iter()
            .filter(|r| r.accepted_at.is_some())
            .collect();
        let latencies: Vec<i64> = ever_accepted
            .iter()
            .filter_map(|r| r.accepted_at.map(|t| (t - r.created_at).num_seconds()))
            .collect();
        let response_speed = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<i64>() as f64 / latencies.len() as f64
        };
        let transaction_success_rate =
            if resolved.is_empty() { 0.0 } else { completed as f64 / resolved.len() as f64 };
        let discount_hit_rate = if total == 0 { 0.0 } else { ever_accepted.len() as f64 / total as f64 };
        let settled = ever_accepted.iter().filter(|r| r.status == RequestStatus::Completed).count();
        let commission_acceptance_rate =
            if ever_accepted.is_empty() { 0.0 } else { settled as f64 / ever_accepted.len() as f64 };
        let default_count = ever_accepted
            .iter()
            .filter(|r| {
                r.status == RequestStatus::Accepted &&
                    r.accepted_at.map(|t| now - t > Duration::hours(DEFAULT_WINDOW_HOURS)).unwrap_or(false)
            })
            .count() as u32;
        let user_rating = (1.0 + 4.0 * transaction_success_rate).round().clamp(1.0, 5.0) as u8;
        let repayment_days: Vec<f64> = ever_accepted
            .iter()
            .filter_map(|r| {
                r.accepted_at
                    .zip(r.completed_at)
                    .map(|(accepted, completed)| (completed - accepted).num_seconds() as f64 / 86_400.0)
            })
            .collect();
        let avg_repayment_time = if repayment_days.is_empty() {
            REPAYMENT_DAYS_RANGE.0
        } else {
            (repayment_days.iter().sum::<f64>() / repayment_days.len() as f64)
                .clamp(REPAYMENT_DAYS_RANGE.0, REPAYMENT_DAYS_RANGE.1)
        };
        Self {
            user_id: email.to_string(),
            credit_limit: credit_limit.value() as f64 / 100.0,
            avg_repayment_time,
            transaction_success_rate,
            response_speed,
            discount_hit_rate,
            commission_acceptance_rate,
            user_rating,
            default_count,
        }
    }
}

#[cfg(test)]
mod test {
    use cl_common::Money;

    use super::*;
    use crate::{
        db_types::{
            Category,
            City,
            DeviceType,
            LineItem,
            OrderId,
            PaymentRequest,
            RequestId,
            RequestMode,
            Requester,
            RequestStatus,
        },
        trust::TrustReport,
    };

    fn request(status: RequestStatus, accepted_secs: Option<i64>, created_at: DateTime<Utc>) -> PaymentRequest {
        let accepted_at = accepted_secs.map(|s| created_at + Duration::seconds(s));
        // settled requests took two days from acceptance to settlement
        let completed_at =
            if status == RequestStatus::Completed { accepted_at.map(|t| t + Duration::days(2)) } else { None };
        PaymentRequest {
            request_id: RequestId::random(),
            order_id: OrderId("order-1".to_string()),
            requester: Requester {
                id: "u1".to_string(),
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
            },
            line_items: vec![LineItem::new("Widget", Category::Electronics, Money::from_rupees(100), 1)],
            order_amount: Money::from_rupees(100),
            discount_amount: Money::from_rupees(10),
            commission_amount: Money::from(50),
            total_payable: Money::from_rupees(90),
            card_id: "card-1".to_string(),
            cardholder_email: "holder@example.com".to_string(),
            mode: RequestMode::Immediate,
            status,
            created_at,
            expires_at: created_at + Duration::minutes(5),
            accepted_at,
            declined_at: None,
            completed_at,
            decline_reason: None,
            city: City::Pune,
            device_type: DeviceType::Mobile,
            trust_report: TrustReport::neutral(),
        }
    }

    #[test]
    fn features_from_history() {
        let now = Utc::now();
        let old = now - Duration::days(10);
        let history = vec![
            request(RequestStatus::Completed, Some(30), old),
            request(RequestStatus::Completed, Some(90), old + Duration::days(1)),
            request(RequestStatus::Declined, None, old + Duration::days(2)),
            // accepted 10 days ago and never settled: a default
            request(RequestStatus::Accepted, Some(60), old + Duration::days(3)),
        ];
        let f = CandidateFeatures::derive("holder@example.com", Money::from_rupees(100_000), &history, now);
        assert_eq!(f.user_id, "holder@example.com");
        assert!((f.credit_limit - 100_000.0).abs() < 1e-9);
        // both settled requests took two days
        assert!((f.avg_repayment_time - 2.0).abs() < 1e-9);
        // 2 completed of 3 resolved
        assert!((f.transaction_success_rate - 2.0 / 3.0).abs() < 1e-9);
        // 3 of 4 were accepted
        assert!((f.discount_hit_rate - 0.75).abs() < 1e-9);
        // 2 of 3 accepted settled
        assert!((f.commission_acceptance_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(f.default_count, 1);
        assert!((f.response_speed - 60.0).abs() < 1e-9);
        assert_eq!(f.user_rating, 4);
    }

    #[test]
    fn features_from_empty_history() {
        let f = CandidateFeatures::derive("holder@example.com", Money::from_rupees(50_000), &[], Utc::now());
        assert_eq!(f.transaction_success_rate, 0.0);
        assert_eq!(f.default_count, 0);
        assert_eq!(f.user_rating, 1);
        // the model rejects repayment times under a day, so an empty history reports the floor
        assert_eq!(f.avg_repayment_time, 1.0);
        assert!((f.credit_limit - 50_000.0).abs() < 1e-9);
    }
}
