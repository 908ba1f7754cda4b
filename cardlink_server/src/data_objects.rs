use cardlink_engine::{
    db_types::{Category, City, DeviceType, LineItem, OrderId, PaymentRequest, RequestMode},
    trust::TrustReport,
};
use cl_common::Money;
use serde::{Deserialize, Serialize};

/// The body of a request-creation call. The requester comes from the identity headers, never the body; the
/// commission is computed server-side from the configured rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequestParams {
    pub order_id: OrderId,
    pub line_items: Vec<LineItem>,
    pub discount_amount: Money,
    pub card_id: String,
    pub cardholder_email: String,
    pub mode: RequestMode,
    #[serde(default)]
    pub city: City,
    #[serde(default)]
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclineParams {
    pub reason: Option<String>,
}

/// The body of a matching call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchParams {
    pub line_items: Vec<LineItem>,
    pub mode: RequestMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRegistrationParams {
    pub last_four: String,
    pub bank_name: String,
    pub card_type: String,
    pub categories: Vec<Category>,
    pub discount_pct: i64,
    pub monthly_limit: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub requests: Vec<PaymentRequest>,
    pub trust_report: TrustReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub expired: usize,
    pub request_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloverResponse {
    pub cardholders_reset: u64,
    pub cards_reset: u64,
}
