use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use cl_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trust::TrustReport;

/// How long an immediate-mode request stays open before it expires.
pub const IMMEDIATE_EXPIRY: Duration = Duration::minutes(5);
/// How long a scheduled-mode request stays open before it expires.
pub const SCHEDULED_EXPIRY: Duration = Duration::minutes(30);
/// A cardholder counts as online for matching purposes if their last heartbeat is within this window.
pub const ONLINE_WINDOW_SECS: i64 = 30;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------      Category       ---------------------------------------------------------
/// The closed set of merchant categories used by cards, cart line items and the trust engine. Unrecognised inputs
/// collapse into `Other` so that every category value flowing through the system is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Fashion,
    Grocery,
    Food,
    Travel,
    Jewellery,
    Beauty,
    Home,
    Fuel,
    Pharmacy,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Electronics,
        Category::Fashion,
        Category::Grocery,
        Category::Food,
        Category::Travel,
        Category::Jewellery,
        Category::Beauty,
        Category::Home,
        Category::Fuel,
        Category::Pharmacy,
        Category::Other,
    ];

    pub fn is_luxury(&self) -> bool {
        matches!(self, Category::Electronics | Category::Jewellery)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Electronics => "electronics",
            Category::Fashion => "fashion",
            Category::Grocery => "grocery",
            Category::Food => "food",
            Category::Travel => "travel",
            Category::Jewellery => "jewellery",
            Category::Beauty => "beauty",
            Category::Home => "home",
            Category::Fuel => "fuel",
            Category::Pharmacy => "pharmacy",
            Category::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cat = match s.trim().to_ascii_lowercase().as_str() {
            "electronics" => Category::Electronics,
            "fashion" | "clothing" => Category::Fashion,
            "grocery" | "groceries" => Category::Grocery,
            "food" | "dining" => Category::Food,
            "travel" => Category::Travel,
            "jewellery" | "jewelery" | "jewelry" => Category::Jewellery,
            "beauty" => Category::Beauty,
            "home" | "furniture" => Category::Home,
            "fuel" | "petrol" => Category::Fuel,
            "pharmacy" | "medicine" => Category::Pharmacy,
            _ => Category::Other,
        };
        Ok(cat)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(Category::Other)
    }
}

/// Serialize a category set as a comma-separated string for storage.
pub fn categories_to_string(cats: &[Category]) -> String {
    cats.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",")
}

/// Parse a comma-separated category set. Unknown entries become `Other`; empty input yields an empty set.
pub fn categories_from_string(s: &str) -> Vec<Category> {
    s.split(',').filter(|s| !s.trim().is_empty()).map(|s| Category::from(s.to_string())).collect()
}

//--------------------------------------      DeviceType      --------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
    #[default]
    Unknown,
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Desktop => "desktop",
            DeviceType::Tablet => "tablet",
            DeviceType::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DeviceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let device = match s.trim().to_ascii_lowercase().as_str() {
            "mobile" | "phone" => DeviceType::Mobile,
            "desktop" | "web" => DeviceType::Desktop,
            "tablet" => DeviceType::Tablet,
            _ => DeviceType::Unknown,
        };
        Ok(device)
    }
}

impl From<String> for DeviceType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

//--------------------------------------        City          --------------------------------------------------------
/// Cities with a known baseline risk. Anything not in the table is `Unknown` and carries the highest weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum City {
    Mumbai,
    Delhi,
    Bangalore,
    Hyderabad,
    Chennai,
    Kolkata,
    Pune,
    Ahmedabad,
    #[default]
    Unknown,
}

impl Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            City::Mumbai => "mumbai",
            City::Delhi => "delhi",
            City::Bangalore => "bangalore",
            City::Hyderabad => "hyderabad",
            City::Chennai => "chennai",
            City::Kolkata => "kolkata",
            City::Pune => "pune",
            City::Ahmedabad => "ahmedabad",
            City::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for City {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let city = match s.trim().to_ascii_lowercase().as_str() {
            "mumbai" => City::Mumbai,
            "delhi" | "new delhi" => City::Delhi,
            "bangalore" | "bengaluru" => City::Bangalore,
            "hyderabad" => City::Hyderabad,
            "chennai" => City::Chennai,
            "kolkata" => City::Kolkata,
            "pune" => City::Pune,
            "ahmedabad" => City::Ahmedabad,
            _ => City::Unknown,
        };
        Ok(city)
    }
}

impl From<String> for City {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

//--------------------------------------     RequestMode      --------------------------------------------------------
/// Immediate requests need a recently-active cardholder and expire after five minutes. Scheduled requests go to any
/// eligible cardholder and expire after thirty minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    Immediate,
    Scheduled,
}

impl RequestMode {
    pub fn expiry_window(&self) -> Duration {
        match self {
            RequestMode::Immediate => IMMEDIATE_EXPIRY,
            RequestMode::Scheduled => SCHEDULED_EXPIRY,
        }
    }
}

impl Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMode::Immediate => write!(f, "immediate"),
            RequestMode::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl FromStr for RequestMode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(RequestMode::Immediate),
            "scheduled" => Ok(RequestMode::Scheduled),
            s => Err(ConversionError(format!("Invalid request mode: {s}"))),
        }
    }
}

impl From<String> for RequestMode {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid request mode: {value}. But this conversion cannot fail. Defaulting to Scheduled");
            RequestMode::Scheduled
        })
    }
}

//--------------------------------------    RequestStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// The request has been created and is waiting for the matched cardholder to respond.
    Pending,
    /// The cardholder accepted; the commission is held in their pending earnings.
    Accepted,
    /// The cardholder declined. Terminal.
    Declined,
    /// The request outlived its expiry deadline. Terminal.
    Expired,
    /// The shopper abandoned the request. Terminal.
    Cancelled,
    /// The underlying order was fulfilled and the ledger settled. Terminal.
    Completed,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
            RequestStatus::Expired => "expired",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RequestStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            "expired" => Ok(RequestStatus::Expired),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "completed" => Ok(RequestStatus::Completed),
            s => Err(ConversionError(format!("Invalid request status: {s}"))),
        }
    }
}

impl From<String> for RequestStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            log::error!("Invalid request status: {value}. But this conversion cannot fail. Defaulting to Pending");
            RequestStatus::Pending
        })
    }
}

//--------------------------------------      RequestId       --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generates a fresh request id. Ids are time-prefixed so they sort roughly by creation order in the store.
    pub fn random() -> Self {
        let now = Utc::now().timestamp_millis();
        let salt = rand::random::<u32>();
        Self(format!("req-{now:013x}-{salt:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RequestId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------       OrderId        --------------------------------------------------------
/// The id of the order at the external checkout collaborator that this request is correlated with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------      LineItem        --------------------------------------------------------
/// A point-in-time copy of a cart line. Snapshotted onto the request at creation; never a live reference into the
/// catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    pub category: Category,
    pub price: Money,
    pub quantity: i64,
}

impl LineItem {
    pub fn new<S: Into<String>>(title: S, category: Category, price: Money, quantity: i64) -> Self {
        Self { title: title.into(), category, price, quantity }
    }

    pub fn subtotal(&self) -> Money {
        self.price * self.quantity
    }
}

/// The total cart value across all lines.
pub fn cart_total(items: &[LineItem]) -> Money {
    items.iter().map(|li| li.subtotal()).sum()
}

//--------------------------------------      Earnings        --------------------------------------------------------
/// A cardholder's commission ledger. `pending` holds commissions for accepted-but-unsettled requests; `total` and
/// `this_month` only ever grow via settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earnings {
    pub total: Money,
    pub this_month: Money,
    pub pending: Money,
}

//--------------------------------------      Cardholder      --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cardholder {
    /// The stable identity key, as supplied by the external identity provider.
    pub email: String,
    pub name: String,
    /// Display-only flag. Matching derives "online" from `last_active_at` instead.
    pub is_online: bool,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub earnings: Earnings,
}

impl Cardholder {
    /// The operational definition of online: a heartbeat within the freshness window.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.last_active_at <= Duration::seconds(ONLINE_WINDOW_SECS)
    }
}

//--------------------------------------        Card          --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub cardholder_email: String,
    /// Only the last four digits are ever persisted.
    pub last_four: String,
    pub bank_name: String,
    pub card_type: String,
    pub categories: Vec<Category>,
    pub discount_pct: i64,
    pub monthly_limit: Money,
    pub current_month_spent: Money,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn covers_any(&self, categories: &[Category]) -> bool {
        self.categories.iter().any(|c| categories.contains(c))
    }

    /// The discount this card would give on the cart: the covered subtotal times the card's percentage.
    pub fn discount_for(&self, items: &[LineItem]) -> Money {
        let covered: Money = items.iter().filter(|li| self.categories.contains(&li.category)).map(|li| li.subtotal()).sum();
        covered.apply_percent(self.discount_pct)
    }
}

//--------------------------------------       NewCard        --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCard {
    pub last_four: String,
    pub bank_name: String,
    pub card_type: String,
    pub categories: Vec<Category>,
    pub discount_pct: i64,
    pub monthly_limit: Money,
}

impl NewCard {
    /// Card registration sanity checks. The discount percentage must be 1-50 and the masked PAN exactly four digits.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if !(1..=50).contains(&self.discount_pct) {
            return Err(ConversionError(format!(
                "Discount percentage must be between 1 and 50, got {}",
                self.discount_pct
            )));
        }
        if self.last_four.len() != 4 || !self.last_four.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConversionError("last_four must be exactly four digits".to_string()));
        }
        if self.categories.is_empty() {
            return Err(ConversionError("A card must cover at least one category".to_string()));
        }
        if self.monthly_limit.is_negative() {
            return Err(ConversionError("monthly_limit cannot be negative".to_string()));
        }
        Ok(())
    }
}

//--------------------------------------     Requester        --------------------------------------------------------
/// The shopper on whose behalf a request was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub name: String,
    pub email: String,
}

//--------------------------------------   PaymentRequest     --------------------------------------------------------
/// The central transactional record matching one checkout to one card. Never deleted; terminal requests stay in the
/// store as the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub request_id: RequestId,
    pub order_id: OrderId,
    pub requester: Requester,
    pub line_items: Vec<LineItem>,
    pub order_amount: Money,
    pub discount_amount: Money,
    pub commission_amount: Money,
    pub total_payable: Money,
    pub card_id: String,
    pub cardholder_email: String,
    pub mode: RequestMode,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub city: City,
    pub device_type: DeviceType,
    pub trust_report: TrustReport,
}

//--------------------------------------  NewPaymentRequest   --------------------------------------------------------
/// Everything the lifecycle manager needs to build a `PaymentRequest`. Commission and total payable are computed by
/// the manager from the configured rate, never taken from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentRequest {
    pub order_id: OrderId,
    pub requester: Requester,
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
