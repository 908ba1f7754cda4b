use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Card, Cardholder, Category, ConversionError, NewCard, RequestMode},
    matching::MatchCandidate,
    traits::data_objects::RolloverResult,
};

/// Cardholder and card portfolio management for backends.
///
/// Cardholder identity comes from the upstream identity provider; this trait only tracks the engine-side profile:
/// presence, the card portfolio, and the earnings ledger balances.
#[allow(async_fn_in_trait)]
pub trait CardManagement {
    /// Fetch the cardholder profile for the given email, if one exists.
    async fn fetch_cardholder(&self, email: &str) -> Result<Option<Cardholder>, CardApiError>;

    /// Creates the cardholder profile if it does not exist, updating the display name if it does.
    /// Returns the stored profile.
    async fn upsert_cardholder(&self, email: &str, name: &str) -> Result<Cardholder, CardApiError>;

    /// Record a presence heartbeat. The cardholder counts as online for matching while their last heartbeat is
    /// inside the freshness window.
    async fn record_heartbeat(&self, email: &str, now: DateTime<Utc>) -> Result<(), CardApiError>;

    /// Register a new card for the cardholder. The card is validated before it is stored and starts out active with
    /// a zero monthly spend.
    async fn register_card(&self, email: &str, card: NewCard) -> Result<Card, CardApiError>;

    /// Deactivate a card. Only the owning cardholder may do this. Deactivated cards never match; open requests
    /// against the card run their course.
    async fn deactivate_card(&self, email: &str, card_id: &str) -> Result<Card, CardApiError>;

    /// All cards belonging to the cardholder, active or not.
    async fn fetch_cards(&self, email: &str) -> Result<Vec<Card>, CardApiError>;

    /// Fetch a single card by id, if it exists.
    async fn fetch_card(&self, card_id: &str) -> Result<Option<Card>, CardApiError>;

    /// Every active card covering at least one of the given categories, joined with its owner and the owner's active
    /// card count. Immediate mode additionally requires the owner's last heartbeat to be inside the freshness window
    /// as of `now`.
    async fn fetch_match_candidates(
        &self,
        categories: &[Category],
        mode: RequestMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchCandidate>, CardApiError>;

    /// Month-end reset: zero every cardholder's `this_month` earnings and every card's monthly spend counter.
    /// Totals and pending balances are untouched.
    async fn rollover_month(&self) -> Result<RolloverResult, CardApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum CardApiError {
    #[error("We have an internal database engine issue: {0}")]
    DatabaseError(String),
    #[error("No cardholder profile exists for {0}")]
    CardholderNotFound(String),
    #[error("The requested card {0} does not exist")]
    CardNotFound(String),
    #[error("Card {0} does not belong to this cardholder")]
    NotCardOwner(String),
    #[error("Invalid card details: {0}")]
    InvalidCard(String),
}

impl From<sqlx::Error> for CardApiError {
    fn from(e: sqlx::Error) -> Self {
        CardApiError::DatabaseError(e.to_string())
    }
}

impl From<ConversionError> for CardApiError {
    fn from(e: ConversionError) -> Self {
        CardApiError::InvalidCard(e.0)
    }
}
