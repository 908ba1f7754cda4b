//! `SqliteDatabase` is a concrete implementation of a Cardlink engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every lifecycle transition and its ledger side effect run inside one transaction, with the status guard
//! embedded in the UPDATE itself.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use cl_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::db::{cardholders, cards, db_url, new_pool, requests};
use crate::{
    db_types::{Card, Cardholder, Category, NewCard, OrderId, PaymentRequest, RequestId, RequestMode, RequestStatus},
    matching::MatchCandidate,
    traits::{CardApiError, CardManagement, RequestFlowDatabase, RequestFlowError, RolloverResult, SweepResult},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection to the database at the URL given by `CARDLINK_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CardManagement for SqliteDatabase {
    async fn fetch_cardholder(&self, email: &str) -> Result<Option<Cardholder>, CardApiError> {
        let mut conn = self.pool.acquire().await?;
        cardholders::fetch_cardholder(email, &mut conn).await
    }

    async fn upsert_cardholder(&self, email: &str, name: &str) -> Result<Cardholder, CardApiError> {
        let mut tx = self.pool.begin().await?;
        let holder = cardholders::upsert_cardholder(email, name, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Cardholder profile for {email} stored");
        Ok(holder)
    }

    async fn record_heartbeat(&self, email: &str, now: DateTime<Utc>) -> Result<(), CardApiError> {
        let mut conn = self.pool.acquire().await?;
        cardholders::record_heartbeat(email, now, &mut conn).await
    }

    async fn register_card(&self, email: &str, card: NewCard) -> Result<Card, CardApiError> {
        let mut tx = self.pool.begin().await?;
        if cardholders::fetch_cardholder(email, &mut tx).await?.is_none() {
            return Err(CardApiError::CardholderNotFound(email.to_string()));
        }
        let card = cards::insert_card(email, card, &mut tx).await?;
        tx.commit().await?;
        Ok(card)
    }

    async fn deactivate_card(&self, email: &str, card_id: &str) -> Result<Card, CardApiError> {
        let mut tx = self.pool.begin().await?;
        let card = cards::deactivate_card(email, card_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Card {card_id} deactivated");
        Ok(card)
    }

    async fn fetch_cards(&self, email: &str) -> Result<Vec<Card>, CardApiError> {
        let mut conn = self.pool.acquire().await?;
        cards::fetch_cards(email, &mut conn).await
    }

    async fn fetch_card(&self, card_id: &str) -> Result<Option<Card>, CardApiError> {
        let mut conn = self.pool.acquire().await?;
        cards::fetch_card(card_id, &mut conn).await
    }

    async fn fetch_match_candidates(
        &self,
        categories: &[Category],
        mode: RequestMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchCandidate>, CardApiError> {
        let mut conn = self.pool.acquire().await?;
        let candidates = cards::fetch_match_candidates(mode, now, &mut conn).await?;
        let candidates: Vec<MatchCandidate> =
            candidates.into_iter().filter(|c| c.card.covers_any(categories)).collect();
        trace!("🗃️ {} candidate card(s) cover the requested categories", candidates.len());
        Ok(candidates)
    }

    async fn rollover_month(&self) -> Result<RolloverResult, CardApiError> {
        let mut tx = self.pool.begin().await?;
        let cardholders_reset = cardholders::reset_month_earnings(&mut tx).await?;
        let cards_reset = cards::reset_month_spend(&mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Month rolled over: {cardholders_reset} ledger(s) and {cards_reset} card counter(s) reset");
        Ok(RolloverResult { cardholders_reset, cards_reset })
    }
}

impl RequestFlowDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_request(&self, request: &PaymentRequest) -> Result<(), RequestFlowError> {
        let mut tx = self.pool.begin().await?;
        if requests::open_request_exists_for_order(&request.order_id, &mut tx).await? {
            return Err(RequestFlowError::OpenRequestForOrder(request.order_id.clone()));
        }
        requests::insert_request(request, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request(id, &mut conn).await
    }

    async fn fetch_request_for_order(&self, order_id: &OrderId) -> Result<Option<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_request_for_order(order_id, &mut conn).await
    }

    async fn accept_request(
        &self,
        id: &RequestId,
        cardholder_email: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, RequestFlowError> {
        let mut tx = self.pool.begin().await?;
        match requests::mark_accepted(id, cardholder_email, now, &mut tx).await? {
            Some(request) => {
                let zero = Money::default();
                cardholders::adjust_earnings(cardholder_email, zero, zero, request.commission_amount, &mut tx).await?;
                tx.commit().await?;
                debug!(
                    "🗃️ Request {id} accepted; {} held as pending earnings for {cardholder_email}",
                    request.commission_amount
                );
                Ok(request)
            },
            None => {
                let outcome = self.diagnose_failed_transition(id, cardholder_email, RequestStatus::Accepted, &mut tx, now).await;
                tx.commit().await?;
                Err(outcome)
            },
        }
    }

    async fn decline_request(
        &self,
        id: &RequestId,
        cardholder_email: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, RequestFlowError> {
        let mut tx = self.pool.begin().await?;
        match requests::mark_declined(id, cardholder_email, reason, now, &mut tx).await? {
            Some(request) => {
                tx.commit().await?;
                debug!("🗃️ Request {id} declined by {cardholder_email}");
                Ok(request)
            },
            None => {
                let outcome = self.diagnose_failed_transition(id, cardholder_email, RequestStatus::Declined, &mut tx, now).await;
                tx.commit().await?;
                Err(outcome)
            },
        }
    }

    async fn cancel_request(&self, id: &RequestId, requester_email: &str) -> Result<PaymentRequest, RequestFlowError> {
        let mut tx = self.pool.begin().await?;
        match requests::mark_cancelled(id, requester_email, &mut tx).await? {
            Some(request) => {
                tx.commit().await?;
                debug!("🗃️ Request {id} cancelled by its requester");
                Ok(request)
            },
            None => {
                let err = match requests::fetch_request(id, &mut tx).await? {
                    None => RequestFlowError::RequestNotFound(id.clone()),
                    Some(r) if r.requester.email != requester_email => RequestFlowError::NotYourRequest,
                    Some(r) => RequestFlowError::InvalidStateTransition {
                        id: id.clone(),
                        status: r.status,
                        wanted: RequestStatus::Cancelled,
                    },
                };
                Err(err)
            },
        }
    }

    async fn complete_request_for_order(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, RequestFlowError> {
        let mut tx = self.pool.begin().await?;
        match requests::mark_completed_for_order(order_id, now, &mut tx).await? {
            Some(request) => {
                let commission = request.commission_amount;
                cardholders::adjust_earnings(&request.cardholder_email, commission, commission, -commission, &mut tx)
                    .await?;
                cards::add_month_spent(&request.card_id, request.total_payable, &mut tx).await?;
                tx.commit().await?;
                debug!(
                    "🗃️ Order {order_id} settled; {commission} moved from pending to earned for {}",
                    request.cardholder_email
                );
                Ok(request)
            },
            None => {
                let err = match requests::fetch_request_for_order(order_id, &mut tx).await? {
                    None => RequestFlowError::OrderNotFound(order_id.clone()),
                    Some(r) => RequestFlowError::InvalidStateTransition {
                        id: r.request_id,
                        status: r.status,
                        wanted: RequestStatus::Completed,
                    },
                };
                Err(err)
            },
        }
    }

    async fn expire_overdue_requests(&self, now: DateTime<Utc>) -> Result<SweepResult, RequestFlowError> {
        let mut tx = self.pool.begin().await?;
        let expired = requests::expire_overdue(now, &mut tx).await?;
        tx.commit().await?;
        if !expired.is_empty() {
            info!("🕰️ {} request(s) expired in this sweep", expired.len());
        }
        Ok(SweepResult::new(expired))
    }

    async fn fetch_incoming_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_incoming(cardholder_email, &mut conn).await
    }

    async fn fetch_requests_for_requester(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_for_requester(email, &mut conn).await
    }

    async fn fetch_closed_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_closed(cardholder_email, &mut conn).await
    }

    async fn fetch_settled_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_settled(cardholder_email, &mut conn).await
    }

    async fn fetch_history_for_requester(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_history_for_requester(email, &mut conn).await
    }

    async fn fetch_history_for_cardholder(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        let mut conn = self.pool.acquire().await?;
        requests::fetch_history_for_cardholder(email, &mut conn).await
    }
}

impl SqliteDatabase {
    /// Works out why a guarded accept or decline found no row, expiring the request as a side effect when the
    /// deadline is the culprit.
    async fn diagnose_failed_transition(
        &self,
        id: &RequestId,
        cardholder_email: &str,
        wanted: RequestStatus,
        tx: &mut sqlx::SqliteConnection,
        now: DateTime<Utc>,
    ) -> RequestFlowError {
        let existing = match requests::fetch_request(id, tx).await {
            Ok(r) => r,
            Err(e) => return e,
        };
        match existing {
            None => RequestFlowError::RequestNotFound(id.clone()),
            Some(r) if r.cardholder_email != cardholder_email => RequestFlowError::NotYourRequest,
            Some(r) if r.status == RequestStatus::Pending && r.expires_at <= now => {
                match requests::mark_expired(id, tx).await {
                    Ok(_) => {
                        debug!("🕰️ Request {id} hit its deadline; expired instead of {wanted}");
                        RequestFlowError::RequestExpired(id.clone())
                    },
                    Err(e) => e,
                }
            },
            Some(r) => RequestFlowError::InvalidStateTransition { id: id.clone(), status: r.status, wanted },
        }
    }
}
