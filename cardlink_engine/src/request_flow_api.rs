use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{cart_total, NewPaymentRequest, OrderId, PaymentRequest, RequestId, RequestStatus},
    events::{
        EventProducers,
        RequestAcceptedEvent,
        RequestAnnulledEvent,
        RequestCompletedEvent,
        RequestCreatedEvent,
    },
    traits::{CardApiError, RequestFlowDatabase, RequestFlowError, SweepResult},
    trust::{score_history, HistoryRecord, TrustReport},
};

/// `RequestFlowApi` is the primary API for the payment request lifecycle: creation with trust scoring, the
/// cardholder and shopper transitions, settlement on order finalisation, and the expiry sweep.
pub struct RequestFlowApi<B> {
    db: B,
    commission_bps: i64,
    producers: EventProducers,
}

impl<B> Debug for RequestFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestFlowApi")
    }
}

impl<B> RequestFlowApi<B> {
    pub fn new(db: B, commission_bps: i64, producers: EventProducers) -> Self {
        Self { db, commission_bps, producers }
    }
}

impl<B> RequestFlowApi<B>
where B: RequestFlowDatabase
{
    /// Submit a new payment request.
    ///
    /// The commission and total payable are computed here from the configured rate; the caller's only say over
    /// money is the discount the matched card advertises. The shopper's trust report is evaluated over their full
    /// request history and attached to the stored request.
    pub async fn create_request(&self, new_request: NewPaymentRequest) -> Result<PaymentRequest, RequestFlowError> {
        if new_request.line_items.is_empty() {
            return Err(RequestFlowError::InvalidRequest("A request needs at least one line item".to_string()));
        }
        let order_amount = cart_total(&new_request.line_items);
        if new_request.discount_amount.is_negative() || new_request.discount_amount > order_amount {
            return Err(RequestFlowError::InvalidRequest(format!(
                "Discount {} is out of range for an order of {order_amount}",
                new_request.discount_amount
            )));
        }
        let card = self
            .db
            .fetch_card(&new_request.card_id)
            .await?
            .ok_or_else(|| CardApiError::CardNotFound(new_request.card_id.clone()))?;
        if !card.is_active || card.cardholder_email != new_request.cardholder_email {
            return Err(RequestFlowError::InvalidRequest(format!(
                "Card {} is not available to pay for this order",
                new_request.card_id
            )));
        }
        let now = Utc::now();
        let history = self.db.fetch_history_for_requester(&new_request.requester.email).await?;
        let records: Vec<HistoryRecord> = history.iter().map(HistoryRecord::from_request).collect();
        let trust_report = score_history(&records, now);
        let commission_amount = new_request.discount_amount.apply_bps(self.commission_bps);
        let request = PaymentRequest {
            request_id: RequestId::random(),
            order_id: new_request.order_id,
            requester: new_request.requester,
            order_amount,
            discount_amount: new_request.discount_amount,
            commission_amount,
            total_payable: order_amount - new_request.discount_amount,
            line_items: new_request.line_items,
            card_id: new_request.card_id,
            cardholder_email: new_request.cardholder_email,
            mode: new_request.mode,
            status: RequestStatus::Pending,
            created_at: now,
            expires_at: now + new_request.mode.expiry_window(),
            accepted_at: None,
            declined_at: None,
            completed_at: None,
            decline_reason: None,
            city: new_request.city,
            device_type: new_request.device_type,
            trust_report,
        };
        self.db.insert_request(&request).await?;
        debug!(
            "🔄️📦️ Request {} created for order {} ({} mode, expires {})",
            request.request_id, request.order_id, request.mode, request.expires_at
        );
        self.call_request_created_hook(&request).await;
        Ok(request)
    }

    /// Accept a pending request on behalf of the matched cardholder. A request whose deadline has passed is expired
    /// instead, even if the sweeper has not caught it yet.
    pub async fn accept_request(&self, id: &RequestId, cardholder_email: &str) -> Result<PaymentRequest, RequestFlowError> {
        let now = Utc::now();
        match self.db.accept_request(id, cardholder_email, now).await {
            Ok(request) => {
                debug!("🔄️✅️ Request {id} accepted by {cardholder_email}");
                self.call_request_accepted_hook(&request).await;
                Ok(request)
            },
            Err(RequestFlowError::RequestExpired(id)) => {
                if let Ok(Some(request)) = self.db.fetch_request(&id).await {
                    self.call_request_annulled_hook(&request).await;
                }
                Err(RequestFlowError::RequestExpired(id))
            },
            Err(e) => Err(e),
        }
    }

    /// Decline a pending request on behalf of the matched cardholder. Terminal; the shopper can create a fresh
    /// request against another card. A request whose deadline has passed is expired instead, as with accept.
    pub async fn decline_request(
        &self,
        id: &RequestId,
        cardholder_email: &str,
        reason: Option<&str>,
    ) -> Result<PaymentRequest, RequestFlowError> {
        let now = Utc::now();
        let reason = reason.unwrap_or("No reason provided");
        match self.db.decline_request(id, cardholder_email, Some(reason), now).await {
            Ok(request) => {
                debug!("🔄️❌️ Request {id} declined by {cardholder_email}");
                self.call_request_annulled_hook(&request).await;
                Ok(request)
            },
            Err(RequestFlowError::RequestExpired(id)) => {
                if let Ok(Some(request)) = self.db.fetch_request(&id).await {
                    self.call_request_annulled_hook(&request).await;
                }
                Err(RequestFlowError::RequestExpired(id))
            },
            Err(e) => Err(e),
        }
    }

    /// Cancel a pending request on behalf of the shopper who created it.
    pub async fn cancel_request(&self, id: &RequestId, requester_email: &str) -> Result<PaymentRequest, RequestFlowError> {
        let request = self.db.cancel_request(id, requester_email).await?;
        debug!("🔄️❌️ Request {id} cancelled by its requester");
        self.call_request_annulled_hook(&request).await;
        Ok(request)
    }

    /// The checkout collaborator has finalised the order: settle the accepted request and the ledger.
    pub async fn complete_order(&self, order_id: &OrderId) -> Result<PaymentRequest, RequestFlowError> {
        let now = Utc::now();
        let request = self.db.complete_request_for_order(order_id, now).await?;
        debug!("🔄️💰️ Order {order_id} finalised; request {} settled", request.request_id);
        self.call_request_completed_hook(&request).await;
        Ok(request)
    }

    /// Run the expiry sweep now. Safe to call from a timer and from request paths concurrently.
    pub async fn expire_overdue_requests(&self) -> Result<SweepResult, RequestFlowError> {
        let now = Utc::now();
        let result = self.db.expire_overdue_requests(now).await?;
        for request in &result.expired {
            self.call_request_annulled_hook(request).await;
        }
        Ok(result)
    }

    /// Pending requests addressed to the cardholder. Runs an opportunistic sweep first so nothing stale is offered
    /// for acceptance.
    pub async fn incoming_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        self.expire_overdue_requests().await?;
        self.db.fetch_incoming_requests(cardholder_email).await
    }

    /// Every request the shopper has created, newest first.
    pub async fn requests_for_requester(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        self.expire_overdue_requests().await?;
        self.db.fetch_requests_for_requester(email).await
    }

    /// Requests addressed to the cardholder that died without settling, newest first.
    pub async fn closed_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        self.db.fetch_closed_requests(cardholder_email).await
    }

    /// Settled requests addressed to the cardholder, newest first.
    pub async fn settled_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError> {
        self.db.fetch_settled_requests(cardholder_email).await
    }

    /// The current request correlated with the order, after an opportunistic sweep.
    pub async fn status_for_order(&self, order_id: &OrderId) -> Result<PaymentRequest, RequestFlowError> {
        self.expire_overdue_requests().await?;
        self.db.fetch_request_for_order(order_id).await?.ok_or_else(|| RequestFlowError::OrderNotFound(order_id.clone()))
    }

    /// The shopper's history together with a freshly-evaluated trust report over it.
    pub async fn requester_history(&self, email: &str) -> Result<(Vec<PaymentRequest>, TrustReport), RequestFlowError> {
        let history = self.db.fetch_history_for_requester(email).await?;
        let records: Vec<HistoryRecord> = history.iter().map(HistoryRecord::from_request).collect();
        let report = score_history(&records, Utc::now());
        Ok((history, report))
    }

    async fn call_request_created_hook(&self, request: &PaymentRequest) {
        for emitter in &self.producers.request_created_producer {
            trace!("🔄️📦️ Notifying request created hook subscribers");
            emitter.publish_event(RequestCreatedEvent::new(request.clone())).await;
        }
    }

    async fn call_request_accepted_hook(&self, request: &PaymentRequest) {
        for emitter in &self.producers.request_accepted_producer {
            trace!("🔄️✅️ Notifying request accepted hook subscribers");
            emitter.publish_event(RequestAcceptedEvent::new(request.clone())).await;
        }
    }

    async fn call_request_annulled_hook(&self, request: &PaymentRequest) {
        for emitter in &self.producers.request_annulled_producer {
            trace!("🔄️❌️ Notifying request annulled hook subscribers");
            emitter.publish_event(RequestAnnulledEvent::new(request.clone())).await;
        }
    }

    async fn call_request_completed_hook(&self, request: &PaymentRequest) {
        for emitter in &self.producers.request_completed_producer {
            trace!("🔄️💰️ Notifying request completed hook subscribers");
            emitter.publish_event(RequestCompletedEvent::new(request.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
