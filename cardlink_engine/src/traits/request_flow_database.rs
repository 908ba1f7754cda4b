use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{ConversionError, OrderId, PaymentRequest, RequestId, RequestStatus},
    traits::{data_objects::SweepResult, CardApiError, CardManagement},
};

/// This trait defines the highest level of behaviour for backends supporting the request lifecycle.
///
/// This behaviour includes:
/// * Persisting new payment requests with their trust report attached.
/// * The conditional state transitions: accept, decline, cancel, complete and expire. Each transition checks the
///   current status inside the same atomic statement that performs the update, so two racing actors can never both
///   win.
/// * The earnings ledger side effects that ride along with accept and complete, in the same transaction as the
///   status change.
/// * The role-scoped request queries that back the API.
#[allow(async_fn_in_trait)]
pub trait RequestFlowDatabase: Clone + CardManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a fully-built payment request. Fails if a request with the same id already exists, or if an open
    /// request already exists for the same order.
    async fn insert_request(&self, request: &PaymentRequest) -> Result<(), RequestFlowError>;

    /// Fetches a request by id.
    async fn fetch_request(&self, id: &RequestId) -> Result<Option<PaymentRequest>, RequestFlowError>;

    /// Fetches the most recent request correlated with the given external order.
    async fn fetch_request_for_order(&self, order_id: &OrderId) -> Result<Option<PaymentRequest>, RequestFlowError>;

    /// Accept a pending request on behalf of the matched cardholder.
    ///
    /// The transition only succeeds if, in one atomic statement, the request is still `Pending`, is addressed to
    /// this cardholder, and has not passed its expiry deadline. On success the commission is added to the
    /// cardholder's pending earnings in the same transaction.
    ///
    /// If the request is pending but past its deadline, it is marked `Expired` instead and
    /// [`RequestFlowError::RequestExpired`] is returned.
    async fn accept_request(
        &self,
        id: &RequestId,
        cardholder_email: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, RequestFlowError>;

    /// Decline a pending request on behalf of the matched cardholder. Terminal; the shopper retries with a fresh
    /// request against another card. No ledger movement.
    async fn decline_request(
        &self,
        id: &RequestId,
        cardholder_email: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, RequestFlowError>;

    /// Cancel a pending request on behalf of the shopper who created it. Terminal; no ledger movement.
    async fn cancel_request(&self, id: &RequestId, requester_email: &str) -> Result<PaymentRequest, RequestFlowError>;

    /// Settle the accepted request for the given external order after the checkout collaborator reports the order
    /// finalised.
    ///
    /// In a single transaction: the request moves `Accepted` -> `Completed`, the commission moves from the
    /// cardholder's pending balance into their total and month-to-date earnings, and the card's monthly spend
    /// counter absorbs the total payable.
    async fn complete_request_for_order(
        &self,
        order_id: &OrderId,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, RequestFlowError>;

    /// Marks every open request whose deadline has passed as `Expired`, in one conditional bulk update. Requests
    /// already in a terminal state are never touched, so the sweep is idempotent and safe to run concurrently with
    /// live transitions.
    ///
    /// The result lists the requests this sweep expired.
    async fn expire_overdue_requests(&self, now: DateTime<Utc>) -> Result<SweepResult, RequestFlowError>;

    /// Open (pending) requests addressed to the given cardholder, newest first.
    async fn fetch_incoming_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError>;

    /// Requests created by the given shopper, newest first.
    async fn fetch_requests_for_requester(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError>;

    /// Requests addressed to the given cardholder that died without settling (expired, declined or cancelled),
    /// newest first, capped at 50.
    async fn fetch_closed_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError>;

    /// Settled (completed) requests addressed to the given cardholder, newest first, capped at 100.
    async fn fetch_settled_requests(&self, cardholder_email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError>;

    /// The shopper's full request history, oldest first. This is the input to the trust engine.
    async fn fetch_history_for_requester(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError>;

    /// The cardholder's full request history, oldest first. This is the input to candidate feature derivation.
    async fn fetch_history_for_cardholder(&self, email: &str) -> Result<Vec<PaymentRequest>, RequestFlowError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), RequestFlowError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum RequestFlowError {
    #[error("We have an internal database engine issue: {0}")]
    DatabaseError(String),
    #[error("Cannot insert request, since it already exists with id {0}")]
    RequestAlreadyExists(RequestId),
    #[error("An open request already exists for order {0}")]
    OpenRequestForOrder(OrderId),
    #[error("The requested request {0} does not exist")]
    RequestNotFound(RequestId),
    #[error("No request is correlated with order {0}")]
    OrderNotFound(OrderId),
    #[error("Request {id} is {status} and cannot move to {wanted}")]
    InvalidStateTransition { id: RequestId, status: RequestStatus, wanted: RequestStatus },
    #[error("Request {0} passed its deadline and has been expired")]
    RequestExpired(RequestId),
    #[error("This request is not addressed to you")]
    NotYourRequest,
    #[error("{0}")]
    CardError(#[from] CardApiError),
    #[error("The ranking service is unavailable: {0}")]
    RankingUnavailable(String),
    #[error("Invalid request details: {0}")]
    InvalidRequest(String),
}

impl From<sqlx::Error> for RequestFlowError {
    fn from(e: sqlx::Error) -> Self {
        RequestFlowError::DatabaseError(e.to_string())
    }
}

impl From<ConversionError> for RequestFlowError {
    fn from(e: ConversionError) -> Self {
        RequestFlowError::InvalidRequest(e.0)
    }
}
