use serde::{Deserialize, Serialize};

use crate::db_types::{PaymentRequest, RequestStatus};

/// Emitted when a new payment request is created and its trust report attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCreatedEvent {
    pub request: PaymentRequest,
}

impl RequestCreatedEvent {
    pub fn new(request: PaymentRequest) -> Self {
        Self { request }
    }
}

/// Emitted when the matched cardholder accepts a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAcceptedEvent {
    pub request: PaymentRequest,
}

impl RequestAcceptedEvent {
    pub fn new(request: PaymentRequest) -> Self {
        Self { request }
    }
}

/// Emitted when a request reaches a terminal state without settling: declined, cancelled, or expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestAnnulledEvent {
    pub request: PaymentRequest,
    pub status: RequestStatus,
}

impl RequestAnnulledEvent {
    pub fn new(request: PaymentRequest) -> Self {
        let status = request.status;
        Self { request, status }
    }
}

/// Emitted when the order collaborator finalises the underlying order and the ledger settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCompletedEvent {
    pub request: PaymentRequest,
}

impl RequestCompletedEvent {
    pub fn new(request: PaymentRequest) -> Self {
        Self { request }
    }
}
