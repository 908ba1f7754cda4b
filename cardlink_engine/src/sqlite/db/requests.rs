use chrono::{DateTime, Utc};
use cl_common::Money;
use log::{debug, trace};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{
        City,
        DeviceType,
        LineItem,
        OrderId,
        PaymentRequest,
        RequestId,
        RequestMode,
        RequestStatus,
        Requester,
    },
    traits::RequestFlowError,
    trust::TrustReport,
};

#[derive(Debug, Clone, FromRow)]
pub struct RequestRow {
    pub request_id: String,
    pub order_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub requester_email: String,
    pub line_items: String,
    pub order_amount: i64,
    pub discount_amount: i64,
    pub commission_amount: i64,
    pub total_payable: i64,
    pub card_id: String,
    pub cardholder_email: String,
    pub mode: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub city: String,
    pub device_type: String,
    pub trust_report: String,
}

impl TryFrom<RequestRow> for PaymentRequest {
    type Error = RequestFlowError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let line_items: Vec<LineItem> = serde_json::from_str(&row.line_items)
            .map_err(|e| RequestFlowError::DatabaseError(format!("Corrupt line_items for {}: {e}", row.request_id)))?;
        let trust_report: TrustReport = serde_json::from_str(&row.trust_report)
            .map_err(|e| RequestFlowError::DatabaseError(format!("Corrupt trust_report for {}: {e}", row.request_id)))?;
        Ok(PaymentRequest {
            request_id: RequestId::from(row.request_id),
            order_id: OrderId::from(row.order_id),
            requester: Requester { id: row.requester_id, name: row.requester_name, email: row.requester_email },
            line_items,
            order_amount: Money::from(row.order_amount),
            discount_amount: Money::from(row.discount_amount),
            commission_amount: Money::from(row.commission_amount),
            total_payable: Money::from(row.total_payable),
            card_id: row.card_id,
            cardholder_email: row.cardholder_email,
            mode: RequestMode::from(row.mode),
            status: RequestStatus::from(row.status),
            created_at: row.created_at,
            expires_at: row.expires_at,
            accepted_at: row.accepted_at,
            declined_at: row.declined_at,
            completed_at: row.completed_at,
            decline_reason: row.decline_reason,
            city: City::from(row.city),
            device_type: DeviceType::from(row.device_type),
            trust_report,
        })
    }
}

fn rows_to_requests(rows: Vec<RequestRow>) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    rows.into_iter().map(PaymentRequest::try_from).collect()
}

pub async fn insert_request(request: &PaymentRequest, conn: &mut SqliteConnection) -> Result<(), RequestFlowError> {
    let line_items = serde_json::to_string(&request.line_items)
        .map_err(|e| RequestFlowError::InvalidRequest(format!("Unserializable line items: {e}")))?;
    let trust_report = serde_json::to_string(&request.trust_report)
        .map_err(|e| RequestFlowError::InvalidRequest(format!("Unserializable trust report: {e}")))?;
    let result = sqlx::query(
        r#"
            INSERT INTO payment_requests (
                request_id, order_id,
                requester_id, requester_name, requester_email,
                line_items, order_amount, discount_amount, commission_amount, total_payable,
                card_id, cardholder_email, mode, status,
                created_at, expires_at, city, device_type, trust_report
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19);
        "#,
    )
    .bind(request.request_id.as_str())
    .bind(request.order_id.as_str())
    .bind(&request.requester.id)
    .bind(&request.requester.name)
    .bind(&request.requester.email)
    .bind(line_items)
    .bind(request.order_amount.value())
    .bind(request.discount_amount.value())
    .bind(request.commission_amount.value())
    .bind(request.total_payable.value())
    .bind(&request.card_id)
    .bind(&request.cardholder_email)
    .bind(request.mode.to_string())
    .bind(request.status.to_string())
    .bind(request.created_at)
    .bind(request.expires_at)
    .bind(request.city.to_string())
    .bind(request.device_type.to_string())
    .bind(trust_report)
    .execute(conn)
    .await;
    match result {
        Ok(_) => {
            debug!("🗃️ Request {} saved against order {}", request.request_id, request.order_id);
            Ok(())
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(RequestFlowError::RequestAlreadyExists(request.request_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_request(id: &RequestId, conn: &mut SqliteConnection) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>("SELECT * FROM payment_requests WHERE request_id = $1")
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;
    row.map(PaymentRequest::try_from).transpose()
}

pub async fn fetch_request_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>(
        "SELECT * FROM payment_requests WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRequest::try_from).transpose()
}

/// Whether an open (pending or accepted) request already exists against the order.
pub async fn open_request_exists_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, RequestFlowError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM payment_requests WHERE order_id = $1 AND status IN ('pending', 'accepted')",
    )
    .bind(order_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// `pending -> accepted`, in one statement guarded on status, addressee and deadline. Returns `None` when the guard
/// does not hold; the caller works out which condition failed.
pub async fn mark_accepted(
    id: &RequestId,
    cardholder_email: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
            UPDATE payment_requests SET status = 'accepted', accepted_at = $1
            WHERE request_id = $2 AND cardholder_email = $3 AND status = 'pending' AND expires_at > $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id.as_str())
    .bind(cardholder_email)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRequest::try_from).transpose()
}

/// `pending -> declined`, guarded on status, addressee and deadline.
pub async fn mark_declined(
    id: &RequestId,
    cardholder_email: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
            UPDATE payment_requests SET status = 'declined', declined_at = $1, decline_reason = $2
            WHERE request_id = $3 AND cardholder_email = $4 AND status = 'pending' AND expires_at > $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(reason)
    .bind(id.as_str())
    .bind(cardholder_email)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRequest::try_from).transpose()
}

/// `pending -> cancelled`, guarded on status and the shopper who created the request.
pub async fn mark_cancelled(
    id: &RequestId,
    requester_email: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
            UPDATE payment_requests SET status = 'cancelled'
            WHERE request_id = $1 AND requester_email = $2 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .bind(requester_email)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRequest::try_from).transpose()
}

/// `accepted -> completed` for the request correlated with the order.
pub async fn mark_completed_for_order(
    order_id: &OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
            UPDATE payment_requests SET status = 'completed', completed_at = $1
            WHERE order_id = $2 AND status = 'accepted'
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRequest::try_from).transpose()
}

/// `pending -> expired` for a single request. Used when an accept arrives after the deadline.
pub async fn mark_expired(
    id: &RequestId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRequest>, RequestFlowError> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
            UPDATE payment_requests SET status = 'expired'
            WHERE request_id = $1 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRequest::try_from).transpose()
}

/// The bulk sweep: every pending request past its deadline becomes `Expired` in one conditional statement. Requests
/// that raced into a terminal state are skipped by the status guard, which is what makes repeated sweeps idempotent.
pub async fn expire_overdue(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        r#"
            UPDATE payment_requests SET status = 'expired'
            WHERE status = 'pending' AND expires_at <= $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    trace!("🕰️ Sweep marked {} request(s) as expired", rows.len());
    rows_to_requests(rows)
}

pub async fn fetch_incoming(cardholder_email: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        "SELECT * FROM payment_requests WHERE cardholder_email = $1 AND status = 'pending' ORDER BY created_at DESC",
    )
    .bind(cardholder_email)
    .fetch_all(conn)
    .await?;
    rows_to_requests(rows)
}

pub async fn fetch_for_requester(email: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        "SELECT * FROM payment_requests WHERE requester_email = $1 ORDER BY created_at DESC",
    )
    .bind(email)
    .fetch_all(conn)
    .await?;
    rows_to_requests(rows)
}

/// Requests that died without settling, most recent 50.
pub async fn fetch_closed(cardholder_email: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        r#"
            SELECT * FROM payment_requests
            WHERE cardholder_email = $1 AND status IN ('expired', 'declined', 'cancelled')
            ORDER BY created_at DESC
            LIMIT 50
        "#,
    )
    .bind(cardholder_email)
    .fetch_all(conn)
    .await?;
    rows_to_requests(rows)
}

/// Settled requests, most recent 100.
pub async fn fetch_settled(cardholder_email: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        r#"
            SELECT * FROM payment_requests
            WHERE cardholder_email = $1 AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT 100
        "#,
    )
    .bind(cardholder_email)
    .fetch_all(conn)
    .await?;
    rows_to_requests(rows)
}

pub async fn fetch_history_for_requester(email: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        "SELECT * FROM payment_requests WHERE requester_email = $1 ORDER BY created_at",
    )
    .bind(email)
    .fetch_all(conn)
    .await?;
    rows_to_requests(rows)
}

pub async fn fetch_history_for_cardholder(email: &str, conn: &mut SqliteConnection) -> Result<Vec<PaymentRequest>, RequestFlowError> {
    let rows = sqlx::query_as::<_, RequestRow>(
        "SELECT * FROM payment_requests WHERE cardholder_email = $1 ORDER BY created_at",
    )
    .bind(email)
    .fetch_all(conn)
    .await?;
    rows_to_requests(rows)
}
