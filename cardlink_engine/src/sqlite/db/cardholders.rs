use chrono::{DateTime, Utc};
use cl_common::Money;
use log::trace;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{Cardholder, Earnings},
    traits::CardApiError,
};

#[derive(Debug, Clone, FromRow)]
pub struct CardholderRow {
    pub email: String,
    pub name: String,
    pub is_online: bool,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub total_earnings: i64,
    pub month_earnings: i64,
    pub pending_earnings: i64,
}

impl From<CardholderRow> for Cardholder {
    fn from(row: CardholderRow) -> Self {
        Cardholder {
            email: row.email,
            name: row.name,
            is_online: row.is_online,
            last_active_at: row.last_active_at,
            created_at: row.created_at,
            earnings: Earnings {
                total: Money::from(row.total_earnings),
                this_month: Money::from(row.month_earnings),
                pending: Money::from(row.pending_earnings),
            },
        }
    }
}

pub async fn fetch_cardholder(email: &str, conn: &mut SqliteConnection) -> Result<Option<Cardholder>, CardApiError> {
    let row = sqlx::query_as::<_, CardholderRow>("SELECT * FROM cardholders WHERE email = $1")
        .bind(email)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Cardholder::from))
}

/// Creates the profile row if it is missing, otherwise refreshes the display name. The ledger balances are never
/// touched here. A fresh profile starts with its activity clock at the epoch; only a heartbeat makes the holder
/// count as online.
pub async fn upsert_cardholder(email: &str, name: &str, conn: &mut SqliteConnection) -> Result<Cardholder, CardApiError> {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    let row = sqlx::query_as::<_, CardholderRow>(
        r#"
            INSERT INTO cardholders (email, name, last_active_at) VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET name = excluded.name
            RETURNING *;
        "#,
    )
    .bind(email)
    .bind(name)
    .bind(epoch)
    .fetch_one(conn)
    .await?;
    Ok(Cardholder::from(row))
}

pub async fn record_heartbeat(email: &str, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), CardApiError> {
    let result = sqlx::query("UPDATE cardholders SET is_online = 1, last_active_at = $1 WHERE email = $2")
        .bind(now)
        .bind(email)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CardApiError::CardholderNotFound(email.to_string()));
    }
    Ok(())
}

/// Applies a delta to each ledger balance. Call inside the same transaction as the status change that justifies the
/// movement.
pub async fn adjust_earnings(
    email: &str,
    total_delta: Money,
    month_delta: Money,
    pending_delta: Money,
    conn: &mut SqliteConnection,
) -> Result<(), CardApiError> {
    let result = sqlx::query(
        r#"
            UPDATE cardholders SET
                total_earnings = total_earnings + $1,
                month_earnings = month_earnings + $2,
                pending_earnings = pending_earnings + $3
            WHERE email = $4
        "#,
    )
    .bind(total_delta.value())
    .bind(month_delta.value())
    .bind(pending_delta.value())
    .bind(email)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(CardApiError::CardholderNotFound(email.to_string()));
    }
    trace!("🗃️ Ledger for {email} adjusted by total {total_delta}, month {month_delta}, pending {pending_delta}");
    Ok(())
}

/// Month-end: zero every month-to-date balance. Returns the number of rows touched.
pub async fn reset_month_earnings(conn: &mut SqliteConnection) -> Result<u64, CardApiError> {
    let result = sqlx::query("UPDATE cardholders SET month_earnings = 0 WHERE month_earnings <> 0").execute(conn).await?;
    Ok(result.rows_affected())
}
