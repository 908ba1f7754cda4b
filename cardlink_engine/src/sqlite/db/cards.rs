use chrono::{DateTime, Duration, Utc};
use cl_common::Money;
use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{categories_from_string, categories_to_string, Card, Cardholder, Earnings, NewCard, RequestMode, ONLINE_WINDOW_SECS},
    matching::MatchCandidate,
    traits::CardApiError,
};

#[derive(Debug, Clone, FromRow)]
pub struct CardRow {
    pub id: String,
    pub cardholder_email: String,
    pub last_four: String,
    pub bank_name: String,
    pub card_type: String,
    pub categories: String,
    pub discount_pct: i64,
    pub monthly_limit: i64,
    pub current_month_spent: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CardRow> for Card {
    fn from(row: CardRow) -> Self {
        Card {
            id: row.id,
            cardholder_email: row.cardholder_email,
            last_four: row.last_four,
            bank_name: row.bank_name,
            card_type: row.card_type,
            categories: categories_from_string(&row.categories),
            discount_pct: row.discount_pct,
            monthly_limit: Money::from(row.monthly_limit),
            current_month_spent: Money::from(row.current_month_spent),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

fn new_card_id() -> String {
    let now = Utc::now().timestamp_millis();
    let salt = rand::random::<u32>();
    format!("card-{now:013x}-{salt:08x}")
}

pub async fn insert_card(email: &str, card: NewCard, conn: &mut SqliteConnection) -> Result<Card, CardApiError> {
    card.validate()?;
    let id = new_card_id();
    let row = sqlx::query_as::<_, CardRow>(
        r#"
            INSERT INTO cards (id, cardholder_email, last_four, bank_name, card_type, categories, discount_pct, monthly_limit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(&card.last_four)
    .bind(&card.bank_name)
    .bind(&card.card_type)
    .bind(categories_to_string(&card.categories))
    .bind(card.discount_pct)
    .bind(card.monthly_limit.value())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Card {id} registered for {email}");
    Ok(Card::from(row))
}

/// Flips the card inactive if it belongs to `email`. Distinguishes "no such card" from "not yours" so the API can
/// answer 404 vs 403 correctly.
pub async fn deactivate_card(email: &str, card_id: &str, conn: &mut SqliteConnection) -> Result<Card, CardApiError> {
    let row = sqlx::query_as::<_, CardRow>(
        "UPDATE cards SET is_active = 0 WHERE id = $1 AND cardholder_email = $2 RETURNING *",
    )
    .bind(card_id)
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => Ok(Card::from(row)),
        None => {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cards WHERE id = $1")
                .bind(card_id)
                .fetch_one(conn)
                .await?;
            if exists > 0 {
                Err(CardApiError::NotCardOwner(card_id.to_string()))
            } else {
                Err(CardApiError::CardNotFound(card_id.to_string()))
            }
        },
    }
}

pub async fn fetch_cards(email: &str, conn: &mut SqliteConnection) -> Result<Vec<Card>, CardApiError> {
    let rows = sqlx::query_as::<_, CardRow>("SELECT * FROM cards WHERE cardholder_email = $1 ORDER BY created_at")
        .bind(email)
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(Card::from).collect())
}

pub async fn fetch_card(card_id: &str, conn: &mut SqliteConnection) -> Result<Option<Card>, CardApiError> {
    let row = sqlx::query_as::<_, CardRow>("SELECT * FROM cards WHERE id = $1").bind(card_id).fetch_optional(conn).await?;
    Ok(row.map(Card::from))
}

#[derive(Debug, Clone, FromRow)]
struct CandidateRow {
    #[sqlx(flatten)]
    card: CardRow,
    holder_name: String,
    holder_is_online: bool,
    holder_last_active_at: DateTime<Utc>,
    holder_created_at: DateTime<Utc>,
    total_earnings: i64,
    month_earnings: i64,
    pending_earnings: i64,
    active_cards: i64,
}

/// Every active card joined with its owner, pre-filtered in SQL on the mode's presence requirement. Category
/// coverage is checked by the caller, since the category set is stored denormalised.
pub async fn fetch_match_candidates(
    mode: RequestMode,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<MatchCandidate>, CardApiError> {
    let mut sql = String::from(
        r#"
        SELECT c.*,
               h.name AS holder_name,
               h.is_online AS holder_is_online,
               h.last_active_at AS holder_last_active_at,
               h.created_at AS holder_created_at,
               h.total_earnings,
               h.month_earnings,
               h.pending_earnings,
               (SELECT COUNT(*) FROM cards c2 WHERE c2.cardholder_email = c.cardholder_email AND c2.is_active = 1)
                   AS active_cards
        FROM cards c
        INNER JOIN cardholders h ON h.email = c.cardholder_email
        WHERE c.is_active = 1
    "#,
    );
    if mode == RequestMode::Immediate {
        sql.push_str(" AND h.last_active_at >= $1");
    }
    let mut query = sqlx::query_as::<_, CandidateRow>(&sql);
    if mode == RequestMode::Immediate {
        query = query.bind(now - Duration::seconds(ONLINE_WINDOW_SECS));
    }
    let rows = query.fetch_all(conn).await?;
    let candidates = rows
        .into_iter()
        .map(|row| {
            let cardholder = Cardholder {
                email: row.card.cardholder_email.clone(),
                name: row.holder_name,
                is_online: row.holder_is_online,
                last_active_at: row.holder_last_active_at,
                created_at: row.holder_created_at,
                earnings: Earnings {
                    total: Money::from(row.total_earnings),
                    this_month: Money::from(row.month_earnings),
                    pending: Money::from(row.pending_earnings),
                },
            };
            MatchCandidate { card: Card::from(row.card), cardholder, active_cards: row.active_cards as usize }
        })
        .collect();
    Ok(candidates)
}

/// Absorbs a settled request's total into the card's monthly spend counter.
pub async fn add_month_spent(card_id: &str, amount: Money, conn: &mut SqliteConnection) -> Result<(), CardApiError> {
    let result = sqlx::query("UPDATE cards SET current_month_spent = current_month_spent + $1 WHERE id = $2")
        .bind(amount.value())
        .bind(card_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CardApiError::CardNotFound(card_id.to_string()));
    }
    Ok(())
}

/// Month-end: zero every card's spend counter. Returns the number of rows touched.
pub async fn reset_month_spend(conn: &mut SqliteConnection) -> Result<u64, CardApiError> {
    let result =
        sqlx::query("UPDATE cards SET current_month_spent = 0 WHERE current_month_spent <> 0").execute(conn).await?;
    Ok(result.rows_affected())
}
