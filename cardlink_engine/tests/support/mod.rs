use chrono::{Duration, Utc};
use cl_common::Money;
use cardlink_engine::{
    db_types::{
        cart_total,
        Category,
        City,
        DeviceType,
        LineItem,
        NewCard,
        NewPaymentRequest,
        OrderId,
        PaymentRequest,
        RequestId,
        RequestMode,
        RequestStatus,
        Requester,
    },
    events::EventProducers,
    traits::RequestFlowDatabase,
    trust::TrustReport,
    RequestFlowApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

pub const COMMISSION_BPS: i64 = 500;

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Test database ready at {url}");
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{}", rand::random::<u64>())
}

pub async fn setup() -> RequestFlowApi<SqliteDatabase> {
    setup_with_producers(EventProducers::default()).await
}

pub async fn setup_with_producers(producers: EventProducers) -> RequestFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    RequestFlowApi::new(db, COMMISSION_BPS, producers)
}

pub async fn tear_down(api: RequestFlowApi<SqliteDatabase>) {
    Sqlite::drop_database(api.db().url()).await.unwrap();
}

pub fn electronics_cart() -> Vec<LineItem> {
    vec![
        LineItem::new("Headphones", Category::Electronics, Money::from_rupees(5000), 1),
        LineItem::new("USB cable", Category::Electronics, Money::from_rupees(500), 2),
    ]
}

pub fn new_card(discount_pct: i64, categories: Vec<Category>) -> NewCard {
    NewCard {
        last_four: "4242".to_string(),
        bank_name: "HDFC".to_string(),
        card_type: "Infinia".to_string(),
        categories,
        discount_pct,
        monthly_limit: Money::from_rupees(100_000),
    }
}

pub fn requester(email: &str) -> Requester {
    Requester { id: format!("user-{email}"), name: "Asha".to_string(), email: email.to_string() }
}

pub fn new_request(order_id: &str, shopper: &str, card_id: &str, holder: &str, mode: RequestMode) -> NewPaymentRequest {
    let line_items = electronics_cart();
    let discount_amount = cart_total(&line_items).apply_percent(10);
    NewPaymentRequest {
        order_id: OrderId(order_id.to_string()),
        requester: requester(shopper),
        line_items,
        discount_amount,
        card_id: card_id.to_string(),
        cardholder_email: holder.to_string(),
        mode,
        city: City::Pune,
        device_type: DeviceType::Mobile,
    }
}

/// A fully-built pending request whose deadline already passed, for exercising the expiry paths directly.
pub fn overdue_request(order_id: &str, shopper: &str, card_id: &str, holder: &str) -> PaymentRequest {
    let line_items = electronics_cart();
    let order_amount = cart_total(&line_items);
    let discount_amount = order_amount.apply_percent(10);
    let created_at = Utc::now() - Duration::minutes(10);
    PaymentRequest {
        request_id: RequestId::random(),
        order_id: OrderId(order_id.to_string()),
        requester: requester(shopper),
        line_items,
        order_amount,
        discount_amount,
        commission_amount: discount_amount.apply_bps(COMMISSION_BPS),
        total_payable: order_amount - discount_amount,
        card_id: card_id.to_string(),
        cardholder_email: holder.to_string(),
        mode: RequestMode::Immediate,
        status: RequestStatus::Pending,
        created_at,
        expires_at: created_at + Duration::minutes(5),
        accepted_at: None,
        declined_at: None,
        completed_at: None,
        decline_reason: None,
        city: City::Pune,
        device_type: DeviceType::Mobile,
        trust_report: TrustReport::neutral(),
    }
}
