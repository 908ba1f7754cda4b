//! Matching tests against a real SQLite store, exercising eligibility, mode presence rules and the heuristic
//! fallback ordering.

mod support;

use cardlink_engine::{
    db_types::{Category, RequestMode},
    matching::{NullRankingService, RankingSource},
    traits::CardManagement,
    MatchingApi,
};
use chrono::Utc;
use cl_common::Money;
use support::*;

#[tokio::test]
async fn immediate_mode_needs_a_fresh_heartbeat() {
    let api = setup().await;
    let db = api.db().clone();
    db.upsert_cardholder("online@example.com", "Priya").await.unwrap();
    db.upsert_cardholder("offline@example.com", "Rahul").await.unwrap();
    db.register_card("online@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    db.register_card("offline@example.com", new_card(15, vec![Category::Electronics])).await.unwrap();
    db.record_heartbeat("online@example.com", Utc::now()).await.unwrap();

    let matcher = MatchingApi::new(db.clone(), NullRankingService);
    let cart = electronics_cart();

    let immediate = matcher.match_cards(&cart, RequestMode::Immediate).await.unwrap();
    assert_eq!(immediate.len(), 1);
    assert_eq!(immediate[0].cardholder_email, "online@example.com");
    assert!(immediate[0].is_online);

    // scheduled mode reaches the offline cardholder too, and their bigger discount wins
    let scheduled = matcher.match_cards(&cart, RequestMode::Scheduled).await.unwrap();
    assert_eq!(scheduled.len(), 2);
    assert_eq!(scheduled[0].cardholder_email, "offline@example.com");
    assert_eq!(scheduled[0].discount_amount, Money::from_rupees(900));
    assert_eq!(scheduled[0].ranking.rank, 1);
    assert_eq!(scheduled[1].ranking.rank, 2);
    assert!(scheduled.iter().all(|c| c.ranking.source == RankingSource::Heuristic));
    tear_down(api).await;
}

#[tokio::test]
async fn inactive_and_uncovering_cards_never_match() {
    let api = setup().await;
    let db = api.db().clone();
    db.upsert_cardholder("holder@example.com", "Priya").await.unwrap();
    let electronics = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    db.register_card("holder@example.com", new_card(20, vec![Category::Travel])).await.unwrap();

    let matcher = MatchingApi::new(db.clone(), NullRankingService);
    let cart = electronics_cart();

    let matches = matcher.match_cards(&cart, RequestMode::Scheduled).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].card_id, electronics.id);

    db.deactivate_card("holder@example.com", &electronics.id).await.unwrap();
    let matches = matcher.match_cards(&cart, RequestMode::Scheduled).await.unwrap();
    assert!(matches.is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn masked_card_data_only() {
    let api = setup().await;
    let db = api.db().clone();
    db.upsert_cardholder("holder@example.com", "Priya").await.unwrap();
    db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();

    let matcher = MatchingApi::new(db.clone(), NullRankingService);
    let matches = matcher.match_cards(&electronics_cart(), RequestMode::Scheduled).await.unwrap();
    assert_eq!(matches[0].last_four, "4242");
    assert_eq!(matches[0].bank_name, "HDFC");
    // ₹6000 cart, 10% discount
    assert_eq!(matches[0].discount_amount, Money::from_rupees(600));
    assert_eq!(matches[0].total_payable, Money::from_rupees(5400));
    tear_down(api).await;
}
