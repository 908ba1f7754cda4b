//! End-to-end lifecycle tests against a real SQLite store: create, accept, decline, cancel, settle and expire, with
//! the ledger checked at each step.

mod support;

use cardlink_engine::{
    db_types::{Category, OrderId, RequestMode, RequestStatus},
    traits::{CardManagement, RequestFlowDatabase, RequestFlowError},
};
use chrono::Duration;
use cl_common::Money;
use support::*;

#[tokio::test]
async fn accepted_and_settled_request_pays_the_commission() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();

    let request =
        api.create_request(new_request("order-100", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    // cart is ₹6000; 10% discount; 5% of the discount is commission
    assert_eq!(request.order_amount, Money::from_rupees(6000));
    assert_eq!(request.discount_amount, Money::from_rupees(600));
    assert_eq!(request.commission_amount, Money::from_rupees(30));
    assert_eq!(request.total_payable, Money::from_rupees(5400));

    let accepted = api.accept_request(&request.request_id, "holder@example.com").await.unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
    assert!(accepted.accepted_at.is_some());
    let holder = db.fetch_cardholder("holder@example.com").await.unwrap().unwrap();
    assert_eq!(holder.earnings.pending, Money::from_rupees(30));
    assert_eq!(holder.earnings.total, Money::default());

    let completed = api.complete_order(&OrderId("order-100".to_string())).await.unwrap();
    assert_eq!(completed.status, RequestStatus::Completed);
    let holder = db.fetch_cardholder("holder@example.com").await.unwrap().unwrap();
    assert_eq!(holder.earnings.pending, Money::default());
    assert_eq!(holder.earnings.total, Money::from_rupees(30));
    assert_eq!(holder.earnings.this_month, Money::from_rupees(30));
    let cards = db.fetch_cards("holder@example.com").await.unwrap();
    assert_eq!(cards[0].current_month_spent, Money::from_rupees(5400));

    // a settled request shows up in the settled view, not the closed one
    let settled = api.settled_requests("holder@example.com").await.unwrap();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].request_id, request.request_id);
    assert!(api.closed_requests("holder@example.com").await.unwrap().is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn declined_request_is_terminal_and_moves_no_money() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let request =
        api.create_request(new_request("order-101", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();

    let declined = api.decline_request(&request.request_id, "holder@example.com", Some("limit reached")).await.unwrap();
    assert_eq!(declined.status, RequestStatus::Declined);
    assert_eq!(declined.decline_reason.as_deref(), Some("limit reached"));
    let holder = db.fetch_cardholder("holder@example.com").await.unwrap().unwrap();
    assert_eq!(holder.earnings.pending, Money::default());

    // terminal: neither party can move it again
    let err = api.accept_request(&request.request_id, "holder@example.com").await.unwrap_err();
    assert!(matches!(err, RequestFlowError::InvalidStateTransition { .. }));
    let err = api.cancel_request(&request.request_id, "asha@example.com").await.unwrap_err();
    assert!(matches!(err, RequestFlowError::InvalidStateTransition { .. }));
    tear_down(api).await;
}

#[tokio::test]
async fn decline_without_a_reason_records_the_default() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let request =
        api.create_request(new_request("order-102", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();
    let declined = api.decline_request(&request.request_id, "holder@example.com", None).await.unwrap();
    assert_eq!(declined.decline_reason.as_deref(), Some("No reason provided"));
    tear_down(api).await;
}

#[tokio::test]
async fn requests_need_a_live_card_owned_by_the_addressee() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();

    let err = api
        .create_request(new_request("order-120", "asha@example.com", "card-missing", "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFlowError::CardError(_)));

    // addressing the request to someone other than the card's owner is rejected up front
    let err = api
        .create_request(new_request("order-120", "asha@example.com", &card.id, "other@example.com", RequestMode::Scheduled))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFlowError::InvalidRequest(_)));

    db.deactivate_card("holder@example.com", &card.id).await.unwrap();
    let err = api
        .create_request(new_request("order-120", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFlowError::InvalidRequest(_)));
    tear_down(api).await;
}

#[tokio::test]
async fn only_the_addressee_may_respond() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let request =
        api.create_request(new_request("order-102", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();

    let err = api.accept_request(&request.request_id, "mallory@example.com").await.unwrap_err();
    assert!(matches!(err, RequestFlowError::NotYourRequest));
    let err = api.cancel_request(&request.request_id, "mallory@example.com").await.unwrap_err();
    assert!(matches!(err, RequestFlowError::NotYourRequest));
    // the request is untouched
    let current = db.fetch_request(&request.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, RequestStatus::Pending);
    tear_down(api).await;
}

#[tokio::test]
async fn accept_after_the_deadline_expires_the_request() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let overdue = overdue_request("order-103", "asha@example.com", &card.id, "holder@example.com");
    db.insert_request(&overdue).await.unwrap();

    let err = api.accept_request(&overdue.request_id, "holder@example.com").await.unwrap_err();
    assert!(matches!(err, RequestFlowError::RequestExpired(_)));
    let current = db.fetch_request(&overdue.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, RequestStatus::Expired);
    let holder = db.fetch_cardholder("holder@example.com").await.unwrap().unwrap();
    assert_eq!(holder.earnings.pending, Money::default());
    tear_down(api).await;
}

#[tokio::test]
async fn decline_after_the_deadline_expires_the_request() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let overdue = overdue_request("order-121", "asha@example.com", &card.id, "holder@example.com");
    db.insert_request(&overdue).await.unwrap();

    let err = api.decline_request(&overdue.request_id, "holder@example.com", Some("too slow")).await.unwrap_err();
    assert!(matches!(err, RequestFlowError::RequestExpired(_)));
    let current = db.fetch_request(&overdue.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, RequestStatus::Expired);
    assert!(current.decline_reason.is_none());
    tear_down(api).await;
}

#[tokio::test]
async fn acceptance_window_closes_exactly_at_the_deadline() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();

    // a millisecond of headroom is still enough
    let early = overdue_request("order-130", "asha@example.com", &card.id, "holder@example.com");
    db.insert_request(&early).await.unwrap();
    let accepted = db
        .accept_request(&early.request_id, "holder@example.com", early.expires_at - Duration::milliseconds(1))
        .await
        .unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);

    // the deadline itself is out of bounds
    let on_time = overdue_request("order-131", "bela@example.com", &card.id, "holder@example.com");
    db.insert_request(&on_time).await.unwrap();
    let err = db.accept_request(&on_time.request_id, "holder@example.com", on_time.expires_at).await.unwrap_err();
    assert!(matches!(err, RequestFlowError::RequestExpired(_)));
    let current = db.fetch_request(&on_time.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, RequestStatus::Expired);

    let late = overdue_request("order-132", "chitra@example.com", &card.id, "holder@example.com");
    db.insert_request(&late).await.unwrap();
    let err = db
        .accept_request(&late.request_id, "holder@example.com", late.expires_at + Duration::milliseconds(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFlowError::RequestExpired(_)));
    let current = db.fetch_request(&late.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, RequestStatus::Expired);

    // only the in-time acceptance moved any money
    let holder = db.fetch_cardholder("holder@example.com").await.unwrap().unwrap();
    assert_eq!(holder.earnings.pending, early.commission_amount);
    tear_down(api).await;
}

#[tokio::test]
async fn sweep_is_idempotent_and_skips_settled_requests() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    db.insert_request(&overdue_request("order-104", "asha@example.com", &card.id, "holder@example.com")).await.unwrap();
    db.insert_request(&overdue_request("order-105", "bela@example.com", &card.id, "holder@example.com")).await.unwrap();
    // a live request that must survive the sweep
    let live =
        api.create_request(new_request("order-106", "chitra@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();

    let first = api.expire_overdue_requests().await.unwrap();
    assert_eq!(first.count(), 2);
    let second = api.expire_overdue_requests().await.unwrap();
    assert!(second.is_empty());
    let current = db.fetch_request(&live.request_id).await.unwrap().unwrap();
    assert_eq!(current.status, RequestStatus::Pending);
    tear_down(api).await;
}

#[tokio::test]
async fn one_open_request_per_order() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    api.create_request(new_request("order-107", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap();

    let err = api
        .create_request(new_request("order-107", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestFlowError::OpenRequestForOrder(_)));
    tear_down(api).await;
}

#[tokio::test]
async fn settlement_requires_an_accepted_request() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    api.create_request(new_request("order-108", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap();

    let err = api.complete_order(&OrderId("order-108".to_string())).await.unwrap_err();
    assert!(matches!(err, RequestFlowError::InvalidStateTransition { .. }));
    let err = api.complete_order(&OrderId("no-such-order".to_string())).await.unwrap_err();
    assert!(matches!(err, RequestFlowError::OrderNotFound(_)));
    tear_down(api).await;
}

#[tokio::test]
async fn cancelled_request_shows_up_in_the_shopper_view() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let request =
        api.create_request(new_request("order-109", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();

    let cancelled = api.cancel_request(&request.request_id, "asha@example.com").await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);
    let mine = api.requests_for_requester("asha@example.com").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, RequestStatus::Cancelled);
    let closed = api.closed_requests("holder@example.com").await.unwrap();
    assert_eq!(closed.len(), 1);
    tear_down(api).await;
}

#[tokio::test]
async fn incoming_view_sweeps_stale_requests_first() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    db.insert_request(&overdue_request("order-110", "asha@example.com", &card.id, "holder@example.com")).await.unwrap();
    let live =
        api.create_request(new_request("order-111", "bela@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();

    let incoming = api.incoming_requests("holder@example.com").await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].request_id, live.request_id);
    tear_down(api).await;
}

#[tokio::test]
async fn order_status_reflects_the_sweep() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    db.insert_request(&overdue_request("order-112", "asha@example.com", &card.id, "holder@example.com")).await.unwrap();

    let status = api.status_for_order(&OrderId("order-112".to_string())).await.unwrap();
    assert_eq!(status.status, RequestStatus::Expired);
    tear_down(api).await;
}

#[tokio::test]
async fn month_rollover_keeps_totals_and_pending() {
    let api = setup().await;
    let db = api.db();
    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();
    let request =
        api.create_request(new_request("order-113", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
            .await
            .unwrap();
    api.accept_request(&request.request_id, "holder@example.com").await.unwrap();
    api.complete_order(&OrderId("order-113".to_string())).await.unwrap();

    let result = db.rollover_month().await.unwrap();
    assert_eq!(result.cardholders_reset, 1);
    assert_eq!(result.cards_reset, 1);
    let holder = db.fetch_cardholder("holder@example.com").await.unwrap().unwrap();
    assert_eq!(holder.earnings.this_month, Money::default());
    assert_eq!(holder.earnings.total, Money::from_rupees(30));
    let cards = db.fetch_cards("holder@example.com").await.unwrap();
    assert_eq!(cards[0].current_month_spent, Money::default());
    tear_down(api).await;
}
