//! Event hook tests: each lifecycle transition notifies its subscribers exactly once.

mod support;

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use cardlink_engine::{
    db_types::{Category, OrderId, RequestMode},
    events::{EventHandlers, EventHooks},
    traits::CardManagement,
};
use log::*;
use support::*;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn lifecycle_hooks_fire_once_per_transition() {
    let created = HookCalled::default();
    let accepted = HookCalled::default();
    let annulled = HookCalled::default();
    let completed = HookCalled::default();

    let mut hooks = EventHooks::default();
    let c = created.clone();
    hooks.on_request_created(move |ev| {
        info!("🪝️ created: {}", ev.request.request_id);
        c.called();
        Box::pin(async {})
    });
    let a = accepted.clone();
    hooks.on_request_accepted(move |ev| {
        info!("🪝️ accepted: {}", ev.request.request_id);
        a.called();
        Box::pin(async {})
    });
    let n = annulled.clone();
    hooks.on_request_annulled(move |ev| {
        info!("🪝️ annulled: {} ({})", ev.request.request_id, ev.status);
        n.called();
        Box::pin(async {})
    });
    let f = completed.clone();
    hooks.on_request_completed(move |ev| {
        info!("🪝️ completed: {}", ev.request.request_id);
        f.called();
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    let api = setup_with_producers(producers).await;
    let db = api.db().clone();

    db.upsert_cardholder("holder@example.com", "Vikram").await.unwrap();
    let card = db.register_card("holder@example.com", new_card(10, vec![Category::Electronics])).await.unwrap();

    let r1 = api
        .create_request(new_request("order-1", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap();
    api.accept_request(&r1.request_id, "holder@example.com").await.unwrap();
    api.complete_order(&OrderId("order-1".to_string())).await.unwrap();

    let r2 = api
        .create_request(new_request("order-2", "asha@example.com", &card.id, "holder@example.com", RequestMode::Scheduled))
        .await
        .unwrap();
    api.decline_request(&r2.request_id, "holder@example.com", None).await.unwrap();

    // dropping the api drops the producers, which shuts the handlers down once the queue drains
    tear_down(api).await;
    handlers.start_handlers().await;
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    assert_eq!(created.count(), 2);
    assert_eq!(accepted.count(), 1);
    assert_eq!(annulled.count(), 1);
    assert_eq!(completed.count(), 1);
}
