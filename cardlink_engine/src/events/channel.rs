//! The channel plumbing behind the lifecycle hooks.
//!
//! Each hook gets its own dispatcher: producers embedded in the request flow API push events into an mpsc channel,
//! and the dispatcher invokes the subscribed hook for each one. Hooks see only the event; they get no access to
//! engine internals. Hook invocations run concurrently and may be async.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Run the dispatch loop until every producer has been dropped, then drain the in-flight hook invocations.
    pub async fn start_handler(mut self) {
        debug!("📬️ Lifecycle hook dispatcher started");
        // the dispatcher's own sender must go, or the loop would never see the channel close
        drop(self.sender);
        let in_flight = Arc::new(AtomicI64::new(0));
        while let Some(event) = self.listener.recv().await {
            trace!("📬️ Dispatching a lifecycle event");
            let hook = Arc::clone(&self.handler);
            in_flight.fetch_add(1, Ordering::SeqCst);
            let gauge = Arc::clone(&in_flight);
            tokio::spawn(async move {
                (hook)(event).await;
                gauge.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting on {} hook invocation(s) before shutting down", in_flight.load(Ordering::SeqCst));
            tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
        }
        debug!("📬️ Lifecycle hook dispatcher shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish lifecycle event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn hooks_see_every_event_from_every_producer() {
        let _ = env_logger::try_init();
        // a tally standing in for a commission ledger; each event carries a commission in paise
        let tally = Arc::new(AtomicU64::new(0));
        let total = tally.clone();
        let hook = Arc::new(move |commission: u64| {
            let tally = tally.clone();
            Box::pin(async move {
                tally.fetch_add(commission, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let dispatcher = EventHandler::new(1, hook);
        let settlements = dispatcher.subscribe();
        let refunds = dispatcher.subscribe();
        tokio::spawn(async move {
            for commission in [3000, 1500, 4500] {
                settlements.publish_event(commission).await;
            }
        });
        tokio::spawn(async move {
            for commission in [500, 500] {
                refunds.publish_event(commission).await;
            }
        });

        // returns only after both producers are gone and every hook invocation has run
        dispatcher.start_handler().await;
        assert_eq!(total.load(Ordering::SeqCst), 10_000);
    }
}
