use cardlink_engine::{db_types::PaymentRequest, events::EventProducers, RequestFlowApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the request expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The sweep is also run opportunistically from the read paths, so this worker is a backstop: it bounds how long a
/// request can sit past its deadline when nobody is polling. Running both concurrently is safe, since the sweep only
/// ever touches requests that are still pending.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    commission_bps: i64,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let api = RequestFlowApi::new(db, commission_bps, producers);
        info!("🕰️ Request expiry worker started (every {interval_secs}s)");
        loop {
            timer.tick().await;
            trace!("🕰️ Running request expiry sweep");
            match api.expire_overdue_requests().await {
                Ok(result) if result.is_empty() => {},
                Ok(result) => {
                    info!("🕰️ {} request(s) expired", result.count());
                    debug!("🕰️ Expired requests: {}", request_list(&result.expired));
                },
                Err(e) => {
                    error!("🕰️ Error running request expiry sweep: {e}");
                },
            }
        }
    })
}

fn request_list(requests: &[PaymentRequest]) -> String {
    requests
        .iter()
        .map(|r| format!("[{}] order_id: {} requester: {}", r.request_id, r.order_id, r.requester.email))
        .collect::<Vec<String>>()
        .join(", ")
}
