use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use cardlink_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    MatchingApi,
    RequestFlowApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    integrations::RankingBackend,
    routes::{
        health,
        AcceptRequestRoute,
        CancelRequestRoute,
        ClosedRequestsRoute,
        CreateRequestRoute,
        DeactivateCardRoute,
        DeclineRequestRoute,
        HeartbeatRoute,
        IncomingRequestsRoute,
        MatchCardsRoute,
        MyCardsRoute,
        MyHistoryRoute,
        MyProfileRoute,
        MyRequestsRoute,
        OrderFinalizedRoute,
        OrderStatusRoute,
        RegisterCardRoute,
        RolloverRoute,
        SettledRequestsRoute,
        SweepRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(25, audit_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let _sweeper = start_expiry_worker(db.clone(), producers.clone(), config.commission_bps, config.sweep_interval_secs);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// The settlement audit trail. Every settled request is written to the log with the amounts that moved, so the
/// ledger can be reconciled from the logs alone.
fn audit_hooks() -> EventHooks {
    EventHooks {
        on_request_completed: Some(Arc::new(|event| {
            Box::pin(async move {
                let r = &event.request;
                info!(
                    target: "cardlink::settlements",
                    "📬️ Request {} settled for order {}. {} paid on card {}, commission {} to {}",
                    r.request_id, r.order_id, r.total_payable, r.card_id, r.commission_amount, r.cardholder_email
                );
            })
        })),
        ..EventHooks::default()
    }
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let bind_to = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let flow_api = RequestFlowApi::new(db.clone(), config.commission_bps, producers.clone());
        let ranking = RankingBackend::from_config(&config.ranking);
        let matching_api = MatchingApi::new(db.clone(), ranking);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("cardlink::access_log"))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(matching_api));
        let api_scope = web::scope("/api")
            .service(CreateRequestRoute::<SqliteDatabase>::new())
            .service(IncomingRequestsRoute::<SqliteDatabase>::new())
            .service(MyRequestsRoute::<SqliteDatabase>::new())
            .service(ClosedRequestsRoute::<SqliteDatabase>::new())
            .service(SettledRequestsRoute::<SqliteDatabase>::new())
            .service(MyHistoryRoute::<SqliteDatabase>::new())
            .service(AcceptRequestRoute::<SqliteDatabase>::new())
            .service(DeclineRequestRoute::<SqliteDatabase>::new())
            .service(CancelRequestRoute::<SqliteDatabase>::new())
            .service(OrderStatusRoute::<SqliteDatabase>::new())
            .service(OrderFinalizedRoute::<SqliteDatabase>::new())
            .service(MatchCardsRoute::<SqliteDatabase, RankingBackend>::new())
            .service(RegisterCardRoute::<SqliteDatabase>::new())
            .service(MyCardsRoute::<SqliteDatabase>::new())
            .service(DeactivateCardRoute::<SqliteDatabase>::new())
            .service(HeartbeatRoute::<SqliteDatabase>::new())
            .service(MyProfileRoute::<SqliteDatabase>::new())
            .service(SweepRoute::<SqliteDatabase>::new())
            .service(RolloverRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_to)?
    .run();
    Ok(srv)
}
