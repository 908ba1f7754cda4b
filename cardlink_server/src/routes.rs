//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g.
//! I/O, database operations, etc.) should be expressed as futures or asynchronous functions, which get executed
//! concurrently by worker threads.
use std::str::FromStr;

use actix_web::{get, web, HttpResponse, Responder};
use cardlink_engine::{
    db_types::{NewCard, NewPaymentRequest, OrderId, RequestId, Requester},
    matching::RankingService,
    traits::{CardManagement, RequestFlowDatabase},
    MatchingApi,
    RequestFlowApi,
};
use log::*;

use crate::{
    auth::Principal,
    data_objects::{
        CardRegistrationParams,
        DeclineParams,
        HistoryResponse,
        MatchParams,
        NewRequestParams,
        RolloverResponse,
        SweepResponse,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//--------------------------------------------   Lifecycle  ----------------------------------------------------

route!(create_request => Post "/requests" impl RequestFlowDatabase);
/// Create a new payment request for the shopper identified by the gateway headers. The trust report is evaluated
/// and attached server-side, and the commission is computed from the configured rate.
pub async fn create_request<B: RequestFlowDatabase>(
    principal: Principal,
    body: web::Json<NewRequestParams>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received create request from {}", principal.email);
    let params = body.into_inner();
    let new_request = NewPaymentRequest {
        order_id: params.order_id,
        requester: Requester { id: principal.email.clone(), name: principal.name, email: principal.email },
        line_items: params.line_items,
        discount_amount: params.discount_amount,
        card_id: params.card_id,
        cardholder_email: params.cardholder_email,
        mode: params.mode,
        city: params.city,
        device_type: params.device_type,
    };
    let request = api.create_request(new_request).await?;
    Ok(HttpResponse::Created().json(request))
}

route!(incoming_requests => Get "/requests/incoming" impl RequestFlowDatabase);
/// Pending requests addressed to the calling cardholder.
pub async fn incoming_requests<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let requests = api.incoming_requests(&principal.email).await?;
    Ok(HttpResponse::Ok().json(requests))
}

route!(my_requests => Get "/requests/mine" impl RequestFlowDatabase);
/// Every request the calling shopper has created.
pub async fn my_requests<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let requests = api.requests_for_requester(&principal.email).await?;
    Ok(HttpResponse::Ok().json(requests))
}

route!(closed_requests => Get "/requests/closed" impl RequestFlowDatabase);
/// Terminal requests addressed to the calling cardholder.
pub async fn closed_requests<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let requests = api.closed_requests(&principal.email).await?;
    Ok(HttpResponse::Ok().json(requests))
}

route!(settled_requests => Get "/requests/settled" impl RequestFlowDatabase);
/// Settled requests addressed to the calling cardholder.
pub async fn settled_requests<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let requests = api.settled_requests(&principal.email).await?;
    Ok(HttpResponse::Ok().json(requests))
}

route!(my_history => Get "/requests/history" impl RequestFlowDatabase);
/// The calling shopper's request history with a freshly-evaluated trust report.
pub async fn my_history<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (requests, trust_report) = api.requester_history(&principal.email).await?;
    Ok(HttpResponse::Ok().json(HistoryResponse { requests, trust_report }))
}

route!(accept_request => Post "/requests/{id}/accept" impl RequestFlowDatabase);
pub async fn accept_request<B: RequestFlowDatabase>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = request_id(&path)?;
    let request = api.accept_request(&id, &principal.email).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(decline_request => Post "/requests/{id}/decline" impl RequestFlowDatabase);
pub async fn decline_request<B: RequestFlowDatabase>(
    principal: Principal,
    path: web::Path<String>,
    body: Option<web::Json<DeclineParams>>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = request_id(&path)?;
    let reason = body.and_then(|b| b.into_inner().reason);
    let request = api.decline_request(&id, &principal.email, reason.as_deref()).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(cancel_request => Post "/requests/{id}/cancel" impl RequestFlowDatabase);
pub async fn cancel_request<B: RequestFlowDatabase>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = request_id(&path)?;
    let request = api.cancel_request(&id, &principal.email).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(order_status => Get "/orders/{order_id}/status" impl RequestFlowDatabase);
/// The current request correlated with an external order. Used by the checkout collaborator to poll progress.
pub async fn order_status<B: RequestFlowDatabase>(
    _principal: Principal,
    path: web::Path<String>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let request = api.status_for_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(order_finalized => Post "/orders/{order_id}/finalized" impl RequestFlowDatabase);
/// The checkout collaborator reports the order finalised: settle the accepted request and the ledger. Operator
/// credentials are required, since this moves money.
pub async fn order_finalized<B: RequestFlowDatabase>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    principal.require_admin()?;
    let order_id = OrderId(path.into_inner());
    let request = api.complete_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(request))
}

//--------------------------------------------   Matching  -----------------------------------------------------

route!(match_cards => Post "/match" impl RequestFlowDatabase, RankingService);
/// Candidate cards for a cart, best-first. Falls back to the local heuristic when the ranking collaborator is
/// unavailable; the response shape is identical either way.
pub async fn match_cards<B: RequestFlowDatabase, R: RankingService>(
    _principal: Principal,
    body: web::Json<MatchParams>,
    api: web::Data<MatchingApi<B, R>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let candidates = api.match_cards(&params.line_items, params.mode).await?;
    Ok(HttpResponse::Ok().json(candidates))
}

//----------------------------------------------   Cards  ------------------------------------------------------

route!(register_card => Post "/cards" impl RequestFlowDatabase);
pub async fn register_card<B: RequestFlowDatabase>(
    principal: Principal,
    body: web::Json<CardRegistrationParams>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    let card = NewCard {
        last_four: params.last_four,
        bank_name: params.bank_name,
        card_type: params.card_type,
        categories: params.categories,
        discount_pct: params.discount_pct,
        monthly_limit: params.monthly_limit,
    };
    // registering a card implies having a profile
    api.db().upsert_cardholder(&principal.email, &principal.name).await?;
    let card = api.db().register_card(&principal.email, card).await?;
    Ok(HttpResponse::Created().json(card))
}

route!(my_cards => Get "/cards" impl RequestFlowDatabase);
pub async fn my_cards<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let cards = api.db().fetch_cards(&principal.email).await?;
    Ok(HttpResponse::Ok().json(cards))
}

route!(deactivate_card => Delete "/cards/{card_id}" impl RequestFlowDatabase);
pub async fn deactivate_card<B: RequestFlowDatabase>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let card = api.db().deactivate_card(&principal.email, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(card))
}

route!(heartbeat => Post "/heartbeat" impl RequestFlowDatabase);
/// Presence ping. Creates the cardholder profile on first contact; the caller counts as online for matching for
/// the freshness window after this call.
pub async fn heartbeat<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    api.db().upsert_cardholder(&principal.email, &principal.name).await?;
    api.db().record_heartbeat(&principal.email, chrono::Utc::now()).await?;
    Ok(HttpResponse::Ok().finish())
}

route!(my_profile => Get "/profile" impl RequestFlowDatabase);
/// The calling cardholder's profile, including the earnings ledger balances.
pub async fn my_profile<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let profile = api
        .db()
        .fetch_cardholder(&principal.email)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No profile for {}", principal.email)))?;
    Ok(HttpResponse::Ok().json(profile))
}

//--------------------------------------------   Maintenance  --------------------------------------------------

route!(sweep => Post "/maintenance/sweep" impl RequestFlowDatabase);
/// Run the expiry sweep now. The background worker calls the same engine operation; this route exists for
/// operators and tests.
pub async fn sweep<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    principal.require_admin()?;
    let result = api.expire_overdue_requests().await?;
    let request_ids = result.expired.iter().map(|r| r.request_id.as_str().to_string()).collect();
    Ok(HttpResponse::Ok().json(SweepResponse { expired: result.count(), request_ids }))
}

route!(rollover => Post "/maintenance/rollover" impl RequestFlowDatabase);
/// Month-end reset of month-to-date earnings and card spend counters.
pub async fn rollover<B: RequestFlowDatabase>(
    principal: Principal,
    api: web::Data<RequestFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    principal.require_admin()?;
    let result = api.db().rollover_month().await?;
    Ok(HttpResponse::Ok().json(RolloverResponse {
        cardholders_reset: result.cardholders_reset,
        cards_reset: result.cards_reset,
    }))
}

fn request_id(path: &str) -> Result<RequestId, ServerError> {
    RequestId::from_str(path).map_err(|_| ServerError::InvalidRequestPath(path.to_string()))
}
