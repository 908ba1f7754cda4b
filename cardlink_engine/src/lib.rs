//! Cardlink Engine
//!
//! The Cardlink engine matches shoppers' carts against other people's discount cards, and runs the payment request
//! lifecycle that settles a commission to the cardholder when the discounted order completes. This library contains
//! the core logic for the engine. It is provider-agnostic.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the only backend in-tree. You should never need
//!    to access the database directly. Instead, use the public API provided by the engine. The exception is the
//!    data types used in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`RequestFlowApi`] and [`MatchingApi`]). These are generic over the backend traits in
//!    [`mod@traits`], and provide request creation with trust scoring, the lifecycle transitions, card matching and
//!    the expiry sweep.
//! 3. The trust engine ([`mod@trust`]), a pure function over a shopper's request history that produces the trust
//!    report attached to every new request.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted when a request is
//! created, accepted, annulled or completed. A simple actor framework is used so that you can easily hook into
//! these events and perform custom actions.
pub mod db_types;
pub mod events;
pub mod matching;
mod matching_api;
mod request_flow_api;
pub mod traits;
pub mod trust;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use matching_api::MatchingApi;
pub use request_flow_api::RequestFlowApi;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
