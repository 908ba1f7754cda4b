//! The backend trait definitions.
//!
//! Backends implement [`RequestFlowDatabase`] and [`CardManagement`]; the API layer in [`crate::request_flow_api`]
//! and [`crate::matching_api`] is generic over them. The sqlite backend under [`crate::sqlite`] is the only
//! implementation in-tree.

mod card_management;
mod data_objects;
mod request_flow_database;

pub use card_management::{CardApiError, CardManagement};
pub use data_objects::{RolloverResult, SweepResult};
pub use request_flow_database::{RequestFlowDatabase, RequestFlowError};
