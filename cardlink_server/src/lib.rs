//! # Cardlink server
//! This module hosts the HTTP surface for the Cardlink engine. It is responsible for:
//! * Identifying callers from the gateway-injected identity headers.
//! * Exposing the request lifecycle, matching, card management and maintenance routes.
//! * Talking to the external ranking collaborator, with a circuit breaker in front of it.
//! * Running the background expiry sweep.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.

pub mod auth;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod integrations;
pub mod routes;
pub mod server;
