//! Caller identity.
//!
//! The server sits behind the platform gateway, which authenticates users and injects their identity as headers on
//! every request: `x-cardlink-email`, `x-cardlink-name`, and `x-cardlink-admin` for operators. The extractor here
//! turns those headers into a [`Principal`]; a request without them is rejected with 401 before any handler runs.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use cl_common::parse_boolean_flag;
use log::*;

use crate::errors::ServerError;

pub const EMAIL_HEADER: &str = "x-cardlink-email";
pub const NAME_HEADER: &str = "x-cardlink-name";
pub const ADMIN_HEADER: &str = "x-cardlink-admin";

/// The authenticated caller, as asserted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl Principal {
    /// Guards the operator-only routes.
    pub fn require_admin(&self) -> Result<(), ServerError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions("This route is restricted to operators".to_string()))
        }
    }
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|v| v.to_str().ok()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl FromRequest for Principal {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match header_value(req, EMAIL_HEADER) {
            Some(email) => {
                let name = header_value(req, NAME_HEADER).unwrap_or_else(|| email.clone());
                let is_admin = parse_boolean_flag(header_value(req, ADMIN_HEADER), false);
                Ok(Principal { email, name, is_admin })
            },
            None => {
                debug!("💻️ Request without identity headers rejected");
                Err(ServerError::MissingIdentity)
            },
        };
        ready(result)
    }
}
