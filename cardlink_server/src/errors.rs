use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use cardlink_engine::traits::{CardApiError, RequestFlowError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Caller identity headers are missing or unreadable.")]
    MissingIdentity,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request cannot move to that state. {0}")]
    StateConflict(String),
    #[error("The request deadline has passed. {0}")]
    RequestExpired(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdentity => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::RequestExpired(_) => StatusCode::GONE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<RequestFlowError> for ServerError {
    fn from(e: RequestFlowError) -> Self {
        match e {
            RequestFlowError::RequestNotFound(_) | RequestFlowError::OrderNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            RequestFlowError::NotYourRequest => Self::InsufficientPermissions(e.to_string()),
            RequestFlowError::InvalidStateTransition { .. } |
            RequestFlowError::RequestAlreadyExists(_) |
            RequestFlowError::OpenRequestForOrder(_) => Self::StateConflict(e.to_string()),
            RequestFlowError::RequestExpired(_) => Self::RequestExpired(e.to_string()),
            RequestFlowError::InvalidRequest(_) => Self::InvalidRequestBody(e.to_string()),
            RequestFlowError::CardError(e) => e.into(),
            RequestFlowError::RankingUnavailable(_) | RequestFlowError::DatabaseError(_) => {
                Self::BackendError(e.to_string())
            },
        }
    }
}

impl From<CardApiError> for ServerError {
    fn from(e: CardApiError) -> Self {
        match e {
            CardApiError::CardholderNotFound(_) | CardApiError::CardNotFound(_) => Self::NoRecordFound(e.to_string()),
            CardApiError::NotCardOwner(_) => Self::InsufficientPermissions(e.to_string()),
            CardApiError::InvalidCard(_) => Self::InvalidRequestBody(e.to_string()),
            CardApiError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}
