use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::ingest::IngestError;
use crate::interpret::SchemaError;
use crate::predict::PredictError;
use crate::preprocess::DecodeError;

/// Every way a `/predict` request can fail, one variant per failure kind.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid upload: {0}")]
    Ingest(#[from] IngestError),
    #[error("invalid image: {0}")]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    Remote(String),
    #[error("model output does not match the class list: {0}")]
    Schema(#[from] SchemaError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PredictError> for PipelineError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Auth(_) => PipelineError::Auth(err.to_string()),
            PredictError::Network(_) => PipelineError::Network(err.to_string()),
            PredictError::Remote(_) => PipelineError::Remote(err.to_string()),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Ingest(_) => "IngestError",
            PipelineError::Decode(_) => "DecodeError",
            PipelineError::Auth(_) => "AuthError",
            PipelineError::Network(_) => "NetworkError",
            PipelineError::Remote(_) => "RemoteError",
            PipelineError::Schema(_) => "SchemaError",
            PipelineError::Internal(_) => "InternalError",
        }
    }

    /// Text sent to the caller. Upstream credential problems and internal
    /// failures are only described in the logs.
    fn client_message(&self) -> String {
        match self {
            PipelineError::Auth(_) => "prediction service rejected the gateway credentials".to_string(),
            PipelineError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Ingest(_) | PipelineError::Decode(_) => StatusCode::BAD_REQUEST,
            PipelineError::Auth(_) | PipelineError::Remote(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Network(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Schema(_) | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.client_message(),
        })
    }
}
