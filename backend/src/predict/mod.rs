pub mod client;
pub mod schema;

pub use client::PredictionClient;

use crate::auth::token_service::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("credentials rejected: {0}")]
    Auth(String),
    #[error("prediction service unreachable: {0}")]
    Network(String),
    #[error("prediction service error: {0}")]
    Remote(String),
}

impl From<TokenError> for PredictError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Network(msg) => PredictError::Network(msg),
            other => PredictError::Auth(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for PredictError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PredictError::Network(format!("timed out: {}", err))
        } else {
            PredictError::Network(err.to_string())
        }
    }
}
