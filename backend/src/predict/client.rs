use actix_web::rt::time;
use reqwest::{Client as HttpClient, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::schema::{PredictRequest, PredictResponseBody};
use super::PredictError;
use crate::auth::token_service::TokenService;
use crate::config::ModelPath;
use crate::preprocess::ImageTensor;

/// Shared HTTP client for the prediction and token endpoints. Every call
/// made through it is bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<HttpClient, reqwest::Error> {
    HttpClient::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}

/// Calls the remote model's `:predict` method. Cheap to clone; clones share
/// the connection pool and token cache.
#[derive(Clone)]
pub struct PredictionClient {
    http_client: HttpClient,
    tokens: Arc<TokenService>,
    predict_url: Url,
    resource: String,
    timeout: Duration,
}

impl PredictionClient {
    pub fn new(
        http_client: HttpClient,
        tokens: Arc<TokenService>,
        endpoint: &str,
        model_path: &ModelPath,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        let resource = model_path.resource_name();
        let predict_url = Url::parse(&format!(
            "{}/v1/{}:predict",
            endpoint.trim_end_matches('/'),
            resource
        ))?;

        Ok(Self {
            http_client,
            tokens,
            predict_url,
            resource,
            timeout,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Sends one instance and returns its score vector. No retries.
    ///
    /// The whole call, token included, finishes within `timeout`, even when
    /// other requests are queued on the same token refresh.
    pub async fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f32>, PredictError> {
        time::timeout(self.timeout, self.call(tensor))
            .await
            .map_err(|_| PredictError::Network(format!("no answer within {:?}", self.timeout)))?
    }

    async fn call(&self, tensor: &ImageTensor) -> Result<Vec<f32>, PredictError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http_client
            .post(self.predict_url.clone())
            .bearer_auth(&token)
            .json(&PredictRequest::single(tensor))
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.tokens.invalidate(&token).await;
            return Err(PredictError::Auth(format!(
                "{} rejected the access token ({})",
                self.resource, status
            )));
        }
        if !status.is_success() {
            let detail = PredictResponseBody::parse(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
            return Err(PredictError::Remote(format!("status {}: {}", status, detail)));
        }

        PredictResponseBody::parse(&body)?.single_scores()
    }
}
