use chrono::{DateTime, Duration, Utc};
use reqwest::Client as HttpClient;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::jwt::{AssertionSigner, JwtError};
use super::models::TokenResponse;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Tokens are refreshed this long before the issuer says they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token endpoint unreachable: {0}")]
    Network(String),
    #[error("token request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected token response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        TokenError::Network(err.to_string())
    }
}

pub enum TokenSource {
    Static(String),
    ServiceAccount(AssertionSigner),
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Hands out bearer tokens for the prediction API, exchanging a signed
/// assertion for a new one whenever the cached token is about to expire.
pub struct TokenService {
    http_client: HttpClient,
    source: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenService {
    pub fn new(http_client: HttpClient, source: TokenSource) -> Self {
        Self {
            http_client,
            source,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, TokenError> {
        let signer = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount(signer) => signer,
        };

        // Held across the exchange so concurrent requests share one refresh.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        log::debug!("Requesting access token for {}", signer.client_email());
        let fetched = self.exchange_assertion(signer).await?;
        let access_token = fetched.access_token.clone();
        *cached = Some(CachedToken {
            access_token: fetched.access_token,
            expires_at: Utc::now() + Duration::seconds(fetched.expires_in as i64),
        });
        log::info!("Obtained access token valid for {}s", fetched.expires_in);

        Ok(access_token)
    }

    /// Forgets `rejected` if it is still the cached token, so the next call
    /// exchanges a fresh assertion. A newer token cached meanwhile is kept.
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|t| t.access_token == rejected) {
            log::warn!("Dropping access token rejected by the prediction service");
            *cached = None;
        }
    }

    async fn exchange_assertion(&self, signer: &AssertionSigner) -> Result<TokenResponse, TokenError> {
        let assertion = signer.sign_assertion()?;

        let mut params = HashMap::new();
        params.insert("grant_type", JWT_BEARER_GRANT);
        params.insert("assertion", assertion.as_str());

        let response = self
            .http_client
            .post(signer.token_uri())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice::<TokenResponse>(&body).map_err(|e| TokenError::Malformed(e.to_string()))
    }
}
