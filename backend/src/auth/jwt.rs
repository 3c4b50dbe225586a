use super::models::{AssertionClaims, ServiceAccountKey, CLOUD_PLATFORM_SCOPE};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("invalid service account key: {0}")]
    KeyFile(String),
    #[error("invalid RSA private key: {0}")]
    PrivateKey(jsonwebtoken::errors::Error),
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Signs the self-issued assertion traded for an access token.
#[derive(Clone)]
pub struct AssertionSigner {
    encoding_key: EncodingKey,
    key_id: Option<String>,
    client_email: String,
    token_uri: String,
}

impl AssertionSigner {
    pub fn new(key: &ServiceAccountKey) -> Result<Self, JwtError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(JwtError::PrivateKey)?;

        Ok(Self {
            encoding_key,
            key_id: key.private_key_id.clone(),
            client_email: key.client_email.clone(),
            token_uri: key.token_uri.clone(),
        })
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn sign_assertion(&self) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now + Duration::hours(1);

        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        encode(&header, &claims, &self.encoding_key).map_err(JwtError::Encoding)
    }
}
