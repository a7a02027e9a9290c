//! Access token derivation
//!
//! Every authenticated request carries an access token derived from the
//! job's long-lived secret. The token is a base64-encoded JSON document:
//!
//! ```json
//! {"alg": "sha256", "payload": {"encoded": "<hex digest>", "decoded": {"id": "<job id>", "date": 475000}}}
//! ```
//!
//! where the digest is `H(secret || id || date)` and `date` is the Unix time
//! divided by the freshness window. Tokens are recomputed on every call and
//! never cached.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// Default freshness window: one hour
pub const DEFAULT_FRESHNESS_SECS: u64 = 3600;

/// Errors for token operations
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token manager not initialized")]
    NotInitialized,

    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Malformed access token: {0}")]
    Malformed(String),

    #[error("Failed to encode access token: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Produces the digest part of an access token.
pub trait TokenSigner: Send + Sync {
    /// Algorithm name placed in the token's `alg` field
    fn algorithm(&self) -> &str;

    /// Hex digest over the secret, job id and freshness date
    fn sign(&self, job_id: &str, secret: &str, date: i64) -> String;
}

/// Built-in digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(TokenError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TokenSigner for DigestAlgorithm {
    fn algorithm(&self) -> &str {
        self.as_str()
    }

    fn sign(&self, job_id: &str, secret: &str, date: i64) -> String {
        let input = format!("{}{}{}", secret, job_id, date);
        match self {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(input.as_bytes())),
        }
    }
}

/// Decoded access token document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub alg: String,
    pub payload: TokenPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Hex digest
    pub encoded: String,
    pub decoded: TokenSubject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    pub id: String,
    pub date: i64,
}

impl AccessTokenClaims {
    /// Encode as the wire token string
    pub fn encode(&self) -> Result<String, TokenError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a wire token string
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(e.to_string()))
    }

    /// Check the digest against a known secret
    pub fn verify(&self, signer: &dyn TokenSigner, secret: &str) -> bool {
        self.alg == signer.algorithm()
            && self.payload.encoded
                == signer.sign(&self.payload.decoded.id, secret, self.payload.decoded.date)
    }
}

struct Credentials {
    signer: Arc<dyn TokenSigner>,
    job_id: String,
    secret: String,
}

/// Mints access tokens for one job
pub struct AccessTokenManager {
    credentials: Option<Credentials>,
    freshness_secs: u64,
}

impl AccessTokenManager {
    /// Create an uninitialized manager
    pub fn new(freshness_secs: u64) -> Self {
        Self {
            credentials: None,
            freshness_secs: freshness_secs.max(1),
        }
    }

    /// Configure the algorithm and signing inputs
    pub fn initialize(&mut self, algorithm: DigestAlgorithm, job_id: &str, secret: &str) {
        self.initialize_with(Arc::new(algorithm), job_id, secret);
    }

    /// Configure a custom signer
    pub fn initialize_with(&mut self, signer: Arc<dyn TokenSigner>, job_id: &str, secret: &str) {
        self.credentials = Some(Credentials {
            signer,
            job_id: job_id.to_string(),
            secret: secret.to_string(),
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.credentials.is_some()
    }

    /// Token for the current time
    pub fn access_token(&self) -> Result<String, TokenError> {
        self.access_token_at(Utc::now().timestamp())
    }

    /// Token for a given Unix time in seconds
    pub fn access_token_at(&self, unix_secs: i64) -> Result<String, TokenError> {
        let creds = self.credentials.as_ref().ok_or(TokenError::NotInitialized)?;
        let date = freshness_date(unix_secs, self.freshness_secs);

        let claims = AccessTokenClaims {
            alg: creds.signer.algorithm().to_string(),
            payload: TokenPayload {
                encoded: creds.signer.sign(&creds.job_id, &creds.secret, date),
                decoded: TokenSubject {
                    id: creds.job_id.clone(),
                    date,
                },
            },
        };
        claims.encode()
    }
}

impl Default for AccessTokenManager {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_SECS)
    }
}

impl fmt::Debug for AccessTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenManager")
            .field("algorithm", &self.credentials.as_ref().map(|c| c.signer.algorithm().to_string()))
            .field("job_id", &self.credentials.as_ref().map(|c| c.job_id.as_str()))
            .field("secret", &"<redacted>")
            .field("freshness_secs", &self.freshness_secs)
            .finish()
    }
}

/// Bucket a Unix time into a freshness window
pub fn freshness_date(unix_secs: i64, window_secs: u64) -> i64 {
    unix_secs.div_euclid(window_secs.max(1) as i64)
}
