//! Settlement dispatch — reports completed trades to the external backend.
//!
//! DESIGN
//! ======
//! Thin HTTP wrapper around the settlement endpoint. The trade pair is
//! already removed by the time this runs; the response status drives
//! logging only (fire-and-report). Claim and body construction are pure
//! functions for testability.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::services::invite::UserId;
use crate::services::trade::{TradePair, UserTradeInfo};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Bearer tokens are minted per dispatch and expire after one hour.
const TOKEN_TTL_SECS: u64 = 3600;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("failed to build settlement http client: {0}")]
    HttpClientBuild(String),
    #[error("invalid settlement signing key: {0}")]
    SigningKey(String),
    #[error("failed to sign settlement token: {0}")]
    TokenSign(String),
    #[error("settlement request failed: {0}")]
    Request(String),
    #[error("settlement endpoint returned status {status}")]
    Endpoint { status: u16 },
}

/// Bearer token payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementClaims {
    pub user_ids: [UserId; 2],
    pub exp: u64,
}

/// POST body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementRequest<'a> {
    trade_info: [&'a UserTradeInfo; 2],
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct SettlementClient {
    http: reqwest::Client,
    endpoint: String,
    signing_key: EncodingKey,
}

impl std::fmt::Debug for SettlementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl SettlementClient {
    /// Build a client for `endpoint`, signing bearer tokens with the RS256
    /// PEM `private_key_pem`.
    ///
    /// # Errors
    ///
    /// Fails when the key does not parse or the HTTP client cannot be built.
    pub fn new(endpoint: String, private_key_pem: &str) -> Result<Self, SettlementError> {
        let signing_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| SettlementError::SigningKey(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SettlementError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, endpoint, signing_key })
    }

    /// POST the completed pair to the settlement endpoint.
    ///
    /// # Errors
    ///
    /// Fails on signing, transport, or non-2xx status. The caller only logs
    /// the outcome; the trade is already final.
    pub async fn perform_trade(&self, pair: &TradePair) -> Result<(), SettlementError> {
        let token = self.bearer_token(pair, now_secs() + TOKEN_TTL_SECS)?;
        let body = SettlementRequest { trade_info: [&pair.a, &pair.b] };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SettlementError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SettlementError::Endpoint { status: status.as_u16() });
        }
        Ok(())
    }

    /// Sign the bearer token binding this dispatch to the two users.
    fn bearer_token(&self, pair: &TradePair, exp: u64) -> Result<String, SettlementError> {
        let claims = settlement_claims(pair, exp);
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| SettlementError::TokenSign(e.to_string()))
    }
}

/// Claims for the settlement bearer token.
#[must_use]
pub fn settlement_claims(pair: &TradePair, exp: u64) -> SettlementClaims {
    SettlementClaims { user_ids: [pair.a.user_id.clone(), pair.b.user_id.clone()], exp }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "settlement_test.rs"]
mod tests;
