use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hivegate_core::UserId;

use crate::Role;

/// Claims the server puts into issued access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub role: Role,

    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a decodable JWT: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// Decode the claims of a token without checking its signature.
///
/// The signature is the server's concern; the client only reads the claims
/// to learn who it is and when the token stops being useful.
pub fn decode_unverified(token: &str) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenError::Malformed(e.to_string()))
}

/// Check the claims' time window against `now`.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    match claims.expires_at() {
        Some(expires_at) if now >= expires_at => Err(TokenError::Expired),
        _ => Ok(()),
    }
}
