use axum::extract::FromRef;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::state::AppState;

/// Lifetime of a session token from the moment it is issued.
pub const SESSION_TTL: Duration = Duration::hours(1);

/// Payload carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid token claims")]
    InvalidClaims,
    #[error("failed to sign token")]
    Signing,
}

/// HMAC keys for minting and checking session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_secret(state.config.jwt.secret.as_bytes())
    }
}

impl SessionKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, user_id: i64, email: &str) -> Result<String, SessionError> {
        self.issue_at(user_id, email, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        user_id: i64,
        email: &str,
        now: OffsetDateTime,
    ) -> Result<String, SessionError> {
        let claims = SessionClaims {
            user_id,
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + SESSION_TTL).unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|_| SessionError::Signing)?;
        debug!(user_id, "session token issued");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Checks signature, algorithm and expiry against `now`.
    ///
    /// Only the HMAC family is accepted; a header naming any other
    /// algorithm fails as [`SessionError::InvalidSignature`] before the
    /// signature is looked at.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<SessionClaims, SessionError> {
        let header = decode_header(token).map_err(|_| SessionError::Malformed)?;
        if !matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(SessionError::InvalidSignature);
        }

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| classify(e.kind()))?;

        if now.unix_timestamp() >= data.claims.exp {
            return Err(SessionError::Expired);
        }
        debug!(user_id = data.claims.user_id, "session token verified");
        Ok(data.claims)
    }
}

fn classify(kind: &ErrorKind) -> SessionError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat => SessionError::InvalidSignature,
        ErrorKind::ExpiredSignature => SessionError::Expired,
        ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => SessionError::InvalidClaims,
        _ => SessionError::Malformed,
    }
}
