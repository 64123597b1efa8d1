//! Google Sign-In ID token verification.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Identity extracted from a verified provider credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    /// Every verification failure (network, signature, audience, expiry)
    /// collapses into this one kind.
    #[error("invalid identity credential")]
    InvalidCredential,
    #[error("identity credential is missing required claims")]
    MissingClaims,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    n: String,
    e: String,
}

/// Claims of interest in a Google ID token. Presence is checked after
/// decoding so an absent claim is reported as `MissingClaims`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GoogleClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl GoogleClaims {
    pub(crate) fn into_identity(self) -> Result<VerifiedIdentity, IdentityError> {
        fn required(v: Option<String>) -> Result<String, IdentityError> {
            v.filter(|s| !s.trim().is_empty())
                .ok_or(IdentityError::MissingClaims)
        }
        Ok(VerifiedIdentity {
            subject: required(self.sub)?,
            email: required(self.email)?,
            name: required(self.name)?,
        })
    }
}

pub struct GoogleIdentityVerifier {
    client: reqwest::Client,
    audience: String,
    certs_url: String,
}

impl GoogleIdentityVerifier {
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            audience: audience.into(),
            certs_url: GOOGLE_CERTS_URL.to_string(),
        }
    }

    async fn fetch_keys(&self) -> anyhow::Result<JwkSet> {
        let jwks = self
            .client
            .get(&self.certs_url)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(jwks)
    }

    async fn decode_claims(&self, credential: &str) -> anyhow::Result<GoogleClaims> {
        let header = decode_header(credential)?;
        anyhow::ensure!(header.alg == Algorithm::RS256, "unexpected algorithm {:?}", header.alg);
        let kid = header
            .kid
            .ok_or_else(|| anyhow::anyhow!("ID token header has no kid"))?;

        let jwks = self.fetch_keys().await?;
        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid.as_str()))
            .ok_or_else(|| anyhow::anyhow!("no signing key for kid {kid}"))?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        let data = decode::<GoogleClaims>(credential, &key, &validation)?;
        Ok(data.claims)
    }
}

#[async_trait]
impl IdentityVerifier for GoogleIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, IdentityError> {
        let claims = self.decode_claims(credential).await.map_err(|e| {
            warn!(error = %e, "google ID token rejected");
            IdentityError::InvalidCredential
        })?;
        let identity = claims.into_identity()?;
        debug!(subject = %identity.subject, "google identity verified");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_claims_become_identity() {
        let claims = GoogleClaims {
            sub: Some("1098".into()),
            email: Some("ann@example.com".into()),
            name: Some("Ann".into()),
        };
        assert_eq!(
            claims.into_identity(),
            Ok(VerifiedIdentity {
                subject: "1098".into(),
                email: "ann@example.com".into(),
                name: "Ann".into(),
            })
        );
    }

    #[test]
    fn absent_or_blank_claims_are_missing() {
        let no_name = GoogleClaims {
            sub: Some("1".into()),
            email: Some("a@b.c".into()),
            name: None,
        };
        assert_eq!(no_name.into_identity(), Err(IdentityError::MissingClaims));

        let blank_email = GoogleClaims {
            sub: Some("1".into()),
            email: Some("  ".into()),
            name: Some("A".into()),
        };
        assert_eq!(blank_email.into_identity(), Err(IdentityError::MissingClaims));

        assert_eq!(
            GoogleClaims::default().into_identity(),
            Err(IdentityError::MissingClaims)
        );
    }

    #[test]
    fn claims_decode_ignores_unknown_fields() {
        let claims: GoogleClaims = serde_json::from_str(
            r#"{"sub":"1","email":"a@b.c","email_verified":true,"picture":"x"}"#,
        )
        .unwrap();
        assert_eq!(claims.name, None);
        assert_eq!(claims.sub.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn malformed_credential_is_invalid_without_network() {
        let verifier = GoogleIdentityVerifier::new("client-id");
        assert_eq!(
            verifier.verify("not-a-jwt").await,
            Err(IdentityError::InvalidCredential)
        );
    }
}
