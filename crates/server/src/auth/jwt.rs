use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medidoc_core::{AccessContext, ActorRole};

/// Reasons a bearer token is rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("invalid role in token: {0}")]
    UnknownRole(String),

    #[error("token has no subject")]
    MissingSubject,

    #[error("JWT encoding failed: {0}")]
    Encoding(String),
}

/// JWT claims carried by session tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Actor identifier.
    pub sub: String,
    /// Role name (`administrator`, `hospital`, `doctor`, `patient`).
    pub role: String,
    /// Expiry (seconds since epoch).
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verifies `HS256` session tokens issued by the identity service.
///
/// Token issuance is only used by tooling and tests; sessions are normally
/// minted elsewhere with the same shared secret.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl JwtManager {
    pub fn new(secret: &str, issuer: Option<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
        }
    }

    /// Issue a token for `actor_id` acting as `role`.
    pub fn issue_token(
        &self,
        actor_id: &str,
        role: ActorRole,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: actor_id.to_owned(),
            role: role.to_string(),
            exp: jsonwebtoken::get_current_timestamp() + ttl.as_secs(),
            iss: self.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    /// Validate signature, expiry and issuer, and turn the claims into an
    /// [`AccessContext`] with no relationship facts yet.
    pub fn validate_token(&self, token: &str) -> Result<AccessContext, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::Invalid(e.to_string()))?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        let role = ActorRole::from_str_loose(&claims.role)
            .ok_or_else(|| AuthError::UnknownRole(claims.role.clone()))?;

        Ok(AccessContext::new(claims.sub, role))
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}
