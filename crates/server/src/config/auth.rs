use serde::Deserialize;

/// Environment variable consulted when `auth.jwt_secret` is not set.
pub const JWT_SECRET_ENV: &str = "MEDIDOC_JWT_SECRET";

/// Bearer token verification settings.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify `HS256` bearer tokens.
    pub jwt_secret: Option<String>,

    /// Expected `iss` claim. Not checked when unset.
    pub issuer: Option<String>,
}

impl AuthConfig {
    /// The configured secret, falling back to [`JWT_SECRET_ENV`].
    pub fn resolve_secret(&self) -> Option<String> {
        self.jwt_secret
            .clone()
            .or_else(|| std::env::var(JWT_SECRET_ENV).ok())
            .filter(|s| !s.is_empty())
    }
}
