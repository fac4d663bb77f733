//! Credential checks and JWT handling for the control API.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::env;

use crate::agent::AgentHandle;

/// Environment variable holding the token signing secret.
pub const JWT_SECRET_ENV: &str = "AUTODROP_JWT_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    /// Grants the control capability.
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub admin: bool,
}

#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Validate credentials. Returns the user if valid.
    async fn validate(&self, username: &str, password: &str) -> Option<AuthenticatedUser>;
}

/// Users from the `[web]` section of the live configuration.
pub struct ConfigAuthBackend {
    agent: AgentHandle,
}

impl ConfigAuthBackend {
    pub fn new(agent: AgentHandle) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl AuthBackend for ConfigAuthBackend {
    async fn validate(&self, username: &str, password: &str) -> Option<AuthenticatedUser> {
        let config = self.agent.config();
        config
            .web
            .users
            .iter()
            .find(|user| user.username == username && user.password == password)
            .map(|user| AuthenticatedUser { username: user.username.clone(), admin: user.admin })
    }
}

/// Signing secret and lifetime of issued tokens.
#[derive(Clone)]
pub struct JwtKeys {
    secret: Vec<u8>,
    expiration: i64,
}

impl JwtKeys {
    pub fn new(secret: impl Into<Vec<u8>>, expiration: i64) -> Self {
        Self { secret: secret.into(), expiration }
    }

    /// Secret from the environment, or a development default.
    pub fn from_env(expiration: i64) -> Self {
        let secret = env::var(JWT_SECRET_ENV).map(String::into_bytes).unwrap_or_else(|_| {
            tracing::warn!("{} not set, using the development secret", JWT_SECRET_ENV);
            b"autodrop_dev_secret_change_me".to_vec()
        });
        Self::new(secret, expiration)
    }

    pub fn issue(&self, user: &AuthenticatedUser) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now().timestamp() + self.expiration).max(0) as usize;
        let claims = Claims { sub: user.username.clone(), exp, admin: user.admin };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let keys = JwtKeys::new("secret", 60);
        let user = AuthenticatedUser { username: "admin".into(), admin: true };
        let claims = keys.verify(&keys.issue(&user).unwrap()).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.admin);
    }

    #[test]
    fn test_rejects_foreign_and_expired_tokens() {
        let keys = JwtKeys::new("secret", 60);
        let other = JwtKeys::new("other", 60);
        let user = AuthenticatedUser { username: "viewer".into(), admin: false };
        assert!(other.verify(&keys.issue(&user).unwrap()).is_err());
        let expired = JwtKeys::new("secret", -3600);
        assert!(keys.verify(&expired.issue(&user).unwrap()).is_err());
    }
}
