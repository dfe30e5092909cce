mod tokenx;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use ident_slo::Result;

pub use tokenx::{AccessToken, JwkKey};

/// Signs and checks JWTs with the installation's key store.
#[automock]
#[async_trait]
pub trait Token: Send + Sync {
    /// Signs `claims`, overriding the temporal claims and the issuer.
    /// Returns the compact token and its expiry.
    async fn token(&self, claims: &Claims) -> Result<(String, i64)>;
    async fn verify(&self, token: &str) -> Result<Claims>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}
