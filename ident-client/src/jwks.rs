use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::VerifyError;

/// Fetches and caches a JWKS document. The cache is refreshed once when a
/// token names a `kid` it does not contain.
#[derive(Debug)]
pub struct JwksClient {
    http: reqwest::Client,
    url: String,
    cache: RwLock<Option<JwkSet>>,
}

impl JwksClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<JwkSet, VerifyError> {
        debug!(url = %self.url, "fetching key set");
        let set: JwkSet = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        *self.cache.write().await = Some(set.clone());
        Ok(set)
    }

    pub async fn key(&self, kid: &str) -> Result<Jwk, VerifyError> {
        if let Some(jwk) = self
            .cache
            .read()
            .await
            .as_ref()
            .and_then(|set| set.find(kid))
        {
            return Ok(jwk.clone());
        }
        self.fetch()
            .await?
            .find(kid)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownKey(kid.to_owned()))
    }
}
