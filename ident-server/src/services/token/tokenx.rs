use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebkey as jwk;
use jsonwebtoken as jwt;
use tracing::{debug, error};

use ident_slo::{errors, Result};
use ident_storage::{
    key::{Keys, KEYS_ID},
    Interface, List,
};

use super::{Claims, Token};
use crate::services::key::jwk_to_public;

#[derive(Debug)]
pub struct AccessToken<T> {
    key_store: T,
    expire_sec: i64,
    aud: HashSet<String>,
    issuer: String,
}

impl<T> AccessToken<T> {
    /// `aud` is the set of audiences `verify` accepts; an empty set accepts
    /// tokens without an audience only.
    pub fn new(
        key_store: T,
        expire_sec: i64,
        aud: HashSet<String>,
        issuer: String,
    ) -> Self {
        Self {
            key_store,
            expire_sec,
            aud,
            issuer,
        }
    }

    pub fn expire_sec(&self) -> i64 {
        self.expire_sec
    }

    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

impl<T> AccessToken<T>
where
    T: Interface<T = Keys, L = ()>,
{
    async fn current_keys(&self) -> Result<Keys> {
        let mut output: List<Keys> = List::default();
        self.key_store.list(&(), &mut output).await.map_err(|err| {
            error!("failed to load signing keys: {}", err);
            errors::key_unavailable("key store is unreachable")
        })?;
        output
            .data
            .into_iter()
            .find(|keys| keys.id == KEYS_ID)
            .ok_or_else(|| {
                errors::key_unavailable("no signing key has been generated yet")
            })
    }
}

fn algorithm(alg: Option<jwk::Algorithm>) -> jwt::Algorithm {
    match alg {
        Some(jwk::Algorithm::HS256) => jwt::Algorithm::HS256,
        Some(jwk::Algorithm::ES256) => jwt::Algorithm::ES256,
        Some(jwk::Algorithm::RS256) => jwt::Algorithm::RS256,
        None => jwt::Algorithm::RS256,
    }
}

#[async_trait]
impl<T> Token for AccessToken<T>
where
    T: Interface<T = Keys, L = ()> + Send,
{
    async fn token(&self, claims: &Claims) -> Result<(String, i64)> {
        let keys = self.current_keys().await?;

        let now = self.now();

        let mut token_claims = claims.clone();
        token_claims.iat = now;
        token_claims.nbf = now;
        token_claims.exp = now + self.expire_sec;
        token_claims.iss = self.issuer.clone();

        let mut header = jwt::Header::new(algorithm(keys.signing_key.algorithm));
        header.kid = keys.signing_key.key_id.clone();

        let encoding_key = JwkKey(*keys.signing_key.key)
            .try_to_encoding_key()
            .map_err(|err| {
                error!("signing key can not be used: {}", err);
                errors::key_unavailable("signing key is corrupt")
            })?;
        let token = jwt::encode(&header, &token_claims, &encoding_key)
            .map_err(errors::any)?;
        Ok((token, token_claims.exp))
    }

    async fn verify(&self, token: &str) -> Result<Claims> {
        let keys = self.current_keys().await?;

        let header = jwt::decode_header(token)
            .map_err(|err| errors::forbidden(&format!("malformed token: {err}")))?;
        let kid = header
            .kid
            .ok_or_else(|| errors::forbidden("token has no key id"))?;

        let now = self.now();
        let vk = keys
            .verification_key(&kid)
            .filter(|vk| vk.expiry > now)
            .ok_or_else(|| errors::forbidden(&format!("unknown key id {kid}")))?;

        let alg = algorithm(vk.public_key.algorithm);
        if header.alg != alg {
            return Err(errors::forbidden("token algorithm does not match key"));
        }
        let mut validation = jwt::Validation::new(alg);
        validation.validate_nbf = true;
        if self.aud.is_empty() {
            validation.validate_aud = false;
            validation.set_required_spec_claims(&["exp", "sub"]);
        } else {
            validation.aud = Some(self.aud.clone());
            validation.set_required_spec_claims(&["exp", "sub", "aud"]);
        }
        if !self.issuer.is_empty() {
            validation.set_issuer(&[&self.issuer]);
        }

        let decoding_key =
            JwkKey(*vk.public_key.key.clone()).try_to_decoding_key()?;
        let claims =
            match jwt::decode::<Claims>(token, &decoding_key, &validation) {
                Ok(v) => v.claims,
                Err(err) => {
                    debug!(kid = %kid, "token rejected: {}", err);
                    return Err(errors::forbidden(&format!(
                        "invalid token: {err}"
                    )));
                }
            };
        if self.aud.is_empty() && claims.aud.is_some() {
            return Err(errors::forbidden("token is bound to an audience"));
        }
        Ok(claims)
    }
}

pub struct JwkKey<T>(pub T);

impl JwkKey<jwk::Key> {
    /// Returns an `EncodingKey` if the key is private.
    pub fn try_to_encoding_key(&self) -> Result<jwt::EncodingKey> {
        if !self.0.is_private() {
            return Err(errors::forbidden("key is not private"));
        }
        Ok(match &self.0 {
            jwk::Key::Symmetric { key } => {
                jwt::EncodingKey::from_secret(key.to_vec().as_slice())
            }
            jwk::Key::EC { .. } => jwt::EncodingKey::from_ec_pem(
                self.0.try_to_pem().map_err(errors::any)?.as_bytes(),
            )
            .map_err(errors::any)?,
            jwk::Key::RSA { .. } => {
                let pem = self.0.try_to_pem().map_err(errors::any)?;
                jwt::EncodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(errors::any)?
            }
        })
    }

    pub fn try_to_decoding_key(&self) -> Result<jwt::DecodingKey> {
        Ok(match &self.0 {
            jwk::Key::Symmetric { key } => {
                jwt::DecodingKey::from_secret(key.to_vec().as_slice())
            }
            jwk::Key::EC { .. } => {
                let public = jwk_to_public(Box::new(self.0.clone()))?;
                jwt::DecodingKey::from_ec_pem(
                    public.try_to_pem().map_err(errors::any)?.as_bytes(),
                )
                .map_err(errors::any)?
            }
            jwk::Key::RSA { .. } => {
                let public = jwk_to_public(Box::new(self.0.clone()))?;
                let pem = public.try_to_pem().map_err(errors::any)?;
                jwt::DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(errors::any)?
            }
        })
    }
}
