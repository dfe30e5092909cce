use chrono::Utc;
use jsonwebkey as jwk;
use rand::Rng;
use rsa::{
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use ident_slo::{errors, Result};
use ident_storage::{
    key::{Keys, VerificationKey, KEYS_ID},
    Interface, KeyInterface, List,
};

const RSA_BITS: usize = 2048;
const KID_LEN: usize = 40;
/// Lower bound for the JWKS `max-age`, so relying parties never hammer the
/// endpoint right before a rotation.
const MIN_MAX_AGE: i64 = 120;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JsonWebKeySet {
    pub keys: Vec<jwk::JsonWebKey>,
}

impl JsonWebKeySet {
    /// Collects every still published public key.
    pub fn published(records: &[Keys], now: i64) -> Self {
        Self {
            keys: records
                .iter()
                .flat_map(|keys| keys.published(now).cloned())
                .collect(),
        }
    }
}

/// Seconds a relying party may cache the key set: until the earliest next
/// rotation, never less than two minutes.
pub fn max_age(records: &[Keys], now: i64) -> i64 {
    records
        .iter()
        .map(|keys| keys.next_rotation - now)
        .min()
        .map_or(MIN_MAX_AGE, |age| age.max(MIN_MAX_AGE))
}

#[derive(Clone, Debug)]
pub struct KeyRotator<S> {
    store: S,
    strategy: RotationStrategy,
}

#[derive(Clone, Copy, Debug)]
pub struct RotationStrategy {
    /// Seconds between two signing keys.
    pub rotation_frequency: i64,
    /// Seconds a public key stays published once it stopped signing. Must be
    /// at least the longest token lifetime.
    pub keep: i64,
}

impl<S> KeyRotator<S> {
    pub fn new(store: S, strategy: RotationStrategy) -> Self {
        Self { store, strategy }
    }
}

impl<S> KeyRotator<S>
where
    S: KeyInterface,
{
    /// Creates the first signing key or rotates a due one. Losing a rotation
    /// race against another instance is an error; losing the race to create
    /// the first key is not, since the winner's key is just as usable.
    pub async fn rotate(&self) -> Result<()> {
        let mut output: List<Keys> = List::default();
        self.store.list(&(), &mut output).await?;

        let now_time = Self::time_now();
        if let Some(mut keys) =
            output.data.into_iter().find(|keys| keys.id == KEYS_ID)
        {
            if keys.next_rotation > now_time {
                info!("Skipping key rotation");
                return Ok(());
            }
            let expected = keys.next_rotation;
            self.update_key(&mut keys, now_time)?;
            if !self.store.swap(&keys, Some(expected)).await? {
                return Err(errors::anyhow(anyhow::anyhow!(
                    "keys already rotated by another server instance"
                )));
            }
            info!(
                kid = keys.signing_key.key_id.as_deref().unwrap_or_default(),
                published = keys.verification_keys.len(),
                "signing key rotated"
            );
            return Ok(());
        }

        let (signing_key, signing_key_pub) = create_key()?;
        let next_rotation = now_time + self.strategy.rotation_frequency;
        let kid = signing_key.key_id.clone().unwrap_or_default();
        let created = self
            .store
            .swap(
                &Keys {
                    id: KEYS_ID.to_owned(),
                    signing_key,
                    signing_key_pub: signing_key_pub.clone(),
                    verification_keys: vec![VerificationKey {
                        expiry: next_rotation + self.strategy.keep,
                        public_key: signing_key_pub,
                    }],
                    next_rotation,
                },
                None,
            )
            .await?;
        if created {
            info!(kid = %kid, "first signing key created");
        } else {
            warn!("first signing key was created by another server instance");
        }
        Ok(())
    }

    fn time_now() -> i64 {
        Utc::now().timestamp()
    }

    fn update_key(&self, nk: &mut Keys, now_time: i64) -> Result<()> {
        let (signing_key, signing_key_pub) = create_key()?;

        nk.verification_keys.retain(|vk| vk.expiry > now_time);

        // the outgoing key may have signed a token a moment ago
        let retired = nk.signing_key_pub.key_id.clone();
        match nk
            .verification_keys
            .iter_mut()
            .find(|vk| vk.public_key.key_id == retired)
        {
            Some(vk) => {
                vk.expiry = vk.expiry.max(now_time + self.strategy.keep)
            }
            None => {
                warn!("retired signing key was not published, restoring it");
                nk.verification_keys.push(VerificationKey {
                    expiry: now_time + self.strategy.keep,
                    public_key: nk.signing_key_pub.clone(),
                });
            }
        }

        let next_rotation = now_time + self.strategy.rotation_frequency;
        nk.verification_keys.insert(
            0,
            VerificationKey {
                expiry: next_rotation + self.strategy.keep,
                public_key: signing_key_pub.clone(),
            },
        );

        nk.signing_key = signing_key;
        nk.signing_key_pub = signing_key_pub;
        nk.next_rotation = next_rotation;
        Ok(())
    }
}

fn key_generator(take: usize) -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(take)
        .map(char::from)
        .collect::<String>()
}

/// Generates an RS256 key pair and returns `(private, public)` JWKs sharing
/// one `kid`.
pub fn create_key() -> Result<(jwk::JsonWebKey, jwk::JsonWebKey)> {
    let mut rng = rand::thread_rng();
    let private_key =
        rsa::RsaPrivateKey::new(&mut rng, RSA_BITS).map_err(errors::any)?;

    let primes = private_key.primes();
    if primes.len() != 2 {
        return Err(errors::anyhow(anyhow::anyhow!(
            "expected a two-prime RSA key, got {} primes",
            primes.len()
        )));
    }
    let (p, q) = (&primes[0], &primes[1]);
    let d = private_key.d();
    let one = BigUint::from(1u8);
    let two = BigUint::from(2u8);

    let key = jwk::Key::RSA {
        public: jwk::RsaPublic {
            e: jwk::PublicExponent,
            n: private_key.n().to_bytes_be().into(),
        },
        private: Some(jwk::RsaPrivate {
            d: d.to_bytes_be().into(),
            p: Some(p.to_bytes_be().into()),
            q: Some(q.to_bytes_be().into()),
            dp: Some((d % (p - &one)).to_bytes_be().into()),
            dq: Some((d % (q - &one)).to_bytes_be().into()),
            // p is prime, so q^(p-2) mod p is the CRT coefficient
            qi: Some(q.modpow(&(p - &two), p).to_bytes_be().into()),
        }),
    };

    let mut signing_key = jwk::JsonWebKey::new(key);
    signing_key
        .set_algorithm(jwk::Algorithm::RS256)
        .map_err(errors::any)?;
    signing_key.key_use = Some(jwk::KeyUse::Signing);
    signing_key.key_id = Some(key_generator(KID_LEN));

    let mut signing_key_pub = signing_key.clone();
    signing_key_pub.key = jwk_to_public(signing_key.key.clone())?;
    Ok((signing_key, signing_key_pub))
}

pub fn jwk_to_public(key: Box<jwk::Key>) -> Result<Box<jwk::Key>> {
    if !key.is_private() {
        return Ok(key);
    }
    Ok(Box::new(match *key {
        jwk::Key::Symmetric { .. } => {
            return Err(errors::bad_request("not supported symmetric key"))
        }
        jwk::Key::EC {
            curve: jwk::Curve::P256 { x, y, .. },
        } => jwk::Key::EC {
            curve: jwk::Curve::P256 { x, y, d: None },
        },
        jwk::Key::RSA { public, .. } => jwk::Key::RSA {
            public,
            private: None,
        },
    }))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use ident_storage::memory;

    use super::*;

    /// Reads the stored keys, then pauses, so two rotators both see the
    /// same due state before either writes.
    struct SlowList(Arc<memory::KeyImpl>);

    #[async_trait]
    impl Interface for SlowList {
        type T = Keys;
        type L = ();
        async fn put(&self, input: &Keys) -> Result<()> {
            self.0.put(input).await
        }
        async fn delete(&self, id: &str) -> Result<()> {
            self.0.delete(id).await
        }
        async fn get(&self, id: &str, output: &mut Keys) -> Result<()> {
            self.0.get(id, output).await
        }
        async fn list(&self, opts: &(), output: &mut List<Keys>) -> Result<()> {
            self.0.list(opts, output).await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
        async fn count(&self, opts: &()) -> Result<i64> {
            self.0.count(opts).await
        }
    }

    #[async_trait]
    impl KeyInterface for SlowList {
        async fn swap(&self, input: &Keys, expected: Option<i64>) -> Result<bool> {
            self.0.swap(input, expected).await
        }
    }

    fn racing_rotators(
        store: &Arc<memory::KeyImpl>,
    ) -> (KeyRotator<SlowList>, KeyRotator<SlowList>) {
        let strategy = RotationStrategy {
            rotation_frequency: 6 * 60 * 60,
            keep: 24 * 60 * 60,
        };
        (
            KeyRotator::new(SlowList(Arc::clone(store)), strategy),
            KeyRotator::new(SlowList(Arc::clone(store)), strategy),
        )
    }

    fn rotator() -> (Arc<memory::KeyImpl>, KeyRotator<Arc<memory::KeyImpl>>) {
        let store = Arc::new(memory::KeyImpl::new());
        let rotator = KeyRotator::new(
            Arc::clone(&store),
            RotationStrategy {
                rotation_frequency: 6 * 60 * 60,
                keep: 24 * 60 * 60,
            },
        );
        (store, rotator)
    }

    async fn current(store: &memory::KeyImpl) -> Keys {
        let mut list = List::default();
        store.list(&(), &mut list).await.unwrap();
        assert_eq!(list.data.len(), 1);
        list.data.remove(0)
    }

    #[test]
    fn created_key_is_rs256_with_shared_kid() {
        let (private, public) = create_key().unwrap();
        assert!(private.key.is_private());
        assert!(!public.key.is_private());
        assert_eq!(private.key_id, public.key_id);
        assert_eq!(public.key_id.as_ref().map(String::len), Some(KID_LEN));
        assert_eq!(public.algorithm, Some(jwk::Algorithm::RS256));
        assert_eq!(public.key_use, Some(jwk::KeyUse::Signing));
    }

    #[tokio::test]
    async fn first_rotation_creates_key() {
        let (store, rotator) = rotator();
        rotator.rotate().await.unwrap();

        let keys = current(&store).await;
        assert_eq!(keys.verification_keys.len(), 1);
        assert_eq!(
            keys.verification_keys[0].public_key,
            keys.signing_key_pub
        );
        assert!(keys.next_rotation > Utc::now().timestamp());
        assert_eq!(
            keys.verification_keys[0].expiry,
            keys.next_rotation + 24 * 60 * 60
        );
    }

    #[tokio::test]
    async fn rotation_is_skipped_until_due() {
        let (store, rotator) = rotator();
        rotator.rotate().await.unwrap();
        let before = current(&store).await;
        rotator.rotate().await.unwrap();
        assert_eq!(current(&store).await, before);
    }

    #[tokio::test]
    async fn due_rotation_keeps_retired_key_published() {
        let (store, rotator) = rotator();
        rotator.rotate().await.unwrap();

        let mut keys = current(&store).await;
        let retired = keys.signing_key_pub.key_id.clone();
        keys.next_rotation = 0;
        store.put(&keys).await.unwrap();

        rotator.rotate().await.unwrap();
        let keys = current(&store).await;
        let now = Utc::now().timestamp();

        assert_ne!(keys.signing_key_pub.key_id, retired);
        assert_eq!(keys.verification_keys.len(), 2);
        assert_eq!(keys.verification_keys[0].public_key, keys.signing_key_pub);
        let old = keys.verification_key(retired.as_deref().unwrap()).unwrap();
        assert!(old.expiry >= now + 24 * 60 * 60 - 5);

        let published = JsonWebKeySet::published(&[keys], now);
        assert_eq!(published.keys.len(), 2);
    }

    #[tokio::test]
    async fn expired_verification_keys_are_dropped() {
        let (store, rotator) = rotator();
        rotator.rotate().await.unwrap();

        let mut keys = current(&store).await;
        let (_, stale) = create_key().unwrap();
        keys.verification_keys.push(VerificationKey {
            public_key: stale.clone(),
            expiry: 1,
        });
        keys.next_rotation = 0;
        store.put(&keys).await.unwrap();

        rotator.rotate().await.unwrap();
        let keys = current(&store).await;
        assert!(keys
            .verification_key(stale.key_id.as_deref().unwrap())
            .is_none());
        assert_eq!(keys.verification_keys.len(), 2);
    }

    #[tokio::test]
    async fn key_set_never_leaks_private_parts() {
        let (store, rotator) = rotator();
        rotator.rotate().await.unwrap();
        let keys = current(&store).await;

        let jwks = JsonWebKeySet::published(&[keys], Utc::now().timestamp());
        let body = serde_json::to_value(&jwks).unwrap();
        let key = &body["keys"][0];
        assert_eq!(key["kty"], "RSA");
        assert_eq!(key["alg"], "RS256");
        assert_eq!(key["use"], "sig");
        assert!(key["n"].is_string());
        assert_eq!(key["e"], "AQAB");
        for private in ["d", "p", "q", "dp", "dq", "qi"] {
            assert!(key.get(private).is_none(), "{private} leaked");
        }
    }

    #[tokio::test]
    async fn concurrent_rotation_is_reported() {
        let (store, rotator) = rotator();
        rotator.rotate().await.unwrap();
        let mut keys = current(&store).await;
        keys.next_rotation = 0;
        store.put(&keys).await.unwrap();

        let (a, b) = racing_rotators(&store);
        let (ra, rb) = tokio::join!(a.rotate(), b.rotate());
        assert!(ra.is_ok() != rb.is_ok(), "exactly one rotation must win");
        let err = ra.err().or(rb.err()).unwrap();
        assert!(err.to_string().contains("already rotated"));

        // the winner's signing key and the retired one, nothing else
        let keys = current(&store).await;
        assert_eq!(keys.verification_keys.len(), 2);
        assert_eq!(keys.verification_keys[0].public_key, keys.signing_key_pub);
        let published = JsonWebKeySet::published(&[keys], Utc::now().timestamp());
        assert_eq!(published.keys.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_first_start_keeps_one_row() {
        let store = Arc::new(memory::KeyImpl::new());
        let (a, b) = racing_rotators(&store);
        let (ra, rb) = tokio::join!(a.rotate(), b.rotate());
        ra.unwrap();
        rb.unwrap();

        let keys = current(&store).await;
        assert_eq!(keys.id, KEYS_ID);
        assert_eq!(keys.verification_keys.len(), 1);
    }

    #[test]
    fn max_age_takes_earliest_rotation() {
        let soon = Keys {
            next_rotation: 500,
            ..Default::default()
        };
        let late = Keys {
            next_rotation: 5_000,
            ..Default::default()
        };
        assert_eq!(max_age(&[late, soon], 0), 500);
    }

    #[test]
    fn max_age_has_a_floor() {
        let keys = Keys {
            next_rotation: 1_000,
            ..Default::default()
        };
        assert_eq!(max_age(&[], 0), MIN_MAX_AGE);
        assert_eq!(max_age(&[keys.clone()], 990), MIN_MAX_AGE);
        assert_eq!(max_age(&[keys], 0), 1_000);
    }

    #[test]
    fn symmetric_keys_have_no_public_half() {
        let key = Box::new(jwk::Key::Symmetric {
            key: vec![1, 2, 3].into(),
        });
        assert!(jwk_to_public(key).is_err());
    }
}
