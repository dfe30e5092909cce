use jsonwebkey as jwk;
use serde::{Deserialize, Serialize};

/// Id of the single keys row. Every instance writes the same row, so
/// concurrent first starts converge instead of creating one row each.
pub const KEYS_ID: &str = "signing";

/// The installation's signing key pair together with every public key that
/// still has to be published.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Keys {
    pub id: String,
    pub signing_key: jwk::JsonWebKey,
    pub signing_key_pub: jwk::JsonWebKey,
    /// Newest first. The entry for the current signing key is always present.
    pub verification_keys: Vec<VerificationKey>,
    pub next_rotation: i64,
}

impl Keys {
    /// Public keys whose overlap window has not elapsed at `now`.
    pub fn published(&self, now: i64) -> impl Iterator<Item = &jwk::JsonWebKey> {
        self.verification_keys
            .iter()
            .filter(move |vk| vk.expiry > now)
            .map(|vk| &vk.public_key)
    }

    pub fn verification_key(&self, kid: &str) -> Option<&VerificationKey> {
        self.verification_keys
            .iter()
            .find(|vk| vk.public_key.key_id.as_deref() == Some(kid))
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            id: String::new(),
            signing_key: placeholder(),
            signing_key_pub: placeholder(),
            verification_keys: vec![],
            next_rotation: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct VerificationKey {
    pub public_key: jwk::JsonWebKey,
    /// Unix timestamp after which the key is no longer published.
    pub expiry: i64,
}

impl Default for VerificationKey {
    fn default() -> Self {
        Self {
            public_key: placeholder(),
            expiry: 0,
        }
    }
}

fn placeholder() -> jwk::JsonWebKey {
    jwk::JsonWebKey::new(jwk::Key::Symmetric {
        key: Vec::new().into(),
    })
}
