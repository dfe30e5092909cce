pub mod key;
pub mod mariadb;
pub mod memory;
mod model;
mod pool;
pub mod user;

pub use model::List;
pub use pool::connection_manager;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use ident_slo::Result;

#[async_trait]
pub trait Interface: Sync {
    type T: DeserializeOwned + Serialize + Send + Sync + PartialEq;
    type L: Sync;

    async fn put(&self, input: &Self::T) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn get(&self, id: &str, output: &mut Self::T) -> Result<()>;
    async fn list(
        &self,
        opts: &Self::L,
        output: &mut List<Self::T>,
    ) -> Result<()>;
    async fn count(&self, opts: &Self::L) -> Result<i64>;
}

#[async_trait]
impl<I> Interface for Arc<I>
where
    I: Interface + Send + ?Sized,
{
    type T = I::T;
    type L = I::L;

    async fn put(&self, input: &Self::T) -> Result<()> {
        (**self).put(input).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id).await
    }

    async fn get(&self, id: &str, output: &mut Self::T) -> Result<()> {
        (**self).get(id, output).await
    }

    async fn list(
        &self,
        opts: &Self::L,
        output: &mut List<Self::T>,
    ) -> Result<()> {
        (**self).list(opts, output).await
    }

    async fn count(&self, opts: &Self::L) -> Result<i64> {
        (**self).count(opts).await
    }
}

/// Signing key storage. Rotation goes through `swap` so that two instances
/// rotating at the same moment can't both store a new key.
#[async_trait]
pub trait KeyInterface: Interface<T = key::Keys, L = ()> {
    /// Writes `input` only while the stored row still has `next_rotation ==
    /// expected`, or while no row exists when `expected` is `None`. Returns
    /// false when another writer got there first.
    async fn swap(&self, input: &key::Keys, expected: Option<i64>) -> Result<bool>;
}

#[async_trait]
impl<I> KeyInterface for Arc<I>
where
    I: KeyInterface + Send + ?Sized,
{
    async fn swap(&self, input: &key::Keys, expected: Option<i64>) -> Result<bool> {
        (**self).swap(input, expected).await
    }
}

/// Type-erased signing key store shared between the rotator, the token
/// issuers and the JWKS handler.
pub type KeyStore = Arc<dyn KeyInterface + Send + Sync>;

pub type UserStore =
    Arc<dyn Interface<T = user::User, L = user::ListParams> + Send + Sync>;
