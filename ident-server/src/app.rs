use std::{collections::HashSet, ops::Deref, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::MySqlPool;
use tracing::info;

use ident_slo::errors;
use ident_storage::{mariadb, memory, user::User, KeyStore, UserStore};

use crate::{
    services::{
        key::{KeyRotator, RotationStrategy},
        session,
        token::AccessToken,
    },
    AppConfig,
};

pub struct App {
    pub config: AppConfig,
    pub store: Store,
    pub key_rotator: KeyRotator<KeyStore>,
    /// Verifies bearer sessions, only accepts the session audience.
    pub access_token: AccessToken<KeyStore>,
    /// Signs the tokens returned by the identities endpoint.
    pub identity_token: AccessToken<KeyStore>,
}

impl App {
    pub fn new(store: Store, config: AppConfig) -> Result<Self> {
        info!("initializing utility services...");
        config.check()?;

        let key_rotator = KeyRotator::new(
            store.key.clone(),
            RotationStrategy {
                rotation_frequency: config.rotation_frequency,
                keep: config.keep,
            },
        );

        let access_token = AccessToken::new(
            store.key.clone(),
            config.expiration,
            HashSet::from([session::SESSION_AUDIENCE.to_owned()]),
            config.endpoint.clone(),
        );

        let identity_token = AccessToken::new(
            store.key.clone(),
            config.identity_expiration,
            config.identity_audiences.iter().cloned().collect(),
            config.endpoint.clone(),
        );
        info!("feature services successfully initialized!");
        Ok(Self {
            config,
            store,
            key_rotator,
            access_token,
            identity_token,
        })
    }

    /// Mints a bearer session for `user`. Login flows are handled outside
    /// this service; this is what they would call.
    pub async fn session_token(
        &self,
        user: &User,
    ) -> ident_slo::Result<(String, i64)> {
        session::issue(&self.access_token, user).await
    }
}

#[derive(Clone)]
pub struct Store {
    pub user: UserStore,
    pub key: KeyStore,
}

impl Store {
    pub fn mariadb(pool: MySqlPool) -> Self {
        Self {
            user: Arc::new(mariadb::UserImpl::new(pool.clone())),
            key: Arc::new(mariadb::KeyImpl::new(pool)),
        }
    }

    pub fn memory() -> Self {
        Self {
            user: Arc::new(memory::UserImpl::new()),
            key: Arc::new(memory::KeyImpl::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState(pub Arc<App>);

// deref so you can still access the inner fields easily
impl Deref for AppState {
    type Target = App;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AppState
where
    Self: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = errors::WithBacktrace;
    async fn from_request_parts(
        _: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_ref(state))
    }
}
