use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use http::request::Parts;
use tracing::debug;

use ident_slo::errors::{self, Code, WithBacktrace};
use ident_storage::{user::User, Interface};

use crate::{services::token::Token, AppState};

/// Staff user resolved from the `Authorization: Bearer <session>` header.
#[derive(Debug)]
pub struct Auth {
    pub user: User,
}

#[async_trait]
impl<S> FromRequestParts<S> for Auth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WithBacktrace;
    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(
                parts, state,
            )
            .await
            .map_err(|_| errors::unauthorized())?;

        let app = AppState::from_ref(state);
        let claims = match app.access_token.verify(bearer.token()).await {
            Ok(claims) => claims,
            Err(err) => {
                return Err(match Code::from(err) {
                    Code::KeyUnavailable(msg) => errors::key_unavailable(&msg),
                    other => {
                        debug!("session rejected: {}", other);
                        errors::unauthorized()
                    }
                })
            }
        };

        let mut user = User::default();
        if let Err(err) = app.store.user.get(&claims.sub, &mut user).await {
            return Err(match Code::from(err) {
                Code::NotFound(_) => errors::unauthorized(),
                Code::Any(err) => errors::anyhow(err),
                other => errors::anyhow(anyhow::anyhow!("{}", other)),
            });
        }
        Ok(Self { user })
    }
}

/// Like [`Auth`] but only lets the owner through.
#[derive(Debug)]
pub struct Owner {
    pub user: User,
}

#[async_trait]
impl<S> FromRequestParts<S> for Owner
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WithBacktrace;
    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Auth { user } = Auth::from_request_parts(parts, state).await?;
        if !user.role.is_owner() {
            return Err(errors::forbidden(&format!(
                "role {} is not allowed to access this resource",
                user.role
            )));
        }
        Ok(Self { user })
    }
}
