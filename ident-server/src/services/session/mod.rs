//! Staff session tokens. They share the signing keys with identity tokens
//! and are told apart by their audience.

use ident_slo::Result;
use ident_storage::user::User;

use crate::services::token::{Claims, Token};

/// Audience of every session token. No identity token may carry it.
pub const SESSION_AUDIENCE: &str = "session";

pub async fn issue<T: Token + ?Sized>(
    token: &T,
    user: &User,
) -> Result<(String, i64)> {
    token
        .token(&Claims {
            sub: user.id.clone(),
            aud: Some(SESSION_AUDIENCE.to_owned()),
            ..Default::default()
        })
        .await
}
