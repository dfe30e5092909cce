use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use ident_slo::{errors, Result};
use ident_storage::user::User;

use crate::services::token::{Claims, Token};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Identity {
    /// Compact RS256 JWS, verifiable through `/.well-known/jwks.json`.
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct IdentityList {
    pub identities: Vec<Identity>,
}

/// Signs one identity token per audience for an owner, or a single token
/// without `aud` when `audiences` is empty.
pub async fn issue<T: Token + ?Sized>(
    issuer: &T,
    user: &User,
    audiences: &[String],
) -> Result<IdentityList> {
    if !user.role.is_owner() {
        return Err(errors::forbidden(
            "only the owner may request identity tokens",
        ));
    }

    let targets: Vec<Option<&String>> = if audiences.is_empty() {
        vec![None]
    } else {
        audiences.iter().map(Some).collect()
    };

    let mut identities = Vec::with_capacity(targets.len());
    for aud in targets {
        let (token, _) = issuer
            .token(&Claims {
                sub: user.email.clone(),
                aud: aud.cloned(),
                ..Default::default()
            })
            .await?;
        identities.push(Identity {
            token,
            audience: aud.cloned(),
        });
    }
    tracing::debug!(user = %user.id, count = identities.len(), "identities issued");
    Ok(IdentityList { identities })
}
