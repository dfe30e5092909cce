use axum::{routing::get, Json, Router};

use ident_slo::Result;

use crate::{
    auth::Owner,
    services::identities::{self, IdentityList},
    var::IDENTITY_TOKENS_ISSUED,
    AppState,
};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/identities", get(list_identities))
        .route("/identities/", get(list_identities))
        .with_state(state)
}

/// Signs fresh identity tokens for the owner.
#[utoipa::path(
    get,
    path = "/v1/identities/",
    responses(
        (status = 200, description = "identity tokens", body = IdentityList),
        (status = 401, description = "missing or invalid session"),
        (status = 403, description = "requester is not the owner"),
        (status = 500, description = "signing key unavailable"),
    ),
    security(("bearer" = []))
)]
pub async fn list_identities(
    owner: Owner,
    app: AppState,
) -> Result<Json<IdentityList>> {
    let list = identities::issue(
        &app.identity_token,
        &owner.user,
        &app.config.identity_audiences,
    )
    .await?;
    for identity in &list.identities {
        IDENTITY_TOKENS_ISSUED
            .with_label_values(&[identity.audience.as_deref().unwrap_or("")])
            .inc();
    }
    Ok(list.into())
}
