use axum::{routing::get, Json, Router};
use chrono::Utc;
use http::{header, HeaderMap};

use ident_slo::{errors, Result};
use ident_storage::{key::Keys, Interface, List};

use crate::{
    services::key::{self, JsonWebKeySet},
    AppState,
};

pub fn new_router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/jwks.json", get(jwk_handler))
        .with_state(state)
}

/// Public keys of every signing key whose tokens may still be alive.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "JSON Web Key Set", body = JsonWebKeySet),
    )
)]
pub async fn jwk_handler(
    app: AppState,
) -> Result<(HeaderMap, Json<JsonWebKeySet>)> {
    let mut records: List<Keys> = List::default();
    app.store.key.list(&(), &mut records).await?;

    let now = Utc::now().timestamp();
    let jwks = JsonWebKeySet::published(&records.data, now);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        format!(
            "max-age={}, must-revalidate",
            key::max_age(&records.data, now)
        )
        .parse()
        .map_err(errors::any)?,
    );
    Ok((headers, Json(jwks)))
}
