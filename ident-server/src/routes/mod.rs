use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use http::{
    header::{HeaderName, CONTENT_TYPE},
    HeaderValue, Uri,
};
use prometheus::{Encoder, TextEncoder};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer, ExposeHeaders},
    trace::{DefaultOnResponse, TraceLayer},
    LatencyUnit,
};
use tracing::Level;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use ident_slo::errors;

use crate::{
    controllers::{identities, jwks},
    middlewares::{private_cache, MakeSpanWithTrace},
    services::{
        identities::{Identity, IdentityList},
        key::JsonWebKeySet,
    },
    var::{HTTP_REQUESTS_DURATION_SECONDS, HTTP_REQUESTS_TOTAL},
    AppState,
};

const X_TRACE_ID: &str = "x-trace-id";

#[derive(OpenApi)]
#[openapi(
    paths(identities::list_identities, jwks::jwk_handler),
    components(schemas(IdentityList, Identity, JsonWebKeySet)),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub struct AppRouter;

impl AppRouter {
    pub fn build(state: AppState) -> Result<Router> {
        let cors_origin = state.config.cors_origin.parse::<HeaderValue>()?;

        let router = Router::new()
            .merge(jwks::new_router(state.clone()))
            .route("/v1/api-docs/openapi.json", get(Self::openapi))
            .nest(
                "/v1",
                Router::new()
                    .merge(identities::new_router(state))
                    .fallback(Self::not_found)
                    .layer(middleware::from_fn(private_cache)),
            )
            .layer(
                ServiceBuilder::new().layer(
                    TraceLayer::new_for_http()
                        .make_span_with(
                            MakeSpanWithTrace::new().level(Level::INFO),
                        )
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(LatencyUnit::Millis),
                        ),
                ),
            )
            .layer(middleware::from_fn(Self::trace))
            .fallback(Self::not_found)
            .layer(
                CorsLayer::new()
                    .expose_headers(ExposeHeaders::list(vec![
                        HeaderName::from_static(X_TRACE_ID),
                    ]))
                    .allow_headers(AllowHeaders::mirror_request())
                    .allow_methods(AllowMethods::mirror_request())
                    .allow_origin(cors_origin)
                    .allow_credentials(true)
                    .max_age(Duration::from_secs(60) * 60 * 12),
            )
            .route_layer(middleware::from_fn(Self::track_metrics))
            .route("/metrics", get(Self::metrics));

        Ok(router)
    }

    /// Echoes the caller's `X-Trace-Id`, or assigns a fresh one.
    async fn trace(request: Request, next: Next) -> ident_slo::Result<Response> {
        let (mut head, body) = request.into_parts();
        let trace_header = match head.headers.get(X_TRACE_ID) {
            Some(v) => v.clone(),
            None => {
                let v = HeaderValue::try_from(
                    uuid::Uuid::new_v4().hyphenated().to_string(),
                )
                .map_err(errors::any)?;
                head.headers.insert(X_TRACE_ID, v.clone());
                v
            }
        };
        let mut response = next.run(Request::from_parts(head, body)).await;
        response.headers_mut().insert(X_TRACE_ID, trace_header);
        Ok(response)
    }

    async fn track_metrics(request: Request, next: Next) -> impl IntoResponse {
        let path = if let Some(matched_path) =
            request.extensions().get::<MatchedPath>()
        {
            matched_path.as_str().to_owned()
        } else {
            request.uri().path().to_owned()
        };
        let start = Instant::now();
        let method = request.method().to_string();
        let response = next.run(request).await;
        let latency = start.elapsed();
        let status = response.status().as_u16().to_string();

        HTTP_REQUESTS_TOTAL
            .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
            .inc();
        HTTP_REQUESTS_DURATION_SECONDS
            .with_label_values(&[method.as_str(), path.as_str()])
            .observe(latency.as_secs_f64());

        response
    }

    async fn metrics() -> ident_slo::Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(errors::any)?;

        Response::builder()
            .status(200)
            .header(CONTENT_TYPE, encoder.format_type())
            .body(Body::from(buffer))
            .map_err(errors::any)
    }

    async fn openapi() -> Json<utoipa::openapi::OpenApi> {
        Json(ApiDoc::openapi())
    }

    async fn not_found(uri: Uri) -> impl IntoResponse {
        errors::not_found(&format!("no route for {}", uri))
    }
}
