use axum::{extract::Request, middleware::Next, response::Response};
use http::{header, HeaderName, HeaderValue};
use tower_http::trace::MakeSpan;
use tracing::{Level, Span};

/// Sent on every admin API response. Identity tokens are per-actor and
/// must never be stored by a shared cache.
pub const PRIVATE_CACHE_CONTROL: &str = "no-cache, private, no-store, must-revalidate, max-stale=0, post-check=0, pre-check=0";

pub const X_CACHE_INVALIDATE: HeaderName =
    HeaderName::from_static("x-cache-invalidate");

pub async fn private_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(PRIVATE_CACHE_CONTROL),
    );
    headers.remove(X_CACHE_INVALIDATE);
    response
}

/// Request span that carries the `X-Trace-Id` of the request.
#[derive(Clone, Copy)]
pub struct MakeSpanWithTrace {
    level: Level,
}

impl MakeSpanWithTrace {
    pub fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for MakeSpanWithTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> MakeSpan<B> for MakeSpanWithTrace {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let trace_id = request
            .headers()
            .get("X-Trace-Id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // `tracing::span!` needs a constant level
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    trace_id = %trace_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            };
        }

        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}
