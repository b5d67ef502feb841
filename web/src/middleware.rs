//! Request correlation middleware.
//!
//! Every request gets a correlation ID taken from the `X-Correlation-ID`
//! header, or a fresh UUID when the header is absent or malformed. The ID is
//! stored in the request extensions, attached to an `http_request` span that
//! wraps the handler, and echoed back in the response header. Completed
//! requests are counted in `occupancy_http_requests_total{method, status}`.

use crate::extractors::CorrelationId;
use axum::{extract::Request, http::HeaderValue, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Create the correlation layer.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

/// Correlation ID carried by a request header, if it parses.
pub(crate) fn header_correlation_id(headers: &axum::http::HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = header_correlation_id(req.headers()).unwrap_or_else(Uuid::new_v4);
        req.extensions_mut().insert(CorrelationId(correlation_id));

        let method = req.method().to_string();
        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %method,
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            metrics::counter!(
                "occupancy_http_requests_total",
                "method" => method,
                "status" => response.status().as_u16().to_string()
            )
            .increment(1);

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|CorrelationId(id): CorrelationId| async move { id.to_string() }),
            )
            .layer(correlation_id_layer())
    }

    fn response_id(response: &Response) -> String {
        response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("Correlation ID header should be present")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn generated_when_missing() {
        let request = Request::builder().uri("/echo").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert!(Uuid::parse_str(&response_id(&response)).is_ok());
    }

    #[tokio::test]
    async fn preserved_and_visible_to_handlers() {
        let request_uuid = Uuid::new_v4();
        let request = Request::builder()
            .uri("/echo")
            .header(CORRELATION_ID_HEADER, request_uuid.to_string())
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response_id(&response), request_uuid.to_string());

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, request_uuid.to_string().as_bytes());
    }

    #[tokio::test]
    async fn malformed_header_is_replaced() {
        let request = Request::builder()
            .uri("/echo")
            .header(CORRELATION_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        let id = response_id(&response);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, "not-a-uuid");
    }
}
