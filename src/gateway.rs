// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reverse proxy to upstream services.
//!
//! Installed as the router fallback, so it only sees requests that
//! passed the edge middleware and matched no local route. The
//! upstream is chosen by longest matching path prefix; the request is
//! forwarded with its method, path, query, body and headers (minus
//! hop-by-hop headers), including the trust headers the edge injected.

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName},
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

/// Prefix routing table.
#[derive(Debug, Clone, Default)]
pub struct GatewayRoutes {
    /// (prefix, upstream base URL), longest prefix first
    routes: Vec<(String, String)>,
}

impl GatewayRoutes {
    pub fn new(routes: Vec<(String, String)>) -> Self {
        let mut routes = routes;
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Upstream base URL for `path`. A prefix matches itself and
    /// anything below it at a `/` boundary.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(prefix, _)| {
                prefix.is_empty()
                    || path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(|(_, upstream)| upstream.as_str())
    }
}

/// Upstream forwarder.
pub struct Gateway {
    client: reqwest::Client,
    routes: GatewayRoutes,
}

impl Gateway {
    pub fn new(routes: GatewayRoutes, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, routes })
    }

    pub fn routes(&self) -> &GatewayRoutes {
        &self.routes
    }

    /// Forward a request to its upstream.
    pub async fn forward(&self, request: Request) -> Result<Response, ApiError> {
        let path = request.uri().path().to_string();
        let upstream = self
            .routes
            .resolve(&path)
            .ok_or_else(|| ApiError::not_found(format!("no route for {path}")))?;

        let target = match request.uri().query() {
            Some(query) => format!("{upstream}{path}?{query}"),
            None => format!("{upstream}{path}"),
        };

        let (parts, body) = request.into_parts();
        let body = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| ApiError::bad_request(format!("unreadable request body: {e}")))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        let upstream_response = self
            .client
            .request(parts.method.clone(), &target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(target = %target, "Upstream timed out");
                    ApiError::gateway_timeout("upstream service timed out")
                } else {
                    tracing::warn!(target = %target, error = %e, "Upstream request failed");
                    ApiError::bad_gateway("upstream service unavailable")
                }
            })?;

        let status = upstream_response.status();
        let mut response_headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        response_headers.remove(header::CONTENT_LENGTH);

        let bytes = upstream_response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::gateway_timeout("upstream service timed out")
            } else {
                ApiError::bad_gateway(format!("upstream body error: {e}"))
            }
        })?;

        tracing::debug!(method = %parts.method, target = %target, status = status.as_u16(), "Proxied request");

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Router fallback handler.
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    match state.gateway.forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::any, Router};

    #[test]
    fn longest_prefix_wins() {
        let routes = GatewayRoutes::new(vec![
            ("/api".to_string(), "http://general".to_string()),
            ("/api/orders".to_string(), "http://orders".to_string()),
        ]);

        assert_eq!(routes.resolve("/api/orders/7"), Some("http://orders"));
        assert_eq!(routes.resolve("/api/orders"), Some("http://orders"));
        assert_eq!(routes.resolve("/api/ordersx"), Some("http://general"));
        assert_eq!(routes.resolve("/apis"), None);
        assert_eq!(routes.resolve("/other"), None);
    }

    #[test]
    fn empty_prefix_catches_everything() {
        let routes = GatewayRoutes::new(vec![(String::new(), "http://default".to_string())]);
        assert_eq!(routes.resolve("/anything"), Some("http://default"));
    }

    async fn echo(request: Request) -> String {
        let principal = request
            .headers()
            .get("x-principal-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        let method = request.method().clone();
        let uri = request.uri().to_string();
        let body = to_bytes(request.into_body(), usize::MAX).await.unwrap();
        format!("{method} {uri} {principal} {}", String::from_utf8_lossy(&body))
    }

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/slow", any(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }))
            .fallback(echo);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn forwards_method_path_query_headers_and_body() {
        let upstream = spawn_upstream().await;
        let gateway = Gateway::new(
            GatewayRoutes::new(vec![("/orders".to_string(), upstream)]),
            Duration::from_secs(5),
        )
        .unwrap();

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/orders/7?expand=items")
            .header("x-principal-id", "42")
            .header("connection", "close")
            .body(Body::from("payload"))
            .unwrap();

        let response = gateway.forward(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "POST /orders/7?expand=items 42 payload");
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let gateway = Gateway::new(GatewayRoutes::default(), Duration::from_secs(1)).unwrap();
        let request = axum::http::Request::builder()
            .uri("/nowhere")
            .body(Body::empty())
            .unwrap();

        let err = gateway.forward(request).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_502() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gateway = Gateway::new(
            GatewayRoutes::new(vec![("/svc".to_string(), format!("http://{addr}"))]),
            Duration::from_secs(2),
        )
        .unwrap();
        let request = axum::http::Request::builder()
            .uri("/svc/ping")
            .body(Body::empty())
            .unwrap();

        let err = gateway.forward(request).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn slow_upstream_is_504() {
        let upstream = spawn_upstream().await;
        let gateway = Gateway::new(
            GatewayRoutes::new(vec![("/slow".to_string(), upstream)]),
            Duration::from_millis(200),
        )
        .unwrap();
        let request = axum::http::Request::builder()
            .uri("/slow")
            .body(Body::empty())
            .unwrap();

        let err = gateway.forward(request).await.unwrap_err();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
    }
}
