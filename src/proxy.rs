//! Upstream reverse-proxy handler invoked by the Payment Middleware once a request is
//! authorized. Strips client-identifying and auth/payment headers and maps any
//! upstream transport failure to a single opaque `502`.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "payment-signature",
    "x-forwarded-for",
    "x-forwarded-proto",
    "x-forwarded-host",
    "x-real-ip",
    "via",
];

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    upstream: Url,
}

impl UpstreamProxy {
    pub fn new(upstream: Url, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self { client, upstream }
    }
}

/// `axum` handler form, used as the inner service the Payment Middleware forwards to.
pub async fn proxy_handler(State(proxy): State<UpstreamProxy>, request: Request) -> Response {
    match forward(&proxy, request).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn forward(proxy: &UpstreamProxy, request: Request) -> Result<Response, StatusCode> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target_url = proxy
        .upstream
        .join(path_and_query.trim_start_matches('/'))
        .map_err(|_| StatusCode::BAD_GATEWAY)?;

    let method = Method::from_str(request.method().as_str()).map_err(|_| StatusCode::BAD_REQUEST)?;
    let (parts, body) = request.into_parts();
    let body_bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let mut upstream_request = proxy.client.request(method, target_url);
    upstream_request = forward_headers(&parts.headers, upstream_request);
    if !body_bytes.is_empty() {
        upstream_request = upstream_request.body(body_bytes);
    }

    let response = upstream_request.send().await.map_err(|err| {
        tracing::warn!(error = %err, "upstream request failed");
        StatusCode::BAD_GATEWAY
    })?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)?;

    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(body))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn forward_headers(
    source: &HeaderMap,
    mut upstream_request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    for (name, value) in source.iter() {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_str(name.as_str()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            upstream_request = upstream_request.header(name, value);
        }
    }
    upstream_request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_auth_and_client_identifying_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("payment-signature", HeaderValue::from_static("abc"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::new();
        let builder = client.get("http://localhost/");
        let builder = forward_headers(&headers, builder);
        let request = builder.build().unwrap();

        assert!(request.headers().get("authorization").is_none());
        assert!(request.headers().get("payment-signature").is_none());
        assert!(request.headers().get("x-forwarded-for").is_none());
        assert!(request.headers().get("content-type").is_some());
    }
}
