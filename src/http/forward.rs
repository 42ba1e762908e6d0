//! Synchronous pass-through to the destination.

use std::net::SocketAddr;
use std::str::FromStr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header,
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
};

use crate::http::response::{append_forwarded_for, strip_hop_by_hop};
use crate::http::server::AppState;

/// Forward `request` to the destination and relay its response.
///
/// Destination transport failures become `502 Bad Gateway`.
pub async fn forward(state: &AppState, request: Request<Body>) -> Response {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (mut parts, body) = request.into_parts();

    let authority = match state.destination.clone() {
        Some(authority) => authority,
        None => match host_authority(&parts.headers, &parts.uri) {
            Some(authority) => authority,
            None => return (StatusCode::BAD_REQUEST, "missing or invalid host").into_response(),
        },
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    parts.uri = match Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
    {
        Ok(uri) => uri,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid request target").into_response(),
    };
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers);
    if let Some(addr) = client_addr {
        append_forwarded_for(&mut parts.headers, addr.ip());
    }

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(destination = %authority, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
        }
    }
}

/// Destination taken from the request itself when none is configured.
fn host_authority(headers: &axum::http::HeaderMap, uri: &Uri) -> Option<Authority> {
    match headers.get(header::HOST) {
        Some(host) => Authority::from_str(host.to_str().ok()?).ok(),
        None => uri.authority().cloned(),
    }
}
