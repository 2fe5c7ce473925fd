pub mod blocklist;
pub mod perimeter;

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::{debug, warn};

use crate::errors::WikiError;
use crate::types::AppState;

pub use blocklist::{BlockEntry, BlockList, BlockNotifier};
pub use perimeter::{ClientState, PerimeterGuard, PerimeterPolicy, Verdict};

const FALLBACK_IP: &str = "127.0.0.1";

/// Client address as seen behind a reverse proxy
pub fn client_ip(request: &Request) -> String {
    if let Some(ip) = forwarded_ip(request.headers()) {
        return ip;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| FALLBACK_IP.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(real) = header_str(headers, "x-real-ip") {
        return Some(real.to_string());
    }
    header_str(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(|first| first.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

fn set_header(response: &mut Response, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        response.headers_mut().insert(name, value);
    }
}

/// Rate limiting and IP blocking for every request
pub async fn perimeter(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    match state.guard.check_request(&ip) {
        Verdict::Blocked => {
            debug!("Rejecting blocked client {}", ip);
            WikiError::Forbidden("Your IP has been blocked".to_string()).into_response()
        }
        Verdict::RateLimited => WikiError::TooManyRequests.into_response(),
        Verdict::Allowed {
            limit,
            remaining,
            reset_in,
        } => {
            let reset_at = SystemTime::now()
                .checked_add(reset_in)
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default();
            let mut response = next.run(request).await;
            set_header(&mut response, "x-ratelimit-limit", limit);
            set_header(&mut response, "x-ratelimit-remaining", remaining);
            set_header(&mut response, "x-ratelimit-reset", reset_at.as_millis());
            response
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Bearer token check on mutating requests. Open when no token is configured.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.admin_token.as_deref().filter(|t| !t.is_empty()) else {
        return next.run(request).await;
    };
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(request).await;
    }
    if bearer_token(request.headers()) == Some(expected) {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    let blocked = state.guard.record_failed_login(&ip);
    warn!(
        "Rejected {} {} from {} ({:?})",
        request.method(),
        request.uri().path(),
        ip,
        state.guard.state(&ip)
    );
    if blocked {
        WikiError::Forbidden("Too many failed login attempts".to_string()).into_response()
    } else {
        WikiError::Unauthorized.into_response()
    }
}
