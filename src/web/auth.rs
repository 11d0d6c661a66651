//! Basic authentication middleware for the control plane.
//!
//! Reads credentials from environment variables:
//! - `NUDGEBOT_WEB_USER` (default: "admin")
//! - `NUDGEBOT_WEB_PASS` (required for auth to be enabled)

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use base64::Engine;
use tracing::warn;

/// Parse a "Basic <base64(user:pass)>" header value into credentials
fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let mut parts = credentials.splitn(2, ':');
    let username = parts.next()?.to_string();
    let password = parts.next()?.to_string();
    Some((username, password))
}

/// Basic auth middleware.
///
/// If `NUDGEBOT_WEB_PASS` is not set, authentication is disabled (open
/// access). When enabled, all requests must carry a valid
/// `Authorization: Basic ...` header.
pub async fn basic_auth_middleware(
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected_pass = match std::env::var("NUDGEBOT_WEB_PASS") {
        Ok(p) if !p.is_empty() => p,
        _ => {
            // No password configured — skip auth
            return Ok(next.run(request).await);
        }
    };

    let expected_user =
        std::env::var("NUDGEBOT_WEB_USER").unwrap_or_else(|_| "admin".to_string());

    let header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let Some(header) = header else {
        warn!("[Auth] Missing Authorization header");
        return Err(StatusCode::UNAUTHORIZED);
    };

    match parse_basic_credentials(header) {
        Some((username, password)) if username == expected_user && password == expected_pass => {
            Ok(next.run(request).await)
        }
        Some((username, _)) => {
            warn!("[Auth] Invalid credentials for user: {}", username);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("[Auth] Malformed Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_credentials() {
        // "admin:secret"
        let header = "Basic YWRtaW46c2VjcmV0";
        assert_eq!(
            parse_basic_credentials(header),
            Some(("admin".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_rejects_other_schemes_and_garbage() {
        assert!(parse_basic_credentials("Bearer abc").is_none());
        assert!(parse_basic_credentials("Basic !!!not-base64!!!").is_none());
        // Valid base64 but no colon separator
        assert!(parse_basic_credentials("Basic YWRtaW4=").is_none());
    }
}
