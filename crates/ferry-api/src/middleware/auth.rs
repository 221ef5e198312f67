//! HTTP basic authentication for the receive endpoint.
//!
//! Credentials are compared in constant time. Missing and wrong credentials
//! get the same 401 response so callers cannot probe usernames.

use std::{fmt, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Expected basic auth credentials.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    /// Creates the credential pair to check requests against.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    /// Returns whether the supplied pair matches.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth").field("username", &self.username).field("password", &"***").finish()
    }
}

/// Extracts `(username, password)` from a `Basic` Authorization header.
fn extract_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Basic "))?;

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;

    Some((username.to_string(), password.to_string()))
}

/// Errors that can occur during basic authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The Authorization header is missing or malformed.
    MissingCredentials,
    /// The credentials do not match.
    InvalidCredentials,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"ferry\""));
        response
    }
}

/// Axum middleware that rejects requests without valid basic credentials.
pub async fn basic_auth_middleware(
    State(auth): State<Arc<BasicAuth>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (username, password) = extract_credentials(req.headers()).ok_or(AuthError::MissingCredentials)?;

    if !auth.verify(&username, &password) {
        warn!(path = %req.uri().path(), "rejected request with invalid basic auth credentials");
        return Err(AuthError::InvalidCredentials);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(credentials: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(credentials));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn extracts_credentials_from_basic_header() {
        assert_eq!(
            extract_credentials(&basic("bridge:s3cr:et")),
            Some(("bridge".to_string(), "s3cr:et".to_string()))
        );
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert_eq!(extract_credentials(&HeaderMap::new()), None);

        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        assert_eq!(extract_credentials(&bearer), None);

        let mut garbage = HeaderMap::new();
        garbage.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert_eq!(extract_credentials(&garbage), None);

        assert_eq!(extract_credentials(&basic("no-colon")), None);
    }

    #[test]
    fn verify_requires_both_fields() {
        let auth = BasicAuth::new("bridge", "secret");

        assert!(auth.verify("bridge", "secret"));
        assert!(!auth.verify("bridge", "Secret"));
        assert!(!auth.verify("other", "secret"));
        assert!(!format!("{auth:?}").contains("secret"));
    }

    #[test]
    fn auth_error_carries_challenge() {
        let response = AuthError::MissingCredentials.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
