// SPDX-FileCopyrightText: 2025 Alexandre Gomes Gaigalas <alganet@gmail.com>
//
// SPDX-License-Identifier: ISC

//! Bearer token extraction and the identity-provider seam.
//!
//! Real token verification is an external collaborator; `TokenVerifier` is
//! its contract. The two implementations here cover a shared-secret
//! deployment and an accept-anything development mode.

use hyper::{Body, Request};

/// Maps a bearer token to a user identity.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<String>;
}

/// Accepts exactly one pre-shared token; every caller is the same local user.
pub struct StaticTokenVerifier {
    token: String,
}

impl StaticTokenVerifier {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Option<String> {
        if !self.token.is_empty() && token == self.token {
            Some("local".to_string())
        } else {
            None
        }
    }
}

/// Accepts any non-empty token and uses it as the identity. Development
/// only; `main` warns loudly when this is active.
pub struct PermissiveVerifier;

impl TokenVerifier for PermissiveVerifier {
    fn verify(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

/// Why a request could not be authenticated. The wire message matches the
/// 401 body the handler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl AuthError {
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing authorization header",
            AuthError::InvalidFormat => "invalid authorization format",
            AuthError::InvalidToken => "invalid token",
        }
    }
}

/// Pull the bearer token off a request: `Authorization: Bearer <t>` first,
/// then the `?token=` query parameter.
pub fn extract_token(req: &Request<Body>) -> Result<String, AuthError> {
    if let Some(header) = req.headers().get(hyper::header::AUTHORIZATION) {
        let value = header.to_str().map_err(|_| AuthError::InvalidFormat)?;
        return match value.strip_prefix("Bearer ") {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(AuthError::InvalidFormat),
        };
    }

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            if let Some(token) = pair.strip_prefix("token=") {
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
    }

    Err(AuthError::MissingToken)
}

/// Authenticate a request, yielding the caller's identity.
pub fn authenticate(
    req: &Request<Body>,
    verifier: &dyn TokenVerifier,
) -> Result<String, AuthError> {
    let token = extract_token(req)?;
    verifier.verify(&token).ok_or(AuthError::InvalidToken)
}
