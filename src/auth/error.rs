// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! [`TokenFailure`] and [`AuthFailure`] describe why a credential was
//! rejected. [`AuthError`] is the HTTP-facing rejection: it always answers
//! `401` with a `WWW-Authenticate` challenge and a JSON body.

use axum::{
    http::{header::WWW_AUTHENTICATE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::challenge::{Challenge, INVALID_TOKEN};
use super::dn::DnError;
use super::signing_key::SigningKeyError;
use crate::security::SecurityServiceError;

/// Description returned when the precise cause must not reach the caller.
pub const GENERIC_DESCRIPTION: &str = "Invalid token";

/// Bearer token validation failures, each with a stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenFailure {
    #[error("TV1001: The audience is invalid")]
    InvalidAudience,
    #[error("TV1002: The issuer is invalid")]
    InvalidIssuer,
    #[error("TV1003: The token has no expiration")]
    MissingExpiration,
    #[error("TV1004: The token lifetime is invalid")]
    InvalidLifetime,
    #[error("TV1005: The token is not yet valid")]
    NotYetValid,
    #[error("TV1006: The token is expired")]
    Expired,
    #[error("TV1007: The signature key was not found")]
    MissingSignatureKey,
    #[error("TV1008: The signature is invalid")]
    InvalidSignature,
    #[error("TV1009: The token is malformed")]
    Malformed,
}

impl TokenFailure {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidAudience => "TV1001",
            Self::InvalidIssuer => "TV1002",
            Self::MissingExpiration => "TV1003",
            Self::InvalidLifetime => "TV1004",
            Self::NotYetValid => "TV1005",
            Self::Expired => "TV1006",
            Self::MissingSignatureKey => "TV1007",
            Self::InvalidSignature => "TV1008",
            Self::Malformed => "TV1009",
        }
    }
}

/// Why a presented credential did not authenticate.
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error(transparent)]
    Token(#[from] TokenFailure),
    #[error("signing key unavailable: {0}")]
    SigningKey(#[from] SigningKeyError),
    #[error("security service unavailable: {0}")]
    SecurityService(#[from] SecurityServiceError),
    #[error("session is missing or no longer active")]
    SessionRejected,
    #[error("subject is not a valid distinguished name: {0}")]
    Subject(#[from] DnError),
}

impl AuthFailure {
    /// Token failures carry their own code. Everything else is reported as
    /// a generic invalid token.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Token(failure) => failure.code(),
            _ => INVALID_TOKEN,
        }
    }

    /// Text placed in `error_description`.
    pub fn error_description(&self) -> String {
        match self {
            Self::Token(failure) => failure.to_string(),
            _ => GENERIC_DESCRIPTION.to_string(),
        }
    }
}

/// HTTP rejection for an unauthenticated request.
#[derive(Debug)]
pub enum AuthError {
    /// No credential for a known scheme was presented
    MissingCredential(Challenge),
    /// A credential was presented and rejected
    Rejected {
        challenge: Challenge,
        code: &'static str,
    },
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn rejected(scheme: &str, failure: &AuthFailure) -> Self {
        Self::Rejected {
            challenge: Challenge::for_failure(scheme, failure),
            code: failure.code(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential(_) => "missing_credential",
            AuthError::Rejected { code, .. } => *code,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    pub fn challenge(&self) -> &Challenge {
        match self {
            AuthError::MissingCredential(challenge) | AuthError::Rejected { challenge, .. } => {
                challenge
            }
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredential(_) => write!(f, "Authorization header is required"),
            AuthError::Rejected { challenge, .. } => {
                write!(f, "{}", challenge.description().unwrap_or(GENERIC_DESCRIPTION))
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if let Some(value) = self.challenge().header_value() {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn token_failure_codes_are_distinct() {
        let all = [
            TokenFailure::InvalidAudience,
            TokenFailure::InvalidIssuer,
            TokenFailure::MissingExpiration,
            TokenFailure::InvalidLifetime,
            TokenFailure::NotYetValid,
            TokenFailure::Expired,
            TokenFailure::MissingSignatureKey,
            TokenFailure::InvalidSignature,
            TokenFailure::Malformed,
        ];
        let codes: std::collections::HashSet<_> = all.iter().map(|f| f.code()).collect();
        assert_eq!(codes.len(), all.len());
        for failure in all {
            assert!(failure.to_string().starts_with(failure.code()));
        }
    }

    #[test]
    fn upstream_failures_are_generic() {
        let failure = AuthFailure::SessionRejected;
        assert_eq!(failure.code(), "invalid_token");
        assert_eq!(failure.error_description(), "Invalid token");

        let failure = AuthFailure::Subject(DnError::EmptyName(0));
        assert_eq!(failure.error_description(), "Invalid token");
    }

    #[tokio::test]
    async fn rejected_returns_401_with_challenge() {
        let failure = AuthFailure::Token(TokenFailure::Expired);
        let response = AuthError::rejected("Bearer", &failure).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            r#"Bearer error="invalid_token", error_description="TV1006: The token is expired""#
        );

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "TV1006");
        assert_eq!(body["error"], "TV1006: The token is expired");
    }

    #[tokio::test]
    async fn missing_credential_returns_bare_challenge() {
        let response = AuthError::MissingCredential(Challenge::new("Bearer")).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_credential");
    }
}
