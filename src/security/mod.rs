// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Security service integration.
//!
//! The security service owns sessions and the certificate whose key signs
//! bearer tokens. Everything here talks to it through the [`SecurityService`]
//! trait so the caches and validators can be exercised without a network.

pub mod client;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::identity::Identity;

pub use client::SecurityServiceClient;
pub use session::{Session, SessionExpireReason, SessionSource, SessionStatus, UserCategory};

/// Network path used for a signing-certificate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Straight to the service, ignoring any proxy.
    Direct,
    /// Through the configured outbound proxy (direct when none is set).
    Proxy,
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityServiceError {
    #[error("security service request timed out after {0:?}")]
    Timeout(Duration),

    #[error("security service request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("security service returned HTTP {0}")]
    Status(StatusCode),

    #[error("security service response was invalid: {0}")]
    InvalidResponse(String),

    #[error("failed to sign internal request token: {0}")]
    InternalToken(#[from] jsonwebtoken::errors::Error),

    #[error("security service client configuration is invalid: {0}")]
    Config(String),
}

impl SecurityServiceError {
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(error)
        }
    }

    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::InvalidResponse(_) | Self::InternalToken(_) | Self::Config(_) => false,
        }
    }
}

/// Outcome of the security service resource check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResourceHealth {
    /// `OK`, `Failed`, or `Error: <reason>`
    pub status: String,
    pub http_code: u16,
    pub elapsed_ms: u64,
}

impl ResourceHealth {
    pub const OK: &'static str = "OK";
    pub const FAILED: &'static str = "Failed";

    pub fn is_healthy(&self) -> bool {
        self.status == Self::OK
    }
}

/// Operations the authentication core needs from the security service.
#[async_trait]
pub trait SecurityService: Send + Sync {
    /// Signing certificate (PEM or bare base64 DER).
    async fn fetch_public_certificate(&self, route: Route) -> Result<String, SecurityServiceError>;

    /// Create a session for a bearer caller and return its long token.
    async fn exchange_bearer_for_long_token(
        &self,
        bearer_token: &str,
        caller: &Identity,
    ) -> Result<String, SecurityServiceError>;

    /// Look up the session behind a long token.
    ///
    /// `Ok(None)` means the service answered but has no usable session.
    async fn fetch_session(&self, long_token: &str) -> Result<Option<Session>, SecurityServiceError>;

    /// Probe the service. Never fails; problems are reported in the result.
    async fn resource_health(&self) -> ResourceHealth;
}
