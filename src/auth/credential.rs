// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `Authorization` header parsing.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::Serialize;
use utoipa::ToSchema;

/// Default keyword for signed bearer tokens.
pub const DEFAULT_BEARER_SCHEME: &str = "Bearer";

/// Default keyword for opaque long tokens.
pub const DEFAULT_LONG_TOKEN_SCHEME: &str = "UDSLongToken";

/// The two credential schemes this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub enum AuthScheme {
    Bearer,
    LongToken,
}

/// Configured scheme keywords, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeNames {
    pub bearer: String,
    pub long_token: String,
}

impl SchemeNames {
    pub fn name(&self, scheme: AuthScheme) -> &str {
        match scheme {
            AuthScheme::Bearer => &self.bearer,
            AuthScheme::LongToken => &self.long_token,
        }
    }

    fn resolve(&self, keyword: &str) -> Option<AuthScheme> {
        if keyword.eq_ignore_ascii_case(&self.bearer) {
            Some(AuthScheme::Bearer)
        } else if keyword.eq_ignore_ascii_case(&self.long_token) {
            Some(AuthScheme::LongToken)
        } else {
            None
        }
    }
}

impl Default for SchemeNames {
    fn default() -> Self {
        Self {
            bearer: DEFAULT_BEARER_SCHEME.to_string(),
            long_token: DEFAULT_LONG_TOKEN_SCHEME.to_string(),
        }
    }
}

/// Credential carried by a request, derived once from its `Authorization`
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    LongToken(String),
    None,
}

impl Credential {
    /// Read the credential from request headers.
    ///
    /// A missing header, a non-text header, an unknown scheme keyword or an
    /// empty token all yield [`Credential::None`].
    pub fn from_headers(headers: &HeaderMap, schemes: &SchemeNames) -> Self {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map_or(Self::None, |value| Self::parse(value, schemes))
    }

    /// Parse a raw `<scheme> <token>` header value.
    pub fn parse(header: &str, schemes: &SchemeNames) -> Self {
        let Some((keyword, token)) = header.trim().split_once(char::is_whitespace) else {
            return Self::None;
        };
        let token = token.trim();
        if token.is_empty() {
            return Self::None;
        }

        match schemes.resolve(keyword) {
            Some(AuthScheme::Bearer) => Self::Bearer(token.to_string()),
            Some(AuthScheme::LongToken) => Self::LongToken(token.to_string()),
            None => Self::None,
        }
    }

    pub fn scheme(&self) -> Option<AuthScheme> {
        match self {
            Self::Bearer(_) => Some(AuthScheme::Bearer),
            Self::LongToken(_) => Some(AuthScheme::LongToken),
            Self::None => None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) | Self::LongToken(token) => Some(token),
            Self::None => None,
        }
    }
}
