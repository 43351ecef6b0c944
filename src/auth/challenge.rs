// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `WWW-Authenticate` challenge construction (RFC 6750 section 3).

use axum::http::HeaderValue;

use super::error::AuthFailure;

/// Error code sent with every rejected credential.
pub const INVALID_TOKEN: &str = "invalid_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    scheme: String,
    error: Option<String>,
    error_description: Option<String>,
    error_uri: Option<String>,
}

impl Challenge {
    /// Bare challenge naming only the scheme.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            error: None,
            error_description: None,
            error_uri: None,
        }
    }

    /// Challenge describing why a credential of `scheme` was rejected.
    pub fn for_failure(scheme: impl Into<String>, failure: &AuthFailure) -> Self {
        Self::new(scheme)
            .with_error(INVALID_TOKEN)
            .with_description(failure.error_description())
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.error_uri = Some(uri.into());
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }

    /// Render as `<scheme> error="..", error_description="..", error_uri=".."`.
    ///
    /// Absent parameters are omitted. A scheme that already carries
    /// parameters of its own (contains a space) is followed by a comma.
    pub fn render(&self) -> String {
        let params: Vec<String> = [
            ("error", &self.error),
            ("error_description", &self.error_description),
            ("error_uri", &self.error_uri),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| format!("{name}=\"{}\"", quote(v))))
        .collect();

        let mut value = self.scheme.clone();
        if params.is_empty() {
            return value;
        }
        if self.scheme.find(' ').is_some_and(|index| index > 0) {
            value.push(',');
        }
        value.push(' ');
        value.push_str(&params.join(", "));
        value
    }

    /// Header value, falling back to the bare scheme when the rendered
    /// parameters are not valid header text.
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.render())
            .or_else(|_| HeaderValue::from_str(&self.scheme))
            .ok()
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
