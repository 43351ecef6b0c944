// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Short-lived HS256 token that authenticates this service to the security
//! service when it asks for the signing certificate.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// Lifetime of a minted internal token.
pub const INTERNAL_TOKEN_LIFETIME: Duration = Duration::minutes(30);

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InternalClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Issuer and audience are both set to the configured internal issuer.
#[derive(Clone)]
pub struct InternalTokenSigner {
    key: EncodingKey,
    issuer: String,
}

impl InternalTokenSigner {
    pub fn new(shared_secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            key: EncodingKey::from_secret(shared_secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn sign(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = InternalClaims {
            iss: self.issuer.clone(),
            aud: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + INTERNAL_TOKEN_LIFETIME).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
    }
}

impl fmt::Debug for InternalTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalTokenSigner")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}
