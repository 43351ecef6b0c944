// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed bearer token validation.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};
use tracing::warn;

use super::credential::AuthScheme;
use super::dn::DistinguishedName;
use super::error::{AuthFailure, TokenFailure};
use super::identity::{claims, Identity};
use super::signing_key::SigningKeyCache;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Which registered claims are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerPolicy {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_lifetime: bool,
}

pub struct BearerTokenValidator {
    keys: Arc<SigningKeyCache>,
    policy: BearerPolicy,
}

impl BearerTokenValidator {
    pub fn new(keys: Arc<SigningKeyCache>, policy: BearerPolicy) -> Self {
        Self { keys, policy }
    }

    /// Verify `token` against the current signing key and build the caller
    /// identity from its claims.
    pub async fn validate(&self, token: &str) -> Result<Identity, AuthFailure> {
        let header = decode_header(token).map_err(|_| TokenFailure::Malformed)?;
        let key = self.keys.get().await?;
        if !key.supports(header.alg) {
            warn!(alg = ?header.alg, "Bearer token algorithm does not match signing key");
            return Err(TokenFailure::MissingSignatureKey.into());
        }

        let data = decode::<Map<String, Value>>(token, key.decoding_key(), &self.validation(header.alg))
            .map_err(|e| classify(e.kind()))?;
        let claims = data.claims;

        if self.policy.validate_lifetime {
            check_lifetime(&claims)?;
        }
        identity_from_claims(claims)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_exp = self.policy.validate_lifetime;
        validation.validate_nbf = self.policy.validate_lifetime;
        if !self.policy.validate_lifetime {
            validation.required_spec_claims.clear();
        }

        match (&self.policy.issuer, self.policy.validate_issuer) {
            (Some(issuer), true) => validation.set_issuer(&[issuer]),
            _ => validation.iss = None,
        }
        match (&self.policy.audience, self.policy.validate_audience) {
            (Some(audience), true) => validation.set_audience(&[audience]),
            _ => validation.validate_aud = false,
        }
        validation
    }
}

fn classify(kind: &ErrorKind) -> AuthFailure {
    let failure = match kind {
        ErrorKind::ExpiredSignature => TokenFailure::Expired,
        ErrorKind::ImmatureSignature => TokenFailure::NotYetValid,
        ErrorKind::InvalidSignature => TokenFailure::InvalidSignature,
        ErrorKind::InvalidIssuer => TokenFailure::InvalidIssuer,
        ErrorKind::InvalidAudience => TokenFailure::InvalidAudience,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "exp" => TokenFailure::MissingExpiration,
            "iss" => TokenFailure::InvalidIssuer,
            "aud" => TokenFailure::InvalidAudience,
            "nbf" => TokenFailure::InvalidLifetime,
            _ => TokenFailure::Malformed,
        },
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidKeyFormat => TokenFailure::MissingSignatureKey,
        _ => TokenFailure::Malformed,
    };
    failure.into()
}

/// A token that expires before it becomes valid can never be used.
fn check_lifetime(claims: &Map<String, Value>) -> Result<(), TokenFailure> {
    let exp = claims.get("exp").and_then(Value::as_i64);
    let nbf = claims.get("nbf").and_then(Value::as_i64);
    match (exp, nbf) {
        (Some(exp), Some(nbf)) if exp <= nbf => Err(TokenFailure::InvalidLifetime),
        _ => Ok(()),
    }
}

fn identity_from_claims(claims: Map<String, Value>) -> Result<Identity, AuthFailure> {
    let attributes: HashMap<String, String> = claims
        .into_iter()
        .filter_map(|(name, value)| claim_text(value).map(|text| (name, text)))
        .collect();
    let subject = subject_from_attributes(&attributes);
    Ok(Identity::new(subject, AuthScheme::Bearer, attributes)?)
}

fn claim_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// The DN claim when present, else a DN built from the tenant and universal
/// id claims, else `sub`.
fn subject_from_attributes(attributes: &HashMap<String, String>) -> String {
    let non_empty = |name: &str| attributes.get(name).filter(|value| !value.is_empty());

    if let Some(dn) = non_empty(claims::SUBJECT_DN) {
        return dn.clone();
    }

    let mut dn = DistinguishedName::new();
    if let Some(tenant) = non_empty(claims::TENANT) {
        dn.set("ou", tenant);
    }
    if let Some(user) = non_empty(claims::UNIVERSAL_ID) {
        dn.set("uid", user);
    }
    if !dn.is_empty() {
        return dn.to_string();
    }

    non_empty(claims::SUBJECT).cloned().unwrap_or_default()
}
