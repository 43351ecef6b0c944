// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signing certificate retrieval and caching.
//!
//! ## Behaviour
//!
//! - The certificate is fetched directly first, then once more through the
//!   outbound proxy if the direct attempt fails
//! - Only a certificate that parses into a usable key is cached
//! - Concurrent callers on a cold or expired cache share one fetch

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use x509_parser::public_key::PublicKey;

use crate::security::{Route, SecurityService, SecurityServiceError};

/// Default signing key cache TTL (30 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Uncompressed SEC1 point lengths.
const P256_POINT_LEN: usize = 65;
const P384_POINT_LEN: usize = 97;

#[derive(Debug, thiserror::Error)]
pub enum SigningKeyError {
    #[error("signing certificate retrieval failed: {0}")]
    Retrieval(#[from] SecurityServiceError),

    #[error("signing certificate is not valid PEM: {0}")]
    Pem(#[from] pem::PemError),

    #[error("expected a CERTIFICATE block, found {0}")]
    UnexpectedPemTag(String),

    #[error("signing certificate could not be parsed: {0}")]
    Certificate(String),

    #[error("unsupported certificate public key: {0}")]
    UnsupportedKey(String),
}

/// Verification key taken from the security service certificate.
pub struct SigningKey {
    decoding_key: DecodingKey,
    algorithms: Vec<Algorithm>,
    certificate_der: Vec<u8>,
}

impl SigningKey {
    /// Accepts a PEM `CERTIFICATE` block or its bare base64 body.
    pub fn from_certificate_pem(text: &str) -> Result<Self, SigningKeyError> {
        let text = text.trim();
        let block = if text.starts_with("-----BEGIN") {
            pem::parse(text)?
        } else {
            pem::parse(format!(
                "-----BEGIN CERTIFICATE-----\n{text}\n-----END CERTIFICATE-----\n"
            ))?
        };
        if block.tag() != "CERTIFICATE" {
            return Err(SigningKeyError::UnexpectedPemTag(block.tag().to_string()));
        }
        Self::from_certificate_der(block.contents())
    }

    pub fn from_certificate_der(der: &[u8]) -> Result<Self, SigningKeyError> {
        let (_, certificate) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| SigningKeyError::Certificate(e.to_string()))?;
        let public_key = certificate
            .public_key()
            .parsed()
            .map_err(|e| SigningKeyError::Certificate(e.to_string()))?;

        let (decoding_key, algorithms) = match public_key {
            PublicKey::RSA(rsa) => (
                DecodingKey::from_rsa_raw_components(
                    strip_leading_zeros(rsa.modulus),
                    strip_leading_zeros(rsa.exponent),
                ),
                RSA_ALGORITHMS.to_vec(),
            ),
            PublicKey::EC(point) => {
                let algorithm = match point.data().len() {
                    P256_POINT_LEN => Algorithm::ES256,
                    P384_POINT_LEN => Algorithm::ES384,
                    other => {
                        return Err(SigningKeyError::UnsupportedKey(format!(
                            "EC point of {other} bytes"
                        )))
                    }
                };
                (DecodingKey::from_ec_der(point.data()), vec![algorithm])
            }
            _ => {
                return Err(SigningKeyError::UnsupportedKey(
                    "only RSA and EC keys are supported".to_string(),
                ))
            }
        };

        Ok(Self {
            decoding_key,
            algorithms,
            certificate_der: der.to_vec(),
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Algorithms this key can verify.
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub fn supports(&self, algorithm: Algorithm) -> bool {
        self.algorithms.contains(&algorithm)
    }

    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithms", &self.algorithms)
            .field("certificate_len", &self.certificate_der.len())
            .finish_non_exhaustive()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

struct CacheEntry {
    key: Arc<SigningKey>,
    fetched_at: Instant,
}

/// Process-wide cache of the bearer signing key.
pub struct SigningKeyCache {
    service: Arc<dyn SecurityService>,
    ttl: Duration,
    cache: RwLock<Option<CacheEntry>>,
    /// Serialises fetches; readers never take it.
    refresh_lock: Mutex<()>,
}

impl SigningKeyCache {
    pub fn new(service: Arc<dyn SecurityService>, ttl: Duration) -> Self {
        Self {
            service,
            ttl,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current signing key, fetching it when the cache is empty or stale.
    pub async fn get(&self) -> Result<Arc<SigningKey>, SigningKeyError> {
        if let Some(key) = self.fresh().await {
            return Ok(key);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(key) = self.fresh().await {
            return Ok(key);
        }
        self.fetch_and_store().await
    }

    /// Force a fetch regardless of cache state.
    pub async fn refresh(&self) -> Result<Arc<SigningKey>, SigningKeyError> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Check if a key is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        self.fresh().await.is_some()
    }

    async fn fresh(&self) -> Option<Arc<SigningKey>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.key))
    }

    async fn fetch_and_store(&self) -> Result<Arc<SigningKey>, SigningKeyError> {
        let certificate = self.fetch_certificate().await?;
        let key = Arc::new(SigningKey::from_certificate_pem(&certificate).inspect_err(|e| {
            error!(error = %e, "Signing certificate rejected");
        })?);

        *self.cache.write().await = Some(CacheEntry {
            key: Arc::clone(&key),
            fetched_at: Instant::now(),
        });
        info!(
            algorithms = ?key.algorithms(),
            ttl_secs = self.ttl.as_secs(),
            "Signing key refreshed"
        );
        Ok(key)
    }

    async fn fetch_certificate(&self) -> Result<String, SigningKeyError> {
        match self.service.fetch_public_certificate(Route::Direct).await {
            Ok(certificate) => Ok(certificate),
            Err(direct) => {
                warn!(error = %direct, "Direct signing certificate fetch failed, retrying through proxy");
                self.service
                    .fetch_public_certificate(Route::Proxy)
                    .await
                    .map_err(|proxied| {
                        error!(error = %proxied, "Signing certificate fetch through proxy failed");
                        SigningKeyError::Retrieval(proxied)
                    })
            }
        }
    }
}
