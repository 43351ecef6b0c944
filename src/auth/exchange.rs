// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer to long-token exchange with an in-process LRU cache.
//!
//! Downstream calls that need a long token go through
//! [`TokenExchangeCache::resolve_long_token`]. A long-token caller already
//! has one; a bearer caller's token is exchanged once per TTL window.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::{debug, error};

use super::credential::Credential;
use super::identity::Identity;
use crate::security::{SecurityService, SecurityServiceError};

/// Default exchange cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of bearer tokens remembered.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("bearer token is empty")]
    EmptyBearerToken,

    #[error("request carries no credential that maps to a long token")]
    NoCredential,

    #[error("token exchange failed: {0}")]
    Service(#[from] SecurityServiceError),
}

/// Cached entry: long token + insertion timestamp.
struct CacheEntry {
    long_token: String,
    inserted_at: Instant,
}

pub struct TokenExchangeCache {
    service: Arc<dyn SecurityService>,
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    /// Independent of the signing key refresh lock.
    exchange_lock: tokio::sync::Mutex<()>,
}

impl TokenExchangeCache {
    pub fn new(service: Arc<dyn SecurityService>, capacity: usize, ttl: Duration) -> Self {
        Self {
            service,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
            exchange_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Long token usable on behalf of the current caller.
    pub async fn resolve_long_token(
        &self,
        credential: &Credential,
        caller: &Identity,
    ) -> Result<String, ExchangeError> {
        match credential {
            Credential::LongToken(token) => Ok(token.clone()),
            Credential::Bearer(token) => self.get_or_exchange(token, caller).await,
            Credential::None => Err(ExchangeError::NoCredential),
        }
    }

    /// Cached long token for `bearer_token`, exchanging it on a miss.
    ///
    /// Failures and empty results are never cached.
    pub async fn get_or_exchange(
        &self,
        bearer_token: &str,
        caller: &Identity,
    ) -> Result<String, ExchangeError> {
        if bearer_token.is_empty() {
            return Err(ExchangeError::EmptyBearerToken);
        }
        if let Some(long_token) = self.lookup(bearer_token) {
            return Ok(long_token);
        }

        let _guard = self.exchange_lock.lock().await;
        if let Some(long_token) = self.lookup(bearer_token) {
            return Ok(long_token);
        }

        let long_token = self
            .service
            .exchange_bearer_for_long_token(bearer_token, caller)
            .await
            .inspect_err(|e| {
                error!(error = %e, tenant = %caller.tenant_code, "Bearer to long token exchange failed");
            })?;

        debug!(tenant = %caller.tenant_code, "Bearer token exchanged for long token");
        self.store(bearer_token, &long_token);
        Ok(long_token)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, bearer_token: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(bearer_token) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.long_token.clone());
            }
            cache.pop(bearer_token);
        }
        None
    }

    fn store(&self, bearer_token: &str, long_token: &str) {
        if long_token.is_empty() {
            return;
        }
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                bearer_token.to_string(),
                CacheEntry {
                    long_token: long_token.to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::AuthScheme;
    use crate::auth::signing_key::{SigningKeyCache, DEFAULT_CACHE_TTL as SIGNING_KEY_TTL};
    use crate::test_support::{FakeSecurityService, TestSigner};
    use std::collections::HashMap;

    fn caller() -> Identity {
        Identity::new("uid=jdoe,ou=acme", AuthScheme::Bearer, HashMap::new()).unwrap()
    }

    fn cache_for(service: &Arc<FakeSecurityService>, capacity: usize, ttl: Duration) -> Arc<TokenExchangeCache> {
        Arc::new(TokenExchangeCache::new(
            Arc::clone(service) as Arc<dyn SecurityService>,
            capacity,
            ttl,
        ))
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let service = Arc::new(FakeSecurityService::new().with_delay(Duration::from_millis(30)));
        let cache = cache_for(&service, DEFAULT_CAPACITY, DEFAULT_CACHE_TTL);

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_exchange("bearer-1", &caller()).await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), "long-for-bearer-1");
        }
        assert_eq!(service.exchange_calls(), 1);
    }

    #[tokio::test]
    async fn distinct_tokens_exchange_separately() {
        let service = Arc::new(FakeSecurityService::new());
        let cache = cache_for(&service, DEFAULT_CAPACITY, DEFAULT_CACHE_TTL);

        for token in ["a", "b", "a", "c", "b"] {
            cache.get_or_exchange(token, &caller()).await.unwrap();
        }
        assert_eq!(service.exchange_calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let service = Arc::new(FakeSecurityService::new());
        service.set_exchange_fails(true);
        let cache = cache_for(&service, DEFAULT_CAPACITY, DEFAULT_CACHE_TTL);

        let err = cache.get_or_exchange("bearer-1", &caller()).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Service(_)));
        assert!(cache.is_empty());

        service.set_exchange_fails(false);
        assert_eq!(
            cache.get_or_exchange("bearer-1", &caller()).await.unwrap(),
            "long-for-bearer-1"
        );
        assert_eq!(service.exchange_calls(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_exchanged_again() {
        let service = Arc::new(FakeSecurityService::new());
        let cache = cache_for(&service, DEFAULT_CAPACITY, Duration::from_millis(20));

        cache.get_or_exchange("bearer-1", &caller()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get_or_exchange("bearer-1", &caller()).await.unwrap();
        assert_eq!(service.exchange_calls(), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let service = Arc::new(FakeSecurityService::new());
        let cache = cache_for(&service, 2, DEFAULT_CACHE_TTL);

        for token in ["a", "b", "c", "a"] {
            cache.get_or_exchange(token, &caller()).await.unwrap();
        }
        assert_eq!(service.exchange_calls(), 4);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn resolve_passes_long_tokens_through() {
        let service = Arc::new(FakeSecurityService::new());
        let cache = cache_for(&service, DEFAULT_CAPACITY, DEFAULT_CACHE_TTL);

        let token = cache
            .resolve_long_token(&Credential::LongToken("already-long".into()), &caller())
            .await
            .unwrap();
        assert_eq!(token, "already-long");
        assert_eq!(service.exchange_calls(), 0);

        let token = cache
            .resolve_long_token(&Credential::Bearer("b".into()), &caller())
            .await
            .unwrap();
        assert_eq!(token, "long-for-b");

        assert!(matches!(
            cache.resolve_long_token(&Credential::None, &caller()).await,
            Err(ExchangeError::NoCredential)
        ));
    }

    #[tokio::test]
    async fn empty_bearer_is_rejected() {
        let service = Arc::new(FakeSecurityService::new());
        let cache = cache_for(&service, DEFAULT_CAPACITY, DEFAULT_CACHE_TTL);
        assert!(matches!(
            cache.get_or_exchange("", &caller()).await,
            Err(ExchangeError::EmptyBearerToken)
        ));
        assert_eq!(service.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn pending_exchange_does_not_block_signing_key() {
        let signer = TestSigner::p256();
        let service = Arc::new(
            FakeSecurityService::new()
                .with_certificate(signer.certificate_pem.clone())
                .with_exchange_delay(Duration::from_secs(5)),
        );
        let cache = cache_for(&service, DEFAULT_CAPACITY, DEFAULT_CACHE_TTL);
        let keys = SigningKeyCache::new(
            Arc::clone(&service) as Arc<dyn SecurityService>,
            SIGNING_KEY_TTL,
        );

        let exchange = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_or_exchange("bearer-1", &caller()).await })
        };
        while service.exchange_calls() == 0 {
            tokio::task::yield_now().await;
        }

        let key = tokio::time::timeout(Duration::from_millis(500), keys.get()).await;
        assert!(matches!(key, Ok(Ok(_))));
        assert!(!exchange.is_finished());
        exchange.abort();
    }
}
