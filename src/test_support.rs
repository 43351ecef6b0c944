// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: a scriptable security service and a
//! throwaway certificate/key pair for signing bearer tokens.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::StatusCode;

use crate::auth::identity::Identity;
use crate::config::{AuthSettings, SECURITY_SERVICE_URL_ENV, SECURITY_SHARED_SECRET_ENV};
use crate::security::{ResourceHealth, Route, SecurityService, SecurityServiceError, Session};
use crate::state::AppState;

/// Self-signed ECDSA certificate plus the private key that signs test tokens.
pub(crate) struct TestSigner {
    pub certificate_pem: String,
    encoding_key: EncodingKey,
    algorithm: Algorithm,
}

impl TestSigner {
    pub fn p256() -> Self {
        Self::generate(&rcgen::PKCS_ECDSA_P256_SHA256, Algorithm::ES256)
    }

    pub fn p384() -> Self {
        Self::generate(&rcgen::PKCS_ECDSA_P384_SHA384, Algorithm::ES384)
    }

    fn generate(alg: &'static rcgen::SignatureAlgorithm, algorithm: Algorithm) -> Self {
        let key_pair = rcgen::KeyPair::generate_for(alg).unwrap();
        let params = rcgen::CertificateParams::new(vec!["security.test".to_string()]).unwrap();
        let certificate = params.self_signed(&key_pair).unwrap();
        let encoding_key = EncodingKey::from_ec_pem(key_pair.serialize_pem().as_bytes()).unwrap();
        Self {
            certificate_pem: certificate.pem(),
            encoding_key,
            algorithm,
        }
    }

    pub fn sign(&self, claims: &serde_json::Value) -> String {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key).unwrap()
    }
}

/// What [`FakeSecurityService::fetch_session`] answers.
#[derive(Clone)]
pub(crate) enum SessionReply {
    Found(Session),
    Missing,
    Unreachable,
}

/// In-memory [`SecurityService`] with call counters.
pub(crate) struct FakeSecurityService {
    certificate: Mutex<Option<String>>,
    failing_routes: Mutex<Vec<Route>>,
    session: Mutex<SessionReply>,
    exchange_fails: AtomicBool,
    delay: Duration,
    exchange_delay: Duration,
    direct_calls: AtomicUsize,
    proxy_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    session_calls: AtomicUsize,
}

impl FakeSecurityService {
    pub fn new() -> Self {
        Self {
            certificate: Mutex::new(None),
            failing_routes: Mutex::new(Vec::new()),
            session: Mutex::new(SessionReply::Missing),
            exchange_fails: AtomicBool::new(false),
            delay: Duration::ZERO,
            exchange_delay: Duration::ZERO,
            direct_calls: AtomicUsize::new(0),
            proxy_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            session_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_certificate(self, pem: impl Into<String>) -> Self {
        self.set_certificate(Some(pem.into()));
        self
    }

    pub fn failing(self, route: Route) -> Self {
        self.failing_routes.lock().unwrap().push(route);
        self
    }

    pub fn with_session(self, reply: SessionReply) -> Self {
        *self.session.lock().unwrap() = reply;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Slows only the bearer exchange route.
    pub fn with_exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = delay;
        self
    }

    pub fn set_certificate(&self, pem: Option<String>) {
        *self.certificate.lock().unwrap() = pem;
    }

    pub fn set_exchange_fails(&self, fails: bool) {
        self.exchange_fails.store(fails, Ordering::SeqCst);
    }

    pub fn direct_calls(&self) -> usize {
        self.direct_calls.load(Ordering::SeqCst)
    }

    pub fn proxy_calls(&self) -> usize {
        self.proxy_calls.load(Ordering::SeqCst)
    }

    pub fn certificate_calls(&self) -> usize {
        self.direct_calls() + self.proxy_calls()
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl SecurityService for FakeSecurityService {
    async fn fetch_public_certificate(&self, route: Route) -> Result<String, SecurityServiceError> {
        match route {
            Route::Direct => self.direct_calls.fetch_add(1, Ordering::SeqCst),
            Route::Proxy => self.proxy_calls.fetch_add(1, Ordering::SeqCst),
        };
        self.pause().await;
        if self.failing_routes.lock().unwrap().contains(&route) {
            return Err(SecurityServiceError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        self.certificate
            .lock()
            .unwrap()
            .clone()
            .ok_or(SecurityServiceError::Status(StatusCode::NOT_FOUND))
    }

    async fn exchange_bearer_for_long_token(
        &self,
        bearer_token: &str,
        _caller: &Identity,
    ) -> Result<String, SecurityServiceError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if !self.exchange_delay.is_zero() {
            tokio::time::sleep(self.exchange_delay).await;
        }
        if self.exchange_fails.load(Ordering::SeqCst) {
            return Err(SecurityServiceError::Status(StatusCode::BAD_GATEWAY));
        }
        Ok(format!("long-for-{bearer_token}"))
    }

    async fn fetch_session(&self, _long_token: &str) -> Result<Option<Session>, SecurityServiceError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let reply = self.session.lock().unwrap().clone();
        match reply {
            SessionReply::Found(session) => Ok(Some(session)),
            SessionReply::Missing => Ok(None),
            SessionReply::Unreachable => Err(SecurityServiceError::Timeout(Duration::from_secs(45))),
        }
    }

    async fn resource_health(&self) -> ResourceHealth {
        ResourceHealth {
            status: ResourceHealth::OK.to_string(),
            http_code: 200,
            elapsed_ms: 1,
        }
    }
}

/// Settings with only the required variables set.
pub(crate) fn test_settings() -> AuthSettings {
    AuthSettings::from_lookup(|name| match name {
        SECURITY_SERVICE_URL_ENV => Some("http://security.test".to_string()),
        SECURITY_SHARED_SECRET_ENV => Some("shared-secret".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Application state over a fake security service that serves a fresh
/// signing certificate and answers session lookups with `reply`.
pub(crate) fn test_state(reply: SessionReply) -> (AppState, TestSigner, Arc<FakeSecurityService>) {
    let signer = TestSigner::p256();
    let service = Arc::new(
        FakeSecurityService::new()
            .with_certificate(signer.certificate_pem.clone())
            .with_session(reply),
    );
    let state = AppState::new(&test_settings(), Arc::clone(&service) as Arc<dyn SecurityService>);
    (state, signer, service)
}
