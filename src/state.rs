// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::bearer::BearerTokenValidator;
use crate::auth::dispatcher::SchemeDispatcher;
use crate::auth::exchange::TokenExchangeCache;
use crate::auth::long_token::LongTokenValidator;
use crate::auth::signing_key::SigningKeyCache;
use crate::config::AuthSettings;
use crate::security::{SecurityService, SecurityServiceClient, SecurityServiceError};

#[derive(Clone)]
pub struct AppState {
    pub security: Arc<dyn SecurityService>,
    pub signing_keys: Arc<SigningKeyCache>,
    pub exchange: Arc<TokenExchangeCache>,
    pub dispatcher: Arc<SchemeDispatcher>,
}

impl AppState {
    /// Wire the caches and validators around `security`.
    pub fn new(settings: &AuthSettings, security: Arc<dyn SecurityService>) -> Self {
        let signing_keys = Arc::new(SigningKeyCache::new(Arc::clone(&security), settings.signing_key_ttl));
        let exchange = Arc::new(TokenExchangeCache::new(
            Arc::clone(&security),
            settings.exchange_capacity,
            settings.exchange_ttl,
        ));
        let dispatcher = Arc::new(SchemeDispatcher::new(
            settings.schemes.clone(),
            BearerTokenValidator::new(Arc::clone(&signing_keys), settings.bearer_policy()),
            LongTokenValidator::new(Arc::clone(&security)),
        ));

        Self {
            security,
            signing_keys,
            exchange,
            dispatcher,
        }
    }

    /// State backed by the HTTP security service client.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, SecurityServiceError> {
        let client = SecurityServiceClient::new(settings.client_options())?;
        Ok(Self::new(settings, Arc::new(client)))
    }
}
