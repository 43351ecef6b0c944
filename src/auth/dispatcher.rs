// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scheme dispatch and the authentication middleware.
//!
//! The middleware reads the `Authorization` header once, routes the
//! credential to the matching validator and publishes the outcome into the
//! request extensions:
//!
//! - no recognised credential: the request continues unauthenticated
//! - success: [`Identity`], [`RequestSubject`] and [`Credential`] are inserted
//! - failure: the request is answered with a `401` challenge for the scheme
//!   that was presented

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::bearer::BearerTokenValidator;
use super::credential::{AuthScheme, Credential, SchemeNames};
use super::error::{AuthError, AuthFailure};
use super::identity::{Identity, RequestSubject};
use super::long_token::LongTokenValidator;
use crate::state::AppState;

/// Result of running a request through the dispatcher.
#[derive(Debug)]
pub enum AuthOutcome {
    /// No credential for a known scheme; not an error.
    NoResult,
    Authenticated(Identity),
    Failed {
        scheme: AuthScheme,
        failure: AuthFailure,
    },
}

pub struct SchemeDispatcher {
    schemes: SchemeNames,
    bearer: BearerTokenValidator,
    long_token: LongTokenValidator,
}

impl SchemeDispatcher {
    pub fn new(schemes: SchemeNames, bearer: BearerTokenValidator, long_token: LongTokenValidator) -> Self {
        Self {
            schemes,
            bearer,
            long_token,
        }
    }

    pub fn schemes(&self) -> &SchemeNames {
        &self.schemes
    }

    pub fn credential(&self, headers: &HeaderMap) -> Credential {
        Credential::from_headers(headers, &self.schemes)
    }

    /// Authenticate `credential`; `existing` is an identity some earlier
    /// layer already attached to the request.
    pub async fn authenticate(
        &self,
        credential: &Credential,
        headers: &HeaderMap,
        existing: Option<&Identity>,
    ) -> AuthOutcome {
        let (scheme, result) = match credential {
            Credential::None => return AuthOutcome::NoResult,
            Credential::Bearer(token) => (AuthScheme::Bearer, self.bearer.validate(token).await),
            Credential::LongToken(token) => (
                AuthScheme::LongToken,
                self.long_token.validate(token, headers, existing).await,
            ),
        };

        match result {
            Ok(identity) => {
                debug!(
                    scheme = self.schemes.name(scheme),
                    tenant = %identity.tenant_code,
                    "Request authenticated"
                );
                AuthOutcome::Authenticated(identity)
            }
            Err(failure) => {
                warn!(
                    scheme = self.schemes.name(scheme),
                    code = failure.code(),
                    error = %failure,
                    "Authentication failed"
                );
                AuthOutcome::Failed { scheme, failure }
            }
        }
    }

    /// `401` response for a failed credential.
    pub fn reject(&self, scheme: AuthScheme, failure: &AuthFailure) -> AuthError {
        AuthError::rejected(self.schemes.name(scheme), failure)
    }
}

/// Authentication middleware function.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let dispatcher = &state.dispatcher;
    let headers = request.headers().clone();
    let existing = request.extensions().get::<Identity>().cloned();
    let credential = dispatcher.credential(&headers);

    match dispatcher.authenticate(&credential, &headers, existing.as_ref()).await {
        AuthOutcome::NoResult => next.run(request).await,
        AuthOutcome::Authenticated(identity) => {
            let extensions = request.extensions_mut();
            extensions.insert(RequestSubject(identity.subject.clone()));
            extensions.insert(identity);
            extensions.insert(credential);
            next.run(request).await
        }
        AuthOutcome::Failed { scheme, failure } => dispatcher.reject(scheme, &failure).into_response(),
    }
}
