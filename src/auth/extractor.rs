// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(identity): Auth) -> impl IntoResponse {
//!     // identity is Identity
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::challenge::Challenge;
use super::credential::AuthScheme;
use super::dispatcher::AuthOutcome;
use super::error::AuthError;
use super::identity::{Identity, RequestSubject};
use crate::state::AppState;

/// Extractor for authenticated callers.
///
/// Reuses the identity published by the authentication middleware. Routes
/// mounted without the middleware run the dispatcher inline, so the
/// extractor behaves the same either way.
///
/// A request without a credential is rejected with a bare challenge for
/// the bearer scheme.
pub struct Auth(pub Identity);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(Auth(identity));
        }

        let dispatcher = &state.dispatcher;
        let credential = dispatcher.credential(&parts.headers);
        match dispatcher.authenticate(&credential, &parts.headers, None).await {
            AuthOutcome::NoResult => Err(AuthError::MissingCredential(Challenge::new(
                dispatcher.schemes().name(AuthScheme::Bearer),
            ))),
            AuthOutcome::Authenticated(identity) => {
                parts.extensions.insert(RequestSubject(identity.subject.clone()));
                parts.extensions.insert(identity.clone());
                parts.extensions.insert(credential);
                Ok(Auth(identity))
            }
            AuthOutcome::Failed { scheme, failure } => Err(dispatcher.reject(scheme, &failure)),
        }
    }
}

/// Optional authentication extractor.
///
/// Returns `None` if no valid authentication is present, instead of rejecting.
pub struct OptionalAuth(pub Option<Identity>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(identity)) => Ok(OptionalAuth(Some(identity))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}
