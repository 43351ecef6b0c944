// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller session endpoints.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::exchange::ExchangeError;
use crate::auth::{Auth, AuthScheme, Identity};
use crate::error::ApiError;
use crate::state::AppState;

/// Response for GET /v1/session/me
#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    /// Subject distinguished name.
    pub subject: String,
    /// Caller's universal id (`uid` of the subject).
    pub universal_id: String,
    /// Tenant code (upper-cased `ou` of the subject).
    pub tenant_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub roles: Vec<String>,
    /// Scheme the caller authenticated with.
    pub scheme: AuthScheme,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            subject: identity.subject,
            universal_id: identity.universal_id,
            tenant_code: identity.tenant_code,
            email: identity.email,
            roles: identity.roles,
            scheme: identity.scheme,
        }
    }
}

/// Response for POST /v1/session/long-token
#[derive(Debug, Serialize, ToSchema)]
pub struct LongTokenResponse {
    pub long_token: String,
    /// Authorization scheme to send the long token with.
    pub scheme: String,
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::EmptyBearerToken | ExchangeError::NoCredential => {
                ApiError::bad_request(err.to_string())
            }
            ExchangeError::Service(e) => {
                warn!(error = %e, "Long token exchange failed");
                ApiError::bad_gateway("Token exchange failed")
            }
        }
    }
}

/// Get the current caller's identity.
#[utoipa::path(
    get,
    path = "/v1/session/me",
    tag = "Session",
    security(("bearer" = []), ("long_token" = [])),
    responses(
        (status = 200, description = "Caller identity", body = IdentityResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_identity(Auth(identity): Auth) -> Json<IdentityResponse> {
    Json(identity.into())
}

/// Long token for the current caller.
///
/// A long-token caller gets its own token back. A bearer caller gets the
/// long token the security service issued for its bearer token, cached
/// per token.
#[utoipa::path(
    post,
    path = "/v1/session/long-token",
    tag = "Session",
    security(("bearer" = []), ("long_token" = [])),
    responses(
        (status = 200, description = "Long token for the caller", body = LongTokenResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 502, description = "Security service rejected the exchange", body = crate::error::ErrorBody),
    )
)]
pub async fn issue_long_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Auth(identity): Auth,
) -> Result<Json<LongTokenResponse>, ApiError> {
    let credential = state.dispatcher.credential(&headers);
    let long_token = state.exchange.resolve_long_token(&credential, &identity).await?;
    Ok(Json(LongTokenResponse {
        long_token,
        scheme: state.dispatcher.schemes().name(AuthScheme::LongToken).to_string(),
    }))
}
