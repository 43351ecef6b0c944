// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the security service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Proxy, RequestBuilder, StatusCode};
use tracing::{error, info, warn};

use super::{ResourceHealth, Route, SecurityService, SecurityServiceError, Session};
use crate::auth::credential::SchemeNames;
use crate::auth::identity::Identity;
use crate::auth::internal_token::InternalTokenSigner;

pub const SESSIONS_PATH: &str = "/api/security/v1/sessions";
pub const PUBLIC_KEY_PATH: &str = "/api/security/v1/publickey";
pub const RESOURCE_CHECK_PATH: &str = "/api/security/v1/resourcecheck";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);

/// Connection settings for [`SecurityServiceClient`].
#[derive(Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub shared_secret: String,
    pub internal_issuer: String,
    pub proxy_address: Option<String>,
    pub timeout: Duration,
    pub schemes: SchemeNames,
}

#[derive(Debug, Clone)]
pub struct SecurityServiceClient {
    base_url: String,
    timeout: Duration,
    schemes: SchemeNames,
    signer: InternalTokenSigner,
    /// Never uses a proxy, even one set in the environment.
    direct: Client,
    /// Present only when an outbound proxy is configured.
    proxied: Option<Client>,
}

impl SecurityServiceClient {
    pub fn new(options: ClientOptions) -> Result<Self, SecurityServiceError> {
        let direct = Client::builder()
            .timeout(options.timeout)
            .no_proxy()
            .build()
            .map_err(|e| SecurityServiceError::Config(format!("failed to build HTTP client: {e}")))?;

        let proxied = options
            .proxy_address
            .as_deref()
            .map(|address| {
                let proxy = Proxy::all(address)
                    .map_err(|e| SecurityServiceError::Config(format!("invalid proxy address: {e}")))?;
                Client::builder()
                    .timeout(options.timeout)
                    .proxy(proxy)
                    .build()
                    .map_err(|e| {
                        SecurityServiceError::Config(format!("failed to build proxied HTTP client: {e}"))
                    })
            })
            .transpose()?;

        Ok(Self {
            base_url: options.base_url.trim_end_matches('/').to_string(),
            timeout: options.timeout,
            schemes: options.schemes,
            signer: InternalTokenSigner::new(&options.shared_secret, options.internal_issuer),
            direct,
            proxied,
        })
    }

    pub fn has_proxy(&self) -> bool {
        self.proxied.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorization(&self, scheme: &str, token: &str) -> String {
        format!("{scheme} {token}")
    }

    /// Send a request and read the whole body.
    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), SecurityServiceError> {
        let started = Instant::now();
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(operation, started, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(operation, started, e))?;

        info!(
            operation,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms(started),
            "Security service call completed"
        );
        Ok((status, body))
    }

    fn transport_error(
        &self,
        operation: &'static str,
        started: Instant,
        error: reqwest::Error,
    ) -> SecurityServiceError {
        let error = SecurityServiceError::from_reqwest(error, self.timeout);
        error!(
            operation,
            elapsed_ms = elapsed_ms(started),
            error = %error,
            "Security service call failed"
        );
        error
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Responses carrying a single value are JSON strings.
fn json_string(body: &str, what: &str) -> Result<String, SecurityServiceError> {
    let value: String = serde_json::from_str(body)
        .map_err(|e| SecurityServiceError::InvalidResponse(format!("{what} is not a JSON string: {e}")))?;
    if value.trim().is_empty() {
        return Err(SecurityServiceError::InvalidResponse(format!("{what} is empty")));
    }
    Ok(value)
}

#[async_trait]
impl SecurityService for SecurityServiceClient {
    async fn fetch_public_certificate(&self, route: Route) -> Result<String, SecurityServiceError> {
        let client = match route {
            Route::Direct => &self.direct,
            Route::Proxy => self.proxied.as_ref().unwrap_or(&self.direct),
        };
        let token = self.signer.sign()?;
        let request = client
            .get(self.endpoint(PUBLIC_KEY_PATH))
            .header(AUTHORIZATION, self.authorization(&self.schemes.bearer, &token));

        let (status, body) = self.execute("fetch_public_certificate", request).await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), ?route, "Signing certificate request rejected");
            return Err(SecurityServiceError::Status(status));
        }
        json_string(&body, "signing certificate")
    }

    async fn exchange_bearer_for_long_token(
        &self,
        bearer_token: &str,
        caller: &Identity,
    ) -> Result<String, SecurityServiceError> {
        let payload = Session::for_caller(caller, chrono::Utc::now());
        let request = self
            .direct
            .post(self.endpoint(SESSIONS_PATH))
            .header(AUTHORIZATION, self.authorization(&self.schemes.bearer, bearer_token))
            .json(&payload);

        let (status, body) = self.execute("exchange_bearer_for_long_token", request).await?;
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                tenant = %caller.tenant_code,
                "Session creation rejected"
            );
            return Err(SecurityServiceError::Status(status));
        }
        json_string(&body, "long token")
    }

    async fn fetch_session(&self, long_token: &str) -> Result<Option<Session>, SecurityServiceError> {
        let request = self
            .direct
            .get(self.endpoint(SESSIONS_PATH))
            .header(AUTHORIZATION, self.authorization(&self.schemes.long_token, long_token));

        let (status, body) = self.execute("fetch_session", request).await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Session lookup rejected");
            return Ok(None);
        }
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<Session>>(&body)
            .map_err(|e| SecurityServiceError::InvalidResponse(format!("session body: {e}")))
    }

    async fn resource_health(&self) -> ResourceHealth {
        let started = Instant::now();
        let result = self.direct.get(self.endpoint(RESOURCE_CHECK_PATH)).send().await;
        let elapsed_ms = elapsed_ms(started);

        match result {
            Ok(response) if response.status().is_success() => ResourceHealth {
                status: ResourceHealth::OK.to_string(),
                http_code: response.status().as_u16(),
                elapsed_ms,
            },
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Security service resource check failed");
                ResourceHealth {
                    status: ResourceHealth::FAILED.to_string(),
                    http_code: response.status().as_u16(),
                    elapsed_ms,
                }
            }
            Err(e) => {
                error!(error = %e, "Security service resource check errored");
                ResourceHealth {
                    status: format!("Error: {e}"),
                    http_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    elapsed_ms,
                }
            }
        }
    }
}
