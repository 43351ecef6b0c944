// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! settings structs built from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SECURITY_SERVICE_URL` | Base URL of the security service | Required |
//! | `SECURITY_SHARED_SECRET` | HS256 secret for internal requests | Required |
//! | `SECURITY_PROXY_ADDRESS` | Outbound proxy for the signing key retry | Unset |
//! | `SECURITY_SERVICE_TIMEOUT_SECS` | Per-request timeout | `45` |
//! | `JWT_ISSUER` | Expected bearer token issuer | Unset |
//! | `JWT_AUDIENCE` | Expected bearer token audience | Unset |
//! | `JWT_VALIDATE_ISSUER` | Enforce `JWT_ISSUER` | `false` |
//! | `JWT_VALIDATE_AUDIENCE` | Enforce `JWT_AUDIENCE` | `false` |
//! | `JWT_VALIDATE_LIFETIME` | Enforce `exp` / `nbf` | `true` |
//! | `INTERNAL_TOKEN_ISSUER` | Issuer and audience of internal tokens | `JWT_ISSUER`, else `security-service` |
//! | `SIGNING_KEY_CACHE_MINUTES` | Signing key TTL | `30` |
//! | `EXCHANGE_CACHE_MINUTES` | Bearer to long token TTL | `5` |
//! | `EXCHANGE_CACHE_CAPACITY` | Bearer tokens remembered | `10000` |
//! | `BEARER_SCHEME` | Bearer scheme keyword | `Bearer` |
//! | `LONG_TOKEN_SCHEME` | Long token scheme keyword | `UDSLongToken` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::auth::bearer::BearerPolicy;
use crate::auth::credential::{SchemeNames, DEFAULT_BEARER_SCHEME, DEFAULT_LONG_TOKEN_SCHEME};
use crate::security::client::ClientOptions;

pub const SECURITY_SERVICE_URL_ENV: &str = "SECURITY_SERVICE_URL";
pub const SECURITY_SHARED_SECRET_ENV: &str = "SECURITY_SHARED_SECRET";
pub const SECURITY_PROXY_ADDRESS_ENV: &str = "SECURITY_PROXY_ADDRESS";
pub const SECURITY_SERVICE_TIMEOUT_ENV: &str = "SECURITY_SERVICE_TIMEOUT_SECS";
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";
pub const JWT_AUDIENCE_ENV: &str = "JWT_AUDIENCE";
pub const JWT_VALIDATE_ISSUER_ENV: &str = "JWT_VALIDATE_ISSUER";
pub const JWT_VALIDATE_AUDIENCE_ENV: &str = "JWT_VALIDATE_AUDIENCE";
pub const JWT_VALIDATE_LIFETIME_ENV: &str = "JWT_VALIDATE_LIFETIME";
pub const INTERNAL_TOKEN_ISSUER_ENV: &str = "INTERNAL_TOKEN_ISSUER";
pub const SIGNING_KEY_CACHE_MINUTES_ENV: &str = "SIGNING_KEY_CACHE_MINUTES";
pub const EXCHANGE_CACHE_MINUTES_ENV: &str = "EXCHANGE_CACHE_MINUTES";
pub const EXCHANGE_CACHE_CAPACITY_ENV: &str = "EXCHANGE_CACHE_CAPACITY";
pub const BEARER_SCHEME_ENV: &str = "BEARER_SCHEME";
pub const LONG_TOKEN_SCHEME_ENV: &str = "LONG_TOKEN_SCHEME";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Issuer used for internal tokens when neither override is set.
pub const DEFAULT_INTERNAL_ISSUER: &str = "security-service";
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;
pub const DEFAULT_SIGNING_KEY_CACHE_MINUTES: u64 = 30;
pub const DEFAULT_EXCHANGE_CACHE_MINUTES: u64 = 5;
pub const DEFAULT_EXCHANGE_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings for the authentication core.
#[derive(Clone)]
pub struct AuthSettings {
    pub security_service_url: Url,
    pub shared_secret: String,
    pub proxy_address: Option<Url>,
    pub request_timeout: Duration,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_lifetime: bool,
    pub internal_token_issuer: String,
    pub signing_key_ttl: Duration,
    pub exchange_ttl: Duration,
    pub exchange_capacity: usize,
    pub schemes: SchemeNames,
}

impl AuthSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let security_service_url = read(SECURITY_SERVICE_URL_ENV)
            .ok_or(ConfigError::Missing(SECURITY_SERVICE_URL_ENV))
            .and_then(|raw| parse_url(SECURITY_SERVICE_URL_ENV, &raw))?;
        let shared_secret =
            read(SECURITY_SHARED_SECRET_ENV).ok_or(ConfigError::Missing(SECURITY_SHARED_SECRET_ENV))?;
        let proxy_address = read(SECURITY_PROXY_ADDRESS_ENV)
            .map(|raw| parse_url(SECURITY_PROXY_ADDRESS_ENV, &raw))
            .transpose()?;

        let timeout_secs: u64 = parse_or(&read, SECURITY_SERVICE_TIMEOUT_ENV, DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(invalid(SECURITY_SERVICE_TIMEOUT_ENV, "must be greater than zero"));
        }

        let issuer = read(JWT_ISSUER_ENV);
        let audience = read(JWT_AUDIENCE_ENV);
        let validate_issuer = parse_bool(&read, JWT_VALIDATE_ISSUER_ENV, false)?;
        let validate_audience = parse_bool(&read, JWT_VALIDATE_AUDIENCE_ENV, false)?;
        let validate_lifetime = parse_bool(&read, JWT_VALIDATE_LIFETIME_ENV, true)?;
        if validate_issuer && issuer.is_none() {
            return Err(ConfigError::Missing(JWT_ISSUER_ENV));
        }
        if validate_audience && audience.is_none() {
            return Err(ConfigError::Missing(JWT_AUDIENCE_ENV));
        }

        let internal_token_issuer = read(INTERNAL_TOKEN_ISSUER_ENV)
            .or_else(|| issuer.clone())
            .unwrap_or_else(|| DEFAULT_INTERNAL_ISSUER.to_string());

        let signing_key_minutes: u64 =
            parse_or(&read, SIGNING_KEY_CACHE_MINUTES_ENV, DEFAULT_SIGNING_KEY_CACHE_MINUTES)?;
        let exchange_minutes: u64 = parse_or(&read, EXCHANGE_CACHE_MINUTES_ENV, DEFAULT_EXCHANGE_CACHE_MINUTES)?;
        let exchange_capacity: usize =
            parse_or(&read, EXCHANGE_CACHE_CAPACITY_ENV, DEFAULT_EXCHANGE_CACHE_CAPACITY)?;
        if exchange_capacity == 0 {
            return Err(invalid(EXCHANGE_CACHE_CAPACITY_ENV, "must be greater than zero"));
        }

        let schemes = SchemeNames {
            bearer: read(BEARER_SCHEME_ENV).unwrap_or_else(|| DEFAULT_BEARER_SCHEME.to_string()),
            long_token: read(LONG_TOKEN_SCHEME_ENV).unwrap_or_else(|| DEFAULT_LONG_TOKEN_SCHEME.to_string()),
        };
        if schemes.bearer.eq_ignore_ascii_case(&schemes.long_token) {
            return Err(invalid(LONG_TOKEN_SCHEME_ENV, "must differ from BEARER_SCHEME"));
        }
        if schemes.bearer.contains(char::is_whitespace) || schemes.long_token.contains(char::is_whitespace) {
            return Err(invalid(BEARER_SCHEME_ENV, "scheme keywords cannot contain whitespace"));
        }

        Ok(Self {
            security_service_url,
            shared_secret,
            proxy_address,
            request_timeout: Duration::from_secs(timeout_secs),
            issuer,
            audience,
            validate_issuer,
            validate_audience,
            validate_lifetime,
            internal_token_issuer,
            signing_key_ttl: minutes(signing_key_minutes),
            exchange_ttl: minutes(exchange_minutes),
            exchange_capacity,
            schemes,
        })
    }

    pub fn bearer_policy(&self) -> BearerPolicy {
        BearerPolicy {
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            validate_issuer: self.validate_issuer,
            validate_audience: self.validate_audience,
            validate_lifetime: self.validate_lifetime,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.security_service_url.to_string(),
            shared_secret: self.shared_secret.clone(),
            internal_issuer: self.internal_token_issuer.clone(),
            proxy_address: self.proxy_address.as_ref().map(Url::to_string),
            timeout: self.request_timeout,
            schemes: self.schemes.clone(),
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("security_service_url", &self.security_service_url.as_str())
            .field("proxy_address", &self.proxy_address.as_ref().map(Url::as_str))
            .field("request_timeout", &self.request_timeout)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("validate_issuer", &self.validate_issuer)
            .field("validate_audience", &self.validate_audience)
            .field("validate_lifetime", &self.validate_lifetime)
            .field("internal_token_issuer", &self.internal_token_issuer)
            .field("signing_key_ttl", &self.signing_key_ttl)
            .field("exchange_ttl", &self.exchange_ttl)
            .field("exchange_capacity", &self.exchange_capacity)
            .field("schemes", &self.schemes)
            .finish_non_exhaustive()
    }
}

/// Logging output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// HTTP listener and logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let log_format = match read(LOG_FORMAT_ENV).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        Ok(Self {
            host: read(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&read, PORT_ENV, DEFAULT_PORT)?,
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| invalid(name, e.to_string()))
}

fn parse_or<T, R>(read: &R, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    R: Fn(&str) -> Option<String>,
{
    match read(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(name, e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool<R>(read: &R, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    R: Fn(&str) -> Option<String>,
{
    match read(name).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(invalid(name, format!("expected a boolean, got {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<AuthSettings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthSettings::from_lookup(|name| vars.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        (SECURITY_SERVICE_URL_ENV, "https://security.test"),
        (SECURITY_SHARED_SECRET_ENV, "s3cret"),
    ];

    #[test]
    fn defaults_apply() {
        let settings = settings(&REQUIRED).unwrap();
        assert_eq!(settings.request_timeout, Duration::from_secs(45));
        assert_eq!(settings.signing_key_ttl, Duration::from_secs(30 * 60));
        assert_eq!(settings.exchange_ttl, Duration::from_secs(5 * 60));
        assert_eq!(settings.exchange_capacity, 10_000);
        assert!(settings.validate_lifetime);
        assert!(!settings.validate_issuer);
        assert!(!settings.validate_audience);
        assert_eq!(settings.internal_token_issuer, "security-service");
        assert_eq!(settings.schemes, SchemeNames::default());
        assert!(settings.proxy_address.is_none());
    }

    #[test]
    fn required_values_are_enforced() {
        assert_eq!(settings(&[]).unwrap_err(), ConfigError::Missing(SECURITY_SERVICE_URL_ENV));
        assert_eq!(
            settings(&[(SECURITY_SERVICE_URL_ENV, "https://security.test")]).unwrap_err(),
            ConfigError::Missing(SECURITY_SHARED_SECRET_ENV)
        );
        assert!(matches!(
            settings(&[(SECURITY_SERVICE_URL_ENV, "not a url"), (SECURITY_SHARED_SECRET_ENV, "s")]),
            Err(ConfigError::Invalid { name: SECURITY_SERVICE_URL_ENV, .. })
        ));
    }

    #[test]
    fn enabled_checks_need_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((JWT_VALIDATE_ISSUER_ENV, "true"));
        assert_eq!(settings(&pairs).unwrap_err(), ConfigError::Missing(JWT_ISSUER_ENV));

        pairs.push((JWT_ISSUER_ENV, "https://issuer.test"));
        let settings = settings(&pairs).unwrap();
        assert!(settings.bearer_policy().validate_issuer);
        assert_eq!(settings.internal_token_issuer, "https://issuer.test");
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            (SECURITY_PROXY_ADDRESS_ENV, "http://proxy.test:3128"),
            (SECURITY_SERVICE_TIMEOUT_ENV, "5"),
            (JWT_VALIDATE_LIFETIME_ENV, "FALSE"),
            (INTERNAL_TOKEN_ISSUER_ENV, "internal"),
            (EXCHANGE_CACHE_MINUTES_ENV, "1"),
            (BEARER_SCHEME_ENV, "JWT"),
        ]);
        let settings = settings(&pairs).unwrap();
        assert_eq!(settings.request_timeout, Duration::from_secs(5));
        assert!(!settings.validate_lifetime);
        assert_eq!(settings.internal_token_issuer, "internal");
        assert_eq!(settings.exchange_ttl, Duration::from_secs(60));
        assert_eq!(settings.schemes.bearer, "JWT");

        let options = settings.client_options();
        assert_eq!(options.proxy_address.as_deref(), Some("http://proxy.test:3128/"));
        assert_eq!(options.internal_issuer, "internal");
    }

    #[test]
    fn malformed_numbers_and_flags_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((SIGNING_KEY_CACHE_MINUTES_ENV, "soon"));
        assert!(matches!(
            settings(&pairs),
            Err(ConfigError::Invalid { name: SIGNING_KEY_CACHE_MINUTES_ENV, .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push((JWT_VALIDATE_AUDIENCE_ENV, "maybe"));
        assert!(matches!(
            settings(&pairs),
            Err(ConfigError::Invalid { name: JWT_VALIDATE_AUDIENCE_ENV, .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push((LONG_TOKEN_SCHEME_ENV, "bearer"));
        assert!(settings(&pairs).is_err());
    }

    #[test]
    fn debug_hides_shared_secret() {
        let rendered = format!("{:?}", settings(&REQUIRED).unwrap());
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn server_settings_defaults_and_overrides() {
        let server = ServerSettings::from_lookup(|_| None).unwrap();
        assert_eq!(server.bind_address(), "0.0.0.0:8080");
        assert_eq!(server.log_format, LogFormat::Pretty);

        let server = ServerSettings::from_lookup(|name| match name {
            PORT_ENV => Some("9090".into()),
            LOG_FORMAT_ENV => Some("JSON".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(server.port, 9090);
        assert_eq!(server.log_format, LogFormat::Json);

        assert!(ServerSettings::from_lookup(|name| (name == PORT_ENV).then(|| "nope".into())).is_err());
    }
}
