// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Long-token validation against the security service session store.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::credential::AuthScheme;
use super::dn::DistinguishedName;
use super::error::AuthFailure;
use super::identity::{claims, Identity};
use crate::security::{SecurityService, Session};

/// Request headers copied into a long-token identity.
struct HeaderClaim {
    name: &'static str,
    default: Option<&'static str>,
    lowercase: bool,
}

const HEADER_CLAIMS: [HeaderClaim; 4] = [
    HeaderClaim {
        name: "X-LoneStar-AccountId",
        default: None,
        lowercase: false,
    },
    HeaderClaim {
        name: "X-LoneStar-IsCMEnabled",
        default: None,
        lowercase: true,
    },
    HeaderClaim {
        name: "X-LoneStar-Product-FirmId",
        default: None,
        lowercase: false,
    },
    HeaderClaim {
        name: "X-LoneStar-Culture",
        default: Some("en-US"),
        lowercase: false,
    },
];

pub struct LongTokenValidator {
    service: Arc<dyn SecurityService>,
}

impl LongTokenValidator {
    pub fn new(service: Arc<dyn SecurityService>) -> Self {
        Self { service }
    }

    /// Resolve `token` to its session and build the caller identity.
    ///
    /// An identity already attached to the request wins; the session store
    /// is not consulted.
    pub async fn validate(
        &self,
        token: &str,
        headers: &HeaderMap,
        existing: Option<&Identity>,
    ) -> Result<Identity, AuthFailure> {
        if let Some(identity) = existing {
            debug!("Request already authenticated, skipping long token lookup");
            return Ok(identity.clone());
        }

        let session = self
            .service
            .fetch_session(token)
            .await
            .inspect_err(|e| warn!(error = %e, "Long token session lookup failed"))?
            .ok_or_else(|| {
                warn!("Long token has no session");
                AuthFailure::SessionRejected
            })?;

        if !session.is_active_at(Utc::now()) {
            warn!(
                status = %session.status,
                session_id = session.session_id.as_deref().unwrap_or_default(),
                "Long token session is not active"
            );
            return Err(AuthFailure::SessionRejected);
        }

        let mut attributes = session_attributes(&session)?;
        add_header_claims(&mut attributes, headers);
        let subject = session.subject.clone().unwrap_or_default();
        Ok(Identity::new(subject, AuthScheme::LongToken, attributes)?)
    }
}

/// Flatten a session into identity attributes.
///
/// Absent and empty values are omitted. The whole session is kept as JSON
/// under [`claims::SESSION`].
pub fn session_attributes(session: &Session) -> Result<HashMap<String, String>, AuthFailure> {
    let mut attributes = HashMap::new();

    insert(&mut attributes, "SessionId", session.session_id.clone());
    insert(&mut attributes, "EventManagerId", session.event_manager_id.clone());
    insert(&mut attributes, "Site", session.site.clone());
    insert(&mut attributes, "Status", Some(session.status.to_string()));
    insert(&mut attributes, "LongToken", session.long_token.clone());
    insert(&mut attributes, "ExpiresReason", Some(session.expires_reason.to_string()));
    insert(
        &mut attributes,
        "SessionEndedReason",
        Some(session.session_ended_reason.to_string()),
    );
    insert(&mut attributes, claims::FIRST_NAME, session.display_name());
    insert(&mut attributes, claims::FULL_NAME, session.full_name.clone());
    insert(&mut attributes, claims::EMAIL, session.email_address.clone());
    insert(&mut attributes, claims::SUBJECT_DN, session.subject.clone());

    if let Some(subject) = session.subject.as_deref().filter(|s| !s.is_empty()) {
        let dn = DistinguishedName::parse(subject)?;
        insert(&mut attributes, claims::UNIVERSAL_ID, Some(dn.user_id()));
        insert(&mut attributes, claims::TENANT, Some(dn.organizational_unit()));
    }

    for (name, timestamp) in [
        ("CreatedDateTime", session.created_date_time),
        ("ExpiresDateTime", session.expires_date_time),
        ("OrphanExpiresDateTime", session.orphan_expires_date_time),
        ("SessionEndedDateTime", session.session_ended_date_time),
        ("SessionExpiresDateTime", session.session_expires_date_time),
    ] {
        insert(&mut attributes, name, timestamp.as_ref().map(DateTime::<Utc>::to_rfc3339));
    }

    insert(&mut attributes, "Tier", Some(session.tier.to_string()));
    insert(&mut attributes, "SessionSource", Some(session.session_source.to_string()));
    insert(&mut attributes, "IpAddress", session.ip_address.clone());
    insert(&mut attributes, "UserCategory", Some(session.user_category.to_string()));

    if let Ok(raw) = serde_json::to_string(session) {
        attributes.insert(claims::SESSION.to_string(), raw);
    }
    Ok(attributes)
}

fn insert(attributes: &mut HashMap<String, String>, name: &str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        attributes.insert(name.to_string(), value);
    }
}

fn add_header_claims(attributes: &mut HashMap<String, String>, headers: &HeaderMap) {
    for claim in &HEADER_CLAIMS {
        let value = headers
            .get(claim.name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or(claim.default);
        if let Some(value) = value {
            let value = if claim.lowercase {
                value.to_lowercase()
            } else {
                value.to_string()
            };
            attributes.insert(claim.name.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{SessionSource, SessionStatus};
    use crate::test_support::{FakeSecurityService, SessionReply};
    use axum::http::{HeaderName, HeaderValue};
    use chrono::Duration;

    fn live_session() -> Session {
        let now = Utc::now();
        Session {
            session_id: Some("s-1".into()),
            status: SessionStatus::Authenticated,
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            full_name: Some("Dr. Jane Q. Doe".into()),
            email_address: Some("jane@acme.test".into()),
            subject: Some("uid=jdoe,ou=acme".into()),
            long_token: Some("tok".into()),
            expires_date_time: Some(now + Duration::hours(1)),
            session_expires_date_time: Some(now + Duration::hours(1)),
            session_source: SessionSource::WEB,
            tier: 1,
            ..Session::default()
        }
    }

    fn validator_with(reply: SessionReply) -> (LongTokenValidator, Arc<FakeSecurityService>) {
        let service = Arc::new(FakeSecurityService::new().with_session(reply));
        (
            LongTokenValidator::new(Arc::clone(&service) as Arc<dyn SecurityService>),
            service,
        )
    }

    #[tokio::test]
    async fn active_session_yields_identity() {
        let (validator, _) = validator_with(SessionReply::Found(live_session()));
        let mut headers = HeaderMap::new();
        for (name, value) in [("X-LoneStar-AccountId", "acct-9"), ("X-LoneStar-IsCMEnabled", "True")] {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }

        let identity = validator.validate("tok", &headers, None).await.unwrap();
        assert_eq!(identity.universal_id, "jdoe");
        assert_eq!(identity.tenant_code, "ACME");
        assert_eq!(identity.scheme, AuthScheme::LongToken);
        assert_eq!(identity.email.as_deref(), Some("jane@acme.test"));
        assert_eq!(identity.attribute("Status"), Some("Authenticated"));
        assert_eq!(identity.attribute("firstname"), Some("Jane Doe"));
        assert_eq!(identity.attribute("fullname"), Some("Dr. Jane Q. Doe"));
        assert_eq!(identity.attribute("SessionSource"), Some("Web"));
        assert_eq!(identity.attribute("Tenant"), Some("acme"));
        assert_eq!(identity.attribute("X-LoneStar-AccountId"), Some("acct-9"));
        assert_eq!(identity.attribute("X-LoneStar-IsCMEnabled"), Some("true"));
        assert_eq!(identity.attribute("X-LoneStar-Culture"), Some("en-US"));
        assert_eq!(identity.attribute("X-LoneStar-Product-FirmId"), None);
        assert_eq!(identity.session().and_then(|s| s.session_id), Some("s-1".to_string()));
    }

    #[tokio::test]
    async fn inactive_status_is_rejected() {
        for status in [SessionStatus::Killed, SessionStatus::Offline, SessionStatus::NotSet] {
            let session = Session { status, ..live_session() };
            let (validator, _) = validator_with(SessionReply::Found(session));
            let failure = validator.validate("tok", &HeaderMap::new(), None).await.unwrap_err();
            assert!(matches!(failure, AuthFailure::SessionRejected));
        }
    }

    #[tokio::test]
    async fn lapsed_expiry_is_rejected() {
        let past = Some(Utc::now() - Duration::seconds(5));
        let sessions = [
            Session { expires_date_time: past, ..live_session() },
            Session { orphan_expires_date_time: past, ..live_session() },
            Session { session_expires_date_time: past, ..live_session() },
        ];
        for session in sessions {
            let (validator, _) = validator_with(SessionReply::Found(session));
            assert!(validator.validate("tok", &HeaderMap::new(), None).await.is_err());
        }
    }

    #[tokio::test]
    async fn missing_session_and_outage_are_rejected() {
        let (validator, _) = validator_with(SessionReply::Missing);
        let failure = validator.validate("tok", &HeaderMap::new(), None).await.unwrap_err();
        assert!(matches!(failure, AuthFailure::SessionRejected));

        let (validator, _) = validator_with(SessionReply::Unreachable);
        let failure = validator.validate("tok", &HeaderMap::new(), None).await.unwrap_err();
        assert!(matches!(failure, AuthFailure::SecurityService(_)));
        assert_eq!(failure.error_description(), "Invalid token");
    }

    #[tokio::test]
    async fn existing_identity_short_circuits() {
        let (validator, service) = validator_with(SessionReply::Missing);
        let existing = Identity::new("uid=x,ou=y", AuthScheme::Bearer, HashMap::new()).unwrap();

        let identity = validator
            .validate("tok", &HeaderMap::new(), Some(&existing))
            .await
            .unwrap();
        assert_eq!(identity, existing);
        assert_eq!(service.session_calls(), 0);
    }

    #[tokio::test]
    async fn corrupt_subject_is_rejected() {
        let session = Session {
            subject: Some("uid=\"open".into()),
            ..live_session()
        };
        let (validator, _) = validator_with(SessionReply::Found(session));
        let failure = validator.validate("tok", &HeaderMap::new(), None).await.unwrap_err();
        assert!(matches!(failure, AuthFailure::Subject(_)));
    }

    #[test]
    fn projection_skips_absent_values() {
        let attributes = session_attributes(&Session::default()).unwrap();
        assert!(!attributes.contains_key("SessionId"));
        assert!(!attributes.contains_key(claims::FULL_NAME));
        assert!(!attributes.contains_key("ExpiresDateTime"));
        assert!(!attributes.contains_key(claims::UNIVERSAL_ID));
        assert_eq!(attributes.get("Status").map(String::as_str), Some("NotSet"));
        assert_eq!(attributes.get("UserCategory").map(String::as_str), Some("NormalUser"));
        assert!(attributes.contains_key(claims::SESSION));
    }
}
