// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated caller representation.

use std::collections::HashMap;

use super::credential::AuthScheme;
use super::dn::{DistinguishedName, DnError};
use crate::security::Session;

/// Well-known attribute names shared by token claims and session projections.
pub mod claims {
    /// Distinguished name of the caller.
    pub const SUBJECT_DN: &str = "OneSourceUserX500";
    pub const UNIVERSAL_ID: &str = "UniversalId";
    pub const TENANT: &str = "Tenant";
    pub const FIRST_NAME: &str = "firstname";
    pub const LAST_NAME: &str = "lastname";
    pub const FULL_NAME: &str = "fullname";
    pub const EMAIL: &str = "emailaddress";
    pub const IS_ADMIN: &str = "IsAdmin";
    pub const ROLE: &str = "role";
    pub const SUBJECT: &str = "sub";
    /// Raw JSON of the session a long-token identity was built from.
    pub const SESSION: &str = "Session";
    pub const SESSION_EMAIL: &str = "Session.EmailAddress";
}

/// Email attribute names in lookup order.
const EMAIL_ATTRIBUTES: [&str; 3] = [claims::SESSION_EMAIL, claims::EMAIL, "email"];

/// The caller subject as published into the request context alongside the
/// [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSubject(pub String);

/// Authenticated caller attached to a request.
///
/// `universal_id` and `tenant_code` are read from the `uid` and `ou`
/// components of the subject DN. A subject without `=` is treated as a bare
/// user id.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub universal_id: String,
    /// Upper-cased `ou` of the subject.
    pub tenant_code: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub scheme: AuthScheme,
    pub attributes: HashMap<String, String>,
}

impl Identity {
    pub fn new(
        subject: impl Into<String>,
        scheme: AuthScheme,
        attributes: HashMap<String, String>,
    ) -> Result<Self, DnError> {
        let subject = subject.into();
        let dn = if subject.contains('=') {
            DistinguishedName::parse(&subject)?
        } else {
            let mut dn = DistinguishedName::new();
            dn.set("uid", &subject);
            dn
        };

        let email = EMAIL_ATTRIBUTES
            .iter()
            .find_map(|name| lookup(&attributes, name).filter(|value| !value.is_empty()))
            .map(str::to_string);

        let roles = lookup(&attributes, claims::ROLE)
            .map(|value| {
                value
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            universal_id: dn.user_id(),
            tenant_code: dn.organizational_unit().to_uppercase(),
            subject,
            email,
            roles,
            scheme,
            attributes,
        })
    }

    /// Attribute value by name; exact match first, then ASCII case-insensitive.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        lookup(&self.attributes, name)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Parsed subject DN.
    pub fn distinguished_name(&self) -> Result<DistinguishedName, DnError> {
        DistinguishedName::parse(&self.subject)
    }

    /// Session this identity was built from, for long-token callers.
    pub fn session(&self) -> Option<Session> {
        self.attributes
            .get(claims::SESSION)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

fn lookup<'a>(attributes: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    attributes
        .get(name)
        .or_else(|| {
            attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}
