// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session record exchanged with the security service.
//!
//! Field names are PascalCase on the wire. Enumerations are accepted either as
//! their numeric code or their name and are always written back as the code.
//! Timestamps accept RFC 3339 or a naive ISO-8601 value (read as UTC), and the
//! platform minimum date (`0001-01-01T00:00:00`) is treated as "not set".

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::auth::identity::{claims, Identity};

/// Lifetime of a newly created session before it must be renewed.
pub const SESSION_LIFETIME: Duration = Duration::hours(24);

/// How long a session survives once no client is attached to it.
pub const ORPHAN_LIFETIME: Duration = Duration::minutes(30);

/// Site code stamped on sessions created through token exchange.
pub const DEFAULT_SITE: &str = "B";

/// Tier stamped on sessions created through token exchange.
pub const DEFAULT_TIER: i32 = 1;

#[derive(Deserialize)]
#[serde(untagged)]
enum WireValue {
    Code(u64),
    Name(String),
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $first:ident = $first_code:literal
            $(, $variant:ident = $code:literal)* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $first = $first_code,
            $($variant = $code,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$name::$first, $($name::$variant,)*];

            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $name::$first => stringify!($first),
                    $($name::$variant => stringify!($variant),)*
                }
            }

            pub fn from_code(code: u64) -> Option<Self> {
                Self::ALL.iter().copied().find(|value| u64::from(value.code()) == code)
            }

            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|value| value.as_str().eq_ignore_ascii_case(name.trim()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$first
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match WireValue::deserialize(deserializer)? {
                    WireValue::Code(code) => Self::from_code(code).ok_or_else(|| {
                        de::Error::custom(format!("unknown {} code {code}", stringify!($name)))
                    }),
                    WireValue::Name(name) => Self::from_name(&name).ok_or_else(|| {
                        de::Error::custom(format!("unknown {} name {name:?}", stringify!($name)))
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Lifecycle state of a session.
    pub enum SessionStatus {
        NotSet = 0,
        Online = 1,
        Offline = 2,
        Killed = 3,
        Authenticated = 4,
        OfflineStale = 5,
    }
}

impl SessionStatus {
    /// Only these states admit a request.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Online | Self::Authenticated)
    }
}

wire_enum! {
    /// Why a session expired or ended.
    pub enum SessionExpireReason {
        NotSet = 0,
        ConcurrentUsers = 1,
        CustomerSupport = 2,
        SsoTokenExpired = 3,
        UserSignedOff = 4,
        UserInactivity = 5,
        NoActiveBrowser = 6,
        Maintenance = 7,
        UserThrottling = 8,
        TargetedUser = 9,
        IncompleteSignon = 10,
        UserInactiveOffline = 11,
    }
}

wire_enum! {
    /// Kind of user that owns a session.
    pub enum UserCategory {
        NormalUser = 0,
        PortalAdmin = 1,
        SupportUser = 2,
        Testing = 3,
        Monitoring = 4,
        DevOps = 5,
    }
}

/// Bit flags describing where a session originated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SessionSource(u32);

impl SessionSource {
    pub const NONE: Self = Self(0);
    pub const WEB: Self = Self(1);
    pub const MOBILE_WEB: Self = Self(2);
    pub const DESKTOP: Self = Self(4);
    pub const ADMIN: Self = Self(8);
    pub const TESTING: Self = Self(16);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::WEB, "Web"),
        (Self::MOBILE_WEB, "MobileWeb"),
        (Self::DESKTOP, "Desktop"),
        (Self::ADMIN, "Admin"),
        (Self::TESTING, "Testing"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse a comma separated list of flag names, e.g. `"Web, Desktop"`.
    pub fn from_names(text: &str) -> Option<Self> {
        text.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("None"))
            .try_fold(Self::NONE, |acc, name| {
                Self::NAMED
                    .iter()
                    .find(|(_, known)| known.eq_ignore_ascii_case(name))
                    .map(|(flag, _)| acc | *flag)
            })
    }
}

impl std::ops::BitOr for SessionSource {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("None");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        let unnamed = self.0 & !Self::NAMED.iter().fold(0, |acc, (flag, _)| acc | flag.0);
        if names.is_empty() || unnamed != 0 {
            return write!(f, "{}", self.0);
        }
        f.write_str(&names.join(", "))
    }
}

impl Serialize for SessionSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for SessionSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WireValue::deserialize(deserializer)? {
            WireValue::Code(code) => u32::try_from(code)
                .map(Self)
                .map_err(|_| de::Error::custom(format!("session source {code} out of range"))),
            WireValue::Name(names) => Self::from_names(&names)
                .ok_or_else(|| de::Error::custom(format!("unknown session source {names:?}"))),
        }
    }
}

/// Optional timestamp codec.
mod wire_time {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(timestamp) => serializer.serialize_str(&timestamp.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            Some(text) => parse(&text).map_err(de::Error::custom),
            None => Ok(None),
        }
    }

    pub(super) fn parse(text: &str) -> Result<Option<DateTime<Utc>>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let parsed = DateTime::parse_from_rfc3339(text)
            .map(|timestamp| timestamp.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
            })
            .map_err(|e| format!("invalid timestamp {text:?}: {e}"))?;

        // Year 1 is the platform's "unset" sentinel.
        if parsed.year() <= 1 {
            Ok(None)
        } else {
            Ok(Some(parsed))
        }
    }
}

/// A session as stored by the security service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_manager_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_token: Option<String>,
    #[serde(default)]
    pub expires_reason: SessionExpireReason,
    #[serde(default)]
    pub session_ended_reason: SessionExpireReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    /// Distinguished name of the owning user.
    #[serde(
        rename = "OneSourceUserX500",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subject: Option<String>,
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub expires_date_time: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub orphan_expires_date_time: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub session_ended_date_time: Option<DateTime<Utc>>,
    #[serde(default, with = "wire_time", skip_serializing_if = "Option::is_none")]
    pub session_expires_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tier: i32,
    #[serde(default)]
    pub session_source: SessionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_category: UserCategory,
}

impl Session {
    /// Whether the session admits a request at `now`.
    ///
    /// The status must be online or authenticated, and none of the expiry
    /// timestamps that are set may have passed.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if !self.status.is_active() {
            return false;
        }
        [
            self.expires_date_time,
            self.orphan_expires_date_time,
            self.session_expires_date_time,
            self.session_ended_date_time,
        ]
        .into_iter()
        .flatten()
        .all(|deadline| now < deadline)
    }

    /// `first last` when either half is present.
    pub fn display_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }

    /// Session-creation payload posted when a bearer caller exchanges its
    /// token for a long token.
    pub fn for_caller(caller: &Identity, now: DateTime<Utc>) -> Self {
        let is_admin = caller.attribute(claims::IS_ADMIN).is_some();
        let first_name = caller.attribute(claims::FIRST_NAME).map(str::to_string);
        let last_name = caller.attribute(claims::LAST_NAME).map(str::to_string);

        let mut session = Self {
            session_id: Some(Uuid::new_v4().simple().to_string()),
            site: Some(DEFAULT_SITE.to_string()),
            status: SessionStatus::Authenticated,
            first_name,
            last_name,
            email_address: caller.email.clone(),
            subject: Some(caller.subject.clone()),
            created_date_time: Some(now),
            expires_date_time: Some(now + SESSION_LIFETIME),
            session_expires_date_time: Some(now + SESSION_LIFETIME),
            orphan_expires_date_time: Some(now + ORPHAN_LIFETIME),
            tier: DEFAULT_TIER,
            session_source: SessionSource::WEB,
            user_category: if is_admin {
                UserCategory::PortalAdmin
            } else {
                UserCategory::NormalUser
            },
            ..Self::default()
        };
        session.full_name = caller
            .attribute(claims::FULL_NAME)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| session.display_name());
        session
    }
}
