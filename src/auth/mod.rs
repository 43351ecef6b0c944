// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Multi-scheme request authentication backed by the security service.
//!
//! ## Auth Flow
//!
//! 1. A client sends `Authorization: <scheme> <token>` where the scheme is
//!    either `Bearer` (signed JWT) or `UDSLongToken` (opaque session token)
//! 2. The [`dispatcher::authenticate`] middleware parses the header once and
//!    routes the token to the matching validator:
//!    - Bearer: the signature is checked against the certificate published
//!      by the security service, then issuer, audience and lifetime
//!    - Long token: the session is fetched from the security service and
//!      must be live
//! 3. The resulting [`Identity`] is published into the request extensions,
//!    with the caller's universal id and tenant code taken from the subject
//!    distinguished name
//!
//! A bearer caller can trade its token for a long token through the
//! [`exchange::TokenExchangeCache`].
//!
//! ## Security
//!
//! - Token values never reach the logs
//! - Failures answer `401` with a `WWW-Authenticate` challenge; upstream
//!   faults are reported as a generic invalid token
//! - The signing certificate is cached with TTL and fetched single-flight
//! - Clock skew tolerance is 60 seconds

pub mod bearer;
pub mod challenge;
pub mod credential;
pub mod dispatcher;
pub mod dn;
pub mod error;
pub mod exchange;
pub mod extractor;
pub mod identity;
pub mod internal_token;
pub mod long_token;
pub mod signing_key;

pub use challenge::Challenge;
pub use credential::{AuthScheme, Credential, SchemeNames};
pub use dispatcher::{AuthOutcome, SchemeDispatcher};
pub use dn::DistinguishedName;
pub use error::{AuthError, AuthFailure, TokenFailure};
pub use extractor::{Auth, OptionalAuth};
pub use identity::{Identity, RequestSubject};
pub use signing_key::SigningKeyCache;
