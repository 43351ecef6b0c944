// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tenant Session Auth - Multi-tenant Request Authentication
//!
//! Authenticates HTTP requests for a multi-tenant platform. A caller
//! presents either a signed bearer JWT or an opaque long token; both are
//! resolved to a single [`auth::Identity`] carrying the caller's universal
//! id and tenant code.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Scheme dispatch, token validation and identity
//! - `config` - Environment configuration
//! - `security` - Security service client and session model

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod security;
pub mod state;

#[cfg(test)]
mod test_support;
