// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity Auth Server - ES256 Token Authentication & Identity Service
//!
//! Issues and validates ES256 tokens, reconciles OAuth and local logins into
//! one canonical identity per person, and gates routes by role.
//!
//! ## Modules
//!
//! - `auth` - Signing keys, token issue/validate, authorization gate
//! - `identity` - Canonical identities and the upsert engine
//! - `storage` - redb-backed identity repository
//! - `oauth` - External login providers (LINE)
//! - `api` - HTTP API handlers (Axum)

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod oauth;
pub mod state;
pub mod storage;

use config::{LogFormat, DEFAULT_LOG_FILTER};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber.with(fmt::layer().json()).init(),
        LogFormat::Pretty => subscriber.with(fmt::layer()).init(),
    }
}
