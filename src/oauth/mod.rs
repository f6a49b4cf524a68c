// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OAuth client boundary.
//!
//! A provider turns a browser redirect into an [`ExternalProfile`]; the
//! identity engine takes it from there. Nothing in this module touches
//! identities or tokens.

pub mod line;
pub mod state;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::identity::{ExternalProfile, Provider};

pub use line::{LineConfig, LineProvider};
pub use state::LoginStateStore;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("login state is missing, expired or already used")]
    InvalidState,

    #[error("provider denied the login: {0}")]
    Denied(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("provider response was invalid: {0}")]
    InvalidResponse(String),
}

impl OAuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::UnknownProvider(_) => "unknown_provider",
            OAuthError::InvalidState => "invalid_oauth_state",
            OAuthError::Denied(_) => "oauth_denied",
            OAuthError::Request(_) | OAuthError::Rejected(_) | OAuthError::InvalidResponse(_) => {
                "oauth_exchange_failed"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

pub type ExchangeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ExternalProfile, OAuthError>> + Send + 'a>>;

/// One external login provider.
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Complete the login from the callback's authorization `code`.
    fn exchange<'a>(&'a self, code: &'a str) -> ExchangeFuture<'a>;
}

/// Configured providers, looked up by path segment.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    providers: HashMap<Provider, Arc<dyn OAuthProvider>>,
}

impl OAuthProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, OAuthError> {
        Provider::parse(name)
            .and_then(|provider| self.providers.get(&provider).cloned())
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().map(Provider::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for OAuthProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProviders")
            .field("providers", &self.names())
            .finish()
    }
}
