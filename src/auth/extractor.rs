// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated requests.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(ctx): Auth) -> impl IntoResponse {
//!     // ctx is AuthContext
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::gate::{self, AuthContext};
use super::AuthError;
use crate::state::AppState;

/// Extractor for authenticated requests.
///
/// Reuses the context set by the authentication middleware when present,
/// otherwise runs the gate against the `Authorization` header itself.
pub struct Auth(pub AuthContext);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<AuthContext>().cloned() {
            return Ok(Auth(ctx));
        }

        let raw_header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?),
            None => None,
        };

        let ctx = gate::authenticate(&state.validator, raw_header)?;
        parts.extensions.insert(ctx.clone());
        Ok(Auth(ctx))
    }
}
