// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and role middleware for Axum.
//!
//! Apply both to a router subtree; the role check relies on the context the
//! authentication layer inserts, so `authenticate` must be the outer layer:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/admin/auth/users", get(list_users))
//!     .layer(middleware::from_fn(|req, next| require_roles(req, next, &[Role::Admin])))
//!     .layer(middleware::from_fn_with_state(state.clone(), authenticate));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::gate::{self, AuthContext};
use super::{AuthError, Role};
use crate::state::AppState;

/// Verify the bearer token and attach the [`AuthContext`] to the request.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let raw_header = match request.headers().get(AUTHORIZATION) {
        Some(value) => match value.to_str() {
            Ok(s) => Some(s),
            Err(_) => return AuthError::InvalidAuthHeader.into_response(),
        },
        None => None,
    };

    match gate::authenticate(&state.validator, raw_header) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Allow the request only when the authenticated role is in `roles`.
pub async fn require_roles(request: Request, next: Next, roles: &'static [Role]) -> Response {
    let Some(ctx) = request.extensions().get::<AuthContext>() else {
        tracing::warn!(reason = "missing_auth_context", "Role check without authentication");
        return AuthError::MissingAuthContext.into_response();
    };

    match gate::authorize(&ctx.claims, roles) {
        Ok(_) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
