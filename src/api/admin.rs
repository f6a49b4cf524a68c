// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only endpoints.
//!
//! Mounted behind the `authenticate` and `require_roles(&[Role::Admin])`
//! layers, so handlers here never see an unauthorized caller.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{ApiError, ErrorBody},
    identity::IdentityResponse,
    state::AppState,
};

pub const DEFAULT_USER_LIMIT: usize = 10;
pub const MAX_USER_LIMIT: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Maximum number of identities (default 10, at most 100). Values that
    /// are not a number fall back to the default.
    pub limit: Option<String>,
}

impl ListUsersQuery {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_USER_LIMIT)
            .clamp(1, MAX_USER_LIMIT)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListUsersResponse {
    /// Identities, oldest first.
    pub users: Vec<IdentityResponse>,
    pub count: usize,
}

/// List identities.
#[utoipa::path(
    get,
    path = "/admin/auth/users",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Identities", body = ListUsersResponse),
        (status = 401, description = "Missing, expired or invalid token", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    let limit = query.limit();

    let users: Vec<IdentityResponse> = state
        .identities
        .list(limit)
        .await?
        .iter()
        .map(IdentityResponse::from)
        .collect();

    Ok(Json(ListUsersResponse {
        count: users.len(),
        users,
    }))
}
