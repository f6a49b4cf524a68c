// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP-agnostic authorization gate.
//!
//! Two steps, run in order for every protected request:
//!
//! 1. [`authenticate`]: raw `Authorization` header → [`AuthContext`]
//! 2. [`authorize`]: claims + required roles → allow / reject
//!
//! The Axum middleware and extractor in this module's siblings are thin
//! wrappers around these functions.

use serde::Serialize;

use super::error::AuthError;
use super::roles::Role;
use super::token::{Claims, RoleClaim, TokenValidation, TokenValidator};

/// Authenticated subject attached to the request for downstream handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthContext {
    /// `sub` claim (Identity ID)
    pub user_id: String,
    /// Verified claims
    pub claims: Claims,
}

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly `Bearer <token>`: case-sensitive scheme, one
/// space, non-empty token.
pub fn bearer_token(raw_header: Option<&str>) -> Result<&str, AuthError> {
    let header = raw_header.ok_or(AuthError::MissingAuthHeader)?;
    if header.is_empty() {
        return Err(AuthError::MissingAuthHeader);
    }

    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.trim().is_empty() => Ok(token),
        _ => Err(AuthError::InvalidAuthHeader),
    }
}

/// Authenticate a request from its raw `Authorization` header.
pub fn authenticate(
    validator: &TokenValidator,
    raw_header: Option<&str>,
) -> Result<AuthContext, AuthError> {
    let token = bearer_token(raw_header).inspect_err(|rejection| {
        tracing::warn!(reason = rejection.error_code(), "Rejected authorization header");
    })?;

    let outcome = validator.validate(token).map_err(|e| {
        tracing::warn!(reason = "invalid_token", error = %e, "Token verification error");
        AuthError::InvalidToken
    })?;

    let rejection = match outcome {
        TokenValidation::Valid(valid) if !valid.user_id.is_empty() => {
            tracing::debug!(user_id = %valid.user_id, "Authenticated request");
            return Ok(AuthContext {
                user_id: valid.user_id,
                claims: valid.claims,
            });
        }
        TokenValidation::Valid(_) => AuthError::MissingSubject,
        TokenValidation::Expired => AuthError::TokenExpired,
        TokenValidation::NotExist => AuthError::TokenNotProvided,
    };

    tracing::warn!(reason = rejection.error_code(), "Rejected token");
    Err(rejection)
}

/// Allow the request only if the `role` claim is one of `required`.
///
/// Returns the matched role.
pub fn authorize(claims: &Claims, required: &[Role]) -> Result<Role, AuthError> {
    let result = match claims.role() {
        RoleClaim::Present(role) if role.is_member_of(required) => Ok(role),
        RoleClaim::Present(_) | RoleClaim::Unknown(_) => Err(AuthError::InsufficientPermissions),
        RoleClaim::Missing => Err(AuthError::MissingRole),
        RoleClaim::InvalidType => Err(AuthError::InvalidRoleClaim),
    };

    if let Err(rejection) = &result {
        tracing::warn!(
            reason = rejection.error_code(),
            subject = claims.subject.as_deref().unwrap_or_default(),
            "Role check failed"
        );
    }
    result
}
