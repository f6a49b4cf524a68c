// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Rejections produced by the authorization gate.
///
/// Each variant carries a distinct reason code for logs and clients, while
/// every authentication failure shares the same 401 status and every
/// authorization failure the same 403.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header is not exactly `Bearer <token>`
    InvalidAuthHeader,
    /// Validator saw an empty token
    TokenNotProvided,
    /// Token has expired
    TokenExpired,
    /// Signature, algorithm or structure check failed
    InvalidToken,
    /// Token verified but carries no string `sub`
    MissingSubject,
    /// Role gate reached without an authenticated context
    MissingAuthContext,
    /// Token has no `role` claim
    MissingRole,
    /// `role` claim is not a string
    InvalidRoleClaim,
    /// Role is not one of the required roles
    InsufficientPermissions,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::TokenNotProvided => "token_not_provided",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidToken => "invalid_token",
            AuthError::MissingSubject => "missing_subject",
            AuthError::MissingAuthContext => "missing_auth_context",
            AuthError::MissingRole => "missing_role",
            AuthError::InvalidRoleClaim => "invalid_role_claim",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::TokenNotProvided
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::MissingSubject
            | AuthError::MissingAuthContext => StatusCode::UNAUTHORIZED,
            AuthError::MissingRole
            | AuthError::InvalidRoleClaim
            | AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Missing authorization header"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::TokenNotProvided => write!(f, "Token not provided"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::InvalidToken => write!(f, "Token verification failed"),
            AuthError::MissingSubject => write!(f, "Token has no subject"),
            AuthError::MissingAuthContext => write!(f, "No user claims found"),
            AuthError::MissingRole => write!(f, "No role found in user claims"),
            AuthError::InvalidRoleClaim => write!(f, "Invalid role format"),
            AuthError::InsufficientPermissions => write!(f, "Insufficient permissions"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let response = AuthError::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn insufficient_permissions_returns_403() {
        let response = AuthError::InsufficientPermissions.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn token_rejections_share_one_status() {
        let rejections = [
            AuthError::TokenNotProvided,
            AuthError::TokenExpired,
            AuthError::InvalidToken,
            AuthError::MissingSubject,
        ];
        for rejection in rejections {
            assert_eq!(rejection.status_code(), StatusCode::UNAUTHORIZED);
        }
        assert_ne!(
            AuthError::TokenExpired.error_code(),
            AuthError::InvalidToken.error_code()
        );
    }
}
