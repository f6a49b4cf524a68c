// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login endpoints.
//!
//! Every successful login ends the same way: the identity engine returns the
//! canonical identity and a token is issued for its id and current role.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{token::RoleClaim, Auth, Role},
    error::{ApiError, ErrorBody},
    identity::{Identity, IdentityResponse, LocalRegistration},
    oauth::OAuthError,
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query string LINE (or any OAuth provider) appends to the callback.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    /// Authorization code to exchange.
    pub code: Option<String>,
    /// Value issued by the login endpoint.
    pub state: Option<String>,
    /// Set by the provider when the user cancelled or the request was refused.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub token: String,
    pub identity: IdentityResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Summary of the caller's verified token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthInfoResponse {
    pub user_id: String,
    pub issuer: Option<String>,
    /// Unix seconds
    pub issued_at: Option<i64>,
    /// Unix seconds
    pub expires_at: i64,
    /// Role embedded at issuance, if it names a known role
    pub role: Option<Role>,
    /// Claims other than `sub`, `iss`, `iat` and `exp`
    #[schema(value_type = Object)]
    pub claims: Map<String, Value>,
}

// ============================================================================
// Helpers
// ============================================================================

/// 302 with a `Location` header.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Append `token` to the front-end callback URL, keeping its existing query.
fn callback_location(frontend_url: &str, token: &str) -> Result<String, ApiError> {
    let mut url = url::Url::parse(frontend_url).map_err(ApiError::internal)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

fn issue_for(state: &AppState, identity: &Identity) -> Result<String, ApiError> {
    Ok(state
        .issuer
        .issue_with_role(&identity.id.to_string(), identity.role)?)
}

// ============================================================================
// OAuth
// ============================================================================

/// Start a provider login.
///
/// Redirects the browser to the provider with a fresh single-use `state`.
#[utoipa::path(
    get,
    path = "/auth/{provider}/login",
    tag = "Auth",
    params(("provider" = String, Path, description = "Provider name, e.g. `line`")),
    responses(
        (status = 302, description = "Redirect to the provider"),
        (status = 404, description = "Provider unknown or not configured", body = ErrorBody)
    )
)]
pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response, ApiError> {
    let provider = state.oauth.get(&provider)?;
    let login_state = state.login_states.issue(provider.provider());
    tracing::debug!(provider = %provider.provider(), "Starting provider login");
    Ok(found(&provider.authorize_url(&login_state)))
}

/// Finish a provider login.
///
/// Exchanges the code, upserts the identity and issues a token. Redirects to
/// the front end with `?token=` when one is configured, otherwise answers
/// with JSON.
#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    tag = "Auth",
    params(
        ("provider" = String, Path, description = "Provider name, e.g. `line`"),
        CallbackQuery
    ),
    responses(
        (status = 200, description = "Login succeeded", body = TokenResponse),
        (status = 302, description = "Redirect to the front end carrying the token"),
        (status = 400, description = "Missing authorization code", body = ErrorBody),
        (status = 401, description = "Invalid state or failed exchange", body = ErrorBody),
        (status = 403, description = "Identity is disabled", body = ErrorBody),
        (status = 404, description = "Provider unknown or not configured", body = ErrorBody)
    )
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let provider = state.oauth.get(&provider)?;

    let login_state = query.state.as_deref().unwrap_or_default();
    let state_check = state.login_states.consume(login_state, provider.provider());

    if let Some(error) = query.error {
        let detail = match query.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(OAuthError::Denied(detail).into());
    }
    state_check?;

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let profile = provider.exchange(&code).await?;
    let identity = state.identities.sign_in_external(profile).await?;
    let token = issue_for(&state, &identity)?;

    tracing::info!(
        identity_id = %identity.id,
        provider = %provider.provider(),
        "Provider login succeeded"
    );

    match state.frontend_callback_url.as_deref() {
        Some(frontend_url) => Ok(found(&callback_location(frontend_url, &token)?)),
        None => Ok(Json(TokenResponse {
            token,
            message: "Login successful".to_string(),
        })
        .into_response()),
    }
}

// ============================================================================
// Local credentials
// ============================================================================

/// Create a local identity and sign it in.
#[utoipa::path(
    post,
    path = "/auth/local/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity created", body = RegisterResponse),
        (status = 400, description = "Invalid username, email or password", body = ErrorBody),
        (status = 409, description = "Username or email already taken", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let identity = state
        .identities
        .register_local(LocalRegistration {
            username: request.username,
            email: request.email,
            password: request.password,
            role: None,
        })
        .await?;
    let token = issue_for(&state, &identity)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            token,
            identity: IdentityResponse::from(&identity),
        }),
    ))
}

/// Sign in with a local username and password.
#[utoipa::path(
    post,
    path = "/auth/local/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = TokenResponse),
        (status = 401, description = "Invalid username or password", body = ErrorBody),
        (status = 403, description = "Identity is disabled", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let identity = state
        .identities
        .login_local(&request.username, &request.password)
        .await?;
    let token = issue_for(&state, &identity)?;
    tracing::info!(identity_id = %identity.id, "Local login succeeded");

    Ok(Json(TokenResponse {
        token,
        message: "Login successful".to_string(),
    }))
}

// ============================================================================
// Token info
// ============================================================================

/// Describe the caller's token.
#[utoipa::path(
    get,
    path = "/auth/info",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Token is valid", body = AuthInfoResponse),
        (status = 401, description = "Missing, expired or invalid token", body = ErrorBody)
    )
)]
pub async fn info(Auth(ctx): Auth) -> Json<AuthInfoResponse> {
    let role = match ctx.claims.role() {
        RoleClaim::Present(role) => Some(role),
        _ => None,
    };
    Json(AuthInfoResponse {
        user_id: ctx.user_id,
        issuer: ctx.claims.issuer,
        issued_at: ctx.claims.issued_at,
        expires_at: ctx.claims.expires_at,
        role,
        claims: ctx.claims.extra,
    })
}
