// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{middleware::authenticate, middleware::require_roles, Role},
    error::ErrorBody,
    identity::{model::CredentialLinkResponse, IdentityResponse, ProfileSnapshot, Provider},
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod health;

async fn require_admin(request: Request, next: Next) -> Response {
    require_roles(request, next, &[Role::Admin]).await
}

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/auth/users", get(admin::list_users))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let routes = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/auth/{provider}/login", get(auth::oauth_login))
        .route("/auth/{provider}/callback", get(auth::oauth_callback))
        .route("/auth/local/register", post(auth::register))
        .route("/auth/local/login", post(auth::login))
        .route("/auth/info", get(auth::info))
        .merge(admin_routes)
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        auth::oauth_login,
        auth::oauth_callback,
        auth::register,
        auth::login,
        auth::info,
        admin::list_users
    ),
    components(
        schemas(
            ErrorBody,
            Role,
            Provider,
            ProfileSnapshot,
            CredentialLinkResponse,
            IdentityResponse,
            auth::TokenResponse,
            auth::RegisterRequest,
            auth::RegisterResponse,
            auth::LoginRequest,
            auth::AuthInfoResponse,
            admin::ListUsersResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Provider and local login, token info"),
        (name = "Admin", description = "Identity administration"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
