// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LINE Login (OAuth 2.1 / OpenID Connect).
//!
//! Callback exchange:
//!
//! 1. `POST /oauth2/v2.1/token`: authorization code → access/refresh/ID token
//! 2. `POST /oauth2/v2.1/verify`: ID token → email, name, picture
//! 3. `GET /v2/profile`: access token → userId, displayName, pictureUrl

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use super::{ExchangeFuture, OAuthError, OAuthProvider};
use crate::identity::{ExternalProfile, ProfileSnapshot, Provider, ProviderTokens};

const AUTHORIZE_URL: &str = "https://access.line.me/oauth2/v2.1/authorize";
const TOKEN_URL: &str = "https://api.line.me/oauth2/v2.1/token";
const VERIFY_URL: &str = "https://api.line.me/oauth2/v2.1/verify";
const PROFILE_URL: &str = "https://api.line.me/v2/profile";
const SCOPES: &str = "profile openid email";

/// LINE channel credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineProfile {
    user_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    picture_url: Option<String>,
}

pub struct LineProvider {
    config: LineConfig,
    http: Client,
}

impl LineProvider {
    pub fn new(config: LineConfig) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| OAuthError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::Request(format!("token request failed: {e}")))?;
        let token: TokenResponse = read_json(response, "token").await?;

        let claims = match token.id_token.as_deref() {
            Some(id_token) => self.verify_id_token(id_token).await?,
            None => IdTokenClaims::default(),
        };

        let response = self
            .http
            .get(PROFILE_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| OAuthError::Request(format!("profile request failed: {e}")))?;
        let profile: LineProfile = read_json(response, "profile").await?;

        Ok(into_external_profile(token, claims, profile))
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, OAuthError> {
        let form = [("id_token", id_token), ("client_id", self.config.client_id.as_str())];
        let response = self
            .http
            .post(VERIFY_URL)
            .form(&form)
            .send()
            .await
            .map_err(|e| OAuthError::Request(format!("id token verify failed: {e}")))?;
        read_json(response, "id token verify").await
    }
}

impl OAuthProvider for LineProvider {
    fn provider(&self) -> Provider {
        Provider::Line
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("state", state)
            .append_pair("scope", SCOPES)
            .finish();
        format!("{AUTHORIZE_URL}?{query}")
    }

    fn exchange<'a>(&'a self, code: &'a str) -> ExchangeFuture<'a> {
        Box::pin(self.exchange_code(code))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    step: &str,
) -> Result<T, OAuthError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(OAuthError::Rejected(format!("{step} returned {status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| OAuthError::InvalidResponse(format!("invalid {step} response: {e}")))
}

fn into_external_profile(
    token: TokenResponse,
    claims: IdTokenClaims,
    profile: LineProfile,
) -> ExternalProfile {
    let name = profile.display_name.or(claims.name);
    ExternalProfile {
        provider: Provider::Line,
        subject_id: profile.user_id,
        email: claims.email,
        profile: ProfileSnapshot {
            nick_name: name.clone(),
            name,
            avatar_url: profile.picture_url.or(claims.picture),
            ..ProfileSnapshot::default()
        },
        tokens: ProviderTokens {
            expires_at: token
                .expires_in
                .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds)),
            access_token: Some(token.access_token),
            refresh_token: token.refresh_token,
            id_token: token.id_token,
            access_token_secret: None,
        },
    }
}
