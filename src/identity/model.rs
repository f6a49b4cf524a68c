// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity records.
//!
//! ## Records
//!
//! - [`Identity`]: canonical user, the authorization subject
//! - [`CredentialLink`]: one provider login bound to exactly one Identity,
//!   unique on `(provider, provider_subject_id)`
//! - [`ExternalProfile`]: normalized input handed to the upsert engine
//!
//! Stored records carry provider tokens and password hashes; API responses
//! use [`IdentityResponse`], which never does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;

/// Authentication method source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Username + password held by this server
    Local,
    /// Firebase Authentication
    Firebase,
    /// LINE Login
    Line,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Local, Provider::Firebase, Provider::Line];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Firebase => "firebase",
            Provider::Line => "line",
        }
    }

    pub fn parse(s: &str) -> Option<Provider> {
        Provider::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque provider-issued tokens, stored for later provider API calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Display fields captured from the provider at link time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Provider login bound to an Identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialLink {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub provider: Provider,
    pub provider_subject_id: String,
    #[serde(default)]
    pub tokens: ProviderTokens,
    #[serde(default)]
    pub profile: ProfileSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialLink {
    pub fn new(identity_id: Uuid, provider: Provider, provider_subject_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identity_id,
            provider,
            provider_subject_id: provider_subject_id.into(),
            tokens: ProviderTokens::default(),
            profile: ProfileSnapshot::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Canonical user record.
///
/// Never physically deleted; `deleted_at` marks a soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// PHC-format Argon2 hash; absent for SSO-only identities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Populated on read from the link table, not stored with the record.
    #[serde(skip)]
    pub credential_links: Vec<CredentialLink>,
}

impl Identity {
    pub fn new(role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: None,
            email: None,
            password_hash: None,
            role,
            active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            credential_links: Vec::new(),
        }
    }

    /// Active and not soft-deleted.
    pub fn is_enabled(&self) -> bool {
        self.active && self.deleted_at.is_none()
    }
}

/// Normalized result of a completed provider login.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProfile {
    pub provider: Provider,
    pub subject_id: String,
    pub email: Option<String>,
    pub profile: ProfileSnapshot,
    pub tokens: ProviderTokens,
}

impl ExternalProfile {
    pub fn new(provider: Provider, subject_id: impl Into<String>) -> Self {
        Self {
            provider,
            subject_id: subject_id.into(),
            email: None,
            profile: ProfileSnapshot::default(),
            tokens: ProviderTokens::default(),
        }
    }
}

/// Provider link as returned to API clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CredentialLinkResponse {
    pub provider: Provider,
    pub provider_subject_id: String,
    pub profile: ProfileSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CredentialLink> for CredentialLinkResponse {
    fn from(link: &CredentialLink) -> Self {
        Self {
            provider: link.provider,
            provider_subject_id: link.provider_subject_id.clone(),
            profile: link.profile.clone(),
            created_at: link.created_at,
            updated_at: link.updated_at,
        }
    }
}

/// Identity as returned to API clients (no password hash, no provider tokens).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub credential_links: Vec<CredentialLinkResponse>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
            active: identity.active,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
            deleted_at: identity.deleted_at,
            credential_links: identity.credential_links.iter().map(Into::into).collect(),
        }
    }
}

/// Canonical form of a username or email used for uniqueness: NFKC, trimmed,
/// lowercased.
pub fn normalize_key(value: &str) -> String {
    value.trim().nfkc().collect::<String>().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(Provider::parse(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::parse("LINE"), None);
        assert_eq!(
            serde_json::to_string(&Provider::Firebase).unwrap(),
            r#""firebase""#
        );
    }

    #[test]
    fn new_identity_is_enabled_user() {
        let identity = Identity::new(Role::default());
        assert_eq!(identity.role, Role::User);
        assert!(identity.is_enabled());

        let mut deleted = identity.clone();
        deleted.deleted_at = Some(Utc::now());
        assert!(!deleted.is_enabled());
    }

    #[test]
    fn stored_identity_omits_links() {
        let mut identity = Identity::new(Role::Staff);
        identity
            .credential_links
            .push(CredentialLink::new(identity.id, Provider::Line, "U123"));

        let json = serde_json::to_value(&identity).unwrap();
        assert!(json.get("credential_links").is_none());

        let restored: Identity = serde_json::from_value(json).unwrap();
        assert!(restored.credential_links.is_empty());
        assert_eq!(restored.role, Role::Staff);
    }

    #[test]
    fn response_hides_secrets() {
        let mut identity = Identity::new(Role::User);
        identity.password_hash = Some("$argon2id$secret".to_string());
        let mut link = CredentialLink::new(identity.id, Provider::Line, "U123");
        link.tokens.access_token = Some("provider-access".to_string());
        identity.credential_links.push(link);

        let json = serde_json::to_string(&IdentityResponse::from(&identity)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("provider-access"));
        assert!(json.contains("U123"));
    }

    #[test]
    fn normalize_key_folds_case_and_width() {
        assert_eq!(normalize_key("  Alice@Example.COM "), "alice@example.com");
        // Fullwidth letters fold to ASCII under NFKC.
        assert_eq!(normalize_key("ＡＬＩＣＥ"), "alice");
    }
}
