// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity upsert engine.
//!
//! Resolves an [`ExternalProfile`] to exactly one [`Identity`]:
//!
//! 1. Look up the credential link by `(provider, subject)`.
//! 2. Found: refresh the link's tokens and profile snapshot in place.
//! 3. Not found: create identity + link in one atomic write.
//! 4. If that write loses a race to an identical upsert (duplicate link),
//!    fall back to step 2 against the winner's record.
//!
//! Username/email conflicts on a new identity are genuine and surface as
//! [`IdentityError::Conflict`].

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::model::{normalize_key, CredentialLink, ExternalProfile, Identity, Provider};
use super::password::{hash_password, verify_password};
use crate::auth::Role;
use crate::storage::{IdentityRepository, RepoError};

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=64;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=128;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{field} is already taken")]
    Conflict { field: &'static str },

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("identity is disabled")]
    Disabled,

    #[error("{0}")]
    InvalidInput(String),

    #[error("credential link points at missing identity {0}")]
    OrphanedLink(Uuid),

    #[error("identity storage failed during {step}: {source}")]
    Storage {
        step: &'static str,
        #[source]
        source: RepoError,
    },

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

fn storage(step: &'static str) -> impl FnOnce(RepoError) -> IdentityError {
    move |source| IdentityError::Storage { step, source }
}

/// Local sign-up request.
#[derive(Debug, Clone)]
pub struct LocalRegistration {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub role: Option<Role>,
}

pub struct IdentityEngine<R> {
    repo: Arc<R>,
}

impl<R: IdentityRepository> IdentityEngine<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Create-or-refresh the identity behind `profile`.
    ///
    /// `role` only applies when a new identity is created; it defaults to
    /// [`Role::User`].
    pub async fn upsert(
        &self,
        profile: ExternalProfile,
        role: Option<Role>,
    ) -> Result<Identity, IdentityError> {
        let existing = self
            .repo
            .find_credential_link(profile.provider, &profile.subject_id)
            .await
            .map_err(storage("find_credential_link"))?;
        if let Some(link) = existing {
            return self.refresh(link, profile).await;
        }

        let (identity, link) = new_external_identity(&profile, role.unwrap_or_default());
        match self.repo.create_identity(identity, link).await {
            Ok(identity) => {
                tracing::info!(
                    identity_id = %identity.id,
                    provider = %profile.provider,
                    "Created identity"
                );
                Ok(identity)
            }
            Err(RepoError::DuplicateCredentialLink { .. }) => {
                tracing::debug!(
                    provider = %profile.provider,
                    "Concurrent upsert created the link first, updating instead"
                );
                let link = self
                    .repo
                    .find_credential_link(profile.provider, &profile.subject_id)
                    .await
                    .map_err(storage("find_credential_link"))?
                    .ok_or_else(|| {
                        storage("find_credential_link")(RepoError::NotFound(format!(
                            "Credential link {}/{}",
                            profile.provider, profile.subject_id
                        )))
                    })?;
                self.refresh(link, profile).await
            }
            Err(RepoError::UniqueViolation { field }) => Err(IdentityError::Conflict { field }),
            Err(e) => Err(storage("create_identity")(e)),
        }
    }

    /// Upsert for a provider login and require the identity to be enabled.
    pub async fn sign_in_external(&self, profile: ExternalProfile) -> Result<Identity, IdentityError> {
        let identity = self.upsert(profile, None).await?;
        ensure_enabled(&identity)?;
        Ok(identity)
    }

    /// Create a local identity with an Argon2 password hash.
    pub async fn register_local(
        &self,
        registration: LocalRegistration,
    ) -> Result<Identity, IdentityError> {
        let username = validate_username(&registration.username)?;
        validate_password(&registration.password)?;
        let email = registration
            .email
            .as_deref()
            .map(validate_email)
            .transpose()?;

        let secret = registration.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&secret))
            .await
            .map_err(|e| IdentityError::PasswordHash(e.to_string()))?
            .map_err(|e| IdentityError::PasswordHash(e.to_string()))?;

        let mut identity = Identity::new(registration.role.unwrap_or_default());
        identity.username = Some(username.clone());
        identity.email = email;
        identity.password_hash = Some(password_hash);
        let link = CredentialLink::new(identity.id, Provider::Local, username);

        match self.repo.create_identity(identity, link).await {
            Ok(identity) => {
                tracing::info!(identity_id = %identity.id, "Registered local identity");
                Ok(identity)
            }
            Err(RepoError::DuplicateCredentialLink { .. }) => {
                Err(IdentityError::Conflict { field: "username" })
            }
            Err(RepoError::UniqueViolation { field }) => Err(IdentityError::Conflict { field }),
            Err(e) => Err(storage("create_identity")(e)),
        }
    }

    /// Verify local credentials.
    ///
    /// Unknown usernames and wrong passwords are indistinguishable.
    pub async fn login_local(&self, username: &str, password: &str) -> Result<Identity, IdentityError> {
        let key = normalize_key(username);
        let link = self
            .repo
            .find_credential_link(Provider::Local, &key)
            .await
            .map_err(storage("find_credential_link"))?
            .ok_or(IdentityError::InvalidCredentials)?;

        let identity = self
            .repo
            .get_identity(link.identity_id)
            .await
            .map_err(storage("get_identity"))?
            .ok_or(IdentityError::OrphanedLink(link.identity_id))?;

        let Some(stored_hash) = identity.password_hash.clone() else {
            return Err(IdentityError::InvalidCredentials);
        };
        let candidate = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&candidate, &stored_hash))
                .await
                .map_err(|e| IdentityError::PasswordHash(e.to_string()))?;
        if !verified {
            return Err(IdentityError::InvalidCredentials);
        }

        ensure_enabled(&identity)?;
        Ok(identity)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Identity>, IdentityError> {
        self.repo.get_identity(id).await.map_err(storage("get_identity"))
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<Identity>, IdentityError> {
        self.repo
            .list_identities(limit)
            .await
            .map_err(storage("list_identities"))
    }

    /// Overwrite tokens and profile of `link` and return its identity.
    async fn refresh(
        &self,
        mut link: CredentialLink,
        profile: ExternalProfile,
    ) -> Result<Identity, IdentityError> {
        let mut identity = self
            .repo
            .get_identity(link.identity_id)
            .await
            .map_err(storage("get_identity"))?
            .ok_or(IdentityError::OrphanedLink(link.identity_id))?;

        link.tokens = profile.tokens;
        link.profile = profile.profile;
        link.updated_at = Utc::now();
        self.repo
            .update_credential_link(link.clone())
            .await
            .map_err(storage("update_credential_link"))?;

        match identity
            .credential_links
            .iter_mut()
            .find(|l| l.provider == link.provider && l.provider_subject_id == link.provider_subject_id)
        {
            Some(slot) => *slot = link,
            None => identity.credential_links.push(link),
        }

        tracing::debug!(identity_id = %identity.id, "Refreshed credential link");
        Ok(identity)
    }
}

/// New identity for a first-time provider login: username and email both
/// come from the provider email.
fn new_external_identity(profile: &ExternalProfile, role: Role) -> (Identity, CredentialLink) {
    let mut identity = Identity::new(role);
    identity.email = profile.email.clone();
    identity.username = profile.email.clone();

    let mut link = CredentialLink::new(identity.id, profile.provider, profile.subject_id.clone());
    link.tokens = profile.tokens.clone();
    link.profile = profile.profile.clone();
    (identity, link)
}

fn ensure_enabled(identity: &Identity) -> Result<(), IdentityError> {
    if identity.is_enabled() {
        Ok(())
    } else {
        tracing::warn!(identity_id = %identity.id, "Sign-in attempt for disabled identity");
        Err(IdentityError::Disabled)
    }
}

fn validate_username(raw: &str) -> Result<String, IdentityError> {
    let username = normalize_key(raw);
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'));
    if !USERNAME_LEN.contains(&username.chars().count()) || !valid_chars {
        return Err(IdentityError::InvalidInput(
            "username must be 3-64 characters of a-z, 0-9, '_', '.', '-'".to_string(),
        ));
    }
    Ok(username)
}

fn validate_password(password: &str) -> Result<(), IdentityError> {
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(IdentityError::InvalidInput(
            "password must be 8-128 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(raw: &str) -> Result<String, IdentityError> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email.to_string()),
        _ => Err(IdentityError::InvalidInput("email is not valid".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::ProviderTokens;
    use crate::storage::{IdentityDatabase, RepoResult};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn temp_engine() -> (IdentityEngine<IdentityDatabase>, Arc<IdentityDatabase>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(IdentityDatabase::open(&dir.path().join("identity.redb")).unwrap());
        (IdentityEngine::new(db.clone()), db, dir)
    }

    fn line_profile(subject: &str, email: &str, access_token: &str) -> ExternalProfile {
        let mut profile = ExternalProfile::new(Provider::Line, subject);
        profile.email = Some(email.to_string());
        profile.profile.name = Some("Line User".to_string());
        profile.tokens = ProviderTokens {
            access_token: Some(access_token.to_string()),
            ..ProviderTokens::default()
        };
        profile
    }

    fn registration(username: &str, email: Option<&str>) -> LocalRegistration {
        LocalRegistration {
            username: username.to_string(),
            email: email.map(str::to_string),
            password: "hunter2-hunter2".to_string(),
            role: None,
        }
    }

    /// Reports "no link" on the first lookup, as if a concurrent upsert
    /// committed between lookup and insert.
    struct StaleLookup {
        inner: IdentityDatabase,
        stale: AtomicBool,
    }

    impl IdentityRepository for StaleLookup {
        async fn find_credential_link(
            &self,
            provider: Provider,
            subject: &str,
        ) -> RepoResult<Option<CredentialLink>> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_credential_link(provider, subject).await
        }

        async fn get_identity(&self, id: Uuid) -> RepoResult<Option<Identity>> {
            self.inner.get_identity(id).await
        }

        async fn create_identity(
            &self,
            identity: Identity,
            link: CredentialLink,
        ) -> RepoResult<Identity> {
            self.inner.create_identity(identity, link).await
        }

        async fn create_credential_link(&self, link: CredentialLink) -> RepoResult<()> {
            self.inner.create_credential_link(link).await
        }

        async fn update_credential_link(&self, link: CredentialLink) -> RepoResult<()> {
            self.inner.update_credential_link(link).await
        }

        async fn list_identities(&self, limit: usize) -> RepoResult<Vec<Identity>> {
            self.inner.list_identities(limit).await
        }
    }

    /// Every write fails with an I/O error.
    struct BrokenStorage;

    fn broken() -> RepoError {
        RepoError::Io(std::io::Error::other("disk unavailable"))
    }

    impl IdentityRepository for BrokenStorage {
        async fn find_credential_link(&self, _: Provider, _: &str) -> RepoResult<Option<CredentialLink>> {
            Ok(None)
        }

        async fn get_identity(&self, _: Uuid) -> RepoResult<Option<Identity>> {
            Ok(None)
        }

        async fn create_identity(&self, _: Identity, _: CredentialLink) -> RepoResult<Identity> {
            Err(broken())
        }

        async fn create_credential_link(&self, _: CredentialLink) -> RepoResult<()> {
            Err(broken())
        }

        async fn update_credential_link(&self, _: CredentialLink) -> RepoResult<()> {
            Err(broken())
        }

        async fn list_identities(&self, _: usize) -> RepoResult<Vec<Identity>> {
            Err(broken())
        }
    }

    #[tokio::test]
    async fn first_login_creates_user_identity() {
        let (engine, _db, _dir) = temp_engine();
        let identity = engine
            .upsert(line_profile("U1", "a@example.com", "t1"), None)
            .await
            .unwrap();

        assert_eq!(identity.role, Role::User);
        assert!(identity.active);
        assert!(identity.password_hash.is_none());
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(identity.username.as_deref(), Some("a@example.com"));
        assert_eq!(identity.credential_links.len(), 1);
        assert_eq!(identity.credential_links[0].profile.name.as_deref(), Some("Line User"));
    }

    #[tokio::test]
    async fn explicit_role_applies_to_new_identity() {
        let (engine, _db, _dir) = temp_engine();
        let identity = engine
            .upsert(line_profile("U1", "a@example.com", "t1"), Some(Role::Staff))
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Staff);
    }

    #[tokio::test]
    async fn repeat_login_updates_in_place() {
        let (engine, db, _dir) = temp_engine();
        let first = engine
            .upsert(line_profile("U1", "a@example.com", "t1"), None)
            .await
            .unwrap();
        let second = engine
            .upsert(line_profile("U1", "a@example.com", "t2"), None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.credential_links.len(), 1);
        assert_eq!(
            second.credential_links[0].tokens.access_token.as_deref(),
            Some("t2")
        );
        assert_eq!(second.credential_links[0].id, first.credential_links[0].id);
        assert_eq!(db.list_identities(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lost_race_becomes_update() {
        let dir = tempfile::tempdir().unwrap();
        let db = IdentityDatabase::open(&dir.path().join("identity.redb")).unwrap();
        let winner = IdentityEngine::new(Arc::new(db.clone()))
            .upsert(line_profile("U1", "a@example.com", "t1"), None)
            .await
            .unwrap();

        let racing = IdentityEngine::new(Arc::new(StaleLookup {
            inner: db.clone(),
            stale: AtomicBool::new(true),
        }));
        let loser = racing
            .upsert(line_profile("U1", "a@example.com", "t2"), None)
            .await
            .unwrap();

        assert_eq!(loser.id, winner.id);
        assert_eq!(
            loser.credential_links[0].tokens.access_token.as_deref(),
            Some("t2")
        );
        assert_eq!(db.list_identities(10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_create_one_identity() {
        let (engine, db, _dir) = temp_engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .upsert(line_profile("U1", "a@example.com", &format!("t{i}")), None)
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(db.list_identities(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn email_taken_by_other_provider_conflicts() {
        let (engine, _db, _dir) = temp_engine();
        engine
            .upsert(line_profile("U1", "a@example.com", "t1"), None)
            .await
            .unwrap();

        let mut firebase = ExternalProfile::new(Provider::Firebase, "F1");
        firebase.email = Some("A@example.com".to_string());
        let err = engine.upsert(firebase, None).await.unwrap_err();
        assert!(matches!(err, IdentityError::Conflict { field: "email" }));
    }

    #[tokio::test]
    async fn storage_failure_names_step() {
        let engine = IdentityEngine::new(Arc::new(BrokenStorage));
        let err = engine
            .upsert(line_profile("U1", "a@example.com", "t1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Storage { step: "create_identity", .. }));
    }

    #[tokio::test]
    async fn disabled_identity_cannot_sign_in() {
        let (engine, db, _dir) = temp_engine();
        let mut identity = Identity::new(Role::User);
        identity.active = false;
        let link = CredentialLink::new(identity.id, Provider::Line, "U9");
        db.create_identity(identity, link).await.unwrap();

        let err = engine
            .sign_in_external(ExternalProfile::new(Provider::Line, "U9"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Disabled));
    }

    #[tokio::test]
    async fn register_then_login() {
        let (engine, _db, _dir) = temp_engine();
        let registered = engine
            .register_local(registration("Alice", Some("alice@example.com")))
            .await
            .unwrap();
        assert_eq!(registered.username.as_deref(), Some("alice"));
        assert_eq!(registered.credential_links[0].provider, Provider::Local);

        let logged_in = engine.login_local("ALICE", "hunter2-hunter2").await.unwrap();
        assert_eq!(logged_in.id, registered.id);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (engine, _db, _dir) = temp_engine();
        engine.register_local(registration("alice", None)).await.unwrap();

        let wrong_password = engine.login_local("alice", "not-the-password").await.unwrap_err();
        let unknown_user = engine.login_local("bob", "hunter2-hunter2").await.unwrap_err();
        assert!(matches!(wrong_password, IdentityError::InvalidCredentials));
        assert!(matches!(unknown_user, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_registration_names_field() {
        let (engine, _db, _dir) = temp_engine();
        engine
            .register_local(registration("alice", Some("alice@example.com")))
            .await
            .unwrap();

        let same_username = engine.register_local(registration("alice", None)).await.unwrap_err();
        assert!(matches!(same_username, IdentityError::Conflict { field: "username" }));

        let same_email = engine
            .register_local(registration("alice2", Some("Alice@Example.com")))
            .await
            .unwrap_err();
        assert!(matches!(same_email, IdentityError::Conflict { field: "email" }));
    }

    #[tokio::test]
    async fn registration_input_is_validated() {
        let (engine, _db, _dir) = temp_engine();

        for username in ["ab", "has space", "emoji😀name", "a@b"] {
            let err = engine.register_local(registration(username, None)).await.unwrap_err();
            assert!(matches!(err, IdentityError::InvalidInput(_)), "{username}");
        }

        let mut short = registration("alice", None);
        short.password = "short".to_string();
        assert!(matches!(
            engine.register_local(short).await,
            Err(IdentityError::InvalidInput(_))
        ));

        let bad_email = registration("alice", Some("not-an-email"));
        assert!(matches!(
            engine.register_local(bad_email).await,
            Err(IdentityError::InvalidInput(_))
        ));
    }
}
