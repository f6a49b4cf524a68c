// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded identity database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `identities`: identity_id → serialized Identity (without links)
//! - `usernames`: normalized username → identity_id
//! - `emails`: normalized email → identity_id
//! - `credential_links`: `provider|subject` → serialized CredentialLink
//! - `identity_links`: `identity_id|provider|subject` → () (per-identity index)
//!
//! redb serializes write transactions, so a uniqueness check followed by an
//! insert inside one write transaction cannot interleave with another writer.

use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadOnlyTable, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use uuid::Uuid;

use super::repository::{IdentityRepository, RepoError, RepoResult};
use crate::identity::model::{normalize_key, CredentialLink, Identity, Provider};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: identity_id → Identity (JSON bytes).
const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");

/// Unique index: normalized username → identity_id.
const USERNAMES: TableDefinition<&str, &str> = TableDefinition::new("usernames");

/// Unique index: normalized email → identity_id.
const EMAILS: TableDefinition<&str, &str> = TableDefinition::new("emails");

/// Unique: `provider|subject` → CredentialLink (JSON bytes).
const CREDENTIAL_LINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("credential_links");

/// Index: `identity_id|provider|subject` for per-identity range scans.
const IDENTITY_LINKS: TableDefinition<&str, ()> = TableDefinition::new("identity_links");

// =============================================================================
// Key Helpers
// =============================================================================

fn link_key(provider: Provider, subject: &str) -> String {
    format!("{provider}|{subject}")
}

fn identity_link_key(identity_id: Uuid, provider: Provider, subject: &str) -> String {
    format!("{identity_id}|{}", link_key(provider, subject))
}

/// Range covering every `identity_links` key of one identity.
///
/// `}` sorts directly after `|`, so the end bound excludes other identities.
fn identity_link_range(identity_id: Uuid) -> (String, String) {
    (format!("{identity_id}|"), format!("{identity_id}}}"))
}

// =============================================================================
// IdentityDatabase
// =============================================================================

/// redb-backed [`IdentityRepository`].
#[derive(Clone)]
pub struct IdentityDatabase {
    db: Arc<Database>,
}

impl IdentityDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> RepoResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(IDENTITIES)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(EMAILS)?;
            let _ = write_txn.open_table(CREDENTIAL_LINKS)?;
            let _ = write_txn.open_table(IDENTITY_LINKS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Opened identity database");
        Ok(Self { db: Arc::new(db) })
    }

    /// Confirm the database can serve reads.
    pub fn health_check(&self) -> RepoResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(IDENTITIES)?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn find_credential_link_blocking(
        &self,
        provider: Provider,
        subject: &str,
    ) -> RepoResult<Option<CredentialLink>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CREDENTIAL_LINKS)?;
        let key = link_key(provider, subject);
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_identity_blocking(&self, id: Uuid) -> RepoResult<Option<Identity>> {
        let read_txn = self.db.begin_read()?;
        let identities = read_txn.open_table(IDENTITIES)?;
        let index = read_txn.open_table(IDENTITY_LINKS)?;
        let links = read_txn.open_table(CREDENTIAL_LINKS)?;

        let id_key = id.to_string();
        let mut identity: Identity = match identities.get(id_key.as_str())? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(None),
        };
        identity.credential_links = load_links(&index, &links, id)?;
        Ok(Some(identity))
    }

    pub fn list_identities_blocking(&self, limit: usize) -> RepoResult<Vec<Identity>> {
        let read_txn = self.db.begin_read()?;
        let identities = read_txn.open_table(IDENTITIES)?;
        let index = read_txn.open_table(IDENTITY_LINKS)?;
        let links = read_txn.open_table(CREDENTIAL_LINKS)?;

        let mut all = Vec::new();
        for entry in identities.iter()? {
            let (_, value) = entry?;
            let identity: Identity = serde_json::from_slice(value.value())?;
            all.push(identity);
        }
        all.sort_by_key(|identity| identity.created_at);
        all.truncate(limit);

        for identity in &mut all {
            identity.credential_links = load_links(&index, &links, identity.id)?;
        }
        Ok(all)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn create_identity_blocking(
        &self,
        mut identity: Identity,
        link: CredentialLink,
    ) -> RepoResult<Identity> {
        self.write(|txn| insert_identity(txn, &identity, &link))?;
        identity.credential_links = vec![link];
        Ok(identity)
    }

    pub fn create_credential_link_blocking(&self, link: CredentialLink) -> RepoResult<()> {
        self.write(|txn| {
            let identities = txn.open_table(IDENTITIES)?;
            if identities.get(link.identity_id.to_string().as_str())?.is_none() {
                return Err(RepoError::NotFound(format!("Identity {}", link.identity_id)));
            }
            insert_link(txn, &link)
        })
    }

    pub fn update_credential_link_blocking(&self, mut link: CredentialLink) -> RepoResult<()> {
        let key = link_key(link.provider, &link.provider_subject_id);
        self.write(|txn| {
            let mut table = txn.open_table(CREDENTIAL_LINKS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = table
                .get(key.as_str())?
                .map(|existing| existing.value().to_vec())
                .ok_or_else(|| RepoError::NotFound(format!("Credential link {key}")))?;
            let existing: CredentialLink = serde_json::from_slice(&existing_bytes)?;

            // The owning identity and creation time never change
            link.id = existing.id;
            link.identity_id = existing.identity_id;
            link.created_at = existing.created_at;

            let json = serde_json::to_vec(&link)?;
            table.insert(key.as_str(), json.as_slice())?;
            Ok(())
        })
    }

    /// Run `f` in one write transaction: commit on success, abort on error.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> RepoResult<T>) -> RepoResult<T> {
        let write_txn = self.db.begin_write()?;
        match f(&write_txn) {
            Ok(value) => {
                write_txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort write transaction");
                }
                Err(e)
            }
        }
    }
}

/// Insert identity, unique indexes and first link. Caller commits or aborts.
fn insert_identity(
    txn: &WriteTransaction,
    identity: &Identity,
    link: &CredentialLink,
) -> RepoResult<()> {
    // Link first: a lost upsert race must surface as a duplicate link, not as
    // an email conflict caused by the winner's identity.
    insert_link(txn, link)?;

    // Email before username: provider identities derive their username from
    // the email, so a shared address must be reported as an email conflict.
    let id_key = identity.id.to_string();
    if let Some(email) = &identity.email {
        claim_unique(txn, EMAILS, "email", &normalize_key(email), &id_key)?;
    }
    if let Some(username) = &identity.username {
        claim_unique(txn, USERNAMES, "username", &normalize_key(username), &id_key)?;
    }

    let json = serde_json::to_vec(identity)?;
    let mut identities = txn.open_table(IDENTITIES)?;
    identities.insert(id_key.as_str(), json.as_slice())?;
    Ok(())
}

fn insert_link(txn: &WriteTransaction, link: &CredentialLink) -> RepoResult<()> {
    let key = link_key(link.provider, &link.provider_subject_id);

    let mut links = txn.open_table(CREDENTIAL_LINKS)?;
    if links.get(key.as_str())?.is_some() {
        return Err(RepoError::DuplicateCredentialLink {
            provider: link.provider,
            subject: link.provider_subject_id.clone(),
        });
    }
    let json = serde_json::to_vec(link)?;
    links.insert(key.as_str(), json.as_slice())?;

    let mut index = txn.open_table(IDENTITY_LINKS)?;
    let index_key = identity_link_key(link.identity_id, link.provider, &link.provider_subject_id);
    index.insert(index_key.as_str(), ())?;
    Ok(())
}

fn claim_unique(
    txn: &WriteTransaction,
    definition: TableDefinition<'static, &'static str, &'static str>,
    field: &'static str,
    key: &str,
    identity_id: &str,
) -> RepoResult<()> {
    let mut table = txn.open_table(definition)?;
    if table.get(key)?.is_some() {
        return Err(RepoError::UniqueViolation { field });
    }
    table.insert(key, identity_id)?;
    Ok(())
}

fn load_links(
    index: &ReadOnlyTable<&'static str, ()>,
    links: &ReadOnlyTable<&'static str, &'static [u8]>,
    identity_id: Uuid,
) -> RepoResult<Vec<CredentialLink>> {
    let (start, end) = identity_link_range(identity_id);
    let prefix_len = start.len();

    let mut result = Vec::new();
    for entry in index.range(start.as_str()..end.as_str())? {
        let (key, _) = entry?;
        let key = key.value();
        let Some(link_key) = key.get(prefix_len..) else {
            continue;
        };
        if let Some(value) = links.get(link_key)? {
            result.push(serde_json::from_slice(value.value())?);
        }
    }
    Ok(result)
}

// =============================================================================
// Async repository
// =============================================================================

impl IdentityRepository for IdentityDatabase {
    async fn find_credential_link(
        &self,
        provider: Provider,
        subject: &str,
    ) -> RepoResult<Option<CredentialLink>> {
        let db = self.clone();
        let subject = subject.to_string();
        tokio::task::spawn_blocking(move || db.find_credential_link_blocking(provider, &subject))
            .await?
    }

    async fn get_identity(&self, id: Uuid) -> RepoResult<Option<Identity>> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.get_identity_blocking(id)).await?
    }

    async fn create_identity(
        &self,
        identity: Identity,
        link: CredentialLink,
    ) -> RepoResult<Identity> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.create_identity_blocking(identity, link)).await?
    }

    async fn create_credential_link(&self, link: CredentialLink) -> RepoResult<()> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.create_credential_link_blocking(link)).await?
    }

    async fn update_credential_link(&self, link: CredentialLink) -> RepoResult<()> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.update_credential_link_blocking(link)).await?
    }

    async fn list_identities(&self, limit: usize) -> RepoResult<Vec<Identity>> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.list_identities_blocking(limit)).await?
    }
}

// =============================================================================
// Tests
// =============================================================================
