// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity repository interface.
//!
//! The upsert engine only talks to storage through [`IdentityRepository`].
//! Implementations must enforce uniqueness of `(provider, provider_subject_id)`,
//! username and email inside the same atomic write that creates the record,
//! and report violations as [`RepoError::DuplicateCredentialLink`] or
//! [`RepoError::UniqueViolation`].

use std::future::Future;

use uuid::Uuid;

use crate::identity::model::{CredentialLink, Identity, Provider};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("credential link {provider}/{subject} already exists")]
    DuplicateCredentialLink { provider: Provider, subject: String },

    #[error("{field} is already taken")]
    UniqueViolation { field: &'static str },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Durable store of identities and their credential links.
pub trait IdentityRepository: Send + Sync + 'static {
    /// Look up the link for `(provider, subject)`.
    fn find_credential_link(
        &self,
        provider: Provider,
        subject: &str,
    ) -> impl Future<Output = RepoResult<Option<CredentialLink>>> + Send;

    /// Load an identity with its credential links populated.
    fn get_identity(&self, id: Uuid) -> impl Future<Output = RepoResult<Option<Identity>>> + Send;

    /// Create an identity and its first link in one atomic write.
    ///
    /// Fails with `DuplicateCredentialLink` if the link already exists and
    /// with `UniqueViolation` on a taken username or email; nothing is
    /// written in either case.
    fn create_identity(
        &self,
        identity: Identity,
        link: CredentialLink,
    ) -> impl Future<Output = RepoResult<Identity>> + Send;

    /// Attach a new link to an existing identity.
    fn create_credential_link(
        &self,
        link: CredentialLink,
    ) -> impl Future<Output = RepoResult<()>> + Send;

    /// Overwrite the tokens and profile snapshot of an existing link.
    fn update_credential_link(
        &self,
        link: CredentialLink,
    ) -> impl Future<Output = RepoResult<()>> + Send;

    /// Up to `limit` identities with their links, oldest first.
    fn list_identities(&self, limit: usize) -> impl Future<Output = RepoResult<Vec<Identity>>> + Send;
}
