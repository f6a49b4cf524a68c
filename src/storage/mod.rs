// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Storage Module
//!
//! Persistent storage for identities and credential links in an embedded
//! redb database under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   identity.redb   # identities, unique indexes, credential links
//! ```
//!
//! The upsert engine depends only on [`IdentityRepository`]; [`IdentityDatabase`]
//! is the production implementation.

pub mod database;
pub mod repository;

pub use database::IdentityDatabase;
pub use repository::{IdentityRepository, RepoError, RepoResult};

/// File name of the identity database inside the data directory.
pub const DATABASE_FILE: &str = "identity.redb";
