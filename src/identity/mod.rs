// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical identities and the engine that maintains them.

pub mod engine;
pub mod model;
pub mod password;

pub use engine::{IdentityEngine, IdentityError, LocalRegistration};
pub use model::{
    CredentialLink, ExternalProfile, Identity, IdentityResponse, ProfileSnapshot, Provider,
    ProviderTokens,
};
