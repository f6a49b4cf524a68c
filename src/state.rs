// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{SigningKeys, TokenIssuer, TokenValidator};
use crate::identity::IdentityEngine;
use crate::oauth::{LoginStateStore, OAuthProviders};
use crate::storage::IdentityDatabase;

#[derive(Clone)]
pub struct AppState {
    pub issuer: TokenIssuer,
    pub validator: TokenValidator,
    pub identities: Arc<IdentityEngine<IdentityDatabase>>,
    pub database: IdentityDatabase,
    pub oauth: OAuthProviders,
    pub login_states: Arc<LoginStateStore>,
    /// Callback redirects here with `?token=`; JSON response when unset
    pub frontend_callback_url: Option<String>,
}

impl AppState {
    pub fn new(keys: SigningKeys, database: IdentityDatabase) -> Self {
        let keys = Arc::new(keys);
        Self {
            issuer: TokenIssuer::new(keys.clone()),
            validator: TokenValidator::new(keys),
            identities: Arc::new(IdentityEngine::new(Arc::new(database.clone()))),
            database,
            oauth: OAuthProviders::new(),
            login_states: Arc::new(LoginStateStore::default()),
            frontend_callback_url: None,
        }
    }

    pub fn with_oauth(mut self, oauth: OAuthProviders) -> Self {
        self.oauth = oauth;
        self
    }

    pub fn with_frontend_callback_url(mut self, url: Option<String>) -> Self {
        self.frontend_callback_url = url;
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::keys::tests::test_keys;
    use crate::storage::DATABASE_FILE;
    use tempfile::TempDir;

    /// State over a throwaway database and the fixture signing key.
    pub(crate) fn test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let database = IdentityDatabase::open(&temp_dir.path().join(DATABASE_FILE))
            .expect("Failed to open database");
        (AppState::new(test_keys(), database), temp_dir)
    }
}
