// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pending OAuth login states.
//!
//! Each `/auth/{provider}/login` issues a random `state` value that the
//! provider echoes back on the callback. A state is valid for one callback,
//! for the provider it was issued for, within the TTL.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use uuid::Uuid;

use super::OAuthError;
use crate::identity::Provider;

/// Pending logins older than this are rejected.
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on concurrently pending logins; the oldest are evicted first.
pub const LOGIN_STATE_CAPACITY: usize = 10_000;

struct PendingLogin {
    provider: Provider,
    issued_at: Instant,
}

/// In-process LRU of pending login states.
pub struct LoginStateStore {
    cache: Mutex<LruCache<String, PendingLogin>>,
    ttl: Duration,
}

impl LoginStateStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Record a fresh state for `provider` and return it.
    pub fn issue(&self, provider: Provider) -> String {
        let state = Uuid::new_v4().simple().to_string();
        self.lock().put(
            state.clone(),
            PendingLogin {
                provider,
                issued_at: Instant::now(),
            },
        );
        state
    }

    /// Remove `state` and check it was issued for `provider` within the TTL.
    pub fn consume(&self, state: &str, provider: Provider) -> Result<(), OAuthError> {
        let pending = self.lock().pop(state).ok_or(OAuthError::InvalidState)?;

        if pending.provider != provider || pending.issued_at.elapsed() >= self.ttl {
            return Err(OAuthError::InvalidState);
        }
        Ok(())
    }

    /// Cache guard; a poisoned lock is recovered, the entries are plain data.
    fn lock(&self) -> MutexGuard<'_, LruCache<String, PendingLogin>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Login state lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

impl Default for LoginStateStore {
    fn default() -> Self {
        Self::new(LOGIN_STATE_CAPACITY, LOGIN_STATE_TTL)
    }
}
