// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Self-issued ES256 tokens and role-based authorization.
//!
//! ## Auth Flow
//!
//! 1. A login (local credentials or OAuth callback) resolves an Identity
//! 2. [`TokenIssuer`] signs `{sub, iss, iat, exp, role}` with the server key
//! 3. Clients send `Authorization: Bearer <token>`
//! 4. The gate:
//!    - verifies signature, algorithm, issuer and expiry
//!    - extracts `sub` → `user_id`
//!    - checks the `role` claim against the route's required roles
//!
//! ## Security
//!
//! - One P-256 key, loaded from an allow-listed directory at startup
//! - Only ECDSA algorithms are accepted; anything else is rejected before
//!   signature verification
//! - Clock skew tolerance is 60 seconds
//! - Roles are read from the token, so a role change takes effect on the
//!   next issued token

pub mod error;
pub mod extractor;
pub mod gate;
pub mod keys;
pub mod middleware;
pub mod roles;
pub mod token;

pub use error::AuthError;
pub use extractor::Auth;
pub use gate::AuthContext;
pub use keys::{KeyError, SigningKeys};
pub use roles::Role;
pub use token::{Claims, TokenError, TokenIssuer, TokenValidation, TokenValidator};
