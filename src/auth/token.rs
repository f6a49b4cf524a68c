// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ES256 token issuance and validation.
//!
//! ## Issued claims
//!
//! | Claim | Value |
//! |-------|-------|
//! | `sub` | Identity ID |
//! | `iss` | [`TOKEN_ISSUER`] |
//! | `iat` | issuance time |
//! | `exp` | issuance time + 24h |
//! | `role` | identity role (only when issued for an identity) |
//!
//! ## Validation outcomes
//!
//! Expected outcomes come back as [`TokenValidation`]; only malformed or
//! forged tokens come back as [`TokenError`]:
//!
//! 1. empty input → `NotExist`
//! 2. non-ECDSA header algorithm → `TokenError::UnexpectedSigningMethod`
//! 3. expired → `Expired`
//! 4. any other parse/verify failure → `TokenError::Invalid`
//! 5. otherwise → `Valid`

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::Serialize;
use serde_json::{Map, Value};

use super::keys::SigningKeys;
use super::roles::Role;

/// Fixed `iss` claim of every token this server signs.
pub const TOKEN_ISSUER: &str = "identity-auth-server";

/// Token lifetime.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Failures that mean the token must be rejected outright.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("unexpected signing method: {0:?}")]
    UnexpectedSigningMethod(Algorithm),

    #[error("failed to parse token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Claims as written at issuance.
#[derive(Debug, Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    iss: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

/// Decoded claims of a verified token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    /// `sub`, only when it is a string
    pub subject: Option<String>,
    /// `iss`
    pub issuer: Option<String>,
    /// `iat` (Unix seconds)
    pub issued_at: Option<i64>,
    /// `exp` (Unix seconds)
    pub expires_at: i64,
    /// Every other claim, including `role`
    pub extra: Map<String, Value>,
}

/// Result of looking up the `role` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleClaim {
    /// No `role` claim
    Missing,
    /// `role` is present but not a string
    InvalidType,
    /// `role` is a string that names no known role
    Unknown(String),
    /// `role` names a known role
    Present(Role),
}

impl Claims {
    /// Split a raw claims map into the registered claims and the rest.
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let subject = match map.remove("sub") {
            Some(Value::String(sub)) => Some(sub),
            _ => None,
        };
        let issuer = match map.remove("iss") {
            Some(Value::String(iss)) => Some(iss),
            _ => None,
        };
        let issued_at = map.remove("iat").and_then(|v| v.as_i64());
        let expires_at = map.remove("exp").and_then(|v| v.as_i64()).unwrap_or_default();

        Self {
            subject,
            issuer,
            issued_at,
            expires_at,
            extra: map,
        }
    }

    /// Look up the `role` claim.
    ///
    /// The role is whatever was embedded at issuance; it is not refreshed
    /// from the identity store.
    pub fn role(&self) -> RoleClaim {
        match self.extra.get("role") {
            None => RoleClaim::Missing,
            Some(Value::String(name)) => match Role::parse(name) {
                Some(role) => RoleClaim::Present(role),
                None => RoleClaim::Unknown(name.clone()),
            },
            Some(_) => RoleClaim::InvalidType,
        }
    }
}

/// A token that passed signature and expiry checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidToken {
    pub claims: Claims,
    /// `sub` claim, empty when missing or not a string
    pub user_id: String,
}

/// Non-exceptional validation outcomes.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValidation {
    /// Empty token string
    NotExist,
    /// Signature fine, `exp` in the past
    Expired,
    /// Signature and claims verified
    Valid(ValidToken),
}

impl TokenValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenValidation::Valid(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, TokenValidation::Expired)
    }

    pub fn is_not_exist(&self) -> bool {
        matches!(self, TokenValidation::NotExist)
    }

    /// Subject of a valid token (may be empty).
    pub fn user_id(&self) -> Option<&str> {
        match self {
            TokenValidation::Valid(token) => Some(token.user_id.as_str()),
            _ => None,
        }
    }
}

/// Signs bounded-lifetime tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<SigningKeys>,
}

impl TokenIssuer {
    pub fn new(keys: Arc<SigningKeys>) -> Self {
        Self { keys }
    }

    /// Issue a token for `subject` with no role claim.
    pub fn issue(&self, subject: &str) -> Result<String, TokenError> {
        self.issue_at(subject, None, Utc::now())
    }

    /// Issue a token for `subject` embedding its current `role`.
    pub fn issue_with_role(&self, subject: &str, role: Role) -> Result<String, TokenError> {
        self.issue_at(subject, Some(role), Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        role: Option<Role>,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = IssuedClaims {
            sub: subject,
            iss: TOKEN_ISSUER,
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
            role,
        };

        encode(&Header::new(Algorithm::ES256), &claims, self.keys.encoding_key())
            .map_err(TokenError::Signing)
    }
}

/// Verifies tokens signed by [`TokenIssuer`].
#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: Arc<SigningKeys>,
}

impl TokenValidator {
    pub fn new(keys: Arc<SigningKeys>) -> Self {
        Self { keys }
    }

    /// Validate a compact token string.
    ///
    /// Callers must treat any `Err` as an unconditional rejection.
    pub fn validate(&self, token: &str) -> Result<TokenValidation, TokenError> {
        if token.is_empty() {
            return Ok(TokenValidation::NotExist);
        }

        let header = decode_header(token).map_err(TokenError::Invalid)?;
        if !matches!(header.alg, Algorithm::ES256 | Algorithm::ES384) {
            return Err(TokenError::UnexpectedSigningMethod(header.alg));
        }

        let mut validation = Validation::new(Algorithm::ES256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;
        validation.set_issuer(&[TOKEN_ISSUER]);

        let data = match decode::<Map<String, Value>>(token, self.keys.decoding_key(), &validation) {
            Ok(data) => data,
            Err(e) => {
                return match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Ok(TokenValidation::Expired)
                    }
                    _ => Err(TokenError::Invalid(e)),
                }
            }
        };

        let claims = Claims::from_map(data.claims);
        let user_id = claims.subject.clone().unwrap_or_default();

        Ok(TokenValidation::Valid(ValidToken { claims, user_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::{test_keys, OTHER_PKCS8_KEY};
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde_json::json;

    fn pair() -> (TokenIssuer, TokenValidator) {
        let keys = Arc::new(test_keys());
        (TokenIssuer::new(keys.clone()), TokenValidator::new(keys))
    }

    fn sign_raw(claims: &Value) -> String {
        encode(&Header::new(Algorithm::ES256), claims, test_keys().encoding_key()).unwrap()
    }

    #[test]
    fn issued_token_round_trips() {
        let (issuer, validator) = pair();
        let token = issuer.issue("user-42").unwrap();

        let result = validator.validate(&token).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.user_id(), Some("user-42"));

        let TokenValidation::Valid(valid) = result else {
            panic!("expected a valid token");
        };
        assert_eq!(valid.claims.issuer.as_deref(), Some(TOKEN_ISSUER));
        assert_eq!(valid.claims.role(), RoleClaim::Missing);
        let lifetime = valid.claims.expires_at - valid.claims.issued_at.unwrap();
        assert_eq!(lifetime, TOKEN_TTL_HOURS * 3600);
    }

    #[test]
    fn issue_with_role_embeds_role() {
        let (issuer, validator) = pair();
        let token = issuer.issue_with_role("user-7", Role::Staff).unwrap();

        let TokenValidation::Valid(valid) = validator.validate(&token).unwrap() else {
            panic!("expected a valid token");
        };
        assert_eq!(valid.claims.role(), RoleClaim::Present(Role::Staff));
    }

    #[test]
    fn token_issued_25_hours_ago_is_expired() {
        let (issuer, validator) = pair();
        let token = issuer
            .issue_at("user-42", None, Utc::now() - Duration::hours(25))
            .unwrap();

        let result = validator.validate(&token).unwrap();
        assert!(result.is_expired());
        assert!(!result.is_valid());
    }

    #[test]
    fn hand_built_expired_token_is_expired() {
        let (_, validator) = pair();
        let token = sign_raw(&json!({
            "sub": "test-user-expired",
            "iss": TOKEN_ISSUER,
            "exp": (Utc::now() - Duration::hours(1)).timestamp(),
        }));

        assert_eq!(validator.validate(&token).unwrap(), TokenValidation::Expired);
    }

    #[test]
    fn empty_token_is_not_exist() {
        let (_, validator) = pair();
        let result = validator.validate("").unwrap();
        assert!(result.is_not_exist());
        assert_eq!(result.user_id(), None);
    }

    #[test]
    fn malformed_token_is_an_error() {
        let (_, validator) = pair();
        assert!(matches!(
            validator.validate("invalid-token"),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn flipped_signature_byte_is_rejected() {
        let (issuer, validator) = pair();
        let token = issuer.issue("user-42").unwrap();

        let (signing_input, signature) = token.rsplit_once('.').unwrap();
        let mut raw = URL_SAFE_NO_PAD.decode(signature).unwrap();
        for index in [0, raw.len() / 2, raw.len() - 1] {
            raw[index] ^= 0x01;
            let tampered = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(&raw));
            assert!(validator.validate(&tampered).is_err());
            raw[index] ^= 0x01;
        }
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let (_, validator) = pair();
        let other = SigningKeys::from_pem(OTHER_PKCS8_KEY).unwrap();
        let foreign = TokenIssuer::new(Arc::new(other)).issue("user-42").unwrap();

        assert!(matches!(
            validator.validate(&foreign),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn hmac_token_is_unexpected_signing_method() {
        let (_, validator) = pair();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "user-42", "iss": TOKEN_ISSUER, "exp": 9_999_999_999i64 }),
            &jsonwebtoken::EncodingKey::from_secret(b"shared"),
        )
        .unwrap();

        assert!(matches!(
            validator.validate(&token),
            Err(TokenError::UnexpectedSigningMethod(Algorithm::HS256))
        ));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let (_, validator) = pair();
        let token = sign_raw(&json!({
            "sub": "user-42",
            "iss": "someone-else",
            "exp": 9_999_999_999i64,
        }));

        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn non_string_subject_leaves_user_id_empty() {
        let (_, validator) = pair();
        let token = sign_raw(&json!({
            "sub": 42,
            "iss": TOKEN_ISSUER,
            "exp": 9_999_999_999i64,
        }));

        let result = validator.validate(&token).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.user_id(), Some(""));
    }

    #[test]
    fn role_claim_reports_type_and_membership_problems() {
        let claims = |role: Value| {
            let mut map = Map::new();
            map.insert("role".to_string(), role);
            Claims::from_map(map)
        };

        assert_eq!(claims(json!(7)).role(), RoleClaim::InvalidType);
        assert_eq!(
            claims(json!("root")).role(),
            RoleClaim::Unknown("root".to_string())
        );
        assert_eq!(claims(json!("admin")).role(), RoleClaim::Present(Role::Admin));
        assert_eq!(Claims::from_map(Map::new()).role(), RoleClaim::Missing);
    }
}
