//! # Session
//!
//! The bearer token returned by `/auth/login` and what the client reads out
//! of it. The signature is the server's business; the client only needs the
//! user name, the role (admin screens) and the expiry.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use ecopila_core::Role;

/// Claim names that may carry the role, in lookup order.
const ROLE_CLAIMS: [&str; 4] = ["role", "roles", "authorities", "auth"];

/// A logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub token: String,
    pub username: Option<String>,
    pub role: Role,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Reads the claims of `token` without verifying its signature.
    ///
    /// A token without a recognizable role claim is a plain `USER`.
    pub fn from_token(token: impl Into<String>) -> SyncResult<Self> {
        let token = token.into();

        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Map<String, Value>>(&token, &DecodingKey::from_secret(&[]), &validation)?;
        let claims = data.claims;

        let username = claims
            .get("sub")
            .or_else(|| claims.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let expires_at = claims
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single());

        Ok(Session {
            token,
            username,
            role: role_from_claims(&claims),
            expires_at,
        })
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Collects every role-looking string in the claims; any ADMIN wins.
fn role_from_claims(claims: &Map<String, Value>) -> Role {
    let mut found = Vec::new();
    for name in ROLE_CLAIMS {
        if let Some(value) = claims.get(name) {
            collect_roles(value, &mut found);
        }
    }

    if found.contains(&Role::Admin) {
        Role::Admin
    } else {
        Role::User
    }
}

fn collect_roles(value: &Value, out: &mut Vec<Role>) {
    match value {
        // "ADMIN" or "ROLE_ADMIN,ROLE_USER"
        Value::String(s) => out.extend(s.split(',').filter_map(|r| r.parse::<Role>().ok())),
        Value::Array(items) => items.iter().for_each(|item| collect_roles(item, out)),
        // Spring's [{"authority": "ROLE_ADMIN"}]
        Value::Object(map) => {
            if let Some(authority) = map.get("authority") {
                collect_roles(authority, out);
            }
        }
        _ => {}
    }
}

/// Fails with [`SyncError::NotAuthenticated`] when there is no session.
pub fn require(session: Option<&Session>) -> SyncResult<&Session> {
    session.ok_or(SyncError::NotAuthenticated)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    pub(crate) fn token(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_admin_role_from_string_claim() {
        let session = Session::from_token(token(json!({
            "sub": "tomas",
            "role": "ADMIN",
            "exp": 4_102_444_800i64,
        })))
        .unwrap();

        assert_eq!(session.username.as_deref(), Some("tomas"));
        assert!(session.is_admin());
        assert!(!session.is_expired(Utc::now()));
    }

    #[test]
    fn test_spring_authorities() {
        let session = Session::from_token(token(json!({
            "sub": "caja1",
            "authorities": [{"authority": "ROLE_USER"}],
        })))
        .unwrap();
        assert_eq!(session.role, Role::User);

        let session = Session::from_token(token(json!({
            "sub": "dueño",
            "auth": "ROLE_USER,ROLE_ADMIN",
        })))
        .unwrap();
        assert_eq!(session.role, Role::Admin);
    }

    #[test]
    fn test_missing_role_is_user_and_expiry_is_read() {
        let session = Session::from_token(token(json!({ "sub": "x", "exp": 1_000 }))).unwrap();
        assert_eq!(session.role, Role::User);
        assert!(session.is_expired(Utc::now()));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(matches!(
            Session::from_token("not-a-jwt"),
            Err(SyncError::InvalidToken(_))
        ));
        assert!(matches!(require(None), Err(SyncError::NotAuthenticated)));
    }
}
