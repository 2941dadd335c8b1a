//! JWT issuance and validation with secret-rotation support.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtSettings;
use crate::error::{Error, Result};
use crate::model::UserRole;

/// Claims carried by a user session token.
///
/// The token binds the user to exactly one workspace and role; switching
/// workspaces issues a fresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub workspace_id: i64,
    pub role: UserRole,
    /// Expiry as unix seconds
    pub exp: i64,
}

/// Encoder/decoder around the active secret plus the rotation grace list
#[derive(Clone)]
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: Vec<DecodingKey>,
    ttl_hours: i64,
}

impl JwtCodec {
    #[must_use]
    pub fn new(settings: &JwtSettings) -> Self {
        let mut decoding = vec![DecodingKey::from_secret(settings.secret.as_bytes())];
        for previous in &settings.previous_secrets {
            decoding.push(DecodingKey::from_secret(previous.as_bytes()));
        }
        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding,
            ttl_hours: settings.ttl_hours,
        }
    }

    /// Issue a token binding `user_id` to `workspace_id` with `role`
    pub fn issue(&self, user_id: i64, workspace_id: i64, role: UserRole) -> Result<String> {
        let claims = Claims {
            sub: user_id,
            workspace_id,
            role,
            exp: (Utc::now() + Duration::hours(self.ttl_hours)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("failed to sign token: {e}")))
    }

    /// Re-issue a token with the same identity claims and a fresh expiry
    pub fn refresh(&self, claims: &Claims) -> Result<String> {
        self.issue(claims.sub, claims.workspace_id, claims.role)
    }

    /// Validate a token against the active secret, then each grace-list
    /// secret in order
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let mut last_err = None;
        for key in &self.decoding {
            match decode::<Claims>(token, key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::Unauthenticated(format!(
            "invalid token: {}",
            last_err.map_or_else(|| "no decoding keys configured".to_string(), |e| e.to_string())
        )))
    }
}

/// Whether a bearer credential looks like a JWT (three dot-separated
/// segments) rather than an API key
#[must_use]
pub fn looks_like_jwt(credential: &str) -> bool {
    credential.split('.').count() == 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str, previous: Vec<String>) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            previous_secrets: previous,
            ttl_hours: 24,
        }
    }

    #[test]
    fn issue_and_validate() {
        let codec = JwtCodec::new(&settings("s3cret", vec![]));
        let token = codec.issue(7, 3, UserRole::Admin).unwrap();
        assert!(looks_like_jwt(&token));

        let claims = codec.validate(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.workspace_id, 3);
        assert_eq!(claims.role, UserRole::Admin);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn grace_list_accepts_previous_secret() {
        let old = JwtCodec::new(&settings("old-secret", vec![]));
        let token = old.issue(1, 1, UserRole::ReadOnly).unwrap();

        let rotated = JwtCodec::new(&settings("new-secret", vec!["old-secret".to_string()]));
        assert!(rotated.validate(&token).is_ok());

        let without_grace = JwtCodec::new(&settings("new-secret", vec![]));
        assert!(without_grace.validate(&token).is_err());
    }

    #[test]
    fn refresh_keeps_identity_claims() {
        let codec = JwtCodec::new(&settings("s3cret", vec![]));
        let token = codec.issue(7, 3, UserRole::ReadOnly).unwrap();
        let claims = codec.validate(&token).unwrap();

        let refreshed = codec.refresh(&claims).unwrap();
        let new_claims = codec.validate(&refreshed).unwrap();
        assert_eq!(new_claims.sub, claims.sub);
        assert_eq!(new_claims.workspace_id, claims.workspace_id);
        assert_eq!(new_claims.role, claims.role);
        assert!(new_claims.exp >= claims.exp);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = JwtCodec::new(&settings("s3cret", vec![]));
        let token = codec.issue(7, 3, UserRole::Admin).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push('A');
        assert!(codec.validate(&tampered).is_err());
    }

    #[test]
    fn api_key_is_not_mistaken_for_jwt() {
        assert!(!looks_like_jwt("aBcDeFgH1234567890aBcDeFgH123456"));
    }
}
