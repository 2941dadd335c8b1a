//! User accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A registered user. Users may belong to many workspaces via
/// [`super::UserWorkspaceLink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Unique, case-sensitive
    pub username: String,
    /// Argon2 hash; never serialized into responses
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Registration payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

impl NewUser {
    pub fn validate(&self) -> Result<()> {
        let username = self.username.trim();
        if username.is_empty() || username.chars().count() > 100 {
            return Err(Error::Validation(
                "username must be 1..100 characters".to_string(),
            ));
        }
        if self.password.chars().count() < 8 {
            return Err(Error::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_minimum_length() {
        let short = NewUser {
            username: "amina".to_string(),
            password: "1234567".to_string(),
        };
        assert!(short.validate().is_err());

        let ok = NewUser {
            username: "amina".to_string(),
            password: "12345678".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
