//! Workspaces, membership links and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_WORKSPACE_NAME_LEN;
use crate::error::{Error, Result};

/// Tenancy boundary. A workspace owns content, tags, urgency rules, traces,
/// its API key and its quotas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    /// Ceiling on non-archived content items (None = unlimited)
    pub content_quota: Option<i64>,
    /// Ceiling on accepted queries per UTC day (None = unlimited)
    pub api_daily_quota: Option<i64>,
    /// First characters of the current API key, for display only
    pub api_key_first_characters: Option<String>,
    pub api_key_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for workspace creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkspace {
    pub name: String,
    pub content_quota: Option<i64>,
    pub api_daily_quota: Option<i64>,
}

impl NewWorkspace {
    /// Validate name length and quota signs
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > MAX_WORKSPACE_NAME_LEN {
            return Err(Error::Validation(format!(
                "workspace name must be 1..{MAX_WORKSPACE_NAME_LEN} characters"
            )));
        }
        for (label, quota) in [
            ("content_quota", self.content_quota),
            ("api_daily_quota", self.api_daily_quota),
        ] {
            if let Some(q) = quota {
                if q < 0 {
                    return Err(Error::Validation(format!("{label} must be non-negative")));
                }
            }
        }
        Ok(())
    }
}

/// Per-workspace role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// May mutate everything inside the workspace
    Admin,
    /// May read and submit queries only
    ReadOnly,
}

impl UserRole {
    /// Whether this role satisfies a required role
    #[must_use]
    pub fn satisfies(&self, required: UserRole) -> bool {
        match required {
            UserRole::Admin => matches!(self, UserRole::Admin),
            UserRole::ReadOnly => true,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::ReadOnly => write!(f, "read_only"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "read_only" => Ok(UserRole::ReadOnly),
            other => Err(Error::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Membership of a user in a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWorkspaceLink {
    pub user_id: i64,
    pub workspace_id: i64,
    pub role: UserRole,
    /// At most one link per user carries this flag
    pub is_default: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_satisfaction() {
        assert!(UserRole::Admin.satisfies(UserRole::Admin));
        assert!(UserRole::Admin.satisfies(UserRole::ReadOnly));
        assert!(!UserRole::ReadOnly.satisfies(UserRole::Admin));
        assert!(UserRole::ReadOnly.satisfies(UserRole::ReadOnly));
    }

    #[test]
    fn new_workspace_validation() {
        let ok = NewWorkspace {
            name: "maternal-health".to_string(),
            content_quota: Some(100),
            api_daily_quota: None,
        };
        assert!(ok.validate().is_ok());

        let empty = NewWorkspace {
            name: "  ".to_string(),
            content_quota: None,
            api_daily_quota: None,
        };
        assert!(empty.validate().is_err());

        let negative = NewWorkspace {
            name: "w".to_string(),
            content_quota: Some(-1),
            api_daily_quota: None,
        };
        assert!(negative.validate().is_err());

        let long = NewWorkspace {
            name: "x".repeat(151),
            content_quota: None,
            api_daily_quota: None,
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [UserRole::Admin, UserRole::ReadOnly] {
            let parsed: UserRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }
}
