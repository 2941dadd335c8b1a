//! `IdentityStore` implementation.

use async_trait::async_trait;
use sqlx::Row;

use aaq_core::model::{NewWorkspace, User, UserWorkspaceLink, Workspace};
use aaq_core::storage::IdentityStore;
use aaq_core::{Error, Result};

use crate::{db_err, map_workspace, PostgresStore};

fn map_user(row: &sqlx::postgres::PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(|e| db_err("user.id", e))?,
        username: row
            .try_get("username")
            .map_err(|e| db_err("user.username", e))?,
        password_hash: row
            .try_get("password_hash")
            .map_err(|e| db_err("user.password_hash", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| db_err("user.created_at", e))?,
    })
}

fn map_link(row: &sqlx::postgres::PgRow) -> Result<UserWorkspaceLink> {
    let role: String = row.try_get("role").map_err(|e| db_err("link.role", e))?;
    Ok(UserWorkspaceLink {
        user_id: row
            .try_get("user_id")
            .map_err(|e| db_err("link.user_id", e))?,
        workspace_id: row
            .try_get("workspace_id")
            .map_err(|e| db_err("link.workspace_id", e))?,
        role: role.parse()?,
        is_default: row
            .try_get("is_default")
            .map_err(|e| db_err("link.is_default", e))?,
    })
}

#[async_trait]
impl IdentityStore for PostgresStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2)
             RETURNING id, username, password_hash, created_at",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err(&format!("username {username}"), e))?;
        map_user(&row)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("get user", e))?;
        row.as_ref().map(map_user).transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("get user by username", e))?;
        row.as_ref().map(map_user).transpose()
    }

    async fn update_user(
        &self,
        id: i64,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User> {
        let row = sqlx::query(
            "UPDATE users SET
                username = COALESCE($2, username),
                password_hash = COALESCE($3, password_hash)
             WHERE id = $1
             RETURNING id, username, password_hash, created_at",
        )
        .bind(id)
        .bind(username)
        .bind(password_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("update user", e))?
        .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        map_user(&row)
    }

    async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace> {
        let row = sqlx::query(
            "INSERT INTO workspaces (name, content_quota, api_daily_quota)
             VALUES ($1, $2, $3)
             RETURNING id, name, content_quota, api_daily_quota,
                       api_key_first_characters, api_key_updated_at, created_at, updated_at",
        )
        .bind(&workspace.name)
        .bind(workspace.content_quota)
        .bind(workspace.api_daily_quota)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err(&format!("workspace {}", workspace.name), e))?;
        map_workspace(&row)
    }

    async fn get_workspace(&self, id: i64) -> Result<Option<Workspace>> {
        let row = sqlx::query(
            "SELECT id, name, content_quota, api_daily_quota,
                    api_key_first_characters, api_key_updated_at, created_at, updated_at
             FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("get workspace", e))?;
        row.as_ref().map(map_workspace).transpose()
    }

    async fn update_workspace_quotas(
        &self,
        id: i64,
        content_quota: Option<Option<i64>>,
        api_daily_quota: Option<Option<i64>>,
    ) -> Result<Workspace> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin quota update", e))?;

        let current = sqlx::query(
            "SELECT content_quota, api_daily_quota FROM workspaces WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_err("lock workspace", e))?
        .ok_or_else(|| Error::NotFound(format!("workspace {id}")))?;

        let content_quota = match content_quota {
            Some(value) => value,
            None => current
                .try_get("content_quota")
                .map_err(|e| db_err("workspace.content_quota", e))?,
        };
        let api_daily_quota = match api_daily_quota {
            Some(value) => value,
            None => current
                .try_get("api_daily_quota")
                .map_err(|e| db_err("workspace.api_daily_quota", e))?,
        };

        let row = sqlx::query(
            "UPDATE workspaces
             SET content_quota = $2, api_daily_quota = $3, updated_at = now()
             WHERE id = $1
             RETURNING id, name, content_quota, api_daily_quota,
                       api_key_first_characters, api_key_updated_at, created_at, updated_at",
        )
        .bind(id)
        .bind(content_quota)
        .bind(api_daily_quota)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_err("update workspace quotas", e))?;

        tx.commit().await.map_err(|e| db_err("commit quota update", e))?;
        map_workspace(&row)
    }

    async fn upsert_link(&self, link: &UserWorkspaceLink) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin link upsert", e))?;

        if link.is_default {
            sqlx::query("UPDATE user_workspace_links SET is_default = false WHERE user_id = $1")
                .bind(link.user_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err("clear default links", e))?;
        }

        sqlx::query(
            "INSERT INTO user_workspace_links (user_id, workspace_id, role, is_default)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, workspace_id)
             DO UPDATE SET role = EXCLUDED.role, is_default = EXCLUDED.is_default",
        )
        .bind(link.user_id)
        .bind(link.workspace_id)
        .bind(link.role.to_string())
        .bind(link.is_default)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("upsert link", e))?;

        tx.commit().await.map_err(|e| db_err("commit link upsert", e))
    }

    async fn get_link(
        &self,
        user_id: i64,
        workspace_id: i64,
    ) -> Result<Option<UserWorkspaceLink>> {
        let row = sqlx::query(
            "SELECT user_id, workspace_id, role, is_default
             FROM user_workspace_links WHERE user_id = $1 AND workspace_id = $2",
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("get link", e))?;
        row.as_ref().map(map_link).transpose()
    }

    async fn list_links_for_user(&self, user_id: i64) -> Result<Vec<UserWorkspaceLink>> {
        let rows = sqlx::query(
            "SELECT user_id, workspace_id, role, is_default
             FROM user_workspace_links WHERE user_id = $1 ORDER BY workspace_id",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("list links", e))?;
        rows.iter().map(map_link).collect()
    }

    async fn remove_link(&self, user_id: i64, workspace_id: i64) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin link removal", e))?;

        // Serialize admin-count checks on the workspace row
        sqlx::query("SELECT id FROM workspaces WHERE id = $1 FOR UPDATE")
            .bind(workspace_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err("lock workspace", e))?
            .ok_or_else(|| Error::NotFound(format!("workspace {workspace_id}")))?;

        let is_admin: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM user_workspace_links
                WHERE user_id = $1 AND workspace_id = $2 AND role = 'admin'
            )",
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_err("check admin", e))?;

        if is_admin {
            let admins: i64 = sqlx::query_scalar(
                "SELECT count(*) FROM user_workspace_links
                 WHERE workspace_id = $1 AND role = 'admin'",
            )
            .bind(workspace_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_err("count admins", e))?;
            if admins <= 1 {
                return Err(Error::Validation(
                    "cannot remove the last admin of a workspace".to_string(),
                ));
            }
        }

        sqlx::query(
            "DELETE FROM user_workspace_links WHERE user_id = $1 AND workspace_id = $2",
        )
        .bind(user_id)
        .bind(workspace_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("remove link", e))?;

        tx.commit().await.map_err(|e| db_err("commit link removal", e))
    }

    async fn count_admins(&self, workspace_id: i64) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT count(*) FROM user_workspace_links
             WHERE workspace_id = $1 AND role = 'admin'",
        )
        .bind(workspace_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("count admins", e))
    }

    async fn set_default_workspace(&self, user_id: i64, workspace_id: i64) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin default flip", e))?;

        // Anchor on the user row so concurrent flips serialize
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err("lock user", e))?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))?;

        sqlx::query("UPDATE user_workspace_links SET is_default = false WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("clear defaults", e))?;

        let updated = sqlx::query(
            "UPDATE user_workspace_links SET is_default = true
             WHERE user_id = $1 AND workspace_id = $2",
        )
        .bind(user_id)
        .bind(workspace_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("set default", e))?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "user {user_id} has no link to workspace {workspace_id}"
            )));
        }

        tx.commit().await.map_err(|e| db_err("commit default flip", e))
    }

    async fn replace_api_key(
        &self,
        workspace_id: i64,
        key_hash: &str,
        first_characters: &str,
    ) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin key rotation", e))?;

        sqlx::query("SELECT id FROM workspaces WHERE id = $1 FOR UPDATE")
            .bind(workspace_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_err("lock workspace", e))?
            .ok_or_else(|| Error::NotFound(format!("workspace {workspace_id}")))?;

        sqlx::query(
            "UPDATE workspaces
             SET hashed_api_key = $2,
                 api_key_first_characters = $3,
                 api_key_updated_at = now(),
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(workspace_id)
        .bind(key_hash)
        .bind(first_characters)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("replace api key", e))?;

        tx.commit().await.map_err(|e| db_err("commit key rotation", e))
    }

    async fn find_workspace_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Workspace>> {
        let row = sqlx::query(
            "UPDATE workspaces SET api_key_last_used_at = now()
             WHERE hashed_api_key = $1
             RETURNING id, name, content_quota, api_daily_quota,
                       api_key_first_characters, api_key_updated_at, created_at, updated_at",
        )
        .bind(key_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("find workspace by key", e))?;
        row.as_ref().map(map_workspace).transpose()
    }
}
