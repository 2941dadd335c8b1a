//! Identity and workspace management workflows.
//!
//! Wraps the [`IdentityStore`] with the auth primitives: password hashing,
//! JWT issuance, API key rotation and role enforcement. Every mutation
//! checks the acting user's role before touching the store.

use std::sync::Arc;

use crate::auth::{
    generate_api_key, hash_api_key, hash_password, verify_password, JwtCodec,
};
use crate::constants::API_KEY_DISPLAY_PREFIX_LEN;
use crate::error::{Error, Result};
use crate::model::{NewUser, NewWorkspace, User, UserRole, UserWorkspaceLink, Workspace};
use crate::storage::IdentityStore;

/// A successful login: the token plus what it binds to
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
    pub workspace: Workspace,
    pub role: UserRole,
}

/// Identity workflows over the store and JWT codec
pub struct IdentityService {
    store: Arc<dyn IdentityStore>,
    jwt: JwtCodec,
    default_content_quota: Option<i64>,
    default_api_daily_quota: Option<i64>,
}

impl IdentityService {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        jwt: JwtCodec,
        default_content_quota: Option<i64>,
        default_api_daily_quota: Option<i64>,
    ) -> Self {
        Self {
            store,
            jwt,
            default_content_quota,
            default_api_daily_quota,
        }
    }

    /// Register a new user; fails `AlreadyExists` when the username is taken
    pub async fn register_user(&self, new_user: &NewUser) -> Result<User> {
        new_user.validate()?;
        let password_hash = hash_password(&new_user.password)?;
        let user = self
            .store
            .create_user(new_user.username.trim(), &password_hash)
            .await?;
        tracing::info!(user_id = user.id, "registered user");
        Ok(user)
    }

    /// Update a user's own username/password
    pub async fn update_user(
        &self,
        actor_id: i64,
        user_id: i64,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<User> {
        if actor_id != user_id {
            return Err(Error::Forbidden(
                "users may only edit their own account".to_string(),
            ));
        }
        let password_hash = password.map(hash_password).transpose()?;
        self.store
            .update_user(user_id, username, password_hash.as_deref())
            .await
    }

    /// Verify credentials and issue a JWT for the user's default workspace
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let user = self
            .store
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| Error::Unauthenticated("unknown username or password".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(Error::Unauthenticated(
                "unknown username or password".to_string(),
            ));
        }

        let links = self.store.list_links_for_user(user.id).await?;
        let link = links
            .iter()
            .find(|l| l.is_default)
            .or_else(|| links.first())
            .ok_or_else(|| {
                Error::Forbidden("user does not belong to any workspace".to_string())
            })?;

        self.issue_for_link(user, link).await
    }

    /// Issue a JWT for a specific workspace the user belongs to
    pub async fn login_workspace(&self, user_id: i64, workspace_id: i64) -> Result<LoginOutcome> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))?;
        let link = self
            .store
            .get_link(user_id, workspace_id)
            .await?
            .ok_or_else(|| {
                Error::Forbidden("user does not belong to this workspace".to_string())
            })?;
        self.issue_for_link(user, &link).await
    }

    async fn issue_for_link(&self, user: User, link: &UserWorkspaceLink) -> Result<LoginOutcome> {
        let workspace = self
            .store
            .get_workspace(link.workspace_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("workspace {}", link.workspace_id)))?;
        let token = self.jwt.issue(user.id, workspace.id, link.role)?;
        Ok(LoginOutcome {
            token,
            user,
            workspace,
            role: link.role,
        })
    }

    /// Create a workspace; the creator becomes its first admin, and their
    /// default workspace when they had none
    pub async fn create_workspace(
        &self,
        creator_id: i64,
        mut payload: NewWorkspace,
    ) -> Result<Workspace> {
        if payload.content_quota.is_none() {
            payload.content_quota = self.default_content_quota;
        }
        if payload.api_daily_quota.is_none() {
            payload.api_daily_quota = self.default_api_daily_quota;
        }
        payload.validate()?;

        let workspace = self.store.create_workspace(&payload).await?;
        let had_links = !self.store.list_links_for_user(creator_id).await?.is_empty();
        self.store
            .upsert_link(&UserWorkspaceLink {
                user_id: creator_id,
                workspace_id: workspace.id,
                role: UserRole::Admin,
                is_default: !had_links,
            })
            .await?;

        tracing::info!(workspace_id = workspace.id, "created workspace");
        Ok(workspace)
    }

    /// Update quota fields; workspace admins only
    pub async fn update_workspace_quotas(
        &self,
        actor_id: i64,
        workspace_id: i64,
        content_quota: Option<Option<i64>>,
        api_daily_quota: Option<Option<i64>>,
    ) -> Result<Workspace> {
        self.require_admin(actor_id, workspace_id).await?;
        self.store
            .update_workspace_quotas(workspace_id, content_quota, api_daily_quota)
            .await
    }

    /// Add a user to a workspace; the actor must be one of its admins
    pub async fn add_user_to_workspace(
        &self,
        actor_id: i64,
        user_id: i64,
        workspace_id: i64,
        role: UserRole,
    ) -> Result<UserWorkspaceLink> {
        self.require_admin(actor_id, workspace_id).await?;
        if self.store.get_user(user_id).await?.is_none() {
            return Err(Error::NotFound(format!("user {user_id}")));
        }

        let had_links = !self.store.list_links_for_user(user_id).await?.is_empty();
        let link = UserWorkspaceLink {
            user_id,
            workspace_id,
            role,
            is_default: !had_links,
        };
        self.store.upsert_link(&link).await?;
        Ok(link)
    }

    /// Atomically flip the user's default workspace
    pub async fn set_default_workspace(&self, user_id: i64, workspace_id: i64) -> Result<()> {
        if self.store.get_link(user_id, workspace_id).await?.is_none() {
            return Err(Error::Forbidden(
                "user does not belong to this workspace".to_string(),
            ));
        }
        self.store.set_default_workspace(user_id, workspace_id).await
    }

    /// Rotate the workspace API key and return the plaintext exactly once
    pub async fn rotate_api_key(&self, actor_id: i64, workspace_id: i64) -> Result<String> {
        self.require_admin(actor_id, workspace_id).await?;

        let key = generate_api_key();
        let prefix: String = key.chars().take(API_KEY_DISPLAY_PREFIX_LEN).collect();
        self.store
            .replace_api_key(workspace_id, &hash_api_key(&key), &prefix)
            .await?;

        tracing::info!(workspace_id, "rotated API key");
        Ok(key)
    }

    /// Resolve a workspace from a presented API key
    pub async fn authenticate_api_key(&self, key: &str) -> Result<Workspace> {
        self.store
            .find_workspace_by_api_key_hash(&hash_api_key(key))
            .await?
            .ok_or_else(|| Error::Unauthenticated("invalid API key".to_string()))
    }

    /// Role of a user inside a workspace, erroring `Forbidden` when absent
    pub async fn require_member(&self, user_id: i64, workspace_id: i64) -> Result<UserRole> {
        self.store
            .role_in_workspace(user_id, workspace_id)
            .await?
            .ok_or_else(|| Error::Forbidden("not a member of this workspace".to_string()))
    }

    async fn require_admin(&self, user_id: i64, workspace_id: i64) -> Result<()> {
        match self.require_member(user_id, workspace_id).await? {
            UserRole::Admin => Ok(()),
            UserRole::ReadOnly => Err(Error::Forbidden(
                "workspace admin role required".to_string(),
            )),
        }
    }

    /// Workspaces the user belongs to, with roles
    pub async fn workspaces_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<(Workspace, UserWorkspaceLink)>> {
        let links = self.store.list_links_for_user(user_id).await?;
        let mut result = Vec::with_capacity(links.len());
        for link in links {
            if let Some(workspace) = self.store.get_workspace(link.workspace_id).await? {
                result.push((workspace, link));
            }
        }
        Ok(result)
    }

    /// Fetch a user by id
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.store.get_user(user_id).await
    }

    /// Fetch a workspace by id
    pub async fn get_workspace(&self, workspace_id: i64) -> Result<Option<Workspace>> {
        self.store.get_workspace(workspace_id).await
    }

    /// Codec handle for middleware token validation
    #[must_use]
    pub fn jwt(&self) -> &JwtCodec {
        &self.jwt
    }
}
