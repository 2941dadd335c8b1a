//! Auth extractors: bearer parsing, JWT vs API key discrimination,
//! workspace resolution and role checks.
//!
//! User-session endpoints take [`AuthedUser`] (JWT only). Machine endpoints
//! (search, urgency, feedback) take [`WorkspaceAuth`], which accepts an API
//! key or a JWT and resolves the bound workspace. Feedback endpoints use
//! [`MaybeWorkspaceAuth`] so the capability-key path works without any
//! bearer credential.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use aaq_core::auth::jwt::looks_like_jwt;
use aaq_core::model::{UserRole, Workspace};
use aaq_core::Error;

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated user session, bound to one workspace
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: i64,
    pub workspace_id: i64,
    pub role: UserRole,
}

impl AuthedUser {
    /// Reject read-only sessions for mutating endpoints
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role.satisfies(UserRole::Admin) {
            Ok(())
        } else {
            Err(ApiError(Error::Forbidden(
                "workspace admin role required".to_string(),
            )))
        }
    }
}

/// A machine caller resolved to its workspace
#[derive(Debug, Clone)]
pub struct WorkspaceAuth {
    pub workspace: Workspace,
}

/// Optional variant for endpoints that also accept capability keys
#[derive(Debug, Clone)]
pub struct MaybeWorkspaceAuth(pub Option<WorkspaceAuth>);

fn bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or_else(|| {
            ApiError(Error::Unauthenticated(
                "missing bearer credential".to_string(),
            ))
        })?;

        if !looks_like_jwt(&token) {
            return Err(ApiError(Error::Unauthenticated(
                "this endpoint requires a user session token".to_string(),
            )));
        }

        let claims = state.identity.jwt().validate(&token)?;
        Ok(Self {
            user_id: claims.sub,
            workspace_id: claims.workspace_id,
            role: claims.role,
        })
    }
}

impl FromRequestParts<AppState> for WorkspaceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = bearer(parts).ok_or_else(|| {
            ApiError(Error::Unauthenticated(
                "missing bearer credential".to_string(),
            ))
        })?;

        let workspace = if looks_like_jwt(&credential) {
            let claims = state.identity.jwt().validate(&credential)?;
            state
                .identity
                .get_workspace(claims.workspace_id)
                .await?
                .ok_or_else(|| {
                    Error::Unauthenticated("token workspace no longer exists".to_string())
                })?
        } else {
            state.identity.authenticate_api_key(&credential).await?
        };

        Ok(Self { workspace })
    }
}

impl FromRequestParts<AppState> for MaybeWorkspaceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if bearer(parts).is_none() {
            return Ok(Self(None));
        }
        // An invalid bearer is not fatal here: the capability key in the
        // body may still authorize the request
        match WorkspaceAuth::from_request_parts(parts, state).await {
            Ok(auth) => Ok(Self(Some(auth))),
            Err(e) => {
                tracing::debug!(error = %e.0, "ignoring invalid bearer on capability endpoint");
                Ok(Self(None))
            }
        }
    }
}
