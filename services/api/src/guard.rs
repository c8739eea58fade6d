//! Authorization checks in front of content operations

use common::principal::{Action, Policy, Principal};
use tracing::warn;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    policy: Policy,
}

impl AuthorizationGuard {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    /// Require a principal permitted to manage content
    pub fn require_admin<'a>(&self, principal: Option<&'a Principal>) -> ApiResult<&'a Principal> {
        self.require(principal, Action::ManageContent)
    }

    /// Fails with `Unauthorized` without a principal and `Forbidden` when the
    /// policy denies `action`
    pub fn require<'a>(
        &self,
        principal: Option<&'a Principal>,
        action: Action,
    ) -> ApiResult<&'a Principal> {
        let principal = principal.ok_or(ApiError::Unauthorized)?;
        if !self.policy.allows(principal, action) {
            warn!(user_id = %principal.user_id, "Denied {:?}", action);
            return Err(ApiError::Forbidden);
        }
        Ok(principal)
    }
}
