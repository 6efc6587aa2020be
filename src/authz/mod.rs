//! Authorization for the admin HTTP surface.
//!
//! Mutating endpoints are guarded by the permission engine itself: the caller
//! needs `(permissions, manage)` in the department the request targets.

mod evaluator;
mod principal;

pub use evaluator::{DepartmentPolicyEvaluator, PolicyEvaluator};
pub use principal::{Principal, ResourceContext};

use std::sync::Arc;

use crate::errors::{AppError, AppResult};

/// Authorization enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthzMode {
    /// No permission checks (development mode)
    #[default]
    Off,
    /// Log denials but allow requests
    Advisory,
    /// Reject denied requests with 403
    Strict,
}

impl AuthzMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "advisory" => AuthzMode::Advisory,
            "strict" => AuthzMode::Strict,
            _ => AuthzMode::Off,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var("AUTHZ_MODE").unwrap_or_default())
    }
}

/// Resource and action names used by the admin surface.
pub mod guards {
    pub const PERMISSIONS: &str = "permissions";
    pub const TEMPLATES: &str = "templates";
    pub const MANAGE: &str = "manage";
}

#[derive(Clone)]
pub struct Authorizer {
    mode: AuthzMode,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl Authorizer {
    pub fn new(mode: AuthzMode, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { mode, evaluator }
    }

    pub fn mode(&self) -> AuthzMode {
        self.mode
    }

    pub async fn enforce(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
        ctx: &ResourceContext,
    ) -> AppResult<()> {
        if self.mode == AuthzMode::Off {
            return Ok(());
        }

        if self.evaluator.can(principal, resource, action, ctx).await {
            return Ok(());
        }

        match self.mode {
            AuthzMode::Strict => Err(AppError::forbidden(format!(
                "missing permission {resource}:{action}"
            ))),
            _ => {
                tracing::warn!(
                    user_id = %principal.user_id,
                    resource,
                    action,
                    "advisory mode: request would be denied"
                );
                Ok(())
            }
        }
    }
}
