use std::time::Duration;

use async_trait::async_trait;

use super::principal::{Principal, ResourceContext};
use crate::permissions::PermissionService;

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Whether the principal may perform `action` on `resource`
    async fn can(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
        ctx: &ResourceContext,
    ) -> bool;
}

/// Evaluates requests against resolved department permissions.
///
/// Fails closed: no department, a store error or a check that outlives
/// `timeout` all deny.
#[derive(Clone)]
pub struct DepartmentPolicyEvaluator {
    service: PermissionService,
    timeout: Duration,
}

impl DepartmentPolicyEvaluator {
    pub fn new(service: PermissionService, timeout: Duration) -> Self {
        Self { service, timeout }
    }
}

#[async_trait]
impl PolicyEvaluator for DepartmentPolicyEvaluator {
    async fn can(
        &self,
        principal: &Principal,
        resource: &str,
        action: &str,
        ctx: &ResourceContext,
    ) -> bool {
        let Some(department_id) = ctx.department_for(principal) else {
            tracing::debug!(
                user_id = %principal.user_id,
                resource,
                action,
                "no department in scope, denying"
            );
            return false;
        };

        let check = self
            .service
            .check_user_permission(principal.user_id, department_id, resource, action);

        match tokio::time::timeout(self.timeout, check).await {
            Ok(Ok(allowed)) => allowed,
            Ok(Err(err)) => {
                tracing::error!(
                    user_id = %principal.user_id,
                    department_id = %department_id,
                    resource,
                    action,
                    error = %err,
                    "permission check failed, denying"
                );
                false
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %principal.user_id,
                    department_id = %department_id,
                    resource,
                    action,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "permission check timed out, denying"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct AllowAll;

    #[async_trait]
    impl PolicyEvaluator for AllowAll {
        async fn can(&self, _: &Principal, _: &str, _: &str, _: &ResourceContext) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_evaluator_is_object_safe() {
        let evaluator: Box<dyn PolicyEvaluator> = Box::new(AllowAll);
        let principal = Principal::new(Uuid::new_v4());
        assert!(
            evaluator
                .can(&principal, "reports", "read", &ResourceContext::new())
                .await
        );
    }

    #[test]
    fn test_context_department_wins_over_home_department() {
        let home = Uuid::new_v4();
        let explicit = Uuid::new_v4();
        let principal = Principal::new(Uuid::new_v4()).with_department(home);

        assert_eq!(ResourceContext::new().department_for(&principal), Some(home));
        assert_eq!(
            ResourceContext::new()
                .with_department(explicit)
                .department_for(&principal),
            Some(explicit)
        );
        assert_eq!(
            ResourceContext::new().department_for(&Principal::new(Uuid::new_v4())),
            None
        );
    }
}
