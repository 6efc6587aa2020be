use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::aggregator::PermissionAggregator;
use super::conflict::{ConflictDetector, ConflictResolver};
use super::consolidate::{consolidate, find_decisive};
use crate::audit::{AuditEntry, AuditSink};
use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    Conflict, Grant, InheritanceRule, NewGrant, PermissionKey, PermissionResolution,
    UpsertInheritanceRule,
};
use crate::store::{GrantQuery, PermissionStore};

/// Query and administration API over the resolution pipeline:
/// aggregate, detect conflicts, resolve, consolidate.
#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn PermissionStore>,
    audit: Arc<dyn AuditSink>,
    aggregator: PermissionAggregator,
}

struct Decided {
    permissions: BTreeMap<PermissionKey, Grant>,
    conflicts: Vec<Conflict>,
}

impl PermissionService {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        audit: Arc<dyn AuditSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            aggregator: PermissionAggregator::new(Arc::clone(&store), config.max_hierarchy_depth),
            store,
            audit,
        }
    }

    pub fn aggregator(&self) -> &PermissionAggregator {
        &self.aggregator
    }

    async fn decide(
        &self,
        user_id: Uuid,
        department_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Decided> {
        let candidates = self
            .aggregator
            .get_user_candidate_permissions(user_id, department_id, query, now)
            .await?;

        let conflicts = ConflictDetector::detect(&candidates, now);
        if !conflicts.is_empty() {
            tracing::debug!(
                user_id = %user_id,
                department_id = %department_id,
                conflicts = conflicts.len(),
                "resolving permission conflicts"
            );
        }

        let resolved = ConflictResolver::resolve(candidates, &conflicts, now);
        Ok(Decided {
            permissions: consolidate(resolved),
            conflicts,
        })
    }

    /// Consolidated decisions plus the conflicts found on the way.
    pub async fn resolve_user_permissions(
        &self,
        user_id: Uuid,
        department_id: Uuid,
        resource: Option<&str>,
        action: Option<&str>,
    ) -> AppResult<PermissionResolution> {
        let query = GrantQuery::new(resource, action);
        let decided = self.decide(user_id, department_id, &query, Utc::now()).await?;

        Ok(PermissionResolution {
            permissions: decided.permissions.into_values().collect(),
            conflicts: decided.conflicts,
        })
    }

    pub async fn get_user_effective_permissions(
        &self,
        user_id: Uuid,
        department_id: Uuid,
        resource: Option<&str>,
        action: Option<&str>,
    ) -> AppResult<Vec<Grant>> {
        let resolution = self
            .resolve_user_permissions(user_id, department_id, resource, action)
            .await?;
        Ok(resolution.permissions)
    }

    /// Allowed only when a consolidated grant decides the pair and says so.
    pub async fn check_user_permission(
        &self,
        user_id: Uuid,
        department_id: Uuid,
        resource: &str,
        action: &str,
    ) -> AppResult<bool> {
        let query = GrantQuery::covering(resource, action);
        let decided = self.decide(user_id, department_id, &query, Utc::now()).await?;

        let allowed = find_decisive(&decided.permissions, resource, action)
            .map(|grant| grant.granted)
            .unwrap_or(false);

        tracing::debug!(
            user_id = %user_id,
            department_id = %department_id,
            resource,
            action,
            allowed,
            "permission check"
        );
        Ok(allowed)
    }

    /// Direct plus inherited department grants, not consolidated.
    pub async fn get_department_effective_permissions(
        &self,
        department_id: Uuid,
        resource: Option<&str>,
        action: Option<&str>,
    ) -> AppResult<Vec<Grant>> {
        let query = GrantQuery::new(resource, action);
        self.aggregator
            .get_department_effective_permissions(department_id, &query, Utc::now())
            .await
    }

    pub async fn get_department_parent_path(&self, department_id: Uuid) -> AppResult<Vec<Uuid>> {
        self.aggregator.hierarchy().get_parent_path(department_id).await
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    pub async fn create_grant(&self, grant: NewGrant, actor_id: Uuid) -> AppResult<Grant> {
        grant.validate()?;
        let created = self.store.insert_grant(&grant, Some(actor_id)).await?;

        tracing::info!(
            grant_id = %created.id,
            owner_type = created.owner_type.as_str(),
            owner_id = %created.owner_id,
            key = %created.key(),
            granted = created.granted,
            "permission grant created"
        );
        self.record(AuditEntry::for_change("created", Some(actor_id), &created, None))
            .await;
        Ok(created)
    }

    pub async fn deactivate_grant(&self, grant_id: Uuid, actor_id: Uuid) -> AppResult<Grant> {
        let existing = self
            .store
            .find_grant(grant_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::not_found(format!("active grant {grant_id}")))?;

        if !self.store.deactivate_grant(grant_id).await? {
            return Err(AppError::not_found(format!("active grant {grant_id}")));
        }

        let mut deactivated = existing.clone();
        deactivated.is_active = false;

        tracing::info!(grant_id = %grant_id, "permission grant deactivated");
        self.record(AuditEntry::for_change(
            "deactivated",
            Some(actor_id),
            &deactivated,
            Some(&existing),
        )
        .with_reason("soft delete"))
        .await;
        Ok(deactivated)
    }

    pub async fn upsert_inheritance_rule(
        &self,
        rule: UpsertInheritanceRule,
        actor_id: Uuid,
    ) -> AppResult<InheritanceRule> {
        rule.validate()?;
        let previous = self
            .store
            .list_inheritance_rules(rule.parent_department_id, rule.child_department_id)
            .await?
            .into_iter()
            .find(|r| r.resource == rule.resource && r.action == rule.action);

        let saved = self.store.upsert_inheritance_rule(&rule).await?;
        let change = if previous.is_some() { "updated" } else { "created" };

        tracing::info!(
            rule_id = %saved.id,
            parent = %saved.parent_department_id,
            child = %saved.child_department_id,
            inherit_type = saved.inherit_type.as_str(),
            "inheritance rule {change}"
        );
        self.record(AuditEntry::for_change(change, Some(actor_id), &saved, previous.as_ref()))
            .await;
        Ok(saved)
    }

    // Audit failures are logged, never returned.
    async fn record(&self, entry: AuditEntry) {
        if let Err(err) = self.audit.record(entry).await {
            tracing::warn!(error = %err, "failed to record audit entry");
        }
    }
}
