use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::hierarchy::HierarchyResolver;
use super::inheritance::InheritanceFilter;
use crate::errors::AppResult;
use crate::models::{Grant, OwnerType};
use crate::store::{GrantQuery, PermissionStore};

fn unexpired(grants: Vec<Grant>, now: DateTime<Utc>) -> Vec<Grant> {
    grants.into_iter().filter(|g| !g.is_expired_at(now)).collect()
}

/// Gathers candidate grants for a subject from every source. Nothing here
/// resolves contradictions; that is left to conflict handling.
#[derive(Clone)]
pub struct PermissionAggregator {
    store: Arc<dyn PermissionStore>,
    hierarchy: HierarchyResolver,
    inheritance: InheritanceFilter,
}

impl PermissionAggregator {
    pub fn new(store: Arc<dyn PermissionStore>, max_depth: usize) -> Self {
        Self {
            hierarchy: HierarchyResolver::new(Arc::clone(&store), max_depth),
            inheritance: InheritanceFilter::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    pub async fn get_user_direct_permissions(
        &self,
        user_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Grant>> {
        let grants = self.store.find_grants(OwnerType::User, &[user_id], query).await?;
        Ok(unexpired(grants, now))
    }

    pub async fn get_user_role_permissions(
        &self,
        user_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Grant>> {
        let role_ids = self.store.active_role_ids(user_id, now).await?;
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let grants = self.store.find_grants(OwnerType::Role, &role_ids, query).await?;
        Ok(unexpired(grants, now))
    }

    pub async fn get_department_direct_permissions(
        &self,
        department_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Grant>> {
        let grants = self
            .store
            .find_grants(OwnerType::Department, &[department_id], query)
            .await?;
        Ok(unexpired(grants, now))
    }

    pub async fn get_department_inherited_permissions(
        &self,
        department_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Grant>> {
        let ancestors = self.hierarchy.get_parent_path(department_id).await?;
        let mut inherited = Vec::new();

        for (index, ancestor_id) in ancestors.into_iter().enumerate() {
            let distance = u32::try_from(index + 1).unwrap_or(u32::MAX);
            let grants = self
                .get_department_direct_permissions(ancestor_id, query, now)
                .await?;
            let passed = self
                .inheritance
                .filter_inheritable(grants, ancestor_id, department_id, distance)
                .await?;
            inherited.extend(passed);
        }

        Ok(inherited)
    }

    /// Direct and inherited department grants, before consolidation.
    pub async fn get_department_effective_permissions(
        &self,
        department_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Grant>> {
        let mut grants = self
            .get_department_direct_permissions(department_id, query, now)
            .await?;
        grants.extend(
            self.get_department_inherited_permissions(department_id, query, now)
                .await?,
        );
        Ok(grants)
    }

    /// Every candidate grant for a user acting within a department.
    pub async fn get_user_candidate_permissions(
        &self,
        user_id: Uuid,
        department_id: Uuid,
        query: &GrantQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Grant>> {
        let mut candidates = self.get_user_direct_permissions(user_id, query, now).await?;
        candidates.extend(self.get_user_role_permissions(user_id, query, now).await?);
        candidates.extend(
            self.get_department_effective_permissions(department_id, query, now)
                .await?,
        );

        tracing::debug!(
            user_id = %user_id,
            department_id = %department_id,
            candidates = candidates.len(),
            "aggregated candidate grants"
        );
        Ok(candidates)
    }
}
