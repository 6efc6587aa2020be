//! Persistence boundary for the permission engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{
    Department, Grant, InheritanceRule, NewGrant, NewPermissionTemplate, OwnerType,
    PermissionTemplate, TemplateApplicationRecord, UpsertInheritanceRule, WILDCARD,
};

mod sqlite;

pub use sqlite::SqlitePermissionStore;

/// Narrows a grant lookup to a resource and/or action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantQuery {
    pub resource: Option<String>,
    pub action: Option<String>,
    /// Also match rows whose resource or action is the wildcard
    pub include_wildcards: bool,
}

impl GrantQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(resource: Option<&str>, action: Option<&str>) -> Self {
        Self {
            resource: resource.map(str::to_string),
            action: action.map(str::to_string),
            include_wildcards: false,
        }
    }

    /// Lookup used by permission checks: exact key plus any wildcard rows
    /// that could cover it.
    pub fn covering(resource: &str, action: &str) -> Self {
        Self {
            resource: Some(resource.to_string()),
            action: Some(action.to_string()),
            include_wildcards: true,
        }
    }

    pub fn matches(&self, grant: &Grant) -> bool {
        Self::field_matches(self.resource.as_deref(), &grant.resource, self.include_wildcards)
            && Self::field_matches(self.action.as_deref(), &grant.action, self.include_wildcards)
    }

    fn field_matches(wanted: Option<&str>, actual: &str, include_wildcards: bool) -> bool {
        match wanted {
            None => true,
            Some(w) => w == actual || (include_wildcards && actual == WILDCARD),
        }
    }
}

/// Department-direct grants produced by one template application.
#[derive(Debug, Clone)]
pub struct TemplateGrantBatch {
    pub department_id: Uuid,
    pub template_id: String,
    pub template_name: String,
    pub grants: Vec<NewGrant>,
    pub override_existing: bool,
    pub actor_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct TemplateBatchOutcome {
    pub record: TemplateApplicationRecord,
    pub grants: Vec<Grant>,
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Whole department table, for in-memory hierarchy resolution.
    async fn list_departments(&self) -> AppResult<Vec<Department>>;

    /// Active (not soft-deactivated) grants of the given owners. Expiry is
    /// left to the caller.
    async fn find_grants(
        &self,
        owner_type: OwnerType,
        owner_ids: &[Uuid],
        query: &GrantQuery,
    ) -> AppResult<Vec<Grant>>;

    async fn find_grant(&self, grant_id: Uuid) -> AppResult<Option<Grant>>;

    /// Roles the user currently holds (active and unexpired membership).
    async fn active_role_ids(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Vec<Uuid>>;

    async fn list_inheritance_rules(
        &self,
        parent_department_id: Uuid,
        child_department_id: Uuid,
    ) -> AppResult<Vec<InheritanceRule>>;

    async fn upsert_inheritance_rule(&self, rule: &UpsertInheritanceRule) -> AppResult<InheritanceRule>;

    async fn insert_grant(&self, grant: &NewGrant, created_by: Option<Uuid>) -> AppResult<Grant>;

    /// Soft-deactivates a grant. Returns false when no active grant matched.
    async fn deactivate_grant(&self, grant_id: Uuid) -> AppResult<bool>;

    async fn list_custom_templates(&self, category: Option<&str>) -> AppResult<Vec<PermissionTemplate>>;

    async fn find_custom_template(&self, template_id: &str) -> AppResult<Option<PermissionTemplate>>;

    async fn insert_custom_template(
        &self,
        template: &NewPermissionTemplate,
        created_by: Option<Uuid>,
    ) -> AppResult<PermissionTemplate>;

    /// Deactivates (when requested) the department's current direct grants,
    /// inserts the batch and writes the application record to the audit log
    /// as one atomic unit.
    async fn apply_template_batch(&self, batch: TemplateGrantBatch) -> AppResult<TemplateBatchOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(resource: &str, action: &str) -> Grant {
        Grant {
            id: Uuid::new_v4(),
            owner_type: OwnerType::User,
            owner_id: Uuid::new_v4(),
            resource: resource.to_string(),
            action: action.to_string(),
            granted: true,
            conditions: serde_json::json!({}),
            source: crate::models::PermissionSource::Direct,
            priority: 1,
            expires_at: None,
            inherit_from_parent: true,
            override_children: false,
            is_active: true,
            inherited_from: None,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exact_query_ignores_wildcards() {
        let query = GrantQuery::new(Some("courses"), Some("read"));
        assert!(query.matches(&grant("courses", "read")));
        assert!(!query.matches(&grant("*", "read")));
        assert!(!query.matches(&grant("courses", "update")));
    }

    #[test]
    fn covering_query_includes_wildcards() {
        let query = GrantQuery::covering("courses", "read");
        assert!(query.matches(&grant("courses", "read")));
        assert!(query.matches(&grant("*", "read")));
        assert!(query.matches(&grant("courses", "*")));
        assert!(query.matches(&grant("*", "*")));
        assert!(!query.matches(&grant("exams", "read")));
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(GrantQuery::all().matches(&grant("anything", "at-all")));
    }
}
