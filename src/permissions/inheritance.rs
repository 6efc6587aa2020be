use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{Grant, InheritanceRule};
use crate::store::PermissionStore;

/// Decides which of an ancestor's grants reach a descendant department.
///
/// A matching rule wins: `full` and `partial` propagate, `none` drops. With
/// no rule the grant's own `inherit_from_parent` flag decides.
#[derive(Clone)]
pub struct InheritanceFilter {
    store: Arc<dyn PermissionStore>,
}

impl InheritanceFilter {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// `distance` is the number of hops from `child_id` up to `parent_id`.
    pub async fn filter_inheritable(
        &self,
        parent_grants: Vec<Grant>,
        parent_id: Uuid,
        child_id: Uuid,
        distance: u32,
    ) -> AppResult<Vec<Grant>> {
        if parent_grants.is_empty() {
            return Ok(parent_grants);
        }

        let rules = self.store.list_inheritance_rules(parent_id, child_id).await?;
        Ok(apply_rules(parent_grants, &rules, parent_id, child_id, distance))
    }
}

pub fn apply_rules(
    parent_grants: Vec<Grant>,
    rules: &[InheritanceRule],
    parent_id: Uuid,
    child_id: Uuid,
    distance: u32,
) -> Vec<Grant> {
    parent_grants
        .into_iter()
        .filter(|grant| {
            let rule = rules.iter().find(|r| {
                r.parent_department_id == parent_id
                    && r.child_department_id == child_id
                    && r.matches(&grant.resource, &grant.action)
            });

            let propagates = match rule {
                Some(rule) => rule.inherit_type.propagates(),
                None => grant.inherit_from_parent,
            };

            if !propagates {
                tracing::debug!(
                    parent_id = %parent_id,
                    child_id = %child_id,
                    resource = %grant.resource,
                    action = %grant.action,
                    explicit_rule = rule.is_some(),
                    "grant not inherited"
                );
            }
            propagates
        })
        .map(|grant| grant.inherited(distance))
        .collect()
}
