use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::Department;
use crate::store::PermissionStore;

/// In-memory id -> parent index over the department table.
#[derive(Debug, Clone, Default)]
pub struct DepartmentTree {
    parents: HashMap<Uuid, Option<Uuid>>,
}

impl DepartmentTree {
    pub fn new(departments: impl IntoIterator<Item = Department>) -> Self {
        let parents = departments
            .into_iter()
            .map(|d| (d.id, d.parent_id))
            .collect();
        Self { parents }
    }

    pub fn contains(&self, department_id: Uuid) -> bool {
        self.parents.contains_key(&department_id)
    }

    /// Ancestors of `department_id`, nearest first.
    ///
    /// Unknown departments have no ancestors. The walk stops at the first
    /// repeated id (cyclic data) or after `max_depth` ancestors.
    pub fn parent_path(&self, department_id: Uuid, max_depth: usize) -> Vec<Uuid> {
        let mut path = Vec::new();
        let mut visited = HashSet::from([department_id]);
        let mut current = self.parents.get(&department_id).copied().flatten();

        while let Some(parent_id) = current {
            if !visited.insert(parent_id) {
                tracing::warn!(
                    department_id = %department_id,
                    repeated = %parent_id,
                    "department hierarchy contains a cycle, truncating parent path"
                );
                break;
            }
            if path.len() >= max_depth {
                tracing::warn!(
                    department_id = %department_id,
                    max_depth,
                    "department hierarchy deeper than allowed, truncating parent path"
                );
                break;
            }

            path.push(parent_id);
            current = self.parents.get(&parent_id).copied().flatten();
        }

        path
    }
}

/// Resolves ancestor chains from one snapshot of the department table.
#[derive(Clone)]
pub struct HierarchyResolver {
    store: Arc<dyn PermissionStore>,
    max_depth: usize,
}

impl HierarchyResolver {
    pub fn new(store: Arc<dyn PermissionStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    pub async fn load_tree(&self) -> AppResult<DepartmentTree> {
        let departments = self.store.list_departments().await?;
        Ok(DepartmentTree::new(departments))
    }

    pub async fn get_parent_path(&self, department_id: Uuid) -> AppResult<Vec<Uuid>> {
        let tree = self.load_tree().await?;
        Ok(tree.parent_path(department_id, self.max_depth))
    }
}
