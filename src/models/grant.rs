use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::Auditable;
use crate::errors::AppError;

/// Matches any resource or any action when used in a grant.
pub const WILDCARD: &str = "*";

pub const DIRECT_PRIORITY: i32 = 1;
pub const ROLE_PRIORITY: i32 = 2;
pub const DEPARTMENT_BASE_PRIORITY: i32 = 3;

// =============================================================================
// SOURCE / OWNER
// =============================================================================

/// Where a candidate grant came from during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    Direct,
    Role,
    DepartmentDirect,
    DepartmentInherited,
}

impl PermissionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionSource::Direct => "direct",
            PermissionSource::Role => "role",
            PermissionSource::DepartmentDirect => "department_direct",
            PermissionSource::DepartmentInherited => "department_inherited",
        }
    }
}

/// Rank of a grant: lower is stronger.
///
/// `depth` is the distance between the department that owns the grant and the
/// department being queried. It only affects department sources; a
/// department's own grants sit at depth 0.
pub fn compute_priority(source: PermissionSource, depth: u32) -> i32 {
    match source {
        PermissionSource::Direct => DIRECT_PRIORITY,
        PermissionSource::Role => ROLE_PRIORITY,
        PermissionSource::DepartmentDirect | PermissionSource::DepartmentInherited => {
            DEPARTMENT_BASE_PRIORITY.saturating_add(i32::try_from(depth).unwrap_or(i32::MAX))
        }
    }
}

/// Kind of record a grant is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Role,
    Department,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::User => "user",
            OwnerType::Role => "role",
            OwnerType::Department => "department",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "user" => Ok(OwnerType::User),
            "role" => Ok(OwnerType::Role),
            "department" => Ok(OwnerType::Department),
            other => Err(AppError::internal(format!("unknown owner type: {}", other))),
        }
    }

    /// Source a stored grant carries before any inheritance re-tagging.
    pub fn source(&self) -> PermissionSource {
        match self {
            OwnerType::User => PermissionSource::Direct,
            OwnerType::Role => PermissionSource::Role,
            OwnerType::Department => PermissionSource::DepartmentDirect,
        }
    }
}

// =============================================================================
// KEY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct PermissionKey {
    pub resource: String,
    pub action: String,
}

impl PermissionKey {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }
}

impl std::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

// =============================================================================
// GRANT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Grant {
    pub id: Uuid,
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
    #[schema(example = "reports")]
    pub resource: String,
    #[schema(example = "read")]
    pub action: String,
    pub granted: bool,
    /// Opaque predicate map, carried but never evaluated here
    #[schema(value_type = Object)]
    pub conditions: Value,
    pub source: PermissionSource,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub inherit_from_parent: bool,
    pub override_children: bool,
    pub is_active: bool,
    /// Ancestor department the grant was inherited from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.resource.clone(), self.action.clone())
    }

    pub fn matches_key(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Copy of an ancestor's department grant as seen from a descendant
    /// `distance` hops below it.
    pub fn inherited(&self, distance: u32) -> Grant {
        Grant {
            source: PermissionSource::DepartmentInherited,
            priority: compute_priority(PermissionSource::DepartmentInherited, distance),
            inherited_from: Some(self.owner_id),
            ..self.clone()
        }
    }
}

impl Auditable for Grant {
    fn target_type() -> &'static str {
        "permission_grant"
    }

    fn target_id(&self) -> String {
        self.id.to_string()
    }
}

fn default_true() -> bool {
    true
}

fn empty_conditions() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewGrant {
    pub owner_type: OwnerType,
    pub owner_id: Uuid,
    #[schema(example = "courses")]
    pub resource: String,
    #[schema(example = "update")]
    pub action: String,
    #[serde(default = "default_true")]
    pub granted: bool,
    #[serde(default = "empty_conditions")]
    #[schema(value_type = Object)]
    pub conditions: Value,
    #[serde(default = "default_true")]
    pub inherit_from_parent: bool,
    #[serde(default)]
    pub override_children: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewGrant {
    pub fn new(
        owner_type: OwnerType,
        owner_id: Uuid,
        resource: impl Into<String>,
        action: impl Into<String>,
        granted: bool,
    ) -> Self {
        Self {
            owner_type,
            owner_id,
            resource: resource.into(),
            action: action.into(),
            granted,
            conditions: empty_conditions(),
            inherit_from_parent: true,
            override_children: false,
            expires_at: None,
        }
    }

    pub fn with_inherit_from_parent(mut self, inherit: bool) -> Self {
        self.inherit_from_parent = inherit;
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_conditions(mut self, conditions: Value) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.resource.trim().is_empty() {
            return Err(AppError::bad_request("resource must not be empty"));
        }
        if self.action.trim().is_empty() {
            return Err(AppError::bad_request("action must not be empty"));
        }
        if !self.conditions.is_object() {
            return Err(AppError::bad_request("conditions must be a JSON object"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn department_grant(owner: Uuid) -> Grant {
        Grant {
            id: Uuid::new_v4(),
            owner_type: OwnerType::Department,
            owner_id: owner,
            resource: "reports".to_string(),
            action: "read".to_string(),
            granted: true,
            conditions: serde_json::json!({}),
            source: PermissionSource::DepartmentDirect,
            priority: compute_priority(PermissionSource::DepartmentDirect, 0),
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
    fn priority_orders_sources() {
        assert_eq!(compute_priority(PermissionSource::Direct, 7), 1);
        assert_eq!(compute_priority(PermissionSource::Role, 7), 2);
        assert_eq!(compute_priority(PermissionSource::DepartmentDirect, 0), 3);
        assert_eq!(compute_priority(PermissionSource::DepartmentInherited, 1), 4);
        assert_eq!(compute_priority(PermissionSource::DepartmentInherited, 2), 5);
        assert_eq!(compute_priority(PermissionSource::DepartmentInherited, u32::MAX), i32::MAX);
    }

    #[test]
    fn inherited_copy_is_retagged() {
        let owner = Uuid::new_v4();
        let grant = department_grant(owner);
        let inherited = grant.inherited(2);

        assert_eq!(inherited.id, grant.id);
        assert_eq!(inherited.source, PermissionSource::DepartmentInherited);
        assert_eq!(inherited.priority, 5);
        assert_eq!(inherited.inherited_from, Some(owner));
    }

    #[test]
    fn expiry_is_inclusive_of_now() {
        let now = Utc::now();
        let mut grant = department_grant(Uuid::new_v4());
        assert!(!grant.is_expired_at(now));

        grant.expires_at = Some(now);
        assert!(grant.is_expired_at(now));

        grant.expires_at = Some(now + Duration::minutes(5));
        assert!(!grant.is_expired_at(now));
    }

    #[test]
    fn new_grant_rejects_blank_keys() {
        let grant = NewGrant::new(OwnerType::User, Uuid::new_v4(), " ", "read", true);
        assert!(matches!(grant.validate(), Err(AppError::BadRequest(_))));

        let grant = NewGrant::new(OwnerType::User, Uuid::new_v4(), "reports", "read", true)
            .with_conditions(serde_json::json!(["not", "a", "map"]));
        assert!(matches!(grant.validate(), Err(AppError::BadRequest(_))));
    }
}
