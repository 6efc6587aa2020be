use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::Auditable;
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
}

// =============================================================================
// INHERITANCE RULES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InheritType {
    Full,
    Partial,
    None,
}

impl InheritType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InheritType::Full => "full",
            InheritType::Partial => "partial",
            InheritType::None => "none",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "full" => Ok(InheritType::Full),
            "partial" => Ok(InheritType::Partial),
            "none" => Ok(InheritType::None),
            other => Err(AppError::internal(format!("unknown inherit type: {}", other))),
        }
    }

    pub fn propagates(&self) -> bool {
        !matches!(self, InheritType::None)
    }
}

/// Explicit decision on whether one ancestor's grant for a (resource, action)
/// reaches a given descendant department.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InheritanceRule {
    pub id: Uuid,
    pub parent_department_id: Uuid,
    pub child_department_id: Uuid,
    pub resource: String,
    pub action: String,
    pub inherit_type: InheritType,
    pub override_allowed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InheritanceRule {
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }
}

impl Auditable for InheritanceRule {
    fn target_type() -> &'static str {
        "department_inheritance_rule"
    }

    fn target_id(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpsertInheritanceRule {
    pub parent_department_id: Uuid,
    pub child_department_id: Uuid,
    #[schema(example = "reports")]
    pub resource: String,
    #[schema(example = "read")]
    pub action: String,
    pub inherit_type: InheritType,
    #[serde(default)]
    pub override_allowed: bool,
}

impl UpsertInheritanceRule {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.parent_department_id == self.child_department_id {
            return Err(AppError::bad_request("a department cannot inherit from itself"));
        }
        if self.resource.trim().is_empty() || self.action.trim().is_empty() {
            return Err(AppError::bad_request("resource and action are required"));
        }
        Ok(())
    }
}
