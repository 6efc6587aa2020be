use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::Auditable;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// Built into the binary, never persisted
    Predefined,
    /// Stored in the database and editable
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TemplatePermission {
    #[schema(example = "courses")]
    pub resource: String,
    #[schema(example = "read")]
    pub action: String,
    pub granted: bool,
}

impl TemplatePermission {
    pub fn new(resource: &str, action: &str, granted: bool) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
            granted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PermissionTemplate {
    #[schema(example = "readonly")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(example = "system")]
    pub category: String,
    pub kind: TemplateKind,
    pub permissions: Vec<TemplatePermission>,
}

impl Auditable for PermissionTemplate {
    fn target_type() -> &'static str {
        "permission_template"
    }

    fn target_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewPermissionTemplate {
    #[schema(example = "Teaching assistant")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "education")]
    pub category: String,
    pub permissions: Vec<TemplatePermission>,
}

impl NewPermissionTemplate {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("template name must not be empty"));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::bad_request("template category must not be empty"));
        }
        if self.permissions.is_empty() {
            return Err(AppError::bad_request("template must contain at least one permission"));
        }
        if self
            .permissions
            .iter()
            .any(|p| p.resource.trim().is_empty() || p.action.trim().is_empty())
        {
            return Err(AppError::bad_request("template permissions need a resource and an action"));
        }
        Ok(())
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyTemplateRequest {
    pub department_id: Uuid,
    #[serde(default)]
    pub override_existing: bool,
}

/// What a single template application did, as written to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateApplicationRecord {
    pub target_department_id: Uuid,
    pub template_id: String,
    pub template_name: String,
    pub actor_id: Uuid,
    pub override_existing: bool,
    pub applied_count: usize,
    pub deactivated_count: usize,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TemplateApplicationResult {
    pub success: bool,
    pub message: String,
    pub applied_permissions: usize,
}
