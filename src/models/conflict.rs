use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::grant::Grant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// Members disagree on `granted`
    Inheritance,
    /// At least one member has expired
    Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    KeepHighestPriority,
    DropExpired,
}

/// Contradiction found among the candidate grants for one (resource, action).
/// Computed per resolution, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Conflict {
    pub resource: String,
    pub action: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub members: Vec<Grant>,
    pub auto_resolvable: bool,
    pub suggested_resolution: ConflictResolution,
}

/// Decision set plus the conflicts that were detected while producing it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionResolution {
    pub permissions: Vec<Grant>,
    pub conflicts: Vec<Conflict>,
}
