pub mod conflict;
pub mod department;
pub mod grant;
pub mod template;

pub use conflict::{Conflict, ConflictResolution, ConflictSeverity, ConflictType, PermissionResolution};
pub use department::{Department, InheritType, InheritanceRule, UpsertInheritanceRule};
pub use grant::{
    compute_priority, Grant, NewGrant, OwnerType, PermissionKey, PermissionSource, WILDCARD,
};
pub use template::{
    ApplyTemplateRequest, NewPermissionTemplate, PermissionTemplate, TemplateApplicationRecord,
    TemplateApplicationResult, TemplateKind, TemplatePermission,
};
