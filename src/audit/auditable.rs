use serde::Serialize;

/// Records that can be the target of an audit entry.
pub trait Auditable: Serialize + Send + Sync {
    /// Target type written to the audit log (e.g. "permission_grant")
    fn target_type() -> &'static str;

    /// Identifier of the record within its target type
    fn target_id(&self) -> String;
}
