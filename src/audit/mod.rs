//! Append-only audit trail for permission administration.
//!
//! Every row is chained to the previous one with `sha256(prev_hash || payload)`
//! so edits to historical rows can be detected with [`verify_chain`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::TemplateApplicationRecord;

pub mod auditable;
pub use auditable::Auditable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub target_type: String,
    pub target_id: String,
    pub change_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub metadata: Value,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        change_type: impl Into<String>,
        actor_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_type: target_type.into(),
            target_id: target_id.into(),
            change_type: change_type.into(),
            old_value: None,
            new_value: None,
            reason: None,
            metadata: Value::Object(Default::default()),
            actor_id,
            occurred_at: Utc::now(),
        }
    }

    /// Entry for a change to an [`Auditable`] record, with optional old state.
    pub fn for_change<T: Auditable>(
        change_type: &str,
        actor_id: Option<Uuid>,
        entity: &T,
        old_entity: Option<&T>,
    ) -> Self {
        let mut entry = Self::new(T::target_type(), entity.target_id(), change_type, actor_id);
        entry.new_value = serde_json::to_value(entity).ok();
        entry.old_value = old_entity.and_then(|e| serde_json::to_value(e).ok());
        entry
    }

    pub fn template_applied(record: &TemplateApplicationRecord) -> Self {
        let mut entry = Self::new(
            "department",
            record.target_department_id.to_string(),
            "template_applied",
            Some(record.actor_id),
        );
        entry.new_value = serde_json::to_value(record).ok();
        entry.reason = Some(format!("applied permission template '{}'", record.template_name));
        entry.metadata = serde_json::json!({
            "template_id": record.template_id,
            "override_existing": record.override_existing,
            "applied_count": record.applied_count,
            "deactivated_count": record.deactivated_count,
        });
        entry.occurred_at = record.applied_at;
        entry
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Write side of the audit collaborator. Entries are never read back by the
/// permission engine.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> AppResult<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    async fn record(&self, entry: AuditEntry) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        // The write lock must be held before the chain head is read, otherwise
        // concurrent appends race for the same seq.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let appended = match append_entry(&mut *conn, &entry).await {
            Ok(_) => sqlx::query("COMMIT").execute(&mut *conn).await.map_err(AppError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = appended {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                tracing::warn!(error = %rollback_err, "audit rollback failed");
            }
            return Err(err);
        }

        tracing::debug!(
            target_type = %entry.target_type,
            target_id = %entry.target_id,
            change_type = %entry.change_type,
            "audit entry recorded"
        );
        Ok(())
    }
}

pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Appends one entry on an existing connection so callers can include it in
/// their own transaction. The caller must already hold the database write
/// lock. Returns the new chain hash.
pub async fn append_entry(conn: &mut SqliteConnection, entry: &AuditEntry) -> AppResult<String> {
    let last = sqlx::query("SELECT hash, seq FROM permission_audit_log ORDER BY seq DESC LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;

    let (prev_hash, seq) = match last {
        Some(row) => {
            let hash: String = row.try_get("hash")?;
            let seq: i64 = row.try_get("seq")?;
            (Some(hash), seq + 1)
        }
        None => (None, 1),
    };

    let payload = serde_json::to_string(entry)
        .map_err(|e| AppError::internal(format!("failed to serialize audit entry: {}", e)))?;
    let hash = chain_hash(prev_hash.as_deref(), &payload);

    let old_value = entry.old_value.as_ref().map(Value::to_string);
    let new_value = entry.new_value.as_ref().map(Value::to_string);

    sqlx::query(
        r#"
        INSERT INTO permission_audit_log
            (id, target_type, target_id, change_type, old_value, new_value, reason, metadata, actor_id, occurred_at, payload, prev_hash, hash, seq)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(&entry.target_type)
    .bind(&entry.target_id)
    .bind(&entry.change_type)
    .bind(old_value)
    .bind(new_value)
    .bind(&entry.reason)
    .bind(entry.metadata.to_string())
    .bind(entry.actor_id.map(|id| id.to_string()))
    .bind(entry.occurred_at.to_rfc3339())
    .bind(&payload)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(seq)
    .execute(&mut *conn)
    .await?;

    Ok(hash)
}

/// Recomputes the hash chain over the whole log.
pub async fn verify_chain(pool: &SqlitePool) -> AppResult<bool> {
    let rows = sqlx::query("SELECT payload, prev_hash, hash FROM permission_audit_log ORDER BY seq")
        .fetch_all(pool)
        .await?;

    let mut expected_prev: Option<String> = None;
    for row in rows {
        let payload: String = row.try_get("payload")?;
        let prev_hash: Option<String> = row.try_get("prev_hash")?;
        let hash: String = row.try_get("hash")?;

        if prev_hash != expected_prev || chain_hash(prev_hash.as_deref(), &payload) != hash {
            return Ok(false);
        }
        expected_prev = Some(hash);
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_hash_depends_on_previous_hash() {
        let first = chain_hash(None, "payload");
        let second = chain_hash(Some(&first), "payload");

        assert_eq!(first.len(), 64);
        assert_ne!(first, second);
        assert_eq!(second, chain_hash(Some(&first), "payload"));
    }

    #[test]
    fn template_entry_carries_record_metadata() {
        let record = TemplateApplicationRecord {
            target_department_id: Uuid::new_v4(),
            template_id: "readonly".to_string(),
            template_name: "Read only".to_string(),
            actor_id: Uuid::new_v4(),
            override_existing: true,
            applied_count: 1,
            deactivated_count: 3,
            applied_at: Utc::now(),
        };

        let entry = AuditEntry::template_applied(&record);
        assert_eq!(entry.target_type, "department");
        assert_eq!(entry.target_id, record.target_department_id.to_string());
        assert_eq!(entry.change_type, "template_applied");
        assert_eq!(entry.actor_id, Some(record.actor_id));
        assert_eq!(entry.metadata["deactivated_count"], 3);
        assert_eq!(entry.occurred_at, record.applied_at);
    }
}
