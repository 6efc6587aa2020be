use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    compute_priority, Department, Grant, InheritType, InheritanceRule, OwnerType,
    PermissionTemplate, TemplateKind, TemplatePermission,
};

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

pub fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

fn parse_opt_uuid(s: Option<String>) -> Result<Option<Uuid>, AppError> {
    match s {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_uuid(&s)?)),
        _ => Ok(None),
    }
}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, AppError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

fn get_flag(row: &SqliteRow, column: &str) -> Result<bool, AppError> {
    let value: i64 = get(row, column)?;
    Ok(value != 0)
}

/// Decodes a `permission_grants` row. The source and priority reflect the
/// owner as stored; inheritance re-tagging happens later.
pub fn grant_from_row(row: &SqliteRow) -> Result<Grant, AppError> {
    let id_s: String = get(row, "id")?;
    let owner_type_s: String = get(row, "owner_type")?;
    let owner_id_s: String = get(row, "owner_id")?;
    let resource: String = get(row, "resource")?;
    let action: String = get(row, "action")?;
    let granted = get_flag(row, "granted")?;
    let conditions_s: Option<String> = get(row, "conditions")?;
    let inherit_from_parent = get_flag(row, "inherit_from_parent")?;
    let override_children = get_flag(row, "override_children")?;
    let is_active = get_flag(row, "is_active")?;
    let expires_at_s: Option<String> = get(row, "expires_at")?;
    let created_by_s: Option<String> = get(row, "created_by")?;
    let created_at_s: String = get(row, "created_at")?;

    let owner_type = OwnerType::parse(&owner_type_s)?;
    let source = owner_type.source();
    let conditions = match conditions_s {
        Some(s) if !s.trim().is_empty() => serde_json::from_str(&s)
            .map_err(|e| AppError::internal(format!("invalid conditions json: {}", e)))?,
        _ => Value::Object(Default::default()),
    };

    Ok(Grant {
        id: parse_uuid(&id_s)?,
        owner_type,
        owner_id: parse_uuid(&owner_id_s)?,
        resource,
        action,
        granted,
        conditions,
        source,
        priority: compute_priority(source, 0),
        expires_at: parse_opt_datetime(expires_at_s)?,
        inherit_from_parent,
        override_children,
        is_active,
        inherited_from: None,
        created_by: parse_opt_uuid(created_by_s)?,
        created_at: parse_datetime(&created_at_s)?,
    })
}

pub fn department_from_row(row: &SqliteRow) -> Result<Department, AppError> {
    let id_s: String = get(row, "id")?;
    let name: String = get(row, "name")?;
    let parent_id_s: Option<String> = get(row, "parent_id")?;
    let is_active = get_flag(row, "is_active")?;

    Ok(Department {
        id: parse_uuid(&id_s)?,
        name,
        parent_id: parse_opt_uuid(parent_id_s)?,
        is_active,
    })
}

pub fn inheritance_rule_from_row(row: &SqliteRow) -> Result<InheritanceRule, AppError> {
    let id_s: String = get(row, "id")?;
    let parent_s: String = get(row, "parent_department_id")?;
    let child_s: String = get(row, "child_department_id")?;
    let resource: String = get(row, "resource")?;
    let action: String = get(row, "action")?;
    let inherit_type_s: String = get(row, "inherit_type")?;
    let override_allowed = get_flag(row, "override_allowed")?;
    let created_at_s: String = get(row, "created_at")?;
    let updated_at_s: String = get(row, "updated_at")?;

    Ok(InheritanceRule {
        id: parse_uuid(&id_s)?,
        parent_department_id: parse_uuid(&parent_s)?,
        child_department_id: parse_uuid(&child_s)?,
        resource,
        action,
        inherit_type: InheritType::parse(&inherit_type_s)?,
        override_allowed,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
    })
}

pub fn custom_template_from_row(row: &SqliteRow) -> Result<PermissionTemplate, AppError> {
    let id: String = get(row, "id")?;
    let name: String = get(row, "name")?;
    let description: Option<String> = get(row, "description")?;
    let category: String = get(row, "category")?;
    let permissions_s: String = get(row, "permissions")?;

    let permissions: Vec<TemplatePermission> = serde_json::from_str(&permissions_s)
        .map_err(|e| AppError::internal(format!("invalid template permissions json: {}", e)))?;

    Ok(PermissionTemplate {
        id,
        name,
        description,
        category,
        kind: TemplateKind::Custom,
        permissions,
    })
}
