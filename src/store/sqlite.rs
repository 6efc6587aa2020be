use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{GrantQuery, PermissionStore, TemplateBatchOutcome, TemplateGrantBatch};
use crate::audit::{self, AuditEntry};
use crate::db::row_parsers::{
    custom_template_from_row, department_from_row, grant_from_row, inheritance_rule_from_row,
    parse_opt_datetime,
};
use crate::errors::{AppError, AppResult};
use crate::models::{
    compute_priority, Department, Grant, InheritanceRule, NewGrant, NewPermissionTemplate,
    OwnerType, PermissionTemplate, TemplateApplicationRecord, TemplateKind, UpsertInheritanceRule,
    WILDCARD,
};

const GRANT_COLUMNS: &str = "id, owner_type, owner_id, resource, action, granted, conditions, \
    inherit_from_parent, override_children, is_active, expires_at, created_by, created_at";

#[derive(Debug, Clone)]
pub struct SqlitePermissionStore {
    pool: SqlitePool,
}

impl SqlitePermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_department(&self, name: &str, parent_id: Option<Uuid>) -> AppResult<Department> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO departments (id, name, parent_id, is_active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(parent_id.map(|p| p.to_string()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Department {
            id,
            name: name.to_string(),
            parent_id,
            is_active: true,
        })
    }

    pub async fn create_role(&self, name: &str, description: Option<&str>) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO roles (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(description)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, is_active, expires_at, created_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(user_id, role_id) DO UPDATE SET is_active = 1, expires_at = excluded.expires_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(expires_at.map(|e| e.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE user_roles SET is_active = 0 WHERE user_id = ? AND role_id = ?")
            .bind(user_id.to_string())
            .bind(role_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn push_key_filter(
    qb: &mut QueryBuilder<'_, Sqlite>,
    column: &str,
    value: Option<&str>,
    include_wildcards: bool,
) {
    if let Some(value) = value {
        qb.push(format!(" AND ({} = ", column));
        qb.push_bind(value.to_string());
        if include_wildcards {
            qb.push(format!(" OR {} = ", column));
            qb.push_bind(WILDCARD);
        }
        qb.push(")");
    }
}

async fn insert_grant_on(
    conn: &mut SqliteConnection,
    grant: &NewGrant,
    created_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> AppResult<Grant> {
    let id = Uuid::new_v4();
    let now_s = now.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO permission_grants
            (id, owner_type, owner_id, resource, action, granted, conditions, inherit_from_parent,
             override_children, is_active, expires_at, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(grant.owner_type.as_str())
    .bind(grant.owner_id.to_string())
    .bind(&grant.resource)
    .bind(&grant.action)
    .bind(grant.granted)
    .bind(grant.conditions.to_string())
    .bind(grant.inherit_from_parent)
    .bind(grant.override_children)
    .bind(grant.expires_at.map(|e| e.to_rfc3339()))
    .bind(created_by.map(|c| c.to_string()))
    .bind(&now_s)
    .bind(&now_s)
    .execute(&mut *conn)
    .await?;

    let source = grant.owner_type.source();
    Ok(Grant {
        id,
        owner_type: grant.owner_type,
        owner_id: grant.owner_id,
        resource: grant.resource.clone(),
        action: grant.action.clone(),
        granted: grant.granted,
        conditions: grant.conditions.clone(),
        source,
        priority: compute_priority(source, 0),
        expires_at: grant.expires_at,
        inherit_from_parent: grant.inherit_from_parent,
        override_children: grant.override_children,
        is_active: true,
        inherited_from: None,
        created_by,
        created_at: now,
    })
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn list_departments(&self) -> AppResult<Vec<Department>> {
        let rows = sqlx::query("SELECT id, name, parent_id, is_active FROM departments")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(department_from_row).collect()
    }

    async fn find_grants(
        &self,
        owner_type: OwnerType,
        owner_ids: &[Uuid],
        query: &GrantQuery,
    ) -> AppResult<Vec<Grant>> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM permission_grants WHERE is_active = 1 AND owner_type = ",
            GRANT_COLUMNS
        ));
        qb.push_bind(owner_type.as_str());
        qb.push(" AND owner_id IN (");
        {
            let mut ids = qb.separated(", ");
            for id in owner_ids {
                ids.push_bind(id.to_string());
            }
        }
        qb.push(")");
        push_key_filter(&mut qb, "resource", query.resource.as_deref(), query.include_wildcards);
        push_key_filter(&mut qb, "action", query.action.as_deref(), query.include_wildcards);
        qb.push(" ORDER BY created_at, id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(grant_from_row).collect()
    }

    async fn find_grant(&self, grant_id: Uuid) -> AppResult<Option<Grant>> {
        let row = sqlx::query(&format!("SELECT {} FROM permission_grants WHERE id = ?", GRANT_COLUMNS))
            .bind(grant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    async fn active_role_ids(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT role_id, expires_at FROM user_roles WHERE user_id = ? AND is_active = 1 ORDER BY role_id",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut role_ids = Vec::with_capacity(rows.len());
        for (role_id, expires_at) in rows {
            if let Some(exp) = parse_opt_datetime(expires_at)? {
                if exp <= now {
                    continue;
                }
            }
            let role_id = Uuid::parse_str(&role_id)
                .map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?;
            role_ids.push(role_id);
        }

        Ok(role_ids)
    }

    async fn list_inheritance_rules(
        &self,
        parent_department_id: Uuid,
        child_department_id: Uuid,
    ) -> AppResult<Vec<InheritanceRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_department_id, child_department_id, resource, action, inherit_type,
                   override_allowed, created_at, updated_at
            FROM department_inheritance_rules
            WHERE parent_department_id = ? AND child_department_id = ?
            "#,
        )
        .bind(parent_department_id.to_string())
        .bind(child_department_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(inheritance_rule_from_row).collect()
    }

    async fn upsert_inheritance_rule(&self, rule: &UpsertInheritanceRule) -> AppResult<InheritanceRule> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO department_inheritance_rules
                (id, parent_department_id, child_department_id, resource, action, inherit_type,
                 override_allowed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(parent_department_id, child_department_id, resource, action) DO UPDATE SET
                inherit_type = excluded.inherit_type,
                override_allowed = excluded.override_allowed,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(rule.parent_department_id.to_string())
        .bind(rule.child_department_id.to_string())
        .bind(&rule.resource)
        .bind(&rule.action)
        .bind(rule.inherit_type.as_str())
        .bind(rule.override_allowed)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, parent_department_id, child_department_id, resource, action, inherit_type,
                   override_allowed, created_at, updated_at
            FROM department_inheritance_rules
            WHERE parent_department_id = ? AND child_department_id = ? AND resource = ? AND action = ?
            "#,
        )
        .bind(rule.parent_department_id.to_string())
        .bind(rule.child_department_id.to_string())
        .bind(&rule.resource)
        .bind(&rule.action)
        .fetch_one(&self.pool)
        .await?;

        inheritance_rule_from_row(&row)
    }

    async fn insert_grant(&self, grant: &NewGrant, created_by: Option<Uuid>) -> AppResult<Grant> {
        let mut conn = self.pool.acquire().await?;
        insert_grant_on(&mut *conn, grant, created_by, Utc::now()).await
    }

    async fn deactivate_grant(&self, grant_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE permission_grants SET is_active = 0, updated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(grant_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_custom_templates(&self, category: Option<&str>) -> AppResult<Vec<PermissionTemplate>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, description, category, permissions FROM permission_templates WHERE is_active = 1",
        );
        if let Some(category) = category {
            qb.push(" AND category = ");
            qb.push_bind(category.to_string());
        }
        qb.push(" ORDER BY name, id");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(custom_template_from_row).collect()
    }

    async fn find_custom_template(&self, template_id: &str) -> AppResult<Option<PermissionTemplate>> {
        let row = sqlx::query(
            "SELECT id, name, description, category, permissions FROM permission_templates WHERE id = ? AND is_active = 1",
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(custom_template_from_row).transpose()
    }

    async fn insert_custom_template(
        &self,
        template: &NewPermissionTemplate,
        created_by: Option<Uuid>,
    ) -> AppResult<PermissionTemplate> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let permissions = serde_json::to_string(&template.permissions)
            .map_err(|e| AppError::internal(format!("failed to serialize template permissions: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO permission_templates
                (id, name, description, category, permissions, is_active, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.category)
        .bind(&permissions)
        .bind(created_by.map(|c| c.to_string()))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(PermissionTemplate {
            id,
            name: template.name.clone(),
            description: template.description.clone(),
            category: template.category.clone(),
            kind: TemplateKind::Custom,
            permissions: template.permissions.clone(),
        })
    }

    async fn apply_template_batch(&self, batch: TemplateGrantBatch) -> AppResult<TemplateBatchOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let deactivated_count = if batch.override_existing {
            let result = sqlx::query(
                r#"
                UPDATE permission_grants SET is_active = 0, updated_at = ?
                WHERE owner_type = 'department' AND owner_id = ? AND is_active = 1
                "#,
            )
            .bind(now.to_rfc3339())
            .bind(batch.department_id.to_string())
            .execute(&mut *tx)
            .await?;
            result.rows_affected() as usize
        } else {
            0
        };

        let mut grants = Vec::with_capacity(batch.grants.len());
        for grant in &batch.grants {
            grants.push(insert_grant_on(&mut *tx, grant, Some(batch.actor_id), now).await?);
        }

        let record = TemplateApplicationRecord {
            target_department_id: batch.department_id,
            template_id: batch.template_id,
            template_name: batch.template_name,
            actor_id: batch.actor_id,
            override_existing: batch.override_existing,
            applied_count: grants.len(),
            deactivated_count,
            applied_at: now,
        };
        audit::append_entry(&mut *tx, &AuditEntry::template_applied(&record)).await?;

        // Dropping the transaction before this point rolls everything back.
        tx.commit().await?;

        Ok(TemplateBatchOutcome { record, grants })
    }
}
