#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use campus_permissions::audit::{AuditSink, SqliteAuditLog};
use campus_permissions::config::EngineConfig;
use campus_permissions::models::{Department, Grant, NewGrant, OwnerType};
use campus_permissions::store::{PermissionStore, SqlitePermissionStore};
use campus_permissions::{PermissionService, PermissionTemplateService};

/// Migrated throwaway database plus the services wired over it.
pub struct TestEnv {
    // keeps the database file alive for the duration of the test
    _dir: TempDir,
    pub pool: SqlitePool,
    pub store: Arc<SqlitePermissionStore>,
    pub permissions: PermissionService,
    pub templates: PermissionTemplateService,
}

pub async fn test_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir()?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

pub async fn setup() -> Result<TestEnv> {
    setup_with(EngineConfig::default()).await
}

pub async fn setup_with(config: EngineConfig) -> Result<TestEnv> {
    let (dir, pool) = test_pool().await?;

    let store = Arc::new(SqlitePermissionStore::new(pool.clone()));
    let dyn_store: Arc<dyn PermissionStore> = store.clone();
    let audit: Arc<dyn AuditSink> = Arc::new(SqliteAuditLog::new(pool.clone()));

    Ok(TestEnv {
        _dir: dir,
        permissions: PermissionService::new(Arc::clone(&dyn_store), Arc::clone(&audit), &config),
        templates: PermissionTemplateService::new(dyn_store, audit),
        store,
        pool,
    })
}

impl TestEnv {
    pub async fn department(&self, name: &str, parent: Option<Uuid>) -> Result<Department> {
        Ok(self.store.create_department(name, parent).await?)
    }

    pub async fn grant(&self, grant: NewGrant) -> Result<Grant> {
        Ok(self.store.insert_grant(&grant, None).await?)
    }

    pub async fn allow(&self, owner_type: OwnerType, owner_id: Uuid, resource: &str, action: &str) -> Result<Grant> {
        self.grant(NewGrant::new(owner_type, owner_id, resource, action, true)).await
    }

    pub async fn deny(&self, owner_type: OwnerType, owner_id: Uuid, resource: &str, action: &str) -> Result<Grant> {
        self.grant(NewGrant::new(owner_type, owner_id, resource, action, false)).await
    }

    pub async fn set_parent(&self, department_id: Uuid, parent_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE departments SET parent_id = ? WHERE id = ?")
            .bind(parent_id.to_string())
            .bind(department_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_active_department_grants(&self, department_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM permission_grants WHERE owner_type = 'department' AND owner_id = ? AND is_active = 1",
        )
        .bind(department_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn audit_rows(&self, change_type: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM permission_audit_log WHERE change_type = ?",
        )
        .bind(change_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
