use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use campus_permissions::audit::{self, AuditSink, SqliteAuditLog};
use campus_permissions::config::EngineConfig;
use campus_permissions::permissions::{PermissionService, PermissionTemplateService};
use campus_permissions::store::{PermissionStore, SqlitePermissionStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "campus permission engine admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the permission schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Decide whether a user may perform an action within a department
    Check {
        user_id: Uuid,
        department_id: Uuid,
        resource: String,
        action: String,
    },
    /// Print the ancestors of a department, nearest first
    ParentPath { department_id: Uuid },
    /// List predefined and custom permission templates
    Templates {
        #[arg(long)]
        category: Option<String>,
    },
    /// Apply a permission template to a department
    ApplyTemplate {
        template_id: String,
        department_id: Uuid,
        #[arg(long)]
        actor: Uuid,
        /// Deactivate the department's current direct grants first
        #[arg(long)]
        override_existing: bool,
    },
    /// Recompute the audit hash chain and report tampering
    VerifyAudit,
}

#[derive(Subcommand, Debug)]
enum MigrateAction {
    /// Scaffold an empty reversible migration pair
    New { name: String },
    /// Apply pending migrations
    Run,
    /// List migrations with their applied/pending state
    Status,
    /// Undo the most recent migrations
    Rollback {
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
}

struct Services {
    permissions: PermissionService,
    templates: PermissionTemplateService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate { action } => migrate(action).await?,
        Commands::Check {
            user_id,
            department_id,
            resource,
            action,
        } => {
            let services = services(get_pool().await?)?;
            let allowed = services
                .permissions
                .check_user_permission(user_id, department_id, &resource, &action)
                .await?;
            println!("{}:{} {}", resource, action, if allowed { "allow" } else { "deny" });
        }
        Commands::ParentPath { department_id } => {
            let services = services(get_pool().await?)?;
            let path = services
                .permissions
                .get_department_parent_path(department_id)
                .await?;
            if path.is_empty() {
                println!("{} has no ancestors", department_id);
            }
            for (depth, ancestor) in path.iter().enumerate() {
                println!("{:>3} {}", depth + 1, ancestor);
            }
        }
        Commands::Templates { category } => {
            let services = services(get_pool().await?)?;
            let templates = services
                .templates
                .get_permission_templates(category.as_deref())
                .await?;
            println!("{:<38} {:<12} {:<11} {}", "Id", "Category", "Kind", "Name");
            for template in templates {
                println!(
                    "{:<38} {:<12} {:<11} {}",
                    template.id,
                    template.category,
                    format!("{:?}", template.kind).to_lowercase(),
                    template.name
                );
            }
        }
        Commands::ApplyTemplate {
            template_id,
            department_id,
            actor,
            override_existing,
        } => {
            let services = services(get_pool().await?)?;
            let result = services
                .templates
                .apply_template_to_department(&template_id, department_id, override_existing, actor)
                .await?;
            println!("{} ({} grants)", result.message, result.applied_permissions);
        }
        Commands::VerifyAudit => {
            let pool = get_pool().await?;
            if audit::verify_chain(&pool).await? {
                println!("audit chain intact");
            } else {
                anyhow::bail!("audit chain verification failed");
            }
        }
    }

    Ok(())
}

fn services(pool: SqlitePool) -> anyhow::Result<Services> {
    let engine = EngineConfig::from_env()?;
    let store: Arc<dyn PermissionStore> = Arc::new(SqlitePermissionStore::new(pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(SqliteAuditLog::new(pool));

    Ok(Services {
        permissions: PermissionService::new(Arc::clone(&store), Arc::clone(&audit), &engine),
        templates: PermissionTemplateService::new(store, audit),
    })
}

async fn migrate(action: MigrateAction) -> anyhow::Result<()> {
    match action {
        MigrateAction::New { name } => {
            for path in scaffold_migration(&name)? {
                println!("created {}", path.display());
            }
        }
        MigrateAction::Run => {
            let pool = get_pool().await?;
            load_migrator().await?.run(&pool).await?;
            println!("schema up to date");
        }
        MigrateAction::Status => {
            let pool = get_pool().await?;
            let migrator = load_migrator().await?;
            let applied = applied_versions(&pool).await?;
            println!("{:<8} {:<16} {}", "State", "Version", "Description");
            for migration in migrator.iter().filter(|m| m.migration_type.is_up_migration()) {
                let state = if applied.contains(&migration.version) { "applied" } else { "pending" };
                println!("{:<8} {:<16} {}", state, migration.version, migration.description.trim());
            }
        }
        MigrateAction::Rollback { steps } => {
            let pool = get_pool().await?;
            let migrator = load_migrator().await?;
            let mut versions: Vec<i64> = applied_versions(&pool).await?.into_iter().collect();
            versions.sort_unstable();
            // undo takes the target version; everything above it is reverted
            let target = versions
                .len()
                .checked_sub(steps + 1)
                .map(|idx| versions[idx])
                .unwrap_or(0);
            migrator
                .undo(&pool, target)
                .await
                .with_context(|| format!("rollback to version {} failed", target))?;
            println!("rolled back to version {}", target);
        }
    }
    Ok(())
}

fn scaffold_migration(name: &str) -> anyhow::Result<[PathBuf; 2]> {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.is_empty() {
        anyhow::bail!("migration name must not be empty");
    }

    let stem = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), slug);
    let dir = migrations_dir();
    let paths = [
        dir.join(format!("{}.up.sql", stem)),
        dir.join(format!("{}.down.sql", stem)),
    ];
    if let Some(existing) = paths.iter().find(|p| p.exists()) {
        anyhow::bail!("{} already exists", existing.display());
    }

    for (path, body) in paths.iter().zip(["-- forward change\n", "-- revert the forward change\n"]) {
        fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(paths)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<HashSet<i64>> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(HashSet::new());
    }

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
        .fetch_all(pool)
        .await?;
    Ok(versions.into_iter().collect())
}

fn migrations_dir() -> PathBuf {
    let local = Path::new("migrations");
    if local.is_dir() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }
}

async fn load_migrator() -> anyhow::Result<Migrator> {
    let dir = migrations_dir();
    Migrator::new(dir.clone())
        .await
        .with_context(|| format!("loading migrations from {}", dir.display()))
}
