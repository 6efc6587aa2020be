mod common;

use anyhow::Result;
use uuid::Uuid;

use campus_permissions::audit;
use campus_permissions::models::{NewGrant, OwnerType};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_grant_writes_are_all_audited() -> Result<()> {
    let env = common::setup().await?;
    let actor = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = env.permissions.clone();
        handles.push(tokio::spawn(async move {
            let grant = NewGrant::new(OwnerType::User, Uuid::new_v4(), format!("reports-{}", i), "read", true);
            service.create_grant(grant, actor).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(env.audit_rows("created").await?, 20);
    assert!(audit::verify_chain(&env.pool).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn grant_writes_and_template_applications_share_one_chain() -> Result<()> {
    let env = common::setup().await?;
    let actor = Uuid::new_v4();
    let mut departments = Vec::new();
    for i in 0..5 {
        departments.push(env.department(&format!("Department {}", i), None).await?);
    }

    let mut grant_writes = Vec::new();
    for i in 0..10 {
        let service = env.permissions.clone();
        grant_writes.push(tokio::spawn(async move {
            let grant = NewGrant::new(OwnerType::Role, Uuid::new_v4(), "exams", format!("task-{}", i), true);
            service.create_grant(grant, actor).await.map(|_| ())
        }));
    }
    let mut applications = Vec::new();
    for dept in &departments {
        let templates = env.templates.clone();
        let department_id = dept.id;
        applications.push(tokio::spawn(async move {
            templates
                .apply_template_to_department("readonly", department_id, true, actor)
                .await
                .map(|_| ())
        }));
    }

    for handle in grant_writes.into_iter().chain(applications) {
        handle.await??;
    }

    assert_eq!(env.audit_rows("created").await?, 10);
    assert_eq!(env.audit_rows("template_applied").await?, 5);
    assert!(audit::verify_chain(&env.pool).await?);
    Ok(())
}
