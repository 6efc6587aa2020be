mod common;

use anyhow::Result;
use uuid::Uuid;

use campus_permissions::config::EngineConfig;
use campus_permissions::models::{
    InheritType, NewGrant, OwnerType, PermissionSource, UpsertInheritanceRule,
};

fn rule(parent: Uuid, child: Uuid, resource: &str, action: &str, inherit_type: InheritType) -> UpsertInheritanceRule {
    UpsertInheritanceRule {
        parent_department_id: parent,
        child_department_id: child,
        resource: resource.to_string(),
        action: action.to_string(),
        inherit_type,
        override_allowed: false,
    }
}

#[tokio::test]
async fn parent_grant_is_inherited_without_rule() -> Result<()> {
    let env = common::setup().await?;
    let a = env.department("Faculty", None).await?;
    let b = env.department("Mathematics", Some(a.id)).await?;
    env.allow(OwnerType::Department, a.id, "reports", "read").await?;

    let grants = env
        .permissions
        .get_department_effective_permissions(b.id, Some("reports"), Some("read"))
        .await?;

    assert_eq!(grants.len(), 1);
    assert!(grants[0].granted);
    assert_eq!(grants[0].source, PermissionSource::DepartmentInherited);
    assert_eq!(grants[0].priority, 4);
    assert_eq!(grants[0].inherited_from, Some(a.id));
    Ok(())
}

#[tokio::test]
async fn none_rule_blocks_inheritance() -> Result<()> {
    let env = common::setup().await?;
    let a = env.department("Faculty", None).await?;
    let b = env.department("Mathematics", Some(a.id)).await?;
    env.allow(OwnerType::Department, a.id, "reports", "read").await?;
    env.permissions
        .upsert_inheritance_rule(rule(a.id, b.id, "reports", "read", InheritType::None), Uuid::new_v4())
        .await?;

    let grants = env
        .permissions
        .get_department_effective_permissions(b.id, Some("reports"), Some("read"))
        .await?;

    assert!(grants.is_empty(), "blocked grant leaked: {:?}", grants);
    Ok(())
}

#[tokio::test]
async fn rule_overrides_inherit_flag_both_ways() -> Result<()> {
    let env = common::setup().await?;
    let a = env.department("Faculty", None).await?;
    let b = env.department("Mathematics", Some(a.id)).await?;
    env.grant(
        NewGrant::new(OwnerType::Department, a.id, "grades", "export", true).with_inherit_from_parent(false),
    )
    .await?;
    env.grant(
        NewGrant::new(OwnerType::Department, a.id, "grades", "import", true).with_inherit_from_parent(false),
    )
    .await?;
    env.permissions
        .upsert_inheritance_rule(rule(a.id, b.id, "grades", "import", InheritType::Partial), Uuid::new_v4())
        .await?;

    let grants = env
        .permissions
        .get_department_effective_permissions(b.id, Some("grades"), None)
        .await?;
    let actions: Vec<&str> = grants.iter().map(|g| g.action.as_str()).collect();

    assert_eq!(actions, vec!["import"]);
    Ok(())
}

#[tokio::test]
async fn rule_upsert_replaces_previous_decision() -> Result<()> {
    let env = common::setup().await?;
    let a = env.department("Faculty", None).await?;
    let b = env.department("Mathematics", Some(a.id)).await?;
    env.allow(OwnerType::Department, a.id, "reports", "read").await?;
    let actor = Uuid::new_v4();

    let first = env
        .permissions
        .upsert_inheritance_rule(rule(a.id, b.id, "reports", "read", InheritType::None), actor)
        .await?;
    let second = env
        .permissions
        .upsert_inheritance_rule(rule(a.id, b.id, "reports", "read", InheritType::Full), actor)
        .await?;

    assert_eq!(first.id, second.id);
    assert_eq!(second.inherit_type, InheritType::Full);
    assert_eq!(env.audit_rows("created").await?, 1);
    assert_eq!(env.audit_rows("updated").await?, 1);

    let grants = env
        .permissions
        .get_department_effective_permissions(b.id, Some("reports"), Some("read"))
        .await?;
    assert_eq!(grants.len(), 1);
    Ok(())
}

#[tokio::test]
async fn nearer_ancestor_outranks_farther_one() -> Result<()> {
    let env = common::setup().await?;
    let root = env.department("University", None).await?;
    let faculty = env.department("Faculty", Some(root.id)).await?;
    let dept = env.department("Mathematics", Some(faculty.id)).await?;
    let user = Uuid::new_v4();

    env.allow(OwnerType::Department, root.id, "labs", "book").await?;
    env.deny(OwnerType::Department, faculty.id, "labs", "book").await?;

    let grants = env
        .permissions
        .get_department_effective_permissions(dept.id, Some("labs"), Some("book"))
        .await?;
    let mut priorities: Vec<i32> = grants.iter().map(|g| g.priority).collect();
    priorities.sort();
    assert_eq!(priorities, vec![4, 5]);

    assert!(
        !env.permissions
            .check_user_permission(user, dept.id, "labs", "book")
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn department_own_deny_beats_inherited_allow() -> Result<()> {
    let env = common::setup().await?;
    let a = env.department("Faculty", None).await?;
    let b = env.department("Mathematics", Some(a.id)).await?;
    let user = Uuid::new_v4();
    env.allow(OwnerType::Department, a.id, "reports", "read").await?;
    env.deny(OwnerType::Department, b.id, "reports", "read").await?;

    let resolution = env
        .permissions
        .resolve_user_permissions(user, b.id, Some("reports"), Some("read"))
        .await?;

    assert_eq!(resolution.permissions.len(), 1);
    assert!(!resolution.permissions[0].granted);
    assert_eq!(resolution.permissions[0].source, PermissionSource::DepartmentDirect);
    assert_eq!(resolution.conflicts.len(), 1);
    assert_eq!(resolution.conflicts[0].members.len(), 2);
    Ok(())
}

#[tokio::test]
async fn parent_path_is_nearest_first() -> Result<()> {
    let env = common::setup().await?;
    let root = env.department("University", None).await?;
    let faculty = env.department("Faculty", Some(root.id)).await?;
    let dept = env.department("Mathematics", Some(faculty.id)).await?;

    let path = env.permissions.get_department_parent_path(dept.id).await?;
    assert_eq!(path, vec![faculty.id, root.id]);

    let missing = env.permissions.get_department_parent_path(Uuid::new_v4()).await?;
    assert!(missing.is_empty());
    Ok(())
}

#[tokio::test]
async fn cyclic_hierarchy_terminates() -> Result<()> {
    let env = common::setup().await?;
    let a = env.department("A", None).await?;
    let b = env.department("B", Some(a.id)).await?;
    let c = env.department("C", Some(b.id)).await?;
    env.set_parent(a.id, c.id).await?;
    env.allow(OwnerType::Department, a.id, "reports", "read").await?;

    let path = env.permissions.get_department_parent_path(c.id).await?;
    assert_eq!(path, vec![b.id, a.id]);

    let allowed = env
        .permissions
        .check_user_permission(Uuid::new_v4(), c.id, "reports", "read")
        .await?;
    assert!(allowed);
    Ok(())
}

#[tokio::test]
async fn depth_limit_truncates_the_walk() -> Result<()> {
    let env = common::setup_with(EngineConfig::default().with_max_hierarchy_depth(1)).await?;
    let root = env.department("University", None).await?;
    let faculty = env.department("Faculty", Some(root.id)).await?;
    let dept = env.department("Mathematics", Some(faculty.id)).await?;
    env.allow(OwnerType::Department, root.id, "reports", "read").await?;

    assert_eq!(env.permissions.get_department_parent_path(dept.id).await?, vec![faculty.id]);
    assert!(
        !env.permissions
            .check_user_permission(Uuid::new_v4(), dept.id, "reports", "read")
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn unknown_department_resolves_without_error() -> Result<()> {
    let env = common::setup().await?;
    let grants = env
        .permissions
        .get_department_effective_permissions(Uuid::new_v4(), None, None)
        .await?;
    assert!(grants.is_empty());
    Ok(())
}
