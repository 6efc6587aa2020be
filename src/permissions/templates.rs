use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use crate::audit::{AuditEntry, AuditSink};
use crate::errors::{AppError, AppResult};
use crate::models::{
    NewGrant, NewPermissionTemplate, OwnerType, PermissionTemplate, TemplateApplicationResult,
    TemplateKind, TemplatePermission, WILDCARD,
};
use crate::store::{PermissionStore, TemplateGrantBatch};

/// Built-in bundles, resolved without touching the store.
pub fn predefined_templates() -> &'static [PermissionTemplate] {
    static TEMPLATES: OnceLock<Vec<PermissionTemplate>> = OnceLock::new();
    TEMPLATES.get_or_init(|| {
        let predefined = |id: &str, name: &str, description: &str, category: &str, permissions| {
            PermissionTemplate {
                id: id.to_string(),
                name: name.to_string(),
                description: Some(description.to_string()),
                category: category.to_string(),
                kind: TemplateKind::Predefined,
                permissions,
            }
        };

        vec![
            predefined(
                "admin",
                "Administrator",
                "Every action on every resource",
                "system",
                vec![TemplatePermission::new(WILDCARD, WILDCARD, true)],
            ),
            predefined(
                "readonly",
                "Read only",
                "Read access to every resource",
                "system",
                vec![TemplatePermission::new(WILDCARD, "read", true)],
            ),
            predefined(
                "instructor",
                "Instructor",
                "Course and exam authoring",
                "education",
                vec![
                    TemplatePermission::new("courses", "read", true),
                    TemplatePermission::new("courses", "create", true),
                    TemplatePermission::new("courses", "update", true),
                    TemplatePermission::new("exams", "read", true),
                    TemplatePermission::new("exams", "create", true),
                    TemplatePermission::new("exams", "grade", true),
                    TemplatePermission::new("students", "read", true),
                ],
            ),
            predefined(
                "learner",
                "Learner",
                "Take courses and sit exams",
                "education",
                vec![
                    TemplatePermission::new("courses", "read", true),
                    TemplatePermission::new("exams", "read", true),
                    TemplatePermission::new("exams", "submit", true),
                    TemplatePermission::new("exams", "grade", false),
                ],
            ),
        ]
    })
}

pub fn find_predefined(template_id: &str) -> Option<&'static PermissionTemplate> {
    predefined_templates().iter().find(|t| t.id == template_id)
}

#[derive(Clone)]
pub struct PermissionTemplateService {
    store: Arc<dyn PermissionStore>,
    audit: Arc<dyn AuditSink>,
}

impl PermissionTemplateService {
    pub fn new(store: Arc<dyn PermissionStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Predefined templates first, then custom ones from the store.
    pub async fn get_permission_templates(
        &self,
        category: Option<&str>,
    ) -> AppResult<Vec<PermissionTemplate>> {
        let mut templates: Vec<PermissionTemplate> = predefined_templates()
            .iter()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .cloned()
            .collect();

        templates.extend(self.store.list_custom_templates(category).await?);
        Ok(templates)
    }

    pub async fn get_template(&self, template_id: &str) -> AppResult<PermissionTemplate> {
        if let Some(template) = find_predefined(template_id) {
            return Ok(template.clone());
        }

        self.store
            .find_custom_template(template_id)
            .await?
            .ok_or_else(|| AppError::template_not_found(template_id))
    }

    pub async fn create_custom_template(
        &self,
        template: NewPermissionTemplate,
        actor_id: Uuid,
    ) -> AppResult<PermissionTemplate> {
        template.validate()?;
        if predefined_templates().iter().any(|t| t.name == template.name) {
            return Err(AppError::bad_request(format!(
                "'{}' is reserved by a predefined template",
                template.name
            )));
        }

        let created = self.store.insert_custom_template(&template, Some(actor_id)).await?;
        tracing::info!(
            template_id = %created.id,
            category = %created.category,
            permissions = created.permissions.len(),
            "custom permission template created"
        );

        if let Err(err) = self
            .audit
            .record(AuditEntry::for_change("created", Some(actor_id), &created, None))
            .await
        {
            tracing::warn!(error = %err, "failed to record audit entry");
        }
        Ok(created)
    }

    /// Writes one department-direct grant per template entry. With
    /// `override_existing` the department's current direct grants are
    /// deactivated first. Deactivation, inserts and the audit record commit
    /// together or not at all.
    pub async fn apply_template_to_department(
        &self,
        template_id: &str,
        department_id: Uuid,
        override_existing: bool,
        actor_id: Uuid,
    ) -> AppResult<TemplateApplicationResult> {
        let template = self.get_template(template_id).await?;

        let grants = template
            .permissions
            .iter()
            .map(|p| {
                NewGrant::new(
                    OwnerType::Department,
                    department_id,
                    p.resource.as_str(),
                    p.action.as_str(),
                    p.granted,
                )
            })
            .collect();

        let batch = TemplateGrantBatch {
            department_id,
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            grants,
            override_existing,
            actor_id,
        };

        let outcome = self.store.apply_template_batch(batch).await.map_err(|err| match err {
            AppError::Database(db) => {
                tracing::error!(
                    template_id = %template.id,
                    department_id = %department_id,
                    error = %db,
                    "template application rolled back"
                );
                AppError::template_application(db.to_string())
            }
            other => other,
        })?;

        tracing::info!(
            template_id = %template.id,
            department_id = %department_id,
            applied = outcome.record.applied_count,
            deactivated = outcome.record.deactivated_count,
            override_existing,
            "permission template applied"
        );

        Ok(TemplateApplicationResult {
            success: true,
            message: format!(
                "applied template '{}' to department {}",
                template.name, department_id
            ),
            applied_permissions: outcome.grants.len(),
        })
    }
}
