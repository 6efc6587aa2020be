use uuid::Uuid;

/// Authenticated caller, as carried by the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    /// Home department, used when a request names none
    pub department_id: Option<Uuid>,
}

impl Principal {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            department_id: None,
        }
    }

    pub fn with_department(mut self, department_id: Uuid) -> Self {
        self.department_id = Some(department_id);
        self
    }
}

/// Where a guarded operation takes place.
#[derive(Debug, Clone, Default)]
pub struct ResourceContext {
    pub department_id: Option<Uuid>,
}

impl ResourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_department(mut self, department_id: Uuid) -> Self {
        self.department_id = Some(department_id);
        self
    }

    /// Explicit department first, then the principal's home department.
    pub fn department_for(&self, principal: &Principal) -> Option<Uuid> {
        self.department_id.or(principal.department_id)
    }
}
