use permissions::grant::GrantService;
use permissions::models::{PermissionLevel, PermissionView};

/// Builder for granting test permissions
pub struct GrantBuilder {
    subject_id: String,
    subject_type: String,
    resource_name: String,
    resource_type: String,
    level: PermissionLevel,
}

impl GrantBuilder {
    pub fn new(subject_id: &str, resource_name: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            subject_type: "user".to_string(),
            resource_name: resource_name.to_string(),
            resource_type: "app".to_string(),
            level: PermissionLevel::Read,
        }
    }

    pub fn subject_type(mut self, subject_type: &str) -> Self {
        self.subject_type = subject_type.to_string();
        self
    }

    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = resource_type.to_string();
        self
    }

    pub fn level(mut self, level: PermissionLevel) -> Self {
        self.level = level;
        self
    }

    pub async fn grant(self, grants: &GrantService) -> PermissionView {
        grants
            .grant(
                &self.subject_id,
                &self.subject_type,
                &self.resource_name,
                &self.resource_type,
                self.level,
            )
            .await
            .expect("Failed to grant test permission")
    }
}
