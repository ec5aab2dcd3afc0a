//! Grant and revoke by external identity.
//!
//! A grant resolves the resource type, provisions the subject and resource if
//! they are new, then upserts the permission. Provisioning commits on its own:
//! when the upsert fails the new subject/resource rows stay behind, which is a
//! valid state that a retried grant simply reuses.
use crate::errors::PermsError;
use crate::identity::IdentityResolver;
use crate::models::{
    validate_external_subject_id, validate_name, PermissionGrantRequest, PermissionLevel,
    PermissionView,
};
use crate::storage;
use sea_orm::DatabaseConnection;

#[derive(Debug, Clone)]
pub struct GrantService {
    db: DatabaseConnection,
    identities: IdentityResolver,
}

impl GrantService {
    pub fn new(db: DatabaseConnection, identities: IdentityResolver) -> Self {
        Self { db, identities }
    }

    pub async fn grant(
        &self,
        external_subject_id: &str,
        subject_type: &str,
        resource_name: &str,
        resource_type: &str,
        level: PermissionLevel,
    ) -> Result<PermissionView, PermsError> {
        // Reject bad input before anything is written
        validate_external_subject_id(external_subject_id)?;
        self.identities.check_subject_type(subject_type)?;
        validate_name("resource name", resource_name)?;
        let resource_type_id = self
            .identities
            .resource_type_id(&self.db, resource_type)
            .await?;

        let subject_id = self
            .identities
            .resolve_or_create_subject(&self.db, external_subject_id, subject_type)
            .await?;
        let resource_id = self
            .identities
            .resolve_or_create_resource(&self.db, resource_name, &resource_type_id)
            .await?;

        let permission =
            storage::upsert_permission(&self.db, &subject_id, &resource_id, level).await?;

        // Read back through the joins so the reply reflects stored names.
        let view = storage::get_permission_view(&self.db, &subject_id, &resource_id)
            .await?
            .ok_or_else(|| {
                PermsError::NotFound(format!("permission {} was removed", permission.id))
            })?;

        tracing::info!(
            permission = %view.id,
            subject = %format!("{}/{}", subject_type, external_subject_id),
            resource = %format!("{}/{}", view.resource.resource_type, resource_name),
            %level,
            "granted permission"
        );
        Ok(view)
    }

    pub async fn grant_request(
        &self,
        req: &PermissionGrantRequest,
    ) -> Result<PermissionView, PermsError> {
        self.grant(
            &req.subject.subject_id,
            &req.subject.subject_type,
            &req.resource.name,
            &req.resource.resource_type,
            req.permission_level,
        )
        .await
    }

    /// Remove the permission a subject holds on a resource.
    ///
    /// Never provisions: an unknown subject, resource, or pair is `NotFound`.
    pub async fn revoke(
        &self,
        external_subject_id: &str,
        subject_type: &str,
        resource_name: &str,
        resource_type: &str,
    ) -> Result<(), PermsError> {
        let subject = self
            .identities
            .find_subject(&self.db, external_subject_id, subject_type)
            .await?
            .ok_or_else(|| {
                PermsError::NotFound(format!("subject `{}/{}`", subject_type, external_subject_id))
            })?;
        let resource = self
            .identities
            .find_resource(&self.db, resource_name, resource_type)
            .await?
            .ok_or_else(|| {
                PermsError::NotFound(format!("resource `{}/{}`", resource_type, resource_name))
            })?;

        if !storage::delete_permission(&self.db, &subject.id, &resource.id).await? {
            return Err(PermsError::NotFound(format!(
                "permission for `{}/{}` on `{}/{}`",
                subject_type, external_subject_id, resource_type, resource_name
            )));
        }

        tracing::info!(
            subject = %subject.id,
            resource = %resource.id,
            "revoked permission"
        );
        Ok(())
    }
}
