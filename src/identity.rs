//! Maps external identities onto internal row ids, provisioning rows on first
//! reference.
//!
//! Both resolvers are a conditional insert (`ON CONFLICT DO NOTHING` on the
//! unique pair) followed by a read of whichever row won. Concurrent callers
//! racing on the same pair therefore all observe the same id.
use crate::catalog::ResourceTypeCatalog;
use crate::entities;
use crate::errors::PermsError;
use crate::models::{validate_external_subject_id, validate_name, Resource, Subject};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr};
use uuid::Uuid;

/// Resolve a subject, creating it if absent. Returns the internal subject id.
pub async fn resolve_or_create_subject<C: ConnectionTrait>(
    db: &C,
    external_subject_id: &str,
    subject_type: &str,
) -> Result<String, PermsError> {
    Ok(provision_subject(db, external_subject_id, subject_type)
        .await?
        .id)
}

/// Resolve a resource of an already-resolved type, creating it if absent.
/// Returns the internal resource id.
pub async fn resolve_or_create_resource<C: ConnectionTrait>(
    db: &C,
    name: &str,
    resource_type_id: &str,
) -> Result<String, PermsError> {
    use entities::resource::{ActiveModel, Column, Entity};

    validate_name("resource name", name)?;

    let row = ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        name: Set(name.to_string()),
        resource_type_id: Set(resource_type_id.to_string()),
    };
    let inserted = Entity::insert(row)
        .on_conflict(
            OnConflict::columns([Column::Name, Column::ResourceTypeId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
        .map_err(|e| match e.sql_err() {
            // The only reference a resource row carries is its type.
            Some(SqlErr::ForeignKeyConstraintViolation(_)) => PermsError::InvalidInput(format!(
                "resource type id `{}` is not registered",
                resource_type_id
            )),
            _ => PermsError::from(e),
        })?;

    let model = Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::ResourceTypeId.eq(resource_type_id))
        .one(db)
        .await?
        .ok_or_else(|| {
            PermsError::ConstraintViolation(format!(
                "resource `{}` vanished after provisioning",
                name
            ))
        })?;

    if inserted > 0 {
        tracing::info!(resource = name, id = %model.id, "provisioned resource");
    }
    Ok(model.id)
}

async fn provision_subject<C: ConnectionTrait>(
    db: &C,
    external_subject_id: &str,
    subject_type: &str,
) -> Result<entities::subject::Model, PermsError> {
    use entities::subject::{ActiveModel, Column, Entity};

    validate_external_subject_id(external_subject_id)?;
    validate_name("subject type", subject_type)?;

    let row = ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        external_subject_id: Set(external_subject_id.to_string()),
        subject_type: Set(subject_type.to_string()),
    };
    let inserted = Entity::insert(row)
        .on_conflict(
            OnConflict::columns([Column::ExternalSubjectId, Column::SubjectType])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    let model = Entity::find()
        .filter(Column::ExternalSubjectId.eq(external_subject_id))
        .filter(Column::SubjectType.eq(subject_type))
        .one(db)
        .await?
        .ok_or_else(|| {
            PermsError::ConstraintViolation(format!(
                "subject `{}/{}` vanished after provisioning",
                subject_type, external_subject_id
            ))
        })?;

    if inserted > 0 {
        tracing::info!(subject_type, subject = external_subject_id, id = %model.id, "provisioned subject");
    }
    Ok(model)
}

/// Resolves identities against the set of subject types this deployment accepts.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    subject_types: Vec<String>,
    catalog: ResourceTypeCatalog,
}

impl IdentityResolver {
    pub fn new(subject_types: Vec<String>, catalog: ResourceTypeCatalog) -> Self {
        Self {
            subject_types,
            catalog,
        }
    }

    pub fn check_subject_type(&self, subject_type: &str) -> Result<(), PermsError> {
        if self.subject_types.iter().any(|t| t == subject_type) {
            Ok(())
        } else {
            Err(PermsError::InvalidInput(format!(
                "subject type `{}` is not registered",
                subject_type
            )))
        }
    }

    /// Resolve a resource type name, reporting unknown names as bad input.
    pub async fn resource_type_id<C: ConnectionTrait>(
        &self,
        db: &C,
        resource_type: &str,
    ) -> Result<String, PermsError> {
        self.catalog
            .resolve(db, resource_type)
            .await
            .map_err(|e| match e {
                PermsError::NotFound(_) => PermsError::InvalidInput(format!(
                    "resource type `{}` is not registered",
                    resource_type
                )),
                other => other,
            })
    }

    pub async fn resolve_or_create_subject<C: ConnectionTrait>(
        &self,
        db: &C,
        external_subject_id: &str,
        subject_type: &str,
    ) -> Result<String, PermsError> {
        self.check_subject_type(subject_type)?;
        resolve_or_create_subject(db, external_subject_id, subject_type).await
    }

    pub async fn resolve_or_create_resource<C: ConnectionTrait>(
        &self,
        db: &C,
        name: &str,
        resource_type_id: &str,
    ) -> Result<String, PermsError> {
        resolve_or_create_resource(db, name, resource_type_id).await
    }

    /// Explicitly register a subject. Idempotent.
    pub async fn register_subject<C: ConnectionTrait>(
        &self,
        db: &C,
        external_subject_id: &str,
        subject_type: &str,
    ) -> Result<Subject, PermsError> {
        self.check_subject_type(subject_type)?;
        Ok(provision_subject(db, external_subject_id, subject_type)
            .await?
            .into())
    }

    /// Explicitly register a resource of a named type. Idempotent.
    pub async fn register_resource<C: ConnectionTrait>(
        &self,
        db: &C,
        name: &str,
        resource_type: &str,
    ) -> Result<Resource, PermsError> {
        let resource_type_id = self.resource_type_id(db, resource_type).await?;
        let id = resolve_or_create_resource(db, name, &resource_type_id).await?;
        Ok(Resource {
            id,
            name: name.to_string(),
            resource_type: resource_type.to_string(),
        })
    }

    /// Look up a subject without provisioning it.
    pub async fn find_subject<C: ConnectionTrait>(
        &self,
        db: &C,
        external_subject_id: &str,
        subject_type: &str,
    ) -> Result<Option<Subject>, PermsError> {
        use entities::subject::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::ExternalSubjectId.eq(external_subject_id))
            .filter(Column::SubjectType.eq(subject_type))
            .one(db)
            .await?
            .map(Subject::from))
    }

    /// Look up a resource without provisioning it. Unknown type names yield `None`.
    pub async fn find_resource<C: ConnectionTrait>(
        &self,
        db: &C,
        name: &str,
        resource_type: &str,
    ) -> Result<Option<Resource>, PermsError> {
        use entities::resource::{Column, Entity};

        let resource_type_id = match self.catalog.resolve(db, resource_type).await {
            Ok(id) => id,
            Err(PermsError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Entity::find()
            .filter(Column::Name.eq(name))
            .filter(Column::ResourceTypeId.eq(resource_type_id))
            .one(db)
            .await?
            .map(|model| Resource {
                id: model.id,
                name: model.name,
                resource_type: resource_type.to_string(),
            }))
    }

    pub async fn list_subjects<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<Vec<Subject>, PermsError> {
        use entities::subject::{Column, Entity};

        Ok(Entity::find()
            .order_by_asc(Column::SubjectType)
            .order_by_asc(Column::ExternalSubjectId)
            .all(db)
            .await?
            .into_iter()
            .map(Subject::from)
            .collect())
    }

    pub async fn list_resources<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<Vec<Resource>, PermsError> {
        use entities::resource::{Column, Entity};

        let rows = Entity::find()
            .find_also_related(entities::resource_type::Entity)
            .order_by_asc(Column::Name)
            .all(db)
            .await?;

        rows.into_iter()
            .map(|(resource, resource_type)| {
                let resource_type = resource_type.ok_or_else(|| {
                    PermsError::ConstraintViolation(format!(
                        "resource {} references a missing type",
                        resource.id
                    ))
                })?;
                Ok(Resource {
                    id: resource.id,
                    name: resource.name,
                    resource_type: resource_type.name,
                })
            })
            .collect()
    }
}
