//! Database bootstrap and the permission store.
//!
//! A permission row is unique per (subject, resource). Writes go through a
//! single `INSERT ... ON CONFLICT DO UPDATE` so concurrent grants for the same
//! pair converge on one row, with the last committed level winning.
use crate::entities::{self, permission, resource, resource_type, subject};
use crate::errors::PermsError;
use crate::models::{Permission, PermissionLevel, PermissionView, Resource, Subject};
use crate::settings::Database as DbCfg;
use migration::MigratorTrait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set,
    TransactionTrait,
};
use std::time::Duration;
use uuid::Uuid;

/// Connect to the configured database and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, PermsError> {
    let mut opts = ConnectOptions::new(cfg.url.clone());
    opts.max_connections(cfg.max_connections)
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::debug!("database schema is up to date");
    Ok(db)
}

/// Create or update the permission for a (subject, resource) pair.
///
/// The id of an existing row is preserved; only its level changes.
pub async fn upsert_permission<C>(
    db: &C,
    subject_id: &str,
    resource_id: &str,
    level: PermissionLevel,
) -> Result<Permission, PermsError>
where
    C: ConnectionTrait + TransactionTrait,
{
    use entities::permission::{ActiveModel, Column, Entity};

    let txn = db.begin().await?;

    let row = ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        subject_id: Set(subject_id.to_string()),
        resource_id: Set(resource_id.to_string()),
        permission_level: Set(level.as_str().to_string()),
    };
    Entity::insert(row)
        .on_conflict(
            OnConflict::columns([Column::SubjectId, Column::ResourceId])
                .update_column(Column::PermissionLevel)
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

    let mut rows = Entity::find()
        .filter(Column::SubjectId.eq(subject_id))
        .filter(Column::ResourceId.eq(resource_id))
        .all(&txn)
        .await?;

    if rows.len() != 1 {
        tracing::error!(
            subject_id,
            resource_id,
            rows = rows.len(),
            "permission upsert did not converge on a single row"
        );
        return Err(PermsError::ConstraintViolation(format!(
            "expected one permission for subject {} on resource {}, found {}",
            subject_id,
            resource_id,
            rows.len()
        )));
    }

    txn.commit().await?;

    let permission = Permission::try_from(rows.remove(0))?;
    tracing::debug!(id = %permission.id, level = %permission.permission_level, "permission stored");
    Ok(permission)
}

/// Delete the permission for a pair. Returns whether a row was removed.
pub async fn delete_permission<C: ConnectionTrait>(
    db: &C,
    subject_id: &str,
    resource_id: &str,
) -> Result<bool, PermsError> {
    use entities::permission::{Column, Entity};

    let result = Entity::delete_many()
        .filter(Column::SubjectId.eq(subject_id))
        .filter(Column::ResourceId.eq(resource_id))
        .exec(db)
        .await?;

    if result.rows_affected > 1 {
        tracing::error!(
            subject_id,
            resource_id,
            rows = result.rows_affected,
            "deleted more than one permission for a single pair"
        );
    }
    Ok(result.rows_affected > 0)
}

/// Every permission, joined for display.
pub async fn list_permissions<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<PermissionView>, PermsError> {
    load_views(db, joined_permissions()).await
}

pub async fn list_permissions_by_subject<C: ConnectionTrait>(
    db: &C,
    subject_id: &str,
) -> Result<Vec<PermissionView>, PermsError> {
    let query = joined_permissions().filter(permission::Column::SubjectId.eq(subject_id));
    load_views(db, query).await
}

pub async fn list_permissions_by_resource<C: ConnectionTrait>(
    db: &C,
    resource_id: &str,
) -> Result<Vec<PermissionView>, PermsError> {
    let query = joined_permissions().filter(permission::Column::ResourceId.eq(resource_id));
    load_views(db, query).await
}

/// The joined view of one pair's permission, if any.
pub async fn get_permission_view<C: ConnectionTrait>(
    db: &C,
    subject_id: &str,
    resource_id: &str,
) -> Result<Option<PermissionView>, PermsError> {
    let query = joined_permissions()
        .filter(permission::Column::SubjectId.eq(subject_id))
        .filter(permission::Column::ResourceId.eq(resource_id));
    Ok(load_views(db, query).await?.into_iter().next())
}

#[derive(Debug, FromQueryResult)]
struct PermissionRow {
    id: String,
    permission_level: String,
    subject_id: String,
    external_subject_id: String,
    subject_type: String,
    resource_id: String,
    resource_name: String,
    resource_type: String,
}

impl TryFrom<PermissionRow> for PermissionView {
    type Error = PermsError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let permission_level = row.permission_level.parse().map_err(|_| {
            PermsError::ConstraintViolation(format!(
                "permission {} carries unknown level `{}`",
                row.id, row.permission_level
            ))
        })?;
        Ok(PermissionView {
            id: row.id,
            subject: Subject {
                id: row.subject_id,
                subject_id: row.external_subject_id,
                subject_type: row.subject_type,
            },
            resource: Resource {
                id: row.resource_id,
                name: row.resource_name,
                resource_type: row.resource_type,
            },
            permission_level,
        })
    }
}

fn joined_permissions() -> Select<permission::Entity> {
    permission::Entity::find()
        .select_only()
        .column_as(permission::Column::Id, "id")
        .column_as(permission::Column::PermissionLevel, "permission_level")
        .column_as(permission::Column::SubjectId, "subject_id")
        .column_as(subject::Column::ExternalSubjectId, "external_subject_id")
        .column_as(subject::Column::SubjectType, "subject_type")
        .column_as(permission::Column::ResourceId, "resource_id")
        .column_as(resource::Column::Name, "resource_name")
        .column_as(resource_type::Column::Name, "resource_type")
        .join(JoinType::InnerJoin, permission::Relation::Subject.def())
        .join(JoinType::InnerJoin, permission::Relation::Resource.def())
        .join(JoinType::InnerJoin, resource::Relation::ResourceType.def())
        .order_by_asc(subject::Column::ExternalSubjectId)
        .order_by_asc(subject::Column::SubjectType)
        .order_by_asc(resource::Column::Name)
        .order_by_asc(resource_type::Column::Name)
}

async fn load_views<C: ConnectionTrait>(
    db: &C,
    query: Select<permission::Entity>,
) -> Result<Vec<PermissionView>, PermsError> {
    query
        .into_model::<PermissionRow>()
        .all(db)
        .await?
        .into_iter()
        .map(PermissionView::try_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{resolve_or_create_resource, resolve_or_create_subject};
    use crate::test_support::TestDb;
    use sea_orm::PaginatorTrait;

    /// Returns (subject_id, resource_id) for `s1`/user on `r1`/app.
    async fn seed_pair(db: &DatabaseConnection, subject: &str, resource: &str) -> (String, String) {
        let catalog = crate::catalog::ResourceTypeCatalog::default();
        let app = catalog.register(db, "app").await.expect("register type");
        let subject_id = resolve_or_create_subject(db, subject, "user")
            .await
            .expect("subject");
        let resource_id = resolve_or_create_resource(db, resource, &app.id)
            .await
            .expect("resource");
        (subject_id, resource_id)
    }

    #[tokio::test]
    async fn test_upsert_creates_permission() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (subject_id, resource_id) = seed_pair(db, "s1", "r1").await;

        let permission = upsert_permission(db, &subject_id, &resource_id, PermissionLevel::Own)
            .await
            .expect("upsert");

        assert_eq!(permission.id.len(), 36);
        assert_eq!(permission.subject_id, subject_id);
        assert_eq!(permission.resource_id, resource_id);
        assert_eq!(permission.permission_level, PermissionLevel::Own);
    }

    #[tokio::test]
    async fn test_upsert_updates_level_in_place() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (subject_id, resource_id) = seed_pair(db, "s1", "r1").await;

        let first = upsert_permission(db, &subject_id, &resource_id, PermissionLevel::Own)
            .await
            .unwrap();
        let second = upsert_permission(db, &subject_id, &resource_id, PermissionLevel::Read)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.permission_level, PermissionLevel::Read);
        assert_eq!(entities::Permission::find().count(db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_orphan_pair_is_rejected() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let err = upsert_permission(db, "no-subject", "no-resource", PermissionLevel::Read)
            .await
            .unwrap_err();

        assert!(matches!(err, PermsError::ConstraintViolation(_)));
        assert_eq!(entities::Permission::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_joins_subject_resource_and_type() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (subject_id, resource_id) = seed_pair(db, "s1", "r1").await;
        let stored = upsert_permission(db, &subject_id, &resource_id, PermissionLevel::Write)
            .await
            .unwrap();

        let views = list_permissions(db).await.unwrap();

        assert_eq!(views.len(), 1);
        let view = &views[0];
        assert_eq!(view.id, stored.id);
        assert_eq!(view.subject.id, subject_id);
        assert_eq!(view.subject.subject_id, "s1");
        assert_eq!(view.subject.subject_type, "user");
        assert_eq!(view.resource.id, resource_id);
        assert_eq!(view.resource.name, "r1");
        assert_eq!(view.resource.resource_type, "app");
        assert_eq!(view.permission_level, PermissionLevel::Write);
    }

    #[tokio::test]
    async fn test_filtered_listing() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (s1, r1) = seed_pair(db, "s1", "r1").await;
        let (s2, r2) = seed_pair(db, "s2", "r2").await;

        upsert_permission(db, &s1, &r1, PermissionLevel::Own).await.unwrap();
        upsert_permission(db, &s1, &r2, PermissionLevel::Read).await.unwrap();
        upsert_permission(db, &s2, &r2, PermissionLevel::Write).await.unwrap();

        let by_s1 = list_permissions_by_subject(db, &s1).await.unwrap();
        assert_eq!(by_s1.len(), 2);
        assert!(by_s1.iter().all(|v| v.subject.id == s1));

        let by_r2 = list_permissions_by_resource(db, &r2).await.unwrap();
        assert_eq!(by_r2.len(), 2);
        assert_eq!(by_r2[0].subject.subject_id, "s1");
        assert_eq!(by_r2[1].subject.subject_id, "s2");

        let single = get_permission_view(db, &s2, &r2).await.unwrap().unwrap();
        assert_eq!(single.permission_level, PermissionLevel::Write);
        assert!(get_permission_view(db, &s2, &r1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_pair() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();
        let (subject_id, resource_id) = seed_pair(db, "s1", "r1").await;
        upsert_permission(db, &subject_id, &resource_id, PermissionLevel::Own)
            .await
            .unwrap();

        assert!(delete_permission(db, &subject_id, &resource_id).await.unwrap());
        assert!(!delete_permission(db, &subject_id, &resource_id).await.unwrap());
        assert!(list_permissions(db).await.unwrap().is_empty());

        // Provisioned rows survive the revoke
        assert_eq!(entities::Subject::find().count(db).await.unwrap(), 1);
        assert_eq!(entities::Resource::find().count(db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_init_applies_migrations() {
        let temp_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let cfg = DbCfg {
            url: format!(
                "sqlite://{}?mode=rwc",
                temp_file.path().to_str().expect("Invalid temp file path")
            ),
            ..DbCfg::default()
        };

        let db = init(&cfg).await.expect("init");
        assert!(list_permissions(&db).await.unwrap().is_empty());
    }
}
