//! Registry of known resource types.
//!
//! Resource types are administrative data: grants can only reference types that
//! were registered beforehand. The catalog keeps a process-wide name -> id cache
//! in front of the `resource_types` table and refreshes it whenever an
//! administrative change goes through it, or when a lookup misses or finds a
//! stale entry (another process may have registered, renamed or deleted the
//! type).
use crate::entities;
use crate::errors::PermsError;
use crate::models::{validate_name, ResourceType};
use sea_orm::sea_query::{Expr, OnConflict, Query, SelectStatement};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ResourceTypeCatalog {
    by_name: Arc<RwLock<HashMap<String, String>>>,
}

impl ResourceTypeCatalog {
    /// Build a catalog primed with every registered type.
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Self, PermsError> {
        let catalog = Self::default();
        catalog.refresh(db).await?;
        Ok(catalog)
    }

    pub async fn refresh<C: ConnectionTrait>(&self, db: &C) -> Result<(), PermsError> {
        let rows = entities::resource_type::Entity::find().all(db).await?;
        let fresh: HashMap<String, String> =
            rows.into_iter().map(|row| (row.name, row.id)).collect();
        tracing::debug!(count = fresh.len(), "resource type cache refreshed");
        *self.by_name.write().await = fresh;
        Ok(())
    }

    /// Resolve a type name to its internal id.
    ///
    /// A cache hit is confirmed against the store by primary key, so a type
    /// renamed or deleted by another process is not resolved under its old name.
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        db: &C,
        name: &str,
    ) -> Result<String, PermsError> {
        let cached = self.by_name.read().await.get(name).cloned();
        if let Some(id) = cached {
            let current = entities::resource_type::Entity::find_by_id(id.clone())
                .one(db)
                .await?;
            if current.is_some_and(|row| row.name == name) {
                return Ok(id);
            }
            tracing::debug!(name, id = %id, "stale resource type cache entry");
        }

        self.refresh(db).await?;
        self.by_name
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PermsError::NotFound(format!("resource type `{}`", name)))
    }

    /// Register a type name. Registering an existing name returns the existing row.
    pub async fn register<C: ConnectionTrait>(
        &self,
        db: &C,
        name: &str,
    ) -> Result<ResourceType, PermsError> {
        use entities::resource_type::{ActiveModel, Column, Entity};

        validate_name("resource type name", name)?;

        let row = ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
        };
        let inserted = Entity::insert(row)
            .on_conflict(OnConflict::column(Column::Name).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;

        let model = Entity::find()
            .filter(Column::Name.eq(name))
            .one(db)
            .await?
            .ok_or_else(|| {
                PermsError::ConstraintViolation(format!(
                    "resource type `{}` vanished after registration",
                    name
                ))
            })?;

        if inserted > 0 {
            tracing::info!(name, id = %model.id, "registered resource type");
        }
        self.by_name
            .write()
            .await
            .insert(model.name.clone(), model.id.clone());
        Ok(model.into())
    }

    /// Register every name in `names`, skipping those already present.
    pub async fn seed<C: ConnectionTrait>(
        &self,
        db: &C,
        names: &[String],
    ) -> Result<Vec<ResourceType>, PermsError> {
        let mut seeded = Vec::with_capacity(names.len());
        for name in names {
            seeded.push(self.register(db, name).await?);
        }
        Ok(seeded)
    }

    pub async fn list<C: ConnectionTrait>(&self, db: &C) -> Result<Vec<ResourceType>, PermsError> {
        use entities::resource_type::{Column, Entity};

        Ok(Entity::find()
            .order_by_asc(Column::Name)
            .all(db)
            .await?
            .into_iter()
            .map(ResourceType::from)
            .collect())
    }

    /// Rename a type. Names are frozen once any resource references the type.
    ///
    /// The reference check and the rename are one conditional `UPDATE`, so a
    /// resource provisioned concurrently either lands first and blocks the
    /// rename, or lands after it under the new name.
    pub async fn rename<C>(
        &self,
        db: &C,
        id: &str,
        new_name: &str,
    ) -> Result<ResourceType, PermsError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        use entities::resource_type::{Column, Entity};

        validate_name("resource type name", new_name)?;

        let txn = db.begin().await?;
        let current = find_type(&txn, id).await?;
        if current.name == new_name {
            return Ok(current.into());
        }

        let renamed = Entity::update_many()
            .col_expr(Column::Name, Expr::value(new_name.to_string()))
            .filter(Column::Id.eq(id))
            .filter(Expr::exists(references_to(id)).not())
            .exec(&txn)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => PermsError::InvalidInput(format!(
                    "resource type name `{}` is already taken",
                    new_name
                )),
                _ => PermsError::from(e),
            })?;
        if renamed.rows_affected == 0 {
            return Err(referenced(&current.name));
        }
        txn.commit().await?;
        tracing::info!(id, from = %current.name, to = new_name, "renamed resource type");

        self.refresh(db).await?;
        Ok(ResourceType {
            id: current.id,
            name: new_name.to_string(),
        })
    }

    /// Remove a type that no resource references.
    pub async fn delete<C>(&self, db: &C, id: &str) -> Result<(), PermsError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        use entities::resource_type::{Column, Entity};

        let txn = db.begin().await?;
        let current = find_type(&txn, id).await?;

        let deleted = Entity::delete_many()
            .filter(Column::Id.eq(id))
            .filter(Expr::exists(references_to(id)).not())
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(referenced(&current.name));
        }
        txn.commit().await?;
        tracing::info!(id, name = %current.name, "deleted resource type");

        self.refresh(db).await?;
        Ok(())
    }
}

async fn find_type<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<entities::resource_type::Model, PermsError> {
    entities::resource_type::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| PermsError::NotFound(format!("resource type id `{}`", id)))
}

/// `SELECT 1 FROM resources WHERE resource_type_id = ?`
fn references_to(resource_type_id: &str) -> SelectStatement {
    use entities::resource::{Column, Entity};

    Query::select()
        .expr(Expr::val(1))
        .from(Entity)
        .and_where(Expr::col(Column::ResourceTypeId).eq(resource_type_id))
        .to_owned()
}

fn referenced(name: &str) -> PermsError {
    PermsError::InvalidInput(format!(
        "resource type `{}` is referenced by existing resources",
        name
    ))
}
