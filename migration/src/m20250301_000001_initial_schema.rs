use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create resource_types table
        manager
            .create_table(
                Table::create()
                    .table(ResourceTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResourceTypes::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ResourceTypes::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .to_owned(),
            )
            .await?;

        // Create subjects table
        manager
            .create_table(
                Table::create()
                    .table(Subjects::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subjects::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Subjects::ExternalSubjectId))
                    .col(string(Subjects::SubjectType))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subjects_external_id_type")
                    .table(Subjects::Table)
                    .col(Subjects::ExternalSubjectId)
                    .col(Subjects::SubjectType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create resources table
        manager
            .create_table(
                Table::create()
                    .table(Resources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Resources::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Resources::Name))
                    .col(string(Resources::ResourceTypeId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resources_resource_type")
                            .from(Resources::Table, Resources::ResourceTypeId)
                            .to(ResourceTypes::Table, ResourceTypes::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_resources_name_type")
                    .table(Resources::Table)
                    .col(Resources::Name)
                    .col(Resources::ResourceTypeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create permissions table
        manager
            .create_table(
                Table::create()
                    .table(Permissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Permissions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Permissions::SubjectId))
                    .col(string(Permissions::ResourceId))
                    .col(string(Permissions::PermissionLevel))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_permissions_subject")
                            .from(Permissions::Table, Permissions::SubjectId)
                            .to(Subjects::Table, Subjects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_permissions_resource")
                            .from(Permissions::Table, Permissions::ResourceId)
                            .to(Resources::Table, Resources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One permission level per (subject, resource); the upsert relies on it
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_permissions_subject_resource")
                    .table(Permissions::Table)
                    .col(Permissions::SubjectId)
                    .col(Permissions::ResourceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_permissions_resource")
                    .table(Permissions::Table)
                    .col(Permissions::ResourceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Permissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Resources::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResourceTypes::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ResourceTypes {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Subjects {
    Table,
    Id,
    ExternalSubjectId,
    SubjectType,
}

#[derive(DeriveIden)]
enum Resources {
    Table,
    Id,
    Name,
    ResourceTypeId,
}

#[derive(DeriveIden)]
enum Permissions {
    Table,
    Id,
    SubjectId,
    ResourceId,
    PermissionLevel,
}
