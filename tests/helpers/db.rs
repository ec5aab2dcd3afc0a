use permissions::catalog::ResourceTypeCatalog;
use permissions::settings::Settings;
use permissions::web::AppState;
use sea_orm::DatabaseConnection;

#[path = "../../src/test_support.rs"]
mod test_support;

pub use test_support::TestDb;

/// Application state over `db` with the default resource types seeded
pub async fn seed_app_state(db: &DatabaseConnection) -> AppState {
    let settings = Settings::default();
    let catalog = ResourceTypeCatalog::load(db)
        .await
        .expect("load catalog");
    catalog
        .seed(db, &settings.catalog.resource_types)
        .await
        .expect("seed resource types");
    AppState::new(db.clone(), &settings, catalog)
}
