use clap::Parser;
use miette::Result;
use permissions::catalog::ResourceTypeCatalog;
use permissions::{settings, storage, web};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "permissions",
    version,
    about = "Permission authority for external subjects and resources"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // init storage (database + migrations)
    let db = storage::init(&settings.database).await?;

    // pre-seed the resource type catalog
    let catalog = ResourceTypeCatalog::load(&db).await?;
    let seeded = catalog
        .seed(&db, &settings.catalog.resource_types)
        .await?;
    tracing::info!(count = seeded.len(), "Resource type catalog ready");

    let state = web::AppState::new(db, &settings, catalog);
    web::serve(settings, state).await?;
    Ok(())
}
