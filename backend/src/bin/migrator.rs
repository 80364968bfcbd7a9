use dotenvy::dotenv;
use school_admin::{
    infrastructure::{config::Config, db},
    telemetry,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    let config = Config::from_env()?;
    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;

    info!(
        database_max_connections = config.database.max_connections,
        "school admin migrations completed"
    );

    Ok(())
}
