use mathlearn::env::{AppConfig, load_environment};
use mathlearn::quiz::QuizAttempts;
use mathlearn::telemetry::init_tracing;
use mathlearn::{Error, connect, init_rocket, run_maintenance, run_migrations};
use rocket::tokio;
use tracing::{error, info};

#[rocket::main]
async fn main() -> Result<(), Error> {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    let config = AppConfig::from_env();
    let _telemetry = init_tracing(&config);

    let pool = connect(&config.database_url).await?;
    run_migrations(&pool).await?;

    let attempts = QuizAttempts::default();

    let maintenance_pool = pool.clone();
    let maintenance_attempts = attempts.clone();
    let maintenance_config = config.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            run_maintenance(&maintenance_pool, &maintenance_attempts, &maintenance_config).await;
            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    if let Err(e) = init_rocket(pool, config, attempts).launch().await {
        error!("Rocket failed to launch: {}", e);
        return Err(Error::Anyhow(anyhow::anyhow!("launch failed")));
    }

    info!("Shut down cleanly");
    Ok(())
}
