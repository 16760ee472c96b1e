use anyhow::{Context, bail};
use mathlearn::catalog::{Catalog, import_catalog};
use mathlearn::env::{AppConfig, load_environment};
use mathlearn::telemetry::init_tracing;
use mathlearn::{connect, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: import_catalog <catalog.json>");
    };

    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    let config = AppConfig::from_env();
    let _telemetry = init_tracing(&config);

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let catalog = Catalog::from_json(&raw)?;

    let pool = connect(&config.database_url).await?;
    run_migrations(&pool).await?;

    let summary = import_catalog(&pool, &catalog).await?;
    println!(
        "Imported {} courses, {} lessons, {} questions",
        summary.courses, summary.lessons, summary.questions
    );

    Ok(())
}
