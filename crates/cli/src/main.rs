//! Demo entry point.

use checkout::Checkout;
use cli::{CliError, Config, run_demo};
use document_store::{InMemoryDocumentStore, PostgresDocumentStore};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Open the store and run the scenario
    let mut out = std::io::stdout();
    match &config.database_url {
        Some(url) => {
            tracing::info!("using PostgreSQL document store");
            let store = PostgresDocumentStore::connect(url).await?;
            store.run_migrations().await?;
            let checkout = Checkout::new(store, config.retry_policy()).with_pacing(config.pacing());
            run_demo(&checkout, &mut out).await?;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory document store");
            let checkout = Checkout::new(InMemoryDocumentStore::new(), config.retry_policy())
                .with_pacing(config.pacing());
            run_demo(&checkout, &mut out).await?;
        }
    }

    // 4. Dump the checkout metrics
    if config.print_metrics {
        println!("{}", metrics_handle.render());
    }
    Ok(())
}
