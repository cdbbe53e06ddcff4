//! validation-coordinator: runs the validation engine's queue consumers.
//!
//! Reads config from env vars (see [`validation_coordinator::config`]):
//!   VALIDATION_DATA_TYPES_PATH  DataType/Checklist YAML (optional)
//!   VALIDATION_DATABASE_URL  Postgres for ValidationResults (`database` feature)

use std::sync::Arc;

use tokio::sync::watch;

use validation_core::memory::{InMemorySubmittables, InMemoryValidationResultStore};
use validation_core::ports::{ReferenceDataStore, ValidationResultStore};
use validation_core::ReferenceDataCatalog;
use validation_coordinator::{Coordinator, CoordinatorConfig, CoordinatorPorts};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,validation_coordinator=debug,validation_core=debug".into()),
        )
        .init();

    let config = CoordinatorConfig::from_env();
    tracing::info!(?config, "Configuration loaded");

    let catalog = match &config.data_types_path {
        Some(path) => ReferenceDataCatalog::from_file(path)?,
        None => {
            tracing::warn!("VALIDATION_DATA_TYPES_PATH not set; every entity gets the default authors");
            ReferenceDataCatalog::default()
        }
    };
    tracing::info!(
        data_types = catalog.data_type_count(),
        checklists = catalog.checklist_count(),
        "Reference data loaded"
    );
    let reference_data: Arc<dyn ReferenceDataStore> = Arc::new(catalog);

    let results = validation_result_store(&config).await?;
    let submittables = InMemorySubmittables::new();

    let coordinator = Coordinator::new(
        config,
        CoordinatorPorts {
            submittables: Arc::new(submittables.registry()),
            results,
            reference_data,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = coordinator.start(shutdown_rx).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true)?;
    for handle in handles {
        handle.await?;
    }

    let dead = coordinator.dead_letters().len().await;
    if dead > 0 {
        tracing::warn!(dead_letters = dead, "Exiting with dead-lettered messages");
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn validation_result_store(
    config: &CoordinatorConfig,
) -> anyhow::Result<Arc<dyn ValidationResultStore>> {
    use validation_core::pg_store::PgValidationResultStore;

    match &config.database_url {
        Some(url) => {
            let store = PgValidationResultStore::connect(url).await?;
            tracing::info!("Connected to database");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryValidationResultStore::new())),
    }
}

#[cfg(not(feature = "database"))]
async fn validation_result_store(
    config: &CoordinatorConfig,
) -> anyhow::Result<Arc<dyn ValidationResultStore>> {
    if config.database_url.is_some() {
        tracing::warn!("VALIDATION_DATABASE_URL ignored: built without the database feature");
    }
    Ok(Arc::new(InMemoryValidationResultStore::new()))
}
