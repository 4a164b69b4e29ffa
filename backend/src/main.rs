use std::sync::Arc;

use backend::{
    build_rocket,
    config::ServiceConfig,
    persistence::ElectionStore,
    registry::ElectionRegistry,
    routes::AppState,
};
use shared::SystemClock;
use shuttle_runtime::CustomError;
use sqlx::PgPool;
use tokio::time::interval;
use tracing::{error, info};

async fn run_sweep_task(registry: Arc<ElectionRegistry>, config: ServiceConfig) {
    let mut interval = interval(config.sweep_interval());
    info!("🧹 Closing sweep started, every {}s", config.sweep_interval_secs);

    loop {
        interval.tick().await;
        match registry.sweep_closed().await {
            Ok(0) => {}
            Ok(count) => info!("🔒 Recorded {} closed elections", count),
            Err(e) => error!("Closing sweep failed: {}", e),
        }
    }
}

#[shuttle_runtime::main]
async fn rocket(
    #[shuttle_shared_db::Postgres] pool: PgPool,
    #[shuttle_runtime::Secrets] secret_store: shuttle_runtime::SecretStore,
) -> shuttle_rocket::ShuttleRocket {
    info!("🚀 Starting election server");

    let config = ServiceConfig::from_lookup(|key| secret_store.get(key));

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(CustomError::new)?;

    info!("📋 Migrations complete");

    let registry = ElectionRegistry::new(Arc::new(SystemClock::new()), config.event_buffer)
        .with_store(ElectionStore::new(pool));
    let restored = registry.restore().await.map_err(CustomError::new)?;
    info!("📦 Restored {} elections", restored);

    let state = AppState::new(registry);
    tokio::spawn(run_sweep_task(state.registry.clone(), config.clone()));

    Ok(build_rocket(state, &config).into())
}
