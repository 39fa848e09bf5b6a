use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod store;

use config::Config;
use dbus_interface::PresenceService;
use engine::Engine;
use store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("presenced starting");

    let config = Config::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        threshold = config.threshold,
        face_weight = config.face_weight,
        voice_weight = config.voice_weight,
        late_cutoff = %config.late_cutoff,
        checkout_policy = ?config.checkout_policy,
        "configuration loaded"
    );

    let store = Store::open(&config.db_path).await?;
    let db_path = config.db_path.display().to_string();
    let engine = Arc::new(Engine::new(store, &config)?);

    let _connection = zbus::connection::Builder::session()?
        .name("org.freedesktop.Presence1")?
        .serve_at("/org/freedesktop/Presence1", PresenceService::new(engine, db_path))?
        .build()
        .await?;

    tracing::info!("presenced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("presenced shutting down");

    Ok(())
}
