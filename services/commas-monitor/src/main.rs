//! 3Commas Monitor - polls the 3Commas API and reports sensor values
//!
//! 1. Loads settings (config file + environment)
//! 2. Sets up one poller per configured entry
//! 3. Logs sensor readings whenever a new snapshot is published
//! 4. Unloads every entry on Ctrl-C

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use commas_monitor::coordinator::{CoordinatorState, Snapshot, Status};
use commas_monitor::registry::{Registry, SetupError};
use commas_monitor::sensor;
use commas_monitor::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    // Initialize logging
    let level = settings
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting 3Commas Monitor...");
    info!(
        "API: {}, poll interval: {}s, entries: {}",
        settings.base_url,
        settings.poll_interval_secs,
        settings.entries.len()
    );

    if settings.entries.is_empty() {
        anyhow::bail!(
            "No entries configured; add [[entries]] to the config file or set THREE_COMMAS_API_KEY"
        );
    }

    let mut registry = Registry::new();
    let mut watchers = Vec::new();

    for entry in &settings.entries {
        match registry.setup_entry(entry, &settings).await {
            Ok(entry_id) => {
                if let Some(handle) = registry.get(&entry_id) {
                    watchers.push(tokio::spawn(watch_entry(
                        entry_id.clone(),
                        handle.subscribe(),
                        handle.subscribe_status(),
                    )));
                }
            }
            Err(SetupError::AuthFailed(e)) => {
                error!("Entry {}: re-authentication required ({})", entry.label(), e);
            }
            Err(e) => {
                error!("Entry {}: setup failed: {}", entry.label(), e);
            }
        }
    }

    if registry.is_empty() {
        anyhow::bail!("No entry could be set up");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    registry.unload_all().await;
    for watcher in watchers {
        watcher.abort();
    }

    Ok(())
}

/// Log sensor values for every published snapshot of one entry
async fn watch_entry(
    entry_id: String,
    mut snapshots: watch::Receiver<Option<Arc<Snapshot>>>,
    mut status: watch::Receiver<Status>,
) {
    let initial = snapshots.borrow_and_update().clone();
    if let Some(snapshot) = initial {
        log_sensors(&entry_id, &snapshot);
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return;
                }
                let latest = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    log_sensors(&entry_id, &snapshot);
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
                let current = status.borrow_and_update().clone();
                if current.state == CoordinatorState::AuthFailed {
                    error!("Entry {}: re-authentication required", entry_id);
                    return;
                }
                if !current.last_update_success {
                    warn!(
                        "Entry {}: update failed, keeping last snapshot ({})",
                        entry_id,
                        current.last_error.unwrap_or_default()
                    );
                }
            }
        }
    }
}

fn log_sensors(entry_id: &str, snapshot: &Snapshot) {
    for s in sensor::sensors_for(entry_id, snapshot) {
        match s.native_value(snapshot) {
            Some(value) => info!("{} = {} {}", s.name, value, s.description.unit),
            None => info!("{} = unavailable", s.name),
        }
    }
}
