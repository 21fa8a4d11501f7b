//! Entry registry
//!
//! Holds one running coordinator per configured entry, keyed by entry id.
//! The embedding application owns the registry and passes it around; there
//! is no process-global lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::client::{ThreeCommasApi, ThreeCommasClient};
use crate::config::{ConfigError, EntryConfig, Settings};
use crate::coordinator::{Coordinator, Snapshot, Status};
use crate::error::{ClientError, UpdateError};
use crate::sensor::{self, Sensor};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Invalid entry configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// First refresh failed for a transient reason; setup can be retried
    #[error("Entry not ready: {0}")]
    NotReady(String),

    #[error("Entry {0} is already set up")]
    AlreadyLoaded(String),
}

impl From<ClientError> for SetupError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Authentication(msg) => SetupError::AuthFailed(msg),
            other => SetupError::NotReady(other.to_string()),
        }
    }
}

impl From<UpdateError> for SetupError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::AuthFailed(msg) => SetupError::AuthFailed(msg),
            UpdateError::UpdateFailed(msg) => SetupError::NotReady(msg),
        }
    }
}

/// Why a set of credentials was refused
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid entry configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Private key could not be loaded: {0}")]
    InvalidKey(String),
    #[error("Credentials rejected: {0}")]
    Auth(String),
    #[error("Cannot reach the API: {0}")]
    Connection(String),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ValidationError {
    /// Short error code for forms
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidConfig(_) => "invalid_config",
            ValidationError::InvalidKey(_) => "invalid_key",
            ValidationError::Auth(_) => "auth",
            ValidationError::Connection(_) => "connection",
            ValidationError::Unknown(_) => "unknown",
        }
    }
}

/// Check credentials with a single bot-stats call
pub async fn validate_credentials(entry: &EntryConfig, settings: &Settings) -> Result<(), ValidationError> {
    let credentials = entry.credentials()?;
    let client = ThreeCommasClient::with_base_url(&credentials, &settings.base_url, settings.request_timeout())
        .map_err(|e| match e {
            ClientError::Authentication(msg) => ValidationError::InvalidKey(msg),
            other => ValidationError::Unknown(other.to_string()),
        })?;

    match client.get_bot_stats(None, None).await {
        Ok(_) => Ok(()),
        Err(ClientError::Authentication(msg)) => {
            warn!("Credential check failed: {}", msg);
            Err(ValidationError::Auth(msg))
        }
        Err(ClientError::Communication(msg)) => {
            error!("Credential check could not reach the API: {}", msg);
            Err(ValidationError::Connection(msg))
        }
        Err(ClientError::Unexpected(e)) => {
            error!("Credential check failed unexpectedly: {}", e);
            Err(ValidationError::Unknown(e.to_string()))
        }
    }
}

/// A set-up entry and its poll task
pub struct EntryHandle {
    entry_id: String,
    snapshot: watch::Receiver<Option<Arc<Snapshot>>>,
    status: watch::Receiver<Status>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), UpdateError>>,
}

impl EntryHandle {
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.borrow().clone()
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Receiver that is notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Sensors for the current snapshot
    pub fn sensors(&self) -> Vec<Sensor> {
        match self.snapshot() {
            Some(snapshot) => sensor::sensors_for(&self.entry_id, &snapshot),
            None => Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Running entries keyed by entry id
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, EntryHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the client for `entry`, run the first refresh and start polling.
    /// Returns the entry id (generated if the entry has none).
    pub async fn setup_entry(&mut self, entry: &EntryConfig, settings: &Settings) -> Result<String, SetupError> {
        let entry_id = entry
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let credentials = entry.credentials()?;
        let client = ThreeCommasClient::with_base_url(&credentials, &settings.base_url, settings.request_timeout())?;

        self.setup_with_api(entry_id.clone(), Arc::new(client), settings.poll_interval())
            .await?;
        Ok(entry_id)
    }

    /// Same as [`Registry::setup_entry`] with an already-built API
    pub async fn setup_with_api(
        &mut self,
        entry_id: String,
        api: Arc<dyn ThreeCommasApi>,
        update_interval: Duration,
    ) -> Result<&EntryHandle, SetupError> {
        if self.entries.contains_key(&entry_id) {
            return Err(SetupError::AlreadyLoaded(entry_id));
        }

        let coordinator = Coordinator::new(entry_id.clone(), api, update_interval);
        coordinator.refresh().await?;

        let snapshot = coordinator.subscribe();
        let status = coordinator.status();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let name = entry_id.clone();
        let task = tokio::spawn(async move {
            let result = coordinator.run(shutdown_rx).await;
            if let Err(e) = &result {
                error!("[{}] Poller halted: {}", name, e);
            }
            result
        });

        info!("✓ Entry {} set up", entry_id);
        let handle = EntryHandle {
            entry_id: entry_id.clone(),
            snapshot,
            status,
            shutdown,
            task,
        };
        Ok(self.entries.entry(entry_id).or_insert(handle))
    }

    pub fn get(&self, entry_id: &str) -> Option<&EntryHandle> {
        self.entries.get(entry_id)
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop the entry's poller and remove it. In-flight requests are dropped;
    /// receivers already handed out keep the last published snapshot.
    pub async fn unload_entry(&mut self, entry_id: &str) -> bool {
        let Some(handle) = self.entries.remove(entry_id) else {
            return false;
        };

        let _ = handle.shutdown.send(true);
        match handle.task.await {
            Ok(Ok(())) => info!("Entry {} unloaded", entry_id),
            Ok(Err(e)) => info!("Entry {} unloaded after poller halted: {}", entry_id, e),
            Err(e) => warn!("Entry {} poll task ended abnormally: {}", entry_id, e),
        }
        true
    }

    /// Unload then set up again with `entry`
    pub async fn reload_entry(
        &mut self,
        entry_id: &str,
        entry: &EntryConfig,
        settings: &Settings,
    ) -> Result<String, SetupError> {
        self.unload_entry(entry_id).await;
        let mut entry = entry.clone();
        entry.id = Some(entry_id.to_string());
        self.setup_entry(&entry, settings).await
    }

    pub async fn unload_all(&mut self) {
        for entry_id in self.entry_ids() {
            self.unload_entry(&entry_id).await;
        }
    }
}
