//! Poll Coordinator - periodic fetch, derive, publish
//!
//! Each cycle rebuilds the snapshot from scratch and publishes it with a
//! single `watch` send once it is complete, so readers only ever see a
//! whole snapshot. A failed cycle publishes nothing and the previous
//! snapshot stays current.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::client::ThreeCommasApi;
use crate::error::{ClientError, UpdateError};
use crate::metrics::{self, AccountMetrics, BotInvestment};
use crate::models::{decode_list, Account, Bot, ProfitData};

/// Default poll interval (5 minutes)
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(300);

/// Consolidated result of one successful poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub profit_data: ProfitData,
    /// Keyed by account id
    pub accounts: HashMap<String, AccountMetrics>,
    /// Keyed by account id, each bot annotated with its investment amount
    pub bots: HashMap<String, Vec<BotInvestment>>,
    /// Accounts whose bots could not be fetched this cycle
    pub failed_accounts: Vec<AccountFailure>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountFailure {
    pub account_id: String,
    pub reason: String,
}

/// Per-account result of the bot fetch step
#[derive(Debug)]
pub enum AccountOutcome {
    Fetched { account_id: String, bots: Vec<Bot> },
    Failed(AccountFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    Healthy,
    /// Credentials rejected; no further polling until re-authentication
    AuthFailed,
}

/// Health of a coordinator as seen by readers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub state: CoordinatorState,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: CoordinatorState::Healthy,
            last_update_success: false,
            last_error: None,
            last_success_at: None,
        }
    }
}

/// Run one full poll cycle against `api`
pub async fn fetch_snapshot(api: &dyn ThreeCommasApi) -> Result<Snapshot, ClientError> {
    let bot_stats = api.get_bot_stats(None, None).await?;
    debug!("Bot stats data: {}", bot_stats);

    let profit_data = ProfitData::from_bot_stats(&bot_stats).unwrap_or_else(|| {
        warn!(
            "Missing expected data structure in bot stats response: {}",
            bot_stats
        );
        ProfitData::default()
    });

    let accounts: Vec<Account> = decode_list(api.get_accounts().await?, "accounts");
    debug!("Fetched {} accounts", accounts.len());

    let mut outcomes = Vec::with_capacity(accounts.len());
    for account in &accounts {
        let Some(account_id) = account.id_string() else {
            debug!("Skipping account without id: {:?}", account.name);
            continue;
        };
        outcomes.push(fetch_account_bots(api, account_id).await?);
    }

    let mut bots_by_account = HashMap::new();
    let mut failed_accounts = Vec::new();
    for outcome in outcomes {
        match outcome {
            AccountOutcome::Fetched { account_id, bots } => {
                bots_by_account.insert(account_id, bots);
            }
            AccountOutcome::Failed(failure) => failed_accounts.push(failure),
        }
    }

    let fetched: Vec<Account> = accounts
        .into_iter()
        .filter(|a| {
            a.id_string()
                .map(|id| bots_by_account.contains_key(&id))
                .unwrap_or(false)
        })
        .collect();
    let derived = metrics::derive(&fetched, &bots_by_account);

    Ok(Snapshot {
        profit_data,
        accounts: derived.accounts,
        bots: derived.bots,
        failed_accounts,
        updated_at: Utc::now(),
    })
}

/// Fetch one account's bots. Only authentication errors escape; anything
/// else becomes a `Failed` outcome so other accounts still get processed.
async fn fetch_account_bots(
    api: &dyn ThreeCommasApi,
    account_id: String,
) -> Result<AccountOutcome, ClientError> {
    match api.get_bots(Some(&account_id), None, None).await {
        Ok(payload) => {
            let bots: Vec<Bot> = decode_list(payload, "bots");
            debug!("Account {}: {} bots", account_id, bots.len());
            Ok(AccountOutcome::Fetched { account_id, bots })
        }
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            warn!("Error fetching bots for account {}: {}", account_id, e);
            Ok(AccountOutcome::Failed(AccountFailure {
                account_id,
                reason: e.to_string(),
            }))
        }
    }
}

/// Owns the poll schedule and is the only writer of the snapshot
pub struct Coordinator {
    name: String,
    api: Arc<dyn ThreeCommasApi>,
    update_interval: Duration,
    snapshot_tx: watch::Sender<Option<Arc<Snapshot>>>,
    status_tx: watch::Sender<Status>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, api: Arc<dyn ThreeCommasApi>, update_interval: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(Status::default());
        Self {
            name: name.into(),
            api,
            update_interval,
            snapshot_tx,
            status_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receiver for published snapshots
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.snapshot_tx.subscribe()
    }

    /// Receiver for status changes
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> CoordinatorState {
        self.status_tx.borrow().state
    }

    /// Latest published snapshot, if any
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot_tx.borrow().clone()
    }

    /// Run one cycle and publish the result.
    ///
    /// Once credentials have been rejected this returns `AuthFailed`
    /// without touching the API.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, UpdateError> {
        if self.state() == CoordinatorState::AuthFailed {
            return Err(UpdateError::AuthFailed(
                "credentials previously rejected".to_string(),
            ));
        }

        match fetch_snapshot(self.api.as_ref()).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                if !snapshot.failed_accounts.is_empty() {
                    warn!(
                        "[{}] Update finished with {} failed accounts",
                        self.name,
                        snapshot.failed_accounts.len()
                    );
                }
                self.snapshot_tx.send_replace(Some(Arc::clone(&snapshot)));
                self.status_tx.send_modify(|status| {
                    status.last_update_success = true;
                    status.last_error = None;
                    status.last_success_at = Some(snapshot.updated_at);
                });
                debug!("[{}] Published snapshot with {} accounts", self.name, snapshot.accounts.len());
                Ok(snapshot)
            }
            Err(e) => {
                match &e {
                    ClientError::Authentication(_) => {
                        error!("[{}] Authentication failed, re-authentication required: {}", self.name, e)
                    }
                    ClientError::Communication(_) => warn!("[{}] Communication error: {}", self.name, e),
                    ClientError::Unexpected(_) => error!("[{}] Unknown error: {}", self.name, e),
                }

                let update_error = UpdateError::from(e);
                self.status_tx.send_modify(|status| {
                    if matches!(update_error, UpdateError::AuthFailed(_)) {
                        status.state = CoordinatorState::AuthFailed;
                    }
                    status.last_update_success = false;
                    status.last_error = Some(update_error.to_string());
                });
                Err(update_error)
            }
        }
    }

    /// Poll on the fixed interval until shutdown or an authentication failure.
    ///
    /// Cycles never overlap. If a snapshot was already published (first
    /// refresh done by setup) the first poll waits one full interval.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), UpdateError> {
        let mut ticker = interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let already_published = self.snapshot_tx.borrow().is_some();
        if already_published {
            ticker.tick().await;
        }

        info!(
            "[{}] Polling every {}s",
            self.name,
            self.update_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[{}] Poller stopped", self.name);
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                _ = shutdown.changed() => {
                    info!("[{}] Poller stopped during update", self.name);
                    return Ok(());
                }
                outcome = self.refresh() => outcome,
            };

            if let Err(e @ UpdateError::AuthFailed(_)) = outcome {
                return Err(e);
            }
        }
    }
}
