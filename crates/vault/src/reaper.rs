use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::vault::Vault;

/// Periodically removes token records past their retention window.
///
/// Cleanup only; redemption never depends on it having run.
pub struct TokenReaper {
    vault: Arc<Vault>,
    every: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl TokenReaper {
    pub fn new(vault: Arc<Vault>, every: Duration, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            vault,
            every,
            shutdown_rx,
        }
    }

    /// Run until the shutdown channel flips to `true` or its sender is dropped.
    pub async fn run(mut self) {
        info!(interval = ?self.every, "token reaper starting");
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.vault.reap_tokens().await {
                        Ok(n) => debug!(removed = n, "token reaper pass complete"),
                        Err(e) => error!(error = %e, "token reaper pass failed"),
                    }
                }
            }
        }

        info!("token reaper stopped");
    }
}
