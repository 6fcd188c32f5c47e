//! Background task that purges expired sessions on a fixed period.
//!
//! Session expiry is otherwise only noticed lazily (on validation or login);
//! the sweeper frees slots held by clients that simply went away.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::SessionAuthenticator;

pub struct SessionSweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

impl SessionSweeper {
    /// Start sweeping every `period` (at least 1 ms). Must be called inside a
    /// tokio runtime.
    pub fn spawn(auth: Arc<SessionAuthenticator>, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut total: u64 = 0;
            info!("Session sweeper started ({}s period)", period.as_secs());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match auth.cleanup_expired() {
                            Ok(0) => debug!("Sweep: no expired sessions"),
                            Ok(n) => total += n as u64,
                            Err(e) => warn!("Session sweep failed: {}", e),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Session sweeper stopped after clearing {} sessions", total);
            total
        });
        SessionSweeper {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the task and return how many sessions it cleared in total.
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown_tx.send(true);
        self.handle.await.unwrap_or(0)
    }
}
