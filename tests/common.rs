//! Test utilities & fixtures.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use nodecore::auth::{ManualClock, SessionAuthenticator};
use nodecore::settings::ConfigManager;

/// A ready config manager backed by a fresh temp dir. Keep the `TempDir`
/// alive for as long as the manager is used.
pub fn ready_manager() -> (tempfile::TempDir, Arc<ConfigManager>) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let manager = Arc::new(ConfigManager::new(tmp.path()));
    manager.initialize().expect("initialize");
    (tmp, manager)
}

/// Authenticator on a manual clock with the factory credential and a 30 minute timeout.
#[allow(dead_code)] // not every test binary needs sessions
pub fn authenticator(
    manager: Arc<ConfigManager>,
    capacity: usize,
) -> (Arc<ManualClock>, SessionAuthenticator) {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let auth = SessionAuthenticator::new(manager)
        .with_capacity(capacity)
        .with_timeout(Duration::from_secs(1800))
        .with_clock(clock.clone());
    auth.initialize().expect("auth init");
    (clock, auth)
}
