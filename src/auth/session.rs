use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::{generate_token, hash_password, self_test, DEFAULT_SESSION_CAPACITY};
use crate::error::{CoreError, Result};
use crate::lock;
use crate::logutil::{escape_log, mask_secret};
use crate::settings::{ConfigManager, DEFAULT_SESSION_MAX_AGE_SECS};

/// # Login Session
///
/// Binds a random token to the user that logged in with it. A session lives
/// in one slot of the authenticator's fixed table until it is logged out or
/// found expired, i.e. `now - last_access` exceeds the timeout. Every
/// successful validation moves `last_access` forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now.signed_duration_since(self.last_access) > timeout
    }
}

struct SessionTable {
    initialized: bool,
    slots: Vec<Option<Session>>,
}

impl SessionTable {
    fn find(&self, token: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(session) if session.token == token))
    }

    fn purge_expired(&mut self, now: DateTime<Utc>, timeout: Duration) -> usize {
        let mut cleared = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|s| s.is_expired(now, timeout)) {
                if let Some(session) = slot.take() {
                    info!(
                        target: "security",
                        "Session {} for '{}' expired",
                        mask_secret(&session.token),
                        session.username
                    );
                }
                cleared += 1;
            }
        }
        cleared
    }
}

/// Credential check and session lifecycle for the admin account.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use nodecore::auth::SessionAuthenticator;
/// use nodecore::settings::ConfigManager;
///
/// fn main() -> nodecore::Result<()> {
///     let config = Arc::new(ConfigManager::new("./data"));
///     config.initialize()?;
///
///     let auth = SessionAuthenticator::new(config);
///     auth.initialize()?;
///
///     let token = auth.login("admin", "123456")?;
///     assert!(auth.validate(&token));
///     auth.logout(&token)?;
///     Ok(())
/// }
/// ```
pub struct SessionAuthenticator {
    config: Arc<ConfigManager>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    timeout: Duration,
    table: Mutex<SessionTable>,
}

impl SessionAuthenticator {
    /// Five slots, 30 minute timeout, wall clock.
    pub fn new(config: Arc<ConfigManager>) -> Self {
        SessionAuthenticator {
            config,
            clock: Arc::new(SystemClock),
            capacity: DEFAULT_SESSION_CAPACITY,
            timeout: Duration::seconds(i64::from(DEFAULT_SESSION_MAX_AGE_SECS)),
            table: Mutex::new(SessionTable {
                initialized: false,
                slots: Vec::new(),
            }),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = Duration::from_std(timeout).unwrap_or_else(|_| Duration::weeks(52 * 100));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn timeout(&self) -> StdDuration {
        self.timeout.to_std().unwrap_or_default()
    }

    /// Run the hash self-test and allocate the slot table. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let mut table = lock(&self.table);
        if table.initialized {
            return Ok(());
        }
        if !self_test() {
            error!("SHA-256 self-test failed; authentication disabled");
            return Err(CoreError::InvalidState(
                "password hash self-test failed".to_string(),
            ));
        }
        table.slots = vec![None; self.capacity];
        table.initialized = true;
        info!(
            "Authentication initialized: {} session slots, {}s timeout",
            self.capacity,
            self.timeout.num_seconds()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.table).initialized
    }

    /// Compare against the credential currently held by the config manager.
    pub fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        if username.is_empty() || password.is_empty() {
            return Err(CoreError::invalid_arg("username and password are required"));
        }

        let stored = self.config.get_auth()?;
        if username != stored.username {
            warn!(
                target: "security",
                "Login rejected: unknown user '{}'",
                escape_log(username)
            );
            return Ok(false);
        }

        let ok = hash_password(password) == stored.password_hash;
        if !ok {
            warn!(target: "security", "Password mismatch for user '{}'", username);
        }
        Ok(ok)
    }

    /// Verify credentials and claim a free slot. Expired sessions are purged
    /// first; live sessions are never evicted.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            return Err(CoreError::invalid_arg("username and password are required"));
        }
        self.ensure_initialized()?;

        if !self.verify_password(username, password)? {
            return Err(CoreError::InvalidCredentials);
        }

        let now = self.clock.now();
        let mut table = lock(&self.table);
        table.purge_expired(now, self.timeout);

        let Some(slot) = table.slots.iter().position(Option::is_none) else {
            warn!(target: "security", "Login for '{}' refused: all session slots in use", username);
            return Err(CoreError::Capacity {
                what: "session table",
                capacity: self.capacity,
            });
        };

        let mut token = generate_token();
        while table.find(&token).is_some() {
            token = generate_token();
        }

        table.slots[slot] = Some(Session {
            token: token.clone(),
            username: username.to_string(),
            created_at: now,
            last_access: now,
        });
        info!(
            target: "security",
            "User '{}' logged in, session {}",
            username,
            mask_secret(&token)
        );
        Ok(token)
    }

    /// True for a live session, whose last access is then refreshed. An expired
    /// session is cleared on the spot and stays invalid.
    pub fn validate(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let now = self.clock.now();
        let mut table = lock(&self.table);
        if !table.initialized {
            debug!("Session validation before initialization");
            return false;
        }
        let Some(idx) = table.find(token) else {
            return false;
        };

        let expired = table.slots[idx]
            .as_ref()
            .is_some_and(|s| s.is_expired(now, self.timeout));
        if expired {
            table.slots[idx] = None;
            warn!(target: "security", "Session {} expired", mask_secret(token));
            return false;
        }
        if let Some(session) = table.slots[idx].as_mut() {
            session.last_access = now;
        }
        true
    }

    /// Clear the session for `token`. Returns whether one was found.
    pub fn logout(&self, token: &str) -> Result<bool> {
        if token.is_empty() {
            return Err(CoreError::invalid_arg("session token is required"));
        }
        let mut table = lock(&self.table);
        if !table.initialized {
            return Err(CoreError::not_ready("authentication"));
        }
        match table.find(token) {
            Some(idx) => {
                table.slots[idx] = None;
                info!(target: "security", "Session {} logged out", mask_secret(token));
                Ok(true)
            }
            None => {
                debug!("Logout for unknown session {}", mask_secret(token));
                Ok(false)
            }
        }
    }

    /// Clear every session idle for longer than the timeout.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut table = lock(&self.table);
        if !table.initialized {
            return Err(CoreError::not_ready("authentication"));
        }
        let cleared = table.purge_expired(now, self.timeout);
        if cleared > 0 {
            info!("Cleaned {} expired sessions", cleared);
        }
        Ok(cleared)
    }

    /// Read-only copy of a live session; does not refresh it.
    pub fn session_info(&self, token: &str) -> Result<Session> {
        if token.is_empty() {
            return Err(CoreError::invalid_arg("session token is required"));
        }
        let now = self.clock.now();
        let table = lock(&self.table);
        if !table.initialized {
            return Err(CoreError::not_ready("authentication"));
        }
        table
            .find(token)
            .and_then(|idx| table.slots[idx].clone())
            .filter(|s| !s.is_expired(now, self.timeout))
            .ok_or_else(|| CoreError::NotFound(format!("session {}", mask_secret(token))))
    }

    /// Number of occupied slots, including expired sessions not yet purged.
    pub fn active_sessions(&self) -> Result<usize> {
        let table = lock(&self.table);
        if !table.initialized {
            return Err(CoreError::not_ready("authentication"));
        }
        Ok(table.slots.iter().filter(|s| s.is_some()).count())
    }

    /// Replace the stored hash after checking the old password. Persists the
    /// whole settings file. Existing sessions stay valid.
    pub fn change_password(&self, username: &str, old: &str, new: &str) -> Result<()> {
        if username.is_empty() || old.is_empty() || new.is_empty() {
            return Err(CoreError::invalid_arg(
                "username, old and new password are required",
            ));
        }
        self.ensure_initialized()?;

        if !self.verify_password(username, old)? {
            warn!(target: "security", "Password change for '{}' rejected", username);
            return Err(CoreError::InvalidCredentials);
        }

        let mut auth = self.config.get_auth()?;
        auth.password_hash = hash_password(new);
        self.config.set_auth(auth)?;
        info!(target: "security", "Password changed for user '{}'", username);
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if lock(&self.table).initialized {
            Ok(())
        } else {
            Err(CoreError::not_ready("authentication"))
        }
    }
}
