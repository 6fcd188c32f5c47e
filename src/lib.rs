//! # nodecore - settings store and session authentication for small devices
//!
//! The two stateful subsystems behind a device's web/API surface:
//!
//! - **Settings**: a bounded `[section] key=value` text store, a typed
//!   [`settings::SystemSettings`] view over it, and a [`settings::ConfigManager`]
//!   that loads it through a three-tier fallback (persisted file, bundled
//!   defaults, compiled-in defaults) and rewrites the file on every change.
//! - **Authentication**: a single admin credential checked against a SHA-256
//!   hash, and a fixed number of time-limited login sessions.
//!
//! Radio/network managers, the MQTT client and the HTTP router are consumers of
//! these APIs and live elsewhere.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nodecore::auth::SessionAuthenticator;
//! use nodecore::settings::ConfigManager;
//!
//! fn main() -> nodecore::Result<()> {
//!     let config = Arc::new(ConfigManager::new("./data"));
//!     config.initialize()?;
//!
//!     let auth = SessionAuthenticator::new(config.clone());
//!     auth.initialize()?;
//!
//!     let token = auth.login("admin", "123456")?;
//!     assert!(auth.validate(&token));
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`kvstore`] - entry table and its text format
//! - [`settings`] - typed settings and the config manager
//! - [`auth`] - password hashing and sessions
//! - [`sweeper`] - periodic expired-session cleanup
//! - [`config`] - runtime (process) configuration
//! - [`logutil`] - log sanitizing helpers

pub mod auth;
pub mod config;
pub mod error;
pub mod kvstore;
pub mod logutil;
pub mod settings;
pub mod sweeper;

pub use error::{CoreError, Result};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked. All guarded
/// state here is updated by whole-value swaps, so it is never left half-written.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
