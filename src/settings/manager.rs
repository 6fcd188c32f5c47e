//! Owner of the canonical [`SystemSettings`] and its on-disk file.
//!
//! ## Startup
//!
//! [`ConfigManager::initialize`] tries, in order:
//!
//! 1. the persisted file (`<data_dir>/config.ini`);
//! 2. the bundled default text, copied over the persisted file and loaded again;
//! 3. compiled-in defaults, written back to the persisted file.
//!
//! The third tier always succeeds, so a broken filesystem degrades the device
//! to defaults instead of stopping it.
//!
//! ## Locking
//!
//! Two mutexes: `inner` guards the table and the settings snapshot and is only
//! held across in-memory work; `io` serializes the writers (initialize, save,
//! setters) so the file on disk always matches the last committed snapshot.
//! Lock order is `io` then `inner`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nodecore::settings::ConfigManager;
//!
//! fn main() -> nodecore::Result<()> {
//!     let manager = ConfigManager::new("./data");
//!     manager.initialize()?;
//!
//!     let mut mqtt = manager.get_mqtt()?;
//!     mqtt.broker_host = "broker.lan".to_string();
//!     manager.set_mqtt(mqtt)?; // rewrites the whole file
//!     Ok(())
//! }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use log::{debug, error, info, warn};

use super::{
    AuthSettings, BluetoothSettings, EthernetSettings, IntervalSettings, MqttSettings,
    SystemSettings, TimeoutSettings, WebServerSettings, WifiApSettings, WifiStaSettings,
};
use crate::config::StorageConfig;
use crate::error::{CoreError, Result};
use crate::kvstore::{parse_with, serialize, OverflowPolicy, Table, DEFAULT_TABLE_CAPACITY};
use crate::lock;
use crate::logutil::mask_secret;

/// Default text shipped with the firmware, used by the second fallback tier.
pub const BUNDLED_DEFAULTS: &str = include_str!("../../assets/default_config.ini");

pub const DEFAULT_FILE_NAME: &str = "config.ini";

const MAX_BUNDLED_BYTES: usize = 10_000;
const FILE_BANNER: &str = "# Device configuration\n# Encoding: UTF-8\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Loading,
    Ready,
}

struct Inner {
    state: ManagerState,
    table: Table,
    settings: SystemSettings,
}

impl Inner {
    fn ensure_ready(&self) -> Result<()> {
        if self.state == ManagerState::Ready {
            Ok(())
        } else {
            Err(CoreError::not_ready("configuration manager"))
        }
    }
}

pub struct ConfigManager {
    data_dir: PathBuf,
    file_name: String,
    capacity: usize,
    overflow_policy: OverflowPolicy,
    bundled: String,
    io: Mutex<()>,
    inner: Mutex<Inner>,
}

impl ConfigManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        ConfigManager {
            data_dir: data_dir.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            capacity: DEFAULT_TABLE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            bundled: BUNDLED_DEFAULTS.to_string(),
            io: Mutex::new(()),
            inner: Mutex::new(Inner {
                state: ManagerState::Uninitialized,
                table: Table::new(),
                settings: SystemSettings::default(),
            }),
        }
    }

    /// Build from the `[storage]` section of the runtime config.
    pub fn from_config(cfg: &StorageConfig) -> Self {
        ConfigManager::new(&cfg.data_dir)
            .with_file_name(&cfg.file_name)
            .with_capacity(cfg.table_capacity)
            .with_overflow_policy(cfg.overflow_policy)
    }

    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Replace the bundled default text (an empty string disables tier 2).
    pub fn with_bundled_defaults(mut self, text: impl Into<String>) -> Self {
        self.bundled = text.into();
        self
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    pub fn state(&self) -> ManagerState {
        lock(&self.inner).state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ManagerState::Ready
    }

    /// Load settings through the fallback chain. Calling it again once ready is a no-op.
    pub fn initialize(&self) -> Result<()> {
        let _io = lock(&self.io);
        {
            let mut inner = lock(&self.inner);
            if inner.state == ManagerState::Ready {
                debug!("Configuration manager already initialized");
                return Ok(());
            }
            inner.state = ManagerState::Loading;
        }

        match self.load_with_fallback() {
            Ok((table, settings)) => {
                info!(
                    "Configuration ready: {} entries, admin '{}' (hash {}), broker {}:{}",
                    table.len(),
                    settings.auth.username,
                    mask_secret(&settings.auth.password_hash),
                    settings.mqtt.broker_host,
                    settings.mqtt.broker_port
                );
                let mut inner = lock(&self.inner);
                inner.table = table;
                inner.settings = settings;
                inner.state = ManagerState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("Configuration manager failed to initialize: {}", e);
                lock(&self.inner).state = ManagerState::Uninitialized;
                Err(e)
            }
        }
    }

    fn load_with_fallback(&self) -> Result<(Table, SystemSettings)> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.settings_path();

        info!("Loading configuration from {}", path.display());
        let first = match self.load_file(&path) {
            Ok(table) => {
                info!("Configuration file loaded");
                return Ok(Self::settings_from(table));
            }
            Err(e) => e,
        };

        warn!(
            "Could not load {} ({}), restoring bundled defaults",
            path.display(),
            first
        );
        match self.install_bundled(&path).and_then(|_| self.load_file(&path)) {
            Ok(table) => {
                info!("Configuration loaded from bundled defaults");
                return Ok(Self::settings_from(table));
            }
            Err(e) => error!("Bundled defaults unusable ({}), using compiled-in defaults", e),
        }

        let settings = SystemSettings::default();
        let mut table = Table::with_capacity(self.capacity);
        settings.write_to_table(&mut table)?;
        if let Err(e) = write_file_locked(&path, &render_file(&table)) {
            error!("Failed to persist default configuration: {}", e);
        }
        Ok((table, settings))
    }

    fn settings_from(table: Table) -> (Table, SystemSettings) {
        let settings = SystemSettings::from_table(&table);
        (table, settings)
    }

    fn load_file(&self, path: &Path) -> Result<Table> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CoreError::NotFound(path.display().to_string()),
            _ => CoreError::Io(e),
        })?;
        parse_with(&text, self.capacity, self.overflow_policy)
    }

    fn install_bundled(&self, path: &Path) -> Result<()> {
        let size = self.bundled.len();
        if size == 0 || size > MAX_BUNDLED_BYTES {
            return Err(CoreError::InvalidState(format!(
                "bundled defaults have invalid size ({size} bytes)"
            )));
        }
        info!("Copying bundled defaults to {} ({} bytes)", path.display(), size);
        write_file_locked(path, &self.bundled)?;
        Ok(())
    }

    /// Copy of the whole settings snapshot.
    pub fn load(&self) -> Result<SystemSettings> {
        self.read(|s| s.clone())
    }

    /// Replace the whole snapshot and rewrite the file.
    pub fn save(&self, settings: &SystemSettings) -> Result<()> {
        self.commit(false, |s| *s = settings.clone())
    }

    /// Discard everything loaded so far and persist the compiled-in defaults.
    pub fn reset_to_default(&self) -> Result<()> {
        self.commit(true, |s| *s = SystemSettings::default())?;
        info!("Configuration reset to default values");
        Ok(())
    }

    /// Copy of the backing table, in persisted order.
    pub fn table_snapshot(&self) -> Result<Table> {
        let inner = lock(&self.inner);
        inner.ensure_ready()?;
        Ok(inner.table.clone())
    }

    pub fn get_wifi_ap(&self) -> Result<WifiApSettings> {
        self.read(|s| s.wifi_ap.clone())
    }

    pub fn set_wifi_ap(&self, value: WifiApSettings) -> Result<()> {
        self.commit(false, |s| s.wifi_ap = value)
    }

    pub fn get_wifi_sta(&self) -> Result<WifiStaSettings> {
        self.read(|s| s.wifi_sta.clone())
    }

    pub fn set_wifi_sta(&self, value: WifiStaSettings) -> Result<()> {
        self.commit(false, |s| s.wifi_sta = value)
    }

    pub fn get_ethernet(&self) -> Result<EthernetSettings> {
        self.read(|s| s.ethernet.clone())
    }

    pub fn set_ethernet(&self, value: EthernetSettings) -> Result<()> {
        self.commit(false, |s| s.ethernet = value)
    }

    pub fn get_auth(&self) -> Result<AuthSettings> {
        self.read(|s| s.auth.clone())
    }

    /// Username must be non-empty and the hash 64 lower-case hex characters.
    pub fn set_auth(&self, value: AuthSettings) -> Result<()> {
        if value.username.trim().is_empty() {
            return Err(CoreError::invalid_arg("username must not be empty"));
        }
        if !is_sha256_hex(&value.password_hash) {
            return Err(CoreError::invalid_arg(
                "password hash must be 64 lower-case hex characters",
            ));
        }
        self.commit(false, |s| s.auth = value)
    }

    pub fn get_bluetooth(&self) -> Result<BluetoothSettings> {
        self.read(|s| s.bluetooth.clone())
    }

    pub fn set_bluetooth(&self, value: BluetoothSettings) -> Result<()> {
        self.commit(false, |s| s.bluetooth = value)
    }

    pub fn get_mqtt(&self) -> Result<MqttSettings> {
        self.read(|s| s.mqtt.clone())
    }

    pub fn set_mqtt(&self, value: MqttSettings) -> Result<()> {
        self.commit(false, |s| s.mqtt = value)
    }

    pub fn get_web_server(&self) -> Result<WebServerSettings> {
        self.read(|s| s.web_server.clone())
    }

    pub fn set_web_server(&self, value: WebServerSettings) -> Result<()> {
        self.commit(false, |s| s.web_server = value)
    }

    pub fn get_timeouts(&self) -> Result<TimeoutSettings> {
        self.read(|s| s.timeouts.clone())
    }

    pub fn set_timeouts(&self, value: TimeoutSettings) -> Result<()> {
        self.commit(false, |s| s.timeouts = value)
    }

    pub fn get_intervals(&self) -> Result<IntervalSettings> {
        self.read(|s| s.intervals.clone())
    }

    pub fn set_intervals(&self, value: IntervalSettings) -> Result<()> {
        self.commit(false, |s| s.intervals = value)
    }

    fn read<T>(&self, f: impl FnOnce(&SystemSettings) -> T) -> Result<T> {
        let inner = lock(&self.inner);
        inner.ensure_ready()?;
        Ok(f(&inner.settings))
    }

    /// Apply `change` to a copy of the snapshot, write every field into a copy
    /// of the table, swap both in, then rewrite the file outside the data lock.
    /// A failed table write leaves memory untouched; a failed file write is
    /// reported after memory has been updated.
    fn commit(&self, fresh_table: bool, change: impl FnOnce(&mut SystemSettings)) -> Result<()> {
        let _io = lock(&self.io);
        let text = {
            let mut inner = lock(&self.inner);
            inner.ensure_ready()?;

            let mut settings = inner.settings.clone();
            change(&mut settings);
            let mut table = if fresh_table {
                Table::with_capacity(self.capacity)
            } else {
                inner.table.clone()
            };
            settings.write_to_table(&mut table)?;

            inner.settings = settings;
            inner.table = table;
            render_file(&inner.table)
        };

        let path = self.settings_path();
        write_file_locked(&path, &text).map_err(|e| {
            error!("Failed to save configuration to {}: {}", path.display(), e);
            CoreError::Io(e)
        })?;
        debug!("Configuration saved to {}", path.display());
        Ok(())
    }
}

pub(crate) fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn render_file(table: &Table) -> String {
    let mut text = String::from(FILE_BANNER);
    text.push_str(&serialize(table));
    text
}

/// Replace `path` atomically (temp file + rename) while holding an exclusive
/// lock on the destination.
fn write_file_locked(path: &Path, content: &str) -> std::io::Result<()> {
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;
    lock_file.lock_exclusive()?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("config.ini");
    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                let written = tmp
                    .write_all(content.as_bytes())
                    .and_then(|_| tmp.flush());
                if let Err(e) = written {
                    drop(tmp);
                    discard_temp(&candidate);
                    return Err(e);
                }
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    };

    if let Err(e) = fs::rename(&tmp_path, path) {
        discard_temp(&tmp_path);
        return Err(e);
    }
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    drop(lock_file);
    Ok(())
}

fn discard_temp(tmp_path: &Path) {
    if let Err(e) = fs::remove_file(tmp_path) {
        warn!("Could not remove temp file {}: {}", tmp_path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_defaults_match_compiled_defaults() {
        let table = crate::kvstore::parse(BUNDLED_DEFAULTS);
        assert_eq!(SystemSettings::from_table(&table), SystemSettings::default());
        assert!(BUNDLED_DEFAULTS.len() <= MAX_BUNDLED_BYTES);
    }

    #[test]
    fn sha256_hex_check() {
        assert!(is_sha256_hex(super::super::DEFAULT_PASSWORD_HASH));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex("abc"));
    }

    #[test]
    fn calls_before_initialize_fail_with_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::new(dir.path());
        assert_eq!(manager.state(), ManagerState::Uninitialized);
        assert!(matches!(manager.load(), Err(CoreError::InvalidState(_))));
        assert!(matches!(manager.get_auth(), Err(CoreError::InvalidState(_))));
        assert!(matches!(
            manager.set_web_server(WebServerSettings { port: 8080 }),
            Err(CoreError::InvalidState(_))
        ));
        assert!(matches!(
            manager.reset_to_default(),
            Err(CoreError::InvalidState(_))
        ));
        assert!(!manager.settings_path().exists());
    }

    fn temp_leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp-"))
            .collect()
    }

    #[test]
    fn locked_writes_leave_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        write_file_locked(&path, "[a]\nk=v\n").unwrap();
        write_file_locked(&path, "[a]\nk=w\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[a]\nk=w\n");
        assert!(temp_leftovers(dir.path()).is_empty());

        let blocked = dir.path().join("blocked.ini");
        fs::create_dir(&blocked).unwrap();
        assert!(write_file_locked(&blocked, "x=1\n").is_err());
        assert!(temp_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn discard_temp_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(".config.ini.tmp-1-0");
        fs::write(&tmp, "partial").unwrap();
        discard_temp(&tmp);
        assert!(!tmp.exists());
        // Already gone: only logged.
        discard_temp(&tmp);
    }

    #[test]
    fn render_file_starts_with_banner() {
        let mut table = Table::new();
        table.set("web_server", "port", "80").unwrap();
        let text = render_file(&table);
        assert!(text.starts_with("# "));
        assert!(text.ends_with("[web_server]\nport=80\n"));
        assert_eq!(crate::kvstore::parse(&text), table);
    }
}
