//! # Device Settings
//!
//! [`SystemSettings`] is the typed view of everything stored in the key/value
//! table. It is the only configuration representation the rest of the device
//! consumes; the [`Table`] is a serialization detail owned by [`ConfigManager`].
//!
//! ## Sections
//!
//! - [`WifiApSettings`] - `[wifi_ap]` access-point network
//! - [`WifiStaSettings`] - `[wifi_sta]` station (uplink) network
//! - [`EthernetSettings`] - `[ethernet]` wired interface
//! - [`AuthSettings`] - `[auth]` admin credential
//! - [`BluetoothSettings`] - `[bluetooth]` short-range radio
//! - [`MqttSettings`] - `[mqtt]` messaging broker
//! - [`WebServerSettings`] - `[web_server]` HTTP endpoint
//! - [`TimeoutSettings`] - `[timeouts]`
//! - [`IntervalSettings`] - `[intervals]`
//!
//! Every field has a compiled-in default which is used whenever its entry is
//! missing or unreadable, so older files load against newer firmware.

pub mod manager;

pub use manager::{ConfigManager, ManagerState};

use std::fmt::Display;
use std::net::Ipv4Addr;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kvstore::Table;
use crate::logutil::escape_log;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
/// SHA-256 of `123456`.
pub const DEFAULT_PASSWORD_HASH: &str =
    "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92";
pub const DEFAULT_SESSION_MAX_AGE_SECS: u32 = 1800;
/// Number of entries [`SystemSettings::write_to_table`] writes. A table must
/// hold at least this many for settings to be saved.
pub const SETTINGS_ENTRY_COUNT: usize = 32;

const WIFI_AP: &str = "wifi_ap";
const WIFI_STA: &str = "wifi_sta";
const ETHERNET: &str = "ethernet";
const AUTH: &str = "auth";
const BLUETOOTH: &str = "bluetooth";
const MQTT: &str = "mqtt";
const WEB_SERVER: &str = "web_server";
const TIMEOUTS: &str = "timeouts";
const INTERVALS: &str = "intervals";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiApSettings {
    pub ssid: String,
    pub ip: Ipv4Addr,
    pub password: String,
}

impl Default for WifiApSettings {
    fn default() -> Self {
        Self {
            ssid: "Device-AP-01".to_string(),
            ip: Ipv4Addr::new(192, 168, 5, 1),
            password: "12345678".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiStaSettings {
    pub ssid: String,
    pub password: String,
}

impl Default for WifiStaSettings {
    fn default() -> Self {
        Self {
            ssid: "home-2G".to_string(),
            password: "changeme".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetSettings {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Default for EthernetSettings {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::new(192, 168, 1, 40),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            dns: Ipv4Addr::new(8, 8, 8, 8),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        }
    }
}

/// The single admin credential. `password_hash` is the lower-case hex SHA-256
/// of the plaintext, unsalted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    pub username: String,
    pub password_hash: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN_USERNAME.to_string(),
            password_hash: DEFAULT_PASSWORD_HASH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothSettings {
    pub device_name: String,
    pub pairing_password: String,
}

impl Default for BluetoothSettings {
    fn default() -> Self {
        Self {
            device_name: "Device-Ble-01".to_string(),
            pairing_password: "123456".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub default_topic: String,
    /// Seconds.
    pub keepalive: u16,
    pub topic_student_to_teacher: String,
    pub topic_teacher_to_student: String,
    pub topic_student_heartbeat: String,
    pub topic_student_status: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "device-01".to_string(),
            default_topic: "device/data/receive".to_string(),
            keepalive: 60,
            topic_student_to_teacher: "device/student/message".to_string(),
            topic_teacher_to_student: "cloud/teacher/message".to_string(),
            topic_student_heartbeat: "device/heartbeat".to_string(),
            topic_student_status: "device/status".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebServerSettings {
    pub port: u16,
}

impl Default for WebServerSettings {
    fn default() -> Self {
        Self { port: 80 }
    }
}

/// Timeouts in milliseconds, except `session_max_age` which is in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    pub mqtt_reconnect_timeout: u32,
    pub mqtt_connect_timeout: u32,
    pub mqtt_refresh_connection: u32,
    pub wifi_scan_timeout: u32,
    pub wifi_scan_advanced_timeout: u32,
    pub session_max_age: u32,
}

impl TimeoutSettings {
    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.session_max_age))
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            mqtt_reconnect_timeout: 10_000,
            mqtt_connect_timeout: 15_000,
            mqtt_refresh_connection: 30_000,
            wifi_scan_timeout: 5_000,
            wifi_scan_advanced_timeout: 10_000,
            session_max_age: DEFAULT_SESSION_MAX_AGE_SECS,
        }
    }
}

/// Periodic task intervals in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSettings {
    pub status_update_interval: u32,
    pub heartbeat_interval: u32,
    pub monitor_check_interval: u32,
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            status_update_interval: 5_000,
            heartbeat_interval: 5_000,
            monitor_check_interval: 10_000,
        }
    }
}

/// All recognized configuration domains. `Default` yields the compiled-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemSettings {
    pub wifi_ap: WifiApSettings,
    pub wifi_sta: WifiStaSettings,
    pub ethernet: EthernetSettings,
    pub auth: AuthSettings,
    pub bluetooth: BluetoothSettings,
    pub mqtt: MqttSettings,
    pub web_server: WebServerSettings,
    pub timeouts: TimeoutSettings,
    pub intervals: IntervalSettings,
}

impl SystemSettings {
    /// Map well-known `(section, key)` pairs to typed fields. Never fails.
    pub fn from_table(table: &Table) -> Self {
        let d = SystemSettings::default();
        let r = Reader { table };

        SystemSettings {
            wifi_ap: WifiApSettings {
                ssid: r.string(WIFI_AP, "ssid", &d.wifi_ap.ssid),
                ip: r.ipv4(WIFI_AP, "ip", d.wifi_ap.ip),
                password: r.string(WIFI_AP, "password", &d.wifi_ap.password),
            },
            wifi_sta: WifiStaSettings {
                ssid: r.string(WIFI_STA, "ssid", &d.wifi_sta.ssid),
                password: r.string(WIFI_STA, "password", &d.wifi_sta.password),
            },
            ethernet: EthernetSettings {
                ip: r.ipv4(ETHERNET, "ip", d.ethernet.ip),
                netmask: r.ipv4(ETHERNET, "netmask", d.ethernet.netmask),
                dns: r.ipv4(ETHERNET, "dns", d.ethernet.dns),
                gateway: r.ipv4(ETHERNET, "gateway", d.ethernet.gateway),
            },
            auth: AuthSettings {
                username: r.string(AUTH, "username", &d.auth.username),
                password_hash: r.string(AUTH, "password_hash", &d.auth.password_hash),
            },
            bluetooth: BluetoothSettings {
                device_name: r.string(BLUETOOTH, "device_name", &d.bluetooth.device_name),
                pairing_password: r.string(
                    BLUETOOTH,
                    "pairing_password",
                    &d.bluetooth.pairing_password,
                ),
            },
            mqtt: MqttSettings {
                broker_host: r.string(MQTT, "broker_host", &d.mqtt.broker_host),
                broker_port: r.num(MQTT, "broker_port", d.mqtt.broker_port),
                client_id: r.string(MQTT, "client_id", &d.mqtt.client_id),
                default_topic: r.string(MQTT, "default_topic", &d.mqtt.default_topic),
                keepalive: r.num(MQTT, "keepalive", d.mqtt.keepalive),
                topic_student_to_teacher: r.string(
                    MQTT,
                    "topic_student_to_teacher",
                    &d.mqtt.topic_student_to_teacher,
                ),
                topic_teacher_to_student: r.string(
                    MQTT,
                    "topic_teacher_to_student",
                    &d.mqtt.topic_teacher_to_student,
                ),
                topic_student_heartbeat: r.string(
                    MQTT,
                    "topic_student_heartbeat",
                    &d.mqtt.topic_student_heartbeat,
                ),
                topic_student_status: r.string(
                    MQTT,
                    "topic_student_status",
                    &d.mqtt.topic_student_status,
                ),
            },
            web_server: WebServerSettings {
                port: r.num(WEB_SERVER, "port", d.web_server.port),
            },
            timeouts: TimeoutSettings {
                mqtt_reconnect_timeout: r.num(
                    TIMEOUTS,
                    "mqtt_reconnect_timeout",
                    d.timeouts.mqtt_reconnect_timeout,
                ),
                mqtt_connect_timeout: r.num(
                    TIMEOUTS,
                    "mqtt_connect_timeout",
                    d.timeouts.mqtt_connect_timeout,
                ),
                mqtt_refresh_connection: r.num(
                    TIMEOUTS,
                    "mqtt_refresh_connection",
                    d.timeouts.mqtt_refresh_connection,
                ),
                wifi_scan_timeout: r.num(TIMEOUTS, "wifi_scan_timeout", d.timeouts.wifi_scan_timeout),
                wifi_scan_advanced_timeout: r.num(
                    TIMEOUTS,
                    "wifi_scan_advanced_timeout",
                    d.timeouts.wifi_scan_advanced_timeout,
                ),
                session_max_age: r.num(TIMEOUTS, "session_max_age", d.timeouts.session_max_age),
            },
            intervals: IntervalSettings {
                status_update_interval: r.num(
                    INTERVALS,
                    "status_update_interval",
                    d.intervals.status_update_interval,
                ),
                heartbeat_interval: r.num(
                    INTERVALS,
                    "heartbeat_interval",
                    d.intervals.heartbeat_interval,
                ),
                monitor_check_interval: r.num(
                    INTERVALS,
                    "monitor_check_interval",
                    d.intervals.monitor_check_interval,
                ),
            },
        }
    }

    /// Write every field into `table`. Existing entries keep their position;
    /// new ones are appended in declaration order.
    pub fn write_to_table(&self, table: &mut Table) -> Result<()> {
        table.set(WIFI_AP, "ssid", &self.wifi_ap.ssid)?;
        table.set(WIFI_AP, "ip", &self.wifi_ap.ip.to_string())?;
        table.set(WIFI_AP, "password", &self.wifi_ap.password)?;

        table.set(WIFI_STA, "ssid", &self.wifi_sta.ssid)?;
        table.set(WIFI_STA, "password", &self.wifi_sta.password)?;

        table.set(ETHERNET, "ip", &self.ethernet.ip.to_string())?;
        table.set(ETHERNET, "netmask", &self.ethernet.netmask.to_string())?;
        table.set(ETHERNET, "dns", &self.ethernet.dns.to_string())?;
        table.set(ETHERNET, "gateway", &self.ethernet.gateway.to_string())?;

        table.set(AUTH, "username", &self.auth.username)?;
        table.set(AUTH, "password_hash", &self.auth.password_hash)?;

        table.set(BLUETOOTH, "device_name", &self.bluetooth.device_name)?;
        table.set(BLUETOOTH, "pairing_password", &self.bluetooth.pairing_password)?;

        let m = &self.mqtt;
        table.set(MQTT, "broker_host", &m.broker_host)?;
        table.set_int(MQTT, "broker_port", m.broker_port)?;
        table.set(MQTT, "client_id", &m.client_id)?;
        table.set(MQTT, "default_topic", &m.default_topic)?;
        table.set_int(MQTT, "keepalive", m.keepalive)?;
        table.set(MQTT, "topic_student_to_teacher", &m.topic_student_to_teacher)?;
        table.set(MQTT, "topic_teacher_to_student", &m.topic_teacher_to_student)?;
        table.set(MQTT, "topic_student_heartbeat", &m.topic_student_heartbeat)?;
        table.set(MQTT, "topic_student_status", &m.topic_student_status)?;

        table.set_int(WEB_SERVER, "port", self.web_server.port)?;

        let t = &self.timeouts;
        table.set_int(TIMEOUTS, "mqtt_reconnect_timeout", t.mqtt_reconnect_timeout)?;
        table.set_int(TIMEOUTS, "mqtt_connect_timeout", t.mqtt_connect_timeout)?;
        table.set_int(TIMEOUTS, "mqtt_refresh_connection", t.mqtt_refresh_connection)?;
        table.set_int(TIMEOUTS, "wifi_scan_timeout", t.wifi_scan_timeout)?;
        table.set_int(TIMEOUTS, "wifi_scan_advanced_timeout", t.wifi_scan_advanced_timeout)?;
        table.set_int(TIMEOUTS, "session_max_age", t.session_max_age)?;

        let i = &self.intervals;
        table.set_int(INTERVALS, "status_update_interval", i.status_update_interval)?;
        table.set_int(INTERVALS, "heartbeat_interval", i.heartbeat_interval)?;
        table.set_int(INTERVALS, "monitor_check_interval", i.monitor_check_interval)?;

        Ok(())
    }
}

struct Reader<'a> {
    table: &'a Table,
}

impl Reader<'_> {
    fn string(&self, section: &str, key: &str, default: &str) -> String {
        self.table.get(section, key, default).to_string()
    }

    fn num<T>(&self, section: &str, key: &str, default: T) -> T
    where
        T: TryFrom<i64> + Into<i64> + Copy + Display,
    {
        let raw = self.table.get_int(section, key, default.into());
        T::try_from(raw).unwrap_or_else(|_| {
            warn!(
                "[{}] {} = {} is out of range, using {}",
                section, key, raw, default
            );
            default
        })
    }

    fn ipv4(&self, section: &str, key: &str, default: Ipv4Addr) -> Ipv4Addr {
        if !self.table.has(section, key) {
            return default;
        }
        let raw = self.table.get(section, key, "");
        raw.parse().unwrap_or_else(|_| {
            warn!(
                "[{}] {} = '{}' is not an IPv4 address, using {}",
                section,
                key,
                escape_log(raw),
                default
            );
            default
        })
    }
}
