use serde::Deserialize;

/// Top-level configuration settings for a load-test run.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub tls: TlsSettings,
    pub tracker: TrackerSettings,
    pub reconnect: ReconnectSettings,
    pub load: LoadSettings,
    pub log: LogSettings,
}

/// Where and how every simulated thing connects.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Capacity of the per-thing request queue handed to the MQTT client.
    pub request_capacity: usize,
}

/// TLS material passed through to the protocol session.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub enabled: bool,
    pub ca_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub tls_version: Option<String>,
    pub ciphers: Option<String>,
    pub alpn: Vec<String>,
}

/// Timeout policy of the operation tracker. A timeout of 0 never expires;
/// a sweep interval of 0 disables the background sweep.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSettings {
    pub publish_timeout_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectSettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Shape of the simulated fleet and of each thing's behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct LoadSettings {
    pub users: usize,
    pub hatch_rate: f64,
    pub duration_secs: u64,
    pub on_start_delay_ms: u64,
    pub wait_time_ms: u64,
    pub topic: String,
    pub subscribe_topic: Option<String>,
    pub qos: u8,
    pub payload: String,
    pub client_id_prefix: String,
    pub report_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: 20,
            clean_session: true,
            username: None,
            password: None,
            request_capacity: 100,
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 10_000,
            subscribe_timeout_ms: 15_000,
            sweep_interval_ms: 1_000,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            users: 10,
            hatch_rate: 1.0,
            duration_secs: 60,
            on_start_delay_ms: 5_000,
            wait_time_ms: 1_000,
            topic: "things/{thing}/telemetry".to_string(),
            subscribe_topic: None,
            qos: 0,
            payload: r#"{"id":"0"}"#.to_string(),
            client_id_prefix: "thing".to_string(),
            report_path: None,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Partial configuration loaded from files or environment.
///
/// Every section and every field is optional; missing values are filled
/// from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub tls: Option<PartialTlsSettings>,
    pub tracker: Option<PartialTrackerSettings>,
    pub reconnect: Option<PartialReconnectSettings>,
    pub load: Option<PartialLoadSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub keep_alive_secs: Option<u64>,
    pub clean_session: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTlsSettings {
    pub enabled: Option<bool>,
    pub ca_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub tls_version: Option<String>,
    pub ciphers: Option<String>,
    pub alpn: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTrackerSettings {
    pub publish_timeout_ms: Option<u64>,
    pub subscribe_timeout_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialReconnectSettings {
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoadSettings {
    pub users: Option<usize>,
    pub hatch_rate: Option<f64>,
    pub duration_secs: Option<u64>,
    pub on_start_delay_ms: Option<u64>,
    pub wait_time_ms: Option<u64>,
    pub topic: Option<String>,
    pub subscribe_topic: Option<String>,
    pub qos: Option<u8>,
    pub payload: Option<String>,
    pub client_id_prefix: Option<String>,
    pub report_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        Settings {
            broker: self.broker.unwrap_or_default().merge(default.broker),
            tls: self.tls.unwrap_or_default().merge(default.tls),
            tracker: self.tracker.unwrap_or_default().merge(default.tracker),
            reconnect: self.reconnect.unwrap_or_default().merge(default.reconnect),
            load: self.load.unwrap_or_default().merge(default.load),
            log: self.log.unwrap_or_default().merge(default.log),
        }
    }
}

impl PartialBrokerSettings {
    fn merge(self, default: BrokerSettings) -> BrokerSettings {
        BrokerSettings {
            host: self.host.unwrap_or(default.host),
            port: self.port.unwrap_or(default.port),
            keep_alive_secs: self.keep_alive_secs.unwrap_or(default.keep_alive_secs),
            clean_session: self.clean_session.unwrap_or(default.clean_session),
            username: self.username.or(default.username),
            password: self.password.or(default.password),
            request_capacity: self.request_capacity.unwrap_or(default.request_capacity),
        }
    }
}

impl PartialTlsSettings {
    fn merge(self, default: TlsSettings) -> TlsSettings {
        TlsSettings {
            enabled: self.enabled.unwrap_or(default.enabled),
            ca_path: self.ca_path.or(default.ca_path),
            client_cert_path: self.client_cert_path.or(default.client_cert_path),
            client_key_path: self.client_key_path.or(default.client_key_path),
            tls_version: self.tls_version.or(default.tls_version),
            ciphers: self.ciphers.or(default.ciphers),
            alpn: self.alpn.unwrap_or(default.alpn),
        }
    }
}

impl PartialTrackerSettings {
    fn merge(self, default: TrackerSettings) -> TrackerSettings {
        TrackerSettings {
            publish_timeout_ms: self.publish_timeout_ms.unwrap_or(default.publish_timeout_ms),
            subscribe_timeout_ms: self.subscribe_timeout_ms.unwrap_or(default.subscribe_timeout_ms),
            sweep_interval_ms: self.sweep_interval_ms.unwrap_or(default.sweep_interval_ms),
        }
    }
}

impl PartialReconnectSettings {
    fn merge(self, default: ReconnectSettings) -> ReconnectSettings {
        ReconnectSettings {
            initial_backoff_ms: self.initial_backoff_ms.unwrap_or(default.initial_backoff_ms),
            max_backoff_ms: self.max_backoff_ms.unwrap_or(default.max_backoff_ms),
        }
    }
}

impl PartialLoadSettings {
    fn merge(self, default: LoadSettings) -> LoadSettings {
        LoadSettings {
            users: self.users.unwrap_or(default.users),
            hatch_rate: self.hatch_rate.unwrap_or(default.hatch_rate),
            duration_secs: self.duration_secs.unwrap_or(default.duration_secs),
            on_start_delay_ms: self.on_start_delay_ms.unwrap_or(default.on_start_delay_ms),
            wait_time_ms: self.wait_time_ms.unwrap_or(default.wait_time_ms),
            topic: self.topic.unwrap_or(default.topic),
            subscribe_topic: self.subscribe_topic.or(default.subscribe_topic),
            qos: self.qos.unwrap_or(default.qos),
            payload: self.payload.unwrap_or(default.payload),
            client_id_prefix: self.client_id_prefix.unwrap_or(default.client_id_prefix),
            report_path: self.report_path.or(default.report_path),
        }
    }
}

impl PartialLogSettings {
    fn merge(self, default: LogSettings) -> LogSettings {
        LogSettings {
            level: self.level.unwrap_or(default.level),
        }
    }
}
