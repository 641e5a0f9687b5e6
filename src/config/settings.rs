use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::utils::error::SettingsError;

/// Hub name used on both sides of the wire when nothing else is configured.
pub const DEFAULT_HUB_NAME: &str = "ObservationDeckHub";

/// Top-level configuration settings for the application.
///
/// Includes settings for the hub server, the resilient publisher and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub publisher: PublisherSettings,
    pub log: LogSettings,
}

/// Configuration settings for the hub server.
///
/// Defines the address the WebSocket server binds to and the hub name it
/// answers to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub hub_name: String,
}

/// Configuration settings for the resilient publisher.
///
/// `hub_url` has no default: a publisher without an endpoint must not start.
#[derive(Debug, Deserialize, Clone)]
pub struct PublisherSettings {
    pub hub_url: Option<String>,
    pub hub_name: String,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub invoke_timeout_ms: u64,
    pub session_retry_attempts: u32,
    pub session_retry_delay_ms: u64,
    /// Pause before a queued message that failed on a live session is retried.
    pub drain_retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub publisher: Option<PartialPublisherSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub hub_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPublisherSettings {
    pub hub_url: Option<String>,
    pub hub_name: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub invoke_timeout_ms: Option<u64>,
    pub session_retry_attempts: Option<u32>,
    pub session_retry_delay_ms: Option<u64>,
    pub drain_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                hub_name: DEFAULT_HUB_NAME.to_string(),
            },
            publisher: PublisherSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            hub_url: None,
            hub_name: DEFAULT_HUB_NAME.to_string(),
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 10_000,
            invoke_timeout_ms: 10_000,
            session_retry_attempts: 3,
            session_retry_delay_ms: 1000,
            drain_retry_delay_ms: 1000,
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server;
        let publisher = self.publisher;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                hub_name: server
                    .as_ref()
                    .and_then(|s| s.hub_name.clone())
                    .unwrap_or(default.server.hub_name),
            },
            publisher: PublisherSettings {
                hub_url: publisher
                    .as_ref()
                    .and_then(|p| p.hub_url.clone())
                    .filter(|url| !url.trim().is_empty()),
                hub_name: publisher
                    .as_ref()
                    .and_then(|p| p.hub_name.clone())
                    .unwrap_or(default.publisher.hub_name),
                reconnect_delay_ms: publisher
                    .as_ref()
                    .and_then(|p| p.reconnect_delay_ms)
                    .unwrap_or(default.publisher.reconnect_delay_ms),
                connect_timeout_ms: publisher
                    .as_ref()
                    .and_then(|p| p.connect_timeout_ms)
                    .unwrap_or(default.publisher.connect_timeout_ms),
                invoke_timeout_ms: publisher
                    .as_ref()
                    .and_then(|p| p.invoke_timeout_ms)
                    .unwrap_or(default.publisher.invoke_timeout_ms),
                session_retry_attempts: publisher
                    .as_ref()
                    .and_then(|p| p.session_retry_attempts)
                    .unwrap_or(default.publisher.session_retry_attempts),
                session_retry_delay_ms: publisher
                    .as_ref()
                    .and_then(|p| p.session_retry_delay_ms)
                    .unwrap_or(default.publisher.session_retry_delay_ms),
                drain_retry_delay_ms: publisher
                    .as_ref()
                    .and_then(|p| p.drain_retry_delay_ms)
                    .unwrap_or(default.publisher.drain_retry_delay_ms),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}

impl Settings {
    /// Validated hub endpoint for the publisher.
    ///
    /// A missing or malformed `publisher.hub_url` is a fatal startup
    /// condition; callers are expected to abort on `Err`.
    pub fn hub_endpoint(&self) -> Result<Url, SettingsError> {
        let raw = self
            .publisher
            .hub_url
            .as_deref()
            .ok_or(SettingsError::MissingEndpoint)?;

        let url = Url::parse(raw).map_err(|e| SettingsError::InvalidEndpoint {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(SettingsError::InvalidEndpoint {
                    url: raw.to_string(),
                    reason: format!("unsupported scheme '{other}', expected ws or wss"),
                });
            }
        }

        if url.host_str().is_none() {
            return Err(SettingsError::InvalidEndpoint {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(url)
    }
}

impl PublisherSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    pub fn session_retry_delay(&self) -> Duration {
        Duration::from_millis(self.session_retry_delay_ms)
    }

    pub fn drain_retry_delay(&self) -> Duration {
        Duration::from_millis(self.drain_retry_delay_ms)
    }
}
