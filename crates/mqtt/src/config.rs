//! Transport configuration for the broker link.
//!
//! All fields have validation constraints specified as attributes and are
//! deserializable with serde, so the config slots directly into the host
//! application's TOML file. Validation is performed by `ClientBuilder`
//! before any network activity, so a bad config fails at load time rather
//! than at connect time.
//!
//! Note that the broker *address* is not configured here. The forwarder
//! treats host and port as live settings that may change between delivery
//! attempts, so they are passed to `ClientBuilder::from_config` alongside
//! this struct rather than frozen into it.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for a single outbound MQTT connection.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Unique identifier for this client.
    ///
    /// If empty, a UUID is generated at build time. Brokers use client ids
    /// to detect collisions and for audit logs.
    ///
    /// # Validation
    /// - Length: 0-36 characters (empty = generate a UUID)
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// How long to wait for the TCP connection and MQTT CONNACK before
    /// giving up, in seconds. A timeout is reported as a connect failure.
    ///
    /// # Validation
    /// - Range: 1-300 seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connection timeout must be between 1 and 300 seconds"
    ))]
    pub connection_timeout: u64,

    /// How long to wait for the broker's PUBACK after sending a QoS 1
    /// publish, in seconds. A timeout is reported as a publish failure and
    /// marks the link dead.
    ///
    /// # Validation
    /// - Range: 1-300 seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Publish timeout must be between 1 and 300 seconds"
    ))]
    pub publish_timeout: u64,

    /// Keep-alive interval in seconds. The client pings the broker at this
    /// interval when idle; the broker drops the connection if nothing
    /// arrives for 1.5x this long.
    ///
    /// # Validation
    /// - Range: 5-3600 seconds
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Whether to request a clean session from the broker.
    ///
    /// The link is publish-only and holds no subscriptions, so there is
    /// nothing for the broker to retain across reconnects; true is the
    /// sensible default.
    pub clean_session: bool,

    /// Maximum MQTT packet size in bytes, applied to both directions.
    /// Optional; rumqttc's default applies when unset.
    ///
    /// # Validation
    /// - Range: 64-65535 bytes
    #[validate(range(
        min = 64,
        max = 65535,
        message = "Max packet size must be between 64 and 65535 bytes"
    ))]
    pub max_packet_size: Option<u16>,

    /// Capacity of the client's internal request channel. The forwarder
    /// publishes serially, so a small value suffices.
    ///
    /// # Validation
    /// - Range: 1-255
    #[validate(range(
        min = 1,
        max = 255,
        message = "Request channel capacity must be between 1 and 255"
    ))]
    pub request_channel_capacity: Option<u8>,

    /// Optional broker username. Must be paired with `password`.
    pub username: Option<String>,

    /// Optional broker password. Must be paired with `username`.
    pub password: Option<String>,
}

impl Default for Config {
    /// Defaults matching the forwarder's expected deployment: short
    /// timeouts (10 s connect and publish), generated client id, clean
    /// session, no authentication.
    fn default() -> Self {
        Config {
            client_id: String::new(),
            connection_timeout: 10,
            publish_timeout: 10,
            keep_alive: 30,
            clean_session: true,
            max_packet_size: Some(65_535),
            request_channel_capacity: Some(10),
            username: None,
            password: None,
        }
    }
}

impl Config {
    /// Checks whether broker authentication is configured.
    ///
    /// Returns true only if BOTH username and password are present. A
    /// half-configured pair is rejected by `ClientBuilder`.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}
