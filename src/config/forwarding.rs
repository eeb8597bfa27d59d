//! Forwarding and cache configuration structures.
//!
//! These are the values the forwarder re-reads on every delivery attempt
//! (through the settings seam) plus the cache bounds that are fixed at
//! startup. All structures support serde and carry validation rules
//! enforced by the `validator` crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Forwarding configuration: the master switch, the broker address, this
/// gateway's identity, the retry interval, and the cache bounds.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Master switch. When false, received readings are dropped and any
    /// live broker connection is torn down.
    pub enabled: bool,

    /// Broker hostname or IP address.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    /// Broker port.
    #[validate(range(min = 1, message = "Port must not be zero"))]
    pub port: u16,

    /// This gateway's identifier. Must be MAC-shaped: six hex octet
    /// pairs joined by `:` or `-`. Used as `gw_mac` in every message and
    /// as the middle topic segment.
    #[validate(custom(function = "validate_gateway_id"))]
    pub gateway_id: String,

    /// Seconds the forwarder stays paused after a delivery failure
    /// before the retry timer clears the pause and triggers a drain.
    ///
    /// # Validation
    /// - Range: 1-86400 seconds
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Retry interval must be between 1 second and 24 hours"
    ))]
    pub retry_interval_secs: u64,

    /// Store-and-forward cache bounds.
    #[validate(nested)]
    pub cache: CacheConfig,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        ForwardingConfig {
            enabled: false,
            host: "localhost".to_string(),
            port: 1883,
            gateway_id: "00:00:00:00:00:00".to_string(),
            retry_interval_secs: 60,
            cache: CacheConfig::default(),
        }
    }
}

/// Bounds for the on-disk cache of undelivered messages.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory under which the `MQTTData` cache directory is created.
    pub state_dir: PathBuf,

    /// Retention ceiling in hours. Cache files strictly older than this
    /// are deleted before any replay.
    ///
    /// # Validation
    /// - Range: 1-8760 hours (one year)
    #[validate(range(
        min = 1,
        max = 8760,
        message = "Retention must be between 1 hour and 1 year"
    ))]
    pub retention_hours: u64,

    /// Size ceiling in bytes for the whole cache directory. Once
    /// exceeded, the oldest files are evicted until the total fits.
    ///
    /// # Validation
    /// - Range: 4 KiB - 1 GiB
    #[validate(range(
        min = 4096,
        max = 1_073_741_824,
        message = "Cache size ceiling must be between 4 KiB and 1 GiB"
    ))]
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            state_dir: PathBuf::from("/var/lib/tagrelay"),
            retention_hours: 24,
            max_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Validates that the gateway id is MAC-shaped: six pairs of hex digits
/// joined by a single `:` or `-`.
fn validate_gateway_id(id: &str) -> Result<(), ValidationError> {
    let octets: Vec<&str> = id.split([':', '-']).collect();
    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));

    if well_formed {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_gateway_id");
        err.message = Some(format!("Gateway id is not MAC-shaped: {}", id).into());
        Err(err)
    }
}
