//! The forwarding settings seam.
//!
//! The forwarder re-reads its configuration on every `forward` attempt —
//! the surrounding application owns the values and may flip them at any
//! time (most importantly the enabled switch). That boundary is expressed
//! as the [`ForwardingSettings`] trait; [`SharedSettings`] is the
//! process-local implementation the daemon mutates at runtime, and tests
//! inject their own.

use std::sync::{Arc, RwLock};

use crate::config::forwarding::ForwardingConfig;

/// A point-in-time view of the forwarding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingSnapshot {
    /// Master switch. When false, `forward` tears down any live
    /// connection and does nothing else.
    pub enabled: bool,
    /// Broker hostname or IP.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// This gateway's identifier, MAC form. Used as `gw_mac` in messages
    /// and as the middle segment of the publish topic.
    pub gateway_id: String,
}

impl From<&ForwardingConfig> for ForwardingSnapshot {
    fn from(config: &ForwardingConfig) -> Self {
        Self {
            enabled: config.enabled,
            host: config.host.clone(),
            port: config.port,
            gateway_id: config.gateway_id.clone(),
        }
    }
}

/// Source of forwarding configuration, consulted once per operation.
pub trait ForwardingSettings: Send + Sync {
    /// Returns the current configuration values.
    fn snapshot(&self) -> ForwardingSnapshot;
}

/// Shared, mutable settings for in-process use.
///
/// Cheap to clone; all clones observe the same values. Mutations take
/// effect on the forwarder's next operation without any restart.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    shared: Arc<RwLock<ForwardingSnapshot>>,
}

impl SharedSettings {
    /// Creates settings holding the given initial snapshot.
    pub fn new(snapshot: ForwardingSnapshot) -> Self {
        Self {
            shared: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Flips the forwarding-enabled switch.
    pub fn set_enabled(&self, enabled: bool) {
        if let Ok(mut guard) = self.shared.write() {
            guard.enabled = enabled;
        }
    }

    /// Replaces the broker address.
    pub fn set_broker(&self, host: impl Into<String>, port: u16) {
        if let Ok(mut guard) = self.shared.write() {
            guard.host = host.into();
            guard.port = port;
        }
    }

    /// Replaces the whole snapshot.
    pub fn replace(&self, snapshot: ForwardingSnapshot) {
        if let Ok(mut guard) = self.shared.write() {
            *guard = snapshot;
        }
    }
}

impl ForwardingSettings for SharedSettings {
    fn snapshot(&self) -> ForwardingSnapshot {
        self.shared
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ForwardingSnapshot {
        ForwardingSnapshot {
            enabled: true,
            host: "broker.local".to_string(),
            port: 1883,
            gateway_id: "11:22:33:44:55:66".to_string(),
        }
    }

    #[test]
    fn test_snapshot_reflects_initial_values() {
        let settings = SharedSettings::new(snapshot());
        assert_eq!(settings.snapshot(), snapshot());
    }

    #[test]
    fn test_set_enabled_takes_effect_on_next_snapshot() {
        let settings = SharedSettings::new(snapshot());
        settings.set_enabled(false);
        assert!(!settings.snapshot().enabled);
        settings.set_enabled(true);
        assert!(settings.snapshot().enabled);
    }

    #[test]
    fn test_clones_share_state() {
        let settings = SharedSettings::new(snapshot());
        let observer = settings.clone();
        settings.set_broker("other.host", 8883);
        assert_eq!(observer.snapshot().host, "other.host");
        assert_eq!(observer.snapshot().port, 8883);
    }

    #[test]
    fn test_replace_swaps_everything() {
        let settings = SharedSettings::new(snapshot());
        let mut next = snapshot();
        next.gateway_id = "AA:BB:CC:DD:EE:FF".to_string();
        next.enabled = false;
        settings.replace(next.clone());
        assert_eq!(settings.snapshot(), next);
    }
}
