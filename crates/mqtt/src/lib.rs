//! tagrelay-mqtt — single-connection MQTT publish link.
//!
//! This crate wraps `rumqttc` into the narrow shape the tagrelay forwarder
//! needs: one broker connection at a time, created lazily, driven inline
//! until CONNACK/PUBACK, and dropped whole on any failure. There is no
//! background event-loop task and no subscription handling — the forwarder
//! is publish-only and owns the link for the duration of each delivery.
//!
//! ## Modules
//!
//! * `config` — Transport settings (client id, keep-alive, timeouts,
//!   credentials), validated with the `validator` crate. Broker host and
//!   port are deliberately *not* part of this config: the forwarder
//!   re-reads them from its settings seam on every attempt.
//!
//! * `client` — `ClientBuilder`, turning a validated config plus a
//!   host/port pair into a rumqttc `AsyncClient` and `EventLoop`.
//!
//! * `link` — `BrokerLink`, the connected handle: `dial`, `publish`,
//!   `disconnect`. Any poll error or timeout marks the link dead.
//!
//! * `error` — `LinkError`, the unified error type for all of the above.

pub mod client;
pub mod config;
pub mod error;
pub mod link;

pub use client::ClientBuilder;
pub use config::Config;
pub use error::LinkError;
pub use link::BrokerLink;
