//! tagrelay — MQTT forwarding relay for environmental sensor readings
//!
//! This crate implements the store-and-forward core of a sensor gateway:
//! decoded tag readings come in through a single `forward` entry point,
//! are rendered into the gateway wire format, and are published to an
//! MQTT broker. When the broker is unreachable, messages are cached on
//! disk in minute/sensor bucket files and replayed — oldest evicted by
//! age and by total size — once connectivity returns.
//!
//! ## Modules
//!
//! * `config` — Configuration structures, loading, validation, and
//!   defaults. Supports TOML configuration files with validation via the
//!   `validator` crate.
//!
//! * `core` — Core runtime components:
//!   - The forwarding engine (live delivery, pause/retry, drain)
//!   - Wire message formatting
//!   - The on-disk cache and its filename codec
//!   - The settings seam the host application mutates at runtime
//!   - The status side channel
//!
//! * `logger` — Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! The broker transport itself lives in the `tagrelay-mqtt` workspace
//! member and is consumed through the `Uplink` seam in `core::forwarder`.

pub mod config;
pub mod core;
pub mod logger;
