//! Forwarder status side channel.
//!
//! The forwarder's transient user-facing notices ("connecting",
//! "connected", "could not connect, retrying") are modeled as a watch
//! channel of [`ForwarderStatus`] values. The daemon logs transitions;
//! an embedding application can subscribe and render them however it
//! likes. Nothing in the delivery path depends on anyone listening.

use std::fmt;

use tokio::sync::watch;
use tracing::debug;

/// What the forwarder is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwarderStatus {
    /// Forwarding is switched off; no connection is held.
    Disabled,

    /// A connection attempt to the broker is in progress.
    Connecting,

    /// Connected; the last delivery or drain went through.
    Connected,

    /// Delivery failed; messages are being cached until the retry timer
    /// clears the pause.
    Paused {
        /// The failure that triggered the pause.
        reason: String,
        /// Seconds until the retry fires.
        retry_in_secs: u64,
    },
}

impl ForwarderStatus {
    /// Short static identifier, for logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ForwarderStatus::Disabled => "Disabled",
            ForwarderStatus::Connecting => "Connecting",
            ForwarderStatus::Connected => "Connected",
            ForwarderStatus::Paused { .. } => "Paused",
        }
    }

    /// Contextual details; empty for states that carry none.
    pub fn details(&self) -> String {
        match self {
            ForwarderStatus::Paused {
                reason,
                retry_in_secs,
            } => format!("{reason}; retrying in {retry_in_secs} seconds"),
            _ => String::new(),
        }
    }

    /// True when the forwarder holds a working connection.
    pub fn is_connected(&self) -> bool {
        matches!(self, ForwarderStatus::Connected)
    }
}

impl fmt::Display for ForwarderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

/// Broadcast feed of forwarder status changes.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    tx: watch::Sender<ForwarderStatus>,
    rx: watch::Receiver<ForwarderStatus>,
}

impl StatusFeed {
    /// Creates a feed starting in the `Disabled` state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ForwarderStatus::Disabled);
        Self { tx, rx }
    }

    /// Returns a receiver for observing status changes.
    pub fn subscribe(&self) -> watch::Receiver<ForwarderStatus> {
        self.rx.clone()
    }

    /// The current status, without subscribing.
    pub fn current(&self) -> ForwarderStatus {
        self.rx.borrow().clone()
    }

    /// Publishes a new status. Unchanged values are not re-broadcast.
    pub fn set(&self, status: ForwarderStatus) {
        let changed = *self.rx.borrow() != status;
        if changed {
            debug!("Forwarder status: {}", status);
            let _ = self.tx.send(status);
        }
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new()
    }
}
