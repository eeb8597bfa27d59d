//! The forwarding engine: live delivery, store-and-forward, retry.
//!
//! One [`Forwarder`] owns one broker connection (at most), the paused
//! flag, and the single retry timer slot. All three live behind one
//! `tokio::sync::Mutex`, so `forward`, `drain`, and the retry callback
//! serialize — two overlapping calls can never race on connect/disconnect.
//!
//! The contract of [`Forwarder::forward`] is that it never fails from the
//! caller's point of view: every reading is either delivered live or
//! written to exactly one cache file, and the rare unrecoverable paths
//! (render failure, cache write failure) are logged and dropped. Network
//! trouble flips the forwarder into a paused state in which readings go
//! straight to disk until a retry timer clears the pause and a drain pass
//! replays the backlog.
//!
//! The broker side is abstracted behind the [`Uplink`]/[`UplinkDialer`]
//! pair so tests can script delivery outcomes; [`BrokerDialer`] is the
//! production implementation on top of `tagrelay_mqtt::BrokerLink`.

use std::{sync::Arc, time::Duration};

use tagrelay_mqtt::{BrokerLink, Config as TransportConfig, LinkError};
use time::OffsetDateTime;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::{
    cache::{BucketRecord, ReadingCache},
    reading,
    settings::{ForwardingSettings, ForwardingSnapshot},
    status::{ForwarderStatus, StatusFeed},
};

/// First segment of every publish topic.
const TOPIC_NAMESPACE: &str = "ruuvi";

/// Builds the publish topic for a reading: `ruuvi/<gateway>/<source>`.
pub fn topic_for(gateway_id: &str, source_id: &str) -> String {
    format!("{TOPIC_NAMESPACE}/{gateway_id}/{source_id}")
}

/// A held broker connection, as the forwarder sees it.
#[async_trait::async_trait]
pub trait Uplink: Send {
    /// Whether the connection still considers itself usable.
    fn is_connected(&self) -> bool;

    /// Delivers one payload to a topic, acknowledged.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError>;

    /// Best-effort teardown, consuming the connection.
    async fn disconnect(self: Box<Self>);
}

/// Creates uplinks on demand from the current broker address.
#[async_trait::async_trait]
pub trait UplinkDialer: Send + Sync {
    /// Connects to the broker, returning a ready uplink.
    async fn dial(&self, host: &str, port: u16) -> Result<Box<dyn Uplink>, LinkError>;
}

#[async_trait::async_trait]
impl Uplink for BrokerLink {
    fn is_connected(&self) -> bool {
        BrokerLink::is_connected(self)
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        BrokerLink::publish(self, topic, payload).await
    }

    async fn disconnect(self: Box<Self>) {
        BrokerLink::disconnect(*self).await;
    }
}

/// Production dialer: dials a `BrokerLink` with fixed transport settings
/// and whatever host/port the forwarder's settings currently hold.
pub struct BrokerDialer {
    transport: TransportConfig,
}

impl BrokerDialer {
    pub fn new(transport: TransportConfig) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl UplinkDialer for BrokerDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<Box<dyn Uplink>, LinkError> {
        let link = BrokerLink::dial(&self.transport, host, port).await?;
        Ok(Box::new(link))
    }
}

/// Mutable forwarder state, serialized behind the mutex.
#[derive(Default)]
struct State {
    link: Option<Box<dyn Uplink>>,
    paused: bool,
    retry: Option<JoinHandle<()>>,
}

struct Core {
    settings: Arc<dyn ForwardingSettings>,
    dialer: Arc<dyn UplinkDialer>,
    cache: ReadingCache,
    status: StatusFeed,
    retry_interval: Duration,
    state: Mutex<State>,
}

/// The forwarding engine. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Forwarder {
    core: Arc<Core>,
}

impl Forwarder {
    /// Creates a forwarder over the given settings seam, dialer and cache.
    ///
    /// `retry_interval` is how long the forwarder stays paused after a
    /// delivery failure before the (single) retry timer clears the pause
    /// and triggers a drain.
    pub fn new(
        settings: Arc<dyn ForwardingSettings>,
        dialer: Arc<dyn UplinkDialer>,
        cache: ReadingCache,
        retry_interval: Duration,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                settings,
                dialer,
                cache,
                status: StatusFeed::new(),
                retry_interval,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Subscribes to the forwarder's status side channel.
    pub fn status(&self) -> watch::Receiver<ForwarderStatus> {
        self.core.status.subscribe()
    }

    /// Forwards one decoded sensor reading.
    ///
    /// Never returns an error: every failure mode is absorbed here.
    /// Disabled forwarding tears down any live connection and does
    /// nothing else; a paused forwarder caches without touching the
    /// network; otherwise the reading is delivered live (connecting
    /// lazily) and a successful publish opportunistically drains the
    /// cache backlog over the same connection.
    pub async fn forward(&self, payload: &[u8], rssi: i32, source_id: &str) {
        let snapshot = self.core.settings.snapshot();
        let mut state = self.core.state.lock().await;

        if !snapshot.enabled {
            // Disabling resets the forwarder: no connection may outlive
            // the enabled flag, and a pending retry has nothing to retry.
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
            state.paused = false;
            self.release_link(&mut state).await;
            self.core.status.set(ForwarderStatus::Disabled);
            return;
        }

        let now = OffsetDateTime::now_utc();
        let message =
            match reading::render(payload, rssi, &snapshot.gateway_id, now.unix_timestamp()) {
                Ok(message) => message,
                Err(e) => {
                    error!("Failed to render reading from {}: {}", source_id, e);
                    return;
                }
            };

        if state.paused {
            self.release_link(&mut state).await;
            self.store(&message, source_id, now);
            return;
        }

        let topic = topic_for(&snapshot.gateway_id, source_id);
        match self.deliver(&mut state, &snapshot, &topic, &message).await {
            Ok(()) => {
                debug!("Published reading from {} to {}", source_id, topic);
                self.drain_locked(&mut state).await;
            }
            Err(e) => {
                warn!("Delivery to {} failed: {}", topic, e);
                self.store(&message, source_id, now);
                self.pause(&mut state, e.to_string()).await;
            }
        }
    }

    /// Runs a drain pass: evict, then replay and delete cached files.
    ///
    /// Called opportunistically after successful publishes and by the
    /// retry timer; embedders may also call it when they learn the broker
    /// is back some other way.
    pub async fn drain(&self) {
        let mut state = self.core.state.lock().await;
        self.drain_locked(&mut state).await;
    }

    /// Cancels the retry timer and releases the connection.
    pub async fn shutdown(&self) {
        let mut state = self.core.state.lock().await;
        if let Some(retry) = state.retry.take() {
            retry.abort();
        }
        self.release_link(&mut state).await;
    }

    /// Ensures a live link, then publishes one message.
    async fn deliver(
        &self,
        state: &mut State,
        snapshot: &ForwardingSnapshot,
        topic: &str,
        message: &str,
    ) -> Result<(), LinkError> {
        self.ensure_link(state, snapshot).await?;
        match state.link.as_mut() {
            Some(link) => link.publish(topic, message.as_bytes()).await,
            None => Err(LinkError::NotConnected),
        }
    }

    /// Lazily connects, replacing a link that reports not-connected.
    async fn ensure_link(
        &self,
        state: &mut State,
        snapshot: &ForwardingSnapshot,
    ) -> Result<(), LinkError> {
        if state.link.as_ref().is_some_and(|link| !link.is_connected()) {
            debug!("Dropping stale broker link before reconnecting");
            self.release_link(state).await;
        }
        if state.link.is_none() {
            self.core.status.set(ForwarderStatus::Connecting);
            info!("Connecting to broker at {}:{}", snapshot.host, snapshot.port);
            let link = self.core.dialer.dial(&snapshot.host, snapshot.port).await?;
            state.link = Some(link);
            self.core.status.set(ForwarderStatus::Connected);
        }
        Ok(())
    }

    async fn release_link(&self, state: &mut State) {
        if let Some(link) = state.link.take() {
            link.disconnect().await;
            debug!("Broker link released");
        }
    }

    /// Persists a message to the cache. A write failure loses the message,
    /// which is accepted, but it must be visible in the logs.
    fn store(&self, message: &str, source_id: &str, now: OffsetDateTime) {
        if let Err(e) = self.core.cache.append(message, source_id, now) {
            error!("Failed to cache message for {}: {}", source_id, e);
        }
    }

    /// Enters the paused state: drop the link, arm the retry timer.
    async fn pause(&self, state: &mut State, reason: String) {
        state.paused = true;
        self.release_link(state).await;
        self.core.status.set(ForwarderStatus::Paused {
            reason,
            retry_in_secs: self.core.retry_interval.as_secs(),
        });
        self.schedule_retry(state);
    }

    /// Arms the retry timer. Single-slot: a newly scheduled retry aborts
    /// and replaces any pending one, so timers never accumulate.
    fn schedule_retry(&self, state: &mut State) {
        if let Some(previous) = state.retry.take() {
            previous.abort();
        }
        let this = self.clone();
        let delay = self.core.retry_interval;
        state.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.retry_elapsed().await;
        }));
    }

    /// Retry callback: clear the pause and drain. Reconnection happens
    /// inside the drain (or the next `forward`), not here.
    async fn retry_elapsed(&self) {
        debug!("Retry interval elapsed, resuming delivery");
        let mut state = self.core.state.lock().await;
        state.retry = None;
        state.paused = false;
        self.drain_locked(&mut state).await;
    }

    async fn drain_locked(&self, state: &mut State) {
        let snapshot = self.core.settings.snapshot();
        if !snapshot.enabled {
            return;
        }

        // Evict first so stale or oversized content is never replayed.
        let now = OffsetDateTime::now_utc();
        if let Err(e) = self.core.cache.evict(now) {
            warn!("Cache eviction failed: {}", e);
        }

        let records = match self.core.cache.scan() {
            Ok(records) => records,
            Err(e) => {
                warn!("Cache scan failed: {}", e);
                return;
            }
        };
        if records.is_empty() {
            state.paused = false;
            return;
        }

        info!("Draining {} cached file(s)", records.len());
        if let Err(e) = self.ensure_link(state, &snapshot).await {
            warn!("Could not connect for cache drain: {}", e);
            self.pause(state, e.to_string()).await;
            return;
        }

        for record in &records {
            if !self.replay_file(state, &snapshot, record).await {
                return;
            }
        }

        state.paused = false;
        self.core.status.set(ForwarderStatus::Connected);
    }

    /// Replays one cache file, deleting it only after every fragment went
    /// through. Returns false when the pass must abort because a publish
    /// failed and the forwarder re-entered pause.
    async fn replay_file(
        &self,
        state: &mut State,
        snapshot: &ForwardingSnapshot,
        record: &BucketRecord,
    ) -> bool {
        let fragments = match self.core.cache.read_fragments(&record.path) {
            Ok(fragments) => fragments,
            Err(e) => {
                // Corrupt content is fatal to the file, not to the pass.
                warn!(
                    "Corrupt cache file {}, deleting: {}",
                    record.path.display(),
                    e
                );
                if let Err(e) = self.core.cache.remove(&record.path) {
                    warn!("Failed to delete corrupt cache file: {}", e);
                }
                return true;
            }
        };

        let topic = topic_for(&snapshot.gateway_id, &record.key.source_id);
        for fragment in &fragments {
            let outcome = match state.link.as_mut() {
                Some(link) => link.publish(&topic, fragment.as_bytes()).await,
                None => Err(LinkError::NotConnected),
            };
            if let Err(e) = outcome {
                // Whole-file retry: a mid-file failure keeps the file for
                // the next pass, so already-sent fragments may repeat
                // (QoS 1 delivery allows duplicates).
                warn!(
                    "Replay to {} failed, keeping {}: {}",
                    topic,
                    record.path.display(),
                    e
                );
                self.pause(state, e.to_string()).await;
                return false;
            }
        }

        debug!(
            "Replayed {} message(s) from {}",
            fragments.len(),
            record.path.display()
        );
        if let Err(e) = self.core.cache.remove(&record.path) {
            warn!(
                "Failed to delete replayed cache file {}: {}",
                record.path.display(),
                e
            );
        }
        true
    }

    #[cfg(test)]
    async fn retry_armed(&self) -> bool {
        self.core.state.lock().await.retry.is_some()
    }

    #[cfg(test)]
    async fn is_paused(&self) -> bool {
        self.core.state.lock().await.paused
    }
}
