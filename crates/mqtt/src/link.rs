//! The broker link: one connection, driven inline.
//!
//! `BrokerLink` holds a rumqttc client and its event loop together and
//! drives the loop only while an operation is outstanding: `dial` polls
//! until CONNACK (or the connect timeout), `publish` sends at QoS 1 and
//! polls until PUBACK (or the publish timeout). There is no background
//! task — between operations the link is quiescent, which matches the
//! forwarder's serialized, publish-only access pattern.
//!
//! Failure handling is deliberately blunt: any poll error, refusal, or
//! timeout marks the link not-connected, and the caller is expected to
//! drop it and dial a fresh one. A half-dead link is never nursed back.
//!
//! # Usage
//!
//! ```ignore
//! let mut link = BrokerLink::dial(&config, "broker.local", 1883).await?;
//! link.publish("ruuvi/gw/tag", payload).await?;
//! link.disconnect().await; // best-effort DISCONNECT
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Packet, QoS};
use tracing::{debug, trace, warn};

use super::{client::ClientBuilder, config::Config, error::LinkError};

/// A connected (or once-connected) broker link.
///
/// At most one should exist per forwarder. Not `Clone`: the event loop is
/// single-owner, and sharing the link would break the serialized
/// request/acknowledge protocol it implements.
pub struct BrokerLink {
    client: AsyncClient,
    event_loop: EventLoop,
    connected: bool,
    publish_timeout: Duration,
}

impl BrokerLink {
    /// Dials the broker and waits for a successful CONNACK.
    ///
    /// # Errors
    ///
    /// - `LinkError::Config` / `LinkError::Setup` if the transport config
    ///   is unusable
    /// - `LinkError::Refused` if the broker answered with a refusal code
    /// - `LinkError::Timeout("CONNACK")` if nothing arrived within the
    ///   configured connection timeout
    /// - `LinkError::Connection` for transport-level failures
    pub async fn dial(config: &Config, host: &str, port: u16) -> Result<Self, LinkError> {
        let (client, event_loop) = ClientBuilder::from_config(config, host, port)?.build();

        let mut link = Self {
            client,
            event_loop,
            connected: false,
            publish_timeout: Duration::from_secs(config.publish_timeout),
        };

        debug!("Dialing broker at {}:{}", host, port);
        let connect_timeout = Duration::from_secs(config.connection_timeout);
        match tokio::time::timeout(connect_timeout, link.await_connack()).await {
            Ok(Ok(())) => {
                link.connected = true;
                debug!("Broker link established to {}:{}", host, port);
                Ok(link)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LinkError::Timeout("CONNACK")),
        }
    }

    /// Polls the event loop until the connection handshake resolves.
    async fn await_connack(&mut self) -> Result<(), LinkError> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        Ok(())
                    } else {
                        Err(LinkError::Refused(ack.code))
                    };
                }
                Ok(event) => trace!("Event before CONNACK: {:?}", event),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Whether the link believes itself connected.
    ///
    /// Cleared by any publish failure or observed disconnect; a false
    /// value tells the owner to drop this link and dial a new one.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Publishes a payload at QoS 1 and waits for the broker's PUBACK.
    ///
    /// On any failure the link marks itself not-connected before
    /// returning, so the caller's drop-and-redial logic engages.
    ///
    /// # Errors
    ///
    /// - `LinkError::NotConnected` if the link was already marked dead
    /// - `LinkError::Timeout("PUBACK")` if the ack did not arrive in time
    /// - `LinkError::Client` / `LinkError::Connection` for queue and
    ///   transport failures
    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;

        match tokio::time::timeout(self.publish_timeout, self.await_puback()).await {
            Ok(Ok(())) => {
                trace!("PUBACK received for topic {}", topic);
                Ok(())
            }
            Ok(Err(e)) => {
                self.connected = false;
                Err(e)
            }
            Err(_) => {
                self.connected = false;
                Err(LinkError::Timeout("PUBACK"))
            }
        }
    }

    /// Polls the event loop until the outstanding publish is acknowledged.
    async fn await_puback(&mut self) -> Result<(), LinkError> {
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Disconnected by broker while awaiting PUBACK");
                    return Err(LinkError::NotConnected);
                }
                Ok(event) => trace!("Event while awaiting PUBACK: {:?}", event),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sends a best-effort DISCONNECT and consumes the link.
    ///
    /// Errors are logged and swallowed; the connection closes either way
    /// once the link is dropped.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("Error queueing disconnect packet: {:?}", e);
            return;
        }
        // Give the event loop a moment to flush the DISCONNECT.
        let _ = tokio::time::timeout(Duration::from_millis(250), async {
            loop {
                if self.event_loop.poll().await.is_err() {
                    break;
                }
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_unreachable_broker_times_out() {
        let config = Config {
            connection_timeout: 1,
            ..Default::default()
        };
        // TEST-NET-1 address, nothing listens there.
        let result = BrokerLink::dial(&config, "192.0.2.1", 1883).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_on_dead_link_reports_not_connected() {
        let config = Config::default();
        let (client, event_loop) =
            ClientBuilder::from_config(&config, "localhost", 1883)
                .unwrap()
                .build();
        let mut link = BrokerLink {
            client,
            event_loop,
            connected: false,
            publish_timeout: Duration::from_secs(1),
        };

        let result = link.publish("ruuvi/gw/tag", b"{}").await;
        assert!(matches!(result, Err(LinkError::NotConnected)));
    }
}
