//! MQTT client construction from transport configuration.
//!
//! `ClientBuilder` turns a validated [`Config`](crate::config::Config) plus
//! a broker address into a rumqttc `AsyncClient` and `EventLoop`. The two
//! must travel together: the client queues requests, the event loop pumps
//! them onto the wire. [`BrokerLink`](crate::link::BrokerLink) owns both
//! and is the intended consumer; the builder is public mainly so tests can
//! construct clients directly.

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use validator::Validate;

use super::{config::Config, error::LinkError};

/// Builder for a single MQTT client.
///
/// Consumed by `build()`, which hands back the client/event-loop pair.
pub struct ClientBuilder {
    opts: MqttOptions,
    cap: usize,
}

impl ClientBuilder {
    /// Creates a builder from transport settings and a broker address.
    ///
    /// Host and port come from the caller rather than the config because
    /// the forwarder re-reads them from its live settings on every
    /// delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Config` if the transport settings fail
    /// validation, or `LinkError::Setup` if only one half of the
    /// username/password pair is present.
    pub fn from_config(config: &Config, host: &str, port: u16) -> Result<Self, LinkError> {
        config.validate()?;

        // Empty client id would collide at the broker; generate one.
        let client_id = if config.client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            config.client_id.clone()
        };

        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_keep_alive(Duration::from_secs(config.keep_alive));
        opts.set_clean_session(config.clean_session);

        if let Some(max_packet_size) = config.max_packet_size {
            opts.set_max_packet_size(max_packet_size as usize, max_packet_size as usize);
        }

        match (&config.username, &config.password) {
            (Some(user), Some(pass)) => {
                opts.set_credentials(user.clone(), pass.clone());
            }
            (None, None) => {}
            _ => {
                return Err(LinkError::Setup(
                    "username and password must be provided together".into(),
                ));
            }
        }

        Ok(Self {
            opts,
            cap: config.request_channel_capacity.unwrap_or(10) as usize,
        })
    }

    /// Constructs the client and its event loop, consuming the builder.
    pub fn build(self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.opts, self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_from_default_config() {
        let config = Config::default();
        let builder = ClientBuilder::from_config(&config, "localhost", 1883).unwrap();
        assert_eq!(builder.cap, 10);

        let (client, _event_loop) = builder.build();
        assert!(!format!("{:?}", client).is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            keep_alive: 1, // below the 5 second minimum
            ..Default::default()
        };
        let result = ClientBuilder::from_config(&config, "localhost", 1883);
        assert!(matches!(result, Err(LinkError::Config(_))));
    }

    #[test]
    fn test_half_configured_credentials_rejected() {
        let config = Config {
            username: Some("user".to_string()),
            password: None,
            ..Default::default()
        };
        let result = ClientBuilder::from_config(&config, "localhost", 1883);
        assert!(matches!(result, Err(LinkError::Setup(_))));
    }

    #[test]
    fn test_full_credentials_accepted() {
        let config = Config {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        };
        assert!(ClientBuilder::from_config(&config, "localhost", 1883).is_ok());
    }

    #[test]
    fn test_request_channel_capacity_applied() {
        let config = Config {
            request_channel_capacity: Some(3),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config, "localhost", 1883).unwrap();
        assert_eq!(builder.cap, 3);
    }
}
