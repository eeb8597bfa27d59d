//! Error handling for the broker link.
//!
//! `LinkError` is the unified error type for everything this crate does:
//! building the client, dialing the broker, and publishing. The forwarder
//! treats every variant the same way — drop the link, cache the message,
//! pause — so the taxonomy exists for logging and diagnostics rather than
//! for per-variant recovery logic.

use thiserror::Error;

/// The unified error type for broker link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Client construction failed before any network activity.
    ///
    /// Typically a credentials pair with only one half configured.
    #[error("Client setup error: {0}")]
    Setup(String),

    /// Transport configuration failed validation.
    ///
    /// The `Config` struct enforces ranges on timeouts, keep-alive and
    /// packet size; this surfaces the specific violated constraint.
    #[error("Configuration error: {0}")]
    Config(#[from] validator::ValidationErrors),

    /// The local client could not queue a request.
    ///
    /// Raised by rumqttc when the request channel is closed or full —
    /// usually a sign the link is already dead.
    #[error("Client request error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// The connection to the broker failed or was lost.
    ///
    /// Covers TCP errors, TLS problems, protocol violations and broker
    /// disconnects surfaced by the event loop.
    ///
    /// Boxed to keep the enum small; `ConnectionError` is large.
    #[error("Connection error: {0}")]
    Connection(#[from] Box<rumqttc::ConnectionError>),

    /// The broker answered CONNECT with a refusal code.
    ///
    /// Bad credentials, rejected client id, or broker overload. The code
    /// is preserved for the log line.
    #[error("Broker refused connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),

    /// A protocol exchange did not complete within its deadline.
    ///
    /// The payload names the awaited packet ("CONNACK" or "PUBACK").
    /// Treated as an ordinary connect/publish failure by callers.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The link is not connected and cannot carry the request.
    #[error("Link is not connected")]
    NotConnected,
}

/// Boxes rumqttc's ConnectionError on conversion to keep `LinkError` small.
impl From<rumqttc::ConnectionError> for LinkError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        LinkError::Connection(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_display() {
        let err = LinkError::Setup("username without password".into());
        assert_eq!(
            err.to_string(),
            "Client setup error: username without password"
        );
    }

    #[test]
    fn test_timeout_display_names_packet() {
        assert_eq!(
            LinkError::Timeout("CONNACK").to_string(),
            "Timed out waiting for CONNACK"
        );
        assert_eq!(
            LinkError::Timeout("PUBACK").to_string(),
            "Timed out waiting for PUBACK"
        );
    }

    #[test]
    fn test_refused_display_includes_code() {
        let err = LinkError::Refused(rumqttc::ConnectReturnCode::NotAuthorized);
        assert!(err.to_string().contains("NotAuthorized"));
    }

    #[test]
    fn test_connection_error_is_boxed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let link_err: LinkError = rumqttc::ConnectionError::Io(io_err).into();
        assert!(matches!(link_err, LinkError::Connection(_)));
    }

    #[test]
    fn test_link_error_is_std_error() {
        let err: Box<dyn std::error::Error> = Box::new(LinkError::NotConnected);
        assert_eq!(err.to_string(), "Link is not connected");
    }
}
