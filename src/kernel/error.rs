//! Connector-specific error types.
//!
//! Each variant is a distinct failure kind. Variants involving an edge carry
//! the canonical names (`module:connector`) of both endpoints so a failure
//! can be diagnosed from the log line alone.

use thiserror::Error;

/// Errors raised by the connector protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Kind or payload type mismatch detected by `connectable`/`lazy_connectable`.
    #[error("Connection between {here} and {there} failed: connectors are incompatible")]
    ConnectorsIncompatible { here: String, there: String },

    /// Structural violation or internal failure while mutating the connection lists.
    #[error("Connection between {here} and {there} failed: {reason}")]
    ConnectionFailed {
        here: String,
        there: String,
        reason: String,
    },

    /// The edge is recorded on one side only.
    #[error("Connection between {here} and {there} is invalid: edge is not symmetric")]
    ConnectionInvalid { here: String, there: String },

    #[error("Unable to disconnect {here} from {there}: {reason}")]
    DisconnectFailed {
        here: String,
        there: String,
        reason: String,
    },

    #[error("Could not subscribe to signal \"{signal}\" of {connector}: {reason}")]
    SignalSubscriptionFailed {
        connector: String,
        signal: String,
        reason: String,
    },

    /// The owning module has already been dropped.
    #[error("The module owning {connector} no longer exists")]
    ModuleLockFailed { connector: String },
}

pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_both_names() {
        let err = ConnectorError::ConnectionFailed {
            here: "src:out".to_string(),
            there: "dst:in".to_string(),
            reason: "input connector already connected".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("src:out"));
        assert!(msg.contains("dst:in"));
        assert!(msg.contains("already connected"));
    }

    #[test]
    fn test_incompatible_display() {
        let err = ConnectorError::ConnectorsIncompatible {
            here: "a:in".to_string(),
            there: "b:in".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Connection between a:in and b:in failed: connectors are incompatible"
        );
    }
}
