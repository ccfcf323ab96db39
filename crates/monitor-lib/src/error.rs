//! Error taxonomy for the monitoring pipeline
//!
//! Connection failures are fatal at startup, stream failures trigger a
//! bounded reconnect, derivation failures skip the affected sample.

use thiserror::Error;

/// Failure to resolve the container or reach the engine.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("container {id} not found")]
    ContainerNotFound { id: String },

    #[error("engine unreachable at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid engine endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("engine returned status {status} for container {id}: {message}")]
    Api {
        id: String,
        status: u16,
        message: String,
    },
}

/// Failure while consuming the open-ended stats stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The container stopped or the engine closed the stream.
    #[error("stats stream ended")]
    Ended,

    /// A record that does not deserialize as a stats snapshot.
    #[error("malformed stats record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("stream transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure to derive metrics from an otherwise well-formed snapshot.
///
/// Signals a schema mismatch with the runtime; the deriver fails loudly
/// instead of substituting zeros for fields that should be present.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("missing field {0} in stats record")]
    MissingField(&'static str),
}
