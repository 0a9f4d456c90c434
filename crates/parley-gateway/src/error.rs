//! Error types for the inference gateway.

use parley_core::ParleyError;

/// Errors from calls to the remote inference service.
///
/// Every variant counts as a network-or-model failure from the session's
/// point of view; the split exists for logging.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("gateway misconfigured: {0}")]
    Config(String),
    #[error("no scripted response for {0}")]
    Unscripted(&'static str),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

impl From<GatewayError> for ParleyError {
    fn from(err: GatewayError) -> Self {
        ParleyError::Gateway(err.to_string())
    }
}
