use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Peer registry rejected at startup (duplicate ids, self-reference).
    #[error("invalid peer configuration: {0}")]
    InvalidConfig(String),

    /// Inbound message rejected at the boundary, before touching any state.
    #[error("malformed message from {sender:?}: {reason}")]
    MalformedMessage { sender: String, reason: String },

    /// A single peer delivery failed. Never fatal to the fan-out.
    #[error("send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },

    #[error("send to {peer} timed out after {timeout_ms}ms")]
    SendTimeout { peer: String, timeout_ms: u64 },

    /// The transport has no route for the peer's address.
    #[error("no route to {addr}")]
    NoRoute { addr: String },
}
