#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("Failed to decode payload under key {key}: {source}")]
    PayloadDecode {
        key: String,
        #[source]
        source: prost::DecodeError,
    },
    #[error("Invalid gossip configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Gossip loop already started")]
    AlreadyStarted,
}
