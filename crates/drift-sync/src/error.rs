use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum SyncError {
    #[error("peer not found: {0}")]
    PeerNotFound(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("batch codec failed: {0}")]
    Codec(String),
    #[error("transport disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, SyncError>;
