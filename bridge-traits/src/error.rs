use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed payload: {0}")]
    Decode(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` when the failure happened on the wire (transport, status
    /// code or undecodable body).
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            BridgeError::OperationFailed(_) | BridgeError::Http { .. } | BridgeError::Decode(_)
        )
    }

    /// Returns `true` for an HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BridgeError::Http { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
