//! Error types for the Audiobookshelf provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Audiobookshelf provider errors
#[derive(Error, Debug)]
pub enum AudiobookshelfError {
    /// Token missing, expired or revoked
    #[error("Authentication failed (status {status_code}): {message}")]
    AuthenticationFailed { status_code: u16, message: String },

    /// API request returned an error
    #[error("Audiobookshelf API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Item, session or progress record does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Audiobookshelf operations
pub type Result<T> = std::result::Result<T, AudiobookshelfError>;

impl AudiobookshelfError {
    /// Classifies a non-2xx response.
    pub fn from_status(status_code: u16, resource: &str, body: String) -> Self {
        match status_code {
            401 | 403 => AudiobookshelfError::AuthenticationFailed {
                status_code,
                message: body,
            },
            404 => AudiobookshelfError::NotFound {
                resource: resource.to_string(),
            },
            _ => AudiobookshelfError::ApiError {
                status_code,
                message: body,
            },
        }
    }
}

impl From<AudiobookshelfError> for BridgeError {
    fn from(error: AudiobookshelfError) -> Self {
        match error {
            AudiobookshelfError::AuthenticationFailed {
                status_code,
                message,
            } => BridgeError::Http {
                status: status_code,
                message: format!("Authentication failed: {}", message),
            },
            AudiobookshelfError::ApiError {
                status_code,
                message,
            } => BridgeError::Http {
                status: status_code,
                message,
            },
            AudiobookshelfError::NotFound { resource } => BridgeError::Http {
                status: 404,
                message: format!("{} not found", resource),
            },
            AudiobookshelfError::ParseError(msg) => BridgeError::Decode(msg),
            AudiobookshelfError::BridgeError(e) => e,
        }
    }
}
