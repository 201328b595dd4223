//! # Audiobookshelf Provider
//!
//! Implements the `MediaServer` bridge for the Audiobookshelf REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Item details with server-declared tracks or raw audio files
//! - Listening session start, sync and close
//! - Durable media progress (read and write)
//! - Bearer-token authentication through the injected `HttpClient`

pub mod connector;
pub mod error;
pub mod types;

pub use connector::AudiobookshelfConnector;
pub use error::{AudiobookshelfError, Result};
