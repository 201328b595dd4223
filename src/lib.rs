//! Workspace placeholder crate.
//!
//! Exposes feature flags that map to the individual workspace crates. Host
//! applications can depend on `shelf-workspace` and pick either the full
//! desktop service (`desktop-shims`) or only the playback core
//! (`playback-only`) without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "playback-only")]
pub use core_playback as playback;
