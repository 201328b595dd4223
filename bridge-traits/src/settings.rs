//! Settings Storage Abstraction
//!
//! Key-value preference storage (UserDefaults, SharedPreferences, a desktop
//! SQLite file). The playback core keeps its rate preference here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{BridgeError, Result};

/// Key-value settings storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::settings::SettingsStore;
///
/// async fn remember_rate(store: &dyn SettingsStore) -> Result<()> {
///     store.set_f64("playback.rate", 1.5).await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a floating-point value
    async fn set_f64(&self, key: &str, value: f64) -> Result<()> {
        self.set_string(key, &value.to_string()).await
    }

    /// Retrieve a floating-point value
    async fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get_string(key).await? {
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|e| BridgeError::Settings(format!("{} is not a number: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local settings store.
///
/// Used when the host does not inject a persistent store, and in tests.
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| BridgeError::Settings("settings lock poisoned".to_string()))
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
