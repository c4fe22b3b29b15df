//! Application state shared across handlers.

use crate::metrics::MeteredStore;
use nimbus_core::config::AppConfig;
use nimbus_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend, wrapped for metrics.
    pub storage: Arc<dyn ObjectStore>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The backend is wrapped in a [`MeteredStore`] so listing traffic shows
    /// up in the Prometheus counters.
    pub fn new(config: AppConfig, storage: Arc<dyn ObjectStore>) -> Self {
        Self {
            config: Arc::new(config),
            storage: Arc::new(MeteredStore::new(storage)),
        }
    }
}
