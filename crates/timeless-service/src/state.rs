//! Shared service state.

use std::sync::Arc;

use timeless_store::RocksStore;

use crate::config::ServiceConfig;
use crate::providers::Providers;

/// State shared by every handler and the background sweeper.
pub struct AppState {
    /// Row storage.
    pub store: Arc<RocksStore>,

    /// Loaded configuration.
    pub config: ServiceConfig,

    /// Third-party provider adapters.
    pub providers: Providers,
}

impl AppState {
    /// Build state from an opened store and config. Provider adapters are
    /// constructed here from the configured keys and base URLs.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let providers = Providers::from_config(&config);

        Self {
            store,
            config,
            providers,
        }
    }
}
