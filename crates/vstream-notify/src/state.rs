//! Application state.

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::catalog::{CatalogResult, MemoryCatalog};
use crate::config::NotifyConfig;
use crate::notifier::Notifier;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: NotifyConfig,
    pub catalog: Arc<MemoryCatalog>,
    pub verifier: Arc<TokenVerifier>,
    pub notifier: Notifier,
}

impl AppState {
    /// Load the catalog seed (if configured) and start the notifier.
    pub async fn new(config: NotifyConfig) -> CatalogResult<Self> {
        let catalog = match &config.catalog_seed_path {
            Some(path) => MemoryCatalog::load(path).await?,
            None => MemoryCatalog::new(),
        };
        Ok(Self::with_catalog(config, Arc::new(catalog)))
    }

    /// Build state around an existing catalog.
    pub fn with_catalog(config: NotifyConfig, catalog: Arc<MemoryCatalog>) -> Self {
        let verifier = TokenVerifier::new(&config.auth_sign_key, &config.upload_sign_key);
        let notifier = Notifier::start(config.ws.clone(), catalog.clone(), catalog.clone());

        Self {
            config,
            catalog,
            verifier: Arc::new(verifier),
            notifier,
        }
    }
}
