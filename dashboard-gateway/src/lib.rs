pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use std::sync::Arc;

use config::Settings;
use services::{
    backend_client::BackendClient, identity_client::IdentityClient,
    identity_provider::IdentityProviderClient,
};

/// Shared application state containing settings and service clients
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub identity_client: Arc<IdentityClient>,
    pub identity_provider: Arc<IdentityProviderClient>,
    pub backend: Arc<BackendClient>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let identity_client = Arc::new(IdentityClient::new(settings.backend_api.clone()));
        let identity_provider =
            Arc::new(IdentityProviderClient::new(settings.identity_provider.clone()));
        let backend = Arc::new(BackendClient::new(settings.backend_api.clone()));

        Self {
            settings: Arc::new(settings),
            identity_client,
            identity_provider,
            backend,
        }
    }
}
