use crate::server::auth::{build_client_factory, ClientFactory};
use crate::server::settings::Settings;
use anyhow::Result;
use std::sync::Arc;

/// Full state for HTTP server
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client_factory: Arc<dyn ClientFactory>,
}

impl AppState {
    /// Initialize state for the HTTP server
    pub async fn new_for_server(settings: Settings) -> Result<Self> {
        tracing::info!("Initializing AppState for HTTP server");

        let client_factory = build_client_factory(&settings).await?;
        tracing::info!(
            auth_method = %client_factory.method(),
            "Initialized Kubernetes client factory"
        );

        Ok(Self::with_factory(settings, client_factory))
    }

    pub fn with_factory(settings: Settings, client_factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            settings: Arc::new(settings),
            client_factory,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State backed by a freshly seeded mock cluster
    pub(crate) fn mock() -> Self {
        use crate::server::auth::factory::MockClientFactory;
        use crate::server::kubernetes::MockClient;

        let settings = Settings::default();
        let factory = MockClientFactory::new(&settings.auth.user_id_header, MockClient::new());
        Self::with_factory(settings, Arc::new(factory))
    }
}
