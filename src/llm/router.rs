//! Per-call provider resolution.
//!
//! Resolution order: environment-configured key, then a stored credential of
//! type `"anthropic"`, else mock mode. Stored credentials are consulted on
//! every call so a credential created at runtime takes effect without a
//! restart.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::store::Store;

use super::{
    AnthropicConfig, AnthropicProvider, CompletionRequest, LlmError, LlmProvider, MockProvider,
};

pub struct LlmRouter {
    env_provider: Option<AnthropicProvider>,
    store: Arc<dyn Store>,
    mock: MockProvider,
    base_url: Option<String>,
}

impl LlmRouter {
    pub fn new(
        api_key: Option<String>,
        base_url: Option<String>,
        store: Arc<dyn Store>,
        mock: MockProvider,
    ) -> Self {
        let env_provider = api_key.map(|key| {
            let mut config = AnthropicConfig::new(key);
            if let Some(url) = &base_url {
                config.base_url = url.clone();
            }
            AnthropicProvider::new(config)
        });
        LlmRouter {
            env_provider,
            store,
            mock,
            base_url,
        }
    }

    async fn stored_provider(&self) -> Option<AnthropicProvider> {
        let credentials = self.store.list_credentials().await.ok()?;
        let credential = credentials
            .into_iter()
            .find(|c| c.credential_type == "anthropic")?;
        let api_key = credential.data.get("apiKey")?.as_str()?.to_string();
        let mut config = AnthropicConfig::new(api_key);
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        Some(AnthropicProvider::new(config))
    }
}

#[async_trait]
impl LlmProvider for LlmRouter {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if let Some(provider) = &self.env_provider {
            return provider.complete(request).await;
        }
        if let Some(provider) = self.stored_provider().await {
            return provider.complete(request).await;
        }
        debug!(model = %request.model, "no credential configured, using mock provider");
        self.mock.complete(request).await
    }
}
