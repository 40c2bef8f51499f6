//! Application wiring shared by the HTTP server and the CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use crate::error::StoreError;
use crate::llm::providers::openai::LMSTUDIO_DEFAULT_URL;
use crate::llm::{
    CompletionGateway, LlmGateway, ProviderAvailability, ProviderRegistry, ProvidersConfig,
};
use crate::pipeline::{PipelineConfig, PipelineEngine};
use crate::scheduler::AutopilotScheduler;
use crate::storage::StoreHandle;
use crate::task::{Settings, SettingsPatch, StreamEntry, Task, TaskLifecycle, WisdomMemory};

/// Operator view of the store: tasks, the approved stream and the wisdom log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    pub tasks: Vec<Task>,
    pub stream: Vec<StreamEntry>,
    pub wisdom_log: WisdomMemory,
}

/// One store, one gateway and the services built on top of them.
pub struct Polyplex {
    store: StoreHandle,
    gateway: Arc<dyn CompletionGateway>,
    engine: Arc<PipelineEngine>,
    lifecycle: Arc<TaskLifecycle>,
    scheduler: Arc<AutopilotScheduler>,
}

impl Polyplex {
    /// `registry_default` is the provider used when settings name none.
    pub fn new(
        store: StoreHandle,
        gateway: Arc<dyn CompletionGateway>,
        config: PipelineConfig,
        registry_default: impl Into<String>,
    ) -> Self {
        let autopilot_window = config.autopilot_wisdom_window;
        let engine = Arc::new(PipelineEngine::new(store.clone(), Arc::clone(&gateway), config));
        let lifecycle = Arc::new(TaskLifecycle::new(
            store.clone(),
            Arc::clone(&engine),
            registry_default,
        ));
        let scheduler = Arc::new(AutopilotScheduler::new(
            store.clone(),
            Arc::clone(&lifecycle),
            autopilot_window,
        ));

        Self {
            store,
            gateway,
            engine,
            lifecycle,
            scheduler,
        }
    }

    /// Build providers and pipeline settings from the environment over a JSON store.
    pub fn from_env(store_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let providers = ProvidersConfig::from_env();
        let registry =
            ProviderRegistry::from_config(&providers).context("Failed to initialize providers")?;
        let registry_default = registry.default_provider().to_string();
        let gateway: Arc<dyn CompletionGateway> = Arc::new(LlmGateway::new(Arc::new(registry)));

        let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
        config.validate().context("Invalid pipeline configuration")?;

        let store_path = store_path.into();
        tracing::info!(store = %store_path.display(), "Using JSON document store");
        Ok(Self::new(
            StoreHandle::json_file(store_path),
            gateway,
            config,
            registry_default,
        ))
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn engine(&self) -> &Arc<PipelineEngine> {
        &self.engine
    }

    pub fn lifecycle(&self) -> &Arc<TaskLifecycle> {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &Arc<AutopilotScheduler> {
        &self.scheduler
    }

    pub async fn state(&self) -> Result<StateView, StoreError> {
        let doc = self.store.snapshot().await?;
        Ok(StateView {
            tasks: doc.tasks,
            stream: doc.stream,
            wisdom_log: doc.wisdom_log,
        })
    }

    pub async fn settings(&self) -> Result<Settings, StoreError> {
        Ok(self.store.snapshot().await?.settings)
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, StoreError> {
        let settings = self
            .store
            .mutate(move |doc| {
                doc.settings.apply(patch);
                doc.settings.clone()
            })
            .await?;
        tracing::info!(
            provider = %settings.default_provider,
            auto_approve = settings.auto_approve,
            threshold = settings.auto_approve_threshold,
            "Settings updated"
        );
        Ok(settings)
    }

    /// Provider availability. Gateways without a registry report only the default.
    pub fn providers(&self) -> ProviderAvailability {
        self.gateway.availability().unwrap_or_else(|| ProviderAvailability {
            openai: false,
            gemini: false,
            lmstudio: false,
            openrouter: false,
            default_provider: self.lifecycle.registry_default().to_string(),
            lmstudio_url: LMSTUDIO_DEFAULT_URL.to_string(),
        })
    }
}
