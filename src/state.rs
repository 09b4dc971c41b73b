//! Application state: engine, backends, model client and the question store.
//!
//! This module owns:
//!   - the generation engine (with the TOML config or defaults)
//!   - the local backend, always available
//!   - the remote backend, only when OPENAI_API_KEY is set
//!   - the question repository

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{load_config_from_env, ServiceConfig};
use crate::domain::BackendKind;
use crate::engine::backend::GenerationBackend;
use crate::engine::local::LocalBackend;
use crate::engine::remote::RemoteBackend;
use crate::engine::Engine;
use crate::openai::{ModelClient, OpenAI};
use crate::repository::{MemoryQuestionRepository, QuestionRepository};

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub local: Arc<dyn GenerationBackend>,
    pub remote: Option<Arc<dyn GenerationBackend>>,
    pub repository: Arc<dyn QuestionRepository>,
}

impl AppState {
    /// Build state from env: load config, init OpenAI, create the store.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env().unwrap_or_default();

        let model: Option<Arc<dyn ModelClient>> = match OpenAI::from_env() {
            Some(oa) => {
                info!(target: "questgen_backend", base_url = %oa.base_url, model = %oa.model, "OpenAI enabled.");
                Some(Arc::new(oa))
            }
            None => {
                info!(target: "questgen_backend", "OpenAI disabled (no OPENAI_API_KEY). Remote requests use the local backend.");
                None
            }
        };

        Self::with_parts(config, model, Arc::new(MemoryQuestionRepository::new()))
    }

    /// Assemble state from explicit parts (used by `new` and by tests).
    pub fn with_parts(
        config: ServiceConfig,
        model: Option<Arc<dyn ModelClient>>,
        repository: Arc<dyn QuestionRepository>,
    ) -> Self {
        info!(
            target: "questgen_backend",
            max_questions = config.limits.max_questions,
            concurrency = config.generation.concurrency,
            fallback_to_local = config.fallback_to_local,
            "Engine configured"
        );
        let remote = model.map(|client| {
            Arc::new(RemoteBackend::new(client, config.prompts.clone(), config.generation.clone()))
                as Arc<dyn GenerationBackend>
        });
        Self {
            engine: Engine::new(config),
            local: Arc::new(LocalBackend),
            remote,
            repository,
        }
    }

    /// The backend for a kind, if it is configured.
    pub fn backend(&self, kind: BackendKind) -> Option<Arc<dyn GenerationBackend>> {
        match kind {
            BackendKind::Local => Some(self.local.clone()),
            BackendKind::Remote => self.remote.clone(),
        }
    }
}
