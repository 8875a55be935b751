//! Model loading and the shared model registry
//!
//! `ModelRegistry` holds one lazily-initialized slot per model task. The
//! first caller for a task triggers the load; concurrent callers wait on
//! the same initialization. Loads run in their own spawned task, so a
//! caller that gives up (timeout, dropped parse) never leaves a slot
//! half-initialized. A failed load is cached and the task stays
//! fallback-only until `reload()`.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(ModelRegistry::from_config(settings.models.clone()));
//! registry.warm_up().await;
//! let classifier = registry.intent().await?;
//! ```

pub mod http;
pub mod lexicon;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::OnceCell;

use dompet_config::{BackendKind, FieldModelConfig, ModelConfig};
use dompet_core::{EntityModel, Error, ModelTask, Result, TextClassifier};

pub use http::{HttpClassifier, HttpEntityModel, HttpModelClient};
pub use lexicon::{GazetteerEntityModel, LexiconClassifier};

/// Builds model backends from configuration
///
/// Tests substitute their own loader to inject mocks or failures.
#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    /// Load the intent or category classifier
    async fn load_classifier(
        &self,
        task: ModelTask,
        config: &FieldModelConfig,
    ) -> Result<Arc<dyn TextClassifier>>;

    /// Load the entity extractor
    async fn load_entity_model(&self, config: &FieldModelConfig) -> Result<Arc<dyn EntityModel>>;
}

/// Loader that picks the backend named in `FieldModelConfig::backend`
#[derive(Debug, Clone, Default)]
pub struct BackendLoader {
    client: reqwest::Client,
}

impl BackendLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn lexicon_path(task: ModelTask, config: &FieldModelConfig) -> Result<&str> {
    config
        .path
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::model_load(task, "no model path configured"))
}

#[async_trait]
impl ModelLoader for BackendLoader {
    async fn load_classifier(
        &self,
        task: ModelTask,
        config: &FieldModelConfig,
    ) -> Result<Arc<dyn TextClassifier>> {
        match config.backend {
            BackendKind::Lexicon => {
                let path = lexicon_path(task, config)?;
                let model = LexiconClassifier::load(task, path, config.display_id(task)).await?;
                Ok(Arc::new(model))
            },
            BackendKind::Http => {
                let client = HttpModelClient::new(task, config, self.client.clone())?;
                Ok(Arc::new(HttpClassifier::new(client)))
            },
            BackendKind::Disabled => Err(Error::model_load(task, "model disabled by configuration")),
        }
    }

    async fn load_entity_model(&self, config: &FieldModelConfig) -> Result<Arc<dyn EntityModel>> {
        let task = ModelTask::Entities;
        match config.backend {
            BackendKind::Lexicon => {
                let path = lexicon_path(task, config)?;
                let model = GazetteerEntityModel::load(path, config.display_id(task)).await?;
                Ok(Arc::new(model))
            },
            BackendKind::Http => {
                let client = HttpModelClient::new(task, config, self.client.clone())?;
                Ok(Arc::new(HttpEntityModel::new(client)))
            },
            BackendKind::Disabled => Err(Error::model_load(task, "model disabled by configuration")),
        }
    }
}

/// Loader for registries built from preloaded models; always fails
#[derive(Debug, Clone, Copy, Default)]
struct NoLoader;

#[async_trait]
impl ModelLoader for NoLoader {
    async fn load_classifier(
        &self,
        task: ModelTask,
        _config: &FieldModelConfig,
    ) -> Result<Arc<dyn TextClassifier>> {
        Err(Error::model_load(task, "no model provided"))
    }

    async fn load_entity_model(&self, _config: &FieldModelConfig) -> Result<Arc<dyn EntityModel>> {
        Err(Error::model_load(ModelTask::Entities, "no model provided"))
    }
}

/// Result of a slot initialization
enum Slot<T: ?Sized> {
    Ready { model: Arc<T>, model_id: String },
    Failed(Error),
}

impl<T: ?Sized> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Ready { model, model_id } => Slot::Ready {
                model: model.clone(),
                model_id: model_id.clone(),
            },
            Slot::Failed(error) => Slot::Failed(error.clone()),
        }
    }
}

impl<T: ?Sized> Slot<T> {
    fn into_result(self) -> Result<Arc<T>> {
        match self {
            Slot::Ready { model, .. } => Ok(model),
            Slot::Failed(error) => Err(error),
        }
    }

    fn status(&self) -> SlotStatus {
        match self {
            Slot::Ready { model_id, .. } => SlotStatus::Ready {
                model_id: model_id.clone(),
            },
            Slot::Failed(error) => SlotStatus::Failed {
                error: error.to_string(),
            },
        }
    }
}

type Cell<T> = Arc<OnceCell<Slot<T>>>;

/// Readiness of one model slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotStatus {
    /// Not loaded yet; the next parse triggers the load
    Uninitialized,
    Ready { model_id: String },
    /// Load failed; fallback-only until reload
    Failed { error: String },
}

impl SlotStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SlotStatus::Ready { .. })
    }
}

/// Shared, lazily loaded models
pub struct ModelRegistry {
    config: ModelConfig,
    loader: Arc<dyn ModelLoader>,
    intent: RwLock<Cell<dyn TextClassifier>>,
    category: RwLock<Cell<dyn TextClassifier>>,
    entities: RwLock<Cell<dyn EntityModel>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("status", &self.status())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(config: ModelConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            config,
            loader,
            intent: RwLock::new(Arc::new(OnceCell::new())),
            category: RwLock::new(Arc::new(OnceCell::new())),
            entities: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Registry backed by `BackendLoader`
    pub fn from_config(config: ModelConfig) -> Self {
        Self::new(config, Arc::new(BackendLoader::default()))
    }

    /// Registry with models already in place
    ///
    /// `None` slots behave like a failed load. `reload()` on such a registry
    /// leaves every slot failed.
    pub fn preloaded(
        intent: Option<Arc<dyn TextClassifier>>,
        category: Option<Arc<dyn TextClassifier>>,
        entities: Option<Arc<dyn EntityModel>>,
    ) -> Self {
        fn cell<T: ?Sized>(task: ModelTask, model: Option<(Arc<T>, String)>) -> Cell<T> {
            let slot = match model {
                Some((model, model_id)) => Slot::Ready { model, model_id },
                None => Slot::Failed(Error::model_load(task, "no model provided")),
            };
            Arc::new(OnceCell::new_with(Some(slot)))
        }

        Self {
            config: ModelConfig::default(),
            loader: Arc::new(NoLoader),
            intent: RwLock::new(cell(ModelTask::Intent, intent.map(|m| {
                let id = m.model_id().to_string();
                (m, id)
            }))),
            category: RwLock::new(cell(ModelTask::Category, category.map(|m| {
                let id = m.model_id().to_string();
                (m, id)
            }))),
            entities: RwLock::new(cell(ModelTask::Entities, entities.map(|m| {
                let id = m.model_id().to_string();
                (m, id)
            }))),
        }
    }

    /// Configuration the registry loads models with
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Resolve a slot, initializing it in a detached task if needed
    async fn resolve<T, F, Fut>(task: ModelTask, slot: &RwLock<Cell<T>>, init: F) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(Arc<T>, String)>> + Send + 'static,
    {
        let cell = slot.read().clone();
        if let Some(ready) = cell.get() {
            return ready.clone().into_result();
        }

        let handle = tokio::spawn(async move {
            cell.get_or_init(|| async move {
                match init().await {
                    Ok((model, model_id)) => Slot::Ready { model, model_id },
                    Err(e) => {
                        tracing::warn!(task = %task, error = %e, "Model load failed, field is fallback-only until reload");
                        Slot::Failed(e)
                    },
                }
            })
            .await
            .clone()
        });

        match handle.await {
            Ok(slot) => slot.into_result(),
            Err(e) => Err(Error::model_load(task, format!("model initialization aborted: {}", e))),
        }
    }

    pub async fn intent(&self) -> Result<Arc<dyn TextClassifier>> {
        self.classifier(ModelTask::Intent, &self.intent).await
    }

    pub async fn category(&self) -> Result<Arc<dyn TextClassifier>> {
        self.classifier(ModelTask::Category, &self.category).await
    }

    async fn classifier(
        &self,
        task: ModelTask,
        slot: &RwLock<Cell<dyn TextClassifier>>,
    ) -> Result<Arc<dyn TextClassifier>> {
        let loader = self.loader.clone();
        let config = self.config.field(task).clone();
        Self::resolve(task, slot, move || async move {
            let model = loader.load_classifier(task, &config).await?;
            let model_id = model.model_id().to_string();
            Ok((model, model_id))
        })
        .await
    }

    pub async fn entities(&self) -> Result<Arc<dyn EntityModel>> {
        let loader = self.loader.clone();
        let config = self.config.entities.clone();
        Self::resolve(ModelTask::Entities, &self.entities, move || async move {
            let model = loader.load_entity_model(&config).await?;
            let model_id = model.model_id().to_string();
            Ok((model, model_id))
        })
        .await
    }

    /// Load every model now instead of on first use
    pub async fn warm_up(&self) -> BTreeMap<ModelTask, SlotStatus> {
        let (intent, category, entities) =
            tokio::join!(self.intent(), self.category(), self.entities());
        for (task, ok) in [
            (ModelTask::Intent, intent.is_ok()),
            (ModelTask::Category, category.is_ok()),
            (ModelTask::Entities, entities.is_ok()),
        ] {
            tracing::info!(task = %task, ready = ok, "Model warm-up");
        }
        self.status()
    }

    /// Drop loaded models and cached failures; the next use reloads
    pub fn reload(&self) {
        *self.intent.write() = Arc::new(OnceCell::new());
        *self.category.write() = Arc::new(OnceCell::new());
        *self.entities.write() = Arc::new(OnceCell::new());
        tracing::info!("Model registry reset, models reload on next use");
    }

    fn slot_status<T: ?Sized>(slot: &RwLock<Cell<T>>) -> SlotStatus {
        match slot.read().get() {
            Some(s) => s.status(),
            None => SlotStatus::Uninitialized,
        }
    }

    pub fn status(&self) -> BTreeMap<ModelTask, SlotStatus> {
        BTreeMap::from([
            (ModelTask::Intent, Self::slot_status(&self.intent)),
            (ModelTask::Category, Self::slot_status(&self.category)),
            (ModelTask::Entities, Self::slot_status(&self.entities)),
        ])
    }
}
