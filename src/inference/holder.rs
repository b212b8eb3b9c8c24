use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{error, info, Instrument, Span};

use crate::error::ScanError;
use crate::inference::engine::{ModelLoader, OcrEngine};
use crate::inference::generation_config::GenerationConfig;

/// An initialized engine together with the decoding parameters used for it.
pub struct LoadedModel {
    pub engine: Arc<dyn OcrEngine>,
    pub generation: GenerationConfig,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    /// No model has been loaded in this process yet.
    Cold,
    /// A model is loaded and ready to serve.
    Warm,
}

/// Owns the process-wide model. The model is loaded at most once per process,
/// on the first call to [`ModelHolder::initialize`], and lives until the holder
/// is dropped.
pub struct ModelHolder {
    loader: Arc<dyn ModelLoader>,
    model: Arc<OnceCell<LoadedModel>>,
    loads: Arc<AtomicUsize>,
}

impl ModelHolder {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            model: Arc::new(OnceCell::new()),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the loaded model, running the cold start if needed.
    ///
    /// The load runs on its own task, so a caller that gives up waiting does
    /// not cancel it. Concurrent and later callers during a cold start wait on
    /// that same load. A failed load leaves the holder cold so a later call
    /// retries it.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn initialize(&self) -> Result<&LoadedModel, ScanError> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let model = Arc::clone(&self.model);
        let loader = Arc::clone(&self.loader);
        let loads = Arc::clone(&self.loads);
        let load = tokio::spawn(
            async move {
                model
                    .get_or_try_init(|| load_model(loader.as_ref(), &loads))
                    .await
                    .map(|_| ())
            }
            .instrument(Span::current()),
        );

        load.await
            .map_err(|err| ScanError::ModelLoad(anyhow!("model load task failed: {err}")))??;
        self.model
            .get()
            .ok_or_else(|| ScanError::ModelLoad(anyhow!("model missing after load")))
    }

    pub fn is_ready(&self) -> bool {
        self.model.initialized()
    }

    pub fn state(&self) -> ModelState {
        if self.is_ready() {
            ModelState::Warm
        } else {
            ModelState::Cold
        }
    }

    /// Number of successful loads, never more than one.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

async fn load_model(
    loader: &dyn ModelLoader,
    loads: &AtomicUsize,
) -> Result<LoadedModel, ScanError> {
    info!("Cold start, loading model");
    let start = Instant::now();
    let engine = loader.load().await.map_err(|err| {
        error!(error = %err, "Model failed to load");
        ScanError::ModelLoad(err)
    })?;
    loads.fetch_add(1, Ordering::SeqCst);
    info!(elapsed = ?start.elapsed(), "Model loaded");

    Ok(LoadedModel {
        engine,
        generation: GenerationConfig::OCR,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use anyhow::{bail, Result};
    use axum::async_trait;

    use super::*;
    use crate::inference::engine::{PromptInput, RequestOutput};

    struct EchoEngine;

    #[async_trait]
    impl OcrEngine for EchoEngine {
        async fn generate(
            &self,
            inputs: &[PromptInput],
            _config: &GenerationConfig,
        ) -> Result<Vec<RequestOutput>> {
            Ok(inputs
                .iter()
                .map(|input| RequestOutput::from_texts([input.image_url.clone()]))
                .collect())
        }
    }

    /// Fails the first load, succeeds afterwards.
    #[derive(Default)]
    struct FlakyLoader {
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl ModelLoader for FlakyLoader {
        async fn load(&self) -> Result<Arc<dyn OcrEngine>> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                bail!("weights unavailable");
            }
            Ok(Arc::new(EchoEngine))
        }
    }

    #[tokio::test]
    async fn failed_load_stays_cold_and_is_retried() {
        let holder = ModelHolder::new(FlakyLoader::default());
        assert_eq!(holder.state(), ModelState::Cold);

        let err = holder.initialize().await.err().unwrap();
        assert!(matches!(err, ScanError::ModelLoad(_)));
        assert_eq!(holder.state(), ModelState::Cold);
        assert_eq!(holder.loads(), 0);

        holder.initialize().await.unwrap();
        assert_eq!(holder.state(), ModelState::Warm);
        assert_eq!(holder.loads(), 1);
    }

    #[tokio::test]
    async fn warm_holder_keeps_the_fixed_generation_config() {
        let holder = ModelHolder::new(FlakyLoader {
            failed_once: AtomicBool::new(true),
        });
        let model = holder.initialize().await.unwrap();
        assert_eq!(model.generation, GenerationConfig::OCR);
    }
}
