use std::sync::Arc;

use anyhow::Result;
use axum::async_trait;

use crate::inference::generation_config::GenerationConfig;

/// A single multimodal prompt: instruction text plus the image it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptInput {
    pub prompt: String,
    pub image_url: String,
}

/// The generations produced for one `PromptInput`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOutput {
    pub outputs: Vec<CompletionOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutput {
    pub text: String,
}

impl RequestOutput {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequestOutput {
            outputs: texts
                .into_iter()
                .map(|text| CompletionOutput { text: text.into() })
                .collect(),
        }
    }
}

/// A loaded vision-language model able to run batched generations.
///
/// Implementations are shared by every request routed to the process and must
/// treat `generate` as read-only with respect to their own configuration.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Runs one generation per input, returning outputs in input order.
    async fn generate(
        &self,
        inputs: &[PromptInput],
        config: &GenerationConfig,
    ) -> Result<Vec<RequestOutput>>;
}

/// Performs the cold start: fetches and initializes an engine.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn OcrEngine>>;
}
