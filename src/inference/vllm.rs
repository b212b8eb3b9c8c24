use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use axum::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::inference::engine::{ModelLoader, OcrEngine, PromptInput, RequestOutput};
use crate::inference::generation_config::GenerationConfig;
use crate::inference::hub::{read_token, verify_model_access};
use crate::inference::ocr::IMAGE_PLACEHOLDER;
use crate::inference::process::EngineProcess;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client for a vLLM server exposing the OpenAI compatible API.
pub struct VllmEngine {
    client: Client,
    base_url: String,
    model_id: String,
    /// Launched server, stopped when the client is dropped.
    #[allow(dead_code)]
    process: Option<EngineProcess>,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: usize,
    skip_special_tokens: bool,
    n: usize,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
    Text { text: &'a str },
}

#[derive(Serialize, Debug)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ModelList {
    data: Vec<ModelCard>,
}

#[derive(Deserialize, Debug)]
struct ModelCard {
    id: String,
}

impl VllmEngine {
    pub fn new(base_url: &str, model_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
            process: None,
        }
    }

    /// Ties the lifetime of a launched engine process to this client.
    pub fn with_process(mut self, process: EngineProcess) -> Self {
        self.process = Some(process);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Polls `/health` until the server answers with a success status.
    ///
    /// Fails early when the launched process exits or `timeout` elapses.
    #[tracing::instrument(level = "info", skip(self, process), fields(url = %self.base_url))]
    pub async fn wait_until_healthy(
        &self,
        timeout: Duration,
        mut process: Option<&mut EngineProcess>,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            match self.client.get(self.endpoint("health")).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(elapsed = ?start.elapsed(), "Inference engine is healthy");
                    return Ok(());
                }
                Ok(response) => debug!(status = %response.status(), "Engine not ready yet"),
                Err(err) => debug!(error = %err, "Engine not reachable yet"),
            }

            if let Some(process) = process.as_deref_mut() {
                if let Some(status) = process.try_exit_status()? {
                    bail!("Inference engine exited during startup with {status}");
                }
            }
            if start.elapsed() >= timeout {
                bail!(
                    "Inference engine did not become healthy within {}s",
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    /// Confirms the server is serving the configured model.
    pub async fn ensure_model_served(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("v1/models"))
            .send()
            .await
            .context("Model listing request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Model listing returned {status}: {body}");
        }

        let models: ModelList = response
            .json()
            .await
            .context("Failed to parse model listing")?;
        if !models.data.iter().any(|card| card.id == self.model_id) {
            bail!(
                "Inference engine does not serve {} (available: {})",
                self.model_id,
                models
                    .data
                    .iter()
                    .map(|card| card.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(())
    }

    async fn generate_one(
        &self,
        input: &PromptInput,
        config: &GenerationConfig,
    ) -> Result<RequestOutput> {
        let body = ChatCompletionRequest {
            model: &self.model_id,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: &input.image_url,
                        },
                    },
                    ContentPart::Text {
                        text: instruction_text(&input.prompt),
                    },
                ],
            }],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            skip_special_tokens: config.skip_special_tokens,
            n: 1,
            stream: false,
        };

        debug!(image_url = %input.image_url, "Sending generation request");
        let response = self
            .client
            .post(self.endpoint("v1/chat/completions"))
            .json(&body)
            .send()
            .await
            .context("Generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Inference engine returned {status}: {body}");
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse generation response")?;
        Ok(RequestOutput::from_texts(
            completion
                .choices
                .into_iter()
                .filter_map(|choice| choice.message.content),
        ))
    }
}

/// The chat template inserts the image itself, so only the instruction is sent.
fn instruction_text(prompt: &str) -> &str {
    prompt
        .strip_prefix(IMAGE_PLACEHOLDER)
        .unwrap_or(prompt)
        .trim()
}

#[async_trait]
impl OcrEngine for VllmEngine {
    async fn generate(
        &self,
        inputs: &[PromptInput],
        config: &GenerationConfig,
    ) -> Result<Vec<RequestOutput>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(self.generate_one(input, config).await?);
        }
        Ok(outputs)
    }
}

/// Cold start against vLLM: verify the model on the hub, launch the server if
/// configured to, and wait for it to serve the model.
pub struct VllmLoader {
    config: Config,
}

impl VllmLoader {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModelLoader for VllmLoader {
    #[tracing::instrument(level = "info", skip(self), fields(model = %self.config.model_id))]
    async fn load(&self) -> Result<Arc<dyn OcrEngine>> {
        let config = &self.config;
        let token = read_token(&config.hf_token_env);
        if token.is_none() {
            warn!(
                env = %config.hf_token_env,
                "No model hub token set, only public models can be loaded"
            );
        }

        if config.verify_model {
            verify_model_access(&config.model_id, &config.model_revision, token.clone()).await?;
        }

        let mut process = if config.launch_engine {
            Some(EngineProcess::spawn(config, token.as_deref())?)
        } else {
            None
        };

        let engine = VllmEngine::new(&config.engine_url, &config.model_id);
        engine
            .wait_until_healthy(config.startup_timeout(), process.as_mut())
            .await?;
        engine.ensure_model_served().await?;

        let engine = match process {
            Some(process) => engine.with_process(process),
            None => engine,
        };
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ocr::DOCUMENT_PROMPT;

    #[test]
    fn instruction_drops_the_image_placeholder() {
        assert_eq!(
            instruction_text(DOCUMENT_PROMPT),
            "<|grounding|>Convert the document to markdown."
        );
        assert_eq!(instruction_text("Free OCR."), "Free OCR.");
    }

    #[test]
    fn request_lists_the_image_before_the_instruction() {
        let body = ChatCompletionRequest {
            model: "deepseek-ai/DeepSeek-OCR",
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "http://x/a.jpg",
                        },
                    },
                    ContentPart::Text { text: "Convert." },
                ],
            }],
            temperature: 0.1,
            max_tokens: 4096,
            skip_special_tokens: true,
            n: 1,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["messages"][0]["content"],
            serde_json::json!([
                { "type": "image_url", "image_url": { "url": "http://x/a.jpg" } },
                { "type": "text", "text": "Convert." }
            ])
        );
        assert_eq!(json["skip_special_tokens"], true);
    }
}
