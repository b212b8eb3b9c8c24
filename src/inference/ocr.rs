use tracing::{debug, warn};

use crate::error::ScanError;
use crate::inference::engine::PromptInput;
use crate::inference::holder::LoadedModel;

/// Marks where the image is spliced into the prompt.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// `<|grounding|>` switches the model to layout-aware markdown extraction.
pub const DOCUMENT_PROMPT: &str = "<image>\n<|grounding|>Convert the document to markdown.";

pub fn document_prompt(image_url: &str) -> PromptInput {
    PromptInput {
        prompt: DOCUMENT_PROMPT.to_string(),
        image_url: image_url.to_string(),
    }
}

impl LoadedModel {
    /// Converts the document image behind `image_url` to markdown with exactly
    /// one generation call. Fetching and decoding the image is left to the
    /// engine.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn extract_text(&self, image_url: &str) -> Result<String, ScanError> {
        let inputs = [document_prompt(image_url)];
        let outputs = self
            .engine
            .generate(&inputs, &self.generation)
            .await
            .map_err(ScanError::Generation)?;

        if outputs.len() > 1 || outputs.first().is_some_and(|o| o.outputs.len() > 1) {
            warn!("Engine returned several candidates, using the first");
        }
        let text = outputs
            .into_iter()
            .next()
            .and_then(|output| output.outputs.into_iter().next())
            .map(|completion| completion.text)
            .ok_or(ScanError::EmptyOutput)?;

        debug!(chars = text.len(), "Extracted text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_pairs_the_instruction_with_the_image() {
        let input = document_prompt("https://example.com/doc.png");
        assert!(input.prompt.starts_with(IMAGE_PLACEHOLDER));
        assert!(input.prompt.contains("<|grounding|>Convert the document to markdown."));
        assert_eq!(input.image_url, "https://example.com/doc.png");
    }
}
