use std::path::PathBuf;

use anyhow::{Context, Result};
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use tracing::info;

/// Reads the model hub token from the environment variable `var`.
pub fn read_token(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves `config.json` of the model repository, failing fast on unknown
/// models or rejected credentials before any GPU memory is claimed.
#[tracing::instrument(level = "info", skip(token))]
pub async fn verify_model_access(
    model_id: &str,
    revision: &str,
    token: Option<String>,
) -> Result<PathBuf> {
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
    let path = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
        let api = ApiBuilder::new()
            .with_token(token)
            .build()
            .context("Failed to create model hub client")?;
        let path = api.repo(repo).get("config.json")?;
        Ok(path)
    })
    .await
    .context("Model hub task failed")?
    .with_context(|| format!("Failed to resolve model {model_id}@{revision}"))?;

    info!(path = %path.display(), "Model resolved on the hub");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_treated_as_absent() {
        std::env::set_var("OCR_GATEWAY_TEST_BLANK_TOKEN", "  ");
        assert_eq!(read_token("OCR_GATEWAY_TEST_BLANK_TOKEN"), None);
        assert_eq!(read_token("OCR_GATEWAY_TEST_UNSET_TOKEN"), None);

        std::env::set_var("OCR_GATEWAY_TEST_TOKEN", "hf_abc\n");
        assert_eq!(
            read_token("OCR_GATEWAY_TEST_TOKEN"),
            Some("hf_abc".to_string())
        );
    }
}
