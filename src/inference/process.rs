use std::process::{ExitStatus, Stdio};

use anyhow::{anyhow, Context, Result};
use tokio::process::{Child, Command};
use tracing::info;

use crate::config::Config;

/// A vLLM server started by the gateway. The child is killed when this value
/// is dropped, so the GPU memory it holds is released with the engine.
pub struct EngineProcess {
    child: Child,
}

impl EngineProcess {
    #[tracing::instrument(
        level = "info",
        skip(config, token),
        fields(command = %config.engine_command)
    )]
    pub fn spawn(config: &Config, token: Option<&str>) -> Result<Self> {
        let args = engine_args(config)?;
        let mut cmd = Command::new(&config.engine_command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(token) = token {
            cmd.env("HF_TOKEN", token);
        }
        if let Some(devices) = config.gpu_devices() {
            cmd.env("CUDA_VISIBLE_DEVICES", devices);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to start {}", config.engine_command))?;
        info!(pid = child.id(), args = ?args, "Inference engine started");
        Ok(Self { child })
    }

    /// Returns the exit status if the engine has already terminated.
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }
}

/// Command line for `vllm serve`, bound to the host and port of `engine_url`.
pub fn engine_args(config: &Config) -> Result<Vec<String>> {
    let url = config.engine_base_url()?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("engine_url {} has no host", config.engine_url))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("engine_url {} has no port", config.engine_url))?;

    let mut args = vec![
        "serve".to_string(),
        config.model_id.clone(),
        "--revision".to_string(),
        config.model_revision.clone(),
        "--host".to_string(),
        host.to_string(),
        "--port".to_string(),
        port.to_string(),
        "--gpu-memory-utilization".to_string(),
        config.gpu_memory_utilization.to_string(),
        "--trust-remote-code".to_string(),
    ];
    if config.enforce_eager {
        args.push("--enforce-eager".to_string());
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_command_carries_the_deployment_settings() {
        let config = Config::default();
        let args = engine_args(&config).unwrap();
        assert_eq!(
            args,
            vec![
                "serve",
                "deepseek-ai/DeepSeek-OCR",
                "--revision",
                "main",
                "--host",
                "127.0.0.1",
                "--port",
                "8100",
                "--gpu-memory-utilization",
                "0.95",
                "--trust-remote-code",
                "--enforce-eager",
            ]
        );
    }

    #[test]
    fn graph_capture_mode_drops_the_eager_flag() {
        let mut config = Config::default();
        config.enforce_eager = false;
        config.engine_url = "http://10.0.0.5".into();
        let args = engine_args(&config).unwrap();
        assert!(!args.contains(&"--enforce-eager".to_string()));
        assert!(args.windows(2).any(|w| w == ["--port", "80"]));
        assert!(args.windows(2).any(|w| w == ["--host", "10.0.0.5"]));
    }
}
