use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap_serde_derive::ClapSerde;
use serde::Serialize;
use url::Url;

#[derive(ClapSerde, Serialize, Debug, Clone)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub address: String,

    /// The port the listener binds to
    #[default(8000)]
    #[arg(short, long, env)]
    pub port: u16,

    /// OTLP collector endpoint, telemetry export is disabled when empty
    #[default(String::new())]
    #[arg(long, env)]
    pub otlp_endpoint: String,

    /// Keep logging to the console while exporting telemetry
    #[default(false)]
    #[arg(long, env)]
    pub console: bool,

    /// Model hub repository of the OCR model
    #[default("deepseek-ai/DeepSeek-OCR".to_string())]
    #[arg(long, env)]
    pub model_id: String,

    /// Revision of the model repository
    #[default("main".to_string())]
    #[arg(long, env)]
    pub model_revision: String,

    /// Base URL of the OpenAI compatible inference engine
    #[default("http://127.0.0.1:8100".to_string())]
    #[arg(long, env)]
    pub engine_url: String,

    /// Start the inference engine as a child process on cold start
    #[default(true)]
    #[arg(long, env)]
    pub launch_engine: bool,

    /// Executable used to start the inference engine
    #[default("vllm".to_string())]
    #[arg(long, env)]
    pub engine_command: String,

    /// Fraction of GPU memory the engine may allocate
    #[default(0.95)]
    #[arg(long, env)]
    pub gpu_memory_utilization: f64,

    /// Run the engine in eager mode instead of capturing CUDA graphs
    #[default(true)]
    #[arg(long, env)]
    pub enforce_eager: bool,

    /// Value for CUDA_VISIBLE_DEVICES of the launched engine, inherited when empty
    #[default(String::new())]
    #[arg(long, env)]
    pub gpu_devices: String,

    /// GPU class the deployment is sized for
    #[default("A10G".to_string())]
    #[arg(long, env)]
    pub gpu_class: String,

    /// Environment variable holding the model hub access token
    #[default("HF_TOKEN".to_string())]
    #[arg(long, env)]
    pub hf_token_env: String,

    /// Resolve the model on the hub before starting the engine
    #[default(true)]
    #[arg(long, env)]
    pub verify_model: bool,

    /// Load the model before accepting traffic
    #[default(false)]
    #[arg(long, env)]
    pub preload: bool,

    /// Seconds to wait for the engine to become healthy
    #[default(900)]
    #[arg(long, env)]
    pub startup_timeout: u64,

    /// Wall-clock limit in seconds for a single scan
    #[default(600)]
    #[arg(long, env)]
    pub request_timeout: u64,

    /// Seconds without scans before the process shuts down, 0 keeps it running
    #[default(300)]
    #[arg(long, env)]
    pub idle_timeout: u64,

    /// Maximum accepted request body size in bytes
    #[default(1_048_576)]
    #[arg(long, env)]
    pub max_body_bytes: usize,
}

impl Config {
    /// Reads a partial configuration from a TOML file, absent keys stay unset.
    pub fn opt_from_toml(path: &str) -> Result<<Config as ClapSerde>::Opt> {
        let str = std::fs::read_to_string(path)?;
        let opt = toml::from_str(&str)?;
        Ok(opt)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.gpu_memory_utilization > 0.0 && self.gpu_memory_utilization <= 1.0) {
            bail!(
                "gpu_memory_utilization must be within (0, 1], got {}",
                self.gpu_memory_utilization
            );
        }
        if self.model_id.trim().is_empty() {
            bail!("model_id must not be empty");
        }
        if self.request_timeout == 0 {
            bail!("request_timeout must be at least one second");
        }
        self.engine_base_url()?;
        Ok(())
    }

    pub fn engine_base_url(&self) -> Result<Url> {
        Url::parse(&self.engine_url)
            .with_context(|| format!("Invalid engine_url {}", self.engine_url))
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        non_empty(&self.otlp_endpoint)
    }

    pub fn gpu_devices(&self) -> Option<&str> {
        non_empty(&self.gpu_devices)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.model_id, "deepseek-ai/DeepSeek-OCR");
        assert_eq!(config.gpu_memory_utilization, 0.95);
        assert!(config.enforce_eager);
        assert_eq!(config.request_timeout(), Duration::from_secs(600));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));
        assert!(config.otlp_endpoint().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn memory_fraction_outside_unit_interval_is_rejected() {
        let mut config = Config::default();
        config.gpu_memory_utilization = 0.0;
        assert!(config.validate().is_err());
        config.gpu_memory_utilization = 1.2;
        assert!(config.validate().is_err());
        config.gpu_memory_utilization = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unparsable_engine_url_is_rejected() {
        let mut config = Config::default();
        config.engine_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_idle_timeout_disables_reclaim() {
        let mut config = Config::default();
        config.idle_timeout = 0;
        assert!(config.idle_timeout().is_none());
    }

    #[test]
    fn toml_file_overrides_only_the_keys_it_sets() {
        let opt: <Config as ClapSerde>::Opt =
            toml::from_str("port = 9000\nlaunch_engine = false\n").unwrap();
        let config = Config::from(opt);
        assert_eq!(config.port, 9000);
        assert!(!config.launch_engine);
        assert_eq!(config.address, "0.0.0.0");
    }
}
