use anyhow::{Context, Result};
use clap::Parser;
use clap_serde_derive::ClapSerde;
use tracing::error;

use ocr_gateway::app::run;
use ocr_gateway::config::Config;
use ocr_gateway::telemetry::init_telemetry;

const DEFAULT_CONFIG_FILE: &str = "OcrGateway.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();
    let config = match Config::opt_from_toml(&args.config_file) {
        Ok(file_config) => Config::from(file_config).merge(&mut args.opt_config),
        Err(err) => {
            if args.config_file != DEFAULT_CONFIG_FILE {
                return Err(err).with_context(|| {
                    format!("Failed to read configuration file {}", args.config_file)
                });
            }
            Config::from(&mut args.opt_config)
        }
    };

    init_telemetry(&config)?;
    if let Err(err) = run(config).await {
        error!("Gateway failed: {err:#}");
        return Err(err);
    }
    Ok(())
}
