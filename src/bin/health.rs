use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;
use serde::Deserialize;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Container health probe for the OCR gateway",
    long_about = None
)]
struct Args {
    /// Health endpoint of the gateway
    #[arg(
        short,
        long,
        env = "OCR_GATEWAY_HEALTH_URL",
        default_value = "http://127.0.0.1:8000/health"
    )]
    url: Url,

    /// Only report healthy once the model is loaded
    #[arg(long)]
    require_warm: bool,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match probe(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Health check failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn probe(args: &Args) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response = client.get(args.url.clone()).send()?.error_for_status()?;

    if args.require_warm {
        let health: HealthResponse = response.json()?;
        if health.status != "warm" {
            anyhow::bail!("model is {}", health.status);
        }
    }
    Ok(())
}
