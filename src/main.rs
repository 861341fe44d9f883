use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trellis::cloud::{create_cloud, ProviderKind};
use trellis::config::EngineConfig;
use trellis::engine::Engine;
use trellis::manifest::Manifest;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Converge the render-proxy resource chain")]
struct Cli {
    /// Path to the YAML run configuration
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    config: PathBuf,

    /// Provider backing the run
    #[arg(long, default_value = "memory", env = "TRELLIS_PROVIDER")]
    provider: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report which resources exist, creating nothing
    Check,
    /// Reconcile the chain and write the resource manifest
    Converge {
        /// Where the manifest is written
        #[arg(short, long, default_value = "resources.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = EngineConfig::from_yaml_file(&cli.config)
        .await
        .with_context(|| format!("loading configuration {}", cli.config.display()))?;
    let provider: ProviderKind = cli.provider.parse()?;
    let cloud = create_cloud(provider)?;
    let engine = Engine::new(cloud, config)?;

    match cli.command {
        Command::Check => {
            let entries = engine.survey().await?;
            for entry in &entries {
                match &entry.found {
                    Some(id) => println!("{:<24} present  {id}", entry.kind.as_str()),
                    None => println!("{:<24} absent", entry.kind.as_str()),
                }
            }
        }
        Command::Converge { output } => {
            let outcome = engine.converge().await;

            // The manifest covers whatever converged, run failed or not.
            let manifest = Manifest::build(engine.config(), &outcome.resources);
            manifest.write_to(&output).await?;

            println!("manifest written to {}", output.display());
            println!("next steps:");
            for (i, step) in manifest.next_steps.iter().enumerate() {
                println!("  {}. {step}", i + 1);
            }

            if let Some(error) = outcome.error {
                return Err(error.into());
            }
        }
    }

    Ok(())
}
