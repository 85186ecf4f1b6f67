use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use uppe_agent::output::{ResultFormat, register_result_listener};
use uppe_agent::{Agent, AgentConfig};

#[derive(Parser)]
#[command(name = "uppe-agent", version)]
#[command(about = "Probe hosts and services on a schedule", long_about = None)]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/uppe/agent.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the resolved config to its path and exit
    #[arg(long)]
    write_config: bool,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,

    /// How completed probe results are reported: log or json (on stdout)
    #[arg(long, default_value = "log")]
    output: ResultFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        logger::init_with_level(logger::LevelFilter::DEBUG);
    } else {
        logger::init();
    }

    let config_path = AgentConfig::resolve_path(cli.config.as_ref())?;
    let config = AgentConfig::from_config(Some(&config_path))
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    if cli.write_config {
        config.write_config(&config_path)?;
        println!("{config}");
        println!("Config written to {}", config_path.display());
        return Ok(());
    }

    info!(path = %config_path.display(), "config loaded");

    let mut agent = Agent::new(config).context("failed to build agent")?;

    let output_cancel = CancellationToken::new();
    let output_handle = register_result_listener(
        agent.dispatcher(),
        cli.output,
        tokio::io::stdout(),
        output_cancel.clone(),
    )
    .context("failed to bind result listener")?;

    agent.start()?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("ctrl-c received");

    agent.shutdown().await;
    output_cancel.cancel();
    output_handle.await.context("result listener failed")?;

    Ok(())
}
