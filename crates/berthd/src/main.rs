//! berthd: the berth registration daemon.
//!
//! Keeps this host and its running containers registered in etcd:
//! - machine record, re-asserted before its TTL lapses
//! - container records, reconciled periodically from the runtime
//! - lifecycle events, applied as they arrive
//!
//! # Usage
//!
//! ```text
//! berthd run --config /etc/berth/berth.toml
//! berthd reconcile --registry-endpoint http://127.0.0.1:2379 --host-id node-1
//! ```

use clap::{Parser, Subcommand};

mod daemon;
mod options;

use options::{LogFormat, SharedArgs};

#[derive(Parser)]
#[command(
    name = "berthd",
    about = "berth daemon: registers this host and its containers in etcd",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the synchronizer until interrupted or a loop fails.
    Run {
        #[command(flatten)]
        args: SharedArgs,
    },
    /// Register the host and every running container once, print the report.
    Reconcile {
        #[command(flatten)]
        args: SharedArgs,
    },
}

impl Command {
    fn args(&self) -> &SharedArgs {
        match self {
            Command::Run { args } | Command::Reconcile { args } => args,
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,berthd=debug,berth=debug"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.args().log_format)?;

    let settings = cli.command.args().load_settings()?;

    match cli.command {
        Command::Run { .. } => daemon::run(settings).await,
        Command::Reconcile { .. } => daemon::reconcile(settings).await,
    }
}
