use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clusterpool_lock::LockError;
use tracing_subscriber::EnvFilter;

use commands::{Outcome, Session};

mod commands;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "warn,clusterpool=info";

/// Exit code for "no cluster available", kept apart from failures so CI
/// scripts can decide to wait instead of investigating.
const EXIT_NO_CLUSTER: u8 = 2;

#[derive(Parser)]
#[command(
    name = "clusterpool",
    about = "Shared test cluster pool: claim, release, and label clusters",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to clusterpool.toml (default: ./clusterpool.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with pool clusters
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },
}

#[derive(Subcommand)]
enum ClusterAction {
    /// Lock a free cluster and switch the active context to it
    Lock {
        /// Label key holding the lock token
        #[arg(long)]
        label: Option<String>,
        /// Label key recording the test name
        #[arg(long)]
        test_label: Option<String>,
        /// Test name to record on the locked cluster
        #[arg(long)]
        test: Option<String>,
        /// Only consider clusters carrying this key=value label
        #[arg(long, value_name = "KEY=VALUE")]
        filter: Vec<String>,
        /// Keep retrying for up to this many seconds while no cluster is free
        #[arg(long, value_name = "SECS")]
        wait: Option<u64>,
    },
    /// Release a locked cluster
    Unlock {
        /// Label key holding the lock token
        #[arg(long)]
        label: Option<String>,
        /// Label key recording the test name
        #[arg(long)]
        test_label: Option<String>,
        /// Cluster to release (prompted for when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Only release if the cluster is still locked with this token
        #[arg(long)]
        token: Option<String>,
    },
    /// Add or overwrite labels on a cluster
    Label {
        /// Label to set, as key=value
        #[arg(long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,
        /// Cluster to label (prompted for when omitted)
        #[arg(long)]
        name: Option<String>,
    },
    /// Show every cluster in the pool and whether it is locked
    List {
        /// Only show clusters carrying this key=value label
        #[arg(long, value_name = "KEY=VALUE")]
        filter: Vec<String>,
        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Record an existing cluster in a store-backed pool
    Register {
        #[arg(long)]
        name: String,
        /// Cloud project the cluster lives in
        #[arg(long)]
        project: String,
        /// Zone or region of the cluster
        #[arg(long)]
        location: String,
        /// Initial label, as key=value
        #[arg(long = "label", value_name = "KEY=VALUE")]
        labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::NoCluster) => ExitCode::from(EXIT_NO_CLUSTER),
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let session = Session::load(cli.config)?;

    match cli.command {
        Commands::Cluster { action } => match action {
            ClusterAction::Lock {
                label,
                test_label,
                test,
                filter,
                wait,
            } => {
                let request = commands::lock::LockRequest {
                    keys: session.keys(label, test_label),
                    test,
                    filter,
                    wait: wait.map(Duration::from_secs),
                };
                commands::lock::lock(&session, request).await
            }
            ClusterAction::Unlock {
                label,
                test_label,
                name,
                token,
            } => {
                let keys = session.keys(label, test_label);
                commands::unlock::unlock(&session, keys, name, token).await
            }
            ClusterAction::Label { labels, name } => {
                commands::label::label(&session, name, &labels).await
            }
            ClusterAction::List { filter, format } => {
                commands::list::list(&session, &filter, &format).await
            }
            ClusterAction::Register {
                name,
                project,
                location,
                labels,
            } => {
                let request = commands::register::RegisterRequest {
                    name,
                    project,
                    location,
                    labels,
                };
                commands::register::register(&session, request).await
            }
        },
    }
}

fn report(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
    match err.downcast_ref::<LockError>() {
        Some(LockError::Registry { op: "connect", .. }) => {}
        Some(e) if e.is_registry_failure() => {
            eprintln!("The cluster registry is unreachable or rejected the request; check credentials and connectivity.");
        }
        Some(LockError::Conflict { .. }) => {
            eprintln!("Other callers kept modifying the cluster; try again.");
        }
        _ => {}
    }
}
