//! tidescaled — the tidescale daemon.
//!
//! Runs one threshold control loop per configured workload and serves
//! their telemetry over HTTP.
//!
//! # Usage
//!
//! ```text
//! tidescaled init --path tidescale.toml --namespace default --name api
//! tidescaled check --config tidescale.toml
//! tidescaled run --config tidescale.toml
//! tidescaled decide --current 3 --cpu 0.9 --memory 0.4
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod daemon;

#[derive(Parser)]
#[command(
    name = "tidescaled",
    about = "tidescale — threshold autoscaler for Kubernetes deployments",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Start the control loops and the telemetry API.
    Run {
        /// Path to tidescale.toml.
        #[arg(short, long, default_value = "tidescale.toml")]
        config: PathBuf,

        /// Override [server].listen.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Validate a config file and print the resolved workloads.
    Check {
        #[arg(short, long, default_value = "tidescale.toml")]
        config: PathBuf,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Write a starter config for a single deployment.
    Init {
        #[arg(short, long, default_value = "tidescale.toml")]
        path: PathBuf,

        #[arg(long, default_value = "default")]
        namespace: String,

        /// Deployment name.
        #[arg(long)]
        name: String,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Evaluate the scaling policy once, without touching any cluster.
    Decide {
        /// Current desired replica count.
        #[arg(long)]
        current: u32,
        /// CPU utilization (0.0-1.0).
        #[arg(long)]
        cpu: f64,
        /// Memory utilization (0.0-1.0).
        #[arg(long)]
        memory: f64,
        #[arg(long, default_value = "1")]
        min: u32,
        #[arg(long, default_value = "10")]
        max: u32,
        #[arg(long, default_value = "0.75")]
        cpu_threshold: f64,
        #[arg(long, default_value = "0.75")]
        memory_threshold: f64,
        #[arg(long, default_value = "1")]
        step: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Command::Run { config, listen } => commands::run::run(&config, listen).await,
        Command::Check { config, format } => commands::config::check(&config, &format),
        Command::Init {
            path,
            namespace,
            name,
            force,
        } => commands::config::init(&path, &namespace, &name, force),
        Command::Decide {
            current,
            cpu,
            memory,
            min,
            max,
            cpu_threshold,
            memory_threshold,
            step,
        } => commands::decide::decide(
            current,
            cpu,
            memory,
            tidescale_core::ScalingParams {
                min_replicas: min,
                max_replicas: max,
                cpu_threshold,
                memory_threshold,
                step,
                ..Default::default()
            },
        ),
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => "info,tidescaled=debug,tidescale=debug".parse()?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
