//! Command-line entry point for the dental clinic service.
//!
//! `serve` runs the HTTP API and the outbox worker; `demo` walks one
//! appointment through its whole lifecycle in-process.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use easydent::demo::run_demo;
use easydent::outbox::LogMailer;
use easydent::server;
use easydent::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "easydent")]
#[command(version)]
#[command(about = "Dental clinic management service")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long, value_name = "HOST")]
        host: Option<String>,
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,
        #[arg(short = 'c', long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Run the booking-to-payment walkthrough
    Demo,
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = CliArgs::parse();

    match args.command {
        Command::Serve { host, port, config } => {
            let mut config = AppConfig::load(config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_tracing(&config.log.filter);
            server::run(config, Arc::new(LogMailer)).await
        }
        Command::Demo => {
            init_tracing("warn");
            run_demo().await
        }
    }
}
