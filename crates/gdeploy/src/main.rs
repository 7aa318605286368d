use clap::Parser;
use std::io::IsTerminal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod apply;
mod cli;
mod config;
mod deployment;
mod error;
mod exitcode;
mod gcloud;

fn main() {
    init_tracing();

    let args = cli::Args::parse();
    match cli::run(args) {
        Ok(()) => info!("Config deployed successfully"),
        Err(err) => {
            error!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}
