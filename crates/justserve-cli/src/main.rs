//! JustServe CLI - serve files, open tunnels and send to LAN peers
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve a folder on the LAN
//! justserve serve ./public --port 8080
//!
//! # Hand a file to someone on the same network
//! justserve send ./movie.mp4
//!
//! # Find sessions on the other machine
//! justserve discover
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]
#![allow(clippy::struct_excessive_bools)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Public(args) => commands::public::run(args).await,
        Command::Proxy(args) => commands::proxy::run(args).await,
        Command::Send(args) => commands::send::run(args).await,
        Command::Discover(args) => commands::discover::run(args).await,
        Command::Connect(args) => commands::connect::run(args).await,
        Command::Ips(args) => commands::ips::run(&args),
        Command::CheckUpdate(args) => commands::check_update::run(args).await,
        Command::Config(args) => commands::config::run(args.action),
        Command::Completions(args) => {
            commands::completions::run(args.shell);
            Ok(())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,justserve=info,justserve_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
