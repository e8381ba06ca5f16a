//! # Stockroom Entry Point
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          stockroom <command>                            │
//! │                                                                         │
//! │  main.rs ────► parse args, set up logging, print the outcome            │
//! │                                                                         │
//! │  lib.rs ─────► load config, dispatch to commands/                       │
//! │                                                                         │
//! │  commands/ ──► product, sale, report, staff, backup, sync, run          │
//! │                                                                         │
//! │  state/ ─────► AppState (config + Database + remote), TracingEmitter    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure ends as one status line on stderr and exit code 1.

use clap::Parser;
use std::process::ExitCode;

use stockroom_app::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    stockroom_app::init_tracing();

    match stockroom_app::run(cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e.message);
            ExitCode::FAILURE
        }
    }
}
