//! # Stockroom Application
//!
//! Command-line front end for the inventory: every subcommand opens the
//! configured database, does one thing, prints the result and exits;
//! `stockroom run` keeps the realtime mirror going until interrupted.
//!
//! ## Module Structure
//! ```text
//! apps/stockroom/src/
//! ├── main.rs      ◄─── Process entry (exit code, stdout/stderr)
//! ├── lib.rs       ◄─── You are here (tracing, dispatch, signals)
//! ├── cli.rs       ◄─── clap definitions
//! ├── error.rs     ◄─── ApiError (code + message)
//! ├── state/       ◄─── AppState, Remote, TracingEmitter
//! └── commands/    ◄─── One module per command group
//! ```
//!
//! ## Database Lifetime
//! ```text
//! run / backup download / backup restore / backup list
//!     └─► never hold a pool; they replace or read the file directly
//!
//! everything else
//!     └─► AppState::open ──► command ──► Database::close
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod state;

use stockroom_sync::StockroomConfig;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{
    AdminCommand, BackupCommand, Cli, Command, ProductCommand, SaleCommand, StaffCommand,
    SyncCommand,
};
use commands::{backup, product, report, run as daemon, sale, staff, sync};
use error::ApiResult;
use state::{AppState, Remote};
use stockroom_core::NewProduct;

/// Initializes the tracing subscriber.
///
/// Log level is controlled by the `RUST_LOG` environment variable:
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=stockroom_sync=trace` - Trace the sync crate only
/// - Default: INFO, with sqlx quieted
///
/// Logs go to stderr; stdout carries command output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockroom=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the config and runs one command. Returns the text to print.
pub async fn run(cli: Cli) -> ApiResult<String> {
    let config = StockroomConfig::load(cli.config)?;
    debug!(db = %config.database.path.display(), "Configuration loaded");

    // Commands that must not hold the database open.
    match cli.command {
        Command::Run => {
            let remote = Remote::from_config(&config)?;
            return daemon::run_until(config, remote, shutdown_signal()).await;
        }
        Command::Backup(BackupCommand::Download) => {
            let remote = Remote::from_config(&config)?;
            return backup::download(&config, remote.as_ref()).await;
        }
        Command::Backup(BackupCommand::Restore { archive }) => {
            return backup::restore(&config, archive).await;
        }
        Command::Backup(BackupCommand::List) => return backup::list(&config),
        command => {
            let state = AppState::open(config).await?;
            let result = dispatch(&state, command).await;
            state.db().close().await;
            result
        }
    }
}

async fn dispatch(state: &AppState, command: Command) -> ApiResult<String> {
    match command {
        Command::Login { username, password } => staff::login(state, &username, &password).await,

        Command::Product(cmd) => match cmd {
            ProductCommand::Add {
                name,
                category,
                quantity,
                price,
                cost_price,
            } => {
                let input = NewProduct {
                    name,
                    category,
                    quantity,
                    price,
                    cost_price,
                };
                product::add(state, input).await
            }
            ProductCommand::List { search, category } => {
                product::list(state, search.as_deref(), category.as_deref()).await
            }
            ProductCommand::Show { id } => product::show(state, id).await,
            ProductCommand::Update { id, changes } => product::update(state, id, changes).await,
            ProductCommand::Restock { id, amount } => product::restock(state, id, amount).await,
            ProductCommand::Delete { id } => product::delete(state, id).await,
            ProductCommand::Categories => product::categories(state).await,
            ProductCommand::RenameCategory { old, new } => {
                product::rename_category(state, &old, &new).await
            }
            ProductCommand::LowStock { threshold } => product::low_stock(state, threshold).await,
            ProductCommand::Clear { yes } => product::clear(state, yes).await,
        },

        Command::Sale(cmd) => match cmd {
            SaleCommand::Sell {
                product_id,
                quantity,
            } => sale::sell(state, product_id, quantity).await,
            SaleCommand::Checkout { lines } => sale::checkout(state, &lines).await,
            SaleCommand::List { category } => sale::list(state, category.as_deref()).await,
            SaleCommand::Show { id } => sale::show(state, id).await,
            SaleCommand::Transaction { id } => sale::transaction(state, id).await,
            SaleCommand::Clear { yes } => sale::clear(state, yes).await,
        },

        Command::Report { threshold } => report::report(state, threshold).await,

        Command::Staff(cmd) => match cmd {
            StaffCommand::Add {
                username,
                password,
                role,
            } => staff::add(state, &username, &password, role).await,
            StaffCommand::Passwd { username, password } => {
                staff::passwd(state, &username, &password).await
            }
            StaffCommand::Remove { username } => staff::remove(state, &username).await,
            StaffCommand::Role { username, role } => staff::set_role(state, &username, role).await,
            StaffCommand::List => staff::list(state).await,
        },

        Command::Admin(AdminCommand::Passwd {
            current,
            new,
            confirm,
        }) => staff::admin_passwd(state, &current, &new, &confirm).await,

        Command::Backup(cmd) => match cmd {
            BackupCommand::Upload => backup::upload(state).await,
            BackupCommand::Local => backup::local(state).await,
            BackupCommand::Save { dest } => backup::save(state, &dest).await,
            BackupCommand::List => backup::list(state.config()),
            BackupCommand::Download | BackupCommand::Restore { .. } => Err(error::ApiError::internal(
                "This backup command must run before the database is opened.",
            )),
        },

        Command::Sync(SyncCommand::Push) => sync::push(state).await,
        Command::Sync(SyncCommand::Pull) => sync::pull(state).await,
        Command::Migrations => sync::migrations(state).await,

        Command::Run => Err(error::ApiError::internal(
            "`run` manages its own database connection.",
        )),
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping sync...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(dir: &std::path::Path, args: &[&str]) -> Cli {
        let config = dir.join("stockroom.toml");
        let db = dir.join("inventory.db");
        std::fs::write(
            &config,
            format!(
                "[database]\npath = {:?}\n\n[backup]\ndir = {:?}\n",
                db.display().to_string(),
                dir.join("backups").display().to_string()
            ),
        )
        .unwrap();

        let mut argv = vec!["stockroom", "--config"];
        let config = config.display().to_string();
        argv.push(&config);
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn test_commands_share_the_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(cli(
            dir.path(),
            &["product", "add", "Rice", "--quantity", "10", "--price", "100", "--cost", "60"],
        ))
        .await
        .unwrap();
        assert_eq!(out, "Product added: #1 Rice (10 in stock at 100.00)");

        let out = run(cli(dir.path(), &["sale", "sell", "1", "3"])).await.unwrap();
        assert!(out.contains("= 300.00 (profit 120.00)"));

        let out = run(cli(dir.path(), &["report"])).await.unwrap();
        assert!(out.contains("Total revenue: 300.00"));

        let out = run(cli(dir.path(), &["backup", "list"])).await.unwrap();
        assert!(out.lines().count() >= 1);
        assert!(out.contains("backup_"));
    }

    #[tokio::test]
    async fn test_errors_carry_codes() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(cli(dir.path(), &["product", "show", "9"])).await.unwrap_err();
        assert_eq!(err.code, error::ErrorCode::NotFound);

        let err = run(cli(dir.path(), &["sync", "push"])).await.unwrap_err();
        assert_eq!(err.code, error::ErrorCode::ConfigError);
    }
}
