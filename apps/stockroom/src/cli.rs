//! # Command Line
//!
//! ```text
//! stockroom [--config FILE] <command>
//!
//!   run                                   sync daemon until Ctrl-C
//!   login <user> --password P             check credentials, print role
//!   product add|list|show|update|restock|delete|categories|
//!           rename-category|low-stock|clear
//!   sale    sell|checkout|list|show|transaction|clear
//!   report                                totals, best seller, low stock
//!   staff   add|passwd|remove|role|list
//!   admin   passwd
//!   backup  upload|download|local|list|restore|save
//!   sync    push|pull
//!   migrations                            migration log
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stockroom_core::{CartLine, Role, DEFAULT_LOW_STOCK_THRESHOLD};

/// Inventory and point-of-sale with a realtime remote mirror.
#[derive(Debug, Parser)]
#[command(name = "stockroom", version, about)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "STOCKROOM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sync with the remote store and keep listening until interrupted
    Run,

    /// Check a username and password
    Login {
        username: String,
        #[arg(long, env = "STOCKROOM_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Manage the product catalog
    #[command(subcommand)]
    Product(ProductCommand),

    /// Record and browse sales
    #[command(subcommand)]
    Sale(SaleCommand),

    /// Sales and stock summary
    Report {
        /// Products below this quantity are flagged
        #[arg(long, default_value_t = DEFAULT_LOW_STOCK_THRESHOLD)]
        threshold: i64,
    },

    /// Manage staff accounts
    #[command(subcommand)]
    Staff(StaffCommand),

    /// Administrator account
    #[command(subcommand)]
    Admin(AdminCommand),

    /// Remote snapshots and local archives
    #[command(subcommand)]
    Backup(BackupCommand),

    /// One-shot synchronization
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Show the schema migration log
    Migrations,
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Add a product
    Add {
        name: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        price: f64,
        #[arg(long = "cost", default_value_t = 0.0)]
        cost_price: f64,
    },

    /// List products
    List {
        /// Case-insensitive name search
        #[arg(long)]
        search: Option<String>,
        /// Category name, "All" or "No Category"
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one product
    Show { id: i64 },

    /// Change fields of a product
    Update {
        id: i64,
        #[command(flatten)]
        changes: ProductChanges,
    },

    /// Add stock to a product
    Restock { id: i64, amount: i64 },

    /// Delete a product
    Delete { id: i64 },

    /// List categories in use
    Categories,

    /// Move every product from one category to another
    RenameCategory { old: String, new: String },

    /// Products below a quantity
    LowStock {
        #[arg(long, default_value_t = DEFAULT_LOW_STOCK_THRESHOLD)]
        threshold: i64,
    },

    /// Delete every product
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

/// Fields left out keep their current value.
#[derive(Debug, Clone, Default, Args)]
pub struct ProductChanges {
    #[arg(long)]
    pub name: Option<String>,
    /// Empty string clears the category
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub quantity: Option<i64>,
    #[arg(long)]
    pub price: Option<f64>,
    #[arg(long = "cost")]
    pub cost_price: Option<f64>,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum SaleCommand {
    /// Sell a quantity of one product
    Sell { product_id: i64, quantity: i64 },

    /// Sell several lines as one transaction
    Checkout {
        /// Lines as <product_id>:<quantity>
        #[arg(required = true, num_args = 1..)]
        lines: Vec<CartLine>,
    },

    /// List sales
    List {
        /// Category name, "All" or "No Category"
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one sale
    Show { id: i64 },

    /// Show a transaction and its lines
    Transaction { id: i64 },

    /// Delete every sale
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum StaffCommand {
    /// Create an account
    Add {
        username: String,
        #[arg(long, env = "STOCKROOM_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "staff", value_parser = parse_role)]
        role: Role,
    },

    /// Set a new password
    Passwd {
        username: String,
        #[arg(long, env = "STOCKROOM_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Delete an account
    Remove { username: String },

    /// Change an account's role
    Role {
        username: String,
        #[arg(value_parser = parse_role)]
        role: Role,
    },

    /// List accounts
    List,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Change the admin password
    Passwd {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => Ok(Role::Admin),
        "staff" => Ok(Role::Staff),
        other => Err(format!("unknown role '{other}' (expected admin or staff)")),
    }
}

// =============================================================================
// Backups + Sync
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Upload the database file to the remote store
    Upload,
    /// Replace the local database with the remote snapshot
    Download,
    /// Write a local zip archive now
    Local,
    /// List local archives, newest first
    List,
    /// Restore from a zip archive or a .db copy
    Restore { archive: PathBuf },
    /// Save a copy of the database file
    Save { dest: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Stamp and upload every local product and sale
    Push,
    /// Apply every newer remote product and sale
    Pull,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_checkout_lines_parse() {
        let cli = Cli::try_parse_from(["stockroom", "sale", "checkout", "1:2", "3:1"]).unwrap();
        match cli.command {
            Command::Sale(SaleCommand::Checkout { lines }) => {
                assert_eq!(lines.len(), 2);
                assert_eq!(lines[0], CartLine { product_id: 1, quantity: 2 });
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["stockroom", "sale", "checkout", "1-2"]).is_err());
        assert!(Cli::try_parse_from(["stockroom", "sale", "checkout"]).is_err());
    }

    #[test]
    fn test_role_values() {
        assert_eq!(parse_role(" Admin ").unwrap(), Role::Admin);
        assert_eq!(parse_role("staff").unwrap(), Role::Staff);
        assert!(parse_role("manager").is_err());
    }

    #[test]
    fn test_update_flags_are_optional() {
        let cli =
            Cli::try_parse_from(["stockroom", "product", "update", "4", "--price", "12.5"]).unwrap();
        match cli.command {
            Command::Product(ProductCommand::Update { id, changes }) => {
                assert_eq!(id, 4);
                assert_eq!(changes.price, Some(12.5));
                assert!(changes.name.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
