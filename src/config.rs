// ⚙️ Runtime configuration - command-line flags with environment fallbacks

use crate::loader::{ColumnMap, DEFAULT_BATCH_SIZE};
use crate::query::BranchFilters;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DATABASE: &str = "bank_branches.db";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_APP_NAME: &str = "Indian Bank Branches API";

/// Command-line interface for `ifsc-catalog`
#[derive(Parser, Debug)]
#[command(name = "ifsc-catalog")]
#[command(about = "Indian bank branch (IFSC) catalog")]
#[command(version)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "IFSC_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Verbose logging
    #[arg(long, global = true, env = "IFSC_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load banks and branches from a CSV file
    Import(ImportArgs),
    /// Print catalog totals
    Stats,
    /// Write matching branches as CSV
    Export(ExportArgs),
    /// Browse branches in the terminal
    Ui,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Source CSV file
    pub csv: PathBuf,

    /// Branch rows per transaction
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Column holding the bank id
    #[arg(long, default_value = "bank_id")]
    pub id_column: String,

    /// Column holding the bank name
    #[arg(long, default_value = "bank_name")]
    pub name_column: String,
}

impl ImportArgs {
    pub fn columns(&self) -> ColumnMap {
        ColumnMap {
            bank_id: self.id_column.clone(),
            bank_name: self.name_column.clone(),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    #[arg(long)]
    pub bank_name: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub district: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub search: Option<String>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    pub fn filters(&self) -> BranchFilters {
        BranchFilters {
            bank_id: None,
            bank_name: self.bank_name.clone(),
            city: self.city.clone(),
            district: self.district.clone(),
            state: self.state.clone(),
            search: self.search.clone(),
        }
        .normalized()
    }
}

/// Command-line interface for `ifsc-server`
#[derive(Parser, Debug, Clone)]
#[command(name = "ifsc-server")]
#[command(about = "HTTP API for the IFSC catalog")]
#[command(version)]
pub struct ServerArgs {
    #[arg(long, env = "IFSC_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: PathBuf,

    /// Address to listen on
    #[arg(long, env = "IFSC_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Ingest this CSV before serving
    #[arg(long, env = "IFSC_LOAD_CSV")]
    pub load_csv: Option<PathBuf>,

    #[arg(long, env = "IFSC_DEBUG")]
    pub debug: bool,

    /// Name reported by `GET /`
    #[arg(long, env = "IFSC_APP_NAME", default_value = DEFAULT_APP_NAME)]
    pub app_name: String,
}

// ============================================================================
// LOGGING
// ============================================================================

/// How chatty the subscriber should be when `RUST_LOG` is unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Terminal UI owns the screen; only warnings get through
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(debug: bool, quiet: bool) -> Self {
        match (debug, quiet) {
            (true, _) => Verbosity::Debug,
            (false, true) => Verbosity::Quiet,
            (false, false) => Verbosity::Normal,
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Install the global fmt subscriber, writing to stderr.
///
/// `--debug` wins over `RUST_LOG`; otherwise `RUST_LOG` wins over the default.
pub fn init_tracing(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Debug => EnvFilter::new(verbosity.directive()),
        _ => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity.directive())),
    };

    // A second init (tests, embedding) is not an error
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_ui() {
        let cli = Cli::try_parse_from(["ifsc-catalog"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_import_args() {
        let cli = Cli::try_parse_from([
            "ifsc-catalog",
            "--database",
            "catalog.db",
            "import",
            "branches.csv",
            "--batch-size",
            "100",
            "--id-column",
            "bid",
        ])
        .unwrap();

        assert_eq!(cli.database, PathBuf::from("catalog.db"));
        match cli.command {
            Some(Command::Import(args)) => {
                assert_eq!(args.csv, PathBuf::from("branches.csv"));
                assert_eq!(args.batch_size, 100);
                assert_eq!(args.columns().bank_id, "bid");
                assert_eq!(args.columns().bank_name, "bank_name");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_export_args_build_filters() {
        let cli = Cli::try_parse_from([
            "ifsc-catalog",
            "export",
            "--city",
            "MUMBAI",
            "--search",
            "  ",
            "-o",
            "out.csv",
        ])
        .unwrap();

        let Some(Command::Export(args)) = cli.command else {
            panic!("expected export");
        };
        let filters = args.filters();
        assert_eq!(filters.city.as_deref(), Some("MUMBAI"));
        assert_eq!(filters.search, None);
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn test_server_args() {
        let args = ServerArgs::try_parse_from(["ifsc-server", "--bind", "127.0.0.1:9000"]).unwrap();
        assert_eq!(args.bind.port(), 9000);
        assert!(args.load_csv.is_none());

        assert!(ServerArgs::try_parse_from(["ifsc-server", "--bind", "not-an-address"]).is_err());
    }

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, false).directive(), "info");
    }
}
