// IFSC Catalog - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod export;
pub mod loader;
pub mod pagination;
pub mod query;
pub mod query_api;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "tui")]
pub mod ui;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use db::{create_bank, create_branch, setup_database, Database};
pub use entities::{Bank, Branch, BranchWithBank, NewBank, NewBranch};
pub use error::{CatalogError, Result};
pub use export::{BranchSource, ExportStream, EXPORT_BATCH_SIZE, EXPORT_HEADER};
pub use loader::{load_from_file, ColumnMap, LoadReport, Loader, DEFAULT_BATCH_SIZE};
pub use pagination::{window, Limit, Paginated, Window};
pub use query::{
    catalog_stats, count_banks, count_branches, get_bank, get_bank_by_name, get_branch,
    list_banks, list_branches, BankFilters, BranchFilters, CatalogStats,
};
pub use query_api::CatalogQuery;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
