use crate::entities::{Bank, Branch, BranchWithBank, NewBank, NewBranch};
use crate::error::{CatalogError, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (no-op for in-memory databases)
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Banks Table (ids are assigned by the source data, never generated)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS banks (
            id INTEGER PRIMARY KEY,
            name VARCHAR(49) NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Branches Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS branches (
            ifsc VARCHAR(11) PRIMARY KEY,
            bank_id INTEGER NOT NULL REFERENCES banks(id),
            branch VARCHAR(74),
            address VARCHAR(195),
            city VARCHAR(50),
            district VARCHAR(50),
            state VARCHAR(26)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_branches_bank_id ON branches(bank_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_branches_city ON branches(city)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SHARED HANDLE
// ============================================================================

/// Storage handle shared by request handlers.
///
/// Callers never hold the connection directly: `with_conn` scopes the
/// acquisition to one closure and releases it when the closure returns.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!("Database opened: {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut guard = self.conn.lock().map_err(|_| CatalogError::LockPoisoned)?;
        f(&mut guard)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Column list shared by every joined branch query
pub(crate) const BRANCH_COLUMNS: &str =
    "br.ifsc, br.bank_id, br.branch, br.address, br.city, br.district, br.state, b.id, b.name";

pub(crate) fn bank_from_row(row: &Row) -> rusqlite::Result<Bank> {
    Ok(Bank {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Map a row selected with `BRANCH_COLUMNS`
pub(crate) fn branch_with_bank_from_row(row: &Row) -> rusqlite::Result<BranchWithBank> {
    let ifsc: String = row.get(0)?;
    let bank_id: Option<i64> = row.get(7)?;
    let bank_name: Option<String> = row.get(8)?;

    let bank = match (bank_id, bank_name) {
        (Some(id), Some(name)) => Some(Bank { id, name }),
        _ => None,
    };

    Ok(BranchWithBank {
        branch: Branch {
            ifsc: ifsc.to_uppercase(),
            bank_id: row.get(1)?,
            branch: row.get(2)?,
            address: row.get(3)?,
            city: row.get(4)?,
            district: row.get(5)?,
            state: row.get(6)?,
        },
        bank,
    })
}

// ============================================================================
// WRITES
// ============================================================================

pub(crate) fn insert_bank(conn: &Connection, bank: &Bank) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO banks (id, name) VALUES (?1, ?2)",
        params![bank.id, bank.name],
    )
}

pub(crate) fn insert_branch(conn: &Connection, branch: &Branch) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO branches (ifsc, bank_id, branch, address, city, district, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            branch.ifsc,
            branch.bank_id,
            branch.branch,
            branch.address,
            branch.city,
            branch.district,
            branch.state,
        ],
    )
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Create a single bank (explicit create operation)
pub fn create_bank(conn: &Connection, new_bank: &NewBank) -> Result<Bank> {
    new_bank.validate()?;
    let bank = new_bank.clone().into_bank();

    match insert_bank(conn, &bank) {
        Ok(_) => {
            debug!("Created bank {} ({})", bank.id, bank.name);
            Ok(bank)
        }
        Err(e) if is_constraint_violation(&e) => {
            Err(CatalogError::Conflict(format!("Bank {}", bank.id)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Create a single branch; its bank must already exist
pub fn create_branch(conn: &Connection, new_branch: &NewBranch) -> Result<BranchWithBank> {
    new_branch.validate()?;
    let branch = new_branch.clone().into_branch();

    let bank = conn
        .query_row(
            "SELECT id, name FROM banks WHERE id = ?1",
            [branch.bank_id],
            bank_from_row,
        )
        .optional()?
        .ok_or_else(|| CatalogError::not_found("Bank"))?;

    match insert_branch(conn, &branch) {
        Ok(_) => {
            debug!("Created branch {} for bank {}", branch.ifsc, bank.id);
            Ok(BranchWithBank {
                branch,
                bank: Some(bank),
            })
        }
        Err(e) if is_constraint_violation(&e) => {
            Err(CatalogError::Conflict(format!("Branch {}", branch.ifsc)))
        }
        Err(e) => Err(e.into()),
    }
}
