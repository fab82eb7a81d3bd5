// 🔎 Query/Filter Engine
// Composes optional predicates over banks and branches.
//
// List and count for the same entity go through the same predicate builder,
// so count(filters) always equals the length of an unbounded list(filters).

use crate::db::{bank_from_row, branch_with_bank_from_row, BRANCH_COLUMNS};
use crate::entities::{non_empty, normalize_ifsc, Bank, BranchWithBank};
use crate::error::Result;
use crate::pagination::Limit;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// FILTER CRITERIA
// ============================================================================

/// Optional branch predicates. Each present field narrows the result.
///
/// Text fields that are empty after trimming count as absent; `bank_id`
/// applies whenever it is `Some`, zero included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFilters {
    #[serde(default)]
    pub bank_id: Option<i64>,
    /// Case-insensitive exact match on the owning bank's name
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Case-insensitive substring of branch name, address or IFSC
    #[serde(default)]
    pub search: Option<String>,
}

impl BranchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bank_id(mut self, bank_id: i64) -> Self {
        self.bank_id = Some(bank_id);
        self
    }

    pub fn with_bank_name(mut self, bank_name: &str) -> Self {
        self.bank_name = Some(bank_name.to_string());
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_district(mut self, district: &str) -> Self {
        self.district = Some(district.to_string());
        self
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    pub fn with_search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }

    /// Drop empty text values so they read as "not provided"
    pub fn normalized(&self) -> Self {
        BranchFilters {
            bank_id: self.bank_id,
            bank_name: non_empty(self.bank_name.as_deref()),
            city: non_empty(self.city.as_deref()),
            district: non_empty(self.district.as_deref()),
            state: non_empty(self.state.as_deref()),
            search: non_empty(self.search.as_deref()),
        }
    }

    /// True when no predicate would be applied
    pub fn is_empty(&self) -> bool {
        self.normalized() == BranchFilters::default()
    }
}

/// Optional bank predicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankFilters {
    /// Case-insensitive substring of the bank name
    #[serde(default)]
    pub search: Option<String>,
}

impl BankFilters {
    pub fn search(term: &str) -> Self {
        BankFilters {
            search: Some(term.to_string()),
        }
    }
}

// ============================================================================
// PREDICATE COMPOSITION
// ============================================================================

/// WHERE clauses and their positional parameters, built together
#[derive(Debug, Default)]
struct Predicates {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Predicates {
    fn push(&mut self, clause: &str, value: Value) {
        self.clauses.push(clause.to_string());
        self.params.push(value);
    }

    /// Case-insensitive exact equality on a text column
    fn push_equals_ci(&mut self, column: &str, value: &str) {
        self.push(
            &format!("LOWER({}) = LOWER(?)", column),
            Value::Text(value.to_string()),
        );
    }

    /// Substring match OR-ed across `columns`
    fn push_search(&mut self, columns: &[&str], term: &str) {
        let pattern = like_pattern(term);
        let alternatives: Vec<String> = columns
            .iter()
            .map(|c| format!("LOWER({}) LIKE LOWER(?) ESCAPE '\\'", c))
            .collect();

        self.clauses.push(format!("({})", alternatives.join(" OR ")));
        for _ in columns {
            self.params.push(Value::Text(pattern.clone()));
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// `%term%` with LIKE metacharacters escaped so the term matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn branch_predicates(filters: &BranchFilters) -> Predicates {
    let filters = filters.normalized();
    let mut p = Predicates::default();

    if let Some(bank_id) = filters.bank_id {
        p.push("br.bank_id = ?", Value::Integer(bank_id));
    }
    if let Some(bank_name) = &filters.bank_name {
        p.push_equals_ci("b.name", bank_name);
    }
    if let Some(city) = &filters.city {
        p.push_equals_ci("br.city", city);
    }
    if let Some(district) = &filters.district {
        p.push_equals_ci("br.district", district);
    }
    if let Some(state) = &filters.state {
        p.push_equals_ci("br.state", state);
    }
    if let Some(search) = &filters.search {
        p.push_search(&["br.branch", "br.address", "br.ifsc"], search);
    }

    p
}

fn bank_predicates(filters: &BankFilters) -> Predicates {
    let mut p = Predicates::default();

    if let Some(search) = non_empty(filters.search.as_deref()) {
        p.push_search(&["name"], &search);
    }

    p
}

const BRANCH_FROM: &str = "FROM branches br LEFT JOIN banks b ON b.id = br.bank_id";

// ============================================================================
// BANK QUERIES
// ============================================================================

pub fn list_banks(
    conn: &Connection,
    filters: &BankFilters,
    skip: u64,
    limit: Limit,
) -> Result<Vec<Bank>> {
    let p = bank_predicates(filters);
    let sql = format!(
        "SELECT id, name FROM banks{} ORDER BY id LIMIT ? OFFSET ?",
        p.where_sql()
    );

    let mut params = p.params;
    params.push(Value::Integer(limit.as_sql()));
    params.push(Value::Integer(skip as i64));

    let mut stmt = conn.prepare(&sql)?;
    let banks = stmt
        .query_map(params_from_iter(params), bank_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(banks)
}

pub fn count_banks(conn: &Connection, filters: &BankFilters) -> Result<i64> {
    let p = bank_predicates(filters);
    let sql = format!("SELECT COUNT(*) FROM banks{}", p.where_sql());

    let count = conn.query_row(&sql, params_from_iter(p.params), |row| row.get(0))?;
    Ok(count)
}

pub fn get_bank(conn: &Connection, id: i64) -> Result<Option<Bank>> {
    let bank = conn
        .query_row("SELECT id, name FROM banks WHERE id = ?1", [id], bank_from_row)
        .optional()?;
    Ok(bank)
}

/// Case-insensitive exact name lookup; lowest id wins if names repeat
pub fn get_bank_by_name(conn: &Connection, name: &str) -> Result<Option<Bank>> {
    let bank = conn
        .query_row(
            "SELECT id, name FROM banks WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1",
            [name.trim()],
            bank_from_row,
        )
        .optional()?;
    Ok(bank)
}

// ============================================================================
// BRANCH QUERIES
// ============================================================================

/// Branches joined with their bank, in insertion order
pub fn list_branches(
    conn: &Connection,
    filters: &BranchFilters,
    skip: u64,
    limit: Limit,
) -> Result<Vec<BranchWithBank>> {
    let p = branch_predicates(filters);
    let sql = format!(
        "SELECT {} {}{} ORDER BY br.rowid LIMIT ? OFFSET ?",
        BRANCH_COLUMNS,
        BRANCH_FROM,
        p.where_sql()
    );
    debug!("list_branches: {} ({} params)", sql, p.params.len());

    let mut params = p.params;
    params.push(Value::Integer(limit.as_sql()));
    params.push(Value::Integer(skip as i64));

    let mut stmt = conn.prepare(&sql)?;
    let branches = stmt
        .query_map(params_from_iter(params), branch_with_bank_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(branches)
}

pub fn count_branches(conn: &Connection, filters: &BranchFilters) -> Result<i64> {
    let p = branch_predicates(filters);
    let sql = format!("SELECT COUNT(*) {}{}", BRANCH_FROM, p.where_sql());

    let count = conn.query_row(&sql, params_from_iter(p.params), |row| row.get(0))?;
    Ok(count)
}

/// Lookup by routing code; input is uppercased before comparison
pub fn get_branch(conn: &Connection, ifsc: &str) -> Result<Option<BranchWithBank>> {
    let sql = format!("SELECT {} {} WHERE br.ifsc = ?1", BRANCH_COLUMNS, BRANCH_FROM);

    let branch = conn
        .query_row(&sql, [normalize_ifsc(ifsc)], branch_with_bank_from_row)
        .optional()?;
    Ok(branch)
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_banks: i64,
    pub total_branches: i64,
}

pub fn catalog_stats(conn: &Connection) -> Result<CatalogStats> {
    Ok(CatalogStats {
        total_banks: count_banks(conn, &BankFilters::default())?,
        total_branches: count_branches(conn, &BranchFilters::default())?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
