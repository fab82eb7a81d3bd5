// 🧭 Query documents - a small JSON query language over the catalog
//
// Four root queries, selected by the "query" tag:
//   {"query": "branches", "bank_name"?, "city"?, "state"?, "limit"?, "offset"?}
//   {"query": "banks", "limit"?, "offset"?}
//   {"query": "bank", "bank_id"}
//   {"query": "branch", "ifsc"}
//
// Missing single entities come back as null rather than an error.

use crate::entities::{Bank, BranchWithBank};
use crate::error::{CatalogError, Result};
use crate::pagination::{Limit, MAX_PAGE_SIZE};
use crate::query::{get_bank, get_branch, list_banks, list_branches, BankFilters, BranchFilters};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BRANCH_LIMIT: i64 = 50;
const DEFAULT_BANK_LIMIT: i64 = 100;

fn default_branch_limit() -> i64 {
    DEFAULT_BRANCH_LIMIT
}

fn default_bank_limit() -> i64 {
    DEFAULT_BANK_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum CatalogQuery {
    Branches {
        #[serde(default)]
        bank_name: Option<String>,
        #[serde(default)]
        city: Option<String>,
        #[serde(default)]
        state: Option<String>,
        #[serde(default = "default_branch_limit")]
        limit: i64,
        #[serde(default)]
        offset: i64,
    },
    Banks {
        #[serde(default = "default_bank_limit")]
        limit: i64,
        #[serde(default)]
        offset: i64,
    },
    Bank {
        bank_id: i64,
    },
    Branch {
        ifsc: String,
    },
}

#[derive(Debug, Serialize)]
pub struct Edge<T> {
    pub node: T,
}

/// Branch list wrapped as edges
#[derive(Debug, Serialize)]
pub struct BranchConnection {
    pub edges: Vec<Edge<BranchWithBank>>,
}

impl From<Vec<BranchWithBank>> for BranchConnection {
    fn from(branches: Vec<BranchWithBank>) -> Self {
        Self {
            edges: branches.into_iter().map(|node| Edge { node }).collect(),
        }
    }
}

fn slice(limit: i64, offset: i64) -> Result<(u64, Limit)> {
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(CatalogError::validation(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    if offset < 0 {
        return Err(CatalogError::validation("offset must not be negative"));
    }
    Ok((offset as u64, Limit::Bounded(limit as u32)))
}

impl CatalogQuery {
    pub fn execute(&self, conn: &Connection) -> Result<Value> {
        let value = match self {
            CatalogQuery::Branches {
                bank_name,
                city,
                state,
                limit,
                offset,
            } => {
                let (skip, limit) = slice(*limit, *offset)?;
                let filters = BranchFilters {
                    bank_name: bank_name.clone(),
                    city: city.clone(),
                    state: state.clone(),
                    ..Default::default()
                };
                let branches = list_branches(conn, &filters, skip, limit)?;
                serde_json::to_value(BranchConnection::from(branches))
            }
            CatalogQuery::Banks { limit, offset } => {
                let (skip, limit) = slice(*limit, *offset)?;
                let banks: Vec<Bank> = list_banks(conn, &BankFilters::default(), skip, limit)?;
                serde_json::to_value(banks)
            }
            CatalogQuery::Bank { bank_id } => serde_json::to_value(get_bank(conn, *bank_id)?),
            CatalogQuery::Branch { ifsc } => serde_json::to_value(get_branch(conn, ifsc)?),
        };

        value.map_err(|e| CatalogError::validation(format!("unserializable result: {}", e)))
    }
}
