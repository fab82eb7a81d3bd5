// 🏦 Bank Entity - externally identified financial institution
//
// The id comes from the source data (never generated here) and is the only
// stable identity. Names are not guaranteed unique.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};

/// Column bound for `banks.name`
pub const MAX_BANK_NAME_LEN: usize = 49;

// ============================================================================
// BANK ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    /// Externally assigned identifier
    pub id: i64,

    /// Display name, e.g. "STATE BANK OF INDIA"
    pub name: String,
}

impl Bank {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Bank {
            id,
            name: name.into(),
        }
    }

    /// Case-insensitive exact name comparison (same rule as the name filter)
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.trim().to_lowercase()
    }
}

// ============================================================================
// CREATE PAYLOAD
// ============================================================================

/// Input for the explicit create operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBank {
    pub id: i64,
    pub name: String,
}

impl NewBank {
    /// Check column bounds before touching storage
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();

        if name.is_empty() {
            return Err(CatalogError::validation("Bank name is required"));
        }

        if name.chars().count() > MAX_BANK_NAME_LEN {
            return Err(CatalogError::validation(format!(
                "Bank name must be at most {} characters",
                MAX_BANK_NAME_LEN
            )));
        }

        Ok(())
    }

    pub fn into_bank(self) -> Bank {
        Bank::new(self.id, self.name.trim())
    }
}

// ============================================================================
// TESTS
// ============================================================================
