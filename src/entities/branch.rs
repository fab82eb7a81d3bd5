// 🏢 Branch Entity - a physical location owned by exactly one Bank
//
// Identity is the 11-character IFSC routing code, always held uppercase.
// The owning bank is resolved at read time (LEFT JOIN), never stored as a pointer.

use crate::entities::bank::Bank;
use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};

/// IFSC codes are fixed-length
pub const IFSC_LEN: usize = 11;

/// Column bounds for the optional text fields
pub const MAX_BRANCH_NAME_LEN: usize = 74;
pub const MAX_ADDRESS_LEN: usize = 195;
pub const MAX_CITY_LEN: usize = 50;
pub const MAX_DISTRICT_LEN: usize = 50;
pub const MAX_STATE_LEN: usize = 26;

/// Uppercase + trim a routing code for storage or lookup
pub fn normalize_ifsc(ifsc: &str) -> String {
    ifsc.trim().to_uppercase()
}

/// Boundary check: routing codes must be exactly 11 characters
pub fn validate_ifsc(ifsc: &str) -> Result<()> {
    if ifsc.chars().count() != IFSC_LEN {
        return Err(CatalogError::validation(format!(
            "IFSC code must be exactly {} characters",
            IFSC_LEN
        )));
    }
    Ok(())
}

/// Map an optional text value so that "" / whitespace means "not provided"
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============================================================================
// BRANCH ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub ifsc: String,
    pub bank_id: i64,
    pub branch: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
}

/// Branch joined with its owning bank (None when bank_id does not resolve)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchWithBank {
    #[serde(flatten)]
    pub branch: Branch,
    pub bank: Option<Bank>,
}

impl BranchWithBank {
    pub fn bank_name(&self) -> Option<&str> {
        self.bank.as_ref().map(|b| b.name.as_str())
    }
}

// ============================================================================
// CREATE PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBranch {
    pub ifsc: String,
    pub bank_id: i64,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl NewBranch {
    pub fn validate(&self) -> Result<()> {
        validate_ifsc(self.ifsc.trim())?;

        let bounds = [
            ("branch", &self.branch, MAX_BRANCH_NAME_LEN),
            ("address", &self.address, MAX_ADDRESS_LEN),
            ("city", &self.city, MAX_CITY_LEN),
            ("district", &self.district, MAX_DISTRICT_LEN),
            ("state", &self.state, MAX_STATE_LEN),
        ];

        for (field, value, max) in bounds {
            if let Some(v) = value {
                if v.trim().chars().count() > max {
                    return Err(CatalogError::validation(format!(
                        "{} must be at most {} characters",
                        field, max
                    )));
                }
            }
        }

        Ok(())
    }

    /// Normalize into the stored shape (uppercase ifsc, empty → None)
    pub fn into_branch(self) -> Branch {
        Branch {
            ifsc: normalize_ifsc(&self.ifsc),
            bank_id: self.bank_id,
            branch: non_empty(self.branch.as_deref()),
            address: non_empty(self.address.as_deref()),
            city: non_empty(self.city.as_deref()),
            district: non_empty(self.district.as_deref()),
            state: non_empty(self.state.as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_branch(ifsc: &str) -> NewBranch {
        NewBranch {
            ifsc: ifsc.to_string(),
            bank_id: 1,
            branch: Some("MUMBAI MAIN".to_string()),
            address: Some("".to_string()),
            city: Some(" MUMBAI ".to_string()),
            district: None,
            state: Some("MAHARASHTRA".to_string()),
        }
    }

    #[test]
    fn test_normalize_ifsc() {
        assert_eq!(normalize_ifsc(" sbin0000001 "), "SBIN0000001");
    }

    #[test]
    fn test_validate_ifsc_length() {
        assert!(validate_ifsc("SBIN0000001").is_ok());

        let err = validate_ifsc("SHORT").unwrap_err();
        assert!(err.to_string().contains("11 characters"));
        assert!(validate_ifsc("SBIN00000012").is_err());
    }

    #[test]
    fn test_into_branch_normalizes_fields() {
        let branch = new_branch("sbin0000001").into_branch();

        assert_eq!(branch.ifsc, "SBIN0000001");
        assert_eq!(branch.address, None); // empty string is "not provided"
        assert_eq!(branch.city.as_deref(), Some("MUMBAI"));
        assert_eq!(branch.district, None);
    }

    #[test]
    fn test_new_branch_field_bounds() {
        assert!(new_branch("SBIN0000001").validate().is_ok());

        let mut long_state = new_branch("SBIN0000001");
        long_state.state = Some("S".repeat(MAX_STATE_LEN + 1));
        let err = long_state.validate().unwrap_err();
        assert!(err.to_string().starts_with("state"));

        assert!(new_branch("SBIN01").validate().is_err());
    }

    #[test]
    fn test_branch_with_bank_serializes_flat() {
        let joined = BranchWithBank {
            branch: new_branch("SBIN0000001").into_branch(),
            bank: Some(Bank::new(1, "STATE BANK OF INDIA")),
        };

        let json = serde_json::to_value(&joined).unwrap();
        assert_eq!(json["ifsc"], "SBIN0000001");
        assert_eq!(json["bank_id"], 1);
        assert_eq!(json["bank"]["name"], "STATE BANK OF INDIA");
        assert!(json["district"].is_null());
        assert_eq!(joined.bank_name(), Some("STATE BANK OF INDIA"));
    }
}
