// Entity Models
//
// Two reference tables with a one-to-many relationship:
// - Bank: externally numbered institution
// - Branch: IFSC-identified location, back-referencing its Bank by id

pub mod bank;
pub mod branch;

pub use bank::{Bank, NewBank, MAX_BANK_NAME_LEN};
pub use branch::{
    non_empty, normalize_ifsc, validate_ifsc, Branch, BranchWithBank, NewBranch, IFSC_LEN,
};
