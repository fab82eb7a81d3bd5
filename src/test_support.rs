// Shared fixtures for unit tests: three banks, four branches

use crate::db::{create_bank, create_branch, setup_database, Database};
use crate::entities::{NewBank, NewBranch};
use rusqlite::Connection;

pub const SBI: &str = "STATE BANK OF INDIA";

pub fn seed(conn: &Connection) {
    for (id, name) in [(1, SBI), (2, "HDFC BANK"), (3, "ICICI BANK")] {
        create_bank(conn, &NewBank { id, name: name.to_string() }).unwrap();
    }

    let branches = [
        ("SBIN0000001", 1, "MUMBAI MAIN", "MUMBAI SAMACHAR MARG, MUMBAI", "MUMBAI", "MUMBAI", "MAHARASHTRA"),
        ("HDFC0000001", 2, "RTGS-HO", "KAMALA MILLS COMPOUND, MUMBAI", "MUMBAI", "MUMBAI", "MAHARASHTRA"),
        ("ICIC0000001", 3, "MUMBAI NARIMAN POINT", "MITTAL TOWER, MUMBAI", "MUMBAI", "MUMBAI", "MAHARASHTRA"),
        ("SBIN0000002", 1, "DELHI MAIN", "11 SANSAD MARG, NEW DELHI", "NEW DELHI", "NEW DELHI", "DELHI"),
    ];

    for (ifsc, bank_id, branch, address, city, district, state) in branches {
        let new_branch = NewBranch {
            ifsc: ifsc.to_string(),
            bank_id,
            branch: Some(branch.to_string()),
            address: Some(address.to_string()),
            city: Some(city.to_string()),
            district: Some(district.to_string()),
            state: Some(state.to_string()),
        };
        create_branch(conn, &new_branch).unwrap();
    }
}

pub fn seeded_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    seed(&conn);
    conn
}

pub fn seeded_database() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.with_conn(|conn| {
        seed(conn);
        Ok(())
    })
    .unwrap();
    db
}
