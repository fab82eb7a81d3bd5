// 📥 Bulk Loader - CSV source file → banks + branches
//
// Pipeline:
//   parse rows (malformed ones skipped and counted)
//   → dedupe by IFSC within the file (first wins)
//   → insert unseen banks in one transaction
//   → insert unseen branches in fixed-size batches, one transaction each
//
// Safe to re-run: rows already in storage are skipped, not rejected.

use crate::db::{insert_bank, insert_branch};
use crate::entities::{non_empty, normalize_ifsc, validate_ifsc, Bank, Branch, MAX_BANK_NAME_LEN};
use crate::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Rows per branch transaction
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Source column names for the bank id/name pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub bank_id: String,
    pub bank_name: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            bank_id: "bank_id".to_string(),
            bank_name: "bank_name".to_string(),
        }
    }
}

/// Outcome of one load run
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub rows_read: usize,
    pub malformed_rows: usize,
    /// Repeated IFSC codes inside the same file
    pub duplicates_skipped: usize,
    pub banks_inserted: usize,
    pub banks_existing: usize,
    pub branches_inserted: usize,
    /// Already present from an earlier run
    pub branches_existing: usize,
    pub failed_batches: usize,
    pub failed_rows: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LoadReport {
    fn started() -> Self {
        Self {
            rows_read: 0,
            malformed_rows: 0,
            duplicates_skipped: 0,
            banks_inserted: 0,
            banks_existing: 0,
            branches_inserted: 0,
            branches_existing: 0,
            failed_batches: 0,
            failed_rows: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.malformed_rows == 0 && self.failed_batches == 0
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

// ============================================================================
// ROW PARSING
// ============================================================================

/// Header positions resolved once per file
struct HeaderIndex {
    ifsc: usize,
    bank_id: usize,
    bank_name: usize,
    branch: Option<usize>,
    address: Option<usize>,
    city: Option<usize>,
    district: Option<usize>,
    state: Option<usize>,
}

impl HeaderIndex {
    fn resolve(headers: &StringRecord, columns: &ColumnMap) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                CatalogError::validation(format!("missing required column '{}'", name))
            })
        };

        Ok(Self {
            ifsc: require("ifsc")?,
            bank_id: require(&columns.bank_id)?,
            bank_name: require(&columns.bank_name)?,
            branch: find("branch"),
            address: find("address"),
            city: find("city"),
            district: find("district"),
            state: find("state"),
        })
    }
}

/// One usable source row
struct SourceRow {
    bank: Bank,
    branch: Branch,
}

fn parse_row(record: &StringRecord, idx: &HeaderIndex) -> Option<SourceRow> {
    let optional = |i: Option<usize>| non_empty(i.and_then(|i| record.get(i)));

    let ifsc = normalize_ifsc(record.get(idx.ifsc)?);
    validate_ifsc(&ifsc).ok()?;

    let bank_id: i64 = record.get(idx.bank_id)?.trim().parse().ok()?;
    let bank_name = non_empty(record.get(idx.bank_name))?;
    if bank_name.chars().count() > MAX_BANK_NAME_LEN {
        return None;
    }

    Some(SourceRow {
        bank: Bank::new(bank_id, bank_name),
        branch: Branch {
            ifsc,
            bank_id,
            branch: optional(idx.branch),
            address: optional(idx.address),
            city: optional(idx.city),
            district: optional(idx.district),
            state: optional(idx.state),
        },
    })
}

// ============================================================================
// LOADER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Loader {
    batch_size: usize,
    columns: ColumnMap,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            columns: ColumnMap::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn load_from_file(&self, conn: &mut Connection, path: &Path) -> Result<LoadReport> {
        info!("Loading catalog from {}", path.display());
        let file = File::open(path)?;
        self.load_reader(conn, file)
    }

    pub fn load_reader<R: Read>(&self, conn: &mut Connection, reader: R) -> Result<LoadReport> {
        let mut report = LoadReport::started();

        // 1. Parse
        let rows = self.read_rows(reader, &mut report)?;

        // 2. Dedupe within the file
        let mut seen = HashSet::new();
        let mut banks: BTreeMap<i64, String> = BTreeMap::new();
        let mut conflicting = HashSet::new();
        let mut staged = Vec::with_capacity(rows.len());

        for row in rows {
            if !seen.insert(row.branch.ifsc.clone()) {
                report.duplicates_skipped += 1;
                continue;
            }

            let name = banks.entry(row.bank.id).or_insert_with(|| row.bank.name.clone());
            if *name != row.bank.name && conflicting.insert(row.bank.id) {
                warn!(
                    "Bank {} appears as both '{}' and '{}', keeping the first",
                    row.bank.id, name, row.bank.name
                );
            }

            staged.push(row.branch);
        }

        // 3. Banks (all-or-nothing; branches depend on them)
        self.insert_banks(conn, banks, &mut report)?;

        // 4. Branches in batches
        self.insert_branches(conn, staged, &mut report)?;

        report.finished_at = Utc::now();
        info!(
            "Load finished: {} rows, {} banks inserted, {} branches inserted, {} already present, {} failed",
            report.rows_read,
            report.banks_inserted,
            report.branches_inserted,
            report.branches_existing,
            report.failed_rows
        );

        Ok(report)
    }

    fn read_rows<R: Read>(&self, reader: R, report: &mut LoadReport) -> Result<Vec<SourceRow>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::Headers)
            .escape(Some(b'\\'))
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let idx = HeaderIndex::resolve(&headers, &self.columns)?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            report.rows_read += 1;

            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    debug!("Skipping unreadable row {}: {}", report.rows_read, e);
                    report.malformed_rows += 1;
                    continue;
                }
            };

            if record.len() != headers.len() {
                debug!(
                    "Skipping row {}: expected {} fields, found {}",
                    report.rows_read,
                    headers.len(),
                    record.len()
                );
                report.malformed_rows += 1;
                continue;
            }

            match parse_row(&record, &idx) {
                Some(row) => rows.push(row),
                None => {
                    debug!("Skipping row {}: invalid ifsc, bank id or bank name", report.rows_read);
                    report.malformed_rows += 1;
                }
            }
        }

        if report.malformed_rows > 0 {
            warn!("Skipped {} malformed rows", report.malformed_rows);
        }

        Ok(rows)
    }

    fn insert_banks(
        &self,
        conn: &mut Connection,
        banks: BTreeMap<i64, String>,
        report: &mut LoadReport,
    ) -> Result<()> {
        let existing: HashSet<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM banks")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<HashSet<i64>>>()?;
            ids
        };

        let (known, new): (Vec<_>, Vec<_>) =
            banks.into_iter().partition(|(id, _)| existing.contains(id));
        report.banks_existing = known.len();

        if new.is_empty() {
            return Ok(());
        }

        let tx = conn.transaction()?;
        for (id, name) in &new {
            insert_bank(&tx, &Bank::new(*id, name.as_str()))?;
        }
        tx.commit()?;

        report.banks_inserted = new.len();
        info!("Inserted {} banks ({} already present)", new.len(), known.len());
        Ok(())
    }

    fn insert_branches(
        &self,
        conn: &mut Connection,
        staged: Vec<Branch>,
        report: &mut LoadReport,
    ) -> Result<()> {
        let existing: HashSet<String> = {
            let mut stmt = conn.prepare("SELECT ifsc FROM branches")?;
            let codes = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|r| r.map(|code| code.to_uppercase()))
                .collect::<rusqlite::Result<HashSet<String>>>()?;
            codes
        };

        let staged_len = staged.len();
        let pending: Vec<Branch> = staged
            .into_iter()
            .filter(|b| !existing.contains(&b.ifsc))
            .collect();
        report.branches_existing = staged_len - pending.len();

        for (n, batch) in pending.chunks(self.batch_size).enumerate() {
            match commit_batch(conn, batch) {
                Ok(inserted) => {
                    report.branches_inserted += inserted;
                    debug!("Batch {} committed ({} branches)", n + 1, inserted);
                }
                Err(e) => {
                    error!("Batch {} rolled back ({} branches): {}", n + 1, batch.len(), e);
                    report.failed_batches += 1;
                    report.failed_rows += batch.len();
                }
            }
        }

        Ok(())
    }
}

/// Load a file with the default batch size and column names
pub fn load_from_file(conn: &mut Connection, path: &Path) -> Result<LoadReport> {
    Loader::new().load_from_file(conn, path)
}

/// Insert one batch atomically; dropping the transaction on error rolls it back
fn commit_batch(conn: &mut Connection, batch: &[Branch]) -> Result<usize> {
    let tx = conn.transaction()?;
    for branch in batch {
        insert_branch(&tx, branch)?;
    }
    tx.commit()?;
    Ok(batch.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    const HEADER: &str = "ifsc,bank_id,branch,address,city,district,state,bank_name\n";

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn sample() -> String {
        format!(
            "{}{}{}{}",
            HEADER,
            "SBIN0000001,1,MUMBAI MAIN,\"MUMBAI SAMACHAR MARG, MUMBAI\",MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "HDFC0000001,2,RTGS-HO,\"KAMALA MILLS COMPOUND, MUMBAI\",MUMBAI,MUMBAI,MAHARASHTRA,HDFC BANK\n",
            "sbin0000002,1,DELHI MAIN,\"11 SANSAD MARG, NEW DELHI\",NEW DELHI,NEW DELHI,DELHI,STATE BANK OF INDIA\n",
        )
    }

    #[test]
    fn test_load_sample() {
        let mut conn = setup();

        let report = Loader::new().load_reader(&mut conn, sample().as_bytes()).unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.banks_inserted, 2);
        assert_eq!(report.branches_inserted, 3);
        assert!(report.is_clean());
        assert_eq!(count(&conn, "banks"), 2);
        assert_eq!(count(&conn, "branches"), 3);
    }

    #[test]
    fn test_quoted_delimiter_kept_in_field() {
        let mut conn = setup();
        Loader::new().load_reader(&mut conn, sample().as_bytes()).unwrap();

        let address: String = conn
            .query_row("SELECT address FROM branches WHERE ifsc = 'HDFC0000001'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(address, "KAMALA MILLS COMPOUND, MUMBAI");
    }

    #[test]
    fn test_ifsc_stored_uppercase() {
        let mut conn = setup();
        Loader::new().load_reader(&mut conn, sample().as_bytes()).unwrap();

        let found: i64 = conn
            .query_row("SELECT COUNT(*) FROM branches WHERE ifsc = 'SBIN0000002'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(found, 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let mut conn = setup();
        let loader = Loader::new();

        loader.load_reader(&mut conn, sample().as_bytes()).unwrap();
        let second = loader.load_reader(&mut conn, sample().as_bytes()).unwrap();

        assert_eq!(second.banks_inserted, 0);
        assert_eq!(second.banks_existing, 2);
        assert_eq!(second.branches_inserted, 0);
        assert_eq!(second.branches_existing, 3);
        assert_eq!(second.duplicates_skipped, 0);
        assert_eq!(count(&conn, "banks"), 2);
        assert_eq!(count(&conn, "branches"), 3);
    }

    #[test]
    fn test_rerun_reports_only_in_file_duplicates() {
        let mut conn = setup();
        let csv = format!(
            "{}{}",
            sample(),
            "HDFC0000001,2,REPEAT,,MUMBAI,MUMBAI,MAHARASHTRA,HDFC BANK\n"
        );
        let loader = Loader::new();

        let first = loader.load_reader(&mut conn, csv.as_bytes()).unwrap();
        let second = loader.load_reader(&mut conn, csv.as_bytes()).unwrap();

        assert_eq!(first.duplicates_skipped, 1);
        assert_eq!(second.duplicates_skipped, 1);
        assert_eq!(second.branches_existing, 3);
        assert_eq!(count(&conn, "branches"), 3);
    }

    #[test]
    fn test_within_file_duplicates_first_wins() {
        let mut conn = setup();
        let csv = format!(
            "{}{}{}",
            HEADER,
            "SBIN0000001,1,FIRST,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SBIN0000001,1,SECOND,,PUNE,PUNE,MAHARASHTRA,STATE BANK OF INDIA\n",
        );

        let report = Loader::new().load_reader(&mut conn, csv.as_bytes()).unwrap();
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(report.branches_inserted, 1);

        let branch: String = conn
            .query_row("SELECT branch FROM branches", [], |r| r.get(0))
            .unwrap();
        assert_eq!(branch, "FIRST");
    }

    #[test]
    fn test_empty_optional_fields_are_null() {
        let mut conn = setup();
        let csv = format!(
            "{}{}",
            HEADER, "SBIN0000001,1,,,MUMBAI,,MAHARASHTRA,STATE BANK OF INDIA\n"
        );
        Loader::new().load_reader(&mut conn, csv.as_bytes()).unwrap();

        let (branch, district): (Option<String>, Option<String>) = conn
            .query_row("SELECT branch, district FROM branches", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(branch, None);
        assert_eq!(district, None);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let mut conn = setup();
        let csv = format!(
            "{}{}{}{}{}{}",
            HEADER,
            "SBIN0000001,1,MUMBAI MAIN,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SBIN0000002,not-a-number,X,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            ",1,NO CODE,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SBIN0000003,1,TOO,FEW\n",
            "SBIN0000004,1,NO BANK NAME,,MUMBAI,MUMBAI,MAHARASHTRA,\n",
        );

        let report = Loader::new().load_reader(&mut conn, csv.as_bytes()).unwrap();
        assert_eq!(report.rows_read, 5);
        assert_eq!(report.malformed_rows, 4);
        assert_eq!(report.branches_inserted, 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_wrong_length_codes_and_long_bank_names_skipped() {
        let mut conn = setup();
        let long_name = "X".repeat(MAX_BANK_NAME_LEN + 1);
        let csv = format!(
            "{}{}{}{}{}",
            HEADER,
            "SBIN00000012345,1,TOO LONG,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SB1,1,TOO SHORT,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            format!("XXXX0000001,9,MAIN,,MUMBAI,MUMBAI,MAHARASHTRA,{}\n", long_name),
            "SBIN0000001,1,MUMBAI MAIN,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
        );

        let report = Loader::new().load_reader(&mut conn, csv.as_bytes()).unwrap();
        assert_eq!(report.malformed_rows, 3);
        assert_eq!(report.branches_inserted, 1);
        assert_eq!(report.banks_inserted, 1);

        let codes: Vec<String> = conn
            .prepare("SELECT ifsc FROM branches")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(codes, vec!["SBIN0000001".to_string()]);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let mut conn = setup();
        let csv = "ifsc,branch,bank_name\nSBIN0000001,MAIN,STATE BANK OF INDIA\n";

        let result = Loader::new().load_reader(&mut conn, csv.as_bytes());
        assert!(matches!(result, Err(CatalogError::Validation(_))));
        assert_eq!(count(&conn, "banks"), 0);
    }

    #[test]
    fn test_headers_are_trimmed() {
        let mut conn = setup();
        let csv = " ifsc , bank_id ,bank_name \nSBIN0000001,1,STATE BANK OF INDIA\n";

        let report = Loader::new().load_reader(&mut conn, csv.as_bytes()).unwrap();
        assert_eq!(report.branches_inserted, 1);
    }

    #[test]
    fn test_custom_column_names() {
        let mut conn = setup();
        let csv = "ifsc,bid,bname,city\nSBIN0000001,1,STATE BANK OF INDIA,MUMBAI\n";
        let columns = ColumnMap {
            bank_id: "bid".to_string(),
            bank_name: "bname".to_string(),
        };

        let report = Loader::new()
            .with_columns(columns)
            .load_reader(&mut conn, csv.as_bytes())
            .unwrap();
        assert_eq!(report.banks_inserted, 1);
        assert_eq!(report.branches_inserted, 1);
    }

    #[test]
    fn test_conflicting_bank_names_first_wins() {
        let mut conn = setup();
        let csv = format!(
            "{}{}{}",
            HEADER,
            "SBIN0000001,1,A,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SBIN0000002,1,B,,MUMBAI,MUMBAI,MAHARASHTRA,SBI\n",
        );

        Loader::new().load_reader(&mut conn, csv.as_bytes()).unwrap();

        let name: String = conn
            .query_row("SELECT name FROM banks WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "STATE BANK OF INDIA");
    }

    #[test]
    fn test_failed_batch_rolls_back_and_continues() {
        let mut conn = setup();
        conn.execute_batch(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON branches
             WHEN NEW.ifsc = 'BADX0000001'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let csv = format!(
            "{}{}{}{}{}",
            HEADER,
            "SBIN0000001,1,A,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SBIN0000002,1,B,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "BADX0000001,1,C,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
            "SBIN0000004,1,D,,MUMBAI,MUMBAI,MAHARASHTRA,STATE BANK OF INDIA\n",
        );

        let report = Loader::new()
            .with_batch_size(2)
            .load_reader(&mut conn, csv.as_bytes())
            .unwrap();

        // second batch (BADX0000001 + SBIN0000004) rolled back as a unit
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.failed_rows, 2);
        assert_eq!(report.branches_inserted, 2);
        assert_eq!(count(&conn, "branches"), 2);
    }

    #[test]
    fn test_batch_size_floor() {
        assert_eq!(Loader::new().with_batch_size(0).batch_size(), 1);
        assert_eq!(Loader::new().batch_size(), DEFAULT_BATCH_SIZE);
    }
}
