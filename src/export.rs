// 📤 Export Stream - filtered branches as CSV, one storage batch at a time
//
// Never materializes the full result set: each batch is a bounded
// list_branches call with an increasing skip.

use crate::db::Database;
use crate::entities::{Bank, BranchWithBank};
use crate::error::{CatalogError, Result};
use crate::pagination::Limit;
use crate::query::{get_bank, list_branches, BranchFilters};
use csv::{Terminator, WriterBuilder};
use rusqlite::Connection;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use tracing::{debug, warn};

/// Rows fetched per storage round-trip
pub const EXPORT_BATCH_SIZE: u32 = 1000;

pub const EXPORT_HEADER: &str = "ifsc,bank_id,bank_name,branch,address,city,district,state";

// ============================================================================
// SOURCE
// ============================================================================

/// Where the export reads its rows from
pub trait BranchSource {
    fn fetch_branches(
        &self,
        filters: &BranchFilters,
        skip: u64,
        limit: Limit,
    ) -> Result<Vec<BranchWithBank>>;

    fn fetch_bank(&self, id: i64) -> Result<Option<Bank>>;
}

impl BranchSource for Connection {
    fn fetch_branches(
        &self,
        filters: &BranchFilters,
        skip: u64,
        limit: Limit,
    ) -> Result<Vec<BranchWithBank>> {
        list_branches(self, filters, skip, limit)
    }

    fn fetch_bank(&self, id: i64) -> Result<Option<Bank>> {
        get_bank(self, id)
    }
}

/// Locks once per batch; the lock is released between batches
impl BranchSource for Database {
    fn fetch_branches(
        &self,
        filters: &BranchFilters,
        skip: u64,
        limit: Limit,
    ) -> Result<Vec<BranchWithBank>> {
        self.with_conn(|conn| list_branches(conn, filters, skip, limit))
    }

    fn fetch_bank(&self, id: i64) -> Result<Option<Bank>> {
        self.with_conn(|conn| get_bank(conn, id))
    }
}

impl<T: BranchSource + ?Sized> BranchSource for &T {
    fn fetch_branches(
        &self,
        filters: &BranchFilters,
        skip: u64,
        limit: Limit,
    ) -> Result<Vec<BranchWithBank>> {
        (**self).fetch_branches(filters, skip, limit)
    }

    fn fetch_bank(&self, id: i64) -> Result<Option<Bank>> {
        (**self).fetch_bank(id)
    }
}

// ============================================================================
// ENCODING
// ============================================================================

fn encode_line(fields: &[&str]) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(fields)?;

    let bytes = wtr.into_inner().map_err(|e| CatalogError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| CatalogError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

// ============================================================================
// STREAM
// ============================================================================

pub struct ExportStream<S> {
    source: S,
    filters: BranchFilters,
    batch_size: u32,
    skip: u64,
    header_sent: bool,
    exhausted: bool,
    /// Names resolved outside the join, keyed by bank id
    bank_names: HashMap<i64, String>,
    buffered: VecDeque<String>,
}

impl<S: BranchSource> ExportStream<S> {
    pub fn new(source: S, filters: BranchFilters) -> Self {
        Self {
            source,
            filters,
            batch_size: EXPORT_BATCH_SIZE,
            skip: 0,
            header_sent: false,
            exhausted: false,
            bank_names: HashMap::new(),
            buffered: VecDeque::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Lines for the next storage batch, header first.
    ///
    /// Returns `Ok(None)` once a batch comes back short or empty.
    pub fn next_batch(&mut self) -> Result<Option<Vec<String>>> {
        let mut lines = Vec::new();

        if !self.header_sent {
            self.header_sent = true;
            lines.push(format!("{}\n", EXPORT_HEADER));
        }

        if !self.exhausted {
            let rows = self.source.fetch_branches(
                &self.filters,
                self.skip,
                Limit::Bounded(self.batch_size),
            )?;

            if rows.len() < self.batch_size as usize {
                self.exhausted = true;
            }
            self.skip += rows.len() as u64;
            debug!("Export batch: {} rows (skip now {})", rows.len(), self.skip);

            for row in &rows {
                lines.push(self.encode_row(row)?);
            }
        }

        if lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(lines))
        }
    }

    /// Drain the stream into `out`; returns the number of data rows written
    pub fn write_to<W: Write>(mut self, out: &mut W) -> Result<usize> {
        let mut rows: usize = 0;
        while let Some(lines) = self.next_batch()? {
            for line in lines {
                out.write_all(line.as_bytes())?;
                rows += 1;
            }
        }
        out.flush()?;
        // header is not a data row
        Ok(rows.saturating_sub(1))
    }

    fn encode_row(&mut self, row: &BranchWithBank) -> Result<String> {
        let bank_name = match row.bank_name() {
            Some(name) => name.to_string(),
            None => self.resolve_bank_name(row.branch.bank_id)?,
        };

        let b = &row.branch;
        let bank_id = b.bank_id.to_string();
        encode_line(&[
            b.ifsc.as_str(),
            bank_id.as_str(),
            bank_name.as_str(),
            b.branch.as_deref().unwrap_or(""),
            b.address.as_deref().unwrap_or(""),
            b.city.as_deref().unwrap_or(""),
            b.district.as_deref().unwrap_or(""),
            b.state.as_deref().unwrap_or(""),
        ])
    }

    fn resolve_bank_name(&mut self, bank_id: i64) -> Result<String> {
        if let Some(name) = self.bank_names.get(&bank_id) {
            return Ok(name.clone());
        }

        let name = match self.source.fetch_bank(bank_id)? {
            Some(bank) => bank.name,
            None => {
                warn!("Bank {} not found during export, writing empty name", bank_id);
                String::new()
            }
        };

        self.bank_names.insert(bank_id, name.clone());
        Ok(name)
    }
}

/// One newline-terminated line per item; stops after the first error
impl<S: BranchSource> Iterator for ExportStream<S> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.buffered.pop_front() {
                return Some(Ok(line));
            }

            match self.next_batch() {
                Ok(Some(lines)) => self.buffered.extend(lines),
                Ok(None) => return None,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
