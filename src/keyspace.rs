//! Keyspace inventory: per-database counts of keys grouped by category.

use crate::config::Settings;
use crate::connection::{ConnectionManager, Handle};
use crate::cursor::ScanCursor;
use crate::error::BrowserResult;
use crate::profiles::ConnectionProfile;
use crate::value_format;
use redis::Value;
use std::collections::BTreeMap;

/// Category of a key: everything before the first delimiter, or the whole name.
pub fn category_of(key: &str, delimiter: char) -> &str {
    match key.split_once(delimiter) {
        Some((prefix, _)) => prefix,
        None => key,
    }
}

/// Category → count for one database.
pub type CategoryCounts = BTreeMap<String, u64>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CategoryCountTable {
    databases: BTreeMap<u8, CategoryCounts>,
}

impl CategoryCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_database(&mut self, db_index: u8, counts: CategoryCounts) {
        self.databases.insert(db_index, counts);
    }

    pub fn database(&self, db_index: u8) -> Option<&CategoryCounts> {
        self.databases.get(&db_index)
    }

    /// Ordered `(category, count)` rows for one database.
    pub fn rows(&self, db_index: u8) -> Vec<(String, u64)> {
        self.databases
            .get(&db_index)
            .map(|counts| counts.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    pub fn total(&self, db_index: u8) -> u64 {
        self.databases
            .get(&db_index)
            .map_or(0, |counts| counts.values().sum())
    }

    /// One `db{i} ({n})` label per scanned database.
    pub fn database_summaries(&self) -> Vec<String> {
        self.databases
            .keys()
            .map(|db| format!("db{} ({})", db, self.total(*db)))
            .collect()
    }

    /// Removes one key from `category`, dropping the category when it reaches
    /// zero. Returns `false` when there was nothing to decrement.
    pub fn decrement(&mut self, db_index: u8, category: &str) -> bool {
        let Some(counts) = self.databases.get_mut(&db_index) else {
            return false;
        };
        let Some(count) = counts.get_mut(category) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(category);
        }
        true
    }
}

/// Adds one batch of raw SCAN results to `counts`. Returns how many keys it saw.
pub fn tally_batch(counts: &mut CategoryCounts, batch: &[Value], delimiter: char) -> usize {
    let mut seen = 0;
    for entry in batch {
        let Some(bytes) = value_format::value_to_bytes(entry) else {
            continue;
        };
        let name = String::from_utf8_lossy(&bytes);
        *counts
            .entry(category_of(&name, delimiter).to_string())
            .or_insert(0) += 1;
        seen += 1;
    }
    seen
}

/// Owns the authoritative count table for a session.
#[derive(Debug, Clone)]
pub struct KeyspaceScanner {
    table: CategoryCountTable,
    scan_count: usize,
    database_count: u8,
    delimiter: char,
}

impl KeyspaceScanner {
    pub fn new(settings: &Settings) -> Self {
        KeyspaceScanner {
            table: CategoryCountTable::new(),
            scan_count: settings.scan_count,
            database_count: settings.database_count,
            delimiter: settings.delimiter,
        }
    }

    pub fn table(&self) -> &CategoryCountTable {
        &self.table
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Counts the categories of every key in the handle's database.
    pub async fn scan_database(&self, handle: &mut Handle) -> BrowserResult<CategoryCounts> {
        let mut counts = CategoryCounts::new();
        let mut cursor = ScanCursor::keyspace(self.scan_count);
        let mut scanned = 0usize;
        while let Some(batch) = cursor.next_batch(handle).await? {
            scanned += tally_batch(&mut counts, &batch, self.delimiter);
        }
        log::info!(
            "Scanned DB {} of {}: {} keys in {} categories",
            handle.db_index(),
            handle.profile_name(),
            scanned,
            counts.len()
        );
        Ok(counts)
    }

    /// Full inventory of every database, one handle per database. The previous
    /// table is only replaced once every database scanned successfully.
    pub async fn scan_all(
        &mut self,
        manager: &ConnectionManager,
        profile: &ConnectionProfile,
    ) -> BrowserResult<&CategoryCountTable> {
        let mut table = CategoryCountTable::new();
        for db_index in 0..self.database_count {
            let mut handle = manager.open(profile, db_index).await?;
            let counts = self.scan_database(&mut handle).await?;
            table.insert_database(db_index, counts);
        }
        self.table = table;
        Ok(&self.table)
    }

    pub fn decrement(&mut self, db_index: u8, category: &str) {
        if !self.table.decrement(db_index, category) {
            log::warn!(
                "Ignoring decrement of absent category '{}' in DB {}",
                category,
                db_index
            );
        }
    }

    /// Decrements the category that `key` belongs to.
    pub fn decrement_for_key(&mut self, db_index: u8, key: &str) {
        let category = category_of(key, self.delimiter).to_string();
        self.decrement(db_index, &category);
    }
}
