use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use grievance_common::{bucket_key, Grievance};
use tracing::warn;

use crate::row::from_row;
use crate::sheet::{Row, FIRST_DATA_ROW};

#[derive(Debug, Clone)]
struct Entry {
    row: usize,
    record: Grievance,
}

/// In-memory lookup tables over the sheet: ticket to row, fingerprint to the
/// newest ticket carrying it, and dedup bucket to tickets.
///
/// Snapshots here may lag writes made by other processes. Anything that
/// writes re-reads the row first and checks its version.
#[derive(Debug, Default)]
pub struct SheetIndex {
    entries: HashMap<String, Entry>,
    by_fingerprint: HashMap<String, String>,
    buckets: HashMap<String, BTreeSet<String>>,
    /// Tickets in sheet order.
    order: Vec<String>,
}

impl SheetIndex {
    /// Build from data rows in sheet order. Rows that fail to decode are
    /// skipped with a warning; they still occupy their row number.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut index = Self::default();
        for (i, row) in rows.iter().enumerate() {
            let row_number = FIRST_DATA_ROW + i;
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            match from_row(row) {
                Ok(record) => index.upsert(row_number, record),
                Err(reason) => warn!(row = row_number, reason = %reason, "Skipping malformed sheet row"),
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, ticket_id: &str) -> bool {
        self.entries.contains_key(ticket_id)
    }

    pub fn row_of(&self, ticket_id: &str) -> Option<usize> {
        self.entries.get(ticket_id).map(|e| e.row)
    }

    pub fn get(&self, ticket_id: &str) -> Option<&Grievance> {
        self.entries.get(ticket_id).map(|e| &e.record)
    }

    pub fn by_fingerprint(&self, fingerprint: &str) -> Option<&Grievance> {
        self.by_fingerprint
            .get(fingerprint)
            .and_then(|ticket| self.get(ticket))
    }

    /// Non-terminal records in `bucket` updated at or after `since`.
    pub fn candidates(&self, bucket: &str, since: DateTime<Utc>) -> Vec<Grievance> {
        let Some(tickets) = self.buckets.get(bucket) else {
            return Vec::new();
        };
        let mut found: Vec<Grievance> = tickets
            .iter()
            .filter_map(|t| self.get(t))
            .filter(|g| !g.status.is_terminal() && g.updated_at >= since)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found
    }

    /// Records in sheet order.
    pub fn records(&self) -> impl Iterator<Item = &Grievance> {
        self.order.iter().filter_map(|t| self.get(t))
    }

    /// Insert or replace the record for a ticket, moving its index keys.
    pub fn upsert(&mut self, row: usize, record: Grievance) {
        let ticket = record.ticket_id.clone();
        if let Some(previous) = self.entries.remove(&ticket) {
            let old_bucket = bucket_key(&previous.record.category, previous.record.location.as_ref());
            if let Some(set) = self.buckets.get_mut(&old_bucket) {
                set.remove(&ticket);
            }
        } else {
            self.order.push(ticket.clone());
        }

        if !record.fingerprint.is_empty() {
            // Later rows win: the newest ticket with a fingerprint is the live one.
            let replace = match self.by_fingerprint.get(&record.fingerprint) {
                Some(existing) if existing != &ticket => self
                    .entries
                    .get(existing)
                    .map_or(true, |e| e.row <= row),
                _ => true,
            };
            if replace {
                self.by_fingerprint
                    .insert(record.fingerprint.clone(), ticket.clone());
            }
        }
        self.buckets
            .entry(bucket_key(&record.category, record.location.as_ref()))
            .or_default()
            .insert(ticket.clone());
        self.entries.insert(ticket, Entry { row, record });
    }
}
