// SPDX-FileCopyrightText: 2026 The Tollgate Authors
// SPDX-License-Identifier: Apache-2.0

// src/application/denial_log.rs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::DenialRecord;

pub const DEFAULT_CAPACITY: usize = 1000;

/// Filters for reading the ring buffer back out.
#[derive(Debug, Clone, Default)]
pub struct DenialQuery {
    pub tenant: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Maximum records returned; 0 means the admin default of 100.
    pub limit: usize,
}

/// Bounded FIFO ring of recent denial records.
///
/// A single writer stream (the decision engine) appends; readers get copied
/// snapshots and never block the writer for long. When full, the oldest
/// record is overwritten.
pub struct DenialLog {
    capacity: usize,
    records: Mutex<VecDeque<DenialRecord>>,
}

impl DenialLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, record: DenialRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Matching records, newest first.
    pub fn query(&self, query: &DenialQuery) -> Vec<DenialRecord> {
        let limit = if query.limit == 0 { 100 } else { query.limit };
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| query.tenant.as_deref().map_or(true, |t| r.tenant == t))
            .filter(|r| query.since.map_or(true, |since| r.at >= since))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Recent cardinality denials, newest first.
    pub fn recent_cardinality(&self, limit: usize) -> Vec<DenialRecord> {
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| r.is_cardinality())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
