//! Bounded in-memory capture of facility lines.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use super::Facility;

const CACHE_CREATED_PREFIX: &str = "proxy cache created for chain ";

/// One captured trace line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub timestamp: String,
    pub facility: &'static str,
    pub message: String,
}

impl TraceRecord {
    #[must_use]
    pub fn new(facility: Facility, message: String) -> Self {
        Self { timestamp: Utc::now().to_rfc3339(), facility: facility.target(), message }
    }

    /// `<facility>: <message>`, as printed on the diagnostic channel.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{}: {}", self.facility, self.message)
    }
}

/// Ring buffer of recent trace records.
///
/// Once `max_size` records are held, the oldest is evicted for each new one.
pub struct TraceBuffer {
    records: RwLock<VecDeque<TraceRecord>>,
    max_size: usize,
}

impl TraceBuffer {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { records: RwLock::new(VecDeque::with_capacity(max_size.min(1024))), max_size }
    }

    pub fn push(&self, record: TraceRecord) {
        let mut records = self.records.write();

        if records.len() >= self.max_size {
            records.pop_front();
        }

        records.push_back(record);
    }

    /// All held lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.records.read().iter().map(TraceRecord::line).collect()
    }

    /// The `limit` most recent records, most recent first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<TraceRecord> {
        self.records.read().iter().rev().take(limit).cloned().collect()
    }

    /// Number of held lines exactly equal to `line`.
    #[must_use]
    pub fn count_line(&self, line: &str) -> usize {
        self.records.read().iter().filter(|record| record.line() == line).count()
    }

    /// `(chain, block)` of every "proxy cache created" line, oldest first.
    #[must_use]
    pub fn cache_creations(&self) -> Vec<(String, String)> {
        self.records
            .read()
            .iter()
            .filter(|record| record.facility == Facility::ProxyRpc.target())
            .filter_map(|record| {
                let rest = record.message.strip_prefix(CACHE_CREATED_PREFIX)?;
                let (chain, block) = rest.split_once(" and block ")?;
                Some((chain.to_string(), block.to_string()))
            })
            .collect()
    }

    /// Position of the first held line equal to `line`, oldest first.
    #[must_use]
    pub fn position(&self, line: &str) -> Option<usize> {
        self.records.read().iter().position(|record| record.line() == line)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}
