//! Weight Engine
//!
//! Converts raw signals into selection weights and steps the smooth weighted
//! round-robin used by the weighted selection modes.

use std::time::Duration;
use tracing::trace;

use crate::types::ServerRecord;

/// Weight given to servers answering within the fastest latency band
pub const MAX_LATENCY_WEIGHT: i64 = 191;

/// Convert a probed round-trip time into a weight.
///
/// Lower latency gives a higher weight. A failed probe (`None`) or a round
/// trip of a second or more yields 0 so the server is effectively skipped.
pub fn latency_to_weight(rtt: Option<Duration>) -> i64 {
    let Some(rtt) = rtt else {
        return 0;
    };

    match rtt.as_millis() {
        0..=10 => MAX_LATENCY_WEIGHT,
        ms @ 11..=200 => 201 - ms as i64,
        201..=999 => 1,
        _ => 0,
    }
}

/// One step of smooth weighted round-robin.
///
/// Returns the index of the chosen record, or `None` when no record carries a
/// positive effective weight (callers fall back to plain round-robin).
pub fn next_weighted(records: &mut [ServerRecord]) -> Option<usize> {
    let mut total: i64 = 0;
    let mut best: Option<usize> = None;

    for record in records.iter_mut() {
        let effective = record.effective_weight.max(0);
        record.current_weight += effective;
        total += effective;
        if record.effective_weight < record.weight {
            record.effective_weight += 1;
        }
    }

    if total <= 0 {
        return None;
    }

    for (i, record) in records.iter().enumerate() {
        match best {
            Some(b) if records[b].current_weight >= record.current_weight => {}
            _ => best = Some(i),
        }
    }

    let best = best?;
    records[best].current_weight -= total;
    Some(best)
}

/// Weighted records plus the fallback cursor used when all weights are zero
#[derive(Debug, Clone, Default)]
pub struct WeightedRing {
    records: Vec<ServerRecord>,
    fallback: usize,
}

impl WeightedRing {
    pub fn new(records: Vec<ServerRecord>) -> Self {
        Self { records, fallback: 0 }
    }

    pub fn records(&self) -> &[ServerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pick the next record. Terminates in one pass over the records.
    pub fn pick(&mut self) -> Option<&ServerRecord> {
        if self.records.is_empty() {
            return None;
        }

        let idx = match next_weighted(&mut self.records) {
            Some(idx) => idx,
            None => {
                let idx = self.fallback % self.records.len();
                self.fallback = (idx + 1) % self.records.len();
                trace!(index = idx, "No positive weight, falling back to round-robin");
                idx
            }
        };

        self.records.get(idx)
    }
}
