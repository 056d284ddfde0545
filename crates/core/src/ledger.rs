use std::collections::HashMap;

/// Remembers the original presentation timestamp of every frame whose
/// timestamp was rewritten, keyed by the rewritten value.
///
/// Rewritten values can collide; a later [`record`](PtsLedger::record) for the
/// same key replaces the earlier original. Entries are never evicted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PtsLedger {
    entries: HashMap<i64, i64>,
}

impl PtsLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `original` was rewritten to `corrupted`.
    pub fn record(&mut self, corrupted: i64, original: i64) {
        if let Some(previous) = self.entries.insert(corrupted, original) {
            if previous != original {
                tracing::trace!(corrupted, previous, original, "pts ledger entry overwritten");
            }
        }
    }

    /// Returns the original timestamp for `observed`, or `None` when it was never rewritten.
    pub fn restore(&self, observed: i64) -> Option<i64> {
        self.entries.get(&observed).copied()
    }

    /// The number of recorded timestamps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
