//! Redirection audit log
//!
//! Every redirection attempt appends one record, successful or not, before any code
//! is touched. Records are never removed. The source and destination names form two
//! parallel logs: entry `i` of each belongs to the `i`-th attempt.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;

/// How an attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied,
    Failed(String),
}

/// One redirection attempt
#[derive(Debug)]
pub struct RedirectionRecord {
    pub source: String,
    pub destination: String,
    outcome: OnceCell<RecordOutcome>,
}

impl RedirectionRecord {
    /// `None` while the attempt is still in flight
    pub fn outcome(&self) -> Option<&RecordOutcome> {
        self.outcome.get()
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome(), Some(RecordOutcome::Applied))
    }
}

/// Thread-safe, append-only log of redirection attempts
#[derive(Default)]
pub struct AuditLog {
    records: boxcar::Vec<RedirectionRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for an attempt that is about to start; returns its index
    pub fn begin(&self, source: impl Into<String>, destination: impl Into<String>) -> usize {
        self.records.push(RedirectionRecord {
            source: source.into(),
            destination: destination.into(),
            outcome: OnceCell::new(),
        })
    }

    /// Settle the outcome of attempt `index`; the first outcome recorded wins
    pub fn finish(&self, index: usize, outcome: RecordOutcome) {
        if let Some(record) = self.records.get(index) {
            let _ = record.outcome.set(outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.records.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&RedirectionRecord> {
        self.records.get(index)
    }

    /// Records in attempt order
    pub fn records(&self) -> impl Iterator<Item = &RedirectionRecord> {
        self.records.iter().map(|(_, record)| record)
    }

    /// Qualified source names, in attempt order
    pub fn sources(&self) -> Vec<String> {
        self.records().map(|r| r.source.clone()).collect()
    }

    /// Qualified destination names, in attempt order
    pub fn destinations(&self) -> Vec<String> {
        self.records().map(|r| r.destination.clone()).collect()
    }

    /// How many applied patches targeted `source`
    pub fn patches_on(&self, source: &str) -> usize {
        self.records()
            .filter(|r| r.source == source && r.is_applied())
            .count()
    }

    /// Sources patched more than once, in order of first patch
    ///
    /// Failed attempts wrote nothing and are not counted.
    pub fn duplicate_sources(&self) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut order = Vec::new();

        for record in self.records().filter(|r| r.is_applied()) {
            let count = counts.entry(record.source.as_str()).or_insert(0);
            if *count == 0 {
                order.push(record.source.as_str());
            }
            *count += 1;
        }

        order
            .into_iter()
            .filter(|s| counts[s] > 1)
            .map(str::to_string)
            .collect()
    }
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_parallel_logs_stay_aligned() {
        let log = AuditLog::new();
        log.begin("A.a", "RA_A.a");
        log.begin("B.b", "RA_B.b");
        log.begin("C.c", "RA_C.c");

        assert_eq!(log.len(), 3);
        assert_eq!(log.sources(), vec!["A.a", "B.b", "C.c"]);
        assert_eq!(log.destinations(), vec!["RA_A.a", "RA_B.b", "RA_C.c"]);
    }

    #[test]
    fn test_outcome_is_set_once() {
        let log = AuditLog::new();
        let i = log.begin("A.a", "B.b");
        assert_eq!(log.get(i).unwrap().outcome(), None);

        log.finish(i, RecordOutcome::Failed("not found".into()));
        log.finish(i, RecordOutcome::Applied);

        let record = log.get(i).unwrap();
        assert_eq!(record.outcome(), Some(&RecordOutcome::Failed("not found".into())));
        assert!(!record.is_applied());
    }

    #[test]
    fn test_duplicate_sources() {
        let log = AuditLog::new();
        for (source, destination) in [
            ("Tradeable.PriceFor", "RA_Tradeable.PriceFor"),
            ("TradeDeal.UpdateCurrencyCount", "CR.UpdateCurrencyCount"),
            ("Tradeable.PriceFor", "CR.Detours_Tradeable.PriceFor"),
        ] {
            let i = log.begin(source, destination);
            log.finish(i, RecordOutcome::Applied);
        }

        assert_eq!(log.duplicate_sources(), vec!["Tradeable.PriceFor"]);
        assert_eq!(log.patches_on("Tradeable.PriceFor"), 2);
        assert_eq!(log.patches_on("Missing.Method"), 0);
    }

    #[test]
    fn test_failed_attempts_are_not_duplicates() {
        let log = AuditLog::new();
        let failed = log.begin("Pawn.Kill", "RA_Pawn.Kill");
        log.finish(failed, RecordOutcome::Failed("not found".into()));
        let applied = log.begin("Pawn.Kill", "RA_Pawn.Kill");
        log.finish(applied, RecordOutcome::Applied);
        log.begin("Pawn.Kill", "RA_Pawn.Kill");

        assert_eq!(log.patches_on("Pawn.Kill"), 1);
        assert!(log.duplicate_sources().is_empty());
        assert_eq!(log.sources().len(), 3);
    }

    #[test]
    fn test_concurrent_appends_keep_pairs_together() {
        let log = Arc::new(AuditLog::new());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..50 {
                        let idx = log.begin(format!("S{}_{}", t, i), format!("D{}_{}", t, i));
                        log.finish(idx, RecordOutcome::Applied);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(log.len(), 200);
        for record in log.records() {
            assert_eq!(record.source[1..], record.destination[1..]);
            assert!(record.is_applied());
        }
    }
}
