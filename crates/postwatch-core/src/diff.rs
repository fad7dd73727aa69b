//! Snapshot differ
//!
//! Compares two event logs as multisets and returns their symmetric
//! difference. Entries only in `previous` come first, followed by entries
//! only in `current`, each group in its original order.
//!
//! Duplicate entries keep their multiplicity: `[x, x]` against `[x]`
//! yields `[x]`.

use std::collections::HashMap;

use crate::snapshot::LogEntry;

/// Result of comparing two event logs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogDiff {
    /// Symmetric difference of the two logs
    pub delta: Vec<LogEntry>,
    /// `true` iff `delta` is non-empty
    pub changed: bool,
}

/// Compare two event logs
pub fn diff(previous: &[LogEntry], current: &[LogEntry]) -> LogDiff {
    let mut delta = missing_from(previous, current);
    delta.extend(missing_from(current, previous));

    LogDiff {
        changed: !delta.is_empty(),
        delta,
    }
}

/// Entries of `left` not matched by an equal entry of `right`, one match
/// consumed per occurrence
fn missing_from(left: &[LogEntry], right: &[LogEntry]) -> Vec<LogEntry> {
    let mut available: HashMap<&LogEntry, usize> = HashMap::with_capacity(right.len());
    for entry in right {
        *available.entry(entry).or_insert(0) += 1;
    }

    let mut missing = Vec::new();
    for entry in left {
        match available.get_mut(entry) {
            Some(count) if *count > 0 => *count -= 1,
            _ => missing.push(entry.clone()),
        }
    }
    missing
}
