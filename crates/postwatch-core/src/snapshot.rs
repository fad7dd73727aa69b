//! Package snapshot data model
//!
//! A [`Snapshot`] is one point-in-time read of a package as reported by the
//! carrier. A [`StoredState`] is the snapshot kept in the
//! [`SnapshotStore`](crate::traits::SnapshotStore) as the baseline for the
//! next comparison.

use serde::{Deserialize, Serialize};

/// One carrier-reported movement event
///
/// Two entries are equal only when both fields match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntry {
    /// Carrier-formatted date of the movement
    pub date: String,
    /// Human-readable description of the movement
    pub description: String,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(date: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            description: description.into(),
        }
    }
}

/// Pickup address of a package
///
/// Opaque to change detection; only carried through to notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub postal_code: String,
}

impl Origin {
    /// One-line summary: `street number, locality, province`
    pub fn summary(&self) -> String {
        format!(
            "{} {}, {}, {}",
            self.street.trim(),
            self.number.trim(),
            self.locality.trim(),
            self.province.trim()
        )
    }
}

/// Full state of one package at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Carrier tracking number, the stable store key
    pub identifier: String,
    /// Carrier-side classification the package was found under
    pub category: String,
    /// Pickup address reported by the carrier
    #[serde(default)]
    pub origin: Origin,
    /// Movement events, compared as an unordered multiset
    #[serde(default)]
    pub event_log: Vec<LogEntry>,
    /// Whether the carrier returned a match
    pub found: bool,
}

impl Snapshot {
    /// A snapshot for a package the carrier did not match under `category`
    pub fn not_found(identifier: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            category: category.into(),
            origin: Origin::default(),
            event_log: Vec::new(),
            found: false,
        }
    }

    /// A matched snapshot with the given movements
    pub fn found(
        identifier: impl Into<String>,
        category: impl Into<String>,
        event_log: Vec<LogEntry>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            category: category.into(),
            origin: Origin::default(),
            event_log,
            found: true,
        }
    }

    /// Set the origin
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// Persisted form of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// The last snapshot that produced a change
    pub snapshot: Snapshot,
    /// When the snapshot was written
    pub stored_at: chrono::DateTime<chrono::Utc>,
}

impl StoredState {
    /// Wrap a snapshot, stamped with the current time
    ///
    /// Only stores create stored states; callers hand in plain snapshots.
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            stored_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::found(
            "3867500000001234567",
            "paquetes",
            vec![
                LogEntry::new("12/05/2015 10:31", "Ingreso al centro de distribución"),
                LogEntry::new("12/05/2015 10:31", "Ingreso al centro de distribución"),
                LogEntry::new("13/05/2015 08:02", "En viaje"),
            ],
        )
        .with_origin(Origin {
            street: "AV. CORRIENTES ".to_string(),
            number: " 1234".to_string(),
            locality: "CABA".to_string(),
            province: "BUENOS AIRES".to_string(),
            postal_code: "1043".to_string(),
        })
    }

    #[test]
    fn test_stored_state_survives_json() {
        let state = StoredState::new(sample());
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: StoredState = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, state);
        assert_eq!(decoded.snapshot.category, "paquetes");
    }

    #[test]
    fn test_origin_summary_trims_fields() {
        assert_eq!(
            sample().origin.summary(),
            "AV. CORRIENTES 1234, CABA, BUENOS AIRES"
        );
    }

    #[test]
    fn test_not_found_snapshot() {
        let snapshot = Snapshot::not_found("X1", "cartas");
        assert!(!snapshot.found);
        assert!(snapshot.event_log.is_empty());
        assert_eq!(snapshot.category, "cartas");
    }
}
