//! The diagnostics channel: one record per decompiled method.

use std::fmt;

use crate::{bytecode::MethodKey, ErrorKind};

/// How far decompilation of one method got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodStatus {
    /// Structured source was produced
    Success,
    /// Source was produced, but with a fallback (explicit jumps instead of structure)
    Degraded(ErrorKind),
    /// Only the raw instruction listing is available
    Failed(ErrorKind),
    /// The run was cancelled before the method finished
    Cancelled,
}

impl fmt::Display for MethodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodStatus::Success => f.write_str("success"),
            MethodStatus::Degraded(kind) => write!(f, "degraded ({kind})"),
            MethodStatus::Failed(kind) => write!(f, "failed ({kind})"),
            MethodStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl MethodStatus {
    /// Returns `true` if source text was produced.
    #[must_use]
    pub fn has_source(self) -> bool {
        matches!(self, MethodStatus::Success | MethodStatus::Degraded(_))
    }

    /// Returns the error kind behind a degraded or failed status.
    #[must_use]
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            MethodStatus::Degraded(kind) | MethodStatus::Failed(kind) => Some(kind),
            MethodStatus::Cancelled => Some(ErrorKind::Cancelled),
            MethodStatus::Success => None,
        }
    }
}

/// Diagnostic record of one method run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRecord {
    /// The method
    pub key: MethodKey,
    /// Outcome
    pub status: MethodStatus,
    /// Non-fatal problems: unresolved classes, fallbacks taken
    pub warnings: Vec<String>,
    /// `true` if the outcome came from the cache
    pub cached: bool,
}

/// Collects [`MethodRecord`]s from concurrent workers.
///
/// Appends never block each other; records are kept in arrival order, which depends on
/// scheduling. Sort by key when a stable order is needed.
#[derive(Default)]
pub struct DiagnosticsSink {
    records: boxcar::Vec<MethodRecord>,
}

impl fmt::Debug for DiagnosticsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsSink")
            .field("records", &self.len())
            .finish()
    }
}

impl DiagnosticsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn record(&self, record: MethodRecord) {
        self.records.push(record);
    }

    /// Returns every record so far.
    pub fn records(&self) -> impl Iterator<Item = &MethodRecord> + '_ {
        self.records.iter().map(|(_, record)| record)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records().count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the records whose method did not fully succeed.
    pub fn problems(&self) -> impl Iterator<Item = &MethodRecord> + '_ {
        self.records()
            .filter(|record| record.status != MethodStatus::Success)
    }

    /// Returns how many records have the given status.
    #[must_use]
    pub fn count(&self, status: MethodStatus) -> usize {
        self.records()
            .filter(|record| record.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::TypeRef;

    fn record(name: &str, status: MethodStatus) -> MethodRecord {
        MethodRecord {
            key: MethodKey {
                class: TypeRef::new("a.B"),
                name: Arc::from(name),
                descriptor: Arc::from("()V"),
            },
            status,
            warnings: Vec::new(),
            cached: false,
        }
    }

    #[test]
    fn test_concurrent_records() {
        let sink = DiagnosticsSink::new();
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let sink = &sink;
                scope.spawn(move || {
                    for i in 0..25 {
                        let status = if i % 5 == 0 {
                            MethodStatus::Failed(ErrorKind::Decode)
                        } else {
                            MethodStatus::Success
                        };
                        sink.record(record(&format!("m{worker}_{i}"), status));
                    }
                });
            }
        });

        assert_eq!(sink.len(), 100);
        assert_eq!(sink.count(MethodStatus::Failed(ErrorKind::Decode)), 20);
        assert_eq!(sink.problems().count(), 20);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(MethodStatus::Success.to_string(), "success");
        assert_eq!(
            MethodStatus::Degraded(ErrorKind::Structuring).to_string(),
            "degraded (structuring)"
        );
        assert!(MethodStatus::Degraded(ErrorKind::Structuring).has_source());
        assert!(!MethodStatus::Failed(ErrorKind::Decode).has_source());
    }
}
