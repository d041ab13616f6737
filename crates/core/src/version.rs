//! Optimistic concurrency expectations.

/// Optimistic concurrency expectation for a versioned record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (last-writer-wins).
    Any,
    /// The record must not exist yet.
    Absent,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// `actual` is `None` when the record does not exist.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Absent, Some(_)) => false,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            (ExpectedVersion::Exact(_), None) => false,
        }
    }

    /// The expectation that matches a record currently at `actual`.
    pub fn for_current(actual: Option<u64>) -> Self {
        match actual {
            Some(v) => ExpectedVersion::Exact(v),
            None => ExpectedVersion::Absent,
        }
    }
}
