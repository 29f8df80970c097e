//! Per-identity Lamport logical clock.
//!
//! Each entry carries the clock of the identity that created it. Clocks
//! order entries causally; concurrent entries are tie-broken by comparing
//! the clock ids lexicographically.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A Lamport clock owned by one identity.
///
/// Immutable value type: local appends derive a new clock via [`tick`],
/// merges via [`merge`].
///
/// [`tick`]: LamportClock::tick
/// [`merge`]: LamportClock::merge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    /// The public key of the identity that owns this clock.
    pub id: String,

    /// Monotonically increasing logical time.
    pub time: u64,
}

impl LamportClock {
    /// Create a clock at time zero for an identity.
    pub fn new(id: impl Into<String>) -> Self {
        LamportClock {
            id: id.into(),
            time: 0,
        }
    }

    /// Create a clock at a specific time.
    pub fn at(id: impl Into<String>, time: u64) -> Self {
        LamportClock {
            id: id.into(),
            time,
        }
    }

    /// Derive the next clock: same id, time advanced by one.
    pub fn tick(&self) -> Self {
        LamportClock {
            id: self.id.clone(),
            time: self.time + 1,
        }
    }

    /// Derive a clock merged with a remote time (Lamport merge rule).
    pub fn merge(&self, other_time: u64) -> Self {
        LamportClock {
            id: self.id.clone(),
            time: self.time.max(other_time),
        }
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_increments_time() {
        let clock = LamportClock::new("a");
        assert_eq!(clock.time, 0);
        let next = clock.tick();
        assert_eq!(next.time, 1);
        assert_eq!(next.id, "a");
    }

    #[test]
    fn test_merge_takes_max() {
        let clock = LamportClock::at("a", 3);
        assert_eq!(clock.merge(7).time, 7);
        assert_eq!(clock.merge(1).time, 3);
    }

    #[test]
    fn test_ordering_by_time_then_id() {
        let a1 = LamportClock::at("a", 1);
        let b1 = LamportClock::at("b", 1);
        let a2 = LamportClock::at("a", 2);

        assert!(a1 < b1);
        assert!(b1 < a2);
        assert!(a1 < a2);
    }
}
