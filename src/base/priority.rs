//! Request priorities.
//!
//! Chromium mapping: net/base/request_priority.h

use serde::{Deserialize, Serialize};

/// Number of distinct [`RequestPriority`] values.
pub const NUM_PRIORITIES: usize = 5;

/// Request priority (matches Chromium's RequestPriority).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum RequestPriority {
    Idle = 0,
    Lowest = 1,
    Low = 2,
    #[default]
    Medium = 3,
    Highest = 4,
}

impl RequestPriority {
    /// All priorities, lowest first.
    pub const ALL: [RequestPriority; NUM_PRIORITIES] = [
        RequestPriority::Idle,
        RequestPriority::Lowest,
        RequestPriority::Low,
        RequestPriority::Medium,
        RequestPriority::Highest,
    ];

    /// Index into per-priority tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(RequestPriority::Highest > RequestPriority::Medium);
        assert!(RequestPriority::Medium > RequestPriority::Low);
        assert!(RequestPriority::Low > RequestPriority::Lowest);
        assert!(RequestPriority::Lowest > RequestPriority::Idle);
        assert_eq!(RequestPriority::default(), RequestPriority::Medium);
    }

    #[test]
    fn test_priority_index_matches_table() {
        for (i, p) in RequestPriority::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }
}
