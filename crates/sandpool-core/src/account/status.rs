//! Account status model and transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a pooled account.
///
/// # State Machine
///
/// ```text
/// None --> NotReady --> Ready <--> Leased
///             ^           |          |
///             |           v          v
///             +------- Orphaned <----+
/// ```
///
/// `Orphaned` is a health-check override reachable from any live state;
/// re-adoption routes an orphaned account back through `NotReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Placeholder status for records that predate the lifecycle rules.
    None,
    /// Registered but not yet cleaned/verified for leasing.
    NotReady,
    /// Available for lease.
    Ready,
    /// Currently held by an active lease.
    Leased,
    /// Taken out of the pool by a health check.
    Orphaned,
}

impl AccountStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::NotReady => "NotReady",
            Self::Ready => "Ready",
            Self::Leased => "Leased",
            Self::Orphaned => "Orphaned",
        }
    }

    /// All valid statuses.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::None,
            Self::NotReady,
            Self::Ready,
            Self::Leased,
            Self::Orphaned,
        ]
    }

    /// Parses a wire string into a status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "None" => Some(Self::None),
            "NotReady" => Some(Self::NotReady),
            "Ready" => Some(Self::Ready),
            "Leased" => Some(Self::Leased),
            "Orphaned" => Some(Self::Orphaned),
            _ => None,
        }
    }

    /// Returns `true` if the edge `self -> next` is in the maintained
    /// transition table. Edges not listed here are rejected explicitly;
    /// nothing is allowed implicitly.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::None, Self::NotReady)
                | (Self::NotReady, Self::Ready | Self::Orphaned)
                | (Self::Ready, Self::Leased | Self::Orphaned)
                | (Self::Leased, Self::Ready | Self::Orphaned)
                | (Self::Orphaned, Self::NotReady)
        )
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_cycle_edges() {
        assert!(AccountStatus::Ready.can_transition(AccountStatus::Leased));
        assert!(AccountStatus::Leased.can_transition(AccountStatus::Ready));
        assert!(AccountStatus::NotReady.can_transition(AccountStatus::Ready));
    }

    #[test]
    fn test_orphan_reachable_from_live_states() {
        for status in [
            AccountStatus::NotReady,
            AccountStatus::Ready,
            AccountStatus::Leased,
        ] {
            assert!(status.can_transition(AccountStatus::Orphaned), "{status}");
        }
        assert!(!AccountStatus::None.can_transition(AccountStatus::Orphaned));
    }

    #[test]
    fn test_rejected_edges() {
        assert!(!AccountStatus::Ready.can_transition(AccountStatus::Ready));
        assert!(!AccountStatus::NotReady.can_transition(AccountStatus::Leased));
        assert!(!AccountStatus::Orphaned.can_transition(AccountStatus::Ready));
        assert!(!AccountStatus::Leased.can_transition(AccountStatus::NotReady));
    }

    #[test]
    fn test_wire_strings_roundtrip() {
        for status in AccountStatus::all() {
            assert_eq!(AccountStatus::parse(status.as_str()), Some(*status));
        }
        assert_eq!(AccountStatus::parse("Retired"), None);
    }
}
