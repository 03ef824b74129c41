//! Lease status and status-reason models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a lease currently grants access.
///
/// A lease is created `Active` and ends `Inactive`; it is never
/// resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseStatus {
    /// The principal holds the account.
    Active,
    /// The lease has ended.
    Inactive,
}

impl LeaseStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }

    /// Parses a wire string into a status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Active" => Some(Self::Active),
            "Inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a lease is in its current status. `Active` confirms a live lease;
/// every other reason is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseStatusReason {
    /// The lease is still active.
    Active,
    /// The lease passed its `expires_on` date.
    Expired,
    /// The lease spent past its budgeted amount.
    OverBudget,
    /// The principal spent past their cross-lease budget.
    OverPrincipalBudget,
    /// The lease was ended by an explicit caller action.
    Destroyed,
    /// A failure during provisioning rolled the lease back.
    Rollback,
    /// The account was orphaned by a health check, ending its leases.
    #[serde(rename = "LeaseAccountOrphaned")]
    AccountOrphaned,
}

impl LeaseStatusReason {
    /// Returns the wire string for this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Expired => "Expired",
            Self::OverBudget => "OverBudget",
            Self::OverPrincipalBudget => "OverPrincipalBudget",
            Self::Destroyed => "Destroyed",
            Self::Rollback => "Rollback",
            Self::AccountOrphaned => "LeaseAccountOrphaned",
        }
    }

    /// Returns `true` for reasons that may accompany an `Inactive` status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for LeaseStatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_reasons() {
        assert!(!LeaseStatusReason::Active.is_terminal());
        for reason in [
            LeaseStatusReason::Expired,
            LeaseStatusReason::OverBudget,
            LeaseStatusReason::OverPrincipalBudget,
            LeaseStatusReason::Destroyed,
            LeaseStatusReason::Rollback,
            LeaseStatusReason::AccountOrphaned,
        ] {
            assert!(reason.is_terminal(), "{reason}");
        }
    }

    #[test]
    fn test_orphaned_wire_string() {
        let json = serde_json::to_string(&LeaseStatusReason::AccountOrphaned).unwrap();
        assert_eq!(json, "\"LeaseAccountOrphaned\"");
    }
}
