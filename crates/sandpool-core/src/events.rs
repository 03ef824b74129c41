//! Lifecycle event hooks.
//!
//! Services announce aggregate changes through these traits so that
//! downstream machinery (notifications, reset pipelines, audit sinks)
//! can react. Publication is best-effort: services log a failed publish
//! and carry on, so an eventer must never be the source of truth.

use crate::account::Account;
use crate::error::Result;
use crate::lease::Lease;

/// Receives account lifecycle events.
pub trait AccountEventer {
    /// An account was created.
    fn account_created(&self, account: &Account) -> Result<()>;
    /// An account was updated; both sides of the change are provided.
    fn account_updated(&self, old: &Account, new: &Account) -> Result<()>;
    /// An account was deleted.
    fn account_deleted(&self, account: &Account) -> Result<()>;
    /// An account was queued for cleanup and reprovisioning.
    fn account_reset(&self, account: &Account) -> Result<()>;
}

/// Receives lease lifecycle events.
pub trait LeaseEventer {
    /// A lease was created.
    fn lease_created(&self, lease: &Lease) -> Result<()>;
    /// A lease ended; the aggregate carries the terminal reason.
    fn lease_ended(&self, lease: &Lease) -> Result<()>;
}

/// Eventer that drops everything, for deployments without downstream
/// consumers and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventer;

impl AccountEventer for NullEventer {
    fn account_created(&self, _account: &Account) -> Result<()> {
        Ok(())
    }

    fn account_updated(&self, _old: &Account, _new: &Account) -> Result<()> {
        Ok(())
    }

    fn account_deleted(&self, _account: &Account) -> Result<()> {
        Ok(())
    }

    fn account_reset(&self, _account: &Account) -> Result<()> {
        Ok(())
    }
}

impl LeaseEventer for NullEventer {
    fn lease_created(&self, _lease: &Lease) -> Result<()> {
        Ok(())
    }

    fn lease_ended(&self, _lease: &Lease) -> Result<()> {
        Ok(())
    }
}
