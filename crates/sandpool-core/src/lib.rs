//! Leasing and access management for a pool of AWS accounts.
//!
//! The pool tracks two aggregates: [`account::Account`] records for the
//! AWS accounts it owns, and [`lease::Lease`] records granting those
//! accounts to principals for a bounded time and budget. Three layers
//! cooperate:
//!
//! - [`store`] — a conditional-write record store. All mutations are
//!   compare-and-swap over the `last_modified_on` version token; a lost
//!   race surfaces as a conflict, never a lost update.
//! - [`account`] and [`lease`] — the lifecycle services. Account status
//!   moves only along an explicit transition table; leases are created
//!   `Active` against `Ready` accounts and end exactly once, with a
//!   recorded reason.
//! - [`reconciler`] — converges each account's delegated IAM role and
//!   scoped policy toward the configured state, keyed by a content hash
//!   of the rendered policy document so an unchanged policy costs no
//!   mutating provider calls.
//!
//! Everything here is synchronous; parallelism across accounts is the
//! caller's choice of threads.

pub mod account;
pub mod arn;
pub mod config;
pub mod error;
pub mod events;
pub mod lease;
pub mod reconciler;
pub mod store;

pub use crate::account::{Account, AccountService, AccountStatus};
pub use crate::arn::Arn;
pub use crate::config::PrincipalConfig;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::lease::{Lease, LeaseService, LeaseStatus, LeaseStatusReason};
pub use crate::reconciler::{AccessManager, Reconciler};
pub use crate::store::{Page, PageCursor, SqliteStore};
