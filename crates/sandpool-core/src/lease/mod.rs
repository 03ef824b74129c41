//! Lease aggregate, status model, and the lease service.
//!
//! A lease grants one principal the use of one pooled account for a
//! bounded time and budget. At most one lease per (account, principal)
//! pair exists at a time; ending a lease is terminal and records a
//! reason.

mod model;
pub mod service;
mod status;
mod validate;

pub use self::model::{Lease, LeaseQuery, NewLease};
pub use self::service::{LeaseConfig, LeaseService};
pub use self::status::{LeaseStatus, LeaseStatusReason};
