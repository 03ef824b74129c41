//! Lease aggregate and its wire-facing input types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::{LeaseStatus, LeaseStatusReason};
use crate::store::PageCursor;

/// A time/budget-bounded grant of one account to one principal.
///
/// The composite key is (`account_id`, `principal_id`); `id` is an
/// assigned secondary identifier usable for direct lookup. As with
/// accounts, `last_modified_on` is the store-stamped version token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// The leased account's 12-digit ID.
    pub account_id: String,
    /// The holding principal's identity.
    pub principal_id: String,
    /// Assigned lease identifier (UUID v4).
    pub id: String,
    /// Whether the lease currently grants access.
    #[serde(rename = "leaseStatus")]
    pub status: LeaseStatus,
    /// Why the lease is in its current status.
    #[serde(rename = "leaseStatusReason")]
    pub status_reason: LeaseStatusReason,
    /// Budget allocated to this lease.
    pub budget_amount: f64,
    /// Currency of the budget amount.
    pub budget_currency: String,
    /// Addresses notified as the budget is consumed.
    #[serde(default)]
    pub budget_notification_emails: Vec<String>,
    /// Epoch seconds at which the lease expires.
    pub expires_on: i64,
    /// Epoch seconds of the last status change.
    #[serde(rename = "leaseStatusModifiedOn", skip_serializing_if = "Option::is_none")]
    pub status_modified_on: Option<i64>,
    /// Open key/value annotations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Epoch seconds; stamped by the store on create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<i64>,
    /// Epoch seconds; the version token. Stamped by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_on: Option<i64>,
}

impl Lease {
    /// Returns `true` if the lease is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LeaseStatus::Active
    }
}

/// Caller-supplied material for creating a lease. Status, reason, and
/// identifiers are assigned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLease {
    /// The account to lease; must currently be `Ready`.
    pub account_id: String,
    /// The principal receiving the lease.
    pub principal_id: String,
    /// Budget allocated to this lease.
    pub budget_amount: f64,
    /// Currency of the budget amount.
    pub budget_currency: String,
    /// Addresses notified as the budget is consumed.
    #[serde(default)]
    pub budget_notification_emails: Vec<String>,
    /// Expiry as epoch seconds; defaulted from configuration when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<i64>,
    /// Open key/value annotations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Equality-filter template for listing leases. Non-absent fields are
/// ANDed together; a present `status` routes through the status index.
#[derive(Debug, Clone, Default)]
pub struct LeaseQuery {
    /// Match on status (indexed).
    pub status: Option<LeaseStatus>,
    /// Match on the leased account.
    pub account_id: Option<String>,
    /// Match on the holding principal.
    pub principal_id: Option<String>,
    /// Page size; the store default applies when absent.
    pub limit: Option<u32>,
    /// Resume cursor from a previous page.
    pub next: Option<PageCursor>,
}
