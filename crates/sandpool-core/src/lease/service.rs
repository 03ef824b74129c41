//! Lease lifecycle service.
//!
//! Creating a lease moves its account `Ready -> Leased`; ending one moves
//! the account back to `Ready` unless the account was orphaned in the
//! meantime. Orphaning an account force-ends its active leases without
//! ever moving the account back into rotation.

use tracing::{info, warn};
use uuid::Uuid;

use super::model::{Lease, LeaseQuery, NewLease};
use super::status::{LeaseStatus, LeaseStatusReason};
use super::validate::validate_new_lease;
use crate::account::service::AccountStore;
use crate::account::{Account, AccountService, AccountStatus};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{AccountEventer, LeaseEventer};
use crate::reconciler::AccessManager;
use crate::store::Page;

/// Limits applied to lease creation.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Days added to "now" when a request omits `expires_on`.
    pub default_lease_length_days: i64,
    /// Largest budget a single lease may carry.
    pub max_budget_amount: f64,
    /// Furthest into the future a lease may expire, in seconds.
    pub max_lease_period_seconds: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_lease_length_days: 7,
            max_budget_amount: 1000.0,
            max_lease_period_seconds: 704_800,
        }
    }
}

/// Read access to stored leases.
pub trait LeaseReader {
    /// Fetches the lease for an (account, principal) pair.
    fn get(&self, account_id: &str, principal_id: &str) -> Result<Lease>;
    /// Fetches a lease by its assigned identifier.
    fn get_by_id(&self, lease_id: &str) -> Result<Lease>;
    /// Lists one page of leases matching the query template.
    fn list(&self, query: &LeaseQuery) -> Result<Page<Lease>>;
}

/// Conditional write access to stored leases.
pub trait LeaseWriter {
    /// Writes the lease under the store's compare-and-swap contract and
    /// returns the stamped aggregate.
    fn write(&self, lease: &Lease, expected_version: Option<i64>) -> Result<Lease>;
}

/// Delete access to stored leases.
pub trait LeaseDeleter {
    /// Removes the lease record.
    fn delete(&self, lease: &Lease) -> Result<()>;
}

/// Full store capability required by [`LeaseService`].
pub trait LeaseStore: LeaseReader + LeaseWriter + LeaseDeleter {}

impl<T: LeaseReader + LeaseWriter + LeaseDeleter> LeaseStore for T {}

/// The slice of account behavior the lease service needs: reading an
/// account and moving it along the lifecycle table.
pub trait AccountSource {
    /// Fetches one account by ID.
    fn get_account(&self, id: &str) -> Result<Account>;
    /// Moves an account to a new lifecycle status.
    fn set_account_status(&self, id: &str, next: AccountStatus) -> Result<Account>;
}

impl<S, M, E> AccountSource for AccountService<S, M, E>
where
    S: AccountStore,
    M: AccessManager,
    E: AccountEventer,
{
    fn get_account(&self, id: &str) -> Result<Account> {
        self.get(id)
    }

    fn set_account_status(&self, id: &str, next: AccountStatus) -> Result<Account> {
        self.update_status(id, next)
    }
}

/// Service implementing the lease operations.
#[derive(Debug)]
pub struct LeaseService<S, A, E> {
    store: S,
    accounts: A,
    eventer: E,
    config: LeaseConfig,
}

impl<S, A, E> LeaseService<S, A, E>
where
    S: LeaseStore,
    A: AccountSource,
    E: LeaseEventer,
{
    /// Assembles the service from its collaborators.
    pub const fn new(store: S, accounts: A, eventer: E, config: LeaseConfig) -> Self {
        Self {
            store,
            accounts,
            eventer,
            config,
        }
    }

    /// Fetches the lease for an (account, principal) pair.
    pub fn get(&self, account_id: &str, principal_id: &str) -> Result<Lease> {
        self.store.get(account_id, principal_id)
    }

    /// Fetches a lease by its assigned identifier.
    pub fn get_by_id(&self, lease_id: &str) -> Result<Lease> {
        self.store.get_by_id(lease_id)
    }

    /// Lists one page of leases matching the query template.
    pub fn list(&self, query: &LeaseQuery) -> Result<Page<Lease>> {
        self.store.list(query)
    }

    /// Walks every page matching the query, invoking `f` per page until
    /// the listing is exhausted or `f` returns `false`.
    pub fn list_pages(
        &self,
        query: &LeaseQuery,
        mut f: impl FnMut(&Page<Lease>) -> bool,
    ) -> Result<()> {
        let mut query = query.clone();
        loop {
            let page = self.store.list(&query)?;
            let more = f(&page);
            match page.next {
                Some(next) if more => query.next = Some(next),
                _ => return Ok(()),
            }
        }
    }

    /// Leases a `Ready` account to a principal.
    ///
    /// The lease is written first and the account transition follows, so
    /// a racing second writer fails on the lease write and never observes
    /// a half-leased account.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed request, `Conflict` if the
    /// account is not `Ready`, and `AlreadyExists` if the pair already
    /// holds an active lease.
    pub fn create(&self, input: &NewLease) -> Result<Lease> {
        let expires_on = validate_new_lease(input, &self.config)?;

        let account = self.accounts.get_account(&input.account_id)?;
        if account.status != AccountStatus::Ready {
            return Err(Error::conflict(
                "account",
                &input.account_id,
                format!("status must be {}", AccountStatus::Ready),
            ));
        }

        let lease = Lease {
            account_id: input.account_id.clone(),
            principal_id: input.principal_id.clone(),
            id: Uuid::new_v4().to_string(),
            status: LeaseStatus::Active,
            status_reason: LeaseStatusReason::Active,
            budget_amount: input.budget_amount,
            budget_currency: input.budget_currency.clone(),
            budget_notification_emails: input.budget_notification_emails.clone(),
            expires_on,
            status_modified_on: None,
            metadata: input.metadata.clone(),
            created_on: None,
            last_modified_on: None,
        };

        // An ended lease for the same pair is replaced in place, under
        // its version token; an active one blocks the create.
        let stored = match self.store.get(&input.account_id, &input.principal_id) {
            Ok(existing) if existing.is_active() => {
                return Err(Error::already_exists("lease", &existing.id));
            },
            Ok(existing) => self.store.write(&lease, existing.last_modified_on)?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.store.write(&lease, None)?
            },
            Err(err) => return Err(err),
        };

        self.accounts
            .set_account_status(&input.account_id, AccountStatus::Leased)?;

        info!(
            lease_id = %stored.id,
            account_id = %stored.account_id,
            principal_id = %stored.principal_id,
            "lease created"
        );
        self.publish(self.eventer.lease_created(&stored), "created", &stored.id);
        Ok(stored)
    }

    /// Ends a lease with the given terminal reason.
    ///
    /// The account returns to `Ready` unless it was orphaned, in which
    /// case its status is left alone.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the lease is not active.
    pub fn end(
        &self,
        account_id: &str,
        principal_id: &str,
        reason: LeaseStatusReason,
    ) -> Result<Lease> {
        let lease = self.store.get(account_id, principal_id)?;
        let ended = self.end_lease(lease, reason)?;

        if reason != LeaseStatusReason::AccountOrphaned {
            let account = self.accounts.get_account(account_id)?;
            if account.status == AccountStatus::Leased {
                self.accounts
                    .set_account_status(account_id, AccountStatus::Ready)?;
            }
        }
        Ok(ended)
    }

    /// Marks an account `Orphaned` and force-ends its active leases.
    ///
    /// The leases record `AccountOrphaned` as their reason and the
    /// account stays out of rotation; only an explicit re-adoption moves
    /// it back to `NotReady`. An already-orphaned account is tolerated,
    /// so an invocation that failed partway can be retried to finish the
    /// lease cleanup.
    pub fn mark_account_orphaned(&self, account_id: &str) -> Result<Vec<Lease>> {
        let account = self.accounts.get_account(account_id)?;
        if account.status != AccountStatus::Orphaned {
            self.accounts
                .set_account_status(account_id, AccountStatus::Orphaned)?;
        }

        let mut ended = Vec::new();
        let mut query = LeaseQuery {
            status: Some(LeaseStatus::Active),
            account_id: Some(account_id.to_string()),
            ..LeaseQuery::default()
        };
        loop {
            let page = self.store.list(&query)?;
            for lease in page.items {
                ended.push(self.end_lease(lease, LeaseStatusReason::AccountOrphaned)?);
            }
            match page.next {
                Some(next) => query.next = Some(next),
                None => break,
            }
        }

        info!(account_id = %account_id, ended = ended.len(), "account orphaned");
        Ok(ended)
    }

    /// Flips one active lease to `Inactive` under its version token and
    /// publishes the end event. Does not touch the account.
    fn end_lease(&self, lease: Lease, reason: LeaseStatusReason) -> Result<Lease> {
        if !lease.is_active() {
            return Err(Error::conflict("lease", &lease.id, "status must be active"));
        }

        let mut ended = lease.clone();
        ended.status = LeaseStatus::Inactive;
        ended.status_reason = reason;
        ended.status_modified_on = Some(chrono::Utc::now().timestamp());
        let saved = self.store.write(&ended, lease.last_modified_on)?;

        info!(lease_id = %saved.id, %reason, "lease ended");
        self.publish(self.eventer.lease_ended(&saved), "ended", &saved.id);
        Ok(saved)
    }

    fn publish(&self, result: Result<()>, event: &str, id: &str) {
        if let Err(error) = result {
            warn!(%error, event, lease_id = %id, "event publication failed");
        }
    }
}
