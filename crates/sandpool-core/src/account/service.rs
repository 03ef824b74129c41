//! Account lifecycle service.
//!
//! Orchestrates the record store, the access reconciler, and the event
//! hooks behind each account operation. The service owns the lifecycle
//! rules (what may change, and when); the store owns the concurrency
//! control; the reconciler owns the IAM material.

use tracing::{info, warn};

use super::model::{Account, AccountPatch, AccountQuery, NewAccount};
use super::status::AccountStatus;
use crate::error::{Error, ErrorKind, Result};
use crate::events::AccountEventer;
use crate::reconciler::AccessManager;
use crate::store::Page;

/// Read access to stored accounts.
pub trait AccountReader {
    /// Fetches one account by ID.
    fn get(&self, id: &str) -> Result<Account>;
    /// Lists one page of accounts matching the query template.
    fn list(&self, query: &AccountQuery) -> Result<Page<Account>>;
}

/// Conditional write access to stored accounts.
pub trait AccountWriter {
    /// Writes the account under the store's compare-and-swap contract and
    /// returns the stamped aggregate.
    fn write(&self, account: &Account, expected_version: Option<i64>) -> Result<Account>;
}

/// Delete access to stored accounts.
pub trait AccountDeleter {
    /// Removes the account record.
    fn delete(&self, account: &Account) -> Result<()>;
}

/// Full store capability required by [`AccountService`].
pub trait AccountStore: AccountReader + AccountWriter + AccountDeleter {}

impl<T: AccountReader + AccountWriter + AccountDeleter> AccountStore for T {}

/// Service implementing the account operations.
#[derive(Debug)]
pub struct AccountService<S, M, E> {
    store: S,
    manager: M,
    eventer: E,
}

impl<S, M, E> AccountService<S, M, E>
where
    S: AccountStore,
    M: AccessManager,
    E: AccountEventer,
{
    /// Assembles the service from its collaborators.
    pub const fn new(store: S, manager: M, eventer: E) -> Self {
        Self {
            store,
            manager,
            eventer,
        }
    }

    /// Fetches one account by ID.
    pub fn get(&self, id: &str) -> Result<Account> {
        self.store.get(id)
    }

    /// Lists one page of accounts matching the query template.
    pub fn list(&self, query: &AccountQuery) -> Result<Page<Account>> {
        self.store.list(query)
    }

    /// Walks every page matching the query, invoking `f` per page until
    /// the listing is exhausted or `f` returns `false`.
    pub fn list_pages(
        &self,
        query: &AccountQuery,
        mut f: impl FnMut(&Page<Account>) -> bool,
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

    /// Registers a new account with the pool.
    ///
    /// The admin role is probed for assumability and the principal access
    /// material is provisioned before the record is persisted, so a
    /// stored account always had working access at least once.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the ID is registered, `Validation` for a
    /// malformed request or an unassumable admin role, or the reconciler's
    /// error when provisioning fails.
    pub fn create(&self, input: &NewAccount) -> Result<Account> {
        match self.store.get(&input.id) {
            Ok(_) => return Err(Error::already_exists("account", &input.id)),
            Err(err) if err.kind() == ErrorKind::NotFound => {},
            Err(err) => return Err(err),
        }

        let mut account = Account::new(
            &input.id,
            input.admin_role_arn.clone(),
            input.metadata.clone(),
            self.manager.principal_config(),
        )?;

        self.manager.validate_access(&account.admin_role_arn)?;
        self.manager.upsert_principal_access(&mut account)?;

        let stored = self.store.write(&account, None).map_err(|err| {
            // Lost a create race after the existence check.
            if err.kind() == ErrorKind::Conflict {
                Error::already_exists("account", &input.id)
            } else {
                err
            }
        })?;

        info!(account_id = %stored.id, "account created");
        self.publish(self.eventer.account_created(&stored), "created", &stored.id);
        self.publish(self.eventer.account_reset(&stored), "reset", &stored.id);
        Ok(stored)
    }

    /// Applies a partial update to an account.
    ///
    /// Only the admin role ARN and the metadata map may change here; the
    /// patch is rejected if it names any guarded field. A new admin role
    /// must pass the assumability probe before it is stored.
    pub fn update(&self, id: &str, patch: &AccountPatch) -> Result<Account> {
        patch.validate(id)?;
        let stored = self.store.get(id)?;
        let mut updated = stored.clone();

        if let Some(admin_role_arn) = &patch.admin_role_arn {
            self.manager.validate_access(admin_role_arn)?;
            updated.admin_role_arn = admin_role_arn.clone();
        }
        if let Some(metadata) = &patch.metadata {
            updated.metadata = metadata.clone();
        }

        let saved = self.store.write(&updated, stored.last_modified_on)?;
        self.publish(
            self.eventer.account_updated(&stored, &saved),
            "updated",
            id,
        );
        Ok(saved)
    }

    /// Moves an account to a new lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the transition is not in the lifecycle table
    /// or if a concurrent writer changed the account first.
    pub fn update_status(&self, id: &str, next: AccountStatus) -> Result<Account> {
        let stored = self.store.get(id)?;
        if !stored.status.can_transition(next) {
            return Err(Error::conflict(
                "account",
                id,
                format!("unable to transition from {} to {next}", stored.status),
            ));
        }

        let mut updated = stored.clone();
        updated.status = next;
        let saved = self.store.write(&updated, stored.last_modified_on)?;
        info!(account_id = %id, from = %stored.status, to = %next, "account status changed");
        self.publish(
            self.eventer.account_updated(&stored, &saved),
            "updated",
            id,
        );
        Ok(saved)
    }

    /// Removes an account from the pool, tearing down its principal
    /// access material.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the account is currently leased.
    pub fn delete(&self, id: &str) -> Result<()> {
        let account = self.store.get(id)?;
        if account.status == AccountStatus::Leased {
            return Err(Error::conflict("account", id, "status must not be leased"));
        }

        self.store.delete(&account)?;
        self.manager.delete_principal_access(&account)?;

        info!(account_id = %id, "account deleted");
        self.publish(self.eventer.account_deleted(&account), "deleted", id);
        self.publish(self.eventer.account_reset(&account), "reset", id);
        Ok(())
    }

    /// Queues an account for cleanup and reprovisioning.
    ///
    /// The account's status is not changed here; the reset pipeline
    /// reports back through [`AccountService::update_status`] when it is
    /// done.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the account is currently leased.
    pub fn reset(&self, id: &str) -> Result<Account> {
        let account = self.store.get(id)?;
        if account.status == AccountStatus::Leased {
            return Err(Error::conflict("account", id, "status must not be leased"));
        }

        info!(account_id = %id, "account queued for reset");
        self.publish(self.eventer.account_reset(&account), "reset", id);
        Ok(account)
    }

    /// Reconciles the account's principal access material and persists
    /// the policy hash when it changed.
    ///
    /// A concurrent writer may bump the version between our read and our
    /// save; the reconciliation itself is idempotent, so the operation
    /// re-reads and retries the save once before giving up.
    pub fn upsert_principal_access(&self, id: &str) -> Result<Account> {
        let mut retried = false;
        loop {
            let stored = self.store.get(id)?;
            let mut updated = stored.clone();
            self.manager.upsert_principal_access(&mut updated)?;

            if updated.principal_policy_hash == stored.principal_policy_hash {
                return Ok(stored);
            }
            match self.store.write(&updated, stored.last_modified_on) {
                Ok(saved) => return Ok(saved),
                Err(err) if err.kind() == ErrorKind::Conflict && !retried => {
                    warn!(account_id = %id, "policy hash save conflicted, retrying");
                    retried = true;
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn publish(&self, result: Result<()>, event: &str, id: &str) {
        if let Err(error) = result {
            warn!(%error, event, account_id = %id, "event publication failed");
        }
    }
}
