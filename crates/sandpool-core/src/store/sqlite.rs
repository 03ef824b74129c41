//! SQLite-backed implementation of the record store.
//!
//! Aggregates are stored as a JSON body column next to the key, status,
//! and version columns the store conditions on. The status columns carry
//! secondary indexes; a query template with a present status routes
//! through them, anything else scans and filters post-hoc.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::{DEFAULT_PAGE_LIMIT, Page, PageCursor};
use crate::account::service::{AccountDeleter, AccountReader, AccountWriter};
use crate::account::{Account, AccountQuery};
use crate::error::{Error, Result};
use crate::lease::service::{LeaseDeleter, LeaseReader, LeaseWriter};
use crate::lease::{Lease, LeaseQuery};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id               TEXT PRIMARY KEY,
    status           TEXT NOT NULL,
    created_on       INTEGER NOT NULL,
    last_modified_on INTEGER NOT NULL,
    body             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_accounts_status ON accounts(status, id);

CREATE TABLE IF NOT EXISTS leases (
    account_id       TEXT NOT NULL,
    principal_id     TEXT NOT NULL,
    id               TEXT NOT NULL,
    status           TEXT NOT NULL,
    created_on       INTEGER NOT NULL,
    last_modified_on INTEGER NOT NULL,
    body             TEXT NOT NULL,
    PRIMARY KEY (account_id, principal_id)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_leases_id ON leases(id);
CREATE INDEX IF NOT EXISTS idx_leases_status ON leases(status, account_id, principal_id);
";

/// Composite-key cursor payload for lease pages.
#[derive(Debug, Serialize, Deserialize)]
struct LeaseKey {
    #[serde(rename = "a")]
    account_id: String,
    #[serde(rename = "p")]
    principal_id: String,
}

/// Record store for accounts and leases backed by a single SQLite
/// database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wraps an existing connection, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the schema cannot be created.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::internal("failed to initialize record store schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::internal("failed to open record store database", e))?;
        Self::new(conn)
    }

    /// Opens an in-memory store, used by tests.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database cannot be opened.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::internal("failed to open in-memory record store", e))?;
        Self::new(conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal_message("record store lock poisoned"))
    }

    /// Stamps a fresh version token, strictly different from (and never
    /// behind) the previous one even within the same clock second.
    fn stamp_version(previous: Option<i64>) -> i64 {
        let now = Utc::now().timestamp();
        match previous {
            Some(prev) if prev >= now => prev + 1,
            _ => now,
        }
    }

    fn is_constraint_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl AccountReader for SqliteStore {
    fn get(&self, id: &str) -> Result<Account> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row("SELECT body FROM accounts WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| Error::internal(format!("get failed for account {id:?}"), e))?;

        match body {
            Some(body) => serde_json::from_str(&body)
                .map_err(|e| Error::internal(format!("failure unmarshaling account {id:?}"), e)),
            None => Err(Error::not_found("account", id)),
        }
    }

    fn list(&self, query: &AccountQuery) -> Result<Page<Account>> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 {
            return Ok(Page::empty());
        }
        let after = query.next.as_ref().map_or("", |c| c.raw());

        let conn = self.lock()?;
        let mut rows: Vec<(String, String)> = Vec::new();
        let map_err = |e: rusqlite::Error| Error::internal("failed to query accounts", e);

        if let Some(status) = query.status {
            // Index-backed route.
            let mut stmt = conn
                .prepare(
                    "SELECT id, body FROM accounts
                     WHERE status = ?1 AND id > ?2 ORDER BY id LIMIT ?3",
                )
                .map_err(map_err)?;
            let mapped = stmt
                .query_map(params![status.as_str(), after, limit], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(map_err)?;
            for row in mapped {
                rows.push(row.map_err(map_err)?);
            }
        } else {
            let mut stmt = conn
                .prepare("SELECT id, body FROM accounts WHERE id > ?1 ORDER BY id LIMIT ?2")
                .map_err(map_err)?;
            let mapped = stmt
                .query_map(params![after, limit], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(map_err)?;
            for row in mapped {
                rows.push(row.map_err(map_err)?);
            }
        }

        let next = (rows.len() as u32 == limit)
            .then(|| rows.last().map(|(id, _)| PageCursor::new(id.clone())))
            .flatten();

        // Remaining equality predicates are applied post-hoc, after the
        // page was cut.
        let mut items = Vec::with_capacity(rows.len());
        for (id, body) in rows {
            let account: Account = serde_json::from_str(&body)
                .map_err(|e| Error::internal(format!("failure unmarshaling account {id:?}"), e))?;
            if let Some(admin_role_arn) = &query.admin_role_arn {
                if &account.admin_role_arn != admin_role_arn {
                    continue;
                }
            }
            items.push(account);
        }

        Ok(Page { items, next })
    }
}

impl AccountWriter for SqliteStore {
    fn write(&self, account: &Account, expected_version: Option<i64>) -> Result<Account> {
        let mut stamped = account.clone();
        let version = Self::stamp_version(expected_version);
        stamped.last_modified_on = Some(version);

        let conn = self.lock()?;
        match expected_version {
            None => {
                stamped.created_on = Some(version);
                let body = serialize_account(&stamped)?;
                conn.execute(
                    "INSERT INTO accounts (id, status, created_on, last_modified_on, body)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        stamped.id,
                        stamped.status.as_str(),
                        version,
                        version,
                        body
                    ],
                )
                .map_err(|e| {
                    if Self::is_constraint_violation(&e) {
                        Error::conflict(
                            "account",
                            &stamped.id,
                            "account has been modified since request was made",
                        )
                    } else {
                        Error::internal(format!("update failed for account {:?}", stamped.id), e)
                    }
                })?;
            },
            Some(prev) => {
                let body = serialize_account(&stamped)?;
                let changed = conn
                    .execute(
                        "UPDATE accounts SET status = ?1, last_modified_on = ?2, body = ?3
                         WHERE id = ?4 AND last_modified_on = ?5",
                        params![stamped.status.as_str(), version, body, stamped.id, prev],
                    )
                    .map_err(|e| {
                        Error::internal(format!("update failed for account {:?}", stamped.id), e)
                    })?;
                if changed == 0 {
                    return Err(Error::conflict(
                        "account",
                        &stamped.id,
                        "account has been modified since request was made",
                    ));
                }
            },
        }

        Ok(stamped)
    }
}

impl AccountDeleter for SqliteStore {
    fn delete(&self, account: &Account) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM accounts WHERE id = ?1", [&account.id])
            .map_err(|e| Error::internal(format!("delete failed for account {:?}", account.id), e))?;
        Ok(())
    }
}

fn serialize_account(account: &Account) -> Result<String> {
    serde_json::to_string(account)
        .map_err(|e| Error::internal(format!("failure marshaling account {:?}", account.id), e))
}

impl LeaseReader for SqliteStore {
    fn get(&self, account_id: &str, principal_id: &str) -> Result<Lease> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM leases WHERE account_id = ?1 AND principal_id = ?2",
                [account_id, principal_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| {
                Error::internal(
                    format!("get failed for lease {account_id:?}/{principal_id:?}"),
                    e,
                )
            })?;

        match body {
            Some(body) => deserialize_lease(&body),
            None => Err(Error::not_found(
                "lease",
                format!("{account_id}/{principal_id}"),
            )),
        }
    }

    fn get_by_id(&self, lease_id: &str) -> Result<Lease> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM leases WHERE id = ?1",
                [lease_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::internal(format!("get failed for lease {lease_id:?}"), e))?;

        match body {
            Some(body) => deserialize_lease(&body),
            None => Err(Error::not_found("lease", lease_id)),
        }
    }

    fn list(&self, query: &LeaseQuery) -> Result<Page<Lease>> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 {
            return Ok(Page::empty());
        }
        let after = match &query.next {
            Some(cursor) => serde_json::from_str::<LeaseKey>(cursor.raw())
                .map_err(|e| Error::internal("failed to decode lease page cursor", e))?,
            None => LeaseKey {
                account_id: String::new(),
                principal_id: String::new(),
            },
        };

        let conn = self.lock()?;
        let map_err = |e: rusqlite::Error| Error::internal("failed to query leases", e);
        let mut rows: Vec<(String, String, String)> = Vec::new();

        if let Some(status) = query.status {
            let mut stmt = conn
                .prepare(
                    "SELECT account_id, principal_id, body FROM leases
                     WHERE status = ?1
                       AND (account_id > ?2 OR (account_id = ?2 AND principal_id > ?3))
                     ORDER BY account_id, principal_id LIMIT ?4",
                )
                .map_err(map_err)?;
            let mapped = stmt
                .query_map(
                    params![status.as_str(), after.account_id, after.principal_id, limit],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(map_err)?;
            for row in mapped {
                rows.push(row.map_err(map_err)?);
            }
        } else {
            let mut stmt = conn
                .prepare(
                    "SELECT account_id, principal_id, body FROM leases
                     WHERE (account_id > ?1 OR (account_id = ?1 AND principal_id > ?2))
                     ORDER BY account_id, principal_id LIMIT ?3",
                )
                .map_err(map_err)?;
            let mapped = stmt
                .query_map(
                    params![after.account_id, after.principal_id, limit],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(map_err)?;
            for row in mapped {
                rows.push(row.map_err(map_err)?);
            }
        }

        let next = (rows.len() as u32 == limit)
            .then(|| {
                rows.last().map(|(account_id, principal_id, _)| {
                    let key = LeaseKey {
                        account_id: account_id.clone(),
                        principal_id: principal_id.clone(),
                    };
                    PageCursor::new(serde_json::to_string(&key).unwrap_or_default())
                })
            })
            .flatten();

        let mut items = Vec::with_capacity(rows.len());
        for (_, _, body) in rows {
            let lease = deserialize_lease(&body)?;
            if let Some(account_id) = &query.account_id {
                if &lease.account_id != account_id {
                    continue;
                }
            }
            if let Some(principal_id) = &query.principal_id {
                if &lease.principal_id != principal_id {
                    continue;
                }
            }
            items.push(lease);
        }

        Ok(Page { items, next })
    }
}

impl LeaseWriter for SqliteStore {
    fn write(&self, lease: &Lease, expected_version: Option<i64>) -> Result<Lease> {
        let mut stamped = lease.clone();
        let version = Self::stamp_version(expected_version);
        stamped.last_modified_on = Some(version);

        let conn = self.lock()?;
        match expected_version {
            None => {
                stamped.created_on = Some(version);
                let body = serialize_lease(&stamped)?;
                conn.execute(
                    "INSERT INTO leases
                     (account_id, principal_id, id, status, created_on, last_modified_on, body)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        stamped.account_id,
                        stamped.principal_id,
                        stamped.id,
                        stamped.status.as_str(),
                        version,
                        version,
                        body
                    ],
                )
                .map_err(|e| {
                    if Self::is_constraint_violation(&e) {
                        Error::conflict(
                            "lease",
                            &stamped.id,
                            "lease has been modified since request was made",
                        )
                    } else {
                        Error::internal(format!("update failed for lease {:?}", stamped.id), e)
                    }
                })?;
            },
            Some(prev) => {
                // A create over an ended pair lands here with a fresh
                // aggregate; it gets its creation stamp now. The `id`
                // column follows the aggregate so the secondary lookup
                // tracks the replacement.
                if stamped.created_on.is_none() {
                    stamped.created_on = Some(version);
                }
                let body = serialize_lease(&stamped)?;
                let changed = conn
                    .execute(
                        "UPDATE leases
                         SET id = ?1, status = ?2, created_on = ?3,
                             last_modified_on = ?4, body = ?5
                         WHERE account_id = ?6 AND principal_id = ?7 AND last_modified_on = ?8",
                        params![
                            stamped.id,
                            stamped.status.as_str(),
                            stamped.created_on,
                            version,
                            body,
                            stamped.account_id,
                            stamped.principal_id,
                            prev
                        ],
                    )
                    .map_err(|e| {
                        Error::internal(format!("update failed for lease {:?}", stamped.id), e)
                    })?;
                if changed == 0 {
                    return Err(Error::conflict(
                        "lease",
                        &stamped.id,
                        "lease has been modified since request was made",
                    ));
                }
            },
        }

        Ok(stamped)
    }
}

impl LeaseDeleter for SqliteStore {
    fn delete(&self, lease: &Lease) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM leases WHERE account_id = ?1 AND principal_id = ?2",
            [&lease.account_id, &lease.principal_id],
        )
        .map_err(|e| Error::internal(format!("delete failed for lease {:?}", lease.id), e))?;
        Ok(())
    }
}

fn serialize_lease(lease: &Lease) -> Result<String> {
    serde_json::to_string(lease)
        .map_err(|e| Error::internal(format!("failure marshaling lease {:?}", lease.id), e))
}

fn deserialize_lease(body: &str) -> Result<Lease> {
    serde_json::from_str(body).map_err(|e| Error::internal("failure unmarshaling lease", e))
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::account::AccountStatus;
    use crate::arn::Arn;
    use crate::config::PrincipalConfig;
    use crate::error::ErrorKind;
    use crate::lease::{LeaseStatus, LeaseStatusReason};

    fn account(id: &str) -> Account {
        Account::new(
            id,
            Arn::iam_role(id, "AdminAccess"),
            Map::new(),
            &PrincipalConfig::default(),
        )
        .unwrap()
    }

    fn lease(account_id: &str, principal_id: &str) -> Lease {
        Lease {
            account_id: account_id.to_string(),
            principal_id: principal_id.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            status: LeaseStatus::Active,
            status_reason: LeaseStatusReason::Active,
            budget_amount: 50.0,
            budget_currency: "USD".to_string(),
            budget_notification_emails: vec![],
            expires_on: 4_102_444_800,
            status_modified_on: None,
            metadata: Map::new(),
            created_on: None,
            last_modified_on: None,
        }
    }

    #[test]
    fn test_create_once() {
        let store = SqliteStore::in_memory().unwrap();
        let first = AccountWriter::write(&store, &account("123456789012"), None).unwrap();
        assert!(first.created_on.is_some());
        assert_eq!(first.created_on, first.last_modified_on);

        let err = AccountWriter::write(&store, &account("123456789012"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("123456789012"));
    }

    #[test]
    fn test_cas_requires_exact_version() {
        let store = SqliteStore::in_memory().unwrap();
        let stored = AccountWriter::write(&store, &account("123456789012"), None).unwrap();
        let version = stored.last_modified_on.unwrap();

        // Wrong version loses.
        let err = AccountWriter::write(&store, &stored,Some(version + 7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Exact version wins and the new token differs.
        let updated = AccountWriter::write(&store, &stored,Some(version)).unwrap();
        assert_ne!(updated.last_modified_on.unwrap(), version);
        assert!(updated.last_modified_on.unwrap() > version);

        // The old token is now stale.
        let err = AccountWriter::write(&store, &stored,Some(version)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_get_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let err = AccountReader::get(&store, "123456789012").unwrap_err();
        assert_eq!(err, Error::not_found("account", "123456789012"));
    }

    #[test]
    fn test_get_roundtrips_aggregate() {
        let store = SqliteStore::in_memory().unwrap();
        let mut input = account("123456789012");
        input
            .metadata
            .insert("team".to_string(), serde_json::json!("platform"));
        let written = AccountWriter::write(&store, &input, None).unwrap();
        let read = AccountReader::get(&store, "123456789012").unwrap();
        assert_eq!(read, written);
        assert_eq!(read.metadata["team"], "platform");
    }

    #[test]
    fn test_list_routes_by_status_index() {
        let store = SqliteStore::in_memory().unwrap();
        for (id, status) in [
            ("111111111111", AccountStatus::Ready),
            ("222222222222", AccountStatus::NotReady),
            ("333333333333", AccountStatus::Ready),
        ] {
            let mut a = account(id);
            a.status = status;
            AccountWriter::write(&store, &a, None).unwrap();
        }

        let page = AccountReader::list(
            &store,
            &AccountQuery {
                status: Some(AccountStatus::Ready),
                ..AccountQuery::default()
            })
            .unwrap();
        let ids: Vec<_> = page.items.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["111111111111", "333333333333"]);
        assert!(page.next.is_none());
    }

    #[test]
    fn test_list_scan_filters_post_hoc() {
        let store = SqliteStore::in_memory().unwrap();
        AccountWriter::write(&store, &account("111111111111"), None).unwrap();
        AccountWriter::write(&store, &account("222222222222"), None).unwrap();

        let page = AccountReader::list(
            &store,
            &AccountQuery {
                admin_role_arn: Some(Arn::iam_role("222222222222", "AdminAccess")),
                ..AccountQuery::default()
            })
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "222222222222");
    }

    #[test]
    fn test_list_pagination_resumes_from_cursor() {
        let store = SqliteStore::in_memory().unwrap();
        for id in ["111111111111", "222222222222", "333333333333"] {
            AccountWriter::write(&store, &account(id), None).unwrap();
        }

        let first = AccountReader::list(
            &store,
            &AccountQuery {
                limit: Some(2),
                ..AccountQuery::default()
            })
            .unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next.expect("more pages");

        let second = AccountReader::list(
            &store,
            &AccountQuery {
                limit: Some(2),
                next: Some(cursor),
                ..AccountQuery::default()
            })
            .unwrap();
        let ids: Vec<_> = second.items.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["333333333333"]);
    }

    #[test]
    fn test_lease_composite_key_and_secondary_id() {
        let store = SqliteStore::in_memory().unwrap();
        let written = LeaseWriter::write(&store, &lease("123456789012", "user1"), None).unwrap();

        let by_key = LeaseReader::get(&store, "123456789012", "user1").unwrap();
        assert_eq!(by_key, written);

        let by_id = store.get_by_id(&written.id).unwrap();
        assert_eq!(by_id, written);

        let err = LeaseReader::get(&store, "123456789012", "user2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_lease_replacement_moves_secondary_id() {
        let store = SqliteStore::in_memory().unwrap();
        let first = LeaseWriter::write(&store, &lease("123456789012", "user1"), None).unwrap();

        // A fresh aggregate written over the pair under the old version
        // token, as the service does when re-leasing an ended pair.
        let replacement = lease("123456789012", "user1");
        let written = LeaseWriter::write(&store, &replacement,first.last_modified_on).unwrap();
        assert_ne!(written.id, first.id);
        assert_eq!(written.created_on, written.last_modified_on);

        let by_new_id = store.get_by_id(&written.id).unwrap();
        assert_eq!(by_new_id, written);

        // The retired ID no longer resolves to anything.
        let err = store.get_by_id(&first.id).unwrap_err();
        assert_eq!(err, Error::not_found("lease", &first.id));
    }

    #[test]
    fn test_lease_create_once_per_pair() {
        let store = SqliteStore::in_memory().unwrap();
        LeaseWriter::write(&store, &lease("123456789012", "user1"), None).unwrap();
        let err = LeaseWriter::write(&store, &lease("123456789012", "user1"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_lease_list_by_status_and_account() {
        let store = SqliteStore::in_memory().unwrap();
        let mut ended = lease("111111111111", "user1");
        ended.status = LeaseStatus::Inactive;
        ended.status_reason = LeaseStatusReason::Destroyed;
        LeaseWriter::write(&store, &ended, None).unwrap();
        LeaseWriter::write(&store, &lease("111111111111", "user2"), None).unwrap();
        LeaseWriter::write(&store, &lease("222222222222", "user1"), None).unwrap();

        let page = LeaseReader::list(
            &store,
            &LeaseQuery {
                status: Some(LeaseStatus::Active),
                account_id: Some("111111111111".to_string()),
                ..LeaseQuery::default()
            })
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].principal_id, "user2");
    }

    #[test]
    fn test_reopen_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");

        let written = {
            let store = SqliteStore::open(&path).unwrap();
            AccountWriter::write(&store, &account("123456789012"), None).unwrap()
        };

        let store = SqliteStore::open(&path).unwrap();
        let read = AccountReader::get(&store, "123456789012").unwrap();
        assert_eq!(read, written);
    }

    #[test]
    fn test_delete_account() {
        let store = SqliteStore::in_memory().unwrap();
        let written = AccountWriter::write(&store, &account("123456789012"), None).unwrap();
        AccountDeleter::delete(&store, &written).unwrap();
        let err = AccountReader::get(&store, "123456789012").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
