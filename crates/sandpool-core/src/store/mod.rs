//! Conditional-write record store for account and lease aggregates.
//!
//! This is the system's only compare-and-swap primitive and the only
//! place lost-update races are prevented. The write contract:
//!
//! - `expected_version == None` means create-only: the write fails with
//!   a conflict if a record with the key already exists.
//! - `expected_version == Some(v)` means the write fails with a conflict
//!   unless the stored `last_modified_on` equals `v` exactly.
//! - On success the store stamps a fresh `last_modified_on` (and
//!   `created_on` on create) and returns the updated aggregate.
//!
//! Listing takes a query template whose non-absent fields become a
//! conjunction of equality predicates; a present status field routes
//! through the status index, anything else is a scan with the filter
//! applied post-hoc. Pages resume via an opaque last-key cursor.

mod sqlite;

use serde::{Deserialize, Serialize};

pub use self::sqlite::SqliteStore;

/// Default page size when a query does not set one.
pub const DEFAULT_PAGE_LIMIT: u32 = 25;

/// Opaque resumption token returned by a paged listing.
///
/// Callers hold it and hand it back unchanged; its contents are an
/// implementation detail of the store that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor(String);

impl PageCursor {
    pub(crate) fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub(crate) fn raw(&self) -> &str {
        &self.0
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The matching items in this page.
    pub items: Vec<T>,
    /// Cursor for the next page, or `None` when the listing is exhausted.
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    /// An empty, exhausted page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}
