//! Account aggregate, lifecycle status, and the account service.
//!
//! An account is the pool's record of one leasable AWS account. Its
//! lifecycle is a small state machine:
//!
//! ```text
//!            create               lease
//!   (none) ────────▶ NotReady ──▶ Ready ──▶ Leased
//!                        ▲          │  ▲       │
//!                        │          ▼  └───────┘
//!                        └────── Orphaned ◀────┘
//! ```
//!
//! Status only moves along the edges above; everything else about the
//! record changes through the patch-style update operation.

mod model;
pub mod service;
mod status;
pub(crate) mod validate;

pub use self::model::{Account, AccountPatch, AccountQuery, NewAccount};
pub use self::service::AccountService;
pub use self::status::AccountStatus;
