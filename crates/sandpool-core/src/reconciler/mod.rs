//! Principal access reconciliation.
//!
//! Each pooled account carries a delegated principal role and a scoped
//! policy, both derived from configuration. The reconciler drives the
//! pair in the target account toward that desired state: it converges
//! rather than assuming a clean slate, so every step tolerates the
//! resource already existing (on the way up) or already being gone (on
//! the way down).
//!
//! The IAM provider itself sits behind [`IamClient`], with
//! [`IamConnector`] producing a client scoped to one account's admin
//! role.

mod credentials;
mod iam;
mod service;
mod template;

use crate::account::Account;
use crate::arn::Arn;
use crate::config::PrincipalConfig;
use crate::error::Result;

pub use self::credentials::{CachingCredentials, CredentialProvider, Credentials};
pub use self::iam::{
    IamClient, IamConnector, IamError, IamErrorKind, IamResult, PolicySpec, PolicyVersion,
    RoleSpec,
};
pub use self::service::Reconciler;
pub use self::template::{DEFAULT_POLICY_TEMPLATE, hash_document, render_policy};

/// Maximum number of versions an IAM managed policy may hold.
pub const POLICY_VERSION_LIMIT: usize = 5;

/// The access-management seam used by the account service.
pub trait AccessManager {
    /// The configuration the derived principal ARNs come from.
    fn principal_config(&self) -> &PrincipalConfig;

    /// Probes that the given admin role can be assumed.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when the ARN is not an assumable IAM role.
    fn validate_access(&self, admin_role_arn: &Arn) -> Result<()>;

    /// Converges the account's principal role and policy toward the
    /// configured state, recording the deployed policy hash on the
    /// aggregate. Idempotent.
    fn upsert_principal_access(&self, account: &mut Account) -> Result<()>;

    /// Tears down the account's principal role and policy. Idempotent:
    /// already-missing resources are not an error.
    fn delete_principal_access(&self, account: &Account) -> Result<()>;
}
