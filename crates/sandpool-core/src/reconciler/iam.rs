//! Narrow IAM provider abstraction.
//!
//! Only the operations the reconciler needs, with errors classified just
//! finely enough to tell "already there" and "already gone" apart from
//! real failures.

use thiserror::Error;

use crate::arn::Arn;
use crate::config::IamTag;
use crate::error::Result;

/// Classification of an [`IamError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IamErrorKind {
    /// The resource being created already exists.
    AlreadyExists,
    /// The resource being read or deleted does not exist.
    NoSuchEntity,
    /// Anything else: throttling, permissions, transport.
    Other,
}

/// Error returned by an [`IamClient`] operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct IamError {
    kind: IamErrorKind,
    message: String,
}

impl IamError {
    /// The resource being created already exists.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self {
            kind: IamErrorKind::AlreadyExists,
            message: message.into(),
        }
    }

    /// The resource being read or deleted does not exist.
    pub fn no_such_entity(message: impl Into<String>) -> Self {
        Self {
            kind: IamErrorKind::NoSuchEntity,
            message: message.into(),
        }
    }

    /// Any other provider failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: IamErrorKind::Other,
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> IamErrorKind {
        self.kind
    }
}

/// Convenience alias for IAM client operations.
pub type IamResult<T> = std::result::Result<T, IamError>;

/// Material for creating an IAM role.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    /// Role name.
    pub name: String,
    /// Role description.
    pub description: String,
    /// Trust policy document (JSON).
    pub assume_role_policy: String,
    /// Maximum session duration in seconds.
    pub max_session_duration: i64,
    /// Tags stamped on the role.
    pub tags: Vec<IamTag>,
}

/// Material for creating an IAM managed policy.
#[derive(Debug, Clone)]
pub struct PolicySpec {
    /// Policy name.
    pub name: String,
    /// Policy description.
    pub description: String,
    /// Policy document (JSON).
    pub document: String,
}

/// One version of an IAM managed policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVersion {
    /// Provider-assigned version identifier ("v1", "v2", ...).
    pub version_id: String,
    /// Whether this version is the policy's default.
    pub is_default: bool,
    /// Creation time as epoch seconds.
    pub create_date: i64,
}

/// IAM operations against one target account.
pub trait IamClient {
    /// Creates a role.
    fn create_role(&self, role: &RoleSpec) -> IamResult<()>;
    /// Deletes a role by name.
    fn delete_role(&self, role_name: &str) -> IamResult<()>;
    /// Creates a managed policy; its document becomes version v1.
    fn create_policy(&self, policy: &PolicySpec) -> IamResult<()>;
    /// Deletes a managed policy. All non-default versions must already be
    /// deleted.
    fn delete_policy(&self, policy_arn: &Arn) -> IamResult<()>;
    /// Lists the versions of a managed policy.
    fn list_policy_versions(&self, policy_arn: &Arn) -> IamResult<Vec<PolicyVersion>>;
    /// Creates a new policy version, optionally making it the default.
    fn create_policy_version(
        &self,
        policy_arn: &Arn,
        document: &str,
        set_as_default: bool,
    ) -> IamResult<()>;
    /// Deletes one non-default policy version.
    fn delete_policy_version(&self, policy_arn: &Arn, version_id: &str) -> IamResult<()>;
    /// Attaches a managed policy to a role.
    fn attach_role_policy(&self, role_name: &str, policy_arn: &Arn) -> IamResult<()>;
    /// Detaches a managed policy from a role.
    fn detach_role_policy(&self, role_name: &str, policy_arn: &Arn) -> IamResult<()>;
}

/// Produces an [`IamClient`] scoped to one account by assuming its admin
/// role.
pub trait IamConnector {
    /// The client type this connector produces.
    type Client: IamClient;

    /// Assumes the admin role and returns a client operating in its
    /// account.
    fn connect(&self, admin_role_arn: &Arn) -> Result<Self::Client>;
}
