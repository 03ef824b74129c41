//! Account aggregate and its wire-facing input types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::AccountStatus;
use crate::arn::Arn;
use crate::config::PrincipalConfig;
use crate::error::{Error, Result};
use crate::store::PageCursor;

/// A leasable account record tracked by the pool, distinct from the AWS
/// account it represents.
///
/// `last_modified_on` doubles as the optimistic-concurrency version token:
/// it is stamped by the record store on every successful write and must be
/// echoed back unchanged for the next write to succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// 12-digit numeric account identifier; immutable after creation.
    pub id: String,
    /// Lifecycle status; only changed through dedicated operations.
    #[serde(rename = "accountStatus")]
    pub status: AccountStatus,
    /// Role in the target account assumable by the system.
    pub admin_role_arn: Arn,
    /// Delegated role for principals; derived from the account ID and the
    /// configured role name.
    pub principal_role_arn: Arn,
    /// Scoped policy for principals; derived like the role ARN.
    pub principal_policy_arn: Arn,
    /// Content hash of the last successfully deployed policy document.
    /// Written only by the reconciler's success and skip paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_policy_hash: Option<String>,
    /// Open key/value annotations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Epoch seconds; stamped by the store on create.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<i64>,
    /// Epoch seconds; the version token. Stamped by the store, never by
    /// the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_on: Option<i64>,
}

impl Account {
    /// Creates a new account in `NotReady`, deriving the principal role
    /// and policy ARNs from the ID and configuration. Timestamps are left
    /// absent for the store to stamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the ID is not 12 numeric digits.
    pub fn new(
        id: impl Into<String>,
        admin_role_arn: Arn,
        metadata: Map<String, Value>,
        config: &PrincipalConfig,
    ) -> Result<Self> {
        let id = id.into();
        super::validate::validate_account_id(&id)?;
        Ok(Self {
            principal_role_arn: config.principal_role_arn(&id),
            principal_policy_arn: config.principal_policy_arn(&id),
            id,
            status: AccountStatus::NotReady,
            admin_role_arn,
            principal_policy_hash: None,
            metadata,
            created_on: None,
            last_modified_on: None,
        })
    }

    /// Name of the principal role, taken from the derived role ARN.
    #[must_use]
    pub fn principal_role_name(&self) -> &str {
        self.principal_role_arn
            .iam_resource_name()
            .unwrap_or_default()
    }
}

/// Caller-supplied material for creating an account. Status, timestamps,
/// and the derived principal fields are not representable here; they are
/// assigned by the lifecycle rules and the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    /// 12-digit numeric account identifier.
    pub id: String,
    /// Role in the target account assumable by the system.
    pub admin_role_arn: Arn,
    /// Open key/value annotations.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Partial update for an account.
///
/// Every field is optional; "field omitted" means leave unchanged, while
/// "field present" replaces the stored value. Only `admin_role_arn` and
/// `metadata` may actually be present: the remaining fields exist so a
/// wire payload that tries to smuggle them in is rejected explicitly
/// rather than silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPatch {
    /// Must be absent, or equal to the targeted account's ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Always rejected; status changes go through the status operation.
    #[serde(default, rename = "accountStatus", skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    /// Always rejected; stamped by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<i64>,
    /// Always rejected; stamped by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_on: Option<i64>,
    /// Always rejected; derived from the account ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_role_arn: Option<Arn>,
    /// Always rejected; written only by the reconciler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_policy_hash: Option<String>,
    /// New admin role; must pass the assumability probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_role_arn: Option<Arn>,
    /// Replacement metadata map. Present-but-empty clears the stored map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl AccountPatch {
    /// Validates the patch against the targeted account ID, rejecting any
    /// field that may not change through the general update path.
    pub(crate) fn validate(&self, target_id: &str) -> Result<()> {
        if let Some(id) = &self.id {
            if id != target_id {
                return Err(Error::validation(
                    "account",
                    format!("id: must be empty or match {target_id:?}"),
                ));
            }
        }
        if self.status.is_some() {
            return Err(Error::validation("account", "accountStatus: must be empty"));
        }
        if self.created_on.is_some() {
            return Err(Error::validation("account", "createdOn: must be empty"));
        }
        if self.last_modified_on.is_some() {
            return Err(Error::validation(
                "account",
                "lastModifiedOn: must be empty",
            ));
        }
        if self.principal_role_arn.is_some() {
            return Err(Error::validation(
                "account",
                "principalRoleArn: must be empty",
            ));
        }
        if self.principal_policy_hash.is_some() {
            return Err(Error::validation(
                "account",
                "principalPolicyHash: must be empty",
            ));
        }
        Ok(())
    }
}

/// Equality-filter template for listing accounts. Non-absent fields are
/// ANDed together; a present `status` routes through the status index.
#[derive(Debug, Clone, Default)]
pub struct AccountQuery {
    /// Match on status (indexed).
    pub status: Option<AccountStatus>,
    /// Match on the admin role ARN.
    pub admin_role_arn: Option<Arn>,
    /// Page size; the store default applies when absent.
    pub limit: Option<u32>,
    /// Resume cursor from a previous page.
    pub next: Option<PageCursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PrincipalConfig {
        PrincipalConfig::default()
    }

    #[test]
    fn test_new_account_derives_principal_arns() {
        let admin: Arn = "arn:aws:iam::123456789012:role/AdminAccess".parse().unwrap();
        let account = Account::new("123456789012", admin, Map::new(), &config()).unwrap();
        assert_eq!(account.status, AccountStatus::NotReady);
        assert_eq!(
            account.principal_role_arn.to_string(),
            "arn:aws:iam::123456789012:role/DCEPrincipal"
        );
        assert_eq!(
            account.principal_policy_arn.to_string(),
            "arn:aws:iam::123456789012:policy/DCEPrincipalDefaultPolicy"
        );
        assert_eq!(account.principal_role_name(), "DCEPrincipal");
        assert!(account.created_on.is_none());
        assert!(account.last_modified_on.is_none());
    }

    #[test]
    fn test_new_account_rejects_bad_id() {
        let admin: Arn = "arn:aws:iam::123456789012:role/AdminAccess".parse().unwrap();
        let err = Account::new("12345", admin, Map::new(), &config()).unwrap_err();
        assert!(err.to_string().contains("12 digits"));
    }

    #[test]
    fn test_patch_rejects_guarded_fields() {
        let target = "123456789012";

        let ok = AccountPatch {
            admin_role_arn: Some(Arn::iam_role(target, "Other")),
            ..AccountPatch::default()
        };
        assert!(ok.validate(target).is_ok());

        let matching_id = AccountPatch {
            id: Some(target.to_string()),
            ..AccountPatch::default()
        };
        assert!(matching_id.validate(target).is_ok());

        for patch in [
            AccountPatch {
                id: Some("999999999999".to_string()),
                ..AccountPatch::default()
            },
            AccountPatch {
                status: Some(AccountStatus::Ready),
                ..AccountPatch::default()
            },
            AccountPatch {
                last_modified_on: Some(42),
                ..AccountPatch::default()
            },
            AccountPatch {
                created_on: Some(42),
                ..AccountPatch::default()
            },
            AccountPatch {
                principal_role_arn: Some(Arn::iam_role(target, "DCEPrincipal")),
                ..AccountPatch::default()
            },
            AccountPatch {
                principal_policy_hash: Some("abc".to_string()),
                ..AccountPatch::default()
            },
        ] {
            assert!(patch.validate(target).is_err(), "{patch:?}");
        }
    }

    #[test]
    fn test_patch_preserves_present_empty_metadata() {
        let json = r#"{"metadata":{}}"#;
        let patch: AccountPatch = serde_json::from_str(json).unwrap();
        assert_eq!(patch.metadata, Some(Map::new()));

        let omitted: AccountPatch = serde_json::from_str("{}").unwrap();
        assert!(omitted.metadata.is_none());
    }
}
