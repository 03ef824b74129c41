//! Static configuration for principal access material.
//!
//! Names and parameters for the per-account delegated role and policy.
//! The role and policy ARNs stored on an account are always derived from
//! the account ID plus this configuration, never supplied by callers.

use serde::{Deserialize, Serialize};

use crate::arn::Arn;

/// A key/value tag applied to created IAM resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamTag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl IamTag {
    /// Creates a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Configuration for the principal role/policy pair managed per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalConfig {
    /// The 12-digit ID of the account the system itself runs in. The
    /// principal role trusts this account's root for assumption.
    pub system_account_id: String,
    /// Name of the delegated role created in each leased account.
    pub principal_role_name: String,
    /// Name of the scoped policy attached to the principal role.
    pub principal_policy_name: String,
    /// Description applied to the created role.
    pub principal_role_description: String,
    /// Description applied to the created policy.
    pub principal_policy_description: String,
    /// Maximum session duration for the principal role, in seconds.
    pub principal_max_session_duration: i64,
    /// Tag keys principals are denied from modifying.
    pub principal_deny_tags: Vec<String>,
    /// Regions in which principals may operate.
    pub allowed_regions: Vec<String>,
    /// Tags stamped on every created role.
    pub tags: Vec<IamTag>,
}

impl Default for PrincipalConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PrincipalConfig {
    /// Creates a configuration builder with the stock defaults.
    #[must_use]
    pub fn builder() -> PrincipalConfigBuilder {
        PrincipalConfigBuilder::new()
    }

    /// ARN of the principal role for the given account.
    #[must_use]
    pub fn principal_role_arn(&self, account_id: &str) -> Arn {
        Arn::iam_role(account_id, &self.principal_role_name)
    }

    /// ARN of the principal policy for the given account.
    #[must_use]
    pub fn principal_policy_arn(&self, account_id: &str) -> Arn {
        Arn::iam_policy(account_id, &self.principal_policy_name)
    }

    /// Trust policy allowing the system account to assume the principal
    /// role.
    #[must_use]
    pub fn assume_role_policy(&self) -> String {
        serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [
                {
                    "Effect": "Allow",
                    "Principal": {
                        "AWS": format!("arn:aws:iam::{}:root", self.system_account_id)
                    },
                    "Action": "sts:AssumeRole",
                    "Condition": {}
                }
            ]
        })
        .to_string()
    }
}

/// Builder for [`PrincipalConfig`].
#[derive(Debug, Clone)]
pub struct PrincipalConfigBuilder {
    config: PrincipalConfig,
}

impl PrincipalConfigBuilder {
    /// Creates a builder populated with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PrincipalConfig {
                system_account_id: "111111111111".to_string(),
                principal_role_name: "DCEPrincipal".to_string(),
                principal_policy_name: "DCEPrincipalDefaultPolicy".to_string(),
                principal_role_description: "Role for principal users of leased accounts"
                    .to_string(),
                principal_policy_description: "Policy for principal users of leased accounts"
                    .to_string(),
                // The provider's minimum.
                principal_max_session_duration: 3600,
                principal_deny_tags: Vec::new(),
                allowed_regions: vec!["us-east-1".to_string()],
                tags: Vec::new(),
            },
        }
    }

    /// Sets the system account ID.
    #[must_use]
    pub fn system_account_id(mut self, id: impl Into<String>) -> Self {
        self.config.system_account_id = id.into();
        self
    }

    /// Sets the principal role name.
    #[must_use]
    pub fn principal_role_name(mut self, name: impl Into<String>) -> Self {
        self.config.principal_role_name = name.into();
        self
    }

    /// Sets the principal policy name.
    #[must_use]
    pub fn principal_policy_name(mut self, name: impl Into<String>) -> Self {
        self.config.principal_policy_name = name.into();
        self
    }

    /// Sets the maximum session duration in seconds.
    #[must_use]
    pub fn principal_max_session_duration(mut self, seconds: i64) -> Self {
        self.config.principal_max_session_duration = seconds;
        self
    }

    /// Sets the deny-tag list.
    #[must_use]
    pub fn principal_deny_tags(mut self, tags: Vec<String>) -> Self {
        self.config.principal_deny_tags = tags;
        self
    }

    /// Sets the allowed regions.
    #[must_use]
    pub fn allowed_regions(mut self, regions: Vec<String>) -> Self {
        self.config.allowed_regions = regions;
        self
    }

    /// Adds a tag stamped on created roles.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.tags.push(IamTag::new(key, value));
        self
    }

    /// Finalizes the configuration.
    #[must_use]
    pub fn build(self) -> PrincipalConfig {
        self.config
    }
}

impl Default for PrincipalConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = PrincipalConfig::default();
        assert_eq!(config.principal_role_name, "DCEPrincipal");
        assert_eq!(config.principal_policy_name, "DCEPrincipalDefaultPolicy");
        assert_eq!(config.principal_max_session_duration, 3600);
    }

    #[test]
    fn test_derived_arns() {
        let config = PrincipalConfig::default();
        assert_eq!(
            config.principal_role_arn("123456789012").to_string(),
            "arn:aws:iam::123456789012:role/DCEPrincipal"
        );
        assert_eq!(
            config.principal_policy_arn("123456789012").to_string(),
            "arn:aws:iam::123456789012:policy/DCEPrincipalDefaultPolicy"
        );
    }

    #[test]
    fn test_assume_role_policy_names_system_account() {
        let config = PrincipalConfig::builder()
            .system_account_id("999999999999")
            .build();
        let doc = config.assume_role_policy();
        assert!(doc.contains("arn:aws:iam::999999999999:root"));
        assert!(doc.contains("sts:AssumeRole"));
    }
}
