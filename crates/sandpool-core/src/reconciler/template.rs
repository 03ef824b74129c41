//! Policy document rendering and content hashing.
//!
//! The principal policy is a template with a handful of placeholders
//! filled from the account and the principal configuration. The rendered
//! document is hashed so the reconciler can tell a changed policy from a
//! redeploy of the same one.

use sha2::{Digest, Sha256};

use crate::account::Account;
use crate::config::PrincipalConfig;
use crate::error::{Error, Result};

/// Stock principal policy: everything is allowed except leaving the
/// allowed regions, stripping protected tags, or touching the pool's own
/// access material.
pub const DEFAULT_POLICY_TEMPLATE: &str = r#"{
  "Version": "2012-10-17",
  "Statement": [
    {
      "Sid": "DenyOutsideAllowedRegions",
      "Effect": "Deny",
      "NotAction": ["iam:*", "sts:*", "support:*"],
      "Resource": "*",
      "Condition": {
        "StringNotEquals": {"aws:RequestedRegion": {{AllowedRegions}}}
      }
    },
    {
      "Sid": "DenyProtectedTagModification",
      "Effect": "Deny",
      "Action": ["iam:TagRole", "iam:UntagRole", "tag:TagResources", "tag:UntagResources"],
      "Resource": "*",
      "Condition": {
        "ForAnyValue:StringEquals": {"aws:TagKeys": {{PrincipalDenyTags}}}
      }
    },
    {
      "Sid": "DenyPoolAccessMaterial",
      "Effect": "Deny",
      "Action": "*",
      "Resource": ["{{PrincipalRoleArn}}", "{{PrincipalPolicyArn}}", "{{AdminRoleArn}}"]
    },
    {
      "Sid": "AllowEverythingElse",
      "Effect": "Allow",
      "Action": "*",
      "Resource": "*"
    }
  ]
}"#;

/// Renders a policy template for one account.
///
/// Scalar placeholders take the ARN's string form; list placeholders are
/// substituted as JSON arrays.
///
/// # Errors
///
/// Returns `Internal` if the template still contains a placeholder after
/// substitution.
pub fn render_policy(
    template: &str,
    account: &Account,
    config: &PrincipalConfig,
) -> Result<String> {
    let regions = encode_list(&config.allowed_regions)?;
    let deny_tags = encode_list(&config.principal_deny_tags)?;

    let rendered = template
        .replace("{{PrincipalRoleArn}}", &account.principal_role_arn.to_string())
        .replace(
            "{{PrincipalPolicyArn}}",
            &account.principal_policy_arn.to_string(),
        )
        .replace("{{AdminRoleArn}}", &account.admin_role_arn.to_string())
        .replace("{{AllowedRegions}}", &regions)
        .replace("{{PrincipalDenyTags}}", &deny_tags);

    if let Some(start) = rendered.find("{{") {
        let rest = &rendered[start..];
        let end = rest.find("}}").map_or(rest.len(), |i| i + 2);
        return Err(Error::internal_message(format!(
            "policy template contains unrecognized placeholder {:?}",
            &rest[..end]
        )));
    }
    Ok(rendered)
}

/// Content hash of a rendered policy document: hex SHA-256 over the
/// trimmed text.
#[must_use]
pub fn hash_document(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.trim().as_bytes());
    hex::encode(hasher.finalize())
}

fn encode_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items)
        .map_err(|e| Error::internal("failed to encode policy template list", e))
}
