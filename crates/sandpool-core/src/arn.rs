//! AWS ARN value type.
//!
//! Wraps the five-part `arn:partition:service:region:account-id:resource`
//! format with parsing, formatting, and the IAM resource-name helper used
//! when deriving role and policy names from stored ARNs. Serializes as the
//! plain ARN string.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A parsed AWS resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    /// Partition, e.g. `aws`.
    pub partition: String,
    /// Service, e.g. `iam`.
    pub service: String,
    /// Region; empty for global services such as IAM.
    pub region: String,
    /// The owning 12-digit account ID.
    pub account_id: String,
    /// The resource part, e.g. `role/AdminAccess`.
    pub resource: String,
}

impl Arn {
    /// Builds an ARN from its parts.
    #[must_use]
    pub fn new(
        partition: impl Into<String>,
        service: impl Into<String>,
        region: impl Into<String>,
        account_id: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            partition: partition.into(),
            service: service.into(),
            region: region.into(),
            account_id: account_id.into(),
            resource: resource.into(),
        }
    }

    /// Builds the ARN of an IAM role in the given account.
    #[must_use]
    pub fn iam_role(account_id: &str, role_name: &str) -> Self {
        Self::new("aws", "iam", "", account_id, format!("role/{role_name}"))
    }

    /// Builds the ARN of an IAM policy in the given account.
    #[must_use]
    pub fn iam_policy(account_id: &str, policy_name: &str) -> Self {
        Self::new("aws", "iam", "", account_id, format!("policy/{policy_name}"))
    }

    /// Returns the resource name past the last `/`, or `None` for ARNs
    /// outside the IAM service.
    #[must_use]
    pub fn iam_resource_name(&self) -> Option<&str> {
        if self.service != "iam" {
            return None;
        }
        Some(
            self.resource
                .rsplit('/')
                .next()
                .unwrap_or(self.resource.as_str()),
        )
    }

    /// Returns `true` if this is an IAM role ARN.
    #[must_use]
    pub fn is_iam_role(&self) -> bool {
        self.service == "iam" && self.resource.starts_with("role/")
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

impl FromStr for Arn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(6, ':');
        let prefix = parts.next();
        if prefix != Some("arn") {
            return Err(Error::validation("arn", format!("{s:?} is not an ARN")));
        }
        match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(partition), Some(service), Some(region), Some(account_id), Some(resource))
                if !partition.is_empty() && !service.is_empty() && !resource.is_empty() =>
            {
                Ok(Self::new(partition, service, region, account_id, resource))
            },
            _ => Err(Error::validation(
                "arn",
                format!("{s:?} is missing required ARN sections"),
            )),
        }
    }
}

impl Serialize for Arn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Arn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: Error| D::Error::custom(e.to_string()))
    }
}
