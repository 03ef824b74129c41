//! Assumed-role credential handling.
//!
//! Assuming a role per reconciliation step is wasteful and rate-limited;
//! [`CachingCredentials`] keeps one live credential set per role ARN and
//! refreshes it shortly before expiry.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::arn::Arn;
use crate::error::{Error, Result};

/// Seconds before expiry at which cached credentials are refreshed.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// A set of temporary credentials for an assumed role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Expiry as epoch seconds.
    pub expires_on: i64,
}

impl Credentials {
    /// Returns `true` once the credentials are expired or about to be.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.expires_on - EXPIRY_MARGIN_SECONDS <= Utc::now().timestamp()
    }
}

/// Source of assumed-role credentials.
pub trait CredentialProvider {
    /// Assumes the given role and returns fresh credentials.
    fn assume_role(&self, role_arn: &Arn) -> Result<Credentials>;
}

/// Caching wrapper around a [`CredentialProvider`], keyed by role ARN.
#[derive(Debug)]
pub struct CachingCredentials<P> {
    inner: P,
    cache: RwLock<HashMap<String, Credentials>>,
}

impl<P> CachingCredentials<P> {
    /// Wraps a provider with a fresh cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: CredentialProvider> CredentialProvider for CachingCredentials<P> {
    fn assume_role(&self, role_arn: &Arn) -> Result<Credentials> {
        let key = role_arn.to_string();
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| Error::internal_message("credential cache lock poisoned"))?;
            if let Some(creds) = cache.get(&key) {
                if !creds.is_stale() {
                    return Ok(creds.clone());
                }
            }
        }

        let fresh = self.inner.assume_role(role_arn)?;
        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::internal_message("credential cache lock poisoned"))?;
        cache.insert(key, fresh.clone());
        Ok(fresh)
    }
}
