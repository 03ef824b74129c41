//! Validation rules for lease creation.

use chrono::Utc;

use super::model::NewLease;
use super::service::LeaseConfig;
use crate::account::validate::validate_account_id;
use crate::error::{Error, Result};

/// Validates a creation request against the configured limits, filling in
/// the default expiry when absent. Returns the effective `expires_on`.
pub(crate) fn validate_new_lease(input: &NewLease, config: &LeaseConfig) -> Result<i64> {
    if input.principal_id.is_empty() {
        return Err(Error::validation("lease", "principalId: must not be empty"));
    }
    validate_account_id(&input.account_id)
        .map_err(|_| Error::validation("lease", "accountId: must be a string with 12 digits"))?;

    if input.budget_amount > config.max_budget_amount {
        return Err(Error::validation(
            "lease",
            format!(
                "budgetAmount: requested budget of {} is greater than max lease budget amount of {}",
                input.budget_amount, config.max_budget_amount
            ),
        ));
    }

    let now = Utc::now().timestamp();
    let expires_on = input
        .expires_on
        .unwrap_or(now + config.default_lease_length_days * 24 * 60 * 60);

    if expires_on <= now {
        return Err(Error::validation(
            "lease",
            format!("expiresOn: desired expiry date {expires_on} is not in the future"),
        ));
    }

    let max_expires_on = now + config.max_lease_period_seconds;
    if expires_on > max_expires_on {
        return Err(Error::validation(
            "lease",
            format!(
                "expiresOn: desired expiry date {expires_on} is greater than the max lease period end of {max_expires_on}"
            ),
        ));
    }

    Ok(expires_on)
}
