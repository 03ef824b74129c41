//! The reconciler itself: converges one account's principal role and
//! policy toward the configured state.

use tracing::{debug, info};

use super::credentials::CredentialProvider;
use super::iam::{IamClient, IamConnector, IamError, IamErrorKind, PolicySpec, RoleSpec};
use super::template::{DEFAULT_POLICY_TEMPLATE, hash_document, render_policy};
use super::{AccessManager, POLICY_VERSION_LIMIT};
use crate::account::Account;
use crate::arn::Arn;
use crate::config::PrincipalConfig;
use crate::error::{Error, Result};

/// Reconciles principal access material in target accounts.
///
/// `C` produces an IAM client per target account; `P` vouches that admin
/// roles are assumable.
#[derive(Debug)]
pub struct Reconciler<C, P> {
    connector: C,
    credentials: P,
    config: PrincipalConfig,
    template: String,
}

impl<C, P> Reconciler<C, P>
where
    C: IamConnector,
    P: CredentialProvider,
{
    /// Assembles a reconciler using the stock policy template.
    pub fn new(connector: C, credentials: P, config: PrincipalConfig) -> Self {
        Self {
            connector,
            credentials,
            config,
            template: DEFAULT_POLICY_TEMPLATE.to_string(),
        }
    }

    /// Replaces the policy template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    fn role_spec(&self) -> RoleSpec {
        RoleSpec {
            name: self.config.principal_role_name.clone(),
            description: self.config.principal_role_description.clone(),
            assume_role_policy: self.config.assume_role_policy(),
            max_session_duration: self.config.principal_max_session_duration,
            tags: self.config.tags.clone(),
        }
    }

    /// Replaces the default policy document with `document`, pruning the
    /// single oldest non-default version first when the provider's
    /// version limit is reached.
    fn push_policy_version(
        &self,
        client: &C::Client,
        policy_arn: &Arn,
        document: &str,
    ) -> Result<()> {
        let versions = client
            .list_policy_versions(policy_arn)
            .map_err(|e| iam_failure("list versions of policy", policy_arn, e))?;

        if versions.len() >= POLICY_VERSION_LIMIT {
            let oldest = versions
                .iter()
                .filter(|v| !v.is_default)
                .min_by_key(|v| v.create_date);
            if let Some(oldest) = oldest {
                debug!(policy = %policy_arn, version = %oldest.version_id, "pruning policy version");
                client
                    .delete_policy_version(policy_arn, &oldest.version_id)
                    .map_err(|e| iam_failure("prune version of policy", policy_arn, e))?;
            }
        }

        client
            .create_policy_version(policy_arn, document, true)
            .map_err(|e| iam_failure("create version of policy", policy_arn, e))
    }
}

impl<C, P> AccessManager for Reconciler<C, P>
where
    C: IamConnector,
    P: CredentialProvider,
{
    fn principal_config(&self) -> &PrincipalConfig {
        &self.config
    }

    fn validate_access(&self, admin_role_arn: &Arn) -> Result<()> {
        if !admin_role_arn.is_iam_role() {
            return Err(Error::validation(
                "account",
                "adminRoleArn: must be an IAM role arn",
            ));
        }
        self.credentials.assume_role(admin_role_arn).map_err(|_| {
            Error::validation(
                "account",
                "adminRoleArn: must be an admin role arn that can be assumed",
            )
        })?;
        Ok(())
    }

    fn upsert_principal_access(&self, account: &mut Account) -> Result<()> {
        let client = self.connector.connect(&account.admin_role_arn)?;

        let role = self.role_spec();
        match client.create_role(&role) {
            Ok(()) => info!(account_id = %account.id, role = %role.name, "created principal role"),
            Err(e) if e.kind() == IamErrorKind::AlreadyExists => {
                info!(account_id = %account.id, role = %role.name, "role already exists (ignoring)");
            },
            Err(e) => return Err(iam_failure("create role", &role.name, e)),
        }

        let document = render_policy(&self.template, account, &self.config)?;
        let hash = hash_document(&document);
        if account.principal_policy_hash.as_deref() == Some(hash.as_str()) {
            debug!(account_id = %account.id, "principal policy unchanged, skipping");
            return Ok(());
        }

        let policy_arn = account.principal_policy_arn.clone();
        let policy = PolicySpec {
            name: self.config.principal_policy_name.clone(),
            description: self.config.principal_policy_description.clone(),
            document: document.clone(),
        };
        match client.create_policy(&policy) {
            Ok(()) => info!(account_id = %account.id, policy = %policy_arn, "created principal policy"),
            Err(e) if e.kind() == IamErrorKind::AlreadyExists => {
                info!(account_id = %account.id, policy = %policy_arn, "policy exists, pushing new version");
                self.push_policy_version(&client, &policy_arn, &document)?;
            },
            Err(e) => return Err(iam_failure("create policy", &policy_arn, e)),
        }
        account.principal_policy_hash = Some(hash);

        match client.attach_role_policy(&role.name, &policy_arn) {
            Ok(()) => {},
            Err(e) if e.kind() == IamErrorKind::AlreadyExists => {
                debug!(account_id = %account.id, "policy already attached (ignoring)");
            },
            Err(e) => return Err(iam_failure("attach policy to role", &role.name, e)),
        }
        Ok(())
    }

    fn delete_principal_access(&self, account: &Account) -> Result<()> {
        let client = self.connector.connect(&account.admin_role_arn)?;
        let role_name = &self.config.principal_role_name;
        let policy_arn = &account.principal_policy_arn;

        match client.detach_role_policy(role_name, policy_arn) {
            Ok(()) => {},
            Err(e) if e.kind() == IamErrorKind::NoSuchEntity => {
                debug!(account_id = %account.id, "policy already detached (ignoring)");
            },
            Err(e) => return Err(iam_failure("detach policy from role", role_name, e)),
        }

        match client.list_policy_versions(policy_arn) {
            Ok(versions) => {
                for version in versions.iter().filter(|v| !v.is_default) {
                    match client.delete_policy_version(policy_arn, &version.version_id) {
                        Ok(()) => {},
                        Err(e) if e.kind() == IamErrorKind::NoSuchEntity => {},
                        Err(e) => {
                            return Err(iam_failure("delete version of policy", policy_arn, e));
                        },
                    }
                }
                match client.delete_policy(policy_arn) {
                    Ok(()) => info!(account_id = %account.id, policy = %policy_arn, "deleted principal policy"),
                    Err(e) if e.kind() == IamErrorKind::NoSuchEntity => {},
                    Err(e) => return Err(iam_failure("delete policy", policy_arn, e)),
                }
            },
            Err(e) if e.kind() == IamErrorKind::NoSuchEntity => {
                debug!(account_id = %account.id, "policy already gone (ignoring)");
            },
            Err(e) => return Err(iam_failure("list versions of policy", policy_arn, e)),
        }

        match client.delete_role(role_name) {
            Ok(()) => info!(account_id = %account.id, role = %role_name, "deleted principal role"),
            Err(e) if e.kind() == IamErrorKind::NoSuchEntity => {
                debug!(account_id = %account.id, "role already gone (ignoring)");
            },
            Err(e) => return Err(iam_failure("delete role", role_name, e)),
        }
        Ok(())
    }
}

fn iam_failure(operation: &str, name: impl std::fmt::Display, err: IamError) -> Error {
    Error::internal(format!("failed to {operation} {name}"), err)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use serde_json::Map;

    use super::super::credentials::Credentials;
    use super::super::iam::{IamResult, PolicyVersion};
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug, Default)]
    struct IamState {
        roles: Vec<String>,
        policies: BTreeMap<String, Vec<PolicyVersion>>,
        attachments: Vec<(String, String)>,
        calls: Vec<String>,
        clock: i64,
    }

    impl IamState {
        fn next_version(&mut self, is_default: bool) -> PolicyVersion {
            self.clock += 1;
            PolicyVersion {
                version_id: format!("v{}", self.clock),
                is_default,
                create_date: self.clock,
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    struct FakeIam {
        state: Arc<Mutex<IamState>>,
    }

    impl FakeIam {
        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn versions(&self, policy_arn: &Arn) -> Vec<PolicyVersion> {
            self.state.lock().unwrap().policies[&policy_arn.to_string()].clone()
        }
    }

    impl IamClient for FakeIam {
        fn create_role(&self, role: &RoleSpec) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("create_role".to_string());
            if state.roles.contains(&role.name) {
                return Err(IamError::already_exists(format!(
                    "role {} already exists",
                    role.name
                )));
            }
            state.roles.push(role.name.clone());
            Ok(())
        }

        fn delete_role(&self, role_name: &str) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("delete_role".to_string());
            let before = state.roles.len();
            state.roles.retain(|r| r != role_name);
            if state.roles.len() == before {
                return Err(IamError::no_such_entity(format!("no role {role_name}")));
            }
            Ok(())
        }

        fn create_policy(&self, policy: &PolicySpec) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("create_policy".to_string());
            let arn = Arn::iam_policy("123456789012", &policy.name).to_string();
            if state.policies.contains_key(&arn) {
                return Err(IamError::already_exists(format!(
                    "policy {} already exists",
                    policy.name
                )));
            }
            let version = state.next_version(true);
            state.policies.insert(arn, vec![version]);
            Ok(())
        }

        fn delete_policy(&self, policy_arn: &Arn) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("delete_policy".to_string());
            let key = policy_arn.to_string();
            match state.policies.get(&key) {
                None => Err(IamError::no_such_entity(format!("no policy {policy_arn}"))),
                Some(versions) if versions.iter().any(|v| !v.is_default) => Err(
                    IamError::other("policy still has non-default versions"),
                ),
                Some(_) => {
                    state.policies.remove(&key);
                    Ok(())
                },
            }
        }

        fn list_policy_versions(&self, policy_arn: &Arn) -> IamResult<Vec<PolicyVersion>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("list_policy_versions".to_string());
            state
                .policies
                .get(&policy_arn.to_string())
                .cloned()
                .ok_or_else(|| IamError::no_such_entity(format!("no policy {policy_arn}")))
        }

        fn create_policy_version(
            &self,
            policy_arn: &Arn,
            _document: &str,
            set_as_default: bool,
        ) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("create_policy_version".to_string());
            let version = state.next_version(set_as_default);
            let versions = state
                .policies
                .get_mut(&policy_arn.to_string())
                .ok_or_else(|| IamError::no_such_entity(format!("no policy {policy_arn}")))?;
            if versions.len() >= POLICY_VERSION_LIMIT {
                return Err(IamError::other("policy version limit exceeded"));
            }
            if set_as_default {
                for v in versions.iter_mut() {
                    v.is_default = false;
                }
            }
            versions.push(version);
            Ok(())
        }

        fn delete_policy_version(&self, policy_arn: &Arn, version_id: &str) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("delete_policy_version".to_string());
            let versions = state
                .policies
                .get_mut(&policy_arn.to_string())
                .ok_or_else(|| IamError::no_such_entity(format!("no policy {policy_arn}")))?;
            match versions.iter().position(|v| v.version_id == version_id) {
                Some(i) if versions[i].is_default => {
                    Err(IamError::other("cannot delete the default version"))
                },
                Some(i) => {
                    versions.remove(i);
                    Ok(())
                },
                None => Err(IamError::no_such_entity(format!("no version {version_id}"))),
            }
        }

        fn attach_role_policy(&self, role_name: &str, policy_arn: &Arn) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("attach_role_policy".to_string());
            let pair = (role_name.to_string(), policy_arn.to_string());
            if state.attachments.contains(&pair) {
                return Err(IamError::already_exists("already attached"));
            }
            state.attachments.push(pair);
            Ok(())
        }

        fn detach_role_policy(&self, role_name: &str, policy_arn: &Arn) -> IamResult<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("detach_role_policy".to_string());
            let pair = (role_name.to_string(), policy_arn.to_string());
            let before = state.attachments.len();
            state.attachments.retain(|p| p != &pair);
            if state.attachments.len() == before {
                return Err(IamError::no_such_entity("not attached"));
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FakeConnector {
        client: FakeIam,
    }

    impl IamConnector for FakeConnector {
        type Client = FakeIam;

        fn connect(&self, _admin_role_arn: &Arn) -> Result<FakeIam> {
            Ok(self.client.clone())
        }
    }

    #[derive(Debug)]
    struct StaticCreds;

    impl CredentialProvider for StaticCreds {
        fn assume_role(&self, role_arn: &Arn) -> Result<Credentials> {
            Ok(Credentials {
                access_key_id: "AKIA0".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: role_arn.to_string(),
                expires_on: i64::MAX,
            })
        }
    }

    #[derive(Debug)]
    struct NoCreds;

    impl CredentialProvider for NoCreds {
        fn assume_role(&self, role_arn: &Arn) -> Result<Credentials> {
            Err(Error::internal_message(format!(
                "access denied assuming {role_arn}"
            )))
        }
    }

    fn reconciler(client: FakeIam) -> Reconciler<FakeConnector, StaticCreds> {
        Reconciler::new(
            FakeConnector { client },
            StaticCreds,
            PrincipalConfig::default(),
        )
    }

    fn account() -> Account {
        Account::new(
            "123456789012",
            Arn::iam_role("123456789012", "AdminAccess"),
            Map::new(),
            &PrincipalConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_upsert_provisions_role_policy_and_attachment() {
        let client = FakeIam::default();
        let reconciler = reconciler(client.clone());
        let mut account = account();

        reconciler.upsert_principal_access(&mut account).unwrap();

        let state = client.state.lock().unwrap();
        assert_eq!(state.roles, vec!["DCEPrincipal"]);
        let versions = &state.policies
            ["arn:aws:iam::123456789012:policy/DCEPrincipalDefaultPolicy"];
        assert_eq!(versions.len(), 1);
        assert!(versions[0].is_default);
        assert_eq!(
            state.attachments,
            vec![(
                "DCEPrincipal".to_string(),
                "arn:aws:iam::123456789012:policy/DCEPrincipalDefaultPolicy".to_string()
            )]
        );
        drop(state);

        let hash = account.principal_policy_hash.expect("hash recorded");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_upsert_second_pass_skips_policy_work() {
        let client = FakeIam::default();
        let reconciler = reconciler(client.clone());
        let mut account = account();

        reconciler.upsert_principal_access(&mut account).unwrap();
        let first_pass = client.calls();

        reconciler.upsert_principal_access(&mut account).unwrap();
        let second_pass = &client.calls()[first_pass.len()..];

        // The role create is attempted and swallowed; the hash short-circuits
        // everything after it.
        assert_eq!(second_pass, ["create_role"]);
        assert_eq!(client.versions(&account.principal_policy_arn).len(), 1);
    }

    #[test]
    fn test_upsert_tolerates_existing_role() {
        let client = FakeIam::default();
        client.state.lock().unwrap().roles.push("DCEPrincipal".to_string());
        let reconciler = reconciler(client.clone());
        let mut account = account();

        reconciler.upsert_principal_access(&mut account).unwrap();
        assert_eq!(client.state.lock().unwrap().roles, vec!["DCEPrincipal"]);
        assert!(account.principal_policy_hash.is_some());
    }

    #[test]
    fn test_changed_policy_pushes_new_default_version() {
        let client = FakeIam::default();
        let mut account = account();
        reconciler(client.clone())
            .upsert_principal_access(&mut account)
            .unwrap();
        let first_hash = account.principal_policy_hash.clone().unwrap();

        let changed = reconciler(client.clone())
            .with_template(r#"{"Version": "2012-10-17", "Statement": []}"#);
        changed.upsert_principal_access(&mut account).unwrap();

        assert_ne!(account.principal_policy_hash.as_ref(), Some(&first_hash));
        let versions = client.versions(&account.principal_policy_arn);
        assert_eq!(versions.len(), 2);
        assert!(versions.last().unwrap().is_default);
        assert!(!versions[0].is_default);
    }

    #[test]
    fn test_version_limit_prunes_oldest_non_default() {
        let client = FakeIam::default();
        let mut account = account();
        let policy_key = account.principal_policy_arn.to_string();

        // Full policy: five versions, with the default NOT being the oldest.
        {
            let mut state = client.state.lock().unwrap();
            let versions = vec![
                PolicyVersion {
                    version_id: "v1".to_string(),
                    is_default: false,
                    create_date: 10,
                },
                PolicyVersion {
                    version_id: "v2".to_string(),
                    is_default: true,
                    create_date: 5,
                },
                PolicyVersion {
                    version_id: "v3".to_string(),
                    is_default: false,
                    create_date: 30,
                },
                PolicyVersion {
                    version_id: "v4".to_string(),
                    is_default: false,
                    create_date: 40,
                },
                PolicyVersion {
                    version_id: "v5".to_string(),
                    is_default: false,
                    create_date: 50,
                },
            ];
            state.policies.insert(policy_key, versions);
            state.clock = 100;
        }

        reconciler(client.clone())
            .upsert_principal_access(&mut account)
            .unwrap();

        let versions = client.versions(&account.principal_policy_arn);
        assert_eq!(versions.len(), 5);
        // v1 (oldest non-default by create date) was pruned; v2 survived
        // despite its older date because it was the default.
        let ids: Vec<_> = versions.iter().map(|v| v.version_id.as_str()).collect();
        assert!(!ids.contains(&"v1"));
        assert!(ids.contains(&"v2"));
        assert!(versions.last().unwrap().is_default);
    }

    #[test]
    fn test_teardown_removes_everything() {
        let client = FakeIam::default();
        let reconciler = reconciler(client.clone());
        let mut account = account();
        reconciler.upsert_principal_access(&mut account).unwrap();

        reconciler.delete_principal_access(&account).unwrap();

        let state = client.state.lock().unwrap();
        assert!(state.roles.is_empty());
        assert!(state.policies.is_empty());
        assert!(state.attachments.is_empty());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let client = FakeIam::default();
        let reconciler = reconciler(client.clone());
        let mut account = account();
        reconciler.upsert_principal_access(&mut account).unwrap();

        reconciler.delete_principal_access(&account).unwrap();
        // Nothing left; every step sees NoSuchEntity and carries on.
        reconciler.delete_principal_access(&account).unwrap();
    }

    #[test]
    fn test_teardown_prunes_versions_before_policy() {
        let client = FakeIam::default();
        let mut account = account();
        reconciler(client.clone())
            .upsert_principal_access(&mut account)
            .unwrap();
        reconciler(client.clone())
            .with_template(r#"{"Version": "2012-10-17", "Statement": []}"#)
            .upsert_principal_access(&mut account)
            .unwrap();
        assert_eq!(client.versions(&account.principal_policy_arn).len(), 2);

        // The fake refuses to delete a policy that still has non-default
        // versions, so success proves the ordering.
        reconciler(client.clone())
            .delete_principal_access(&account)
            .unwrap();
        assert!(client.state.lock().unwrap().policies.is_empty());
    }

    #[test]
    fn test_validate_access_requires_assumable_role() {
        let ok = reconciler(FakeIam::default());
        ok.validate_access(&Arn::iam_role("123456789012", "AdminAccess"))
            .unwrap();

        let err = ok
            .validate_access(&Arn::iam_policy("123456789012", "NotARole"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let denied = Reconciler::new(
            FakeConnector {
                client: FakeIam::default(),
            },
            NoCreds,
            PrincipalConfig::default(),
        );
        let err = denied
            .validate_access(&Arn::iam_role("123456789012", "AdminAccess"))
            .unwrap_err();
        assert!(err.to_string().contains("can be assumed"));
    }
}
