use crate::config::config;
use crate::expr::Expr;
use crate::policy::{Effect, PolicyDocument, Principal, Statement};
use eyre::{ContextCompat, OptionExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// The `sub` claim of a GitHub Actions token issued for a branch
///
/// Rendered as `repo:<org>/<repo>:ref:refs/heads/<branch>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject {
    org: String,
    repo: String,
    branch: String,
}

fn subject_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();

    REGEX.get_or_init(|| {
        Regex::new(
            r"^repo:(?<org>[A-Za-z0-9][A-Za-z0-9-]*)/(?<repo>[A-Za-z0-9._-]+):ref:refs/heads/(?<branch>[^\s:*?\[\\~^]+)$",
        )
        .expect("Subject regex is valid")
    })
}

impl Subject {
    pub fn new(org: &str, repo: &str, branch: &str) -> eyre::Result<Self> {
        format!("repo:{org}/{repo}:ref:refs/heads/{branch}").parse()
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }
}

impl FromStr for Subject {
    type Err = eyre::Report;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = subject_regex().captures(value).wrap_err_with(|| {
            format!("Subject {value:?} does not match repo:<org>/<repo>:ref:refs/heads/<branch>")
        })?;

        let branch = &captures["branch"];

        if branch.contains("..") || branch.ends_with('/') || branch.ends_with(".lock") {
            eyre::bail!("Branch name {branch:?} is not a valid git ref");
        }

        Ok(Subject {
            org: captures["org"].to_string(),
            repo: captures["repo"].to_string(),
            branch: branch.to_string(),
        })
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "repo:{}/{}:ref:refs/heads/{}",
            self.org, self.repo, self.branch
        )
    }
}

impl TryFrom<String> for Subject {
    type Error = eyre::Report;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.to_string()
    }
}

/// Federated identity allowed to assume the deploy role
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OidcTrust {
    /// ARN of the IAM OIDC provider, derived from the deploying account when absent
    #[serde(default)]
    pub provider_arn: Option<String>,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    pub subject: Subject,
}

fn default_issuer() -> String {
    config().oidc_issuer.to_string()
}

impl OidcTrust {
    pub fn new(subject: Subject) -> Self {
        OidcTrust {
            provider_arn: None,
            issuer: default_issuer(),
            subject,
        }
    }

    /// Provider ARN as written into the trust policy
    pub fn provider(&self) -> Expr {
        match &self.provider_arn {
            Some(arn) => Expr::literal(arn),
            None => Expr::sub(&format!(
                "arn:${{AWS::Partition}}:iam::${{AWS::AccountId}}:oidc-provider/{}",
                self.issuer
            )),
        }
    }

    pub fn trust_policy(&self) -> PolicyDocument {
        PolicyDocument::web_identity_trust(self.provider(), &self.issuer, &self.subject)
    }
}

/// A call to `sts:AssumeRoleWithWebIdentity` with a verified token
#[derive(Clone, Debug)]
pub struct AssumeRoleRequest {
    pub action: String,

    /// Federated principal the token was issued through
    pub provider_arn: String,

    /// Issuer host, prefixes the condition keys (`<issuer>:sub`)
    pub issuer: String,

    /// Token claims, e.g. `sub` and `aud`
    pub claims: BTreeMap<String, String>,
}

impl AssumeRoleRequest {
    pub fn web_identity(provider_arn: &str, issuer: &str, subject: &str) -> Self {
        AssumeRoleRequest {
            action: crate::policy::ASSUME_ROLE_WITH_WEB_IDENTITY.to_string(),
            provider_arn: provider_arn.to_string(),
            issuer: issuer.to_string(),
            claims: BTreeMap::from([("sub".to_string(), subject.to_string())]),
        }
    }

    fn context_value(&self, key: &str) -> Option<&String> {
        let claim = key.strip_prefix(&format!("{}:", self.issuer))?;
        self.claims.get(claim)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decide whether a trust policy lets the request assume the role
///
/// An explicit deny wins, otherwise any matching allow statement grants access.
/// Only `StringEquals` conditions are understood, any other operator fails closed.
/// `vars` resolve intrinsic functions in the principal (see `Expr::resolve`).
pub fn evaluate(
    document: &PolicyDocument,
    request: &AssumeRoleRequest,
    vars: &BTreeMap<String, String>,
) -> Decision {
    let matching = document
        .statement
        .iter()
        .filter(|statement| statement_matches(statement, request, vars))
        .collect::<Vec<_>>();

    if matching.iter().any(|s| s.effect == Effect::Deny) {
        return Decision::Deny;
    }

    if matching.iter().any(|s| s.effect == Effect::Allow) {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

fn statement_matches(
    statement: &Statement,
    request: &AssumeRoleRequest,
    vars: &BTreeMap<String, String>,
) -> bool {
    if !statement.allows_action(&request.action) {
        return false;
    }

    let principal_matches = match &statement.principal {
        Some(Principal::Any) => true,
        Some(Principal::Federated(arn)) => {
            arn.resolve(vars).as_deref() == Some(request.provider_arn.as_str())
        }
        _ => false,
    };

    principal_matches && conditions_match(statement, request)
}

fn conditions_match(statement: &Statement, request: &AssumeRoleRequest) -> bool {
    statement.condition.iter().all(|(operator, keys)| {
        operator == "StringEquals"
            && keys
                .iter()
                .all(|(key, expected)| request.context_value(key) == Some(expected))
    })
}

/// Subject a role's trust policy accepts, if it is pinned to one
pub fn trusted_subject(document: &PolicyDocument, issuer: &str) -> eyre::Result<Subject> {
    let key = format!("{issuer}:sub");

    document
        .statement
        .iter()
        .filter(|s| s.effect == Effect::Allow)
        .find_map(|s| s.condition.get("StringEquals")?.get(&key))
        .ok_or_eyre("Trust policy has no StringEquals condition on the subject")?
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER: &str =
        "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com";
    const ISSUER: &str = "token.actions.githubusercontent.com";

    fn vars() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("AWS::Partition".to_string(), "aws".to_string()),
            ("AWS::AccountId".to_string(), "123456789012".to_string()),
        ])
    }

    fn trust() -> OidcTrust {
        OidcTrust::new("repo:myorg/myrepo:ref:refs/heads/main".parse().unwrap())
    }

    #[test]
    fn test_should_parse_and_render_subject() {
        let subject: Subject = "repo:myorg/my.repo:ref:refs/heads/feature/x-1".parse().unwrap();

        assert_eq!(subject.org(), "myorg");
        assert_eq!(subject.repo(), "my.repo");
        assert_eq!(subject.branch(), "feature/x-1");
        assert_eq!(subject.to_string(), "repo:myorg/my.repo:ref:refs/heads/feature/x-1");
    }

    #[test]
    fn test_should_reject_malformed_subjects() {
        for subject in [
            "repo:myorg/myrepo:ref:refs/heads/*",
            "repo:myorg/myrepo:ref:refs/tags/v1",
            "repo:myorg/myrepo:environment:prod",
            "repo:myorg:ref:refs/heads/main",
            "repo:myorg/myrepo:ref:refs/heads/",
            "repo:myorg/myrepo:ref:refs/heads/a..b",
            "repo:-org/myrepo:ref:refs/heads/main",
            "repo:myorg/myrepo:ref:refs/heads/main ",
        ] {
            assert!(subject.parse::<Subject>().is_err(), "{subject} must be rejected");
        }
    }

    #[test]
    fn test_should_build_subject_from_parts() {
        let subject = Subject::new("myorg", "myrepo", "main").unwrap();
        assert_eq!(subject, trust().subject);
        assert!(Subject::new("my org", "myrepo", "main").is_err());
    }

    #[test]
    fn test_should_allow_trusted_subject() {
        let request = AssumeRoleRequest::web_identity(PROVIDER, ISSUER, "repo:myorg/myrepo:ref:refs/heads/main");
        assert_eq!(evaluate(&trust().trust_policy(), &request, &vars()), Decision::Allow);
    }

    #[test]
    fn test_should_deny_any_other_subject() {
        for subject in [
            "repo:myorg/myrepo:ref:refs/heads/dev",
            "repo:myorg/otherrepo:ref:refs/heads/main",
            "repo:otherorg/myrepo:ref:refs/heads/main",
            "repo:MyOrg/myrepo:ref:refs/heads/main",
            "repo:myorg/myrepo:pull_request",
        ] {
            let request = AssumeRoleRequest::web_identity(PROVIDER, ISSUER, subject);
            assert_eq!(
                evaluate(&trust().trust_policy(), &request, &vars()),
                Decision::Deny,
                "{subject} must be denied"
            );
        }
    }

    #[test]
    fn test_should_deny_other_provider_or_action() {
        let policy = trust().trust_policy();
        let subject = "repo:myorg/myrepo:ref:refs/heads/main";

        let other_account = AssumeRoleRequest::web_identity(
            "arn:aws:iam::999999999999:oidc-provider/token.actions.githubusercontent.com",
            ISSUER,
            subject,
        );
        assert_eq!(evaluate(&policy, &other_account, &vars()), Decision::Deny);

        let mut assume_role = AssumeRoleRequest::web_identity(PROVIDER, ISSUER, subject);
        assume_role.action = "sts:AssumeRole".into();
        assert_eq!(evaluate(&policy, &assume_role, &vars()), Decision::Deny);
    }

    #[test]
    fn test_should_deny_when_claim_is_missing() {
        let mut request = AssumeRoleRequest::web_identity(PROVIDER, ISSUER, "");
        request.claims.clear();
        assert_eq!(evaluate(&trust().trust_policy(), &request, &vars()), Decision::Deny);
    }

    #[test]
    fn test_should_use_configured_provider_arn() {
        let mut trust = trust();
        trust.provider_arn = Some(PROVIDER.into());

        assert_eq!(trust.provider(), Expr::literal(PROVIDER));

        let request = AssumeRoleRequest::web_identity(PROVIDER, ISSUER, "repo:myorg/myrepo:ref:refs/heads/main");
        assert_eq!(evaluate(&trust.trust_policy(), &request, &BTreeMap::new()), Decision::Allow);
    }

    #[test]
    fn test_should_read_trusted_subject_back() {
        let subject = trusted_subject(&trust().trust_policy(), ISSUER).unwrap();
        assert_eq!(subject.to_string(), "repo:myorg/myrepo:ref:refs/heads/main");
    }
}
