use crate::expr::Expr;
use crate::oidc::Subject;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";

/// Condition operator -> context key -> expected value
pub type Conditions = BTreeMap<String, BTreeMap<String, String>>;

/// IAM policy document, either a resource policy or a role trust policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    pub effect: Effect,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,

    #[serde(with = "one_or_many")]
    pub action: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Expr>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: Conditions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum Principal {
    /// `"*"`, anyone including anonymous callers
    Any,
    Federated(Expr),
    Service(String),
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Anyone may read objects of the bucket
    ///
    /// The ARN is interpolated from the bucket's logical ID, so it always
    /// points to the bucket CloudFormation actually created.
    pub fn public_read(bucket_logical_id: &str) -> Self {
        Self::new(vec![Statement {
            sid: Some("PublicReadGetObject".into()),
            effect: Effect::Allow,
            principal: Some(Principal::Any),
            action: vec!["s3:GetObject".into()],
            resource: Some(Expr::sub(&format!("arn:aws:s3:::${{{bucket_logical_id}}}/*"))),
            condition: Conditions::new(),
        }])
    }

    /// Trust policy for a role assumed with an OIDC token
    ///
    /// The token's `sub` claim must equal the subject exactly.
    pub fn web_identity_trust(provider_arn: Expr, issuer: &str, subject: &Subject) -> Self {
        let condition = Conditions::from([(
            "StringEquals".to_string(),
            BTreeMap::from([(format!("{issuer}:sub"), subject.to_string())]),
        )]);

        Self::new(vec![Statement {
            sid: None,
            effect: Effect::Allow,
            principal: Some(Principal::Federated(provider_arn)),
            action: vec![ASSUME_ROLE_WITH_WEB_IDENTITY.into()],
            resource: None,
            condition,
        }])
    }
}

impl Statement {
    pub fn allows_action(&self, action: &str) -> bool {
        self.action.iter().any(|a| a == action || a == "*")
    }

    pub fn is_public(&self) -> bool {
        self.effect == Effect::Allow && self.principal == Some(Principal::Any)
    }
}

impl From<Principal> for Value {
    fn from(principal: Principal) -> Self {
        match principal {
            Principal::Any => json!("*"),
            Principal::Federated(arn) => json!({ "Federated": arn }),
            Principal::Service(service) => json!({ "Service": service }),
        }
    }
}

impl TryFrom<Value> for Principal {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match &value {
            Value::String(s) if s == "*" => return Ok(Principal::Any),
            Value::Object(object) if object.get("AWS") == Some(&json!("*")) => {
                return Ok(Principal::Any)
            }
            _ => {}
        }

        if let Some(federated) = value.get("Federated") {
            return Expr::try_from(federated.clone()).map(Principal::Federated);
        }

        match value.get("Service") {
            Some(Value::String(service)) => Ok(Principal::Service(service.clone())),
            Some(Value::Array(services)) if services.len() == 1 => services[0]
                .as_str()
                .map(|s| Principal::Service(s.to_string()))
                .ok_or_else(|| format!("Unsupported principal: {value}")),
            _ => Err(format!("Unsupported principal: {value}")),
        }
    }
}

/// A single action is written as a plain string
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub(super) fn serialize<S: Serializer>(items: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        match items {
            [one] => one.serialize(serializer),
            many => many.serialize(serializer),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(one) => vec![one],
            OneOrMany::Many(many) => many,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_public_read_policy() {
        let document = serde_json::to_value(PolicyDocument::public_read("WebsiteBucketsite")).unwrap();

        assert_eq!(
            document,
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": "PublicReadGetObject",
                    "Effect": "Allow",
                    "Principal": "*",
                    "Action": "s3:GetObject",
                    "Resource": {"Fn::Sub": "arn:aws:s3:::${WebsiteBucketsite}/*"}
                }]
            })
        );
    }

    #[test]
    fn test_should_render_web_identity_trust_policy() {
        let subject: Subject = "repo:myorg/myrepo:ref:refs/heads/main".parse().unwrap();
        let document = PolicyDocument::web_identity_trust(
            Expr::literal("arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com"),
            "token.actions.githubusercontent.com",
            &subject,
        );

        assert_eq!(
            serde_json::to_value(document).unwrap(),
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": {
                        "Federated": "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com"
                    },
                    "Action": "sts:AssumeRoleWithWebIdentity",
                    "Condition": {
                        "StringEquals": {
                            "token.actions.githubusercontent.com:sub": "repo:myorg/myrepo:ref:refs/heads/main"
                        }
                    }
                }]
            })
        );
    }

    #[test]
    fn test_should_parse_policy_with_action_list_and_service_principal() {
        let document: PolicyDocument = serde_json::from_value(json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"Service": ["ecs-tasks.amazonaws.com"]},
                "Action": ["sts:AssumeRole", "sts:TagSession"]
            }]
        }))
        .unwrap();

        let statement = &document.statement[0];
        assert_eq!(statement.principal, Some(Principal::Service("ecs-tasks.amazonaws.com".into())));
        assert!(statement.allows_action("sts:TagSession"));
        assert!(!statement.is_public());
    }
}
