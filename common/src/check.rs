use crate::config::config;
use crate::expr::Expr;
use crate::graph::{self, Graph};
use crate::oidc::trusted_subject;
use crate::policy::{PolicyDocument, Principal, ASSUME_ROLE_WITH_WEB_IDENTITY};
use crate::stack::Stack;
use crate::template::Template;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const PUBLIC_ACCESS_FLAGS: [&str; 4] = [
    "BlockPublicAcls",
    "IgnorePublicAcls",
    "BlockPublicPolicy",
    "RestrictPublicBuckets",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,

    /// Logical ID of the resource (or output) the finding is about
    pub resource: String,

    pub message: String,
}

/// Result of the static checks, errors first
#[derive(Clone, Debug, Default, Serialize)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    fn push(&mut self, severity: Severity, resource: &str, message: String) {
        self.findings.push(Finding {
            severity,
            resource: resource.to_string(),
            message,
        });
    }

    fn error(&mut self, resource: &str, message: String) {
        self.push(Severity::Error, resource, message);
    }

    fn warning(&mut self, resource: &str, message: String) {
        self.push(Severity::Warning, resource, message);
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Check a rendered template before it is handed to CloudFormation
pub fn check(template: &Template) -> Report {
    check_resources(template.stack(), template.resources(), template.outputs())
}

/// Same as [check], for resources that did not come out of [Template::new]
pub fn check_resources(
    stack: &Stack,
    resources: &Map<String, Value>,
    outputs: &Map<String, Value>,
) -> Report {
    let graph = Graph::new(resources);
    let mut report = Report::default();

    references(&graph, outputs, &mut report);
    let public_buckets = bucket_policies(resources, &graph, &mut report);
    public_access(resources, &public_buckets, &mut report);
    trust_policies(stack, resources, &mut report);
    service_networks(stack, resources, &graph, &mut report);
    website_source(stack, &mut report);

    report.findings.sort_by(|a, b| {
        (a.severity, &a.resource).cmp(&(b.severity, &b.resource))
    });

    log::debug!("Checks found {} issues", report.findings.len());
    report
}

fn of_type<'a>(
    resources: &'a Map<String, Value>,
    resource_type: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    resources
        .iter()
        .filter(move |(_, r)| r.get("Type").and_then(Value::as_str) == Some(resource_type))
        .map(|(name, r)| (name, r.get("Properties").unwrap_or(&Value::Null)))
}

/// Logical ID of `{"Ref": ..}` or `{"Fn::GetAtt": [.., ..]}`
fn target(value: &Value) -> Option<String> {
    match Expr::try_from(value.clone()).ok()? {
        Expr::Ref(id) | Expr::GetAtt(id, _) => Some(id),
        _ => None,
    }
}

fn references(graph: &Graph, outputs: &Map<String, Value>, report: &mut Report) {
    for dangling in graph.dangling() {
        report.error(
            &dangling.resource,
            format!("References {} which is not declared in the template", dangling.target),
        );
    }

    if let Err(error) = graph.order() {
        report.error("", error.to_string());
    }

    for (name, output) in outputs {
        for target in graph::references(output.get("Value").unwrap_or(&Value::Null)) {
            if graph.resource_type(&target).is_none() {
                report.error(
                    name,
                    format!("Output references {target} which is not declared in the template"),
                );
            }
        }
    }
}

/// Bucket policy ARNs must follow the live bucket, returns buckets with a public policy
fn bucket_policies(
    resources: &Map<String, Value>,
    graph: &Graph,
    report: &mut Report,
) -> BTreeSet<String> {
    let mut public_buckets = BTreeSet::new();

    for (name, properties) in of_type(resources, "AWS::S3::BucketPolicy") {
        let Some(bucket) = target(&properties["Bucket"]) else {
            report.error(
                name,
                "Bucket must reference the bucket resource, not a literal name".into(),
            );
            continue;
        };

        if graph.resource_type(&bucket) != Some("AWS::S3::Bucket") {
            report.error(name, format!("{bucket} is not a bucket declared in the template"));
            continue;
        }

        let document =
            match serde_json::from_value::<PolicyDocument>(properties["PolicyDocument"].clone()) {
                Ok(document) => document,
                Err(error) => {
                    report.error(name, format!("Policy document is malformed: {error}"));
                    continue;
                }
            };

        for statement in &document.statement {
            let derived = match &statement.resource {
                Some(Expr::Sub(arn)) => ["arn:aws:s3:::", "arn:${AWS::Partition}:s3:::"]
                    .iter()
                    .any(|prefix| arn.starts_with(&format!("{prefix}${{{bucket}}}/"))),
                _ => false,
            };

            if !derived {
                report.error(
                    name,
                    format!(
                        "Resource must be derived from the bucket, e.g. arn:aws:s3:::${{{bucket}}}/*, got {}",
                        statement
                            .resource
                            .as_ref()
                            .map(|r| Value::from(r.clone()).to_string())
                            .unwrap_or("nothing".into())
                    ),
                );
            }

            if statement.is_public() {
                public_buckets.insert(bucket.clone());
            }
        }
    }

    public_buckets
}

/// A public policy is rejected unless every block flag is off
fn public_access(
    resources: &Map<String, Value>,
    public_buckets: &BTreeSet<String>,
    report: &mut Report,
) {
    for (name, properties) in of_type(resources, "AWS::S3::Bucket") {
        let block = properties.get("PublicAccessBlockConfiguration");

        // Absent flags mean the provider default, which blocks everything
        let flag = |flag: &str| {
            block
                .and_then(|b| b.get(flag))
                .and_then(Value::as_bool)
                .unwrap_or(true)
        };

        if public_buckets.contains(name) {
            for blocking in PUBLIC_ACCESS_FLAGS.into_iter().filter(|f| flag(*f)) {
                report.error(
                    name,
                    format!("{blocking} must be false, the bucket has a public policy"),
                );
            }
        } else if PUBLIC_ACCESS_FLAGS.into_iter().any(|f| !flag(f)) {
            report.warning(
                name,
                "Public access is unblocked but no public policy is declared".into(),
            );
        }
    }
}

/// Web identity roles must be pinned to one repo and branch
fn trust_policies(stack: &Stack, resources: &Map<String, Value>, report: &mut Report) {
    let issuer = stack
        .compute
        .as_ref()
        .map(|c| c.oidc.issuer.as_str())
        .unwrap_or(config().oidc_issuer);

    for (name, properties) in of_type(resources, "AWS::IAM::Role") {
        let document = match serde_json::from_value::<PolicyDocument>(
            properties["AssumeRolePolicyDocument"].clone(),
        ) {
            Ok(document) => document,
            Err(error) => {
                report.error(name, format!("Trust policy is malformed: {error}"));
                continue;
            }
        };

        let web_identity = document.statement.iter().filter(|s| {
            s.allows_action(ASSUME_ROLE_WITH_WEB_IDENTITY)
                && matches!(s.principal, Some(Principal::Federated(_)))
        });

        for statement in web_identity {
            if statement.condition.is_empty() {
                report.error(
                    name,
                    "Any token of the identity provider can assume the role, add a subject condition".into(),
                );
            }

            for operator in statement.condition.keys().filter(|o| *o != "StringEquals") {
                report.error(
                    name,
                    format!("{operator} is not allowed, the subject must match exactly with StringEquals"),
                );
            }
        }

        let is_web_identity = document
            .statement
            .iter()
            .any(|s| matches!(s.principal, Some(Principal::Federated(_))));

        if is_web_identity {
            if let Err(error) = trusted_subject(&document, issuer) {
                report.error(name, format!("{error:#}"));
            }
        }
    }
}

/// With a network stack the service stays in the declared private subnet
fn service_networks(stack: &Stack, resources: &Map<String, Value>, graph: &Graph, report: &mut Report) {
    let vpc_of = |id: &str| {
        resources
            .get(id)
            .and_then(|r| r.get("Properties"))
            .and_then(|p| target(&p["VpcId"]))
    };

    for (name, properties) in of_type(resources, "AWS::ECS::Service") {
        let awsvpc = target(&properties["TaskDefinition"])
            .and_then(|task| resources.get(&task))
            .is_some_and(|task| task["Properties"]["NetworkMode"] == "awsvpc");

        let Some(network) = properties
            .get("NetworkConfiguration")
            .and_then(|n| n.get("AwsvpcConfiguration"))
        else {
            if awsvpc {
                report.warning(
                    name,
                    "Task uses awsvpc network mode but the service has no network configuration".into(),
                );
            }

            continue;
        };

        if !awsvpc {
            report.error(
                name,
                "Network configuration requires a task in awsvpc network mode".into(),
            );
        }

        if !stack.with_network_stack() {
            continue;
        }

        if network.get("AssignPublicIp").and_then(Value::as_str) == Some("ENABLED") {
            report.error(name, "AssignPublicIp must be DISABLED in the private subnet".into());
        }

        let subnets = network["Subnets"].as_array().cloned().unwrap_or_default();
        let groups = network["SecurityGroups"].as_array().cloned().unwrap_or_default();

        if subnets.is_empty() || groups.is_empty() {
            report.error(name, "Service needs both a subnet and a security group".into());
        }

        let mut subnet_vpcs = BTreeSet::new();

        for subnet in &subnets {
            match target(subnet) {
                Some(id) if graph.resource_type(&id) == Some("AWS::EC2::Subnet") => {
                    let subnet_properties = &resources[&id]["Properties"];

                    if subnet_properties["MapPublicIpOnLaunch"] == true {
                        report.error(&id, "MapPublicIpOnLaunch must be false".into());
                    }

                    subnet_vpcs.extend(vpc_of(&id));
                }
                _ => report.error(
                    name,
                    format!("Subnet {subnet} must reference the subnet declared in the template"),
                ),
            }
        }

        for group in &groups {
            match target(group) {
                Some(id) if graph.resource_type(&id) == Some("AWS::EC2::SecurityGroup") => {
                    let group_vpc = vpc_of(&id);

                    if group_vpc.is_none() || subnet_vpcs.iter().any(|vpc| Some(vpc) != group_vpc.as_ref()) {
                        report.error(
                            name,
                            format!(
                                "Security group {id} is in VPC {}, its subnets are in {}",
                                group_vpc.as_deref().unwrap_or("none"),
                                subnet_vpcs.iter().cloned().collect::<Vec<_>>().join(", ")
                            ),
                        );
                    }
                }
                _ => report.error(
                    name,
                    format!("Security group {group} must reference the group declared in the template"),
                ),
            }
        }
    }
}

fn website_source(stack: &Stack, report: &mut Report) {
    let Some(website) = &stack.website else {
        return;
    };

    if !website.source.is_file() {
        report.warning(
            "",
            format!(
                "Website source {} is not found, the upload will fail at deploy",
                website.source.display()
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::stack;
    use crate::stack::NetworkMode;
    use serde_json::json;
    use std::io::Write;

    fn report_with(stack: &Stack, change: impl FnOnce(&mut Map<String, Value>)) -> Report {
        let template = Template::new(stack).unwrap();
        let mut resources = template.resources().clone();
        change(&mut resources);
        check_resources(stack, &resources, template.outputs())
    }

    fn messages(report: &Report) -> Vec<String> {
        report.errors().map(|f| f.message.clone()).collect()
    }

    fn with_source(mut stack: Stack) -> (Stack, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<h1>Hello</h1>").unwrap();
        stack.website.as_mut().unwrap().source = file.path().to_path_buf();
        (stack, file)
    }

    #[test]
    fn test_should_pass_network_variant() {
        let (stack, _file) = with_source(stack(true));
        let report = check(&Template::new(&stack).unwrap());

        assert!(report.is_clean(), "{:?}", report.findings);
    }

    #[test]
    fn test_should_warn_about_awsvpc_without_network_stack() {
        let (stack, _file) = with_source(stack(false));
        let report = check(&Template::new(&stack).unwrap());

        assert!(!report.has_errors());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].resource, "Servicesite");
    }

    #[test]
    fn test_should_warn_about_missing_source() {
        let mut stack = stack(true);
        stack.website.as_mut().unwrap().source = "/nonexistent/index.html".into();
        let report = check(&Template::new(&stack).unwrap());

        assert!(!report.has_errors());
        assert!(report.findings[0].message.contains("/nonexistent/index.html"));
    }

    #[test]
    fn test_should_reject_literal_policy_resource() {
        let report = report_with(&stack(true), |resources| {
            resources["WebsiteBucketPolicysite"]["Properties"]["PolicyDocument"]["Statement"][0]
                ["Resource"] = json!("arn:aws:s3:::my-static-site/*");
        });

        assert_eq!(messages(&report).len(), 1);
        assert!(messages(&report)[0].contains("derived from the bucket"));
    }

    #[test]
    fn test_should_reject_policy_of_other_bucket() {
        let report = report_with(&stack(true), |resources| {
            resources["WebsiteBucketPolicysite"]["Properties"]["PolicyDocument"]["Statement"][0]
                ["Resource"] = json!({"Fn::Sub": "arn:aws:s3:::${OtherBucket}/*"});
        });

        assert!(messages(&report).iter().any(|m| m.contains("derived from the bucket")));
        assert!(messages(&report).iter().any(|m| m.contains("OtherBucket")));
    }

    #[test]
    fn test_should_reject_literal_policy_bucket() {
        let report = report_with(&stack(true), |resources| {
            resources["WebsiteBucketPolicysite"]["Properties"]["Bucket"] = json!("my-static-site");
        });

        assert!(messages(&report)[0].contains("not a literal name"));
    }

    #[test]
    fn test_should_reject_public_policy_with_blocking_flag() {
        let report = report_with(&stack(true), |resources| {
            resources["WebsiteBucketsite"]["Properties"]["PublicAccessBlockConfiguration"]
                ["BlockPublicPolicy"] = json!(true);
        });

        assert_eq!(
            messages(&report),
            vec!["BlockPublicPolicy must be false, the bucket has a public policy"]
        );
    }

    #[test]
    fn test_should_reject_public_policy_with_default_flags() {
        let report = report_with(&stack(true), |resources| {
            resources["WebsiteBucketsite"]["Properties"]
                .as_object_mut()
                .unwrap()
                .remove("PublicAccessBlockConfiguration");
        });

        assert_eq!(messages(&report).len(), 4);
    }

    #[test]
    fn test_should_warn_about_unblocked_private_bucket() {
        let report = report_with(&stack(true), |resources| {
            resources.remove("WebsiteBucketPolicysite");
        });

        assert!(!report.has_errors());
        assert!(report
            .findings
            .iter()
            .any(|f| f.resource == "WebsiteBucketsite" && f.severity == Severity::Warning));
    }

    #[test]
    fn test_should_reject_wildcard_subject() {
        let report = report_with(&stack(true), |resources| {
            resources["DeployRolesite"]["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]
                ["Condition"] = json!({
                    "StringLike": {"token.actions.githubusercontent.com:sub": "repo:myorg/myrepo:*"}
                });
        });

        let messages = messages(&report);
        assert!(messages.iter().any(|m| m.contains("StringLike is not allowed")));
        assert!(messages.iter().any(|m| m.contains("no StringEquals condition")));
    }

    #[test]
    fn test_should_reject_unconditional_trust() {
        let report = report_with(&stack(true), |resources| {
            resources["DeployRolesite"]["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]
                .as_object_mut()
                .unwrap()
                .remove("Condition");
        });

        assert!(messages(&report).iter().any(|m| m.contains("Any token")));
    }

    #[test]
    fn test_should_reject_malformed_subject() {
        let report = report_with(&stack(true), |resources| {
            resources["DeployRolesite"]["Properties"]["AssumeRolePolicyDocument"]["Statement"][0]
                ["Condition"]["StringEquals"]["token.actions.githubusercontent.com:sub"] =
                json!("repo:myorg/myrepo:ref:refs/tags/v1");
        });

        assert!(messages(&report).iter().any(|m| m.contains("does not match")));
    }

    #[test]
    fn test_should_reject_public_ip_in_private_subnet() {
        let report = report_with(&stack(true), |resources| {
            resources["Servicesite"]["Properties"]["NetworkConfiguration"]["AwsvpcConfiguration"]
                ["AssignPublicIp"] = json!("ENABLED");
            resources["PrivateSubnetsite"]["Properties"]["MapPublicIpOnLaunch"] = json!(true);
        });

        assert_eq!(
            messages(&report),
            vec![
                "MapPublicIpOnLaunch must be false",
                "AssignPublicIp must be DISABLED in the private subnet",
            ]
        );
    }

    #[test]
    fn test_should_reject_network_stack_for_bridge_task() {
        let mut stack = stack(true);
        stack.compute.as_mut().unwrap().task.network_mode = NetworkMode::Bridge;
        let (stack, _file) = with_source(stack);

        let report = check(&Template::new(&stack).unwrap());

        assert_eq!(
            messages(&report),
            vec!["Network configuration requires a task in awsvpc network mode"]
        );
        assert_eq!(report.errors().next().unwrap().resource, "Servicesite");
    }

    #[test]
    fn test_should_reject_mismatched_network_references() {
        let report = report_with(&stack(true), |resources| {
            resources.insert(
                "OtherVpc".into(),
                json!({"Type": "AWS::EC2::VPC", "Properties": {"CidrBlock": "10.1.0.0/16"}}),
            );
            resources["ServiceSecurityGroupsite"]["Properties"]["VpcId"] = json!({"Ref": "OtherVpc"});
        });

        let messages = messages(&report);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("is in VPC OtherVpc"));
    }

    #[test]
    fn test_should_reject_literal_subnet() {
        let report = report_with(&stack(true), |resources| {
            resources["Servicesite"]["Properties"]["NetworkConfiguration"]["AwsvpcConfiguration"]
                ["Subnets"] = json!(["subnet-0123456789abcdef0"]);
        });

        assert!(messages(&report)[0].contains("must reference the subnet"));
    }

    #[test]
    fn test_should_reject_dangling_reference() {
        let report = report_with(&stack(true), |resources| {
            resources.remove("Clustersite");
        });

        let messages = messages(&report);
        assert!(messages.iter().any(|m| m.contains("References Clustersite")));
        assert!(messages.iter().any(|m| m.contains("Output references Clustersite")));
    }
}
