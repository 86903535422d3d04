use super::{CfnOutput, CfnResource, Template};
use crate::stack::{Compute, TaskSpec};
use eyre::WrapErr;
use serde_json::json;

impl Template {
    pub fn cluster_id(&self) -> String {
        self.prefixed("Cluster")
    }

    pub fn role_id(&self) -> String {
        self.prefixed("DeployRole")
    }

    pub fn task_definition_id(&self) -> String {
        self.prefixed("TaskDefinition")
    }

    pub fn service_id(&self) -> String {
        self.prefixed("Service")
    }

    /// CFN template for the cluster, the OIDC deploy role, the task and the service
    ///
    /// The role can only be assumed with a token whose subject is the configured
    /// repo and branch. It is also used as the task and execution role.
    pub(super) fn compute(&self, compute: &Compute) -> eyre::Result<Vec<CfnResource>> {
        let cluster = self.cluster_id();
        let role = self.role_id();
        let task_definition = self.task_definition_id();
        let attachment = compute.policy_attachment(&role);
        let TaskSpec {
            container_name,
            image,
            cpu,
            memory,
            network_mode,
            ..
        } = &compute.task;

        let trust = serde_json::to_value(compute.oidc.trust_policy())
            .wrap_err("Failed to serialize trust policy")?;

        let mut cluster_properties = json!({"Tags": self.tags()});

        if let Some(cluster_name) = &compute.cluster_name {
            cluster_properties["ClusterName"] = json!(cluster_name);
        }

        let mut service_properties = json!({
            "Cluster": {"Ref": cluster},
            "TaskDefinition": {"Ref": task_definition},
            "DesiredCount": compute.desired_count,
            "Tags": self.tags()
        });

        if let Some(service_name) = &compute.service_name {
            service_properties["ServiceName"] = json!(service_name);
        }

        if compute.network.is_some() {
            service_properties["NetworkConfiguration"] = self.service_network();
        }

        Ok(vec![
            CfnResource {
                name: cluster.clone(),
                resource: json!({
                    "Type": "AWS::ECS::Cluster",
                    "Properties": cluster_properties
                }),
            },
            CfnResource {
                name: role.clone(),
                resource: json!({
                    "Type": "AWS::IAM::Role",
                    "Properties": {
                        "AssumeRolePolicyDocument": trust,
                        "Path": "/",
                        "ManagedPolicyArns": [attachment.policy_arn],
                        "Tags": self.tags()
                    }
                }),
            },
            CfnResource {
                name: task_definition,
                resource: json!({
                    "Type": "AWS::ECS::TaskDefinition",
                    "Properties": {
                        "Family": compute.task.family(&self.stack().name),
                        "NetworkMode": network_mode.as_str(),
                        "ContainerDefinitions": [{
                            "Name": container_name,
                            "Image": image,
                            "Cpu": cpu,
                            "Memory": memory,
                            "Essential": true
                        }],
                        "ExecutionRoleArn": {"Fn::GetAtt": [role, "Arn"]},
                        "TaskRoleArn": {"Fn::GetAtt": [role, "Arn"]},
                        "Tags": self.tags()
                    }
                }),
            },
            CfnResource {
                name: self.service_id(),
                resource: json!({
                    "Type": "AWS::ECS::Service",
                    "Properties": service_properties
                }),
            },
        ])
    }

    pub(super) fn compute_outputs(&self, compute: &Compute) -> Vec<CfnOutput> {
        vec![
            CfnOutput {
                name: "ClusterName".into(),
                description: "Name of the ECS cluster".into(),
                value: json!({"Ref": self.cluster_id()}),
            },
            CfnOutput {
                name: "TaskDefinitionFamily".into(),
                description: "Family of the task definition".into(),
                value: json!(compute.task.family(&self.stack().name)),
            },
            CfnOutput {
                name: "ServiceName".into(),
                description: "Name of the ECS service".into(),
                value: json!({"Fn::GetAtt": [self.service_id(), "Name"]}),
            },
            CfnOutput {
                name: "DeployRoleArn".into(),
                description: "Role assumed by CI through OIDC".into(),
                value: json!({"Fn::GetAtt": [self.role_id(), "Arn"]}),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::stack;

    fn properties<'a>(template: &'a Template, id: &str) -> &'a serde_json::Value {
        &template.resources()[id]["Properties"]
    }

    #[test]
    fn test_should_pin_trust_policy_to_subject() {
        let template = Template::new(&stack(false)).unwrap();
        let role = properties(&template, &template.role_id());
        let statement = &role["AssumeRolePolicyDocument"]["Statement"][0];

        assert_eq!(statement["Action"], "sts:AssumeRoleWithWebIdentity");
        assert_eq!(
            statement["Principal"]["Federated"],
            json!({"Fn::Sub": "arn:${AWS::Partition}:iam::${AWS::AccountId}:oidc-provider/token.actions.githubusercontent.com"})
        );
        assert_eq!(
            statement["Condition"]["StringEquals"]["token.actions.githubusercontent.com:sub"],
            "repo:myorg/myrepo:ref:refs/heads/main"
        );
        assert_eq!(
            role["ManagedPolicyArns"],
            json!(["arn:aws:iam::aws:policy/AmazonECS_FullAccess"])
        );
    }

    #[test]
    fn test_should_reference_role_from_task_definition() {
        let template = Template::new(&stack(false)).unwrap();
        let task = properties(&template, &template.task_definition_id());

        assert_eq!(task["Family"], "site");
        assert_eq!(task["NetworkMode"], "awsvpc");
        assert_eq!(task["ExecutionRoleArn"], json!({"Fn::GetAtt": ["DeployRolesite", "Arn"]}));
        assert_eq!(task["TaskRoleArn"], task["ExecutionRoleArn"]);
        assert_eq!(
            task["ContainerDefinitions"],
            json!([{"Name": "app", "Image": "nginx:latest", "Cpu": 256, "Memory": 512, "Essential": true}])
        );
    }

    #[test]
    fn test_should_use_provider_networking_without_network_stack() {
        let template = Template::new(&stack(false)).unwrap();
        let service = properties(&template, &template.service_id());

        assert_eq!(service["Cluster"], json!({"Ref": "Clustersite"}));
        assert_eq!(service["TaskDefinition"], json!({"Ref": "TaskDefinitionsite"}));
        assert_eq!(service["DesiredCount"], 1);
        assert!(service.get("NetworkConfiguration").is_none());
    }

    #[test]
    fn test_should_place_service_into_private_subnet() {
        let template = Template::new(&stack(true)).unwrap();
        let service = properties(&template, &template.service_id());

        assert_eq!(
            service["NetworkConfiguration"],
            json!({
                "AwsvpcConfiguration": {
                    "AssignPublicIp": "DISABLED",
                    "Subnets": [{"Ref": "PrivateSubnetsite"}],
                    "SecurityGroups": [{"Fn::GetAtt": ["ServiceSecurityGroupsite", "GroupId"]}]
                }
            })
        );
    }

    #[test]
    fn test_should_use_configured_names() {
        let mut stack = stack(false);
        let compute = stack.compute.as_mut().unwrap();
        compute.cluster_name = Some("my-cluster".into());
        compute.service_name = Some("my-ecs-service".into());
        compute.task.family = Some("my-task".into());
        compute.desired_count = 3;

        let template = Template::new(&stack).unwrap();

        assert_eq!(properties(&template, &template.cluster_id())["ClusterName"], "my-cluster");
        assert_eq!(properties(&template, &template.service_id())["ServiceName"], "my-ecs-service");
        assert_eq!(properties(&template, &template.service_id())["DesiredCount"], 3);
        assert_eq!(template.outputs()["TaskDefinitionFamily"]["Value"], "my-task");
    }
}
