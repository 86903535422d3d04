use crate::config::config;
use crate::oidc::OidcTrust;
use serde::{Deserialize, Serialize};

/// ECS cluster running one service, deployable only through the OIDC role
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Compute {
    /// Generated by CloudFormation when absent
    #[serde(default)]
    pub cluster_name: Option<String>,

    /// Generated by CloudFormation when absent
    #[serde(default)]
    pub service_name: Option<String>,

    pub oidc: OidcTrust,

    #[serde(default = "default_managed_policy_arn")]
    pub managed_policy_arn: String,

    pub task: TaskSpec,

    #[serde(default = "default_desired_count")]
    pub desired_count: u32,

    /// Dedicated VPC, private subnet and security group for the service
    #[serde(skip)]
    pub network: Option<Network>,
}

fn default_managed_policy_arn() -> String {
    config().managed_policy_arn.to_string()
}

fn default_desired_count() -> u32 {
    1
}

/// Binding of a managed policy to the deploy role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyAttachment {
    pub role: String,
    pub policy_arn: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Awsvpc,
    Bridge,
    Host,
    None,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Awsvpc => "awsvpc",
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
            NetworkMode::None => "none",
        }
    }
}

/// Task definition with a single essential container
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task definition family, defaults to the project name
    #[serde(default)]
    pub family: Option<String>,

    #[serde(default = "default_container_name")]
    pub container_name: String,

    pub image: String,

    /// CPU units reserved for the container
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    /// Hard memory limit of the container, MiB
    #[serde(default = "default_memory")]
    pub memory: u32,

    #[serde(default)]
    pub network_mode: NetworkMode,
}

fn default_container_name() -> String {
    "app".into()
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub vpc_cidr: String,
    pub subnet_cidr: String,

    /// First zone of the region when absent
    pub availability_zone: Option<String>,

    /// The only port open for inbound traffic
    pub ingress_port: u16,
    pub ingress_cidr: String,

    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
}

impl Default for Network {
    fn default() -> Self {
        Network {
            vpc_cidr: "10.0.0.0/16".into(),
            subnet_cidr: "10.0.1.0/24".into(),
            availability_zone: None,
            ingress_port: 80,
            ingress_cidr: "0.0.0.0/0".into(),
            enable_dns_support: true,
            enable_dns_hostnames: true,
        }
    }
}

impl TaskSpec {
    pub fn new(image: &str) -> Self {
        TaskSpec {
            family: None,
            container_name: default_container_name(),
            image: image.to_string(),
            cpu: default_cpu(),
            memory: default_memory(),
            network_mode: NetworkMode::default(),
        }
    }

    pub fn family(&self, project_name: &str) -> String {
        self.family.clone().unwrap_or_else(|| project_name.to_string())
    }
}

impl Compute {
    pub fn new(oidc: OidcTrust, task: TaskSpec) -> Self {
        Compute {
            cluster_name: None,
            service_name: None,
            oidc,
            managed_policy_arn: default_managed_policy_arn(),
            task,
            desired_count: default_desired_count(),
            network: None,
        }
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    pub fn policy_attachment(&self, role: &str) -> PolicyAttachment {
        PolicyAttachment {
            role: role.to_string(),
            policy_arn: self.managed_policy_arn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_fill_defaults_when_deserializing() {
        let compute: Compute = serde_json::from_value(serde_json::json!({
            "oidc": {"subject": "repo:myorg/myrepo:ref:refs/heads/main"},
            "task": {"image": "nginx:latest"}
        }))
        .unwrap();

        assert_eq!(compute.desired_count, 1);
        assert_eq!(compute.managed_policy_arn, "arn:aws:iam::aws:policy/AmazonECS_FullAccess");
        assert_eq!(compute.oidc.issuer, "token.actions.githubusercontent.com");
        assert_eq!(compute.task.cpu, 256);
        assert_eq!(compute.task.memory, 512);
        assert_eq!(compute.task.network_mode, NetworkMode::Awsvpc);
        assert_eq!(compute.task.family("site"), "site");
        assert!(compute.network.is_none());
    }

    #[test]
    fn test_should_reject_invalid_subject() {
        let result = serde_json::from_value::<Compute>(serde_json::json!({
            "oidc": {"subject": "repo:myorg/*"},
            "task": {"image": "nginx:latest"}
        }));

        assert!(result.is_err());
    }
}
