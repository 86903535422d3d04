mod compute;
mod website;

use crate::config::config;
use crate::template::sanitize::{escape_resource_name, escape_stack_name};
pub use compute::{Compute, Network, NetworkMode, PolicyAttachment, TaskSpec};
pub use website::{BucketObject, PublicAccessBlock, Website};

/// The environment of one project, deployed as a single CloudFormation stack
///
/// Both groups are optional and independent, they share only the project name.
#[derive(Clone, Debug, PartialEq)]
pub struct Stack {
    /// Project name (used as a prefix for all resources)
    pub name: String,

    /// S3 static website
    pub website: Option<Website>,

    /// ECS cluster and service with the OIDC deploy role
    pub compute: Option<Compute>,
}

impl Stack {
    pub fn new(name: &str) -> Self {
        Stack {
            name: name.to_string(),
            website: None,
            compute: None,
        }
    }

    pub fn with_website(mut self, website: Website) -> Self {
        self.website = Some(website);
        self
    }

    pub fn with_compute(mut self, compute: Compute) -> Self {
        self.compute = Some(compute);
        self
    }

    /// CloudFormation stack name
    pub fn stack_name(&self) -> String {
        format!("{}-{}", config().stack_prefix, escape_stack_name(&self.name))
    }

    /// Project name usable inside logical IDs
    pub fn name_escaped(&self) -> String {
        escape_resource_name(&self.name)
    }

    pub fn with_network_stack(&self) -> bool {
        self.compute.as_ref().is_some_and(|c| c.network.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.website.is_none() && self.compute.is_none()
    }
}
