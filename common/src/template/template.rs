use crate::config::config;
use crate::stack::Stack;
use eyre::WrapErr;
use serde_json::{json, Map, Value};

#[derive(Clone, Debug)]
pub struct CfnResource {
    pub name: String,
    pub resource: Value,
}

/// Value exported from the stack for operators and CI
#[derive(Clone, Debug)]
pub struct CfnOutput {
    pub name: String,
    pub description: String,
    pub value: Value,
}

/// CloudFormation template of a whole stack
#[derive(Clone, Debug)]
pub struct Template {
    stack: Stack,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
}

impl Template {
    /// Add a resource to the CFN template
    fn add_resource(&mut self, CfnResource { name, resource }: CfnResource) {
        if self.resources.insert(name.clone(), resource).is_some() {
            log::warn!("Resource {name} is declared twice, the last declaration wins");
        }
    }

    /// Add an output, exported under the stack name
    fn add_output(&mut self, CfnOutput { name, description, value }: CfnOutput) {
        let export = format!("${{AWS::StackName}}-{name}");

        self.outputs.insert(
            name,
            json!({
                "Description": description,
                "Value": value,
                "Export": {"Name": {"Fn::Sub": export}}
            }),
        );
    }

    pub fn new(stack: &Stack) -> eyre::Result<Self> {
        if stack.is_empty() {
            eyre::bail!(
                "Project {} declares neither a website nor compute resources",
                stack.name
            );
        }

        let mut template = Template {
            stack: stack.clone(),
            resources: Map::new(),
            outputs: Map::new(),
        };

        if let Some(website) = &stack.website {
            for resource in template
                .website(website)
                .wrap_err("Failed to build website template")?
            {
                template.add_resource(resource);
            }

            for output in template.website_outputs() {
                template.add_output(output);
            }
        }

        if let Some(compute) = &stack.compute {
            if let Some(network) = &compute.network {
                for resource in template.network(network) {
                    template.add_resource(resource);
                }

                for output in template.network_outputs() {
                    template.add_output(output);
                }
            }

            for resource in template
                .compute(compute)
                .wrap_err("Failed to build compute template")?
            {
                template.add_resource(resource);
            }

            for output in template.compute_outputs(compute) {
                template.add_output(output);
            }
        }

        log::debug!(
            "Template for {} has {} resources and {} outputs",
            stack.name,
            template.resources.len(),
            template.outputs.len()
        );

        Ok(template)
    }

    /// Logical ID of a resource kind, unique within the project
    pub(super) fn prefixed(&self, kind: &str) -> String {
        format!("{kind}{name}", name = self.stack.name_escaped())
    }

    /// Tags put on every taggable resource
    pub(super) fn tags(&self) -> Value {
        json!([{"Key": config().project_tag, "Value": self.stack.name}])
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn resources(&self) -> &Map<String, Value> {
        &self.resources
    }

    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    /// Full template document
    pub fn value(&self) -> Value {
        json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": format!("Plinth environment for {}", self.stack.name),
            "Resources": self.resources,
            "Outputs": self.outputs,
        })
    }

    pub fn to_json(&self) -> eyre::Result<String> {
        serde_json::to_string_pretty(&self.value()).wrap_err("Failed to serialize the template")
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}
