use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{Capability, Stack, StackEvent};
use aws_sdk_cloudformation::Client;
use eyre::{ContextCompat, WrapErr};
use plinth_common::deploy::{FailedResource, Provisioner, StackState};
use std::collections::BTreeMap;

const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

pub(crate) struct CloudFormation {
    client: Client,
}

impl CloudFormation {
    pub(crate) fn new(config: &SdkConfig) -> Self {
        CloudFormation {
            client: Client::new(config),
        }
    }

    /// Description of the stack, None if it does not exist
    async fn describe(&self, stack_name: &str) -> eyre::Result<Option<Stack>> {
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.stacks().first().cloned()),

            // Unknown stacks are reported as a validation error
            Err(SdkError::ServiceError(err)) if err.err().code() == Some("ValidationError") => {
                Ok(None)
            }

            Err(e) => Err(eyre::eyre!("Failed to describe stack: {e:?}")),
        }
    }
}

fn failed_resource(event: &StackEvent) -> FailedResource {
    FailedResource {
        resource: event.logical_resource_id().unwrap_or_default().to_string(),
        resource_type: event.resource_type().unwrap_or_default().to_string(),
        status: event
            .resource_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        reason: event
            .resource_status_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

#[async_trait]
impl Provisioner for CloudFormation {
    async fn state(&self, stack_name: &str) -> eyre::Result<StackState> {
        let Some(stack) = self.describe(stack_name).await? else {
            return Ok(StackState::Missing);
        };

        let status = stack.stack_status().wrap_err("Stack has no status")?;
        Ok(StackState::from_status(status.as_str()))
    }

    async fn create(&self, stack_name: &str, template: &str) -> eyre::Result<()> {
        self.client
            .create_stack()
            .capabilities(Capability::CapabilityIam)
            .stack_name(stack_name)
            .template_body(template)
            .send()
            .await
            .map_err(|e| eyre::eyre!("{e:?}"))
            .wrap_err("Failed to create stack")?;

        Ok(())
    }

    async fn update(&self, stack_name: &str, template: &str) -> eyre::Result<bool> {
        let result = self
            .client
            .update_stack()
            .capabilities(Capability::CapabilityIam)
            .stack_name(stack_name)
            .template_body(template)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.message()
                    .is_some_and(|m| m.contains("No updates are to be performed")) =>
            {
                Ok(false)
            }
            Err(e) => Err(eyre::eyre!("Failed to update stack: {e:?}")),
        }
    }

    async fn outputs(&self, stack_name: &str) -> eyre::Result<BTreeMap<String, String>> {
        let stack = self
            .describe(stack_name)
            .await?
            .wrap_err_with(|| format!("Stack {stack_name} does not exist"))?;

        Ok(stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some((
                    output.output_key()?.to_string(),
                    output.output_value()?.to_string(),
                ))
            })
            .collect())
    }

    /// Scan events back to the "User Initiated" start of the latest operation
    async fn failures(&self, stack_name: &str) -> eyre::Result<Vec<FailedResource>> {
        let mut next_token = None;
        let mut failures = vec![];

        loop {
            let mut request = self.client.describe_stack_events().stack_name(stack_name);

            if let Some(token) = next_token {
                request = request.next_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| eyre::eyre!("{e:?}"))
                .wrap_err("Failed to describe stack events")?;

            let mut is_started = false;

            for event in response.stack_events() {
                let is_stack_event = event.resource_type() == Some(STACK_RESOURCE_TYPE);

                if is_stack_event && event.resource_status_reason() == Some("User Initiated") {
                    is_started = true;
                    break;
                }

                let is_failed = event
                    .resource_status()
                    .is_some_and(|s| s.as_str().contains("FAILED"));

                if is_failed && !is_stack_event {
                    failures.push(failed_resource(event));
                }
            }

            next_token = response.next_token().map(|s| s.to_string());

            if next_token.is_none() || is_started {
                break;
            }
        }

        log::debug!("Found {} failed resources in {stack_name}", failures.len());
        Ok(failures)
    }

    async fn delete(&self, stack_name: &str) -> eyre::Result<()> {
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| eyre::eyre!("{e:?}"))
            .wrap_err("Failed to delete stack")?;

        Ok(())
    }
}
