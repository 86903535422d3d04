use crate::check::check;
use crate::stack::Stack;
use crate::template::Template;
use async_trait::async_trait;
use eyre::{ContextCompat, WrapErr};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// State of a CloudFormation stack, grouped by what a deploy can do with it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status")]
pub enum StackState {
    Missing,
    InProgress(String),
    Complete(String),
    RolledBack(String),
    Failed(String),
}

impl StackState {
    pub fn from_status(status: &str) -> Self {
        let status_string = status.to_string();

        match status {
            "DELETE_COMPLETE" => StackState::Missing,
            s if s.ends_with("_IN_PROGRESS") => StackState::InProgress(status_string),
            s if s.contains("ROLLBACK") && s.ends_with("_COMPLETE") => {
                StackState::RolledBack(status_string)
            }
            s if s.ends_with("_FAILED") => StackState::Failed(status_string),
            _ => StackState::Complete(status_string),
        }
    }

    pub fn status(&self) -> &str {
        match self {
            StackState::Missing => "MISSING",
            StackState::InProgress(s)
            | StackState::Complete(s)
            | StackState::RolledBack(s)
            | StackState::Failed(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StackState::InProgress(_))
    }

    /// A stack rolled back after the very first create can not be updated
    fn is_stuck(&self) -> bool {
        matches!(self, StackState::Failed(_))
            || matches!(self, StackState::RolledBack(s) if s == "ROLLBACK_COMPLETE")
    }
}

/// Resource that failed during the last stack operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedResource {
    pub resource: String,
    pub resource_type: String,
    pub status: String,
    pub reason: String,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn state(&self, stack_name: &str) -> eyre::Result<StackState>;

    async fn create(&self, stack_name: &str, template: &str) -> eyre::Result<()>;

    /// Returns false if CloudFormation has nothing to update
    async fn update(&self, stack_name: &str, template: &str) -> eyre::Result<bool>;

    async fn outputs(&self, stack_name: &str) -> eyre::Result<BTreeMap<String, String>>;

    /// Failures of the most recent operation, newest first
    async fn failures(&self, stack_name: &str) -> eyre::Result<Vec<FailedResource>>;

    async fn delete(&self, stack_name: &str) -> eyre::Result<()>;
}

/// Object to be stored in a bucket
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,

    /// Hex sha256 of the body, stored along with the object
    pub checksum: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Checksum stored with the object, None if there is no such object
    async fn checksum(&self, bucket: &str, key: &str) -> eyre::Result<Option<String>>;

    async fn put(&self, bucket: &str, upload: Upload) -> eyre::Result<()>;

    async fn delete(&self, bucket: &str, key: &str) -> eyre::Result<()>;

    /// Keys of all objects in the bucket
    async fn list(&self, bucket: &str) -> eyre::Result<Vec<String>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum UploadResult {
    Uploaded { key: String },
    Unchanged { key: String },
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct Deployment {
    pub stack_name: String,
    pub state: StackState,
    pub outputs: BTreeMap<String, String>,
    pub upload: UploadResult,
}

/// Current state of a deployed stack
#[derive(Clone, Debug, Serialize)]
pub struct Status {
    pub stack_name: String,
    pub state: StackState,
    pub failures: Vec<FailedResource>,
}

/// Provisions the template and uploads the website object
pub struct Deployer {
    provisioner: Arc<dyn Provisioner>,
    store: Arc<dyn ObjectStore>,
    poll_interval: Duration,
    timeout: Duration,
}

impl Deployer {
    pub fn new(provisioner: Arc<dyn Provisioner>, store: Arc<dyn ObjectStore>) -> Self {
        Deployer {
            provisioner,
            store,
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create or update the stack, wait for it to settle, then upload the object
    ///
    /// The progress callback receives every state observed while waiting.
    pub async fn deploy(
        &self,
        template: &Template,
        skip_upload: bool,
        progress: impl Fn(&StackState) + Send + Sync,
    ) -> eyre::Result<Deployment> {
        let report = check(template);

        if report.has_errors() {
            eyre::bail!(
                "Template failed checks:\n{}",
                report
                    .errors()
                    .map(|f| format!("{}: {}", f.resource, f.message))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }

        let stack = template.stack();
        let stack_name = stack.stack_name();
        let body = template.to_json()?;
        let state = self.provisioner.state(&stack_name).await?;
        log::info!("Stack {stack_name} is {}", state.status());

        // An unchanged stack keeps its settled state, UPDATE_ROLLBACK_COMPLETE included
        let (state, is_changed) = match state {
            StackState::Missing => {
                self.provisioner
                    .create(&stack_name, &body)
                    .await
                    .wrap_err("Failed to create stack")?;

                (self.wait(&stack_name, &progress).await?, true)
            }
            StackState::InProgress(status) => {
                eyre::bail!("Stack {stack_name} is busy ({status}), try again once it settles")
            }
            state if state.is_stuck() => {
                eyre::bail!(
                    "Stack {stack_name} is in {} and can not be updated, destroy it first",
                    state.status()
                )
            }
            state => {
                if stack.website.is_none() {
                    self.empty_bucket(&stack_name).await?;
                }

                let is_updating = self
                    .provisioner
                    .update(&stack_name, &body)
                    .await
                    .wrap_err("Failed to update stack")?;

                if is_updating {
                    (self.wait(&stack_name, &progress).await?, true)
                } else {
                    log::info!("No changes in stack {stack_name}");
                    (state, false)
                }
            }
        };

        if is_changed && !matches!(state, StackState::Complete(_)) {
            return Err(self.failure(&stack_name, &state).await);
        }

        let outputs = self.provisioner.outputs(&stack_name).await?;

        let upload = if skip_upload {
            UploadResult::Skipped
        } else {
            self.upload(stack, &outputs).await?
        };

        Ok(Deployment {
            stack_name,
            state,
            outputs,
            upload,
        })
    }

    /// Empty the website bucket and delete the stack
    pub async fn destroy(
        &self,
        stack: &Stack,
        progress: impl Fn(&StackState) + Send + Sync,
    ) -> eyre::Result<StackState> {
        let stack_name = stack.stack_name();

        if self.provisioner.state(&stack_name).await? == StackState::Missing {
            log::info!("Stack {stack_name} does not exist");
            return Ok(StackState::Missing);
        }

        // CloudFormation refuses to delete a bucket with objects in it
        self.empty_bucket(&stack_name).await?;

        self.provisioner
            .delete(&stack_name)
            .await
            .wrap_err("Failed to delete stack")?;

        let state = self.wait(&stack_name, &progress).await?;

        if state != StackState::Missing {
            return Err(self.failure(&stack_name, &state).await);
        }

        Ok(state)
    }

    pub async fn status(&self, stack: &Stack) -> eyre::Result<Status> {
        let stack_name = stack.stack_name();
        let state = self.provisioner.state(&stack_name).await?;

        let failures = match state {
            StackState::Missing => vec![],
            _ => self.provisioner.failures(&stack_name).await?,
        };

        Ok(Status {
            stack_name,
            state,
            failures,
        })
    }

    pub async fn outputs(&self, stack: &Stack) -> eyre::Result<BTreeMap<String, String>> {
        let stack_name = stack.stack_name();

        if self.provisioner.state(&stack_name).await? == StackState::Missing {
            eyre::bail!("Stack {stack_name} is not deployed");
        }

        self.provisioner.outputs(&stack_name).await
    }

    /// Poll the stack until it leaves the in-progress states
    async fn wait(
        &self,
        stack_name: &str,
        progress: &(impl Fn(&StackState) + Send + Sync),
    ) -> eyre::Result<StackState> {
        let started = Instant::now();

        loop {
            tokio::time::sleep(self.poll_interval).await;
            let state = self.provisioner.state(stack_name).await?;
            log::debug!("Stack {stack_name} is {}", state.status());
            progress(&state);

            if state.is_terminal() {
                return Ok(state);
            }

            if started.elapsed() > self.timeout {
                eyre::bail!(
                    "Stack {stack_name} is still {} after {}s",
                    state.status(),
                    self.timeout.as_secs()
                );
            }
        }
    }

    /// Error with the reasons of failed resources
    async fn failure(&self, stack_name: &str, state: &StackState) -> eyre::Report {
        let reasons = match self.provisioner.failures(stack_name).await {
            Ok(failures) => failures
                .iter()
                .map(|f| format!("{} ({}): {}", f.resource, f.resource_type, f.reason))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(error) => {
                log::error!("Failed to collect stack failures: {error:?}");
                String::new()
            }
        };

        eyre::eyre!("Stack {stack_name} ended in {}\n{reasons}", state.status())
    }

    /// Delete every object of the stack's bucket, if the stack has one
    async fn empty_bucket(&self, stack_name: &str) -> eyre::Result<()> {
        let outputs = self.provisioner.outputs(stack_name).await?;

        let Some(bucket) = outputs.get("BucketName") else {
            return Ok(());
        };

        self.remove_objects(bucket, None).await
    }

    /// Delete all objects except `keep`, including ones left under earlier keys
    async fn remove_objects(&self, bucket: &str, keep: Option<&str>) -> eyre::Result<()> {
        let keys = self
            .store
            .list(bucket)
            .await
            .wrap_err_with(|| format!("Failed to list objects of {bucket}"))?;

        for key in keys.iter().filter(|key| Some(key.as_str()) != keep) {
            log::info!("Deleting {key} from {bucket}");

            self.store
                .delete(bucket, key)
                .await
                .wrap_err_with(|| format!("Failed to delete {key} from {bucket}"))?;
        }

        Ok(())
    }

    /// Put the website object unless the stored one has the same checksum
    async fn upload(
        &self,
        stack: &Stack,
        outputs: &BTreeMap<String, String>,
    ) -> eyre::Result<UploadResult> {
        let Some(website) = &stack.website else {
            return Ok(UploadResult::Skipped);
        };

        let bucket = outputs
            .get("BucketName")
            .wrap_err("Stack has no BucketName output")?;

        let object = website.object();

        let body = tokio::fs::read(&object.source)
            .await
            .wrap_err_with(|| format!("Failed to read {}", object.source.display()))?;

        let checksum = sha256::digest(body.as_slice());

        if self.store.checksum(bucket, &object.key).await?.as_ref() == Some(&checksum) {
            log::info!("{} is up to date in {bucket}", object.key);
            self.remove_objects(bucket, Some(&object.key)).await?;
            return Ok(UploadResult::Unchanged { key: object.key });
        }

        self.store
            .put(
                bucket,
                Upload {
                    key: object.key.clone(),
                    content_type: object.content_type,
                    body,
                    checksum,
                },
            )
            .await
            .wrap_err_with(|| format!("Failed to upload {} to {bucket}", object.key))?;

        self.remove_objects(bucket, Some(&object.key)).await?;

        Ok(UploadResult::Uploaded { key: object.key })
    }
}
