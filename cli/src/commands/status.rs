use crate::commands::table;
use crate::error::Error;
use crate::runner::{Context, Runnable, Runner};
use plinth_common::deploy::{FailedResource, StackState};
use tabled::Tabled;

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&FailedResource> for FailureRow {
    fn from(failure: &FailedResource) -> Self {
        FailureRow {
            resource: failure.resource.clone(),
            resource_type: failure.resource_type.clone(),
            status: failure.status.clone(),
            reason: failure.reason.clone(),
        }
    }
}

#[derive(clap::Args, Clone)]
pub(crate) struct StatusCommand;

impl Runnable for StatusCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        StatusRunner { context }
    }
}

struct StatusRunner<'a> {
    context: &'a Context,
}

impl Runner for StatusRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;

        let status = self
            .deployer()
            .await?
            .status(&project.stack)
            .await
            .map_err(|e| self.aws_error(e))?;

        let state = match &status.state {
            StackState::Missing => console::style("not deployed".to_string()).dim(),
            StackState::InProgress(s) => console::style(s.clone()).cyan(),
            StackState::Complete(s) => console::style(s.clone()).green(),
            StackState::RolledBack(s) | StackState::Failed(s) => console::style(s.clone()).red(),
        };

        self.writer().text(&format!(
            "{} {}\n",
            console::style(&status.stack_name).bold(),
            state.bold()
        ))?;

        if !status.failures.is_empty() {
            self.writer().text(&format!(
                "\n{}\n{}\n",
                console::style("Failures of the last operation").red().bold(),
                table(status.failures.iter().map(FailureRow::from))
            ))?;
        }

        self.writer().json(serde_json::to_value(&status).map_err(eyre::Report::from)?)
    }
}
