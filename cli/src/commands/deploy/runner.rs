use crate::commands::check::print_report;
use crate::commands::deploy::DeployCommand;
use crate::commands::outputs::print_outputs;
use crate::error::Error;
use crate::logger::Logger;
use crate::runner::{Context, Runner};
use plinth_common::check::check;
use plinth_common::deploy::UploadResult;

pub(crate) struct DeployRunner<'a> {
    pub(crate) command: DeployCommand,
    pub(crate) context: &'a Context,
}

impl Runner for DeployRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    /// Check the template, provision the stack and upload the website
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let template = project.template()?;
        let report = check(&template);

        if report.has_errors() {
            print_report(self.writer(), &report)?;

            return Err(self.error(
                Some("Deploy aborted"),
                Some("The template failed checks, see the errors above."),
                None,
            ));
        }

        for warning in &report.findings {
            log::warn!("{}: {}", warning.resource, warning.message);
        }

        let stack_name = project.stack.stack_name();

        self.writer().text(&format!(
            "{} {}\n",
            console::style("Deploying").green().bold(),
            stack_name
        ))?;

        let spinner = (!self.writer().is_structured())
            .then(|| Logger::spinner(&format!("Provisioning {stack_name}")));

        let deployer = self.deployer().await?.with_timeout(self.command.timeout);

        let deployment = deployer
            .deploy(&template, self.command.skip_upload, |state| {
                if let Some(spinner) = &spinner {
                    spinner.set_message(format!("{stack_name} {}", state.status()));
                }
            })
            .await;

        if let Some(spinner) = &spinner {
            spinner.finish_and_clear();
        }

        let deployment = deployment.map_err(|e| self.aws_error(e))?;

        let upload = match &deployment.upload {
            UploadResult::Uploaded { key } => format!("Uploaded {key}"),
            UploadResult::Unchanged { key } => format!("{key} is up to date"),
            UploadResult::Skipped => "Upload skipped".into(),
        };

        self.writer().text(&format!(
            "{} {} ({})\n{}\n",
            console::style("Deployed").green().bold(),
            deployment.state.status(),
            console::style(upload).dim(),
            console::style("Outputs").bold(),
        ))?;

        print_outputs(self.writer(), &deployment.outputs, false)?;

        self.writer().json(serde_json::to_value(&deployment).map_err(eyre::Report::from)?)
    }
}
