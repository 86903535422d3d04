use crate::commands::table;
use crate::error::Error;
use crate::runner::{Context, Runnable, Runner};
use crate::writer::Writer;
use plinth_common::check::{check, Finding, Report, Severity};
use tabled::Tabled;

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&Finding> for FindingRow {
    fn from(finding: &Finding) -> Self {
        let severity = match finding.severity {
            Severity::Error => console::style("error").red().bold(),
            Severity::Warning => console::style("warning").yellow().bold(),
        };

        FindingRow {
            severity: severity.to_string(),
            resource: finding.resource.clone(),
            message: finding.message.clone(),
        }
    }
}

/// Print findings as a table (or JSON), also used before deploying
pub(crate) fn print_report(writer: &Writer, report: &Report) -> Result<(), Error> {
    writer.json(serde_json::to_value(report).map_err(eyre::Report::from)?)?;

    if report.is_clean() {
        return writer.text(&format!("{}\n", console::style("No issues found").green().bold()));
    }

    writer.text(&format!(
        "{}\n",
        table(report.findings.iter().map(FindingRow::from))
    ))
}

#[derive(clap::Args, Clone)]
pub(crate) struct CheckCommand;

impl Runnable for CheckCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        CheckRunner { context }
    }
}

struct CheckRunner<'a> {
    context: &'a Context,
}

impl Runner for CheckRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    /// Fails if any finding is an error, warnings are only printed
    async fn run(&mut self) -> Result<(), Error> {
        let template = self.project().await?.template()?;
        let report = check(&template);
        print_report(self.writer(), &report)?;

        let errors = report.errors().count();

        if errors > 0 {
            return Err(self.error(
                Some("Checks failed"),
                Some(&format!("Found {errors} errors, fix plinth.toml and run again.")),
                None,
            ));
        }

        Ok(())
    }
}
