use crate::commands::table;
use crate::error::Error;
use crate::runner::{Context, Runnable, Runner};
use crate::writer::Writer;
use serde_json::json;
use std::collections::BTreeMap;
use tabled::Tabled;

#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Print stack outputs as a table, and as JSON if `with_json` is set
pub(crate) fn print_outputs(
    writer: &Writer,
    outputs: &BTreeMap<String, String>,
    with_json: bool,
) -> Result<(), Error> {
    if with_json {
        writer.json(json!(outputs))?;
    }

    writer.text(&format!(
        "{}\n",
        table(outputs.iter().map(|(name, value)| OutputRow {
            name: name.clone(),
            value: value.clone(),
        }))
    ))
}

#[derive(clap::Args, Clone)]
pub(crate) struct OutputsCommand;

impl Runnable for OutputsCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        OutputsRunner { context }
    }
}

struct OutputsRunner<'a> {
    context: &'a Context,
}

impl Runner for OutputsRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;

        let outputs = self
            .deployer()
            .await?
            .outputs(&project.stack)
            .await
            .map_err(|e| self.aws_error(e))?;

        print_outputs(self.writer(), &outputs, true)
    }
}
