use crate::error::Error;
use crate::logger::Logger;
use crate::runner::{Context, Runnable, Runner};
use clap::ArgAction;
use eyre::WrapErr;
use serde_json::json;
use std::io::{self, Write};

#[derive(clap::Args, Clone)]
pub(crate) struct DestroyCommand {
    /// Do not ask for confirmation
    #[arg(short, long, action = ArgAction::SetTrue)]
    yes: bool,
}

impl Runnable for DestroyCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        DestroyRunner {
            command: self.clone(),
            context,
        }
    }
}

struct DestroyRunner<'a> {
    command: DestroyCommand,
    context: &'a Context,
}

impl DestroyRunner<'_> {
    fn confirm(&self, stack_name: &str) -> eyre::Result<bool> {
        print!(
            "{} {} {}: ",
            console::style("Destroy").bold(),
            console::style(stack_name).red().bold(),
            console::style("[y/N]").dim()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin()
            .read_line(&mut input)
            .wrap_err("Failed to read input")?;

        Ok(matches!(input.trim().to_lowercase().as_ref(), "y" | "yes"))
    }
}

impl Runner for DestroyRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let stack_name = project.stack.stack_name();

        if !self.command.yes {
            if self.writer().is_structured() {
                return Err(self.error(
                    Some("Confirmation required"),
                    Some("Pass --yes to destroy without a prompt."),
                    None,
                ));
            }

            if !self.confirm(&stack_name)? {
                return self.writer().text(&format!(
                    "{}\n",
                    console::style("Destroying canceled").dim().bold()
                ));
            }
        }

        let spinner = (!self.writer().is_structured())
            .then(|| Logger::spinner(&format!("Destroying {stack_name}")));

        let state = self
            .deployer()
            .await?
            .destroy(&project.stack, |state| {
                if let Some(spinner) = &spinner {
                    spinner.set_message(format!("{stack_name} {}", state.status()));
                }
            })
            .await;

        if let Some(spinner) = &spinner {
            spinner.finish_and_clear();
        }

        state.map_err(|e| self.aws_error(e))?;

        self.writer().text(&format!(
            "{} {stack_name}\n",
            console::style("Destroyed").green().bold()
        ))?;

        self.writer().json(json!({"stack": stack_name, "destroyed": true}))
    }
}
