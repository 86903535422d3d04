mod runner;
use crate::runner::{Context, Runnable, Runner};
use clap::ArgAction;
use runner::DeployRunner;
use std::time::Duration;

#[derive(clap::Args, Clone)]
pub(crate) struct DeployCommand {
    /// Provision the stack only, do not upload the website object
    #[arg(long, action = ArgAction::SetTrue)]
    skip_upload: bool,

    /// Give up waiting for the stack after this long, e.g. "30m"
    #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
    timeout: Duration,
}

impl Runnable for DeployCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        DeployRunner {
            command: self.clone(),
            context,
        }
    }
}
