use crate::error::Error;
use crate::runner::{Context, Runnable, Runner};
use eyre::WrapErr;
use serde_json::json;
use std::path::PathBuf;

#[derive(clap::Args, Clone)]
pub(crate) struct RenderCommand {
    /// Write the template into a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl Runnable for RenderCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        RenderRunner {
            command: self.clone(),
            context,
        }
    }
}

struct RenderRunner<'a> {
    command: RenderCommand,
    context: &'a Context,
}

impl Runner for RenderRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    async fn run(&mut self) -> Result<(), Error> {
        let template = self.project().await?.template()?;
        let template_json = template.to_json()?;

        let Some(path) = &self.command.output else {
            self.writer().text(&format!("{template_json}\n"))?;
            return self.writer().json(template.value());
        };

        std::fs::write(path, &template_json)
            .wrap_err_with(|| format!("Failed to write {}", path.display()))?;

        self.writer().text(&format!(
            "{} {}\n",
            console::style("Rendered").green().bold(),
            path.display()
        ))?;

        self.writer().json(json!({"path": path}))
    }
}
