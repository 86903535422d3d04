use crate::commands::table;
use crate::error::Error;
use crate::runner::{Context, Runnable, Runner};
use plinth_common::graph::Graph;
use serde_json::json;
use tabled::Tabled;

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Resource")]
    name: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Depends on")]
    dependencies: String,
}

#[derive(clap::Args, Clone)]
pub(crate) struct PlanCommand;

impl Runnable for PlanCommand {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a {
        PlanRunner { context }
    }
}

struct PlanRunner<'a> {
    context: &'a Context,
}

impl Runner for PlanRunner<'_> {
    fn context(&self) -> &Context {
        self.context
    }

    /// Prints out resources in dependency order
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let template = project.template()?;
        let graph = Graph::new(template.resources());

        let order = graph.order().map_err(|e| {
            self.error(
                Some("Resources depend on each other"),
                Some(&e.to_string()),
                Some(e.into()),
            )
        })?;

        let rows = order
            .iter()
            .enumerate()
            .map(|(index, name)| ResourceRow {
                position: index + 1,
                name: name.clone(),
                resource_type: graph.resource_type(name).unwrap_or_default().to_string(),
                dependencies: graph
                    .dependencies(name)
                    .map(|d| d.iter().cloned().collect::<Vec<_>>().join(", "))
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        self.writer().text(&format!(
            "{} {} ({} resources)\n{}\n",
            console::style("Stack").green().bold(),
            project.stack.stack_name(),
            rows.len(),
            table(&rows)
        ))?;

        self.writer().json(json!({
            "stack": project.stack.stack_name(),
            "resources": rows
                .iter()
                .map(|row| json!({
                    "name": row.name,
                    "type": row.resource_type,
                    "depends_on": graph.dependencies(&row.name),
                }))
                .collect::<Vec<_>>(),
        }))
    }
}
