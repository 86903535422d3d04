pub mod check;
pub mod deploy;
pub mod destroy;
pub mod outputs;
pub mod plan;
pub mod render;
pub mod status;
use clap::Subcommand;
use tabled::settings::{peaker::Priority, style::Style, Settings, Width};
use tabled::{Table, Tabled};
use terminal_size::{terminal_size, Width as TerminalWidth};

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the CloudFormation template
    Render(render::RenderCommand),

    /// List resources in the order CloudFormation creates them
    Plan(plan::PlanCommand),

    /// Run static checks against the template
    Check(check::CheckCommand),

    /// Create or update the stack and upload the website
    Deploy(deploy::DeployCommand),

    /// Show the stack status and recent failures
    Status(status::StatusCommand),

    /// Show the exported values of the stack
    Outputs(outputs::OutputsCommand),

    /// [DANGER] Delete the stack with all its resources
    Destroy(destroy::DestroyCommand),
}

/// Render rows as a table fitting the terminal
pub(crate) fn table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern());

    // Not a terminal in CI, let the table be as wide as it needs
    if let Some((TerminalWidth(width), _)) = terminal_size() {
        table.with(Settings::default().with(Width::wrap(usize::from(width)).priority(Priority::max(true))));
    }

    table.to_string()
}
