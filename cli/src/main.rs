mod aws;
mod commands;
mod error;
mod logger;
mod project;
mod runner;
mod writer;
use crate::commands::Commands;
use crate::error::Error;
use crate::logger::Logger;
use crate::runner::{Context, Runnable, Runner};
use crate::writer::Writer;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    arg_required_else_help = true,
    name = "plinth",
    version,
    about = "Deploy a static website and an OIDC-guarded ECS service with CloudFormation",
    long_about = "Renders plinth.toml into one CloudFormation stack (S3 website, ECS cluster and service, \
        optional private network, deploy role assumable only from one GitHub repo and branch), \
        checks it and deploys it."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output JSON instead of human-friendly text
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,

    /// Project directory, the one with plinth.toml
    #[arg(short, long, global = true, value_name = "DIR", default_value = ".")]
    path: PathBuf,
}

/// Derive a runner from the command and run it
async fn run(command: &impl Runnable, context: &Context) -> Result<(), Error> {
    command.runner(context).run().await
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    Logger::init();

    let cli = Cli::parse();

    let context = Context {
        writer: Writer::new(cli.json),
        path: cli.path,
    };

    // Match all commands here, in one place
    let result = match &cli.command {
        Commands::Render(cmd) => run(cmd, &context).await,
        Commands::Plan(cmd) => run(cmd, &context).await,
        Commands::Check(cmd) => run(cmd, &context).await,
        Commands::Deploy(cmd) => run(cmd, &context).await,
        Commands::Status(cmd) => run(cmd, &context).await,
        Commands::Outputs(cmd) => run(cmd, &context).await,
        Commands::Destroy(cmd) => run(cmd, &context).await,
    };

    if let Err(error) = result {
        error.print();
        std::process::exit(1);
    }

    Ok(())
}
