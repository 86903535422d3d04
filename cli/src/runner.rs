use crate::aws;
use crate::error::Error;
use crate::project::Project;
use crate::writer::Writer;
use plinth_common::deploy::Deployer;
use std::error::Error as StdError;
use std::path::PathBuf;

/// Options shared by all commands
pub(crate) struct Context {
    pub(crate) writer: Writer,

    /// Directory with plinth.toml
    pub(crate) path: PathBuf,
}

pub(crate) trait Runner {
    fn context(&self) -> &Context;

    fn writer(&self) -> &Writer {
        &self.context().writer
    }

    /// Project in the directory passed with --path
    async fn project(&self) -> Result<Project, Error> {
        let path = &self.context().path;

        Project::from_path(path).map_err(|e| {
            self.error(
                Some("Project not found"),
                Some(&format!(
                    "Could not load plinth.toml in {}: {e}",
                    path.display()
                )),
                Some(e.into()),
            )
        })
    }

    /// Deployer talking to the AWS account of the default credentials chain
    async fn deployer(&self) -> Result<Deployer, Error> {
        Ok(aws::deployer().await)
    }

    /// Run the command
    ///
    /// Returns an error shown to the user in case of failure
    async fn run(&mut self) -> Result<(), Error>;

    /// Construct an error shown to the user
    fn error(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        origin: Option<Box<dyn StdError>>,
    ) -> Error {
        if let Some(origin) = origin {
            log::error!("{origin:?}");
        }

        if let Some(title) = title {
            Error::new(title, description)
        } else {
            Error::new(
                "Failed to run the command",
                Some("Run again with RUST_LOG=debug to see what happened."),
            )
        }
    }

    /// A shortcut for failures of AWS calls
    fn aws_error(&self, origin: eyre::Report) -> Error {
        let details = format!("{origin:#}");
        self.error(Some("AWS request failed"), Some(&details), Some(origin.into()))
    }
}

/// Return a runner for a command
pub(crate) trait Runnable {
    fn runner<'a>(&self, context: &'a Context) -> impl Runner + 'a;
}
