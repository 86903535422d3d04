mod config_file;

use config_file::ConfigFile;
use eyre::WrapErr;
use plinth_common::stack::Stack;
use plinth_common::template::Template;
use std::path::{Path, PathBuf};

/// Project (directory with plinth.toml) and the stack it declares
#[derive(Debug, Clone)]
pub(crate) struct Project {
    pub(crate) path: PathBuf,
    pub(crate) stack: Stack,
}

impl Project {
    pub(crate) fn from_path(path: &Path) -> eyre::Result<Self> {
        let path = path
            .canonicalize()
            .wrap_err_with(|| format!("Directory {} does not exist", path.display()))?;

        ConfigFile::from_path(path)?.try_into()
    }

    pub(crate) fn template(&self) -> eyre::Result<Template> {
        Template::new(&self.stack).wrap_err("Failed to render the template")
    }
}
