use crate::error::Error;
use crate::project::Project;
use eyre::{ContextCompat, WrapErr};
use plinth_common::stack::{Compute, Network, Stack, Website};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// ConfigFile is the structure of plinth.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct ConfigFile {
    /// [project]
    /// name = "some-project"
    #[serde(default)]
    project: ProjectSection,

    /// [website]
    /// source = "index.html"
    #[serde(default)]
    website: Option<Website>,

    /// [compute.task]
    /// image = "nginx:latest"
    #[serde(default)]
    compute: Option<ComputeSection>,

    #[serde(skip)]
    path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProjectSection {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ComputeSection {
    #[serde(flatten)]
    compute: Compute,

    /// [compute.network]
    /// enabled = true
    #[serde(default)]
    network: Option<NetworkSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct NetworkSection {
    #[serde(default = "default_enabled")]
    enabled: bool,

    #[serde(flatten)]
    network: Network,
}

fn default_enabled() -> bool {
    true
}

impl ConfigFile {
    /// Reads a `ConfigFile` instance from a given directory path
    ///
    /// Unlike the project name, which falls back to Cargo.toml or the directory name,
    /// the file itself is required as it is the only place the resources are declared.
    pub(super) fn from_path(path: PathBuf) -> eyre::Result<Self> {
        let config_toml_path = path.join("plinth.toml");

        let toml_string = fs::read_to_string(&config_toml_path).wrap_err(Error::new(
            &format!("Failed to read {config_toml_path:?}"),
            Some("Create plinth.toml with [website] and/or [compute] sections."),
        ))?;

        let mut config: ConfigFile =
            toml::from_str(&toml_string).wrap_err("Failed to parse plinth.toml")?;

        // Set the path to the directory containing plinth.toml
        config.path = path.clone();

        if config.project.name.is_empty() {
            config.project.name = Self::fallback_name(&path)?;
        }

        Ok(config)
    }

    /// Name of the crate in the same directory, or the directory name
    fn fallback_name(path: &Path) -> eyre::Result<String> {
        let cargo_toml_path = path.join("Cargo.toml");

        if let Ok(cargo_toml_string) = fs::read_to_string(&cargo_toml_path) {
            let cargo_toml: toml::Value = cargo_toml_string
                .parse::<toml::Value>()
                .wrap_err(Error::new(
                    &format!("Failed to parse TOML in {cargo_toml_path:?}"),
                    None,
                ))?;

            if let Some(name) = cargo_toml
                .get("package")
                .and_then(|pkg| pkg.get("name"))
                .and_then(|name| name.as_str())
            {
                return Ok(name.to_string());
            }
        }

        path.file_name()
            .and_then(|name| name.to_str())
            .map(String::from)
            .wrap_err(Error::new(
                "Project name is not set",
                Some("Set [project] name in plinth.toml."),
            ))
    }
}

impl TryFrom<ConfigFile> for Project {
    type Error = eyre::Report;

    fn try_from(cfg: ConfigFile) -> eyre::Result<Self> {
        let mut stack = Stack::new(&cfg.project.name);

        if let Some(mut website) = cfg.website {
            // Sources are relative to plinth.toml, not to the working directory
            website.source = cfg.path.join(&website.source);
            stack = stack.with_website(website);
        }

        if let Some(ComputeSection { compute, network }) = cfg.compute {
            stack = stack.with_compute(match network {
                Some(NetworkSection {
                    enabled: true,
                    network,
                }) => compute.with_network(network),
                _ => compute,
            });
        }

        if stack.is_empty() {
            eyre::bail!(Error::new(
                "Nothing to deploy",
                Some("Add a [website] or a [compute] section to plinth.toml."),
            ));
        }

        Ok(Project {
            path: cfg.path,
            stack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_common::stack::NetworkMode;

    fn project(files: &[(&str, &str)]) -> eyre::Result<Project> {
        let dir = tempfile::tempdir().unwrap();

        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }

        ConfigFile::from_path(dir.path().to_path_buf())?.try_into()
    }

    #[test]
    fn test_should_read_full_config() {
        let project = project(&[(
            "plinth.toml",
            r#"
            [project]
            name = "my-site"

            [website]
            source = "public/index.html"
            public = true

            [compute]
            desired_count = 2

            [compute.task]
            image = "nginx:latest"
            cpu = 512
            memory = 1024

            [compute.oidc]
            subject = "repo:myorg/myrepo:ref:refs/heads/main"

            [compute.network]
            availability_zone = "us-east-1a"
            ingress_port = 8080
            "#,
        )])
        .unwrap();

        let website = project.stack.website.as_ref().unwrap();
        let compute = project.stack.compute.as_ref().unwrap();
        let network = compute.network.as_ref().unwrap();

        assert_eq!(project.stack.name, "my-site");
        assert_eq!(website.source, project.path.join("public/index.html"));
        assert_eq!(website.content_type, "text/html");
        assert_eq!(compute.desired_count, 2);
        assert_eq!(compute.task.cpu, 512);
        assert_eq!(compute.task.network_mode, NetworkMode::Awsvpc);
        assert_eq!(compute.oidc.subject.branch(), "main");
        assert_eq!(network.availability_zone.as_deref(), Some("us-east-1a"));
        assert_eq!(network.ingress_port, 8080);
        assert_eq!(network.vpc_cidr, "10.0.0.0/16");
    }

    #[test]
    fn test_should_skip_disabled_network() {
        let project = project(&[(
            "plinth.toml",
            r#"
            [compute.task]
            image = "nginx:latest"

            [compute.oidc]
            subject = "repo:myorg/myrepo:ref:refs/heads/main"

            [compute.network]
            enabled = false
            "#,
        )])
        .unwrap();

        assert!(!project.stack.with_network_stack());
        assert!(project.stack.website.is_none());
    }

    #[test]
    fn test_should_fall_back_to_crate_name() {
        let project = project(&[
            ("plinth.toml", "[website]\n"),
            ("Cargo.toml", "[package]\nname = \"my-crate\"\n"),
        ])
        .unwrap();

        assert_eq!(project.stack.name, "my-crate");
    }

    #[test]
    fn test_should_reject_wildcard_subject() {
        let error = project(&[(
            "plinth.toml",
            r#"
            [compute.task]
            image = "nginx:latest"

            [compute.oidc]
            subject = "repo:myorg/myrepo:*"
            "#,
        )])
        .unwrap_err();

        assert!(format!("{error:#}").contains("Failed to parse plinth.toml"));
    }

    #[test]
    fn test_should_reject_empty_config() {
        let error = project(&[("plinth.toml", "[project]\nname = \"empty\"\n")]).unwrap_err();
        assert!(error.to_string().contains("Nothing to deploy"));
    }

    #[test]
    fn test_should_require_config_file() {
        assert!(project(&[]).is_err());
    }
}
