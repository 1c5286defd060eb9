//! Project description (`project.toml`)
//!
//! Names the project, its directory layout, and the external commands used
//! to build, load and debug targets. Commands are argv templates; see
//! [`CommandTemplate`] for token substitution.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::defaults::BuiltinDefaults;

/// Errors that can occur when locating or loading the project description
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("No {file} found in {start} or any parent directory")]
    NotFound { file: String, start: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Top-level `project.toml` contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub commands: CommandsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsSection {
    /// Directory holding target descriptions
    pub targets: Option<String>,

    /// Build output root
    pub bin: Option<String>,

    /// BSP for synthesized unit-test targets
    pub unittest_bsp: Option<String>,
}

/// External tool invocations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandsSection {
    pub build: Option<CommandTemplate>,
    pub self_test: Option<CommandTemplate>,
    pub self_test_debug: Option<CommandTemplate>,
    pub load: Option<CommandTemplate>,
    pub debug: Option<CommandTemplate>,
}

/// An argv template.
///
/// Every `{token}` occurrence is replaced by the token's value. An argument
/// consisting of a single known token whose value is empty is dropped, so
/// optional values do not turn into empty arguments. Unknown tokens are kept
/// as literal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(pub Vec<String>);

impl CommandTemplate {
    pub fn render(&self, vars: &BTreeMap<&str, String>) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.0.len());
        for arg in &self.0 {
            if let Some(name) = sole_token(arg) {
                match vars.get(name) {
                    Some(v) if v.is_empty() => {}
                    Some(v) => argv.push(v.clone()),
                    None => argv.push(arg.clone()),
                }
                continue;
            }

            let mut rendered = arg.clone();
            for (name, value) in vars {
                rendered = rendered.replace(&format!("{{{}}}", name), value);
            }
            argv.push(rendered);
        }
        argv
    }
}

fn sole_token(arg: &str) -> Option<&str> {
    let inner = arg.strip_prefix('{')?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains(['{', '}']) {
        return None;
    }
    Some(inner)
}

/// A loaded project: its root directory plus parsed description.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub root: PathBuf,
    pub config: ProjectConfig,
    /// SHA-256 of the raw `project.toml` bytes
    pub digest: String,
    defaults: BuiltinDefaults,
}

impl LoadedProject {
    /// Search `start` and its ancestors for the project file.
    pub fn discover(start: &Path) -> Result<Self, ProjectError> {
        let defaults = BuiltinDefaults::default();
        for dir in start.ancestors() {
            let candidate = dir.join(&defaults.project_file);
            if candidate.is_file() {
                return Self::load(dir);
            }
        }
        Err(ProjectError::NotFound {
            file: defaults.project_file,
            start: start.to_path_buf(),
        })
    }

    /// Load the project rooted at `root`.
    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let defaults = BuiltinDefaults::default();
        let path = root.join(&defaults.project_file);

        let bytes = fs::read(&path).map_err(|e| ProjectError::Io {
            path: path.clone(),
            source: e,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes).map_err(|e| ProjectError::Invalid {
            path: path.clone(),
            reason: format!("invalid UTF-8: {}", e),
        })?;
        let config: ProjectConfig = toml::from_str(&contents).map_err(|e| ProjectError::Parse {
            path: path.clone(),
            source: e,
        })?;

        if config.project.name.trim().is_empty() {
            return Err(ProjectError::Invalid {
                path,
                reason: "project.name must not be empty".to_string(),
            });
        }

        debug!(root = %root.display(), %digest, "loaded project");

        Ok(Self {
            root: root.to_path_buf(),
            config,
            digest,
            defaults,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.project.name
    }

    pub fn targets_dir(&self) -> PathBuf {
        let dir = self.config.paths.targets.as_deref().unwrap_or(&self.defaults.targets_dir);
        self.root.join(dir)
    }

    pub fn bin_dir(&self) -> PathBuf {
        let dir = self.config.paths.bin.as_deref().unwrap_or(&self.defaults.bin_dir);
        self.root.join(dir)
    }

    pub fn unittest_bsp(&self) -> &str {
        self.config
            .paths
            .unittest_bsp
            .as_deref()
            .unwrap_or(&self.defaults.unittest_bsp)
    }

    pub fn defaults(&self) -> &BuiltinDefaults {
        &self.defaults
    }

    pub fn commands(&self) -> &CommandsSection {
        &self.config.commands
    }
}
