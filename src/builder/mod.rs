//! Builder seam
//!
//! A builder owns one resolved target and knows how to compile it, where
//! the artifacts land, and how to put them on a device. The pipeline only
//! talks to this trait.

mod command;

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::settings::Settings;

pub use command::CommandBuilder;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("No '{0}' command configured in project.toml")]
    MissingCommand(&'static str),

    #[error("The '{0}' command template is empty")]
    EmptyCommand(&'static str),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' command failed: {status}")]
    CommandFailed {
        command: &'static str,
        status: ExitStatus,
    },

    #[error("Build finished but {0} was not produced")]
    MissingArtifact(PathBuf),

    #[error("{0}")]
    Other(String),
}

pub type BuildResult<T> = Result<T, BuildError>;

pub trait Builder {
    fn target_name(&self) -> &str;

    /// Last path component of the application package
    fn app_name(&self) -> &str;

    /// Unit-test package, when the target was synthesized for one
    fn test_pkg(&self) -> Option<&str>;

    /// Add or override a configuration setting for later stages
    fn inject_setting(&mut self, name: &str, value: &str);

    /// Effective settings: the target's table plus injected values
    fn resolve(&self) -> BuildResult<Settings>;

    fn build(&mut self) -> BuildResult<()>;

    fn app_elf_path(&self) -> PathBuf;
    fn app_bin_path(&self) -> PathBuf;
    fn image_path(&self) -> PathBuf;
    fn manifest_path(&self) -> PathBuf;

    /// Flash slot capacity, when the target declares one
    fn image_slot_size(&self) -> Option<u64>;

    fn self_test_create_exe(&mut self) -> BuildResult<()>;
    fn self_test_debug(&mut self) -> BuildResult<()>;

    fn load(&mut self, extra_jtag: Option<&str>) -> BuildResult<()>;
    fn debug(&mut self, extra_jtag: Option<&str>, reset: bool, no_gdb: bool) -> BuildResult<()>;
}
