//! Configuration
//!
//! Two sources feed a pipeline run:
//! 1. Built-in layout defaults
//! 2. The project description (`project.toml`)
//!
//! plus the per-invocation [`ImageOptions`]/[`RunOptions`] assembled from
//! command-line flags.

mod defaults;
mod options;
mod project;

pub use defaults::BuiltinDefaults;
pub use options::{ImageFormat, ImageOptions, OptionsError, RunOptions};
pub use project::{
    CommandTemplate, CommandsSection, LoadedProject, PathsSection, ProjectConfig, ProjectError,
    ProjectSection,
};
