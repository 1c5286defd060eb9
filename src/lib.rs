//! fwpipe - firmware image pipeline
//!
//! Builds a target, stamps a version into a flashable image, optionally
//! signs and encrypts it, and loads and debugs it on a device. Image
//! encoding itself lives in the `fwpipe-image` crate.

pub mod builder;
pub mod cli;
pub mod config;
pub mod keys;
pub mod pipeline;
pub mod producer;
pub mod project;
pub mod settings;
pub mod signal;
pub mod target;
pub mod version;

pub use builder::{BuildError, Builder, CommandBuilder};
pub use config::{ImageFormat, ImageOptions, RunOptions};
pub use keys::{KeyArguments, KeyError, SigningKeySet};
pub use pipeline::{
    CreateImageCommand, Pipeline, PipelineError, PipelineResult, RunCommand, RunOutcome, Stage,
};
pub use producer::{FileImageProducer, ImageProducer, ProducedImage};
pub use project::{LocalProject, Project};
pub use settings::Settings;
pub use target::{ResolvedTarget, TargetConfig, TargetError, TargetRegistry};
pub use version::{ConsolePrompt, VersionPrompt, VersionToken};
