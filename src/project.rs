//! Project seam
//!
//! Resolves target names and hands out builders for them.

use std::path::Path;

use thiserror::Error;

use crate::builder::{BuildResult, Builder, CommandBuilder};
use crate::config::{LoadedProject, ProjectError};
use crate::target::{ResolvedTarget, TargetError, TargetRegistry, TargetResult};

pub trait Project {
    type Builder: Builder;

    /// Resolve a build target; unit-test packages do not match.
    fn resolve_target(&self, name: &str) -> TargetResult<ResolvedTarget>;

    /// Resolve a build target or unit-test package.
    fn resolve_target_or_unittest(&self, name: &str) -> TargetResult<ResolvedTarget>;

    fn target_builder(&self, target: &ResolvedTarget) -> BuildResult<Self::Builder>;
}

#[derive(Debug, Error)]
pub enum ProjectOpenError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Targets(#[from] TargetError),
}

/// A project on the local filesystem, built with its command templates
#[derive(Debug)]
pub struct LocalProject {
    project: LoadedProject,
    registry: TargetRegistry,
}

impl LocalProject {
    /// Open the project containing `start`.
    pub fn discover(start: &Path) -> Result<Self, ProjectOpenError> {
        Self::from_loaded(LoadedProject::discover(start)?)
    }

    /// Open the project rooted exactly at `root`.
    pub fn open(root: &Path) -> Result<Self, ProjectOpenError> {
        Self::from_loaded(LoadedProject::load(root)?)
    }

    fn from_loaded(project: LoadedProject) -> Result<Self, ProjectOpenError> {
        let registry = TargetRegistry::scan(&project)?;
        Ok(Self { project, registry })
    }

    pub fn loaded(&self) -> &LoadedProject {
        &self.project
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }
}

impl Project for LocalProject {
    type Builder = CommandBuilder;

    fn resolve_target(&self, name: &str) -> TargetResult<ResolvedTarget> {
        self.registry.resolve_target(name)
    }

    fn resolve_target_or_unittest(&self, name: &str) -> TargetResult<ResolvedTarget> {
        self.registry.resolve_target_or_unittest(name)
    }

    fn target_builder(&self, target: &ResolvedTarget) -> BuildResult<CommandBuilder> {
        CommandBuilder::new(&self.project, target)
    }
}
