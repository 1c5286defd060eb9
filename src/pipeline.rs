//! Pipeline orchestration for fwpipe
//!
//! Sequences the stages of `create-image` and `run`:
//! - Resolve target
//! - Construct builder
//! - Resolve version token (prompting on `run` when needed)
//! - Build
//! - Derive timestamp version from the ELF
//! - Load keys and produce the image
//! - Load and debug (`run` only)
//!
//! Every stage is a hard gate: the first error aborts the invocation and is
//! returned to the caller, which owns reporting and the process exit code.
//! Unit-test targets on `run` take a separate path: build a self-test
//! executable and run it under the debugger.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::builder::{BuildError, Builder};
use crate::config::{ImageOptions, OptionsError, RunOptions};
use crate::keys::{KeyArguments, KeyError};
use crate::producer::{ImageProducer, ProducedImage};
use crate::project::{Project, ProjectOpenError};
use crate::settings::TESTUTIL_SYSTEM_ASSERT;
use crate::signal::SignalState;
use crate::target::TargetError;
use crate::version::{
    needs_prompt, VersionError, VersionPrompt, VersionToken, DEFAULT_PROMPT_VERSION,
};
use fwpipe_image::ImageError;

/// Exit code for argument errors
pub const EXIT_CODE_USAGE: i32 = 2;

/// Stage of the pipeline an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Args,
    Project,
    Target,
    Builder,
    Version,
    Build,
    Keys,
    Image,
    Load,
    Debug,
    SelfTest,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Args => "args",
            Stage::Project => "project",
            Stage::Target => "target",
            Stage::Builder => "builder",
            Stage::Version => "version",
            Stage::Build => "build",
            Stage::Keys => "keys",
            Stage::Image => "image",
            Stage::Load => "load",
            Stage::Debug => "debug",
            Stage::SelfTest => "self-test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Project(#[from] ProjectOpenError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("{0}")]
    Builder(#[source] BuildError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Build failed: {0}")]
    Build(#[source] BuildError),

    #[error(transparent)]
    Keys(#[from] KeyError),

    #[error("Image creation failed: {0}")]
    Image(#[from] ImageError),

    #[error("Load failed: {0}")]
    Load(#[source] BuildError),

    #[error("Debug failed: {0}")]
    Debug(#[source] BuildError),

    #[error("Self-test failed: {0}")]
    SelfTest(#[source] BuildError),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            return EXIT_CODE_USAGE;
        }
        match self {
            PipelineError::Options(_) => EXIT_CODE_USAGE,
            PipelineError::Project(_) => 3,
            PipelineError::Target(_) => 3,
            PipelineError::Builder(_) => 3,
            PipelineError::Version(VersionError::Mtime { .. }) => 4,
            PipelineError::Version(_) => EXIT_CODE_USAGE,
            PipelineError::Build(_) => 4,
            PipelineError::Keys(_) => 5,
            PipelineError::Image(_) => 6,
            PipelineError::Load(_) => 7,
            PipelineError::Debug(_) => 7,
            PipelineError::SelfTest(_) => 8,
        }
    }

    /// Argument errors are reported together with usage text
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            PipelineError::Options(_)
                | PipelineError::Target(TargetError::NotFound(_))
                | PipelineError::Target(TargetError::Ambiguous { .. })
                | PipelineError::Version(VersionError::Invalid(_))
                | PipelineError::Keys(KeyError::InvalidKeyId(_))
        )
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Options(_) => Stage::Args,
            PipelineError::Project(_) => Stage::Project,
            PipelineError::Target(_) => Stage::Target,
            PipelineError::Builder(_) => Stage::Builder,
            PipelineError::Version(VersionError::Invalid(_)) => Stage::Args,
            PipelineError::Version(_) => Stage::Version,
            PipelineError::Build(_) => Stage::Build,
            PipelineError::Keys(KeyError::InvalidKeyId(_)) => Stage::Args,
            PipelineError::Keys(_) => Stage::Keys,
            PipelineError::Image(_) => Stage::Image,
            PipelineError::Load(_) => Stage::Load,
            PipelineError::Debug(_) => Stage::Debug,
            PipelineError::SelfTest(_) => Stage::SelfTest,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// `create-image <target> <version> [keys...]`
#[derive(Debug, Clone)]
pub struct CreateImageCommand {
    pub target: String,
    pub version: String,
    pub key_args: Vec<String>,
    pub options: ImageOptions,
}

/// `run <target> [version] [keys...]`
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub target: String,
    pub version: Option<String>,
    pub key_args: Vec<String>,
    pub options: RunOptions,
}

/// How a `run` invocation finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Unit-test target: self-test built and run under the debugger
    SelfTest,
    /// Target loaded and debugged; `image` is None when versioning was skipped
    Deployed { image: Option<ProducedImage> },
}

/// Pipeline execution context
pub struct Pipeline<P, I, R> {
    project: P,
    producer: I,
    prompt: R,
    signals: Arc<SignalState>,
}

impl<P, I, R> Pipeline<P, I, R>
where
    P: Project,
    I: ImageProducer,
    R: VersionPrompt,
{
    pub fn new(project: P, producer: I, prompt: R) -> Self {
        Self {
            project,
            producer,
            prompt,
            signals: Arc::new(SignalState::new()),
        }
    }

    /// Share interrupt state with an installed handler
    pub fn with_signals(mut self, signals: Arc<SignalState>) -> Self {
        self.signals = signals;
        self
    }

    pub fn project(&self) -> &P {
        &self.project
    }

    pub fn producer(&self) -> &I {
        &self.producer
    }

    /// Build the target and produce a versioned image.
    pub fn create_image(&mut self, cmd: &CreateImageCommand) -> PipelineResult<ProducedImage> {
        let format = cmd.options.format;

        let target = self.project.resolve_target(&cmd.target)?;
        info!(target = %target.name, %format, "resolved target");

        let token = VersionToken::parse(&cmd.version)?;
        let key_args = format.key_arguments(&cmd.key_args)?;

        let mut builder = self
            .project
            .target_builder(&target)
            .map_err(PipelineError::Builder)?;

        info!(target = %target.name, "building");
        builder.build().map_err(PipelineError::Build)?;

        let version = token.resolve(&builder.app_elf_path())?;
        debug!(%version, "resolved version");

        self.produce(&builder, version, &key_args, &cmd.options)
    }

    /// Build, optionally version and sign, then load and debug the target.
    pub fn run(&mut self, cmd: &RunCommand) -> PipelineResult<RunOutcome> {
        let options = &cmd.options;
        let format = options.image.format;

        let target = self.project.resolve_target_or_unittest(&cmd.target)?;
        info!(target = %target.name, %format, "resolved target");

        let mut builder = self
            .project
            .target_builder(&target)
            .map_err(PipelineError::Builder)?;

        if let Some(pkg) = builder.test_pkg().map(str::to_string) {
            info!(package = %pkg, "running unit test");
            builder.inject_setting(TESTUTIL_SYSTEM_ASSERT, "1");
            builder
                .self_test_create_exe()
                .map_err(PipelineError::SelfTest)?;

            let _session = self.signals.debug_session();
            builder.self_test_debug().map_err(PipelineError::SelfTest)?;
            return Ok(RunOutcome::SelfTest);
        }

        let token = self.run_version_token(&builder, cmd.version.as_deref())?;
        let key_args = match token {
            Some(_) => format.key_arguments(&cmd.key_args)?,
            None => KeyArguments::default(),
        };

        info!(target = %target.name, "building");
        builder.build().map_err(PipelineError::Build)?;

        let image = match token {
            Some(token) => {
                let version = token.resolve(&builder.app_elf_path())?;
                debug!(%version, "resolved version");
                Some(self.produce(&builder, version, &key_args, &options.image)?)
            }
            None => {
                info!("no version; skipping image creation");
                None
            }
        };

        let extra_jtag = options.extra_jtag_cmd.as_deref();
        info!(target = %target.name, "loading");
        builder.load(extra_jtag).map_err(PipelineError::Load)?;

        info!(target = %target.name, no_gdb = options.no_gdb, "debugging");
        {
            let _session = self.signals.debug_session();
            builder
                .debug(extra_jtag, true, options.no_gdb)
                .map_err(PipelineError::Debug)?;
        }

        Ok(RunOutcome::Deployed { image })
    }

    /// Version token for `run`: the argument when given, otherwise a prompt
    /// unless the target is a bootloader or simulated.
    fn run_version_token(
        &mut self,
        builder: &P::Builder,
        arg: Option<&str>,
    ) -> PipelineResult<Option<VersionToken>> {
        if let Some(token) = arg.filter(|s| !s.is_empty()) {
            return Ok(Some(VersionToken::parse(token)?));
        }

        let settings = builder.resolve().map_err(PipelineError::Builder)?;
        if !needs_prompt(&settings) {
            debug!("bootloader or simulated target; no version prompt");
            return Ok(None);
        }

        let input = self
            .prompt
            .read_version()
            .map_err(VersionError::Prompt)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let input = input.as_deref().unwrap_or(DEFAULT_PROMPT_VERSION);
        Ok(Some(VersionToken::parse(input)?))
    }

    fn produce(
        &mut self,
        builder: &P::Builder,
        version: fwpipe_image::ImageVersion,
        key_args: &KeyArguments,
        options: &ImageOptions,
    ) -> PipelineResult<ProducedImage> {
        let keys = key_args.load()?;
        let image = options
            .format
            .produce(&mut self.producer, builder, version, &keys, options)?;
        info!(path = %image.path.display(), hash = %image.hash, "image created");
        Ok(image)
    }
}
