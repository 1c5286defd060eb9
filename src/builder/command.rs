//! Builder backed by the project's command templates
//!
//! Each stage runs one argv template from `project.toml` in the project
//! root with inherited stdio, blocking until it exits. Paths and settings
//! are exported to the child as `FWPIPE_*` variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use super::{BuildError, BuildResult, Builder};
use crate::config::{CommandTemplate, CommandsSection, LoadedProject};
use crate::settings::Settings;
use crate::target::ResolvedTarget;

const ENV_PREFIX: &str = "FWPIPE_";

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    root: PathBuf,
    target: ResolvedTarget,
    app_name: String,
    bin_dir: PathBuf,
    commands: CommandsSection,
    injected: Settings,
}

impl CommandBuilder {
    pub fn new(project: &LoadedProject, target: &ResolvedTarget) -> BuildResult<Self> {
        let invalid = |reason: String| BuildError::InvalidTarget {
            target: target.name.clone(),
            reason,
        };

        let app_name = target
            .config
            .app
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(format!("invalid app path '{}'", target.config.app)))?
            .to_string();

        let app_dir = project.root.join(&target.config.app);
        if !app_dir.is_dir() {
            return Err(invalid(format!("app package {} does not exist", app_dir.display())));
        }

        Ok(Self {
            root: project.root.clone(),
            target: target.clone(),
            app_name,
            bin_dir: project.bin_dir().join(&target.name),
            commands: project.commands().clone(),
            injected: Settings::new(),
        })
    }

    fn artifact(&self, ext: &str) -> PathBuf {
        self.bin_dir.join(format!("{}.{}", self.app_name, ext))
    }

    fn vars(&self, extra_jtag: Option<&str>) -> BTreeMap<&'static str, String> {
        let path = |p: PathBuf| p.to_string_lossy().into_owned();
        let mut vars = BTreeMap::new();
        vars.insert("target", self.target.name.clone());
        vars.insert("app", self.target.config.app.clone());
        vars.insert("bsp", self.target.config.bsp.clone());
        vars.insert("profile", self.target.config.build_profile.clone());
        vars.insert("bin_dir", path(self.bin_dir.clone()));
        vars.insert("elf", path(self.app_elf_path()));
        vars.insert("bin", path(self.app_bin_path()));
        vars.insert("image", path(self.image_path()));
        vars.insert("extra_jtag", extra_jtag.unwrap_or_default().to_string());
        vars.insert("test_pkg", self.target.test_pkg.clone().unwrap_or_default());
        vars
    }

    fn env(&self, vars: &BTreeMap<&'static str, String>) -> BuildResult<Vec<(String, String)>> {
        let mut env: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (format!("{}{}", ENV_PREFIX, k.to_uppercase()), v.clone()))
            .collect();
        for (name, value) in self.resolve()?.iter() {
            env.push((format!("{}SETTING_{}", ENV_PREFIX, name), value.to_string()));
        }
        Ok(env)
    }

    fn run(
        &self,
        which: &'static str,
        template: Option<&CommandTemplate>,
        extra_jtag: Option<&str>,
        flags: &[(&str, bool)],
    ) -> BuildResult<()> {
        let template = template.ok_or(BuildError::MissingCommand(which))?;
        let vars = self.vars(extra_jtag);
        let argv = template.render(&vars);
        let (program, args) = argv.split_first().ok_or(BuildError::EmptyCommand(which))?;

        let mut env = self.env(&vars)?;
        for (name, set) in flags {
            env.push((format!("{}{}", ENV_PREFIX, name), (if *set { "1" } else { "0" }).to_string()));
        }

        info!(command = which, target = %self.target.name, "running {}", argv.join(" "));
        let status = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .envs(env)
            .status()
            .map_err(|e| BuildError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        debug!(command = which, %status, "command exited");
        if !status.success() {
            return Err(BuildError::CommandFailed {
                command: which,
                status,
            });
        }
        Ok(())
    }
}

impl Builder for CommandBuilder {
    fn target_name(&self) -> &str {
        &self.target.name
    }

    fn app_name(&self) -> &str {
        &self.app_name
    }

    fn test_pkg(&self) -> Option<&str> {
        self.target.test_pkg.as_deref()
    }

    fn inject_setting(&mut self, name: &str, value: &str) {
        debug!(name, value, "injecting setting");
        self.injected.insert(name, value);
    }

    fn resolve(&self) -> BuildResult<Settings> {
        let mut settings = self.target.settings();
        for (name, value) in self.injected.iter() {
            settings.insert(name, value);
        }
        Ok(settings)
    }

    fn build(&mut self) -> BuildResult<()> {
        self.run("build", self.commands.build.as_ref(), None, &[])?;
        let elf = self.app_elf_path();
        if !elf.is_file() {
            return Err(BuildError::MissingArtifact(elf));
        }
        Ok(())
    }

    fn app_elf_path(&self) -> PathBuf {
        self.artifact("elf")
    }

    fn app_bin_path(&self) -> PathBuf {
        self.artifact("bin")
    }

    fn image_path(&self) -> PathBuf {
        self.artifact("img")
    }

    fn manifest_path(&self) -> PathBuf {
        self.artifact("json")
    }

    fn image_slot_size(&self) -> Option<u64> {
        self.target.config.image_slot_size
    }

    fn self_test_create_exe(&mut self) -> BuildResult<()> {
        self.run("self_test", self.commands.self_test.as_ref(), None, &[])
    }

    fn self_test_debug(&mut self) -> BuildResult<()> {
        self.run("self_test_debug", self.commands.self_test_debug.as_ref(), None, &[])
    }

    fn load(&mut self, extra_jtag: Option<&str>) -> BuildResult<()> {
        self.run("load", self.commands.load.as_ref(), extra_jtag, &[])
    }

    fn debug(&mut self, extra_jtag: Option<&str>, reset: bool, no_gdb: bool) -> BuildResult<()> {
        self.run(
            "debug",
            self.commands.debug.as_ref(),
            extra_jtag,
            &[("RESET", reset), ("NO_GDB", no_gdb)],
        )
    }
}
