//! Build Target Registry
//!
//! Build targets live at `<targets_dir>/<name>/target.toml`. Unit-test
//! packages are any directory holding a `pkg.toml` with `type = "unittest"`;
//! they resolve by package path or by the last path component and get a
//! synthesized simulated target.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::{BuiltinDefaults, LoadedProject};
use crate::settings::{Settings, BSP_SIMULATED};

/// A single `target.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Application package path, relative to the project root
    pub app: String,

    /// Board support package path
    pub bsp: String,

    #[serde(default = "default_build_profile")]
    pub build_profile: String,

    /// Flash slot capacity in bytes; images larger than this overflow
    #[serde(default)]
    pub image_slot_size: Option<u64>,

    #[serde(default)]
    pub settings: BTreeMap<String, toml::Value>,
}

fn default_build_profile() -> String {
    BuiltinDefaults::default().build_profile
}

/// `pkg.toml` fields the registry cares about
#[derive(Debug, Clone, Deserialize)]
struct PackageFile {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Errors that can occur when loading or resolving targets
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
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

    #[error("Failed to scan project tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Target '{name}': invalid value for '{field}': {reason}")]
    InvalidValue {
        name: String,
        field: String,
        reason: String,
    },

    #[error("Could not resolve target name: {0}")]
    NotFound(String),

    #[error("Ambiguous target name '{name}', matches: {}", .candidates.join(", "))]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
}

pub type TargetResult<T> = Result<T, TargetError>;

/// A target ready to hand to a builder
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub name: String,
    pub config: TargetConfig,
    /// Unit-test package path; set only for synthesized unit-test targets
    pub test_pkg: Option<String>,
    /// Directory the target was loaded from (package dir for unit tests)
    pub dir: PathBuf,
}

impl ResolvedTarget {
    pub fn settings(&self) -> Settings {
        Settings::from_toml(&self.config.settings)
    }

    pub fn is_unittest(&self) -> bool {
        self.test_pkg.is_some()
    }
}

impl TargetConfig {
    /// Parse and validate a target description
    pub fn parse(name: &str, content: &str, path: &Path) -> TargetResult<Self> {
        let config: TargetConfig = toml::from_str(content).map_err(|e| TargetError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate(name)?;
        Ok(config)
    }

    fn validate(&self, name: &str) -> TargetResult<()> {
        if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(invalid(
                name,
                "name",
                "name must contain only alphanumeric characters, dashes, and underscores",
            ));
        }
        if self.app.trim().is_empty() {
            return Err(invalid(name, "app", "app cannot be empty"));
        }
        if self.bsp.trim().is_empty() {
            return Err(invalid(name, "bsp", "bsp cannot be empty"));
        }
        if self.build_profile.trim().is_empty() {
            return Err(invalid(name, "build_profile", "build_profile cannot be empty"));
        }
        if self.image_slot_size == Some(0) {
            return Err(invalid(name, "image_slot_size", "image_slot_size cannot be 0"));
        }
        Ok(())
    }
}

fn invalid(name: &str, field: &str, reason: &str) -> TargetError {
    TargetError::InvalidValue {
        name: name.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Every target and unit-test package known to a project
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, (PathBuf, TargetConfig)>,
    /// Unit-test package path -> package directory
    unittests: BTreeMap<String, PathBuf>,
    unittest_bsp: String,
}

impl TargetRegistry {
    /// Scan the project's targets directory and source tree.
    pub fn scan(project: &LoadedProject) -> TargetResult<Self> {
        let mut registry = TargetRegistry {
            unittest_bsp: project.unittest_bsp().to_string(),
            ..Default::default()
        };

        let defaults = project.defaults();
        let targets_dir = project.targets_dir();
        if targets_dir.is_dir() {
            let entries = fs::read_dir(&targets_dir).map_err(|e| TargetError::Io {
                path: targets_dir.clone(),
                source: e,
            })?;
            for entry in entries {
                let entry = entry.map_err(|e| TargetError::Io {
                    path: targets_dir.clone(),
                    source: e,
                })?;
                let file = entry.path().join(&defaults.target_file);
                if !file.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let content = fs::read_to_string(&file).map_err(|e| TargetError::Io {
                    path: file.clone(),
                    source: e,
                })?;
                let config = TargetConfig::parse(&name, &content, &file)?;
                registry.targets.insert(name, (entry.path(), config));
            }
        }

        let bin_dir = project.bin_dir();
        let walker = WalkDir::new(&project.root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| {
                let hidden = e.depth() > 0 && e.file_name().to_string_lossy().starts_with('.');
                !hidden && e.path() != bin_dir && e.path() != targets_dir
            });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != defaults.package_file.as_str() {
                continue;
            }
            let Some(pkg_dir) = entry.path().parent() else {
                continue;
            };
            let content = fs::read_to_string(entry.path()).map_err(|e| TargetError::Io {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            let pkg: PackageFile = toml::from_str(&content).map_err(|e| TargetError::Parse {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            if pkg.kind.as_deref() != Some("unittest") {
                continue;
            }
            if let Ok(rel) = pkg_dir.strip_prefix(&project.root) {
                let pkg_path = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                registry.unittests.insert(pkg_path, pkg_dir.to_path_buf());
            }
        }

        debug!(
            targets = registry.targets.len(),
            unittests = registry.unittests.len(),
            "scanned project"
        );
        Ok(registry)
    }

    /// Insert a target directly (used by tests and tooling)
    pub fn insert_target(&mut self, name: &str, dir: PathBuf, config: TargetConfig) {
        self.targets.insert(name.to_string(), (dir, config));
    }

    /// Register a unit-test package directly
    pub fn insert_unittest(&mut self, pkg_path: &str, dir: PathBuf) {
        self.unittests.insert(pkg_path.to_string(), dir);
    }

    pub fn set_unittest_bsp(&mut self, bsp: &str) {
        self.unittest_bsp = bsp.to_string();
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Resolve a build target by name
    pub fn resolve_target(&self, name: &str) -> TargetResult<ResolvedTarget> {
        let (dir, config) = self
            .targets
            .get(name)
            .ok_or_else(|| TargetError::NotFound(name.to_string()))?;
        Ok(ResolvedTarget {
            name: name.to_string(),
            config: config.clone(),
            test_pkg: None,
            dir: dir.clone(),
        })
    }

    /// Resolve a build target, falling back to a unit-test package
    pub fn resolve_target_or_unittest(&self, name: &str) -> TargetResult<ResolvedTarget> {
        if self.targets.contains_key(name) {
            return self.resolve_target(name);
        }

        let trimmed = name.trim_end_matches('/');
        if let Some(dir) = self.unittests.get(trimmed) {
            return Ok(self.unittest_target(trimmed, dir));
        }

        let matches: Vec<(&String, &PathBuf)> = self
            .unittests
            .iter()
            .filter(|(pkg, _)| pkg.rsplit('/').next() == Some(trimmed))
            .collect();

        match matches.as_slice() {
            [] => Err(TargetError::NotFound(name.to_string())),
            [(pkg, dir)] => Ok(self.unittest_target(pkg, dir)),
            _ => Err(TargetError::Ambiguous {
                name: name.to_string(),
                candidates: matches.iter().map(|(pkg, _)| (*pkg).clone()).collect(),
            }),
        }
    }

    fn unittest_target(&self, pkg_path: &str, dir: &Path) -> ResolvedTarget {
        let mut settings = BTreeMap::new();
        settings.insert(BSP_SIMULATED.to_string(), toml::Value::Integer(1));

        let name = pkg_path.rsplit('/').next().unwrap_or(pkg_path).to_string();
        ResolvedTarget {
            name,
            config: TargetConfig {
                app: pkg_path.to_string(),
                bsp: self.unittest_bsp.clone(),
                build_profile: default_build_profile(),
                image_slot_size: None,
                settings,
            },
            test_pkg: Some(pkg_path.to_string()),
            dir: dir.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::BOOT_LOADER;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("project.toml"), "[project]\nname = \"demo\"\n");
        write(
            &dir.path().join("targets/blinky_nrf52/target.toml"),
            r#"
app = "apps/blinky"
bsp = "hw/bsp/nrf52dk"
image_slot_size = 4096
"#,
        );
        write(
            &dir.path().join("targets/boot_nrf52/target.toml"),
            r#"
app = "boot/mcuboot"
bsp = "hw/bsp/nrf52dk"
build_profile = "optimized"

[settings]
BOOT_LOADER = 1
"#,
        );
        write(&dir.path().join("libs/util/test/pkg.toml"), "type = \"unittest\"\n");
        write(&dir.path().join("libs/json/test/pkg.toml"), "type = \"unittest\"\n");
        write(&dir.path().join("libs/json/pkg.toml"), "type = \"lib\"\n");
        dir
    }

    #[test]
    fn test_parse_target_defaults() {
        let config = TargetConfig::parse(
            "t1",
            "app = \"apps/blinky\"\nbsp = \"hw/bsp/native\"\n",
            Path::new("t1/target.toml"),
        )
        .unwrap();
        assert_eq!(config.build_profile, "default");
        assert!(config.image_slot_size.is_none());
        assert!(config.settings.is_empty());
    }

    #[test]
    fn test_parse_target_rejects_empty_app() {
        let err = TargetConfig::parse("t1", "app = \"\"\nbsp = \"b\"\n", Path::new("x")).unwrap_err();
        assert!(matches!(err, TargetError::InvalidValue { ref field, .. } if field == "app"));
    }

    #[test]
    fn test_parse_target_rejects_bad_name() {
        let err = TargetConfig::parse("t 1", "app = \"a\"\nbsp = \"b\"\n", Path::new("x")).unwrap_err();
        assert!(matches!(err, TargetError::InvalidValue { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_scan_and_resolve() {
        let dir = sample_project();
        let project = LoadedProject::load(dir.path()).unwrap();
        let registry = TargetRegistry::scan(&project).unwrap();

        let names: Vec<_> = registry.target_names().collect();
        assert_eq!(names, vec!["blinky_nrf52", "boot_nrf52"]);

        let target = registry.resolve_target("blinky_nrf52").unwrap();
        assert_eq!(target.config.app, "apps/blinky");
        assert_eq!(target.config.image_slot_size, Some(4096));
        assert!(!target.is_unittest());

        let boot = registry.resolve_target("boot_nrf52").unwrap();
        assert!(boot.settings().is_true(BOOT_LOADER));
        assert_eq!(boot.config.build_profile, "optimized");
    }

    #[test]
    fn test_resolve_target_does_not_find_unittests() {
        let dir = sample_project();
        let project = LoadedProject::load(dir.path()).unwrap();
        let registry = TargetRegistry::scan(&project).unwrap();

        assert!(matches!(
            registry.resolve_target("libs/util/test"),
            Err(TargetError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_unittest_by_path() {
        let dir = sample_project();
        let project = LoadedProject::load(dir.path()).unwrap();
        let registry = TargetRegistry::scan(&project).unwrap();

        let target = registry.resolve_target_or_unittest("libs/util/test").unwrap();
        assert_eq!(target.test_pkg.as_deref(), Some("libs/util/test"));
        assert_eq!(target.config.bsp, "hw/bsp/native");
        assert!(target.settings().is_true(BSP_SIMULATED));
    }

    #[test]
    fn test_resolve_unittest_ambiguous_short_name() {
        let dir = sample_project();
        let project = LoadedProject::load(dir.path()).unwrap();
        let registry = TargetRegistry::scan(&project).unwrap();

        match registry.resolve_target_or_unittest("test") {
            Err(TargetError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["libs/json/test", "libs/util/test"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unknown_name() {
        let dir = sample_project();
        let project = LoadedProject::load(dir.path()).unwrap();
        let registry = TargetRegistry::scan(&project).unwrap();

        assert!(matches!(
            registry.resolve_target_or_unittest("nope"),
            Err(TargetError::NotFound(_))
        ));
    }

    #[test]
    fn test_unittest_short_name_unique() {
        let mut registry = TargetRegistry::default();
        registry.set_unittest_bsp("hw/bsp/native");
        registry.insert_unittest("net/ip/selftest", PathBuf::from("/p/net/ip/selftest"));

        let target = registry.resolve_target_or_unittest("selftest").unwrap();
        assert_eq!(target.name, "selftest");
        assert_eq!(target.test_pkg.as_deref(), Some("net/ip/selftest"));
    }
}
