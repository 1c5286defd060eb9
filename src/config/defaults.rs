//! Built-in project layout defaults
//!
//! Used whenever `project.toml` leaves a path or name unset.

use serde::{Deserialize, Serialize};

/// Built-in default layout values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Project description file searched for upward from the working directory
    pub project_file: String,

    /// Directory holding one sub-directory per target (default: "targets")
    pub targets_dir: String,

    /// Build output root (default: "bin")
    pub bin_dir: String,

    /// File describing a target inside its directory
    pub target_file: String,

    /// File describing a package (unit-test packages are discovered by it)
    pub package_file: String,

    /// BSP assigned to synthesized unit-test targets
    pub unittest_bsp: String,

    /// Build profile when a target does not name one
    pub build_profile: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            project_file: "project.toml".to_string(),
            targets_dir: "targets".to_string(),
            bin_dir: "bin".to_string(),
            target_file: "target.toml".to_string(),
            package_file: "pkg.toml".to_string(),
            unittest_bsp: "hw/bsp/native".to_string(),
            build_profile: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.project_file, "project.toml");
        assert_eq!(defaults.targets_dir, "targets");
        assert_eq!(defaults.bin_dir, "bin");
        assert_eq!(defaults.unittest_bsp, "hw/bsp/native");
    }
}
