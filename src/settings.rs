//! Resolved configuration settings
//!
//! Flat name/value map produced by resolving a target: the target's own
//! `[settings]` table plus anything injected by the pipeline.

use std::collections::BTreeMap;

/// Target is a bootloader (no image versioning on `run`)
pub const BOOT_LOADER: &str = "BOOT_LOADER";

/// Target runs on the simulated BSP
pub const BSP_SIMULATED: &str = "BSP_SIMULATED";

/// Injected for unit-test builds
pub const TESTUTIL_SYSTEM_ASSERT: &str = "TESTUTIL_SYSTEM_ASSERT";

/// String-valued settings keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a TOML `[settings]` table. Scalars are stringified; tables
    /// and arrays are skipped.
    pub fn from_toml(table: &BTreeMap<String, toml::Value>) -> Self {
        let mut settings = Self::new();
        for (name, value) in table {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                toml::Value::Array(_) | toml::Value::Table(_) => continue,
            };
            settings.insert(name, text);
        }
        settings
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// True when the setting exists and [`value_is_true`] holds.
    pub fn is_true(&self, name: &str) -> bool {
        self.get(name).map(value_is_true).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Non-zero integers and `true` (any case) are true.
pub fn value_is_true(value: &str) -> bool {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return n != 0;
    }
    value.eq_ignore_ascii_case("true")
}
