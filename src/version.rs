//! Version token resolution
//!
//! A version token is either the literal `timestamp`, which derives the
//! version from the built ELF's modification time, or a dotted version
//! string. On `run` the token may be absent, in which case the operator is
//! prompted unless the target is a bootloader or simulated.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, Timelike};
use fwpipe_image::{ImageError, ImageVersion};
use thiserror::Error;

use crate::settings::{Settings, BOOT_LOADER, BSP_SIMULATED};

/// Token selecting timestamp-derived versioning
pub const TIMESTAMP_TOKEN: &str = "timestamp";

/// Used when the operator enters nothing at the prompt
pub const DEFAULT_PROMPT_VERSION: &str = "0";

#[derive(Debug, Error)]
pub enum VersionError {
    #[error(transparent)]
    Invalid(#[from] ImageError),

    #[error("Failed to read modification time of {path}: {source}")]
    Mtime {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read version from console: {0}")]
    Prompt(#[source] io::Error),
}

pub type VersionResult<T> = Result<T, VersionError>;

/// A parsed version argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionToken {
    /// Derive from the build artifact after the build
    Timestamp,
    Explicit(ImageVersion),
}

impl VersionToken {
    pub fn parse(token: &str) -> VersionResult<Self> {
        if token == TIMESTAMP_TOKEN {
            return Ok(VersionToken::Timestamp);
        }
        Ok(VersionToken::Explicit(ImageVersion::parse(token)?))
    }

    /// Final version; `elf` is only consulted for timestamps.
    pub fn resolve(&self, elf: &Path) -> VersionResult<ImageVersion> {
        match self {
            VersionToken::Timestamp => version_from_mtime(elf),
            VersionToken::Explicit(v) => Ok(*v),
        }
    }
}

/// Project a calendar moment onto version fields.
///
/// Major is `year % 1000` truncated to 8 bits, so years past 1255 of a
/// millennium wrap.
pub fn version_from_datetime<T: Datelike + Timelike>(at: &T) -> ImageVersion {
    let major = (at.year().rem_euclid(1000)) as u8;
    let build_num = at.hour() * 10000 + at.minute() * 100 + at.second();
    ImageVersion::new(major, at.month() as u8, at.day() as u16, build_num)
}

/// Derive a version from a file's local modification time.
pub fn version_from_mtime(path: &Path) -> VersionResult<ImageVersion> {
    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| VersionError::Mtime {
            path: path.to_path_buf(),
            source: e,
        })?;
    let local: DateTime<Local> = mtime.into();
    Ok(version_from_datetime(&local))
}

/// Whether `run` must ask the operator for a version.
pub fn needs_prompt(settings: &Settings) -> bool {
    !settings.is_true(BOOT_LOADER) && !settings.is_true(BSP_SIMULATED)
}

/// Source of interactively entered versions
pub trait VersionPrompt {
    /// `Ok(None)` or an empty string means the operator entered nothing.
    fn read_version(&mut self) -> io::Result<Option<String>>;
}

/// Prompt on the controlling terminal, or read a line from piped stdin.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl VersionPrompt for ConsolePrompt {
    fn read_version(&mut self) -> io::Result<Option<String>> {
        if io::stdin().is_terminal() {
            let input: String = dialoguer::Input::new()
                .with_prompt("Enter image version")
                .default(DEFAULT_PROMPT_VERSION.to_string())
                .allow_empty(true)
                .interact_text()
                .map_err(io::Error::other)?;
            return Ok(Some(input));
        }

        read_version_line(io::stdin().lock(), io::stdout().lock())
    }
}

/// Print the prompt to `output`, then read one line from `input`.
fn read_version_line<I: BufRead, O: Write>(
    mut input: I,
    mut output: O,
) -> io::Result<Option<String>> {
    write!(output, "Enter image version(default {}): ", DEFAULT_PROMPT_VERSION)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_version_from_datetime() {
        let v = version_from_datetime(&at(2024, 3, 7, 14, 5, 9));
        assert_eq!(v, ImageVersion::new(24, 3, 7, 140509));
    }

    #[test]
    fn test_version_from_datetime_midnight_and_end_of_day() {
        assert_eq!(
            version_from_datetime(&at(2000, 1, 1, 0, 0, 0)),
            ImageVersion::new(0, 1, 1, 0)
        );
        assert_eq!(
            version_from_datetime(&at(2031, 12, 31, 23, 59, 59)),
            ImageVersion::new(31, 12, 31, 235959)
        );
    }

    #[test]
    fn test_version_major_wraps_past_255() {
        // 1300 % 1000 = 300, truncated to 8 bits
        let v = version_from_datetime(&at(1300, 6, 1, 0, 0, 0));
        assert_eq!(v.major, 44);
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(VersionToken::parse("timestamp").unwrap(), VersionToken::Timestamp);
        assert_eq!(
            VersionToken::parse("1.3.0.3").unwrap(),
            VersionToken::Explicit(ImageVersion::new(1, 3, 0, 3))
        );
        assert!(matches!(
            VersionToken::parse("1.x"),
            Err(VersionError::Invalid(_))
        ));
        assert!(VersionToken::parse("Timestamp").is_err());
    }

    #[test]
    fn test_explicit_resolve_ignores_artifact() {
        let token = VersionToken::Explicit(ImageVersion::new(2, 0, 0, 0));
        let v = token.resolve(Path::new("/nonexistent.elf")).unwrap();
        assert_eq!(v, ImageVersion::new(2, 0, 0, 0));
    }

    #[test]
    fn test_timestamp_resolve_reads_mtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let elf = dir.path().join("app.elf");
        std::fs::write(&elf, b"\x7fELF").unwrap();

        let mtime: DateTime<Local> = std::fs::metadata(&elf).unwrap().modified().unwrap().into();
        let v = VersionToken::Timestamp.resolve(&elf).unwrap();
        assert_eq!(v, version_from_datetime(&mtime));
    }

    #[test]
    fn test_timestamp_resolve_missing_artifact() {
        assert!(matches!(
            VersionToken::Timestamp.resolve(Path::new("/nonexistent.elf")),
            Err(VersionError::Mtime { .. })
        ));
    }

    #[test]
    fn test_needs_prompt() {
        let mut settings = Settings::new();
        assert!(needs_prompt(&settings));

        settings.insert(BSP_SIMULATED, "0");
        assert!(needs_prompt(&settings));

        settings.insert(BSP_SIMULATED, "1");
        assert!(!needs_prompt(&settings));

        let mut boot = Settings::new();
        boot.insert(BOOT_LOADER, "1");
        assert!(!needs_prompt(&boot));
    }

    #[test]
    fn test_piped_prompt_prints_before_reading() {
        let mut out = Vec::new();
        let read = read_version_line(io::Cursor::new("1.2.3\n"), &mut out).unwrap();
        assert_eq!(read.as_deref(), Some("1.2.3"));
        assert_eq!(out, b"Enter image version(default 0): ");
    }

    #[test]
    fn test_piped_prompt_eof() {
        let mut out = Vec::new();
        let read = read_version_line(io::Cursor::new(""), &mut out).unwrap();
        assert_eq!(read, None);
        assert!(!out.is_empty());
    }
}
