//! Image version value.
//!
//! Versions are written `major.minor.rev.build`; trailing components may be
//! omitted and default to zero.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ImageError, ImageResult};

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:\.([0-9]+))?$")
            .expect("version regex is valid")
    })
}

/// Version stamped into the image header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageVersion {
    pub major: u8,
    pub minor: u8,
    pub rev: u16,
    pub build_num: u32,
}

impl ImageVersion {
    pub const fn new(major: u8, minor: u8, rev: u16, build_num: u32) -> Self {
        Self {
            major,
            minor,
            rev,
            build_num,
        }
    }

    /// Parse a dotted version string.
    pub fn parse(input: &str) -> ImageResult<Self> {
        let invalid = |reason: &str| ImageError::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let caps = version_regex()
            .captures(input)
            .ok_or_else(|| invalid("expected major[.minor[.rev[.build]]]"))?;

        let field = |idx: usize, max: u64, name: &str| -> ImageResult<u64> {
            match caps.get(idx) {
                None => Ok(0),
                Some(m) => {
                    let value: u64 = m
                        .as_str()
                        .parse()
                        .map_err(|_| invalid(&format!("{} is not a number", name)))?;
                    if value > max {
                        return Err(invalid(&format!("{} must be at most {}", name, max)));
                    }
                    Ok(value)
                }
            }
        };

        Ok(Self {
            major: field(1, u8::MAX as u64, "major")? as u8,
            minor: field(2, u8::MAX as u64, "minor")? as u8,
            rev: field(3, u16::MAX as u64, "revision")? as u16,
            build_num: field(4, u32::MAX as u64, "build number")? as u32,
        })
    }

    /// Header encoding: major, minor, rev (LE), build number (LE).
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0] = self.major;
        out[1] = self.minor;
        out[2..4].copy_from_slice(&self.rev.to_le_bytes());
        out[4..8].copy_from_slice(&self.build_num.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        Self {
            major: bytes[0],
            minor: bytes[1],
            rev: u16::from_le_bytes([bytes[2], bytes[3]]),
            build_num: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

impl fmt::Display for ImageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.rev, self.build_num
        )
    }
}

impl FromStr for ImageVersion {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ImageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
