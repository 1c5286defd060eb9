//! Immutable per-invocation options
//!
//! Built once from the parsed command line and handed to every pipeline
//! stage by reference.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors detected while assembling options from flags
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Either -1, or -2, but not both")]
    ConflictingFormats,

    #[error("Hardware key index out of range: {0}")]
    HwKeyIndexOutOfRange(i64),
}

/// Image header/signature layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// V1: one signing key plus a numeric key identifier
    Legacy,
    /// V2: any number of signing keys, no key identifier
    #[default]
    Current,
}

impl ImageFormat {
    /// Pick the format from the two toggles; neither set means current.
    pub fn from_flags(legacy: bool, current: bool) -> Result<Self, OptionsError> {
        match (legacy, current) {
            (true, true) => Err(OptionsError::ConflictingFormats),
            (true, false) => Ok(ImageFormat::Legacy),
            (false, _) => Ok(ImageFormat::Current),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Legacy => "v1",
            ImageFormat::Current => "v2",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling image production
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageOptions {
    pub format: ImageFormat,

    /// RSA-PSS instead of PKCS#1 v1.5 (RSA keys only)
    pub rsa_pss: bool,

    /// Key file used to encrypt the image
    pub encrypt_key: Option<PathBuf>,

    /// Hardware-stored key slot; None when unset
    pub hw_key_index: Option<u32>,

    /// Pad header to this length
    pub pad_header: u32,

    /// Pad image to this length
    pub pad_image: u32,

    /// ELF section names to embed as TLVs
    pub sections: Vec<String>,

    /// Use legacy TLV values for NONCE and SECRET_ID
    pub legacy_tlvs: bool,

    /// Binary to use in place of the built one (current format only)
    pub overwrite_src: Option<PathBuf>,

    /// Ignore flash overflow errors
    pub force: bool,
}

impl ImageOptions {
    /// Hardware key index as given on the command line; negative means unset.
    pub fn hw_key_index_from_flag(value: i64) -> Result<Option<u32>, OptionsError> {
        if value < 0 {
            return Ok(None);
        }
        u32::try_from(value)
            .map(Some)
            .map_err(|_| OptionsError::HwKeyIndexOutOfRange(value))
    }
}

/// Options for the build/load/debug flow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub image: ImageOptions,

    /// Extra commands to send to JTAG software
    pub extra_jtag_cmd: Option<String>,

    /// Do not start the debugger front end
    pub no_gdb: bool,
}
