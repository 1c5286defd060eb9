//! fwpipe image library
//!
//! Versioning, encoding, signing and encryption of flashable firmware
//! images in the legacy (V1) and current (V2) header formats.

pub mod create;
pub mod encrypt;
pub mod error;
pub mod header;
pub mod keys;
pub mod manifest;
pub mod parse;
pub mod sections;
pub mod tlv;
pub mod version;

pub use create::{create_v1, create_v2, BuiltImage, ImageSettings};
pub use encrypt::EncryptionPlan;
pub use error::{ImageError, ImageResult};
pub use keys::{read_priv_sign_keys, EncryptionKey, PrivSignKey};
pub use manifest::{ImageManifest, MANIFEST_SCHEMA_VERSION};
pub use parse::{parse_image, ParsedHeader, ParsedImage};
pub use sections::{parse_section_list, read_section_tlvs};
pub use version::ImageVersion;
