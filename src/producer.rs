//! Image production seam
//!
//! The pipeline hands a producer the built target, the resolved version and
//! the loaded keys; the producer writes the flashable image plus a JSON
//! manifest next to it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fwpipe_image::{
    create_v1, create_v2, read_section_tlvs, BuiltImage, EncryptionKey, EncryptionPlan,
    ImageError, ImageManifest, ImageResult, ImageSettings, ImageVersion, PrivSignKey,
    MANIFEST_SCHEMA_VERSION,
};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::builder::Builder;
use crate::config::{ImageFormat, ImageOptions};
use crate::keys::SigningKeySet;

/// Inputs shared by both image formats
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub version: ImageVersion,
    pub keys: &'a [PrivSignKey],
    pub rsa_pss: bool,
    pub encrypt_key: Option<&'a Path>,
    pub hw_key_index: Option<u32>,
    pub pad_header: u32,
    pub pad_image: u32,
    pub sections: &'a [String],
    pub legacy_tlvs: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LegacyImageRequest<'a> {
    pub common: ImageRequest<'a>,
    pub key_id: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct CurrentImageRequest<'a> {
    pub common: ImageRequest<'a>,
    /// Binary to package instead of the built one
    pub overwrite_src: Option<&'a Path>,
}

/// What a successful production left on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedImage {
    pub path: PathBuf,
    pub manifest_path: PathBuf,
    /// Hex SHA-256 image hash
    pub hash: String,
    pub size: usize,
}

pub trait ImageProducer {
    fn produce_v1(
        &mut self,
        builder: &dyn Builder,
        request: &LegacyImageRequest<'_>,
    ) -> ImageResult<ProducedImage>;

    fn produce_v2(
        &mut self,
        builder: &dyn Builder,
        request: &CurrentImageRequest<'_>,
    ) -> ImageResult<ProducedImage>;
}

impl ImageFormat {
    /// Dispatch to the producer entry point for this format.
    pub fn produce<I: ImageProducer + ?Sized>(
        &self,
        producer: &mut I,
        builder: &dyn Builder,
        version: ImageVersion,
        keys: &SigningKeySet,
        options: &ImageOptions,
    ) -> ImageResult<ProducedImage> {
        let common = ImageRequest {
            version,
            keys: &keys.keys,
            rsa_pss: options.rsa_pss,
            encrypt_key: options.encrypt_key.as_deref(),
            hw_key_index: options.hw_key_index,
            pad_header: options.pad_header,
            pad_image: options.pad_image,
            sections: &options.sections,
            legacy_tlvs: options.legacy_tlvs,
            force: options.force,
        };

        info!(format = %self, %version, keys = keys.len(), "creating image");
        match self {
            ImageFormat::Legacy => producer.produce_v1(
                builder,
                &LegacyImageRequest {
                    common,
                    key_id: keys.key_id,
                },
            ),
            ImageFormat::Current => producer.produce_v2(
                builder,
                &CurrentImageRequest {
                    common,
                    overwrite_src: options.overwrite_src.as_deref(),
                },
            ),
        }
    }
}

/// Writes images with `fwpipe-image` next to the build artifacts.
pub struct FileImageProducer<R = OsRng> {
    rng: R,
}

impl FileImageProducer<OsRng> {
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for FileImageProducer<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> FileImageProducer<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

fn read_file(path: &Path) -> ImageResult<Vec<u8>> {
    fs::read(path).map_err(|e| ImageError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

fn image_settings(request: &ImageRequest<'_>) -> ImageResult<ImageSettings> {
    if request.rsa_pss && !request.keys.is_empty() {
        warn!("--rsa-pss has no effect with Ed25519 signing keys");
    }

    let encryption = match (request.encrypt_key, request.hw_key_index) {
        (Some(path), Some(index)) => Some(EncryptionPlan::HardwareKey {
            key: EncryptionKey::from_file(path)?,
            index,
        }),
        (Some(path), None) => Some(EncryptionPlan::WrappedKey {
            kek: EncryptionKey::from_file(path)?,
        }),
        (None, Some(index)) => {
            warn!(index, "hardware key index given without --encrypt; image is not encrypted");
            None
        }
        (None, None) => None,
    };

    Ok(ImageSettings {
        version: request.version,
        pad_header: request.pad_header,
        pad_image: request.pad_image,
        legacy_tlvs: request.legacy_tlvs,
        encryption,
    })
}

/// Refuse images that do not fit the target's flash slot unless forced.
fn check_flash_overflow(builder: &dyn Builder, size: usize, force: bool) -> ImageResult<()> {
    let Some(slot) = builder.image_slot_size() else {
        return Ok(());
    };
    let slot_size = usize::try_from(slot).unwrap_or(usize::MAX);
    if size <= slot_size {
        return Ok(());
    }
    if force {
        warn!(size, slot_size, "image exceeds flash slot; writing anyway (--force)");
        return Ok(());
    }
    Err(ImageError::FlashOverflow { size, slot_size })
}

fn write_outputs(
    builder: &dyn Builder,
    image: &BuiltImage,
    request: &ImageRequest<'_>,
    format: ImageFormat,
    key_id: Option<u8>,
) -> ImageResult<ProducedImage> {
    check_flash_overflow(builder, image.bytes.len(), request.force)?;

    let path = builder.image_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ImageError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(&path, &image.bytes).map_err(|e| ImageError::Write {
        path: path.clone(),
        source: e,
    })?;

    let hash = hex::encode(image.hash);
    let manifest = ImageManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        target: builder.target_name().to_string(),
        name: builder.app_name().to_string(),
        version: request.version,
        format: format.as_str().to_string(),
        image_hash: hash.clone(),
        image: path.display().to_string(),
        image_size: image.bytes.len(),
        key_hashes: image.key_hashes.iter().map(hex::encode).collect(),
        key_id,
        encrypted: image.encrypted,
        sections: request.sections.to_vec(),
        build_time: Utc::now(),
    };
    let manifest_path = builder.manifest_path();
    manifest.write_to_file(&manifest_path)?;

    debug!(path = %path.display(), %hash, size = image.bytes.len(), "image written");
    Ok(ProducedImage {
        path,
        manifest_path,
        hash,
        size: image.bytes.len(),
    })
}

impl<R: RngCore> ImageProducer for FileImageProducer<R> {
    fn produce_v1(
        &mut self,
        builder: &dyn Builder,
        request: &LegacyImageRequest<'_>,
    ) -> ImageResult<ProducedImage> {
        let common = &request.common;
        if !common.sections.is_empty() {
            return Err(ImageError::SectionsUnsupported);
        }

        let source = read_file(&builder.app_bin_path())?;
        let settings = image_settings(common)?;
        let image = create_v1(&source, common.keys, request.key_id, &settings, &mut self.rng)?;

        write_outputs(builder, &image, common, ImageFormat::Legacy, Some(request.key_id))
    }

    fn produce_v2(
        &mut self,
        builder: &dyn Builder,
        request: &CurrentImageRequest<'_>,
    ) -> ImageResult<ProducedImage> {
        let common = &request.common;
        let source = match request.overwrite_src {
            Some(path) => {
                info!(path = %path.display(), "packaging overwrite source");
                read_file(path)?
            }
            None => read_file(&builder.app_bin_path())?,
        };

        let sections = read_section_tlvs(&builder.app_elf_path(), common.sections)?;
        let settings = image_settings(common)?;
        let image = create_v2(&source, &sections, common.keys, &settings, &mut self.rng)?;

        write_outputs(builder, &image, common, ImageFormat::Current, None)
    }
}
