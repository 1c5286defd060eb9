//! Image assembly for the legacy (V1) and current (V2) formats.

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::encrypt::{encrypt_body, EncryptionPlan};
use crate::error::{ImageError, ImageResult};
use crate::header::{
    padded_header_size, HeaderV1, HeaderV2, FLAG_ENCRYPTED, FLAG_V1_ED25519, FLAG_V1_SHA256,
};
use crate::keys::PrivSignKey;
use crate::tlv::{
    encode_area, encode_tlvs, Tlv, TlvTags, TLV_ED25519, TLV_INFO_MAGIC, TLV_KEYHASH,
    TLV_PROT_INFO_MAGIC, TLV_SHA256, TLV_V1_ED25519, TLV_V1_SHA256,
};
use crate::version::ImageVersion;

/// Layout parameters shared by both formats.
#[derive(Debug, Clone, Default)]
pub struct ImageSettings {
    pub version: ImageVersion,
    /// Pad the header to this many bytes (0 = no padding).
    pub pad_header: u32,
    /// Pad the body with 0xff to a multiple of this many bytes (0 = none).
    pub pad_image: u32,
    /// Use the older NONCE / SECRET_ID type codes.
    pub legacy_tlvs: bool,
    pub encryption: Option<EncryptionPlan>,
}

/// A finished image.
#[derive(Debug, Clone)]
pub struct BuiltImage {
    pub bytes: Vec<u8>,
    /// SHA-256 over header, plaintext body and protected TLVs.
    pub hash: [u8; 32],
    pub key_hashes: Vec<[u8; 32]>,
    pub encrypted: bool,
}

/// Pad `body` with 0xff up to a multiple of `pad_image`.
pub fn pad_body(body: &[u8], pad_image: u32) -> Vec<u8> {
    let mut out = body.to_vec();
    let pad = pad_image as usize;
    if pad > 0 && out.len() % pad != 0 {
        let target = (out.len() / pad + 1) * pad;
        out.resize(target, 0xff);
    }
    out
}

fn body_size(body: &[u8]) -> ImageResult<u32> {
    u32::try_from(body.len()).map_err(|_| ImageError::FieldOverflow {
        what: "image body",
        size: body.len(),
        max: u32::MAX as usize,
    })
}

fn encrypt_copy<R: RngCore>(
    body: &[u8],
    settings: &ImageSettings,
    rng: &mut R,
) -> ImageResult<(Vec<u8>, Vec<Tlv>)> {
    let mut out = body.to_vec();
    let tlvs = match &settings.encryption {
        Some(plan) => encrypt_body(plan, &mut out, TlvTags::new(settings.legacy_tlvs), rng)?,
        None => Vec::new(),
    };
    Ok((out, tlvs))
}

/// Build a current-format image.
///
/// `sections` become protected TLVs and are covered by the hash; every key
/// contributes a KEYHASH + signature pair.
pub fn create_v2<R: RngCore>(
    source: &[u8],
    sections: &[Tlv],
    keys: &[PrivSignKey],
    settings: &ImageSettings,
    rng: &mut R,
) -> ImageResult<BuiltImage> {
    let body = pad_body(source, settings.pad_image);
    let hdr_size = padded_header_size(settings.pad_header)?;

    let protected = encode_area(TLV_PROT_INFO_MAGIC, sections)?;
    let protect_tlv_size = u16::try_from(protected.len()).map_err(|_| ImageError::FieldOverflow {
        what: "protected TLV area",
        size: protected.len(),
        max: u16::MAX as usize,
    })?;

    let encrypted = settings.encryption.is_some();
    let header = HeaderV2 {
        load_addr: 0,
        hdr_size,
        protect_tlv_size,
        img_size: body_size(&body)?,
        flags: if encrypted { FLAG_ENCRYPTED } else { 0 },
        version: settings.version,
    }
    .encode();

    let mut hasher = Sha256::new();
    hasher.update(&header);
    hasher.update(&body);
    hasher.update(&protected);
    let hash: [u8; 32] = hasher.finalize().into();

    let (payload, enc_tlvs) = encrypt_copy(&body, settings, rng)?;

    let mut tlvs = vec![Tlv::new(TLV_SHA256, hash.to_vec())];
    let mut key_hashes = Vec::with_capacity(keys.len());
    for key in keys {
        let key_hash = key.key_hash();
        tlvs.push(Tlv::new(TLV_KEYHASH, key_hash.to_vec()));
        tlvs.push(Tlv::new(TLV_ED25519, key.sign(&hash).to_vec()));
        key_hashes.push(key_hash);
    }
    tlvs.extend(enc_tlvs);
    let trailer = encode_area(TLV_INFO_MAGIC, &tlvs)?;

    let mut bytes =
        Vec::with_capacity(header.len() + payload.len() + protected.len() + trailer.len());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&protected);
    bytes.extend_from_slice(&trailer);

    debug!(
        size = bytes.len(),
        keys = keys.len(),
        sections = sections.len(),
        encrypted,
        "assembled current-format image"
    );

    Ok(BuiltImage {
        bytes,
        hash,
        key_hashes,
        encrypted,
    })
}

/// Build a legacy-format image. At most one key; `key_id` is written to the
/// header.
pub fn create_v1<R: RngCore>(
    source: &[u8],
    keys: &[PrivSignKey],
    key_id: u8,
    settings: &ImageSettings,
    rng: &mut R,
) -> ImageResult<BuiltImage> {
    if keys.len() > 1 {
        return Err(ImageError::TooManyKeys(keys.len()));
    }
    let key = keys.first();

    let body = pad_body(source, settings.pad_image);
    let hdr_size = padded_header_size(settings.pad_header)?;
    let encrypted = settings.encryption.is_some();

    // The header records the trailer size, so the trailer's shape has to be
    // settled before hashing.
    let (payload, enc_tlvs) = encrypt_copy(&body, settings, rng)?;
    let sig_len = if key.is_some() { 4 + 64 } else { 0 };
    let tlv_total = 4 + 32 + sig_len + enc_tlvs.iter().map(Tlv::encoded_len).sum::<usize>();
    let tlv_size = u16::try_from(tlv_total).map_err(|_| ImageError::FieldOverflow {
        what: "TLV trailer",
        size: tlv_total,
        max: u16::MAX as usize,
    })?;

    let mut flags = FLAG_V1_SHA256;
    if key.is_some() {
        flags |= FLAG_V1_ED25519;
    }
    if encrypted {
        flags |= FLAG_ENCRYPTED;
    }

    let header = HeaderV1 {
        tlv_size,
        key_id,
        hdr_size,
        img_size: body_size(&body)?,
        flags,
        version: settings.version,
    }
    .encode();

    let mut hasher = Sha256::new();
    hasher.update(&header);
    hasher.update(&body);
    let hash: [u8; 32] = hasher.finalize().into();

    let mut tlvs = vec![Tlv::new(TLV_V1_SHA256, hash.to_vec())];
    let mut key_hashes = Vec::new();
    if let Some(key) = key {
        tlvs.push(Tlv::new(TLV_V1_ED25519, key.sign(&hash).to_vec()));
        key_hashes.push(key.key_hash());
    }
    tlvs.extend(enc_tlvs);
    let trailer = encode_tlvs(&tlvs)?;
    debug_assert_eq!(trailer.len(), tlv_total);

    let mut bytes = Vec::with_capacity(header.len() + payload.len() + trailer.len());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&trailer);

    debug!(size = bytes.len(), key_id, encrypted, "assembled legacy-format image");

    Ok(BuiltImage {
        bytes,
        hash,
        key_hashes,
        encrypted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_body() {
        assert_eq!(pad_body(&[1, 2, 3], 0), vec![1, 2, 3]);
        assert_eq!(pad_body(&[1, 2, 3], 4), vec![1, 2, 3, 0xff]);
        assert_eq!(pad_body(&[1, 2, 3, 4], 4), vec![1, 2, 3, 4]);
        assert_eq!(pad_body(&[1], 8).len(), 8);
    }
}
