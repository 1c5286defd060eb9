//! Fixed-size image headers for both image formats.

use crate::error::{ImageError, ImageResult};
use crate::version::ImageVersion;

pub const IMAGE_MAGIC_V1: u32 = 0x96f3_b83c;
pub const IMAGE_MAGIC_V2: u32 = 0x96f3_b83d;

/// Encoded size of either header, before padding.
pub const IMAGE_HEADER_SIZE: usize = 32;

pub const FLAG_V1_SHA256: u32 = 0x0000_0002;
pub const FLAG_ENCRYPTED: u32 = 0x0000_0004;
pub const FLAG_V1_ED25519: u32 = 0x0000_0010;

/// Header size after applying the requested header padding.
pub fn padded_header_size(pad_header: u32) -> ImageResult<u16> {
    let size = (pad_header as usize).max(IMAGE_HEADER_SIZE);
    u16::try_from(size).map_err(|_| ImageError::FieldOverflow {
        what: "padded header",
        size,
        max: u16::MAX as usize,
    })
}

/// Current-format header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV2 {
    pub load_addr: u32,
    pub hdr_size: u16,
    pub protect_tlv_size: u16,
    pub img_size: u32,
    pub flags: u32,
    pub version: ImageVersion,
}

impl HeaderV2 {
    /// Encode and zero-pad to `hdr_size`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.hdr_size as usize);
        out.extend_from_slice(&IMAGE_MAGIC_V2.to_le_bytes());
        out.extend_from_slice(&self.load_addr.to_le_bytes());
        out.extend_from_slice(&self.hdr_size.to_le_bytes());
        out.extend_from_slice(&self.protect_tlv_size.to_le_bytes());
        out.extend_from_slice(&self.img_size.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.version.to_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.resize((self.hdr_size as usize).max(IMAGE_HEADER_SIZE), 0);
        out
    }

    pub fn decode(bytes: &[u8]) -> ImageResult<Self> {
        let raw = fixed(bytes)?;
        if read_u32(raw, 0) != IMAGE_MAGIC_V2 {
            return Err(ImageError::Malformed("not a current-format image".to_string()));
        }
        Ok(Self {
            load_addr: read_u32(raw, 4),
            hdr_size: read_u16(raw, 8),
            protect_tlv_size: read_u16(raw, 10),
            img_size: read_u32(raw, 12),
            flags: read_u32(raw, 16),
            version: read_version(raw),
        })
    }
}

/// Legacy-format header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderV1 {
    pub tlv_size: u16,
    pub key_id: u8,
    pub hdr_size: u16,
    pub img_size: u32,
    pub flags: u32,
    pub version: ImageVersion,
}

impl HeaderV1 {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.hdr_size as usize);
        out.extend_from_slice(&IMAGE_MAGIC_V1.to_le_bytes());
        out.extend_from_slice(&self.tlv_size.to_le_bytes());
        out.push(self.key_id);
        out.push(0);
        out.extend_from_slice(&self.hdr_size.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.img_size.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.version.to_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.resize((self.hdr_size as usize).max(IMAGE_HEADER_SIZE), 0);
        out
    }

    pub fn decode(bytes: &[u8]) -> ImageResult<Self> {
        let raw = fixed(bytes)?;
        if read_u32(raw, 0) != IMAGE_MAGIC_V1 {
            return Err(ImageError::Malformed("not a legacy-format image".to_string()));
        }
        Ok(Self {
            tlv_size: read_u16(raw, 4),
            key_id: raw[6],
            hdr_size: read_u16(raw, 8),
            img_size: read_u32(raw, 12),
            flags: read_u32(raw, 16),
            version: read_version(raw),
        })
    }
}

/// Peek at the header magic.
pub fn read_magic(bytes: &[u8]) -> ImageResult<u32> {
    Ok(read_u32(fixed(bytes)?, 0))
}

fn fixed(bytes: &[u8]) -> ImageResult<&[u8]> {
    if bytes.len() < IMAGE_HEADER_SIZE {
        return Err(ImageError::Malformed(format!(
            "image shorter than header: {} bytes",
            bytes.len()
        )));
    }
    Ok(&bytes[..IMAGE_HEADER_SIZE])
}

fn read_u16(raw: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([raw[off], raw[off + 1]])
}

fn read_u32(raw: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([raw[off], raw[off + 1], raw[off + 2], raw[off + 3]])
}

fn read_version(raw: &[u8]) -> ImageVersion {
    let mut ver = [0u8; 8];
    ver.copy_from_slice(&raw[20..28]);
    ImageVersion::from_bytes(&ver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_layout() {
        let hdr = HeaderV2 {
            load_addr: 0,
            hdr_size: 32,
            protect_tlv_size: 0,
            img_size: 0x1234,
            flags: FLAG_ENCRYPTED,
            version: ImageVersion::new(1, 2, 3, 4),
        };
        let bytes = hdr.encode();
        assert_eq!(bytes.len(), IMAGE_HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[0x3d, 0xb8, 0xf3, 0x96]);
        assert_eq!(&bytes[12..16], &[0x34, 0x12, 0, 0]);
        assert_eq!(HeaderV2::decode(&bytes).unwrap(), hdr);
    }

    #[test]
    fn test_v1_layout_carries_key_id() {
        let hdr = HeaderV1 {
            tlv_size: 104,
            key_id: 7,
            hdr_size: 64,
            img_size: 100,
            flags: FLAG_V1_SHA256 | FLAG_V1_ED25519,
            version: ImageVersion::new(0, 0, 0, 1),
        };
        let bytes = hdr.encode();
        assert_eq!(bytes.len(), 64);
        assert_eq!(bytes[6], 7);
        assert!(bytes[IMAGE_HEADER_SIZE..].iter().all(|b| *b == 0));
        assert_eq!(HeaderV1::decode(&bytes).unwrap(), hdr);
        assert!(HeaderV2::decode(&bytes).is_err());
    }

    #[test]
    fn test_padded_header_size() {
        assert_eq!(padded_header_size(0).unwrap(), 32);
        assert_eq!(padded_header_size(16).unwrap(), 32);
        assert_eq!(padded_header_size(0x200).unwrap(), 0x200);
        assert!(padded_header_size(0x10000).is_err());
    }
}
