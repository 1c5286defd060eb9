//! Decoding of produced images, for inspection and verification.

use crate::error::{ImageError, ImageResult};
use crate::header::{read_magic, HeaderV1, HeaderV2, IMAGE_MAGIC_V1, IMAGE_MAGIC_V2};
use crate::tlv::{decode_area, decode_tlvs, Tlv, TLV_INFO_MAGIC, TLV_PROT_INFO_MAGIC};
use crate::version::ImageVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedHeader {
    V1(HeaderV1),
    V2(HeaderV2),
}

/// An image split into its parts.
#[derive(Debug, Clone)]
pub struct ParsedImage {
    pub header: ParsedHeader,
    pub body: Vec<u8>,
    pub protected_tlvs: Vec<Tlv>,
    pub tlvs: Vec<Tlv>,
}

impl ParsedImage {
    pub fn version(&self) -> ImageVersion {
        match &self.header {
            ParsedHeader::V1(h) => h.version,
            ParsedHeader::V2(h) => h.version,
        }
    }

    pub fn flags(&self) -> u32 {
        match &self.header {
            ParsedHeader::V1(h) => h.flags,
            ParsedHeader::V2(h) => h.flags,
        }
    }

    /// All unprotected records of the given type, in trailer order.
    pub fn tlvs_of(&self, kind: u8) -> Vec<&Tlv> {
        self.tlvs.iter().filter(|t| t.kind == kind).collect()
    }

    pub fn find_tlv(&self, kind: u8) -> Option<&Tlv> {
        self.tlvs.iter().find(|t| t.kind == kind)
    }
}

pub fn parse_image(bytes: &[u8]) -> ImageResult<ParsedImage> {
    match read_magic(bytes)? {
        IMAGE_MAGIC_V2 => parse_v2(bytes),
        IMAGE_MAGIC_V1 => parse_v1(bytes),
        other => Err(ImageError::Malformed(format!("unknown image magic 0x{:08x}", other))),
    }
}

fn split_body(bytes: &[u8], hdr_size: u16, img_size: u32) -> ImageResult<(Vec<u8>, usize)> {
    let start = hdr_size as usize;
    let end = start + img_size as usize;
    if end > bytes.len() {
        return Err(ImageError::Malformed(format!(
            "body ends at {} but image is {} bytes",
            end,
            bytes.len()
        )));
    }
    Ok((bytes[start..end].to_vec(), end))
}

fn parse_v2(bytes: &[u8]) -> ImageResult<ParsedImage> {
    let header = HeaderV2::decode(bytes)?;
    let (body, mut off) = split_body(bytes, header.hdr_size, header.img_size)?;

    let mut protected_tlvs = Vec::new();
    if header.protect_tlv_size > 0 {
        let (tlvs, used) = decode_area(&bytes[off..], TLV_PROT_INFO_MAGIC)?;
        if used != header.protect_tlv_size as usize {
            return Err(ImageError::Malformed(
                "protected TLV size disagrees with header".to_string(),
            ));
        }
        protected_tlvs = tlvs;
        off += used;
    }

    let (tlvs, used) = decode_area(&bytes[off..], TLV_INFO_MAGIC)?;
    if off + used != bytes.len() {
        return Err(ImageError::Malformed("trailing bytes after TLV area".to_string()));
    }

    Ok(ParsedImage {
        header: ParsedHeader::V2(header),
        body,
        protected_tlvs,
        tlvs,
    })
}

fn parse_v1(bytes: &[u8]) -> ImageResult<ParsedImage> {
    let header = HeaderV1::decode(bytes)?;
    let (body, off) = split_body(bytes, header.hdr_size, header.img_size)?;
    if off + header.tlv_size as usize != bytes.len() {
        return Err(ImageError::Malformed(
            "TLV size disagrees with image length".to_string(),
        ));
    }
    let tlvs = decode_tlvs(&bytes[off..])?;

    Ok(ParsedImage {
        header: ParsedHeader::V1(header),
        body,
        protected_tlvs: Vec::new(),
        tlvs,
    })
}
