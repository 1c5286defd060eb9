//! Type-length-value records carried in the image trailer.

use crate::error::{ImageError, ImageResult};

/// Magic of the unprotected TLV area (not covered by the image hash).
pub const TLV_INFO_MAGIC: u16 = 0x6907;

/// Magic of the protected TLV area (covered by the image hash).
pub const TLV_PROT_INFO_MAGIC: u16 = 0x6908;

/// Size of a TLV entry header and of a TLV area header.
pub const TLV_HEADER_SIZE: usize = 4;

// Current (V2) format TLV types
pub const TLV_KEYHASH: u8 = 0x01;
pub const TLV_SHA256: u8 = 0x10;
pub const TLV_ED25519: u8 = 0x24;
pub const TLV_ENC_KEY: u8 = 0x31;
pub const TLV_NONCE: u8 = 0x35;
pub const TLV_SECRET_ID: u8 = 0x36;
pub const TLV_LEGACY_NONCE: u8 = 0x50;
pub const TLV_LEGACY_SECRET_ID: u8 = 0x60;
pub const TLV_SECTION: u8 = 0x80;

// Legacy (V1) format TLV types
pub const TLV_V1_SHA256: u8 = 0x01;
pub const TLV_V1_ED25519: u8 = 0x24;

/// Tag values used for the encryption TLVs.
///
/// Older bootloaders expect the NONCE and SECRET_ID records under different
/// type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvTags {
    pub nonce: u8,
    pub secret_id: u8,
}

impl TlvTags {
    pub fn new(legacy: bool) -> Self {
        if legacy {
            Self {
                nonce: TLV_LEGACY_NONCE,
                secret_id: TLV_LEGACY_SECRET_ID,
            }
        } else {
            Self {
                nonce: TLV_NONCE,
                secret_id: TLV_SECRET_ID,
            }
        }
    }
}

/// A single TLV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub kind: u8,
    pub data: Vec<u8>,
}

impl Tlv {
    pub fn new(kind: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Section record: section name, NUL, section contents.
    pub fn section(name: &str, contents: &[u8]) -> Self {
        let mut data = Vec::with_capacity(name.len() + 1 + contents.len());
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data.extend_from_slice(contents);
        Self::new(TLV_SECTION, data)
    }

    pub fn encoded_len(&self) -> usize {
        TLV_HEADER_SIZE + self.data.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> ImageResult<()> {
        let len = u16::try_from(self.data.len()).map_err(|_| ImageError::FieldOverflow {
            what: "TLV payload",
            size: self.data.len(),
            max: u16::MAX as usize,
        })?;
        out.push(self.kind);
        out.push(0);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.data);
        Ok(())
    }
}

/// Encode TLVs back to back, without an area header.
pub fn encode_tlvs(tlvs: &[Tlv]) -> ImageResult<Vec<u8>> {
    let mut out = Vec::with_capacity(tlvs.iter().map(Tlv::encoded_len).sum());
    for tlv in tlvs {
        tlv.encode_into(&mut out)?;
    }
    Ok(out)
}

/// Encode a TLV area: magic, total length (header included), entries.
///
/// An empty protected area is omitted entirely, so callers get an empty
/// buffer back for it.
pub fn encode_area(magic: u16, tlvs: &[Tlv]) -> ImageResult<Vec<u8>> {
    if tlvs.is_empty() && magic == TLV_PROT_INFO_MAGIC {
        return Ok(Vec::new());
    }

    let body = encode_tlvs(tlvs)?;
    let total = TLV_HEADER_SIZE + body.len();
    let total16 = u16::try_from(total).map_err(|_| ImageError::FieldOverflow {
        what: "TLV area",
        size: total,
        max: u16::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&total16.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode back-to-back TLV entries filling `bytes` exactly.
pub fn decode_tlvs(mut bytes: &[u8]) -> ImageResult<Vec<Tlv>> {
    let mut tlvs = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < TLV_HEADER_SIZE {
            return Err(ImageError::Malformed("truncated TLV header".to_string()));
        }
        let kind = bytes[0];
        let len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let end = TLV_HEADER_SIZE + len;
        if bytes.len() < end {
            return Err(ImageError::Malformed(format!(
                "TLV 0x{:02x} claims {} bytes, {} left",
                kind,
                len,
                bytes.len() - TLV_HEADER_SIZE
            )));
        }
        tlvs.push(Tlv::new(kind, &bytes[TLV_HEADER_SIZE..end]));
        bytes = &bytes[end..];
    }
    Ok(tlvs)
}

/// Decode a TLV area at the start of `bytes`; returns the entries and the
/// number of bytes consumed.
pub fn decode_area(bytes: &[u8], magic: u16) -> ImageResult<(Vec<Tlv>, usize)> {
    if bytes.len() < TLV_HEADER_SIZE {
        return Err(ImageError::Malformed("truncated TLV area".to_string()));
    }
    let found = u16::from_le_bytes([bytes[0], bytes[1]]);
    if found != magic {
        return Err(ImageError::Malformed(format!(
            "bad TLV area magic 0x{:04x}, expected 0x{:04x}",
            found, magic
        )));
    }
    let total = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if total < TLV_HEADER_SIZE || total > bytes.len() {
        return Err(ImageError::Malformed(format!("bad TLV area length {}", total)));
    }
    let tlvs = decode_tlvs(&bytes[TLV_HEADER_SIZE..total])?;
    Ok((tlvs, total))
}
