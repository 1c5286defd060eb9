//! AES-CTR body encryption.
//!
//! Two modes: with a hardware-stored key the body is encrypted directly
//! under the supplied key and the slot index is recorded in a SECRET_ID
//! record; otherwise a random AES-128 image key encrypts the body and is
//! wrapped under the supplied key into an ENC_KEY record.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes256};
use rand::RngCore;

use crate::error::{ImageError, ImageResult};
use crate::keys::EncryptionKey;
use crate::tlv::{Tlv, TlvTags, TLV_ENC_KEY};

pub const NONCE_LEN: usize = 16;
pub const IMAGE_KEY_LEN: usize = 16;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// How the image body is to be encrypted.
#[derive(Debug, Clone)]
pub enum EncryptionPlan {
    /// Key also provisioned on the device at slot `index`.
    HardwareKey { key: EncryptionKey, index: u32 },
    /// Random per-image key wrapped under `kek`.
    WrappedKey { kek: EncryptionKey },
}

/// Encrypt or decrypt `data` in place with AES-CTR.
pub fn apply_ctr(key: &[u8], nonce: &[u8; NONCE_LEN], data: &mut [u8]) -> ImageResult<()> {
    let bad_len = || ImageError::Malformed(format!("AES key must be 16 or 32 bytes, got {}", key.len()));
    match key.len() {
        16 => Aes128Ctr::new_from_slices(key, nonce)
            .map_err(|_| bad_len())?
            .apply_keystream(data),
        32 => Aes256Ctr::new_from_slices(key, nonce)
            .map_err(|_| bad_len())?
            .apply_keystream(data),
        _ => return Err(bad_len()),
    }
    Ok(())
}

/// Wrap an image key by encrypting it as a single AES block under `kek`.
pub fn wrap_key(kek: &EncryptionKey, image_key: &[u8; IMAGE_KEY_LEN]) -> ImageResult<[u8; IMAGE_KEY_LEN]> {
    let mut block = aes::Block::clone_from_slice(image_key);
    match kek.as_bytes().len() {
        16 => block_cipher::<Aes128>(kek)?.encrypt_block(&mut block),
        _ => block_cipher::<Aes256>(kek)?.encrypt_block(&mut block),
    }
    let mut out = [0u8; IMAGE_KEY_LEN];
    out.copy_from_slice(&block);
    Ok(out)
}

/// Inverse of [`wrap_key`].
pub fn unwrap_key(kek: &EncryptionKey, wrapped: &[u8]) -> ImageResult<[u8; IMAGE_KEY_LEN]> {
    if wrapped.len() != IMAGE_KEY_LEN {
        return Err(ImageError::Malformed(format!(
            "wrapped key must be {} bytes, got {}",
            IMAGE_KEY_LEN,
            wrapped.len()
        )));
    }
    let mut block = aes::Block::clone_from_slice(wrapped);
    match kek.as_bytes().len() {
        16 => block_cipher::<Aes128>(kek)?.decrypt_block(&mut block),
        _ => block_cipher::<Aes256>(kek)?.decrypt_block(&mut block),
    }
    let mut out = [0u8; IMAGE_KEY_LEN];
    out.copy_from_slice(&block);
    Ok(out)
}

fn block_cipher<C: KeyInit>(kek: &EncryptionKey) -> ImageResult<C> {
    C::new_from_slice(kek.as_bytes())
        .map_err(|_| ImageError::Malformed("invalid key-encryption key length".to_string()))
}

/// Encrypt `body` in place according to `plan` and return the TLVs that
/// let the bootloader decrypt it.
pub fn encrypt_body<R: RngCore>(
    plan: &EncryptionPlan,
    body: &mut [u8],
    tags: TlvTags,
    rng: &mut R,
) -> ImageResult<Vec<Tlv>> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let mut tlvs = Vec::with_capacity(2);
    match plan {
        EncryptionPlan::HardwareKey { key, index } => {
            apply_ctr(key.as_bytes(), &nonce, body)?;
            tlvs.push(Tlv::new(tags.nonce, nonce.to_vec()));
            tlvs.push(Tlv::new(tags.secret_id, index.to_le_bytes().to_vec()));
        }
        EncryptionPlan::WrappedKey { kek } => {
            let mut image_key = [0u8; IMAGE_KEY_LEN];
            rng.fill_bytes(&mut image_key);
            apply_ctr(&image_key, &nonce, body)?;
            tlvs.push(Tlv::new(TLV_ENC_KEY, wrap_key(kek, &image_key)?.to_vec()));
            tlvs.push(Tlv::new(tags.nonce, nonce.to_vec()));
        }
    }
    Ok(tlvs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ctr_is_symmetric() {
        let key = [0x11u8; 16];
        let nonce = [0x22u8; NONCE_LEN];
        let mut data = b"firmware body bytes".to_vec();
        apply_ctr(&key, &nonce, &mut data).unwrap();
        assert_ne!(data, b"firmware body bytes".to_vec());
        apply_ctr(&key, &nonce, &mut data).unwrap();
        assert_eq!(data, b"firmware body bytes".to_vec());
    }

    #[test]
    fn test_wrap_unwrap() {
        for len in [16usize, 32] {
            let kek = EncryptionKey::from_bytes(&vec![0x5a; len]).unwrap();
            let key = [0xc3u8; IMAGE_KEY_LEN];
            let wrapped = wrap_key(&kek, &key).unwrap();
            assert_ne!(wrapped, key);
            assert_eq!(unwrap_key(&kek, &wrapped).unwrap(), key);
        }
    }

    #[test]
    fn test_hardware_key_records_secret_id() {
        let key = EncryptionKey::from_bytes(&[1u8; 16]).unwrap();
        let plan = EncryptionPlan::HardwareKey { key, index: 3 };
        let mut body = vec![0u8; 48];
        let mut rng = StdRng::seed_from_u64(1);

        let tlvs = encrypt_body(&plan, &mut body, TlvTags::new(true), &mut rng).unwrap();
        assert_eq!(tlvs.len(), 2);
        assert_eq!(tlvs[0].kind, crate::tlv::TLV_LEGACY_NONCE);
        assert_eq!(tlvs[1].kind, crate::tlv::TLV_LEGACY_SECRET_ID);
        assert_eq!(tlvs[1].data, 3u32.to_le_bytes().to_vec());
        assert!(body.iter().any(|b| *b != 0));
    }

    #[test]
    fn test_wrapped_key_round_trip() {
        let kek = EncryptionKey::from_bytes(&[9u8; 32]).unwrap();
        let plan = EncryptionPlan::WrappedKey { kek: kek.clone() };
        let plain = b"0123456789abcdef0123".to_vec();
        let mut body = plain.clone();
        let mut rng = StdRng::seed_from_u64(7);

        let tlvs = encrypt_body(&plan, &mut body, TlvTags::new(false), &mut rng).unwrap();
        assert_eq!(tlvs[0].kind, TLV_ENC_KEY);
        let image_key = unwrap_key(&kek, &tlvs[0].data).unwrap();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&tlvs[1].data);

        apply_ctr(&image_key, &nonce, &mut body).unwrap();
        assert_eq!(body, plain);
    }
}
