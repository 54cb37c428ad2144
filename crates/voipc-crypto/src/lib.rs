//! Symmetric payload cipher for the streaming pipeline.
//!
//! AES-128-CTR with a password-derived key and a frame-id-derived IV. There is
//! no handshake and no authentication tag — a wrong password simply yields
//! garbage plaintext downstream, detected at the decoder by an invalid NAL
//! start code rather than by this crate.

use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use sha1::{Digest, Sha1};
use thiserror::Error;

type Aes128Ctr = Ctr128BE<Aes128>;

/// 128-bit AES key size, in bytes.
pub const KEY_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    /// Unreachable by construction: an empty password is mapped to "no
    /// cipher" by the caller before this crate ever sees it. Retained for
    /// API completeness, matching the reference's defensive style elsewhere.
    #[error("cipher key must not be empty")]
    EmptyKey,
}

/// Derive the 128-bit master key from a password.
///
/// `derive_key` is deterministic: SHA-1(password), first 16 bytes, no salt.
/// Identical passwords yield identical keys — this is a convenience key for
/// casual protection between two endpoints who already share a password out
/// of band, not an authenticated key-exchange protocol.
pub fn derive_key(password: &str) -> Result<[u8; KEY_SIZE], CipherError> {
    if password.is_empty() {
        return Err(CipherError::EmptyKey);
    }
    let digest = Sha1::digest(password.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest[..KEY_SIZE]);
    Ok(key)
}

/// Build the 16-byte CTR IV for one logical frame.
///
/// First 4 bytes: `frame_id` in network (big-endian) byte order. Remaining 12
/// bytes: zero. This is the one place the wire format deliberately diverges
/// from the header's little-endian `frame_id` encoding — both sides must
/// reproduce this exactly or the streams desync silently.
pub fn frame_iv(frame_id: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&frame_id.to_be_bytes());
    iv
}

/// Immutable AES-128 key schedule, built once and cloned by value into each
/// worker that needs to encrypt or decrypt frames.
#[derive(Clone)]
pub struct CipherContext {
    key: [u8; KEY_SIZE],
}

impl CipherContext {
    /// Build a cipher context from an already-derived 128-bit key.
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Derive a cipher context directly from a password.
    pub fn from_password(password: &str) -> Result<Self, CipherError> {
        Ok(Self::new(derive_key(password)?))
    }

    /// Encrypt `payload` in place for the given logical frame. Symmetric with
    /// [`CipherContext::decrypt_in_place`] — CTR mode is its own inverse.
    pub fn encrypt_in_place(&self, frame_id: u32, payload: &mut [u8]) {
        self.xcrypt_in_place(frame_id, payload);
    }

    /// Decrypt `payload` in place for the given logical frame.
    pub fn decrypt_in_place(&self, frame_id: u32, payload: &mut [u8]) {
        self.xcrypt_in_place(frame_id, payload);
    }

    fn xcrypt_in_place(&self, frame_id: u32, payload: &mut [u8]) {
        let iv = frame_iv(frame_id);
        let mut cipher = Aes128Ctr::new((&self.key).into(), (&iv).into());
        cipher.apply_keystream(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key("hunter2").unwrap();
        let b = derive_key("hunter2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_key_matches_sha1_prefix() {
        let key = derive_key("hello").unwrap();
        let digest = Sha1::digest(b"hello");
        assert_eq!(&key[..], &digest[..KEY_SIZE]);
    }

    #[test]
    fn derive_key_rejects_empty_password() {
        assert!(matches!(derive_key(""), Err(CipherError::EmptyKey)));
    }

    #[test]
    fn different_passwords_yield_different_keys() {
        let a = derive_key("alpha").unwrap();
        let b = derive_key("bravo").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn frame_iv_is_big_endian_frame_id_then_zeroes() {
        let iv = frame_iv(0x01020304);
        assert_eq!(&iv[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&iv[4..], &[0u8; 12]);
    }

    #[test]
    fn ctr_roundtrip() {
        let ctx = CipherContext::from_password("hello").unwrap();
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut buf = original.clone();
        ctx.encrypt_in_place(42, &mut buf);
        assert_ne!(buf, original);
        ctx.decrypt_in_place(42, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn wrong_key_yields_different_plaintext() {
        let enc = CipherContext::from_password("hello").unwrap();
        let dec = CipherContext::from_password("world").unwrap();
        let original = b"some video payload bytes, more than sixteen".to_vec();
        let mut buf = original.clone();
        enc.encrypt_in_place(7, &mut buf);
        dec.decrypt_in_place(7, &mut buf);
        assert_ne!(buf, original);
        assert_ne!(&buf[..3], &original[..3]);
    }

    #[test]
    fn distinct_frame_ids_never_share_an_iv() {
        let mut seen = std::collections::HashSet::new();
        for frame_id in 0u32..10_000 {
            assert!(seen.insert(frame_iv(frame_id)));
        }
    }

    #[test]
    fn empty_payload_roundtrips() {
        let ctx = CipherContext::from_password("pw").unwrap();
        let mut buf: Vec<u8> = Vec::new();
        ctx.encrypt_in_place(1, &mut buf);
        ctx.decrypt_in_place(1, &mut buf);
        assert!(buf.is_empty());
    }
}
