//! Passphrase sealing for the data file.
//!
//! Layout: `HEADER (8) || memory KiB (u32 LE) || passes (u32 LE) || salt (16)
//! || nonce (12) || ciphertext+tag`. Everything before the salt is
//! authenticated as associated data, so a file written by a different format
//! version or with edited KDF parameters fails to open.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

const HEADER: &[u8; 8] = b"CYCAST\x00\x01";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

const COST_LEN: usize = 8;
const PREAMBLE_LEN: usize = 8 + COST_LEN;
/// Refuse to derive keys for files claiming more than 1 GiB of KDF memory.
const MAX_MEMORY_KIB: u32 = 1024 * 1024;

/// Argon2id work factors, stored in the file so it can be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfCost {
    pub memory_kib: u32,
    pub passes: u32,
}

impl Default for KdfCost {
    /// 64 MiB, 3 passes.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            passes: 3,
        }
    }
}

impl KdfCost {
    /// Cheap parameters for tests and throwaway stores.
    pub fn light() -> Self {
        Self {
            memory_kib: 256,
            passes: 1,
        }
    }

    fn to_bytes(self) -> [u8; COST_LEN] {
        let mut out = [0u8; COST_LEN];
        out[..4].copy_from_slice(&self.memory_kib.to_le_bytes());
        out[4..].copy_from_slice(&self.passes.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let memory_kib = u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?);
        let passes = u32::from_le_bytes(bytes.get(4..COST_LEN)?.try_into().ok()?);
        (memory_kib <= MAX_MEMORY_KIB).then_some(Self { memory_kib, passes })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("wrong passphrase or corrupted data")]
    Decryption,
    #[error("not a cyclecast data file")]
    InvalidFormat,
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    cost: KdfCost,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(cost.memory_kib, cost.passes, 1, Some(KEY_LEN))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// Encrypt `plaintext` under a fresh salt and nonce.
pub fn seal(passphrase: &str, plaintext: &[u8], cost: KdfCost) -> Result<Vec<u8>, CryptoError> {
    let mut preamble = Vec::with_capacity(PREAMBLE_LEN);
    preamble.extend_from_slice(HEADER);
    preamble.extend_from_slice(&cost.to_bytes());

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt, cost)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Encryption)?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &preamble,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut sealed = preamble;
    sealed.reserve(SALT_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Reverse of [`seal`]. The returned buffer is wiped when dropped.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if !sealed.starts_with(HEADER) || sealed.len() < PREAMBLE_LEN + SALT_LEN + NONCE_LEN {
        return Err(CryptoError::InvalidFormat);
    }
    let (preamble, body) = sealed.split_at(PREAMBLE_LEN);
    let cost = KdfCost::from_bytes(&preamble[HEADER.len()..]).ok_or(CryptoError::InvalidFormat)?;
    let (salt, rest) = body.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(passphrase, salt, cost)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Decryption)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: preamble,
            },
        )
        .map_err(|_| CryptoError::Decryption)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_data_opens_with_same_passphrase() {
        let sealed = seal("correct horse", b"period history", KdfCost::default()).unwrap();
        assert!(sealed.starts_with(HEADER));
        let opened = open("correct horse", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"period history");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal("correct", b"secret", KdfCost::light()).unwrap();
        assert!(matches!(
            open("wrong", &sealed),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn foreign_bytes_are_rejected() {
        assert!(matches!(
            open("any", &[0u8; 64]),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            open("any", HEADER),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut sealed = seal("pass", b"data", KdfCost::light()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(open("pass", &sealed).is_err());
    }

    #[test]
    fn edited_cost_fails_authentication() {
        let mut sealed = seal("pass", b"data", KdfCost::light()).unwrap();
        // bump the pass count stored after the magic bytes
        sealed[HEADER.len() + 4] = 2;
        assert!(matches!(
            open("pass", &sealed),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn oversized_cost_is_rejected() {
        let mut sealed = seal("pass", b"data", KdfCost::light()).unwrap();
        sealed[HEADER.len()..HEADER.len() + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            open("pass", &sealed),
            Err(CryptoError::InvalidFormat)
        ));
    }
}
