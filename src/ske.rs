//! IND-CPA symmetric encryption.
//!
//! The registered implementation is AES-CBC with PKCS#7 padding and a
//! fresh 16-byte IV prepended to every ciphertext, so the ciphertext
//! length is deterministic in the plaintext length:
//! `16 + 16·⌈(|m|+1)/16⌉`. Any IND-CPA scheme of the same shape could be
//! substituted.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::random::urandom;

const BLOCK: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES in CBC mode with PKCS#7 padding and a random prepended IV.
#[derive(Clone, Debug)]
pub struct AesCbc {
    key_len: usize,
}

impl AesCbc {
    /// Build an instance for the given key length (16, 24, or 32 bytes).
    pub fn new(key_len: usize) -> Result<AesCbc> {
        if !matches!(key_len, 16 | 24 | 32) {
            return Err(Error::Config(format!(
                "AES key length must be 16, 24 or 32 bytes, got {}",
                key_len
            )));
        }
        Ok(AesCbc { key_len })
    }

    /// Look up an SKE scheme by registry name.
    pub fn from_name(name: &str, key_len: usize) -> Result<AesCbc> {
        match name {
            "AES-CBC" => AesCbc::new(key_len),
            _ => Err(Error::Config(format!("unknown SKE name {:?}", name))),
        }
    }

    /// The configured key length in bytes.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Sample a uniformly random key.
    pub fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        urandom(rng, self.key_len)
    }

    /// The exact ciphertext length produced for a plaintext of `msg_len`
    /// bytes.
    pub fn ciphertext_len(&self, msg_len: usize) -> usize {
        BLOCK + BLOCK * (msg_len / BLOCK + 1)
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_len {
            return Err(Error::LengthMismatch {
                what: "SKE key",
                expected: self.key_len,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Encrypt under a fresh random IV, returning `IV ‖ ciphertext`.
    pub fn encrypt<R: RngCore + ?Sized>(
        &self,
        key: &[u8],
        msg: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        self.check_key(key)?;
        let iv = urandom(rng, BLOCK);
        let body = match self.key_len {
            16 => Aes128CbcEnc::new_from_slices(key, &iv)
                .expect("key and IV lengths already checked")
                .encrypt_padded_vec_mut::<Pkcs7>(msg),
            24 => Aes192CbcEnc::new_from_slices(key, &iv)
                .expect("key and IV lengths already checked")
                .encrypt_padded_vec_mut::<Pkcs7>(msg),
            _ => Aes256CbcEnc::new_from_slices(key, &iv)
                .expect("key and IV lengths already checked")
                .encrypt_padded_vec_mut::<Pkcs7>(msg),
        };
        let mut out = iv;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Split off the IV, decrypt, and strip the padding. Any padding or
    /// length fault is reported as a decryption error.
    pub fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.check_key(key)?;
        if ciphertext.len() < 2 * BLOCK || (ciphertext.len() - BLOCK) % BLOCK != 0 {
            return Err(Error::Decryption);
        }
        let (iv, body) = ciphertext.split_at(BLOCK);
        let out = match self.key_len {
            16 => Aes128CbcDec::new_from_slices(key, iv)
                .expect("key and IV lengths already checked")
                .decrypt_padded_vec_mut::<Pkcs7>(body),
            24 => Aes192CbcDec::new_from_slices(key, iv)
                .expect("key and IV lengths already checked")
                .decrypt_padded_vec_mut::<Pkcs7>(body),
            _ => Aes256CbcDec::new_from_slices(key, iv)
                .expect("key and IV lengths already checked")
                .decrypt_padded_vec_mut::<Pkcs7>(body),
        };
        out.map_err(|_| Error::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn key_lengths() {
        assert!(AesCbc::new(16).is_ok());
        assert!(AesCbc::new(24).is_ok());
        assert!(AesCbc::new(32).is_ok());
        assert!(AesCbc::new(20).is_err());
        assert!(AesCbc::from_name("AES-CBC", 16).is_ok());
        assert!(AesCbc::from_name("DES-CBC", 16).is_err());
    }

    #[test]
    fn round_trip_all_key_sizes() {
        for key_len in [16usize, 24, 32] {
            let ske = AesCbc::new(key_len).unwrap();
            let key = ske.key_gen(&mut OsRng);
            for msg_len in [0usize, 1, 15, 16, 17, 100] {
                let msg = vec![0xA5u8; msg_len];
                let ct = ske.encrypt(&key, &msg, &mut OsRng).unwrap();
                assert_eq!(ct.len(), ske.ciphertext_len(msg_len));
                assert_eq!(ske.decrypt(&key, &ct).unwrap(), msg);
            }
        }
    }

    #[test]
    fn fresh_ivs_randomize_ciphertexts() {
        let ske = AesCbc::new(16).unwrap();
        let key = ske.key_gen(&mut OsRng);
        let a = ske.encrypt(&key, b"same message", &mut OsRng).unwrap();
        let b = ske.encrypt(&key, b"same message", &mut OsRng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn faults() {
        let ske = AesCbc::new(16).unwrap();
        let key = ske.key_gen(&mut OsRng);
        let ct = ske.encrypt(&key, b"hello", &mut OsRng).unwrap();
        // truncated and misaligned ciphertexts
        assert_eq!(ske.decrypt(&key, &ct[..16]), Err(Error::Decryption));
        assert_eq!(ske.decrypt(&key, &ct[..ct.len() - 1]), Err(Error::Decryption));
        // wrong key is overwhelmingly a padding fault
        let other = ske.key_gen(&mut OsRng);
        if let Ok(pt) = ske.decrypt(&other, &ct) {
            assert_ne!(pt, b"hello".to_vec());
        }
        // wrong key length is a contract violation, not a decryption fault
        assert!(matches!(
            ske.decrypt(&key[..15], &ct),
            Err(Error::LengthMismatch { .. })
        ));
    }
}
