//! Variable-length pseudorandom functions.
//!
//! The one registered implementation is `HmacPRF`: HMAC run through the
//! TLS-1.2 P_hash data expansion (RFC 5246 §5) so any output length can be
//! produced. With `A(0) = msg` and `A(i) = HMAC(key, A(i-1))`, the output
//! is `HMAC(key, A(1)‖msg) ‖ HMAC(key, A(2)‖msg) ‖ …` truncated to the
//! requested length.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{Error, Result};
use crate::hash::HashName;

pub(crate) fn hmac_once(alg: HashName, key: &[u8], data: &[u8]) -> Vec<u8> {
    match alg {
        HashName::Sha1 => {
            let mut mac =
                Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashName::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        HashName::Sha512 => {
            let mut mac =
                Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts keys of any length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        _ => unreachable!("XOFs are rejected at construction"),
    }
}

/// TLS-1.2 P_hash: expand `(key, msg)` into `output_len` bytes.
pub(crate) fn tls_p_hash(alg: HashName, key: &[u8], msg: &[u8], output_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(output_len);
    let mut a = hmac_once(alg, key, msg); // A(1)
    while out.len() < output_len {
        let mut input = a.clone();
        input.extend_from_slice(msg);
        out.extend_from_slice(&hmac_once(alg, key, &input));
        a = hmac_once(alg, key, &a);
    }
    out.truncate(output_len);
    out
}

/// The HMAC function used as a PRF, with fixed output length and optional
/// key and message length constraints.
#[derive(Clone, Debug)]
pub struct HmacPrf {
    output_len: usize,
    key_len: Option<usize>,
    msg_len: Option<usize>,
    alg: HashName,
}

impl HmacPrf {
    /// Build an HMAC PRF. `output_len` defaults to the digest size of the
    /// underlying hash, which must not be an XOF.
    pub fn new(
        output_len: Option<usize>,
        key_len: Option<usize>,
        msg_len: Option<usize>,
        alg: HashName,
    ) -> Result<HmacPrf> {
        if alg.is_xof() {
            return Err(Error::Config(format!(
                "HmacPRF cannot run over the extendable-output hash {:?}",
                alg
            )));
        }
        Ok(HmacPrf {
            output_len: output_len.unwrap_or_else(|| alg.digest_size()),
            key_len,
            msg_len,
            alg,
        })
    }

    /// Look up a PRF by registry name. The underlying hash defaults to
    /// SHA-1 for compatibility with the published schemes.
    pub fn from_name(
        name: &str,
        output_len: Option<usize>,
        key_len: Option<usize>,
        msg_len: Option<usize>,
    ) -> Result<HmacPrf> {
        match name {
            "HmacPRF" => HmacPrf::new(output_len, key_len, msg_len, HashName::Sha1),
            _ => Err(Error::Config(format!("unknown PRF name {:?}", name))),
        }
    }

    /// The configured output length in bytes.
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Evaluate the PRF. Key and message lengths are checked against the
    /// configuration when constrained.
    pub fn eval(&self, key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        if let Some(expected) = self.key_len {
            if key.len() != expected {
                return Err(Error::LengthMismatch {
                    what: "PRF key",
                    expected,
                    actual: key.len(),
                });
            }
        }
        if let Some(expected) = self.msg_len {
            if msg.len() != expected {
                return Err(Error::LengthMismatch {
                    what: "PRF message",
                    expected,
                    actual: msg.len(),
                });
            }
        }
        Ok(tls_p_hash(self.alg, key, msg, self.output_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry() {
        assert!(HmacPrf::from_name("HmacPRF", Some(32), None, None).is_ok());
        assert!(HmacPrf::from_name("NoSuchPRF", Some(32), None, None).is_err());
        assert!(HmacPrf::new(Some(32), None, None, HashName::Shake128).is_err());
    }

    #[test]
    fn output_lengths() {
        let prf = HmacPrf::new(Some(52), None, None, HashName::Sha1).unwrap();
        assert_eq!(prf.eval(b"key", b"message").unwrap().len(), 52);
        let prf = HmacPrf::new(None, None, None, HashName::Sha256).unwrap();
        assert_eq!(prf.eval(b"key", b"message").unwrap().len(), 32);
    }

    #[test]
    fn deterministic_and_keyed() {
        let prf = HmacPrf::new(Some(32), None, None, HashName::Sha1).unwrap();
        let a = prf.eval(b"k1", b"m").unwrap();
        let b = prf.eval(b"k1", b"m").unwrap();
        let c = prf.eval(b"k2", b"m").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn expansion_prefix_property() {
        let short = HmacPrf::new(Some(10), None, None, HashName::Sha1).unwrap();
        let long = HmacPrf::new(Some(50), None, None, HashName::Sha1).unwrap();
        let s = short.eval(b"key", b"msg").unwrap();
        let l = long.eval(b"key", b"msg").unwrap();
        assert_eq!(&l[..10], &s[..]);
    }

    #[test]
    fn length_constraints() {
        let prf = HmacPrf::new(Some(16), Some(4), Some(3), HashName::Sha1).unwrap();
        assert!(prf.eval(b"abcd", b"xyz").is_ok());
        assert!(matches!(
            prf.eval(b"abc", b"xyz"),
            Err(Error::LengthMismatch { what: "PRF key", .. })
        ));
        assert!(matches!(
            prf.eval(b"abcd", b"xy"),
            Err(Error::LengthMismatch { what: "PRF message", .. })
        ));
    }

    #[test]
    fn p_hash_matches_hand_computation() {
        // One block of P_SHA1: HMAC(key, A(1) ‖ msg) with A(1) = HMAC(key, msg)
        let key = b"secret";
        let msg = b"label";
        let a1 = hmac_once(HashName::Sha1, key, msg);
        let mut block_in = a1.clone();
        block_in.extend_from_slice(msg);
        let expect = hmac_once(HashName::Sha1, key, &block_in);
        let prf = HmacPrf::new(Some(20), None, None, HashName::Sha1).unwrap();
        assert_eq!(prf.eval(key, msg).unwrap(), expect);
    }
}
