//! Length-preserving pseudorandom permutations.
//!
//! Two families are registered. `BitwiseFPEPRP` is a format-preserving,
//! Feistel-based construction in the FFX style: it permutes bit strings of
//! any length, odd lengths included, splitting the input into a
//! ⌈n/2⌉-bit high half and a ⌊n/2⌋-bit low half with no padding. The round
//! function is keyed HMAC whose output is expanded in counter mode and
//! truncated to the target half length. `LubyRackoffPRP` (and its concrete
//! `HmacLubyRackoffPRP` spelling) is the classic three-round Feistel over
//! even-length inputs, with the key split into three equal sub-keys.

use crate::bits::Bitset;
use crate::error::{Error, Result};
use crate::hash::HashName;
use crate::prf::{hmac_once, HmacPrf};

const FFX_ROUNDS: usize = 10;
const LUBY_RACKOFF_ROUNDS: usize = 3;

/// A pseudorandom permutation over a fixed-size bit-string domain,
/// selected by registry name.
#[derive(Clone, Debug)]
pub enum Prp {
    BitwiseFpe(BitwiseFfx),
    LubyRackoff(LubyRackoff),
}

impl Prp {
    /// Look up a PRP by registry name, for the given key and message sizes
    /// in bits.
    pub fn from_name(name: &str, key_bits: usize, msg_bits: usize) -> Result<Prp> {
        match name {
            "BitwiseFPEPRP" => Ok(Prp::BitwiseFpe(BitwiseFfx::new(key_bits, msg_bits)?)),
            "LubyRackoffPRP" | "HmacLubyRackoffPRP" => {
                Ok(Prp::LubyRackoff(LubyRackoff::new(key_bits, msg_bits)?))
            }
            _ => Err(Error::Config(format!("unknown PRP name {:?}", name))),
        }
    }

    /// The permutation's message size in bits.
    pub fn msg_bits(&self) -> usize {
        match self {
            Prp::BitwiseFpe(p) => p.msg_bits,
            Prp::LubyRackoff(p) => p.msg_bits,
        }
    }

    /// The permutation's message size in whole bytes (⌈bits/8⌉).
    pub fn msg_bytes(&self) -> usize {
        (self.msg_bits() + 7) / 8
    }

    /// Apply the permutation.
    pub fn encrypt(&self, key: &[u8], msg: &Bitset) -> Result<Bitset> {
        match self {
            Prp::BitwiseFpe(p) => p.encrypt(key, msg),
            Prp::LubyRackoff(p) => p.encrypt(key, msg),
        }
    }

    /// Invert the permutation.
    pub fn decrypt(&self, key: &[u8], msg: &Bitset) -> Result<Bitset> {
        match self {
            Prp::BitwiseFpe(p) => p.decrypt(key, msg),
            Prp::LubyRackoff(p) => p.decrypt(key, msg),
        }
    }
}

/// Format-preserving Feistel permutation over arbitrary bit lengths.
#[derive(Clone, Debug)]
pub struct BitwiseFfx {
    key_bits: usize,
    msg_bits: usize,
    rounds: usize,
    alg: HashName,
}

impl BitwiseFfx {
    pub fn new(key_bits: usize, msg_bits: usize) -> Result<BitwiseFfx> {
        if key_bits == 0 || key_bits % 8 != 0 {
            return Err(Error::Config(format!(
                "BitwiseFPEPRP key length must be a positive number of whole bytes, got {} bits",
                key_bits
            )));
        }
        if msg_bits < 2 {
            return Err(Error::Config(format!(
                "BitwiseFPEPRP message length must be at least 2 bits, got {}",
                msg_bits
            )));
        }
        Ok(BitwiseFfx {
            key_bits,
            msg_bits,
            rounds: FFX_ROUNDS,
            alg: HashName::Sha1,
        })
    }

    fn check(&self, key: &[u8], msg: &Bitset) -> Result<()> {
        if key.len() * 8 != self.key_bits {
            return Err(Error::LengthMismatch {
                what: "PRP key",
                expected: self.key_bits / 8,
                actual: key.len(),
            });
        }
        if msg.len() != self.msg_bits {
            return Err(Error::LengthMismatch {
                what: "PRP message",
                expected: self.msg_bits,
                actual: msg.len(),
            });
        }
        Ok(())
    }

    // High half gets the extra bit on odd lengths; no padding on either.
    fn split(v: &Bitset) -> (Bitset, Bitset) {
        let hi_len = (v.len() + 1) / 2;
        let lo_len = v.len() - hi_len;
        let hi = v.higher_bits(hi_len).expect("half of the length is in range");
        let lo = v.lower_bits(lo_len).expect("half of the length is in range");
        (hi, lo)
    }

    // Keyed HMAC over (round, |half|, half bits), expanded with a 4-byte
    // big-endian counter and truncated to the leading `out_bits`.
    fn round(&self, key: &[u8], round: usize, half: &Bitset, out_bits: usize) -> Bitset {
        let mut pre = Vec::with_capacity(8 + half.to_bytes().len());
        pre.extend_from_slice(&(round as u32).to_be_bytes());
        pre.extend_from_slice(&(half.len() as u32).to_be_bytes());
        pre.extend_from_slice(&half.to_bytes());
        let mut stream = Vec::new();
        let mut counter: u32 = 0;
        while stream.len() * 8 < out_bits {
            let mut input = pre.clone();
            input.extend_from_slice(&counter.to_be_bytes());
            stream.extend_from_slice(&hmac_once(self.alg, key, &input));
            counter += 1;
        }
        Bitset::from_bytes(&stream)
            .higher_bits(out_bits)
            .expect("keystream covers the output length")
    }

    pub fn encrypt(&self, key: &[u8], msg: &Bitset) -> Result<Bitset> {
        self.check(key, msg)?;
        let (mut a, mut b) = Self::split(msg);
        for i in 0..self.rounds {
            let c = a.xor(&self.round(key, i, &b, a.len()));
            a = b;
            b = c;
        }
        Ok(a.concat(&b))
    }

    pub fn decrypt(&self, key: &[u8], msg: &Bitset) -> Result<Bitset> {
        self.check(key, msg)?;
        let (mut a, mut b) = Self::split(msg);
        for i in (0..self.rounds).rev() {
            let new_b = a;
            let new_a = b.xor(&self.round(key, i, &new_b, b.len()));
            a = new_a;
            b = new_b;
        }
        Ok(a.concat(&b))
    }
}

/// Three-round Feistel permutation built from an HMAC PRF round function.
/// The key is split into three equal sub-keys, one per round; the message
/// length must be even and the halves are whole bytes.
#[derive(Clone, Debug)]
pub struct LubyRackoff {
    key_bits: usize,
    msg_bits: usize,
    prf: HmacPrf,
}

impl LubyRackoff {
    pub fn new(key_bits: usize, msg_bits: usize) -> Result<LubyRackoff> {
        if key_bits == 0 || key_bits % 24 != 0 {
            return Err(Error::Config(format!(
                "LubyRackoffPRP key length must split into three whole-byte sub-keys, got {} bits",
                key_bits
            )));
        }
        if msg_bits == 0 || msg_bits % 16 != 0 {
            return Err(Error::Config(format!(
                "LubyRackoffPRP message length must split into two whole-byte halves, got {} bits",
                msg_bits
            )));
        }
        let half = msg_bits / 16;
        let prf = HmacPrf::new(Some(half), Some(key_bits / 24), Some(half), HashName::Sha1)?;
        Ok(LubyRackoff {
            key_bits,
            msg_bits,
            prf,
        })
    }

    fn check(&self, key: &[u8], msg: &Bitset) -> Result<()> {
        if key.len() * 8 != self.key_bits {
            return Err(Error::LengthMismatch {
                what: "PRP key",
                expected: self.key_bits / 8,
                actual: key.len(),
            });
        }
        if msg.len() != self.msg_bits {
            return Err(Error::LengthMismatch {
                what: "PRP message",
                expected: self.msg_bits,
                actual: msg.len(),
            });
        }
        Ok(())
    }

    fn subkeys<'a>(&self, key: &'a [u8]) -> [&'a [u8]; LUBY_RACKOFF_ROUNDS] {
        let sub = key.len() / 3;
        [&key[..sub], &key[sub..2 * sub], &key[2 * sub..]]
    }

    pub fn encrypt(&self, key: &[u8], msg: &Bitset) -> Result<Bitset> {
        self.check(key, msg)?;
        let bytes = msg.to_bytes();
        let half = bytes.len() / 2;
        let mut left = bytes[..half].to_vec();
        let mut right = bytes[half..].to_vec();
        for sub in self.subkeys(key) {
            let mixed = crate::bytes::xor(&left, &self.prf.eval(sub, &right)?);
            left = right;
            right = mixed;
        }
        let mut out = left;
        out.extend_from_slice(&right);
        Ok(Bitset::from_bytes(&out))
    }

    pub fn decrypt(&self, key: &[u8], msg: &Bitset) -> Result<Bitset> {
        self.check(key, msg)?;
        let bytes = msg.to_bytes();
        let half = bytes.len() / 2;
        let mut left = bytes[..half].to_vec();
        let mut right = bytes[half..].to_vec();
        for sub in self.subkeys(key).iter().rev() {
            let unmixed = crate::bytes::xor(&right, &self.prf.eval(sub, &left)?);
            right = left;
            left = unmixed;
        }
        let mut out = left;
        out.extend_from_slice(&right);
        Ok(Bitset::from_bytes(&out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::urandom;
    use rand::rngs::OsRng;

    #[test]
    fn registry() {
        assert!(Prp::from_name("BitwiseFPEPRP", 128, 13).is_ok());
        assert!(Prp::from_name("LubyRackoffPRP", 192, 64).is_ok());
        assert!(Prp::from_name("HmacLubyRackoffPRP", 192, 64).is_ok());
        assert!(Prp::from_name("NoSuchPRP", 128, 64).is_err());
        // invalid shapes are configuration errors
        assert!(Prp::from_name("BitwiseFPEPRP", 7, 16).is_err());
        assert!(Prp::from_name("LubyRackoffPRP", 128, 64).is_err());
        assert!(Prp::from_name("LubyRackoffPRP", 192, 12).is_err());
    }

    #[test]
    fn ffx_round_trip_even_and_odd() {
        for msg_bits in [2usize, 7, 8, 13, 16, 57, 256] {
            let prp = BitwiseFfx::new(128, msg_bits).unwrap();
            let key = urandom(&mut OsRng, 16);
            for _ in 0..8 {
                let raw = urandom(&mut OsRng, (msg_bits + 7) / 8);
                let msg = Bitset::from_bytes(&raw).lower_bits(msg_bits).unwrap();
                let ct = prp.encrypt(&key, &msg).unwrap();
                assert_eq!(ct.len(), msg_bits);
                assert_eq!(prp.decrypt(&key, &ct).unwrap(), msg);
            }
        }
    }

    #[test]
    fn ffx_is_deterministic_and_keyed() {
        let prp = BitwiseFfx::new(128, 24).unwrap();
        let msg = Bitset::from_bytes(b"abc");
        let k1 = vec![1u8; 16];
        let k2 = vec![2u8; 16];
        assert_eq!(prp.encrypt(&k1, &msg).unwrap(), prp.encrypt(&k1, &msg).unwrap());
        assert_ne!(prp.encrypt(&k1, &msg).unwrap(), prp.encrypt(&k2, &msg).unwrap());
    }

    #[test]
    fn luby_rackoff_round_trip() {
        let prp = LubyRackoff::new(192, 64).unwrap();
        let key = urandom(&mut OsRng, 24);
        for _ in 0..8 {
            let msg = Bitset::from_bytes(&urandom(&mut OsRng, 8));
            let ct = prp.encrypt(&key, &msg).unwrap();
            assert_eq!(ct.len(), 64);
            assert_eq!(prp.decrypt(&key, &ct).unwrap(), msg);
        }
    }

    #[test]
    fn length_checks() {
        let prp = BitwiseFfx::new(128, 16).unwrap();
        let msg = Bitset::from_bytes(b"ab");
        assert!(matches!(
            prp.encrypt(&[0u8; 15], &msg),
            Err(Error::LengthMismatch { what: "PRP key", .. })
        ));
        let short = Bitset::from_bytes(b"a");
        assert!(matches!(
            prp.encrypt(&[0u8; 16], &short),
            Err(Error::LengthMismatch { what: "PRP message", .. })
        ));
    }
}
