//! ΠPack (Cash et al., CJJ+14): ΠBas with identifiers packed B to a cell.
//!
//! Identifiers are fixed-size here, and the all-zero identifier is
//! reserved: the last block of each keyword is zero-padded and parsing
//! stops at the first all-zero slot.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::blocks::{parse_by_id_size, partition};
use crate::bytes::int_to_bytes_min;
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prf::HmacPrf;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Cash2014PiPack";

/// Raw ΠPack configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiPackParams {
    /// Security parameter λ: key size in bytes
    pub param_lambda: usize,
    /// Identifiers packed into one block
    #[serde(rename = "param_B")]
    pub param_b: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// Output length of the PRF f in bytes
    pub prf_f_output_length: usize,
    /// PRF name
    pub prf_f: String,
    /// SKE name
    pub ske: String,
}

impl Default for PiPackParams {
    fn default() -> PiPackParams {
        PiPackParams {
            param_lambda: 32,
            param_b: 64,
            param_identifier_size: 8,
            prf_f_output_length: 32,
            prf_f: "HmacPRF".into(),
            ske: "AES-CBC".into(),
        }
    }
}

/// The ΠPack scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct PiPack {
    lambda: usize,
    block_entries: usize,
    id_size: usize,
    prf_f: HmacPrf,
    ske: AesCbc,
}

impl PiPack {
    pub fn new(params: PiPackParams) -> Result<PiPack> {
        if params.param_b == 0 {
            return Err(Error::Config("param_B must be positive".into()));
        }
        let prf_f = HmacPrf::from_name(
            &params.prf_f,
            Some(params.prf_f_output_length),
            Some(params.param_lambda),
            None,
        )?;
        let ske = AesCbc::from_name(&params.ske, params.param_lambda)?;
        Ok(PiPack {
            lambda: params.param_lambda,
            block_entries: params.param_b,
            id_size: params.param_identifier_size,
            prf_f,
            ske,
        })
    }

    pub fn from_json(json: &str) -> Result<PiPack> {
        let params: PiPackParams =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        PiPack::new(params)
    }

    fn keyword_keys(&self, key: &PiPackKey, keyword: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut tagged = vec![0x01u8];
        tagged.extend_from_slice(keyword);
        let k1 = self.prf_f.eval(&key.k, &tagged)?;
        tagged[0] = 0x02;
        let k2 = self.prf_f.eval(&key.k, &tagged)?;
        Ok((k1, k2))
    }
}

/// ΠPack master key.
#[derive(Clone, Debug)]
pub struct PiPackKey {
    k: Vec<u8>,
}

impl PartialEq for PiPackKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k, &other.k)
    }
}

impl Eq for PiPackKey {}

impl PiPackKey {
    pub fn serialize(&self) -> Vec<u8> {
        self.k.clone()
    }

    pub fn deserialize(bytes: &[u8], scheme: &PiPack) -> Result<PiPackKey> {
        if bytes.len() != scheme.lambda {
            return Err(Error::LengthMismatch {
                what: "PiPack key",
                expected: scheme.lambda,
                actual: bytes.len(),
            });
        }
        Ok(PiPackKey { k: bytes.to_vec() })
    }
}

/// ΠPack search token, identical in shape to the ΠBas one.
#[derive(Clone, Debug)]
pub struct PiPackToken {
    k1: Vec<u8>,
    k2: Vec<u8>,
}

impl PartialEq for PiPackToken {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
    }
}

impl Eq for PiPackToken {}

impl PiPackToken {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &PiPack) -> Result<PiPackToken> {
        let part = scheme.prf_f.output_len();
        if bytes.len() != 2 * part {
            return Err(Error::LengthMismatch {
                what: "PiPack token",
                expected: 2 * part,
                actual: bytes.len(),
            });
        }
        Ok(PiPackToken {
            k1: bytes[..part].to_vec(),
            k2: bytes[part..].to_vec(),
        })
    }
}

/// ΠPack encrypted database: one dictionary of encrypted blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PiPackEdb {
    d: HashMap<Vec<u8>, Vec<u8>>,
}

impl PiPackEdb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.d);
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &PiPack) -> Result<PiPackEdb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let d = encode::read_map(&mut input, "PiPack dictionary")?;
        encode::done(input, "PiPack dictionary")?;
        Ok(PiPackEdb { d })
    }
}

impl InvertedIndexSse for PiPack {
    type Key = PiPackKey;
    type Edb = PiPackEdb;
    type Token = PiPackToken;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<PiPackKey> {
        Ok(PiPackKey {
            k: urandom(rng, self.lambda),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &PiPackKey,
        db: &Database,
        rng: &mut R,
    ) -> Result<PiPackEdb> {
        let mut d = HashMap::new();
        for (keyword, ids) in db.iter() {
            let (k1, k2) = self.keyword_keys(key, keyword)?;
            let blocks = partition(ids, self.block_entries, self.id_size, None)?;
            for (c, block) in blocks.enumerate() {
                let label = self.prf_f.eval(&k1, &int_to_bytes_min(c as u64))?;
                d.insert(label, self.ske.encrypt(&k2, &block, rng)?);
            }
        }
        log::debug!(
            "PiPack setup: {} keywords packed into {} blocks",
            db.keyword_count(),
            d.len()
        );
        Ok(PiPackEdb { d })
    }

    fn token_gen(&self, key: &PiPackKey, keyword: &[u8]) -> Result<PiPackToken> {
        let (k1, k2) = self.keyword_keys(key, keyword)?;
        Ok(PiPackToken { k1, k2 })
    }

    fn search(&self, edb: &PiPackEdb, token: &PiPackToken) -> Result<IdList> {
        let mut result = Vec::new();
        for c in 0u64.. {
            let label = self.prf_f.eval(&token.k1, &int_to_bytes_min(c))?;
            match edb.d.get(&label) {
                None => break,
                Some(cell) => {
                    let block = self.ske.decrypt(&token.k2, cell)?;
                    result.extend(parse_by_id_size(&block, self.id_size));
                }
            }
        }
        Ok(IdList(result))
    }
}
