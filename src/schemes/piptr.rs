//! ΠPtr (Cash et al., CJJ+14): encrypted id-blocks in an array, reached
//! through encrypted pointer-blocks in a dictionary.
//!
//! The array is 1-based — index 0 is reserved so that a zero pointer can
//! act as the padding sentinel inside pointer-blocks. Blocks are placed at
//! uniformly random free slots, so by the end of setup every slot except 0
//! holds a ciphertext.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::blocks::{parse_by_count, parse_by_id_size, partition};
use crate::bytes::{ceil_log2, int_from_bytes, int_to_bytes, int_to_bytes_min};
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prf::HmacPrf;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Cash2014PiPtr";

/// Raw ΠPtr configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiPtrParams {
    /// Security parameter λ: key size in bytes
    pub param_lambda: usize,
    /// Identifiers packed into one array block
    #[serde(rename = "param_B")]
    pub param_b_ids: usize,
    /// Pointers packed into one dictionary block
    #[serde(rename = "param_b")]
    pub param_b_ptrs: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// Output length of the PRF f in bytes
    pub prf_f_output_length: usize,
    /// PRF name
    pub prf_f: String,
    /// SKE name
    pub ske: String,
}

impl Default for PiPtrParams {
    fn default() -> PiPtrParams {
        PiPtrParams {
            param_lambda: 32,
            param_b_ids: 64,
            param_b_ptrs: 64,
            param_identifier_size: 8,
            prf_f_output_length: 32,
            prf_f: "HmacPRF".into(),
            ske: "AES-CBC".into(),
        }
    }
}

/// The ΠPtr scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct PiPtr {
    lambda: usize,
    id_block_entries: usize,
    ptr_block_entries: usize,
    id_size: usize,
    prf_f: HmacPrf,
    ske: AesCbc,
}

impl PiPtr {
    pub fn new(params: PiPtrParams) -> Result<PiPtr> {
        if params.param_b_ids == 0 || params.param_b_ptrs == 0 {
            return Err(Error::Config("param_B and param_b must be positive".into()));
        }
        let prf_f = HmacPrf::from_name(
            &params.prf_f,
            Some(params.prf_f_output_length),
            Some(params.param_lambda),
            None,
        )?;
        let ske = AesCbc::from_name(&params.ske, params.param_lambda)?;
        Ok(PiPtr {
            lambda: params.param_lambda,
            id_block_entries: params.param_b_ids,
            ptr_block_entries: params.param_b_ptrs,
            id_size: params.param_identifier_size,
            prf_f,
            ske,
        })
    }

    pub fn from_json(json: &str) -> Result<PiPtr> {
        let params: PiPtrParams =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        PiPtr::new(params)
    }

    fn keyword_keys(&self, k: &[u8], keyword: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut tagged = vec![0x01u8];
        tagged.extend_from_slice(keyword);
        let k1 = self.prf_f.eval(k, &tagged)?;
        tagged[0] = 0x02;
        let k2 = self.prf_f.eval(k, &tagged)?;
        Ok((k1, k2))
    }
}

/// ΠPtr master key.
#[derive(Clone, Debug)]
pub struct PiPtrKey {
    k: Vec<u8>,
}

impl PartialEq for PiPtrKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k, &other.k)
    }
}

impl Eq for PiPtrKey {}

impl PiPtrKey {
    pub fn serialize(&self) -> Vec<u8> {
        self.k.clone()
    }

    pub fn deserialize(bytes: &[u8], scheme: &PiPtr) -> Result<PiPtrKey> {
        if bytes.len() != scheme.lambda {
            return Err(Error::LengthMismatch {
                what: "PiPtr key",
                expected: scheme.lambda,
                actual: bytes.len(),
            });
        }
        Ok(PiPtrKey { k: bytes.to_vec() })
    }
}

/// ΠPtr search token.
#[derive(Clone, Debug)]
pub struct PiPtrToken {
    k1: Vec<u8>,
    k2: Vec<u8>,
}

impl PartialEq for PiPtrToken {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
    }
}

impl Eq for PiPtrToken {}

impl PiPtrToken {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &PiPtr) -> Result<PiPtrToken> {
        let part = scheme.prf_f.output_len();
        if bytes.len() != 2 * part {
            return Err(Error::LengthMismatch {
                what: "PiPtr token",
                expected: 2 * part,
                actual: bytes.len(),
            });
        }
        Ok(PiPtrToken {
            k1: bytes[..part].to_vec(),
            k2: bytes[part..].to_vec(),
        })
    }
}

/// ΠPtr encrypted database: the pointer dictionary plus the id-block
/// array. Slot 0 of the array is reserved and stays empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PiPtrEdb {
    d: HashMap<Vec<u8>, Vec<u8>>,
    a: Vec<Vec<u8>>,
}

impl PiPtrEdb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.d);
        encode::write_array(&mut buf, &self.a);
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &PiPtr) -> Result<PiPtrEdb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let d = encode::read_map(&mut input, "PiPtr dictionary")?;
        let a = encode::read_array(&mut input, "PiPtr array")?;
        encode::done(input, "PiPtr array")?;
        Ok(PiPtrEdb { d, a })
    }
}

impl InvertedIndexSse for PiPtr {
    type Key = PiPtrKey;
    type Edb = PiPtrEdb;
    type Token = PiPtrToken;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<PiPtrKey> {
        Ok(PiPtrKey {
            k: urandom(rng, self.lambda),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &PiPtrKey,
        db: &Database,
        rng: &mut R,
    ) -> Result<PiPtrEdb> {
        let total_blocks: usize = db
            .iter()
            .map(|(_, ids)| (ids.len() + self.id_block_entries - 1) / self.id_block_entries)
            .sum();
        let a_len = total_blocks + 1;
        let index_size = (ceil_log2(a_len) + 7) / 8;
        log::debug!(
            "PiPtr setup: {} id-blocks, {}-byte array indices",
            total_blocks,
            index_size
        );

        let mut positions: Vec<usize> = (1..a_len).collect();
        positions.shuffle(rng);

        let mut a: Vec<Option<Vec<u8>>> = vec![None; a_len];
        let mut d = HashMap::new();
        for (keyword, ids) in db.iter() {
            let (k1, k2) = self.keyword_keys(&key.k, keyword)?;
            let mut pointers = Vec::new();
            for block in partition(ids, self.id_block_entries, self.id_size, None)? {
                let slot = positions
                    .pop()
                    .expect("the position list is sized to the block count");
                pointers.push(int_to_bytes(slot as u64, index_size)?);
                a[slot] = Some(self.ske.encrypt(&k2, &block, rng)?);
            }
            let ptr_blocks = partition(&pointers, self.ptr_block_entries, index_size, None)?;
            for (c, ptr_block) in ptr_blocks.enumerate() {
                let label = self.prf_f.eval(&k1, &int_to_bytes_min(c as u64))?;
                d.insert(label, self.ske.encrypt(&k2, &ptr_block, rng)?);
            }
        }
        let a = a
            .into_iter()
            .map(|slot| slot.unwrap_or_default())
            .collect();
        Ok(PiPtrEdb { d, a })
    }

    fn token_gen(&self, key: &PiPtrKey, keyword: &[u8]) -> Result<PiPtrToken> {
        let (k1, k2) = self.keyword_keys(&key.k, keyword)?;
        Ok(PiPtrToken { k1, k2 })
    }

    fn search(&self, edb: &PiPtrEdb, token: &PiPtrToken) -> Result<IdList> {
        let mut pointers = Vec::new();
        for c in 0u64.. {
            let label = self.prf_f.eval(&token.k1, &int_to_bytes_min(c))?;
            match edb.d.get(&label) {
                None => break,
                Some(cell) => {
                    let block = self.ske.decrypt(&token.k2, cell)?;
                    pointers.extend(parse_by_count(&block, self.ptr_block_entries));
                }
            }
        }
        let mut result = Vec::new();
        for pointer in pointers {
            let slot = int_from_bytes(&pointer)? as usize;
            let cell = edb.a.get(slot).ok_or(Error::Decryption)?;
            let block = self.ske.decrypt(&token.k2, cell)?;
            result.extend(parse_by_id_size(&block, self.id_size));
        }
        Ok(IdList(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::testing::fake_db;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_scheme() -> PiPtr {
        PiPtr::new(PiPtrParams {
            param_b_ids: 3,
            param_b_ptrs: 2,
            ..PiPtrParams::default()
        })
        .unwrap()
    }

    #[test]
    fn round_trip_across_block_shapes() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(11);
        // posting lists long enough to need several pointer blocks
        let db = fake_db(&mut rng, 10, 8, 25, (1, 20));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        for (keyword, ids) in db.iter() {
            let token = scheme.token_gen(&key, keyword).unwrap();
            assert_eq!(&scheme.search(&edb, &token).unwrap().0, ids);
        }
    }

    #[test]
    fn slot_zero_is_reserved() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(12);
        let db = fake_db(&mut rng, 10, 8, 8, (1, 6));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        assert!(edb.a[0].is_empty());
        assert!(edb.a[1..].iter().all(|slot| !slot.is_empty()));
    }

    #[test]
    fn absent_keyword_is_empty() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(13);
        let db = fake_db(&mut rng, 10, 8, 5, (1, 5));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"absent").unwrap();
        assert!(scheme.search(&edb, &token).unwrap().is_empty());
    }

    #[test]
    fn serialization_round_trips() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(14);
        let db = fake_db(&mut rng, 10, 8, 6, (1, 8));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"whatever").unwrap();
        assert_eq!(PiPtrKey::deserialize(&key.serialize(), &scheme).unwrap(), key);
        assert_eq!(PiPtrEdb::deserialize(&edb.serialize(), &scheme).unwrap(), edb);
        assert_eq!(PiPtrToken::deserialize(&token.serialize(), &scheme).unwrap(), token);
    }
}
