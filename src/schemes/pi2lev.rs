//! Π2Lev (Cash et al., CJJ+14): the two-level, three-case layout.
//!
//! Small posting lists are packed straight into the dictionary; medium
//! lists put their id-blocks in the array with one block of pointers in
//! the dictionary; large lists add a second level of pointer-blocks in
//! the array. Every stored block carries a one-byte tag telling the
//! search walk whether it is looking at identifiers (0x00) or at array
//! pointers (0x01), so the descent is at most three levels deep.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::blocks::{parse_by_count, partition};
use crate::bytes::{int_from_bytes, int_to_bytes};
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prf::HmacPrf;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Cash2014Pi2Lev";

/// Tag byte for blocks holding file identifiers.
const TAG_IDS: u8 = 0x00;
/// Tag byte for blocks holding pointers into the array.
const TAG_PTRS: u8 = 0x01;

/// Raw Π2Lev configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pi2LevParams {
    /// Security parameter λ: key size in bytes
    pub param_lambda: usize,
    /// Identifiers per array block
    #[serde(rename = "param_B")]
    pub param_b_array: usize,
    /// Identifiers per dictionary block
    #[serde(rename = "param_b")]
    pub param_b_dict: usize,
    /// Pointers per array pointer-block
    #[serde(rename = "param_B_prime")]
    pub param_b_prime_array: usize,
    /// Pointers per dictionary pointer-block
    #[serde(rename = "param_b_prime")]
    pub param_b_prime_dict: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// Output length of the PRF f in bytes
    pub prf_f_output_length: usize,
    /// PRF name
    pub prf_f: String,
    /// SKE name
    pub ske: String,
}

impl Default for Pi2LevParams {
    fn default() -> Pi2LevParams {
        Pi2LevParams {
            param_lambda: 32,
            param_b_array: 64,
            param_b_dict: 64,
            param_b_prime_array: 64,
            param_b_prime_dict: 64,
            param_identifier_size: 8,
            prf_f_output_length: 32,
            prf_f: "HmacPRF".into(),
            ske: "AES-CBC".into(),
        }
    }
}

/// The Π2Lev scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct Pi2Lev {
    lambda: usize,
    b_array: usize,
    b_dict: usize,
    b_prime_array: usize,
    b_prime_dict: usize,
    id_size: usize,
    index_size: usize,
    prf_f: HmacPrf,
    ske: AesCbc,
}

impl Pi2Lev {
    pub fn new(params: Pi2LevParams) -> Result<Pi2Lev> {
        if params.param_b_array == 0
            || params.param_b_dict == 0
            || params.param_b_prime_array == 0
            || params.param_b_prime_dict == 0
        {
            return Err(Error::Config("all block sizes must be positive".into()));
        }
        // both pointer shapes must agree on the array index size
        let array_side = params.param_b_array * params.param_identifier_size;
        let dict_side = params.param_b_dict * params.param_identifier_size;
        if array_side % params.param_b_prime_array != 0
            || dict_side % params.param_b_prime_dict != 0
            || array_side / params.param_b_prime_array != dict_side / params.param_b_prime_dict
        {
            return Err(Error::Config(
                "require (param_B * param_identifier_size) / param_B_prime == \
                 (param_b * param_identifier_size) / param_b_prime"
                    .into(),
            ));
        }
        let prf_f = HmacPrf::from_name(
            &params.prf_f,
            Some(params.prf_f_output_length),
            Some(params.param_lambda),
            None,
        )?;
        let ske = AesCbc::from_name(&params.ske, params.param_lambda)?;
        Ok(Pi2Lev {
            lambda: params.param_lambda,
            b_array: params.param_b_array,
            b_dict: params.param_b_dict,
            b_prime_array: params.param_b_prime_array,
            b_prime_dict: params.param_b_prime_dict,
            id_size: params.param_identifier_size,
            index_size: array_side / params.param_b_prime_array,
            prf_f,
            ske,
        })
    }

    pub fn from_json(json: &str) -> Result<Pi2Lev> {
        let params: Pi2LevParams =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        Pi2Lev::new(params)
    }

    fn keyword_keys(&self, k: &[u8], keyword: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut tagged = vec![0x01u8];
        tagged.extend_from_slice(keyword);
        let k1 = self.prf_f.eval(k, &tagged)?;
        tagged[0] = 0x02;
        let k2 = self.prf_f.eval(k, &tagged)?;
        Ok((k1, k2))
    }

    fn dict_block_size(&self) -> usize {
        self.b_dict * self.id_size
    }

    fn array_block_size(&self) -> usize {
        self.b_array * self.id_size
    }

    /// Zero-pad `content` to the dictionary block size and prepend `tag`.
    fn tagged_dict_block(&self, tag: u8, content: &[u8]) -> Vec<u8> {
        let mut block = Vec::with_capacity(1 + self.dict_block_size());
        block.push(tag);
        block.extend_from_slice(content);
        block.resize(1 + self.dict_block_size(), 0);
        block
    }

    fn large_bound(&self) -> usize {
        self.b_array * self.b_prime_array * self.b_prime_dict
    }

    // Encrypt the posting list into tagged id-blocks at random free array
    // slots, returning the fixed-size indices of the slots used.
    fn place_id_blocks<R: RngCore + ?Sized>(
        &self,
        ids: &[Vec<u8>],
        k2: &[u8],
        a: &mut [Option<Vec<u8>>],
        positions: &mut Vec<usize>,
        rng: &mut R,
    ) -> Result<Vec<Vec<u8>>> {
        let mut pointers = Vec::new();
        for block in partition(ids, self.b_array, self.id_size, Some(self.array_block_size()))? {
            let slot = positions
                .pop()
                .expect("the position list is sized to the block count");
            pointers.push(int_to_bytes(slot as u64, self.index_size)?);
            let mut tagged = Vec::with_capacity(1 + block.len());
            tagged.push(TAG_IDS);
            tagged.extend_from_slice(&block);
            a[slot] = Some(self.ske.encrypt(k2, &tagged, rng)?);
        }
        Ok(pointers)
    }
}

/// Π2Lev master key.
#[derive(Clone, Debug)]
pub struct Pi2LevKey {
    k: Vec<u8>,
}

impl PartialEq for Pi2LevKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k, &other.k)
    }
}

impl Eq for Pi2LevKey {}

impl Pi2LevKey {
    pub fn serialize(&self) -> Vec<u8> {
        self.k.clone()
    }

    pub fn deserialize(bytes: &[u8], scheme: &Pi2Lev) -> Result<Pi2LevKey> {
        if bytes.len() != scheme.lambda {
            return Err(Error::LengthMismatch {
                what: "Pi2Lev key",
                expected: scheme.lambda,
                actual: bytes.len(),
            });
        }
        Ok(Pi2LevKey { k: bytes.to_vec() })
    }
}

/// Π2Lev search token.
#[derive(Clone, Debug)]
pub struct Pi2LevToken {
    k1: Vec<u8>,
    k2: Vec<u8>,
}

impl PartialEq for Pi2LevToken {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
    }
}

impl Eq for Pi2LevToken {}

impl Pi2LevToken {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Pi2Lev) -> Result<Pi2LevToken> {
        let part = scheme.prf_f.output_len();
        if bytes.len() != 2 * part {
            return Err(Error::LengthMismatch {
                what: "Pi2Lev token",
                expected: 2 * part,
                actual: bytes.len(),
            });
        }
        Ok(Pi2LevToken {
            k1: bytes[..part].to_vec(),
            k2: bytes[part..].to_vec(),
        })
    }
}

/// Π2Lev encrypted database: dictionary plus 1-based array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pi2LevEdb {
    d: HashMap<Vec<u8>, Vec<u8>>,
    a: Vec<Vec<u8>>,
}

impl Pi2LevEdb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.d);
        encode::write_array(&mut buf, &self.a);
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &Pi2Lev) -> Result<Pi2LevEdb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let d = encode::read_map(&mut input, "Pi2Lev dictionary")?;
        let a = encode::read_array(&mut input, "Pi2Lev array")?;
        encode::done(input, "Pi2Lev array")?;
        Ok(Pi2LevEdb { d, a })
    }
}

impl InvertedIndexSse for Pi2Lev {
    type Key = Pi2LevKey;
    type Edb = Pi2LevEdb;
    type Token = Pi2LevToken;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<Pi2LevKey> {
        Ok(Pi2LevKey {
            k: urandom(rng, self.lambda),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &Pi2LevKey,
        db: &Database,
        rng: &mut R,
    ) -> Result<Pi2LevEdb> {
        // size the array: medium and large lists store id-blocks, large
        // lists additionally store first-level pointer-blocks
        let mut a_len = 1usize;
        for (_, ids) in db.iter() {
            let n = ids.len();
            if n > self.b_dict {
                a_len += (n + self.b_array - 1) / self.b_array;
            }
            if n > self.b_prime_dict * self.b_array {
                a_len += (n + self.b_array * self.b_prime_array - 1)
                    / (self.b_array * self.b_prime_array);
            }
        }
        if self.index_size < 8 && a_len > 1usize << (self.index_size * 8) {
            return Err(Error::SizeOverflow {
                what: "Pi2Lev array index",
                limit: 1usize << (self.index_size * 8),
                actual: a_len,
            });
        }
        log::debug!("Pi2Lev setup: array of {} slots", a_len);

        let mut positions: Vec<usize> = (1..a_len).collect();
        positions.shuffle(rng);

        let mut a: Vec<Option<Vec<u8>>> = vec![None; a_len];
        let mut d = HashMap::new();
        for (keyword, ids) in db.iter() {
            let (k1, k2) = self.keyword_keys(&key.k, keyword)?;
            let n = ids.len();
            let label = self.prf_f.eval(&k1, b"\x00")?;

            if n <= self.b_dict {
                // small: identifiers fit in one dictionary block
                let content: Vec<u8> = ids.concat();
                let block = self.tagged_dict_block(TAG_IDS, &content);
                d.insert(label, self.ske.encrypt(&k2, &block, rng)?);
            } else if n <= self.b_array * self.b_prime_dict {
                // medium: id-blocks in the array, one pointer-block in the
                // dictionary
                let pointers =
                    self.place_id_blocks(ids, &k2, &mut a, &mut positions, rng)?;
                let block = self.tagged_dict_block(TAG_PTRS, &pointers.concat());
                d.insert(label, self.ske.encrypt(&k2, &block, rng)?);
            } else if n < self.large_bound() {
                // large: id-blocks and first-level pointer-blocks in the
                // array, one block of second-level pointers in the
                // dictionary
                let first = self.place_id_blocks(ids, &k2, &mut a, &mut positions, rng)?;
                let mut second = Vec::new();
                let first_blocks =
                    partition(&first, self.b_prime_array, self.index_size, None)?;
                for ptr_block in first_blocks {
                    let slot = positions
                        .pop()
                        .expect("the position list is sized to the block count");
                    second.push(int_to_bytes(slot as u64, self.index_size)?);
                    let mut block = Vec::with_capacity(1 + ptr_block.len());
                    block.push(TAG_PTRS);
                    block.extend_from_slice(&ptr_block);
                    a[slot] = Some(self.ske.encrypt(&k2, &block, rng)?);
                }
                let block = self.tagged_dict_block(TAG_PTRS, &second.concat());
                d.insert(label, self.ske.encrypt(&k2, &block, rng)?);
            } else {
                return Err(Error::SizeOverflow {
                    what: "Pi2Lev posting list",
                    limit: self.large_bound() - 1,
                    actual: n,
                });
            }
        }
        let a = a
            .into_iter()
            .map(|slot| slot.unwrap_or_default())
            .collect();
        Ok(Pi2LevEdb { d, a })
    }

    fn token_gen(&self, key: &Pi2LevKey, keyword: &[u8]) -> Result<Pi2LevToken> {
        let (k1, k2) = self.keyword_keys(&key.k, keyword)?;
        Ok(Pi2LevToken { k1, k2 })
    }

    fn search(&self, edb: &Pi2LevEdb, token: &Pi2LevToken) -> Result<IdList> {
        let mut addresses = vec![self.prf_f.eval(&token.k1, b"\x00")?];
        for level in 0..3 {
            let mut plaintexts = Vec::with_capacity(addresses.len());
            for address in &addresses {
                let cell = if level == 0 {
                    match edb.d.get(address) {
                        None => return Ok(IdList::default()),
                        Some(cell) => cell,
                    }
                } else {
                    let slot = int_from_bytes(address)? as usize;
                    edb.a.get(slot).ok_or(Error::Decryption)?
                };
                plaintexts.push(self.ske.decrypt(&token.k2, cell)?);
            }
            let tag = *plaintexts.first().and_then(|p| p.first()).ok_or(Error::Decryption)?;
            let count = match (level, tag) {
                (0, TAG_IDS) => self.b_dict,
                (0, TAG_PTRS) => self.b_prime_dict,
                (_, TAG_IDS) => self.b_array,
                (_, TAG_PTRS) => self.b_prime_array,
                _ => return Err(Error::Decryption),
            };
            let mut entries = Vec::new();
            for plaintext in &plaintexts {
                let body = plaintext.get(1..).ok_or(Error::Decryption)?;
                entries.extend(parse_by_count(body, count));
            }
            if tag == TAG_IDS {
                return Ok(IdList(entries));
            }
            addresses = entries;
        }
        // a third pointer level means the structure is corrupt
        Err(Error::Decryption)
    }
}
