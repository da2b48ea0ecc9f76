//! SSE-2 (Curtmola et al., CGKO06): one dictionary cell per (keyword,
//! position) pair, addressed directly through the PRP π.
//!
//! The dictionary key for position j of keyword w is π(K1, w ‖ j), so a
//! token is simply the n addresses a keyword could occupy. When the
//! database holds fewer than `max` postings per identifier, dummy cells
//! under an unused all-zero keyword bring every identifier up to `max`
//! occurrences.

use std::collections::{BTreeMap, HashMap};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::bits::Bitset;
use crate::bytes::{bit_length, ceil_log2};
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prp::Prp;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Curtomola2006SSE2";

/// How many distinct keywords can fit in a document of `max_file_size`
/// bytes: greedily count all 1-byte words, then all 2-byte words, and so
/// on while the cumulative bytes stay within the budget.
pub fn determine_param_max(max_file_size: usize) -> usize {
    let budget = max_file_size as u128;
    let mut result: u128 = 0;
    let mut word_size: u32 = 1;
    let mut used: u128 = 0;
    loop {
        let words = 1u128 << (8 * word_size);
        let bytes = words * word_size as u128;
        if used + bytes > budget {
            result += (budget - used) / word_size as u128;
            break;
        }
        result += words;
        used += bytes;
        word_size += 1;
    }
    result as usize
}

/// Raw SSE-2 configuration. `param_n` is the distinct-file count and must
/// come from a database scan (see [`Sse2Params::scan_database`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sse2Params {
    /// Key size k in bytes
    pub param_k: usize,
    /// Maximum keyword size l in bytes
    pub param_l: usize,
    /// Number of distinct files n
    pub param_n: usize,
    /// Maximum document size in bytes, from which `max` is derived
    pub param_max_file_size: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// PRP name for π
    pub prp_pi: String,
    /// SKE name
    pub ske: String,
}

impl Default for Sse2Params {
    fn default() -> Sse2Params {
        Sse2Params {
            param_k: 24,
            param_l: 32,
            param_n: 0,
            param_max_file_size: 1 << 20,
            param_identifier_size: 8,
            prp_pi: "BitwiseFPEPRP".into(),
            ske: "AES-CBC".into(),
        }
    }
}

impl Sse2Params {
    /// Fill `param_n` from the database this configuration will serve.
    pub fn scan_database(&mut self, db: &Database) {
        self.param_n = db.distinct_file_count();
    }
}

/// The SSE-2 scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct Sse2 {
    k: usize,
    l: usize,
    n: usize,
    max: usize,
    id_size: usize,
    position_bits: usize,
    prp_pi: Prp,
    /// SKE from the published configuration surface; reserved.
    pub ske: AesCbc,
}

impl Sse2 {
    pub fn new(params: Sse2Params) -> Result<Sse2> {
        if params.param_n == 0 {
            return Err(Error::Config(
                "param_n must be set from a database scan before use".into(),
            ));
        }
        let max = determine_param_max(params.param_max_file_size);
        if max == 0 {
            return Err(Error::Config(
                "param_max_file_size is too small to hold any keyword".into(),
            ));
        }
        let position_bits = ceil_log2(params.param_n + max);
        let prp_pi = Prp::from_name(
            &params.prp_pi,
            params.param_k * 8,
            params.param_l * 8 + position_bits,
        )?;
        let ske = AesCbc::from_name(&params.ske, params.param_k)?;
        Ok(Sse2 {
            k: params.param_k,
            l: params.param_l,
            n: params.param_n,
            max,
            id_size: params.param_identifier_size,
            position_bits,
            prp_pi,
            ske,
        })
    }

    pub fn from_json(json: &str) -> Result<Sse2> {
        let params: Sse2Params =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        Sse2::new(params)
    }

    /// The padded dictionary size s = max·n.
    pub fn table_size(&self) -> usize {
        self.max * self.n
    }

    // π(K1, w ‖ position) as label bytes.
    fn position_label(&self, k1: &[u8], keyword: &[u8], position: u64) -> Result<Vec<u8>> {
        if keyword.len() > self.l {
            return Err(Error::LengthMismatch {
                what: "SSE2 keyword",
                expected: self.l,
                actual: keyword.len(),
            });
        }
        if bit_length(position) > self.position_bits {
            return Err(Error::SizeOverflow {
                what: "SSE2 position index",
                limit: (1usize << self.position_bits) - 1,
                actual: position as usize,
            });
        }
        let kw_bits = Bitset::from_bytes_with_len(keyword, self.l * 8)?;
        let pos_bits = Bitset::from_int(position as u128, self.position_bits)?;
        let label = self.prp_pi.encrypt(k1, &kw_bits.concat(&pos_bits))?;
        Ok(label.to_bytes())
    }
}

/// SSE-2 master key: two independent k-byte strings (K2 is carried for
/// the published key shape but unused by this construction).
#[derive(Clone, Debug)]
pub struct Sse2Key {
    k1: Vec<u8>,
    k2: Vec<u8>,
}

impl PartialEq for Sse2Key {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
    }
}

impl Eq for Sse2Key {}

impl Sse2Key {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Sse2) -> Result<Sse2Key> {
        if bytes.len() != 2 * scheme.k {
            return Err(Error::LengthMismatch {
                what: "SSE2 key",
                expected: 2 * scheme.k,
                actual: bytes.len(),
            });
        }
        Ok(Sse2Key {
            k1: bytes[..scheme.k].to_vec(),
            k2: bytes[scheme.k..].to_vec(),
        })
    }
}

/// SSE-2 search token: the candidate labels for positions 1..n.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sse2Token {
    labels: Vec<Vec<u8>>,
}

impl Sse2Token {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_array(&mut buf, &self.labels);
        buf
    }

    pub fn deserialize(bytes: &[u8], scheme: &Sse2) -> Result<Sse2Token> {
        let mut input = bytes;
        let labels = encode::read_array(&mut input, "SSE2 token")?;
        encode::done(input, "SSE2 token")?;
        let width = scheme.prp_pi.msg_bytes();
        for label in &labels {
            if label.len() != width {
                return Err(Error::LengthMismatch {
                    what: "SSE2 token label",
                    expected: width,
                    actual: label.len(),
                });
            }
        }
        Ok(Sse2Token { labels })
    }
}

/// SSE-2 encrypted database: the direct-addressed dictionary I.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sse2Edb {
    table: HashMap<Vec<u8>, Vec<u8>>,
}

impl Sse2Edb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.table);
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &Sse2) -> Result<Sse2Edb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let table = encode::read_map(&mut input, "SSE2 dictionary")?;
        encode::done(input, "SSE2 dictionary")?;
        Ok(Sse2Edb { table })
    }
}

impl InvertedIndexSse for Sse2 {
    type Key = Sse2Key;
    type Edb = Sse2Edb;
    type Token = Sse2Token;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<Sse2Key> {
        Ok(Sse2Key {
            k1: urandom(rng, self.k),
            k2: urandom(rng, self.k),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &Sse2Key,
        db: &Database,
        _rng: &mut R,
    ) -> Result<Sse2Edb> {
        let mut table = HashMap::new();
        let mut occurrences: BTreeMap<&[u8], usize> = BTreeMap::new();
        let mut total = 0usize;

        for (keyword, ids) in db.iter() {
            total += ids.len();
            for (j, id) in ids.iter().enumerate() {
                if id.len() != self.id_size {
                    return Err(Error::LengthMismatch {
                        what: "SSE2 identifier",
                        expected: self.id_size,
                        actual: id.len(),
                    });
                }
                let label = self.position_label(&key.k1, keyword, (j + 1) as u64)?;
                table.insert(label, id.clone());
                *occurrences.entry(id).or_insert(0) += 1;
            }
        }

        // bring every identifier up to max occurrences with dummy cells
        // under the reserved all-zero keyword
        if total < self.table_size() {
            let zero_keyword = vec![0u8; self.l];
            let mut dummy = 0u64;
            for (id, count) in occurrences {
                for _ in count..self.max {
                    let label =
                        self.position_label(&key.k1, &zero_keyword, self.n as u64 + dummy)?;
                    table.insert(label, id.to_vec());
                    dummy += 1;
                }
            }
        }
        log::debug!(
            "SSE2 setup: {} real postings, table of {}",
            total,
            table.len()
        );
        Ok(Sse2Edb { table })
    }

    fn token_gen(&self, key: &Sse2Key, keyword: &[u8]) -> Result<Sse2Token> {
        let mut labels = Vec::with_capacity(self.n);
        for i in 1..=self.n {
            labels.push(self.position_label(&key.k1, keyword, i as u64)?);
        }
        Ok(Sse2Token { labels })
    }

    /// Walk the token's labels in order and stop at the first miss.
    ///
    /// Setup writes a contiguous prefix of positions 1..|DB(w)|, so on
    /// honest inputs this returns exactly the posting list; positions past
    /// |DB(w)| are only absent with overwhelming probability, not by
    /// construction.
    fn search(&self, edb: &Sse2Edb, token: &Sse2Token) -> Result<IdList> {
        let mut result = Vec::new();
        for label in &token.labels {
            match edb.table.get(label) {
                None => break,
                Some(id) => result.push(id.clone()),
            }
        }
        Ok(IdList(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // max_file_size 64 keeps max = 64: all 64 1-byte words fill the budget
    fn small_scheme(n: usize) -> Sse2 {
        Sse2::new(Sse2Params {
            param_n: n,
            param_max_file_size: 64,
            ..Sse2Params::default()
        })
        .unwrap()
    }

    fn exact_db() -> Database {
        // two distinct files, so with max = 64 the dummy positions stay
        // inside the 7-bit position field
        let mut db = Database::new();
        db.insert(b"alpha".to_vec(), vec![b"11111111".to_vec(), b"22222222".to_vec()]);
        db.insert(b"beta".to_vec(), vec![b"11111111".to_vec()]);
        db
    }

    #[test]
    fn param_max_derivation() {
        assert_eq!(determine_param_max(64), 64);
        assert_eq!(determine_param_max(256), 256);
        // 256 one-byte words, then two-byte words on the remaining budget
        assert_eq!(determine_param_max(300), 256 + (300 - 256) / 2);
        assert_eq!(determine_param_max(1 << 20), 371541);
    }

    #[test]
    fn round_trip_with_dummy_padding() {
        let db = exact_db();
        let mut params = Sse2Params {
            param_max_file_size: 64,
            ..Sse2Params::default()
        };
        params.scan_database(&db);
        assert_eq!(params.param_n, 2);
        let scheme = Sse2::new(params).unwrap();
        let mut rng = StdRng::seed_from_u64(41);
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        // every identifier occurs max times after padding
        assert_eq!(edb.table.len(), scheme.table_size());

        let token = scheme.token_gen(&key, b"alpha").unwrap();
        assert_eq!(
            scheme.search(&edb, &token).unwrap().0,
            vec![b"11111111".to_vec(), b"22222222".to_vec()]
        );
        let token = scheme.token_gen(&key, b"beta").unwrap();
        assert_eq!(scheme.search(&edb, &token).unwrap().0, vec![b"11111111".to_vec()]);
    }

    #[test]
    fn absent_keyword_is_empty() {
        let db = exact_db();
        let scheme = small_scheme(2);
        let mut rng = StdRng::seed_from_u64(42);
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"gamma").unwrap();
        assert!(scheme.search(&edb, &token).unwrap().is_empty());
    }

    #[test]
    fn unscanned_config_is_rejected() {
        assert!(matches!(
            Sse2::new(Sse2Params::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn serialization_round_trips() {
        let db = exact_db();
        let scheme = small_scheme(2);
        let mut rng = StdRng::seed_from_u64(43);
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"alpha").unwrap();
        assert_eq!(Sse2Key::deserialize(&key.serialize(), &scheme).unwrap(), key);
        assert_eq!(Sse2Edb::deserialize(&edb.serialize(), &scheme).unwrap(), edb);
        assert_eq!(Sse2Token::deserialize(&token.serialize(), &scheme).unwrap(), token);
    }

    #[test]
    fn tokens_are_deterministic() {
        let scheme = small_scheme(3);
        let mut rng = StdRng::seed_from_u64(44);
        let key = scheme.key_gen(&mut rng).unwrap();
        let t1 = scheme.token_gen(&key, b"word").unwrap();
        let t2 = scheme.token_gen(&key, b"word").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.labels.len(), 3);
    }
}
