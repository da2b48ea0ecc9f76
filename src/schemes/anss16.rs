//! Scheme 3 (Asharov et al., ANSS16): size-class payload dictionaries
//! plus a dictionary of encrypted list lengths.
//!
//! Like CT14-Π the database is padded to N = 2^t, but here each posting
//! list is padded whole to the next power of two 2^p and stored as a
//! single entry of table T_p. A separate dictionary S maps a second
//! per-keyword label to the encrypted true length, so search first
//! recovers n_w from S, then fetches the one entry at level ⌈log₂ n_w⌉
//! and decrypts only the first n_w ciphertexts.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::blocks::parse_by_count;
use crate::bytes::{ceil_log2, int_from_bytes, int_to_bytes, split_exact};
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prf::HmacPrf;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Asharov2014Scheme3";

/// Raw ANSS16 Scheme-3 configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Anss16S3Params {
    /// Security parameter λ: master key size in bytes
    pub param_lambda: usize,
    /// Identifier-encryption key size k in bytes
    pub param_k: usize,
    /// Length-encryption key size k′ in bytes
    pub param_k_prime: usize,
    /// Payload label size l in bytes
    pub param_l: usize,
    /// Length label size l′ in bytes
    pub param_l_prime: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// PRF name
    pub prf: String,
    /// SKE name
    pub ske: String,
}

impl Default for Anss16S3Params {
    fn default() -> Anss16S3Params {
        Anss16S3Params {
            param_lambda: 32,
            param_k: 32,
            param_k_prime: 32,
            param_l: 32,
            param_l_prime: 32,
            param_identifier_size: 4,
            prf: "HmacPRF".into(),
            ske: "AES-CBC".into(),
        }
    }
}

/// The ANSS16 Scheme-3 construction, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct Anss16S3 {
    lambda: usize,
    k: usize,
    k_prime: usize,
    l: usize,
    l_prime: usize,
    id_size: usize,
    prf: HmacPrf,
    ske: AesCbc,
    ske_prime: AesCbc,
}

impl Anss16S3 {
    pub fn new(params: Anss16S3Params) -> Result<Anss16S3> {
        let prf = HmacPrf::from_name(
            &params.prf,
            Some(params.param_k + params.param_k_prime + params.param_l + params.param_l_prime),
            None,
            None,
        )?;
        // identifier payloads and length entries use differently-sized keys
        let ske = AesCbc::from_name(&params.ske, params.param_k)?;
        let ske_prime = AesCbc::from_name(&params.ske, params.param_k_prime)?;
        Ok(Anss16S3 {
            lambda: params.param_lambda,
            k: params.param_k,
            k_prime: params.param_k_prime,
            l: params.param_l,
            l_prime: params.param_l_prime,
            id_size: params.param_identifier_size,
            prf,
            ske,
            ske_prime,
        })
    }

    pub fn from_json(json: &str) -> Result<Anss16S3> {
        let params: Anss16S3Params =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        Anss16S3::new(params)
    }

    // One PRF call per keyword yields (l_w, K_w, l'_w, K'_w).
    fn keyword_material(&self, key: &[u8], keyword: &[u8]) -> Result<KeywordMaterial> {
        let out = self.prf.eval(key, keyword)?;
        let parts = split_exact(&out, &[self.l, self.k, self.l_prime, self.k_prime])?;
        Ok(KeywordMaterial {
            label: parts[0].to_vec(),
            id_key: parts[1].to_vec(),
            len_label: parts[2].to_vec(),
            len_key: parts[3].to_vec(),
        })
    }

    // Width of the plaintext carrying n_w; 2^t itself must fit.
    fn count_width(t: usize) -> usize {
        (t + 8) / 8
    }
}

struct KeywordMaterial {
    label: Vec<u8>,
    id_key: Vec<u8>,
    len_label: Vec<u8>,
    len_key: Vec<u8>,
}

/// ANSS16 master key: a single uniform λ-byte string.
#[derive(Clone, Debug)]
pub struct Anss16S3Key {
    k: Vec<u8>,
}

impl PartialEq for Anss16S3Key {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k, &other.k)
    }
}

impl Eq for Anss16S3Key {}

impl Anss16S3Key {
    pub fn serialize(&self) -> Vec<u8> {
        self.k.clone()
    }

    pub fn deserialize(bytes: &[u8], scheme: &Anss16S3) -> Result<Anss16S3Key> {
        if bytes.len() != scheme.lambda {
            return Err(Error::LengthMismatch {
                what: "ANSS16 key",
                expected: scheme.lambda,
                actual: bytes.len(),
            });
        }
        Ok(Anss16S3Key { k: bytes.to_vec() })
    }
}

/// ANSS16 search token: the full per-keyword material.
#[derive(Clone, Debug)]
pub struct Anss16S3Token {
    label: Vec<u8>,
    id_key: Vec<u8>,
    len_label: Vec<u8>,
    len_key: Vec<u8>,
}

impl PartialEq for Anss16S3Token {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.label, &other.label)
            && constant_time_eq::constant_time_eq(&self.id_key, &other.id_key)
            && constant_time_eq::constant_time_eq(&self.len_label, &other.len_label)
            && constant_time_eq::constant_time_eq(&self.len_key, &other.len_key)
    }
}

impl Eq for Anss16S3Token {}

impl Anss16S3Token {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.label.clone();
        out.extend_from_slice(&self.id_key);
        out.extend_from_slice(&self.len_label);
        out.extend_from_slice(&self.len_key);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Anss16S3) -> Result<Anss16S3Token> {
        let expected = scheme.l + scheme.k + scheme.l_prime + scheme.k_prime;
        if bytes.len() != expected {
            return Err(Error::LengthMismatch {
                what: "ANSS16 token",
                expected,
                actual: bytes.len(),
            });
        }
        let parts = split_exact(bytes, &[scheme.l, scheme.k, scheme.l_prime, scheme.k_prime])?;
        Ok(Anss16S3Token {
            label: parts[0].to_vec(),
            id_key: parts[1].to_vec(),
            len_label: parts[2].to_vec(),
            len_key: parts[3].to_vec(),
        })
    }
}

/// ANSS16 encrypted database: the length dictionary S and the level
/// tables HT(T_0) .. HT(T_t).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Anss16S3Edb {
    lengths: HashMap<Vec<u8>, Vec<u8>>,
    levels: Vec<HashMap<Vec<u8>, Vec<u8>>>,
}

impl Anss16S3Edb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.lengths);
        encode::write_u64(&mut buf, self.levels.len() as u64);
        for table in &self.levels {
            encode::write_map(&mut buf, table);
        }
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &Anss16S3) -> Result<Anss16S3Edb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let lengths = encode::read_map(&mut input, "ANSS16 length dictionary")?;
        let count = encode::read_u64(&mut input, "ANSS16 level count")? as usize;
        let mut levels = Vec::with_capacity(count);
        for _ in 0..count {
            levels.push(encode::read_map(&mut input, "ANSS16 level table")?);
        }
        encode::done(input, "ANSS16 level table")?;
        Ok(Anss16S3Edb { lengths, levels })
    }
}

impl InvertedIndexSse for Anss16S3 {
    type Key = Anss16S3Key;
    type Edb = Anss16S3Edb;
    type Token = Anss16S3Token;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<Anss16S3Key> {
        Ok(Anss16S3Key {
            k: urandom(rng, self.lambda),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &Anss16S3Key,
        db: &Database,
        rng: &mut R,
    ) -> Result<Anss16S3Edb> {
        if db.total_size() == 0 {
            return Ok(Anss16S3Edb {
                lengths: HashMap::new(),
                levels: Vec::new(),
            });
        }
        let t = ceil_log2(db.total_size()).max(1);
        let padded = super::pad_to_power_of_two(db, self.id_size, t, rng);
        let n_total = padded.total_size();
        let count_width = Self::count_width(t);
        log::debug!("ANSS16 setup: N = {} (padded), {} levels", n_total, t + 1);

        let mut levels: Vec<Vec<(Vec<u8>, Vec<u8>)>> = vec![Vec::new(); t + 1];
        let mut lengths = Vec::new();

        for (keyword, ids) in padded.iter() {
            let n_w = ids.len();
            let p = ceil_log2(n_w);
            if p > t {
                return Err(Error::SizeOverflow {
                    what: "ANSS16 posting list",
                    limit: 1 << t,
                    actual: n_w,
                });
            }
            let material = self.keyword_material(&key.k, keyword)?;

            // pad the list itself to 2^p with dummy identifiers
            let mut payload = Vec::new();
            for id in ids {
                payload.extend_from_slice(&self.ske.encrypt(&material.id_key, id, rng)?);
            }
            for _ in n_w..(1 << p) {
                let dummy = urandom(rng, self.id_size);
                payload.extend_from_slice(&self.ske.encrypt(&material.id_key, &dummy, rng)?);
            }
            levels[p].push((material.label, payload));

            let n_w_bytes = int_to_bytes(n_w as u64, count_width)?;
            lengths.push((
                material.len_label,
                self.ske_prime.encrypt(&material.len_key, &n_w_bytes, rng)?,
            ));
        }

        // pad each level table to 2^(t-i) entries, and S to N entries,
        // with random fillers of the exact real sizes
        let unit = self.ske.ciphertext_len(self.id_size);
        let mut level_tables = Vec::with_capacity(t + 1);
        for (i, entries) in levels.into_iter().enumerate() {
            let mut table: HashMap<Vec<u8>, Vec<u8>> = entries.into_iter().collect();
            let entry_len = (1usize << i) * unit;
            let target = 1usize << (t - i);
            while table.len() < target {
                table.insert(urandom(rng, self.l), urandom(rng, entry_len));
            }
            level_tables.push(table);
        }
        let mut length_table: HashMap<Vec<u8>, Vec<u8>> = lengths.into_iter().collect();
        let length_entry_len = self.ske_prime.ciphertext_len(count_width);
        while length_table.len() < n_total {
            length_table.insert(urandom(rng, self.l_prime), urandom(rng, length_entry_len));
        }

        Ok(Anss16S3Edb {
            lengths: length_table,
            levels: level_tables,
        })
    }

    fn token_gen(&self, key: &Anss16S3Key, keyword: &[u8]) -> Result<Anss16S3Token> {
        let material = self.keyword_material(&key.k, keyword)?;
        Ok(Anss16S3Token {
            label: material.label,
            id_key: material.id_key,
            len_label: material.len_label,
            len_key: material.len_key,
        })
    }

    fn search(&self, edb: &Anss16S3Edb, token: &Anss16S3Token) -> Result<IdList> {
        let length_cell = match edb.lengths.get(&token.len_label) {
            None => return Ok(IdList::default()),
            Some(cell) => cell,
        };
        let n_w = int_from_bytes(&self.ske_prime.decrypt(&token.len_key, length_cell)?)? as usize;
        if n_w == 0 {
            return Ok(IdList::default());
        }
        let p = ceil_log2(n_w);
        if p >= edb.levels.len() {
            return Ok(IdList::default());
        }
        let payload = match edb.levels[p].get(&token.label) {
            None => return Ok(IdList::default()),
            Some(payload) => payload,
        };
        let ciphers = parse_by_count(payload, 1 << p);
        let mut result = Vec::with_capacity(n_w);
        for cipher in ciphers.iter().take(n_w) {
            result.push(self.ske.decrypt(&token.id_key, cipher)?);
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

    fn scheme() -> Anss16S3 {
        Anss16S3::new(Anss16S3Params::default()).unwrap()
    }

    #[test]
    fn round_trip() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(61);
        let db = fake_db(&mut rng, 16, 4, 20, (1, 9));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        for (keyword, ids) in db.iter() {
            let token = scheme.token_gen(&key, keyword).unwrap();
            assert_eq!(&scheme.search(&edb, &token).unwrap().0, ids);
        }
    }

    #[test]
    fn list_padding_is_invisible_to_search() {
        // a 3-element list is stored as 4 ciphertexts; only 3 come back
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(62);
        let mut db = Database::new();
        db.insert(
            b"w".to_vec(),
            vec![b"1111".to_vec(), b"2222".to_vec(), b"3333".to_vec()],
        );
        db.insert(b"v".to_vec(), vec![b"4444".to_vec()]);
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"w").unwrap();
        assert_eq!(
            scheme.search(&edb, &token).unwrap().0,
            vec![b"1111".to_vec(), b"2222".to_vec(), b"3333".to_vec()]
        );
    }

    #[test]
    fn caller_database_is_not_mutated() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(63);
        let mut db = Database::new();
        db.insert(b"w".to_vec(), vec![b"1111".to_vec(), b"2222".to_vec(), b"3333".to_vec()]);
        let before = db.clone();
        let key = scheme.key_gen(&mut rng).unwrap();
        let _ = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        assert_eq!(db, before);
    }

    #[test]
    fn absent_keyword_is_empty() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(64);
        let db = fake_db(&mut rng, 16, 4, 6, (1, 5));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"missing").unwrap();
        assert!(scheme.search(&edb, &token).unwrap().is_empty());
    }

    #[test]
    fn length_dictionary_is_padded_to_n() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(65);
        let db = fake_db(&mut rng, 16, 4, 5, (1, 4));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let t = ceil_log2(db.total_size()).max(1);
        assert_eq!(edb.lengths.len(), 1 << t);
        assert_eq!(edb.levels.len(), t + 1);
    }

    #[test]
    fn serialization_round_trips() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(66);
        let db = fake_db(&mut rng, 16, 4, 6, (1, 6));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"q").unwrap();
        assert_eq!(Anss16S3Key::deserialize(&key.serialize(), &scheme).unwrap(), key);
        assert_eq!(Anss16S3Edb::deserialize(&edb.serialize(), &scheme).unwrap(), edb);
        assert_eq!(Anss16S3Token::deserialize(&token.serialize(), &scheme).unwrap(), token);
    }
}
