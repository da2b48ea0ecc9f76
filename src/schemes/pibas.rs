//! ΠBas (Cash et al., CJJ+14): the counter-indexed dictionary scheme.
//!
//! Setup derives two per-keyword keys from the master key, then stores one
//! dictionary cell per posting: the label is a PRF of the posting's
//! counter, the value the encrypted identifier. Search simply walks the
//! counters until a label misses.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::bytes::int_to_bytes_min;
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prf::HmacPrf;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Cash2014PiBas";

/// Raw ΠBas configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiBasParams {
    /// Security parameter λ: key size in bytes
    pub param_lambda: usize,
    /// Output length of the PRF f in bytes
    pub prf_f_output_length: usize,
    /// PRF name
    pub prf_f: String,
    /// SKE name
    pub ske: String,
}

impl Default for PiBasParams {
    fn default() -> PiBasParams {
        PiBasParams {
            param_lambda: 32,
            prf_f_output_length: 32,
            prf_f: "HmacPRF".into(),
            ske: "AES-CBC".into(),
        }
    }
}

/// The ΠBas scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct PiBas {
    lambda: usize,
    prf_f: HmacPrf,
    ske: AesCbc,
}

impl PiBas {
    pub fn new(params: PiBasParams) -> Result<PiBas> {
        let prf_f = HmacPrf::from_name(
            &params.prf_f,
            Some(params.prf_f_output_length),
            Some(params.param_lambda),
            None,
        )?;
        let ske = AesCbc::from_name(&params.ske, params.param_lambda)?;
        Ok(PiBas {
            lambda: params.param_lambda,
            prf_f,
            ske,
        })
    }

    pub fn from_json(json: &str) -> Result<PiBas> {
        let params: PiBasParams =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        PiBas::new(params)
    }

    fn keyword_keys(&self, key: &PiBasKey, keyword: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut tagged = vec![0x01u8];
        tagged.extend_from_slice(keyword);
        let k1 = self.prf_f.eval(&key.k, &tagged)?;
        tagged[0] = 0x02;
        let k2 = self.prf_f.eval(&key.k, &tagged)?;
        Ok((k1, k2))
    }
}

/// ΠBas master key: a single uniform λ-byte string.
#[derive(Clone, Debug)]
pub struct PiBasKey {
    k: Vec<u8>,
}

impl PartialEq for PiBasKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k, &other.k)
    }
}

impl Eq for PiBasKey {}

impl PiBasKey {
    pub fn serialize(&self) -> Vec<u8> {
        self.k.clone()
    }

    pub fn deserialize(bytes: &[u8], scheme: &PiBas) -> Result<PiBasKey> {
        if bytes.len() != scheme.lambda {
            return Err(Error::LengthMismatch {
                what: "PiBas key",
                expected: scheme.lambda,
                actual: bytes.len(),
            });
        }
        Ok(PiBasKey { k: bytes.to_vec() })
    }
}

/// ΠBas search token: the two per-keyword derived keys.
#[derive(Clone, Debug)]
pub struct PiBasToken {
    k1: Vec<u8>,
    k2: Vec<u8>,
}

impl PartialEq for PiBasToken {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
    }
}

impl Eq for PiBasToken {}

impl PiBasToken {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &PiBas) -> Result<PiBasToken> {
        let part = scheme.prf_f.output_len();
        if bytes.len() != 2 * part {
            return Err(Error::LengthMismatch {
                what: "PiBas token",
                expected: 2 * part,
                actual: bytes.len(),
            });
        }
        Ok(PiBasToken {
            k1: bytes[..part].to_vec(),
            k2: bytes[part..].to_vec(),
        })
    }
}

/// ΠBas encrypted database: one dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PiBasEdb {
    d: HashMap<Vec<u8>, Vec<u8>>,
}

impl PiBasEdb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.d);
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &PiBas) -> Result<PiBasEdb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let d = encode::read_map(&mut input, "PiBas dictionary")?;
        encode::done(input, "PiBas dictionary")?;
        Ok(PiBasEdb { d })
    }

    /// Number of dictionary entries.
    pub fn len(&self) -> usize {
        self.d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d.is_empty()
    }
}

impl InvertedIndexSse for PiBas {
    type Key = PiBasKey;
    type Edb = PiBasEdb;
    type Token = PiBasToken;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<PiBasKey> {
        Ok(PiBasKey {
            k: urandom(rng, self.lambda),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &PiBasKey,
        db: &Database,
        rng: &mut R,
    ) -> Result<PiBasEdb> {
        let mut d = HashMap::with_capacity(db.total_size());
        for (keyword, ids) in db.iter() {
            let (k1, k2) = self.keyword_keys(key, keyword)?;
            for (c, id) in ids.iter().enumerate() {
                let label = self.prf_f.eval(&k1, &int_to_bytes_min(c as u64))?;
                let cell = self.ske.encrypt(&k2, id, rng)?;
                d.insert(label, cell);
            }
        }
        log::debug!(
            "PiBas setup: {} keywords, {} cells",
            db.keyword_count(),
            d.len()
        );
        Ok(PiBasEdb { d })
    }

    fn token_gen(&self, key: &PiBasKey, keyword: &[u8]) -> Result<PiBasToken> {
        let (k1, k2) = self.keyword_keys(key, keyword)?;
        Ok(PiBasToken { k1, k2 })
    }

    fn search(&self, edb: &PiBasEdb, token: &PiBasToken) -> Result<IdList> {
        let mut result = Vec::new();
        for c in 0u64.. {
            let label = self.prf_f.eval(&token.k1, &int_to_bytes_min(c))?;
            match edb.d.get(&label) {
                None => break,
                Some(cell) => result.push(self.ske.decrypt(&token.k2, cell)?),
            }
        }
        Ok(IdList(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::testing::fake_db;
    use rand::rngs::{OsRng, StdRng};
    use rand::SeedableRng;

    fn china_db() -> Database {
        let mut db = Database::new();
        db.insert(
            b"China".to_vec(),
            vec![b"12345678".to_vec(), b"23221233".to_vec(), b"23421232".to_vec()],
        );
        db
    }

    #[test]
    fn single_keyword_in_order() {
        let scheme = PiBas::new(PiBasParams::default()).unwrap();
        let key = scheme.key_gen(&mut OsRng).unwrap();
        let edb = scheme.edb_setup(&key, &china_db(), &mut OsRng).unwrap();
        let token = scheme.token_gen(&key, b"China").unwrap();
        let result = scheme.search(&edb, &token).unwrap();
        assert_eq!(
            result.0,
            vec![b"12345678".to_vec(), b"23221233".to_vec(), b"23421232".to_vec()]
        );
    }

    #[test]
    fn absent_keyword_is_empty() {
        let scheme = PiBas::new(PiBasParams::default()).unwrap();
        let key = scheme.key_gen(&mut OsRng).unwrap();
        let edb = scheme.edb_setup(&key, &china_db(), &mut OsRng).unwrap();
        let token = scheme.token_gen(&key, b"Russia").unwrap();
        assert!(scheme.search(&edb, &token).unwrap().is_empty());
    }

    #[test]
    fn random_databases() {
        let scheme = PiBas::new(PiBasParams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let db = fake_db(&mut rng, 16, 8, 40, (1, 12));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        for (keyword, ids) in db.iter() {
            let token = scheme.token_gen(&key, keyword).unwrap();
            assert_eq!(&scheme.search(&edb, &token).unwrap().0, ids);
        }
    }

    #[test]
    fn tokens_are_deterministic_and_setup_is_not() {
        let scheme = PiBas::new(PiBasParams::default()).unwrap();
        let key = scheme.key_gen(&mut OsRng).unwrap();
        let t1 = scheme.token_gen(&key, b"China").unwrap();
        let t2 = scheme.token_gen(&key, b"China").unwrap();
        assert_eq!(t1, t2);
        let db = china_db();
        let e1 = scheme.edb_setup(&key, &db, &mut OsRng).unwrap();
        let e2 = scheme.edb_setup(&key, &db, &mut OsRng).unwrap();
        // fresh SKE IVs make the cell bodies differ
        assert_ne!(e1, e2);
        // but both decrypt correctly
        let token = scheme.token_gen(&key, b"China").unwrap();
        assert_eq!(scheme.search(&e1, &token).unwrap(), scheme.search(&e2, &token).unwrap());
    }

    #[test]
    fn serialization_round_trips() {
        let scheme = PiBas::new(PiBasParams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &china_db(), &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"China").unwrap();
        let result = scheme.search(&edb, &token).unwrap();

        assert_eq!(PiBasKey::deserialize(&key.serialize(), &scheme).unwrap(), key);
        assert_eq!(PiBasEdb::deserialize(&edb.serialize(), &scheme).unwrap(), edb);
        assert_eq!(PiBasToken::deserialize(&token.serialize(), &scheme).unwrap(), token);
        assert_eq!(IdList::deserialize(&result.serialize()).unwrap(), result);
        assert!(PiBasEdb::deserialize(b"not an edb", &scheme).is_err());
    }

    #[test]
    fn config_parsing() {
        let scheme = PiBas::from_json(
            r#"{"param_lambda":32,"prf_f_output_length":32,"prf_f":"HmacPRF","ske":"AES-CBC"}"#,
        );
        assert!(scheme.is_ok());
        // a missing field is a configuration error
        assert!(PiBas::from_json(r#"{"param_lambda":32}"#).is_err());
        // unknown primitive names are too
        assert!(PiBas::from_json(
            r#"{"param_lambda":32,"prf_f_output_length":32,"prf_f":"Nope","ske":"AES-CBC"}"#
        )
        .is_err());
    }

    #[test]
    fn seeded_randomness_still_correct() {
        let scheme = PiBas::new(PiBasParams::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &china_db(), &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"China").unwrap();
        assert_eq!(scheme.search(&edb, &token).unwrap().len(), 3);
    }
}
