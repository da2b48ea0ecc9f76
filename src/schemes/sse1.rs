//! SSE-1 (Curtmola et al., CGKO06): encrypted linked lists in a
//! PRP-addressed array, reached through a padded look-up table.
//!
//! Each keyword's postings become a chain of nodes
//! `id ‖ next-key ‖ next-address`, every node encrypted under the key
//! carried by its predecessor. Node cells are assigned by permuting a
//! global counter with the PRP ψ, the chain head and its key are hidden
//! in the look-up table behind the PRP π and a PRF mask, and after setup
//! every untouched cell and table slot is filled with random bytes of the
//! exact real-entry size.

use std::collections::HashMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::bits::Bitset;
use crate::bytes::{add_leading_zeros, int_from_bytes, xor};
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::prf::HmacPrf;
use crate::prp::Prp;
use crate::random::urandom;
use crate::scheme::{IdList, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Curtomola2006SSE1";

/// Raw SSE-1 configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sse1Params {
    /// Key size k in bytes
    pub param_k: usize,
    /// Maximum keyword size l in bytes
    pub param_l: usize,
    /// Array size s; must be a power of two
    pub param_s: usize,
    /// Look-up table size |Δ|
    pub param_dictionary_size: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// PRF name
    pub prf_f: String,
    /// PRP name for π (keyword permutation)
    pub prp_pi: String,
    /// PRP name for ψ (address permutation)
    pub prp_psi: String,
    /// SKE name for node encryption
    pub ske1: String,
    /// SKE name for the second encryption layer
    pub ske2: String,
}

impl Default for Sse1Params {
    fn default() -> Sse1Params {
        Sse1Params {
            param_k: 24,
            param_l: 32,
            param_s: 1 << 16,
            param_dictionary_size: 1 << 16,
            param_identifier_size: 8,
            prf_f: "HmacPRF".into(),
            prp_pi: "BitwiseFPEPRP".into(),
            prp_psi: "BitwiseFPEPRP".into(),
            ske1: "AES-CBC".into(),
            ske2: "AES-CBC".into(),
        }
    }
}

/// The SSE-1 scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct Sse1 {
    k: usize,
    l: usize,
    s: usize,
    log2_s: usize,
    dictionary_size: usize,
    id_size: usize,
    prf_f: HmacPrf,
    prp_pi: Prp,
    prp_psi: Prp,
    ske1: AesCbc,
    /// Second SKE layer from the published construction; reserved.
    pub ske2: AesCbc,
}

impl Sse1 {
    pub fn new(params: Sse1Params) -> Result<Sse1> {
        if !params.param_s.is_power_of_two() {
            return Err(Error::Config(format!(
                "param_s must be a power of two, got {}",
                params.param_s
            )));
        }
        let log2_s = params.param_s.trailing_zeros() as usize;
        let addr_size = (log2_s + 7) / 8;
        let prf_f = HmacPrf::from_name(
            &params.prf_f,
            Some(params.param_k + addr_size),
            Some(params.param_k),
            Some(params.param_l),
        )?;
        let prp_pi = Prp::from_name(&params.prp_pi, params.param_k * 8, params.param_l * 8)?;
        let prp_psi = Prp::from_name(&params.prp_psi, params.param_k * 8, log2_s)?;
        let ske1 = AesCbc::from_name(&params.ske1, params.param_k)?;
        let ske2 = AesCbc::from_name(&params.ske2, params.param_k)?;
        Ok(Sse1 {
            k: params.param_k,
            l: params.param_l,
            s: params.param_s,
            log2_s,
            dictionary_size: params.param_dictionary_size,
            id_size: params.param_identifier_size,
            prf_f,
            prp_pi,
            prp_psi,
            ske1,
            ske2,
        })
    }

    pub fn from_json(json: &str) -> Result<Sse1> {
        let params: Sse1Params =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        Sse1::new(params)
    }

    fn addr_size(&self) -> usize {
        (self.log2_s + 7) / 8
    }

    fn node_size(&self) -> usize {
        self.id_size + self.k + self.addr_size()
    }

    // ψ(K1, ctr) as address bytes.
    fn permuted_addr(&self, k1: &[u8], ctr: u64) -> Result<Vec<u8>> {
        let msg = Bitset::from_int(ctr as u128, self.log2_s).map_err(|_| Error::SizeOverflow {
            what: "SSE1 node counter",
            limit: self.s - 1,
            actual: ctr as usize,
        })?;
        Ok(self.prp_psi.encrypt(k1, &msg)?.to_bytes())
    }

    // π(K3, w) over the zero-padded keyword.
    fn permuted_keyword(&self, k3: &[u8], keyword: &[u8]) -> Result<Vec<u8>> {
        if keyword.len() > self.l {
            return Err(Error::LengthMismatch {
                what: "SSE1 keyword",
                expected: self.l,
                actual: keyword.len(),
            });
        }
        let msg = Bitset::from_bytes_with_len(keyword, self.l * 8)?;
        Ok(self.prp_pi.encrypt(k3, &msg)?.to_bytes())
    }

    fn keyword_mask(&self, k2: &[u8], keyword: &[u8]) -> Result<Vec<u8>> {
        self.prf_f.eval(k2, &add_leading_zeros(keyword, self.l))
    }
}

/// SSE-1 master key: four independent k-byte strings (K4 is carried for
/// the published key shape but unused by this construction).
#[derive(Clone, Debug)]
pub struct Sse1Key {
    k1: Vec<u8>,
    k2: Vec<u8>,
    k3: Vec<u8>,
    k4: Vec<u8>,
}

impl PartialEq for Sse1Key {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
            && constant_time_eq::constant_time_eq(&self.k3, &other.k3)
            && constant_time_eq::constant_time_eq(&self.k4, &other.k4)
    }
}

impl Eq for Sse1Key {}

impl Sse1Key {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out.extend_from_slice(&self.k3);
        out.extend_from_slice(&self.k4);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Sse1) -> Result<Sse1Key> {
        if bytes.len() != 4 * scheme.k {
            return Err(Error::LengthMismatch {
                what: "SSE1 key",
                expected: 4 * scheme.k,
                actual: bytes.len(),
            });
        }
        let k = scheme.k;
        Ok(Sse1Key {
            k1: bytes[..k].to_vec(),
            k2: bytes[k..2 * k].to_vec(),
            k3: bytes[2 * k..3 * k].to_vec(),
            k4: bytes[3 * k..].to_vec(),
        })
    }
}

/// SSE-1 search token: `(γ, η) = (π(K3, w), f(K2, w))`.
#[derive(Clone, Debug)]
pub struct Sse1Token {
    gamma: Vec<u8>,
    eta: Vec<u8>,
}

impl PartialEq for Sse1Token {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.gamma, &other.gamma)
            && constant_time_eq::constant_time_eq(&self.eta, &other.eta)
    }
}

impl Eq for Sse1Token {}

impl Sse1Token {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.gamma.clone();
        out.extend_from_slice(&self.eta);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Sse1) -> Result<Sse1Token> {
        let expected = scheme.l + scheme.k + scheme.addr_size();
        if bytes.len() != expected {
            return Err(Error::LengthMismatch {
                what: "SSE1 token",
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Sse1Token {
            gamma: bytes[..scheme.l].to_vec(),
            eta: bytes[scheme.l..].to_vec(),
        })
    }
}

/// SSE-1 encrypted database: the node array A and look-up table T.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sse1Edb {
    a: Vec<Vec<u8>>,
    t: HashMap<Vec<u8>, Vec<u8>>,
}

impl Sse1Edb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_array(&mut buf, &self.a);
        encode::write_map(&mut buf, &self.t);
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &Sse1) -> Result<Sse1Edb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let a = encode::read_array(&mut input, "SSE1 array")?;
        let t = encode::read_map(&mut input, "SSE1 table")?;
        encode::done(input, "SSE1 table")?;
        Ok(Sse1Edb { a, t })
    }
}

impl InvertedIndexSse for Sse1 {
    type Key = Sse1Key;
    type Edb = Sse1Edb;
    type Token = Sse1Token;
    type SearchResult = IdList;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<Sse1Key> {
        Ok(Sse1Key {
            k1: urandom(rng, self.k),
            k2: urandom(rng, self.k),
            k3: urandom(rng, self.k),
            k4: urandom(rng, self.k),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &Sse1Key,
        db: &Database,
        rng: &mut R,
    ) -> Result<Sse1Edb> {
        let n_total = db.total_size();
        if n_total >= self.s {
            return Err(Error::SizeOverflow {
                what: "SSE1 array",
                limit: self.s - 1,
                actual: n_total,
            });
        }
        if db.keyword_count() > self.dictionary_size {
            return Err(Error::SizeOverflow {
                what: "SSE1 look-up table",
                limit: self.dictionary_size,
                actual: db.keyword_count(),
            });
        }

        let addr_size = self.addr_size();
        let mut a: Vec<Option<Vec<u8>>> = vec![None; self.s];
        let mut t = HashMap::new();
        let mut ctr: u64 = 1;

        for (keyword, ids) in db.iter() {
            if ids.is_empty() {
                log::debug!("SSE1 setup: skipping keyword with empty posting list");
                continue;
            }
            for id in ids {
                if id.len() != self.id_size {
                    return Err(Error::LengthMismatch {
                        what: "SSE1 identifier",
                        expected: self.id_size,
                        actual: id.len(),
                    });
                }
            }

            let head_key = urandom(rng, self.k);
            let mut prev_key = head_key.clone();
            let mut head_addr: Option<Vec<u8>> = None;

            // all but the last node carry the key and address of their
            // successor
            for j in 1..ids.len() {
                let next_key = self.ske1.key_gen(rng);
                let mut node = ids[j - 1].clone();
                node.extend_from_slice(&next_key);
                node.extend_from_slice(&self.permuted_addr(&key.k1, ctr + 1)?);

                let addr = self.permuted_addr(&key.k1, ctr)?;
                let slot = int_from_bytes(&addr)? as usize;
                a[slot] = Some(self.ske1.encrypt(&prev_key, &node, rng)?);
                if j == 1 {
                    head_addr = Some(addr);
                }
                prev_key = next_key;
                ctr += 1;
            }

            // terminal node: zero key, zero next-address
            let mut node = ids[ids.len() - 1].clone();
            node.extend_from_slice(&vec![0u8; self.k]);
            node.extend_from_slice(&vec![0u8; addr_size]);
            let addr = self.permuted_addr(&key.k1, ctr)?;
            let slot = int_from_bytes(&addr)? as usize;
            a[slot] = Some(self.ske1.encrypt(&prev_key, &node, rng)?);
            let head_addr = head_addr.unwrap_or(addr);
            ctr += 1;

            let mut entry = head_addr;
            entry.extend_from_slice(&head_key);
            let mask = self.keyword_mask(&key.k2, keyword)?;
            t.insert(self.permuted_keyword(&key.k3, keyword)?, xor(&entry, &mask));
        }

        // every untouched cell becomes a random string of the exact size a
        // real encrypted node occupies
        let node_cipher_len = self.ske1.ciphertext_len(self.node_size());
        let a = a
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| urandom(rng, node_cipher_len)))
            .collect();

        // pad T with random entries until |T| = |Δ|
        let value_len = self.prf_f.output_len();
        while t.len() < self.dictionary_size {
            t.insert(urandom(rng, self.l), urandom(rng, value_len));
        }
        log::debug!(
            "SSE1 setup: {} chains over {} cells, table of {}",
            db.keyword_count(),
            self.s,
            t.len()
        );

        Ok(Sse1Edb { a, t })
    }

    fn token_gen(&self, key: &Sse1Key, keyword: &[u8]) -> Result<Sse1Token> {
        Ok(Sse1Token {
            gamma: self.permuted_keyword(&key.k3, keyword)?,
            eta: self.keyword_mask(&key.k2, keyword)?,
        })
    }

    fn search(&self, edb: &Sse1Edb, token: &Sse1Token) -> Result<IdList> {
        let theta = match edb.t.get(&token.gamma) {
            None => return Ok(IdList::default()),
            Some(theta) => theta,
        };
        let addr_size = self.addr_size();
        if theta.len() != addr_size + self.k {
            return Err(Error::Decryption);
        }
        let unmasked = xor(theta, &token.eta);
        let mut addr = unmasked[..addr_size].to_vec();
        let mut node_key = unmasked[addr_size..].to_vec();

        let mut result = Vec::new();
        // a well-formed chain never revisits a cell, so more than s steps
        // means the structure is corrupt
        for _ in 0..self.s {
            let slot = int_from_bytes(&addr)? as usize;
            let cell = edb.a.get(slot).ok_or(Error::Decryption)?;
            let node = self.ske1.decrypt(&node_key, cell)?;
            if node.len() != self.node_size() {
                return Err(Error::Decryption);
            }
            result.push(node[..self.id_size].to_vec());
            let next_addr = &node[self.id_size + self.k..];
            if next_addr.iter().all(|&b| b == 0) {
                return Ok(IdList(result));
            }
            node_key = node[self.id_size..self.id_size + self.k].to_vec();
            addr = next_addr.to_vec();
        }
        Err(Error::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::testing::fake_db;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_scheme() -> Sse1 {
        // a small array keeps setup fast while exercising every code path
        Sse1::new(Sse1Params {
            param_s: 1 << 10,
            param_dictionary_size: 1 << 10,
            ..Sse1Params::default()
        })
        .unwrap()
    }

    fn two_keyword_db() -> Database {
        let mut db = Database::new();
        db.insert(
            b"China".to_vec(),
            vec![b"12345678".to_vec(), b"23221233".to_vec(), b"23421232".to_vec()],
        );
        db.insert(
            b"Ukraine".to_vec(),
            vec![
                b"\x00\x00az\x02\x03sc".to_vec(),
                b"\x00\x00\x00\x00\x01\x00\x02\x01".to_vec(),
            ],
        );
        db
    }

    #[test]
    fn two_keywords_in_order() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(31);
        let db = two_keyword_db();
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();

        let token = scheme.token_gen(&key, b"China").unwrap();
        assert_eq!(
            scheme.search(&edb, &token).unwrap().0,
            vec![b"12345678".to_vec(), b"23221233".to_vec(), b"23421232".to_vec()]
        );
        let token = scheme.token_gen(&key, b"Ukraine").unwrap();
        assert_eq!(
            scheme.search(&edb, &token).unwrap().0,
            vec![
                b"\x00\x00az\x02\x03sc".to_vec(),
                b"\x00\x00\x00\x00\x01\x00\x02\x01".to_vec()
            ]
        );
    }

    #[test]
    fn padding_fills_array_and_table() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(32);
        let db = two_keyword_db();
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        assert_eq!(edb.a.len(), 1 << 10);
        assert_eq!(edb.t.len(), 1 << 10);
        let cell_len = scheme.ske1.ciphertext_len(scheme.node_size());
        assert!(edb.a.iter().all(|cell| cell.len() == cell_len));
    }

    #[test]
    fn random_databases() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(33);
        let db = fake_db(&mut rng, 16, 8, 20, (1, 10));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        for (keyword, ids) in db.iter() {
            let token = scheme.token_gen(&key, keyword).unwrap();
            assert_eq!(&scheme.search(&edb, &token).unwrap().0, ids);
        }
    }

    #[test]
    fn overfull_database_is_rejected() {
        let scheme = Sse1::new(Sse1Params {
            param_s: 4,
            param_dictionary_size: 16,
            ..Sse1Params::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(34);
        let mut db = Database::new();
        db.insert(
            b"w".to_vec(),
            (0..4u8).map(|i| vec![i + 1; 8]).collect::<Vec<_>>(),
        );
        let key = scheme.key_gen(&mut rng).unwrap();
        assert!(matches!(
            scheme.edb_setup(&key, &db, &mut rng),
            Err(Error::SizeOverflow { .. })
        ));
    }

    #[test]
    fn non_power_of_two_array_is_a_config_error() {
        let params = Sse1Params {
            param_s: 1000,
            ..Sse1Params::default()
        };
        assert!(matches!(Sse1::new(params), Err(Error::Config(_))));
    }

    #[test]
    fn serialization_round_trips() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(35);
        let db = two_keyword_db();
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"China").unwrap();
        let result = scheme.search(&edb, &token).unwrap();

        assert_eq!(Sse1Key::deserialize(&key.serialize(), &scheme).unwrap(), key);
        assert_eq!(Sse1Edb::deserialize(&edb.serialize(), &scheme).unwrap(), edb);
        assert_eq!(Sse1Token::deserialize(&token.serialize(), &scheme).unwrap(), token);
        assert_eq!(IdList::deserialize(&result.serialize()).unwrap(), result);
    }

    #[test]
    fn tokens_are_deterministic() {
        let scheme = small_scheme();
        let mut rng = StdRng::seed_from_u64(36);
        let key = scheme.key_gen(&mut rng).unwrap();
        assert_eq!(
            scheme.token_gen(&key, b"China").unwrap(),
            scheme.token_gen(&key, b"China").unwrap()
        );
        assert_ne!(
            scheme.token_gen(&key, b"China").unwrap(),
            scheme.token_gen(&key, b"Chile").unwrap()
        );
    }
}
