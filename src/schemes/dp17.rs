//! Π (Demertzis & Papamanthou, DP17): tunable locality through bucketed
//! per-level arrays.
//!
//! Posting lists are split into at most L chunks and each chunk lands in
//! a uniformly random bucket of its size class. A hash table maps
//! `h(F_k1(w) ‖ count)` to the chunk's (level, bucket) coordinates,
//! masked with `h(F_k2(w) ‖ count)`. Buckets are topped up with random
//! filler, shuffled, and every entry is emitted as a randomized
//! ciphertext, so a search decrypts whole buckets and keeps the entries
//! whose plaintext carries the all-zero λ-byte tail.

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::bytes::{ceil_log2, int_from_bytes, int_to_bytes, int_to_bytes_min, xor};
use crate::db::Database;
use crate::encode;
use crate::error::{Error, Result};
use crate::hash::VarHash;
use crate::prf::HmacPrf;
use crate::random::urandom;
use crate::scheme::{IdSet, InvertedIndexSse};
use crate::ske::AesCbc;

const MAGIC: &[u8] = b"\x93\x94Demertzis2017LocalityPi";

/// Raw DP17-Π configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dp17PiParams {
    /// Security parameter λ: key size in bytes
    pub param_lambda: usize,
    /// Fraction of the ⌈log₂ N⌉ levels that are actually stored
    pub param_actual_storage_level_ratio: f64,
    /// Tunable locality L: bucket lookups per search
    #[serde(rename = "param_L")]
    pub param_locality: usize,
    /// Fixed identifier size in bytes
    pub param_identifier_size: usize,
    /// Randomized SKE name
    pub rnd: String,
    /// PRF name
    pub prf_f: String,
    /// Hash name
    pub hash_h: String,
}

impl Default for Dp17PiParams {
    fn default() -> Dp17PiParams {
        Dp17PiParams {
            param_lambda: 32,
            param_actual_storage_level_ratio: 0.2,
            param_locality: 1,
            param_identifier_size: 8,
            rnd: "AES-CBC".into(),
            prf_f: "HmacPRF".into(),
            hash_h: "SHA1".into(),
        }
    }
}

/// The DP17-Π scheme, holding its validated configuration.
#[derive(Clone, Debug)]
pub struct Dp17Pi {
    lambda: usize,
    level_ratio: f64,
    locality: usize,
    id_size: usize,
    rnd: AesCbc,
    prf_f: HmacPrf,
    hash_h: VarHash,
}

impl Dp17Pi {
    pub fn new(params: Dp17PiParams) -> Result<Dp17Pi> {
        if !(params.param_actual_storage_level_ratio > 0.0
            && params.param_actual_storage_level_ratio <= 1.0)
        {
            return Err(Error::Config(format!(
                "param_actual_storage_level_ratio must be in (0, 1], got {}",
                params.param_actual_storage_level_ratio
            )));
        }
        if params.param_locality == 0 {
            return Err(Error::Config("param_L must be at least 1".into()));
        }
        let rnd = AesCbc::from_name(&params.rnd, params.param_lambda)?;
        let prf_f = HmacPrf::from_name(
            &params.prf_f,
            Some(params.param_lambda),
            Some(params.param_lambda),
            None,
        )?;
        let hash_h = VarHash::from_name(&params.hash_h, None)?;
        Ok(Dp17Pi {
            lambda: params.param_lambda,
            level_ratio: params.param_actual_storage_level_ratio,
            locality: params.param_locality,
            id_size: params.param_identifier_size,
            rnd,
            prf_f,
            hash_h,
        })
    }

    pub fn from_json(json: &str) -> Result<Dp17Pi> {
        let params: Dp17PiParams =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        Dp17Pi::new(params)
    }

    /// One bucket entry's ciphertext length: RND over `id ‖ 0^λ`.
    fn entry_cipher_len(&self) -> usize {
        self.rnd.ciphertext_len(self.id_size + self.lambda)
    }

    // The stored levels for a database of N postings: s of the ℓ levels,
    // evenly spread, plus level 0 when L > 1; ascending order.
    fn levels_for(&self, n: usize) -> Vec<usize> {
        let l = ceil_log2(n);
        let mut levels: Vec<usize> = if l == 0 {
            vec![0]
        } else {
            let s = ((l as f64 * self.level_ratio).ceil() as usize).max(1);
            let p = (l + s - 1) / s;
            (0..s)
                .map(|i| l as isize - (i * p) as isize)
                .filter(|&v| v >= 0)
                .map(|v| v as usize)
                .collect()
        };
        if self.locality > 1 {
            levels.push(0);
        }
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    // h(F_k(w) ‖ count), the hash-table label or its mask.
    fn counted_digest(&self, tag: &[u8], count: u64) -> Vec<u8> {
        let mut input = tag.to_vec();
        input.extend_from_slice(&int_to_bytes_min(count));
        self.hash_h.digest(&input)
    }

    fn pack_coordinates(&self, level: usize, bucket: usize) -> Result<Vec<u8>> {
        let digest = self.hash_h.output_len();
        let mut out = int_to_bytes(level as u64, digest / 2)?;
        out.extend_from_slice(&int_to_bytes(bucket as u64, digest - digest / 2)?);
        Ok(out)
    }

    fn unpack_coordinates(&self, bytes: &[u8]) -> Result<(usize, usize)> {
        let digest = self.hash_h.output_len();
        if bytes.len() != digest {
            return Err(Error::LengthMismatch {
                what: "DP17 coordinates",
                expected: digest,
                actual: bytes.len(),
            });
        }
        let level = int_from_bytes(&bytes[..digest / 2])? as usize;
        let bucket = int_from_bytes(&bytes[digest / 2..])? as usize;
        Ok((level, bucket))
    }
}

// A bucket roster entry: a real posting or filler to be emitted as
// random bytes.
enum Entry {
    Real { keyword: Vec<u8>, id: Vec<u8> },
    Filler,
}

/// DP17 master key: three independent λ-byte strings.
#[derive(Clone, Debug)]
pub struct Dp17PiKey {
    k1: Vec<u8>,
    k2: Vec<u8>,
    k3: Vec<u8>,
}

impl PartialEq for Dp17PiKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.k1, &other.k1)
            && constant_time_eq::constant_time_eq(&self.k2, &other.k2)
            && constant_time_eq::constant_time_eq(&self.k3, &other.k3)
    }
}

impl Eq for Dp17PiKey {}

impl Dp17PiKey {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.k1.clone();
        out.extend_from_slice(&self.k2);
        out.extend_from_slice(&self.k3);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Dp17Pi) -> Result<Dp17PiKey> {
        if bytes.len() != 3 * scheme.lambda {
            return Err(Error::LengthMismatch {
                what: "DP17 key",
                expected: 3 * scheme.lambda,
                actual: bytes.len(),
            });
        }
        let lambda = scheme.lambda;
        Ok(Dp17PiKey {
            k1: bytes[..lambda].to_vec(),
            k2: bytes[lambda..2 * lambda].to_vec(),
            k3: bytes[2 * lambda..].to_vec(),
        })
    }
}

/// DP17 search token: `(tag, vtag, etag)`.
#[derive(Clone, Debug)]
pub struct Dp17PiToken {
    tag: Vec<u8>,
    vtag: Vec<u8>,
    etag: Vec<u8>,
}

impl PartialEq for Dp17PiToken {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.tag, &other.tag)
            && constant_time_eq::constant_time_eq(&self.vtag, &other.vtag)
            && constant_time_eq::constant_time_eq(&self.etag, &other.etag)
    }
}

impl Eq for Dp17PiToken {}

impl Dp17PiToken {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.tag.clone();
        out.extend_from_slice(&self.vtag);
        out.extend_from_slice(&self.etag);
        out
    }

    pub fn deserialize(bytes: &[u8], scheme: &Dp17Pi) -> Result<Dp17PiToken> {
        let part = scheme.lambda;
        if bytes.len() != 3 * part {
            return Err(Error::LengthMismatch {
                what: "DP17 token",
                expected: 3 * part,
                actual: bytes.len(),
            });
        }
        Ok(Dp17PiToken {
            tag: bytes[..part].to_vec(),
            vtag: bytes[part..2 * part].to_vec(),
            etag: bytes[2 * part..].to_vec(),
        })
    }
}

/// DP17 encrypted database: the masked hash table and one bucket array
/// per stored level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dp17PiEdb {
    table: HashMap<Vec<u8>, Vec<u8>>,
    arrays: BTreeMap<usize, Vec<Vec<u8>>>,
}

impl Dp17PiEdb {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_header(&mut buf, MAGIC);
        encode::write_map(&mut buf, &self.table);
        encode::write_u64(&mut buf, self.arrays.len() as u64);
        for (level, buckets) in &self.arrays {
            encode::write_u64(&mut buf, *level as u64);
            encode::write_array(&mut buf, buckets);
        }
        buf
    }

    pub fn deserialize(bytes: &[u8], _scheme: &Dp17Pi) -> Result<Dp17PiEdb> {
        let mut input = bytes;
        encode::read_header(&mut input, MAGIC)?;
        let table = encode::read_map(&mut input, "DP17 hash table")?;
        let count = encode::read_u64(&mut input, "DP17 level count")? as usize;
        let mut arrays = BTreeMap::new();
        for _ in 0..count {
            let level = encode::read_u64(&mut input, "DP17 level")? as usize;
            arrays.insert(level, encode::read_array(&mut input, "DP17 level array")?);
        }
        encode::done(input, "DP17 level array")?;
        Ok(Dp17PiEdb { table, arrays })
    }
}

impl InvertedIndexSse for Dp17Pi {
    type Key = Dp17PiKey;
    type Edb = Dp17PiEdb;
    type Token = Dp17PiToken;
    type SearchResult = IdSet;

    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<Dp17PiKey> {
        Ok(Dp17PiKey {
            k1: urandom(rng, self.lambda),
            k2: urandom(rng, self.lambda),
            k3: urandom(rng, self.lambda),
        })
    }

    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &Dp17PiKey,
        db: &Database,
        rng: &mut R,
    ) -> Result<Dp17PiEdb> {
        let n = db.total_size();
        if n == 0 {
            return Ok(Dp17PiEdb {
                table: HashMap::new(),
                arrays: BTreeMap::new(),
            });
        }
        let levels = self.levels_for(n);
        log::debug!("DP17 setup: N = {}, levels {:?}", n, levels);

        // per level: bucket capacities and rosters
        let mut remaining: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut rosters: BTreeMap<usize, Vec<Vec<Entry>>> = BTreeMap::new();
        for &i in &levels {
            let bucket_size = 1usize << (i + 1);
            let array_size = 2 * n + bucket_size;
            let mut capacities = Vec::new();
            let mut start = 0usize;
            while start < array_size {
                capacities.push(bucket_size.min(array_size - start));
                start += bucket_size;
            }
            rosters.insert(i, (0..capacities.len()).map(|_| Vec::new()).collect());
            remaining.insert(i, capacities);
        }

        let mut table = HashMap::new();
        for (keyword, ids) in db.iter() {
            if ids.is_empty() {
                continue;
            }
            // smallest stored level i with L·2^i ≥ |DB(w)| (the lower
            // bound is ignored for the smallest level)
            let i = *levels
                .iter()
                .find(|&&i| self.locality << i >= ids.len())
                .ok_or(Error::SizeOverflow {
                    what: "DP17 posting list",
                    limit: self.locality << levels[levels.len() - 1],
                    actual: ids.len(),
                })?;
            let chunk_size = 1usize << i;
            let tag = self.prf_f.eval(&key.k1, keyword)?;
            let vtag = self.prf_f.eval(&key.k2, keyword)?;

            for (chunk_index, chunk) in ids.chunks(chunk_size).enumerate() {
                let count = (chunk_index + 1) as u64;
                // a uniformly random bucket with room for a full chunk
                let rem = remaining.get_mut(&i).expect("level was initialized");
                let eligible: Vec<usize> = rem
                    .iter()
                    .enumerate()
                    .filter(|(_, &space)| space >= chunk_size)
                    .map(|(x, _)| x)
                    .collect();
                let &x = eligible
                    .choose(rng)
                    .ok_or(Error::SizeOverflow {
                        what: "DP17 bucket capacity",
                        limit: 2 * n,
                        actual: ids.len(),
                    })?;
                let roster = rosters.get_mut(&i).expect("level was initialized");
                for id in chunk {
                    if id.len() != self.id_size {
                        return Err(Error::LengthMismatch {
                            what: "DP17 identifier",
                            expected: self.id_size,
                            actual: id.len(),
                        });
                    }
                    roster[x].push(Entry::Real {
                        keyword: keyword.clone(),
                        id: id.clone(),
                    });
                }
                let label = self.counted_digest(&tag, count);
                let mask = self.counted_digest(&vtag, count);
                let coords = self.pack_coordinates(i, x)?;
                table.insert(label, xor(&coords, &mask));
                rem[x] -= chunk.len();
            }
        }

        // pad the hash table to N entries with random pairs
        let digest = self.hash_h.output_len();
        while table.len() < n {
            table.insert(urandom(rng, digest), urandom(rng, digest));
        }

        // emit each bucket: filler to capacity, shuffle, then one
        // ciphertext-sized string per entry
        let cipher_len = self.entry_cipher_len();
        let mut arrays = BTreeMap::new();
        for &i in &levels {
            let rem = &remaining[&i];
            let mut buckets = Vec::new();
            for (x, mut roster) in rosters.remove(&i).expect("level was initialized").into_iter().enumerate()
            {
                for _ in 0..rem[x] {
                    roster.push(Entry::Filler);
                }
                roster.shuffle(rng);
                let mut bucket = Vec::with_capacity(roster.len() * cipher_len);
                for entry in &roster {
                    match entry {
                        Entry::Real { keyword, id } => {
                            let entry_key = self.prf_f.eval(&key.k3, keyword)?;
                            let mut plain = id.clone();
                            plain.extend_from_slice(&vec![0u8; self.lambda]);
                            bucket.extend_from_slice(&self.rnd.encrypt(&entry_key, &plain, rng)?);
                        }
                        Entry::Filler => {
                            bucket.extend_from_slice(&urandom(rng, cipher_len));
                        }
                    }
                }
                buckets.push(bucket);
            }
            arrays.insert(i, buckets);
        }

        Ok(Dp17PiEdb { table, arrays })
    }

    fn token_gen(&self, key: &Dp17PiKey, keyword: &[u8]) -> Result<Dp17PiToken> {
        Ok(Dp17PiToken {
            tag: self.prf_f.eval(&key.k1, keyword)?,
            vtag: self.prf_f.eval(&key.k2, keyword)?,
            etag: self.prf_f.eval(&key.k3, keyword)?,
        })
    }

    /// Probe the hash table for each of the L possible chunks and decrypt
    /// the buckets they point at. Decryption failures are expected here:
    /// they mark filler entries and entries belonging to other keywords,
    /// and are silently skipped.
    fn search(&self, edb: &Dp17PiEdb, token: &Dp17PiToken) -> Result<IdSet> {
        let mut result = IdSet::default();
        let cipher_len = self.entry_cipher_len();
        for count in 1..=self.locality as u64 {
            let label = self.counted_digest(&token.tag, count);
            let masked = match edb.table.get(&label) {
                None => continue,
                Some(value) => value,
            };
            let coords = xor(masked, &self.counted_digest(&token.vtag, count));
            let (level, bucket_index) = match self.unpack_coordinates(&coords) {
                Ok(pair) => pair,
                Err(_) => continue,
            };
            let bucket = match edb.arrays.get(&level).and_then(|b| b.get(bucket_index)) {
                None => continue,
                Some(bucket) => bucket,
            };
            for cipher in bucket.chunks(cipher_len) {
                let plain = match self.rnd.decrypt(&token.etag, cipher) {
                    Ok(plain) => plain,
                    Err(_) => continue,
                };
                if plain.len() < self.lambda {
                    continue;
                }
                let (id, tail) = plain.split_at(plain.len() - self.lambda);
                if tail.iter().all(|&b| b == 0) {
                    result.0.insert(id.to_vec());
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::testing::{fake_db, nonzero_id};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn scheme() -> Dp17Pi {
        Dp17Pi::new(Dp17PiParams::default()).unwrap()
    }

    #[test]
    fn simple_round_trip() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(71);
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
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"China").unwrap();
        let expected: BTreeSet<Vec<u8>> = db.get(b"China").unwrap().iter().cloned().collect();
        assert_eq!(scheme.search(&edb, &token).unwrap().0, expected);
    }

    #[test]
    fn thousand_identifiers_with_locality_one() {
        // L = 1, ratio 0.5: one chunk must hold the whole list
        let scheme = Dp17Pi::new(Dp17PiParams {
            param_actual_storage_level_ratio: 0.5,
            ..Dp17PiParams::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(72);
        let mut ids = BTreeSet::new();
        while ids.len() < 1000 {
            ids.insert(nonzero_id(&mut rng, 8));
        }
        let ids: Vec<Vec<u8>> = ids.into_iter().collect();
        let mut db = Database::new();
        db.insert(b"heavy".to_vec(), ids.clone());
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"heavy").unwrap();
        let expected: BTreeSet<Vec<u8>> = ids.into_iter().collect();
        assert_eq!(scheme.search(&edb, &token).unwrap().0, expected);
    }

    #[test]
    fn higher_locality_spreads_chunks() {
        let scheme = Dp17Pi::new(Dp17PiParams {
            param_locality: 4,
            ..Dp17PiParams::default()
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(73);
        let db = fake_db(&mut rng, 12, 8, 30, (1, 40));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        for (keyword, ids) in db.iter() {
            let token = scheme.token_gen(&key, keyword).unwrap();
            let expected: BTreeSet<Vec<u8>> = ids.iter().cloned().collect();
            assert_eq!(scheme.search(&edb, &token).unwrap().0, expected, "kw {:?}", keyword);
        }
    }

    #[test]
    fn absent_keyword_is_empty() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(74);
        let db = fake_db(&mut rng, 12, 8, 8, (1, 10));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"ghost").unwrap();
        assert!(scheme.search(&edb, &token).unwrap().is_empty());
    }

    #[test]
    fn hash_table_is_padded_to_n() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(75);
        let db = fake_db(&mut rng, 12, 8, 10, (1, 6));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        assert_eq!(edb.table.len(), db.total_size());
    }

    #[test]
    fn serialization_round_trips() {
        let scheme = scheme();
        let mut rng = StdRng::seed_from_u64(76);
        let db = fake_db(&mut rng, 12, 8, 10, (1, 12));
        let key = scheme.key_gen(&mut rng).unwrap();
        let edb = scheme.edb_setup(&key, &db, &mut rng).unwrap();
        let token = scheme.token_gen(&key, b"anything").unwrap();
        assert_eq!(Dp17PiKey::deserialize(&key.serialize(), &scheme).unwrap(), key);
        assert_eq!(Dp17PiEdb::deserialize(&edb.serialize(), &scheme).unwrap(), edb);
        assert_eq!(Dp17PiToken::deserialize(&token.serialize(), &scheme).unwrap(), token);
    }
}
