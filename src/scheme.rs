//! The interface every inverted-index SSE construction exports.

use std::collections::BTreeSet;

use rand::RngCore;

use crate::db::Database;
use crate::encode;
use crate::error::Result;

/// The four operations of an inverted-index SSE scheme.
///
/// All four are pure functions of their inputs plus the randomness drawn
/// from `rng`; none keeps state between calls, so a scheme value can be
/// shared freely across threads. `KeyGen` and `EDBSetup` consume fresh
/// randomness and must be given a cryptographically secure generator in
/// production; `TokenGen` and `Search` are deterministic.
pub trait InvertedIndexSse {
    type Key;
    type Edb;
    type Token;
    type SearchResult;

    /// Sample a fresh secret key.
    fn key_gen<R: RngCore + ?Sized>(&self, rng: &mut R) -> Result<Self::Key>;

    /// Encrypt a database under `key`. The input database is never
    /// modified, even by schemes that pad it internally.
    fn edb_setup<R: RngCore + ?Sized>(
        &self,
        key: &Self::Key,
        db: &Database,
        rng: &mut R,
    ) -> Result<Self::Edb>;

    /// Derive the search token for one keyword.
    fn token_gen(&self, key: &Self::Key, keyword: &[u8]) -> Result<Self::Token>;

    /// Run a token against an encrypted database. A keyword absent from
    /// the database yields an empty result, never an error.
    fn search(&self, edb: &Self::Edb, token: &Self::Token) -> Result<Self::SearchResult>;
}

/// An ordered list of file identifiers, the result shape of every scheme
/// whose search walk has a defined order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdList(pub Vec<Vec<u8>>);

impl IdList {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode::write_array(&mut buf, &self.0);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<IdList> {
        let mut input = bytes;
        let ids = encode::read_array(&mut input, "result list")?;
        encode::done(input, "result list")?;
        Ok(IdList(ids))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An unordered set of file identifiers (DP17 returns its results as a
/// set). Held in a `BTreeSet` so serialization is canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdSet(pub BTreeSet<Vec<u8>>);

impl IdSet {
    pub fn serialize(&self) -> Vec<u8> {
        let items: Vec<Vec<u8>> = self.0.iter().cloned().collect();
        let mut buf = Vec::new();
        encode::write_array(&mut buf, &items);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<IdSet> {
        let mut input = bytes;
        let ids = encode::read_array(&mut input, "result set")?;
        encode::done(input, "result set")?;
        Ok(IdSet(ids.into_iter().collect()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use rand::RngCore;

    use crate::db::Database;
    use crate::random::urandom;

    /// Build a random database in the shape the scheme tests expect:
    /// distinct keywords of a fixed size, posting lists of nonzero
    /// identifiers with lengths drawn from `list_len_range`.
    pub fn fake_db<R: RngCore + ?Sized>(
        rng: &mut R,
        keyword_size: usize,
        id_size: usize,
        keyword_count: usize,
        list_len_range: (usize, usize),
    ) -> Database {
        use rand::Rng;

        let mut db = Database::new();
        while db.keyword_count() < keyword_count {
            let keyword = urandom(rng, keyword_size);
            if db.contains(&keyword) {
                continue;
            }
            let len = rng.gen_range(list_len_range.0..=list_len_range.1);
            let mut ids = Vec::with_capacity(len);
            for _ in 0..len {
                ids.push(nonzero_id(rng, id_size));
            }
            db.insert(keyword, ids);
        }
        db
    }

    /// A random identifier that is never all-zero (the block codec reserves
    /// the all-zero identifier as its padding sentinel).
    pub fn nonzero_id<R: RngCore + ?Sized>(rng: &mut R, id_size: usize) -> Vec<u8> {
        loop {
            let id = urandom(rng, id_size);
            if id.iter().any(|&b| b != 0) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_round_trip() {
        let list = IdList(vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(IdList::deserialize(&list.serialize()).unwrap(), list);
        let empty = IdList::default();
        assert_eq!(IdList::deserialize(&empty.serialize()).unwrap(), empty);
    }

    #[test]
    fn id_set_round_trip() {
        let mut set = IdSet::default();
        set.0.insert(b"one".to_vec());
        set.0.insert(b"two".to_vec());
        assert_eq!(IdSet::deserialize(&set.serialize()).unwrap(), set);
    }
}
