//! The plaintext inverted index handed to `EDBSetup`.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// A mapping from keyword to an ordered list of file identifiers. Keywords
/// iterate in a deterministic order; the identifier order within a keyword
/// is preserved, since several schemes return results in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Database {
    entries: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl Database {
    /// An empty database.
    pub fn new() -> Database {
        Database::default()
    }

    /// Set the posting list for a keyword, replacing any previous one.
    pub fn insert(&mut self, keyword: impl Into<Vec<u8>>, ids: Vec<Vec<u8>>) {
        self.entries.insert(keyword.into(), ids);
    }

    /// Append one identifier to a keyword's posting list.
    pub fn push(&mut self, keyword: impl Into<Vec<u8>>, id: impl Into<Vec<u8>>) {
        self.entries.entry(keyword.into()).or_default().push(id.into());
    }

    /// The posting list for a keyword, if present.
    pub fn get(&self, keyword: &[u8]) -> Option<&[Vec<u8>]> {
        self.entries.get(keyword).map(|v| v.as_slice())
    }

    /// True if the keyword has an entry.
    pub fn contains(&self, keyword: &[u8]) -> bool {
        self.entries.contains_key(keyword)
    }

    /// Iterate over `(keyword, posting list)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<Vec<u8>>)> {
        self.entries.iter()
    }

    /// The number of distinct keywords, K.
    pub fn keyword_count(&self) -> usize {
        self.entries.len()
    }

    /// The total number of postings, N = Σ_w |DB(w)|.
    pub fn total_size(&self) -> usize {
        self.entries.values().map(|ids| ids.len()).sum()
    }

    /// The number of distinct file identifiers, F.
    pub fn distinct_file_count(&self) -> usize {
        let mut files: BTreeSet<&[u8]> = BTreeSet::new();
        for ids in self.entries.values() {
            for id in ids {
                files.insert(id);
            }
        }
        files.len()
    }

    /// Build a database from UTF-8 keywords and hex-encoded identifiers, the
    /// form test corpora usually arrive in.
    pub fn from_str_entries(entries: &[(&str, &[&str])]) -> Result<Database> {
        let mut db = Database::new();
        for (keyword, ids) in entries {
            let mut list = Vec::with_capacity(ids.len());
            for id in *ids {
                list.push(
                    hex::decode(id)
                        .map_err(|e| Error::Config(format!("bad hex identifier {:?}: {}", id, e)))?,
                );
            }
            db.insert(keyword.as_bytes().to_vec(), list);
        }
        Ok(db)
    }
}

impl FromIterator<(Vec<u8>, Vec<Vec<u8>>)> for Database {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Vec<Vec<u8>>)>>(iter: I) -> Database {
        Database {
            entries: iter.into_iter().collect(),
        }
    }
}
