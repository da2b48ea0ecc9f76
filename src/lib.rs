//! Searchable symmetric encryption for inverted-index databases.
//!
//! A data owner holds a mapping from keywords to file-identifier lists and
//! wants to hand it, encrypted, to an untrusted server so that a
//! per-keyword token — derived from a secret key the server never sees —
//! retrieves exactly that keyword's identifiers. This crate implements
//! several published constructions with differing leakage, performance,
//! and locality trade-offs behind one interface:
//!
//! - [`schemes::Sse1`] and [`schemes::Sse2`] (Curtmola et al., CGKO06)
//! - [`schemes::PiBas`], [`schemes::PiPack`], [`schemes::PiPtr`], and
//!   [`schemes::Pi2Lev`] (Cash et al., CJJ+14)
//! - [`schemes::Ct14Pi`] (Cash & Tessaro, CT14)
//! - [`schemes::Anss16S3`] (Asharov et al., ANSS16)
//! - [`schemes::Dp17Pi`] (Demertzis & Papamanthou, DP17)
//!
//! Every scheme exposes the same four operations via
//! [`InvertedIndexSse`]: `key_gen`, `edb_setup`, `token_gen`, and
//! `search`. Operations that consume randomness take the generator
//! explicitly; pass [`rand::rngs::OsRng`] unless you are testing.
//!
//! ```
//! use rand::rngs::OsRng;
//! use sse_index::schemes::{PiBas, PiBasParams};
//! use sse_index::{Database, InvertedIndexSse};
//!
//! let scheme = PiBas::new(PiBasParams::default()).unwrap();
//! let mut db = Database::new();
//! db.insert(b"rust".to_vec(), vec![b"file-001".to_vec(), b"file-007".to_vec()]);
//!
//! let key = scheme.key_gen(&mut OsRng).unwrap();
//! let edb = scheme.edb_setup(&key, &db, &mut OsRng).unwrap();
//! let token = scheme.token_gen(&key, b"rust").unwrap();
//! let hits = scheme.search(&edb, &token).unwrap();
//! assert_eq!(hits.0, vec![b"file-001".to_vec(), b"file-007".to_vec()]);
//! ```

pub mod bits;
pub mod blocks;
pub mod bytes;
pub mod db;
mod encode;
pub mod error;
pub mod hash;
pub mod prf;
pub mod prp;
pub mod random;
pub mod scheme;
pub mod schemes;
pub mod ske;

pub use self::bits::Bitset;
pub use self::db::Database;
pub use self::error::{Error, Result};
pub use self::scheme::{IdList, IdSet, InvertedIndexSse};
