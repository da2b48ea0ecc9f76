//! The published SSE constructions.

use rand::{Rng, RngCore};

use crate::db::Database;
use crate::random::urandom;

pub mod anss16;
pub mod ct14;
pub mod dp17;
pub mod pi2lev;
pub mod pibas;
pub mod pipack;
pub mod piptr;
pub mod sse1;
pub mod sse2;

pub use self::anss16::{Anss16S3, Anss16S3Edb, Anss16S3Key, Anss16S3Params, Anss16S3Token};
pub use self::ct14::{Ct14Pi, Ct14PiEdb, Ct14PiKey, Ct14PiParams, Ct14PiToken};
pub use self::dp17::{Dp17Pi, Dp17PiEdb, Dp17PiKey, Dp17PiParams, Dp17PiToken};
pub use self::pi2lev::{Pi2Lev, Pi2LevEdb, Pi2LevKey, Pi2LevParams, Pi2LevToken};
pub use self::pibas::{PiBas, PiBasEdb, PiBasKey, PiBasParams, PiBasToken};
pub use self::pipack::{PiPack, PiPackEdb, PiPackKey, PiPackParams, PiPackToken};
pub use self::piptr::{PiPtr, PiPtrEdb, PiPtrKey, PiPtrParams, PiPtrToken};
pub use self::sse1::{Sse1, Sse1Edb, Sse1Key, Sse1Params, Sse1Token};
pub use self::sse2::{Sse2, Sse2Edb, Sse2Key, Sse2Params, Sse2Token};

/// Size of the dummy keywords used when padding a database.
const DUMMY_KEYWORD_SIZE: usize = 32;

/// Deep-copy `db` and add dummy (keyword, identifier-list) pairs until the
/// total posting count reaches 2^t. The caller's database is never
/// touched.
pub(crate) fn pad_to_power_of_two<R: RngCore + ?Sized>(
    db: &Database,
    id_size: usize,
    t: usize,
    rng: &mut R,
) -> Database {
    let mut padded = db.clone();
    let mut n = padded.total_size();
    while n < 1 << t {
        let keyword = urandom(rng, DUMMY_KEYWORD_SIZE);
        if padded.contains(&keyword) {
            continue;
        }
        let gap = (1 << t) - n;
        let count = rng.gen_range(1..=gap);
        let ids = (0..count).map(|_| urandom(rng, id_size)).collect();
        padded.insert(keyword, ids);
        n += count;
    }
    padded
}
