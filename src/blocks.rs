//! Packing fixed-size identifiers into fixed-size blocks.
//!
//! Several schemes store posting lists as blocks holding a fixed number of
//! identifiers, with the final block zero-padded. Parsing reads identifiers
//! left to right and stops at the first all-zero one, so callers must
//! reserve the all-zero identifier as never naming a real file.

use crate::error::{Error, Result};

/// Pack `entries` into blocks of `entry_count` entries each, zero-padding
/// every block out to `block_size` bytes (default `entry_count·entry_size`).
/// Blocks are produced lazily.
pub fn partition<'a>(
    entries: &'a [Vec<u8>],
    entry_count: usize,
    entry_size: usize,
    block_size: Option<usize>,
) -> Result<impl Iterator<Item = Vec<u8>> + 'a> {
    let block_size = block_size.unwrap_or(entry_count * entry_size);
    if block_size < entry_count * entry_size {
        return Err(Error::Config(format!(
            "block size {} is too small for {} entries of {} bytes",
            block_size, entry_count, entry_size
        )));
    }
    Ok(entries.chunks(entry_count.max(1)).map(move |chunk| {
        let mut block = Vec::with_capacity(block_size);
        for entry in chunk {
            block.extend_from_slice(entry);
        }
        block.resize(block_size, 0);
        block
    }))
}

/// Read identifiers of `id_size` bytes from a block, stopping at the first
/// all-zero identifier.
pub fn parse_by_id_size(block: &[u8], id_size: usize) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in block.chunks(id_size.max(1)) {
        if chunk.iter().all(|&b| b == 0) {
            break;
        }
        out.push(chunk.to_vec());
    }
    out
}

/// Read identifiers from a block known to hold `count` of them, stopping at
/// the first all-zero identifier.
pub fn parse_by_count(block: &[u8], count: usize) -> Vec<Vec<u8>> {
    let id_size = block.len() / count.max(1);
    parse_by_id_size(block, id_size)
}
