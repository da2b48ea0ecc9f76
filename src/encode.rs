//! Binary encoding helpers for the serialized scheme structures.
//!
//! Everything on the wire is built from three forms: fixed-size fields,
//! length-prefixed chunks (u64 big-endian length, then the bytes), and
//! counted collections of chunks. Maps are written with their keys sorted
//! so equal structures serialize identically.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

pub fn write_u64(buf: &mut Vec<u8>, value: u64) {
    let mut field = [0u8; 8];
    BigEndian::write_u64(&mut field, value);
    buf.extend_from_slice(&field);
}

pub fn read_u64(input: &mut &[u8], step: &'static str) -> Result<u64> {
    if input.len() < 8 {
        return Err(Error::LengthTooShort {
            step,
            actual: input.len(),
            expected: 8,
        });
    }
    let value = BigEndian::read_u64(&input[..8]);
    *input = &input[8..];
    Ok(value)
}

/// Consume exactly `n` bytes.
pub fn take(input: &mut &[u8], n: usize, step: &'static str) -> Result<Vec<u8>> {
    if input.len() < n {
        return Err(Error::LengthTooShort {
            step,
            actual: input.len(),
            expected: n,
        });
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head.to_vec())
}

pub fn write_chunk(buf: &mut Vec<u8>, data: &[u8]) {
    write_u64(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

pub fn read_chunk(input: &mut &[u8], step: &'static str) -> Result<Vec<u8>> {
    let len = read_u64(input, step)? as usize;
    take(input, len, step)
}

pub fn write_array(buf: &mut Vec<u8>, items: &[Vec<u8>]) {
    write_u64(buf, items.len() as u64);
    for item in items {
        write_chunk(buf, item);
    }
}

pub fn read_array(input: &mut &[u8], step: &'static str) -> Result<Vec<Vec<u8>>> {
    let count = read_u64(input, step)? as usize;
    let mut items = Vec::new();
    for _ in 0..count {
        items.push(read_chunk(input, step)?);
    }
    Ok(items)
}

pub fn write_map(buf: &mut Vec<u8>, map: &HashMap<Vec<u8>, Vec<u8>>) {
    let mut keys: Vec<&Vec<u8>> = map.keys().collect();
    keys.sort();
    write_u64(buf, map.len() as u64);
    for key in keys {
        write_chunk(buf, key);
        write_chunk(buf, &map[key]);
    }
}

pub fn read_map(input: &mut &[u8], step: &'static str) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
    let count = read_u64(input, step)? as usize;
    let mut map = HashMap::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        let key = read_chunk(input, step)?;
        let value = read_chunk(input, step)?;
        map.insert(key, value);
    }
    Ok(map)
}

pub fn write_header(buf: &mut Vec<u8>, magic: &[u8]) {
    buf.extend_from_slice(magic);
}

pub fn read_header(input: &mut &[u8], magic: &[u8]) -> Result<()> {
    if input.len() < magic.len() || &input[..magic.len()] != magic {
        return Err(Error::BadHeader(format!(
            "expected {:?}",
            String::from_utf8_lossy(magic)
        )));
    }
    *input = &input[magic.len()..];
    Ok(())
}

/// Require that the decoder consumed the whole input.
pub fn done(input: &[u8], step: &'static str) -> Result<()> {
    if !input.is_empty() {
        return Err(Error::LengthTooShort {
            step,
            actual: input.len(),
            expected: 0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trip() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, b"hello");
        write_chunk(&mut buf, b"");
        let mut input = &buf[..];
        assert_eq!(read_chunk(&mut input, "t").unwrap(), b"hello".to_vec());
        assert_eq!(read_chunk(&mut input, "t").unwrap(), Vec::<u8>::new());
        assert!(done(input, "t").is_ok());
    }

    #[test]
    fn truncation_is_detected() {
        let mut buf = Vec::new();
        write_chunk(&mut buf, b"hello");
        let mut input = &buf[..buf.len() - 1];
        assert!(matches!(
            read_chunk(&mut input, "t"),
            Err(Error::LengthTooShort { .. })
        ));
    }

    #[test]
    fn map_round_trip_is_order_independent() {
        let mut map = HashMap::new();
        map.insert(b"b".to_vec(), b"2".to_vec());
        map.insert(b"a".to_vec(), b"1".to_vec());
        let mut buf = Vec::new();
        write_map(&mut buf, &map);
        let mut input = &buf[..];
        assert_eq!(read_map(&mut input, "t").unwrap(), map);
    }

    #[test]
    fn headers() {
        let mut buf = Vec::new();
        write_header(&mut buf, b"\x93\x94Test");
        write_u64(&mut buf, 7);
        let mut input = &buf[..];
        assert!(read_header(&mut input, b"\x93\x94Test").is_ok());
        assert_eq!(read_u64(&mut input, "t").unwrap(), 7);
        let mut wrong = &buf[..];
        assert!(matches!(
            read_header(&mut wrong, b"\x93\x94Nope"),
            Err(Error::BadHeader(_))
        ));
    }
}
