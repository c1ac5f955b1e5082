// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! String, sequence, array, and map I/O, built on [`crate::primitives`] (§4.3).

use crate::buffer::Buffer;
use crate::error::{CdrError, CdrResult};
use crate::primitives;
use crate::version::CodecState;
use std::collections::HashMap;
use std::hash::Hash;

/// Defensive bound against a malformed `0xFFFFFFFF`-style length prefix
/// (§4.3, §8.3): fails before allocating anything proportional to `count`.
fn check_bounded_length(buf: &Buffer, count: usize, min_elem_size: usize) -> CdrResult<()> {
    let remaining = buf.end().saturating_sub(buf.current());
    let needed = count.saturating_mul(min_elem_size.max(1));
    if needed > remaining {
        return Err(CdrError::not_enough_memory(
            buf.current(),
            needed.saturating_sub(remaining),
        ));
    }
    Ok(())
}

/// Narrow string: 4-byte length (payload + NUL), then the payload and a
/// trailing NUL. Embedded NULs inside `value` are rejected on encode; they
/// are never checked for on decode (§4.3, `SPEC_FULL.md` §C.4).
pub fn write_string(buf: &mut Buffer, state: &CodecState, value: &str) -> CdrResult<()> {
    if value.as_bytes().contains(&0) {
        return Err(CdrError::bad_param(
            "narrow string payload contains an embedded NUL",
        ));
    }
    let len = u32::try_from(value.len() + 1)
        .map_err(|_| CdrError::bad_param("narrow string too long to encode"))?;
    primitives::write_u32(buf, state, len)?;
    buf.write(value.as_bytes())?;
    buf.write(&[0u8])
}

pub fn read_string(buf: &mut Buffer, state: &CodecState) -> CdrResult<String> {
    let len = primitives::read_u32(buf, state)? as usize;
    check_bounded_length(buf, len, 1)?;
    if len == 0 {
        return Err(CdrError::bad_param(
            "narrow string length must include the trailing NUL",
        ));
    }
    let raw = buf.read(len)?;
    let payload = &raw[..len - 1];
    String::from_utf8(payload.to_vec())
        .map_err(|_| CdrError::bad_param("narrow string payload is not valid UTF-8"))
}

/// Wide string: 4-byte length = number of 16-bit code units, followed by
/// that many big/little-endian `u16`s — always 16-bit wide chars on the
/// wire regardless of host `wchar_t` width (§4.3).
pub fn write_wide_string(buf: &mut Buffer, state: &CodecState, value: &[u16]) -> CdrResult<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| CdrError::bad_param("wide string too long to encode"))?;
    primitives::write_u32(buf, state, len)?;
    for unit in value {
        primitives::write_u16(buf, state, *unit)?;
    }
    Ok(())
}

pub fn read_wide_string(buf: &mut Buffer, state: &CodecState) -> CdrResult<Vec<u16>> {
    let len = primitives::read_u32(buf, state)? as usize;
    check_bounded_length(buf, len, 2)?;
    let mut out = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        out.push(primitives::read_u16(buf, state)?);
    }
    Ok(out)
}

/// Sequence of `T`: 4-byte element count, then `count` elements. The DHEADER
/// byte-length wrapper, if any, is a layer above this (§4.5) and is not part
/// of the primitive sequence header.
pub fn write_sequence<T, F>(
    buf: &mut Buffer,
    state: &CodecState,
    items: &[T],
    mut write_elem: F,
) -> CdrResult<()>
where
    F: FnMut(&mut Buffer, &CodecState, &T) -> CdrResult<()>,
{
    let count = u32::try_from(items.len())
        .map_err(|_| CdrError::bad_param("sequence too long to encode"))?;
    primitives::write_u32(buf, state, count)?;
    for item in items {
        write_elem(buf, state, item)?;
    }
    Ok(())
}

pub fn read_sequence<T, F>(
    buf: &mut Buffer,
    state: &CodecState,
    min_elem_size: usize,
    mut read_elem: F,
) -> CdrResult<Vec<T>>
where
    F: FnMut(&mut Buffer, &CodecState) -> CdrResult<T>,
{
    let count = primitives::read_u32(buf, state)? as usize;
    check_bounded_length(buf, count, min_elem_size)?;
    let mut out = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        out.push(read_elem(buf, state)?);
    }
    Ok(out)
}

/// Fixed-length array of `T`, length `N`: `N` elements, no count prefix.
pub fn write_array<T, F>(
    buf: &mut Buffer,
    state: &CodecState,
    items: &[T],
    mut write_elem: F,
) -> CdrResult<()>
where
    F: FnMut(&mut Buffer, &CodecState, &T) -> CdrResult<()>,
{
    for item in items {
        write_elem(buf, state, item)?;
    }
    Ok(())
}

pub fn read_array<T, F>(
    buf: &mut Buffer,
    state: &CodecState,
    n: usize,
    mut read_elem: F,
) -> CdrResult<Vec<T>>
where
    F: FnMut(&mut Buffer, &CodecState) -> CdrResult<T>,
{
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read_elem(buf, state)?);
    }
    Ok(out)
}

/// Map<K, V>: 4-byte pair count, then `count` (K, V) pairs in iteration order.
pub fn write_map<K, V, FK, FV>(
    buf: &mut Buffer,
    state: &CodecState,
    map: &HashMap<K, V>,
    mut write_key: FK,
    mut write_val: FV,
) -> CdrResult<()>
where
    FK: FnMut(&mut Buffer, &CodecState, &K) -> CdrResult<()>,
    FV: FnMut(&mut Buffer, &CodecState, &V) -> CdrResult<()>,
{
    let count =
        u32::try_from(map.len()).map_err(|_| CdrError::bad_param("map too large to encode"))?;
    primitives::write_u32(buf, state, count)?;
    for (k, v) in map {
        write_key(buf, state, k)?;
        write_val(buf, state, v)?;
    }
    Ok(())
}

/// Decodes into `target`, clearing any existing contents first (§4.3, §8.2:
/// "non-empty map clear").
pub fn read_map_into<K, V, FK, FV>(
    buf: &mut Buffer,
    state: &CodecState,
    target: &mut HashMap<K, V>,
    min_pair_size: usize,
    mut read_key: FK,
    mut read_val: FV,
) -> CdrResult<()>
where
    K: Eq + Hash,
    FK: FnMut(&mut Buffer, &CodecState) -> CdrResult<K>,
    FV: FnMut(&mut Buffer, &CodecState) -> CdrResult<V>,
{
    target.clear();
    let count = primitives::read_u32(buf, state)? as usize;
    check_bounded_length(buf, count, min_pair_size)?;
    for _ in 0..count {
        let key = read_key(buf, state)?;
        let value = read_val(buf, state)?;
        target.insert(key, value);
    }
    Ok(())
}
