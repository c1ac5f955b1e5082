// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `Cdr`: the state machine that drives a [`crate::buffer::Buffer`] through
//! one of the five composite-member grammars (§4.5) plus the encapsulation
//! envelope, scalar I/O, and container I/O that sit around it. This is the
//! component the rest of the crate exists to support.

use crate::buffer::Buffer;
use crate::container;
use crate::encapsulation;
use crate::error::{CdrError, CdrResult};
use crate::member_header::{self, EmHeader1, LengthCode, LongMemberHeader, ShortMemberHeader};
use crate::primitives::{self, LongDouble};
use crate::state::State;
use crate::version::{CdrVersion, CodecState, EncodingAlgorithmFlag, ExtensibilityKind};
use crate::Endianness;
use std::collections::HashMap;
use std::hash::Hash;

/// One write/read pair per scalar width the wire understands. Replaces the
/// polymorphic `<<`/`>>` operator pair of the original API (Design Notes:
/// "Polymorphic scalar overloads") with a single generic dispatch — see
/// [`Cdr::write`]/[`Cdr::read`].
pub trait CdrPrimitive: Sized + Copy {
    /// Byte width on the wire, used to pick `ShortMemberHeader` vs an
    /// inline `EMHEADER1` length code for mutable-member framing.
    fn wire_width() -> usize;
    fn write_into(self, cdr: &mut Cdr) -> CdrResult<()>;
    fn read_from(cdr: &mut Cdr) -> CdrResult<Self>;
}

macro_rules! impl_cdr_primitive {
    ($ty:ty, $width:expr, $write_fn:path, $read_fn:path) => {
        impl CdrPrimitive for $ty {
            fn wire_width() -> usize {
                $width
            }
            fn write_into(self, cdr: &mut Cdr) -> CdrResult<()> {
                $write_fn(&mut cdr.buffer, &cdr.state, self)
            }
            fn read_from(cdr: &mut Cdr) -> CdrResult<Self> {
                $read_fn(&mut cdr.buffer, &cdr.state)
            }
        }
    };
}

impl_cdr_primitive!(u8, 1, primitives::write_u8, primitives::read_u8);
impl_cdr_primitive!(i8, 1, primitives::write_i8, primitives::read_i8);
impl_cdr_primitive!(u16, 2, primitives::write_u16, primitives::read_u16);
impl_cdr_primitive!(i16, 2, primitives::write_i16, primitives::read_i16);
impl_cdr_primitive!(u32, 4, primitives::write_u32, primitives::read_u32);
impl_cdr_primitive!(i32, 4, primitives::write_i32, primitives::read_i32);
impl_cdr_primitive!(f32, 4, primitives::write_f32, primitives::read_f32);
impl_cdr_primitive!(u64, 8, primitives::write_u64, primitives::read_u64);
impl_cdr_primitive!(i64, 8, primitives::write_i64, primitives::read_i64);
impl_cdr_primitive!(f64, 8, primitives::write_f64, primitives::read_f64);
impl_cdr_primitive!(bool, 1, primitives::write_bool, primitives::read_bool);

impl CdrPrimitive for LongDouble {
    fn wire_width() -> usize {
        16
    }
    fn write_into(self, cdr: &mut Cdr) -> CdrResult<()> {
        primitives::write_long_double(&mut cdr.buffer, &cdr.state, self)
    }
    fn read_from(cdr: &mut Cdr) -> CdrResult<Self> {
        primitives::read_long_double(&mut cdr.buffer, &cdr.state)
    }
}

/// The wire codec. Owns a [`Buffer`] exclusively (§5: single-threaded,
/// synchronous, no suspension) and carries the version/endianness/kind the
/// rest of this module switches on.
pub struct Cdr<'a> {
    buffer: Buffer<'a>,
    state: CodecState,
}

impl<'a> Cdr<'a> {
    pub fn new(buffer: Buffer<'a>, version: CdrVersion, endianness: Endianness) -> Self {
        Cdr {
            buffer,
            state: CodecState::new(version, endianness),
        }
    }

    pub fn buffer(&self) -> &Buffer<'a> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer<'a> {
        &mut self.buffer
    }

    pub fn version(&self) -> CdrVersion {
        self.state.version
    }

    pub fn endianness(&self) -> Endianness {
        self.state.endianness
    }

    pub fn kind(&self) -> ExtensibilityKind {
        self.state.kind
    }

    pub fn set_fastcdr(&mut self, fastcdr: bool) {
        self.state.fastcdr = fastcdr;
    }

    pub fn is_fastcdr(&self) -> bool {
        self.state.fastcdr
    }

    /// The encoding-algorithm flag implied by the codec's current version
    /// and extensibility kind (§3.1, §4.4).
    pub fn current_encoding_flag(&self) -> EncodingAlgorithmFlag {
        match (self.state.version, self.state.kind) {
            (CdrVersion::CorbaCdr, _) | (CdrVersion::XCDRv1, ExtensibilityKind::Plain) => {
                EncodingAlgorithmFlag::PlainCdr1
            }
            (CdrVersion::XCDRv1, _) => EncodingAlgorithmFlag::PlCdr1,
            (CdrVersion::XCDRv2, ExtensibilityKind::Plain) => EncodingAlgorithmFlag::PlainCdr2,
            (CdrVersion::XCDRv2, ExtensibilityKind::Appendable) => {
                EncodingAlgorithmFlag::DelimitCdr2
            }
            (CdrVersion::XCDRv2, ExtensibilityKind::Mutable) => EncodingAlgorithmFlag::PlCdr2,
        }
    }

    pub fn set_encoding_flag(&mut self, flag: EncodingAlgorithmFlag) -> CdrResult<()> {
        self.state.validate_flag(flag)?;
        let (_, kind) = flag.version_and_kind();
        self.state.kind = kind;
        Ok(())
    }

    pub fn get_encoding_flag(&self) -> EncodingAlgorithmFlag {
        self.current_encoding_flag()
    }

    pub fn set_dds_options(&mut self, options: [u8; 2]) {
        self.state.options = options;
    }

    pub fn dds_options(&self) -> [u8; 2] {
        self.state.options
    }

    /// Writes the 4-byte envelope for the codec's current flag/endianness
    /// (§4.4) and resets `align_origin` to just past it.
    pub fn serialize_encapsulation(&mut self) -> CdrResult<()> {
        let flag = self.current_encoding_flag();
        encapsulation::serialize_encapsulation(
            &mut self.buffer,
            flag,
            self.state.endianness,
            self.state.options,
        )
    }

    /// Reads and validates the envelope, rejecting a flag whose version
    /// doesn't match how this codec was constructed (§4.4), then adopts its
    /// endianness/kind/options.
    pub fn read_encapsulation(&mut self) -> CdrResult<()> {
        let enc = encapsulation::read_encapsulation(&mut self.buffer)?;
        self.state.validate_flag(enc.flag)?;
        let (_, kind) = enc.flag.version_and_kind();
        self.state.endianness = enc.endianness;
        self.state.kind = kind;
        self.state.options = enc.options;
        Ok(())
    }

    /// Generic scalar write — the replacement for the `<<` operator.
    pub fn write<T: CdrPrimitive>(&mut self, value: T) -> CdrResult<()> {
        value.write_into(self)
    }

    /// Generic scalar read — the replacement for the `>>` operator.
    pub fn read<T: CdrPrimitive>(&mut self) -> CdrResult<T> {
        T::read_from(self)
    }

    pub fn serialize_string(&mut self, value: &str) -> CdrResult<()> {
        container::write_string(&mut self.buffer, &self.state, value)
    }

    pub fn deserialize_string(&mut self) -> CdrResult<String> {
        container::read_string(&mut self.buffer, &self.state)
    }

    pub fn serialize_wide_string(&mut self, value: &[u16]) -> CdrResult<()> {
        container::write_wide_string(&mut self.buffer, &self.state, value)
    }

    pub fn deserialize_wide_string(&mut self) -> CdrResult<Vec<u16>> {
        container::read_wide_string(&mut self.buffer, &self.state)
    }

    pub fn serialize_sequence<T, F>(&mut self, items: &[T], write_elem: F) -> CdrResult<()>
    where
        F: FnMut(&mut Buffer, &CodecState, &T) -> CdrResult<()>,
    {
        container::write_sequence(&mut self.buffer, &self.state, items, write_elem)
    }

    pub fn deserialize_sequence<T, F>(&mut self, min_elem_size: usize, read_elem: F) -> CdrResult<Vec<T>>
    where
        F: FnMut(&mut Buffer, &CodecState) -> CdrResult<T>,
    {
        container::read_sequence(&mut self.buffer, &self.state, min_elem_size, read_elem)
    }

    pub fn serialize_array<T, F>(&mut self, items: &[T], write_elem: F) -> CdrResult<()>
    where
        F: FnMut(&mut Buffer, &CodecState, &T) -> CdrResult<()>,
    {
        container::write_array(&mut self.buffer, &self.state, items, write_elem)
    }

    pub fn deserialize_array<T, F>(&mut self, n: usize, read_elem: F) -> CdrResult<Vec<T>>
    where
        F: FnMut(&mut Buffer, &CodecState) -> CdrResult<T>,
    {
        container::read_array(&mut self.buffer, &self.state, n, read_elem)
    }

    pub fn serialize_map<K, V, FK, FV>(
        &mut self,
        map: &HashMap<K, V>,
        write_key: FK,
        write_val: FV,
    ) -> CdrResult<()>
    where
        FK: FnMut(&mut Buffer, &CodecState, &K) -> CdrResult<()>,
        FV: FnMut(&mut Buffer, &CodecState, &V) -> CdrResult<()>,
    {
        container::write_map(&mut self.buffer, &self.state, map, write_key, write_val)
    }

    pub fn deserialize_map_into<K, V, FK, FV>(
        &mut self,
        target: &mut HashMap<K, V>,
        min_pair_size: usize,
        read_key: FK,
        read_val: FV,
    ) -> CdrResult<()>
    where
        K: Eq + Hash,
        FK: FnMut(&mut Buffer, &CodecState) -> CdrResult<K>,
        FV: FnMut(&mut Buffer, &CodecState) -> CdrResult<V>,
    {
        container::read_map_into(&mut self.buffer, &self.state, target, min_pair_size, read_key, read_val)
    }

    /// Writes a 1-byte is-present prefix, then the value if present. Used
    /// for `Optional<T>` under `Plain`/`Appendable` composites (§4.5.6);
    /// under `Mutable` composites, an absent optional is instead omitted
    /// from the member stream entirely by not calling `serialize_member`.
    pub fn serialize_optional_inline<F>(&mut self, present: bool, write_value: F) -> CdrResult<()>
    where
        F: FnOnce(&mut Cdr) -> CdrResult<()>,
    {
        self.write::<bool>(present)?;
        if present {
            write_value(self)?;
        }
        Ok(())
    }

    pub fn deserialize_optional_inline<T, F>(&mut self, read_value: F) -> CdrResult<Option<T>>
    where
        F: FnOnce(&mut Cdr) -> CdrResult<T>,
    {
        let present = self.read::<bool>()?;
        if present {
            Ok(Some(read_value(self)?))
        } else {
            Ok(None)
        }
    }

    /// A snapshot suitable for later `set_state` rewind (§3.1, §6.2).
    pub fn get_state(&self) -> State {
        State::plain(self.buffer.current(), self.buffer.align_origin(), self.state.kind)
    }

    pub fn set_state(&mut self, saved: &State) -> CdrResult<()> {
        self.buffer.seek(saved.current())?;
        self.buffer.set_align_origin(saved.align_origin());
        self.state.kind = saved.kind();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.buffer.reset();
    }

    pub fn jump(&mut self, n: usize) -> CdrResult<()> {
        self.buffer.jump(n)
    }

    pub fn get_serialized_data_length(&self) -> usize {
        self.buffer.len()
    }

    // ---- Composite member-framing state machine (§4.5) -----------------

    /// Opens a composite of the given extensibility kind: reserves and
    /// writes a DHEADER placeholder for `Appendable`/XCDRv2-`Mutable`
    /// (§4.5.4, §4.5.5), or does nothing observable for `Plain`/XCDRv1-
    /// `Mutable` (whose end-of-composite marker, if any, is the sentinel
    /// written by [`Cdr::end_serialize_type`]).
    pub fn begin_serialize_type(&mut self, kind: ExtensibilityKind) -> CdrResult<State> {
        let prev_kind = self.state.kind;
        match (self.state.version, kind) {
            (CdrVersion::CorbaCdr, ExtensibilityKind::Appendable)
            | (CdrVersion::CorbaCdr, ExtensibilityKind::Mutable)
            | (CdrVersion::XCDRv1, ExtensibilityKind::Appendable) => {
                Err(CdrError::bad_param(format!(
                    "extensibility kind {:?} is not valid under {:?}",
                    kind, self.state.version
                )))
            }
            (CdrVersion::XCDRv2, ExtensibilityKind::Appendable)
            | (CdrVersion::XCDRv2, ExtensibilityKind::Mutable) => {
                let snapshot_current = self.buffer.current();
                let align_origin = self.buffer.align_origin();
                primitives::write_u32(&mut self.buffer, &self.state, 0)?;
                let dheader_patch_offset = self.buffer.current() - 4;
                let payload_start = self.buffer.current();
                self.state.kind = kind;
                log::trace!("reserved DHEADER at offset {}", dheader_patch_offset);
                Ok(State {
                    current: snapshot_current,
                    align_origin,
                    kind: prev_kind,
                    dheader_patch_offset: Some(dheader_patch_offset),
                    payload_start: Some(payload_start),
                })
            }
            _ => {
                let snapshot = State::plain(self.buffer.current(), self.buffer.align_origin(), prev_kind);
                self.state.kind = kind;
                Ok(snapshot)
            }
        }
    }

    /// Closes a composite opened by `begin_serialize_type`: back-patches the
    /// DHEADER if one was reserved, or writes the sentinel if the active
    /// kind was XCDRv1 `Mutable` (§4.5.2, §4.5.5), then restores the
    /// surrounding kind from `opened`.
    pub fn end_serialize_type(&mut self, opened: State) -> CdrResult<()> {
        match opened.dheader_patch_offset {
            Some(patch_offset) => {
                let payload_start = opened
                    .payload_start
                    .expect("dheader_patch_offset is always paired with payload_start");
                let payload_len = self.buffer.current() - payload_start;
                let len_u32 = u32::try_from(payload_len)
                    .map_err(|_| CdrError::bad_param("DHEADER-framed payload too long to encode"))?;
                self.buffer
                    .patch(patch_offset, &primitives::encode_u32_bytes(&self.state, len_u32))?;
            }
            None => {
                if self.state.kind == ExtensibilityKind::Mutable && self.state.version == CdrVersion::XCDRv1 {
                    member_header::write_sentinel(&mut self.buffer, &self.state)?;
                }
            }
        }
        self.state.kind = opened.kind;
        Ok(())
    }

    /// Writes a single member of statically-known scalar width. Uses the
    /// shortest valid framing for the active kind: no header at all under
    /// `Plain`/`Appendable`, `ShortMemberHeader` under XCDRv1 `Mutable`
    /// (the width is known up front, so no deferred patch is needed), and
    /// an inline `EMHEADER1` length code under XCDRv2 `Mutable` (§4.5.2,
    /// §4.5.5, `SPEC_FULL.md` §C.2).
    pub fn serialize_primitive_member<T: CdrPrimitive>(
        &mut self,
        member_id: u32,
        must_understand: bool,
        value: T,
    ) -> CdrResult<()> {
        match self.state.kind {
            ExtensibilityKind::Plain | ExtensibilityKind::Appendable => self.write(value),
            ExtensibilityKind::Mutable => match self.state.version {
                CdrVersion::CorbaCdr => Err(CdrError::bad_param(
                    "mutable members are not valid under classic CDR",
                )),
                CdrVersion::XCDRv1 => {
                    let header_start = self.buffer.current();
                    let width = T::wire_width();
                    if ShortMemberHeader::applies(member_id, width) {
                        let header = ShortMemberHeader {
                            member_id,
                            length: width as u16,
                            must_understand,
                            implementation_specific: false,
                        };
                        header.write(&mut self.buffer, &self.state)?;
                    } else {
                        let header = LongMemberHeader {
                            member_id,
                            length: width as u32,
                            must_understand,
                            implementation_specific: false,
                        };
                        header.write(&mut self.buffer, &self.state)?;
                    }
                    self.write(value)?;
                    member_header::pad_to_next_4_from(&mut self.buffer, header_start)
                }
                CdrVersion::XCDRv2 => {
                    let width = T::wire_width();
                    let lc = LengthCode::for_inline_width(width);
                    let header = EmHeader1 {
                        lc: lc.unwrap_or(LengthCode::NextInt),
                        must_understand,
                        member_id,
                    };
                    header.write(&mut self.buffer, &self.state)?;
                    if lc.is_some() {
                        self.write(value)
                    } else {
                        let nextint_offset = self.buffer.current();
                        primitives::write_u32(&mut self.buffer, &self.state, 0)?;
                        let payload_start = self.buffer.current();
                        self.write(value)?;
                        let payload_len = self.buffer.current() - payload_start;
                        self.buffer.patch(
                            nextint_offset,
                            &primitives::encode_u32_bytes(&self.state, payload_len as u32),
                        )
                    }
                }
            },
        }
    }

    /// Writes a single member whose serialized length isn't known until
    /// `write_payload` returns (strings, sequences, nested composites).
    /// Always uses `LongMemberHeader` under XCDRv1 `Mutable` (valid for any
    /// length, sidestepping the chicken-and-egg of picking a header shape
    /// before the payload is written) and `EMHEADER1` with a deferred
    /// `NEXTINT` patch under XCDRv2 `Mutable`. `nested_has_dheader` selects
    /// LC 5 over LC 4 when the payload's own first four bytes are a nested
    /// DHEADER (§4.5.5, Glossary "LC").
    pub fn serialize_member<F>(
        &mut self,
        member_id: u32,
        must_understand: bool,
        nested_has_dheader: bool,
        write_payload: F,
    ) -> CdrResult<()>
    where
        F: FnOnce(&mut Cdr) -> CdrResult<()>,
    {
        match self.state.kind {
            ExtensibilityKind::Plain | ExtensibilityKind::Appendable => write_payload(self),
            ExtensibilityKind::Mutable => match self.state.version {
                CdrVersion::CorbaCdr => Err(CdrError::bad_param(
                    "mutable members are not valid under classic CDR",
                )),
                CdrVersion::XCDRv1 => {
                    let header_start = self.buffer.current();
                    let header = LongMemberHeader {
                        member_id,
                        length: 0,
                        must_understand,
                        implementation_specific: false,
                    };
                    header.write(&mut self.buffer, &self.state)?;
                    let length_patch_offset = self.buffer.current() - 4;
                    let payload_start = self.buffer.current();
                    write_payload(self)?;
                    let payload_len = self.buffer.current() - payload_start;
                    let len_u32 = u32::try_from(payload_len)
                        .map_err(|_| CdrError::bad_param("mutable member payload too long to encode"))?;
                    self.buffer
                        .patch(length_patch_offset, &primitives::encode_u32_bytes(&self.state, len_u32))?;
                    member_header::pad_to_next_4_from(&mut self.buffer, header_start)
                }
                CdrVersion::XCDRv2 => {
                    let lc = if nested_has_dheader {
                        LengthCode::NextIntNestedDheader
                    } else {
                        LengthCode::NextInt
                    };
                    let header = EmHeader1 {
                        lc,
                        must_understand,
                        member_id,
                    };
                    header.write(&mut self.buffer, &self.state)?;
                    let nextint_offset = self.buffer.current();
                    primitives::write_u32(&mut self.buffer, &self.state, 0)?;
                    let payload_start = self.buffer.current();
                    write_payload(self)?;
                    let payload_len = self.buffer.current() - payload_start;
                    let len_u32 = u32::try_from(payload_len)
                        .map_err(|_| CdrError::bad_param("mutable member payload too long to encode"))?;
                    self.buffer.patch(
                        nextint_offset,
                        &primitives::encode_u32_bytes(&self.state, len_u32),
                    )
                }
            },
        }
    }

    /// Opens, dispatches members through, and closes a composite in one
    /// call. `member_count` is the exact declared member count and is
    /// required for `Plain` (position-driven, no wire-carried terminator);
    /// it is ignored for `Appendable`/`Mutable`, which terminate on their
    /// own grammar (DHEADER limit or sentinel) (§4.5.1, §4.5.3–§4.5.5).
    ///
    /// `dispatcher(cdr, member_id)` deserializes one member's payload and
    /// returns whether it recognized `member_id`; an unrecognized id is
    /// skipped by the active grammar's own length accounting (§4.5.4's
    /// appendable "trailing unknown members" rule, §4.5.5's mutable
    /// per-member length).
    pub fn deserialize_type<D>(
        &mut self,
        kind: ExtensibilityKind,
        member_count: Option<usize>,
        mut dispatcher: D,
    ) -> CdrResult<()>
    where
        D: FnMut(&mut Cdr, u32) -> CdrResult<bool>,
    {
        let prev_kind = self.state.kind;
        self.state.kind = kind;
        let result = match (self.state.version, kind) {
            (_, ExtensibilityKind::Plain) => {
                let n = member_count
                    .ok_or_else(|| CdrError::bad_param("plain composite requires an explicit member_count"))?;
                self.deserialize_plain(n, &mut dispatcher)
            }
            (CdrVersion::XCDRv2, ExtensibilityKind::Appendable) => self.deserialize_appendable(&mut dispatcher),
            (CdrVersion::XCDRv1, ExtensibilityKind::Mutable) => self.deserialize_mutable_v1(&mut dispatcher),
            (CdrVersion::XCDRv2, ExtensibilityKind::Mutable) => self.deserialize_mutable_v2(&mut dispatcher),
            (version, kind) => Err(CdrError::bad_param(format!(
                "extensibility kind {:?} is not valid under {:?}",
                kind, version
            ))),
        };
        self.state.kind = prev_kind;
        result
    }

    fn deserialize_plain<D>(&mut self, member_count: usize, dispatcher: &mut D) -> CdrResult<()>
    where
        D: FnMut(&mut Cdr, u32) -> CdrResult<bool>,
    {
        for mid in 0..member_count as u32 {
            if !dispatcher(self, mid)? {
                return Err(CdrError::bad_param(format!(
                    "plain composite: member {} was not consumed by the dispatcher",
                    mid
                )));
            }
        }
        Ok(())
    }

    fn deserialize_appendable<D>(&mut self, dispatcher: &mut D) -> CdrResult<()>
    where
        D: FnMut(&mut Cdr, u32) -> CdrResult<bool>,
    {
        let dheader = primitives::read_u32(&mut self.buffer, &self.state)?;
        let limit = self.buffer.current() + dheader as usize;
        self.buffer.ensure_within_end(limit)?;
        let mut mid: u32 = 0;
        while self.buffer.current() < limit {
            if !dispatcher(self, mid)? {
                break;
            }
            mid += 1;
        }
        if self.buffer.current() < limit {
            log::trace!("appendable composite: skipping trailing unknown members to DHEADER limit");
            self.buffer.seek(limit)?;
        }
        Ok(())
    }

    fn deserialize_mutable_v1<D>(&mut self, dispatcher: &mut D) -> CdrResult<()>
    where
        D: FnMut(&mut Cdr, u32) -> CdrResult<bool>,
    {
        loop {
            let header_start = self.buffer.current();
            let marker_word = primitives::read_u16(&mut self.buffer, &self.state)?;
            let marker = marker_word & 0x3FFF;
            let second_word = primitives::read_u16(&mut self.buffer, &self.state)?;
            if marker == member_header::PID_SENTINEL & 0x3FFF && second_word == 0 {
                break;
            }
            let must_understand = marker_word & member_header::PID_FLAG_MUST_UNDERSTAND != 0;
            let (member_id, length) = if marker == member_header::PID_EXTENDED {
                if second_word != 8 {
                    return Err(CdrError::bad_param(format!(
                        "unexpected long-header length placeholder {}",
                        second_word
                    )));
                }
                let member_id = primitives::read_u32(&mut self.buffer, &self.state)?;
                let length = primitives::read_u32(&mut self.buffer, &self.state)?;
                (member_id, length as usize)
            } else {
                (u32::from(marker), second_word as usize)
            };
            let payload_start = self.buffer.current();
            self.buffer.ensure_within_end(payload_start + length)?;
            let consumed = dispatcher(self, member_id)?;
            if !consumed || self.buffer.current() != payload_start + length {
                if !consumed {
                    log::trace!("mutable member {} unknown to dispatcher, skipping", member_id);
                }
                self.buffer.seek(payload_start + length)?;
            }
            let _ = must_understand;
            member_header::pad_to_next_4_from(&mut self.buffer, header_start)?;
        }
        Ok(())
    }

    fn deserialize_mutable_v2<D>(&mut self, dispatcher: &mut D) -> CdrResult<()>
    where
        D: FnMut(&mut Cdr, u32) -> CdrResult<bool>,
    {
        let dheader = primitives::read_u32(&mut self.buffer, &self.state)?;
        let limit = self.buffer.current() + dheader as usize;
        self.buffer.ensure_within_end(limit)?;
        while self.buffer.current() < limit {
            let em = EmHeader1::read(&mut self.buffer, &self.state)?;
            let length = if em.lc.carries_nextint() {
                primitives::read_u32(&mut self.buffer, &self.state)? as usize
            } else {
                match em.lc {
                    LengthCode::Inline1 => 1,
                    LengthCode::Inline2 => 2,
                    LengthCode::Inline4 => 4,
                    LengthCode::Inline8 => 8,
                    LengthCode::NextInt | LengthCode::NextIntNestedDheader => unreachable!(),
                }
            };
            let payload_start = self.buffer.current();
            self.buffer.ensure_within_end(payload_start + length)?;
            let consumed = dispatcher(self, em.member_id)?;
            if !consumed || self.buffer.current() != payload_start + length {
                if !consumed {
                    log::trace!("mutable member {} unknown to dispatcher, skipping", em.member_id);
                }
                self.buffer.seek(payload_start + length)?;
            }
        }
        if self.buffer.current() < limit {
            self.buffer.seek(limit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    #[test]
    fn test_plain_round_trip_positional_members() {
        let mut raw = [0u8; 16];
        {
            let buf = Buffer::from_mut_slice(&mut raw);
            let mut cdr = Cdr::new(buf, CdrVersion::XCDRv1, Endianness::Big);
            let state = cdr.begin_serialize_type(ExtensibilityKind::Plain).expect("begin");
            cdr.write::<u16>(7).expect("write u16");
            cdr.write::<u32>(99).expect("write u32");
            cdr.end_serialize_type(state).expect("end");
        }
        let buf = Buffer::from_mut_slice(&mut raw);
        let mut cdr = Cdr::new(buf, CdrVersion::XCDRv1, Endianness::Big);
        let mut seen_u16 = None;
        let mut seen_u32 = None;
        cdr.deserialize_type(ExtensibilityKind::Plain, Some(2), |c, mid| match mid {
            0 => {
                seen_u16 = Some(c.read::<u16>()?);
                Ok(true)
            }
            1 => {
                seen_u32 = Some(c.read::<u32>()?);
                Ok(true)
            }
            _ => Ok(false),
        })
        .expect("deserialize plain");
        assert_eq!(seen_u16, Some(7));
        assert_eq!(seen_u32, Some(99));
    }

    #[test]
    fn test_mutable_xcdrv2_scenario1_wire_vector() {
        // Mutable (XCDRv2) BE: member 0 = uint32(0xCD) present, member 1
        // (optional uint32) absent. EMHEADER1 for member 0 must be the
        // byte-exact `20 00 00 00` vector from the worked example.
        let mut raw = [0u8; 32];
        let buf = Buffer::from_mut_slice(&mut raw);
        let mut cdr = Cdr::new(buf, CdrVersion::XCDRv2, Endianness::Big);
        let state = cdr.begin_serialize_type(ExtensibilityKind::Mutable).expect("begin");
        cdr.serialize_primitive_member(0, false, 0xCDu32).expect("member 0");
        cdr.end_serialize_type(state).expect("end");
        assert_eq!(&raw[4..8], &[0x20, 0x00, 0x00, 0x00]);
        assert_eq!(&raw[8..12], &[0x00, 0x00, 0x00, 0xCD]);
        // DHEADER covers the 8 bytes of that one member.
        assert_eq!(&raw[0..4], &[0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn test_mutable_xcdrv1_sentinel_terminates_and_round_trips() {
        let mut raw = [0u8; 32];
        {
            let buf = Buffer::from_mut_slice(&mut raw);
            let mut cdr = Cdr::new(buf, CdrVersion::XCDRv1, Endianness::Little);
            let state = cdr.begin_serialize_type(ExtensibilityKind::Mutable).expect("begin");
            cdr.serialize_primitive_member(0, false, 5u16).expect("member 0");
            cdr.serialize_member(1, false, false, |c| c.serialize_string("hi")).expect("member 1");
            cdr.end_serialize_type(state).expect("end");
        }
        let buf = Buffer::from_mut_slice(&mut raw);
        let mut cdr = Cdr::new(buf, CdrVersion::XCDRv1, Endianness::Little);
        let mut seen_u16 = None;
        let mut seen_string = None;
        cdr.deserialize_type(ExtensibilityKind::Mutable, None, |c, mid| match mid {
            0 => {
                seen_u16 = Some(c.read::<u16>()?);
                Ok(true)
            }
            1 => {
                seen_string = Some(c.deserialize_string()?);
                Ok(true)
            }
            _ => Ok(false),
        })
        .expect("deserialize mutable v1");
        assert_eq!(seen_u16, Some(5));
        assert_eq!(seen_string, Some("hi".to_string()));
    }

    #[test]
    fn test_appendable_skips_trailing_unknown_member() {
        let mut raw = [0u8; 32];
        {
            let buf = Buffer::from_mut_slice(&mut raw);
            let mut cdr = Cdr::new(buf, CdrVersion::XCDRv2, Endianness::Big);
            let state = cdr.begin_serialize_type(ExtensibilityKind::Appendable).expect("begin");
            cdr.write::<u32>(1).expect("member 0");
            cdr.write::<u32>(2).expect("member 1, unknown to the reader below");
            cdr.end_serialize_type(state).expect("end");
        }
        let buf = Buffer::from_mut_slice(&mut raw);
        let mut cdr = Cdr::new(buf, CdrVersion::XCDRv2, Endianness::Big);
        let mut seen = None;
        cdr.deserialize_type(ExtensibilityKind::Appendable, None, |c, mid| match mid {
            0 => {
                seen = Some(c.read::<u32>()?);
                Ok(true)
            }
            _ => Ok(false),
        })
        .expect("deserialize appendable");
        assert_eq!(seen, Some(1));
        assert_eq!(cdr.buffer().current(), 12);
    }

    #[test]
    fn test_optional_absent_under_plain_writes_presence_byte() {
        let mut raw = [0u8; 8];
        let buf = Buffer::from_mut_slice(&mut raw);
        let mut cdr = Cdr::new(buf, CdrVersion::XCDRv1, Endianness::Little);
        cdr.serialize_optional_inline(false, |_| Ok(())).expect("write optional");
        assert_eq!(cdr.buffer().current(), 1);
        assert_eq!(raw[0], 0);
    }

    #[test]
    fn test_encapsulation_round_trip_rejects_cross_version() {
        let mut raw = [0u8; 4];
        {
            let buf = Buffer::from_mut_slice(&mut raw);
            let mut cdr = Cdr::new(buf, CdrVersion::XCDRv1, Endianness::Little);
            cdr.set_encoding_flag(EncodingAlgorithmFlag::PlCdr1).expect("set flag");
            cdr.serialize_encapsulation().expect("write encapsulation");
        }
        let buf = Buffer::from_mut_slice(&mut raw);
        let mut cdr = Cdr::new(buf, CdrVersion::XCDRv2, Endianness::Little);
        let err = cdr.read_encapsulation().unwrap_err();
        assert!(matches!(err, CdrError::BadParam { .. }));
    }
}
