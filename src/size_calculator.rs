// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `SizeCalculator`: the no-write sibling of [`crate::codec::Cdr`] (§3.1).
//!
//! Mirrors the encoder call-for-call so a caller can learn the final
//! serialized length — to size an owned buffer up front, or to pick between
//! `ShortMemberHeader` and `LongMemberHeader` before committing to one —
//! without touching any backing storage. It tracks only a running offset and
//! the same alignment/version rules `primitives` applies to a real `Buffer`.

use crate::member_header::LengthCode;
use crate::primitives::{self, LongDouble};
use crate::version::{CdrVersion, CodecState, ExtensibilityKind};
use crate::Endianness;

pub struct SizeCalculator {
    state: CodecState,
    current: usize,
    align_origin: usize,
}

impl SizeCalculator {
    pub fn new(version: CdrVersion, endianness: Endianness) -> Self {
        SizeCalculator {
            state: CodecState::new(version, endianness),
            current: 0,
            align_origin: 0,
        }
    }

    pub fn set_fastcdr(&mut self, fastcdr: bool) {
        self.state.fastcdr = fastcdr;
    }

    pub fn current_size(&self) -> usize {
        self.current
    }

    fn effective_align(&self, width: usize) -> usize {
        if self.state.fastcdr {
            1
        } else {
            width.min(self.state.max_align())
        }
    }

    fn advance_scalar(&mut self, width: usize) {
        let align = self.effective_align(width);
        if align > 1 {
            self.current += primitives::padding_needed(self.current, self.align_origin, align);
        }
        self.current += width;
    }

    pub fn count_u8(&mut self, _value: u8) {
        self.advance_scalar(1);
    }
    pub fn count_i8(&mut self, _value: i8) {
        self.advance_scalar(1);
    }
    pub fn count_u16(&mut self, _value: u16) {
        self.advance_scalar(2);
    }
    pub fn count_i16(&mut self, _value: i16) {
        self.advance_scalar(2);
    }
    pub fn count_u32(&mut self, _value: u32) {
        self.advance_scalar(4);
    }
    pub fn count_i32(&mut self, _value: i32) {
        self.advance_scalar(4);
    }
    pub fn count_f32(&mut self, _value: f32) {
        self.advance_scalar(4);
    }
    pub fn count_u64(&mut self, _value: u64) {
        self.advance_scalar(8);
    }
    pub fn count_i64(&mut self, _value: i64) {
        self.advance_scalar(8);
    }
    pub fn count_f64(&mut self, _value: f64) {
        self.advance_scalar(8);
    }
    pub fn count_bool(&mut self, _value: bool) {
        self.advance_scalar(1);
    }
    pub fn count_long_double(&mut self, _value: LongDouble) {
        if self.state.fastcdr {
            self.current += 16;
        } else {
            self.current += primitives::padding_needed(self.current, self.align_origin, 8);
            self.current += 16;
        }
    }

    /// 4-byte length prefix + payload bytes + trailing NUL (§4.3). Embedded
    /// NULs aren't checked here — `SizeCalculator` only ever reports a
    /// length, leaving validation to the real encode pass.
    pub fn count_string(&mut self, value: &str) {
        self.count_u32(0);
        self.current += value.len() + 1;
    }

    pub fn count_wide_string(&mut self, value: &[u16]) {
        self.count_u32(0);
        self.current += value.len() * 2;
    }

    pub fn count_sequence<T, F>(&mut self, items: &[T], mut count_elem: F)
    where
        F: FnMut(&mut SizeCalculator, &T),
    {
        self.count_u32(0);
        for item in items {
            count_elem(self, item);
        }
    }

    pub fn count_array<T, F>(&mut self, items: &[T], mut count_elem: F)
    where
        F: FnMut(&mut SizeCalculator, &T),
    {
        for item in items {
            count_elem(self, item);
        }
    }

    /// Overhead of opening a composite of the given kind, mirroring
    /// [`crate::codec::Cdr::begin_serialize_type`]: a 4-byte DHEADER for
    /// `Appendable`/XCDRv2-`Mutable`, nothing for `Plain`/XCDRv1-`Mutable`
    /// (whose sentinel, if any, is counted by `end_type`).
    pub fn begin_type(&mut self, kind: ExtensibilityKind) {
        if self.state.version == CdrVersion::XCDRv2
            && matches!(kind, ExtensibilityKind::Appendable | ExtensibilityKind::Mutable)
        {
            self.current += 4;
        }
    }

    pub fn end_type(&mut self, kind: ExtensibilityKind) {
        if kind == ExtensibilityKind::Mutable && self.state.version == CdrVersion::XCDRv1 {
            self.current += 4; // sentinel
        }
    }

    /// Overhead of one mutable member's framing, given its payload size and
    /// whether the payload's width is one of the inline `EMHEADER1` widths.
    pub fn count_member_header(&mut self, member_id: u32, payload_len: usize, inline_width: Option<usize>) {
        match self.state.version {
            CdrVersion::CorbaCdr => {}
            CdrVersion::XCDRv1 => {
                let short = member_id < 0x3F00 && payload_len < (1 << 16);
                self.current += if short { 4 } else { 12 };
                let rem = payload_len % 4;
                if rem != 0 {
                    self.current += 4 - rem;
                }
            }
            CdrVersion::XCDRv2 => {
                self.current += 4;
                if LengthCode::for_inline_width(payload_len) != inline_width.and_then(LengthCode::for_inline_width)
                    || inline_width.is_none()
                {
                    self.current += 4;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_encoder_for_plain_scalars() {
        let mut calc = SizeCalculator::new(CdrVersion::XCDRv1, Endianness::Big);
        calc.count_u8(1);
        calc.count_u64(2);
        // Same padding rule as primitives::tests::test_alignment_classic_vs_xcdr2.
        assert_eq!(calc.current_size(), 16);
    }

    #[test]
    fn test_string_length_matches_container_write() {
        let mut calc = SizeCalculator::new(CdrVersion::XCDRv1, Endianness::Big);
        calc.count_string("Hola");
        assert_eq!(calc.current_size(), 4 + 5);
    }

    #[test]
    fn test_appendable_dheader_overhead() {
        let mut calc = SizeCalculator::new(CdrVersion::XCDRv2, Endianness::Big);
        calc.begin_type(ExtensibilityKind::Appendable);
        calc.count_u32(1);
        calc.end_type(ExtensibilityKind::Appendable);
        assert_eq!(calc.current_size(), 8);
    }
}
