// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Member-header and sentinel grammars for `PlCdr1` (XCDRv1 mutable) and
//! `PlCdr2` (XCDRv2 mutable) — §4.5.2, §4.5.5, Glossary.
//!
//! Bit layout note (resolves an internal inconsistency in the distilled
//! member-header description): EMHEADER1 is M(bit31) | LC(bits 28-30, 3
//! bits) | MemberId(bits 0-27). This is the layout that reproduces the
//! worked example in §6.1 ("Mutable (XCDRv2) {member_id=0: uint32=0xCD} ...
//! EMHEADER1 = `20 00 00 00`" decodes to LC=2, M=0, id=0) and matches the
//! OMG XTypes EMHEADER1 definition; see `DESIGN.md` for the full resolution.

use crate::buffer::Buffer;
use crate::error::{CdrError, CdrResult};
use crate::primitives;
use crate::version::CodecState;

pub const PID_SENTINEL: u16 = 0x3F02;
pub const PID_EXTENDED: u16 = 0x3F01;
pub const PID_FLAG_MUST_UNDERSTAND: u16 = 0x4000;
pub const PID_FLAG_IMPLEMENTATION: u16 = 0x8000;

const SHORT_ID_LIMIT: u32 = 0x3F00;
const SHORT_LENGTH_LIMIT: usize = 1 << 16;

/// `ShortMemberHeader`: 2-byte flags+id, 2-byte length (§4.5.2).
#[derive(Debug, Clone, Copy)]
pub struct ShortMemberHeader {
    pub member_id: u32,
    pub length: u16,
    pub must_understand: bool,
    pub implementation_specific: bool,
}

impl ShortMemberHeader {
    pub fn applies(member_id: u32, payload_len: usize) -> bool {
        member_id < SHORT_ID_LIMIT && payload_len < SHORT_LENGTH_LIMIT
    }

    pub fn write(&self, buf: &mut Buffer, state: &CodecState) -> CdrResult<()> {
        let mut word = self.member_id as u16 & 0x3FFF;
        if self.must_understand {
            word |= PID_FLAG_MUST_UNDERSTAND;
        }
        if self.implementation_specific {
            word |= PID_FLAG_IMPLEMENTATION;
        }
        primitives::write_u16(buf, state, word)?;
        primitives::write_u16(buf, state, self.length)
    }

    pub fn read(buf: &mut Buffer, state: &CodecState) -> CdrResult<Self> {
        let word = primitives::read_u16(buf, state)?;
        let length = primitives::read_u16(buf, state)?;
        Ok(ShortMemberHeader {
            member_id: u32::from(word & 0x3FFF),
            length,
            must_understand: word & PID_FLAG_MUST_UNDERSTAND != 0,
            implementation_specific: word & PID_FLAG_IMPLEMENTATION != 0,
        })
    }
}

/// `LongMemberHeader`: 2-byte flags+0x3F01 marker, 2-byte length placeholder
/// (always 8 — the byte length of the id+length words that follow), 4-byte
/// member id, 4-byte length (§4.5.2).
#[derive(Debug, Clone, Copy)]
pub struct LongMemberHeader {
    pub member_id: u32,
    pub length: u32,
    pub must_understand: bool,
    pub implementation_specific: bool,
}

impl LongMemberHeader {
    pub fn write(&self, buf: &mut Buffer, state: &CodecState) -> CdrResult<()> {
        let mut word = PID_EXTENDED;
        if self.must_understand {
            word |= PID_FLAG_MUST_UNDERSTAND;
        }
        if self.implementation_specific {
            word |= PID_FLAG_IMPLEMENTATION;
        }
        primitives::write_u16(buf, state, word)?;
        primitives::write_u16(buf, state, 8)?;
        primitives::write_u32(buf, state, self.member_id)?;
        primitives::write_u32(buf, state, self.length)
    }

    pub fn read(buf: &mut Buffer, state: &CodecState) -> CdrResult<Self> {
        let word = primitives::read_u16(buf, state)?;
        let marker = word & 0x3FFF;
        if marker != PID_EXTENDED {
            return Err(CdrError::bad_param(format!(
                "expected PID_EXTENDED marker, found {:#x}",
                marker
            )));
        }
        let placeholder = primitives::read_u16(buf, state)?;
        if placeholder != 8 {
            return Err(CdrError::bad_param(format!(
                "unexpected long-header length placeholder {}",
                placeholder
            )));
        }
        let member_id = primitives::read_u32(buf, state)?;
        let length = primitives::read_u32(buf, state)?;
        Ok(LongMemberHeader {
            member_id,
            length,
            must_understand: word & PID_FLAG_MUST_UNDERSTAND != 0,
            implementation_specific: word & PID_FLAG_IMPLEMENTATION != 0,
        })
    }
}

/// Writes the end-of-composite sentinel (§4.5.2): `0x3F02 0x0000`.
pub fn write_sentinel(buf: &mut Buffer, state: &CodecState) -> CdrResult<()> {
    primitives::write_u16(buf, state, PID_SENTINEL)?;
    primitives::write_u16(buf, state, 0)
}

/// Reads and validates the sentinel; `BadParam` if it isn't one.
pub fn read_sentinel(buf: &mut Buffer, state: &CodecState) -> CdrResult<()> {
    let word = primitives::read_u16(buf, state)?;
    let length = primitives::read_u16(buf, state)?;
    if word != PID_SENTINEL || length != 0 {
        return Err(CdrError::bad_param(format!(
            "expected sentinel 0x3F02 0x0000, found {:#x} {:#x}",
            word, length
        )));
    }
    Ok(())
}

/// Pads `buf` to the next 4-byte boundary measured from `header_start`
/// (§4.5.2 — PlCdr1's per-member padding rule, distinct from normal scalar
/// alignment, which is measured from `align_origin`).
pub fn pad_to_next_4_from(buf: &mut Buffer, header_start: usize) -> CdrResult<()> {
    let rel = buf.current() - header_start;
    let rem = rel % 4;
    if rem != 0 {
        static ZEROS: [u8; 4] = [0u8; 4];
        buf.write(&ZEROS[..4 - rem])?;
    }
    Ok(())
}

/// Length code for EMHEADER1 (§4.5.5, Glossary "LC"). `Inline` widths carry
/// no NEXTINT; `NextInt`/`NextIntNestedDheader` do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCode {
    Inline1 = 0,
    Inline2 = 1,
    Inline4 = 2,
    Inline8 = 3,
    NextInt = 4,
    NextIntNestedDheader = 5,
}

impl LengthCode {
    pub fn for_inline_width(width: usize) -> Option<LengthCode> {
        match width {
            1 => Some(LengthCode::Inline1),
            2 => Some(LengthCode::Inline2),
            4 => Some(LengthCode::Inline4),
            8 => Some(LengthCode::Inline8),
            _ => None,
        }
    }

    pub fn from_bits(bits: u32) -> CdrResult<LengthCode> {
        match bits {
            0 => Ok(LengthCode::Inline1),
            1 => Ok(LengthCode::Inline2),
            2 => Ok(LengthCode::Inline4),
            3 => Ok(LengthCode::Inline8),
            4 => Ok(LengthCode::NextInt),
            5 => Ok(LengthCode::NextIntNestedDheader),
            other => Err(CdrError::bad_param(format!("reserved LC value {}", other))),
        }
    }

    pub fn carries_nextint(self) -> bool {
        matches!(self, LengthCode::NextInt | LengthCode::NextIntNestedDheader)
    }
}

/// EMHEADER1 (§4.5.5, Glossary): `M(bit31) | LC(bits 28-30) | MemberId(bits 0-27)`.
#[derive(Debug, Clone, Copy)]
pub struct EmHeader1 {
    pub lc: LengthCode,
    pub must_understand: bool,
    pub member_id: u32,
}

impl EmHeader1 {
    pub fn to_word(self) -> u32 {
        let m = if self.must_understand { 1u32 << 31 } else { 0 };
        let lc = (self.lc as u32 & 0x7) << 28;
        let id = self.member_id & 0x0FFF_FFFF;
        m | lc | id
    }

    pub fn from_word(word: u32) -> CdrResult<EmHeader1> {
        let must_understand = (word >> 31) & 1 != 0;
        let lc = LengthCode::from_bits((word >> 28) & 0x7)?;
        let member_id = word & 0x0FFF_FFFF;
        Ok(EmHeader1 {
            lc,
            must_understand,
            member_id,
        })
    }

    pub fn write(self, buf: &mut Buffer, state: &CodecState) -> CdrResult<()> {
        primitives::write_u32(buf, state, self.to_word())
    }

    pub fn read(buf: &mut Buffer, state: &CodecState) -> CdrResult<EmHeader1> {
        let word = primitives::read_u32(buf, state)?;
        EmHeader1::from_word(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::Endianness;
    use crate::version::CdrVersion;

    fn le_v1() -> CodecState {
        CodecState::new(CdrVersion::XCDRv1, Endianness::Little)
    }

    #[test]
    fn test_short_member_header_round_trip() {
        let mut raw = [0u8; 4];
        let st = le_v1();
        {
            let mut buf = Buffer::from_mut_slice(&mut raw);
            let header = ShortMemberHeader {
                member_id: 1,
                length: 2,
                must_understand: false,
                implementation_specific: false,
            };
            header.write(&mut buf, &st).expect("write header");
        }
        assert_eq!(raw, [0x01, 0x00, 0x02, 0x00]);
        let mut buf = Buffer::from_mut_slice(&mut raw);
        let decoded = ShortMemberHeader::read(&mut buf, &st).expect("read header");
        assert_eq!(decoded.member_id, 1);
        assert_eq!(decoded.length, 2);
    }

    #[test]
    fn test_sentinel_bytes_match_spec() {
        let mut raw = [0u8; 4];
        let st = le_v1();
        {
            let mut buf = Buffer::from_mut_slice(&mut raw);
            write_sentinel(&mut buf, &st).expect("write sentinel");
        }
        assert_eq!(raw, [0x02, 0x3F, 0x00, 0x00]);
    }

    #[test]
    fn test_emheader1_matches_wire_vector() {
        // Mutable XCDRv2 BE, member_id=0, uint32 payload -> EMHEADER1 = 20 00 00 00.
        let st = CodecState::new(CdrVersion::XCDRv2, Endianness::Big);
        let header = EmHeader1 {
            lc: LengthCode::Inline4,
            must_understand: false,
            member_id: 0,
        };
        let mut raw = [0u8; 4];
        {
            let mut buf = Buffer::from_mut_slice(&mut raw);
            header.write(&mut buf, &st).expect("write emheader1");
        }
        assert_eq!(raw, [0x20, 0x00, 0x00, 0x00]);

        let mut buf = Buffer::from_mut_slice(&mut raw);
        let decoded = EmHeader1::read(&mut buf, &st).expect("read emheader1");
        assert_eq!(decoded.lc, LengthCode::Inline4);
        assert!(!decoded.must_understand);
        assert_eq!(decoded.member_id, 0);
    }

    #[test]
    fn test_reserved_lc_rejected() {
        assert!(LengthCode::from_bits(6).is_err());
        assert!(LengthCode::from_bits(7).is_err());
    }

    #[test]
    fn test_pad_to_next_4_from_header_start() {
        let mut raw = [0u8; 8];
        let header_start = 0usize;
        let mut buf = Buffer::from_mut_slice(&mut raw);
        buf.write(&[1, 2, 3, 4, 5, 6]).expect("write 6 bytes");
        pad_to_next_4_from(&mut buf, header_start).expect("pad");
        assert_eq!(buf.current(), 8);
    }
}
