// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The 4-byte encapsulation envelope (§4.4).

use crate::buffer::Buffer;
use crate::endian::Endianness;
use crate::error::{CdrError, CdrResult};
use crate::version::EncodingAlgorithmFlag;
use log::trace;

/// Result of a successful `read_encapsulation` call.
#[derive(Debug, Clone, Copy)]
pub struct Encapsulation {
    pub flag: EncodingAlgorithmFlag,
    pub endianness: Endianness,
    pub options: [u8; 2],
}

/// Writes the envelope at the buffer's current position (normally offset 0)
/// and moves `align_origin` to just past it, so later alignment starts from
/// zero regardless of the envelope's own size.
pub fn serialize_encapsulation(
    buf: &mut Buffer,
    flag: EncodingAlgorithmFlag,
    endianness: Endianness,
    options: [u8; 2],
) -> CdrResult<()> {
    let byte1 = flag.high_bits() | u8::from(endianness.low_bit());
    buf.write(&[0x00, byte1, options[0], options[1]])?;
    let origin = buf.current();
    buf.set_align_origin(origin);
    trace!("wrote encapsulation header: flag={:?} {:?}", flag, endianness);
    Ok(())
}

/// Reads and validates the envelope; on success, moves `align_origin` to
/// just past it.
pub fn read_encapsulation(buf: &mut Buffer) -> CdrResult<Encapsulation> {
    let header = buf.read(4)?;
    let (reserved, id_byte, opt0, opt1) = (header[0], header[1], header[2], header[3]);
    if reserved != 0x00 {
        return Err(CdrError::bad_param(format!(
            "encapsulation byte 0 must be 0x00, found {:#x}",
            reserved
        )));
    }
    let endianness = Endianness::from_low_bit(id_byte & 0x01 != 0);
    let flag = EncodingAlgorithmFlag::from_byte_high_bits(id_byte & !0x01)?;
    let origin = buf.current();
    buf.set_align_origin(origin);
    trace!("read encapsulation header: flag={:?} {:?}", flag, endianness);
    Ok(Encapsulation {
        flag,
        endianness,
        options: [opt0, opt1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plcdr1_little_endian_header_byte() {
        let mut raw = [0u8; 4];
        let mut buf = Buffer::from_mut_slice(&mut raw);
        serialize_encapsulation(
            &mut buf,
            EncodingAlgorithmFlag::PlCdr1,
            Endianness::Little,
            [0, 0],
        )
        .expect("write encapsulation");
        assert_eq!(raw, [0x00, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn test_round_trip() {
        let mut raw = [0u8; 4];
        {
            let mut buf = Buffer::from_mut_slice(&mut raw);
            serialize_encapsulation(
                &mut buf,
                EncodingAlgorithmFlag::DelimitCdr2,
                Endianness::Big,
                [0, 0],
            )
            .expect("write encapsulation");
        }
        let mut buf = Buffer::from_mut_slice(&mut raw);
        let enc = read_encapsulation(&mut buf).expect("read encapsulation");
        assert_eq!(enc.flag, EncodingAlgorithmFlag::DelimitCdr2);
        assert_eq!(enc.endianness, Endianness::Big);
        assert_eq!(buf.align_origin(), 4);
    }

    #[test]
    fn test_bad_first_byte_rejected() {
        for b in [0x01u8, 0x7F, 0xFF] {
            let mut raw = [b, 0x03, 0x00, 0x00];
            let mut buf = Buffer::from_mut_slice(&mut raw);
            let err = read_encapsulation(&mut buf).unwrap_err();
            assert!(matches!(err, CdrError::BadParam { .. }));
        }
    }
}
