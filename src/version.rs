// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dialect selection: CDR version, extensibility kind, and run-time config.

use crate::endian::Endianness;
use crate::error::{CdrError, CdrResult};

/// Which of the three interoperable CDR dialects is in play.
///
/// `FastCdr` (§1, §4.2) is not a distinct wire dialect in the OMG sense; it
/// is the classic grammar with alignment forced to zero, selected via
/// [`CodecState::fastcdr`] rather than as a fourth `CdrVersion` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdrVersion {
    CorbaCdr,
    XCDRv1,
    XCDRv2,
}

impl CdrVersion {
    /// `max_align` used by the scalar-alignment rule (§4.2): 8 for classic
    /// CDR / XCDRv1, 4 for XCDRv2 (long double is the sole exception, handled
    /// in `primitives`).
    pub fn max_align(self) -> usize {
        match self {
            CdrVersion::CorbaCdr | CdrVersion::XCDRv1 => 8,
            CdrVersion::XCDRv2 => 4,
        }
    }
}

/// The extensibility kind a composite type declares, selecting the member
/// framing grammar (§4.5). `Plain` is the "no framing at all" case used both
/// for `CdrVersion::CorbaCdr` (`PlainCdr`) and for XCDRv2 final structs
/// (`PlainCdr2`) — the two differ only in alignment cap, not in grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensibilityKind {
    /// No prefix, no sentinel, position-driven members (`PlainCdr`/`PlainCdr2`).
    Plain,
    /// DHEADER-prefixed, ordered members, trailing-unknown-skip (`DelimitCdr2`).
    Appendable,
    /// Per-member header framing, unknown members skipped by length
    /// (`PlCdr1` under XCDRv1, `PlCdr2` under XCDRv2).
    Mutable,
}

/// High bits of the second encapsulation byte (§3.1, §4.4). The numeric
/// values are part of the wire contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingAlgorithmFlag {
    PlainCdr1 = 0,
    PlCdr1 = 2,
    PlainCdr2 = 6,
    DelimitCdr2 = 8,
    PlCdr2 = 10,
}

impl EncodingAlgorithmFlag {
    pub fn from_byte_high_bits(bits: u8) -> CdrResult<Self> {
        match bits {
            0 => Ok(EncodingAlgorithmFlag::PlainCdr1),
            2 => Ok(EncodingAlgorithmFlag::PlCdr1),
            6 => Ok(EncodingAlgorithmFlag::PlainCdr2),
            8 => Ok(EncodingAlgorithmFlag::DelimitCdr2),
            10 => Ok(EncodingAlgorithmFlag::PlCdr2),
            other => Err(CdrError::bad_param(format!(
                "unrecognized encoding algorithm flag bits {:#x}",
                other
            ))),
        }
    }

    pub fn high_bits(self) -> u8 {
        self as u8
    }

    /// The `(version, extensibility kind)` pair this flag identifies.
    pub fn version_and_kind(self) -> (CdrVersion, ExtensibilityKind) {
        match self {
            EncodingAlgorithmFlag::PlainCdr1 => (CdrVersion::XCDRv1, ExtensibilityKind::Plain),
            EncodingAlgorithmFlag::PlCdr1 => (CdrVersion::XCDRv1, ExtensibilityKind::Mutable),
            EncodingAlgorithmFlag::PlainCdr2 => (CdrVersion::XCDRv2, ExtensibilityKind::Plain),
            EncodingAlgorithmFlag::DelimitCdr2 => {
                (CdrVersion::XCDRv2, ExtensibilityKind::Appendable)
            }
            EncodingAlgorithmFlag::PlCdr2 => (CdrVersion::XCDRv2, ExtensibilityKind::Mutable),
        }
    }
}

/// Run-time configuration and current cursor-state of a [`crate::codec::Cdr`].
#[derive(Debug, Clone, Copy)]
pub struct CodecState {
    pub version: CdrVersion,
    pub endianness: Endianness,
    pub kind: ExtensibilityKind,
    /// 2 reserved bytes from the encapsulation header (§6.3 `dds_options`).
    pub options: [u8; 2],
    /// FastCDR strips all padding (§4.2); independent of `version`.
    pub fastcdr: bool,
}

impl CodecState {
    pub fn new(version: CdrVersion, endianness: Endianness) -> Self {
        let kind = match version {
            CdrVersion::XCDRv2 => ExtensibilityKind::Appendable,
            _ => ExtensibilityKind::Plain,
        };
        CodecState {
            version,
            endianness,
            kind,
            options: [0, 0],
            fastcdr: false,
        }
    }

    /// Rejects pairing a CDRv2-only flag with an XCDRv1-configured codec and
    /// vice versa (§4.4).
    pub fn validate_flag(&self, flag: EncodingAlgorithmFlag) -> CdrResult<()> {
        let (flag_version, _) = flag.version_and_kind();
        let compatible = matches!(
            (self.version, flag_version),
            (CdrVersion::CorbaCdr, CdrVersion::XCDRv1)
                | (CdrVersion::XCDRv1, CdrVersion::XCDRv1)
                | (CdrVersion::XCDRv2, CdrVersion::XCDRv2)
        );
        if compatible {
            Ok(())
        } else {
            Err(CdrError::bad_param(format!(
                "encoding flag {:?} is not valid for codec version {:?}",
                flag, self.version
            )))
        }
    }

    /// Scalar alignment cap for the current version (§4.2); always 1 for
    /// FastCDR.
    pub fn max_align(&self) -> usize {
        if self.fastcdr {
            1
        } else {
            self.version.max_align()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_round_trip() {
        for flag in [
            EncodingAlgorithmFlag::PlainCdr1,
            EncodingAlgorithmFlag::PlCdr1,
            EncodingAlgorithmFlag::PlainCdr2,
            EncodingAlgorithmFlag::DelimitCdr2,
            EncodingAlgorithmFlag::PlCdr2,
        ] {
            let bits = flag.high_bits();
            let parsed = EncodingAlgorithmFlag::from_byte_high_bits(bits).expect("valid bits");
            assert_eq!(parsed, flag);
        }
    }

    #[test]
    fn test_unrecognized_bits_rejected() {
        assert!(EncodingAlgorithmFlag::from_byte_high_bits(3).is_err());
    }

    #[test]
    fn test_validate_flag_rejects_cross_version() {
        let state = CodecState::new(CdrVersion::XCDRv2, Endianness::Little);
        assert!(state.validate_flag(EncodingAlgorithmFlag::PlainCdr1).is_err());
        assert!(state.validate_flag(EncodingAlgorithmFlag::PlCdr1).is_err());
        assert!(state.validate_flag(EncodingAlgorithmFlag::PlainCdr2).is_ok());
    }

    #[test]
    fn test_max_align_per_version() {
        assert_eq!(CdrVersion::CorbaCdr.max_align(), 8);
        assert_eq!(CdrVersion::XCDRv1.max_align(), 8);
        assert_eq!(CdrVersion::XCDRv2.max_align(), 4);
    }
}
