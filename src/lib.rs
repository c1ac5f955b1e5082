// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A CDR / XCDR wire codec: classic CDR (CORBA-aligned), XCDRv1 (`PlainCdr1`
//! / `PlCdr1`), and XCDRv2 (`PlainCdr2` / `DelimitCdr2` / `PlCdr2`), plus a
//! `FastCdr` padding-free variant of the classic grammar.
//!
//! [`codec::Cdr`] is the entry point: it owns a [`buffer::Buffer`] and
//! drives it through whichever of the five composite-member grammars the
//! active [`version::ExtensibilityKind`] selects. [`size_calculator::SizeCalculator`]
//! mirrors `Cdr`'s write calls without touching any storage, for callers
//! that need a length up front.
//!
//! No error is retried internally (see [`error::CdrError`]); a call that
//! fails leaves the buffer's cursor wherever it stopped; the caller decides
//! whether to discard the buffer or rewind to a saved [`state::State`].

pub mod buffer;
pub mod codec;
pub mod container;
pub mod encapsulation;
pub mod endian;
pub mod error;
pub mod member_header;
pub mod primitives;
pub mod size_calculator;
pub mod state;
pub mod version;

pub use buffer::Buffer;
pub use codec::{Cdr, CdrPrimitive};
pub use endian::Endianness;
pub use error::{CdrError, CdrResult};
pub use primitives::LongDouble;
pub use size_calculator::SizeCalculator;
pub use state::State;
pub use version::{CdrVersion, CodecState, EncodingAlgorithmFlag, ExtensibilityKind};
