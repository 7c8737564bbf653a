//! Error Taxonomy
//!
//! This module provides the error types surfaced by the disassembly engine,
//! using `thiserror` for zero-cost, detailed error messages. See the crate
//! documentation for how each variant propagates out of `Engine::disassemble`.
//!
//! # Error Categories
//! - **Control flow errors**: a decoded control-transfer instruction has a
//!   form the dispatch table does not cover. Fatal.
//! - **Decoder errors**: recoverable, absorbed at the linear-sweep boundary.
//! - **Shadow memory errors**: programming errors (address not covered).
//! - **Relocation errors**: non-fatal, logged and skipped.

use thiserror::Error;

use crate::Address;

/// Disassembly engine error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisasmError {
    /// A decoded control-transfer instruction has a form the dispatch table
    /// does not cover. Fatal; aborts the analysis.
    #[error("unknown control flow form at {0:#x}: {1}")]
    UnknownControlFlow(Address, String),

    /// The decoder rejected the byte stream at the given address.
    ///
    /// Recoverable: absorbed at the linear-sweep boundary.
    #[error("invalid instruction at {0:#x}")]
    InvalidInstruction(Address),

    /// The decoder was asked to read past the bounds of its input.
    ///
    /// Recoverable: absorbed at the linear-sweep boundary.
    #[error("invalid offset while decoding at {0:#x}")]
    InvalidOffset(Address),

    /// Shadow memory was queried or mutated at an address not covered by any
    /// of its memory ranges. Programming error; surfaced to the caller.
    #[error("address {0:#x} is out of range for shadow memory")]
    AddressOutOfRange(Address),

    /// A relocation entry referenced an address that is not mapped.
    ///
    /// Non-fatal: logged and skipped by the relocation pass.
    #[error("corrupt relocation entry at {0:#x}")]
    CorruptRelocation(Address),
}

/// Convenience alias used throughout the engine for fallible operations that
/// bubble up one of the taxonomy's fatal variants.
pub type Result<T> = std::result::Result<T, DisasmError>;
