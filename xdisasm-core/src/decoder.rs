//! Decoder contract
//!
//! The instruction decoder is an external collaborator: this module defines
//! the trait and the per-instruction metadata the engine dispatches on.
//! Production decoders (wrapping e.g. an XED-style backend) live outside
//! this crate; tests supply an in-memory double over a small instruction
//! table.
//!
//! Decoder statefulness: rather than a mutable cursor `(byte_buffer, offset,
//! runtime_address)` advanced in place, [`Decoder::decode_one`] takes the
//! remaining bytes and the runtime address as arguments and returns a
//! decoded instruction plus its length. The engine owns cursor-advancement
//! bookkeeping (see `engine::flow`); this keeps the trait object-safe and
//! free of self-referential borrows.

use smallvec::SmallVec;

use crate::cpu::RegisterId;
use crate::error::DisasmError;
use crate::Address;

/// Coarse instruction kind the engine dispatches its flow-control handling
/// on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    Normal,
    Call,
    CondBr,
    UncondBr,
    Ret,
    Int,
    Syscall,
    Sysret,
    Invalid,
}

/// Mnemonic class, coarser than the decoder's native instruction id but
/// finer than [`Category`] — this is what the classifier's prologue set is
/// expressed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum InstructionClass {
    CallNear,
    RetNear,
    Push,
    Pop,
    Cmp,
    Test,
    Setcc,
    Jcc,
    Jmp,
    Lea,
    Sub,
    And,
    Xor,
    Mov,
    Movsx,
    Movzx,
    Fld,
    Fldz,
    Fst,
    Fstp,
    /// Everything not named above; never a member of the prologue set.
    Other,
}

/// Decoder-specific sub-kind of a control-transfer instruction, used to
/// pick the correct resolution strategy within a [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Form {
    /// Direct, PC-relative displacement (near call/jump/branch).
    DirectRelative,
    /// Indirect through a memory operand.
    MemoryIndirect,
    /// Indirect through a register operand.
    RegisterIndirect,
    /// Direct far transfer carrying an absolute pointer (ptr16:32 etc).
    FarDirect,
    /// `xabort $imm` — ignored by the engine.
    XabortImmediate,
    /// `xend` — pure fall-through, no taken edge.
    Xend,
    /// Not a control-transfer instruction (used for `Category::Normal`).
    NotApplicable,
}

/// An immediate operand's value and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Immediate {
    pub value: u64,
    pub width_bits: u32,
}

/// One decoder operand. Mirrors the "each with register?/read?/written?"
/// contract plus the memory-operand fields needed for displacement
/// computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RawOperand {
    pub is_register: bool,
    pub is_memory: bool,
    pub is_read: bool,
    pub is_written: bool,
    pub register: RegisterId,
    /// Memory operand fields; meaningful only when `is_memory`.
    pub seg_reg: RegisterId,
    pub base_reg: RegisterId,
    pub index_reg: RegisterId,
    pub scale: u32,
    pub displacement: i64,
    /// Operand length in bytes (used for data-width classification and for
    /// selecting the jump-table element format).
    pub length: u32,
}

impl RawOperand {
    pub fn is_register_operand(&self) -> bool {
        self.is_register
    }

    pub fn is_memory_operand(&self) -> bool {
        self.is_memory
    }
}

/// Up to four operands fit on the stack for the overwhelming majority of
/// x86 instructions (mirrors the teacher's `SmallVec<[Operand; 4]>`
/// convention for decoded-instruction operand lists).
pub type OperandList = SmallVec<[RawOperand; 4]>;

/// One decoded instruction, as reported by the decoder, before the
/// engine's [`crate::instruction::InstructionView`] wrapper adds derived
/// queries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RawInstruction {
    pub runtime_address: Address,
    pub length: u32,
    pub category: Category,
    pub form: Form,
    pub instruction_class: InstructionClass,
    pub immediate: Option<Immediate>,
    /// Already sign-extended, but NOT yet made absolute (that is
    /// `InstructionView::absolute_branch_displacement`'s job) — this is
    /// the raw encoded displacement as the decoder reports it.
    pub branch_displacement: Option<i64>,
    pub operands: OperandList,
    /// Whether the instruction carries a far-transfer encoding (changes
    /// how `branch_displacement` is interpreted).
    pub is_far_transfer: bool,
}

impl RawInstruction {
    pub fn next_address(&self) -> Address {
        self.runtime_address + self.length as Address
    }

    pub fn memory_operands(&self) -> impl Iterator<Item = &RawOperand> {
        self.operands.iter().filter(|o| o.is_memory_operand())
    }
}

/// Decode one instruction given the remaining bytes of the containing
/// section and the instruction's runtime address.
///
/// Returns `Ok(None)` at end of the supplied buffer (the decoder contract's
/// "absent at EOF"). `Err(DisasmError::InvalidInstruction)` /
/// `Err(DisasmError::InvalidOffset)` map onto the decoder's two raised
/// error kinds.
pub trait Decoder {
    fn decode_one(
        &self,
        bytes: &[u8],
        runtime_address: Address,
    ) -> Result<Option<RawInstruction>, DisasmError>;
}
