//! Instruction Wrapper
//!
//! `InstructionView` composes a [`RawInstruction`] with a [`CpuProfile`] to
//! answer the derived queries the engine needs (absolute displacements,
//! register read/write sets, memory-operand enumeration). Per Design Note
//! 9 this is explicit composition — a struct holding the decoded
//! instruction as a field and forwarding named methods — rather than
//! runtime attribute interception.

use smallvec::SmallVec;

use crate::cpu::{CpuProfile, RegisterId};
use crate::decoder::{RawInstruction, RawOperand};
use crate::Address;

/// A memory operand with its effective (already-resolved, where possible)
/// displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOperandView {
    pub seg_reg: RegisterId,
    pub base_reg: RegisterId,
    pub index_reg: RegisterId,
    pub scale: u32,
    pub length: u32,
    /// `Some(addr)` when the effective displacement is computable per §3;
    /// `None` when undefined (non-PC-relative base, or a segment-relative
    /// operand).
    pub effective_displacement: Option<Address>,
}

/// Up to four register hits per instruction, matching the operand-list
/// bound.
pub type RegisterSet = SmallVec<[RegisterId; 4]>;
/// Up to two memory operands per instruction is the overwhelming common
/// case on x86 (at most one read and one write operand).
pub type MemoryOperandSet = SmallVec<[MemoryOperandView; 2]>;

/// Thin wrapper over a decoded instruction plus the CPU profile it was
/// decoded under. Caches nothing; every query recomputes from the
/// underlying fields.
pub struct InstructionView<'a> {
    raw: &'a RawInstruction,
    cpu: &'a CpuProfile,
}

impl<'a> InstructionView<'a> {
    pub fn new(raw: &'a RawInstruction, cpu: &'a CpuProfile) -> Self {
        InstructionView { raw, cpu }
    }

    pub fn raw(&self) -> &RawInstruction {
        self.raw
    }

    pub fn runtime_address(&self) -> Address {
        self.raw.runtime_address
    }

    pub fn length(&self) -> u32 {
        self.raw.length
    }

    /// `runtime_address + length`.
    pub fn next_address(&self) -> Address {
        self.raw.next_address()
    }

    /// If the instruction carries the far-transfer attribute, the raw
    /// displacement is already absolute. Otherwise sign-extend from
    /// 32 bits (even in 64-bit mode, per ISA) and add `next_address`.
    pub fn absolute_branch_displacement(&self) -> Option<Address> {
        let disp = self.raw.branch_displacement?;
        if self.raw.is_far_transfer {
            return Some(disp as u64);
        }
        let sign_extended = disp as i32 as i64;
        Some((self.next_address() as i64).wrapping_add(sign_extended) as Address)
    }

    /// Per §3: effective displacement is `next_address + raw_displacement`
    /// when the operand's base register is the program counter; undefined
    /// if the base register is some other register, or if the segment
    /// register is SS/FS/GS.
    pub fn absolute_memory_displacement(&self, operand: &RawOperand) -> Option<Address> {
        if self.is_undefined_segment(operand.seg_reg) {
            return None;
        }
        if operand.base_reg == self.cpu.program_counter() {
            return Some((self.next_address() as i64).wrapping_add(operand.displacement) as Address);
        }
        if operand.base_reg != RegisterId::INVALID {
            return None;
        }
        Some(operand.displacement as Address)
    }

    fn is_undefined_segment(&self, seg_reg: RegisterId) -> bool {
        // SS/FS/GS make the displacement segment-relative, hence undefined
        // without tracking segment bases; identified by register identity,
        // not by position in the profile's segment-register list.
        self.cpu.is_stack_or_far_segment(seg_reg)
    }

    pub fn read_registers(&self) -> RegisterSet {
        self.raw
            .operands
            .iter()
            .filter(|o| o.is_register_operand() && o.is_read)
            .map(|o| o.register)
            .collect()
    }

    pub fn written_registers(&self) -> RegisterSet {
        self.raw
            .operands
            .iter()
            .filter(|o| o.is_register_operand() && o.is_written)
            .map(|o| o.register)
            .collect()
    }

    pub fn memory_operands(&self) -> MemoryOperandSet {
        self.raw
            .memory_operands()
            .map(|o| self.view_of(o))
            .collect()
    }

    pub fn read_memory_operands(&self) -> MemoryOperandSet {
        self.raw
            .memory_operands()
            .filter(|o| o.is_read)
            .map(|o| self.view_of(o))
            .collect()
    }

    pub fn written_memory_operands(&self) -> MemoryOperandSet {
        self.raw
            .memory_operands()
            .filter(|o| o.is_written)
            .map(|o| self.view_of(o))
            .collect()
    }

    fn view_of(&self, o: &RawOperand) -> MemoryOperandView {
        MemoryOperandView {
            seg_reg: o.seg_reg,
            base_reg: o.base_reg,
            index_reg: o.index_reg,
            scale: o.scale,
            length: o.length,
            effective_displacement: self.absolute_memory_displacement(o),
        }
    }

    /// Whether this instruction writes the program counter, used by CFG
    /// synthesis to decide whether a basic block's terminator transfers
    /// control explicitly or simply falls through to the next block.
    pub fn writes_program_counter(&self) -> bool {
        self.written_registers().iter().any(|r| *r == self.cpu.program_counter())
    }
}
