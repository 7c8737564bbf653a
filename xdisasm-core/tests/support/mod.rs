//! Shared in-memory `ImageProvider`/`Decoder` test double and instruction
//! builders used by the integration tests. Neither collaborator has a
//! production implementation in this crate (see crate docs); this is the
//! hand-rolled double the testable-properties and scenario tests (spec §8)
//! exercise the engine against.

use std::collections::HashMap;

use xdisasm_core::cpu::{CpuProfile, Mode, RegisterId};
use xdisasm_core::decoder::{
    Category, Decoder, Form, Immediate, InstructionClass, OperandList, RawInstruction, RawOperand,
};
use xdisasm_core::error::DisasmError;
use xdisasm_core::image::{ImageProvider, Section, SectionFlags};
use xdisasm_core::Address;

pub const PC: RegisterId = RegisterId(16);
pub const SP: RegisterId = RegisterId(7);
pub const EAX: RegisterId = RegisterId(0);

pub fn cpu() -> CpuProfile {
    CpuProfile::new(
        Mode::Protected32,
        PC,
        SP,
        vec![RegisterId(20), RegisterId(21), RegisterId(22)],
        RegisterId(20), // SS
        RegisterId(21), // FS
        RegisterId(22), // GS
        vec![RegisterId(0), RegisterId(1), RegisterId(2), RegisterId(3)],
    )
}

pub struct TestImage {
    pub sections: Vec<Section>,
    pub entry_points: Vec<Address>,
    pub functions: Vec<Address>,
    pub exit_points: Vec<Address>,
    pub relocations: Vec<Address>,
}

impl TestImage {
    pub fn new() -> Self {
        TestImage {
            sections: Vec::new(),
            entry_points: Vec::new(),
            functions: Vec::new(),
            exit_points: Vec::new(),
            relocations: Vec::new(),
        }
    }

    pub fn with_exec_section(mut self, start: Address, end: Address) -> Self {
        self.sections.push(Section {
            start_address: start,
            end_address: end,
            flags: SectionFlags { loaded: true, readable: true, writable: false, executable: true },
            byte_data: vec![0u8; (end - start) as usize],
        });
        self
    }

    pub fn with_data_section(mut self, start: Address, end: Address, bytes: Vec<u8>) -> Self {
        let mut byte_data = bytes;
        byte_data.resize((end - start) as usize, 0);
        self.sections.push(Section {
            start_address: start,
            end_address: end,
            flags: SectionFlags { loaded: true, readable: true, writable: true, executable: false },
            byte_data,
        });
        self
    }
}

impl ImageProvider for TestImage {
    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn arch(&self) -> &str {
        "i386"
    }

    fn entry_points(&self) -> &[Address] {
        &self.entry_points
    }

    fn functions(&self) -> &[Address] {
        &self.functions
    }

    fn exit_points(&self) -> &[Address] {
        &self.exit_points
    }

    fn relocations(&self) -> &[Address] {
        &self.relocations
    }

    fn read(&self, addr: Address, len: u64) -> Option<&[u8]> {
        let section = self.get_section_for_address_range(addr, len)?;
        let offset = (addr - section.start_address) as usize;
        section.byte_data.get(offset..offset + len as usize)
    }
}

#[derive(Default)]
pub struct TestDecoder {
    pub instructions: HashMap<Address, RawInstruction>,
}

impl TestDecoder {
    pub fn new() -> Self {
        TestDecoder::default()
    }

    pub fn insert(&mut self, insn: RawInstruction) {
        self.instructions.insert(insn.runtime_address, insn);
    }
}

impl Decoder for TestDecoder {
    fn decode_one(&self, _bytes: &[u8], runtime_address: Address) -> Result<Option<RawInstruction>, DisasmError> {
        Ok(self.instructions.get(&runtime_address).cloned())
    }
}

fn near_displacement(addr: Address, len: u32, target: Address) -> i64 {
    target as i64 - (addr as i64 + len as i64)
}

/// A synthetic operand asserting the instruction writes the program
/// counter, the way a real decoder reports any control-transfer
/// instruction (branch/call/ret) so CFG synthesis can tell a terminator
/// that transfers control from one that merely falls through.
fn writes_pc() -> RawOperand {
    RawOperand {
        is_register: true,
        is_memory: false,
        is_read: false,
        is_written: true,
        register: PC,
        seg_reg: RegisterId::INVALID,
        base_reg: RegisterId::INVALID,
        index_reg: RegisterId::INVALID,
        scale: 1,
        displacement: 0,
        length: 4,
    }
}

pub fn normal(addr: Address, len: u32, class: InstructionClass) -> RawInstruction {
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::Normal,
        form: Form::NotApplicable,
        instruction_class: class,
        immediate: None,
        branch_displacement: None,
        operands: OperandList::new(),
        is_far_transfer: false,
    }
}

pub fn ret(addr: Address, len: u32) -> RawInstruction {
    let mut operands = OperandList::new();
    operands.push(writes_pc());
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::Ret,
        form: Form::NotApplicable,
        instruction_class: InstructionClass::RetNear,
        immediate: None,
        branch_displacement: None,
        operands,
        is_far_transfer: false,
    }
}

pub fn call_near(addr: Address, len: u32, target: Address) -> RawInstruction {
    let mut operands = OperandList::new();
    operands.push(writes_pc());
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::Call,
        form: Form::DirectRelative,
        instruction_class: InstructionClass::CallNear,
        immediate: None,
        branch_displacement: Some(near_displacement(addr, len, target)),
        operands,
        is_far_transfer: false,
    }
}

pub fn jmp_direct(addr: Address, len: u32, target: Address) -> RawInstruction {
    let mut operands = OperandList::new();
    operands.push(writes_pc());
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::UncondBr,
        form: Form::DirectRelative,
        instruction_class: InstructionClass::Jmp,
        immediate: None,
        branch_displacement: Some(near_displacement(addr, len, target)),
        operands,
        is_far_transfer: false,
    }
}

pub fn jcc(addr: Address, len: u32, target: Address) -> RawInstruction {
    let mut operands = OperandList::new();
    operands.push(writes_pc());
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::CondBr,
        form: Form::DirectRelative,
        instruction_class: InstructionClass::Jcc,
        immediate: None,
        branch_displacement: Some(near_displacement(addr, len, target)),
        operands,
        is_far_transfer: false,
    }
}

/// `jmp [base + scale*index]`, an indirect jump through a jump table.
pub fn jmp_mem_indirect(addr: Address, len: u32, base: Address, scale: u32) -> RawInstruction {
    let mut operands = OperandList::new();
    operands.push(writes_pc());
    operands.push(RawOperand {
        is_register: false,
        is_memory: true,
        is_read: true,
        is_written: false,
        register: RegisterId::INVALID,
        seg_reg: RegisterId::INVALID,
        base_reg: RegisterId::INVALID,
        index_reg: RegisterId(1),
        scale,
        displacement: base as i64,
        length: 4,
    });
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::UncondBr,
        form: Form::MemoryIndirect,
        instruction_class: InstructionClass::Jmp,
        immediate: None,
        branch_displacement: None,
        operands,
        is_far_transfer: false,
    }
}

/// `pop ebx`-shaped instruction: writes a GPR, no flow control.
pub fn pop_reg(addr: Address, len: u32) -> RawInstruction {
    let mut operands = OperandList::new();
    operands.push(RawOperand {
        is_register: true,
        is_memory: false,
        is_read: false,
        is_written: true,
        register: EAX,
        seg_reg: RegisterId::INVALID,
        base_reg: RegisterId::INVALID,
        index_reg: RegisterId::INVALID,
        scale: 1,
        displacement: 0,
        length: 4,
    });
    RawInstruction {
        runtime_address: addr,
        length: len,
        category: Category::Normal,
        form: Form::NotApplicable,
        instruction_class: InstructionClass::Pop,
        immediate: None,
        branch_displacement: None,
        operands,
        is_far_transfer: false,
    }
}

#[allow(dead_code)]
pub fn immediate_normal(addr: Address, len: u32, value: u64, width_bits: u32) -> RawInstruction {
    let mut insn = normal(addr, len, InstructionClass::Mov);
    insn.immediate = Some(Immediate { value, width_bits });
    insn
}

pub fn le_u32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}
