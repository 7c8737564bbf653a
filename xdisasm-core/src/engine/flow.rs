//! Phase 2 — Seeded recursive disassembly, flow-control dispatch, the
//! jump-table walker (§4.7.3), and the linear-sweep probe (§4.7.4).

use crate::cpu::RegisterId;
use crate::decoder::{Category, Decoder, Form, RawInstruction};
use crate::error::DisasmError;
use crate::image::ImageProvider;
use crate::instruction::InstructionView;
use crate::shadow::bits;
use crate::Address;

use super::DisassemblyEngine;

impl<'a, I: ImageProvider, D: Decoder> DisassemblyEngine<'a, I, D> {
    /// Maintains a DFS stack seeded with `seed`; pops an address, skips it
    /// if already analyzed or an exit point, otherwise linearly sweeps
    /// from it.
    pub(super) fn recursive_disassemble(&mut self, seed: Address) -> Result<(), DisasmError> {
        let mut stack = vec![seed];
        let exit_points = self.image.exit_points().to_vec();
        while let Some(a) = stack.pop() {
            if self.shadow.is_marked_as_analyzed(a)? {
                continue;
            }
            if exit_points.contains(&a) {
                continue;
            }
            self.disassemble_linear_sweep(a, &mut stack)?;
        }
        Ok(())
    }

    fn decode_one_at(&self, addr: Address) -> Result<Option<RawInstruction>, DisasmError> {
        let section = match self.image.get_section_for_address_range(addr, 1) {
            Some(s) => s,
            None => return Ok(None),
        };
        let offset = (addr - section.start_address) as usize;
        let bytes = &section.byte_data[offset..];
        self.decoder.decode_one(bytes, addr)
    }

    fn disassemble_linear_sweep(&mut self, start_seed: Address, stack: &mut Vec<Address>) -> Result<(), DisasmError> {
        let mut ra = start_seed;
        let mut decode_failed = false;
        loop {
            let insn = match self.decode_one_at(ra) {
                Ok(Some(insn)) => insn,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("decode error sweeping from {start_seed:#x} at {ra:#x}: {e}");
                    decode_failed = true;
                    break;
                }
            };
            let len = insn.length as u64;
            self.shadow.mark_as_code(ra, len)?;
            self.shadow.mark_range(ra, len, bits::ANALYZED)?;

            match insn.category {
                Category::Normal => self.analyze_normal(ra, &insn)?,
                Category::Call => self.analyze_call(ra, &insn)?,
                Category::UncondBr => self.analyze_uncond_br(ra, &insn)?,
                Category::CondBr => self.analyze_cond_br(ra, &insn)?,
                Category::Ret | Category::Int | Category::Syscall | Category::Sysret => {}
                Category::Invalid => {
                    return Err(DisasmError::UnknownControlFlow(ra, "invalid category".to_string()))
                }
            }

            let successors: Vec<Address> = self.xrefs.code_xrefs.get_successors(ra).into_iter().collect();
            for s in successors {
                if !self.shadow.is_marked_as_analyzed(s)? {
                    stack.push(s);
                }
            }

            let next = insn.next_address();
            let stop = matches!(insn.category, Category::Ret | Category::UncondBr)
                || self.shadow.is_marked_as_analyzed(next).unwrap_or(false);
            if stop {
                break;
            }
            ra = next;
        }
        if !decode_failed {
            self.shadow.mark_as_basic_block_leader(start_seed)?;
        }
        Ok(())
    }

    fn analyze_normal(&mut self, ra: Address, insn: &RawInstruction) -> Result<(), DisasmError> {
        let view = InstructionView::new(insn, &self.cpu);
        for op in insn.memory_operands() {
            if let Some(d) = view.absolute_memory_displacement(op) {
                self.xrefs.add_data_xref(ra, d);
                if !matches!(op.length, 4 | 6 | 8 | 10) {
                    self.shadow.mark_as_data(d, op.length as u64)?;
                }
            }
        }
        if let Some(imm) = insn.immediate {
            if imm.width_bits == self.cpu.address_width_bits()
                && self.is_executable_address(imm.value)
            {
                let has_relocations = !self.image.relocations().is_empty();
                let is_leaf = self.shadow.is_marked_as_relocated_leaf(imm.value).unwrap_or(false);
                if (!has_relocations || is_leaf) && self.linear_sweep_probe(imm.value) {
                    self.xrefs.add_data_xref(ra, imm.value);
                }
            }
        }
        self.xrefs.add_code_xref(ra, insn.next_address());
        Ok(())
    }

    fn analyze_call(&mut self, ra: Address, insn: &RawInstruction) -> Result<(), DisasmError> {
        let view = InstructionView::new(insn, &self.cpu);
        match insn.form {
            Form::DirectRelative => {
                if let Some(target) = view.absolute_branch_displacement() {
                    if target != insn.next_address() && self.is_executable_address(target) {
                        self.xrefs.add_code_xref(ra, target);
                        self.shadow.mark_as_function(target)?;
                    }
                }
            }
            Form::MemoryIndirect => {
                self.resolve_flow_memory_operands(ra, insn)?;
                let successors: Vec<Address> = self.xrefs.code_xrefs.get_successors(ra).into_iter().collect();
                for s in successors {
                    self.shadow.mark_as_function(s)?;
                }
            }
            Form::RegisterIndirect => {}
            Form::FarDirect => {
                if let Some(target) = view.absolute_branch_displacement() {
                    if self.is_executable_address(target) {
                        self.shadow.mark_as_function(target)?;
                    }
                }
            }
            _ => return Err(DisasmError::UnknownControlFlow(ra, format!("call form {:?}", insn.form))),
        }
        // Fall-through is added after any FUNCTION marks above, so the
        // fall-through instruction itself is never swept into FUNCTION.
        self.xrefs.add_code_xref(ra, insn.next_address());
        Ok(())
    }

    fn analyze_uncond_br(&mut self, ra: Address, insn: &RawInstruction) -> Result<(), DisasmError> {
        let view = InstructionView::new(insn, &self.cpu);
        match insn.form {
            Form::DirectRelative | Form::FarDirect => {
                if let Some(target) = view.absolute_branch_displacement() {
                    if self.is_executable_address(target) {
                        self.xrefs.add_code_xref(ra, target);
                        self.shadow.mark_as_basic_block_leader(target)?;
                    }
                }
            }
            Form::MemoryIndirect => self.resolve_flow_memory_operands(ra, insn)?,
            Form::RegisterIndirect => {}
            Form::XabortImmediate => {}
            _ => return Err(DisasmError::UnknownControlFlow(ra, format!("jump form {:?}", insn.form))),
        }
        Ok(())
    }

    fn analyze_cond_br(&mut self, ra: Address, insn: &RawInstruction) -> Result<(), DisasmError> {
        let view = InstructionView::new(insn, &self.cpu);
        let next = insn.next_address();
        if insn.form != Form::Xend {
            if let Some(target) = view.absolute_branch_displacement() {
                if self.is_executable_address(target) {
                    self.xrefs.add_conditional_code_xref(ra, target, true);
                    self.shadow.mark_as_basic_block_leader(target)?;
                }
            }
        }
        self.xrefs.add_conditional_code_xref(ra, next, false);
        self.shadow.mark_as_basic_block_leader(next)?;
        Ok(())
    }

    /// §4.7.3 — for each memory operand of a flow-control instruction with
    /// a mapped displacement, register a data-xref, then walk successive
    /// jump-table elements starting there.
    fn resolve_flow_memory_operands(&mut self, ra: Address, insn: &RawInstruction) -> Result<(), DisasmError> {
        let view = InstructionView::new(insn, &self.cpu);
        let exit_points = self.image.exit_points().to_vec();
        for op in insn.memory_operands() {
            let base = match view.absolute_memory_displacement(op) {
                Some(d) => d,
                None => continue,
            };
            self.xrefs.add_data_xref(ra, base);

            let mut element_addr = base;
            let step = op.scale.max(1) as u64;
            let has_index = op.index_reg != RegisterId::INVALID;
            loop {
                if exit_points.contains(&element_addr) {
                    self.xrefs.add_code_xref(ra, element_addr);
                } else {
                    match self.read_jump_table_element(element_addr, op.length) {
                        Some(v) => {
                            self.xrefs.add_code_xref(ra, v);
                            self.shadow.mark_as_basic_block_leader(v)?;
                        }
                        None => break,
                    }
                }
                if !has_index {
                    break;
                }
                element_addr += step;
            }
        }
        Ok(())
    }

    /// Unpacks one jump-table element at `address`, `len` bytes wide.
    /// `len` selects a format: `u32`, `u16+u32`, `u64`, `u16+u64` for
    /// 4/6/8/10 respectively; other lengths are not jump-table shaped.
    fn read_jump_table_element(&mut self, address: Address, len: u32) -> Option<Address> {
        let has_relocations = !self.image.relocations().is_empty();
        if has_relocations && !self.shadow.is_marked_as_relocated(address).unwrap_or(false) {
            return None;
        }
        let section = self.image.get_section_for_address_range(address, len as u64)?;
        let offset = (address - section.start_address) as usize;
        let bytes = section.byte_data.get(offset..offset + len as usize)?;
        let v = match len {
            4 => u32::from_le_bytes(bytes.try_into().ok()?) as Address,
            8 => u64::from_le_bytes(bytes.try_into().ok()?),
            6 => {
                self.warn_far_pointer_truncation_once(address);
                u32::from_le_bytes(bytes[2..6].try_into().ok()?) as Address
            }
            10 => {
                self.warn_far_pointer_truncation_once(address);
                u64::from_le_bytes(bytes[2..10].try_into().ok()?)
            }
            _ => return None,
        };
        if has_relocations && !self.shadow.is_marked_as_relocated_leaf(v).unwrap_or(false) {
            return None;
        }
        if !self.is_executable_address(v) {
            return None;
        }
        Some(v)
    }

    fn warn_far_pointer_truncation_once(&mut self, address: Address) {
        if !self.warned_far_pointer_truncation {
            log::warn!("discarding far-pointer segment component while unpacking jump table element at {address:#x}");
            self.warned_far_pointer_truncation = true;
        }
    }

    /// §4.7.4 — saves no real state (the decoder is stateless by
    /// construction here), decodes linearly from `addr` into a temporary
    /// instruction-class list, and fails the probe if any instruction is
    /// invalid, overlaps a byte already marked DATA, or has a direct
    /// branch displacement outside executable memory. Stops cleanly at
    /// RET/UNCOND_BR or end of stream; on a clean stop, returns the
    /// classifier's verdict over the collected classes.
    pub(super) fn linear_sweep_probe(&mut self, addr: Address) -> bool {
        let mut classes = Vec::new();
        let mut cursor = addr;
        loop {
            let insn = match self.decode_one_at(cursor) {
                Ok(Some(insn)) => insn,
                Ok(None) => break,
                Err(_) => return false,
            };
            if matches!(insn.category, Category::Invalid) {
                return false;
            }
            let overlaps_data = (0..insn.length as u64)
                .any(|i| self.shadow.is_marked_as_data(cursor + i).unwrap_or(false));
            if overlaps_data {
                return false;
            }
            if let Some(target) = self.direct_branch_target(&insn) {
                if !self.is_executable_address(target) {
                    return false;
                }
            }
            classes.push(insn.instruction_class);
            let stop = matches!(insn.category, Category::Ret | Category::UncondBr);
            let next = insn.next_address();
            if stop {
                break;
            }
            cursor = next;
        }
        self.config.classifier.is_code(&classes)
    }

    fn direct_branch_target(&self, insn: &RawInstruction) -> Option<Address> {
        if !matches!(insn.form, Form::DirectRelative | Form::FarDirect) {
            return None;
        }
        if !matches!(insn.category, Category::Call | Category::CondBr | Category::UncondBr) {
            return None;
        }
        InstructionView::new(insn, &self.cpu).absolute_branch_displacement()
    }
}
