//! Phase 1 — Relocation analysis
//!
//! Traces each relocation chain to its terminal value (the "relocated
//! leaf"), then walks each section looking for runs of three or more
//! consecutive relocated pointer-sized cells, which are marked DATA — this
//! recovers initialized pointer arrays (jump tables, vtables) before any
//! code is disassembled.

use crate::decoder::Decoder;
use crate::error::DisasmError;
use crate::image::ImageProvider;
use crate::Address;

use super::DisassemblyEngine;

impl<'a, I: ImageProvider, D: Decoder> DisassemblyEngine<'a, I, D> {
    pub(super) fn analyze_relocations(&mut self) -> Result<(), DisasmError> {
        let relocations = self.image.relocations().to_vec();
        for addr in relocations {
            self.trace_relocation_chain(addr)?;
        }
        self.mark_relocated_pointer_runs()?;
        Ok(())
    }

    fn trace_relocation_chain(&mut self, addr: Address) -> Result<(), DisasmError> {
        let width = self.cpu.address_width_bytes() as u64;
        if !self.is_memory_mapped(addr, width) {
            log::warn!("{}", DisasmError::CorruptRelocation(addr));
            return Ok(());
        }
        if self.shadow.is_marked_as_relocated(addr)? {
            // Chain already traced (or a cycle); avoid re-walking it.
            return Ok(());
        }
        self.shadow.mark(addr, crate::shadow::bits::ANALYZED | crate::shadow::bits::RELOCATED)?;

        let pointer = match self.read_native_pointer(addr) {
            Some(p) => p,
            None => {
                log::warn!("{}: unreadable pointer", DisasmError::CorruptRelocation(addr));
                return Ok(());
            }
        };

        if self.is_memory_mapped(pointer, width) && self.image.relocations().contains(&pointer) {
            self.trace_relocation_chain(pointer)?;
        } else if self.is_memory_mapped(pointer, 1) {
            self.shadow.mark_as_relocated_leaf(pointer)?;
        }
        Ok(())
    }

    fn read_native_pointer(&self, addr: Address) -> Option<Address> {
        let width = self.cpu.address_width_bytes() as u64;
        let section = self.image.get_section_for_address_range(addr, width)?;
        let offset = (addr - section.start_address) as usize;
        let bytes = &section.byte_data[offset..offset + width as usize];
        Some(match width {
            2 => u16::from_le_bytes(bytes.try_into().ok()?) as Address,
            4 => u32::from_le_bytes(bytes.try_into().ok()?) as Address,
            8 => u64::from_le_bytes(bytes.try_into().ok()?),
            _ => return None,
        })
    }

    fn mark_relocated_pointer_runs(&mut self) -> Result<(), DisasmError> {
        let width = self.cpu.address_width_bytes() as u64;
        let sections: Vec<(Address, Address)> =
            self.image.sections().iter().map(|s| (s.start_address, s.end_address)).collect();
        for (start, end) in sections {
            let mut a = start;
            while a + 3 * width <= end {
                let all_relocated = (0..3)
                    .all(|i| self.shadow.is_marked_as_relocated(a + i * width).unwrap_or(false));
                if !all_relocated {
                    a += 1;
                    continue;
                }
                let mut cursor = a;
                while cursor < end && self.shadow.is_marked_as_relocated(cursor).unwrap_or(false) {
                    self.shadow.mark_as_data(cursor, width)?;
                    cursor += width;
                }
                a = cursor;
            }
        }
        Ok(())
    }
}
