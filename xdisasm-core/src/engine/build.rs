//! Phase 7/8 — basic-block construction (§4.7.6) and CFG synthesis
//! (§4.7.7).

use crate::basic_block::BasicBlock;
use crate::decoder::Decoder;
use crate::error::DisasmError;
use crate::image::ImageProvider;
use crate::instruction::InstructionView;
use crate::Address;

use super::DisassemblyEngine;

impl<'a, I: ImageProvider, D: Decoder> DisassemblyEngine<'a, I, D> {
    /// Iterates each covered shadow-memory range in address order,
    /// advancing a cursor to the next BB_LEADER, then collecting HEAD
    /// addresses up to the next BB_LEADER or the first non-CODE byte.
    pub(super) fn build_basic_blocks(&mut self) -> Result<(), DisasmError> {
        let ranges = self.shadow.memory_ranges().to_vec();
        for range in ranges {
            let mut cursor = range.start;
            while cursor < range.end {
                if !self.shadow.is_marked_as_basic_block_leader(cursor)? {
                    cursor += 1;
                    continue;
                }
                let start = cursor;
                let mut instruction_addresses = Vec::new();
                let mut addr = start;
                let mut end = start;
                loop {
                    if addr >= range.end {
                        break;
                    }
                    if addr != start && self.shadow.is_marked_as_basic_block_leader(addr)? {
                        break;
                    }
                    if !self.shadow.is_marked_as_code(addr)? {
                        break;
                    }
                    if self.shadow.is_marked_as_head(addr)? {
                        instruction_addresses.push(addr);
                    }
                    end = addr + 1;
                    addr += 1;
                }
                self.basic_blocks.insert(start, BasicBlock::new(start, end, instruction_addresses));
                cursor = end.max(start + 1);
            }
        }
        Ok(())
    }

    /// For each basic block whose start is not an exit point, looks up its
    /// terminator instruction and either fans out over its code-xref
    /// successors (if it writes the program counter) or borders the
    /// physically next block (otherwise), subject to the "never target a
    /// FUNCTION" guard in both cases.
    pub(super) fn build_cfg(&mut self) -> Result<(), DisasmError> {
        let exit_points = self.image.exit_points().to_vec();
        let blocks: Vec<BasicBlock> = self.basic_blocks.values().cloned().collect();
        for bb in blocks {
            if exit_points.contains(&bb.start_address) {
                continue;
            }
            let last_addr = match bb.instruction_addresses.last() {
                Some(a) => *a,
                None => continue,
            };
            let insn = match self.get_instruction(last_addr) {
                Some(i) => i,
                None => continue,
            };
            let view = InstructionView::new(&insn, &self.cpu);
            if view.writes_program_counter() {
                let successors: Vec<Address> =
                    self.xrefs.code_xrefs.get_successors(last_addr).into_iter().collect();
                for s in successors {
                    if self.shadow.is_marked_as_basic_block_leader(s)? && !self.shadow.is_marked_as_function(s)? {
                        self.cfg.add_edge(bb.start_address, s);
                    }
                }
            } else {
                let end = bb.end_address;
                if self.basic_blocks.contains_key(&end) && !self.shadow.is_marked_as_function(end)? {
                    self.cfg.add_edge(bb.start_address, end);
                }
            }
        }
        Ok(())
    }
}
