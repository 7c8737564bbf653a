//! Disassembly Engine
//!
//! The driver. Owns the shadow memory, the xref store, the basic-block
//! table and the CFG; nothing else in the crate mutates them. `disassemble`
//! runs the phase sequence once; afterward the stores are read-only and
//! answer the public query surface.

mod build;
mod flow;
mod relocation;

use std::collections::BTreeMap;

use crate::basic_block::BasicBlock;
use crate::config::EngineConfig;
use crate::cpu::CpuProfile;
use crate::decoder::Decoder;
use crate::error::DisasmError;
use crate::graph::Graph;
use crate::image::ImageProvider;
use crate::shadow::ShadowMemory;
use crate::xrefs::XrefStore;
use crate::Address;

/// Owns every mutable store the analysis produces. Generic over the two
/// external collaborators so production callers can plug in a real loader
/// and a real decoder while tests use in-memory doubles.
pub struct DisassemblyEngine<'a, I: ImageProvider, D: Decoder> {
    image: &'a I,
    decoder: &'a D,
    cpu: CpuProfile,
    config: EngineConfig,
    shadow: ShadowMemory,
    xrefs: XrefStore,
    basic_blocks: BTreeMap<Address, BasicBlock>,
    cfg: Graph,
    warned_far_pointer_truncation: bool,
}

impl<'a, I: ImageProvider, D: Decoder> DisassemblyEngine<'a, I, D> {
    /// Builds an engine over `image`/`decoder`; shadow memory is allocated
    /// to cover every section the image reports.
    pub fn new(image: &'a I, decoder: &'a D, cpu: CpuProfile, config: EngineConfig) -> Self {
        let ranges = image.sections().iter().map(|s| (s.start_address, s.end_address));
        DisassemblyEngine {
            image,
            decoder,
            cpu,
            config,
            shadow: ShadowMemory::new(ranges),
            xrefs: XrefStore::new(),
            basic_blocks: BTreeMap::new(),
            cfg: Graph::new(),
            warned_far_pointer_truncation: false,
        }
    }

    /// Runs the full phase sequence: relocation analysis, seeded recursive
    /// disassembly, declared-function sweep, relocated-leaf sweep,
    /// deferred fixed point, orphan promotion, basic-block construction,
    /// CFG synthesis.
    pub fn disassemble(&mut self) -> Result<(), DisasmError> {
        log::info!("phase 1: relocation analysis");
        self.analyze_relocations()?;

        log::info!("phase 2: seeded recursive disassembly from entry points");
        let entry_points = self.image.entry_points().to_vec();
        for entry in entry_points {
            self.shadow.mark_as_function(entry)?;
            self.recursive_disassemble(entry)?;
        }

        log::info!("phase 3: declared-function sweep");
        let functions = self.image.functions().to_vec();
        for addr in functions {
            if self.is_code(addr)? {
                self.shadow.mark_as_function(addr)?;
                self.recursive_disassemble(addr)?;
            }
        }
        let exit_points = self.image.exit_points().to_vec();
        for addr in exit_points {
            self.shadow.mark_as_analyzed(addr)?;
            self.shadow.mark_as_function(addr)?;
        }

        log::info!("phase 4: relocated-leaf sweep");
        self.sweep_relocated_leaves()?;

        log::info!("phase 5: deferred fixed point");
        self.disassemble_deferred()?;

        log::info!("phase 6: orphan promotion");
        self.promote_orphans()?;

        log::info!("phase 7: basic-block construction");
        self.build_basic_blocks()?;

        log::info!("phase 8: CFG synthesis");
        self.build_cfg()?;

        Ok(())
    }

    fn sweep_relocated_leaves(&mut self) -> Result<(), DisasmError> {
        let mut candidates = Vec::new();
        for range in self.shadow.memory_ranges().to_vec() {
            for addr in range.start..range.end {
                if self.shadow.is_marked_as_relocated_leaf(addr)? && self.is_executable_address(addr) {
                    candidates.push(addr);
                }
            }
        }
        for addr in candidates {
            if self.is_code(addr)? {
                self.shadow.mark_as_basic_block_leader(addr)?;
                self.recursive_disassemble(addr)?;
            }
        }
        Ok(())
    }

    fn disassemble_deferred(&mut self) -> Result<(), DisasmError> {
        loop {
            let mut changed = false;
            let mut leaders = Vec::new();
            for range in self.shadow.memory_ranges().to_vec() {
                for addr in range.start..range.end {
                    if self.shadow.is_marked_as_basic_block_leader(addr)?
                        && !self.shadow.is_marked_as_analyzed(addr)?
                    {
                        leaders.push(addr);
                    }
                }
            }
            for addr in leaders {
                if !self.shadow.is_marked_as_analyzed(addr)? {
                    self.recursive_disassemble(addr)?;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            log::debug!("fixed point not reached, restarting deferred sweep");
        }
        Ok(())
    }

    fn promote_orphans(&mut self) -> Result<(), DisasmError> {
        let mut candidates = Vec::new();
        for range in self.shadow.memory_ranges().to_vec() {
            for addr in range.start..range.end {
                if self.shadow.is_marked_as_relocated_leaf(addr)?
                    && self.shadow.is_marked_as_basic_block_leader(addr)?
                    && self.xrefs.code_xrefs.get_predecessors(addr).is_empty()
                {
                    candidates.push(addr);
                }
            }
        }
        for addr in candidates {
            self.shadow.mark_as_function(addr)?;
        }
        Ok(())
    }

    // ---- memory permission predicates (§4.8) ----

    pub fn is_memory_mapped(&self, addr: Address, len: u64) -> bool {
        self.image.get_section_for_address_range(addr, len).is_some()
    }

    pub fn is_memory_readable(&self, addr: Address, len: u64) -> bool {
        self.image
            .get_section_for_address_range(addr, len)
            .map_or(false, |s| s.flags.readable)
    }

    pub fn is_memory_writable(&self, addr: Address, len: u64) -> bool {
        self.image
            .get_section_for_address_range(addr, len)
            .map_or(false, |s| s.flags.writable)
    }

    pub fn is_memory_executable(&self, addr: Address, len: u64) -> bool {
        self.image
            .get_section_for_address_range(addr, len)
            .map_or(false, |s| s.flags.executable)
    }

    fn is_executable_address(&self, addr: Address) -> bool {
        self.is_memory_executable(addr, 1)
    }

    // ---- public query surface (§4.8) ----

    /// Decodes the instruction at `addr`, iff `addr` is CODE ∧ HEAD;
    /// `None` otherwise, including when the decode itself fails (the
    /// post-analysis query surface returns absent rather than raising).
    ///
    /// Returned owned rather than as an `InstructionView`: the engine does
    /// not retain decoded instructions after analysis, so there is no
    /// borrow for a view to hold. Wrap the result with
    /// `InstructionView::new(&raw, engine.cpu())` where the derived
    /// queries are needed.
    pub fn get_instruction(&self, addr: Address) -> Option<crate::decoder::RawInstruction> {
        if !self.shadow.is_marked_as_code(addr).unwrap_or(false)
            || !self.shadow.is_marked_as_head(addr).unwrap_or(false)
        {
            return None;
        }
        let section = self.image.get_section_for_address_range(addr, 1)?;
        let offset = (addr - section.start_address) as usize;
        let bytes = &section.byte_data[offset..];
        self.decoder.decode_one(bytes, addr).ok().flatten()
    }

    /// Walks `addr` downward until a BB_LEADER is found, returns that
    /// block.
    pub fn get_basic_block(&self, addr: Address) -> Option<&BasicBlock> {
        self.basic_blocks
            .range(..=addr)
            .rev()
            .map(|(_, bb)| bb)
            .find(|bb| bb.contains(addr))
    }

    /// Requires `addr` marked FUNCTION; DFS on the CFG from `addr`, never
    /// crossing into a FUNCTION-marked successor.
    pub fn get_function(&self, addr: Address) -> Option<Vec<Address>> {
        if !self.shadow.is_marked_as_function(addr).unwrap_or(false) {
            return None;
        }
        let mut visited = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![addr];
        while let Some(a) = stack.pop() {
            if !seen.insert(a) {
                continue;
            }
            visited.push(a);
            for succ in self.cfg.get_successors(a) {
                if self.shadow.is_marked_as_function(succ).unwrap_or(false) {
                    continue;
                }
                if !seen.contains(&succ) {
                    stack.push(succ);
                }
            }
        }
        Some(visited)
    }

    pub fn basic_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.basic_blocks.values()
    }

    pub fn cfg(&self) -> &Graph {
        &self.cfg
    }

    pub fn xrefs(&self) -> &XrefStore {
        &self.xrefs
    }

    pub fn shadow(&self) -> &ShadowMemory {
        &self.shadow
    }

    pub fn is_marked(&self, addr: Address, mask: u8) -> bool {
        self.shadow.is_marked(addr, mask).unwrap_or(false)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cpu(&self) -> &CpuProfile {
        &self.cpu
    }
}

/// `_is_code(addr)`: executable ∧ ¬DATA ∧ `linear_sweep_probe` succeeds.
impl<'a, I: ImageProvider, D: Decoder> DisassemblyEngine<'a, I, D> {
    pub(crate) fn is_code(&mut self, addr: Address) -> Result<bool, DisasmError> {
        if !self.is_executable_address(addr) {
            return Ok(false);
        }
        if self.shadow.is_marked_as_data(addr)? {
            return Ok(false);
        }
        Ok(self.linear_sweep_probe(addr))
    }
}
