//! Toy project format
//!
//! The host executable loader and the instruction decoder are external
//! collaborators of `xdisasm-core` (see its crate docs); this module is
//! the CLI's own minimal implementation of both, reading a project
//! described by a single `image.json` file rather than parsing a real
//! object format. A production front-end would replace this module with
//! one backed by an actual loader and decoder.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use xdisasm_core::decoder::{Decoder, RawInstruction};
use xdisasm_core::error::DisasmError;
use xdisasm_core::image::{ImageProvider, Section, SectionFlags};
use xdisasm_core::Address;

#[derive(Debug, Deserialize, Serialize)]
struct JsonSection {
    start_address: Address,
    end_address: Address,
    #[serde(default)]
    readable: bool,
    #[serde(default)]
    writable: bool,
    #[serde(default)]
    executable: bool,
    #[serde(default)]
    loaded: bool,
    /// Section bytes, hex-encoded (two characters per byte, no prefix).
    #[serde(default)]
    byte_data_hex: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonProject {
    arch: String,
    sections: Vec<JsonSection>,
    #[serde(default)]
    entry_points: Vec<Address>,
    #[serde(default)]
    functions: Vec<Address>,
    #[serde(default)]
    exit_points: Vec<Address>,
    #[serde(default)]
    relocations: Vec<Address>,
    /// Pre-decoded instructions, keyed implicitly by `runtime_address`.
    /// Stands in for a real decoder: production front-ends would decode
    /// `sections[*].byte_data_hex` on demand instead of reading this table.
    #[serde(default)]
    instructions: Vec<RawInstruction>,
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        anyhow::bail!("byte_data_hex has odd length");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).context("invalid hex digit in byte_data_hex"))
        .collect()
}

/// In-memory [`ImageProvider`] loaded from a project's `image.json`.
pub struct ToyImage {
    arch: String,
    sections: Vec<Section>,
    entry_points: Vec<Address>,
    functions: Vec<Address>,
    exit_points: Vec<Address>,
    relocations: Vec<Address>,
}

/// In-memory [`Decoder`] over the project's pre-decoded instruction table.
pub struct ToyDecoder {
    instructions: HashMap<Address, RawInstruction>,
}

pub fn load_project(project_dir: &Path) -> Result<(ToyImage, ToyDecoder)> {
    let path = project_dir.join("image.json");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading project image at {}", path.display()))?;
    let project: JsonProject =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    let mut sections = Vec::with_capacity(project.sections.len());
    for s in &project.sections {
        let mut byte_data = decode_hex(&s.byte_data_hex)?;
        let declared_len = (s.end_address - s.start_address) as usize;
        byte_data.resize(declared_len, 0);
        sections.push(Section {
            start_address: s.start_address,
            end_address: s.end_address,
            flags: SectionFlags {
                loaded: s.loaded,
                readable: s.readable,
                writable: s.writable,
                executable: s.executable,
            },
            byte_data,
        });
    }
    sections.sort_by_key(|s| s.start_address);

    let instructions = project
        .instructions
        .into_iter()
        .map(|insn| (insn.runtime_address, insn))
        .collect();

    Ok((
        ToyImage {
            arch: project.arch,
            sections,
            entry_points: project.entry_points,
            functions: project.functions,
            exit_points: project.exit_points,
            relocations: project.relocations,
        },
        ToyDecoder { instructions },
    ))
}

impl ImageProvider for ToyImage {
    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn arch(&self) -> &str {
        &self.arch
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

impl Decoder for ToyDecoder {
    fn decode_one(&self, _bytes: &[u8], runtime_address: Address) -> Result<Option<RawInstruction>, DisasmError> {
        Ok(self.instructions.get(&runtime_address).cloned())
    }
}
