//! CPU Profile
//!
//! Per-mode register-name sets and native address width, as pure lookup
//! tables. No behavior beyond table lookup lives here.

/// Execution mode of the target CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// 16-bit real mode.
    Real,
    /// 32-bit protected mode.
    Protected32,
    /// 64-bit long mode.
    Protected64,
}

/// Register identifier. The decoder is the authority on the concrete
/// register encoding; the profile only needs to compare and enumerate
/// names, so this wraps the decoder-assigned numeric id opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterId(pub u16);

impl RegisterId {
    /// Sentinel for "no register" (an absent base/index/segment register).
    pub const INVALID: RegisterId = RegisterId(0);
}

/// Per-mode register-name sets and native address width.
///
/// Mirrors the program counter / stack pointer / segment / general-purpose
/// register tables a CPU description exposes for each addressing mode.
#[derive(Debug, Clone)]
pub struct CpuProfile {
    mode: Mode,
    program_counter: RegisterId,
    stack_pointer: RegisterId,
    segment_registers: Vec<RegisterId>,
    stack_segment: RegisterId,
    f_segment: RegisterId,
    g_segment: RegisterId,
    general_purpose_registers: Vec<RegisterId>,
    address_width_bits: u32,
}

impl CpuProfile {
    /// Builds the profile for `mode` from the supplied register tables.
    ///
    /// `segment_registers` is the full mode-valid segment set, used for
    /// enumeration; `stack_segment`/`f_segment`/`g_segment` identify SS, FS
    /// and GS by register identity (not position in `segment_registers`),
    /// since those three make a memory displacement segment-relative and
    /// nothing else does. Callers (normally the image provider's arch
    /// string) pick these tables up front; `CpuProfile` itself never
    /// queries a decoder.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: Mode,
        program_counter: RegisterId,
        stack_pointer: RegisterId,
        segment_registers: Vec<RegisterId>,
        stack_segment: RegisterId,
        f_segment: RegisterId,
        g_segment: RegisterId,
        general_purpose_registers: Vec<RegisterId>,
    ) -> Self {
        let address_width_bits = match mode {
            Mode::Real => 16,
            Mode::Protected32 => 32,
            Mode::Protected64 => 64,
        };
        CpuProfile {
            mode,
            program_counter,
            stack_pointer,
            segment_registers,
            stack_segment,
            f_segment,
            g_segment,
            general_purpose_registers,
            address_width_bits,
        }
    }

    /// Execution mode this profile describes.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Program-counter register for this mode.
    pub fn program_counter(&self) -> RegisterId {
        self.program_counter
    }

    /// Stack-pointer register for this mode.
    pub fn stack_pointer(&self) -> RegisterId {
        self.stack_pointer
    }

    /// Segment registers valid in this mode.
    pub fn segment_registers(&self) -> &[RegisterId] {
        &self.segment_registers
    }

    /// Whether `reg` is SS, FS or GS — the three segment registers that
    /// make a memory displacement segment-relative, identified directly
    /// rather than by position in [`Self::segment_registers`].
    pub fn is_stack_or_far_segment(&self, reg: RegisterId) -> bool {
        reg != RegisterId::INVALID
            && (reg == self.stack_segment || reg == self.f_segment || reg == self.g_segment)
    }

    /// General-purpose registers valid in this mode.
    pub fn general_purpose_registers(&self) -> &[RegisterId] {
        &self.general_purpose_registers
    }

    /// Native address width in bits (16/32/64).
    pub fn address_width_bits(&self) -> u32 {
        self.address_width_bits
    }

    /// Native address width in bytes, used throughout the engine for
    /// pointer-sized reads (relocation chains, jump-table elements).
    pub fn address_width_bytes(&self) -> u32 {
        self.address_width_bits / 8
    }
}
