//! Classifier
//!
//! A heuristic predicate over a short window of decoded instructions:
//! "does this look like code?" Used by the engine when deciding whether a
//! candidate address (a relocated leaf, an immediate operand) is worth
//! disassembling. It is a heuristic and must never short-circuit the
//! engine's other safety checks (mapped-ness, executable-section
//! membership, decode success).

use crate::decoder::InstructionClass;

/// Window size and prologue instruction-class set are configuration, not
/// magic constants, per Design Note 4.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Classifier {
    window_size: usize,
    prologue_classes: Vec<InstructionClass>,
}

impl Classifier {
    pub fn new(window_size: usize, prologue_classes: Vec<InstructionClass>) -> Self {
        Classifier { window_size, prologue_classes }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// True iff every one of the first `window_size` classes examined lies
    /// in the prologue set. An empty window is vacuously true — nothing
    /// contradicted the heuristic.
    pub fn is_code(&self, classes: &[InstructionClass]) -> bool {
        classes
            .iter()
            .take(self.window_size)
            .all(|c| self.prologue_classes.contains(c))
    }

    pub fn is_data(&self, classes: &[InstructionClass]) -> bool {
        !self.is_code(classes)
    }
}

impl Default for Classifier {
    /// Mirrors the source's `WINDOW_SIZE = 4` and `PROLOGUE_ICLASSES`: the
    /// control-flow primitives, stack ops, compares, tests, set*, common
    /// jumps, lea, sub, and, xor, mov, movsx, movzx, and the x87 load/store
    /// forms that typify function prologues and early function bodies.
    fn default() -> Self {
        use InstructionClass::*;
        Classifier::new(
            4,
            vec![
                CallNear, RetNear, Push, Pop, Cmp, Test, Setcc, Jcc, Jmp, Lea, Sub, And, Xor, Mov,
                Movsx, Movzx, Fld, Fldz, Fst, Fstp,
            ],
        )
    }
}
