//! Xref Store
//!
//! Two [`Graph`]s keyed by address: `code_xrefs` ("control may flow from a
//! to b") and `data_xrefs` ("instruction a references the datum at b").
//! No additional logic beyond the naming convention.

use crate::graph::{AttributeValue, Graph};
use crate::Address;

/// Attribute key used on code-xref edges contributed by conditional
/// branches: `true` for the taken edge, `false` for the fall-through edge.
pub const PREDICATE: &str = "predicate";

#[derive(Debug, Clone, Default)]
pub struct XrefStore {
    pub code_xrefs: Graph,
    pub data_xrefs: Graph,
}

impl XrefStore {
    pub fn new() -> Self {
        XrefStore::default()
    }

    pub fn add_code_xref(&mut self, from: Address, to: Address) {
        self.code_xrefs.add_edge(from, to);
    }

    pub fn add_conditional_code_xref(&mut self, from: Address, to: Address, predicate: bool) {
        self.code_xrefs.add_edge_attribute(from, to, PREDICATE, AttributeValue::Bool(predicate));
    }

    pub fn add_data_xref(&mut self, from: Address, to: Address) {
        self.data_xrefs.add_edge(from, to);
    }
}
