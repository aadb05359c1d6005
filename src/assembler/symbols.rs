use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Ordered table of intrinsic function names, an external collaborator.
/// Indexes are 1-based positions in the fixed registry.
pub trait IntrinsicTable {
    fn index_of(&self, name: &str) -> Option<usize>;
}

/// Any ordered slice of names serves as an intrinsic table; position in
/// the slice (1-based) is the encoded index.
impl<'a> IntrinsicTable for [&'a str] {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.iter().position(|entry| *entry == name).map(|p| p + 1)
    }
}

impl IntrinsicTable for Vec<String> {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.iter().position(|entry| entry == name).map(|p| p + 1)
    }
}

/// Per-procedure symbol tables: built incrementally while the procedure
/// compiles, consumed while it assembles. All indexes are 1-based; the
/// address table is filled by the assembler's dedicated address pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Symbols {
    /// Label -> 1-based word address of the labeled instruction.
    pub addresses: HashMap<String, usize>,
    /// Literal pool, insertion-ordered and de-duplicated.
    pub literals: IndexSet<String>,
    /// Named constants inherited from the type context, then extended.
    pub constants: IndexMap<String, String>,
    /// Procedure parameters in declaration order.
    pub parameters: IndexSet<String>,
    /// Local variables in first-use order.
    pub variables: IndexSet<String>,
    /// Called-procedure names in first-call order.
    pub procedures: IndexSet<String>,
}

impl Symbols {
    pub fn new(parameters: &[String], constants: IndexMap<String, String>) -> Self {
        Self {
            addresses: HashMap::new(),
            literals: IndexSet::new(),
            constants,
            parameters: parameters.iter().cloned().collect(),
            variables: IndexSet::new(),
            procedures: IndexSet::new(),
        }
    }

    /// Seed the literal pool from the merged type context so inherited
    /// literals keep their indexes.
    pub fn seed_literals<'a>(&mut self, literals: impl IntoIterator<Item = &'a String>) {
        for literal in literals {
            self.literals.insert(literal.clone());
        }
    }

    /// Intern a literal, returning its 1-based pool index.
    pub fn intern_literal(&mut self, text: &str) -> usize {
        self.literals.insert_full(text.to_string()).0 + 1
    }

    /// Intern a variable name, returning its 1-based table index.
    pub fn intern_variable(&mut self, name: &str) -> usize {
        self.variables.insert_full(name.to_string()).0 + 1
    }

    /// Intern a called-procedure name, returning its 1-based index.
    pub fn intern_procedure(&mut self, name: &str) -> usize {
        self.procedures.insert_full(name.to_string()).0 + 1
    }

    pub fn address_of(&self, label: &str) -> Option<usize> {
        self.addresses.get(label).copied()
    }

    pub fn literal_index(&self, text: &str) -> Option<usize> {
        self.literals.get_index_of(text).map(|i| i + 1)
    }

    pub fn constant_index(&self, name: &str) -> Option<usize> {
        self.constants.get_index_of(name).map(|i| i + 1)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.get_index_of(name).map(|i| i + 1)
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.get_index_of(name).map(|i| i + 1)
    }

    pub fn procedure_index(&self, name: &str) -> Option<usize> {
        self.procedures.get_index_of(name).map(|i| i + 1)
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.contains(name)
    }
}
