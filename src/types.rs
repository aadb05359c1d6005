use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, debug_span};

use crate::assembler::symbols::IntrinsicTable;
use crate::assembler::word::Word;
use crate::assembler::Assembler;
use crate::compiler::{CompileError, Compiler};
use crate::lang::node::Statement;

/// One procedure as declared on a type: its parameter names in order and
/// its parsed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDefinition {
    pub parameters: Vec<String>,
    pub body: Vec<Statement>,
}

/// One type as retrieved from the repository, before compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    /// Name of the parent type, if the type inherits.
    pub parent: Option<String>,
    /// Named constants declared directly on this type.
    pub constants: IndexMap<String, String>,
    /// Literals declared directly on this type, seeded into every
    /// procedure's literal pool.
    pub literals: Vec<String>,
    /// Procedures declared directly on this type, in declaration order.
    pub procedures: IndexMap<String, ProcedureDefinition>,
}

/// The compiled form of one procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureCode {
    /// One word per assembly step.
    pub bytecode: Vec<Word>,
    /// The formatted assembly text, kept alongside the bytecode for
    /// inspection and golden-file comparison.
    pub assembly: String,
}

/// The compiled artifact for one type: every procedure it defines or
/// inherits, each compiled against the merged ancestor context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDocument {
    pub name: String,
    pub procedures: IndexMap<String, ProcedureCode>,
}

impl TypeDocument {
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Storage collaborator: retrieves type definitions and accepts the
/// compiled documents.
pub trait DocumentRepository {
    fn retrieve(&self, name: &str) -> Option<TypeDefinition>;
    fn commit(&mut self, document: TypeDocument);
}

/// A failure while compiling a whole type. Nothing is committed when any
/// procedure fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    /// A named type (or ancestor) absent from the repository.
    #[error("type '{0}' is not in the repository")]
    UnknownType(String),

    /// The parent chain revisits a type.
    #[error("inheritance cycle through type '{0}'")]
    InheritanceCycle(String),

    /// One procedure failed to compile or assemble.
    #[error("procedure '{name}' failed to compile: {source}")]
    Procedure {
        name: String,
        source: CompileError,
    },
}

/// Drives compilation of whole types: resolves the inheritance chain,
/// merges the ancestor pools, compiles and assembles every procedure,
/// and commits the resulting document.
///
/// Holds no per-call state beyond its collaborators; each procedure gets
/// a fresh compiler and symbol tables.
pub struct TypeCompiler<'a, R: DocumentRepository, T: IntrinsicTable + ?Sized> {
    repository: &'a mut R,
    intrinsics: &'a T,
}

impl<'a, R: DocumentRepository, T: IntrinsicTable + ?Sized> TypeCompiler<'a, R, T> {
    pub fn new(repository: &'a mut R, intrinsics: &'a T) -> Self {
        Self {
            repository,
            intrinsics,
        }
    }

    /// Compile the named type and commit the resulting document. The
    /// commit happens only after every procedure has compiled and
    /// assembled.
    pub fn compile(&mut self, name: &str) -> Result<TypeDocument, TypeError> {
        let span = debug_span!("type", name);
        let _guard = span.enter();

        let ancestry = self.ancestry(name)?;
        debug!(depth = ancestry.len(), "resolved inheritance chain");

        // Merge the ancestor pools root-first; later definitions win.
        let mut constants = IndexMap::new();
        let mut literals = IndexSet::new();
        let mut procedures: IndexMap<String, ProcedureDefinition> = IndexMap::new();
        for ancestor in &ancestry {
            constants.extend(ancestor.constants.clone());
            literals.extend(ancestor.literals.iter().cloned());
            for (procedure_name, definition) in &ancestor.procedures {
                procedures.insert(procedure_name.clone(), definition.clone());
            }
        }

        let mut compiled = IndexMap::new();
        for (procedure_name, definition) in &procedures {
            let span = debug_span!("procedure", name = %procedure_name);
            let _guard = span.enter();

            let mut compiler = Compiler::new(&definition.parameters, constants.clone());
            compiler.seed_literals(&literals);
            let (assembly, mut symbols) =
                compiler
                    .compile(&definition.body)
                    .map_err(|source| TypeError::Procedure {
                        name: procedure_name.clone(),
                        source,
                    })?;

            let bytecode = Assembler::new(self.intrinsics)
                .assemble(&assembly, &mut symbols)
                .map_err(|source| TypeError::Procedure {
                    name: procedure_name.clone(),
                    source,
                })?;

            compiled.insert(
                procedure_name.clone(),
                ProcedureCode {
                    bytecode,
                    assembly: assembly.to_string(),
                },
            );
        }

        let document = TypeDocument {
            name: name.to_string(),
            procedures: compiled,
        };
        self.repository.commit(document.clone());
        Ok(document)
    }

    /// The type's inheritance chain, root-first, with cycle detection.
    fn ancestry(&self, name: &str) -> Result<Vec<TypeDefinition>, TypeError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());
        while let Some(type_name) = current {
            if !seen.insert(type_name.clone()) {
                return Err(TypeError::InheritanceCycle(type_name));
            }
            let definition = self
                .repository
                .retrieve(&type_name)
                .ok_or_else(|| TypeError::UnknownType(type_name.clone()))?;
            current = definition.parent.clone();
            chain.push(definition);
        }
        chain.reverse();
        Ok(chain)
    }
}
