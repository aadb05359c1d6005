//! Compiles document-notation procedures into stack-machine bytecode.
//!
//! The pipeline has two stages. The [`compiler`] walks a classified
//! syntax tree ([`lang`]) and emits typed symbolic assembly
//! ([`assembly`]); the [`assembler`] resolves every symbolic operand
//! against per-procedure symbol tables and encodes each instruction
//! into one fixed-width word. The [`types`] orchestrator drives both
//! stages for every procedure of a type, merging inherited pools
//! root-first, and commits the finished document through the
//! repository trait.
//!
//! The notation parser, the document store, and the intrinsic-function
//! registry are external collaborators consumed through narrow
//! interfaces ([`types::DocumentRepository`],
//! [`assembler::IntrinsicTable`]).

pub mod assembler;
pub mod assembly;
pub mod compiler;
pub mod lang;
pub mod types;

pub use assembler::{Assembler, IntrinsicTable, Opcode, Symbols, Word};
pub use assembly::{Assembly, Instruction, Step};
pub use compiler::{CompileError, Compiler, PARAMETER_LIMIT};
pub use types::{
    DocumentRepository, ProcedureCode, ProcedureDefinition, TypeCompiler, TypeDefinition,
    TypeDocument, TypeError,
};
