pub mod assemble;
pub mod symbols;
pub mod word;

pub use assemble::Assembler;
pub use symbols::{IntrinsicTable, Symbols};
pub use word::{Opcode, Word, OPERAND_LIMIT};
