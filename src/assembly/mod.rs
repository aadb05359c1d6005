pub mod instruction;

pub use instruction::{
    Assembly, ExecuteStyle, HandleKind, Instruction, JumpCondition, PopTarget, PushOperand, Step,
    StorageKind,
};
