pub mod builder;
pub mod compile;
pub mod error;

pub use builder::{Builder, RESULT_VARIABLE};
pub use compile::Compiler;
pub use error::{CompileError, PARAMETER_LIMIT};
