use thiserror::Error;

/// Hard limit on positional parameters in an intrinsic function call.
pub const PARAMETER_LIMIT: usize = 3;

/// A deterministic translation failure. Any of these aborts compilation
/// of the current procedure; none is transient.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A contract violation between compiler and assembler, e.g. an
    /// instruction shape the assembler does not recognize.
    #[error("structural error: {0}")]
    Structural(String),

    /// `break` or `continue` with no enclosing loop.
    #[error("scope error: '{construct}' appears outside any enclosing loop")]
    Scope { construct: &'static str },

    /// A function call exceeding the parameter-count limit.
    #[error(
        "arity error: function '{name}' called with {count} parameters \
         (at most {PARAMETER_LIMIT} are allowed)"
    )]
    Arity { name: String, count: usize },

    /// A symbolic operand absent from its symbol table at assembly time.
    #[error("resolution error: {kind} '{name}' cannot be resolved")]
    Resolution { kind: &'static str, name: String },
}

impl CompileError {
    pub fn structural(message: impl Into<String>) -> Self {
        CompileError::Structural(message.into())
    }

    pub fn scope(construct: &'static str) -> Self {
        CompileError::Scope { construct }
    }

    pub fn arity(name: impl Into<String>, count: usize) -> Self {
        CompileError::Arity {
            name: name.into(),
            count,
        }
    }

    pub fn resolution(kind: &'static str, name: impl Into<String>) -> Self {
        CompileError::Resolution {
            kind,
            name: name.into(),
        }
    }
}
