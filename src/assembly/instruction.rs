use std::fmt;

use serde::{Deserialize, Serialize};

/// Condition under which a jump is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpCondition {
    /// Always taken.
    Unconditional,
    /// Taken when the popped component is the `none` element.
    OnNone,
    /// Taken when the popped component is true.
    OnTrue,
    /// Taken when the popped component is false.
    OnFalse,
}

/// What a PUSH instruction places on the component stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushOperand {
    /// The address of an exception handler, by label.
    Handler(String),
    /// A literal element in its source spelling.
    Literal(String),
    /// A named constant from the type context.
    Constant(String),
    /// A named procedure parameter.
    Parameter(String),
}

/// What a POP instruction removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopTarget {
    /// The top handler address from the handler stack.
    Handler,
    /// The top component from the component stack.
    Component,
}

/// The storage a LOAD or STORE instruction addresses. The operand is
/// always a variable-table index; the kind rides along as the modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    Variable,
    Message,
    Draft,
    Document,
}

/// Target/parameter shape of an EXECUTE instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteStyle {
    Plain,
    WithParameters,
    OnTarget,
    OnTargetWithParameters,
}

/// What a HANDLE instruction does with the top of the component stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleKind {
    /// Raise it as an exception toward the nearest pushed handler.
    Exception,
    /// Deliver it as the procedure's result.
    Result,
}

/// One symbolic assembly instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Explicit no-op; binds a label to a real instruction when two
    /// label declarations would otherwise collide. Encodes as the
    /// all-zero jump word.
    Skip,
    Jump {
        label: String,
        condition: JumpCondition,
    },
    Push(PushOperand),
    Pop(PopTarget),
    Load {
        kind: StorageKind,
        symbol: String,
    },
    Store {
        kind: StorageKind,
        symbol: String,
    },
    /// Invoke an intrinsic function with 0..=3 parameters.
    Invoke {
        name: String,
        count: u8,
    },
    /// Execute a named procedure, dynamically dispatched.
    Execute {
        name: String,
        style: ExecuteStyle,
    },
    Handle(HandleKind),
}

/// One assembly step: an optional label declaration bound to exactly one
/// instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub label: Option<String>,
    pub instruction: Instruction,
}

impl Step {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            label: None,
            instruction,
        }
    }

    pub fn labeled(label: impl Into<String>, instruction: Instruction) -> Self {
        Self {
            label: Some(label.into()),
            instruction,
        }
    }
}

/// The typed intermediate representation of one compiled procedure: the
/// ordered step sequence produced by the compiler and consumed by the
/// assembler. The textual rendering is an optional serialization, not
/// the path between the stages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assembly {
    pub steps: Vec<Step>,
}

impl Assembly {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All labels declared in this assembly, in declaration order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| step.label.as_deref())
            .collect()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Skip => write!(f, "SKIP"),
            Instruction::Jump { label, condition } => {
                write!(f, "JUMP TO {}", label)?;
                match condition {
                    JumpCondition::Unconditional => Ok(()),
                    JumpCondition::OnNone => write!(f, " ON NONE"),
                    JumpCondition::OnTrue => write!(f, " ON TRUE"),
                    JumpCondition::OnFalse => write!(f, " ON FALSE"),
                }
            }
            Instruction::Push(operand) => match operand {
                PushOperand::Handler(label) => write!(f, "PUSH HANDLER {}", label),
                PushOperand::Literal(text) => write!(f, "PUSH LITERAL `{}`", text),
                PushOperand::Constant(symbol) => write!(f, "PUSH CONSTANT {}", symbol),
                PushOperand::Parameter(symbol) => write!(f, "PUSH PARAMETER {}", symbol),
            },
            Instruction::Pop(target) => match target {
                PopTarget::Handler => write!(f, "POP HANDLER"),
                PopTarget::Component => write!(f, "POP COMPONENT"),
            },
            Instruction::Load { kind, symbol } => {
                write!(f, "LOAD {} {}", storage_keyword(*kind), symbol)
            }
            Instruction::Store { kind, symbol } => {
                write!(f, "STORE {} {}", storage_keyword(*kind), symbol)
            }
            Instruction::Invoke { name, count } => match count {
                0 => write!(f, "INVOKE {}", name),
                1 => write!(f, "INVOKE {} WITH PARAMETER", name),
                n => write!(f, "INVOKE {} WITH {} PARAMETERS", name, n),
            },
            Instruction::Execute { name, style } => {
                write!(f, "EXECUTE {}", name)?;
                match style {
                    ExecuteStyle::Plain => Ok(()),
                    ExecuteStyle::WithParameters => write!(f, " WITH PARAMETERS"),
                    ExecuteStyle::OnTarget => write!(f, " ON TARGET"),
                    ExecuteStyle::OnTargetWithParameters => {
                        write!(f, " ON TARGET WITH PARAMETERS")
                    }
                }
            }
            Instruction::Handle(kind) => match kind {
                HandleKind::Exception => write!(f, "HANDLE EXCEPTION"),
                HandleKind::Result => write!(f, "HANDLE RESULT"),
            },
        }
    }
}

fn storage_keyword(kind: StorageKind) -> &'static str {
    match kind {
        StorageKind::Variable => "VARIABLE",
        StorageKind::Message => "MESSAGE",
        StorageKind::Draft => "DRAFT",
        StorageKind::Document => "DOCUMENT",
    }
}

impl fmt::Display for Assembly {
    /// Render the assembly text: one step per line, with each label
    /// declaration on its own `label:` line before its instruction.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            if let Some(label) = &step.label {
                writeln!(f, "{}:", label)?;
            }
            writeln!(f, "{}", step.instruction)?;
        }
        Ok(())
    }
}
