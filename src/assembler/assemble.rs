use tracing::{debug, trace};

use crate::assembler::symbols::{IntrinsicTable, Symbols};
use crate::assembler::word::{Opcode, Word, OPERAND_LIMIT};
use crate::assembly::{
    Assembly, ExecuteStyle, HandleKind, Instruction, JumpCondition, PopTarget, PushOperand,
    StorageKind,
};
use crate::compiler::error::{CompileError, PARAMETER_LIMIT};

/// Encodes a compiled procedure's assembly into fixed-width bytecode
/// words, resolving every symbolic operand against the procedure's
/// symbol tables and the external intrinsic registry.
pub struct Assembler<'a, T: IntrinsicTable + ?Sized> {
    intrinsics: &'a T,
}

impl<'a, T: IntrinsicTable + ?Sized> Assembler<'a, T> {
    pub fn new(intrinsics: &'a T) -> Self {
        Self { intrinsics }
    }

    /// Assemble one procedure. Fills the address table, then encodes
    /// each step into exactly one word.
    pub fn assemble(
        &self,
        assembly: &Assembly,
        symbols: &mut Symbols,
    ) -> Result<Vec<Word>, CompileError> {
        self.assign_addresses(assembly, symbols);
        debug!(
            steps = assembly.len(),
            labels = symbols.addresses.len(),
            "assembling procedure"
        );

        let mut words = Vec::with_capacity(assembly.len());
        for step in &assembly.steps {
            let word = self.encode(&step.instruction, symbols)?;
            trace!(instruction = %step.instruction, bits = word.bits(), "encoded");
            words.push(word);
        }
        Ok(words)
    }

    /// Dedicated address pass: each instruction occupies exactly one
    /// word, so a label's address is the 1-based position of the step it
    /// is declared on.
    fn assign_addresses(&self, assembly: &Assembly, symbols: &mut Symbols) {
        for (position, step) in assembly.steps.iter().enumerate() {
            if let Some(label) = &step.label {
                symbols.addresses.insert(label.clone(), position + 1);
            }
        }
    }

    fn encode(&self, instruction: &Instruction, symbols: &mut Symbols) -> Result<Word, CompileError> {
        let word = match instruction {
            Instruction::Skip => Word::SKIP,

            Instruction::Jump { label, condition } => {
                let address = symbols
                    .address_of(label)
                    .ok_or_else(|| CompileError::resolution("label", label.clone()))?;
                Word::new(Opcode::Jump, jump_modifier(*condition), operand(address)?)
            }

            Instruction::Push(push) => {
                let (modifier, index) = match push {
                    PushOperand::Handler(label) => {
                        let address = symbols
                            .address_of(label)
                            .ok_or_else(|| CompileError::resolution("label", label.clone()))?;
                        (0, address)
                    }
                    // Interned on first occurrence, reused on repeat.
                    PushOperand::Literal(text) => (1, symbols.intern_literal(text)),
                    PushOperand::Constant(name) => (
                        2,
                        symbols
                            .constant_index(name)
                            .ok_or_else(|| CompileError::resolution("constant", name.clone()))?,
                    ),
                    PushOperand::Parameter(name) => (
                        3,
                        symbols
                            .parameter_index(name)
                            .ok_or_else(|| CompileError::resolution("parameter", name.clone()))?,
                    ),
                };
                Word::new(Opcode::Push, modifier, operand(index)?)
            }

            Instruction::Pop(target) => {
                let modifier = match target {
                    PopTarget::Handler => 0,
                    PopTarget::Component => 1,
                };
                Word::new(Opcode::Pop, modifier, 0)
            }

            Instruction::Load { kind, symbol } => {
                let index = symbols
                    .variable_index(symbol)
                    .ok_or_else(|| CompileError::resolution("variable", symbol.clone()))?;
                Word::new(Opcode::Load, storage_modifier(*kind), operand(index)?)
            }

            Instruction::Store { kind, symbol } => {
                let index = symbols
                    .variable_index(symbol)
                    .ok_or_else(|| CompileError::resolution("variable", symbol.clone()))?;
                Word::new(Opcode::Store, storage_modifier(*kind), operand(index)?)
            }

            Instruction::Invoke { name, count } => {
                // The count rides in the 2-bit modifier; a re-parsed
                // assembly tree can carry any u8 here.
                if usize::from(*count) > PARAMETER_LIMIT {
                    return Err(CompileError::arity(name.clone(), usize::from(*count)));
                }
                let index = self
                    .intrinsics
                    .index_of(name)
                    .ok_or_else(|| CompileError::resolution("intrinsic", name.clone()))?;
                Word::new(Opcode::Invoke, *count, operand(index)?)
            }

            Instruction::Execute { name, style } => {
                let index = symbols
                    .procedure_index(name)
                    .ok_or_else(|| CompileError::resolution("procedure", name.clone()))?;
                Word::new(Opcode::Execute, execute_modifier(*style), operand(index)?)
            }

            Instruction::Handle(kind) => {
                let modifier = match kind {
                    HandleKind::Exception => 0,
                    HandleKind::Result => 1,
                };
                Word::new(Opcode::Handle, modifier, 0)
            }
        };
        Ok(word)
    }
}

/// Check a resolved 1-based index or address fits the operand field.
fn operand(index: usize) -> Result<u16, CompileError> {
    u16::try_from(index)
        .ok()
        .filter(|value| *value <= OPERAND_LIMIT)
        .ok_or_else(|| {
            CompileError::structural(format!("operand {index} exceeds the encodable range"))
        })
}

fn jump_modifier(condition: JumpCondition) -> u8 {
    match condition {
        JumpCondition::Unconditional => 0,
        JumpCondition::OnNone => 1,
        JumpCondition::OnTrue => 2,
        JumpCondition::OnFalse => 3,
    }
}

fn storage_modifier(kind: StorageKind) -> u8 {
    match kind {
        StorageKind::Variable => 0,
        StorageKind::Message => 1,
        StorageKind::Draft => 2,
        StorageKind::Document => 3,
    }
}

fn execute_modifier(style: ExecuteStyle) -> u8 {
    match style {
        ExecuteStyle::Plain => 0,
        ExecuteStyle::WithParameters => 1,
        ExecuteStyle::OnTarget => 2,
        ExecuteStyle::OnTargetWithParameters => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Step;

    const INTRINSICS: &[&str] = &["$sum", "$doesMatch", "$list"];

    fn assemble(assembly: &Assembly, symbols: &mut Symbols) -> Result<Vec<Word>, CompileError> {
        Assembler::new(INTRINSICS).assemble(assembly, symbols)
    }

    #[test]
    fn test_labels_resolve_to_one_based_addresses() {
        let assembly = Assembly::new(vec![
            Step::labeled(
                "1.WhileStatementLoop",
                Instruction::Push(PushOperand::Literal("false".to_string())),
            ),
            Step::new(Instruction::Jump {
                label: "1.WhileStatementDone".to_string(),
                condition: JumpCondition::OnFalse,
            }),
            Step::new(Instruction::Jump {
                label: "1.WhileStatementLoop".to_string(),
                condition: JumpCondition::Unconditional,
            }),
            Step::labeled("1.WhileStatementDone", Instruction::Handle(HandleKind::Result)),
        ]);
        let mut symbols = Symbols::default();
        let words = assemble(&assembly, &mut symbols).unwrap();

        assert_eq!(symbols.address_of("1.WhileStatementLoop"), Some(1));
        assert_eq!(symbols.address_of("1.WhileStatementDone"), Some(4));

        // The conditional jump encodes the done address with ON FALSE.
        assert_eq!(words[1].opcode(), Opcode::Jump);
        assert_eq!(words[1].modifier(), 3);
        assert_eq!(words[1].operand(), 4);
        // The back edge targets word 1.
        assert_eq!(words[2].operand(), 1);
    }

    #[test]
    fn test_skip_encodes_as_the_all_zero_word() {
        let assembly = Assembly::new(vec![Step::labeled("1.Handlers", Instruction::Skip)]);
        let mut symbols = Symbols::default();
        let words = assemble(&assembly, &mut symbols).unwrap();
        assert!(words[0].is_skip());
    }

    #[test]
    fn test_literal_pool_interns_on_first_occurrence() {
        let push = |text: &str| Step::new(Instruction::Push(PushOperand::Literal(text.to_string())));
        let assembly = Assembly::new(vec![push("5"), push("13"), push("5")]);
        let mut symbols = Symbols::default();
        let words = assemble(&assembly, &mut symbols).unwrap();

        assert_eq!(words[0].operand(), 1);
        assert_eq!(words[1].operand(), 2);
        assert_eq!(words[2].operand(), 1);
        assert_eq!(symbols.literals.len(), 2);
    }

    #[test]
    fn test_invoke_resolves_the_intrinsic_registry() {
        let assembly = Assembly::new(vec![Step::new(Instruction::Invoke {
            name: "$doesMatch".to_string(),
            count: 2,
        })]);
        let mut symbols = Symbols::default();
        let words = assemble(&assembly, &mut symbols).unwrap();

        assert_eq!(words[0].opcode(), Opcode::Invoke);
        assert_eq!(words[0].modifier(), 2);
        assert_eq!(words[0].operand(), 2);
    }

    #[test]
    fn test_invoke_count_beyond_the_modifier_range_is_rejected() {
        let assembly = Assembly::new(vec![Step::new(Instruction::Invoke {
            name: "$sum".to_string(),
            count: 4,
        })]);
        let mut symbols = Symbols::default();
        let err = assemble(&assembly, &mut symbols).unwrap_err();
        assert_eq!(err, CompileError::arity("$sum", 4));
    }

    #[test]
    fn test_unknown_intrinsic_is_a_resolution_error() {
        let assembly = Assembly::new(vec![Step::new(Instruction::Invoke {
            name: "$bogus".to_string(),
            count: 0,
        })]);
        let mut symbols = Symbols::default();
        let err = assemble(&assembly, &mut symbols).unwrap_err();
        assert_eq!(err, CompileError::resolution("intrinsic", "$bogus"));
    }

    #[test]
    fn test_unresolved_jump_label_is_a_resolution_error() {
        let assembly = Assembly::new(vec![Step::new(Instruction::Jump {
            label: "9.BogusStatementDone".to_string(),
            condition: JumpCondition::Unconditional,
        })]);
        let mut symbols = Symbols::default();
        let err = assemble(&assembly, &mut symbols).unwrap_err();
        assert_eq!(err, CompileError::resolution("label", "9.BogusStatementDone"));
    }

    #[test]
    fn test_load_and_store_share_the_variable_table() {
        let mut symbols = Symbols::default();
        symbols.intern_variable("$result");
        symbols.intern_variable("$citation-1");

        let assembly = Assembly::new(vec![
            Step::new(Instruction::Store {
                kind: StorageKind::Draft,
                symbol: "$citation-1".to_string(),
            }),
            Step::new(Instruction::Load {
                kind: StorageKind::Variable,
                symbol: "$result".to_string(),
            }),
        ]);
        let words = assemble(&assembly, &mut symbols).unwrap();

        assert_eq!(words[0].opcode(), Opcode::Store);
        assert_eq!(words[0].modifier(), 2);
        assert_eq!(words[0].operand(), 2);
        assert_eq!(words[1].opcode(), Opcode::Load);
        assert_eq!(words[1].modifier(), 0);
        assert_eq!(words[1].operand(), 1);
    }

    #[test]
    fn test_unknown_variable_is_never_defaulted() {
        let assembly = Assembly::new(vec![Step::new(Instruction::Load {
            kind: StorageKind::Variable,
            symbol: "$missing".to_string(),
        })]);
        let mut symbols = Symbols::default();
        let err = assemble(&assembly, &mut symbols).unwrap_err();
        assert_eq!(err, CompileError::resolution("variable", "$missing"));
    }

    #[test]
    fn test_push_handler_resolves_to_an_address() {
        let assembly = Assembly::new(vec![
            Step::new(Instruction::Push(PushOperand::Handler(
                "1.EvaluateStatementHandlers".to_string(),
            ))),
            Step::labeled(
                "1.EvaluateStatementHandlers",
                Instruction::Handle(HandleKind::Exception),
            ),
        ]);
        let mut symbols = Symbols::default();
        let words = assemble(&assembly, &mut symbols).unwrap();

        assert_eq!(words[0].opcode(), Opcode::Push);
        assert_eq!(words[0].modifier(), 0);
        assert_eq!(words[0].operand(), 2);
        assert_eq!(words[1].modifier(), 0);
    }

    #[test]
    fn test_word_count_matches_step_count() {
        let assembly = Assembly::new(vec![
            Step::new(Instruction::Invoke {
                name: "$list".to_string(),
                count: 0,
            }),
            Step::new(Instruction::Pop(PopTarget::Component)),
            Step::new(Instruction::Handle(HandleKind::Result)),
        ]);
        let mut symbols = Symbols::default();
        let words = assemble(&assembly, &mut symbols).unwrap();
        assert_eq!(words.len(), assembly.len());
    }
}
