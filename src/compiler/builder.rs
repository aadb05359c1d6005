use crate::assembly::{Assembly, HandleKind, Instruction, Step, StorageKind};

/// Conventional variable holding a procedure's result when no explicit
/// `return` runs.
pub const RESULT_VARIABLE: &str = "$result";

/// Context for one statement while it is being compiled.
///
/// Label text is a compatibility contract: `prefix` encodes the nesting
/// path as alternating statement-number/clause-number integers separated
/// by dots, and every generated label hangs off that path, so uniqueness
/// within a procedure is structural rather than counter-based.
#[derive(Debug)]
pub struct StatementContext {
    prefix: String,
    number: usize,
    kind: &'static str,
    /// Count of clauses consumed so far (nested blocks and labeled
    /// sub-clauses both advance it).
    clause_number: usize,
    clause_count: usize,
    /// Set lazily when a loop body is compiled; the presence of this
    /// label is what break/continue search for.
    loop_label: Option<String>,
}

impl StatementContext {
    fn new(prefix: String, number: usize, kind: &'static str, clause_count: usize) -> Self {
        Self {
            prefix,
            number,
            kind,
            clause_number: 0,
            clause_count,
            loop_label: None,
        }
    }

    /// The statement's start label, base for every derived label.
    pub fn start_label(&self) -> String {
        format!("{}{}.{}", self.prefix, self.number, self.kind)
    }

    /// Jump target just past the statement; only meaningful when the
    /// statement has clauses.
    pub fn done_label(&self) -> String {
        format!("{}Done", self.start_label())
    }

    /// Entry of the exception-handler ladder.
    pub fn handlers_label(&self) -> String {
        format!("{}Handlers", self.start_label())
    }

    /// Re-raise point reached when no handler template matches.
    pub fn failed_label(&self) -> String {
        format!("{}Failed", self.start_label())
    }

    /// Continuation reached after a handler body (or the unexceptional
    /// main path) completes.
    pub fn succeeded_label(&self) -> String {
        format!("{}Succeeded", self.start_label())
    }

    pub fn loop_label(&self) -> Option<&str> {
        self.loop_label.as_deref()
    }

    /// Allocate the loop label for this statement.
    pub fn set_loop_label(&mut self) -> String {
        let label = format!("{}Loop", self.start_label());
        self.loop_label = Some(label.clone());
        label
    }

    /// Label for the next sub-clause, e.g. `1.2.ConditionClause`.
    pub fn clause_label(&self, name: &str) -> String {
        self.clause_label_at(1, name)
    }

    /// Label for a sub-clause `offset` positions past the clauses
    /// consumed so far; lets a conditional jump name the clause after
    /// the one about to be compiled.
    pub fn clause_label_at(&self, offset: usize, name: &str) -> String {
        format!(
            "{}{}.{}.{}",
            self.prefix,
            self.number,
            self.clause_number + offset,
            name
        )
    }
}

/// Context for one lexically nested procedure block.
#[derive(Debug)]
pub struct ProcedureContext {
    /// 1-based number of the statement currently being compiled.
    number: usize,
    /// Total statements in this block.
    count: usize,
    /// Dot-separated nesting path inherited from the enclosing context.
    prefix: String,
    statement: Option<StatementContext>,
}

/// Accumulates the assembly steps for one procedure.
///
/// Owns the pending-label logic (consecutive label declarations are
/// separated by an explicit SKIP so every label binds to a real
/// instruction), the procedure/statement context stack, and the
/// implicit-finalize tracking.
#[derive(Debug)]
pub struct Builder {
    steps: Vec<Step>,
    pending_label: Option<String>,
    contexts: Vec<ProcedureContext>,
    needs_finalize: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            pending_label: None,
            contexts: Vec::new(),
            needs_finalize: true,
        }
    }

    /// Append an instruction, binding any pending label to it.
    pub fn emit(&mut self, instruction: Instruction) {
        let label = self.pending_label.take();
        self.steps.push(Step { label, instruction });
    }

    /// Declare a label on the next emitted instruction. A second
    /// declaration before anything is emitted forces a SKIP so the
    /// first label still binds to a real instruction.
    pub fn declare_label(&mut self, label: String) {
        if self.pending_label.is_some() {
            self.emit(Instruction::Skip);
        }
        self.pending_label = Some(label);
    }

    /// Enter a nested procedure block. The parent statement's clause
    /// counter advances so sibling blocks never collide.
    pub fn push_context(&mut self, statement_count: usize) {
        let prefix = match self.contexts.last_mut() {
            Some(parent) => {
                let statement = parent
                    .statement
                    .as_mut()
                    .expect("block pushed outside a statement");
                statement.clause_number += 1;
                debug_assert!(
                    statement.clause_number <= statement.clause_count,
                    "clause {} exceeds declared count {}",
                    statement.clause_number,
                    statement.clause_count
                );
                format!(
                    "{}{}.{}.",
                    statement.prefix, statement.number, statement.clause_number
                )
            }
            None => String::new(),
        };
        self.contexts.push(ProcedureContext {
            number: 0,
            count: statement_count,
            prefix,
            statement: None,
        });
    }

    /// Leave the current procedure block.
    pub fn pop_context(&mut self) {
        self.contexts.pop();
    }

    /// Start compiling the next statement of the current block.
    pub fn begin_statement(&mut self, kind: &'static str, clause_count: usize) {
        self.needs_finalize = true;
        let context = self
            .contexts
            .last_mut()
            .expect("statement begun outside a procedure context");
        context.number += 1;
        debug_assert!(
            context.number <= context.count,
            "statement {} exceeds declared count {}",
            context.number,
            context.count
        );
        context.statement = Some(StatementContext::new(
            context.prefix.clone(),
            context.number,
            kind,
            clause_count,
        ));
    }

    /// Finish the current statement, destroying its context.
    pub fn end_statement(&mut self) {
        if let Some(context) = self.contexts.last_mut() {
            context.statement = None;
        }
    }

    /// The statement currently being compiled.
    ///
    /// # Panics
    ///
    /// Panics when no statement is active; every call must be
    /// bracketed between `begin_statement` and `end_statement`.
    pub fn statement(&self) -> &StatementContext {
        self.contexts
            .last()
            .and_then(|c| c.statement.as_ref())
            .expect("no active statement")
    }

    /// Mutable access to the current statement; same panic contract as
    /// [`Builder::statement`].
    pub fn statement_mut(&mut self) -> &mut StatementContext {
        self.contexts
            .last_mut()
            .and_then(|c| c.statement.as_mut())
            .expect("no active statement")
    }

    /// Search the context stack from innermost outward for the nearest
    /// statement carrying a loop label; returns (loop, done) labels.
    pub fn enclosing_loop(&self) -> Option<(String, String)> {
        self.contexts.iter().rev().find_map(|context| {
            context.statement.as_ref().and_then(|statement| {
                statement
                    .loop_label()
                    .map(|label| (label.to_string(), statement.done_label()))
            })
        })
    }

    /// Depth of the procedure-context stack; 1 is the procedure body
    /// itself.
    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// An explicit `return` on the trailing control path makes the
    /// implicit finalize redundant.
    pub fn suppress_finalize(&mut self) {
        self.needs_finalize = false;
    }

    /// Finish the procedure: append the conventional finalize pair
    /// (load `$result`, handle result) unless a trailing `return`
    /// suppressed it, bind any dangling label, and yield the assembly.
    pub fn finish(mut self) -> Assembly {
        if self.needs_finalize {
            self.emit(Instruction::Load {
                kind: StorageKind::Variable,
                symbol: RESULT_VARIABLE.to_string(),
            });
            self.emit(Instruction::Handle(HandleKind::Result));
        } else if self.pending_label.is_some() {
            self.emit(Instruction::Skip);
        }
        Assembly::new(self.steps)
    }
}
