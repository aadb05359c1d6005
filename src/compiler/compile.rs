use indexmap::IndexMap;
use tracing::debug;

use crate::assembler::symbols::Symbols;
use crate::assembly::{
    Assembly, ExecuteStyle, HandleKind, Instruction, JumpCondition, PopTarget, PushOperand,
    StorageKind,
};
use crate::compiler::builder::{Builder, RESULT_VARIABLE};
use crate::compiler::error::{CompileError, PARAMETER_LIMIT};
use crate::lang::node::{
    clause_kind_name, ArithmeticOperator, Block, CollectionItem, CollectionKind,
    ComparisonOperator, Expression, HandleClause, LogicalOperator, MainClause, Recipient,
    Statement,
};

/// Variable the exception-handler ladder stores the caught exception in.
const EXCEPTION_VARIABLE: &str = "$exception";

/// Conventional queue variable that publish clauses store events to.
const EVENT_QUEUE_VARIABLE: &str = "$eventQueue";

/// Translates one procedure's classified syntax tree into symbolic
/// assembly, building the procedure's symbol tables as it goes.
///
/// All per-call state lives here; compiling two procedures means two
/// compilers. The builder is the compiler's only effect.
pub struct Compiler {
    builder: Builder,
    symbols: Symbols,
    temporaries: usize,
}

impl Compiler {
    /// A compiler for one procedure, seeded with the merged type
    /// context: the parameter names and the inherited constant pool.
    pub fn new(parameters: &[String], constants: IndexMap<String, String>) -> Self {
        let mut symbols = Symbols::new(parameters, constants);
        // The finalize pair loads the result variable, so it is always
        // the first entry in the variable table.
        symbols.intern_variable(RESULT_VARIABLE);
        Self {
            builder: Builder::new(),
            symbols,
            temporaries: 0,
        }
    }

    /// Seed the literal pool from the merged type context.
    pub fn seed_literals<'a>(&mut self, literals: impl IntoIterator<Item = &'a String>) {
        self.symbols.seed_literals(literals);
    }

    /// Compile a procedure body into assembly plus its symbol tables.
    pub fn compile(mut self, body: &[Statement]) -> Result<(Assembly, Symbols), CompileError> {
        debug!(statements = body.len(), "compiling procedure body");
        self.builder.push_context(body.len());
        for statement in body {
            self.compile_statement(statement)?;
        }
        self.builder.pop_context();
        Ok((self.builder.finish(), self.symbols))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        let kind = clause_kind_name(&statement.main);
        let blocks = main_block_count(&statement.main);
        let handlers = statement.handlers.len();
        self.builder.begin_statement(kind, blocks + handlers);

        if handlers > 0 {
            let handlers_label = self.builder.statement().handlers_label();
            self.builder
                .emit(Instruction::Push(PushOperand::Handler(handlers_label)));
        }

        self.compile_main_clause(&statement.main)?;

        // The done label is a jump target only for clause-bearing main
        // clauses (branches, loop exits, break).
        if blocks > 0 {
            let done = self.builder.statement().done_label();
            self.builder.declare_label(done);
        }

        if handlers > 0 {
            self.compile_handlers(&statement.handlers)?;
        }

        self.builder.end_statement();
        Ok(())
    }

    fn compile_main_clause(&mut self, clause: &MainClause) -> Result<(), CompileError> {
        match clause {
            MainClause::Evaluate {
                expression,
                recipient,
            } => self.compile_evaluate(expression, recipient.as_ref()),

            MainClause::If {
                conditions,
                else_block,
            } => self.compile_if(conditions, else_block.as_deref()),

            MainClause::Select {
                selector,
                options,
                else_block,
            } => self.compile_select(selector, options, else_block.as_deref()),

            MainClause::While { condition, body } => self.compile_while(condition, body),

            MainClause::With {
                item,
                sequence,
                body,
            } => self.compile_with(item.as_deref(), sequence, body),

            MainClause::Break => {
                let (_, done) = self
                    .builder
                    .enclosing_loop()
                    .ok_or_else(|| CompileError::scope("break"))?;
                self.jump(done, JumpCondition::Unconditional);
                Ok(())
            }

            MainClause::Continue => {
                let (loop_label, _) = self
                    .builder
                    .enclosing_loop()
                    .ok_or_else(|| CompileError::scope("continue"))?;
                self.jump(loop_label, JumpCondition::Unconditional);
                Ok(())
            }

            MainClause::Return(expression) => {
                match expression {
                    Some(expression) => self.compile_expression(expression)?,
                    None => self.push_literal("none"),
                }
                self.builder.emit(Instruction::Handle(HandleKind::Result));
                // A nested return still leaves the fall-through path of
                // its enclosing statement needing the finalize pair.
                if self.builder.depth() == 1 {
                    self.builder.suppress_finalize();
                }
                Ok(())
            }

            MainClause::Throw(expression) => {
                self.compile_expression(expression)?;
                self.builder
                    .emit(Instruction::Handle(HandleKind::Exception));
                Ok(())
            }

            MainClause::Checkout { name, location } => {
                let citation = self.cache_citation(location)?;
                self.load(StorageKind::Draft, &citation);
                self.store(StorageKind::Variable, name);
                Ok(())
            }

            MainClause::Save { draft, location } => {
                self.compile_expression(draft)?;
                let citation = self.cache_citation(location)?;
                self.store(StorageKind::Draft, &citation);
                Ok(())
            }

            MainClause::Discard { location } => {
                let citation = self.cache_citation(location)?;
                self.push_literal("none");
                self.store(StorageKind::Draft, &citation);
                Ok(())
            }

            MainClause::Commit { document, location } => {
                self.compile_expression(document)?;
                let citation = self.cache_citation(location)?;
                self.store(StorageKind::Document, &citation);
                Ok(())
            }

            MainClause::Publish { event } => {
                self.compile_expression(event)?;
                self.store(StorageKind::Message, EVENT_QUEUE_VARIABLE);
                Ok(())
            }

            MainClause::Queue { message, queue } => {
                self.compile_expression(message)?;
                let citation = self.cache_citation(queue)?;
                self.store(StorageKind::Message, &citation);
                Ok(())
            }

            MainClause::Wait { name, queue } => {
                let citation = self.cache_citation(queue)?;
                self.load(StorageKind::Message, &citation);
                self.store(StorageKind::Variable, name);
                Ok(())
            }
        }
    }

    fn compile_evaluate(
        &mut self,
        expression: &Expression,
        recipient: Option<&Recipient>,
    ) -> Result<(), CompileError> {
        self.compile_expression(expression)?;
        match recipient {
            None => self.store(StorageKind::Variable, RESULT_VARIABLE),
            Some(Recipient::Variable(name)) => self.store(StorageKind::Variable, name),
            Some(Recipient::Subcomponent { composite, indices }) => {
                // The value is on the stack; navigate to the innermost
                // composite, then set it at the final index.
                self.compile_expression(composite)?;
                let (last, inner) = indices
                    .split_last()
                    .ok_or_else(|| CompileError::structural("subcomponent recipient without indices"))?;
                for index in inner {
                    self.compile_expression(index)?;
                    self.invoke("$getValue", 2);
                }
                self.compile_expression(last)?;
                self.invoke("$setValue", 3);
            }
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        conditions: &[(Expression, Block)],
        else_block: Option<&[Statement]>,
    ) -> Result<(), CompileError> {
        let count = conditions.len();
        for (position, (condition, block)) in conditions.iter().enumerate() {
            if position > 0 {
                let label = self.builder.statement().clause_label("ConditionClause");
                self.builder.declare_label(label);
            }
            self.compile_expression(condition)?;
            self.coerce_logical();

            let on_false = if position + 1 < count {
                self.builder
                    .statement()
                    .clause_label_at(2, "ConditionClause")
            } else if else_block.is_some() {
                self.builder.statement().clause_label_at(2, "ElseClause")
            } else {
                self.builder.statement().done_label()
            };
            self.jump(on_false, JumpCondition::OnFalse);

            self.compile_block(block)?;
            let is_final_clause = position + 1 == count && else_block.is_none();
            if !is_final_clause {
                let done = self.builder.statement().done_label();
                self.jump(done, JumpCondition::Unconditional);
            }
        }

        if let Some(block) = else_block {
            let label = self.builder.statement().clause_label("ElseClause");
            self.builder.declare_label(label);
            self.compile_block(block)?;
        }
        Ok(())
    }

    fn compile_select(
        &mut self,
        selector: &Expression,
        options: &[(Expression, Block)],
        else_block: Option<&[Statement]>,
    ) -> Result<(), CompileError> {
        // The selector is evaluated once and cached.
        self.compile_expression(selector)?;
        let selector_variable = self.temporary("selector");
        self.store(StorageKind::Variable, &selector_variable);

        let count = options.len();
        for (position, (option, block)) in options.iter().enumerate() {
            if position > 0 {
                let label = self.builder.statement().clause_label("OptionClause");
                self.builder.declare_label(label);
            }
            self.load(StorageKind::Variable, &selector_variable);
            self.compile_expression(option)?;
            self.invoke("$doesMatch", 2);

            let on_false = if position + 1 < count {
                self.builder.statement().clause_label_at(2, "OptionClause")
            } else if else_block.is_some() {
                self.builder.statement().clause_label_at(2, "ElseClause")
            } else {
                self.builder.statement().done_label()
            };
            self.jump(on_false, JumpCondition::OnFalse);

            self.compile_block(block)?;
            let is_final_clause = position + 1 == count && else_block.is_none();
            if !is_final_clause {
                let done = self.builder.statement().done_label();
                self.jump(done, JumpCondition::Unconditional);
            }
        }

        if let Some(block) = else_block {
            let label = self.builder.statement().clause_label("ElseClause");
            self.builder.declare_label(label);
            self.compile_block(block)?;
        }
        Ok(())
    }

    fn compile_while(&mut self, condition: &Expression, body: &[Statement]) -> Result<(), CompileError> {
        // The loop label precedes the condition test so continue
        // re-evaluates the condition.
        let loop_label = self.builder.statement_mut().set_loop_label();
        self.builder.declare_label(loop_label.clone());

        self.compile_expression(condition)?;
        self.coerce_logical();
        let done = self.builder.statement().done_label();
        self.jump(done, JumpCondition::OnFalse);

        self.compile_block(body)?;
        self.jump(loop_label, JumpCondition::Unconditional);
        Ok(())
    }

    fn compile_with(
        &mut self,
        item: Option<&str>,
        sequence: &Expression,
        body: &[Statement],
    ) -> Result<(), CompileError> {
        // The sequence is coerced and converted to an iterator exactly
        // once, before the loop.
        self.compile_expression(sequence)?;
        self.execute("$toSequence", ExecuteStyle::OnTarget);
        self.invoke("$iterator", 1);
        let iterator_variable = self.temporary("iterator");
        self.store(StorageKind::Variable, &iterator_variable);

        let loop_label = self.builder.statement_mut().set_loop_label();
        self.builder.declare_label(loop_label.clone());

        self.load(StorageKind::Variable, &iterator_variable);
        self.invoke("$hasNext", 1);
        let done = self.builder.statement().done_label();
        self.jump(done, JumpCondition::OnFalse);

        self.load(StorageKind::Variable, &iterator_variable);
        self.invoke("$getNext", 1);
        let item_variable = match item {
            Some(name) => name.to_string(),
            None => self.temporary("item"),
        };
        self.store(StorageKind::Variable, &item_variable);

        self.compile_block(body)?;
        self.jump(loop_label, JumpCondition::Unconditional);
        Ok(())
    }

    fn compile_handlers(&mut self, handlers: &[HandleClause]) -> Result<(), CompileError> {
        let failed = self.builder.statement().failed_label();
        let succeeded = self.builder.statement().succeeded_label();
        let handlers_label = self.builder.statement().handlers_label();

        // Unexceptional path: drop the handler and skip the ladder.
        self.builder.emit(Instruction::Pop(PopTarget::Handler));
        self.jump(succeeded.clone(), JumpCondition::Unconditional);

        // On exception the machine transfers here with the exception on
        // top of the component stack.
        self.builder.declare_label(handlers_label);
        let count = handlers.len();
        for (position, handler) in handlers.iter().enumerate() {
            let clause_label = self.builder.statement().clause_label("HandleClause");
            self.builder.declare_label(clause_label);

            self.store(StorageKind::Variable, EXCEPTION_VARIABLE);
            self.load(StorageKind::Variable, EXCEPTION_VARIABLE);
            self.compile_expression(&handler.template)?;
            self.invoke("$doesMatch", 2);

            let on_mismatch = if position + 1 < count {
                self.builder.statement().clause_label_at(2, "HandleClause")
            } else {
                failed.clone()
            };
            self.jump(on_mismatch, JumpCondition::OnFalse);

            // Matched: discard the exception and run the handler body.
            self.builder.emit(Instruction::Pop(PopTarget::Component));
            self.compile_block(&handler.block)?;
            self.jump(succeeded.clone(), JumpCondition::Unconditional);
        }

        // No template matched: re-raise toward the enclosing handler or
        // the caller.
        self.builder.declare_label(failed);
        self.builder
            .emit(Instruction::Handle(HandleKind::Exception));
        self.builder.declare_label(succeeded);
        Ok(())
    }

    fn compile_block(&mut self, block: &[Statement]) -> Result<(), CompileError> {
        self.builder.push_context(block.len());
        for statement in block {
            self.compile_statement(statement)?;
        }
        self.builder.pop_context();
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Literal(text) => {
                self.push_literal(text);
                Ok(())
            }

            Expression::Symbol(name) => {
                // Constants shadow parameters shadow variables.
                if self.symbols.is_constant(name) {
                    self.builder
                        .emit(Instruction::Push(PushOperand::Constant(name.clone())));
                } else if self.symbols.is_parameter(name) {
                    self.builder
                        .emit(Instruction::Push(PushOperand::Parameter(name.clone())));
                } else {
                    self.load(StorageKind::Variable, name);
                }
                Ok(())
            }

            Expression::Arithmetic { operator, operands } => {
                let name = arithmetic_intrinsic(*operator);
                self.compile_coerced_operands(name, operands, "$toNumeric")?;
                self.invoke(name, operands.len() as u8);
                Ok(())
            }

            Expression::Comparison {
                operator,
                left,
                right,
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.invoke(comparison_intrinsic(*operator), 2);
                Ok(())
            }

            Expression::Logical { operator, operands } => {
                let name = logical_intrinsic(*operator);
                self.compile_coerced_operands(name, operands, "$toLogical")?;
                self.invoke(name, operands.len() as u8);
                Ok(())
            }

            Expression::Inversion(operand) => {
                self.compile_expression(operand)?;
                self.coerce_numeric();
                self.invoke("$inverse", 1);
                Ok(())
            }

            Expression::Exponential { base, exponent } => {
                self.compile_expression(base)?;
                self.coerce_numeric();
                self.compile_expression(exponent)?;
                self.coerce_numeric();
                self.invoke("$exponential", 2);
                Ok(())
            }

            Expression::Factorial(operand) => {
                self.compile_expression(operand)?;
                self.coerce_numeric();
                self.invoke("$factorial", 1);
                Ok(())
            }

            Expression::Magnitude(operand) => {
                self.compile_expression(operand)?;
                self.coerce_numeric();
                self.invoke("$magnitude", 1);
                Ok(())
            }

            Expression::Complement(operand) => {
                self.compile_expression(operand)?;
                self.coerce_logical();
                self.invoke("$complement", 1);
                Ok(())
            }

            Expression::Precedence(inner) => self.compile_expression(inner),

            Expression::Collection {
                kind,
                items,
                parameters,
            } => self.compile_collection(*kind, items, parameters.as_deref()),

            Expression::Subcomponent { composite, indices } => {
                self.compile_expression(composite)?;
                for index in indices {
                    self.compile_expression(index)?;
                    self.invoke("$getValue", 2);
                }
                Ok(())
            }

            Expression::FunctionCall { name, parameters } => {
                if parameters.len() > PARAMETER_LIMIT {
                    return Err(CompileError::arity(name.clone(), parameters.len()));
                }
                for parameter in parameters {
                    self.compile_expression(parameter)?;
                }
                self.invoke(name, parameters.len() as u8);
                Ok(())
            }

            Expression::MessageCall {
                name,
                target,
                parameters,
            } => {
                if let Some(target) = target {
                    self.compile_expression(target)?;
                }
                // EXECUTE carries only parameter presence, so the
                // parameters travel as one constructed list.
                if !parameters.is_empty() {
                    self.invoke("$list", 0);
                    for parameter in parameters {
                        self.compile_expression(parameter)?;
                        self.invoke("$addItem", 2);
                    }
                }
                let style = match (target.is_some(), parameters.is_empty()) {
                    (false, true) => ExecuteStyle::Plain,
                    (false, false) => ExecuteStyle::WithParameters,
                    (true, true) => ExecuteStyle::OnTarget,
                    (true, false) => ExecuteStyle::OnTargetWithParameters,
                };
                self.execute(name, style);
                Ok(())
            }
        }
    }

    fn compile_collection(
        &mut self,
        kind: CollectionKind,
        items: &[CollectionItem],
        parameters: Option<&Expression>,
    ) -> Result<(), CompileError> {
        match kind {
            CollectionKind::List => self.invoke("$list", 0),
            CollectionKind::Catalog => self.invoke("$catalog", 0),
            CollectionKind::Set => {
                self.push_literal(&items.len().to_string());
                self.invoke("$set", 1);
            }
            CollectionKind::Stack => {
                self.push_literal(&items.len().to_string());
                self.invoke("$stack", 1);
            }
        }

        for item in items {
            match (kind, &item.key) {
                (CollectionKind::Catalog, Some(key)) => {
                    self.compile_expression(key)?;
                    self.compile_expression(&item.value)?;
                    self.invoke("$setValue", 3);
                }
                (CollectionKind::Catalog, None) => {
                    return Err(CompileError::structural("catalog item without a key"));
                }
                (_, None) => {
                    self.compile_expression(&item.value)?;
                    self.invoke("$addItem", 2);
                }
                (_, Some(_)) => {
                    return Err(CompileError::structural(
                        "keyed item in a non-catalog collection",
                    ));
                }
            }
        }

        if let Some(parameters) = parameters {
            self.compile_expression(parameters)?;
            self.invoke("$setParameters", 2);
        }
        Ok(())
    }

    fn compile_coerced_operands(
        &mut self,
        intrinsic: &str,
        operands: &[Expression],
        coercion: &str,
    ) -> Result<(), CompileError> {
        if operands.len() > PARAMETER_LIMIT {
            return Err(CompileError::arity(intrinsic, operands.len()));
        }
        for operand in operands {
            self.compile_expression(operand)?;
            self.execute(coercion, ExecuteStyle::OnTarget);
        }
        Ok(())
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn jump(&mut self, label: String, condition: JumpCondition) {
        self.builder.emit(Instruction::Jump { label, condition });
    }

    fn push_literal(&mut self, text: &str) {
        self.symbols.intern_literal(text);
        self.builder
            .emit(Instruction::Push(PushOperand::Literal(text.to_string())));
    }

    fn load(&mut self, kind: StorageKind, symbol: &str) {
        self.symbols.intern_variable(symbol);
        self.builder.emit(Instruction::Load {
            kind,
            symbol: symbol.to_string(),
        });
    }

    fn store(&mut self, kind: StorageKind, symbol: &str) {
        self.symbols.intern_variable(symbol);
        self.builder.emit(Instruction::Store {
            kind,
            symbol: symbol.to_string(),
        });
    }

    fn invoke(&mut self, name: &str, count: u8) {
        self.builder.emit(Instruction::Invoke {
            name: name.to_string(),
            count,
        });
    }

    fn execute(&mut self, name: &str, style: ExecuteStyle) {
        self.symbols.intern_procedure(name);
        self.builder.emit(Instruction::Execute {
            name: name.to_string(),
            style,
        });
    }

    fn coerce_numeric(&mut self) {
        self.execute("$toNumeric", ExecuteStyle::OnTarget);
    }

    fn coerce_logical(&mut self) {
        self.execute("$toLogical", ExecuteStyle::OnTarget);
    }

    /// Evaluate a reference expression, coerce it to a citation, and
    /// cache it in a fresh temporary; returns the temporary's name.
    fn cache_citation(&mut self, location: &Expression) -> Result<String, CompileError> {
        self.compile_expression(location)?;
        self.execute("$toCitation", ExecuteStyle::OnTarget);
        let citation = self.temporary("citation");
        self.store(StorageKind::Variable, &citation);
        Ok(citation)
    }

    fn temporary(&mut self, stem: &str) -> String {
        self.temporaries += 1;
        format!("${}-{}", stem, self.temporaries)
    }
}

fn main_block_count(clause: &MainClause) -> usize {
    match clause {
        MainClause::If {
            conditions,
            else_block,
        } => conditions.len() + usize::from(else_block.is_some()),
        MainClause::Select {
            options, else_block, ..
        } => options.len() + usize::from(else_block.is_some()),
        MainClause::While { .. } | MainClause::With { .. } => 1,
        _ => 0,
    }
}

fn arithmetic_intrinsic(operator: ArithmeticOperator) -> &'static str {
    match operator {
        ArithmeticOperator::Sum => "$sum",
        ArithmeticOperator::Difference => "$difference",
        ArithmeticOperator::Product => "$product",
        ArithmeticOperator::Quotient => "$quotient",
        ArithmeticOperator::Remainder => "$remainder",
    }
}

fn comparison_intrinsic(operator: ComparisonOperator) -> &'static str {
    match operator {
        ComparisonOperator::Equal => "$areEqual",
        ComparisonOperator::Less => "$isLess",
        ComparisonOperator::More => "$isMore",
        ComparisonOperator::Matches => "$doesMatch",
    }
}

fn logical_intrinsic(operator: LogicalOperator) -> &'static str {
    match operator {
        LogicalOperator::And => "$and",
        LogicalOperator::Or => "$or",
        LogicalOperator::Xor => "$xor",
        LogicalOperator::Sans => "$sans",
    }
}
