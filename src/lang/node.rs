use serde::{Deserialize, Serialize};

/// One statement: a main clause plus any number of handle clauses that
/// catch exceptions raised while the main clause executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub main: MainClause,
    pub handlers: Vec<HandleClause>,
}

impl Statement {
    /// A statement with no handle clauses.
    pub fn simple(main: MainClause) -> Self {
        Self {
            main,
            handlers: Vec::new(),
        }
    }
}

/// An exception handler: the caught exception is stored, matched against
/// the template, and on a match the block runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleClause {
    /// Template the stored exception is matched against.
    pub template: Expression,
    /// Handler body, compiled as a nested scope.
    pub block: Block,
}

/// A nested block of statements (a branch, a loop body, a handler body).
pub type Block = Vec<Statement>;

/// The main clause of a statement.
///
/// The notation parser (an external collaborator) produces these nodes;
/// the compiler consumes them. Every construct the compiler understands
/// is a variant here, so adding a notation feature without teaching the
/// compiler about it fails to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MainClause {
    /// Evaluate an expression, assigning the result to the recipient
    /// (or to the conventional `$result` variable if none is given).
    Evaluate {
        expression: Expression,
        recipient: Option<Recipient>,
    },

    /// Multi-way conditional: `(condition, block)` pairs plus an
    /// optional else block.
    If {
        conditions: Vec<(Expression, Block)>,
        else_block: Option<Block>,
    },

    /// Match a selector value against option templates.
    Select {
        selector: Expression,
        options: Vec<(Expression, Block)>,
        else_block: Option<Block>,
    },

    /// Pre-tested loop.
    While { condition: Expression, body: Block },

    /// For-each loop over a sequence. `item` is the loop variable; when
    /// absent an implicit temporary is bound instead.
    With {
        item: Option<String>,
        sequence: Expression,
        body: Block,
    },

    /// Jump past the end of the nearest enclosing loop.
    Break,

    /// Jump back to the top of the nearest enclosing loop.
    Continue,

    /// Return a result to the caller. A missing expression returns the
    /// `none` element.
    Return(Option<Expression>),

    /// Raise an exception toward the nearest handler or the caller.
    Throw(Expression),

    /// Check out a draft of the document at the cited location, binding
    /// it to the named variable.
    Checkout { name: String, location: Expression },

    /// Save a draft back to the cited location.
    Save {
        draft: Expression,
        location: Expression,
    },

    /// Discard the draft at the cited location.
    Discard { location: Expression },

    /// Commit a document permanently to the cited location.
    Commit {
        document: Expression,
        location: Expression,
    },

    /// Publish an event message to the conventional event queue.
    Publish { event: Expression },

    /// Queue a message on the cited message queue.
    Queue {
        message: Expression,
        queue: Expression,
    },

    /// Wait for (and remove) the next message on the cited queue,
    /// binding it to the named variable. Blocking happens in the
    /// virtual machine, not in the compiler.
    Wait { name: String, queue: Expression },
}

/// Where an evaluated value is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Recipient {
    /// A named local variable.
    Variable(String),
    /// An indexed sub-component of a composite value, assigned via the
    /// set-value intrinsic.
    Subcomponent {
        composite: Expression,
        indices: Vec<Expression>,
    },
}

/// Operators for n-ary arithmetic expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOperator {
    Sum,
    Difference,
    Product,
    Quotient,
    Remainder,
}

/// Operators for binary comparison expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equal,
    Less,
    More,
    Matches,
}

/// Operators for n-ary logical expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
    Xor,
    Sans,
}

/// The kind of collection an aggregate expression constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    List,
    Set,
    Stack,
    Catalog,
}

/// An expression node. All operand sub-expressions are compiled before
/// the operation that consumes them, left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// A literal element in its source spelling, e.g. `5` or `none`.
    Literal(String),

    /// A symbol reference: resolved to a constant, a parameter, or a
    /// variable, in that order.
    Symbol(String),

    /// N-ary arithmetic; operands are coerced to numeric.
    Arithmetic {
        operator: ArithmeticOperator,
        operands: Vec<Expression>,
    },

    /// Binary comparison.
    Comparison {
        operator: ComparisonOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// N-ary logical operation; operands are coerced to logical.
    Logical {
        operator: LogicalOperator,
        operands: Vec<Expression>,
    },

    /// Numeric inversion (negation).
    Inversion(Box<Expression>),

    /// Exponentiation.
    Exponential {
        base: Box<Expression>,
        exponent: Box<Expression>,
    },

    /// Factorial.
    Factorial(Box<Expression>),

    /// Magnitude (absolute value / norm).
    Magnitude(Box<Expression>),

    /// Logical complement.
    Complement(Box<Expression>),

    /// Parenthesized sub-expression; compiles to its inner expression.
    Precedence(Box<Expression>),

    /// Collection constructor. Sets and stacks are sized up front; lists
    /// and catalogs start empty. Catalog items carry a key.
    Collection {
        kind: CollectionKind,
        items: Vec<CollectionItem>,
        /// Optional type parameters, set via the set-parameters intrinsic.
        parameters: Option<Box<Expression>>,
    },

    /// Indexed access into a composite value, one get-value step per
    /// index.
    Subcomponent {
        composite: Box<Expression>,
        indices: Vec<Expression>,
    },

    /// Intrinsic function call, at most three positional parameters.
    FunctionCall {
        name: String,
        parameters: Vec<Expression>,
    },

    /// Message send: dynamic dispatch on an optional target with the
    /// parameters aggregated into a list.
    MessageCall {
        name: String,
        target: Option<Box<Expression>>,
        parameters: Vec<Expression>,
    },
}

/// One member of a collection constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    /// Catalog entries carry a key; other collections do not.
    pub key: Option<Expression>,
    pub value: Expression,
}

impl CollectionItem {
    pub fn value(value: Expression) -> Self {
        Self { key: None, value }
    }

    pub fn entry(key: Expression, value: Expression) -> Self {
        Self {
            key: Some(key),
            value,
        }
    }
}

impl Expression {
    /// Shorthand for a literal expression.
    pub fn literal(text: impl Into<String>) -> Self {
        Expression::Literal(text.into())
    }

    /// Shorthand for a symbol expression.
    pub fn symbol(name: impl Into<String>) -> Self {
        Expression::Symbol(name.into())
    }
}

/// Descriptive name of a main-clause kind, used to build label text.
pub fn clause_kind_name(clause: &MainClause) -> &'static str {
    match clause {
        MainClause::Evaluate { .. } => "EvaluateStatement",
        MainClause::If { .. } => "IfStatement",
        MainClause::Select { .. } => "SelectStatement",
        MainClause::While { .. } => "WhileStatement",
        MainClause::With { .. } => "WithStatement",
        MainClause::Break => "BreakStatement",
        MainClause::Continue => "ContinueStatement",
        MainClause::Return(_) => "ReturnStatement",
        MainClause::Throw(_) => "ThrowStatement",
        MainClause::Checkout { .. } => "CheckoutStatement",
        MainClause::Save { .. } => "SaveStatement",
        MainClause::Discard { .. } => "DiscardStatement",
        MainClause::Commit { .. } => "CommitStatement",
        MainClause::Publish { .. } => "PublishStatement",
        MainClause::Queue { .. } => "QueueStatement",
        MainClause::Wait { .. } => "WaitStatement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_kind_names() {
        assert_eq!(clause_kind_name(&MainClause::Break), "BreakStatement");
        assert_eq!(
            clause_kind_name(&MainClause::Return(None)),
            "ReturnStatement"
        );
        let evaluate = MainClause::Evaluate {
            expression: Expression::literal("5"),
            recipient: None,
        };
        assert_eq!(clause_kind_name(&evaluate), "EvaluateStatement");
    }

    #[test]
    fn test_simple_statement_has_no_handlers() {
        let statement = Statement::simple(MainClause::Break);
        assert!(statement.handlers.is_empty());
    }
}
