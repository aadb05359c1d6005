pub mod node;

pub use node::{
    ArithmeticOperator, Block, CollectionItem, CollectionKind, ComparisonOperator, Expression,
    HandleClause, LogicalOperator, MainClause, Recipient, Statement,
};
