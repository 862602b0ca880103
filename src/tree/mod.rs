mod builder;
mod cte;
mod expression;
mod from;
mod node;
mod parameters;
mod predicate;
mod query;
mod render;
mod statement;
mod typecheck;
pub mod visitor;

use error_set::error_set;
use rootcause::Report;

error_set! {
    TreeError := {
        #[display("Cannot compare left expression of type '{left}' with right expression of type '{right}'")]
        TypeIncompatible { left: String, right: String },
        #[display("Operand of '{operator}' is of type '{type_name}' which is not {expected}")]
        OperandType {
            operator: &'static str,
            type_name: String,
            expected: &'static str,
        },
        #[display("Cannot assign expression of type '{value_type}' to target path '{path}' of type '{target_type}'")]
        NotAssignable {
            value_type: String,
            path: String,
            target_type: String,
        },
        #[display("Cannot compare tuples of different lengths ({left} and {right})")]
        TupleLength { left: usize, right: usize },
        #[display("Multi valued path '{attribute}' is only allowed with 'member of' or 'is empty'")]
        MultiValuedPath { attribute: String },
        #[display("Path '{attribute}' is not a plural attribute")]
        NotPlural { attribute: String },
        #[display("CTE name '{name}' must be non-empty and start with an alphabetic character")]
        InvalidCteName { name: String },
        #[display("CTE with name '{name}' is already registered")]
        DuplicateCte { name: String },
        #[display("Unsupported mutation: {reason}")]
        UnsupportedMutation { reason: &'static str },
        #[display("Incomplete DML target: {reason}")]
        IncompleteTarget { reason: &'static str },
        #[display("A junction needs at least two predicates, got {count}")]
        MalformedJunction { count: usize },
        #[display("An in-list predicate needs at least one value")]
        EmptyInList,
        #[display("Unknown entity: {name}")]
        UnknownEntity { name: String },
        #[display("Attribute '{attribute}' not found on '{entity}'")]
        UnknownAttribute { entity: String, attribute: String },
        #[display("'{name}' cannot be navigated")]
        NotNavigable { name: String },
        #[display("Join '{name}' does not belong to any root of this from clause")]
        UnknownFromElement { name: String },
    }
}

/// Result type with location-tracking reports for statement level operations.
pub type TreeResult<T> = Result<T, Report<TreeError>>;

/// Unparse a node back into query text.
///
/// Each node appends its own grammar to `buf` and delegates to its children,
/// sharing one [`RenderContext`] so from-element aliases stay stable for the
/// whole render.
pub trait Render {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String;

    /// Render with a fresh context.
    fn query_string(&self) -> String {
        let mut buf = String::new();
        let mut ctx = RenderContext::new();
        self.render(&mut buf, &mut ctx);
        buf
    }
}

pub use builder::NodeBuilder;
pub use cte::{
    CteBody, CteColumn, CteContainer, CteDefinition, CteHandle, CteMaterialization, CteTable,
};
pub use expression::{
    ArithmeticExpr, ArithmeticOp, Expression, FunctionCall, Literal, LiteralValue, Parameter,
    ParameterKey, Path,
};
pub use from::{FromClause, FromElement, FromKind, JoinEntry, JoinType, RootEntry};
pub use node::{CopyContext, CopyNode, NodeId, SharedNode};
pub use parameters::parameters_collect;
pub use predicate::{
    BetweenPredicate, BooleanExpressionPredicate, ComparisonOperator, ComparisonPredicate,
    EmptinessPredicate, ExistsPredicate, InListPredicate, InPredicate, InSubQueryPredicate,
    Junction, JunctionOperator, LikePredicate, MemberOfPredicate, NullnessPredicate, Predicate,
    TruthnessPredicate,
};
pub use query::{
    NullPrecedence, OrderByClause, OrderDirection, QueryBody, QueryExpr, QuerySpec, Selection,
    SetOpNode, SetOpType,
};
pub use render::RenderContext;
pub use statement::{
    Assignment, DeleteStatement, InsertSource, InsertStatement, QuerySource, SelectStatement,
    Statement, StatementKind, UpdateStatement,
};
pub use typecheck::{assert_comparable, highest_precedence_type, types_comparable};
