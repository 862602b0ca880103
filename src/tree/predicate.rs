use std::mem;

use strum_macros::AsRefStr;

use super::expression::{Expression, Literal};
use super::node::{CopyContext, CopyNode};
use super::query::QueryExpr;
use super::render::RenderContext;
use super::typecheck::{
    assert_boolean, assert_comparable, assert_string, inferred_types_propagate, types_comparable,
};
use super::{Render, TreeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
pub enum ComparisonOperator {
    #[strum(to_string = "=")]
    Equal,
    #[strum(to_string = "<>")]
    NotEqual,
    #[strum(to_string = "<")]
    LessThan,
    #[strum(to_string = "<=")]
    LessThanOrEqual,
    #[strum(to_string = ">")]
    GreaterThan,
    #[strum(to_string = ">=")]
    GreaterThanOrEqual,
    #[strum(to_string = "is distinct from")]
    DistinctFrom,
    #[strum(to_string = "is not distinct from")]
    NotDistinctFrom,
}

impl ComparisonOperator {
    /// The operator that holds exactly when this one does not.
    pub fn negated(self) -> Self {
        match self {
            ComparisonOperator::Equal => ComparisonOperator::NotEqual,
            ComparisonOperator::NotEqual => ComparisonOperator::Equal,
            ComparisonOperator::LessThan => ComparisonOperator::GreaterThanOrEqual,
            ComparisonOperator::GreaterThanOrEqual => ComparisonOperator::LessThan,
            ComparisonOperator::GreaterThan => ComparisonOperator::LessThanOrEqual,
            ComparisonOperator::LessThanOrEqual => ComparisonOperator::GreaterThan,
            ComparisonOperator::DistinctFrom => ComparisonOperator::NotDistinctFrom,
            ComparisonOperator::NotDistinctFrom => ComparisonOperator::DistinctFrom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum JunctionOperator {
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct ComparisonPredicate {
    left: Expression,
    operator: ComparisonOperator,
    right: Expression,
    negated: bool,
}

impl ComparisonPredicate {
    pub fn new(
        mut left: Expression,
        operator: ComparisonOperator,
        mut right: Expression,
    ) -> Result<Self, TreeError> {
        assert_comparable(&left, &right)?;
        inferred_types_propagate(&mut [&mut left, &mut right]);
        Ok(Self {
            left,
            operator,
            right,
            negated: false,
        })
    }

    pub fn left(&self) -> &Expression {
        &self.left
    }

    pub fn right(&self) -> &Expression {
        &self.right
    }

    /// Mutable access to the right operand, for rebinding literal values.
    pub fn right_mut(&mut self) -> &mut Expression {
        &mut self.right
    }

    /// Operator as constructed, ignoring negation.
    pub fn operator(&self) -> ComparisonOperator {
        self.operator
    }

    /// Operator as rendered.
    pub fn effective_operator(&self) -> ComparisonOperator {
        if self.negated {
            self.operator.negated()
        } else {
            self.operator
        }
    }
}

#[derive(Debug, Clone)]
pub struct BetweenPredicate {
    expression: Expression,
    lower: Expression,
    upper: Expression,
    negated: bool,
}

impl BetweenPredicate {
    pub fn new(
        mut expression: Expression,
        mut lower: Expression,
        mut upper: Expression,
    ) -> Result<Self, TreeError> {
        assert_comparable(&expression, &lower)?;
        assert_comparable(&expression, &upper)?;
        inferred_types_propagate(&mut [&mut expression, &mut lower, &mut upper]);
        Ok(Self {
            expression,
            lower,
            upper,
            negated: false,
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn lower(&self) -> &Expression {
        &self.lower
    }

    pub fn upper(&self) -> &Expression {
        &self.upper
    }
}

#[derive(Debug, Clone)]
pub struct LikePredicate {
    match_expression: Expression,
    pattern: Expression,
    escape: Option<Expression>,
    case_sensitive: bool,
    negated: bool,
}

impl LikePredicate {
    pub fn new(
        mut match_expression: Expression,
        mut pattern: Expression,
        escape: Option<Expression>,
        case_sensitive: bool,
    ) -> Result<Self, TreeError> {
        let operator = if case_sensitive { "like" } else { "ilike" };
        assert_string(&match_expression, operator)?;
        assert_string(&pattern, operator)?;
        if let Some(escape) = &escape {
            assert_string(escape, "escape")?;
        }
        assert_comparable(&match_expression, &pattern)?;
        inferred_types_propagate(&mut [&mut match_expression, &mut pattern]);
        Ok(Self {
            match_expression,
            pattern,
            escape,
            case_sensitive,
            negated: false,
        })
    }

    pub fn match_expression(&self) -> &Expression {
        &self.match_expression
    }

    pub fn pattern(&self) -> &Expression {
        &self.pattern
    }

    pub fn escape(&self) -> Option<&Expression> {
        self.escape.as_ref()
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

/// Shared surface of the two `in` forms.
pub trait InPredicate {
    fn test_expression(&self) -> &Expression;

    /// Append a value to the list.
    fn value(&mut self, value: Expression) -> Result<(), TreeError>;
}

#[derive(Debug, Clone)]
pub struct InListPredicate {
    test: Expression,
    values: Vec<Expression>,
    negated: bool,
}

impl InListPredicate {
    pub fn new(mut test: Expression, mut values: Vec<Expression>) -> Result<Self, TreeError> {
        if values.is_empty() {
            return Err(TreeError::EmptyInList);
        }
        for value in &values {
            assert_comparable(&test, value)?;
        }
        let mut operands: Vec<&mut Expression> = Vec::with_capacity(values.len() + 1);
        operands.push(&mut test);
        operands.extend(values.iter_mut());
        inferred_types_propagate(&mut operands);

        Ok(Self {
            test,
            values,
            negated: false,
        })
    }

    pub fn values(&self) -> &[Expression] {
        &self.values
    }
}

impl InPredicate for InListPredicate {
    fn test_expression(&self) -> &Expression {
        &self.test
    }

    fn value(&mut self, mut value: Expression) -> Result<(), TreeError> {
        assert_comparable(&self.test, &value)?;
        inferred_types_propagate(&mut [&mut self.test, &mut value]);
        self.values.push(value);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InSubQueryPredicate {
    test: Expression,
    subquery: Box<QueryExpr>,
    negated: bool,
}

impl InSubQueryPredicate {
    pub fn new(mut test: Expression, subquery: QueryExpr) -> Result<Self, TreeError> {
        if let Some(selection) = subquery.selection_type() {
            if let Some(test_type) = test.expressible_type()
                && !types_comparable(&test_type, &selection)
            {
                return Err(TreeError::TypeIncompatible {
                    left: test_type.to_string(),
                    right: selection.to_string(),
                });
            }
            test.inferred_type_apply(&selection);
        }
        Ok(Self {
            test,
            subquery: Box::new(subquery),
            negated: false,
        })
    }

    pub fn subquery(&self) -> &QueryExpr {
        &self.subquery
    }
}

impl InPredicate for InSubQueryPredicate {
    fn test_expression(&self) -> &Expression {
        &self.test
    }

    fn value(&mut self, _value: Expression) -> Result<(), TreeError> {
        Err(TreeError::UnsupportedMutation {
            reason: "values cannot be appended to an in predicate over a subquery",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExistsPredicate {
    subquery: Box<QueryExpr>,
    negated: bool,
}

impl ExistsPredicate {
    pub fn new(subquery: QueryExpr) -> Self {
        Self {
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn subquery(&self) -> &QueryExpr {
        &self.subquery
    }
}

#[derive(Debug, Clone)]
pub struct NullnessPredicate {
    expression: Expression,
    negated: bool,
}

impl NullnessPredicate {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            negated: false,
        }
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

#[derive(Debug, Clone)]
pub struct TruthnessPredicate {
    expression: Expression,
    value: bool,
    negated: bool,
}

impl TruthnessPredicate {
    pub fn new(expression: Expression, value: bool) -> Result<Self, TreeError> {
        assert_boolean(&expression, if value { "is true" } else { "is false" })?;
        Ok(Self {
            expression,
            value,
            negated: false,
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn value(&self) -> bool {
        self.value
    }
}

fn plural_path_check(collection: &Expression) -> Result<(), TreeError> {
    if collection.is_plural() {
        Ok(())
    } else {
        Err(TreeError::NotPlural {
            attribute: collection.query_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemberOfPredicate {
    value: Expression,
    collection: Expression,
    negated: bool,
}

impl MemberOfPredicate {
    pub fn new(mut value: Expression, collection: Expression) -> Result<Self, TreeError> {
        plural_path_check(&collection)?;
        let element = collection
            .expressible_type()
            .and_then(|t| t.element_type().cloned());
        if let Some(element) = element {
            if let Some(value_type) = value.expressible_type()
                && !types_comparable(&value_type, &element)
            {
                return Err(TreeError::TypeIncompatible {
                    left: value_type.to_string(),
                    right: element.to_string(),
                });
            }
            value.inferred_type_apply(&element);
        }
        Ok(Self {
            value,
            collection,
            negated: false,
        })
    }

    pub fn value(&self) -> &Expression {
        &self.value
    }

    pub fn collection(&self) -> &Expression {
        &self.collection
    }
}

#[derive(Debug, Clone)]
pub struct EmptinessPredicate {
    collection: Expression,
    negated: bool,
}

impl EmptinessPredicate {
    pub fn new(collection: Expression) -> Result<Self, TreeError> {
        plural_path_check(&collection)?;
        Ok(Self {
            collection,
            negated: false,
        })
    }

    pub fn collection(&self) -> &Expression {
        &self.collection
    }
}

/// A boolean-valued expression used as a predicate: `where p.active`.
#[derive(Debug, Clone)]
pub struct BooleanExpressionPredicate {
    expression: Expression,
}

impl BooleanExpressionPredicate {
    pub fn new(expression: Expression) -> Result<Self, TreeError> {
        assert_boolean(&expression, "where")?;
        Ok(Self { expression })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

#[derive(Debug, Clone)]
pub struct Junction {
    operator: JunctionOperator,
    predicates: Vec<Predicate>,
}

impl Junction {
    pub fn new(operator: JunctionOperator, predicates: Vec<Predicate>) -> Result<Self, TreeError> {
        if predicates.len() < 2 {
            return Err(TreeError::MalformedJunction {
                count: predicates.len(),
            });
        }
        Ok(Self {
            operator,
            predicates,
        })
    }

    pub fn operator(&self) -> JunctionOperator {
        self.operator
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// The member predicates can be edited but not added or removed.
    pub fn predicates_mut(&mut self) -> &mut [Predicate] {
        &mut self.predicates
    }

    /// Whether a member needs parentheses inside this junction.
    ///
    /// Same-operator members flatten, AND binds tighter than OR, so only an
    /// OR nested inside an AND is wrapped.
    fn child_needs_parens(&self, child: &Predicate) -> bool {
        match child {
            Predicate::Junction(inner) => {
                matches!(
                    (self.operator, inner.operator),
                    (JunctionOperator::And, JunctionOperator::Or)
                )
            }
            _ => false,
        }
    }
}

/// The closed set of boolean-valued nodes.
///
/// Variants holding a `negated` flag negate in place. Junctions, grouped
/// predicates and boolean expressions are negated by wrapping them in
/// `Negated`, and negating a `Negated` unwraps it.
#[derive(Debug, Clone)]
pub enum Predicate {
    Comparison(ComparisonPredicate),
    Between(BetweenPredicate),
    Like(LikePredicate),
    InList(InListPredicate),
    InSubQuery(InSubQueryPredicate),
    Exists(ExistsPredicate),
    Nullness(NullnessPredicate),
    Truthness(TruthnessPredicate),
    MemberOf(MemberOfPredicate),
    Emptiness(EmptinessPredicate),
    BooleanExpression(BooleanExpressionPredicate),
    Junction(Junction),
    Grouped(Box<Predicate>),
    Negated(Box<Predicate>),
}

impl Predicate {
    /// Placeholder that only lives between a `mem::replace` and the write
    /// that follows it.
    fn vacant() -> Predicate {
        Predicate::Junction(Junction {
            operator: JunctionOperator::And,
            predicates: Vec::new(),
        })
    }

    fn negated_flag_mut(&mut self) -> Option<&mut bool> {
        match self {
            Predicate::Comparison(p) => Some(&mut p.negated),
            Predicate::Between(p) => Some(&mut p.negated),
            Predicate::Like(p) => Some(&mut p.negated),
            Predicate::InList(p) => Some(&mut p.negated),
            Predicate::InSubQuery(p) => Some(&mut p.negated),
            Predicate::Exists(p) => Some(&mut p.negated),
            Predicate::Nullness(p) => Some(&mut p.negated),
            Predicate::Truthness(p) => Some(&mut p.negated),
            Predicate::MemberOf(p) => Some(&mut p.negated),
            Predicate::Emptiness(p) => Some(&mut p.negated),
            Predicate::BooleanExpression(_)
            | Predicate::Junction(_)
            | Predicate::Grouped(_)
            | Predicate::Negated(_) => None,
        }
    }

    pub fn is_directly_negatable(&self) -> bool {
        !matches!(
            self,
            Predicate::BooleanExpression(_)
                | Predicate::Junction(_)
                | Predicate::Grouped(_)
                | Predicate::Negated(_)
        )
    }

    pub fn is_negated(&self) -> bool {
        match self {
            Predicate::Comparison(p) => p.negated,
            Predicate::Between(p) => p.negated,
            Predicate::Like(p) => p.negated,
            Predicate::InList(p) => p.negated,
            Predicate::InSubQuery(p) => p.negated,
            Predicate::Exists(p) => p.negated,
            Predicate::Nullness(p) => p.negated,
            Predicate::Truthness(p) => p.negated,
            Predicate::MemberOf(p) => p.negated,
            Predicate::Emptiness(p) => p.negated,
            Predicate::Negated(_) => true,
            Predicate::BooleanExpression(_) | Predicate::Junction(_) | Predicate::Grouped(_) => {
                false
            }
        }
    }

    /// Negate in place.
    pub fn negate(&mut self) {
        if let Some(flag) = self.negated_flag_mut() {
            *flag = !*flag;
            return;
        }

        let current = mem::replace(self, Predicate::vacant());
        *self = match current {
            Predicate::Negated(inner) => *inner,
            other => Predicate::Negated(Box::new(other)),
        };
    }

    /// A negated copy of this predicate.
    pub fn not(&self) -> Predicate {
        match self {
            Predicate::Negated(inner) => inner.as_ref().clone(),
            _ => {
                let mut negated = self.clone();
                negated.negate();
                negated
            }
        }
    }

    /// `1 = 1` when `value` holds, `1 = 0` otherwise.
    pub(crate) fn constant(value: bool) -> Predicate {
        let one = Expression::Literal(Literal::from(1));
        let right = Expression::Literal(Literal::from(if value { 1 } else { 0 }));
        Predicate::Comparison(ComparisonPredicate {
            left: one,
            operator: ComparisonOperator::Equal,
            right,
            negated: false,
        })
    }

    /// Wrap in explicit parentheses.
    pub fn grouped(self) -> Predicate {
        Predicate::Grouped(Box::new(self))
    }

    /// Append to an in-list predicate.
    pub fn in_value_add(&mut self, value: Expression) -> Result<(), TreeError> {
        match self {
            Predicate::InList(p) => p.value(value),
            Predicate::InSubQuery(p) => p.value(value),
            _ => Err(TreeError::UnsupportedMutation {
                reason: "values can only be appended to an in predicate",
            }),
        }
    }

    pub fn as_junction_mut(&mut self) -> Option<&mut Junction> {
        match self {
            Predicate::Junction(junction) => Some(junction),
            _ => None,
        }
    }

    pub fn as_comparison_mut(&mut self) -> Option<&mut ComparisonPredicate> {
        match self {
            Predicate::Comparison(comparison) => Some(comparison),
            _ => None,
        }
    }
}

macro_rules! predicate_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Predicate {
                fn from(predicate: $ty) -> Self {
                    Predicate::$variant(predicate)
                }
            }
        )*
    };
}

predicate_from!(
    Comparison(ComparisonPredicate),
    Between(BetweenPredicate),
    Like(LikePredicate),
    InList(InListPredicate),
    InSubQuery(InSubQueryPredicate),
    Exists(ExistsPredicate),
    Nullness(NullnessPredicate),
    Truthness(TruthnessPredicate),
    MemberOf(MemberOfPredicate),
    Emptiness(EmptinessPredicate),
    BooleanExpression(BooleanExpressionPredicate),
    Junction(Junction),
);

impl CopyNode for Predicate {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        match self {
            Predicate::Comparison(p) => Predicate::Comparison(ComparisonPredicate {
                left: p.left.copy_node(ctx),
                operator: p.operator,
                right: p.right.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::Between(p) => Predicate::Between(BetweenPredicate {
                expression: p.expression.copy_node(ctx),
                lower: p.lower.copy_node(ctx),
                upper: p.upper.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::Like(p) => Predicate::Like(LikePredicate {
                match_expression: p.match_expression.copy_node(ctx),
                pattern: p.pattern.copy_node(ctx),
                escape: p.escape.copy_node(ctx),
                case_sensitive: p.case_sensitive,
                negated: p.negated,
            }),
            Predicate::InList(p) => Predicate::InList(InListPredicate {
                test: p.test.copy_node(ctx),
                values: p.values.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::InSubQuery(p) => Predicate::InSubQuery(InSubQueryPredicate {
                test: p.test.copy_node(ctx),
                subquery: p.subquery.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::Exists(p) => Predicate::Exists(ExistsPredicate {
                subquery: p.subquery.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::Nullness(p) => Predicate::Nullness(NullnessPredicate {
                expression: p.expression.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::Truthness(p) => Predicate::Truthness(TruthnessPredicate {
                expression: p.expression.copy_node(ctx),
                value: p.value,
                negated: p.negated,
            }),
            Predicate::MemberOf(p) => Predicate::MemberOf(MemberOfPredicate {
                value: p.value.copy_node(ctx),
                collection: p.collection.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::Emptiness(p) => Predicate::Emptiness(EmptinessPredicate {
                collection: p.collection.copy_node(ctx),
                negated: p.negated,
            }),
            Predicate::BooleanExpression(p) => {
                Predicate::BooleanExpression(BooleanExpressionPredicate {
                    expression: p.expression.copy_node(ctx),
                })
            }
            Predicate::Junction(j) => Predicate::Junction(Junction {
                operator: j.operator,
                predicates: j.predicates.copy_node(ctx),
            }),
            Predicate::Grouped(inner) => Predicate::Grouped(inner.copy_node(ctx)),
            Predicate::Negated(inner) => Predicate::Negated(inner.copy_node(ctx)),
        }
    }
}

fn not_append(buf: &mut String, negated: bool) {
    if negated {
        buf.push_str("not ");
    }
}

impl Render for Junction {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        let mut sep = "";
        for child in &self.predicates {
            buf.push_str(sep);
            if self.child_needs_parens(child) {
                buf.push('(');
                child.render(buf, ctx);
                buf.push(')');
            } else {
                child.render(buf, ctx);
            }
            sep = match self.operator {
                JunctionOperator::And => " and ",
                JunctionOperator::Or => " or ",
            };
        }
        buf
    }
}

impl Render for Predicate {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        match self {
            Predicate::Comparison(p) => {
                p.left.render(buf, ctx);
                buf.push(' ');
                buf.push_str(p.effective_operator().as_ref());
                buf.push(' ');
                p.right.render(buf, ctx);
            }
            Predicate::Between(p) => {
                p.expression.render(buf, ctx);
                buf.push(' ');
                not_append(buf, p.negated);
                buf.push_str("between ");
                p.lower.render(buf, ctx);
                buf.push_str(" and ");
                p.upper.render(buf, ctx);
            }
            Predicate::Like(p) => {
                p.match_expression.render(buf, ctx);
                buf.push(' ');
                not_append(buf, p.negated);
                buf.push_str(if p.case_sensitive { "like " } else { "ilike " });
                p.pattern.render(buf, ctx);
                if let Some(escape) = &p.escape {
                    buf.push_str(" escape ");
                    escape.render(buf, ctx);
                }
            }
            Predicate::InList(p) => {
                p.test.render(buf, ctx);
                buf.push(' ');
                not_append(buf, p.negated);
                buf.push_str("in (");
                let mut sep = "";
                for value in &p.values {
                    buf.push_str(sep);
                    value.render(buf, ctx);
                    sep = ", ";
                }
                buf.push(')');
            }
            Predicate::InSubQuery(p) => {
                p.test.render(buf, ctx);
                buf.push(' ');
                not_append(buf, p.negated);
                buf.push_str("in (");
                p.subquery.render(buf, ctx);
                buf.push(')');
            }
            Predicate::Exists(p) => {
                not_append(buf, p.negated);
                buf.push_str("exists (");
                p.subquery.render(buf, ctx);
                buf.push(')');
            }
            Predicate::Nullness(p) => {
                p.expression.render(buf, ctx);
                buf.push_str(" is ");
                not_append(buf, p.negated);
                buf.push_str("null");
            }
            Predicate::Truthness(p) => {
                p.expression.render(buf, ctx);
                buf.push_str(" is ");
                not_append(buf, p.negated);
                buf.push_str(if p.value { "true" } else { "false" });
            }
            Predicate::MemberOf(p) => {
                p.value.render(buf, ctx);
                buf.push(' ');
                not_append(buf, p.negated);
                buf.push_str("member of ");
                p.collection.render(buf, ctx);
            }
            Predicate::Emptiness(p) => {
                p.collection.render(buf, ctx);
                buf.push_str(" is ");
                not_append(buf, p.negated);
                buf.push_str("empty");
            }
            Predicate::BooleanExpression(p) => {
                p.expression.render(buf, ctx);
            }
            Predicate::Junction(j) => {
                j.render(buf, ctx);
            }
            Predicate::Grouped(inner) => {
                buf.push('(');
                inner.render(buf, ctx);
                buf.push(')');
            }
            Predicate::Negated(inner) => {
                buf.push_str("not ");
                // a grouped predicate brings its own parentheses
                if matches!(inner.as_ref(), Predicate::Grouped(_)) {
                    inner.render(buf, ctx);
                } else {
                    buf.push('(');
                    inner.render(buf, ctx);
                    buf.push(')');
                }
            }
        }
        buf
    }
}
