use ecow::EcoString;
use strum_macros::AsRefStr;

use crate::catalog::ExpressibleType;

use super::expression::Expression;
use super::from::FromClause;
use super::node::{CopyContext, CopyNode};
use super::predicate::{Junction, JunctionOperator, Predicate};
use super::render::{RenderContext, identifier_append};
use super::{Render, TreeError};

/// One entry of a select list: `p.name as n`
#[derive(Debug, Clone)]
pub struct Selection {
    pub expression: Expression,
    pub alias: Option<EcoString>,
}

impl Selection {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            alias: None,
        }
    }

    pub fn aliased(expression: Expression, alias: &str) -> Self {
        Self {
            expression,
            alias: Some(EcoString::from(alias)),
        }
    }

    /// Name the selection exposes to an enclosing CTE: its alias, or the
    /// attribute name of a path.
    pub fn column_name(&self) -> Option<EcoString> {
        match (&self.alias, &self.expression) {
            (Some(alias), _) => Some(alias.clone()),
            (None, Expression::Path(path)) => Some(path.attribute().clone()),
            _ => None,
        }
    }
}

impl CopyNode for Selection {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        Selection {
            expression: self.expression.copy_node(ctx),
            alias: self.alias.clone(),
        }
    }
}

impl Render for Selection {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        self.expression.render(buf, ctx);
        if let Some(alias) = &self.alias {
            buf.push_str(" as ");
            identifier_append(buf, alias);
        }
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum NullPrecedence {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct OrderByClause {
    pub expression: Expression,
    pub direction: OrderDirection,
    pub nulls: Option<NullPrecedence>,
}

impl OrderByClause {
    pub fn new(expression: Expression, direction: OrderDirection) -> Self {
        Self {
            expression,
            direction,
            nulls: None,
        }
    }
}

impl CopyNode for OrderByClause {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        OrderByClause {
            expression: self.expression.copy_node(ctx),
            direction: self.direction,
            nulls: self.nulls,
        }
    }
}

impl Render for OrderByClause {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        self.expression.render(buf, ctx);
        buf.push(' ');
        buf.push_str(self.direction.as_ref());
        if let Some(nulls) = self.nulls {
            buf.push_str(" nulls ");
            buf.push_str(nulls.as_ref());
        }
        buf
    }
}

/// Core select without ordering or limits (those go on the parent
/// `QueryExpr`).
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub distinct: bool,
    pub selections: Vec<Selection>,
    pub from: FromClause,
    where_clause: Option<Predicate>,
    pub group_by: Vec<Expression>,
    pub having: Option<Predicate>,
}

impl QuerySpec {
    pub fn new(from: FromClause) -> Self {
        Self {
            from,
            ..Self::default()
        }
    }

    pub fn selection_add(&mut self, selection: Selection) {
        self.selections.push(selection);
    }

    pub fn restriction(&self) -> Option<&Predicate> {
        self.where_clause.as_ref()
    }

    pub fn restriction_mut(&mut self) -> Option<&mut Predicate> {
        self.where_clause.as_mut()
    }

    pub(crate) fn where_slot(&mut self) -> &mut Option<Predicate> {
        &mut self.where_clause
    }

    /// Replace the restriction. `None` leaves the current one in place.
    pub fn restriction_set(&mut self, predicate: Option<Predicate>) {
        if let Some(predicate) = predicate {
            self.where_clause = Some(predicate);
        }
    }

    /// AND `predicate` onto the current restriction. `None` is a no-op.
    pub fn restriction_apply(&mut self, predicate: Option<Predicate>) -> Result<(), TreeError> {
        let Some(predicate) = predicate else {
            return Ok(());
        };
        restriction_combine(&mut self.where_clause, predicate)
    }
}

/// Combine `predicate` into an optional restriction slot with AND.
pub(crate) fn restriction_combine(
    slot: &mut Option<Predicate>,
    predicate: Predicate,
) -> Result<(), TreeError> {
    *slot = match slot.take() {
        None => Some(predicate),
        Some(existing) => Some(Predicate::Junction(Junction::new(
            JunctionOperator::And,
            vec![existing, predicate],
        )?)),
    };
    Ok(())
}

impl CopyNode for QuerySpec {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        // from first so paths in the select list resolve to copied elements
        let from = self.from.copy_node(ctx);
        QuerySpec {
            distinct: self.distinct,
            selections: self.selections.copy_node(ctx),
            from,
            where_clause: self.where_clause.copy_node(ctx),
            group_by: self.group_by.copy_node(ctx),
            having: self.having.copy_node(ctx),
        }
    }
}

impl Render for QuerySpec {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        let mut sep = "";
        if !self.selections.is_empty() {
            buf.push_str("select ");
            if self.distinct {
                buf.push_str("distinct ");
            }
            let mut item_sep = "";
            for selection in &self.selections {
                buf.push_str(item_sep);
                selection.render(buf, ctx);
                item_sep = ", ";
            }
            sep = " ";
        }

        if !self.from.is_empty() {
            buf.push_str(sep);
            self.from.render(buf, ctx);
        }

        if let Some(predicate) = &self.where_clause {
            buf.push_str(" where ");
            predicate.render(buf, ctx);
        }

        if !self.group_by.is_empty() {
            buf.push_str(" group by ");
            let mut item_sep = "";
            for expression in &self.group_by {
                buf.push_str(item_sep);
                expression.render(buf, ctx);
                item_sep = ", ";
            }
        }

        if let Some(predicate) = &self.having {
            buf.push_str(" having ");
            predicate.render(buf, ctx);
        }

        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SetOpType {
    Union,
    Intersect,
    Except,
}

/// `left union/intersect/except [all] right`
#[derive(Debug, Clone)]
pub struct SetOpNode {
    pub op: SetOpType,
    pub all: bool,
    pub left: Box<QueryExpr>,
    pub right: Box<QueryExpr>,
}

impl CopyNode for SetOpNode {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        SetOpNode {
            op: self.op,
            all: self.all,
            left: self.left.copy_node(ctx),
            right: self.right.copy_node(ctx),
        }
    }
}

impl SetOpNode {
    /// Nested set operations and branches carrying their own ordering or
    /// limits are grouped so the text parses back to the same tree.
    fn operand_render<'b>(
        operand: &QueryExpr,
        buf: &'b mut String,
        ctx: &mut RenderContext,
    ) -> &'b mut String {
        if operand.is_grouped_operand() {
            buf.push('(');
            operand.render(buf, ctx);
            buf.push(')');
            buf
        } else {
            operand.render(buf, ctx)
        }
    }
}

impl Render for SetOpNode {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        Self::operand_render(&self.left, buf, ctx);
        buf.push(' ');
        buf.push_str(self.op.as_ref());
        if self.all {
            buf.push_str(" all");
        }
        buf.push(' ');
        Self::operand_render(&self.right, buf, ctx)
    }
}

#[derive(Debug, Clone)]
pub enum QueryBody {
    Spec(QuerySpec),
    SetOp(SetOpNode),
}

/// A complete query: a select or set operation with optional ordering and
/// limits applying to the whole thing.
#[derive(Debug, Clone)]
pub struct QueryExpr {
    pub body: QueryBody,
    pub order_by: Vec<OrderByClause>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

impl QueryExpr {
    pub fn new(spec: QuerySpec) -> Self {
        Self {
            body: QueryBody::Spec(spec),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn set_op(op: SetOpType, all: bool, left: QueryExpr, right: QueryExpr) -> Self {
        Self {
            body: QueryBody::SetOp(SetOpNode {
                op,
                all,
                left: Box::new(left),
                right: Box::new(right),
            }),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Leftmost query spec: the spec itself for a simple select, the first
    /// branch of a set operation otherwise.
    pub fn first_spec(&self) -> &QuerySpec {
        match &self.body {
            QueryBody::Spec(spec) => spec,
            QueryBody::SetOp(set_op) => set_op.left.first_spec(),
        }
    }

    pub fn first_spec_mut(&mut self) -> &mut QuerySpec {
        match &mut self.body {
            QueryBody::Spec(spec) => spec,
            QueryBody::SetOp(set_op) => set_op.left.first_spec_mut(),
        }
    }

    pub fn selections(&self) -> &[Selection] {
        &self.first_spec().selections
    }

    fn is_grouped_operand(&self) -> bool {
        matches!(self.body, QueryBody::SetOp(_))
            || !self.order_by.is_empty()
            || self.limit.is_some()
            || self.offset.is_some()
    }

    /// Type of a single-column query, as seen by `in (subquery)` or a scalar
    /// subquery.
    pub fn selection_type(&self) -> Option<ExpressibleType> {
        match self.selections() {
            [only] => only.expression.expressible_type(),
            _ => None,
        }
    }
}

impl CopyNode for QueryExpr {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        let body = match &self.body {
            QueryBody::Spec(spec) => QueryBody::Spec(spec.copy_node(ctx)),
            QueryBody::SetOp(set_op) => QueryBody::SetOp(set_op.copy_node(ctx)),
        };
        QueryExpr {
            body,
            order_by: self.order_by.copy_node(ctx),
            limit: self.limit.copy_node(ctx),
            offset: self.offset.copy_node(ctx),
        }
    }
}

impl Render for QueryExpr {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        match &self.body {
            QueryBody::Spec(spec) => spec.render(buf, ctx),
            QueryBody::SetOp(set_op) => set_op.render(buf, ctx),
        };

        if !self.order_by.is_empty() {
            buf.push_str(" order by ");
            let mut sep = "";
            for order in &self.order_by {
                buf.push_str(sep);
                order.render(buf, ctx);
                sep = ", ";
            }
        }

        if let Some(limit) = &self.limit {
            buf.push_str(" limit ");
            limit.render(buf, ctx);
        }

        if let Some(offset) = &self.offset {
            buf.push_str(" offset ");
            offset.render(buf, ctx);
        }

        buf
    }
}
