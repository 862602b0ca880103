//! Read-only traversal over a statement tree.
//!
//! Every `visit_*` method defaults to visiting the node's children in source
//! order, through a `walk_*` function for the larger nodes. Override the
//! methods for the nodes you care about and call the `walk_*` function (or
//! the child visits) from the override to keep descending.

use std::sync::Arc;

use super::cte::{CteBody, CteDefinition};
use super::expression::{Expression, Literal, Parameter, Path};
use super::from::{FromClause, FromElement};
use super::predicate::{
    BetweenPredicate, BooleanExpressionPredicate, ComparisonPredicate, EmptinessPredicate,
    ExistsPredicate, InListPredicate, InPredicate, InSubQueryPredicate, Junction, LikePredicate,
    MemberOfPredicate, NullnessPredicate, Predicate, TruthnessPredicate,
};
use super::query::{QueryBody, QueryExpr, QuerySpec};
use super::statement::{InsertSource, Statement, StatementKind};

pub trait TreeVisitor {
    fn visit_statement(&mut self, statement: &Statement) {
        walk_statement(self, statement);
    }

    fn visit_cte(&mut self, cte: &CteDefinition) {
        walk_cte(self, cte);
    }

    fn visit_query_expr(&mut self, query: &QueryExpr) {
        walk_query_expr(self, query);
    }

    fn visit_query_spec(&mut self, spec: &QuerySpec) {
        walk_query_spec(self, spec);
    }

    fn visit_from_clause(&mut self, from: &FromClause) {
        walk_from_clause(self, from);
    }

    /// A from-element declaration (root, join or DML target).
    fn visit_from_element(&mut self, _from: &Arc<FromElement>) {}

    fn visit_predicate(&mut self, predicate: &Predicate) {
        walk_predicate(self, predicate);
    }

    fn visit_comparison(&mut self, predicate: &ComparisonPredicate) {
        self.visit_expression(predicate.left());
        self.visit_expression(predicate.right());
    }

    fn visit_between(&mut self, predicate: &BetweenPredicate) {
        self.visit_expression(predicate.expression());
        self.visit_expression(predicate.lower());
        self.visit_expression(predicate.upper());
    }

    fn visit_like(&mut self, predicate: &LikePredicate) {
        self.visit_expression(predicate.match_expression());
        self.visit_expression(predicate.pattern());
        if let Some(escape) = predicate.escape() {
            self.visit_expression(escape);
        }
    }

    fn visit_in_list(&mut self, predicate: &InListPredicate) {
        self.visit_expression(predicate.test_expression());
        for value in predicate.values() {
            self.visit_expression(value);
        }
    }

    fn visit_in_subquery(&mut self, predicate: &InSubQueryPredicate) {
        self.visit_expression(predicate.test_expression());
        self.visit_query_expr(predicate.subquery());
    }

    fn visit_exists(&mut self, predicate: &ExistsPredicate) {
        self.visit_query_expr(predicate.subquery());
    }

    fn visit_nullness(&mut self, predicate: &NullnessPredicate) {
        self.visit_expression(predicate.expression());
    }

    fn visit_truthness(&mut self, predicate: &TruthnessPredicate) {
        self.visit_expression(predicate.expression());
    }

    fn visit_member_of(&mut self, predicate: &MemberOfPredicate) {
        self.visit_expression(predicate.value());
        self.visit_expression(predicate.collection());
    }

    fn visit_emptiness(&mut self, predicate: &EmptinessPredicate) {
        self.visit_expression(predicate.collection());
    }

    fn visit_boolean_expression(&mut self, predicate: &BooleanExpressionPredicate) {
        self.visit_expression(predicate.expression());
    }

    fn visit_junction(&mut self, junction: &Junction) {
        for predicate in junction.predicates() {
            self.visit_predicate(predicate);
        }
    }

    fn visit_grouped(&mut self, inner: &Predicate) {
        self.visit_predicate(inner);
    }

    fn visit_negated(&mut self, inner: &Predicate) {
        self.visit_predicate(inner);
    }

    fn visit_expression(&mut self, expression: &Expression) {
        walk_expression(self, expression);
    }

    fn visit_literal(&mut self, _literal: &Literal) {}

    fn visit_parameter(&mut self, _parameter: &Arc<Parameter>) {}

    fn visit_path(&mut self, _path: &Path) {}
}

pub fn walk_statement<V: TreeVisitor + ?Sized>(visitor: &mut V, statement: &Statement) {
    for cte in statement.ctes().iter() {
        visitor.visit_cte(cte);
    }

    match statement.kind() {
        StatementKind::Select(select) => visitor.visit_query_expr(select.query()),
        StatementKind::Insert(insert) => {
            visitor.visit_from_element(insert.target());
            for path in insert.target_paths() {
                visitor.visit_path(path);
            }
            match insert.source() {
                InsertSource::Values(rows) => {
                    for value in rows.iter().flatten() {
                        visitor.visit_expression(value);
                    }
                }
                InsertSource::Select(query) => visitor.visit_query_expr(query),
            }
        }
        StatementKind::Update(update) => {
            visitor.visit_from_element(update.target());
            for assignment in update.assignments() {
                visitor.visit_path(&assignment.target);
                visitor.visit_expression(&assignment.value);
            }
            if let Some(predicate) = update.restriction() {
                visitor.visit_predicate(predicate);
            }
        }
        StatementKind::Delete(delete) => {
            visitor.visit_from_element(delete.target());
            if let Some(predicate) = delete.restriction() {
                visitor.visit_predicate(predicate);
            }
        }
    }
}

pub fn walk_cte<V: TreeVisitor + ?Sized>(visitor: &mut V, cte: &CteDefinition) {
    match cte.body() {
        CteBody::Simple(query) => visitor.visit_query_expr(query),
        CteBody::Recursive {
            base, recursive, ..
        } => {
            visitor.visit_query_expr(base);
            visitor.visit_query_expr(recursive);
        }
    }
}

pub fn walk_query_expr<V: TreeVisitor + ?Sized>(visitor: &mut V, query: &QueryExpr) {
    match &query.body {
        QueryBody::Spec(spec) => visitor.visit_query_spec(spec),
        QueryBody::SetOp(set_op) => {
            visitor.visit_query_expr(&set_op.left);
            visitor.visit_query_expr(&set_op.right);
        }
    }
    for order in &query.order_by {
        visitor.visit_expression(&order.expression);
    }
    if let Some(limit) = &query.limit {
        visitor.visit_expression(limit);
    }
    if let Some(offset) = &query.offset {
        visitor.visit_expression(offset);
    }
}

pub fn walk_query_spec<V: TreeVisitor + ?Sized>(visitor: &mut V, spec: &QuerySpec) {
    for selection in &spec.selections {
        visitor.visit_expression(&selection.expression);
    }
    visitor.visit_from_clause(&spec.from);
    if let Some(predicate) = spec.restriction() {
        visitor.visit_predicate(predicate);
    }
    for expression in &spec.group_by {
        visitor.visit_expression(expression);
    }
    if let Some(predicate) = &spec.having {
        visitor.visit_predicate(predicate);
    }
}

pub fn walk_from_clause<V: TreeVisitor + ?Sized>(visitor: &mut V, from: &FromClause) {
    for entry in from.roots() {
        visitor.visit_from_element(&entry.root);
        for join in &entry.joins {
            visitor.visit_from_element(&join.join);
            if let Some(on) = &join.on {
                visitor.visit_predicate(on);
            }
        }
    }
}

pub fn walk_predicate<V: TreeVisitor + ?Sized>(visitor: &mut V, predicate: &Predicate) {
    match predicate {
        Predicate::Comparison(p) => visitor.visit_comparison(p),
        Predicate::Between(p) => visitor.visit_between(p),
        Predicate::Like(p) => visitor.visit_like(p),
        Predicate::InList(p) => visitor.visit_in_list(p),
        Predicate::InSubQuery(p) => visitor.visit_in_subquery(p),
        Predicate::Exists(p) => visitor.visit_exists(p),
        Predicate::Nullness(p) => visitor.visit_nullness(p),
        Predicate::Truthness(p) => visitor.visit_truthness(p),
        Predicate::MemberOf(p) => visitor.visit_member_of(p),
        Predicate::Emptiness(p) => visitor.visit_emptiness(p),
        Predicate::BooleanExpression(p) => visitor.visit_boolean_expression(p),
        Predicate::Junction(j) => visitor.visit_junction(j),
        Predicate::Grouped(inner) => visitor.visit_grouped(inner),
        Predicate::Negated(inner) => visitor.visit_negated(inner),
    }
}

pub fn walk_expression<V: TreeVisitor + ?Sized>(visitor: &mut V, expression: &Expression) {
    match expression {
        Expression::Literal(lit) => visitor.visit_literal(lit),
        Expression::Parameter(param) => visitor.visit_parameter(param),
        Expression::Path(path) => visitor.visit_path(path),
        Expression::Entity(_) => {}
        Expression::Function(func) => {
            for arg in &func.args {
                visitor.visit_expression(arg);
            }
        }
        Expression::Arithmetic(arith) => {
            visitor.visit_expression(arith.left());
            visitor.visit_expression(arith.right());
        }
        Expression::Tuple(items) => {
            for item in items {
                visitor.visit_expression(item);
            }
        }
        Expression::SubQuery(query) => visitor.visit_query_expr(query),
    }
}

impl Statement {
    pub fn accept<V: TreeVisitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_statement(self);
    }
}

impl Predicate {
    pub fn accept<V: TreeVisitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_predicate(self);
    }
}

impl Expression {
    pub fn accept<V: TreeVisitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_expression(self);
    }
}
