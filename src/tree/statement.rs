use std::sync::Arc;

use ecow::EcoString;
use tracing::{debug, instrument};

use crate::result::{MapIntoReport, ReportExt};

use super::builder::NodeBuilder;
use super::cte::{CteContainer, CteHandle};
use super::expression::{Expression, Parameter, Path};
use super::from::FromElement;
use super::node::{CopyContext, CopyNode};
use super::parameters::parameters_collect;
use super::predicate::Predicate;
use super::query::{QueryExpr, restriction_combine};
use super::render::{RenderContext, identifier_append};
use super::typecheck::{assert_assignable, inferred_types_propagate};
use super::visitor::TreeVisitor;
use super::{Render, TreeError, TreeResult};

/// Where a statement came from.
///
/// Decides how parameters are tracked: a criteria statement may still be
/// growing, so its parameters are collected from the tree on every request;
/// a parsed statement is complete once the parser is done and keeps the set
/// it recorded then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuerySource {
    Criteria,
    Hql,
}

#[derive(Debug, Clone)]
pub struct SelectStatement {
    query: QueryExpr,
}

impl SelectStatement {
    pub fn new(query: QueryExpr) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &QueryExpr {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryExpr {
        &mut self.query
    }
}

#[derive(Debug, Clone)]
pub enum InsertSource {
    /// `values (..), (..)`
    Values(Vec<Vec<Expression>>),
    Select(QueryExpr),
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    target: Arc<FromElement>,
    target_paths: Vec<Path>,
    source: InsertSource,
}

impl InsertStatement {
    /// An insert into `target` setting `target_paths` from `source`.
    ///
    /// Every values row must have one expression per target path and each
    /// expression must be assignable to its path. Untyped values adopt the
    /// path's type.
    pub fn new(
        target: Arc<FromElement>,
        target_paths: Vec<Path>,
        mut source: InsertSource,
    ) -> Result<Self, TreeError> {
        if !target.is_root() {
            return Err(TreeError::IncompleteTarget {
                reason: "insert target must be an entity root",
            });
        }
        if target_paths.is_empty() {
            return Err(TreeError::IncompleteTarget {
                reason: "insert needs at least one target path",
            });
        }

        match &mut source {
            InsertSource::Values(rows) => {
                for row in rows.iter_mut() {
                    if row.len() != target_paths.len() {
                        return Err(TreeError::TupleLength {
                            left: target_paths.len(),
                            right: row.len(),
                        });
                    }
                    for (path, value) in target_paths.iter().zip(row.iter_mut()) {
                        assignment_check(path, value)?;
                    }
                }
            }
            InsertSource::Select(query) => {
                let width = query.selections().len();
                if width != target_paths.len() {
                    return Err(TreeError::TupleLength {
                        left: target_paths.len(),
                        right: width,
                    });
                }
            }
        }

        Ok(Self {
            target,
            target_paths,
            source,
        })
    }

    pub fn target(&self) -> &Arc<FromElement> {
        &self.target
    }

    pub fn target_paths(&self) -> &[Path] {
        &self.target_paths
    }

    pub fn source(&self) -> &InsertSource {
        &self.source
    }
}

/// `target = value` in an update's set clause.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: Path,
    pub value: Expression,
}

fn assignment_check(target: &Path, value: &mut Expression) -> Result<(), TreeError> {
    assert_assignable(target, value)?;
    let mut target_expr = Expression::Path(target.clone());
    inferred_types_propagate(&mut [&mut target_expr, value]);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    target: Arc<FromElement>,
    versioned: bool,
    assignments: Vec<Assignment>,
    where_clause: Option<Predicate>,
}

impl UpdateStatement {
    pub fn new(target: Arc<FromElement>, versioned: bool) -> Result<Self, TreeError> {
        if !target.is_root() {
            return Err(TreeError::IncompleteTarget {
                reason: "update target must be an entity root",
            });
        }
        Ok(Self {
            target,
            versioned,
            assignments: Vec::new(),
            where_clause: None,
        })
    }

    /// Add `target = value` to the set clause.
    pub fn assignment_add(
        &mut self,
        target: Path,
        mut value: Expression,
    ) -> Result<(), TreeError> {
        assignment_check(&target, &mut value)?;
        self.assignments.push(Assignment { target, value });
        Ok(())
    }

    pub fn target(&self) -> &Arc<FromElement> {
        &self.target
    }

    pub fn is_versioned(&self) -> bool {
        self.versioned
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn restriction(&self) -> Option<&Predicate> {
        self.where_clause.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    target: Arc<FromElement>,
    where_clause: Option<Predicate>,
}

impl DeleteStatement {
    pub fn new(target: Arc<FromElement>) -> Result<Self, TreeError> {
        if !target.is_root() {
            return Err(TreeError::IncompleteTarget {
                reason: "delete target must be an entity root",
            });
        }
        Ok(Self {
            target,
            where_clause: None,
        })
    }

    pub fn target(&self) -> &Arc<FromElement> {
        &self.target
    }

    pub fn restriction(&self) -> Option<&Predicate> {
        self.where_clause.as_ref()
    }
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl StatementKind {
    fn where_slot(&mut self) -> Result<&mut Option<Predicate>, TreeError> {
        match self {
            StatementKind::Select(select) => Ok(select.query.first_spec_mut().where_slot()),
            StatementKind::Update(update) => Ok(&mut update.where_clause),
            StatementKind::Delete(delete) => Ok(&mut delete.where_clause),
            StatementKind::Insert(_) => Err(TreeError::UnsupportedMutation {
                reason: "insert statements have no restriction",
            }),
        }
    }

    fn restriction(&self) -> Option<&Predicate> {
        match self {
            StatementKind::Select(select) => select.query.first_spec().restriction(),
            StatementKind::Update(update) => update.restriction(),
            StatementKind::Delete(delete) => delete.restriction(),
            StatementKind::Insert(_) => None,
        }
    }
}

/// A root statement: the query or DML operation plus its CTEs.
#[derive(Debug)]
pub struct Statement {
    builder: Arc<NodeBuilder>,
    source: QuerySource,
    kind: StatementKind,
    ctes: CteContainer,
    /// Parameter set recorded when parsing completed
    parameters: Option<Vec<Arc<Parameter>>>,
}

impl Statement {
    pub fn new(builder: Arc<NodeBuilder>, source: QuerySource, kind: StatementKind) -> Self {
        let ctes = CteContainer::new(&builder.settings().cte.auto_name_prefix);
        Self {
            builder,
            source,
            kind,
            ctes,
            parameters: None,
        }
    }

    pub fn builder(&self) -> &Arc<NodeBuilder> {
        &self.builder
    }

    pub fn source(&self) -> QuerySource {
        self.source
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut StatementKind {
        &mut self.kind
    }

    /// Entity name of a DML target, for diagnostics.
    pub fn target_name(&self) -> Option<EcoString> {
        match &self.kind {
            StatementKind::Select(_) => None,
            StatementKind::Insert(insert) => Some(insert.target.describe()),
            StatementKind::Update(update) => Some(update.target.describe()),
            StatementKind::Delete(delete) => Some(delete.target.describe()),
        }
    }

    pub fn ctes(&self) -> &CteContainer {
        &self.ctes
    }

    pub fn ctes_mut(&mut self) -> &mut CteContainer {
        &mut self.ctes
    }

    /// Register `query` as a CTE under a generated name.
    pub fn with(&mut self, query: QueryExpr) -> TreeResult<CteHandle> {
        self.ctes
            .with(query)
            .map_into_report::<TreeError>()
            .attach_loc("registering cte")
    }

    pub fn with_named(&mut self, name: &str, query: QueryExpr) -> TreeResult<CteHandle> {
        self.ctes
            .with_named(name, query)
            .map_into_report::<TreeError>()
            .attach_loc(format!("registering cte '{name}'"))
    }

    pub fn with_recursive_union<F>(
        &mut self,
        base: QueryExpr,
        distinct: bool,
        producer: F,
    ) -> TreeResult<CteHandle>
    where
        F: FnOnce(&CteHandle) -> Result<QueryExpr, TreeError>,
    {
        self.ctes
            .with_recursive_union(base, distinct, producer)
            .map_into_report::<TreeError>()
            .attach_loc("registering recursive cte")
    }

    pub fn with_recursive_union_named<F>(
        &mut self,
        name: &str,
        base: QueryExpr,
        distinct: bool,
        producer: F,
    ) -> TreeResult<CteHandle>
    where
        F: FnOnce(&CteHandle) -> Result<QueryExpr, TreeError>,
    {
        self.ctes
            .with_recursive_union_named(name, base, distinct, producer)
            .map_into_report::<TreeError>()
            .attach_loc(format!("registering recursive cte '{name}'"))
    }

    /// The where clause. For a select this is the restriction of its first
    /// query spec; inserts have none.
    pub fn restriction(&self) -> Option<&Predicate> {
        self.kind.restriction()
    }

    pub fn restriction_mut(&mut self) -> Option<&mut Predicate> {
        match self.kind.where_slot() {
            Ok(slot) => slot.as_mut(),
            Err(_) => None,
        }
    }

    /// AND `predicate` onto the current restriction. `None` is a no-op.
    pub fn apply_restriction(&mut self, predicate: Option<Predicate>) -> TreeResult<()> {
        let Some(predicate) = predicate else {
            return Ok(());
        };
        let slot = self
            .kind
            .where_slot()
            .map_into_report::<TreeError>()
            .attach_loc("applying restriction")?;
        restriction_combine(slot, predicate)
            .map_into_report::<TreeError>()
            .attach_loc("applying restriction")
    }

    /// Replace the restriction. `None` is a no-op.
    pub fn set_restriction(&mut self, predicate: Option<Predicate>) -> TreeResult<()> {
        let Some(predicate) = predicate else {
            return Ok(());
        };
        let slot = self
            .kind
            .where_slot()
            .map_into_report::<TreeError>()
            .attach_loc("setting restriction")?;
        *slot = Some(predicate);
        Ok(())
    }

    /// Record the parameter set of a parsed statement. Later requests return
    /// this set unchanged. Has no effect on criteria statements.
    pub fn parse_complete(&mut self) {
        if self.source == QuerySource::Hql {
            let parameters = parameters_collect(self);
            debug!(count = parameters.len(), "parse complete");
            self.parameters = Some(parameters);
        }
    }

    /// Distinct parameters of this statement, in first-occurrence order.
    ///
    /// Criteria statements are walked on every call. Parsed statements return
    /// the set recorded by [`Statement::parse_complete`], empty before it.
    pub fn parameters(&self) -> Vec<Arc<Parameter>> {
        match self.source {
            QuerySource::Criteria => parameters_collect(self),
            QuerySource::Hql => self.parameters.clone().unwrap_or_default(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<Arc<Parameter>> {
        self.parameters()
            .into_iter()
            .find(|p| p.name() == Some(name))
    }

    pub fn parameter_positional(&self, position: u32) -> Option<Arc<Parameter>> {
        self.parameters()
            .into_iter()
            .find(|p| p.position() == Some(position))
    }

    /// A fully independent copy of this statement.
    ///
    /// Nodes shared within this statement stay shared within the copy; no node
    /// is shared between the copy and the original.
    #[instrument(skip_all)]
    pub fn copy(&self) -> Statement {
        let mut ctx = CopyContext::new();
        // CTE tables first so from-elements selecting from them resolve to
        // the copied tables
        let ctes = self.ctes.copy_node(&mut ctx);
        let kind = self.kind.copy_node(&mut ctx);
        let parameters = self.parameters.copy_node(&mut ctx);
        debug!(shared = ctx.len(), "statement copied");
        Statement {
            builder: Arc::clone(&self.builder),
            source: self.source,
            kind,
            ctes,
            parameters,
        }
    }
}

impl CopyNode for StatementKind {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        match self {
            StatementKind::Select(select) => StatementKind::Select(SelectStatement {
                query: select.query.copy_node(ctx),
            }),
            StatementKind::Insert(insert) => StatementKind::Insert(InsertStatement {
                target: insert.target.copy_node(ctx),
                target_paths: insert.target_paths.copy_node(ctx),
                source: match &insert.source {
                    InsertSource::Values(rows) => InsertSource::Values(rows.copy_node(ctx)),
                    InsertSource::Select(query) => InsertSource::Select(query.copy_node(ctx)),
                },
            }),
            StatementKind::Update(update) => StatementKind::Update(UpdateStatement {
                target: update.target.copy_node(ctx),
                versioned: update.versioned,
                assignments: update
                    .assignments
                    .iter()
                    .map(|a| Assignment {
                        target: a.target.copy_node(ctx),
                        value: a.value.copy_node(ctx),
                    })
                    .collect(),
                where_clause: update.where_clause.copy_node(ctx),
            }),
            StatementKind::Delete(delete) => StatementKind::Delete(DeleteStatement {
                target: delete.target.copy_node(ctx),
                where_clause: delete.where_clause.copy_node(ctx),
            }),
        }
    }
}

/// Collects explicit aliases before rendering so generated ones avoid them.
struct AliasReserver<'a> {
    ctx: &'a mut RenderContext,
}

impl TreeVisitor for AliasReserver<'_> {
    fn visit_from_element(&mut self, from: &Arc<FromElement>) {
        if let Some(alias) = from.alias() {
            self.ctx.reserve(alias);
        }
    }
}

fn expressions_render(buf: &mut String, ctx: &mut RenderContext, items: &[Expression]) {
    let mut sep = "";
    for item in items {
        buf.push_str(sep);
        item.render(buf, ctx);
        sep = ", ";
    }
}

impl Render for StatementKind {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        match self {
            StatementKind::Select(select) => {
                select.query.render(buf, ctx);
            }
            StatementKind::Insert(insert) => {
                buf.push_str("insert into ");
                identifier_append(buf, &insert.target.describe());
                buf.push_str(" (");
                let mut sep = "";
                for path in &insert.target_paths {
                    buf.push_str(sep);
                    identifier_append(buf, path.attribute());
                    sep = ", ";
                }
                buf.push_str(") ");
                match &insert.source {
                    InsertSource::Values(rows) => {
                        buf.push_str("values ");
                        let mut row_sep = "";
                        for row in rows {
                            buf.push_str(row_sep);
                            buf.push('(');
                            expressions_render(buf, ctx, row);
                            buf.push(')');
                            row_sep = ", ";
                        }
                    }
                    InsertSource::Select(query) => {
                        query.render(buf, ctx);
                    }
                }
            }
            StatementKind::Update(update) => {
                buf.push_str("update ");
                if update.versioned {
                    buf.push_str("versioned ");
                }
                update.target.declaration_render(buf, ctx);
                buf.push_str(" set ");
                let mut sep = "";
                for assignment in &update.assignments {
                    buf.push_str(sep);
                    assignment.target.render(buf, ctx);
                    buf.push_str(" = ");
                    assignment.value.render(buf, ctx);
                    sep = ", ";
                }
                if let Some(predicate) = &update.where_clause {
                    buf.push_str(" where ");
                    predicate.render(buf, ctx);
                }
            }
            StatementKind::Delete(delete) => {
                buf.push_str("delete from ");
                delete.target.declaration_render(buf, ctx);
                if let Some(predicate) = &delete.where_clause {
                    buf.push_str(" where ");
                    predicate.render(buf, ctx);
                }
            }
        }
        buf
    }
}

impl Render for Statement {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        self.accept(&mut AliasReserver { ctx: &mut *ctx });
        self.ctes.render(buf, ctx);
        self.kind.render(buf, ctx)
    }

    /// Render with a fresh context configured from the builder's settings.
    fn query_string(&self) -> String {
        let mut buf = String::new();
        let mut ctx = RenderContext::with_settings(&self.builder.settings().render);
        self.render(&mut buf, &mut ctx);
        buf
    }
}
