use std::sync::Arc;

use ecow::{EcoString, eco_format};
use tracing::debug;

use crate::catalog::ExpressibleType;

use super::node::{CopyContext, CopyNode, NodeId, SharedNode};
use super::query::QueryExpr;
use super::render::{RenderContext, identifier_append};
use super::{Render, TreeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteColumn {
    pub name: EcoString,
    pub column_type: Option<ExpressibleType>,
}

/// The relation a CTE exposes to the rest of the statement.
///
/// Shared between the CTE definition and every from-element that selects
/// from it, including the self-reference inside a recursive body.
#[derive(Debug)]
pub struct CteTable {
    id: NodeId,
    name: EcoString,
    columns: Vec<CteColumn>,
}

impl CteTable {
    fn new(name: EcoString, columns: Vec<CteColumn>) -> Self {
        Self {
            id: NodeId::next(),
            name,
            columns,
        }
    }

    pub fn name(&self) -> &EcoString {
        &self.name
    }

    pub fn columns(&self) -> &[CteColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&CteColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl SharedNode for CteTable {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl CopyNode for Arc<CteTable> {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        ctx.copy_shared(self, |table, _| {
            CteTable::new(table.name.clone(), table.columns.clone())
        })
    }
}

/// Reference to a registered CTE, used to select from it.
#[derive(Debug, Clone)]
pub struct CteHandle(Arc<CteTable>);

impl CteHandle {
    pub fn name(&self) -> &EcoString {
        self.0.name()
    }

    pub fn table(&self) -> &Arc<CteTable> {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CteMaterialization {
    /// No keyword, the database decides
    #[default]
    Default,
    Materialized,
    NotMaterialized,
}

#[derive(Debug, Clone)]
pub enum CteBody {
    Simple(QueryExpr),
    /// `base union [all] recursive`, where `recursive` selects from the CTE
    /// itself.
    Recursive {
        base: QueryExpr,
        recursive: QueryExpr,
        distinct: bool,
    },
}

#[derive(Debug, Clone)]
pub struct CteDefinition {
    table: Arc<CteTable>,
    body: CteBody,
    materialization: CteMaterialization,
}

impl CteDefinition {
    pub fn name(&self) -> &EcoString {
        self.table.name()
    }

    pub fn table(&self) -> &Arc<CteTable> {
        &self.table
    }

    pub fn handle(&self) -> CteHandle {
        CteHandle(self.table.clone())
    }

    pub fn body(&self) -> &CteBody {
        &self.body
    }

    pub fn is_recursive(&self) -> bool {
        matches!(self.body, CteBody::Recursive { .. })
    }

    pub fn materialization(&self) -> CteMaterialization {
        self.materialization
    }

    pub fn materialization_set(&mut self, materialization: CteMaterialization) {
        self.materialization = materialization;
    }
}

impl CopyNode for CteDefinition {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        // Register the table before the body so the body's self-reference
        // resolves to this copy.
        let table = self.table.copy_node(ctx);
        let body = match &self.body {
            CteBody::Simple(query) => CteBody::Simple(query.copy_node(ctx)),
            CteBody::Recursive {
                base,
                recursive,
                distinct,
            } => CteBody::Recursive {
                base: base.copy_node(ctx),
                recursive: recursive.copy_node(ctx),
                distinct: *distinct,
            },
        };
        CteDefinition {
            table,
            body,
            materialization: self.materialization,
        }
    }
}

impl Render for CteDefinition {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        identifier_append(buf, self.name());
        buf.push_str(" as ");
        match self.materialization {
            CteMaterialization::Default => {}
            CteMaterialization::Materialized => buf.push_str("materialized "),
            CteMaterialization::NotMaterialized => buf.push_str("not materialized "),
        }
        buf.push('(');
        match &self.body {
            CteBody::Simple(query) => {
                query.render(buf, ctx);
            }
            CteBody::Recursive {
                base,
                recursive,
                distinct,
            } => {
                base.render(buf, ctx);
                buf.push_str(if *distinct { " union " } else { " union all " });
                recursive.render(buf, ctx);
            }
        }
        buf.push(')');
        buf
    }
}

/// A CTE name must be non-empty and start with a letter.
fn name_check(name: &str) -> Result<(), TreeError> {
    match name.chars().next() {
        Some(first) if first.is_alphabetic() => Ok(()),
        _ => Err(TreeError::InvalidCteName {
            name: name.to_owned(),
        }),
    }
}

fn columns_derive(query: &QueryExpr) -> Vec<CteColumn> {
    query
        .selections()
        .iter()
        .enumerate()
        .map(|(i, selection)| CteColumn {
            name: selection
                .column_name()
                .unwrap_or_else(|| eco_format!("c{}", i + 1)),
            column_type: selection.expression.expressible_type(),
        })
        .collect()
}

/// The CTEs of one statement, in registration order.
#[derive(Debug, Clone)]
pub struct CteContainer {
    definitions: Vec<CteDefinition>,
    auto_prefix: EcoString,
    counter: u32,
}

impl CteContainer {
    pub fn new(auto_prefix: &str) -> Self {
        Self {
            definitions: Vec::new(),
            auto_prefix: EcoString::from(auto_prefix),
            counter: 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<&CteDefinition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CteDefinition> {
        self.definitions.iter_mut().find(|d| d.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CteDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Next generated name, skipping names already registered.
    fn name_generate(&mut self) -> EcoString {
        loop {
            self.counter += 1;
            let candidate = eco_format!("{}{}", self.auto_prefix, self.counter);
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }

    fn duplicate_check(&self, name: &str) -> Result<(), TreeError> {
        if self.get(name).is_some() {
            return Err(TreeError::DuplicateCte {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn definition_add(&mut self, definition: CteDefinition) -> CteHandle {
        debug!(
            name = %definition.name(),
            recursive = definition.is_recursive(),
            "cte registered"
        );
        let handle = definition.handle();
        self.definitions.push(definition);
        handle
    }

    /// Register `query` under a generated name.
    pub fn with(&mut self, query: QueryExpr) -> Result<CteHandle, TreeError> {
        let name = self.name_generate();
        self.with_named(&name, query)
    }

    pub fn with_named(&mut self, name: &str, query: QueryExpr) -> Result<CteHandle, TreeError> {
        name_check(name)?;
        self.duplicate_check(name)?;
        let table = Arc::new(CteTable::new(EcoString::from(name), columns_derive(&query)));
        Ok(self.definition_add(CteDefinition {
            table,
            body: CteBody::Simple(query),
            materialization: CteMaterialization::Default,
        }))
    }

    /// Register a recursive CTE under a generated name.
    pub fn with_recursive_union<F>(
        &mut self,
        base: QueryExpr,
        distinct: bool,
        producer: F,
    ) -> Result<CteHandle, TreeError>
    where
        F: FnOnce(&CteHandle) -> Result<QueryExpr, TreeError>,
    {
        let name = self.name_generate();
        self.with_recursive_union_named(&name, base, distinct, producer)
    }

    /// Register `base union [all] producer(self)`.
    ///
    /// The CTE's columns come from `base`, and `producer` receives a handle
    /// to the CTE itself so the recursive part can select from it.
    pub fn with_recursive_union_named<F>(
        &mut self,
        name: &str,
        base: QueryExpr,
        distinct: bool,
        producer: F,
    ) -> Result<CteHandle, TreeError>
    where
        F: FnOnce(&CteHandle) -> Result<QueryExpr, TreeError>,
    {
        name_check(name)?;
        self.duplicate_check(name)?;
        let table = Arc::new(CteTable::new(EcoString::from(name), columns_derive(&base)));
        let handle = CteHandle(table.clone());
        let recursive = producer(&handle)?;
        Ok(self.definition_add(CteDefinition {
            table,
            body: CteBody::Recursive {
                base,
                recursive,
                distinct,
            },
            materialization: CteMaterialization::Default,
        }))
    }
}

impl CopyNode for CteContainer {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        CteContainer {
            definitions: self.definitions.copy_node(ctx),
            auto_prefix: self.auto_prefix.clone(),
            counter: self.counter,
        }
    }
}

impl Render for CteContainer {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        if self.definitions.is_empty() {
            return buf;
        }
        buf.push_str("with ");
        let mut sep = "";
        for definition in &self.definitions {
            buf.push_str(sep);
            definition.render(buf, ctx);
            sep = ", ";
        }
        buf.push(' ');
        buf
    }
}
