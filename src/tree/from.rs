use std::sync::Arc;

use ecow::EcoString;

use crate::catalog::ExpressibleType;

use super::cte::CteTable;
use super::node::{CopyContext, CopyNode, NodeId, SharedNode};
use super::predicate::Predicate;
use super::render::{RenderContext, identifier_append};
use super::{Render, TreeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone)]
pub enum FromKind {
    /// `from Person p`
    Root { entity: EcoString },
    /// `join p.address a`
    Join {
        lhs: Arc<FromElement>,
        attribute: EcoString,
        join_type: JoinType,
        fetch: bool,
    },
    /// `from cte c`
    CteRoot { cte: Arc<CteTable> },
}

/// A from-element: something paths can be rooted at.
///
/// From-elements are shared: a path in the select list, one in the
/// restriction and a correlated subquery can all point at the same element,
/// and rendering resolves all of them to the same alias.
#[derive(Debug)]
pub struct FromElement {
    id: NodeId,
    kind: FromKind,
    alias: Option<EcoString>,
    /// Entity whose attributes paths rooted here resolve against
    entity: Option<EcoString>,
    value_type: Option<ExpressibleType>,
}

impl FromElement {
    pub fn root_new(entity: &str, entity_type: ExpressibleType, alias: Option<&str>) -> Self {
        Self {
            id: NodeId::next(),
            kind: FromKind::Root {
                entity: EcoString::from(entity),
            },
            alias: alias.map(EcoString::from),
            entity: Some(EcoString::from(entity)),
            value_type: Some(entity_type),
        }
    }

    pub fn join_new(
        lhs: Arc<FromElement>,
        attribute: &str,
        join_type: JoinType,
        fetch: bool,
        target: Option<EcoString>,
        value_type: Option<ExpressibleType>,
        alias: Option<&str>,
    ) -> Self {
        Self {
            id: NodeId::next(),
            kind: FromKind::Join {
                lhs,
                attribute: EcoString::from(attribute),
                join_type,
                fetch,
            },
            alias: alias.map(EcoString::from),
            entity: target,
            value_type,
        }
    }

    pub fn cte_root_new(cte: Arc<CteTable>, alias: Option<&str>) -> Self {
        Self {
            id: NodeId::next(),
            kind: FromKind::CteRoot { cte },
            alias: alias.map(EcoString::from),
            entity: None,
            value_type: None,
        }
    }

    pub fn kind(&self) -> &FromKind {
        &self.kind
    }

    pub fn alias(&self) -> Option<&EcoString> {
        self.alias.as_ref()
    }

    pub fn entity(&self) -> Option<&EcoString> {
        self.entity.as_ref()
    }

    /// Type of the element when used as a value (`select p`).
    pub fn value_type(&self) -> Option<&ExpressibleType> {
        self.value_type.as_ref()
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, FromKind::Root { .. })
    }

    /// Identity of the root this element is (transitively) joined to.
    pub fn root_id(&self) -> NodeId {
        match &self.kind {
            FromKind::Join { lhs, .. } => lhs.root_id(),
            FromKind::Root { .. } | FromKind::CteRoot { .. } => self.id,
        }
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> EcoString {
        match &self.kind {
            FromKind::Root { entity } => entity.clone(),
            FromKind::Join { attribute, .. } => attribute.clone(),
            FromKind::CteRoot { cte } => cte.name().clone(),
        }
    }

    /// Render the declaration form used inside a from clause.
    pub(crate) fn declaration_render<'b>(
        &self,
        buf: &'b mut String,
        ctx: &mut RenderContext,
    ) -> &'b mut String {
        match &self.kind {
            FromKind::Root { entity } => {
                identifier_append(buf, entity);
            }
            FromKind::CteRoot { cte } => {
                identifier_append(buf, cte.name());
            }
            FromKind::Join {
                lhs,
                attribute,
                join_type,
                fetch,
            } => {
                match join_type {
                    JoinType::Inner => buf.push_str("join "),
                    JoinType::Left => buf.push_str("left join "),
                    JoinType::Right => buf.push_str("right join "),
                    JoinType::Full => buf.push_str("full join "),
                }
                if *fetch {
                    buf.push_str("fetch ");
                }
                lhs.render(buf, ctx);
                buf.push('.');
                identifier_append(buf, attribute);
            }
        }
        buf.push(' ');
        let alias = ctx.resolve_alias(self);
        identifier_append(buf, &alias)
    }
}

impl SharedNode for FromElement {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl CopyNode for FromKind {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        match self {
            FromKind::Root { entity } => FromKind::Root {
                entity: entity.clone(),
            },
            FromKind::Join {
                lhs,
                attribute,
                join_type,
                fetch,
            } => FromKind::Join {
                lhs: lhs.copy_node(ctx),
                attribute: attribute.clone(),
                join_type: *join_type,
                fetch: *fetch,
            },
            FromKind::CteRoot { cte } => FromKind::CteRoot {
                cte: cte.copy_node(ctx),
            },
        }
    }
}

impl CopyNode for Arc<FromElement> {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        ctx.copy_shared(self, |from, ctx| FromElement {
            id: NodeId::next(),
            kind: from.kind.copy_node(ctx),
            alias: from.alias.clone(),
            entity: from.entity.clone(),
            value_type: from.value_type.clone(),
        })
    }
}

/// Rendered as a reference: the element's alias.
impl Render for FromElement {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        let alias = ctx.resolve_alias(self);
        identifier_append(buf, &alias)
    }
}

#[derive(Debug, Clone)]
pub struct JoinEntry {
    pub join: Arc<FromElement>,
    pub on: Option<Predicate>,
}

/// A root and the joins hanging off it, in declaration order.
#[derive(Debug, Clone)]
pub struct RootEntry {
    pub root: Arc<FromElement>,
    pub joins: Vec<JoinEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct FromClause {
    roots: Vec<RootEntry>,
}

impl FromClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[RootEntry] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn root_add(&mut self, root: Arc<FromElement>) -> Result<(), TreeError> {
        if let FromKind::Join { attribute, .. } = root.kind() {
            return Err(TreeError::UnknownFromElement {
                name: attribute.to_string(),
            });
        }
        self.roots.push(RootEntry {
            root,
            joins: Vec::new(),
        });
        Ok(())
    }

    /// Attach a join under the root it navigates from.
    pub fn join_add(
        &mut self,
        join: Arc<FromElement>,
        on: Option<Predicate>,
    ) -> Result<(), TreeError> {
        let root_id = join.root_id();
        let entry = self
            .roots
            .iter_mut()
            .find(|entry| entry.root.node_id() == root_id && join.node_id() != root_id)
            .ok_or_else(|| TreeError::UnknownFromElement {
                name: join.describe().to_string(),
            })?;
        entry.joins.push(JoinEntry { join, on });
        Ok(())
    }

    /// All from-elements declared here: roots followed by their joins.
    pub fn elements(&self) -> impl Iterator<Item = &Arc<FromElement>> {
        self.roots.iter().flat_map(|entry| {
            std::iter::once(&entry.root).chain(entry.joins.iter().map(|j| &j.join))
        })
    }
}

impl CopyNode for FromClause {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        let roots = self
            .roots
            .iter()
            .map(|entry| RootEntry {
                root: entry.root.copy_node(ctx),
                joins: entry
                    .joins
                    .iter()
                    .map(|j| JoinEntry {
                        join: j.join.copy_node(ctx),
                        on: j.on.copy_node(ctx),
                    })
                    .collect(),
            })
            .collect();
        FromClause { roots }
    }
}

impl Render for FromClause {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        buf.push_str("from ");
        let mut sep = "";
        for entry in &self.roots {
            buf.push_str(sep);
            entry.root.declaration_render(buf, ctx);
            for join in &entry.joins {
                buf.push(' ');
                join.join.declaration_render(buf, ctx);
                if let Some(on) = &join.on {
                    buf.push_str(" on ");
                    on.render(buf, ctx);
                }
            }
            sep = ", ";
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(alias: Option<&str>) -> Arc<FromElement> {
        Arc::new(FromElement::root_new(
            "Person",
            ExpressibleType::entity("Person", "Person"),
            alias,
        ))
    }

    fn address_join(lhs: &Arc<FromElement>, alias: Option<&str>) -> Arc<FromElement> {
        Arc::new(FromElement::join_new(
            lhs.clone(),
            "address",
            JoinType::Left,
            false,
            Some(EcoString::from("Address")),
            Some(ExpressibleType::entity("Address", "Address")),
            alias,
        ))
    }

    #[test]
    fn test_from_clause_render() {
        let p = person(Some("p"));
        let a = address_join(&p, Some("a"));
        let mut from = FromClause::new();
        from.root_add(p).unwrap();
        from.join_add(a, None).unwrap();

        assert_eq!(from.query_string(), "from Person p left join p.address a");
    }

    #[test]
    fn test_from_clause_generated_aliases() {
        let p = person(None);
        let a = address_join(&p, None);
        let mut from = FromClause::new();
        from.root_add(p).unwrap();
        from.join_add(a, None).unwrap();

        assert_eq!(
            from.query_string(),
            "from Person alias_1 left join alias_1.address alias_2"
        );
    }

    #[test]
    fn test_join_add_unknown_root() {
        let p = person(Some("p"));
        let other = person(Some("o"));
        let a = address_join(&other, None);
        let mut from = FromClause::new();
        from.root_add(p).unwrap();

        let err = from.join_add(a, None).unwrap_err();
        assert!(matches!(err, TreeError::UnknownFromElement { .. }));
    }

    #[test]
    fn test_root_add_rejects_join() {
        let p = person(Some("p"));
        let a = address_join(&p, None);
        let mut from = FromClause::new();
        assert!(from.root_add(a).is_err());
    }

    #[test]
    fn test_copy_keeps_join_pointing_at_copied_root() {
        let p = person(Some("p"));
        let a = address_join(&p, Some("a"));
        let mut from = FromClause::new();
        from.root_add(p.clone()).unwrap();
        from.join_add(a, None).unwrap();

        let copy = from.copy_node(&mut CopyContext::new());
        let root = &copy.roots()[0].root;
        let join = &copy.roots()[0].joins[0].join;

        assert!(!Arc::ptr_eq(root, &p));
        let FromKind::Join { lhs, .. } = join.kind() else {
            panic!("expected join");
        };
        assert!(Arc::ptr_eq(lhs, root));
        assert_eq!(join.root_id(), root.node_id());
    }
}
