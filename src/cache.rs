//! Published statement templates keyed by their rendered text.
//!
//! A statement handed to the cache is sealed behind an `Arc` and only ever
//! read again. Every hit returns a fresh copy the caller owns outright, so
//! rebinding literals or appending restrictions on the copy never reaches
//! the template.

use std::collections::BTreeMap;
use std::sync::Arc;

use ecow::EcoString;
use iddqd::{IdHashItem, IdHashMap, id_upcast};
use tracing::{debug, instrument};

use crate::settings::CacheSettings;
use crate::tree::{Render, Statement};

/// A statement that can no longer be mutated.
#[derive(Debug, Clone)]
pub struct PublishedStatement(Arc<Statement>);

impl PublishedStatement {
    pub fn new(statement: Statement) -> Self {
        Self(Arc::new(statement))
    }

    pub fn statement(&self) -> &Statement {
        &self.0
    }

    /// An independent, mutable copy of the template.
    pub fn copy(&self) -> Statement {
        self.0.copy()
    }

    pub fn query_string(&self) -> String {
        self.0.query_string()
    }
}

#[derive(Debug)]
struct CachedStatement {
    key: EcoString,
    /// Publication order, oldest first
    generation: u64,
    published: PublishedStatement,
}

impl IdHashItem for CachedStatement {
    type Key<'a> = &'a str;

    fn key(&self) -> Self::Key<'_> {
        self.key.as_str()
    }

    id_upcast!();
}

/// Bounded map from rendered query text to published statement.
///
/// When full, publishing evicts the oldest entry.
#[derive(Debug)]
pub struct StatementCache {
    entries: IdHashMap<CachedStatement>,
    generations: BTreeMap<u64, EcoString>,
    generation_counter: u64,
    capacity: usize,
}

impl StatementCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: IdHashMap::new(),
            generations: BTreeMap::new(),
            generation_counter: 0,
            capacity: settings.capacity.max(1),
        }
    }

    /// Seal `statement` and register it under its rendered text, replacing
    /// any entry with the same text.
    #[instrument(skip_all)]
    pub fn publish(&mut self, statement: Statement) -> PublishedStatement {
        let key = EcoString::from(statement.query_string());
        let published = PublishedStatement::new(statement);

        if let Some(previous) = self.entries.remove(key.as_str()) {
            self.generations.remove(&previous.generation);
        }
        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.generations.pop_first() else {
                break;
            };
            debug!(key = %oldest, "statement evicted");
            self.entries.remove(oldest.as_str());
        }

        self.generation_counter += 1;
        self.generations.insert(self.generation_counter, key.clone());
        debug!(%key, generation = self.generation_counter, "statement published");
        self.entries.insert_overwrite(CachedStatement {
            key,
            generation: self.generation_counter,
            published: published.clone(),
        });
        published
    }

    /// A fresh copy of the statement published under `key`.
    #[instrument(skip_all)]
    pub fn get(&self, key: &str) -> Option<Statement> {
        match self.entries.get(key) {
            Some(entry) => {
                debug!(key, "statement cache hit");
                Some(entry.published.copy())
            }
            None => {
                debug!(key, "statement cache miss");
                None
            }
        }
    }

    /// The sealed template itself, for read-only inspection.
    pub fn published(&self, key: &str) -> Option<&PublishedStatement> {
        self.entries.get(key).map(|entry| &entry.published)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DomainCatalog, EntityMetadata, ExpressibleType};
    use crate::settings::TreeSettings;
    use crate::tree::{FromClause, NodeBuilder, QueryExpr, QuerySpec};

    fn statement(age: i64) -> Statement {
        let catalog = DomainCatalog::new().with_entity(
            EntityMetadata::new("Person").basic("age", ExpressibleType::integer()),
        );
        let nb = NodeBuilder::new(Arc::new(catalog), Arc::new(TreeSettings::default()));
        let p = nb.root("Person", Some("p")).unwrap();
        let mut from = FromClause::new();
        from.root_add(p.clone()).unwrap();
        let mut statement = nb.select_statement(QueryExpr::new(QuerySpec::new(from)));
        let restriction = nb
            .equal(nb.path(&p, "age").unwrap(), nb.literal(age))
            .unwrap();
        statement.apply_restriction(Some(restriction)).unwrap();
        statement
    }

    #[test]
    fn test_publish_and_get_copy() {
        let mut cache = StatementCache::new(&CacheSettings::default());
        let published = cache.publish(statement(1));
        let key = published.query_string();
        assert_eq!(key, "from Person p where p.age = 1");

        let copy = cache.get(&key).unwrap();
        assert_eq!(copy.query_string(), key);
        assert!(cache.get("from Person p").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_mutating_copy_leaves_template() {
        let mut cache = StatementCache::new(&CacheSettings::default());
        let key = cache.publish(statement(1)).query_string();

        let mut copy = cache.get(&key).unwrap();
        let literal = copy
            .restriction_mut()
            .and_then(|p| p.as_comparison_mut())
            .and_then(|c| c.right_mut().as_literal_mut())
            .unwrap();
        literal.set_value(crate::tree::LiteralValue::Integer(2));

        assert_eq!(copy.query_string(), "from Person p where p.age = 2");
        assert_eq!(
            cache.published(&key).unwrap().query_string(),
            "from Person p where p.age = 1"
        );
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let mut cache = StatementCache::new(&CacheSettings { capacity: 2 });
        let first = cache.publish(statement(1)).query_string();
        let second = cache.publish(statement(2)).query_string();
        let third = cache.publish(statement(3)).query_string();

        assert_eq!(cache.len(), 2);
        assert!(cache.published(&first).is_none());
        assert!(cache.published(&second).is_some());
        assert!(cache.published(&third).is_some());
    }

    #[test]
    fn test_republish_refreshes_entry() {
        let mut cache = StatementCache::new(&CacheSettings { capacity: 2 });
        let first = cache.publish(statement(1)).query_string();
        let second = cache.publish(statement(2)).query_string();
        cache.publish(statement(1));
        cache.publish(statement(3));

        assert!(cache.published(&first).is_some());
        assert!(cache.published(&second).is_none());
    }
}
