#![allow(dead_code)]

use std::sync::{Arc, Once};

use querytree_lib::catalog::{DomainCatalog, EntityMetadata, ExpressibleType};
use querytree_lib::settings::TreeSettings;
use querytree_lib::tracing_utils::tracing_init;
use querytree_lib::tree::{
    Expression, FromClause, FromElement, NodeBuilder, Predicate, QueryExpr, QuerySpec, Selection,
    Statement,
};
use tracing::Level;

static TRACING_INIT: Once = Once::new();

/// Domain used across the integration tests.
///
/// - `Person` (id: long, name, age, active, tags: strings, address -> Address,
///   pets -> Pet)
/// - `Employee` (salary), a subclass of `Person` inheriting its attributes
/// - `Address` (id, city)
/// - `Pet` (id, name)
pub fn catalog() -> DomainCatalog {
    DomainCatalog::new()
        .with_entity(
            EntityMetadata::new("Person")
                .id("id", ExpressibleType::long())
                .basic("name", ExpressibleType::string())
                .basic("age", ExpressibleType::integer())
                .basic("active", ExpressibleType::boolean())
                .element_collection("tags", ExpressibleType::string())
                .to_one("address", "Address")
                .to_many("pets", "Pet"),
        )
        .with_entity(
            EntityMetadata::subclass("Employee", "Person")
                .basic("salary", ExpressibleType::big_decimal()),
        )
        .with_entity(
            EntityMetadata::new("Address")
                .id("id", ExpressibleType::long())
                .basic("city", ExpressibleType::string()),
        )
        .with_entity(
            EntityMetadata::new("Pet")
                .id("id", ExpressibleType::long())
                .basic("name", ExpressibleType::string()),
        )
}

pub fn builder() -> Arc<NodeBuilder> {
    builder_with(TreeSettings::default())
}

pub fn builder_with(settings: TreeSettings) -> Arc<NodeBuilder> {
    TRACING_INIT.call_once(|| tracing_init(Level::DEBUG));
    NodeBuilder::new(Arc::new(catalog()), Arc::new(settings))
}

/// `select <selections> from <root>` with no restriction.
pub fn query(root: &Arc<FromElement>, selections: Vec<Expression>) -> QueryExpr {
    let mut from = FromClause::new();
    from.root_add(Arc::clone(root)).unwrap();
    let mut spec = QuerySpec::new(from);
    for selection in selections {
        spec.selection_add(Selection::new(selection));
    }
    QueryExpr::new(spec)
}

/// `select <selections> from <root> where <restriction>` as a statement.
pub fn select(
    nb: &Arc<NodeBuilder>,
    root: &Arc<FromElement>,
    selections: Vec<Expression>,
    restriction: Option<Predicate>,
) -> Statement {
    let mut statement = nb.select_statement(query(root, selections));
    statement.apply_restriction(restriction).unwrap();
    statement
}
