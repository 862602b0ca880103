#![allow(clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use querytree_lib::cache::StatementCache;
use querytree_lib::catalog::{DomainCatalog, EntityMetadata, ExpressibleType};
use querytree_lib::settings::{CacheSettings, TreeSettings};
use querytree_lib::tree::{
    FromClause, JoinType, NodeBuilder, QueryExpr, QuerySpec, Render, Selection, Statement,
};

fn builder() -> Arc<NodeBuilder> {
    let catalog = DomainCatalog::new()
        .with_entity(
            EntityMetadata::new("Person")
                .id("id", ExpressibleType::long())
                .basic("name", ExpressibleType::string())
                .basic("age", ExpressibleType::integer())
                .to_one("address", "Address"),
        )
        .with_entity(
            EntityMetadata::new("Address")
                .id("id", ExpressibleType::long())
                .basic("city", ExpressibleType::string()),
        );
    NodeBuilder::new(Arc::new(catalog), Arc::new(TreeSettings::default()))
}

/// `select p.name, a.city ... from Person p join p.address a where
/// p.age > :min_0 and ... or a.city = :city` with `width` restriction terms,
/// every parameter used twice.
fn wide_statement(width: usize) -> Statement {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let a = nb.join(&p, "address", JoinType::Inner, Some("a")).unwrap();

    let mut from = FromClause::new();
    from.root_add(Arc::clone(&p)).unwrap();
    from.join_add(Arc::clone(&a), None).unwrap();
    let mut spec = QuerySpec::new(from);
    spec.selection_add(Selection::new(nb.path(&p, "name").unwrap()));
    spec.selection_add(Selection::new(nb.path(&a, "city").unwrap()));

    let mut terms = Vec::with_capacity(width);
    for i in 0..width {
        let param = nb.parameter(&format!("min_{i}"));
        let lower = nb
            .greater_than(nb.path(&p, "age").unwrap(), Arc::clone(&param).into())
            .unwrap();
        let upper = nb
            .less_than(nb.path(&p, "id").unwrap(), param.into())
            .unwrap();
        terms.push(nb.and(vec![lower, upper]).unwrap());
    }
    let city = nb
        .equal(nb.path(&a, "city").unwrap(), nb.parameter("city").into())
        .unwrap();
    terms.push(city);
    spec.restriction_set(Some(nb.or(terms).unwrap()));

    nb.select_statement(QueryExpr::new(spec))
}

fn statement_copy_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Statement Copy");

    for width in [1usize, 8, 64] {
        let statement = wide_statement(width);
        group.bench_with_input(BenchmarkId::new("copy", width), &statement, |b, statement| {
            b.iter(|| black_box(statement.copy()))
        });
    }

    let mut cache = StatementCache::new(&CacheSettings::default());
    let key = cache.publish(wide_statement(8)).query_string();
    group.bench_function("cache_get", |b| {
        b.iter(|| black_box(cache.get(black_box(&key)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, statement_copy_benchmarks);
criterion_main!(benches);
