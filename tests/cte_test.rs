#![allow(clippy::indexing_slicing)]
#![allow(clippy::unwrap_used)]

//! Common table expressions registered through a statement.
//!
//! Patterns covered:
//! - generated names: `with var_1 as (...) select ... from var_1`
//! - explicit names, including invalid and duplicate ones
//! - recursive unions selecting from themselves
//! - copies of statements holding CTEs

use std::sync::Arc;

use querytree_lib::settings::{CteSettings, TreeSettings};
use querytree_lib::tree::{
    CteHandle, CteMaterialization, FromClause, FromKind, QueryExpr, QuerySpec, Render, Selection,
    Statement, StatementKind,
};

use crate::util::{builder, builder_with, query};

mod util;

/// Point the statement's select at `from <cte> c` selecting `columns`.
fn select_from_cte(statement: &mut Statement, handle: &CteHandle, columns: &[&str]) {
    let nb = Arc::clone(statement.builder());
    let c = nb.cte_root(handle, Some("c"));
    let mut from = FromClause::new();
    from.root_add(Arc::clone(&c)).unwrap();
    let mut spec = QuerySpec::new(from);
    for column in columns {
        spec.selection_add(Selection::new(nb.path(&c, column).unwrap()));
    }
    let StatementKind::Select(select) = statement.kind_mut() else {
        unreachable!()
    };
    *select.query_mut() = QueryExpr::new(spec);
}

/// Pattern: `with var_1 as (select ...) select c.name from var_1 c`
///
/// Verifies:
/// - unnamed registrations are named `var_1`, `var_2`, ...
/// - CTE columns are typed from the selections
#[test]
fn test_generated_names() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));

    let people = query(
        &p,
        vec![nb.path(&p, "name").unwrap(), nb.path(&p, "age").unwrap()],
    );
    let first = statement.with(people.clone()).unwrap();
    let second = statement.with(people).unwrap();
    assert_eq!(first.name(), "var_1");
    assert_eq!(second.name(), "var_2");
    assert_eq!(statement.ctes().len(), 2);

    select_from_cte(&mut statement, &first, &["name"]);
    let text = statement.query_string();
    assert!(text.starts_with("with var_1 as (select p.name, p.age from Person p), var_2 as ("));
    assert!(text.ends_with(") select c.name from var_1 c"));
}

/// Pattern: `with var_1 as (...), var_2 as (...) ...` where `var_1` was
/// registered by name first.
///
/// Verifies an unnamed registration never fails on a name the statement
/// already holds.
#[test]
fn test_generated_name_skips_registered() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));
    let people = query(&p, vec![nb.path(&p, "name").unwrap()]);

    statement.with_named("var_1", people.clone()).unwrap();
    let generated = statement.with(people).unwrap();
    assert_eq!(generated.name(), "var_2");
    assert_eq!(statement.ctes().len(), 2);
}

/// Verifies the generated prefix comes from settings.
#[test]
fn test_generated_name_prefix_setting() {
    let nb = builder_with(TreeSettings {
        cte: CteSettings {
            auto_name_prefix: "cte".to_owned(),
        },
        ..TreeSettings::default()
    });
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));
    let handle = statement
        .with(query(&p, vec![nb.path(&p, "id").unwrap()]))
        .unwrap();
    assert_eq!(handle.name(), "cte1");
}

/// Verifies:
/// - names must start with a letter
/// - a name can only be registered once
/// - failed registrations leave the container unchanged
#[test]
fn test_named_registration_errors() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));
    let people = query(&p, vec![nb.path(&p, "name").unwrap()]);

    let err = statement.with_named("1abc", people.clone()).unwrap_err();
    assert!(
        err.to_string()
            .contains("CTE name '1abc' must be non-empty and start with an alphabetic character")
    );
    assert!(statement.with_named("", people.clone()).is_err());
    assert!(statement.ctes().is_empty());

    statement.with_named("people", people.clone()).unwrap();
    let err = statement.with_named("people", people).unwrap_err();
    assert!(
        err.to_string()
            .contains("CTE with name 'people' is already registered")
    );
    assert_eq!(statement.ctes().len(), 1);
}

/// Pattern: `with tree as (select ... union all select ... from tree t) ...`
///
/// Verifies:
/// - the producer receives a handle to the CTE being defined
/// - `distinct` selects `union` over `union all`
#[test]
fn test_recursive_union() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));

    let base = query(
        &p,
        vec![nb.path(&p, "id").unwrap(), nb.path(&p, "name").unwrap()],
    );
    let producer_nb = Arc::clone(&nb);
    let handle = statement
        .with_recursive_union_named("tree", base, true, |me| {
            let t = producer_nb.cte_root(me, Some("t"));
            let mut from = FromClause::new();
            from.root_add(Arc::clone(&t)).unwrap();
            let mut spec = QuerySpec::new(from);
            spec.selection_add(Selection::new(producer_nb.path(&t, "id")?));
            spec.selection_add(Selection::new(producer_nb.path(&t, "name")?));
            Ok(QueryExpr::new(spec))
        })
        .unwrap();

    assert!(statement.ctes().get("tree").unwrap().is_recursive());
    select_from_cte(&mut statement, &handle, &["id"]);
    assert_eq!(
        statement.query_string(),
        "with tree as (select p.id, p.name from Person p \
         union select t.id, t.name from tree t) select c.id from tree c"
    );
}

/// Verifies a producer error propagates and registers nothing.
#[test]
fn test_recursive_union_producer_error() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));

    let producer_nb = Arc::clone(&nb);
    let err = statement
        .with_recursive_union(
            query(&p, vec![nb.path(&p, "id").unwrap()]),
            false,
            |me| {
                let t = producer_nb.cte_root(me, None);
                producer_nb.path(&t, "salary")?;
                unreachable!()
            },
        )
        .unwrap_err();
    assert!(err.to_string().contains("Attribute 'salary' not found on 'var_1'"));
    assert!(statement.ctes().is_empty());
}

/// Verifies materialization hints render and survive a copy.
#[test]
fn test_materialization_hint() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));
    let handle = statement
        .with_named("people", query(&p, vec![nb.path(&p, "name").unwrap()]))
        .unwrap();
    statement
        .ctes_mut()
        .get_mut("people")
        .unwrap()
        .materialization_set(CteMaterialization::NotMaterialized);
    select_from_cte(&mut statement, &handle, &["name"]);

    let expected = "with people as not materialized (select p.name from Person p) \
                    select c.name from people c";
    assert_eq!(statement.query_string(), expected);
    assert_eq!(statement.copy().query_string(), expected);
}

/// Verifies a copied statement's CTE references point at the copied tables.
#[test]
fn test_copy_rebinds_cte_references() {
    let nb = builder();
    let p = nb.root("Person", Some("p")).unwrap();
    let mut statement = nb.select_statement(query(&p, Vec::new()));
    let handle = statement
        .with(query(&p, vec![nb.path(&p, "name").unwrap()]))
        .unwrap();
    select_from_cte(&mut statement, &handle, &["name"]);

    let copy = statement.copy();
    let copied_table = copy.ctes().get("var_1").unwrap().table();
    assert!(!Arc::ptr_eq(copied_table, handle.table()));

    let StatementKind::Select(select) = copy.kind() else {
        unreachable!()
    };
    let from_table = match select.query().first_spec().from.roots()[0].root.kind() {
        FromKind::CteRoot { cte } => Arc::clone(cte),
        other => panic!("unexpected from element {other:?}"),
    };
    assert!(Arc::ptr_eq(&from_table, copied_table));
    assert_eq!(copy.query_string(), statement.query_string());
}
