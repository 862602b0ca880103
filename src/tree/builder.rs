//! Programmatic construction of statement trees.
//!
//! `NodeBuilder` binds node construction to a [`DomainCatalog`]: from-elements
//! and paths are resolved against the catalog so every node carries its
//! expressible type, and predicates are checked for comparability as they are
//! built. Statements created here are criteria statements.

use std::sync::Arc;

use ecow::EcoString;
use tracing::trace;

use crate::catalog::{DomainCatalog, ExpressibleType};
use crate::result::{MapIntoReport, ReportExt};
use crate::settings::TreeSettings;

use super::cte::CteHandle;
use super::expression::{
    ArithmeticExpr, ArithmeticOp, Expression, FunctionCall, Literal, Parameter, Path,
};
use super::from::{FromElement, FromKind, JoinType};
use super::predicate::{
    BetweenPredicate, BooleanExpressionPredicate, ComparisonOperator, ComparisonPredicate,
    EmptinessPredicate, ExistsPredicate, InListPredicate, InSubQueryPredicate, Junction,
    JunctionOperator, LikePredicate, MemberOfPredicate, NullnessPredicate, Predicate,
    TruthnessPredicate,
};
use super::query::QueryExpr;
use super::statement::{
    DeleteStatement, InsertSource, InsertStatement, QuerySource, SelectStatement, Statement,
    StatementKind, UpdateStatement,
};
use super::{TreeError, TreeResult};

#[derive(Debug)]
pub struct NodeBuilder {
    catalog: Arc<DomainCatalog>,
    settings: Arc<TreeSettings>,
}

impl NodeBuilder {
    pub fn new(catalog: Arc<DomainCatalog>, settings: Arc<TreeSettings>) -> Arc<Self> {
        Arc::new(Self { catalog, settings })
    }

    pub fn catalog(&self) -> &DomainCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    // from-elements

    /// `from Entity [alias]`
    pub fn root(
        &self,
        entity: &str,
        alias: Option<&str>,
    ) -> Result<Arc<FromElement>, TreeError> {
        let metadata = self
            .catalog
            .entity(entity)
            .ok_or_else(|| TreeError::UnknownEntity {
                name: entity.to_owned(),
            })?;
        Ok(Arc::new(FromElement::root_new(
            entity,
            metadata.entity_type(),
            alias,
        )))
    }

    /// `join lhs.attribute [alias]`
    pub fn join(
        &self,
        lhs: &Arc<FromElement>,
        attribute: &str,
        join_type: JoinType,
        alias: Option<&str>,
    ) -> Result<Arc<FromElement>, TreeError> {
        self.join_inner(lhs, attribute, join_type, false, alias)
    }

    /// `join fetch lhs.attribute [alias]`
    pub fn fetch_join(
        &self,
        lhs: &Arc<FromElement>,
        attribute: &str,
        join_type: JoinType,
        alias: Option<&str>,
    ) -> Result<Arc<FromElement>, TreeError> {
        self.join_inner(lhs, attribute, join_type, true, alias)
    }

    fn join_inner(
        &self,
        lhs: &Arc<FromElement>,
        attribute: &str,
        join_type: JoinType,
        fetch: bool,
        alias: Option<&str>,
    ) -> Result<Arc<FromElement>, TreeError> {
        let entity = lhs.entity().ok_or_else(|| TreeError::NotNavigable {
            name: lhs.describe().to_string(),
        })?;
        let resolved = self
            .catalog
            .attribute_resolve(entity, attribute)
            .ok_or_else(|| TreeError::UnknownAttribute {
                entity: entity.to_string(),
                attribute: attribute.to_owned(),
            })?;

        // joining a collection exposes its elements
        let value_type = if resolved.plural {
            resolved.attribute_type.element_type().cloned()
        } else {
            Some(resolved.attribute_type)
        };

        Ok(Arc::new(FromElement::join_new(
            Arc::clone(lhs),
            attribute,
            join_type,
            fetch,
            resolved.target_entity,
            value_type,
            alias,
        )))
    }

    /// `from cte [alias]`
    pub fn cte_root(&self, cte: &CteHandle, alias: Option<&str>) -> Arc<FromElement> {
        Arc::new(FromElement::cte_root_new(Arc::clone(cte.table()), alias))
    }

    // expressions

    /// `from.attribute`, typed from the catalog or the CTE's columns.
    pub fn path(&self, from: &Arc<FromElement>, attribute: &str) -> Result<Expression, TreeError> {
        if let FromKind::CteRoot { cte } = from.kind() {
            let column = cte
                .column(attribute)
                .ok_or_else(|| TreeError::UnknownAttribute {
                    entity: cte.name().to_string(),
                    attribute: attribute.to_owned(),
                })?;
            let column_type = column.column_type.clone();
            return Ok(Path::resolved(Some(Arc::clone(from)), attribute, column_type).into());
        }

        let entity = from.entity().ok_or_else(|| TreeError::NotNavigable {
            name: from.describe().to_string(),
        })?;
        let resolved = self
            .catalog
            .attribute_resolve(entity, attribute)
            .ok_or_else(|| TreeError::UnknownAttribute {
                entity: entity.to_string(),
                attribute: attribute.to_owned(),
            })?;
        trace!(%entity, attribute, resolved = %resolved.attribute_type, "path resolved");
        Ok(Path::new(Arc::clone(from), attribute, resolved.attribute_type).into())
    }

    /// A path rendered without qualifier, for single-root queries.
    pub fn unqualified_path(&self, attribute: &str, path_type: ExpressibleType) -> Expression {
        Path::unqualified(attribute, path_type).into()
    }

    /// The from-element itself as a value: `select p`.
    pub fn entity_reference(&self, from: &Arc<FromElement>) -> Expression {
        Expression::Entity(Arc::clone(from))
    }

    pub fn literal(&self, value: impl Into<Literal>) -> Expression {
        Expression::Literal(value.into())
    }

    pub fn null_literal(&self) -> Expression {
        Expression::Literal(Literal::null())
    }

    /// A named parameter. Keep the returned `Arc` to reference the same
    /// parameter from several places.
    pub fn parameter(&self, name: &str) -> Arc<Parameter> {
        Parameter::named(name)
    }

    pub fn positional_parameter(&self, position: u32) -> Arc<Parameter> {
        Parameter::positional(position)
    }

    pub fn function(
        &self,
        name: &str,
        args: Vec<Expression>,
        return_type: Option<ExpressibleType>,
    ) -> Expression {
        Expression::Function(FunctionCall::new(name, args, return_type))
    }

    pub fn count_star(&self) -> Expression {
        Expression::Function(FunctionCall::count_star())
    }

    pub fn arithmetic(
        &self,
        left: Expression,
        op: ArithmeticOp,
        right: Expression,
    ) -> Result<Expression, TreeError> {
        Ok(Expression::Arithmetic(ArithmeticExpr::new(left, op, right)?))
    }

    pub fn tuple(&self, items: Vec<Expression>) -> Expression {
        Expression::Tuple(items)
    }

    pub fn subquery(&self, query: QueryExpr) -> Expression {
        Expression::SubQuery(Box::new(query))
    }

    // predicates

    pub fn comparison(
        &self,
        left: Expression,
        operator: ComparisonOperator,
        right: Expression,
    ) -> Result<Predicate, TreeError> {
        Ok(ComparisonPredicate::new(left, operator, right)?.into())
    }

    pub fn equal(&self, left: Expression, right: Expression) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::Equal, right)
    }

    pub fn not_equal(&self, left: Expression, right: Expression) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::NotEqual, right)
    }

    pub fn less_than(&self, left: Expression, right: Expression) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::LessThan, right)
    }

    pub fn less_than_or_equal(
        &self,
        left: Expression,
        right: Expression,
    ) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::LessThanOrEqual, right)
    }

    pub fn greater_than(
        &self,
        left: Expression,
        right: Expression,
    ) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::GreaterThan, right)
    }

    pub fn greater_than_or_equal(
        &self,
        left: Expression,
        right: Expression,
    ) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::GreaterThanOrEqual, right)
    }

    pub fn distinct_from(
        &self,
        left: Expression,
        right: Expression,
    ) -> Result<Predicate, TreeError> {
        self.comparison(left, ComparisonOperator::DistinctFrom, right)
    }

    pub fn between(
        &self,
        expression: Expression,
        lower: Expression,
        upper: Expression,
    ) -> Result<Predicate, TreeError> {
        Ok(BetweenPredicate::new(expression, lower, upper)?.into())
    }

    pub fn like(
        &self,
        expression: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    ) -> Result<Predicate, TreeError> {
        Ok(LikePredicate::new(expression, pattern, escape, true)?.into())
    }

    pub fn ilike(
        &self,
        expression: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    ) -> Result<Predicate, TreeError> {
        Ok(LikePredicate::new(expression, pattern, escape, false)?.into())
    }

    pub fn in_list(
        &self,
        expression: Expression,
        values: Vec<Expression>,
    ) -> Result<Predicate, TreeError> {
        Ok(InListPredicate::new(expression, values)?.into())
    }

    pub fn in_subquery(
        &self,
        expression: Expression,
        subquery: QueryExpr,
    ) -> Result<Predicate, TreeError> {
        Ok(InSubQueryPredicate::new(expression, subquery)?.into())
    }

    pub fn exists(&self, subquery: QueryExpr) -> Predicate {
        ExistsPredicate::new(subquery).into()
    }

    pub fn is_null(&self, expression: Expression) -> Predicate {
        NullnessPredicate::new(expression).into()
    }

    pub fn is_not_null(&self, expression: Expression) -> Predicate {
        let mut predicate: Predicate = NullnessPredicate::new(expression).into();
        predicate.negate();
        predicate
    }

    pub fn is_true(&self, expression: Expression) -> Result<Predicate, TreeError> {
        Ok(TruthnessPredicate::new(expression, true)?.into())
    }

    pub fn is_false(&self, expression: Expression) -> Result<Predicate, TreeError> {
        Ok(TruthnessPredicate::new(expression, false)?.into())
    }

    pub fn member_of(
        &self,
        value: Expression,
        collection: Expression,
    ) -> Result<Predicate, TreeError> {
        Ok(MemberOfPredicate::new(value, collection)?.into())
    }

    pub fn is_empty(&self, collection: Expression) -> Result<Predicate, TreeError> {
        Ok(EmptinessPredicate::new(collection)?.into())
    }

    /// A boolean expression used as a predicate.
    pub fn wrap(&self, expression: Expression) -> Result<Predicate, TreeError> {
        Ok(BooleanExpressionPredicate::new(expression)?.into())
    }

    /// Always true: `1 = 1`
    pub fn conjunction(&self) -> Predicate {
        Predicate::constant(true)
    }

    /// Always false: `1 = 0`
    pub fn disjunction(&self) -> Predicate {
        Predicate::constant(false)
    }

    /// AND over `predicates`. No predicates yields [`Self::conjunction`], a
    /// single one is returned as is.
    pub fn and(&self, predicates: Vec<Predicate>) -> Result<Predicate, TreeError> {
        self.junction(JunctionOperator::And, predicates)
    }

    /// OR over `predicates`. No predicates yields [`Self::disjunction`], a
    /// single one is returned as is.
    pub fn or(&self, predicates: Vec<Predicate>) -> Result<Predicate, TreeError> {
        self.junction(JunctionOperator::Or, predicates)
    }

    fn junction(
        &self,
        operator: JunctionOperator,
        mut predicates: Vec<Predicate>,
    ) -> Result<Predicate, TreeError> {
        match predicates.len() {
            0 => Ok(match operator {
                JunctionOperator::And => self.conjunction(),
                JunctionOperator::Or => self.disjunction(),
            }),
            1 => Ok(predicates.remove(0)),
            _ => Ok(Junction::new(operator, predicates)?.into()),
        }
    }

    pub fn not(&self, predicate: &Predicate) -> Predicate {
        predicate.not()
    }

    pub fn grouped(&self, predicate: Predicate) -> Predicate {
        predicate.grouped()
    }

    // statements

    pub fn select_statement(self: &Arc<Self>, query: QueryExpr) -> Statement {
        self.statement(StatementKind::Select(SelectStatement::new(query)))
    }

    pub fn insert_statement(
        self: &Arc<Self>,
        target: Arc<FromElement>,
        target_paths: Vec<Path>,
        source: InsertSource,
    ) -> TreeResult<Statement> {
        let insert = InsertStatement::new(target, target_paths, source)
            .map_into_report::<TreeError>()
            .attach_loc("building insert")?;
        Ok(self.statement(StatementKind::Insert(insert)))
    }

    /// `update target set path = value, ...`
    pub fn update_statement(
        self: &Arc<Self>,
        target: Arc<FromElement>,
        versioned: bool,
        assignments: Vec<(Path, Expression)>,
    ) -> TreeResult<Statement> {
        let mut update = UpdateStatement::new(target, versioned)
            .map_into_report::<TreeError>()
            .attach_loc("building update")?;
        for (path, value) in assignments {
            let attribute: EcoString = path.attribute().clone();
            update
                .assignment_add(path, value)
                .map_into_report::<TreeError>()
                .attach_loc(format!("assigning '{attribute}'"))?;
        }
        Ok(self.statement(StatementKind::Update(update)))
    }

    pub fn delete_statement(self: &Arc<Self>, target: Arc<FromElement>) -> TreeResult<Statement> {
        let delete = DeleteStatement::new(target)
            .map_into_report::<TreeError>()
            .attach_loc("building delete")?;
        Ok(self.statement(StatementKind::Delete(delete)))
    }

    /// A statement produced by the query-text parser. Call
    /// [`Statement::parse_complete`] once the parser is done with it.
    pub fn hql_statement(self: &Arc<Self>, kind: StatementKind) -> Statement {
        Statement::new(Arc::clone(self), QuerySource::Hql, kind)
    }

    fn statement(self: &Arc<Self>, kind: StatementKind) -> Statement {
        Statement::new(Arc::clone(self), QuerySource::Criteria, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityMetadata;
    use crate::tree::Render;
    use crate::tree::from::FromClause;
    use crate::tree::query::{QuerySpec, Selection};

    fn builder() -> Arc<NodeBuilder> {
        let catalog = DomainCatalog::new()
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
                EntityMetadata::new("Address")
                    .id("id", ExpressibleType::long())
                    .basic("city", ExpressibleType::string()),
            )
            .with_entity(
                EntityMetadata::new("Pet")
                    .id("id", ExpressibleType::long())
                    .basic("name", ExpressibleType::string()),
            );
        NodeBuilder::new(Arc::new(catalog), Arc::new(TreeSettings::default()))
    }

    #[test]
    fn test_root_unknown_entity() {
        let nb = builder();
        let err = nb.root("Nope", None).unwrap_err();
        assert!(matches!(err, TreeError::UnknownEntity { .. }));
    }

    #[test]
    fn test_path_resolves_types() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let age = nb.path(&p, "age").unwrap();
        assert_eq!(age.expressible_type(), Some(ExpressibleType::integer()));

        let tags = nb.path(&p, "tags").unwrap();
        assert!(tags.is_plural());

        let err = nb.path(&p, "salary").unwrap_err();
        assert!(matches!(err, TreeError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_join_navigates_to_target() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let a = nb.join(&p, "address", JoinType::Left, Some("a")).unwrap();
        let city = nb.path(&a, "city").unwrap();
        assert_eq!(city.query_string(), "a.city");

        let pet = nb.join(&p, "pets", JoinType::Inner, None).unwrap();
        assert_eq!(pet.value_type(), Some(&ExpressibleType::entity("Pet", "Pet")));
        assert!(nb.path(&pet, "name").is_ok());

        let t = nb.join(&p, "tags", JoinType::Inner, None).unwrap();
        assert_eq!(t.value_type(), Some(&ExpressibleType::string()));
        let err = nb.path(&t, "anything").unwrap_err();
        assert!(matches!(err, TreeError::NotNavigable { .. }));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let a = nb.join(&p, "address", JoinType::Inner, Some("a")).unwrap();

        let err = nb
            .equal(nb.path(&p, "age").unwrap(), nb.literal("x"))
            .unwrap_err();
        assert!(matches!(err, TreeError::TypeIncompatible { .. }));

        let err = nb
            .equal(nb.literal(1), nb.entity_reference(&a))
            .unwrap_err();
        assert!(matches!(err, TreeError::TypeIncompatible { .. }));
    }

    #[test]
    fn test_parameter_inferred_from_string_path() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let name = nb.parameter("name");
        nb.equal(nb.path(&p, "name").unwrap(), name.clone().into())
            .unwrap();
        assert_eq!(name.expressible_type(), Some(&ExpressibleType::string()));
    }

    #[test]
    fn test_identifier_compares_with_entity_and_number() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        assert!(nb.equal(nb.path(&p, "id").unwrap(), nb.literal(5)).is_ok());
        assert!(
            nb.equal(nb.path(&p, "id").unwrap(), nb.entity_reference(&p))
                .is_ok()
        );
    }

    #[test]
    fn test_and_or_folding() {
        let nb = builder();
        assert_eq!(nb.and(Vec::new()).unwrap().query_string(), "1 = 1");
        assert_eq!(nb.or(Vec::new()).unwrap().query_string(), "1 = 0");

        let p = nb.root("Person", Some("p")).unwrap();
        let single = nb.is_null(nb.path(&p, "name").unwrap());
        assert_eq!(nb.and(vec![single]).unwrap().query_string(), "p.name is null");

        let both = nb
            .or(vec![
                nb.is_not_null(nb.path(&p, "name").unwrap()),
                nb.is_true(nb.path(&p, "active").unwrap()).unwrap(),
            ])
            .unwrap();
        assert_eq!(
            both.query_string(),
            "p.name is not null or p.active is true"
        );
    }

    #[test]
    fn test_collection_predicates() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let member = nb
            .member_of(nb.literal("vip"), nb.path(&p, "tags").unwrap())
            .unwrap();
        assert_eq!(member.query_string(), "'vip' member of p.tags");

        let err = nb
            .member_of(nb.literal("vip"), nb.path(&p, "name").unwrap())
            .unwrap_err();
        assert!(matches!(err, TreeError::NotPlural { .. }));

        let err = nb
            .equal(nb.path(&p, "tags").unwrap(), nb.literal("vip"))
            .unwrap_err();
        assert!(matches!(err, TreeError::MultiValuedPath { .. }));

        let empty = nb.is_empty(nb.path(&p, "pets").unwrap()).unwrap();
        assert_eq!(empty.not().query_string(), "p.pets is not empty");
    }

    #[test]
    fn test_cte_root_paths_use_columns() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let mut from = FromClause::new();
        from.root_add(p.clone()).unwrap();
        let mut spec = QuerySpec::new(from);
        spec.selection_add(Selection::aliased(nb.path(&p, "age").unwrap(), "years"));

        let mut statement = nb.select_statement(QueryExpr::new(spec.clone()));
        let handle = statement.with(QueryExpr::new(spec)).unwrap();
        let c = nb.cte_root(&handle, Some("c"));
        let years = nb.path(&c, "years").unwrap();
        assert_eq!(years.expressible_type(), Some(ExpressibleType::integer()));
        assert!(matches!(
            nb.path(&c, "age").unwrap_err(),
            TreeError::UnknownAttribute { .. }
        ));
    }

    #[test]
    fn test_update_statement_reports_assignment() {
        let nb = builder();
        let p = nb.root("Person", Some("p")).unwrap();
        let Expression::Path(age) = nb.path(&p, "age").unwrap() else {
            unreachable!()
        };
        let err = nb
            .update_statement(p, false, vec![(age, nb.literal("old"))])
            .unwrap_err();
        assert!(err.to_string().contains("assigning 'age'"));
    }

    #[test]
    fn test_statement_sources() {
        let nb = builder();
        let p = nb.root("Person", None).unwrap();
        let delete = nb.delete_statement(p.clone()).unwrap();
        assert_eq!(delete.source(), QuerySource::Criteria);

        let kind = StatementKind::Delete(DeleteStatement::new(p).unwrap());
        assert_eq!(nb.hql_statement(kind).source(), QuerySource::Hql);
    }
}
