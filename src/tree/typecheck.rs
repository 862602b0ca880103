//! Type compatibility checks run when predicates and expressions are built.
//!
//! All checks are decided from `ExpressibleType` alone. An operand without a
//! type (an unbound parameter, a `null` literal) is compatible with anything
//! and adopts the type of its counterpart.

use tracing::trace;

use crate::catalog::{ExpressibleType, TypeKind};

use super::expression::{Expression, Path};
use super::{Render, TreeError};

/// Symmetric comparability of two known types.
pub fn types_comparable(left: &ExpressibleType, right: &ExpressibleType) -> bool {
    if left == right {
        return true;
    }

    match (&left.kind, &right.kind) {
        (TypeKind::Collection { .. }, _) | (_, TypeKind::Collection { .. }) => false,

        (TypeKind::Entity { hierarchy: l }, TypeKind::Entity { hierarchy: r }) => l == r,
        (TypeKind::Entity { hierarchy: e }, TypeKind::Identifier { hierarchy: i, .. })
        | (TypeKind::Identifier { hierarchy: i, .. }, TypeKind::Entity { hierarchy: e }) => e == i,
        (TypeKind::Entity { .. }, _) | (_, TypeKind::Entity { .. }) => false,

        (
            TypeKind::Identifier {
                hierarchy: lh,
                underlying: lu,
            },
            TypeKind::Identifier {
                hierarchy: rh,
                underlying: ru,
            },
        ) => lh == rh || types_comparable(lu, ru),
        (TypeKind::Identifier { underlying, .. }, _) => types_comparable(underlying, right),
        (_, TypeKind::Identifier { underlying, .. }) => types_comparable(left, underlying),

        // Same basic family
        (l, r) => l == r,
    }
}

/// Whether a value of `value` type can be stored in a path of `target` type.
///
/// Narrower than comparability for entities: the value must belong to the
/// target's hierarchy, identifiers are not accepted in place of entities.
fn type_assignable(target: &ExpressibleType, value: &ExpressibleType) -> bool {
    match (&target.kind, &value.kind) {
        (TypeKind::Entity { hierarchy: t }, TypeKind::Entity { hierarchy: v }) => t == v,
        (TypeKind::Entity { .. }, _) | (_, TypeKind::Entity { .. }) => false,
        _ => types_comparable(target, value),
    }
}

fn is_null_literal(expr: &Expression) -> bool {
    matches!(expr, Expression::Literal(lit) if lit.is_null())
}

fn type_name(expr: &Expression) -> String {
    expr.expressible_type()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Check two operands of a binary predicate.
///
/// Tuples must have the same arity and are checked component by
/// component, plural paths are rejected (only
/// `member of` and `is empty` accept them and they do not come through
/// here), `null` literals compare with anything.
pub fn assert_comparable(left: &Expression, right: &Expression) -> Result<(), TreeError> {
    if let (Expression::Tuple(ls), Expression::Tuple(rs)) = (left, right) {
        if ls.len() != rs.len() {
            return Err(TreeError::TupleLength {
                left: ls.len(),
                right: rs.len(),
            });
        }
        for (l, r) in ls.iter().zip(rs) {
            assert_comparable(l, r)?;
        }
        return Ok(());
    }

    for side in [left, right] {
        if let Expression::Path(path) = side
            && path.is_plural()
        {
            return Err(TreeError::MultiValuedPath {
                attribute: path.query_string(),
            });
        }
    }

    if is_null_literal(left) || is_null_literal(right) {
        return Ok(());
    }

    match (left.expressible_type(), right.expressible_type()) {
        (Some(l), Some(r)) if !types_comparable(&l, &r) => Err(TreeError::TypeIncompatible {
            left: l.to_string(),
            right: r.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Check an assignment `target = value` in an update or insert.
pub fn assert_assignable(target: &Path, value: &Expression) -> Result<(), TreeError> {
    if is_null_literal(value) {
        return Ok(());
    }
    if let Some(target_type) = target.path_type()
        && let Some(value_type) = value.expressible_type()
        && !type_assignable(target_type, &value_type)
    {
        return Err(TreeError::NotAssignable {
            value_type: value_type.to_string(),
            path: target.query_string(),
            target_type: target_type.to_string(),
        });
    }
    Ok(())
}

/// Operand of an arithmetic operator must be numeric or untyped.
pub fn assert_operable(operand: &Expression, operator: &'static str) -> Result<(), TreeError> {
    match operand.expressible_type() {
        Some(t) if !t.is_numeric() => Err(TreeError::OperandType {
            operator,
            type_name: t.to_string(),
            expected: "numeric",
        }),
        _ => Ok(()),
    }
}

/// Operand of `like` must be string-like or untyped.
pub fn assert_string(operand: &Expression, operator: &'static str) -> Result<(), TreeError> {
    match operand.expressible_type() {
        Some(t) if !t.is_string_like() => Err(TreeError::OperandType {
            operator,
            type_name: t.to_string(),
            expected: "string-like",
        }),
        _ => Ok(()),
    }
}

/// Operand of `is true`/`is false` or a boolean-valued predicate.
pub fn assert_boolean(operand: &Expression, operator: &'static str) -> Result<(), TreeError> {
    match operand.expressible_type() {
        Some(t) if !t.is_boolean() => Err(TreeError::OperandType {
            operator,
            type_name: type_name(operand),
            expected: "boolean",
        }),
        _ => Ok(()),
    }
}

/// The type untyped operands should adopt.
///
/// A model-bound operand (a path or entity reference) wins over a value with
/// a natural type; among operands of the same rank the first one wins.
pub fn highest_precedence_type<'a>(
    operands: impl IntoIterator<Item = &'a Expression>,
) -> Option<ExpressibleType> {
    let mut best: Option<(u8, ExpressibleType)> = None;
    for operand in operands {
        let Some(t) = operand.expressible_type() else {
            continue;
        };
        let rank = if operand.is_model_bound() { 2 } else { 1 };
        if best.as_ref().is_none_or(|(r, _)| rank > *r) {
            best = Some((rank, t));
        }
    }
    best.map(|(_, t)| t)
}

/// Infer a common type over `operands` and push it into the untyped ones.
pub(crate) fn inferred_types_propagate(operands: &mut [&mut Expression]) {
    if let Some(len) = tuple_arity(operands) {
        for i in 0..len {
            let mut components: Vec<&mut Expression> = operands
                .iter_mut()
                .filter_map(|operand| match &mut **operand {
                    Expression::Tuple(items) => items.get_mut(i),
                    _ => None,
                })
                .collect();
            inferred_types_propagate(&mut components);
        }
        return;
    }

    let inferred = highest_precedence_type(operands.iter().map(|e| &**e));
    if let Some(inferred) = inferred {
        trace!(inferred = %inferred, operands = operands.len(), "propagating inferred type");
        for operand in operands.iter_mut() {
            operand.inferred_type_apply(&inferred);
        }
    }
}

/// Shared arity when every operand is a tuple of the same length.
fn tuple_arity(operands: &[&mut Expression]) -> Option<usize> {
    let (first, rest) = operands.split_first()?;
    let len = first.tuple_len()?;
    rest.iter()
        .all(|operand| operand.tuple_len() == Some(len))
        .then_some(len)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tree::expression::{Literal, Parameter};
    use crate::tree::from::FromElement;

    fn person() -> Arc<FromElement> {
        Arc::new(FromElement::root_new(
            "Person",
            ExpressibleType::entity("Person", "Person"),
            Some("p"),
        ))
    }

    fn path(attr: &str, t: ExpressibleType) -> Expression {
        Expression::Path(Path::new(person(), attr, t))
    }

    fn person_id() -> ExpressibleType {
        ExpressibleType::identifier("Person", ExpressibleType::long())
    }

    #[test]
    fn test_types_comparable_families() {
        assert!(types_comparable(
            &ExpressibleType::integer(),
            &ExpressibleType::big_decimal()
        ));
        assert!(types_comparable(
            &ExpressibleType::string(),
            &ExpressibleType::character()
        ));
        assert!(types_comparable(
            &ExpressibleType::date(),
            &ExpressibleType::timestamp()
        ));
        assert!(!types_comparable(
            &ExpressibleType::integer(),
            &ExpressibleType::string()
        ));
        assert!(!types_comparable(
            &ExpressibleType::boolean(),
            &ExpressibleType::integer()
        ));
    }

    #[test]
    fn test_types_comparable_entities() {
        let person = ExpressibleType::entity("Person", "Person");
        let employee = ExpressibleType::entity("Employee", "Person");
        let address = ExpressibleType::entity("Address", "Address");

        assert!(types_comparable(&person, &employee));
        assert!(!types_comparable(&person, &address));
        assert!(types_comparable(&person, &person_id()));
        assert!(types_comparable(&person_id(), &employee));
        assert!(!types_comparable(&address, &person_id()));
        assert!(!types_comparable(&person, &ExpressibleType::long()));
    }

    #[test]
    fn test_types_comparable_identifier_underlying() {
        assert!(types_comparable(&person_id(), &ExpressibleType::integer()));
        assert!(types_comparable(&ExpressibleType::long(), &person_id()));
        assert!(!types_comparable(&person_id(), &ExpressibleType::string()));
    }

    #[test]
    fn test_types_comparable_collections() {
        let tags = ExpressibleType::collection(ExpressibleType::string());
        assert!(types_comparable(&tags, &tags));
        assert!(!types_comparable(&tags, &ExpressibleType::string()));
    }

    #[test]
    fn test_assert_comparable_tuple_length() {
        let left = Expression::Tuple(vec![Literal::from(1).into(), Literal::from(2).into()]);
        let right = Expression::Tuple(vec![Literal::from(1).into()]);
        let err = assert_comparable(&left, &right).unwrap_err();
        assert!(matches!(err, TreeError::TupleLength { left: 2, right: 1 }));
    }

    #[test]
    fn test_assert_comparable_tuple_components() {
        let left = || {
            Expression::Tuple(vec![
                path("age", ExpressibleType::integer()),
                path("name", ExpressibleType::string()),
            ])
        };
        let swapped = Expression::Tuple(vec![Literal::from("x").into(), Literal::from(2).into()]);
        let err = assert_comparable(&left(), &swapped).unwrap_err();
        assert!(matches!(err, TreeError::TypeIncompatible { .. }));

        let matching = Expression::Tuple(vec![Literal::from(18).into(), Literal::from("x").into()]);
        assert!(assert_comparable(&left(), &matching).is_ok());
    }

    #[test]
    fn test_tuple_components_infer_parameter_types() {
        let min_age = Parameter::named("minAge");
        let name = Parameter::named("name");
        let mut left = Expression::Tuple(vec![
            path("age", ExpressibleType::integer()),
            path("name", ExpressibleType::string()),
        ]);
        let mut right = Expression::Tuple(vec![
            Expression::Parameter(min_age.clone()),
            Expression::Parameter(name.clone()),
        ]);
        inferred_types_propagate(&mut [&mut left, &mut right]);

        assert_eq!(min_age.expressible_type(), Some(&ExpressibleType::integer()));
        assert_eq!(name.expressible_type(), Some(&ExpressibleType::string()));
    }

    #[test]
    fn test_assert_comparable_plural_path() {
        let tags = path("tags", ExpressibleType::collection(ExpressibleType::string()));
        let err = assert_comparable(&tags, &Literal::from("x").into()).unwrap_err();
        assert!(matches!(err, TreeError::MultiValuedPath { .. }));
    }

    #[test]
    fn test_assert_comparable_null_and_untyped() {
        let name = path("name", ExpressibleType::string());
        assert!(assert_comparable(&name, &Literal::null().into()).is_ok());
        assert!(assert_comparable(&name, &Parameter::named("n").into()).is_ok());
    }

    #[test]
    fn test_assert_comparable_mismatch_message() {
        let err = assert_comparable(
            &path("name", ExpressibleType::string()),
            &Literal::from(18).into(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot compare left expression of type 'string' with right expression of type 'integer'"
        );
    }

    #[test]
    fn test_highest_precedence_prefers_model_bound() {
        let lit: Expression = Literal::from(18).into();
        let age = path("age", ExpressibleType::long());
        let picked = highest_precedence_type([&lit, &age]);
        assert_eq!(picked, Some(ExpressibleType::long()));
    }

    #[test]
    fn test_highest_precedence_first_wins_on_tie() {
        let a: Expression = Literal::from(18).into();
        let b: Expression = Literal::from("x").into();
        assert_eq!(
            highest_precedence_type([&a, &b]),
            Some(ExpressibleType::integer())
        );

        let untyped: Expression = Parameter::named("p").into();
        assert_eq!(highest_precedence_type([&untyped]), None);
    }

    #[test]
    fn test_propagate_into_parameter() {
        let param = Parameter::named("minAge");
        let mut age = path("age", ExpressibleType::integer());
        let mut value: Expression = param.clone().into();
        inferred_types_propagate(&mut [&mut age, &mut value]);
        assert_eq!(param.expressible_type(), Some(&ExpressibleType::integer()));
    }

    #[test]
    fn test_assert_assignable() {
        let Expression::Path(age) = path("age", ExpressibleType::integer()) else {
            unreachable!()
        };
        assert!(assert_assignable(&age, &Literal::from(3).into()).is_ok());
        assert!(assert_assignable(&age, &Literal::null().into()).is_ok());
        let err = assert_assignable(&age, &Literal::from("x").into()).unwrap_err();
        assert!(matches!(err, TreeError::NotAssignable { .. }));
    }

    #[test]
    fn test_assert_string_and_boolean() {
        let age = path("age", ExpressibleType::integer());
        assert!(assert_string(&age, "like").is_err());
        assert!(assert_boolean(&age, "is true").is_err());
        assert!(assert_boolean(&path("active", ExpressibleType::boolean()), "is true").is_ok());
    }
}
