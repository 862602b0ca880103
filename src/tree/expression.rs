use std::sync::{Arc, OnceLock};

use ecow::EcoString;
use ordered_float::NotNan;
use strum_macros::{AsRefStr, IntoStaticStr};

use crate::catalog::ExpressibleType;

use super::from::FromElement;
use super::node::{CopyContext, CopyNode, NodeId, SharedNode};
use super::query::QueryExpr;
use super::render::{RenderContext, identifier_append, string_literal_append};
use super::typecheck::{assert_operable, highest_precedence_type};
use super::{Render, TreeError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    String(EcoString),
    Integer(i64),
    Float(NotNan<f64>),
    Boolean(bool),
    Null,
}

impl LiteralValue {
    /// Type a literal of this value has without any context.
    fn natural_type(&self) -> Option<ExpressibleType> {
        match self {
            LiteralValue::String(_) => Some(ExpressibleType::string()),
            LiteralValue::Integer(_) => Some(ExpressibleType::integer()),
            LiteralValue::Float(_) => Some(ExpressibleType::double()),
            LiteralValue::Boolean(_) => Some(ExpressibleType::boolean()),
            LiteralValue::Null => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    value: LiteralValue,
    expressible_type: Option<ExpressibleType>,
}

impl Literal {
    /// Literal typed by its value; `null` stays untyped.
    pub fn new(value: LiteralValue) -> Self {
        let expressible_type = value.natural_type();
        Self {
            value,
            expressible_type,
        }
    }

    /// Literal whose type is left for inference.
    pub fn untyped(value: LiteralValue) -> Self {
        Self {
            value,
            expressible_type: None,
        }
    }

    pub fn typed(value: LiteralValue, expressible_type: ExpressibleType) -> Self {
        Self {
            value,
            expressible_type: Some(expressible_type),
        }
    }

    pub fn null() -> Self {
        Self::untyped(LiteralValue::Null)
    }

    pub fn value(&self) -> &LiteralValue {
        &self.value
    }

    /// Replace the bound value. Type and identity are kept.
    pub fn set_value(&mut self, value: LiteralValue) {
        self.value = value;
    }

    pub fn expressible_type(&self) -> Option<&ExpressibleType> {
        self.expressible_type.as_ref()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, LiteralValue::Null)
    }

    fn inferred_type_apply(&mut self, inferred: &ExpressibleType) {
        if self.expressible_type.is_none() {
            self.expressible_type = Some(inferred.clone());
        }
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::new(LiteralValue::Integer(value))
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::new(LiteralValue::Integer(i64::from(value)))
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::new(LiteralValue::Boolean(value))
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::new(LiteralValue::String(EcoString::from(value)))
    }
}

impl From<NotNan<f64>> for Literal {
    fn from(value: NotNan<f64>) -> Self {
        Literal::new(LiteralValue::Float(value))
    }
}

impl Render for Literal {
    fn render<'b>(&self, buf: &'b mut String, _ctx: &mut RenderContext) -> &'b mut String {
        match &self.value {
            LiteralValue::String(s) => {
                string_literal_append(buf, s);
            }
            LiteralValue::Integer(i) => buf.push_str(i.to_string().as_str()),
            LiteralValue::Float(f) => buf.push_str(format!("{:?}", f.into_inner()).as_str()),
            LiteralValue::Boolean(b) => buf.push_str(if *b { "true" } else { "false" }),
            LiteralValue::Null => buf.push_str("null"),
        }
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    /// `:name`
    Named(EcoString),
    /// `?1`
    Positional(u32),
}

/// A query parameter.
///
/// Parameters are shared nodes: the same parameter referenced twice in a
/// statement is one parameter, and a copy of the statement contains one copy
/// of it. The inferred type is set at most once, by the first predicate that
/// gives it context.
#[derive(Debug)]
pub struct Parameter {
    id: NodeId,
    key: ParameterKey,
    anticipated_type: Option<ExpressibleType>,
    inferred_type: OnceLock<ExpressibleType>,
}

impl Parameter {
    pub fn named(name: &str) -> Arc<Self> {
        Arc::new(Self::with_key(ParameterKey::Named(EcoString::from(name)), None))
    }

    pub fn positional(position: u32) -> Arc<Self> {
        Arc::new(Self::with_key(ParameterKey::Positional(position), None))
    }

    /// A parameter whose type is declared up front and never inferred.
    pub fn named_typed(name: &str, anticipated_type: ExpressibleType) -> Arc<Self> {
        Arc::new(Self::with_key(
            ParameterKey::Named(EcoString::from(name)),
            Some(anticipated_type),
        ))
    }

    fn with_key(key: ParameterKey, anticipated_type: Option<ExpressibleType>) -> Self {
        Self {
            id: NodeId::next(),
            key,
            anticipated_type,
            inferred_type: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &ParameterKey {
        &self.key
    }

    pub fn name(&self) -> Option<&str> {
        match &self.key {
            ParameterKey::Named(name) => Some(name.as_str()),
            ParameterKey::Positional(_) => None,
        }
    }

    pub fn position(&self) -> Option<u32> {
        match self.key {
            ParameterKey::Positional(position) => Some(position),
            ParameterKey::Named(_) => None,
        }
    }

    pub fn expressible_type(&self) -> Option<&ExpressibleType> {
        self.anticipated_type
            .as_ref()
            .or_else(|| self.inferred_type.get())
    }

    fn inferred_type_apply(&self, inferred: &ExpressibleType) {
        if self.anticipated_type.is_none() {
            // first inference wins
            let _ = self.inferred_type.set(inferred.clone());
        }
    }
}

impl SharedNode for Parameter {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl CopyNode for Arc<Parameter> {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        ctx.copy_shared(self, |param, _| {
            let copy = Parameter::with_key(param.key.clone(), param.anticipated_type.clone());
            if let Some(inferred) = param.inferred_type.get() {
                let _ = copy.inferred_type.set(inferred.clone());
            }
            copy
        })
    }
}

impl Render for Parameter {
    fn render<'b>(&self, buf: &'b mut String, _ctx: &mut RenderContext) -> &'b mut String {
        match &self.key {
            ParameterKey::Named(name) => {
                buf.push(':');
                buf.push_str(name);
            }
            ParameterKey::Positional(position) => {
                buf.push('?');
                buf.push_str(position.to_string().as_str());
            }
        }
        buf
    }
}

/// Attribute reference `p.name`, optionally unqualified.
#[derive(Debug, Clone)]
pub struct Path {
    lhs: Option<Arc<FromElement>>,
    attribute: EcoString,
    path_type: Option<ExpressibleType>,
    plural: bool,
}

impl Path {
    pub fn new(lhs: Arc<FromElement>, attribute: &str, path_type: ExpressibleType) -> Self {
        Self::resolved(Some(lhs), attribute, Some(path_type))
    }

    /// A path rendered without its from-element qualifier.
    pub fn unqualified(attribute: &str, path_type: ExpressibleType) -> Self {
        Self::resolved(None, attribute, Some(path_type))
    }

    /// A path whose type may be unknown, such as a CTE column selected from
    /// an untyped expression.
    pub fn resolved(
        lhs: Option<Arc<FromElement>>,
        attribute: &str,
        path_type: Option<ExpressibleType>,
    ) -> Self {
        let plural = path_type.as_ref().is_some_and(ExpressibleType::is_plural);
        Self {
            lhs,
            attribute: EcoString::from(attribute),
            path_type,
            plural,
        }
    }

    pub fn lhs(&self) -> Option<&Arc<FromElement>> {
        self.lhs.as_ref()
    }

    pub fn attribute(&self) -> &EcoString {
        &self.attribute
    }

    pub fn path_type(&self) -> Option<&ExpressibleType> {
        self.path_type.as_ref()
    }

    pub fn is_plural(&self) -> bool {
        self.plural
    }
}

impl CopyNode for Path {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        Path {
            lhs: self.lhs.copy_node(ctx),
            attribute: self.attribute.clone(),
            path_type: self.path_type.clone(),
            plural: self.plural,
        }
    }
}

impl Render for Path {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        if let Some(lhs) = &self.lhs {
            lhs.render(buf, ctx);
            buf.push('.');
        }
        identifier_append(buf, &self.attribute)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: EcoString,
    pub args: Vec<Expression>,
    /// `count(*)`
    pub agg_star: bool,
    pub agg_distinct: bool,
    pub return_type: Option<ExpressibleType>,
}

impl FunctionCall {
    pub fn new(name: &str, args: Vec<Expression>, return_type: Option<ExpressibleType>) -> Self {
        Self {
            name: EcoString::from(name),
            args,
            agg_star: false,
            agg_distinct: false,
            return_type,
        }
    }

    pub fn count_star() -> Self {
        Self {
            name: EcoString::from("count"),
            args: Vec::new(),
            agg_star: true,
            agg_distinct: false,
            return_type: Some(ExpressibleType::long()),
        }
    }
}

impl CopyNode for FunctionCall {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        FunctionCall {
            name: self.name.clone(),
            args: self.args.copy_node(ctx),
            agg_star: self.agg_star,
            agg_distinct: self.agg_distinct,
            return_type: self.return_type.clone(),
        }
    }
}

impl Render for FunctionCall {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        buf.push_str(&self.name);
        buf.push('(');
        if self.agg_star {
            buf.push('*');
        } else {
            if self.agg_distinct {
                buf.push_str("distinct ");
            }
            let mut sep = "";
            for arg in &self.args {
                buf.push_str(sep);
                arg.render(buf, ctx);
                sep = ", ";
            }
        }
        buf.push(')');
        buf
    }
}

/// Arithmetic operators for expressions like `p.age + 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
pub enum ArithmeticOp {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Subtract,
    #[strum(to_string = "*")]
    Multiply,
    #[strum(to_string = "/")]
    Divide,
    #[strum(to_string = "%")]
    Modulo,
}

#[derive(Debug, Clone)]
pub struct ArithmeticExpr {
    left: Box<Expression>,
    op: ArithmeticOp,
    right: Box<Expression>,
    result_type: Option<ExpressibleType>,
}

impl ArithmeticExpr {
    /// Both operands must be numeric or untyped. Untyped operands adopt the
    /// type of the other side.
    pub fn new(
        mut left: Expression,
        op: ArithmeticOp,
        mut right: Expression,
    ) -> Result<Self, TreeError> {
        assert_operable(&left, op.into())?;
        assert_operable(&right, op.into())?;

        let result_type = highest_precedence_type([&left, &right]);
        if let Some(inferred) = &result_type {
            left.inferred_type_apply(inferred);
            right.inferred_type_apply(inferred);
        }

        Ok(Self {
            left: Box::new(left),
            op,
            right: Box::new(right),
            result_type,
        })
    }

    pub fn left(&self) -> &Expression {
        &self.left
    }

    pub fn op(&self) -> ArithmeticOp {
        self.op
    }

    pub fn right(&self) -> &Expression {
        &self.right
    }
}

impl CopyNode for ArithmeticExpr {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        ArithmeticExpr {
            left: self.left.copy_node(ctx),
            op: self.op,
            right: self.right.copy_node(ctx),
            result_type: self.result_type.clone(),
        }
    }
}

impl Render for ArithmeticExpr {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        buf.push('(');
        self.left.render(buf, ctx);
        buf.push(' ');
        buf.push_str(self.op.as_ref());
        buf.push(' ');
        self.right.render(buf, ctx);
        buf.push(')');
        buf
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Parameter(Arc<Parameter>),
    Path(Path),
    /// A from-element used as a value: `select p from Person p`
    Entity(Arc<FromElement>),
    Function(FunctionCall),
    Arithmetic(ArithmeticExpr),
    Tuple(Vec<Expression>),
    SubQuery(Box<QueryExpr>),
}

impl Expression {
    pub fn expressible_type(&self) -> Option<ExpressibleType> {
        match self {
            Expression::Literal(lit) => lit.expressible_type().cloned(),
            Expression::Parameter(param) => param.expressible_type().cloned(),
            Expression::Path(path) => path.path_type().cloned(),
            Expression::Entity(from) => from.value_type().cloned(),
            Expression::Function(func) => func.return_type.clone(),
            Expression::Arithmetic(arith) => arith.result_type.clone(),
            Expression::Tuple(_) => None,
            Expression::SubQuery(query) => query.selection_type(),
        }
    }

    /// Whether the type comes from the domain model rather than a value.
    pub fn is_model_bound(&self) -> bool {
        matches!(self, Expression::Path(_) | Expression::Entity(_))
    }

    pub fn is_plural(&self) -> bool {
        matches!(self, Expression::Path(path) if path.is_plural())
    }

    pub fn tuple_len(&self) -> Option<usize> {
        match self {
            Expression::Tuple(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Give an untyped literal or parameter the type inferred from context.
    /// Typed nodes are left alone.
    pub(crate) fn inferred_type_apply(&mut self, inferred: &ExpressibleType) {
        match self {
            Expression::Literal(lit) => lit.inferred_type_apply(inferred),
            Expression::Parameter(param) => param.inferred_type_apply(inferred),
            Expression::Arithmetic(arith) => {
                arith.left.inferred_type_apply(inferred);
                arith.right.inferred_type_apply(inferred);
                if arith.result_type.is_none() {
                    arith.result_type = Some(inferred.clone());
                }
            }
            Expression::Path(_)
            | Expression::Entity(_)
            | Expression::Function(_)
            | Expression::Tuple(_)
            | Expression::SubQuery(_) => {}
        }
    }

    pub fn as_literal_mut(&mut self) -> Option<&mut Literal> {
        match self {
            Expression::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

impl From<Literal> for Expression {
    fn from(lit: Literal) -> Self {
        Expression::Literal(lit)
    }
}

impl From<Arc<Parameter>> for Expression {
    fn from(param: Arc<Parameter>) -> Self {
        Expression::Parameter(param)
    }
}

impl From<Path> for Expression {
    fn from(path: Path) -> Self {
        Expression::Path(path)
    }
}

impl CopyNode for Expression {
    fn copy_node(&self, ctx: &mut CopyContext) -> Self {
        match self {
            Expression::Literal(lit) => Expression::Literal(lit.clone()),
            Expression::Parameter(param) => Expression::Parameter(param.copy_node(ctx)),
            Expression::Path(path) => Expression::Path(path.copy_node(ctx)),
            Expression::Entity(from) => Expression::Entity(from.copy_node(ctx)),
            Expression::Function(func) => Expression::Function(func.copy_node(ctx)),
            Expression::Arithmetic(arith) => Expression::Arithmetic(arith.copy_node(ctx)),
            Expression::Tuple(items) => Expression::Tuple(items.copy_node(ctx)),
            Expression::SubQuery(query) => Expression::SubQuery(query.copy_node(ctx)),
        }
    }
}

impl Render for Expression {
    fn render<'b>(&self, buf: &'b mut String, ctx: &mut RenderContext) -> &'b mut String {
        match self {
            Expression::Literal(lit) => lit.render(buf, ctx),
            Expression::Parameter(param) => param.render(buf, ctx),
            Expression::Path(path) => path.render(buf, ctx),
            Expression::Entity(from) => from.render(buf, ctx),
            Expression::Function(func) => func.render(buf, ctx),
            Expression::Arithmetic(arith) => arith.render(buf, ctx),
            Expression::Tuple(items) => {
                buf.push('(');
                let mut sep = "";
                for item in items {
                    buf.push_str(sep);
                    item.render(buf, ctx);
                    sep = ", ";
                }
                buf.push(')');
                buf
            }
            Expression::SubQuery(query) => {
                buf.push('(');
                query.render(buf, ctx);
                buf.push(')');
                buf
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Arc<FromElement> {
        Arc::new(FromElement::root_new(
            "Person",
            ExpressibleType::entity("Person", "Person"),
            Some("p"),
        ))
    }

    #[test]
    fn test_literal_render() {
        assert_eq!(Literal::from(18).query_string(), "18");
        assert_eq!(Literal::from(true).query_string(), "true");
        assert_eq!(Literal::from("O'Brien").query_string(), "'O''Brien'");
        assert_eq!(Literal::null().query_string(), "null");
        let half = NotNan::new(0.5).unwrap();
        assert_eq!(Literal::from(half).query_string(), "0.5");
    }

    #[test]
    fn test_float_literal_keeps_fraction() {
        let whole = NotNan::new(1.0).unwrap();
        assert_eq!(Literal::from(whole).query_string(), "1.0");
        assert_eq!(Literal::from(1).query_string(), "1");
        assert_ne!(
            Literal::from(whole).query_string(),
            Literal::from(1).query_string()
        );
    }

    #[test]
    fn test_literal_set_value_keeps_type() {
        let mut lit = Literal::from(18);
        lit.set_value(LiteralValue::Integer(21));
        assert_eq!(lit.value(), &LiteralValue::Integer(21));
        assert_eq!(lit.expressible_type(), Some(&ExpressibleType::integer()));
    }

    #[test]
    fn test_parameter_render() {
        assert_eq!(Parameter::named("minAge").query_string(), ":minAge");
        assert_eq!(Parameter::positional(1).query_string(), "?1");
    }

    #[test]
    fn test_parameter_inference_is_first_wins() {
        let param = Parameter::named("x");
        param.inferred_type_apply(&ExpressibleType::integer());
        param.inferred_type_apply(&ExpressibleType::string());
        assert_eq!(param.expressible_type(), Some(&ExpressibleType::integer()));
    }

    #[test]
    fn test_parameter_anticipated_type_not_overridden() {
        let param = Parameter::named_typed("x", ExpressibleType::string());
        param.inferred_type_apply(&ExpressibleType::integer());
        assert_eq!(param.expressible_type(), Some(&ExpressibleType::string()));
    }

    #[test]
    fn test_parameter_copy_keeps_key_and_type() {
        let param = Parameter::named("x");
        param.inferred_type_apply(&ExpressibleType::integer());

        let copy = param.copy_node(&mut CopyContext::new());
        assert!(!Arc::ptr_eq(&param, &copy));
        assert_ne!(param.node_id(), copy.node_id());
        assert_eq!(copy.key(), param.key());
        assert_eq!(copy.expressible_type(), Some(&ExpressibleType::integer()));
    }

    #[test]
    fn test_path_render() {
        let p = person();
        let qualified = Path::new(p, "age", ExpressibleType::integer());
        assert_eq!(qualified.query_string(), "p.age");

        let bare = Path::unqualified("age", ExpressibleType::integer());
        assert_eq!(bare.query_string(), "age");
    }

    #[test]
    fn test_arithmetic_infers_untyped_operand() {
        let param = Parameter::named("delta");
        let age = Expression::Path(Path::new(person(), "age", ExpressibleType::integer()));
        let arith =
            ArithmeticExpr::new(age, ArithmeticOp::Add, Expression::Parameter(param.clone()))
                .unwrap();

        assert_eq!(param.expressible_type(), Some(&ExpressibleType::integer()));
        assert_eq!(arith.query_string(), "(p.age + :delta)");
    }

    #[test]
    fn test_arithmetic_rejects_string() {
        let name = Expression::Path(Path::new(person(), "name", ExpressibleType::string()));
        let err = ArithmeticExpr::new(name, ArithmeticOp::Multiply, Literal::from(2).into())
            .unwrap_err();
        assert!(matches!(err, TreeError::OperandType { operator: "*", .. }));
    }

    #[test]
    fn test_function_render() {
        let p = person();
        let upper = FunctionCall::new(
            "upper",
            vec![Path::new(p, "name", ExpressibleType::string()).into()],
            Some(ExpressibleType::string()),
        );
        assert_eq!(upper.query_string(), "upper(p.name)");
        assert_eq!(FunctionCall::count_star().query_string(), "count(*)");
    }

    #[test]
    fn test_tuple_render() {
        let tuple = Expression::Tuple(vec![Literal::from(1).into(), Literal::from("a").into()]);
        assert_eq!(tuple.query_string(), "(1, 'a')");
        assert_eq!(tuple.tuple_len(), Some(2));
    }
}
