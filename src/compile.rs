use crate::engine::RulesMode;
use crate::error::{Error, RuleParseError, TypeMismatchError};
use crate::ops::{BinaryFn, OpFn, UnaryFn};
use crate::rules::{RuleAst, RuleNode};
use crate::schema::SchemaRegistry;
use crate::types::Value;

/// A compiled, data-oriented evaluator tree. String lookups are resolved and
/// operator implementations bound; evaluation pattern-matches node kind.
///
/// `and`/`or`/`not` get dedicated nodes so the evaluator can short-circuit;
/// their registry entries exist only for binding power and signatures.
#[derive(Clone)]
pub(crate) enum CompiledExpr {
    Const(Value),
    Field {
        path: String,
    },
    And(Box<CompiledExpr>, Box<CompiledExpr>),
    Or(Box<CompiledExpr>, Box<CompiledExpr>),
    Not(Box<CompiledExpr>),
    Unary {
        func: UnaryFn,
        operand: Box<CompiledExpr>,
    },
    Binary {
        func: BinaryFn,
        left: Box<CompiledExpr>,
        right: Box<CompiledExpr>,
    },
    Call {
        name: String,
        args: Vec<CompiledExpr>,
    },
}

impl std::fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompiledExpr::Const(v) => write!(f, "Const({v})"),
            CompiledExpr::Field { path } => write!(f, "Field({path})"),
            CompiledExpr::And(a, b) => write!(f, "And({a:?}, {b:?})"),
            CompiledExpr::Or(a, b) => write!(f, "Or({a:?}, {b:?})"),
            CompiledExpr::Not(inner) => write!(f, "Not({inner:?})"),
            CompiledExpr::Unary { operand, .. } => write!(f, "Unary(.., {operand:?})"),
            CompiledExpr::Binary { left, right, .. } => {
                write!(f, "Binary(.., {left:?}, {right:?})")
            }
            CompiledExpr::Call { name, args } => write!(f, "Call({name}, {args:?})"),
        }
    }
}

/// Single-walk typed compiler: checks declared function signatures
/// (strict/loose), folds constants, and lowers the rule AST into a
/// [`CompiledExpr`] tree.
pub(crate) struct Compiler<'a> {
    schema: &'a SchemaRegistry,
    mode: RulesMode,
    pub(crate) warnings: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub(crate) fn new(schema: &'a SchemaRegistry, mode: RulesMode) -> Self {
        Self {
            schema,
            mode,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn compile(&mut self, ast: &RuleAst) -> Result<CompiledExpr, Error> {
        let folded = fold(ast.root.clone());
        self.lower(&folded)
    }

    fn lower(&mut self, node: &RuleNode) -> Result<CompiledExpr, Error> {
        match node {
            RuleNode::Literal { value, .. } => Ok(CompiledExpr::Const(value.clone())),
            RuleNode::ListLiteral { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        RuleNode::Literal { value, .. } => values.push(value.clone()),
                        other => {
                            return Err(RuleParseError::new(format!(
                                "list literals may only contain literal values, got {other}"
                            ))
                            .into());
                        }
                    }
                }
                Ok(CompiledExpr::Const(Value::List(values)))
            }
            RuleNode::Variable { path, .. } => Ok(CompiledExpr::Field { path: path.clone() }),
            RuleNode::Binary {
                token,
                left,
                right,
                func,
                ..
            } => {
                let l = self.lower(left)?;
                let r = self.lower(right)?;
                match token.as_str() {
                    "and" => Ok(CompiledExpr::And(Box::new(l), Box::new(r))),
                    "or" => Ok(CompiledExpr::Or(Box::new(l), Box::new(r))),
                    _ => match func {
                        Some(OpFn::Binary(f)) => Ok(CompiledExpr::Binary {
                            func: f.clone(),
                            left: Box::new(l),
                            right: Box::new(r),
                        }),
                        _ => Err(RuleParseError::new(format!(
                            "operator '{token}' has no binary implementation"
                        ))
                        .into()),
                    },
                }
            }
            RuleNode::Unary {
                token,
                operand,
                func,
                ..
            } => {
                let inner = self.lower(operand)?;
                if token == "not" {
                    return Ok(CompiledExpr::Not(Box::new(inner)));
                }
                match func {
                    Some(OpFn::Unary(f)) => Ok(CompiledExpr::Unary {
                        func: f.clone(),
                        operand: Box::new(inner),
                    }),
                    _ => Err(RuleParseError::new(format!(
                        "operator '{token}' has no unary implementation"
                    ))
                    .into()),
                }
            }
            RuleNode::Call { name, args, .. } => {
                self.check_call(name, args)?;
                let lowered = args
                    .iter()
                    .map(|arg| self.lower(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CompiledExpr::Call {
                    name: name.clone(),
                    args: lowered,
                })
            }
        }
    }

    /// Check a call against its declared signature, when one exists.
    /// Unknown callees are polymorphic and resolved at evaluation time.
    fn check_call(&mut self, name: &str, args: &[RuleNode]) -> Result<(), Error> {
        let Some(sig) = self.schema.function(name) else {
            return Ok(());
        };
        let required = sig.params.iter().filter(|p| !p.optional).count();
        if args.len() < required || args.len() > sig.params.len() {
            let message = format!(
                "function '{name}' expects {} argument(s), got {}",
                sig.params.len(),
                args.len()
            );
            return self.mismatch(message, sig.params.len().to_string(), args.len().to_string());
        }
        for (param, arg) in sig.params.iter().zip(args) {
            let expected = param.ty.type_name();
            let actual = arg.type_name();
            if expected != actual && expected != "Any" && actual != "Any" {
                let message = format!(
                    "argument '{}' of '{name}' expects {expected}, got {actual}",
                    param.name
                );
                return self.mismatch(message, expected.to_owned(), actual.to_owned());
            }
        }
        Ok(())
    }

    fn mismatch(&mut self, message: String, expected: String, got: String) -> Result<(), Error> {
        match self.mode {
            RulesMode::Strict => Err(TypeMismatchError::expected_got(message, expected, got).into()),
            RulesMode::Loose => {
                self.warnings.push(format!("{message}; compiled best-effort"));
                Ok(())
            }
        }
    }
}

fn bool_literal(value: bool) -> RuleNode {
    RuleNode::Literal {
        value: Value::Bool(value),
        type_name: "Bool".to_owned(),
    }
}

fn as_bool_literal(node: &RuleNode) -> Option<bool> {
    match node {
        RuleNode::Literal {
            value: Value::Bool(b),
            ..
        } => Some(*b),
        _ => None,
    }
}

/// Constant folding: literal-only operators evaluate at compile time,
/// boolean identities simplify, and double negation cancels.
fn fold(node: RuleNode) -> RuleNode {
    match node {
        RuleNode::Binary {
            token,
            left,
            right,
            type_name,
            func,
        } => {
            let left = fold(*left);
            let right = fold(*right);
            match token.as_str() {
                "and" => match (as_bool_literal(&left), as_bool_literal(&right)) {
                    (Some(false), _) | (_, Some(false)) => bool_literal(false),
                    (Some(true), Some(true)) => bool_literal(true),
                    (Some(true), None) if right.type_name() == "Bool" => right,
                    (None, Some(true)) if left.type_name() == "Bool" => left,
                    _ => RuleNode::Binary {
                        token,
                        left: Box::new(left),
                        right: Box::new(right),
                        type_name,
                        func,
                    },
                },
                "or" => match (as_bool_literal(&left), as_bool_literal(&right)) {
                    (Some(true), _) | (_, Some(true)) => bool_literal(true),
                    (Some(false), Some(false)) => bool_literal(false),
                    (Some(false), None) if right.type_name() == "Bool" => right,
                    (None, Some(false)) if left.type_name() == "Bool" => left,
                    _ => RuleNode::Binary {
                        token,
                        left: Box::new(left),
                        right: Box::new(right),
                        type_name,
                        func,
                    },
                },
                _ => {
                    if let (
                        RuleNode::Literal { value: lv, .. },
                        RuleNode::Literal { value: rv, .. },
                        Some(OpFn::Binary(f)),
                    ) = (&left, &right, &func)
                        && let Ok(value) = f(lv, rv)
                    {
                        let type_name = value.type_name().to_owned();
                        return RuleNode::Literal { value, type_name };
                    }
                    RuleNode::Binary {
                        token,
                        left: Box::new(left),
                        right: Box::new(right),
                        type_name,
                        func,
                    }
                }
            }
        }
        RuleNode::Unary {
            token,
            operand,
            type_name,
            func,
        } => {
            let operand = fold(*operand);
            if token == "not" {
                if let Some(b) = as_bool_literal(&operand) {
                    return bool_literal(!b);
                }
                if let RuleNode::Unary {
                    token: inner_token,
                    operand: inner,
                    ..
                } = &operand
                    && inner_token == "not"
                {
                    return (**inner).clone();
                }
            }
            RuleNode::Unary {
                token,
                operand: Box::new(operand),
                type_name,
                func,
            }
        }
        RuleNode::Call {
            name,
            args,
            type_name,
        } => RuleNode::Call {
            name,
            args: args.into_iter().map(fold).collect(),
            type_name,
        },
        other => other,
    }
}
