use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{OperatorConflictError, RuleEvaluationError};
use crate::types::Value;

/// Operand type matching any actual type in an operator signature.
pub const WILDCARD: &str = "*";

/// Implementing function for a prefix/postfix operator.
pub type UnaryFn = Arc<dyn Fn(&Value) -> Result<Value, RuleEvaluationError> + Send + Sync>;

/// Implementing function for an infix operator.
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, RuleEvaluationError> + Send + Sync>;

/// Reified operator implementation, keyed by arity.
#[derive(Clone)]
pub enum OpFn {
    Unary(UnaryFn),
    Binary(BinaryFn),
}

impl fmt::Debug for OpFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpFn::Unary(_) => f.write_str("OpFn::Unary(..)"),
            OpFn::Binary(_) => f.write_str("OpFn::Binary(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixity {
    Prefix,
    Infix,
    Postfix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// A single operator definition. The same token may carry several
/// definitions as long as their input-type tuples differ (type dispatch).
///
/// `and`, `or`, and `not` register with `func: None`: they stay in the table
/// for binding power and signature lookups, but the compiler emits dedicated
/// short-circuit nodes for them.
#[derive(Debug, Clone)]
pub struct OperatorDef {
    token: String,
    symbolic: bool,
    fixity: Fixity,
    binding_power: u8,
    assoc: Assoc,
    input_types: Vec<String>,
    return_type: String,
    func: Option<OpFn>,
}

impl OperatorDef {
    /// A symbolic infix operator (e.g. `>=`), left-associative, `(*, *) -> Bool`.
    #[must_use]
    pub fn symbol(token: impl Into<String>, binding_power: u8) -> Self {
        Self {
            token: token.into(),
            symbolic: true,
            fixity: Fixity::Infix,
            binding_power,
            assoc: Assoc::Left,
            input_types: vec![WILDCARD.to_owned(), WILDCARD.to_owned()],
            return_type: "Bool".to_owned(),
            func: None,
        }
    }

    /// A keyword infix operator (e.g. `in`), left-associative, `(*, *) -> Bool`.
    #[must_use]
    pub fn keyword(token: impl Into<String>, binding_power: u8) -> Self {
        Self {
            symbolic: false,
            ..Self::symbol(token, binding_power)
        }
    }

    #[must_use]
    pub fn prefix(mut self) -> Self {
        self.fixity = Fixity::Prefix;
        self
    }

    #[must_use]
    pub fn postfix(mut self) -> Self {
        self.fixity = Fixity::Postfix;
        self
    }

    #[must_use]
    pub fn right_assoc(mut self) -> Self {
        self.assoc = Assoc::Right;
        self
    }

    /// Set the operand type tuple. Use [`WILDCARD`] for positions that accept
    /// any type.
    #[must_use]
    pub fn inputs<S: Into<String>>(mut self, input_types: impl IntoIterator<Item = S>) -> Self {
        self.input_types = input_types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    #[must_use]
    pub fn unary_fn(
        mut self,
        f: impl Fn(&Value) -> Result<Value, RuleEvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.func = Some(OpFn::Unary(Arc::new(f)));
        self
    }

    #[must_use]
    pub fn binary_fn(
        mut self,
        f: impl Fn(&Value, &Value) -> Result<Value, RuleEvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.func = Some(OpFn::Binary(Arc::new(f)));
        self
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn is_symbol(&self) -> bool {
        self.symbolic
    }

    #[must_use]
    pub fn fixity(&self) -> Fixity {
        self.fixity
    }

    #[must_use]
    pub fn binding_power(&self) -> u8 {
        self.binding_power
    }

    #[must_use]
    pub fn assoc(&self) -> Assoc {
        self.assoc
    }

    #[must_use]
    pub fn input_types(&self) -> &[String] {
        &self.input_types
    }

    #[must_use]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    #[must_use]
    pub fn func(&self) -> Option<&OpFn> {
        self.func.as_ref()
    }

    /// Whether every expected operand equals the actual one, wildcard-free.
    fn matches_exactly(&self, operand_types: &[&str]) -> bool {
        self.input_types.len() == operand_types.len()
            && self
                .input_types
                .iter()
                .zip(operand_types)
                .all(|(expected, actual)| expected == actual)
    }

    /// Arity-matching comparison where `*` accepts anything and an `Any`
    /// operand (an unresolved polymorphic value) satisfies any expectation.
    fn matches_loosely(&self, operand_types: &[&str]) -> bool {
        self.input_types.len() == operand_types.len()
            && self
                .input_types
                .iter()
                .zip(operand_types)
                .all(|(expected, actual)| {
                    expected == WILDCARD || *actual == "Any" || expected == actual
                })
    }
}

/// Token-indexed operator table driving the Pratt parser.
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    by_token: HashMap<String, Vec<OperatorDef>>,
}

impl OperatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator definition.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorConflictError`] when the token already carries a
    /// definition with the same exact input-type tuple, or when the new
    /// definition disagrees with the token's established binding power or
    /// fixity (all definitions of a token must share both).
    pub fn register(&mut self, op: OperatorDef) -> Result<(), OperatorConflictError> {
        if let Some(existing) = self.by_token.get(op.token()) {
            for prior in existing {
                if prior.input_types == op.input_types {
                    return Err(OperatorConflictError::new(format!(
                        "operator '{}' with input types ({}) already registered",
                        op.token(),
                        op.input_types.join(", ")
                    )));
                }
                if prior.binding_power != op.binding_power || prior.fixity != op.fixity {
                    return Err(OperatorConflictError::new(format!(
                        "operator '{}' definitions must share binding power and fixity",
                        op.token()
                    )));
                }
            }
        }
        self.by_token.entry(op.token.clone()).or_default().push(op);
        Ok(())
    }

    /// Best-matching definition for a token and actual operand types: exact
    /// tuples win over wildcard tuples.
    #[must_use]
    pub fn lookup_by_types(&self, token: &str, operand_types: &[&str]) -> Option<&OperatorDef> {
        let candidates = self.by_token.get(token)?;
        candidates
            .iter()
            .find(|op| op.matches_exactly(operand_types))
            .or_else(|| candidates.iter().find(|op| op.matches_loosely(operand_types)))
    }

    /// All definitions registered for a token.
    #[must_use]
    pub fn candidates(&self, token: &str) -> &[OperatorDef] {
        self.by_token.get(token).map_or(&[], Vec::as_slice)
    }

    /// The left binding power of a token; every definition of a token shares
    /// one (enforced at registration).
    #[must_use]
    pub fn get_binding_power(&self, token: &str) -> Option<u8> {
        self.by_token
            .get(token)
            .and_then(|defs| defs.first())
            .map(OperatorDef::binding_power)
    }

    /// The fixity shared by a token's definitions.
    #[must_use]
    pub fn fixity(&self, token: &str) -> Option<Fixity> {
        self.by_token
            .get(token)
            .and_then(|defs| defs.first())
            .map(OperatorDef::fixity)
    }

    #[must_use]
    pub fn is_keyword(&self, token: &str) -> bool {
        self.by_token
            .get(token)
            .is_some_and(|defs| defs.iter().any(|op| !op.is_symbol()))
    }

    /// Registered symbolic tokens, longest first, for greedy tokenization.
    #[must_use]
    pub fn symbols_longest_first(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .by_token
            .values()
            .flatten()
            .filter(|op| op.is_symbol())
            .map(OperatorDef::token)
            .collect();
        symbols.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        symbols.dedup();
        symbols
    }
}

/// Operator preset selected at engine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorPreset {
    /// The full built-in table.
    Standard,
    /// Only the irreducible minimum: `and`, `or`, `not`.
    Minimal,
    /// The named built-in tokens, plus the irreducible minimum.
    Explicit(Vec<String>),
}

impl Default for OperatorPreset {
    fn default() -> Self {
        OperatorPreset::Standard
    }
}

/// Tokens present regardless of preset.
const ALWAYS: [&str; 3] = ["and", "or", "not"];

fn compare_fn(
    token: &'static str,
    accept: fn(Ordering) -> bool,
) -> impl Fn(&Value, &Value) -> Result<Value, RuleEvaluationError> {
    move |l, r| {
        l.partial_cmp_value(r).map(accept).map(Value::Bool).ok_or_else(|| {
            RuleEvaluationError::new(format!(
                "cannot apply '{token}' to {} and {}",
                l.type_name(),
                r.type_name()
            ))
        })
    }
}

fn membership(l: &Value, r: &Value) -> Result<Value, RuleEvaluationError> {
    match r {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|item| item.loose_eq(l)))),
        other => Err(RuleEvaluationError::new(format!(
            "'in' expects a List on the right, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_operators() -> Vec<OperatorDef> {
    vec![
        OperatorDef::keyword("or", 10).inputs(["Bool", "Bool"]),
        OperatorDef::keyword("and", 20).inputs(["Bool", "Bool"]),
        OperatorDef::keyword("not", 30).prefix().inputs(["Bool"]),
        OperatorDef::keyword("in", 40)
            .inputs([WILDCARD, "List"])
            .binary_fn(membership),
        OperatorDef::keyword("not in", 40)
            .inputs([WILDCARD, "List"])
            .binary_fn(|l, r| match membership(l, r)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Ok(other),
            }),
        OperatorDef::symbol("=", 40).binary_fn(|l, r| Ok(Value::Bool(l.loose_eq(r)))),
        OperatorDef::symbol("!=", 40).binary_fn(|l, r| Ok(Value::Bool(!l.loose_eq(r)))),
        OperatorDef::symbol(">", 40).binary_fn(compare_fn(">", |o| o == Ordering::Greater)),
        OperatorDef::symbol("<", 40).binary_fn(compare_fn("<", |o| o == Ordering::Less)),
        OperatorDef::symbol(">=", 40).binary_fn(compare_fn(">=", |o| o != Ordering::Less)),
        OperatorDef::symbol("<=", 40).binary_fn(compare_fn("<=", |o| o != Ordering::Greater)),
        OperatorDef::keyword("contains", 40)
            .inputs(["Str", "Str"])
            .binary_fn(|l, r| match (l, r) {
                (Value::Str(hay), Value::Str(needle)) => Ok(Value::Bool(hay.contains(needle))),
                _ => Err(RuleEvaluationError::new(format!(
                    "'contains' expects two strings, got {} and {}",
                    l.type_name(),
                    r.type_name()
                ))),
            }),
        OperatorDef::keyword("contains", 40)
            .inputs(["List", WILDCARD])
            .binary_fn(|l, r| membership(r, l)),
    ]
}

/// Build an operator registry for a preset. The irreducible minimum (`and`,
/// `or`, `not`) is always present.
#[must_use]
pub fn build_operator_registry(preset: &OperatorPreset) -> OperatorRegistry {
    let enabled: Option<Vec<&str>> = match preset {
        OperatorPreset::Standard => None,
        OperatorPreset::Minimal => Some(ALWAYS.to_vec()),
        OperatorPreset::Explicit(tokens) => Some(
            tokens
                .iter()
                .map(String::as_str)
                .chain(ALWAYS)
                .collect(),
        ),
    };

    let mut registry = OperatorRegistry::new();
    for op in builtin_operators() {
        let keep = enabled
            .as_ref()
            .is_none_or(|tokens| tokens.contains(&op.token()));
        if keep {
            // Built-in definitions never conflict with each other.
            let _ = registry.register(op);
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_duplicate_signature_conflicts() {
        let mut reg = OperatorRegistry::new();
        reg.register(OperatorDef::symbol("~", 40)).unwrap();
        let err = reg.register(OperatorDef::symbol("~", 40)).unwrap_err();
        assert!(err.message.contains("already registered"));
    }

    #[test]
    fn register_same_token_different_types_ok() {
        let mut reg = OperatorRegistry::new();
        reg.register(OperatorDef::keyword("contains", 40).inputs(["Str", "Str"]))
            .unwrap();
        reg.register(OperatorDef::keyword("contains", 40).inputs(["List", WILDCARD]))
            .unwrap();
        assert_eq!(reg.candidates("contains").len(), 2);
    }

    #[test]
    fn register_conflicting_binding_power_rejected() {
        let mut reg = OperatorRegistry::new();
        reg.register(OperatorDef::symbol("~", 40)).unwrap();
        let err = reg
            .register(OperatorDef::symbol("~", 50).inputs(["Int", "Int"]))
            .unwrap_err();
        assert!(err.message.contains("binding power"));
    }

    #[test]
    fn exact_match_beats_wildcard() {
        let reg = build_operator_registry(&OperatorPreset::Standard);
        let op = reg.lookup_by_types("contains", &["Str", "Str"]).unwrap();
        assert_eq!(op.input_types(), ["Str", "Str"]);
        let op = reg.lookup_by_types("contains", &["List", "Int"]).unwrap();
        assert_eq!(op.input_types(), ["List", "*"]);
    }

    #[test]
    fn any_operand_matches_typed_signature() {
        let reg = build_operator_registry(&OperatorPreset::Standard);
        assert!(reg.lookup_by_types("and", &["Any", "Bool"]).is_some());
    }

    #[test]
    fn lookup_unknown_token_returns_none() {
        let reg = build_operator_registry(&OperatorPreset::Standard);
        assert!(reg.lookup_by_types("xor", &["Bool", "Bool"]).is_none());
    }

    #[test]
    fn binding_powers_follow_precedence_ladder() {
        let reg = build_operator_registry(&OperatorPreset::Standard);
        assert_eq!(reg.get_binding_power("or"), Some(10));
        assert_eq!(reg.get_binding_power("and"), Some(20));
        assert_eq!(reg.get_binding_power("not"), Some(30));
        assert_eq!(reg.get_binding_power("="), Some(40));
        assert_eq!(reg.get_binding_power(">="), Some(40));
    }

    #[test]
    fn minimal_preset_keeps_only_logic() {
        let reg = build_operator_registry(&OperatorPreset::Minimal);
        assert!(reg.get_binding_power("and").is_some());
        assert!(reg.get_binding_power("or").is_some());
        assert!(reg.get_binding_power("not").is_some());
        assert!(reg.get_binding_power(">").is_none());
        assert!(reg.get_binding_power("in").is_none());
    }

    #[test]
    fn explicit_preset_unions_minimum() {
        let reg = build_operator_registry(&OperatorPreset::Explicit(vec![">".into()]));
        assert!(reg.get_binding_power(">").is_some());
        assert!(reg.get_binding_power("and").is_some());
        assert!(reg.get_binding_power("<").is_none());
    }

    #[test]
    fn symbols_sorted_longest_first() {
        let reg = build_operator_registry(&OperatorPreset::Standard);
        let symbols = reg.symbols_longest_first();
        let ge = symbols.iter().position(|s| *s == ">=").unwrap();
        let gt = symbols.iter().position(|s| *s == ">").unwrap();
        assert!(ge < gt);
    }

    #[test]
    fn membership_checks_loose_equality() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            membership(&Value::Float(2.0), &list).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            membership(&Value::Int(3), &list).unwrap(),
            Value::Bool(false)
        );
        assert!(membership(&Value::Int(1), &Value::Int(1)).is_err());
    }

    #[test]
    fn comparison_fn_rejects_mixed_kinds() {
        let gt = compare_fn(">", |o| o == Ordering::Greater);
        assert!(gt(&Value::Int(1), &Value::Str("a".into())).is_err());
        assert_eq!(
            gt(&Value::Int(2), &Value::Int(1)).unwrap(),
            Value::Bool(true)
        );
    }
}
