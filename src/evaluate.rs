use std::cmp::Ordering;

use crate::compile::CompiledExpr;
use crate::error::RuleEvaluationError;
use crate::types::ruleset::CompiledRule;
use crate::types::{Decision, FunctionMap, MatchConfig, MatchResult, SortOrder, Value};

/// Evaluate one compiled expression over a cleaned decision.
///
/// # Errors
///
/// [`RuleEvaluationError`] for missing variables, absent functions, and
/// operator failures. Callers demote these to a falsy rule outcome.
pub(crate) fn eval_expr(
    expr: &CompiledExpr,
    decision: &Decision,
    functions: &FunctionMap,
) -> Result<Value, RuleEvaluationError> {
    match expr {
        CompiledExpr::Const(value) => Ok(value.clone()),
        CompiledExpr::Field { path } => decision
            .get(path)
            .cloned()
            .ok_or_else(|| RuleEvaluationError::missing_variable(path)),
        CompiledExpr::And(left, right) => {
            if !eval_expr(left, decision, functions)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(right, decision, functions)?.is_truthy()))
        }
        CompiledExpr::Or(left, right) => {
            if eval_expr(left, decision, functions)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(right, decision, functions)?.is_truthy()))
        }
        CompiledExpr::Not(inner) => Ok(Value::Bool(
            !eval_expr(inner, decision, functions)?.is_truthy(),
        )),
        CompiledExpr::Unary { func, operand } => {
            let value = eval_expr(operand, decision, functions)?;
            func(&value)
        }
        CompiledExpr::Binary { func, left, right } => {
            let l = eval_expr(left, decision, functions)?;
            let r = eval_expr(right, decision, functions)?;
            func(&l, &r)
        }
        CompiledExpr::Call { name, args } => {
            let Some(f) = functions.get(name) else {
                return Err(RuleEvaluationError::new(format!(
                    "Function '{name}' not found"
                )));
            };
            let values = args
                .iter()
                .map(|arg| eval_expr(arg, decision, functions))
                .collect::<Result<Vec<_>, _>>()?;
            f(&values)
        }
    }
}

/// Run every rule in declared order over a cleaned decision. A rule whose
/// evaluation errors contributes `false`; a single bad rule cannot poison
/// the batch.
pub(crate) fn run_rules<'a>(
    rules: &'a [CompiledRule],
    decision: &Decision,
    functions: &FunctionMap,
) -> Vec<(&'a str, Value)> {
    rules
        .iter()
        .map(|rule| {
            let value = eval_expr(&rule.expr, decision, functions)
                .unwrap_or(Value::Bool(false));
            (rule.id.as_str(), value)
        })
        .collect()
}

/// Aggregate per-rule outcomes into a [`MatchResult`] per the match mode.
pub(crate) fn aggregate(
    id: Option<Value>,
    results: &[(&str, Value)],
    rules: &[CompiledRule],
    config: &MatchConfig,
    warnings: Vec<String>,
) -> MatchResult {
    let mut outcome = MatchResult::new(id, warnings);
    match config {
        MatchConfig::All => {
            outcome.matched = truthy_ids(results);
        }
        MatchConfig::First { key, order } => {
            let mut matched = truthy_ids(results);
            if matched.is_empty() {
                return outcome;
            }
            // Stable sort: declaration order breaks metadata ties.
            matched.sort_by(|a, b| {
                let ka = ordering_key(rules, a, key);
                let kb = ordering_key(rules, b, key);
                let cmp = ka.partial_cmp(&kb).unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                }
            });
            outcome.matched = vec![matched.remove(0)];
        }
        MatchConfig::Inverse => {
            outcome.excluded = results
                .iter()
                .filter(|(_, value)| !value.is_truthy())
                .map(|(rule_id, _)| (*rule_id).to_owned())
                .collect();
        }
        MatchConfig::Score { threshold, .. } => {
            let total: f64 = results.iter().map(|(_, value)| score_of(value)).sum();
            outcome.score = Some(total);
            if let Some(threshold) = threshold
                && total >= *threshold
            {
                outcome.matched = truthy_ids(results);
            }
        }
    }
    outcome
}

fn truthy_ids(results: &[(&str, Value)]) -> Vec<String> {
    results
        .iter()
        .filter(|(_, value)| value.is_truthy())
        .map(|(rule_id, _)| (*rule_id).to_owned())
        .collect()
}

/// Booleans contribute 1/0, numbers pass through, other kinds contribute 0.
#[allow(clippy::cast_precision_loss)]
fn score_of(value: &Value) -> f64 {
    match value {
        Value::Bool(true) => 1.0,
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

/// The numeric sort key for `first` mode; rules without the metadata key
/// sort last (positive infinity).
#[allow(clippy::cast_precision_loss)]
fn ordering_key(rules: &[CompiledRule], rule_id: &str, key: &str) -> f64 {
    rules
        .iter()
        .find(|rule| rule.id == rule_id)
        .and_then(|rule| rule.metadata.get(key))
        .and_then(|value| match value {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        })
        .unwrap_or(f64::INFINITY)
}
