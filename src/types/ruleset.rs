use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::compile::CompiledExpr;
use crate::error::DecisionValidationError;
use crate::evaluate;
use crate::validate::DecisionValidator;

use super::{Decision, FunctionMap, MatchConfig, MatchResult, Value};

/// One rule as submitted to `compile`: an external id, the rule expression
/// text, and caller-supplied metadata (e.g. `ordering` for `first` mode).
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub id: String,
    pub rule: String,
    pub metadata: BTreeMap<String, Value>,
}

impl RuleSpec {
    #[must_use]
    pub fn new(id: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rule: rule.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Shorthand for the `ordering` key used by `first` match mode.
    #[must_use]
    pub fn with_ordering(self, ordering: i64) -> Self {
        self.with_meta("ordering", ordering)
    }
}

/// A rule compiled into an evaluator tree, with its referenced names kept
/// for introspection.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub(crate) id: String,
    pub(crate) expr: CompiledExpr,
    pub(crate) return_type: String,
    pub(crate) variables: Vec<String>,
    pub(crate) functions: Vec<String>,
    pub(crate) metadata: BTreeMap<String, Value>,
}

impl CompiledRule {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Dotted field paths the rule reads.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Function names the rule calls.
    #[must_use]
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}

/// An immutable compiled rule set: ordered rules, a match configuration, and
/// shared handles to the engine's validator and function map.
///
/// Read-only after construction and `Send + Sync`; share it across threads
/// behind an `Arc`. Multiple sets may coexist per engine.
#[derive(Clone)]
pub struct CompiledRuleSet {
    rules: Vec<CompiledRule>,
    validator: DecisionValidator,
    functions: Arc<FunctionMap>,
    config: MatchConfig,
    compile_warnings: Vec<String>,
}

impl CompiledRuleSet {
    pub(crate) fn new(
        rules: Vec<CompiledRule>,
        validator: DecisionValidator,
        functions: Arc<FunctionMap>,
        config: MatchConfig,
        compile_warnings: Vec<String>,
    ) -> Self {
        Self {
            rules,
            validator,
            functions,
            config,
            compile_warnings,
        }
    }

    /// Evaluate every rule against one decision and aggregate per the match
    /// configuration.
    ///
    /// # Errors
    ///
    /// [`DecisionValidationError`] when strict decisions mode rejects the
    /// record. Loose mode never errors; anomalies land in
    /// [`MatchResult::warnings`].
    pub fn eval_single(&self, decision: &Decision) -> Result<MatchResult, DecisionValidationError> {
        let (cleaned, warnings) = self.validator.validate(decision)?;
        let results = evaluate::run_rules(&self.rules, &cleaned, &self.functions);
        Ok(evaluate::aggregate(
            decision.id().cloned(),
            &results,
            &self.rules,
            &self.config,
            warnings,
        ))
    }

    /// Evaluate a batch of decisions in order.
    ///
    /// # Errors
    ///
    /// In strict decisions mode the first invalid decision fails the batch.
    pub fn eval(
        &self,
        decisions: &[Decision],
    ) -> Result<Vec<MatchResult>, DecisionValidationError> {
        decisions.iter().map(|d| self.eval_single(d)).collect()
    }

    /// Rule ids in declared (evaluation) order.
    #[must_use]
    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(CompiledRule::id).collect()
    }

    #[must_use]
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Best-effort compilation warnings recorded in loose rules mode.
    #[must_use]
    pub fn compile_warnings(&self) -> &[String] {
        &self.compile_warnings
    }

    #[must_use]
    pub fn match_config(&self) -> &MatchConfig {
        &self.config
    }
}

impl fmt::Debug for CompiledRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRuleSet")
            .field("rules", &self.rules)
            .field("config", &self.config)
            .field("compile_warnings", &self.compile_warnings)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for CompiledRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledRuleSet({} rules, {:?} mode)",
            self.rules.len(),
            self.config
        )
    }
}
