use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::compile::Compiler;
use crate::error::{
    EngineAlreadyFrozenError, Error, RuleEvaluationError, RuleParseError, SchemaValidationError,
};
use crate::ops::{OperatorDef, OperatorPreset, OperatorRegistry, build_operator_registry};
use crate::rules::parse_rule;
use crate::schema::{Primitive, SchemaRegistry, parse_schema};
use crate::types::ruleset::CompiledRule;
use crate::types::{
    CompiledRuleSet, Decision, FunctionMap, MatchConfig, MatchResult, RuleSpec, TypeRegistry,
    Value,
};
use crate::validate::DecisionValidator;

/// Enforcement level for type mismatches found while parsing and compiling
/// rules: strict raises, loose records a warning and best-effort-compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RulesMode {
    #[default]
    Strict,
    Loose,
}

/// Enforcement level for decision conformance: strict raises on the first
/// violation, loose reports warnings and proceeds with what remains valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecisionsMode {
    Strict,
    #[default]
    Loose,
}

/// Configures and constructs an [`Engine`].
///
/// # Example
///
/// ```
/// use decree::{Engine, OperatorPreset, RulesMode};
///
/// let engine = Engine::builder()
///     .rules_mode(RulesMode::Strict)
///     .operators(OperatorPreset::Standard)
///     .load_schema("credit_score: Int")
///     .unwrap();
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    rules_mode: RulesMode,
    decisions_mode: DecisionsMode,
    operators: OperatorPreset,
    functions: FunctionMap,
}

impl EngineBuilder {
    #[must_use]
    pub fn rules_mode(mut self, mode: RulesMode) -> Self {
        self.rules_mode = mode;
        self
    }

    #[must_use]
    pub fn decisions_mode(mut self, mode: DecisionsMode) -> Self {
        self.decisions_mode = mode;
        self
    }

    #[must_use]
    pub fn operators(mut self, preset: OperatorPreset) -> Self {
        self.operators = preset;
        self
    }

    /// Bind a host function callable from rules.
    #[must_use]
    pub fn function(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, RuleEvaluationError> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    /// Build the engine from a schema source: a filesystem path or inline
    /// schema text, distinguished by probing the filesystem.
    ///
    /// # Errors
    ///
    /// I/O errors for unreadable files, [`Error::SchemaParse`] for malformed
    /// schema text, [`Error::SchemaValidation`] for inconsistent schemas.
    pub fn load_schema(self, source: &str) -> Result<Engine, Error> {
        let text = resolve_source(source)?;
        let ast = parse_schema(&text)?;
        let types = TypeRegistry::with_builtins();
        let ops = build_operator_registry(&self.operators);
        let schema = SchemaRegistry::new(ast, &types.registered_names())?;
        Ok(Engine {
            schema: Arc::new(schema),
            types: Arc::new(types),
            ops: Arc::new(ops),
            functions: Arc::new(self.functions),
            rules_mode: self.rules_mode,
            decisions_mode: self.decisions_mode,
            frozen: false,
            current: None,
            last_match: MatchConfig::default(),
        })
    }
}

fn resolve_source(source: &str) -> Result<String, Error> {
    if Path::new(source).is_file() {
        Ok(std::fs::read_to_string(source)?)
    } else {
        Ok(source.to_owned())
    }
}

/// The engine façade: one schema, its registries, and a function map, with a
/// freeze-before-use lifecycle. All registration must happen before the
/// first `compile` or `eval`; afterwards the registries are immutable and
/// compiled rule sets share them.
pub struct Engine {
    schema: Arc<SchemaRegistry>,
    types: Arc<TypeRegistry>,
    ops: Arc<OperatorRegistry>,
    functions: Arc<FunctionMap>,
    rules_mode: RulesMode,
    decisions_mode: DecisionsMode,
    frozen: bool,
    current: Option<Arc<CompiledRuleSet>>,
    last_match: MatchConfig,
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build an engine with default modes (strict rules, loose decisions)
    /// and the `standard` operator preset.
    ///
    /// # Errors
    ///
    /// See [`EngineBuilder::load_schema`].
    pub fn load_schema(source: &str) -> Result<Engine, Error> {
        Engine::builder().load_schema(source)
    }

    fn ensure_unfrozen(&self) -> Result<(), EngineAlreadyFrozenError> {
        if self.frozen {
            Err(EngineAlreadyFrozenError::new())
        } else {
            Ok(())
        }
    }

    /// Bind a host function callable from rules.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyFrozen`] after the first `compile` or `eval`.
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, RuleEvaluationError> + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        let functions =
            Arc::get_mut(&mut self.functions).ok_or_else(EngineAlreadyFrozenError::new)?;
        functions.insert(name.into(), Arc::new(f));
        Ok(())
    }

    /// Register a custom type: a name bound to a base primitive plus a
    /// refining validator.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyFrozen`] after freeze; [`Error::SchemaValidation`]
    /// when the name collides with a primitive, an existing custom type, or
    /// a schema struct.
    pub fn register_type(
        &mut self,
        name: &str,
        base: Primitive,
        validator: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        if self.schema.struct_def(name).is_some() {
            return Err(SchemaValidationError::new(format!(
                "type name '{name}' collides with a schema struct"
            ))
            .into());
        }
        let types = Arc::get_mut(&mut self.types).ok_or_else(EngineAlreadyFrozenError::new)?;
        types.register(name, base, Arc::new(validator))?;
        Ok(())
    }

    /// Register an operator definition in the expression language.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyFrozen`] after freeze; [`Error::OperatorConflict`]
    /// for duplicate or contradictory definitions.
    pub fn register_operator(&mut self, op: OperatorDef) -> Result<(), Error> {
        self.ensure_unfrozen()?;
        let ops = Arc::get_mut(&mut self.ops).ok_or_else(EngineAlreadyFrozenError::new)?;
        ops.register(op)?;
        Ok(())
    }

    /// Compile a list of rules into an immutable [`CompiledRuleSet`].
    /// Freezes the engine.
    ///
    /// # Errors
    ///
    /// [`Error::RuleParse`] for syntax or name failures and duplicate rule
    /// ids; [`Error::TypeMismatch`] in strict rules mode.
    pub fn compile(
        &mut self,
        rules: &[RuleSpec],
        config: Option<MatchConfig>,
    ) -> Result<CompiledRuleSet, Error> {
        self.frozen = true;
        let config = config.unwrap_or_default();
        self.last_match = config.clone();

        let mut compiled = Vec::with_capacity(rules.len());
        let mut warnings = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for spec in rules {
            if !seen.insert(spec.id.as_str()) {
                return Err(
                    RuleParseError::new(format!("duplicate rule id '{}'", spec.id)).into(),
                );
            }
            let parsed = parse_rule(&spec.rule, &self.schema, &self.ops, self.rules_mode)?;
            warnings.extend(
                parsed
                    .warnings
                    .iter()
                    .map(|w| format!("rule '{}': {w}", spec.id)),
            );
            let mut compiler = Compiler::new(&self.schema, self.rules_mode);
            let expr = compiler.compile(&parsed.ast)?;
            warnings.extend(
                compiler
                    .warnings
                    .iter()
                    .map(|w| format!("rule '{}': {w}", spec.id)),
            );
            compiled.push(CompiledRule {
                id: spec.id.clone(),
                expr,
                return_type: parsed.ast.return_type.clone(),
                variables: parsed.ast.variables.clone(),
                functions: parsed.ast.functions.clone(),
                metadata: spec.metadata.clone(),
            });
        }

        let validator = DecisionValidator::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.types),
            self.decisions_mode,
        );
        Ok(CompiledRuleSet::new(
            compiled,
            validator,
            Arc::clone(&self.functions),
            config,
            warnings,
        ))
    }

    /// Compile and evaluate against a single decision in one step.
    ///
    /// # Errors
    ///
    /// Compilation errors as in [`Engine::compile`];
    /// [`Error::DecisionValidation`] in strict decisions mode.
    pub fn eval(
        &mut self,
        rules: &[RuleSpec],
        decision: &Decision,
        config: Option<MatchConfig>,
    ) -> Result<MatchResult, Error> {
        let set = self.compile(rules, config)?;
        Ok(set.eval_single(decision)?)
    }

    /// Atomically replace the engine's current rule set, leaving every
    /// registry untouched. The new set is compiled with the most recent
    /// match configuration; readers of the previous handle keep a
    /// consistent snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::compile`]; on error the current set is unchanged.
    pub fn update_rules(&mut self, rules: &[RuleSpec]) -> Result<Arc<CompiledRuleSet>, Error> {
        let config = self.last_match.clone();
        let set = Arc::new(self.compile(rules, Some(config))?);
        self.current = Some(Arc::clone(&set));
        Ok(set)
    }

    /// The rule set installed by the last [`Engine::update_rules`] call.
    #[must_use]
    pub fn current_rules(&self) -> Option<&Arc<CompiledRuleSet>> {
        self.current.as_ref()
    }

    /// Serialize the schema back to schema text.
    #[must_use]
    pub fn export_schema(&self) -> String {
        self.schema.export_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(texts: &[(&str, &str)]) -> Vec<RuleSpec> {
        texts
            .iter()
            .map(|(id, rule)| RuleSpec::new(*id, *rule))
            .collect()
    }

    #[test]
    fn load_schema_inline() {
        let engine = Engine::load_schema("credit_score: Int").unwrap();
        assert!(engine.export_schema().contains("credit_score: Int"));
    }

    #[test]
    fn load_schema_from_file() {
        let path = std::env::temp_dir().join("decree_engine_test.schema");
        std::fs::write(&path, "credit_score: Int\n").unwrap();
        let engine = Engine::load_schema(path.to_str().unwrap()).unwrap();
        assert!(engine.export_schema().contains("credit_score"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn registration_before_freeze_succeeds() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        engine
            .add_function("double", |args| {
                Ok(match args.first() {
                    Some(Value::Int(i)) => Value::Int(i * 2),
                    _ => Value::Null,
                })
            })
            .unwrap();
        engine
            .register_type("even", Primitive::Int, |v| {
                matches!(v, Value::Int(i) if i % 2 == 0)
            })
            .unwrap();
        engine
            .register_operator(
                OperatorDef::symbol("~=", 40)
                    .inputs(["Str", "Str"])
                    .binary_fn(|l, r| {
                        Ok(Value::Bool(
                            matches!((l, r), (Value::Str(a), Value::Str(b)) if a.eq_ignore_ascii_case(b)),
                        ))
                    }),
            )
            .unwrap();
    }

    #[test]
    fn registration_after_compile_is_frozen() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        engine
            .compile(&rules(&[("r", "score > 0")]), None)
            .unwrap();

        let err = engine.add_function("f", |_| Ok(Value::Null)).unwrap_err();
        assert!(matches!(err, Error::AlreadyFrozen(_)));
        let err = engine
            .register_type("t", Primitive::Int, |_| true)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyFrozen(_)));
        let err = engine
            .register_operator(OperatorDef::symbol("~", 40))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyFrozen(_)));
    }

    #[test]
    fn eval_freezes_too() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        let decision = Decision::new().set("score", 1_i64);
        engine
            .eval(&rules(&[("r", "score > 0")]), &decision, None)
            .unwrap();
        assert!(engine.add_function("f", |_| Ok(Value::Null)).is_err());
    }

    #[test]
    fn duplicate_rule_ids_rejected() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        let err = engine
            .compile(&rules(&[("r", "score > 0"), ("r", "score < 0")]), None)
            .unwrap_err();
        assert!(matches!(err, Error::RuleParse(_)));
    }

    #[test]
    fn register_type_struct_collision_rejected() {
        let mut engine = Engine::load_schema("struct Addr { city: Str }\naddr: Addr").unwrap();
        let err = engine
            .register_type("Addr", Primitive::Str, |_| true)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
    }

    #[test]
    fn update_rules_replaces_current_set() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        let first = engine.update_rules(&rules(&[("a", "score > 0")])).unwrap();
        assert_eq!(first.rule_ids(), vec!["a"]);
        let second = engine.update_rules(&rules(&[("b", "score < 0")])).unwrap();
        assert_eq!(second.rule_ids(), vec!["b"]);
        // The old handle still sees its own snapshot.
        assert_eq!(first.rule_ids(), vec!["a"]);
        assert_eq!(
            engine.current_rules().map(|set| set.rule_ids()),
            Some(vec!["b"])
        );
    }

    #[test]
    fn update_rules_keeps_last_match_config() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        engine
            .compile(&rules(&[("a", "score > 0")]), Some(MatchConfig::first()))
            .unwrap();
        let set = engine.update_rules(&rules(&[("b", "score > 0")])).unwrap();
        assert!(matches!(set.match_config(), MatchConfig::First { .. }));
    }

    #[test]
    fn multiple_compiled_sets_coexist() {
        let mut engine = Engine::load_schema("score: Int").unwrap();
        let set_a = engine.compile(&rules(&[("a", "score > 0")]), None).unwrap();
        let set_b = engine.compile(&rules(&[("b", "score < 0")]), None).unwrap();
        let decision = Decision::new().set("score", 5_i64);
        assert_eq!(set_a.eval_single(&decision).unwrap().matched, vec!["a"]);
        assert!(set_b.eval_single(&decision).unwrap().matched.is_empty());
    }
}
