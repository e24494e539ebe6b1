mod compile;
mod engine;
mod error;
mod evaluate;
mod ops;
mod rules;
mod schema;
mod types;
mod validate;

pub use engine::{DecisionsMode, Engine, EngineBuilder, RulesMode};
pub use error::{
    DecisionValidationError, EngineAlreadyFrozenError, Error, OperatorConflictError,
    RuleEvaluationError, RuleParseError, SchemaParseError, SchemaValidationError,
    TypeMismatchError,
};
pub use ops::{
    Assoc, BinaryFn, Fixity, OpFn, OperatorDef, OperatorPreset, OperatorRegistry, UnaryFn,
    WILDCARD, build_operator_registry,
};
pub use rules::{RuleAst, RuleNode};
pub use schema::{
    Constraint, FieldDef, FunctionSig, ParamDef, Primitive, SchemaAst, SchemaRegistry, StructDef,
    TypeExpr, parse_schema,
};
pub use types::{
    Aggregate, CompiledRule, CompiledRuleSet, Decision, HostFn, MatchConfig, MatchResult,
    RuleSpec, SortOrder, TypeDef, TypeRegistry, TypeValidatorFn, Value,
};
