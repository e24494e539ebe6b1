mod decision;
mod matching;
pub(crate) mod ruleset;
mod type_registry;
mod value;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RuleEvaluationError;

pub use decision::Decision;
pub use matching::{Aggregate, MatchConfig, MatchResult, SortOrder};
pub use ruleset::{CompiledRule, CompiledRuleSet, RuleSpec};
pub use type_registry::{TypeDef, TypeRegistry, TypeValidatorFn};
pub use value::Value;

/// A caller-supplied function invocable from rules: `(args) -> value`.
pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuleEvaluationError> + Send + Sync>;

/// Name-keyed map of host functions bound to an engine.
pub(crate) type FunctionMap = BTreeMap<String, HostFn>;
