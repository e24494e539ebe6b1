use std::fmt;

use thiserror::Error;

/// Unified error type covering every stage of the engine pipeline.
///
/// Returned by convenience surfaces like [`Engine::load_schema`](crate::Engine::load_schema)
/// that can fail in more than one way.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    SchemaParse(#[from] SchemaParseError),

    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    #[error(transparent)]
    RuleParse(#[from] RuleParseError),

    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    #[error(transparent)]
    DecisionValidation(#[from] DecisionValidationError),

    #[error(transparent)]
    RuleEvaluation(#[from] RuleEvaluationError),

    #[error(transparent)]
    OperatorConflict(#[from] OperatorConflictError),

    #[error(transparent)]
    AlreadyFrozen(#[from] EngineAlreadyFrozenError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Schema text failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaParseError {
    pub message: String,
    /// 1-based line where the parser gave up, when known.
    pub line: Option<usize>,
}

impl SchemaParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub(crate) fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for SchemaParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "schema parse error at line {line}: {}", self.message),
            None => write!(f, "schema parse error: {}", self.message),
        }
    }
}

impl std::error::Error for SchemaParseError {}

/// A parsed schema is not self-consistent (duplicate names, unknown type
/// references, or cyclic struct references). Also raised by registries for
/// registrations that would break schema-level invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SchemaValidationError {
    pub message: String,
    pub field: Option<String>,
}

impl SchemaValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub(crate) fn for_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// A rule expression failed to tokenize or parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleParseError {
    pub message: String,
    /// The unresolved field path, when the failure is a name lookup.
    pub field: Option<String>,
}

impl RuleParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub(crate) fn unknown_field(path: &str) -> Self {
        Self {
            message: format!("Unknown field '{path}'"),
            field: Some(path.to_owned()),
        }
    }
}

/// Strict rules mode detected an operand or argument type the expression
/// cannot satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TypeMismatchError {
    pub message: String,
    pub field: Option<String>,
    pub expected: Option<String>,
    pub got: Option<String>,
}

impl TypeMismatchError {
    pub(crate) fn expected_got(
        message: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            field: None,
            expected: Some(expected.into()),
            got: Some(got.into()),
        }
    }
}

/// A decision record violates the schema (strict decisions mode only; loose
/// mode reports the same text through `MatchResult::warnings`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DecisionValidationError {
    pub message: String,
    pub field: Option<String>,
    pub expected: Option<String>,
    pub got: Option<String>,
}

impl DecisionValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            expected: None,
            got: None,
        }
    }

    pub(crate) fn for_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
            expected: None,
            got: None,
        }
    }

    pub(crate) fn type_error(field: &str, expected: &str, got: &str) -> Self {
        Self {
            message: format!("Field '{field}' expected {expected}, got {got}"),
            field: Some(field.to_owned()),
            expected: Some(expected.to_owned()),
            got: Some(got.to_owned()),
        }
    }
}

/// A compiled rule hit a runtime problem (missing variable, absent function,
/// incomparable operands). Never escapes the evaluator shell: the affected
/// rule's outcome is demoted to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RuleEvaluationError {
    pub message: String,
    pub field: Option<String>,
}

impl RuleEvaluationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub(crate) fn missing_variable(path: &str) -> Self {
        Self {
            message: format!("Variable '{path}' not found in decision"),
            field: Some(path.to_owned()),
        }
    }
}

/// An operator registration collides with an existing definition
/// (same token, same exact input-type tuple) or contradicts the token's
/// established binding power or fixity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperatorConflictError {
    pub message: String,
}

impl OperatorConflictError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Registration was attempted after the engine's first `compile` or `eval`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineAlreadyFrozenError {
    pub message: String,
}

impl EngineAlreadyFrozenError {
    pub(crate) fn new() -> Self {
        Self {
            message: "Engine is frozen; registration must happen before the first compile() or eval()"
                .to_owned(),
        }
    }
}
