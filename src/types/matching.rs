use std::fmt;

use serde::Serialize;

use super::Value;

/// Sort direction for `first` match mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Score aggregation strategy. Only summation is defined; other names are
/// reserved and rejected by [`Aggregate::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Sum,
}

impl Aggregate {
    /// Parse an aggregate name. Reserved (unimplemented) names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Aggregate> {
        match name {
            "sum" => Some(Aggregate::Sum),
            _ => None,
        }
    }
}

/// How per-rule outcomes aggregate into a [`MatchResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum MatchConfig {
    /// Every truthy rule id lands in `matched`.
    All,
    /// Truthy ids sort by a metadata key; only the first survives.
    First { key: String, order: SortOrder },
    /// Falsy rule ids land in `excluded`.
    Inverse,
    /// Rule values accumulate numerically into `score`.
    Score {
        aggregate: Aggregate,
        threshold: Option<f64>,
    },
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig::All
    }
}

impl MatchConfig {
    /// `first` mode with the default key (`"ordering"`) and ascending order.
    #[must_use]
    pub fn first() -> Self {
        MatchConfig::First {
            key: "ordering".to_owned(),
            order: SortOrder::Asc,
        }
    }

    /// `first` mode sorting by an explicit metadata key.
    #[must_use]
    pub fn first_by(key: impl Into<String>, order: SortOrder) -> Self {
        MatchConfig::First {
            key: key.into(),
            order,
        }
    }

    /// `score` mode with the default `sum` aggregate and no threshold.
    #[must_use]
    pub fn score() -> Self {
        MatchConfig::Score {
            aggregate: Aggregate::Sum,
            threshold: None,
        }
    }

    /// `score` mode that also fills `matched` when the total reaches the
    /// threshold.
    #[must_use]
    pub fn score_with_threshold(threshold: f64) -> Self {
        MatchConfig::Score {
            aggregate: Aggregate::Sum,
            threshold: Some(threshold),
        }
    }
}

/// The structured outcome of evaluating a compiled rule set against one
/// decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct MatchResult {
    /// The decision's `id` field, when the input carried one.
    pub id: Option<Value>,
    /// Rule ids selected by the match mode.
    pub matched: Vec<String>,
    /// Rule ids excluded by `inverse` mode.
    pub excluded: Vec<String>,
    /// Accumulated total in `score` mode.
    pub score: Option<f64>,
    /// Decision validation warnings (loose decisions mode).
    pub warnings: Vec<String>,
}

impl MatchResult {
    pub(crate) fn new(id: Option<Value>, warnings: Vec<String>) -> Self {
        Self {
            id,
            matched: Vec::new(),
            excluded: Vec::new(),
            score: None,
            warnings,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "decision {id}: ")?,
            None => write!(f, "decision: ")?,
        }
        write!(f, "matched [{}]", self.matched.join(", "))?;
        if !self.excluded.is_empty() {
            write!(f, ", excluded [{}]", self.excluded.join(", "))?;
        }
        if let Some(score) = self.score {
            write!(f, ", score {score}")?;
        }
        if !self.warnings.is_empty() {
            write!(f, ", {} warning(s)", self.warnings.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_all() {
        assert_eq!(MatchConfig::default(), MatchConfig::All);
    }

    #[test]
    fn first_defaults_to_ordering_asc() {
        let MatchConfig::First { key, order } = MatchConfig::first() else {
            panic!("expected first mode");
        };
        assert_eq!(key, "ordering");
        assert_eq!(order, SortOrder::Asc);
    }

    #[test]
    fn aggregate_parse_accepts_only_sum() {
        assert_eq!(Aggregate::parse("sum"), Some(Aggregate::Sum));
        assert_eq!(Aggregate::parse("max"), None);
        assert_eq!(Aggregate::parse("weighted_sum"), None);
    }

    #[test]
    fn result_display() {
        let mut result = MatchResult::new(Some(Value::Str("d-1".into())), vec![]);
        result.matched.push("r1".to_owned());
        result.score = Some(2.0);
        let text = result.to_string();
        assert!(text.contains("matched [r1]"));
        assert!(text.contains("score 2"));
    }

    #[test]
    fn result_serializes_to_json() {
        let result = MatchResult::new(None, vec!["warn".to_owned()]);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"warnings\":[\"warn\"]"));
        assert!(json.contains("\"id\":null"));
    }
}
