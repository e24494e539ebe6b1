use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::Regex;

use crate::engine::DecisionsMode;
use crate::error::DecisionValidationError;
use crate::schema::{Constraint, FieldDef, Primitive, SchemaRegistry, TypeExpr};
use crate::types::{Decision, TypeRegistry, Value};

/// Validates incoming decisions against the schema and per-field
/// constraints. Strict mode raises on the first violation; loose mode
/// collects every violation as a warning and drops the offending field.
#[derive(Debug, Clone)]
pub(crate) struct DecisionValidator {
    schema: Arc<SchemaRegistry>,
    types: Arc<TypeRegistry>,
    mode: DecisionsMode,
    /// `pattern` constraints pre-compiled (anchored for full-string match).
    patterns: HashMap<String, Regex>,
}

impl DecisionValidator {
    pub(crate) fn new(
        schema: Arc<SchemaRegistry>,
        types: Arc<TypeRegistry>,
        mode: DecisionsMode,
    ) -> Self {
        let mut patterns = HashMap::new();
        let mut collect = |fields: &[FieldDef]| {
            for f in fields {
                for c in &f.constraints {
                    if let Constraint::Pattern(src) = c
                        && !patterns.contains_key(src)
                        && let Ok(re) = Regex::new(&format!("^(?:{src})$"))
                    {
                        patterns.insert(src.clone(), re);
                    }
                }
            }
        };
        collect(schema.top_level_fields());
        let struct_names: Vec<String> = schema
            .top_level_fields()
            .iter()
            .filter_map(|f| match &f.ty {
                TypeExpr::Named(n) => Some(n.clone()),
                _ => None,
            })
            .collect();
        // Nested struct fields can carry patterns too; walk every struct the
        // schema declares (cycles are impossible post-validation).
        let mut pending = struct_names;
        let mut seen = Vec::new();
        while let Some(name) = pending.pop() {
            if seen.contains(&name) {
                continue;
            }
            if let Some(def) = schema.struct_def(&name) {
                collect(&def.fields);
                for f in &def.fields {
                    if let TypeExpr::Named(n) = &f.ty {
                        pending.push(n.clone());
                    }
                }
            }
            seen.push(name);
        }

        Self {
            schema,
            types,
            mode,
            patterns,
        }
    }

    /// Validate one decision, returning the cleaned record and any
    /// warnings (loose mode).
    ///
    /// # Errors
    ///
    /// In strict mode, [`DecisionValidationError`] on the first violation.
    pub(crate) fn validate(
        &self,
        decision: &Decision,
    ) -> Result<(Decision, Vec<String>), DecisionValidationError> {
        let mut cleaned: BTreeMap<String, Value> = BTreeMap::new();
        let mut warnings: Vec<String> = Vec::new();

        for field in self.schema.top_level_fields() {
            match self.check_field(field, decision.get(&field.name), &field.name) {
                Ok(Some(value)) => {
                    cleaned.insert(field.name.clone(), value);
                }
                Ok(None) => {}
                Err(violation) => match self.mode {
                    DecisionsMode::Strict => {
                        return Err(DecisionValidationError::for_field(
                            violation,
                            field.name.clone(),
                        ));
                    }
                    DecisionsMode::Loose => warnings.push(violation),
                },
            }
        }

        // Extra fields not declared in the schema pass through unchanged.
        for (name, value) in decision.iter() {
            if self.schema.get_field(name).is_none() && !cleaned.contains_key(name) {
                cleaned.insert(name.to_owned(), value.clone());
            }
        }

        Ok((Decision::from(cleaned), warnings))
    }

    /// Validate one field's value. `Ok(None)` means "skip silently"
    /// (optional and absent); `Err` carries the violation message.
    fn check_field(
        &self,
        field: &FieldDef,
        value: Option<&Value>,
        path: &str,
    ) -> Result<Option<Value>, String> {
        let value = match value {
            None => {
                if field.optional {
                    return Ok(None);
                }
                return Err(format!("Required field '{path}' is missing"));
            }
            Some(Value::Null) => {
                if field.optional {
                    return Ok(None);
                }
                return Err(format!(
                    "Field '{path}' expected {}, got Null",
                    field.ty.type_name()
                ));
            }
            Some(v) => v,
        };

        self.check_type(&field.ty, value, path)?;

        for constraint in &field.constraints {
            if let Some(violation) = self.check_constraint(constraint, value) {
                return Err(format!("Field '{path}' constraint violation: {violation}"));
            }
        }

        Ok(Some(value.clone()))
    }

    /// Base-type conformance. Values are never coerced: `Int` excludes
    /// booleans, `Float` accepts integers, `Str` and `Bool` are exact.
    fn check_type(&self, ty: &TypeExpr, value: &Value, path: &str) -> Result<(), String> {
        match ty {
            TypeExpr::Primitive(p) => {
                if primitive_matches(*p, value) {
                    Ok(())
                } else {
                    Err(format!(
                        "Field '{path}' expected {}, got {}",
                        p.name(),
                        value.type_name()
                    ))
                }
            }
            TypeExpr::List(element_types) => {
                let Value::List(items) = value else {
                    return Err(format!(
                        "Field '{path}' expected List, got {}",
                        value.type_name()
                    ));
                };
                for (i, item) in items.iter().enumerate() {
                    let fits = element_types
                        .iter()
                        .any(|t| self.element_matches(t, item));
                    if !fits {
                        return Err(format!(
                            "Field '{path}' element {i} expected {}, got {}",
                            element_types.join("|"),
                            item.type_name()
                        ));
                    }
                }
                Ok(())
            }
            TypeExpr::Named(name) => {
                if let Some(def) = self.schema.struct_def(name) {
                    let Value::Record(map) = value else {
                        return Err(format!(
                            "Field '{path}' expected {name}, got {}",
                            value.type_name()
                        ));
                    };
                    for nested in &def.fields {
                        let nested_path = format!("{path}.{}", nested.name);
                        // Struct fields validate with the identical algorithm;
                        // strict mode surfaces the first nested violation.
                        self.check_field(nested, map.get(&nested.name), &nested_path)?;
                    }
                    Ok(())
                } else if self.types.has_type(name) {
                    if self.types.validate(name, value) {
                        Ok(())
                    } else {
                        Err(format!(
                            "Field '{path}' failed '{name}' validation, got {}",
                            value
                        ))
                    }
                } else {
                    // Unreachable for registry-validated schemas.
                    Err(format!("Field '{path}' has unknown type '{name}'"))
                }
            }
        }
    }

    fn element_matches(&self, type_name: &str, value: &Value) -> bool {
        if let Some(p) = Primitive::parse(type_name) {
            return primitive_matches(p, value);
        }
        if self.schema.struct_def(type_name).is_some() {
            return matches!(value, Value::Record(_));
        }
        self.types.has_type(type_name) && self.types.validate(type_name, value)
    }

    /// Apply one constraint; `Some(message)` describes the violation.
    fn check_constraint(&self, constraint: &Constraint, value: &Value) -> Option<String> {
        use std::cmp::Ordering;
        match constraint {
            Constraint::Min(bound) => match value.partial_cmp_value(bound) {
                Some(Ordering::Less) => Some(format!("value {value} below min {bound}")),
                Some(_) => None,
                None => Some(format!("value {value} not comparable to min {bound}")),
            },
            Constraint::Max(bound) => match value.partial_cmp_value(bound) {
                Some(Ordering::Greater) => Some(format!("value {value} above max {bound}")),
                Some(_) => None,
                None => Some(format!("value {value} not comparable to max {bound}")),
            },
            Constraint::ExclusiveMin(bound) => match value.partial_cmp_value(bound) {
                Some(Ordering::Greater) => None,
                Some(_) => Some(format!("value {value} not above exclusiveMin {bound}")),
                None => Some(format!("value {value} not comparable to exclusiveMin {bound}")),
            },
            Constraint::ExclusiveMax(bound) => match value.partial_cmp_value(bound) {
                Some(Ordering::Less) => None,
                Some(_) => Some(format!("value {value} not below exclusiveMax {bound}")),
                None => Some(format!("value {value} not comparable to exclusiveMax {bound}")),
            },
            Constraint::MinLength(n) => match value {
                Value::Str(s) if s.chars().count() < *n => {
                    Some(format!("length {} below minLength {n}", s.chars().count()))
                }
                Value::Str(_) => None,
                _ => Some("minLength applies to strings".to_owned()),
            },
            Constraint::MaxLength(n) => match value {
                Value::Str(s) if s.chars().count() > *n => {
                    Some(format!("length {} above maxLength {n}", s.chars().count()))
                }
                Value::Str(_) => None,
                _ => Some("maxLength applies to strings".to_owned()),
            },
            Constraint::ExactLength(n) => match value {
                Value::Str(s) if s.chars().count() != *n => {
                    Some(format!("length must be {n}"))
                }
                Value::Str(_) => None,
                _ => Some("exactLength applies to strings".to_owned()),
            },
            Constraint::Pattern(src) => match value {
                Value::Str(s) => match self.patterns.get(src) {
                    Some(re) if re.is_match(s) => None,
                    Some(_) => Some(format!("value does not match pattern '{src}'")),
                    None => Some(format!("invalid pattern '{src}'")),
                },
                _ => Some("pattern applies to strings".to_owned()),
            },
            Constraint::Format(name) => {
                if !self.types.has_type(name) {
                    Some(format!("unknown format '{name}'"))
                } else if self.types.validate(name, value) {
                    None
                } else {
                    Some(format!("value does not satisfy format '{name}'"))
                }
            }
            Constraint::OneOf(options) => {
                if options.iter().any(|opt| opt.loose_eq(value)) {
                    None
                } else {
                    Some(format!("value {value} not in {}", Value::List(options.clone())))
                }
            }
            Constraint::Const(expected) => {
                if expected.loose_eq(value) {
                    None
                } else {
                    Some(format!("value must equal {expected}"))
                }
            }
            Constraint::MinItems(n) => match value {
                Value::List(items) if items.len() < *n => {
                    Some(format!("list length {} below minItems {n}", items.len()))
                }
                Value::List(_) => None,
                _ => Some("minItems applies to lists".to_owned()),
            },
            Constraint::MaxItems(n) => match value {
                Value::List(items) if items.len() > *n => {
                    Some(format!("list length {} above maxItems {n}", items.len()))
                }
                Value::List(_) => None,
                _ => Some("maxItems applies to lists".to_owned()),
            },
            Constraint::ExactItems(n) => match value {
                Value::List(items) if items.len() != *n => {
                    Some(format!("list length must be {n}"))
                }
                Value::List(_) => None,
                _ => Some("exactItems applies to lists".to_owned()),
            },
            Constraint::Unique(required) => {
                if !required {
                    return None;
                }
                match value {
                    Value::List(items) => {
                        for (i, a) in items.iter().enumerate() {
                            if items.iter().skip(i + 1).any(|b| a.loose_eq(b)) {
                                return Some("list elements must be unique".to_owned());
                            }
                        }
                        None
                    }
                    _ => Some("unique applies to lists".to_owned()),
                }
            }
        }
    }
}

fn primitive_matches(p: Primitive, value: &Value) -> bool {
    match p {
        Primitive::Int => matches!(value, Value::Int(_)),
        Primitive::Float => matches!(value, Value::Int(_) | Value::Float(_)),
        Primitive::Str => matches!(value, Value::Str(_)),
        Primitive::Bool => matches!(value, Value::Bool(_)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::schema::parse_schema;

    use super::*;

    fn validator(text: &str, mode: DecisionsMode) -> DecisionValidator {
        let types = Arc::new(TypeRegistry::with_builtins());
        let schema = Arc::new(
            SchemaRegistry::new(parse_schema(text).unwrap(), &types.registered_names()).unwrap(),
        );
        DecisionValidator::new(schema, types, mode)
    }

    #[test]
    fn valid_decision_passes_unchanged() {
        let v = validator("score: Int\nname: Str", DecisionsMode::Strict);
        let decision = Decision::new().set("score", 10_i64).set("name", "alice");
        let (cleaned, warnings) = v.validate(&decision).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(cleaned.get("score"), Some(&Value::Int(10)));
    }

    #[test]
    fn missing_required_strict_raises() {
        let v = validator("score: Int", DecisionsMode::Strict);
        let err = v.validate(&Decision::new()).unwrap_err();
        assert!(err.message.contains("missing"));
        assert_eq!(err.field.as_deref(), Some("score"));
    }

    #[test]
    fn missing_required_loose_warns_and_omits() {
        let v = validator("score: Int", DecisionsMode::Loose);
        let (cleaned, warnings) = v.validate(&Decision::new()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("score"));
        assert_eq!(cleaned.get("score"), None);
    }

    #[test]
    fn missing_optional_skips_silently() {
        let v = validator("nickname: Str?", DecisionsMode::Strict);
        let (cleaned, warnings) = v.validate(&Decision::new()).unwrap();
        assert!(warnings.is_empty());
        assert!(cleaned.is_empty());
    }

    #[test]
    fn null_required_is_a_type_violation() {
        let v = validator("score: Int", DecisionsMode::Loose);
        let decision = Decision::new().set("score", Value::Null);
        let (cleaned, warnings) = v.validate(&decision).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Null"));
        assert!(cleaned.is_empty());
    }

    #[test]
    fn null_optional_skips() {
        let v = validator("nickname: Str?", DecisionsMode::Strict);
        let decision = Decision::new().set("nickname", Value::Null);
        let (cleaned, warnings) = v.validate(&decision).unwrap();
        assert!(warnings.is_empty());
        assert!(cleaned.is_empty());
    }

    #[test]
    fn int_excludes_bool_and_no_coercion() {
        let v = validator("score: Int", DecisionsMode::Loose);
        let (_, warnings) = v
            .validate(&Decision::new().set("score", true))
            .unwrap();
        assert_eq!(warnings.len(), 1);
        let (_, warnings) = v
            .validate(&Decision::new().set("score", "10"))
            .unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn float_accepts_int_value() {
        let v = validator("rate: Float", DecisionsMode::Strict);
        let (cleaned, _) = v.validate(&Decision::new().set("rate", 3_i64)).unwrap();
        assert_eq!(cleaned.get("rate"), Some(&Value::Int(3)));
    }

    #[test]
    fn numeric_bounds() {
        let v = validator("age: Int {min: 13, max: 120}", DecisionsMode::Loose);
        let ok = v.validate(&Decision::new().set("age", 30_i64)).unwrap();
        assert!(ok.1.is_empty());
        let low = v.validate(&Decision::new().set("age", 10_i64)).unwrap();
        assert!(low.1[0].contains("below min"));
        let high = v.validate(&Decision::new().set("age", 200_i64)).unwrap();
        assert!(high.1[0].contains("above max"));
    }

    #[test]
    fn exclusive_bounds() {
        let v = validator("rate: Float {exclusiveMin: 0.0, exclusiveMax: 1.0}", DecisionsMode::Loose);
        let at_min = v.validate(&Decision::new().set("rate", 0.0_f64)).unwrap();
        assert!(at_min.1[0].contains("exclusiveMin"));
        let at_max = v.validate(&Decision::new().set("rate", 1.0_f64)).unwrap();
        assert!(at_max.1[0].contains("exclusiveMax"));
        let inside = v.validate(&Decision::new().set("rate", 0.5_f64)).unwrap();
        assert!(inside.1.is_empty());
    }

    #[test]
    fn string_lengths_and_pattern() {
        let v = validator(
            "code: Str {minLength: 2, maxLength: 5, pattern: '[A-Z]+'}",
            DecisionsMode::Loose,
        );
        assert!(v.validate(&Decision::new().set("code", "ABC")).unwrap().1.is_empty());
        assert!(v.validate(&Decision::new().set("code", "A")).unwrap().1[0].contains("minLength"));
        assert!(
            v.validate(&Decision::new().set("code", "ABCDEF")).unwrap().1[0].contains("maxLength")
        );
        assert!(v.validate(&Decision::new().set("code", "abc")).unwrap().1[0].contains("pattern"));
    }

    #[test]
    fn pattern_is_full_match() {
        let v = validator("code: Str {pattern: '[A-Z]+'}", DecisionsMode::Loose);
        // A substring match would pass "xABCx"; a full match must not.
        assert!(!v.validate(&Decision::new().set("code", "xABCx")).unwrap().1.is_empty());
    }

    #[test]
    fn format_runs_builtin_validator() {
        let v = validator("contact: Str {format: 'email'}", DecisionsMode::Loose);
        assert!(
            v.validate(&Decision::new().set("contact", "a@b.com")).unwrap().1.is_empty()
        );
        assert!(
            v.validate(&Decision::new().set("contact", "nope")).unwrap().1[0].contains("email")
        );
    }

    #[test]
    fn unknown_format_is_a_violation() {
        let v = validator("x: Str {format: 'zipcode'}", DecisionsMode::Loose);
        let (_, warnings) = v.validate(&Decision::new().set("x", "12345")).unwrap();
        assert!(warnings[0].contains("unknown format"));
    }

    #[test]
    fn one_of_and_const() {
        let v = validator(
            "state: Str {oneOf: ['CA', 'NY']}\nkind: Str {const: 'fixed'}",
            DecisionsMode::Loose,
        );
        let decision = Decision::new().set("state", "TX").set("kind", "other");
        let (_, warnings) = v.validate(&decision).unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn list_items_and_uniqueness() {
        let v = validator(
            "tags: List[Str] {minItems: 1, maxItems: 3, unique: true}",
            DecisionsMode::Loose,
        );
        let ok = Decision::new().set("tags", vec!["a", "b"]);
        assert!(v.validate(&ok).unwrap().1.is_empty());
        let empty = Decision::new().set("tags", Vec::<&str>::new());
        assert!(v.validate(&empty).unwrap().1[0].contains("minItems"));
        let dup = Decision::new().set("tags", vec!["a", "a"]);
        assert!(v.validate(&dup).unwrap().1[0].contains("unique"));
    }

    #[test]
    fn list_element_type_union() {
        let v = validator("mixed: List[Int|Str]", DecisionsMode::Loose);
        let ok = Decision::new().set(
            "mixed",
            Value::List(vec![Value::Int(1), Value::Str("x".into())]),
        );
        assert!(v.validate(&ok).unwrap().1.is_empty());
        let bad = Decision::new().set(
            "mixed",
            Value::List(vec![Value::Int(1), Value::Bool(true)]),
        );
        let (_, warnings) = v.validate(&bad).unwrap();
        assert!(warnings[0].contains("element 1"));
    }

    #[test]
    fn custom_type_field_runs_validator() {
        let v = validator("source_ip: ipv4", DecisionsMode::Loose);
        let ok = Decision::new().set("source_ip", "10.0.0.1");
        assert!(v.validate(&ok).unwrap().1.is_empty());
        let bad = Decision::new().set("source_ip", "999.0.0.1");
        assert!(!v.validate(&bad).unwrap().1.is_empty());
    }

    #[test]
    fn struct_field_validates_recursively() {
        let v = validator(
            "struct Addr { city: Str, zip: Str {minLength: 5} }\naddr: Addr",
            DecisionsMode::Strict,
        );
        let ok = Decision::new()
            .set("addr.city", "SF")
            .set("addr.zip", "94110");
        v.validate(&ok).unwrap();

        let bad = Decision::new().set("addr.city", "SF").set("addr.zip", "94");
        let err = v.validate(&bad).unwrap_err();
        assert!(err.message.contains("addr.zip"));
    }

    #[test]
    fn struct_field_requires_record() {
        let v = validator("struct Addr { city: Str }\naddr: Addr", DecisionsMode::Loose);
        let (_, warnings) = v
            .validate(&Decision::new().set("addr", "not a record"))
            .unwrap();
        assert!(warnings[0].contains("expected Addr"));
    }

    #[test]
    fn extra_fields_pass_through() {
        let v = validator("score: Int", DecisionsMode::Strict);
        let decision = Decision::new().set("score", 1_i64).set("unrelated", "kept");
        let (cleaned, _) = v.validate(&decision).unwrap();
        assert_eq!(cleaned.get("unrelated"), Some(&Value::Str("kept".into())));
    }

    #[test]
    fn loose_drops_offending_field_but_continues() {
        let v = validator("a: Int\nb: Int", DecisionsMode::Loose);
        let decision = Decision::new().set("a", "bad").set("b", 2_i64);
        let (cleaned, warnings) = v.validate(&decision).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(cleaned.get("a"), None);
        assert_eq!(cleaned.get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn strict_stops_at_first_violation() {
        let v = validator("a: Int\nb: Int", DecisionsMode::Strict);
        let decision = Decision::new().set("a", "bad").set("b", "also bad");
        let err = v.validate(&decision).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("a"));
    }
}
