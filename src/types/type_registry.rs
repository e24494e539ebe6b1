use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SchemaValidationError;
use crate::schema::Primitive;

use super::Value;

/// Validator callable for a custom type. Anything other than `true` is a
/// validation failure; validators cannot raise.
pub type TypeValidatorFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A registered custom type: a name bound to a base primitive and a
/// validator refining it.
#[derive(Clone)]
pub struct TypeDef {
    name: String,
    base: Primitive,
    validator: TypeValidatorFn,
}

impl TypeDef {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base(&self) -> Primitive {
        self.base
    }
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Registry of custom types: name to base primitive plus validator.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDef>,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

fn is_cidr(text: &str) -> bool {
    let Some((addr, prefix)) = text.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    if addr.parse::<Ipv4Addr>().is_ok() {
        prefix <= 32
    } else if addr.parse::<Ipv6Addr>().is_ok() {
        prefix <= 128
    } else {
        false
    }
}

fn str_validator(check: fn(&str) -> bool) -> TypeValidatorFn {
    Arc::new(move |value| match value {
        Value::Str(s) => check(s),
        _ => false,
    })
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the built-in types: `ipv4`, `ipv6`,
    /// `cidr`, `email`, `uuid` (all base `Str`). Their validators are
    /// deterministic and side-effect-free.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, TypeValidatorFn); 5] = [
            ("ipv4", str_validator(|s| s.parse::<Ipv4Addr>().is_ok())),
            ("ipv6", str_validator(|s| s.parse::<Ipv6Addr>().is_ok())),
            ("cidr", str_validator(is_cidr)),
            ("email", str_validator(|s| EMAIL_RE.is_match(s))),
            ("uuid", str_validator(|s| UUID_RE.is_match(s))),
        ];
        for (name, validator) in builtins {
            // Built-in names cannot collide on a fresh registry.
            let _ = registry.register(name, Primitive::Str, validator);
        }
        registry
    }

    /// Register a custom type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaValidationError`] when the name collides with a
    /// primitive or a previously registered custom type. (The engine also
    /// rejects collisions with schema struct names.)
    pub fn register(
        &mut self,
        name: &str,
        base: Primitive,
        validator: TypeValidatorFn,
    ) -> Result<(), SchemaValidationError> {
        if Primitive::parse(name).is_some() {
            return Err(SchemaValidationError::new(format!(
                "type name '{name}' collides with a primitive"
            )));
        }
        if self.types.contains_key(name) {
            return Err(SchemaValidationError::new(format!(
                "type '{name}' already registered"
            )));
        }
        self.types.insert(
            name.to_owned(),
            TypeDef {
                name: name.to_owned(),
                base,
                validator,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// The base primitive of a registered type.
    #[must_use]
    pub fn get_base(&self, name: &str) -> Option<Primitive> {
        self.types.get(name).map(TypeDef::base)
    }

    /// Run a type's validator, after checking the value against the base
    /// primitive. Unknown type names never validate.
    #[must_use]
    pub fn validate(&self, name: &str, value: &Value) -> bool {
        let Some(def) = self.types.get(name) else {
            return false;
        };
        let base_ok = match def.base {
            Primitive::Int => matches!(value, Value::Int(_)),
            Primitive::Float => matches!(value, Value::Int(_) | Value::Float(_)),
            Primitive::Str => matches!(value, Value::Str(_)),
            Primitive::Bool => matches!(value, Value::Bool(_)),
        };
        base_ok && (def.validator)(value)
    }

    /// Names of all registered custom types.
    #[must_use]
    pub fn registered_names(&self) -> HashSet<String> {
        self.types.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_value(s: &str) -> Value {
        Value::Str(s.to_owned())
    }

    #[test]
    fn builtin_ipv4() {
        let reg = TypeRegistry::with_builtins();
        assert!(reg.validate("ipv4", &str_value("192.168.0.1")));
        assert!(!reg.validate("ipv4", &str_value("256.0.0.1")));
        assert!(!reg.validate("ipv4", &str_value("::1")));
        assert!(!reg.validate("ipv4", &Value::Int(42)));
    }

    #[test]
    fn builtin_ipv6() {
        let reg = TypeRegistry::with_builtins();
        assert!(reg.validate("ipv6", &str_value("::1")));
        assert!(reg.validate("ipv6", &str_value("2001:db8::ff00:42:8329")));
        assert!(!reg.validate("ipv6", &str_value("192.168.0.1")));
    }

    #[test]
    fn builtin_cidr() {
        let reg = TypeRegistry::with_builtins();
        assert!(reg.validate("cidr", &str_value("10.0.0.0/8")));
        assert!(reg.validate("cidr", &str_value("2001:db8::/32")));
        assert!(!reg.validate("cidr", &str_value("10.0.0.0/33")));
        assert!(!reg.validate("cidr", &str_value("10.0.0.0")));
        assert!(!reg.validate("cidr", &str_value("hosts/8")));
    }

    #[test]
    fn builtin_email() {
        let reg = TypeRegistry::with_builtins();
        assert!(reg.validate("email", &str_value("user@example.com")));
        assert!(!reg.validate("email", &str_value("not-an-email")));
        assert!(!reg.validate("email", &str_value("user@host")));
    }

    #[test]
    fn builtin_uuid() {
        let reg = TypeRegistry::with_builtins();
        assert!(reg.validate(
            "uuid",
            &str_value("123e4567-e89b-12d3-a456-426614174000")
        ));
        assert!(reg.validate(
            "uuid",
            &str_value("123E4567-E89B-12D3-A456-426614174000")
        ));
        assert!(!reg.validate("uuid", &str_value("123e4567")));
    }

    #[test]
    fn register_and_validate_custom_type() {
        let mut reg = TypeRegistry::new();
        reg.register(
            "percentage",
            Primitive::Float,
            Arc::new(|v| match v {
                Value::Float(f) => (0.0..=100.0).contains(f),
                Value::Int(i) => (0..=100).contains(i),
                _ => false,
            }),
        )
        .unwrap();
        assert!(reg.has_type("percentage"));
        assert_eq!(reg.get_base("percentage"), Some(Primitive::Float));
        assert!(reg.validate("percentage", &Value::Float(55.5)));
        assert!(!reg.validate("percentage", &Value::Float(120.0)));
        assert!(!reg.validate("percentage", &str_value("55")));
    }

    #[test]
    fn register_primitive_name_rejected() {
        let mut reg = TypeRegistry::new();
        let err = reg
            .register("Int", Primitive::Int, Arc::new(|_| true))
            .unwrap_err();
        assert!(err.message.contains("primitive"));
    }

    #[test]
    fn register_duplicate_rejected() {
        let mut reg = TypeRegistry::with_builtins();
        let err = reg
            .register("email", Primitive::Str, Arc::new(|_| true))
            .unwrap_err();
        assert!(err.message.contains("already registered"));
    }

    #[test]
    fn unknown_type_never_validates() {
        let reg = TypeRegistry::new();
        assert!(!reg.validate("ghost", &Value::Int(1)));
    }

    #[test]
    fn base_check_runs_before_validator() {
        let mut reg = TypeRegistry::new();
        reg.register("flag", Primitive::Bool, Arc::new(|_| true))
            .unwrap();
        assert!(reg.validate("flag", &Value::Bool(true)));
        assert!(!reg.validate("flag", &Value::Int(1)));
    }
}
