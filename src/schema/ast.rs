use std::fmt;

use crate::types::Value;

/// The four primitive schema types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Float,
    Str,
    Bool,
}

impl Primitive {
    pub const ALL: [Primitive; 4] = [
        Primitive::Int,
        Primitive::Float,
        Primitive::Str,
        Primitive::Bool,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "Int",
            Primitive::Float => "Float",
            Primitive::Str => "Str",
            Primitive::Bool => "Bool",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Primitive> {
        match name {
            "Int" => Some(Primitive::Int),
            "Float" => Some(Primitive::Float),
            "Str" => Some(Primitive::Str),
            "Bool" => Some(Primitive::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared type position: a primitive, `List[...]` with a union of
/// element type names, or a name resolved later against structs and
/// registered custom types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Primitive(Primitive),
    /// Element type names; more than one entry means a union (`List[Int|Str]`).
    List(Vec<String>),
    Named(String),
}

impl TypeExpr {
    /// The type name carried into rule AST nodes for fields of this type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            TypeExpr::Primitive(p) => p.name(),
            TypeExpr::List(_) => "List",
            TypeExpr::Named(name) => name,
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Primitive(p) => write!(f, "{p}"),
            TypeExpr::List(elements) => write!(f, "List[{}]", elements.join("|")),
            TypeExpr::Named(name) => f.write_str(name),
        }
    }
}

/// A per-field constraint, enforced by the decision validator.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Min(Value),
    Max(Value),
    ExclusiveMin(Value),
    ExclusiveMax(Value),
    MinLength(usize),
    MaxLength(usize),
    ExactLength(usize),
    Pattern(String),
    Format(String),
    OneOf(Vec<Value>),
    Const(Value),
    MinItems(usize),
    MaxItems(usize),
    ExactItems(usize),
    Unique(bool),
}

impl Constraint {
    /// The schema-language key this constraint is written under.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Constraint::Min(_) => "min",
            Constraint::Max(_) => "max",
            Constraint::ExclusiveMin(_) => "exclusiveMin",
            Constraint::ExclusiveMax(_) => "exclusiveMax",
            Constraint::MinLength(_) => "minLength",
            Constraint::MaxLength(_) => "maxLength",
            Constraint::ExactLength(_) => "exactLength",
            Constraint::Pattern(_) => "pattern",
            Constraint::Format(_) => "format",
            Constraint::OneOf(_) => "oneOf",
            Constraint::Const(_) => "const",
            Constraint::MinItems(_) => "minItems",
            Constraint::MaxItems(_) => "maxItems",
            Constraint::ExactItems(_) => "exactItems",
            Constraint::Unique(_) => "unique",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.key())?;
        match self {
            Constraint::Min(v)
            | Constraint::Max(v)
            | Constraint::ExclusiveMin(v)
            | Constraint::ExclusiveMax(v)
            | Constraint::Const(v) => write!(f, "{v}"),
            Constraint::MinLength(n)
            | Constraint::MaxLength(n)
            | Constraint::ExactLength(n)
            | Constraint::MinItems(n)
            | Constraint::MaxItems(n)
            | Constraint::ExactItems(n) => write!(f, "{n}"),
            Constraint::Pattern(s) | Constraint::Format(s) => write!(f, "'{s}'"),
            Constraint::OneOf(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Constraint::Unique(b) => write!(f, "{b}"),
        }
    }
}

/// A field declaration: top-level or inside a struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub constraints: Vec<Constraint>,
}

/// A named struct with ordered fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

/// One declared function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
}

/// A declared function signature; implementations are supplied by the caller
/// through the engine's function map.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<ParamDef>,
    pub return_type: TypeExpr,
}

/// Root of a parsed schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaAst {
    pub fields: Vec<FieldDef>,
    pub structs: Vec<StructDef>,
    pub functions: Vec<FunctionSig>,
}
