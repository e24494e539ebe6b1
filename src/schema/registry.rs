use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::error::SchemaValidationError;

use super::ast::{FieldDef, FunctionSig, Primitive, SchemaAst, StructDef, TypeExpr};
use super::validator;

/// A validated schema with every reachable dotted field path pre-indexed.
///
/// Built once per engine; lookups after construction are O(1), including
/// paths that traverse struct composition (`addr.city`).
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    ast: SchemaAst,
    custom_types: HashSet<String>,
    fields: HashMap<String, FieldDef>,
    functions: HashMap<String, FunctionSig>,
    structs: HashMap<String, StructDef>,
}

impl SchemaRegistry {
    /// Validate the AST and build the path index.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaValidationError`] if the schema is not self-consistent
    /// (duplicates, unresolved type references, cyclic structs).
    pub fn new(
        ast: SchemaAst,
        known_custom_types: &HashSet<String>,
    ) -> Result<Self, SchemaValidationError> {
        validator::validate(&ast, known_custom_types)?;

        let structs: HashMap<String, StructDef> = ast
            .structs
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        let functions: HashMap<String, FunctionSig> = ast
            .functions
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();

        let mut fields = HashMap::new();
        for f in &ast.fields {
            Self::index_field(&mut fields, &structs, &f.name, f);
        }

        Ok(Self {
            ast,
            custom_types: known_custom_types.clone(),
            fields,
            functions,
            structs,
        })
    }

    /// Recursively index a field and, when it is struct-typed, every dotted
    /// path reachable through it. The struct graph is acyclic by validation,
    /// so this terminates.
    fn index_field(
        fields: &mut HashMap<String, FieldDef>,
        structs: &HashMap<String, StructDef>,
        path: &str,
        field: &FieldDef,
    ) {
        fields.insert(path.to_owned(), field.clone());
        if let TypeExpr::Named(name) = &field.ty
            && let Some(s) = structs.get(name)
        {
            for nested in &s.fields {
                let nested_path = format!("{path}.{}", nested.name);
                Self::index_field(fields, structs, &nested_path, nested);
            }
        }
    }

    /// Look up a field definition by dotted path (`"addr.city"`).
    #[must_use]
    pub fn get_field(&self, path: &str) -> Option<&FieldDef> {
        self.fields.get(path)
    }

    /// Look up a declared function signature by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionSig> {
        self.functions.get(name)
    }

    /// Look up a struct definition by name.
    #[must_use]
    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    /// The top-level fields in declaration order.
    #[must_use]
    pub fn top_level_fields(&self) -> &[FieldDef] {
        &self.ast.fields
    }

    /// All resolvable type names: primitives, declared structs, and the
    /// custom types known when the registry was built.
    #[must_use]
    pub fn known_type_names(&self) -> HashSet<String> {
        Primitive::ALL
            .iter()
            .map(|p| p.name().to_owned())
            .chain(self.structs.keys().cloned())
            .chain(self.custom_types.iter().cloned())
            .collect()
    }

    /// Serialize the schema back to schema text. The output parses to an AST
    /// equal to the one this registry was built from.
    #[must_use]
    pub fn export_schema(&self) -> String {
        let mut out = String::new();
        for s in &self.ast.structs {
            let _ = write!(out, "struct {} {{ ", s.name);
            for (i, f) in s.fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_field(&mut out, f);
            }
            out.push_str(" }\n");
        }
        for f in &self.ast.fields {
            render_field(&mut out, f);
            out.push('\n');
        }
        for func in &self.ast.functions {
            let _ = write!(out, "{}: (", func.name);
            for (i, p) in func.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}: {}", p.name, p.ty);
                if p.optional {
                    out.push('?');
                }
            }
            let _ = write!(out, ") -> {}", func.return_type);
            out.push('\n');
        }
        out
    }
}

fn render_field(out: &mut String, f: &FieldDef) {
    let _ = write!(out, "{}: {}", f.name, f.ty);
    if f.optional {
        out.push('?');
    }
    if !f.constraints.is_empty() {
        out.push_str(" {");
        for (i, c) in f.constraints.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{c}");
        }
        out.push('}');
    }
}
