pub mod ast;
mod grammar;
mod registry;
mod validator;

pub use ast::{Constraint, FieldDef, FunctionSig, ParamDef, Primitive, SchemaAst, StructDef, TypeExpr};
pub use registry::SchemaRegistry;

use crate::error::SchemaParseError;

/// Parse schema text into a [`SchemaAst`].
///
/// # Errors
///
/// Returns [`SchemaParseError`] (with the 1-based line of the failure) if the
/// input is not valid schema syntax.
pub fn parse_schema(input: &str) -> Result<SchemaAst, SchemaParseError> {
    use winnow::Parser;
    grammar::schema.parse(input).map_err(|e| {
        let offset = e.offset().min(input.len());
        let line = input[..offset].matches('\n').count() + 1;
        SchemaParseError::new(e.to_string()).at_line(line)
    })
}
