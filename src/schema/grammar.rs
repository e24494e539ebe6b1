use winnow::ascii::{dec_int, dec_uint, line_ending, till_line_ending};
use winnow::combinator::{alt, cut_err, eof, opt, peek, preceded, repeat, separated};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::types::Value;

use super::ast::{Constraint, FieldDef, FunctionSig, ParamDef, Primitive, SchemaAst, StructDef, TypeExpr};

// -- Whitespace & comments --------------------------------------------------

/// Spaces and tabs only. The top level of a schema is newline-sensitive, so
/// most positions must not skip line endings.
fn line_ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)
}

/// Any whitespace, including newlines and `#` comments. Used between
/// top-level entries and inside braces.
fn ws_nl(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

/// End of a top-level entry: trailing spaces, an optional comment, then a
/// newline or end of input.
fn line_end(input: &mut &str) -> ModalResult<()> {
    line_ws.parse_next(input)?;
    opt(('#', till_line_ending)).parse_next(input)?;
    alt((line_ending.void(), eof.void()))
        .context(StrContext::Expected(StrContextValue::Description(
            "end of line",
        )))
        .parse_next(input)
}

// -- Identifiers ------------------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

// -- Literal values ---------------------------------------------------------

fn string_literal(input: &mut &str) -> ModalResult<String> {
    '\''.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = any.parse_next(input)?;
        match ch {
            '\'' => return Ok(s),
            '\\' => {
                let esc = any.parse_next(input)?;
                match esc {
                    '\'' => s.push('\''),
                    '\\' => s.push('\\'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn float_literal(input: &mut &str) -> ModalResult<f64> {
    // Only match floats that contain a decimal point; tried before integers
    // so `0.1` is not read as `0` followed by `.1`.
    (
        opt('-'),
        take_while(1.., |c: char| c.is_ascii_digit()),
        '.',
        take_while(1.., |c: char| c.is_ascii_digit()),
    )
        .take()
        .try_map(|s: &str| s.parse::<f64>())
        .parse_next(input)
}

fn number_literal(input: &mut &str) -> ModalResult<Value> {
    alt((
        float_literal.map(Value::Float),
        dec_int::<_, i64, _>.map(Value::Int),
    ))
    .parse_next(input)
}

fn scalar_value(input: &mut &str) -> ModalResult<Value> {
    alt((
        string_literal.map(Value::Str),
        "true".value(Value::Bool(true)),
        "false".value(Value::Bool(false)),
        number_literal,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "constraint value",
    )))
    .parse_next(input)
}

fn value_list(input: &mut &str) -> ModalResult<Vec<Value>> {
    '['.parse_next(input)?;
    ws_nl.parse_next(input)?;
    let items: Vec<Value> =
        separated(0.., preceded(ws_nl, scalar_value), (ws_nl, ',')).parse_next(input)?;
    ws_nl.parse_next(input)?;
    cut_err(']').parse_next(input)?;
    Ok(items)
}

// -- Constraints ------------------------------------------------------------

fn count_literal(input: &mut &str) -> ModalResult<usize> {
    dec_uint::<_, usize, _>
        .context(StrContext::Expected(StrContextValue::Description(
            "non-negative count",
        )))
        .parse_next(input)
}

fn bool_literal(input: &mut &str) -> ModalResult<bool> {
    alt(("true".value(true), "false".value(false))).parse_next(input)
}

fn constraint(input: &mut &str) -> ModalResult<Constraint> {
    let key = ident.parse_next(input)?;
    ws_nl.parse_next(input)?;
    cut_err(':').parse_next(input)?;
    ws_nl.parse_next(input)?;
    match key {
        "min" => cut_err(number_literal).map(Constraint::Min).parse_next(input),
        "max" => cut_err(number_literal).map(Constraint::Max).parse_next(input),
        "exclusiveMin" => cut_err(number_literal)
            .map(Constraint::ExclusiveMin)
            .parse_next(input),
        "exclusiveMax" => cut_err(number_literal)
            .map(Constraint::ExclusiveMax)
            .parse_next(input),
        "minLength" => cut_err(count_literal)
            .map(Constraint::MinLength)
            .parse_next(input),
        "maxLength" => cut_err(count_literal)
            .map(Constraint::MaxLength)
            .parse_next(input),
        "exactLength" => cut_err(count_literal)
            .map(Constraint::ExactLength)
            .parse_next(input),
        "pattern" => cut_err(string_literal)
            .map(Constraint::Pattern)
            .parse_next(input),
        "format" => cut_err(string_literal)
            .map(Constraint::Format)
            .parse_next(input),
        "oneOf" => cut_err(value_list).map(Constraint::OneOf).parse_next(input),
        "const" => cut_err(scalar_value).map(Constraint::Const).parse_next(input),
        "minItems" => cut_err(count_literal)
            .map(Constraint::MinItems)
            .parse_next(input),
        "maxItems" => cut_err(count_literal)
            .map(Constraint::MaxItems)
            .parse_next(input),
        "exactItems" => cut_err(count_literal)
            .map(Constraint::ExactItems)
            .parse_next(input),
        "unique" => cut_err(bool_literal)
            .map(Constraint::Unique)
            .parse_next(input),
        _ => Err(ErrMode::from_input(input).cut()),
    }
}

fn constraint_block(input: &mut &str) -> ModalResult<Vec<Constraint>> {
    '{'.parse_next(input)?;
    ws_nl.parse_next(input)?;
    let constraints: Vec<Constraint> =
        separated(1.., preceded(ws_nl, constraint), (ws_nl, ',')).parse_next(input)?;
    ws_nl.parse_next(input)?;
    cut_err('}')
        .context(StrContext::Expected(StrContextValue::CharLiteral('}')))
        .parse_next(input)?;
    Ok(constraints)
}

// -- Type expressions -------------------------------------------------------

fn type_expr(input: &mut &str) -> ModalResult<TypeExpr> {
    let name = ident
        .context(StrContext::Expected(StrContextValue::Description(
            "type name",
        )))
        .parse_next(input)?;
    if name == "List" {
        cut_err('[')
            .context(StrContext::Expected(StrContextValue::Description(
                "element type in brackets",
            )))
            .parse_next(input)?;
        let elements: Vec<String> = cut_err(separated(
            1..,
            preceded(line_ws, ident.map(str::to_owned)),
            (line_ws, '|'),
        ))
        .parse_next(input)?;
        line_ws.parse_next(input)?;
        cut_err(']').parse_next(input)?;
        Ok(TypeExpr::List(elements))
    } else if let Some(p) = Primitive::parse(name) {
        Ok(TypeExpr::Primitive(p))
    } else {
        Ok(TypeExpr::Named(name.to_owned()))
    }
}

// -- Fields -----------------------------------------------------------------

/// The shared body of a field declaration: `name: Type? {constraints}`.
/// Top-level fields additionally require a line ending; struct fields are
/// separated by commas or newlines instead.
fn field_core(input: &mut &str) -> ModalResult<FieldDef> {
    let name = ident.parse_next(input)?;
    line_ws.parse_next(input)?;
    ':'.parse_next(input)?;
    line_ws.parse_next(input)?;
    let ty = cut_err(type_expr).parse_next(input)?;
    let optional = opt(preceded(line_ws, '?')).parse_next(input)?.is_some();
    line_ws.parse_next(input)?;
    let constraints = opt(constraint_block).parse_next(input)?.unwrap_or_default();
    Ok(FieldDef {
        name: name.to_owned(),
        ty,
        optional,
        constraints,
    })
}

fn field_def(input: &mut &str) -> ModalResult<FieldDef> {
    let field = field_core.parse_next(input)?;
    line_end.parse_next(input)?;
    Ok(field)
}

// -- Structs ----------------------------------------------------------------

fn struct_def(input: &mut &str) -> ModalResult<StructDef> {
    "struct".parse_next(input)?;
    take_while(1.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)?;
    let name = cut_err(ident)
        .context(StrContext::Expected(StrContextValue::Description(
            "struct name",
        )))
        .parse_next(input)?;
    ws_nl.parse_next(input)?;
    cut_err('{').parse_next(input)?;
    ws_nl.parse_next(input)?;

    let mut fields = Vec::new();
    while peek(opt('}')).parse_next(input)?.is_none() {
        fields.push(cut_err(field_core).parse_next(input)?);
        line_ws.parse_next(input)?;
        opt(('#', till_line_ending)).parse_next(input)?;
        // Fields separate by comma or newline; a closing brace also ends the list.
        cut_err(alt((','.void(), line_ending.void(), peek('}').void())))
            .context(StrContext::Expected(StrContextValue::Description(
                "',' or newline between struct fields",
            )))
            .parse_next(input)?;
        ws_nl.parse_next(input)?;
    }
    cut_err('}').parse_next(input)?;
    line_end.parse_next(input)?;
    Ok(StructDef {
        name: name.to_owned(),
        fields,
    })
}

// -- Functions --------------------------------------------------------------

fn param(input: &mut &str) -> ModalResult<ParamDef> {
    line_ws.parse_next(input)?;
    let name = ident.parse_next(input)?;
    line_ws.parse_next(input)?;
    cut_err(':').parse_next(input)?;
    line_ws.parse_next(input)?;
    let ty = cut_err(type_expr).parse_next(input)?;
    let optional = opt(preceded(line_ws, '?')).parse_next(input)?.is_some();
    Ok(ParamDef {
        name: name.to_owned(),
        ty,
        optional,
    })
}

fn function_def(input: &mut &str) -> ModalResult<FunctionSig> {
    let name = ident.parse_next(input)?;
    line_ws.parse_next(input)?;
    ':'.parse_next(input)?;
    line_ws.parse_next(input)?;
    // The opening parenthesis is what distinguishes a function declaration
    // from a field; only commit past this point.
    '('.parse_next(input)?;
    let params: Vec<ParamDef> = cut_err(separated(0.., param, (line_ws, ','))).parse_next(input)?;
    line_ws.parse_next(input)?;
    cut_err(')').parse_next(input)?;
    line_ws.parse_next(input)?;
    cut_err("->")
        .context(StrContext::Expected(StrContextValue::StringLiteral("->")))
        .parse_next(input)?;
    line_ws.parse_next(input)?;
    let return_type = cut_err(type_expr).parse_next(input)?;
    line_end.parse_next(input)?;
    Ok(FunctionSig {
        name: name.to_owned(),
        params,
        return_type,
    })
}

// -- Top-level parser -------------------------------------------------------

enum Entry {
    Field(FieldDef),
    Struct(StructDef),
    Function(FunctionSig),
}

fn top_entry(input: &mut &str) -> ModalResult<Entry> {
    alt((
        struct_def.map(Entry::Struct),
        function_def.map(Entry::Function),
        field_def.map(Entry::Field),
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "field, struct, or function declaration",
    )))
    .parse_next(input)
}

pub(crate) fn schema(input: &mut &str) -> ModalResult<SchemaAst> {
    let mut ast = SchemaAst::default();
    loop {
        ws_nl.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        match top_entry.parse_next(input)? {
            Entry::Field(f) => ast.fields.push(f),
            Entry::Struct(s) => ast.structs.push(s),
            Entry::Function(f) => ast.functions.push(f),
        }
    }
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use crate::schema::parse_schema;

    use super::*;

    #[test]
    fn parse_simple_field() {
        let ast = parse_schema("credit_score: Int").unwrap();
        assert_eq!(ast.fields.len(), 1);
        assert_eq!(ast.fields[0].name, "credit_score");
        assert_eq!(ast.fields[0].ty, TypeExpr::Primitive(Primitive::Int));
        assert!(!ast.fields[0].optional);
    }

    #[test]
    fn parse_optional_field() {
        let ast = parse_schema("nickname: Str?").unwrap();
        assert!(ast.fields[0].optional);
    }

    #[test]
    fn parse_field_with_constraints() {
        let ast = parse_schema("age: Int {min: 13, max: 120}").unwrap();
        assert_eq!(
            ast.fields[0].constraints,
            vec![
                Constraint::Min(Value::Int(13)),
                Constraint::Max(Value::Int(120)),
            ]
        );
    }

    #[test]
    fn parse_float_constraint_greedily() {
        let ast = parse_schema("rate: Float {min: 0.1}").unwrap();
        assert_eq!(
            ast.fields[0].constraints,
            vec![Constraint::Min(Value::Float(0.1))]
        );
    }

    #[test]
    fn parse_one_of_constraint() {
        let ast = parse_schema("state: Str {oneOf: ['CA', 'NY']}").unwrap();
        assert_eq!(
            ast.fields[0].constraints,
            vec![Constraint::OneOf(vec![
                Value::Str("CA".into()),
                Value::Str("NY".into()),
            ])]
        );
    }

    #[test]
    fn parse_unknown_constraint_key_rejected() {
        assert!(parse_schema("age: Int {minimum: 13}").is_err());
    }

    #[test]
    fn parse_list_field() {
        let ast = parse_schema("tags: List[Str]").unwrap();
        assert_eq!(ast.fields[0].ty, TypeExpr::List(vec!["Str".into()]));
    }

    #[test]
    fn parse_list_union_field() {
        let ast = parse_schema("mixed: List[Int|Str]").unwrap();
        assert_eq!(
            ast.fields[0].ty,
            TypeExpr::List(vec!["Int".into(), "Str".into()])
        );
    }

    #[test]
    fn parse_list_requires_brackets() {
        assert!(parse_schema("xs: List").is_err());
    }

    #[test]
    fn parse_top_level_union_rejected() {
        assert!(parse_schema("x: Int|Str").is_err());
    }

    #[test]
    fn parse_struct() {
        let ast = parse_schema("struct Addr { city: Str, zip: Str }").unwrap();
        assert_eq!(ast.structs.len(), 1);
        assert_eq!(ast.structs[0].name, "Addr");
        assert_eq!(ast.structs[0].fields.len(), 2);
    }

    #[test]
    fn parse_struct_newline_separated() {
        let ast = parse_schema("struct Addr {\n    city: Str\n    zip: Str\n}").unwrap();
        assert_eq!(ast.structs[0].fields.len(), 2);
    }

    #[test]
    fn parse_struct_mixed_separators() {
        let ast = parse_schema("struct User {\n    name: Str,\n    age: Int {min: 0}\n    active: Bool\n}").unwrap();
        assert_eq!(ast.structs[0].fields.len(), 3);
    }

    #[test]
    fn parse_struct_reference_field() {
        let ast = parse_schema("struct Addr { city: Str }\naddr: Addr").unwrap();
        assert_eq!(ast.fields[0].ty, TypeExpr::Named("Addr".into()));
    }

    #[test]
    fn parse_function() {
        let ast = parse_schema("risk: (score: Int, region: Str) -> Float").unwrap();
        assert_eq!(ast.functions.len(), 1);
        let f = &ast.functions[0];
        assert_eq!(f.name, "risk");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].name, "score");
        assert_eq!(f.params[0].ty, TypeExpr::Primitive(Primitive::Int));
        assert_eq!(f.return_type, TypeExpr::Primitive(Primitive::Float));
    }

    #[test]
    fn parse_function_optional_param() {
        let ast = parse_schema("lookup: (key: Str, fallback: Str?) -> Str").unwrap();
        assert!(ast.functions[0].params[1].optional);
    }

    #[test]
    fn parse_nullary_function() {
        let ast = parse_schema("now: () -> Int").unwrap();
        assert!(ast.functions[0].params.is_empty());
    }

    #[test]
    fn parse_comments_ignored() {
        let ast = parse_schema("# header\ncredit_score: Int # inline\n# trailing\n").unwrap();
        assert_eq!(ast.fields.len(), 1);
    }

    #[test]
    fn parse_mixed_schema() {
        let text = "\
# customer schema
struct Addr {
    city: Str
    state: Str {oneOf: ['CA', 'NY', 'TX']}
}
credit_score: Int {min: 300, max: 850}
addr: Addr
email: Str?
score_fn: (base: Int) -> Float
";
        let ast = parse_schema(text).unwrap();
        assert_eq!(ast.structs.len(), 1);
        assert_eq!(ast.fields.len(), 3);
        assert_eq!(ast.functions.len(), 1);
    }

    #[test]
    fn parse_two_fields_one_line_rejected() {
        assert!(parse_schema("a: Int b: Str").is_err());
    }

    #[test]
    fn parse_error_carries_line() {
        let err = parse_schema("ok: Int\nbroken: {min: 1}").unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn parse_string_escape_in_constraint() {
        let ast = parse_schema(r"code: Str {pattern: '\'quoted\''}").unwrap();
        assert_eq!(
            ast.fields[0].constraints,
            vec![Constraint::Pattern("'quoted'".into())]
        );
    }

    #[test]
    fn parse_negative_bounds() {
        let ast = parse_schema("delta: Int {min: -10, max: -1}").unwrap();
        assert_eq!(
            ast.fields[0].constraints,
            vec![
                Constraint::Min(Value::Int(-10)),
                Constraint::Max(Value::Int(-1)),
            ]
        );
    }
}
