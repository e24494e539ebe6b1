use crate::engine::RulesMode;
use crate::error::{Error, RuleParseError, TypeMismatchError};
use crate::ops::{Assoc, Fixity, OpFn, OperatorRegistry};
use crate::schema::SchemaRegistry;
use crate::types::Value;

use super::ast::{RuleAst, RuleNode};
use super::lexer::{Token, tokenize};

/// A parsed rule plus any best-effort warnings recorded in loose rules mode.
#[derive(Debug)]
pub(crate) struct ParsedRule {
    pub(crate) ast: RuleAst,
    pub(crate) warnings: Vec<String>,
}

/// Parse one rule expression against a schema and operator table.
///
/// # Errors
///
/// [`RuleParseError`] for syntax and name-resolution failures;
/// [`TypeMismatchError`] when strict rules mode finds no operator or
/// function signature accepting the operand types.
pub(crate) fn parse_rule(
    text: &str,
    schema: &SchemaRegistry,
    ops: &OperatorRegistry,
    mode: RulesMode,
) -> Result<ParsedRule, Error> {
    let symbols = ops.symbols_longest_first();
    let tokens = tokenize(text, &symbols)?;
    if tokens.is_empty() {
        return Err(RuleParseError::new("empty rule expression").into());
    }
    let mut parser = RuleParser {
        tokens,
        pos: 0,
        schema,
        ops,
        mode,
        warnings: Vec::new(),
    };
    let root = parser.parse_expr(0)?;
    if let Some(tok) = parser.peek() {
        return Err(RuleParseError::new(format!(
            "unexpected trailing token {}",
            tok.describe()
        ))
        .into());
    }
    Ok(ParsedRule {
        ast: RuleAst::new(root),
        warnings: parser.warnings,
    })
}

struct RuleParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    schema: &'a SchemaRegistry,
    ops: &'a OperatorRegistry,
    mode: RulesMode,
    warnings: Vec<String>,
}

impl RuleParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), Error> {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(RuleParseError::new(format!(
                "expected {}, got {}",
                expected.describe(),
                t.describe()
            ))
            .into()),
            None => Err(RuleParseError::new(format!(
                "expected {}, got end of rule",
                expected.describe()
            ))
            .into()),
        }
    }

    /// The operator token at the cursor, if any: a symbol, a registered
    /// keyword, or the fused two-word `not in`.
    fn peek_operator(&self) -> Option<String> {
        match self.peek()? {
            Token::Symbol(s) => Some(s.clone()),
            Token::Ident(name) => {
                if name == "not"
                    && matches!(self.peek_at(1), Some(Token::Ident(next)) if next == "in")
                {
                    Some("not in".to_owned())
                } else if self.ops.get_binding_power(name).is_some() {
                    Some(name.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<RuleNode, Error> {
        let mut left = self.nud()?;
        loop {
            let Some(op_token) = self.peek_operator() else {
                break;
            };
            let bp = self.ops.get_binding_power(&op_token).unwrap_or(0);
            if bp <= min_bp {
                break;
            }
            self.pos += if op_token == "not in" { 2 } else { 1 };
            left = self.led(&op_token, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self) -> Result<RuleNode, Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(RuleParseError::new("unexpected end of rule").into());
        };
        match token {
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => self.list_literal(),
            Token::Int(i) => {
                self.pos += 1;
                Ok(literal(Value::Int(i)))
            }
            Token::Float(f) => {
                self.pos += 1;
                Ok(literal(Value::Float(f)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(literal(Value::Str(s)))
            }
            Token::Symbol(s) => {
                if self.ops.fixity(&s) == Some(Fixity::Prefix) {
                    self.pos += 1;
                    self.prefix_op(&s)
                } else {
                    Err(RuleParseError::new(format!("unexpected token '{s}'")).into())
                }
            }
            Token::Ident(name) => {
                if name == "true" {
                    self.pos += 1;
                    return Ok(literal(Value::Bool(true)));
                }
                if name == "false" {
                    self.pos += 1;
                    return Ok(literal(Value::Bool(false)));
                }
                if self.ops.fixity(&name) == Some(Fixity::Prefix) {
                    self.pos += 1;
                    return self.prefix_op(&name);
                }
                self.pos += 1;
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.call(name)
                } else {
                    self.variable(name)
                }
            }
            other => {
                Err(RuleParseError::new(format!("unexpected token {}", other.describe())).into())
            }
        }
    }

    fn led(&mut self, token: &str, left: RuleNode) -> Result<RuleNode, Error> {
        match self.ops.fixity(token) {
            Some(Fixity::Infix) => {
                let bp = self.ops.get_binding_power(token).unwrap_or(0);
                let assoc = self
                    .ops
                    .candidates(token)
                    .first()
                    .map_or(Assoc::Left, crate::ops::OperatorDef::assoc);
                let right_bp = if assoc == Assoc::Right {
                    bp.saturating_sub(1)
                } else {
                    bp
                };
                let right = self.parse_expr(right_bp)?;
                let (type_name, func) =
                    self.resolve(token, &[left.type_name(), right.type_name()])?;
                Ok(RuleNode::Binary {
                    token: token.to_owned(),
                    left: Box::new(left),
                    right: Box::new(right),
                    type_name,
                    func,
                })
            }
            Some(Fixity::Postfix) => {
                let (type_name, func) = self.resolve(token, &[left.type_name()])?;
                Ok(RuleNode::Unary {
                    token: token.to_owned(),
                    operand: Box::new(left),
                    type_name,
                    func,
                })
            }
            Some(Fixity::Prefix) | None => Err(RuleParseError::new(format!(
                "operator '{token}' cannot appear after an operand"
            ))
            .into()),
        }
    }

    fn prefix_op(&mut self, token: &str) -> Result<RuleNode, Error> {
        let bp = self.ops.get_binding_power(token).unwrap_or(0);
        let operand = self.parse_expr(bp)?;
        let (type_name, func) = self.resolve(token, &[operand.type_name()])?;
        Ok(RuleNode::Unary {
            token: token.to_owned(),
            operand: Box::new(operand),
            type_name,
            func,
        })
    }

    /// Resolve an operator against actual operand types: exact match first,
    /// then wildcard. Strict mode raises on an unsatisfiable signature;
    /// loose mode warns and best-effort-compiles with result type `Any`.
    fn resolve(
        &mut self,
        token: &str,
        operand_types: &[&str],
    ) -> Result<(String, Option<OpFn>), Error> {
        if let Some(op) = self.ops.lookup_by_types(token, operand_types) {
            return Ok((op.return_type().to_owned(), op.func().cloned()));
        }
        let candidates = self.ops.candidates(token);
        if candidates.is_empty() {
            return Err(RuleParseError::new(format!("unknown operator '{token}'")).into());
        }
        let got = operand_types.join(", ");
        match self.mode {
            RulesMode::Strict => Err(TypeMismatchError::expected_got(
                format!("no operator '{token}' accepts ({got})"),
                candidates[0].input_types().join(", "),
                got,
            )
            .into()),
            RulesMode::Loose => {
                self.warnings.push(format!(
                    "operator '{token}' applied to ({got}); compiled best-effort"
                ));
                let fallback = candidates
                    .iter()
                    .find(|op| op.input_types().len() == operand_types.len())
                    .unwrap_or(&candidates[0]);
                Ok(("Any".to_owned(), fallback.func().cloned()))
            }
        }
    }

    fn variable(&mut self, first: String) -> Result<RuleNode, Error> {
        let mut path = first;
        while matches!(self.peek(), Some(Token::Dot)) {
            self.pos += 1;
            match self.peek().cloned() {
                Some(Token::Ident(segment)) => {
                    self.pos += 1;
                    path.push('.');
                    path.push_str(&segment);
                }
                _ => return Err(RuleParseError::new("expected a name after '.'").into()),
            }
        }
        match self.schema.get_field(&path) {
            Some(field) => Ok(RuleNode::Variable {
                type_name: field.ty.type_name().to_owned(),
                path,
            }),
            None => Err(RuleParseError::unknown_field(&path).into()),
        }
    }

    fn call(&mut self, name: String) -> Result<RuleNode, Error> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_expr(0)?);
                match self.peek() {
                    Some(Token::Comma) => self.pos += 1,
                    Some(Token::RParen) => break,
                    _ => {
                        return Err(RuleParseError::new(format!(
                            "expected ',' or ')' in call to '{name}'"
                        ))
                        .into());
                    }
                }
            }
        }
        self.expect(&Token::RParen)?;
        // Unknown callees are polymorphic: the compiler checks declared
        // signatures, the evaluator requires the function map to supply them.
        let type_name = self
            .schema
            .function(&name)
            .map_or_else(|| "Any".to_owned(), |sig| sig.return_type.type_name().to_owned());
        Ok(RuleNode::Call {
            name,
            args,
            type_name,
        })
    }

    fn list_literal(&mut self) -> Result<RuleNode, Error> {
        self.expect(&Token::LBracket)?;
        let mut items = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Token::RBracket) => {
                    self.pos += 1;
                    break;
                }
                None => return Err(RuleParseError::new("unterminated list literal").into()),
                Some(_) => {
                    items.push(self.literal_item()?);
                    match self.peek() {
                        Some(Token::Comma) => self.pos += 1,
                        Some(Token::RBracket) => {}
                        _ => {
                            return Err(RuleParseError::new(
                                "expected ',' or ']' in list literal",
                            )
                            .into());
                        }
                    }
                }
            }
        }
        Ok(RuleNode::ListLiteral {
            items,
            type_name: "List".to_owned(),
        })
    }

    fn literal_item(&mut self) -> Result<RuleNode, Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(RuleParseError::new("unexpected end of rule").into());
        };
        let value = match token {
            Token::Int(i) => Value::Int(i),
            Token::Float(f) => Value::Float(f),
            Token::Str(s) => Value::Str(s),
            Token::Ident(name) if name == "true" => Value::Bool(true),
            Token::Ident(name) if name == "false" => Value::Bool(false),
            other => {
                return Err(RuleParseError::new(format!(
                    "list literals may only contain literal values, got {}",
                    other.describe()
                ))
                .into());
            }
        };
        self.pos += 1;
        Ok(literal(value))
    }
}

fn literal(value: Value) -> RuleNode {
    let type_name = value.type_name().to_owned();
    RuleNode::Literal { value, type_name }
}
