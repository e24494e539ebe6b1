use winnow::combinator::{alt, opt};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::error::RuleParseError;

/// One token of the rule expression language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// An operator symbol: registered symbols plus the fixed comparison set.
    Symbol(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{s}'"),
            Token::Int(i) => format!("'{i}'"),
            Token::Float(f) => format!("'{f}'"),
            Token::Str(s) => format!("'{s}'"),
            Token::Symbol(s) => format!("'{s}'"),
            Token::LParen => "'('".to_owned(),
            Token::RParen => "')'".to_owned(),
            Token::LBracket => "'['".to_owned(),
            Token::RBracket => "']'".to_owned(),
            Token::Comma => "','".to_owned(),
            Token::Dot => "'.'".to_owned(),
        }
    }
}

/// Symbols every rule can use regardless of the operator preset; greedy
/// matching unions these with the registry's symbols.
const STRUCTURAL_SYMBOLS: [&str; 6] = [">=", "<=", "!=", ">", "<", "="];

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

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

/// Floats are tried before integers so `600.0` is one Float token rather
/// than `600`, `.`, `0`.
fn number(input: &mut &str) -> ModalResult<Token> {
    let with_fraction = (
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(1.., |c: char| c.is_ascii_digit()))),
    )
        .take()
        .parse_next(input)?;
    if with_fraction.contains('.') {
        with_fraction
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| winnow::error::ErrMode::from_input(input))
    } else {
        with_fraction
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|_| winnow::error::ErrMode::from_input(input))
    }
}

/// Tokenize a rule expression. `registered_symbols` come from the operator
/// registry, longest first; they are merged with the structural set so
/// comparison symbols always lex as single tokens.
pub(crate) fn tokenize(
    text: &str,
    registered_symbols: &[&str],
) -> Result<Vec<Token>, RuleParseError> {
    let mut symbols: Vec<&str> = registered_symbols
        .iter()
        .copied()
        .chain(STRUCTURAL_SYMBOLS)
        .collect();
    symbols.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    symbols.dedup();

    let mut tokens = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(tokens);
        }

        let mut input = rest;
        if let Ok(tok) = alt((
            string_literal.map(Token::Str),
            number,
            ident.map(|s| Token::Ident(s.to_owned())),
        ))
        .parse_next(&mut input)
        {
            tokens.push(tok);
            rest = input;
            continue;
        }

        if let Some(sym) = symbols.iter().find(|sym| rest.starts_with(**sym)) {
            tokens.push(Token::Symbol((*sym).to_owned()));
            rest = &rest[sym.len()..];
            continue;
        }

        let structural = match rest.as_bytes()[0] {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b',' => Some(Token::Comma),
            b'.' => Some(Token::Dot),
            _ => None,
        };
        match structural {
            Some(tok) => {
                tokens.push(tok);
                rest = &rest[1..];
            }
            None => {
                let position = text.len() - rest.len();
                return Err(RuleParseError::new(format!(
                    "Unexpected character '{}' at position {position}",
                    rest.chars().next().unwrap_or('?')
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Vec<Token> {
        tokenize(text, &[">=", "<=", "!=", ">", "<", "="]).unwrap()
    }

    #[test]
    fn lex_comparison() {
        assert_eq!(
            lex("credit_score < 600"),
            vec![
                Token::Ident("credit_score".into()),
                Token::Symbol("<".into()),
                Token::Int(600),
            ]
        );
    }

    #[test]
    fn lex_float_before_int() {
        assert_eq!(lex("600.0"), vec![Token::Float(600.0)]);
        assert_eq!(lex("600"), vec![Token::Int(600)]);
    }

    #[test]
    fn lex_multichar_symbols_greedily() {
        assert_eq!(
            lex("a >= 1"),
            vec![
                Token::Ident("a".into()),
                Token::Symbol(">=".into()),
                Token::Int(1),
            ]
        );
        assert_eq!(
            lex("a > = 1"),
            vec![
                Token::Ident("a".into()),
                Token::Symbol(">".into()),
                Token::Symbol("=".into()),
                Token::Int(1),
            ]
        );
    }

    #[test]
    fn lex_string_literal() {
        assert_eq!(lex("'CA'"), vec![Token::Str("CA".into())]);
        assert_eq!(lex(r"'it\'s'"), vec![Token::Str("it's".into())]);
    }

    #[test]
    fn lex_dotted_path() {
        assert_eq!(
            lex("addr.city"),
            vec![
                Token::Ident("addr".into()),
                Token::Dot,
                Token::Ident("city".into()),
            ]
        );
    }

    #[test]
    fn lex_list_and_call_structure() {
        assert_eq!(
            lex("f(x, ['a'])"),
            vec![
                Token::Ident("f".into()),
                Token::LParen,
                Token::Ident("x".into()),
                Token::Comma,
                Token::LBracket,
                Token::Str("a".into()),
                Token::RBracket,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn lex_is_whitespace_invariant() {
        assert_eq!(lex("a>=1"), lex("a >= 1"));
        assert_eq!(lex("f(x,y)"), lex("f( x , y )"));
    }

    #[test]
    fn lex_keywords_are_plain_idents() {
        assert_eq!(
            lex("not in"),
            vec![Token::Ident("not".into()), Token::Ident("in".into())]
        );
    }

    #[test]
    fn lex_unexpected_character() {
        let err = tokenize("a @ 1", &[]).unwrap_err();
        assert!(err.message.contains('@'));
    }

    #[test]
    fn lex_empty_input() {
        assert_eq!(lex(""), Vec::<Token>::new());
        assert_eq!(lex("   "), Vec::<Token>::new());
    }
}
