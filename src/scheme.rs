//! Tokenizer and reader.
//!
//! Text is first split into [`Token`]s with `nom` combinators, then a [`Reader`] walks the
//! token sequence with an explicit cursor and builds [`Value`] forms.
//!
//! String literals are kept intact by the tokenizer: the body between the quotes is emitted
//! as a single text token, so whitespace, parentheses and `;` inside a string survive.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, take_till, take_till1, take_while1},
    character::complete::{anychar, char},
    combinator::{map, opt, recognize, value},
    multi::many0_count,
    sequence::pair,
};
use std::fmt;
use tracing::trace;

use crate::ast::{NumberType, Value};
use crate::{Config, Error, MAX_PARSE_DEPTH, ParseErrorKind};

/// A lexical token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Open,
    Close,
    Quote,
    DoubleQuote,
    /// An atom, or the raw body of a string literal
    Text(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
            Token::Quote => write!(f, "'"),
            Token::DoubleQuote => write!(f, "\""),
            Token::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Characters that end an atom
const DELIMITERS: &str = "()'\";";

/// Whitespace and `;` comments
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0_count(alt((
            take_while1(char::is_whitespace),
            recognize(pair(char(';'), take_till(|c: char| c == '\n'))),
        ))),
    )
    .parse(input)
}

fn delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Open, char('(')),
        value(Token::Close, char(')')),
        value(Token::Quote, char('\'')),
    ))
    .parse(input)
}

/// `"body"` becomes `DoubleQuote, Text(body), DoubleQuote`. An unterminated literal
/// swallows the rest of the input and has no closing token.
fn string_literal(input: &str) -> IResult<&str, Vec<Token>> {
    let (body_start, _) = char('"').parse(input)?;
    let (rest, body) = recognize(many0_count(alt((
        is_not("\\\""),
        recognize(pair(char('\\'), anychar)),
    ))))
    .parse(body_start)?;
    let (rest, closing) = opt(char('"')).parse(rest)?;

    let (rest, body) = match closing {
        Some(_) => (rest, body),
        None => ("", body_start),
    };

    let mut tokens = vec![Token::DoubleQuote];
    if !body.is_empty() {
        tokens.push(Token::Text(body.to_owned()));
    }
    if closing.is_some() {
        tokens.push(Token::DoubleQuote);
    }
    Ok((rest, tokens))
}

fn atom(input: &str) -> IResult<&str, Token> {
    map(
        take_till1(|c: char| c.is_whitespace() || DELIMITERS.contains(c)),
        |text: &str| Token::Text(text.to_owned()),
    )
    .parse(input)
}

fn token(input: &str) -> IResult<&str, Vec<Token>> {
    alt((
        map(delimiter, |t| vec![t]),
        string_literal,
        map(atom, |t| vec![t]),
    ))
    .parse(input)
}

fn lex_error(text: &str, err: nom::Err<nom::error::Error<&str>>) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = text.len().saturating_sub(e.input.len());
            let near: String = e.input.chars().take(10).collect();
            Error::LexError(format!("Unrecognized input at position {position} near '{near}'"))
        }
        nom::Err::Incomplete(_) => Error::LexError("Incomplete input".into()),
    }
}

/// Split source text into tokens
pub fn tokenize(text: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut input = text;

    loop {
        let (rest, ()) = skip_trivia(input).map_err(|e| lex_error(text, e))?;
        if rest.is_empty() {
            break;
        }
        let (rest, produced) = token(rest).map_err(|e| lex_error(text, e))?;
        tokens.extend(produced);
        input = rest;
    }

    trace!(count = tokens.len(), ?tokens, "tokenized");
    Ok(tokens)
}

/// Decode UTF-8 source, then tokenize it
pub fn tokenize_bytes(bytes: &[u8]) -> Result<Vec<Token>, Error> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::LexError(format!("Source is not valid UTF-8: {e}")))?;
    tokenize(text)
}

/// Builds forms from a token sequence, front to back
#[derive(Debug, Clone)]
pub struct Reader {
    tokens: Vec<Token>,
    pos: usize,
    max_depth: usize,
}

impl Reader {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_max_depth(tokens, MAX_PARSE_DEPTH)
    }

    pub fn with_max_depth(tokens: Vec<Token>, max_depth: usize) -> Self {
        Reader {
            tokens,
            pos: 0,
            max_depth,
        }
    }

    /// True once every token has been consumed
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Read the next complete form
    pub fn read(&mut self) -> Result<Value, Error> {
        self.read_form(0)
    }

    /// Read every remaining form in order
    pub fn read_all(&mut self) -> Result<Vec<Value>, Error> {
        let mut forms = Vec::new();
        while !self.is_at_end() {
            forms.push(self.read()?);
        }
        Ok(forms)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn enter(&self, depth: usize) -> Result<(), Error> {
        if depth >= self.max_depth {
            return Err(Error::parse(
                ParseErrorKind::TooDeeplyNested,
                format!("Expression too deeply nested (max depth: {})", self.max_depth),
                None,
            ));
        }
        Ok(())
    }

    fn read_form(&mut self, depth: usize) -> Result<Value, Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(Error::parse(
                ParseErrorKind::UnexpectedEof,
                "Unexpected end of input",
                None,
            ));
        };
        self.pos += 1;

        match token {
            Token::Open => {
                self.enter(depth)?;
                let mut elements = Vec::new();
                loop {
                    match self.peek() {
                        None => {
                            return Err(Error::parse(
                                ParseErrorKind::UnexpectedEof,
                                "Unclosed list: expected ')'",
                                None,
                            ));
                        }
                        Some(Token::Close) => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => elements.push(self.read_form(depth + 1)?),
                    }
                }
                Ok(Value::list(elements))
            }
            Token::Close => Err(Error::parse(
                ParseErrorKind::UnexpectedCloseParen,
                "Unexpected ')'",
                Some(")".into()),
            )),
            Token::Quote => {
                self.enter(depth)?;
                let quoted = self.read_form(depth + 1)?;
                Ok(Value::list(vec![Value::Symbol("quote".into()), quoted]))
            }
            Token::DoubleQuote => self.read_string(),
            Token::Text(text) => Ok(classify_atom(&text)),
        }
    }

    /// Everything up to the closing `"` is joined with single spaces, then unescaped
    fn read_string(&mut self) -> Result<Value, Error> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(Error::parse(
                        ParseErrorKind::UnexpectedEof,
                        "Unterminated string literal",
                        None,
                    ));
                }
                Some(Token::DoubleQuote) => {
                    self.pos += 1;
                    break;
                }
                Some(token) => {
                    parts.push(token.to_string());
                    self.pos += 1;
                }
            }
        }
        decode_escapes(&parts.join(" ")).map(Value::from)
    }
}

fn decode_escapes(raw: &str) -> Result<String, Error> {
    let mut decoded = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            decoded.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('\\') => decoded.push('\\'),
            Some('"') => decoded.push('"'),
            Some(other) => {
                return Err(Error::parse(
                    ParseErrorKind::InvalidSyntax,
                    format!("Unknown escape sequence '\\{other}' in string literal"),
                    Some(format!("\\{other}")),
                ));
            }
            None => {
                return Err(Error::parse(
                    ParseErrorKind::InvalidSyntax,
                    "Incomplete escape sequence at end of string literal",
                    Some("\\".into()),
                ));
            }
        }
    }
    Ok(decoded)
}

/// Made of digits, signs, `.` and exponent markers, with at least one digit
fn looks_like_float(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
}

/// Integer, then float (including the `+inf.0` family), then boolean, otherwise symbol
fn classify_atom(text: &str) -> Value {
    if let Ok(n) = text.parse::<NumberType>() {
        return Value::Integer(n);
    }
    if looks_like_float(text)
        && let Ok(x) = text.parse::<f64>()
    {
        return Value::Float(x);
    }
    match text {
        "+inf.0" => Value::Float(f64::INFINITY),
        "-inf.0" => Value::Float(f64::NEG_INFINITY),
        "+nan.0" | "-nan.0" => Value::Float(f64::NAN),
        "#t" => Value::Bool(true),
        "#f" => Value::Bool(false),
        _ => Value::Symbol(text.into()),
    }
}

/// Parse exactly one form using the configured nesting limit
pub fn parse_scheme_with_config(input: &str, config: &Config) -> Result<Value, Error> {
    let mut reader = Reader::with_max_depth(tokenize(input)?, config.max_parse_depth);
    let form = reader.read()?;
    match reader.peek() {
        None => Ok(form),
        Some(extra) => Err(Error::parse(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input starting at '{extra}'"),
            Some(extra.to_string()),
        )),
    }
}

/// Parse a complete S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    parse_scheme_with_config(input, &Config::default())
}

/// Parse every top-level form in order using the configured nesting limit
pub fn parse_program_with_config(input: &str, config: &Config) -> Result<Vec<Value>, Error> {
    Reader::with_max_depth(tokenize(input)?, config.max_parse_depth).read_all()
}

/// Parse every top-level form in order. Empty input yields no forms.
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    parse_program_with_config(input, &Config::default())
}
