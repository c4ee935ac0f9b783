//! Recursive-descent SML parser

use crate::error::{SecsError, SecsResult};
use crate::message::SecsMessage;
use crate::secs2::MAX_NESTING_DEPTH;
use crate::sml::lexer::{Token, TokenKind, error_at, tokenize};
use once_cell::sync::Lazy;
use regex::Regex;
use secs_core::{Item, ItemFormat};

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[Ss](\d+)[Ff](\d+)$").expect("header pattern is valid")
});

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    end: (usize, usize),
}

impl Parser {
    fn new(tokens: Vec<Token>, text: &str) -> Self {
        let line = text.lines().count().max(1);
        let column = text.lines().last().map(|l| l.chars().count() + 1).unwrap_or(1);
        Self {
            tokens,
            position: 0,
            end: (line, column),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> SecsResult<Token> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| error_at(self.end.0, self.end.1, "unexpected end of input"))?;
        self.position += 1;
        Ok(token)
    }

    fn expect_end(&self) -> SecsResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(error_at(t.line, t.column, "unexpected trailing input")),
        }
    }

    fn parse_item(&mut self, depth: usize) -> SecsResult<Item> {
        let open = self.next()?;
        if open.kind != TokenKind::Open {
            return Err(error_at(open.line, open.column, "expected '<'"));
        }
        if depth >= MAX_NESTING_DEPTH {
            return Err(error_at(open.line, open.column, "list nesting too deep"));
        }

        let keyword = self.next()?;
        let format = match &keyword.kind {
            TokenKind::Word(w) => ItemFormat::from_sml_name(w).ok_or_else(|| {
                error_at(keyword.line, keyword.column, format!("unknown item type '{}'", w))
            })?,
            _ => return Err(error_at(keyword.line, keyword.column, "expected item type")),
        };

        // the [n] annotation is advisory only
        if let Some(Token { kind: TokenKind::Length(_), .. }) = self.peek() {
            self.position += 1;
        }

        if format == ItemFormat::List {
            let mut items = Vec::new();
            loop {
                match self.peek() {
                    Some(Token { kind: TokenKind::Close, .. }) => {
                        self.position += 1;
                        return Item::list(items).map_err(|e| at(&open, e));
                    }
                    Some(_) => items.push(self.parse_item(depth + 1)?),
                    None => return Err(error_at(open.line, open.column, "unterminated list")),
                }
            }
        }

        let mut values = Vec::new();
        loop {
            let token = self.next().map_err(|_| error_at(open.line, open.column, "unterminated item"))?;
            if token.kind == TokenKind::Close {
                break;
            }
            values.push(token);
        }
        build_scalar(format, &open, &values)
    }
}

fn at(token: &Token, err: SecsError) -> SecsError {
    match err {
        SecsError::SmlParse { .. } => err,
        other => error_at(token.line, token.column, other.to_string()),
    }
}

fn parse_integer(word: &str) -> Option<i128> {
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word.strip_prefix('+').unwrap_or(word)),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -value } else { value })
}

fn word_of(token: &Token) -> SecsResult<&str> {
    match &token.kind {
        TokenKind::Word(w) => Ok(w),
        _ => Err(error_at(token.line, token.column, "expected a value")),
    }
}

fn build_scalar(format: ItemFormat, open: &Token, values: &[Token]) -> SecsResult<Item> {
    match format {
        ItemFormat::List => unreachable!("lists are parsed by the caller"),
        ItemFormat::Ascii => {
            let mut text = String::new();
            for token in values {
                match &token.kind {
                    TokenKind::Text(s) => text.push_str(s),
                    TokenKind::Word(w) => {
                        let code = parse_integer(w)
                            .filter(|c| (0..=0x7F).contains(c))
                            .ok_or_else(|| {
                                error_at(token.line, token.column, format!("invalid character code '{}'", w))
                            })?;
                        text.push(code as u8 as char);
                    }
                    _ => return Err(error_at(token.line, token.column, "unexpected token in ASCII item")),
                }
            }
            Item::ascii(text).map_err(|e| at(open, e))
        }
        ItemFormat::Binary => {
            let bytes = values
                .iter()
                .map(|t| {
                    let w = word_of(t)?;
                    parse_integer(w)
                        .and_then(|v| u8::try_from(v).ok())
                        .ok_or_else(|| error_at(t.line, t.column, format!("invalid byte '{}'", w)))
                })
                .collect::<SecsResult<Vec<u8>>>()?;
            Item::binary(bytes).map_err(|e| at(open, e))
        }
        ItemFormat::Boolean => {
            let flags = values
                .iter()
                .map(|t| {
                    let w = word_of(t)?;
                    match w.to_ascii_uppercase().as_str() {
                        "TRUE" | "T" => Ok(true),
                        "FALSE" | "F" => Ok(false),
                        _ => match parse_integer(w) {
                            Some(v) => Ok(v != 0),
                            None => Err(error_at(t.line, t.column, format!("invalid boolean '{}'", w))),
                        },
                    }
                })
                .collect::<SecsResult<Vec<bool>>>()?;
            Item::boolean(flags).map_err(|e| at(open, e))
        }
        ItemFormat::F4 => {
            let floats = values
                .iter()
                .map(|t| {
                    let w = word_of(t)?;
                    w.parse::<f32>()
                        .map_err(|_| error_at(t.line, t.column, format!("invalid float '{}'", w)))
                })
                .collect::<SecsResult<Vec<f32>>>()?;
            Item::f4(floats).map_err(|e| at(open, e))
        }
        ItemFormat::F8 => {
            let floats = values
                .iter()
                .map(|t| {
                    let w = word_of(t)?;
                    w.parse::<f64>()
                        .map_err(|_| error_at(t.line, t.column, format!("invalid float '{}'", w)))
                })
                .collect::<SecsResult<Vec<f64>>>()?;
            Item::f8(floats).map_err(|e| at(open, e))
        }
        integer => {
            let mut numbers = Vec::with_capacity(values.len());
            for t in values {
                let w = word_of(t)?;
                let value = parse_integer(w)
                    .ok_or_else(|| error_at(t.line, t.column, format!("invalid integer '{}'", w)))?;
                numbers.push(value);
            }
            Item::from_integers(integer, &numbers).map_err(|e| at(open, e))
        }
    }
}

/// Strip one message terminator `.` that follows the final `>`
fn strip_terminator(text: &str) -> &str {
    let trimmed = text.trim_end();
    match trimmed.strip_suffix('.') {
        Some(rest) if rest.trim_end().ends_with('>') => rest,
        _ => text,
    }
}

/// Parse an SML item, e.g. `<L [2] <A "MDLN"> <U1 1>>`
pub fn parse_item(text: &str) -> SecsResult<Item> {
    let body = strip_terminator(text);
    let mut parser = Parser::new(tokenize(body)?, body);
    if parser.peek().is_none() {
        return Err(error_at(1, 1, "empty input"));
    }
    let item = parser.parse_item(0)?;
    parser.expect_end()?;
    Ok(item)
}

/// Parse an SML message, e.g. `S1F13 W\n<L>.`
///
/// System bytes and device id are zero; callers assign them when sending.
pub fn parse_message(text: &str) -> SecsResult<SecsMessage> {
    let trimmed = text.trim_end();
    let body = trimmed.strip_suffix('.').unwrap_or(trimmed);
    let mut parser = Parser::new(tokenize(body)?, body);

    let head = parser.next()?;
    let (stream, function) = match &head.kind {
        TokenKind::Word(w) => {
            let caps = HEADER_RE
                .captures(w)
                .ok_or_else(|| error_at(head.line, head.column, format!("invalid message header '{}'", w)))?;
            let stream = caps[1]
                .parse::<u32>()
                .map_err(|_| error_at(head.line, head.column, "stream out of range"))?;
            let function = caps[2]
                .parse::<u32>()
                .map_err(|_| error_at(head.line, head.column, "function out of range"))?;
            (stream, function)
        }
        _ => return Err(error_at(head.line, head.column, "expected message header")),
    };

    let mut w_bit = false;
    if let Some(Token { kind: TokenKind::Word(w), .. }) = parser.peek() {
        if w.eq_ignore_ascii_case("W") {
            w_bit = true;
            parser.position += 1;
        }
    }

    let body_item = match parser.peek() {
        Some(_) => Some(parser.parse_item(0)?),
        None => None,
    };
    parser.expect_end()?;

    SecsMessage::new(stream, function, w_bit, body_item, 0, 0).map_err(|e| at(&head, e))
}
