//! SML tokenizer

use crate::error::{SecsError, SecsResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Open,
    Close,
    /// `[n]` length annotation
    Length(usize),
    /// Quoted ASCII run, quotes removed
    Text(String),
    /// Keyword or value literal
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

pub fn error_at(line: usize, column: usize, message: impl Into<String>) -> SecsError {
    SecsError::SmlParse {
        line,
        column,
        message: message.into(),
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '<' | '>' | '[' | ']' | '"' | '\'')
}

/// Split SML text into tokens, tracking 1-based line and column
pub fn tokenize(text: &str) -> SecsResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    let advance = |i: &mut usize, line: &mut usize, column: &mut usize, c: char| {
        *i += 1;
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let (start_line, start_column) = (line, column);
        match c {
            c if c.is_whitespace() => advance(&mut i, &mut line, &mut column, c),
            '<' => {
                tokens.push(Token { kind: TokenKind::Open, line, column });
                advance(&mut i, &mut line, &mut column, c);
            }
            '>' => {
                tokens.push(Token { kind: TokenKind::Close, line, column });
                advance(&mut i, &mut line, &mut column, c);
            }
            '[' => {
                advance(&mut i, &mut line, &mut column, c);
                let mut digits = String::new();
                loop {
                    match chars.get(i) {
                        Some(']') => {
                            advance(&mut i, &mut line, &mut column, ']');
                            break;
                        }
                        Some(&d) if d.is_ascii_digit() || d.is_whitespace() => {
                            if !d.is_whitespace() {
                                digits.push(d);
                            }
                            advance(&mut i, &mut line, &mut column, d);
                        }
                        Some(&other) => {
                            return Err(error_at(
                                line,
                                column,
                                format!("unexpected '{}' in length annotation", other),
                            ));
                        }
                        None => {
                            return Err(error_at(start_line, start_column, "unterminated '['"));
                        }
                    }
                }
                let length = digits
                    .parse::<usize>()
                    .map_err(|_| error_at(start_line, start_column, "empty length annotation"))?;
                tokens.push(Token {
                    kind: TokenKind::Length(length),
                    line: start_line,
                    column: start_column,
                });
            }
            '"' | '\'' => {
                let quote = c;
                advance(&mut i, &mut line, &mut column, c);
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        Some(&q) if q == quote => {
                            advance(&mut i, &mut line, &mut column, q);
                            break;
                        }
                        Some(&ch) => {
                            if !ch.is_ascii() {
                                return Err(error_at(line, column, "non-ASCII character in string"));
                            }
                            text.push(ch);
                            advance(&mut i, &mut line, &mut column, ch);
                        }
                        None => {
                            return Err(error_at(start_line, start_column, "unterminated string"));
                        }
                    }
                }
                tokens.push(Token {
                    kind: TokenKind::Text(text),
                    line: start_line,
                    column: start_column,
                });
            }
            ']' => return Err(error_at(line, column, "unexpected ']'")),
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.get(i) {
                    if is_delimiter(ch) {
                        break;
                    }
                    word.push(ch);
                    advance(&mut i, &mut line, &mut column, ch);
                }
                tokens.push(Token {
                    kind: TokenKind::Word(word),
                    line: start_line,
                    column: start_column,
                });
            }
        }
    }
    Ok(tokens)
}
