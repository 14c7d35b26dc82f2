//! Tokenizer for unit expressions
//!
//! Tokens carry the byte offset of their first character in the normalized
//! input, so syntax errors can point a caret at the exact spot.

use gauge_core::GaugeError;

/// Normalize unicode operator glyphs to their ASCII equivalents.
///
/// Pure pre-pass over the raw input; the grammar itself only ever sees the
/// ASCII forms. Error offsets refer to the normalized text.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '×' | '·' => out.push('*'),
            '÷' => out.push('/'),
            '−' => out.push('-'),
            '²' => out.push_str("^2"),
            '³' => out.push_str("^3"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    /// Identifier immediately followed by `(` — function-call syntax.
    /// `name (expr)` with a space is adjacency multiplication instead.
    Func(String),
    Star,
    Slash,
    Pipe,
    Caret,
    Minus,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize normalized input. Whitespace separates tokens but produces none.
pub fn tokenize(input: &str) -> Result<Vec<Token>, GaugeError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Star, offset });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, offset });
                i += 1;
            }
            '|' => {
                tokens.push(Token { kind: TokenKind::Pipe, offset });
                i += 1;
            }
            '^' => {
                tokens.push(Token { kind: TokenKind::Caret, offset });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, offset });
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, offset });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, offset });
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (value, next) = lex_number(input, &chars, i)?;
                tokens.push(Token { kind: TokenKind::Number(value), offset });
                i = next;
            }
            c if is_ident_start(c) => {
                let mut j = i + 1;
                while j < chars.len() && is_ident_continue(chars[j].1) {
                    j += 1;
                }
                let end = if j < chars.len() { chars[j].0 } else { input.len() };
                let name = input[offset..end].to_string();
                // A '(' with no intervening whitespace makes this a call.
                let kind = if j < chars.len() && chars[j].1 == '(' {
                    TokenKind::Func(name)
                } else {
                    TokenKind::Ident(name)
                };
                tokens.push(Token { kind, offset });
                i = j;
            }
            other => {
                return Err(GaugeError::syntax(
                    offset,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Lex a numeric literal starting at `chars[start]`.
/// Accepts decimal and scientific notation (`e`/`E`, optional sign).
fn lex_number(
    input: &str,
    chars: &[(usize, char)],
    start: usize,
) -> Result<(f64, usize), GaugeError> {
    let mut j = start;
    let mut seen_dot = false;

    while j < chars.len() {
        let c = chars[j].1;
        if c.is_ascii_digit() {
            j += 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            j += 1;
        } else {
            break;
        }
    }

    // An exponent marker only counts when digits follow; otherwise the
    // 'e' begins an identifier, as in "2ergs".
    if j < chars.len() && (chars[j].1 == 'e' || chars[j].1 == 'E') {
        let mut k = j + 1;
        if k < chars.len() && (chars[k].1 == '+' || chars[k].1 == '-') {
            k += 1;
        }
        if k < chars.len() && chars[k].1.is_ascii_digit() {
            k += 1;
            while k < chars.len() && chars[k].1.is_ascii_digit() {
                k += 1;
            }
            j = k;
        }
    }

    let begin = chars[start].0;
    let end = if j < chars.len() { chars[j].0 } else { input.len() };
    let text = &input[begin..end];
    let value: f64 = text
        .parse()
        .map_err(|_| GaugeError::syntax(begin, format!("invalid number '{}'", text)))?;
    Ok((value, j))
}
