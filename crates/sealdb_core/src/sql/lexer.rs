//! Statement tokenizer.
//!
//! Produces a flat token stream with byte positions for error reporting.
//! Comparison operators are matched longest-first from [`OPERATORS`], so
//! `>=` can never be split into `>` followed by `=`.

use crate::error::{CoreError, CoreResult};

/// Comparison operators recognised by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=` or `<>`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl Operator {
    /// Returns the operator with its operands swapped (`a < b` is `b > a`).
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::NotEq => Self::NotEq,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
        }
    }
}

/// Operator spellings, longest first.
pub const OPERATORS: &[(&str, Operator)] = &[
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    ("!=", Operator::NotEq),
    ("<>", Operator::NotEq),
    ("=", Operator::Eq),
    (">", Operator::Gt),
    ("<", Operator::Lt),
];

/// Kinds of token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: keyword or identifier.
    Ident(String),
    /// `"quoted"` or `` `quoted` `` identifier. Never a keyword.
    QuotedIdent(String),
    /// Single-quoted string with `''` already unescaped.
    Str(String),
    /// Numeric literal, kept as source text.
    Number(String),
    /// `X'..'` hex blob literal.
    Blob(Vec<u8>),
    /// Comparison operator.
    Op(Operator),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `*`
    Star,
    /// `;`
    Semicolon,
    /// End of input.
    Eof,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// Byte offset into the source.
    pub pos: usize,
}

impl Token {
    /// Returns true if this is the bare keyword `kw` (case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(word) if word.eq_ignore_ascii_case(kw))
    }
}

/// Splits `input` into tokens. The last token is always [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> CoreResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        // Line comment
        if input[pos..].starts_with("--") {
            pos = input[pos..].find('\n').map_or(bytes.len(), |n| pos + n);
            continue;
        }

        let start = pos;
        let kind = match c {
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'*' => {
                pos += 1;
                TokenKind::Star
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b'\'' => {
                let (text, end) = lex_quoted(input, pos, '\'')?;
                pos = end;
                TokenKind::Str(text)
            }
            b'"' | b'`' => {
                let (text, end) = lex_quoted(input, pos, c as char)?;
                pos = end;
                TokenKind::QuotedIdent(text)
            }
            b'x' | b'X' if bytes.get(pos + 1) == Some(&b'\'') => {
                let (text, end) = lex_quoted(input, pos + 1, '\'')?;
                let blob = hex::decode(&text)
                    .map_err(|_| CoreError::syntax("invalid hex in blob literal", start))?;
                pos = end;
                TokenKind::Blob(blob)
            }
            _ if starts_number(bytes, pos) => {
                let end = lex_number(bytes, pos);
                let text = input[pos..end].to_string();
                pos = end;
                TokenKind::Number(text)
            }
            _ if c.is_ascii_alphabetic() || c == b'_' => {
                let end = bytes[pos..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map_or(bytes.len(), |n| pos + n);
                let word = input[pos..end].to_string();
                pos = end;
                TokenKind::Ident(word)
            }
            _ => {
                let Some((spelling, op)) = OPERATORS
                    .iter()
                    .find(|(spelling, _)| input[pos..].starts_with(spelling))
                else {
                    let ch = input[pos..].chars().next().unwrap_or('?');
                    return Err(CoreError::syntax(format!("unexpected character '{ch}'"), pos));
                };
                pos += spelling.len();
                TokenKind::Op(*op)
            }
        };

        tokens.push(Token { kind, pos: start });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        pos: bytes.len(),
    });
    Ok(tokens)
}

/// Lexes a quoted run starting at `start` (the opening quote).
///
/// A doubled quote inside the run stands for one literal quote.
/// Returns the unescaped text and the offset just past the closing quote.
fn lex_quoted(input: &str, start: usize, quote: char) -> CoreResult<(String, usize)> {
    let mut text = String::new();
    let mut chars = input[start + 1..].char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if ch == quote {
            if matches!(chars.peek(), Some((_, next)) if *next == quote) {
                chars.next();
                text.push(quote);
                continue;
            }
            return Ok((text, start + 1 + offset + ch.len_utf8()));
        }
        text.push(ch);
    }

    Err(CoreError::syntax("unterminated quoted literal", start))
}

fn starts_number(bytes: &[u8], pos: usize) -> bool {
    let digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    match bytes[pos] {
        b'0'..=b'9' => true,
        b'.' => digit_at(pos + 1),
        b'-' | b'+' => digit_at(pos + 1) || (bytes.get(pos + 1) == Some(&b'.') && digit_at(pos + 2)),
        _ => false,
    }
}

fn lex_number(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    if matches!(bytes[pos], b'-' | b'+') {
        pos += 1;
    }
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && matches!(bytes[pos], b'e' | b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'-' | b'+') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    pos
}
