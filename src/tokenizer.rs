//! Lexical analysis. `Lexer::next_token` scans one token per call, so the
//! parser only tokenizes as far as it reads.
//!
//! Keywords are identifiers found in `KEYWORDS`. Two-byte punctuators are
//! tried before single bytes.

use crate::error::{CompileError, CompileResult};

const KEYWORDS: [&str; 7] = ["return", "if", "else", "for", "while", "int", "sizeof"];

const MULTI_CHAR_PUNCTS: [&str; 4] = ["==", "!=", "<=", ">="];

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Num,
  Punctuator,
  Keyword,
  Eof,
  Illegal,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the scanning loop readable.
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<i64>) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
    }
  }
}

/// Pull-based scanner over a source buffer.
pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self { source, pos: 0 }
  }

  pub fn source(&self) -> &'a str {
    self.source
  }

  /// Produce the token starting at the cursor, skipping whitespace first.
  ///
  /// Past the end of input this keeps returning `Eof`; unrecognised bytes are
  /// reported immediately instead of being skipped.
  pub fn next_token(&mut self) -> CompileResult<Token> {
    let token = self.scan()?;
    if token.kind == TokenKind::Illegal {
      let invalid_char = self.source[token.loc..].chars().next().unwrap_or('\0');
      return Err(CompileError::lexical(
        self.source,
        token.loc,
        format!("invalid token: '{invalid_char}'"),
      ));
    }
    Ok(token)
  }

  fn scan(&mut self) -> CompileResult<Token> {
    let input = self.source;
    let bytes = input.as_bytes();

    while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
      self.pos += 1;
    }

    let start = self.pos;
    let Some(&c) = bytes.get(start) else {
      return Ok(Token::new(TokenKind::Eof, input.len(), 0, None));
    };

    if c.is_ascii_digit() {
      let mut i = start + 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let value = input[start..i]
        .parse::<i64>()
        .map_err(|err| CompileError::lexical(input, start, format!("invalid number: {err}")))?;
      self.pos = i;
      return Ok(Token::new(TokenKind::Num, start, i - start, Some(value)));
    }

    if is_ident_start(c) {
      let mut i = start + 1;
      while i < bytes.len() && is_ident_continue(bytes[i]) {
        i += 1;
      }
      self.pos = i;
      let kind = if KEYWORDS.contains(&&input[start..i]) {
        TokenKind::Keyword
      } else {
        TokenKind::Ident
      };
      return Ok(Token::new(kind, start, i - start, None));
    }

    if let Some(op) = MULTI_CHAR_PUNCTS
      .into_iter()
      .find(|op| input[start..].starts_with(op))
    {
      self.pos += op.len();
      return Ok(Token::new(TokenKind::Punctuator, start, op.len(), None));
    }

    if matches!(
      c,
      b'+'
        | b'-'
        | b'*'
        | b'/'
        | b'('
        | b')'
        | b'<'
        | b'>'
        | b';'
        | b'='
        | b'{'
        | b'}'
        | b','
        | b'&'
        | b'['
        | b']'
    ) {
      self.pos += 1;
      return Ok(Token::new(TokenKind::Punctuator, start, 1, None));
    }

    let width = input[start..].chars().next().map_or(1, char::len_utf8);
    self.pos += width;
    Ok(Token::new(TokenKind::Illegal, start, width, None))
  }
}

fn is_ident_start(c: u8) -> bool {
  c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
  c.is_ascii_alphanumeric() || c == b'_'
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
