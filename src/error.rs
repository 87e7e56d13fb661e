//! Diagnostics for every stage of the pipeline.
//!
//! A located error quotes the numbered source line and puts a caret under
//! the offending byte. The first error ends compilation.

use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Category of a located diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A byte the tokenizer does not recognise.
  Lexical,
  /// An expected token was not found.
  Syntax,
  /// Use before declaration, or redeclaration in the same scope.
  Name,
  /// Operand type mismatch, bad dereference, too many parameters.
  Type,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{line}\n{marker} {message}"))]
  WithLocation {
    kind: ErrorKind,
    line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("internal compiler error: {message}"))]
  Internal { message: String },

  #[snafu(display("cannot read {}: {source}", path.display()))]
  ReadSource {
    path: PathBuf,
    source: std::io::Error,
  },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, kind: ErrorKind, message: impl Into<String>) -> Self {
    let safe_loc = loc.min(source.len());
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |pos| pos + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |pos| safe_loc + pos);
    let line_no = source[..line_start].matches('\n').count() + 1;

    let prefix = format!("{line_no}: ");
    let line = format!("{prefix}{}", &source[line_start..line_end]);
    let column = source[line_start..safe_loc].chars().count() + prefix.len();
    let marker = format!("{}^", " ".repeat(column));
    Self::WithLocation {
      kind,
      line,
      marker,
      message: message.into(),
    }
  }

  pub fn lexical(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::at(source, loc, ErrorKind::Lexical, message)
  }

  pub fn syntax(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::at(source, loc, ErrorKind::Syntax, message)
  }

  pub fn name(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::at(source, loc, ErrorKind::Name, message)
  }

  pub fn type_error(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::at(source, loc, ErrorKind::Type, message)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// The diagnostic category, if this error points into the source.
  pub fn kind(&self) -> Option<ErrorKind> {
    match self {
      Self::WithLocation { kind, .. } => Some(*kind),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn caret_points_at_offending_byte_on_its_own_line() {
    let src = "int main() {\n  return 1 $ 2;\n}";
    let loc = src.find('$').unwrap();
    let err = CompileError::lexical(src, loc, "invalid token: '$'");
    let expected = format!("2:   return 1 $ 2;\n{}^ invalid token: '$'", " ".repeat(14));
    assert_eq!(err.to_string(), expected);
    assert_eq!(err.kind(), Some(ErrorKind::Lexical));
  }

  #[test]
  fn location_past_end_is_clamped() {
    let err = CompileError::syntax("1+", 99, "unexpected end of input");
    assert_eq!(err.to_string(), "1: 1+\n     ^ unexpected end of input");
  }

  #[test]
  fn internal_errors_have_no_kind() {
    assert_eq!(CompileError::internal("boom").kind(), None);
  }
}
