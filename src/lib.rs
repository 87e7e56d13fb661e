//! rvcc: compile a small C subset into RV64 assembly.
//!
//! - `tokenizer` hands out tokens to the parser one at a time.
//! - `parser` resolves names and types while building an [`ast::Program`].
//! - `codegen` walks the program and writes assembly through `emit`.
//! - `dot` renders the AST for debugging.
//! - `error` holds the diagnostic type every stage returns.

pub mod ast;
pub mod codegen;
pub mod dot;
pub mod emit;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod ty;

use std::path::Path;

use snafu::ResultExt;

pub use error::{CompileError, CompileResult, ErrorKind};

/// Front end only: tokenize and parse into a typed program.
pub fn parse_program(source: &str) -> CompileResult<ast::Program> {
  parser::parse(source)
}

/// Compile a source string into RISC-V assembly.
pub fn compile(source: &str) -> CompileResult<String> {
  let program = parse_program(source)?;
  codegen::generate(&program)
}

/// Read a source file and compile it.
pub fn compile_file(path: &Path) -> CompileResult<String> {
  let source = read_source(path)?;
  compile(&source)
}

pub fn read_source(path: &Path) -> CompileResult<String> {
  std::fs::read_to_string(path).context(error::ReadSourceSnafu { path })
}
