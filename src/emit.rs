//! Single-instruction text helpers for RV64.
//!
//! Each method appends exactly one instruction, label or directive. `push`
//! and `pop` also move the value-stack depth so codegen can check that a
//! function body left the stack balanced.

use std::fmt::Write as _;

/// Appends RV64 assembly text and tracks value-stack depth.
#[derive(Debug, Default)]
pub struct Emitter {
  out: String,
  depth: i64,
}

impl Emitter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Net `push` minus `pop` count so far.
  pub fn depth(&self) -> i64 {
    self.depth
  }

  pub fn finish(self) -> String {
    self.out
  }

  fn line(&mut self, args: std::fmt::Arguments<'_>) {
    // Writing into a String cannot fail.
    let _ = writeln!(self.out, "  {args}");
  }

  pub fn directive(&mut self, text: &str) {
    self.line(format_args!(".{text}"));
  }

  pub fn label(&mut self, name: &str) {
    let _ = writeln!(self.out, "{name}:");
  }

  pub fn li(&mut self, rd: &str, imm: i64) {
    self.line(format_args!("li {rd}, {imm}"));
  }

  pub fn mv(&mut self, rd: &str, rs: &str) {
    self.line(format_args!("mv {rd}, {rs}"));
  }

  pub fn add(&mut self, rd: &str, rs1: &str, rs2: &str) {
    self.line(format_args!("add {rd}, {rs1}, {rs2}"));
  }

  pub fn sub(&mut self, rd: &str, rs1: &str, rs2: &str) {
    self.line(format_args!("sub {rd}, {rs1}, {rs2}"));
  }

  pub fn mul(&mut self, rd: &str, rs1: &str, rs2: &str) {
    self.line(format_args!("mul {rd}, {rs1}, {rs2}"));
  }

  pub fn div(&mut self, rd: &str, rs1: &str, rs2: &str) {
    self.line(format_args!("div {rd}, {rs1}, {rs2}"));
  }

  pub fn xor(&mut self, rd: &str, rs1: &str, rs2: &str) {
    self.line(format_args!("xor {rd}, {rs1}, {rs2}"));
  }

  pub fn slt(&mut self, rd: &str, rs1: &str, rs2: &str) {
    self.line(format_args!("slt {rd}, {rs1}, {rs2}"));
  }

  pub fn addi(&mut self, rd: &str, rs: &str, imm: i64) {
    self.line(format_args!("addi {rd}, {rs}, {imm}"));
  }

  pub fn xori(&mut self, rd: &str, rs: &str, imm: i64) {
    self.line(format_args!("xori {rd}, {rs}, {imm}"));
  }

  pub fn seqz(&mut self, rd: &str, rs: &str) {
    self.line(format_args!("seqz {rd}, {rs}"));
  }

  pub fn snez(&mut self, rd: &str, rs: &str) {
    self.line(format_args!("snez {rd}, {rs}"));
  }

  pub fn neg(&mut self, rd: &str, rs: &str) {
    self.line(format_args!("neg {rd}, {rs}"));
  }

  pub fn sd(&mut self, rs: &str, offset: i64, base: &str) {
    self.line(format_args!("sd {rs}, {offset}({base})"));
  }

  pub fn ld(&mut self, rd: &str, offset: i64, base: &str) {
    self.line(format_args!("ld {rd}, {offset}({base})"));
  }

  /// Materialise the address of a data-segment symbol.
  pub fn load_symbol_address(&mut self, rd: &str, symbol: &str) {
    self.line(format_args!("lui {rd}, %hi({symbol})"));
    self.line(format_args!("addi {rd}, {rd}, %lo({symbol})"));
  }

  pub fn j(&mut self, label: &str) {
    self.line(format_args!("j {label}"));
  }

  pub fn beqz(&mut self, rs: &str, label: &str) {
    self.line(format_args!("beqz {rs}, {label}"));
  }

  pub fn call(&mut self, symbol: &str) {
    self.line(format_args!("call {symbol}"));
  }

  pub fn ret(&mut self) {
    self.line(format_args!("ret"));
  }

  pub fn push(&mut self, rs: &str) {
    self.addi("sp", "sp", -8);
    self.sd(rs, 0, "sp");
    self.depth += 1;
  }

  pub fn pop(&mut self, rd: &str) {
    self.ld(rd, 0, "sp");
    self.addi("sp", "sp", 8);
    self.depth -= 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn push_and_pop_track_depth() {
    let mut emit = Emitter::new();
    emit.push("a0");
    emit.push("a1");
    assert_eq!(emit.depth(), 2);
    emit.pop("a1");
    assert_eq!(emit.depth(), 1);
    assert_eq!(
      emit.finish(),
      "  addi sp, sp, -8\n  sd a0, 0(sp)\n  addi sp, sp, -8\n  sd a1, 0(sp)\n  ld a1, 0(sp)\n  addi sp, sp, 8\n"
    );
  }

  #[test]
  fn formats_memory_and_symbol_operands() {
    let mut emit = Emitter::new();
    emit.label("main");
    emit.sd("a0", -16, "fp");
    emit.load_symbol_address("a0", "g");
    emit.directive("zero 8");
    assert_eq!(emit.depth(), 0);
    assert_eq!(
      emit.finish(),
      "main:\n  sd a0, -16(fp)\n  lui a0, %hi(g)\n  addi a0, a0, %lo(g)\n  .zero 8\n"
    );
  }
}
