//! Code generation: lower the typed AST into RV64 assembly.
//!
//! The emitter uses a simple stack machine: every expression leaves its
//! value in `a0`, and binary operators park the left operand on the stack
//! while the right one is computed. Locals live in the frame below `fp`;
//! globals live in `.data` and are addressed through `%hi`/`%lo` pairs.
//!
//! Frame layout after the prologue:
//!
//! ```text
//! fp + 8   saved ra
//! fp + 0   saved fp
//! fp - 8   first local (parameters first, then declarations)
//! ...
//! sp       fp - round_up_16(locals)
//! ```

use tracing::{debug, trace, warn};

use crate::ast::{BinaryOp, Expr, ExprKind, Function, Program, Stmt, StmtKind, Storage, Var};
use crate::emit::Emitter;
use crate::error::{CompileError, CompileResult};
use crate::ty::Type;

/// Integer argument registers, in order.
pub const ARG_REGS: [&str; 6] = ["a0", "a1", "a2", "a3", "a4", "a5"];

/// Values saved by every prologue: `ra` and the caller's `fp`.
pub const FRAME_HOUSEKEEPING: i64 = 2;

const STACK_ALIGN: i64 = 16;

/// Emit assembly for a whole program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut codegen = Codegen::new(program);
  codegen.gen_data();
  for func in &program.functions {
    codegen.gen_function(func)?;
  }
  Ok(codegen.emit.finish())
}

pub fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

/// Bytes reserved below `fp` for a function's locals.
pub fn frame_size(func: &Function) -> i64 {
  align_to(func.locals.byte_size(), STACK_ALIGN)
}

/// `fp`-relative address of the lowest byte of a stack variable.
fn local_offset(var: &Var) -> i64 {
  -(var.offset + var.ty.size())
}

fn return_label(func: &Function) -> String {
  format!(".L.return.{}", func.name)
}

struct Codegen<'p> {
  program: &'p Program,
  emit: Emitter,
  label_count: u32,
}

impl<'p> Codegen<'p> {
  fn new(program: &'p Program) -> Self {
    Self {
      program,
      emit: Emitter::new(),
      label_count: 0,
    }
  }

  fn next_label(&mut self) -> u32 {
    self.label_count += 1;
    self.label_count
  }

  /// Zero-filled storage for every global, in declaration order.
  fn gen_data(&mut self) {
    if self.program.globals.is_empty() {
      return;
    }
    self.emit.directive("data");
    for var in self.program.globals.iter() {
      self.emit.directive(&format!("globl {}", var.name));
      self.emit.directive("align 3");
      self.emit.label(&var.name);
      self.emit.directive(&format!("zero {}", var.ty.size()));
    }
  }

  fn gen_function(&mut self, func: &Function) -> CompileResult<()> {
    debug!(
      function = %func.name,
      frame_size = frame_size(func),
      "emitting function"
    );
    if !func.body.return_seen {
      warn!(function = %func.name, "function has no return statement");
    }

    self.emit.directive("text");
    self.emit.directive(&format!("globl {}", func.name));
    self.emit.label(&func.name);

    self.gen_prologue(func);
    self.gen_stmt(&func.body, func)?;
    self.gen_epilogue(func)
  }

  fn gen_prologue(&mut self, func: &Function) {
    self.emit.push("ra");
    self.emit.push("fp");
    self.emit.mv("fp", "sp");

    let size = frame_size(func);
    if size > 0 {
      self.add_imm("sp", "sp", -size);
    }

    for (reg, &index) in ARG_REGS.iter().zip(&func.params) {
      let var = func.locals.get(index);
      self.emit.sd(reg, local_offset(var), "fp");
    }
  }

  fn gen_epilogue(&mut self, func: &Function) -> CompileResult<()> {
    let depth = self.emit.depth();
    if depth != FRAME_HOUSEKEEPING {
      return Err(CompileError::internal(format!(
        "value stack unbalanced in '{}': depth {depth} before epilogue",
        func.name
      )));
    }

    self.emit.label(&return_label(func));
    self.emit.mv("sp", "fp");
    self.emit.pop("fp");
    self.emit.pop("ra");
    self.emit.ret();
    Ok(())
  }

  /// `rd = rs + imm`, going through `t0` when `imm` does not fit in 12 bits.
  fn add_imm(&mut self, rd: &str, rs: &str, imm: i64) {
    if (-2048..=2047).contains(&imm) {
      self.emit.addi(rd, rs, imm);
    } else {
      self.emit.li("t0", imm);
      self.emit.add(rd, rs, "t0");
    }
  }

  /// Emit one statement; chained successors are walked by the caller.
  fn gen_stmt(&mut self, stmt: &Stmt, func: &Function) -> CompileResult<()> {
    trace!(id = stmt.id, "statement");
    match &stmt.kind {
      StmtKind::Expr(Some(expr)) => self.gen_expr(expr, func),
      StmtKind::Expr(None) => Ok(()),
      StmtKind::Compound(head) => {
        for inner in head.iter().flat_map(|h| h.iter()) {
          self.gen_stmt(inner, func)?;
        }
        Ok(())
      }
      StmtKind::If { cond, then, els } => {
        let n = self.next_label();
        let else_label = format!(".L.else.{n}");
        let end_label = format!(".L.end.{n}");
        self.gen_expr(cond, func)?;
        self.emit.beqz("a0", &else_label);
        self.gen_stmt(then, func)?;
        self.emit.j(&end_label);
        self.emit.label(&else_label);
        if let Some(els) = els {
          self.gen_stmt(els, func)?;
        }
        self.emit.label(&end_label);
        Ok(())
      }
      StmtKind::For {
        init,
        cond,
        inc,
        body,
      } => {
        let n = self.next_label();
        let begin_label = format!(".L.begin.{n}");
        let end_label = format!(".L.end.{n}");
        if let Some(init) = init {
          self.gen_expr(init, func)?;
        }
        self.emit.label(&begin_label);
        if let Some(cond) = cond {
          self.gen_expr(cond, func)?;
          self.emit.beqz("a0", &end_label);
        }
        self.gen_stmt(body, func)?;
        if let Some(inc) = inc {
          self.gen_expr(inc, func)?;
        }
        self.emit.j(&begin_label);
        self.emit.label(&end_label);
        Ok(())
      }
      StmtKind::While { cond, body } => {
        let n = self.next_label();
        let begin_label = format!(".L.begin.{n}");
        let end_label = format!(".L.end.{n}");
        self.emit.label(&begin_label);
        self.gen_expr(cond, func)?;
        self.emit.beqz("a0", &end_label);
        self.gen_stmt(body, func)?;
        self.emit.j(&begin_label);
        self.emit.label(&end_label);
        Ok(())
      }
    }
  }

  /// Compute the value of `expr` into `a0`.
  fn gen_expr(&mut self, expr: &Expr, func: &Function) -> CompileResult<()> {
    match &expr.kind {
      ExprKind::Num(value) => {
        self.emit.li("a0", *value);
      }
      ExprKind::Var(_) => {
        self.gen_addr(expr, func)?;
        self.load(&expr.ty);
      }
      ExprKind::Neg(operand) => {
        self.gen_expr(operand, func)?;
        self.emit.neg("a0", "a0");
      }
      ExprKind::Addr(operand) => {
        self.gen_addr(operand, func)?;
      }
      ExprKind::Deref(operand) => {
        self.gen_expr(operand, func)?;
        self.load(&expr.ty);
      }
      ExprKind::Return(value) => {
        self.gen_expr(value, func)?;
        self.emit.j(&return_label(func));
      }
      ExprKind::Assign { lhs, rhs } => {
        self.gen_addr(lhs, func)?;
        self.emit.push("a0");
        self.gen_expr(rhs, func)?;
        self.emit.pop("a1");
        self.emit.sd("a0", 0, "a1");
      }
      ExprKind::Binary { op, lhs, rhs } => {
        self.gen_expr(lhs, func)?;
        self.emit.push("a0");
        self.gen_expr(rhs, func)?;
        self.emit.pop("a1");
        self.gen_binary(*op);
      }
      ExprKind::Call { name, args } => {
        self.gen_call(name, args, func)?;
      }
    }
    Ok(())
  }

  /// Left operand in `a1`, right operand in `a0`.
  fn gen_binary(&mut self, op: BinaryOp) {
    match op {
      BinaryOp::Add => self.emit.add("a0", "a1", "a0"),
      BinaryOp::Sub => self.emit.sub("a0", "a1", "a0"),
      BinaryOp::Mul => self.emit.mul("a0", "a1", "a0"),
      BinaryOp::Div => self.emit.div("a0", "a1", "a0"),
      BinaryOp::Eq => {
        self.emit.xor("a0", "a1", "a0");
        self.emit.seqz("a0", "a0");
      }
      BinaryOp::Ne => {
        self.emit.xor("a0", "a1", "a0");
        self.emit.snez("a0", "a0");
      }
      BinaryOp::Lt => self.emit.slt("a0", "a1", "a0"),
      BinaryOp::Le => {
        // a <= b is !(b < a)
        self.emit.slt("a0", "a0", "a1");
        self.emit.xori("a0", "a0", 1);
      }
    }
  }

  fn gen_call(&mut self, name: &str, args: &[Expr], func: &Function) -> CompileResult<()> {
    if args.len() > ARG_REGS.len() {
      return Err(CompileError::internal(format!(
        "call to '{name}' has {} arguments",
        args.len()
      )));
    }

    for arg in args.iter().rev() {
      self.gen_expr(arg, func)?;
      self.emit.push("a0");
    }
    for reg in &ARG_REGS[..args.len()] {
      self.emit.pop(reg);
    }

    // sp must be 16-byte aligned at the call; each pending value is 8 bytes.
    let misaligned = (self.emit.depth() - FRAME_HOUSEKEEPING) % 2 != 0;
    if misaligned {
      self.emit.addi("sp", "sp", -8);
    }
    self.emit.call(name);
    if misaligned {
      self.emit.addi("sp", "sp", 8);
    }
    Ok(())
  }

  /// Compute the address of an lvalue into `a0` without loading from it.
  fn gen_addr(&mut self, expr: &Expr, func: &Function) -> CompileResult<()> {
    match &expr.kind {
      ExprKind::Var(var) => {
        let var = self.program.resolve(func, *var);
        match var.storage {
          Storage::Stack => self.add_imm("a0", "fp", local_offset(var)),
          Storage::Data => self.emit.load_symbol_address("a0", &var.name),
        }
        Ok(())
      }
      ExprKind::Deref(operand) => self.gen_expr(operand, func),
      other => Err(CompileError::internal(format!(
        "node {} is not an lvalue: {other:?}",
        expr.id
      ))),
    }
  }

  /// Replace the address in `a0` with the value it points to. Arrays stay
  /// as addresses.
  fn load(&mut self, ty: &Type) {
    if ty.is_array() {
      return;
    }
    self.emit.ld("a0", 0, "a0");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use pretty_assertions::assert_eq;

  fn asm(src: &str) -> String {
    generate(&parse(src).unwrap()).unwrap()
  }

  fn position(haystack: &str, needle: &str) -> usize {
    haystack
      .find(needle)
      .unwrap_or_else(|| panic!("missing {needle:?} in:\n{haystack}"))
  }

  #[test]
  fn body_leaves_exactly_the_housekeeping_depth() {
    let program = parse(
      "int g; int add(int a, int b) { return a + b; }
       int main() { int x[3]; int i; for (i = 0; i < 3; i = i + 1) x[i] = add(i, g * 2);
       if (x[2] == 4) { while (i) i = i - 1; } else g = 1; return x[1] - x[0]; }",
    )
    .unwrap();
    for func in &program.functions {
      let mut codegen = Codegen::new(&program);
      codegen.gen_prologue(func);
      assert_eq!(codegen.emit.depth(), FRAME_HOUSEKEEPING);
      codegen.gen_stmt(&func.body, func).unwrap();
      assert_eq!(codegen.emit.depth(), FRAME_HOUSEKEEPING, "in {}", func.name);
      codegen.gen_epilogue(func).unwrap();
      assert_eq!(codegen.emit.depth(), 0);
    }
  }

  #[test]
  fn unbalanced_stack_is_an_internal_error() {
    let program = parse("int main() { return 0; }").unwrap();
    let func = program.entry_function();
    let mut codegen = Codegen::new(&program);
    codegen.gen_prologue(func);
    codegen.emit.push("a0");
    let err = codegen.gen_epilogue(func).unwrap_err();
    assert!(matches!(err, CompileError::Internal { .. }));
    assert_eq!(err.kind(), None);
  }

  #[test]
  fn prologue_reserves_aligned_frame_and_spills_parameters() {
    let program = parse(
      "int f(int a, int b, int c) { return c; } int main() { return f(1, 2, 3); }",
    )
    .unwrap();
    assert_eq!(frame_size(program.function("f").unwrap()), 32);
    assert_eq!(frame_size(program.entry_function()), 0);

    let out = asm("int f(int a, int b, int c) { return c; } int main() { return f(1, 2, 3); }");
    let f = position(&out, "f:\n");
    let prologue = &out[f..];
    assert!(prologue.starts_with(
      "f:\n  addi sp, sp, -8\n  sd ra, 0(sp)\n  addi sp, sp, -8\n  sd fp, 0(sp)\n  mv fp, sp\n  addi sp, sp, -32\n  sd a0, -8(fp)\n  sd a1, -16(fp)\n  sd a2, -24(fp)\n"
    ));
  }

  #[test]
  fn epilogue_restores_frame() {
    let out = asm("int main() { return 7; }");
    assert!(out.ends_with(
      "  li a0, 7\n  j .L.return.main\n.L.return.main:\n  mv sp, fp\n  ld fp, 0(sp)\n  addi sp, sp, 8\n  ld ra, 0(sp)\n  addi sp, sp, 8\n  ret\n"
    ));
  }

  #[test]
  fn if_without_else_still_places_both_labels_after_the_branch() {
    let out = asm("int main() { int x; x = 1; if (0) x = 2; return x; }");
    let branch = position(&out, "beqz a0, .L.else.1");
    let store = position(&out[branch..], "li a0, 2") + branch;
    let else_label = position(&out, ".L.else.1:");
    let end_label = position(&out, ".L.end.1:");
    assert!(branch < store && store < else_label && else_label < end_label);
  }

  #[test]
  fn loop_labels_are_unique_per_construct() {
    let out =
      asm("int main() { int i; for (i = 0; i < 2; i = i + 1) ; while (i) i = i - 1; return i; }");
    assert!(out.contains(".L.begin.1:"));
    assert!(out.contains(".L.end.1:"));
    assert!(out.contains(".L.begin.2:"));
    assert!(out.contains("  j .L.begin.2\n.L.end.2:"));
  }

  #[test]
  fn globals_live_in_the_data_segment() {
    let out = asm("int g, a[3]; int main() { g = 1; return g; }");
    assert!(out.starts_with(
      "  .data\n  .globl g\n  .align 3\ng:\n  .zero 8\n  .globl a\n  .align 3\na:\n  .zero 24\n  .text\n  .globl main\nmain:\n"
    ));
    assert!(out.contains("  lui a0, %hi(g)\n  addi a0, a0, %lo(g)\n"));
  }

  #[test]
  fn calls_pop_arguments_into_registers_in_order() {
    let out = asm("int main() { return f(1, 2); }");
    assert!(out.contains(
      "  li a0, 2\n  addi sp, sp, -8\n  sd a0, 0(sp)\n  li a0, 1\n  addi sp, sp, -8\n  sd a0, 0(sp)\n  ld a0, 0(sp)\n  addi sp, sp, 8\n  ld a1, 0(sp)\n  addi sp, sp, 8\n  call f\n"
    ));
  }

  #[test]
  fn calls_realign_the_stack_when_a_value_is_pending() {
    let out = asm("int main() { return 1 + f(); }");
    assert!(out.contains("  addi sp, sp, -8\n  call f\n  addi sp, sp, 8\n"));
    let aligned = asm("int main() { return f(); }");
    assert!(!aligned.contains("  addi sp, sp, -8\n  call f\n"));
  }

  #[test]
  fn large_frames_use_a_scratch_register() {
    let out = asm("int main() { int big[300]; big[0] = 1; return big[0]; }");
    assert!(out.contains("  li t0, -2400\n  add sp, sp, t0\n"));
    assert!(out.contains("  li t0, -2400\n  add a0, fp, t0\n"));
  }

  #[test]
  fn align_to_rounds_up() {
    assert_eq!(align_to(0, 16), 0);
    assert_eq!(align_to(8, 16), 16);
    assert_eq!(align_to(16, 16), 16);
    assert_eq!(align_to(24, 16), 32);
  }
}
