//! Graphviz rendering of the AST, for debugging the front end.
//!
//! Every node is named after its debug id, so the ids minted by the parser
//! must be unique within a program.

use std::fmt::Write as _;

use crate::ast::{Expr, ExprKind, Function, Program, Stmt, StmtKind};

pub fn render(program: &Program) -> String {
  let mut writer = DotWriter {
    program,
    out: String::new(),
  };
  writer.line("digraph ast {");
  writer.line("  node [shape=box, fontname=monospace];");
  for (index, func) in program.functions.iter().enumerate() {
    writer.function(index, func);
  }
  writer.line("}");
  writer.out
}

fn escape(label: &str) -> String {
  label.replace('\\', "\\\\").replace('"', "\\\"")
}

struct DotWriter<'p> {
  program: &'p Program,
  out: String,
}

impl DotWriter<'_> {
  fn line(&mut self, text: &str) {
    self.out.push_str(text);
    self.out.push('\n');
  }

  fn node(&mut self, name: &str, label: &str) {
    let _ = writeln!(self.out, "    {name} [label=\"{}\"];", escape(label));
  }

  fn edge(&mut self, from: &str, to: &str, role: &str) {
    let _ = writeln!(self.out, "    {from} -> {to} [label=\"{role}\"];");
  }

  fn function(&mut self, index: usize, func: &Function) {
    let _ = writeln!(self.out, "  subgraph cluster_{index} {{");
    let _ = writeln!(self.out, "    label=\"{}\";", escape(&func.name));
    let root = format!("fn{index}");
    self.node(&root, &format!("fn {}: {}", func.name, func.ty.describe()));
    self.stmt(&root, "body", &func.body, func);
    self.line("  }");
  }

  fn stmt(&mut self, parent: &str, role: &str, stmt: &Stmt, func: &Function) {
    let name = format!("n{}", stmt.id);
    self.edge(parent, &name, role);
    match &stmt.kind {
      StmtKind::Expr(expr) => {
        self.node(&name, "stmt");
        if let Some(expr) = expr {
          self.expr(&name, "expr", expr, func);
        }
      }
      StmtKind::Compound(head) => {
        self.node(&name, "compound");
        for (i, inner) in head.iter().flat_map(|h| h.iter()).enumerate() {
          self.stmt(&name, &format!("{i}"), inner, func);
        }
      }
      StmtKind::If { cond, then, els } => {
        self.node(&name, "if");
        self.expr(&name, "cond", cond, func);
        self.stmt(&name, "then", then, func);
        if let Some(els) = els {
          self.stmt(&name, "else", els, func);
        }
      }
      StmtKind::For {
        init,
        cond,
        inc,
        body,
      } => {
        self.node(&name, "for");
        for (role, part) in [("init", init), ("cond", cond), ("inc", inc)] {
          if let Some(part) = part {
            self.expr(&name, role, part, func);
          }
        }
        self.stmt(&name, "body", body, func);
      }
      StmtKind::While { cond, body } => {
        self.node(&name, "while");
        self.expr(&name, "cond", cond, func);
        self.stmt(&name, "body", body, func);
      }
    }
  }

  fn expr(&mut self, parent: &str, role: &str, expr: &Expr, func: &Function) {
    let name = format!("n{}", expr.id);
    self.edge(parent, &name, role);
    let ty = expr.ty.describe();
    match &expr.kind {
      ExprKind::Num(value) => self.node(&name, &format!("num {value} : {ty}")),
      ExprKind::Var(var) => {
        let var = self.program.resolve(func, *var);
        self.node(&name, &format!("var {} : {ty}", var.name));
      }
      ExprKind::Neg(operand)
      | ExprKind::Addr(operand)
      | ExprKind::Deref(operand)
      | ExprKind::Return(operand) => {
        let op = match &expr.kind {
          ExprKind::Neg(_) => "neg",
          ExprKind::Addr(_) => "addr",
          ExprKind::Deref(_) => "deref",
          _ => "return",
        };
        self.node(&name, &format!("{op} : {ty}"));
        self.expr(&name, "operand", operand, func);
      }
      ExprKind::Binary { op, lhs, rhs } => {
        self.node(&name, &format!("{} : {ty}", op.symbol()));
        self.expr(&name, "lhs", lhs, func);
        self.expr(&name, "rhs", rhs, func);
      }
      ExprKind::Assign { lhs, rhs } => {
        self.node(&name, &format!("= : {ty}"));
        self.expr(&name, "lhs", lhs, func);
        self.expr(&name, "rhs", rhs, func);
      }
      ExprKind::Call { name: callee, args } => {
        self.node(&name, &format!("call {callee} : {ty}"));
        for (i, arg) in args.iter().enumerate() {
          self.expr(&name, &format!("arg{i}"), arg, func);
        }
      }
    }
  }
}
