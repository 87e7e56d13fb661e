//! Typed syntax tree produced by the parser and consumed by codegen.
//!
//! Expressions and statements are closed enums so every pass matches them
//! exhaustively. Statements are chained through `next` the way chibicc links
//! them; [`Stmt::iter`] walks a chain. Identifiers refer to their variable
//! through a [`VarRef`] index into the declaring [`Scope`].

use rustc_hash::FxHashMap;

use crate::ty::Type;

/// Debug identity of a node, unique within one parse.
pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Le => "<=",
    }
  }
}

/// Where a variable lives, and so how its address is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
  /// Frame-pointer relative slot.
  Stack,
  /// Label in the data segment.
  Data,
}

/// Non-owning link from an identifier to its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
  Local(usize),
  Global(usize),
}

#[derive(Debug, Clone)]
pub struct Var {
  pub name: String,
  pub ty: Type,
  pub storage: Storage,
  /// Bytes from the start of the scope's storage, assigned in declaration order.
  pub offset: i64,
}

/// Upper bound on the bytes one scope may occupy, leaving room for frame
/// alignment.
pub const MAX_SCOPE_SIZE: i64 = i64::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareError {
  Redefined,
  TooLarge,
}

/// Variables of one function (parameters included) or of the global scope.
#[derive(Debug, Clone)]
pub struct Scope {
  storage: Storage,
  vars: Vec<Var>,
  by_name: FxHashMap<String, usize>,
  size: i64,
}

impl Scope {
  pub fn new(storage: Storage) -> Self {
    Self {
      storage,
      vars: Vec::new(),
      by_name: FxHashMap::default(),
      size: 0,
    }
  }

  /// Add a variable at the next offset.
  pub fn declare(&mut self, name: &str, ty: Type) -> Result<usize, DeclareError> {
    if self.by_name.contains_key(name) {
      return Err(DeclareError::Redefined);
    }
    let end = self
      .size
      .checked_add(ty.size())
      .filter(|&end| end <= MAX_SCOPE_SIZE)
      .ok_or(DeclareError::TooLarge)?;
    let index = self.vars.len();
    self.vars.push(Var {
      name: name.to_string(),
      ty,
      storage: self.storage,
      offset: self.size,
    });
    self.by_name.insert(name.to_string(), index);
    self.size = end;
    Ok(index)
  }

  pub fn lookup(&self, name: &str) -> Option<usize> {
    self.by_name.get(name).copied()
  }

  pub fn get(&self, index: usize) -> &Var {
    &self.vars[index]
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Var> {
    self.vars.iter()
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Total bytes occupied by all variables, unaligned.
  pub fn byte_size(&self) -> i64 {
    self.size
  }
}

#[derive(Debug, Clone)]
pub struct Expr {
  pub id: NodeId,
  pub ty: Type,
  pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
  Num(i64),
  Var(VarRef),
  Neg(Box<Expr>),
  Addr(Box<Expr>),
  Deref(Box<Expr>),
  Return(Box<Expr>),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Assign {
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    name: String,
    args: Vec<Expr>,
  },
}

impl Expr {
  /// Identifiers and dereferences denote storage; nothing else does.
  pub fn is_lvalue(&self) -> bool {
    matches!(self.kind, ExprKind::Var(_) | ExprKind::Deref(_))
  }
}

/// One link of a statement chain.
#[derive(Debug, Clone)]
pub struct Stmt {
  pub id: NodeId,
  pub kind: StmtKind,
  /// Set when this statement is, or contains, a `return`.
  pub return_seen: bool,
  pub next: Option<Box<Stmt>>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
  /// `expr;` or the empty statement `;`.
  Expr(Option<Expr>),
  /// Head of the chain of statements inside braces.
  Compound(Option<Box<Stmt>>),
  If {
    cond: Expr,
    then: Box<Stmt>,
    els: Option<Box<Stmt>>,
  },
  For {
    init: Option<Expr>,
    cond: Option<Expr>,
    inc: Option<Expr>,
    body: Box<Stmt>,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
  },
}

impl Stmt {
  /// Iterate this statement and everything chained after it.
  pub fn iter(&self) -> StmtIter<'_> {
    StmtIter {
      current: Some(self),
    }
  }
}

pub struct StmtIter<'a> {
  current: Option<&'a Stmt>,
}

impl<'a> Iterator for StmtIter<'a> {
  type Item = &'a Stmt;

  fn next(&mut self) -> Option<Self::Item> {
    let stmt = self.current?;
    self.current = stmt.next.as_deref();
    Some(stmt)
  }
}

/// Link statements in order, returning the head of the chain.
pub fn link_stmts(stmts: Vec<Stmt>) -> Option<Box<Stmt>> {
  stmts.into_iter().rev().fold(None, |next, mut stmt| {
    stmt.next = next;
    Some(Box::new(stmt))
  })
}

#[derive(Debug, Clone)]
pub struct Function {
  pub name: String,
  /// Always a `Type::Func`.
  pub ty: Type,
  /// A `StmtKind::Compound`.
  pub body: Stmt,
  /// Indices into `locals`, in declaration order.
  pub params: Vec<usize>,
  pub locals: Scope,
}

#[derive(Debug, Clone)]
pub struct Program {
  /// Definitions in source order.
  pub functions: Vec<Function>,
  pub function_index: FxHashMap<String, usize>,
  pub globals: Scope,
  /// Index of `main` in `functions`.
  pub entry: usize,
}

impl Program {
  #[cfg(test)]
  pub fn function(&self, name: &str) -> Option<&Function> {
    self.function_index.get(name).map(|&i| &self.functions[i])
  }

  pub fn entry_function(&self) -> &Function {
    &self.functions[self.entry]
  }

  pub fn resolve<'a>(&'a self, func: &'a Function, var: VarRef) -> &'a Var {
    match var {
      VarRef::Local(index) => func.locals.get(index),
      VarRef::Global(index) => self.globals.get(index),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn empty_stmt(id: NodeId) -> Stmt {
    Stmt {
      id,
      kind: StmtKind::Expr(None),
      return_seen: false,
      next: None,
    }
  }

  #[test]
  fn scope_assigns_offsets_in_declaration_order() {
    let mut scope = Scope::new(Storage::Stack);
    assert_eq!(scope.declare("a", Type::int()), Ok(0));
    assert_eq!(scope.declare("b", Type::array_of(Type::int(), 3)), Ok(1));
    assert_eq!(scope.declare("c", Type::int()), Ok(2));
    let offsets: Vec<i64> = scope.iter().map(|v| v.offset).collect();
    assert_eq!(offsets, [0, 8, 32]);
    assert_eq!(scope.byte_size(), 40);
    assert_eq!(scope.get(1).storage, Storage::Stack);
  }

  #[test]
  fn scope_rejects_redeclaration() {
    let mut scope = Scope::new(Storage::Data);
    assert!(scope.declare("x", Type::int()).is_ok());
    assert_eq!(scope.declare("x", Type::int()), Err(DeclareError::Redefined));
    assert_eq!(scope.len(), 1);
    assert_eq!(scope.lookup("x"), Some(0));
    assert_eq!(scope.lookup("y"), None);
  }

  #[test]
  fn scope_refuses_to_outgrow_its_limit() {
    let mut scope = Scope::new(Storage::Stack);
    let quarter = (MAX_SCOPE_SIZE / 32) as usize;
    let half = (MAX_SCOPE_SIZE / 16) as usize;
    assert_eq!(scope.declare("a", Type::array_of(Type::int(), half)), Ok(0));
    assert_eq!(
      scope.declare("b", Type::array_of(Type::array_of(Type::int(), half), 2)),
      Err(DeclareError::TooLarge)
    );
    assert_eq!(scope.len(), 1);
    assert_eq!(scope.lookup("b"), None);
    assert_eq!(scope.declare("c", Type::array_of(Type::int(), quarter)), Ok(1));
  }

  #[test]
  fn resolve_reads_locals_from_the_function_and_globals_from_the_program() {
    let program = crate::parser::parse("int g; int main() { int x; x = g; return x; }").unwrap();
    let main = program.entry_function();
    assert_eq!(program.resolve(main, VarRef::Local(0)).name, "x");
    let global = program.resolve(main, VarRef::Global(0));
    assert_eq!(global.name, "g");
    assert_eq!(global.storage, Storage::Data);
  }

  #[test]
  fn linked_statements_iterate_in_order() {
    let head = link_stmts(vec![empty_stmt(1), empty_stmt(2), empty_stmt(3)]).unwrap();
    let ids: Vec<NodeId> = head.iter().map(|s| s.id).collect();
    assert_eq!(ids, [1, 2, 3]);
    assert!(link_stmts(Vec::new()).is_none());
  }
}
