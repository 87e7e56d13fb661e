//! Recursive-descent parser producing a typed AST.
//!
//! One method per grammar rule, with a precedence ladder for expressions.
//! Identifiers are resolved against the current function's locals and then
//! the globals as nodes are built, and every expression is typed before it
//! is returned, so a type error is reported at the operator that caused it.
//!
//! ```text
//! program       = (function | global-decl)*
//! function      = declspec declarator "{" compound-stmt
//! global-decl   = declspec declarator ("," declarator)* ";"
//! declspec      = "int"
//! declarator    = "*"* ident type-suffix
//! type-suffix   = "(" params | "[" num "]" type-suffix | ε
//! params        = (param ("," param)*)? ")"
//! compound-stmt = (declaration | stmt)* "}"
//! declaration   = declspec (declarator ("=" assign)? ("," declarator ("=" assign)?)*)? ";"
//! stmt          = "return" expr ";"
//!               | "if" "(" expr ")" stmt ("else" stmt)?
//!               | "for" "(" expr? ";" expr? ";" expr? ")" stmt
//!               | "while" "(" expr ")" stmt
//!               | "{" compound-stmt
//!               | expr? ";"
//! expr          = assign
//! assign        = equality ("=" assign)?
//! equality      = relational ("==" relational | "!=" relational)*
//! relational    = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add           = mul ("+" mul | "-" mul)*
//! mul           = unary ("*" unary | "/" unary)*
//! unary         = ("+" | "-" | "*" | "&") unary | postfix
//! postfix       = primary ("[" expr "]")*
//! primary       = "(" expr ")" | "sizeof" unary | ident ("(" args? ")")? | num
//! ```

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::{
  BinaryOp, DeclareError, Expr, ExprKind, Function, MAX_SCOPE_SIZE, NodeId, Program, Scope, Stmt,
  StmtKind, Storage, VarRef, link_stmts,
};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Lexer, Token, TokenKind, describe_token, token_text};
use crate::ty::{Type, pointer_to};

/// Arguments travel in `a0`..`a5` only.
pub const MAX_ARGS: usize = 6;

/// Parse a whole translation unit.
pub fn parse(source: &str) -> CompileResult<Program> {
  let stream = TokenStream::new(source)?;
  Parser::new(stream).parse_program()
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  locals: Scope,
  params: Vec<usize>,
  globals: Scope,
  functions: Vec<Function>,
  function_index: FxHashMap<String, usize>,
  /// Function declarators are only legal directly at file scope.
  at_file_scope: bool,
  next_id: NodeId,
}

impl<'a> Parser<'a> {
  fn new(stream: TokenStream<'a>) -> Self {
    Self {
      stream,
      locals: Scope::new(Storage::Stack),
      params: Vec::new(),
      globals: Scope::new(Storage::Data),
      functions: Vec::new(),
      function_index: FxHashMap::default(),
      at_file_scope: true,
      next_id: 0,
    }
  }

  fn source(&self) -> &'a str {
    self.stream.source
  }

  fn mint_id(&mut self) -> NodeId {
    self.next_id += 1;
    self.next_id
  }

  fn new_expr(&mut self, kind: ExprKind, ty: Type) -> Expr {
    Expr {
      id: self.mint_id(),
      ty,
      kind,
    }
  }

  fn new_num(&mut self, value: i64) -> Expr {
    self.new_expr(ExprKind::Num(value), Type::int())
  }

  fn new_binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    let kind = ExprKind::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    };
    self.new_expr(kind, ty)
  }

  fn new_stmt(&mut self, kind: StmtKind, return_seen: bool) -> Stmt {
    Stmt {
      id: self.mint_id(),
      kind,
      return_seen,
      next: None,
    }
  }

  // program = (function | global-decl)*
  fn parse_program(mut self) -> CompileResult<Program> {
    while !self.stream.is_eof() {
      self.at_file_scope = true;
      let base = self.parse_declspec()?;
      let (ty, name, loc) = self.parse_declarator(base.clone())?;

      if let Type::Func(_) = ty {
        if !self.stream.is("{") {
          return Err(CompileError::syntax(
            self.source(),
            self.stream.loc(),
            format!("function '{name}' must have a body"),
          ));
        }
        self.stream.advance()?;
        self.parse_function(ty, name, loc)?;
        continue;
      }

      self.declare_global(ty, &name, loc)?;
      while self.stream.equal(",")? {
        let (ty, name, loc) = self.parse_declarator(base.clone())?;
        if let Type::Func(_) = ty {
          return Err(CompileError::syntax(
            self.source(),
            loc,
            format!("function '{name}' must have a body"),
          ));
        }
        self.declare_global(ty, &name, loc)?;
      }
      self.stream.skip(";")?;
    }

    let Some(&entry) = self.function_index.get("main") else {
      return Err(CompileError::name(
        self.source(),
        self.source().len(),
        "program has no 'main' function",
      ));
    };

    debug!(
      functions = self.functions.len(),
      globals = self.globals.len(),
      "parsed program"
    );

    Ok(Program {
      functions: self.functions,
      function_index: self.function_index,
      globals: self.globals,
      entry,
    })
  }

  fn declare_global(&mut self, ty: Type, name: &str, loc: usize) -> CompileResult<()> {
    if self.function_index.contains_key(name) {
      return Err(CompileError::name(
        self.source(),
        loc,
        format!("'{name}' is already defined as a function"),
      ));
    }
    self
      .globals
      .declare(name, ty)
      .map_err(|err| self.declare_error(err, &format!("redefinition of '{name}'"), loc))?;
    trace!(name, "declared global");
    Ok(())
  }

  fn declare_error(&self, err: DeclareError, redefined: &str, loc: usize) -> CompileError {
    match err {
      DeclareError::Redefined => CompileError::name(self.source(), loc, redefined),
      DeclareError::TooLarge => {
        CompileError::type_error(self.source(), loc, "variables do not fit in memory")
      }
    }
  }

  // function = declspec declarator "{" compound-stmt
  fn parse_function(&mut self, ty: Type, name: String, loc: usize) -> CompileResult<()> {
    if self.function_index.contains_key(&name) {
      return Err(CompileError::name(
        self.source(),
        loc,
        format!("redefinition of function '{name}'"),
      ));
    }
    if self.globals.lookup(&name).is_some() {
      return Err(CompileError::name(
        self.source(),
        loc,
        format!("'{name}' is already defined as a global variable"),
      ));
    }

    let body = self.parse_compound_stmt()?;
    let locals = std::mem::replace(&mut self.locals, Scope::new(Storage::Stack));
    let params = std::mem::take(&mut self.params);

    debug!(
      name = %name,
      params = params.len(),
      locals = locals.len(),
      "parsed function"
    );

    self.function_index.insert(name.clone(), self.functions.len());
    self.functions.push(Function {
      name,
      ty,
      body,
      params,
      locals,
    });
    Ok(())
  }

  // declspec = "int"
  fn parse_declspec(&mut self) -> CompileResult<Type> {
    self.stream.skip("int")?;
    Ok(Type::int())
  }

  // declarator = "*"* ident type-suffix
  fn parse_declarator(&mut self, base: Type) -> CompileResult<(Type, String, usize)> {
    let mut ty = base;
    while self.stream.equal("*")? {
      ty = pointer_to(ty);
    }
    let (name, loc) = self.stream.get_ident()?;
    let ty = self.parse_type_suffix(ty, &name)?;
    Ok((ty, name, loc))
  }

  // type-suffix = "(" params | "[" num "]" type-suffix | ε
  fn parse_type_suffix(&mut self, ty: Type, name: &str) -> CompileResult<Type> {
    if self.stream.is("(") {
      if !self.at_file_scope {
        return Err(CompileError::syntax(
          self.source(),
          self.stream.loc(),
          "function declarators are only allowed at file scope",
        ));
      }
      self.stream.advance()?;
      self.at_file_scope = false;
      self.locals = Scope::new(Storage::Stack);
      self.params.clear();
      return self.parse_params(Type::func(name, ty));
    }

    if self.stream.equal("[")? {
      let (len, loc) = self.stream.get_number()?;
      let len = usize::try_from(len).map_err(|_| {
        CompileError::type_error(self.source(), loc, "array length must not be negative")
      })?;
      self.stream.skip("]")?;
      let element = if self.stream.is("[") {
        self.parse_type_suffix(ty, name)?
      } else {
        ty
      };
      let array = Type::array_of(element, len);
      if array.checked_size().is_none_or(|size| size > MAX_SCOPE_SIZE) {
        return Err(CompileError::type_error(self.source(), loc, "array is too large"));
      }
      return Ok(array);
    }

    Ok(ty)
  }

  // params = (param ("," param)*)? ")"
  fn parse_params(&mut self, mut func: Type) -> CompileResult<Type> {
    if !self.stream.equal(")")? {
      loop {
        let param_ty = self.parse_param()?;
        if let Type::Func(f) = &mut func {
          f.params.push(param_ty);
        }
        if self.stream.equal(")")? {
          break;
        }
        self.stream.skip(",")?;
      }
    }
    Ok(func)
  }

  // param = declspec declarator
  fn parse_param(&mut self) -> CompileResult<Type> {
    let loc = self.stream.loc();
    if self.params.len() == MAX_ARGS {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!("too many parameters (at most {MAX_ARGS})"),
      ));
    }
    let base = self.parse_declspec()?;
    let (ty, name, loc) = self.parse_declarator(base)?;
    // Arrays arrive as addresses in a register.
    let ty = match ty {
      Type::Array { base, .. } => Type::Ptr(base),
      other => other,
    };
    let index = self.locals.declare(&name, ty.clone()).map_err(|err| {
      self.declare_error(err, &format!("redefinition of parameter '{name}'"), loc)
    })?;
    self.params.push(index);
    Ok(ty)
  }

  // compound-stmt = (declaration | stmt)* "}"
  fn parse_compound_stmt(&mut self) -> CompileResult<Stmt> {
    let mut stmts = Vec::new();
    while !self.stream.is("}") && !self.stream.is_eof() {
      let stmt = if self.stream.is("int") {
        self.parse_declaration()?
      } else {
        self.parse_stmt()?
      };
      stmts.push(stmt);
    }
    self.stream.skip("}")?;

    let return_seen = stmts.iter().any(|stmt| stmt.return_seen);
    Ok(self.new_stmt(StmtKind::Compound(link_stmts(stmts)), return_seen))
  }

  // declaration = declspec (declarator ("=" assign)? ("," declarator ("=" assign)?)*)? ";"
  fn parse_declaration(&mut self) -> CompileResult<Stmt> {
    let base = self.parse_declspec()?;
    let mut inits = Vec::new();
    let mut first = true;

    while !self.stream.equal(";")? {
      if !first {
        self.stream.skip(",")?;
      }
      first = false;

      let (ty, name, loc) = self.parse_declarator(base.clone())?;
      let index = self
        .locals
        .declare(&name, ty.clone())
        .map_err(|err| self.declare_error(err, &format!("redefinition of '{name}'"), loc))?;

      if self.stream.is("=") {
        let assign_loc = self.stream.loc();
        self.stream.advance()?;
        let lhs = self.new_expr(ExprKind::Var(VarRef::Local(index)), ty);
        let rhs = self.parse_assign()?;
        let assign = self.new_assign(lhs, rhs, assign_loc)?;
        let stmt = self.new_stmt(StmtKind::Expr(Some(assign)), false);
        inits.push(stmt);
      }
    }

    Ok(self.new_stmt(StmtKind::Compound(link_stmts(inits)), false))
  }

  fn parse_stmt(&mut self) -> CompileResult<Stmt> {
    if self.stream.equal("return")? {
      let value = self.parse_expr()?;
      self.stream.skip(";")?;
      let ty = value.ty.clone();
      let ret = self.new_expr(ExprKind::Return(Box::new(value)), ty);
      return Ok(self.new_stmt(StmtKind::Expr(Some(ret)), true));
    }

    if self.stream.equal("if")? {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let then = self.parse_stmt()?;
      let els = if self.stream.equal("else")? {
        Some(Box::new(self.parse_stmt()?))
      } else {
        None
      };
      let return_seen = then.return_seen || els.as_ref().is_some_and(|e| e.return_seen);
      let kind = StmtKind::If {
        cond,
        then: Box::new(then),
        els,
      };
      return Ok(self.new_stmt(kind, return_seen));
    }

    if self.stream.equal("for")? {
      self.stream.skip("(")?;
      let init = self.parse_optional_expr(";")?;
      self.stream.skip(";")?;
      let cond = self.parse_optional_expr(";")?;
      self.stream.skip(";")?;
      let inc = self.parse_optional_expr(")")?;
      self.stream.skip(")")?;
      let body = self.parse_stmt()?;
      let return_seen = body.return_seen;
      let kind = StmtKind::For {
        init,
        cond,
        inc,
        body: Box::new(body),
      };
      return Ok(self.new_stmt(kind, return_seen));
    }

    if self.stream.equal("while")? {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let body = self.parse_stmt()?;
      let return_seen = body.return_seen;
      let kind = StmtKind::While {
        cond,
        body: Box::new(body),
      };
      return Ok(self.new_stmt(kind, return_seen));
    }

    if self.stream.equal("{")? {
      return self.parse_compound_stmt();
    }

    let expr = self.parse_optional_expr(";")?;
    self.stream.skip(";")?;
    Ok(self.new_stmt(StmtKind::Expr(expr), false))
  }

  /// An expression unless the next token is `terminator`.
  fn parse_optional_expr(&mut self, terminator: &str) -> CompileResult<Option<Expr>> {
    if self.stream.is(terminator) {
      return Ok(None);
    }
    self.parse_expr().map(Some)
  }

  fn parse_expr(&mut self) -> CompileResult<Expr> {
    self.parse_assign()
  }

  fn parse_assign(&mut self) -> CompileResult<Expr> {
    let node = self.parse_equality()?;

    if self.stream.is("=") {
      let loc = self.stream.loc();
      self.stream.advance()?;
      let rhs = self.parse_assign()?;
      return self.new_assign(node, rhs, loc);
    }

    Ok(node)
  }

  fn new_assign(&mut self, lhs: Expr, rhs: Expr, loc: usize) -> CompileResult<Expr> {
    if !lhs.is_lvalue() {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        "left side of assignment is not assignable",
      ));
    }
    if lhs.ty.is_array() {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!("cannot assign to an array of type '{}'", lhs.ty.describe()),
      ));
    }
    if !lhs.ty.equal(&rhs.ty) {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!(
          "cannot assign '{}' to '{}'",
          rhs.ty.describe(),
          lhs.ty.describe()
        ),
      ));
    }
    let ty = lhs.ty.clone();
    let kind = ExprKind::Assign {
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    };
    Ok(self.new_expr(kind, ty))
  }

  /// Comparison operands must have the same type; the result is an `int`.
  fn new_comparison(
    &mut self,
    op: BinaryOp,
    lhs: Expr,
    rhs: Expr,
    loc: usize,
  ) -> CompileResult<Expr> {
    if !lhs.ty.equal(&rhs.ty) {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!(
          "mismatched operand types '{}' and '{}'",
          lhs.ty.describe(),
          rhs.ty.describe()
        ),
      ));
    }
    Ok(self.new_binary(op, lhs, rhs, Type::int()))
  }

  fn parse_equality(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_relational()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("==") => BinaryOp::Eq,
        Some("!=") => BinaryOp::Ne,
        _ => break,
      };
      let loc = self.stream.loc();
      self.stream.advance()?;
      let rhs = self.parse_relational()?;
      node = self.new_comparison(op, node, rhs, loc)?;
    }

    Ok(node)
  }

  // `a > b` is `b < a` and `a >= b` is `b <= a`.
  fn parse_relational(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_add()?;

    loop {
      let (op, swap) = match self.stream.peek_punct() {
        Some("<") => (BinaryOp::Lt, false),
        Some("<=") => (BinaryOp::Le, false),
        Some(">") => (BinaryOp::Lt, true),
        Some(">=") => (BinaryOp::Le, true),
        _ => break,
      };
      let loc = self.stream.loc();
      self.stream.advance()?;
      let rhs = self.parse_add()?;
      node = if swap {
        self.new_comparison(op, rhs, node, loc)?
      } else {
        self.new_comparison(op, node, rhs, loc)?
      };
    }

    Ok(node)
  }

  fn parse_add(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_mul()?;

    loop {
      let is_add = match self.stream.peek_punct() {
        Some("+") => true,
        Some("-") => false,
        _ => break,
      };
      let loc = self.stream.loc();
      self.stream.advance()?;
      let rhs = self.parse_mul()?;
      node = if is_add {
        self.new_add(node, rhs, loc)?
      } else {
        self.new_sub(node, rhs, loc)?
      };
    }

    Ok(node)
  }

  /// Multiply an integer offset by the size of the pointee of `ptr_ty`.
  fn scale(&mut self, offset: Expr, ptr_ty: &Type) -> Expr {
    let element_size = ptr_ty.base().map_or(1, Type::size);
    let size = self.new_num(element_size);
    self.new_binary(BinaryOp::Mul, offset, size, Type::int())
  }

  /// Arrays decay to a pointer to their element once used in arithmetic.
  fn decayed(ty: &Type) -> Type {
    match ty {
      Type::Array { base, .. } => Type::Ptr(base.clone()),
      other => other.clone(),
    }
  }

  fn new_add(&mut self, lhs: Expr, rhs: Expr, loc: usize) -> CompileResult<Expr> {
    if lhs.ty.is_integer() && rhs.ty.is_integer() {
      return Ok(self.new_binary(BinaryOp::Add, lhs, rhs, Type::int()));
    }

    let (ptr, offset) = if lhs.ty.is_addressable() && rhs.ty.is_integer() {
      (lhs, rhs)
    } else if lhs.ty.is_integer() && rhs.ty.is_addressable() {
      (rhs, lhs)
    } else {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!(
          "invalid operands to '+' ('{}' and '{}')",
          lhs.ty.describe(),
          rhs.ty.describe()
        ),
      ));
    };

    let ty = Self::decayed(&ptr.ty);
    let offset = self.scale(offset, &ptr.ty);
    Ok(self.new_binary(BinaryOp::Add, ptr, offset, ty))
  }

  /// `ptr - ptr` yields the raw byte distance; it is not divided by the
  /// element size.
  fn new_sub(&mut self, lhs: Expr, rhs: Expr, loc: usize) -> CompileResult<Expr> {
    if lhs.ty.is_integer() && rhs.ty.is_integer() {
      return Ok(self.new_binary(BinaryOp::Sub, lhs, rhs, Type::int()));
    }

    if lhs.ty.is_addressable() && rhs.ty.is_integer() {
      let ty = Self::decayed(&lhs.ty);
      let offset = self.scale(rhs, &lhs.ty);
      return Ok(self.new_binary(BinaryOp::Sub, lhs, offset, ty));
    }

    if lhs.ty.is_addressable() && rhs.ty.is_addressable() {
      let same_base = match (lhs.ty.base(), rhs.ty.base()) {
        (Some(a), Some(b)) => a.equal(b),
        _ => false,
      };
      if same_base {
        return Ok(self.new_binary(BinaryOp::Sub, lhs, rhs, Type::int()));
      }
    }

    Err(CompileError::type_error(
      self.source(),
      loc,
      format!(
        "invalid operands to '-' ('{}' and '{}')",
        lhs.ty.describe(),
        rhs.ty.describe()
      ),
    ))
  }

  fn parse_mul(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_unary()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("*") => BinaryOp::Mul,
        Some("/") => BinaryOp::Div,
        _ => break,
      };
      let loc = self.stream.loc();
      self.stream.advance()?;
      let rhs = self.parse_unary()?;
      if !node.ty.is_integer() || !rhs.ty.is_integer() {
        return Err(CompileError::type_error(
          self.source(),
          loc,
          format!(
            "invalid operands to '{}' ('{}' and '{}')",
            op.symbol(),
            node.ty.describe(),
            rhs.ty.describe()
          ),
        ));
      }
      node = self.new_binary(op, node, rhs, Type::int());
    }

    Ok(node)
  }

  fn parse_unary(&mut self) -> CompileResult<Expr> {
    let loc = self.stream.loc();
    match self.stream.peek_punct() {
      Some("+") => {
        self.stream.advance()?;
        self.parse_unary()
      }
      Some("-") => {
        self.stream.advance()?;
        let operand = self.parse_unary()?;
        let ty = operand.ty.clone();
        Ok(self.new_expr(ExprKind::Neg(Box::new(operand)), ty))
      }
      Some("*") => {
        self.stream.advance()?;
        let operand = self.parse_unary()?;
        self.new_deref(operand, loc)
      }
      Some("&") => {
        self.stream.advance()?;
        let operand = self.parse_unary()?;
        if !operand.is_lvalue() {
          return Err(CompileError::type_error(
            self.source(),
            loc,
            "cannot take the address of this expression",
          ));
        }
        let ty = pointer_to(operand.ty.clone());
        Ok(self.new_expr(ExprKind::Addr(Box::new(operand)), ty))
      }
      _ => self.parse_postfix(),
    }
  }

  fn new_deref(&mut self, operand: Expr, loc: usize) -> CompileResult<Expr> {
    let Some(ty) = operand.ty.base().cloned() else {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!("cannot dereference a value of type '{}'", operand.ty.describe()),
      ));
    };
    Ok(self.new_expr(ExprKind::Deref(Box::new(operand)), ty))
  }

  // `a[i]` is `*(a + i)`.
  fn parse_postfix(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_primary()?;

    while self.stream.is("[") {
      let loc = self.stream.loc();
      self.stream.advance()?;
      let index = self.parse_expr()?;
      self.stream.skip("]")?;
      if !node.ty.is_addressable() && !index.ty.is_addressable() {
        return Err(CompileError::type_error(
          self.source(),
          loc,
          "subscripted value is not an array or pointer",
        ));
      }
      let sum = self.new_add(node, index, loc)?;
      node = self.new_deref(sum, loc)?;
    }

    Ok(node)
  }

  fn parse_primary(&mut self) -> CompileResult<Expr> {
    if self.stream.equal("(")? {
      let node = self.parse_expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    if self.stream.equal("sizeof")? {
      let operand = self.parse_unary()?;
      return Ok(self.new_num(operand.ty.size()));
    }

    match self.stream.peek().kind {
      TokenKind::Ident => {
        let (name, loc) = self.stream.get_ident()?;
        if self.stream.equal("(")? {
          return self.parse_call(name, loc);
        }
        self.resolve_var(&name, loc)
      }
      TokenKind::Num => {
        let (value, _) = self.stream.get_number()?;
        Ok(self.new_num(value))
      }
      _ => {
        let got = describe_token(Some(self.stream.peek()), self.source());
        Err(CompileError::syntax(
          self.source(),
          self.stream.loc(),
          format!("expected an expression, but got \"{got}\""),
        ))
      }
    }
  }

  /// Locals (parameters included) shadow globals.
  fn resolve_var(&mut self, name: &str, loc: usize) -> CompileResult<Expr> {
    let (var, ty) = if let Some(index) = self.locals.lookup(name) {
      (VarRef::Local(index), self.locals.get(index).ty.clone())
    } else if let Some(index) = self.globals.lookup(name) {
      (VarRef::Global(index), self.globals.get(index).ty.clone())
    } else {
      return Err(CompileError::name(
        self.source(),
        loc,
        format!("identifier '{name}' is used before being defined"),
      ));
    };
    Ok(self.new_expr(ExprKind::Var(var), ty))
  }

  // args = assign ("," assign)* ")"
  fn parse_call(&mut self, name: String, loc: usize) -> CompileResult<Expr> {
    let mut args = Vec::new();
    if !self.stream.equal(")")? {
      loop {
        args.push(self.parse_assign()?);
        if self.stream.equal(")")? {
          break;
        }
        self.stream.skip(",")?;
      }
    }
    if args.len() > MAX_ARGS {
      return Err(CompileError::type_error(
        self.source(),
        loc,
        format!(
          "too many arguments to '{name}' ({} given, at most {MAX_ARGS})",
          args.len()
        ),
      ));
    }
    Ok(self.new_expr(ExprKind::Call { name, args }, Type::int()))
  }
}

/// Cursor over the token stream with one token of lookahead.
struct TokenStream<'a> {
  lexer: Lexer<'a>,
  source: &'a str,
  current: Token,
}

impl<'a> TokenStream<'a> {
  fn new(source: &'a str) -> CompileResult<Self> {
    let mut lexer = Lexer::new(source);
    let current = lexer.next_token()?;
    Ok(Self {
      source: lexer.source(),
      lexer,
      current,
    })
  }

  fn peek(&self) -> &Token {
    &self.current
  }

  fn loc(&self) -> usize {
    self.current.loc
  }

  /// Text of the current token if it is a punctuator.
  fn peek_punct(&self) -> Option<&'a str> {
    (self.current.kind == TokenKind::Punctuator).then(|| token_text(&self.current, self.source))
  }

  /// Consume the current token; the lexer is never asked for more after `Eof`.
  fn advance(&mut self) -> CompileResult<Token> {
    let next = if self.is_eof() {
      self.current.clone()
    } else {
      self.lexer.next_token()?
    };
    Ok(std::mem::replace(&mut self.current, next))
  }

  /// Whether the current token is the given punctuator or keyword.
  fn is(&self, op: &str) -> bool {
    matches!(
      self.current.kind,
      TokenKind::Punctuator | TokenKind::Keyword
    ) && self.current.len == op.len()
      && token_text(&self.current, self.source) == op
  }

  /// Consume the current token if it matches the provided punctuator or keyword.
  fn equal(&mut self, op: &str) -> CompileResult<bool> {
    if self.is(op) {
      self.advance()?;
      return Ok(true);
    }
    Ok(false)
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s)? {
      return Ok(());
    }
    let got = describe_token(Some(&self.current), self.source);
    Err(CompileError::syntax(
      self.source,
      self.current.loc,
      format!("expected \"{s}\", but got \"{got}\""),
    ))
  }

  /// Parse the current token as an integer literal returning its value and location.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if self.current.kind == TokenKind::Num {
      let token = self.advance()?;
      let value = token
        .value
        .ok_or_else(|| CompileError::internal("numeric token missing value"))?;
      return Ok((value, token.loc));
    }

    let got = describe_token(Some(&self.current), self.source);
    Err(CompileError::syntax(
      self.source,
      self.current.loc,
      format!("expected a number, but got \"{got}\""),
    ))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if self.current.kind == TokenKind::Ident {
      let token = self.advance()?;
      return Ok((token_text(&token, self.source).to_string(), token.loc));
    }

    let got = describe_token(Some(&self.current), self.source);
    Err(CompileError::syntax(
      self.source,
      self.current.loc,
      format!("expected an identifier, but got \"{got}\""),
    ))
  }

  fn is_eof(&self) -> bool {
    self.current.kind == TokenKind::Eof
  }
}
