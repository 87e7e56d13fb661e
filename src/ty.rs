//! Types attached to every expression and variable.
//!
//! Values are word sized (8 bytes); arrays are the only aggregate. Equality
//! is structural and never mutates either side.

/// Size in bytes of an `int` and of every pointer.
pub const WORD_SIZE: i64 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  Int,
  Ptr(Box<Type>),
  Array { base: Box<Type>, len: usize },
  Func(FuncType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
  pub name: String,
  pub ret: Box<Type>,
  pub params: Vec<Type>,
}

impl Type {
  pub fn int() -> Self {
    Self::Int
  }

  pub fn pointer_to(base: Type) -> Self {
    Self::Ptr(Box::new(base))
  }

  pub fn array_of(base: Type, len: usize) -> Self {
    Self::Array {
      base: Box::new(base),
      len,
    }
  }

  /// A function type with no parameters yet; the parser appends them.
  pub fn func(name: impl Into<String>, ret: Type) -> Self {
    Self::Func(FuncType {
      name: name.into(),
      ret: Box::new(ret),
      params: Vec::new(),
    })
  }

  pub fn is_integer(&self) -> bool {
    matches!(self, Self::Int)
  }

  pub fn is_pointer(&self) -> bool {
    matches!(self, Self::Ptr(_))
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Self::Array { .. })
  }

  /// Pointers and arrays both support `*`, `[]` and scaled arithmetic.
  pub fn is_addressable(&self) -> bool {
    self.is_pointer() || self.is_array()
  }

  /// The pointee of a pointer or the element type of an array.
  pub fn base(&self) -> Option<&Type> {
    match self {
      Self::Ptr(base) | Self::Array { base, .. } => Some(base),
      _ => None,
    }
  }

  pub fn size(&self) -> i64 {
    self.checked_size().unwrap_or(i64::MAX)
  }

  /// Byte size, or `None` when it does not fit in an `i64`.
  pub fn checked_size(&self) -> Option<i64> {
    match self {
      Self::Int | Self::Ptr(_) | Self::Func(_) => Some(WORD_SIZE),
      Self::Array { base, len } => {
        let len = i64::try_from(*len).ok()?;
        base.checked_size()?.checked_mul(len)
      }
    }
  }

  /// Innermost element of a (possibly nested) array.
  fn innermost(&self) -> &Type {
    let mut ty = self;
    while let Self::Array { base, .. } = ty {
      ty = base;
    }
    ty
  }

  /// Structural equality used by the type checker.
  ///
  /// A pointer compares equal to an array whose innermost element matches
  /// the pointee, so `int *p = a;` type-checks for any `int a[..]..[..]`.
  pub fn equal(&self, other: &Type) -> bool {
    match (self, other) {
      (Self::Int, Self::Int) => true,
      (Self::Ptr(a), Self::Ptr(b)) => a.equal(b),
      (Self::Ptr(pointee), array @ Self::Array { .. })
      | (array @ Self::Array { .. }, Self::Ptr(pointee)) => pointee.equal(array.innermost()),
      (Self::Array { base: a, len: n }, Self::Array { base: b, len: m }) => n == m && a.equal(b),
      (Self::Func(a), Self::Func(b)) => {
        a.name == b.name
          && a.ret.equal(&b.ret)
          && a.params.len() == b.params.len()
          && a.params.iter().zip(&b.params).all(|(x, y)| x.equal(y))
      }
      _ => false,
    }
  }

  /// Short name for diagnostics, e.g. `int*` or `int[3]`.
  pub fn describe(&self) -> String {
    match self {
      Self::Int => "int".to_string(),
      Self::Ptr(base) => format!("{}*", base.describe()),
      Self::Array { base, len } => format!("{}[{len}]", base.describe()),
      Self::Func(func) => format!("{} {}()", func.ret.describe(), func.name),
    }
  }
}

pub fn pointer_to(base: Type) -> Type {
  Type::pointer_to(base)
}
