//! A tiny RV64 interpreter for the assembly subset rvcc emits.
//!
//! Instructions are kept as text and decoded on every step; labels resolve
//! to instruction indices, and `.data` symbols to addresses starting at
//! [`DATA_BASE`]. Memory is a sparse map of 8-byte words.

#![allow(dead_code)]

use rustc_hash::FxHashMap;

pub const DATA_BASE: i64 = 0x1_0000;
pub const STACK_TOP: i64 = 0x8000_0000;
const EXIT_ADDRESS: i64 = -1;
const STEP_LIMIT: usize = 5_000_000;

#[derive(Debug, Clone)]
struct Inst {
  op: String,
  args: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Machine {
  code: Vec<Inst>,
  labels: FxHashMap<String, usize>,
  symbols: FxHashMap<String, i64>,
  regs: FxHashMap<String, i64>,
  memory: FxHashMap<i64, i64>,
  pub steps: usize,
}

fn parse_int(text: &str) -> i64 {
  text
    .parse()
    .unwrap_or_else(|_| panic!("bad immediate {text:?}"))
}

/// Split `addr` into the pieces `lui %hi` and `addi %lo` would produce.
fn split_address(addr: i64) -> (i64, i64) {
  let hi = (addr + 0x800) >> 12;
  (hi, addr - (hi << 12))
}

impl Machine {
  pub fn load(asm: &str) -> Self {
    let mut machine = Self::default();
    let mut in_data = false;
    let mut data_cursor = DATA_BASE;

    for raw in asm.lines() {
      let line = raw.trim();
      if line.is_empty() {
        continue;
      }
      if let Some(label) = line.strip_suffix(':') {
        if in_data {
          machine.symbols.insert(label.to_string(), data_cursor);
        } else {
          machine.labels.insert(label.to_string(), machine.code.len());
        }
        continue;
      }
      if let Some(directive) = line.strip_prefix('.') {
        let mut parts = directive.split_whitespace();
        match (parts.next(), parts.next()) {
          (Some("data"), _) => in_data = true,
          (Some("text"), _) => in_data = false,
          (Some("zero"), Some(n)) => data_cursor += parse_int(n),
          (Some("align"), Some(n)) => {
            let align = 1 << parse_int(n);
            data_cursor = (data_cursor + align - 1) / align * align;
          }
          (Some("globl"), _) => {}
          other => panic!("unsupported directive {other:?}"),
        }
        continue;
      }
      let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
      let args = rest
        .split(',')
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect();
      machine.code.push(Inst {
        op: op.to_string(),
        args,
      });
    }
    machine
  }

  pub fn reg(&self, name: &str) -> i64 {
    if name == "zero" {
      return 0;
    }
    self.regs.get(name).copied().unwrap_or(0)
  }

  fn set(&mut self, name: &str, value: i64) {
    if name != "zero" {
      self.regs.insert(name.to_string(), value);
    }
  }

  pub fn read(&self, addr: i64) -> i64 {
    assert_eq!(addr % 8, 0, "unaligned load at {addr:#x}");
    self.memory.get(&addr).copied().unwrap_or(0)
  }

  fn write(&mut self, addr: i64, value: i64) {
    assert_eq!(addr % 8, 0, "unaligned store at {addr:#x}");
    self.memory.insert(addr, value);
  }

  pub fn symbol(&self, name: &str) -> i64 {
    *self
      .symbols
      .get(name)
      .unwrap_or_else(|| panic!("unknown data symbol {name}"))
  }

  fn target(&self, label: &str) -> i64 {
    *self
      .labels
      .get(label)
      .unwrap_or_else(|| panic!("undefined label {label}")) as i64
  }

  /// `off(base)` to an absolute address.
  fn address(&self, operand: &str) -> i64 {
    let (offset, base) = operand
      .strip_suffix(')')
      .and_then(|s| s.split_once('('))
      .unwrap_or_else(|| panic!("bad memory operand {operand:?}"));
    self.reg(base) + parse_int(offset)
  }

  /// Immediate operand, including `%hi(sym)` and `%lo(sym)`.
  fn immediate(&self, operand: &str) -> i64 {
    if let Some(sym) = operand.strip_prefix("%hi(").and_then(|s| s.strip_suffix(')')) {
      return split_address(self.symbol(sym)).0;
    }
    if let Some(sym) = operand.strip_prefix("%lo(").and_then(|s| s.strip_suffix(')')) {
      return split_address(self.symbol(sym)).1;
    }
    parse_int(operand)
  }

  /// Call `entry` and run until it returns; yields `a0`.
  pub fn call(&mut self, entry: &str) -> i64 {
    self.set("sp", STACK_TOP);
    self.set("ra", EXIT_ADDRESS);
    let mut pc = self.target(entry);

    while pc != EXIT_ADDRESS {
      self.steps += 1;
      assert!(self.steps <= STEP_LIMIT, "step limit exceeded");
      let inst = self
        .code
        .get(pc as usize)
        .unwrap_or_else(|| panic!("pc {pc} ran off the end of the code"))
        .clone();
      let a = &inst.args;
      let mut next = pc + 1;

      match inst.op.as_str() {
        "li" => self.set(&a[0], parse_int(&a[1])),
        "mv" => self.set(&a[0], self.reg(&a[1])),
        "neg" => self.set(&a[0], self.reg(&a[1]).wrapping_neg()),
        "seqz" => self.set(&a[0], (self.reg(&a[1]) == 0) as i64),
        "snez" => self.set(&a[0], (self.reg(&a[1]) != 0) as i64),
        "add" => self.set(&a[0], self.reg(&a[1]).wrapping_add(self.reg(&a[2]))),
        "sub" => self.set(&a[0], self.reg(&a[1]).wrapping_sub(self.reg(&a[2]))),
        "mul" => self.set(&a[0], self.reg(&a[1]).wrapping_mul(self.reg(&a[2]))),
        "div" => {
          let divisor = self.reg(&a[2]);
          // RISC-V defines x / 0 as -1 rather than trapping.
          let value = if divisor == 0 {
            -1
          } else {
            self.reg(&a[1]).wrapping_div(divisor)
          };
          self.set(&a[0], value);
        }
        "xor" => self.set(&a[0], self.reg(&a[1]) ^ self.reg(&a[2])),
        "slt" => self.set(&a[0], (self.reg(&a[1]) < self.reg(&a[2])) as i64),
        "addi" => self.set(&a[0], self.reg(&a[1]).wrapping_add(self.immediate(&a[2]))),
        "xori" => self.set(&a[0], self.reg(&a[1]) ^ self.immediate(&a[2])),
        "lui" => self.set(&a[0], self.immediate(&a[1]) << 12),
        "sd" => {
          let addr = self.address(&a[1]);
          self.write(addr, self.reg(&a[0]));
        }
        "ld" => {
          let addr = self.address(&a[1]);
          self.set(&a[0], self.read(addr));
        }
        "j" => next = self.target(&a[0]),
        "beqz" => {
          if self.reg(&a[0]) == 0 {
            next = self.target(&a[1]);
          }
        }
        "call" => {
          assert_eq!(self.reg("sp") % 16, 0, "misaligned sp at call {}", a[0]);
          self.set("ra", pc + 1);
          next = self.target(&a[0]);
        }
        "ret" => next = self.reg("ra"),
        other => panic!("unsupported instruction {other}"),
      }
      pc = next;
    }

    assert_eq!(self.reg("sp"), STACK_TOP, "stack not restored on exit");
    self.reg("a0")
  }
}

/// Compile `source`, run `main` and return its result.
pub fn run(source: &str) -> i64 {
  let asm = rvcc::compile(source).unwrap_or_else(|err| panic!("compile failed:\n{err}"));
  Machine::load(&asm).call("main")
}

/// Run `return <expr>;` inside `main`.
pub fn eval(expr: &str) -> i64 {
  run(&format!("int main() {{ return {expr}; }}"))
}
