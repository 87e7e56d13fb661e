use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rvcc::CompileResult;

/// Compile a small subset of C into RISC-V assembly.
#[derive(Parser)]
#[command(name = "rvcc", version)]
struct Cli {
  /// C source file, or program text with --expr
  input: String,
  /// Treat INPUT as program text instead of a path
  #[arg(short, long)]
  expr: bool,
  /// Write assembly here instead of standard output
  #[arg(short, long, value_name = "PATH")]
  output: Option<PathBuf>,
  /// Also write the AST as a Graphviz file
  #[arg(long, value_name = "PATH")]
  dot: Option<PathBuf>,
  /// Raise log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn init_tracing(verbose: u8) {
  let filter = match verbose {
    0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    1 => EnvFilter::new("debug"),
    _ => EnvFilter::new("trace"),
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_ansi(io::stderr().is_terminal())
    .with_file(true)
    .with_line_number(true)
    .with_target(false)
    .init();
}

fn run(cli: &Cli) -> CompileResult<String> {
  let source = if cli.expr {
    cli.input.clone()
  } else {
    rvcc::read_source(Path::new(&cli.input))?
  };

  let program = rvcc::parse_program(&source)?;
  if let Some(path) = &cli.dot {
    if let Err(err) = fs::write(path, rvcc::dot::render(&program)) {
      tracing::error!(path = %path.display(), %err, "cannot write AST graph");
    }
  }
  rvcc::codegen::generate(&program)
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let asm = match run(&cli) {
    Ok(asm) => asm,
    Err(err) => {
      tracing::error!("{err}");
      process::exit(1);
    }
  };

  let written = match &cli.output {
    Some(path) => fs::write(path, &asm),
    None => io::stdout().write_all(asm.as_bytes()),
  };
  if let Err(err) = written {
    tracing::error!(%err, "cannot write assembly");
    process::exit(1);
  }
}
