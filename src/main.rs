//! Command-line driver: read a source file, compile it, print MIPS assembly
//! on stdout. Warnings and errors render against the source on stderr.

use std::fs;
use std::process;

use clap::Parser;

use golfc::error::{render, render_warning};
use golfc::{CompileResult, Diagnostics, compile};

/// GoLF compiler targeting the SPIM and MARS MIPS simulators.
#[derive(Parser)]
#[command(version, about)]
struct Args {
  /// Source file to compile.
  input: String,

  /// Dump the token stream and syntax tree to stderr.
  #[arg(short, long)]
  debug: bool,
}

fn main() {
  let args = Args::parse();
  let source = match fs::read_to_string(&args.input) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("error: cannot read '{}': {err}", args.input);
      process::exit(1);
    }
  };

  let mut diagnostics = Diagnostics::new();
  let result = run(&source, &mut diagnostics, args.debug);
  for warning in diagnostics.warnings() {
    eprint!("{}", render_warning(warning, &args.input, &source));
  }
  match result {
    Ok(asm) => print!("{asm}"),
    Err(error) => {
      eprint!("{}", render(&error, &args.input, &source));
      process::exit(1);
    }
  }
}

/// Same pipeline as `golfc::compile`, but each stage's output can be dumped
/// before the next one runs.
fn run(source: &str, diagnostics: &mut Diagnostics, debug: bool) -> CompileResult<String> {
  if !debug {
    return compile(source, diagnostics);
  }
  let tokens = golfc::tokenizer::tokenize(source, diagnostics)?;
  for token in &tokens {
    eprintln!("{:?} {}", token.kind, token.describe());
  }
  let (ast, root) = golfc::parser::parse(tokens)?;
  eprint!("{}", ast.dump(root));
  let analysis = golfc::semantic::analyze(&ast, root)?;
  golfc::codegen::generate(&ast, root, &analysis)
}
