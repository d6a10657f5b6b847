//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis, inserting semicolons at line ends.
//! - `parser` owns all syntactic knowledge and builds a flat syntax tree.
//! - `semantic` binds names, checks types and validates control flow.
//! - `codegen` lowers the analyzed tree into MIPS-32 assembly for SPIM/MARS.
//! - `error` and `symtab` hold the reporting and scoping machinery the
//!   other stages share.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod semantic;
pub mod symtab;
pub mod tokenizer;
pub mod ty;

pub use error::{CompileError, CompileResult, Diagnostics};

/// Compile a source string into MIPS assembly. Warnings collect in
/// `diagnostics`; the caller decides how to show them.
pub fn compile(source: &str, diagnostics: &mut Diagnostics) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source, diagnostics)?;
  let (ast, root) = parser::parse(tokens)?;
  let analysis = semantic::analyze(&ast, root)?;
  codegen::generate(&ast, root, &analysis)
}
