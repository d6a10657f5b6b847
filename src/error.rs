//! Shared diagnostics for the compilation pipeline.
//!
//! Every fatal error carries a `Span` pointing back into the source text so
//! the driver can print the offending line with a caret underneath it.
//! Warnings do not abort on their own; they accumulate in a `Diagnostics`
//! sink and escalate to a hard error once the sink overflows.

use snafu::{Snafu, ensure};

pub type CompileResult<T> = Result<T, CompileError>;

/// Warnings tolerated before the sink gives up on the input.
const MAX_WARNINGS: usize = 10;

/// Position of a token or node in the source. `width` is the number of
/// characters the underline should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
  pub line: usize,
  pub column: usize,
  pub width: usize,
}

impl Span {
  pub fn new(line: usize, column: usize, width: usize) -> Self {
    Self {
      line,
      column,
      width,
    }
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  // lexical
  #[snafu(display("string literal is not terminated"))]
  UnterminatedString { span: Span },

  #[snafu(display("string literal spans more than one line"))]
  MultilineString { span: Span },

  #[snafu(display("unknown escape sequence '\\{escape}'"))]
  UnknownEscape { escape: char, span: Span },

  #[snafu(display("bitwise operator '{op}' is not supported"))]
  BitwiseOperator { op: char, span: Span },

  // syntax
  #[snafu(display("expected {expected}, got {found}"))]
  UnexpectedToken {
    expected: String,
    found: String,
    span: Span,
  },

  #[snafu(display("expected an expression, got {found}"))]
  ExpectedExpression { found: String, span: Span },

  // binding
  #[snafu(display("redefinition of '{name}'"))]
  Redefinition { name: String, span: Span },

  #[snafu(display("'{name}' is not defined"))]
  Undefined { name: String, span: Span },

  #[snafu(display("'{name}' is not a type"))]
  NotAType { name: String, span: Span },

  #[snafu(display("'{name}' is a type, not a value"))]
  TypeAsValue { name: String, span: Span },

  #[snafu(display("'{name}' is a function, not a value"))]
  FunctionAsValue { name: String, span: Span },

  #[snafu(display("integer literal out of range: {literal}"))]
  IntOutOfRange { literal: String, span: Span },

  // type checking
  #[snafu(display("operator '{op}' cannot be applied to '{lhs}' and '{rhs}'"))]
  BinaryOperandMismatch {
    op: &'static str,
    lhs: String,
    rhs: String,
    span: Span,
  },

  #[snafu(display("operator '{op}' cannot be applied to '{operand}'"))]
  UnaryOperandMismatch {
    op: &'static str,
    operand: String,
    span: Span,
  },

  #[snafu(display("'{name}' is not a function"))]
  NotAFunction { name: String, span: Span },

  #[snafu(display("call does not match '{name}': expected {expected}, got {found}"))]
  CallMismatch {
    name: String,
    expected: String,
    found: String,
    span: Span,
  },

  #[snafu(display("'{construct}' condition must be 'bool', got '{found}'"))]
  ConditionType {
    construct: &'static str,
    found: String,
    span: Span,
  },

  // control flow
  #[snafu(display("'break' outside of a loop"))]
  BreakOutsideLoop { span: Span },

  #[snafu(display("'main' must take no arguments and return no value"))]
  InvalidMainSignature { span: Span },

  #[snafu(display("no 'main' function declared"))]
  MissingMain,

  #[snafu(display("function '{name}' does not return a value on every path"))]
  MissingReturn { name: String, span: Span },

  #[snafu(display("this function cannot return a value"))]
  ReturnValueInVoid { span: Span },

  #[snafu(display("return value of type '{expected}' required"))]
  ReturnMissingValue { expected: String, span: Span },

  #[snafu(display("return type mismatch: expected '{expected}', got '{found}'"))]
  ReturnTypeMismatch {
    expected: String,
    found: String,
    span: Span,
  },

  // assignment
  #[snafu(display("left side of assignment must be a variable"))]
  AssignToNonVariable { span: Span },

  #[snafu(display("cannot assign to constant '{name}'"))]
  AssignToConstant { name: String, span: Span },

  #[snafu(display("assignment type mismatch: expected '{expected}', got '{found}'"))]
  AssignTypeMismatch {
    expected: String,
    found: String,
    span: Span,
  },

  // code generation
  #[snafu(display("expression too complex: out of registers"))]
  OutOfRegisters { span: Span },

  #[snafu(display("at most four arguments are supported"))]
  TooManyArguments { span: Span },

  #[snafu(display("too many warnings, compilation aborted"))]
  TooManyWarnings,
}

impl CompileError {
  /// Source position the error points at, if it has one.
  pub fn span(&self) -> Option<Span> {
    match self {
      Self::UnterminatedString { span }
      | Self::MultilineString { span }
      | Self::UnknownEscape { span, .. }
      | Self::BitwiseOperator { span, .. }
      | Self::UnexpectedToken { span, .. }
      | Self::ExpectedExpression { span, .. }
      | Self::Redefinition { span, .. }
      | Self::Undefined { span, .. }
      | Self::NotAType { span, .. }
      | Self::TypeAsValue { span, .. }
      | Self::FunctionAsValue { span, .. }
      | Self::IntOutOfRange { span, .. }
      | Self::BinaryOperandMismatch { span, .. }
      | Self::UnaryOperandMismatch { span, .. }
      | Self::NotAFunction { span, .. }
      | Self::CallMismatch { span, .. }
      | Self::ConditionType { span, .. }
      | Self::BreakOutsideLoop { span }
      | Self::InvalidMainSignature { span }
      | Self::MissingReturn { span, .. }
      | Self::ReturnValueInVoid { span }
      | Self::ReturnMissingValue { span, .. }
      | Self::ReturnTypeMismatch { span, .. }
      | Self::AssignToNonVariable { span }
      | Self::AssignToConstant { span, .. }
      | Self::AssignTypeMismatch { span, .. }
      | Self::OutOfRegisters { span }
      | Self::TooManyArguments { span } => Some(*span),
      Self::MissingMain | Self::TooManyWarnings => None,
    }
  }
}

/// A non-fatal diagnostic collected during lexing.
#[derive(Debug, Clone)]
pub struct Warning {
  pub message: String,
  pub span: Span,
}

/// Collects warnings across a compilation. Exceeding `MAX_WARNINGS`
/// escalates to a fatal `TooManyWarnings` error.
#[derive(Debug, Default)]
pub struct Diagnostics {
  warnings: Vec<Warning>,
}

impl Diagnostics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn warn(&mut self, span: Span, message: impl Into<String>) -> CompileResult<()> {
    self.warnings.push(Warning {
      message: message.into(),
      span,
    });
    ensure!(self.warnings.len() <= MAX_WARNINGS, TooManyWarningsSnafu);
    Ok(())
  }

  pub fn warnings(&self) -> &[Warning] {
    &self.warnings
  }
}

/// Render a fatal error against the source it came from.
pub fn render(error: &CompileError, file: &str, source: &str) -> String {
  match error.span() {
    Some(span) => excerpt(file, source, span, "error", &error.to_string()),
    None => format!("error: {error}\n"),
  }
}

/// Render a collected warning in the same excerpt format.
pub fn render_warning(warning: &Warning, file: &str, source: &str) -> String {
  excerpt(file, source, warning.span, "warning", &warning.message)
}

/// Build the `file:line:column` header, a copy of the offending line, and a
/// caret underline of `span.width` characters.
fn excerpt(file: &str, source: &str, span: Span, severity: &str, message: &str) -> String {
  let line_text = source.lines().nth(span.line.saturating_sub(1)).unwrap_or("");
  let number = span.line.to_string();
  let gutter = " ".repeat(number.len());
  let pad = " ".repeat(span.column.saturating_sub(1));
  let tildes = "~".repeat(span.width.saturating_sub(1));

  let mut out = String::new();
  out.push_str(&format!("--> {file}:{}:{}\n", span.line, span.column));
  out.push_str(&format!("{gutter} |\n"));
  out.push_str(&format!("{number} | {line_text}\n"));
  out.push_str(&format!("{gutter} | {pad}^{tildes} {severity}: {message}\n"));
  out
}
