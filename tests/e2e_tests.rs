use golfc::error::{CompileError, render};
use golfc::{Diagnostics, compile};

fn build(source: &str) -> String {
  compile(source, &mut Diagnostics::new()).expect("program compiles")
}

fn fail(source: &str) -> CompileError {
  match compile(source, &mut Diagnostics::new()) {
    Ok(_) => panic!("expected compilation to fail"),
    Err(error) => error,
  }
}

#[test]
fn assignments_store_the_computed_sum() {
  let out = build(
    "func main() {
  var x int
  x = 1 + 2
  printi(x)
}
",
  );
  assert!(out.contains("    li $t0,1\n    li $t1,2\n    addu $t2,$t0,$t1\n    sw $t2,4($sp)\n"));
}

#[test]
fn a_break_outside_any_loop_is_fatal() {
  let error = fail(
    "func main() {
  break
}
",
  );
  assert!(matches!(error, CompileError::BreakOutsideLoop { .. }));
}

#[test]
fn a_value_function_with_an_empty_body_cannot_return() {
  let error = fail(
    "func f() int {
}

func main() {
  f()
}
",
  );
  assert!(matches!(error, CompileError::MissingReturn { name, .. } if name == "f"));
}

#[test]
fn integers_do_not_assign_to_booleans() {
  let error = fail(
    "func main() {
  var x bool
  x = 1
}
",
  );
  match error {
    CompileError::AssignTypeMismatch { expected, found, .. } => {
      assert_eq!((expected.as_str(), found.as_str()), ("bool", "int"));
    }
    other => panic!("expected an assignment mismatch, got {other:?}"),
  }
}

#[test]
fn a_second_main_is_a_redefinition() {
  let error = fail(
    "func main() {
}

func main() {
}
",
  );
  assert!(matches!(error, CompileError::Redefinition { name, .. } if name == "main"));
}

#[test]
fn equal_string_literals_share_one_label() {
  let out = build(
    r#"func main() {
  var s string
  s = "a\tb"
  prints(s)
  prints("a\tb")
}
"#,
  );
  assert_eq!(out.matches("    .byte 9\n").count(), 1);
  assert!(out.contains("S1:\n    .byte 97\n    .byte 9\n    .byte 98\n    .byte 0\n"));
}

#[test]
fn a_recursive_program_compiles_end_to_end() {
  let out = build(
    "var verbose bool

func gcd(a int, b int) int {
  if b == 0 {
    return a
  }
  if verbose {
    printi(a)
    printc(10)
  }
  return gcd(b, a % b)
}

func main() {
  verbose = true
  printi(gcd(1071, 462))
  printc(10)
}
",
  );
  assert!(out.contains("gcd:\n"));
  assert!(out.contains("    jal gcd\n"));
  assert!(out.contains("    jal Ldivmod\n"));
  assert!(out.contains("    li $t0,Ltrue\n    sw $t0,G0\n"));
  assert!(out.contains("    la $a0,Lnoret\n    j Lerror\n"));
}

#[test]
fn else_if_chains_compile_with_distinct_strings() {
  let out = build(
    r#"func classify(n int) {
  if n < 0 {
    prints("neg")
  } else if n == 0 {
    prints("zero")
  } else {
    prints("pos")
  }
  printc(10)
}

func main() {
  classify(-7)
  classify(0)
  classify(7)
}
"#,
  );
  for label in ["S1:\n", "S2:\n", "S3:\n"] {
    assert!(out.contains(label), "missing {label}");
  }
  assert!(out.contains("    li $t0,-7\n"));
}

#[test]
fn countdown_loops_jump_back_to_the_test() {
  let out = build(
    "func main() {
  var i int
  i = 3
  for 0 < i {
    printi(i)
    printc(10)
    i = i - 1
  }
}
",
  );
  assert!(out.contains("L0:\n"));
  assert!(out.contains("    beq $t2,$zero,L1\n"));
  assert!(out.contains("    j L0\nL1:\n"));
}

#[test]
fn arguments_load_into_a_registers_in_order() {
  let out = build(
    "func f(a int, b int, c int, d int) int {
  return a + b + c + d
}

func main() {
  printi(f(1, 2, 3, 4))
}
",
  );
  assert!(out.contains("    move $a0,$t0\n    move $a1,$t1\n    move $a2,$t2\n    move $a3,$t3\n    jal f\n"));
}

#[test]
fn string_equality_compiles_to_an_address_compare() {
  let out = build(
    r#"func main() {
  var s string
  s = "yes"
  if s == "yes" {
    printb(len(s) == 3)
  }
}
"#,
  );
  assert!(out.contains("    seq "));
  assert!(out.contains("    jal len\n"));
}

#[test]
fn one_line_blocks_need_explicit_semicolons() {
  assert!(matches!(
    fail("func main() { printi(1) }"),
    CompileError::UnexpectedToken { .. }
  ));
  let out = build("func main() { printi(1); }");
  assert!(out.contains("    jal printi\n"));
}

#[test]
fn stray_characters_warn_without_stopping_the_build() {
  let mut diagnostics = Diagnostics::new();
  let result = compile("func main() {\n  printi(1)#\n}\n", &mut diagnostics);
  assert!(result.is_ok(), "{result:?}");
  assert_eq!(diagnostics.warnings().len(), 1);
  assert!(diagnostics.warnings()[0].message.contains('#'));
}

#[test]
fn errors_render_with_a_caret_under_the_source() {
  let source = "func main() {\n  x = 1\n}\n";
  let error = fail(source);
  let rendered = render(&error, "demo.golf", source);
  assert_eq!(
    rendered,
    "--> demo.golf:2:3\n  |\n2 |   x = 1\n  |   ^ error: 'x' is not defined\n"
  );
}

#[test]
fn compilation_is_deterministic() {
  let source = r#"var g int

func main() {
  prints("b")
  prints("A")
  g = len("b")
  printi(g)
}
"#;
  assert_eq!(build(source), build(source));
}
