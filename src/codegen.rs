//! Code generation: lower the analyzed tree into MIPS-32 assembly for the
//! SPIM and MARS simulators.
//!
//! Expressions evaluate into registers drawn from a pool of $t and $s
//! registers and every statement frees what it allocated, so the pool is
//! full again at each statement boundary. Locals and formals live on the
//! stack frame addressed off $sp, globals are words in .data, and string
//! literals are deduplicated into a pool emitted after the code. A small
//! runtime library is appended last.

use std::collections::{HashMap, HashSet};

use snafu::ensure;

use crate::ast::{Ast, BinOp, NodeId, NodeKind, UnOp};
use crate::error::{CompileResult, OutOfRegistersSnafu, Span, TooManyArgumentsSnafu};
use crate::semantic::Analysis;
use crate::symtab::RecordId;
use crate::ty::Sig;

/// Arguments must fit in $a0..$a3.
const MAX_CALL_ARGS: usize = 4;

type Reg = &'static str;

/// Registers handed out to expressions. $t0 sits on top so simple code
/// reads naturally; values never survive a statement, so the callee-saved
/// convention for $s registers does not apply.
const POOL: [Reg; 18] = [
  "$t0", "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7", "$t8", "$t9", "$s0", "$s1", "$s2",
  "$s3", "$s4", "$s5", "$s6", "$s7",
];

struct RegisterPool {
  free: Vec<Reg>,
}

impl RegisterPool {
  fn new() -> Self {
    let mut free = POOL.to_vec();
    free.reverse();
    Self { free }
  }

  fn alloc(&mut self, span: Span) -> CompileResult<Reg> {
    match self.free.pop() {
      Some(reg) => Ok(reg),
      None => OutOfRegistersSnafu { span }.fail(),
    }
  }

  /// Returns a register to the pool. Dedicated registers such as $v0 and
  /// the $a set are never pooled, so freeing them does nothing.
  fn free(&mut self, reg: Reg) {
    if POOL.contains(&reg) {
      self.free.push(reg);
    }
  }

  /// Registers currently holding values, in pool order.
  fn live(&self) -> Vec<Reg> {
    POOL.iter().copied().filter(|reg| !self.free.contains(reg)).collect()
  }

  fn refresh(&mut self) {
    self.free = POOL.to_vec();
    self.free.reverse();
  }
}

/// Monotonic allocator for one label prefix.
struct LabelMaker {
  prefix: char,
  next: usize,
}

impl LabelMaker {
  fn new(prefix: char) -> Self {
    Self { prefix, next: 0 }
  }

  fn next(&mut self) -> String {
    let label = format!("{}{}", self.prefix, self.next);
    self.next += 1;
    label
  }
}

/// Interns string literals by their decoded bytes, so identical strings
/// share one label. S0 is always the empty string; variables point at it
/// until assigned.
struct StringPool {
  labels: HashMap<Vec<u8>, String>,
  maker: LabelMaker,
}

impl StringPool {
  fn new() -> Self {
    let mut pool = Self {
      labels: HashMap::new(),
      maker: LabelMaker::new('S'),
    };
    pool.intern(Vec::new());
    pool
  }

  fn intern(&mut self, bytes: Vec<u8>) -> String {
    if let Some(label) = self.labels.get(&bytes) {
      return label.clone();
    }
    let label = self.maker.next();
    self.labels.insert(bytes, label.clone());
    label
  }

  /// Pool contents ordered by byte length, then case-insensitively, then
  /// exactly. The order is arbitrary but must be deterministic.
  fn sorted(&self) -> Vec<(&[u8], &str)> {
    let mut entries: Vec<(&[u8], &str)> = self
      .labels
      .iter()
      .map(|(bytes, label)| (bytes.as_slice(), label.as_str()))
      .collect();
    entries.sort_by(|(a, _), (b, _)| {
      a.len()
        .cmp(&b.len())
        .then_with(|| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
        .then_with(|| a.cmp(b))
    });
    entries
  }
}

/// Rewrites escape sequences into their byte values. The tokenizer has
/// already validated every escape.
fn decode_escapes(lexeme: &str) -> Vec<u8> {
  let mut bytes = Vec::with_capacity(lexeme.len());
  let mut iter = lexeme.bytes();
  while let Some(byte) = iter.next() {
    if byte != b'\\' {
      bytes.push(byte);
      continue;
    }
    let escape = iter.next().expect("escape sequences are validated during tokenizing");
    bytes.push(match escape {
      b'b' => 8,
      b't' => 9,
      b'n' => 10,
      b'f' => 12,
      b'r' => 13,
      other => other,
    });
  }
  bytes
}

fn literal_value(literal: &str) -> i32 {
  literal.parse().expect("integer literals are range-checked during analysis")
}

/// Number of local variable slots a function body declares, counting every
/// nested block.
fn count_locals(ast: &Ast, id: NodeId) -> usize {
  match ast.kind(id) {
    NodeKind::Var => 1,
    NodeKind::Block | NodeKind::If | NodeKind::Else | NodeKind::For => ast
      .children(id)
      .iter()
      .map(|&child| count_locals(ast, child))
      .sum(),
    _ => 0,
  }
}

pub fn generate(ast: &Ast, root: NodeId, analysis: &Analysis) -> CompileResult<String> {
  let mut generator = Generator {
    ast,
    analysis,
    asm: String::new(),
    pool: RegisterPool::new(),
    labels: LabelMaker::new('L'),
    globals: LabelMaker::new('G'),
    strings: StringPool::new(),
    homes: HashMap::new(),
    defined: HashSet::new(),
    epilogue: String::new(),
    loop_ends: Vec::new(),
    next_local: 0,
  };
  generator.program(root)?;
  Ok(generator.asm)
}

struct Generator<'a> {
  ast: &'a Ast,
  analysis: &'a Analysis,
  asm: String,
  pool: RegisterPool,
  labels: LabelMaker,
  globals: LabelMaker,
  strings: StringPool,
  /// Address text per variable record: a global label or a frame offset.
  homes: HashMap<RecordId, String>,
  /// Function names the program defines, used to drop shadowed stubs.
  defined: HashSet<String>,
  /// Jump target of `return` in the current function.
  epilogue: String,
  /// End labels of the enclosing loops; `break` targets the last one.
  loop_ends: Vec<String>,
  next_local: usize,
}

impl Generator<'_> {
  fn program(&mut self, root: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    self.preamble();
    // Globals first so every function body can address them.
    for &decl in ast.children(root) {
      if ast.kind(decl) == NodeKind::GlobalVar {
        self.global_var(decl);
      }
    }
    for &decl in ast.children(root) {
      if ast.kind(decl) == NodeKind::Func {
        self.function(decl)?;
      }
    }
    self.string_section();
    self.runtime();
    Ok(())
  }

  /// Boilerplate every module starts with: the boolean constants and an
  /// entry point that calls main and exits cleanly.
  fn preamble(&mut self) {
    self.asm.push_str("    Ltrue = 1\n");
    self.asm.push_str("    Lfalse = 0\n");
    self.asm.push_str("    .text\n");
    self.asm.push_str("    .globl _start\n");
    self.asm.push_str("Lhalt:\n");
    self.asm.push_str("    li $v0,10\n");
    self.asm.push_str("    syscall\n");
    self.asm.push_str("    jr $ra\n");
    self.asm.push_str("_start:\n");
    self.asm.push_str("    jal main\n");
    self.asm.push_str("    j Lhalt\n");
  }

  fn global_var(&mut self, id: NodeId) {
    let ast = self.ast;
    let record = self.analysis.binding(ast.children(id)[0]);
    let label = self.globals.next();
    self.asm.push_str("    .data\n");
    self.asm.push_str(&format!("{label}:\n"));
    if self.analysis.table.record(record).sig == Sig::Str {
      // String variables point at the shared empty string, never at zero.
      self.asm.push_str("    .word S0\n");
    } else {
      self.asm.push_str("    .word 0\n");
    }
    self.asm.push_str("    .text\n");
    self.homes.insert(record, label);
  }

  fn function(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let children = ast.children(id);
    let name = ast.attr(children[0]);
    let record = self.analysis.binding(children[0]);
    let formals = ast.children(children[1])[0];
    ensure!(
      ast.children(formals).len() <= MAX_CALL_ARGS,
      TooManyArgumentsSnafu { span: ast.span(id) }
    );

    self.defined.insert(name.to_string());
    self.pool.refresh();
    self.epilogue = format!("{name}_epilogue");

    // $ra at the bottom of the frame, formals above it, locals above those.
    let formal_count = ast.children(formals).len();
    let frame = (count_locals(ast, children[2]) + formal_count + 1) * 4;
    self.next_local = (formal_count + 1) * 4;

    self.asm.push_str(&format!("{name}:\n"));
    self.asm.push_str(&format!("    subu $sp,$sp,{frame}\n"));
    self.asm.push_str("    sw $ra,0($sp)\n");
    for (index, &formal) in ast.children(formals).iter().enumerate() {
      let formal_record = self.analysis.binding(ast.children(formal)[0]);
      let offset = (index + 1) * 4;
      self.asm.push_str(&format!("    sw $a{index},{offset}($sp)\n"));
      self.homes.insert(formal_record, format!("{offset}($sp)"));
    }

    self.block(children[2])?;

    if self.analysis.table.record(record).rt_sig != Sig::Void {
      // Falling off the end of a non-void function is a runtime error.
      self.asm.push_str("    la $a0,Lnoret\n");
      self.asm.push_str("    j Lerror\n");
    }
    self.asm.push_str(&format!("{}:\n", self.epilogue));
    self.asm.push_str("    lw $ra,0($sp)\n");
    self.asm.push_str(&format!("    addu $sp,$sp,{frame}\n"));
    self.asm.push_str("    jr $ra\n");
    Ok(())
  }

  fn block(&mut self, id: NodeId) -> CompileResult<()> {
    for &child in self.ast.children(id) {
      self.statement(child)?;
    }
    Ok(())
  }

  fn statement(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    match ast.kind(id) {
      NodeKind::Var => self.var_stmt(id),
      NodeKind::Block => self.block(id),
      NodeKind::Else => self.block(ast.children(id)[0]),
      NodeKind::If => self.if_stmt(id),
      NodeKind::For => self.for_stmt(id),
      NodeKind::Break => {
        let target = self.loop_ends.last().cloned().expect("break sits inside a loop after analysis");
        self.asm.push_str(&format!("    j {target}\n"));
        Ok(())
      }
      NodeKind::Return => self.return_stmt(id),
      NodeKind::Assign => self.assign_stmt(id),
      NodeKind::FuncCall => self.call(id, false).map(|_| ()),
      NodeKind::Empty => Ok(()),
      _ => {
        // Expression statements evaluate for effect only.
        let reg = self.expr(id)?;
        self.pool.free(reg);
        Ok(())
      }
    }
  }

  /// Declares a local slot and zero-initializes it. Declarations inside a
  /// loop body run on every pass, resetting the variable.
  fn var_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let record = self.analysis.binding(ast.children(id)[0]);
    let offset = self.next_local;
    self.next_local += 4;
    self.homes.insert(record, format!("{offset}($sp)"));
    if self.analysis.table.record(record).sig == Sig::Str {
      self.asm.push_str("    la $v1,S0\n");
      self.asm.push_str(&format!("    sw $v1,{offset}($sp)\n"));
    } else {
      self.asm.push_str(&format!("    sw $0,{offset}($sp)\n"));
    }
    Ok(())
  }

  fn if_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let children = ast.children(id);
    let cond = self.expr(children[0])?;
    if children.len() == 2 {
      let end = self.labels.next();
      self.asm.push_str(&format!("    beq {cond},$zero,{end}\n"));
      self.pool.free(cond);
      self.statement(children[1])?;
      self.asm.push_str(&format!("    j {end}\n"));
      self.asm.push_str(&format!("{end}:\n"));
    } else {
      let other = self.labels.next();
      let end = self.labels.next();
      self.asm.push_str(&format!("    beq {cond},$zero,{other}\n"));
      self.pool.free(cond);
      self.statement(children[1])?;
      self.asm.push_str(&format!("    j {end}\n"));
      self.asm.push_str(&format!("{other}:\n"));
      self.statement(children[2])?;
      self.asm.push_str(&format!("{end}:\n"));
    }
    Ok(())
  }

  fn for_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let children = ast.children(id);
    let start = self.labels.next();
    let end = self.labels.next();
    self.asm.push_str(&format!("{start}:\n"));
    let cond = self.expr(children[0])?;
    self.asm.push_str(&format!("    beq {cond},$zero,{end}\n"));
    self.pool.free(cond);
    self.loop_ends.push(end.clone());
    self.statement(children[1])?;
    self.loop_ends.pop();
    self.asm.push_str(&format!("    j {start}\n"));
    self.asm.push_str(&format!("{end}:\n"));
    Ok(())
  }

  fn return_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    if let Some(&value) = ast.children(id).first() {
      let reg = self.expr(value)?;
      self.asm.push_str(&format!("    move $v0,{reg}\n"));
      self.pool.free(reg);
    }
    self.asm.push_str(&format!("    j {}\n", self.epilogue));
    Ok(())
  }

  fn assign_stmt(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let children = ast.children(id);
    let value = self.expr(children[1])?;
    let record = self.analysis.binding(children[0]);
    let home = self.home(record);
    self.asm.push_str(&format!("    sw {value},{home}\n"));
    self.pool.free(value);
    Ok(())
  }

  fn home(&self, record: RecordId) -> String {
    self
      .homes
      .get(&record)
      .expect("every variable has storage by its first use")
      .clone()
  }

  /// Evaluates an expression into a pool register the caller must free.
  fn expr(&mut self, id: NodeId) -> CompileResult<Reg> {
    let ast = self.ast;
    match ast.kind(id) {
      NodeKind::Int => {
        let reg = self.pool.alloc(ast.span(id))?;
        self.asm.push_str(&format!("    li {reg},{}\n", literal_value(ast.attr(id))));
        Ok(reg)
      }
      NodeKind::Str => {
        let label = self.strings.intern(decode_escapes(ast.attr(id)));
        let reg = self.pool.alloc(ast.span(id))?;
        self.asm.push_str(&format!("    la {reg},{label}\n"));
        Ok(reg)
      }
      // Only the condition a plain `for` synthesizes reaches here.
      NodeKind::Bool => {
        let reg = self.pool.alloc(ast.span(id))?;
        self.asm.push_str(&format!("    li {reg},Ltrue\n"));
        Ok(reg)
      }
      NodeKind::Id => {
        let record = self.analysis.binding(id);
        let reg = self.pool.alloc(ast.span(id))?;
        if self.analysis.table.record(record).is_const {
          let value = if ast.attr(id) == "false" { "Lfalse" } else { "Ltrue" };
          self.asm.push_str(&format!("    li {reg},{value}\n"));
        } else {
          let home = self.home(record);
          self.asm.push_str(&format!("    lw {reg},{home}\n"));
        }
        Ok(reg)
      }
      NodeKind::FuncCall => {
        let reg = self.call(id, true)?;
        Ok(reg.expect("a kept call leaves its result in a register"))
      }
      NodeKind::Unary(op) => self.unary(id, op),
      NodeKind::Binary(op) => self.binary(id, op),
      other => unreachable!("expression node {other:?}"),
    }
  }

  fn unary(&mut self, id: NodeId, op: UnOp) -> CompileResult<Reg> {
    let ast = self.ast;
    let operand = ast.children(id)[0];
    // Negated integer literals fold into the load.
    if op == UnOp::Neg && ast.kind(operand) == NodeKind::Int {
      let reg = self.pool.alloc(ast.span(id))?;
      self.asm.push_str(&format!("    li {reg},-{}\n", literal_value(ast.attr(operand))));
      return Ok(reg);
    }
    let reg = self.expr(operand)?;
    match op {
      UnOp::Not => self.asm.push_str(&format!("    xori {reg},{reg},1\n")),
      UnOp::Neg => self.asm.push_str(&format!("    subu {reg},$zero,{reg}\n")),
    }
    Ok(reg)
  }

  fn binary(&mut self, id: NodeId, op: BinOp) -> CompileResult<Reg> {
    if matches!(op, BinOp::And | BinOp::Or) {
      return self.short_circuit(id, op);
    }
    let ast = self.ast;
    let children = ast.children(id);
    let lhs = self.expr(children[0])?;
    let rhs = self.expr(children[1])?;
    if matches!(op, BinOp::Div | BinOp::Mod) {
      // The runtime guard reads the divisor from $a0 and never returns on
      // zero.
      self.asm.push_str(&format!("    move $a0,{rhs}\n"));
      self.asm.push_str("    jal Ldivmod\n");
    }
    let result = self.pool.alloc(ast.span(id))?;
    let code = match op {
      BinOp::Add => "addu",
      BinOp::Sub => "subu",
      BinOp::Mul => "mul",
      BinOp::Div => "div",
      BinOp::Mod => "rem",
      // String operands compare by address.
      BinOp::Eq => "seq",
      BinOp::Ne => "sne",
      BinOp::Lt => "slt",
      BinOp::Le => "sle",
      BinOp::Gt => "sgt",
      BinOp::Ge => "sge",
      BinOp::And | BinOp::Or => unreachable!("logical operators emit branches"),
    };
    self.asm.push_str(&format!("    {code} {result},{lhs},{rhs}\n"));
    self.pool.free(lhs);
    self.pool.free(rhs);
    Ok(result)
  }

  /// The left operand's register doubles as the result; the right operand
  /// only evaluates when the left does not decide the answer.
  fn short_circuit(&mut self, id: NodeId, op: BinOp) -> CompileResult<Reg> {
    let ast = self.ast;
    let children = ast.children(id);
    let end = self.labels.next();
    let reg = self.expr(children[0])?;
    match op {
      BinOp::And => self.asm.push_str(&format!("    beq {reg},$zero,{end}\n")),
      BinOp::Or => self.asm.push_str(&format!("    bne {reg},$zero,{end}\n")),
      _ => unreachable!("only && and || short-circuit"),
    }
    let rhs = self.expr(children[1])?;
    self.asm.push_str(&format!("    move {reg},{rhs}\n"));
    self.pool.free(rhs);
    self.asm.push_str(&format!("{end}:\n"));
    Ok(reg)
  }

  /// Emits a call. Actuals evaluate into pool registers, every live pool
  /// register spills across the jal, and when the caller keeps the result
  /// it moves from $v0 into a fresh register.
  fn call(&mut self, id: NodeId, keep: bool) -> CompileResult<Option<Reg>> {
    let ast = self.ast;
    let children = ast.children(id);
    let callee = ast.attr(children[0]);
    let actuals = ast.children(children[1]);
    ensure!(
      actuals.len() <= MAX_CALL_ARGS,
      TooManyArgumentsSnafu { span: ast.span(id) }
    );

    let mut args = Vec::new();
    for &actual in actuals {
      args.push(self.expr(actual)?);
    }

    let live = self.pool.live();
    let spill = live.len() * 4;
    if spill > 0 {
      self.asm.push_str(&format!("    subu $sp,$sp,{spill}\n"));
      for (index, reg) in live.iter().enumerate() {
        self.asm.push_str(&format!("    sw {reg},{}($sp)\n", index * 4));
      }
    }
    for (index, reg) in args.iter().enumerate() {
      self.asm.push_str(&format!("    move $a{index},{reg}\n"));
    }
    self.asm.push_str(&format!("    jal {callee}\n"));
    if spill > 0 {
      for (index, reg) in live.iter().enumerate() {
        self.asm.push_str(&format!("    lw {reg},{}($sp)\n", index * 4));
      }
      self.asm.push_str(&format!("    addu $sp,$sp,{spill}\n"));
    }
    for reg in args {
      self.pool.free(reg);
    }
    if !keep {
      return Ok(None);
    }
    let reg = self.pool.alloc(ast.span(id))?;
    self.asm.push_str(&format!("    move {reg},$v0\n"));
    Ok(Some(reg))
  }

  /// String pool, sorted for determinism. Each entry is NUL-terminated and
  /// the section realigns before any code follows.
  fn string_section(&mut self) {
    self.asm.push_str("    .data\n");
    for (bytes, label) in self.strings.sorted() {
      self.asm.push_str(&format!("{label}:\n"));
      for &byte in bytes {
        self.asm.push_str(&format!("    .byte {byte}\n"));
      }
      self.asm.push_str("    .byte 0\n");
    }
    self.asm.push_str("    .align 2\n");
    self.asm.push_str("    .text\n");
  }

  /// Runtime library appended after user code. A stub is dropped when the
  /// program defines a function of the same name.
  fn runtime(&mut self) {
    if !self.defined.contains("getchar") {
      self.asm.push_str("getchar:\n");
      self.asm.push_str("    li $v0,12\n");
      self.asm.push_str("    syscall\n");
      self.asm.push_str("    jr $ra\n");
    }
    if !self.defined.contains("prints") {
      self.asm.push_str("prints:\n");
      self.asm.push_str("    li $v0,4\n");
      self.asm.push_str("    syscall\n");
      self.asm.push_str("    jr $ra\n");
    }
    if !self.defined.contains("printi") {
      self.asm.push_str("printi:\n");
      self.asm.push_str("    li $v0,1\n");
      self.asm.push_str("    syscall\n");
      self.asm.push_str("    jr $ra\n");
    }
    if !self.defined.contains("printc") {
      self.asm.push_str("printc:\n");
      self.asm.push_str("    li $v0,11\n");
      self.asm.push_str("    syscall\n");
      self.asm.push_str("    jr $ra\n");
    }
    if !self.defined.contains("printb") {
      self.asm.push_str("printb:\n");
      self.asm.push_str("    beq $a0,$zero,Lprintbf\n");
      self.asm.push_str("    la $a0,Ltruestr\n");
      self.asm.push_str("    li $v0,4\n");
      self.asm.push_str("    syscall\n");
      self.asm.push_str("    jr $ra\n");
      self.asm.push_str("Lprintbf:\n");
      self.asm.push_str("    la $a0,Lfalsestr\n");
      self.asm.push_str("    li $v0,4\n");
      self.asm.push_str("    syscall\n");
      self.asm.push_str("    jr $ra\n");
    }
    if !self.defined.contains("halt") {
      self.asm.push_str("halt:\n");
      self.asm.push_str("    j Lhalt\n");
    }
    if !self.defined.contains("len") {
      self.asm.push_str("len:\n");
      self.asm.push_str("    li $v0,0\n");
      self.asm.push_str("Llenloop:\n");
      self.asm.push_str("    lbu $v1,0($a0)\n");
      self.asm.push_str("    beq $v1,$zero,Llendone\n");
      self.asm.push_str("    addu $v0,$v0,1\n");
      self.asm.push_str("    addu $a0,$a0,1\n");
      self.asm.push_str("    j Llenloop\n");
      self.asm.push_str("Llendone:\n");
      self.asm.push_str("    jr $ra\n");
    }
    self.asm.push_str("Ldivmod:\n");
    self.asm.push_str("    bne $a0,$zero,Ldivok\n");
    self.asm.push_str("    la $a0,Ldivmsg\n");
    self.asm.push_str("    j Lerror\n");
    self.asm.push_str("Ldivok:\n");
    self.asm.push_str("    jr $ra\n");
    self.asm.push_str("Lerror:\n");
    self.asm.push_str("    li $v0,4\n");
    self.asm.push_str("    syscall\n");
    self.asm.push_str("    j Lhalt\n");
    self.asm.push_str("    .data\n");
    self.asm.push_str("Ltruestr:\n");
    self.asm.push_str("    .asciiz \"true\"\n");
    self.asm.push_str("Lfalsestr:\n");
    self.asm.push_str("    .asciiz \"false\"\n");
    self.asm.push_str("Ldivmsg:\n");
    self.asm.push_str("    .asciiz \"error: division by zero\\n\"\n");
    self.asm.push_str("Lnoret:\n");
    self.asm.push_str("    .asciiz \"error: missing return value\\n\"\n");
    self.asm.push_str("    .text\n");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{CompileError, Diagnostics};
  use crate::parser::parse;
  use crate::semantic::analyze;
  use crate::tokenizer::tokenize;

  fn compile_source(source: &str) -> CompileResult<String> {
    let tokens = tokenize(source, &mut Diagnostics::new())?;
    let (ast, root) = parse(tokens)?;
    let analysis = analyze(&ast, root)?;
    generate(&ast, root, &analysis)
  }

  fn asm(source: &str) -> String {
    compile_source(source).expect("source compiles")
  }

  #[test]
  fn register_pool_hands_out_t0_first() {
    let mut pool = RegisterPool::new();
    let span = Span::new(1, 1, 1);
    assert_eq!(pool.alloc(span).unwrap(), "$t0");
    assert_eq!(pool.alloc(span).unwrap(), "$t1");
    pool.free("$t0");
    assert_eq!(pool.alloc(span).unwrap(), "$t0");
    pool.free("$v0");
    assert_eq!(pool.live(), ["$t0", "$t1"]);
  }

  #[test]
  fn register_pool_exhausts_after_eighteen() {
    let mut pool = RegisterPool::new();
    let span = Span::new(1, 1, 1);
    for _ in 0..18 {
      pool.alloc(span).unwrap();
    }
    assert!(matches!(pool.alloc(span), Err(CompileError::OutOfRegisters { .. })));
    pool.refresh();
    assert_eq!(pool.alloc(span).unwrap(), "$t0");
  }

  #[test]
  fn escape_sequences_decode_to_bytes() {
    assert_eq!(decode_escapes(r"a\tb"), [97, 9, 98]);
    assert_eq!(decode_escapes(r"\b\f\r\n"), [8, 12, 13, 10]);
    assert_eq!(decode_escapes(r#"\"\\"#), [34, 92]);
    assert!(decode_escapes("").is_empty());
  }

  #[test]
  fn preamble_names_the_entry_point() {
    let out = asm("func main() {\n}");
    assert!(out.starts_with(
      "    Ltrue = 1\n    Lfalse = 0\n    .text\n    .globl _start\nLhalt:\n    li $v0,10\n\
       \x20   syscall\n    jr $ra\n_start:\n    jal main\n    j Lhalt\n"
    ));
    assert!(out.contains("main:\n"));
  }

  #[test]
  fn frames_cover_ra_formals_and_locals() {
    let out = asm(
      "func f(a int, b int) {\n\
      \x20 var x int\n\
      \x20 x = a + b\n\
       }\n\
       func main() {\n\
      \x20 f(1, 2)\n\
       }",
    );
    assert!(out.contains(
      "f:\n    subu $sp,$sp,16\n    sw $ra,0($sp)\n    sw $a0,4($sp)\n    sw $a1,8($sp)\n"
    ));
    assert!(out.contains("    sw $0,12($sp)\n"));
    assert!(out.contains("    lw $t0,4($sp)\n    lw $t1,8($sp)\n    addu $t2,$t0,$t1\n    sw $t2,12($sp)\n"));
    assert!(out.contains("f_epilogue:\n    lw $ra,0($sp)\n    addu $sp,$sp,16\n    jr $ra\n"));
  }

  #[test]
  fn binary_results_land_in_a_fresh_register() {
    let out = asm("func main() {\n  var x int\n  x = 1 + 2\n  printi(x)\n}");
    assert!(out.contains("    li $t0,1\n    li $t1,2\n    addu $t2,$t0,$t1\n    sw $t2,4($sp)\n"));
  }

  #[test]
  fn globals_sit_in_data_words() {
    let out = asm("var n int\nvar s string\nfunc main() {\n  n = 1\n}");
    assert!(out.contains("    .data\nG0:\n    .word 0\n    .text\n"));
    assert!(out.contains("    .data\nG1:\n    .word S0\n    .text\n"));
    assert!(out.contains("    li $t0,1\n    sw $t0,G0\n"));
  }

  #[test]
  fn local_strings_start_empty() {
    let out = asm("func main() {\n  var s string\n  prints(s)\n}");
    assert!(out.contains("    la $v1,S0\n    sw $v1,4($sp)\n"));
  }

  #[test]
  fn identical_strings_share_one_pool_entry() {
    let out = asm(
      "func main() {\n\
      \x20 prints(\"a\\tb\")\n\
      \x20 prints(\"a\\tb\")\n\
       }",
    );
    assert_eq!(out.matches("    .byte 9\n").count(), 1);
    assert!(out.contains("S1:\n    .byte 97\n    .byte 9\n    .byte 98\n    .byte 0\n"));
    assert_eq!(out.matches("    la $t0,S1\n").count(), 2);
  }

  #[test]
  fn string_pool_sorts_by_length_then_case_insensitively() {
    let out = asm("func main() {\n  prints(\"b\")\n  prints(\"A\")\n  prints(\"ab\")\n}");
    let empty = out.find("S0:\n").unwrap();
    let a_upper = out.find("S2:\n").unwrap();
    let b_lower = out.find("S1:\n").unwrap();
    let ab = out.find("S3:\n").unwrap();
    assert!(empty < a_upper && a_upper < b_lower && b_lower < ab);
  }

  #[test]
  fn boolean_names_load_assembler_constants() {
    let out = asm("func main() {\n  var b bool\n  b = true\n  b = false\n}");
    assert!(out.contains("    li $t0,Ltrue\n"));
    assert!(out.contains("    li $t0,Lfalse\n"));
  }

  #[test]
  fn unary_operators_fold_and_flip() {
    let out = asm("func main() {\n  printi(-5)\n  printb(!true)\n  var x int\n  printi(-x)\n}");
    assert!(out.contains("    li $t0,-5\n"));
    assert!(out.contains("    xori $t0,$t0,1\n"));
    assert!(out.contains("    subu $t0,$zero,$t0\n"));
  }

  #[test]
  fn division_and_modulus_guard_against_zero() {
    let out = asm("func main() {\n  printi(6 / 2)\n  printi(7 % 3)\n}");
    assert_eq!(out.matches("    jal Ldivmod\n").count(), 2);
    assert!(out.contains("    move $a0,$t1\n    jal Ldivmod\n    div $t2,$t0,$t1\n"));
    assert!(out.contains("    rem $t2,$t0,$t1\n"));
  }

  #[test]
  fn logical_operators_short_circuit() {
    let out = asm("func main() {\n  printb(true && false)\n  printb(false || true)\n}");
    assert!(out.contains("    li $t0,Ltrue\n    beq $t0,$zero,L0\n    li $t1,Lfalse\n    move $t0,$t1\nL0:\n"));
    assert!(out.contains("    li $t0,Lfalse\n    bne $t0,$zero,L1\n    li $t1,Ltrue\n    move $t0,$t1\nL1:\n"));
  }

  #[test]
  fn live_registers_spill_across_calls() {
    let out = asm(
      "func f() int {\n\
      \x20 return 1\n\
       }\n\
       func main() {\n\
      \x20 printi(f() + f())\n\
       }",
    );
    assert!(out.contains("    jal f\n    move $t0,$v0\n"));
    assert!(out.contains(
      "    subu $sp,$sp,4\n    sw $t0,0($sp)\n    jal f\n    lw $t0,0($sp)\n    addu $sp,$sp,4\n    move $t1,$v0\n"
    ));
    assert!(out.contains("    addu $t2,$t0,$t1\n"));
    assert!(out.contains("    move $v0,$t0\n    j f_epilogue\n"));
  }

  #[test]
  fn if_without_else_skips_the_body() {
    let out = asm("func main() {\n  if true {\n    printi(1)\n  }\n}");
    assert!(out.contains("    li $t0,Ltrue\n    beq $t0,$zero,L0\n"));
    assert!(out.contains("    j L0\nL0:\n"));
  }

  #[test]
  fn if_else_branches_through_two_labels() {
    let out = asm(
      "func main() {\n\
      \x20 if true {\n\
      \x20   printi(1)\n\
      \x20 } else {\n\
      \x20   printi(2)\n\
      \x20 }\n\
       }",
    );
    assert!(out.contains("    beq $t0,$zero,L0\n"));
    assert!(out.contains("    j L1\nL0:\n"));
    assert!(out.contains("L1:\n"));
  }

  #[test]
  fn loops_branch_on_the_condition_and_break_jumps_out() {
    let out = asm(
      "func main() {\n\
      \x20 var i int\n\
      \x20 for i < 3 {\n\
      \x20   i = i + 1\n\
      \x20   if i == 2 {\n\
      \x20     break\n\
      \x20   }\n\
      \x20 }\n\
       }",
    );
    assert!(out.contains("L0:\n    lw $t0,4($sp)\n    li $t1,3\n    slt $t2,$t0,$t1\n    beq $t2,$zero,L1\n"));
    assert!(out.contains("    j L1\n"));
    assert!(out.contains("    j L0\nL1:\n"));
  }

  #[test]
  fn a_plain_for_loops_on_true() {
    let out = asm("func main() {\n  for {\n    break\n  }\n}");
    assert!(out.contains("L0:\n    li $t0,Ltrue\n    beq $t0,$zero,L1\n    j L1\n    j L0\nL1:\n"));
  }

  #[test]
  fn non_void_functions_trap_when_control_falls_off() {
    let out = asm(
      "func f(x bool) int {\n\
      \x20 if x {\n\
      \x20   return 1\n\
      \x20 } else {\n\
      \x20   return 2\n\
      \x20 }\n\
       }\n\
       func main() {\n\
      \x20 printi(f(true))\n\
       }",
    );
    assert!(out.contains("    la $a0,Lnoret\n    j Lerror\n"));
  }

  #[test]
  fn runtime_stubs_follow_user_code() {
    let out = asm("func main() {\n}");
    for stub in [
      "getchar:", "prints:", "printi:", "printc:", "printb:", "halt:", "len:", "Ldivmod:",
      "Lerror:", "Lnoret:",
    ] {
      assert!(out.contains(&format!("{stub}\n")), "missing {stub}");
    }
  }

  #[test]
  fn user_definitions_replace_matching_stubs() {
    let out = asm(
      "func getchar() int {\n\
      \x20 return 0\n\
       }\n\
       func main() {\n\
      \x20 printi(getchar())\n\
       }",
    );
    assert_eq!(out.matches("getchar:\n").count(), 1);
    assert!(!out.contains("    li $v0,12\n"));
  }

  #[test]
  fn five_arguments_do_not_fit_registers() {
    let result = compile_source(
      "func f(a int, b int, c int, d int, e int) {\n}\nfunc main() {\n  f(1, 2, 3, 4, 5)\n}",
    );
    assert!(matches!(result, Err(CompileError::TooManyArguments { .. })));
  }

  #[test]
  fn output_is_deterministic() {
    let source = "var g int\nfunc main() {\n  prints(\"b\")\n  prints(\"A\")\n  g = len(\"b\")\n}";
    assert_eq!(asm(source), asm(source));
  }
}
