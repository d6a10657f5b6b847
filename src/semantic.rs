//! Semantic analysis: five passes over the syntax tree.
//!
//! Pass 0 seeds the universe scope and pass 1 forward-declares every
//! top-level name, so globals and functions can refer to each other in any
//! order. Pass 2 binds identifiers to records, pass 3 checks operator and
//! call types post-order against a fixed table, and pass 4 validates control
//! flow, returns and assignments. The tree itself is never mutated; results
//! land in side tables keyed by node id.

use snafu::ensure;

use crate::ast::{Ast, BinOp, NodeId, NodeKind, UnOp};
use crate::error::{
  AssignToConstantSnafu, AssignToNonVariableSnafu, AssignTypeMismatchSnafu,
  BinaryOperandMismatchSnafu, BreakOutsideLoopSnafu, CallMismatchSnafu, CompileResult,
  ConditionTypeSnafu, FunctionAsValueSnafu, IntOutOfRangeSnafu, InvalidMainSignatureSnafu,
  MissingMainSnafu, MissingReturnSnafu, NotAFunctionSnafu, NotATypeSnafu, RedefinitionSnafu,
  ReturnMissingValueSnafu, ReturnTypeMismatchSnafu, ReturnValueInVoidSnafu, TypeAsValueSnafu,
  UnaryOperandMismatchSnafu, UndefinedSnafu,
};
use crate::symtab::{Record, RecordId, SymbolTable};
use crate::ty::Sig;

/// Accepted operand signature and result for each binary operator. Both
/// operands must share the listed signature.
static BINARY_OPS: [(BinOp, Sig, Sig); 21] = [
  (BinOp::Or, Sig::Bool, Sig::Bool),
  (BinOp::And, Sig::Bool, Sig::Bool),
  (BinOp::Eq, Sig::Bool, Sig::Bool),
  (BinOp::Eq, Sig::Int, Sig::Bool),
  (BinOp::Eq, Sig::Str, Sig::Bool),
  (BinOp::Ne, Sig::Bool, Sig::Bool),
  (BinOp::Ne, Sig::Int, Sig::Bool),
  (BinOp::Ne, Sig::Str, Sig::Bool),
  (BinOp::Lt, Sig::Int, Sig::Bool),
  (BinOp::Lt, Sig::Str, Sig::Bool),
  (BinOp::Le, Sig::Int, Sig::Bool),
  (BinOp::Le, Sig::Str, Sig::Bool),
  (BinOp::Gt, Sig::Int, Sig::Bool),
  (BinOp::Gt, Sig::Str, Sig::Bool),
  (BinOp::Ge, Sig::Int, Sig::Bool),
  (BinOp::Ge, Sig::Str, Sig::Bool),
  (BinOp::Add, Sig::Int, Sig::Int),
  (BinOp::Sub, Sig::Int, Sig::Int),
  (BinOp::Mul, Sig::Int, Sig::Int),
  (BinOp::Div, Sig::Int, Sig::Int),
  (BinOp::Mod, Sig::Int, Sig::Int),
];

static UNARY_OPS: [(UnOp, Sig, Sig); 2] = [
  (UnOp::Not, Sig::Bool, Sig::Bool),
  (UnOp::Neg, Sig::Int, Sig::Int),
];

fn binary_result(op: BinOp, operand: &Sig) -> Option<Sig> {
  BINARY_OPS
    .iter()
    .find(|(table_op, accepts, _)| *table_op == op && accepts == operand)
    .map(|(_, _, result)| result.clone())
}

fn unary_result(op: UnOp, operand: &Sig) -> Option<Sig> {
  UNARY_OPS
    .iter()
    .find(|(table_op, accepts, _)| *table_op == op && accepts == operand)
    .map(|(_, _, result)| result.clone())
}

/// Everything later stages need to know about the analyzed tree.
#[derive(Debug)]
pub struct Analysis {
  pub table: SymbolTable,
  sigs: Vec<Sig>,
  syms: Vec<Option<RecordId>>,
}

impl Analysis {
  /// Signature the checker computed for an expression node.
  pub fn sig(&self, id: NodeId) -> &Sig {
    &self.sigs[id]
  }

  /// Record bound to a name node.
  pub fn binding(&self, id: NodeId) -> RecordId {
    self.syms[id].expect("names are bound during analysis")
  }
}

pub fn analyze(ast: &Ast, root: NodeId) -> CompileResult<Analysis> {
  let mut analyzer = Analyzer {
    ast,
    table: SymbolTable::new(),
    sigs: vec![Sig::None; ast.len()],
    syms: vec![None; ast.len()],
    for_depth: 0,
    main_seen: false,
    ret: Sig::None,
  };
  analyzer.declare_universe();
  analyzer.table.open_scope();
  analyzer.declare_globals(root)?;
  analyzer.bind(root)?;
  analyzer.check_types(root)?;
  analyzer.check_flow(root)?;
  ensure!(analyzer.main_seen, MissingMainSnafu);
  Ok(Analysis {
    table: analyzer.table,
    sigs: analyzer.sigs,
    syms: analyzer.syms,
  })
}

struct Analyzer<'a> {
  ast: &'a Ast,
  table: SymbolTable,
  sigs: Vec<Sig>,
  syms: Vec<Option<RecordId>>,
  for_depth: usize,
  main_seen: bool,
  /// Return signature of the function being flow-checked.
  ret: Sig,
}

impl Analyzer<'_> {
  fn binding(&self, id: NodeId) -> RecordId {
    self.syms[id].expect("names are bound before use")
  }

  // Pass 0: the built-in types, constants and runtime library.
  fn declare_universe(&mut self) {
    self.table.define("$void", Record::ty(Sig::Void));
    self.table.define("bool", Record::ty(Sig::Bool));
    self.table.define("int", Record::ty(Sig::Int));
    self.table.define("string", Record::ty(Sig::Str));
    self.table.define("$true", Record::constant(Sig::Bool));
    self.table.define("true", Record::constant(Sig::Bool));
    self.table.define("false", Record::constant(Sig::Bool));
    self.table.define("printb", Record::func(vec![Sig::Bool], Sig::Void));
    self.table.define("printc", Record::func(vec![Sig::Int], Sig::Void));
    self.table.define("printi", Record::func(vec![Sig::Int], Sig::Void));
    self.table.define("prints", Record::func(vec![Sig::Str], Sig::Void));
    self.table.define("getchar", Record::func(vec![], Sig::Int));
    self.table.define("halt", Record::func(vec![], Sig::Void));
    self.table.define("len", Record::func(vec![Sig::Str], Sig::Int));
  }

  // Pass 1: every top-level name is declared before any is resolved, so a
  // function body may refer to globals and functions declared after it.
  fn declare_globals(&mut self, root: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    let mut pending = Vec::new();
    for &decl in ast.children(root) {
      let name_node = ast.children(decl)[0];
      let name = ast.attr(name_node);
      let Some(record) = self.table.define(name, Record::placeholder()) else {
        return RedefinitionSnafu {
          name,
          span: ast.span(name_node),
        }
        .fail();
      };
      self.syms[name_node] = Some(record);
      pending.push((decl, record));
    }
    for (decl, record) in pending {
      match ast.kind(decl) {
        NodeKind::GlobalVar => {
          let sig = self.type_sig(ast.children(decl)[1])?;
          self.table.record_mut(record).sig = sig;
        }
        NodeKind::Func => {
          let sig_node = ast.children(decl)[1];
          let formals = ast.children(sig_node)[0];
          let mut params = Vec::new();
          for &formal in ast.children(formals) {
            params.push(self.type_sig(ast.children(formal)[1])?);
          }
          let ret = self.type_sig(ast.children(sig_node)[1])?;
          let filled = self.table.record_mut(record);
          filled.sig = Sig::Func(params);
          filled.rt_sig = ret;
        }
        other => unreachable!("top-level declaration {other:?}"),
      }
    }
    Ok(())
  }

  /// Resolves a TypeId node; the name must be bound to a type record.
  fn type_sig(&mut self, id: NodeId) -> CompileResult<Sig> {
    let ast = self.ast;
    let name = ast.attr(id);
    let Some(record) = self.table.lookup(name) else {
      return UndefinedSnafu {
        name,
        span: ast.span(id),
      }
      .fail();
    };
    ensure!(
      self.table.record(record).is_type,
      NotATypeSnafu {
        name,
        span: ast.span(id),
      }
    );
    self.syms[id] = Some(record);
    Ok(self.table.record(record).sig.clone())
  }

  // Pass 2: scope management and name binding. Literal nodes pick up their
  // signatures here as well, so pass 3 can stay purely structural.
  fn bind(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    match ast.kind(id) {
      // Declared in pass 1.
      NodeKind::GlobalVar => {}
      NodeKind::Func => {
        let children = ast.children(id);
        self.table.open_scope();
        let formals = ast.children(children[1])[0];
        for &formal in ast.children(formals) {
          let name_node = ast.children(formal)[0];
          let sig = self.type_sig(ast.children(formal)[1])?;
          let name = ast.attr(name_node);
          let Some(record) = self.table.define(name, Record::var(sig)) else {
            return RedefinitionSnafu {
              name,
              span: ast.span(name_node),
            }
            .fail();
          };
          self.syms[name_node] = Some(record);
        }
        self.bind(children[2])?;
        self.table.close_scope();
      }
      NodeKind::Block => {
        self.table.open_scope();
        for &child in ast.children(id) {
          self.bind(child)?;
        }
        self.table.close_scope();
      }
      // The declared type resolves before the name is defined, so
      // `var int int` shadows the type only for later statements.
      NodeKind::Var => {
        let children = ast.children(id);
        let name_node = children[0];
        let sig = self.type_sig(children[1])?;
        let name = ast.attr(name_node);
        let Some(record) = self.table.define(name, Record::var(sig)) else {
          return RedefinitionSnafu {
            name,
            span: ast.span(name_node),
          }
          .fail();
        };
        self.syms[name_node] = Some(record);
      }
      NodeKind::Id => {
        let record = self.value_name(id)?;
        ensure!(
          !self.table.record(record).sig.is_func(),
          FunctionAsValueSnafu {
            name: ast.attr(id),
            span: ast.span(id),
          }
        );
        self.syms[id] = Some(record);
        self.sigs[id] = self.table.record(record).sig.clone();
      }
      // The callee may name a function; every other identifier use must
      // resolve to a value.
      NodeKind::FuncCall => {
        let children = ast.children(id);
        let callee = children[0];
        let record = self.value_name(callee)?;
        self.syms[callee] = Some(record);
        self.sigs[callee] = self.table.record(record).sig.clone();
        self.bind(children[1])?;
      }
      NodeKind::Bool => {
        let record = self
          .table
          .lookup(self.ast.attr(id))
          .expect("boolean literals resolve in the universe scope");
        self.syms[id] = Some(record);
        self.sigs[id] = Sig::Bool;
      }
      NodeKind::Int => {
        let literal = ast.attr(id);
        let value = if literal.len() > 11 { None } else { literal.parse::<i64>().ok() };
        ensure!(
          value.is_some_and(|v| v <= i32::MAX as i64),
          IntOutOfRangeSnafu {
            literal,
            span: ast.span(id),
          }
        );
        self.sigs[id] = Sig::Int;
      }
      NodeKind::Str => {
        self.sigs[id] = Sig::Str;
      }
      _ => {
        for &child in ast.children(id) {
          self.bind(child)?;
        }
      }
    }
    Ok(())
  }

  /// Resolves an identifier used in expression position. Type names are
  /// never values there.
  fn value_name(&mut self, id: NodeId) -> CompileResult<RecordId> {
    let ast = self.ast;
    let name = ast.attr(id);
    let Some(record) = self.table.lookup(name) else {
      return UndefinedSnafu {
        name,
        span: ast.span(id),
      }
      .fail();
    };
    ensure!(
      !self.table.record(record).is_type,
      TypeAsValueSnafu {
        name,
        span: ast.span(id),
      }
    );
    Ok(record)
  }

  // Pass 3: post-order operator and call checking.
  fn check_types(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    for &child in ast.children(id) {
      self.check_types(child)?;
    }
    match ast.kind(id) {
      NodeKind::Binary(op) => {
        let children = ast.children(id);
        let lhs = self.sigs[children[0]].clone();
        let rhs = self.sigs[children[1]].clone();
        let result = if lhs == rhs { binary_result(op, &lhs) } else { None };
        let Some(result) = result else {
          return BinaryOperandMismatchSnafu {
            op: op.symbol(),
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
            span: ast.span(id),
          }
          .fail();
        };
        self.sigs[id] = result;
      }
      NodeKind::Unary(op) => {
        let operand = self.sigs[ast.children(id)[0]].clone();
        let Some(result) = unary_result(op, &operand) else {
          return UnaryOperandMismatchSnafu {
            op: op.symbol(),
            operand: operand.to_string(),
            span: ast.span(id),
          }
          .fail();
        };
        self.sigs[id] = result;
      }
      NodeKind::FuncCall => {
        let children = ast.children(id);
        let callee = children[0];
        let name = ast.attr(callee);
        let record = self.binding(callee);
        let declared = self.table.record(record).sig.clone();
        ensure!(
          declared.is_func(),
          NotAFunctionSnafu {
            name,
            span: ast.span(callee),
          }
        );
        let actuals = ast
          .children(children[1])
          .iter()
          .map(|&actual| self.sigs[actual].clone())
          .collect();
        let call_sig = Sig::Func(actuals);
        ensure!(
          call_sig == declared,
          CallMismatchSnafu {
            name,
            expected: declared.to_string(),
            found: call_sig.to_string(),
            span: ast.span(id),
          }
        );
        self.sigs[id] = self.table.record(record).rt_sig.clone();
      }
      NodeKind::If => {
        self.condition(ast.children(id)[0], "if")?;
      }
      NodeKind::For => {
        self.condition(ast.children(id)[0], "for")?;
      }
      _ => {}
    }
    Ok(())
  }

  fn condition(&self, cond: NodeId, construct: &'static str) -> CompileResult<()> {
    let found = &self.sigs[cond];
    ensure!(
      *found == Sig::Bool,
      ConditionTypeSnafu {
        construct,
        found: found.to_string(),
        span: self.ast.span(cond),
      }
    );
    Ok(())
  }

  // Pass 4: break placement, main validation, return totality, assignments.
  fn check_flow(&mut self, id: NodeId) -> CompileResult<()> {
    let ast = self.ast;
    match ast.kind(id) {
      NodeKind::Func => {
        let children = ast.children(id);
        let name = ast.attr(children[0]);
        let record = self.binding(children[0]);
        let rt_sig = self.table.record(record).rt_sig.clone();
        if name == "main" {
          let sig = &self.table.record(record).sig;
          ensure!(
            *sig == Sig::Func(Vec::new()) && rt_sig == Sig::Void,
            InvalidMainSignatureSnafu { span: ast.span(id) }
          );
          self.main_seen = true;
        }
        self.ret = rt_sig.clone();
        self.check_flow(children[2])?;
        ensure!(
          rt_sig == Sig::Void || always_returns(ast, children[2]),
          MissingReturnSnafu {
            name,
            span: ast.span(id),
          }
        );
      }
      NodeKind::For => {
        self.for_depth += 1;
        self.check_flow(ast.children(id)[1])?;
        self.for_depth -= 1;
      }
      NodeKind::Break => {
        ensure!(self.for_depth > 0, BreakOutsideLoopSnafu { span: ast.span(id) });
      }
      NodeKind::Return => {
        let expected = self.ret.clone();
        match ast.children(id).first().copied() {
          Some(value) => {
            ensure!(expected != Sig::Void, ReturnValueInVoidSnafu { span: ast.span(id) });
            let found = &self.sigs[value];
            ensure!(
              *found == expected,
              ReturnTypeMismatchSnafu {
                expected: expected.to_string(),
                found: found.to_string(),
                span: ast.span(value),
              }
            );
          }
          None => {
            ensure!(
              expected == Sig::Void,
              ReturnMissingValueSnafu {
                expected: expected.to_string(),
                span: ast.span(id),
              }
            );
          }
        }
      }
      NodeKind::Assign => {
        let children = ast.children(id);
        let lhs = children[0];
        ensure!(
          ast.kind(lhs) == NodeKind::Id,
          AssignToNonVariableSnafu { span: ast.span(lhs) }
        );
        let record = self.binding(lhs);
        ensure!(
          !self.table.record(record).is_const,
          AssignToConstantSnafu {
            name: ast.attr(lhs),
            span: ast.span(lhs),
          }
        );
        let expected = &self.sigs[lhs];
        let found = &self.sigs[children[1]];
        ensure!(
          expected == found,
          AssignTypeMismatchSnafu {
            expected: expected.to_string(),
            found: found.to_string(),
            span: ast.span(id),
          }
        );
      }
      _ => {
        for &child in ast.children(id) {
          self.check_flow(child)?;
        }
      }
    }
    Ok(())
  }
}

/// Structural check that every path through `id` ends in a return. An `if`
/// covers a path only when both branches do; a loop body may never run, so
/// `for` contributes nothing.
fn always_returns(ast: &Ast, id: NodeId) -> bool {
  match ast.kind(id) {
    NodeKind::Return => true,
    NodeKind::Block => ast.children(id).iter().any(|&child| always_returns(ast, child)),
    NodeKind::If => {
      let children = ast.children(id);
      children.len() == 3 && always_returns(ast, children[1]) && always_returns(ast, children[2])
    }
    NodeKind::Else => always_returns(ast, ast.children(id)[0]),
    _ => false,
  }
}
