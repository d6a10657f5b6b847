//! Arena-backed syntax tree shared by the parser, the analyzer and the code
//! generator. Nodes refer to their children by index, so the tree can be
//! threaded through the passes without reference cycles; parent context
//! (the enclosing function, the innermost loop) is carried explicitly by
//! whoever walks it.

use crate::error::Span;

pub type NodeId = usize;

/// Binary operators of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Or,
  And,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
}

impl BinOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinOp::Or => "||",
      BinOp::And => "&&",
      BinOp::Eq => "==",
      BinOp::Ne => "!=",
      BinOp::Lt => "<",
      BinOp::Le => "<=",
      BinOp::Gt => ">",
      BinOp::Ge => ">=",
      BinOp::Add => "+",
      BinOp::Sub => "-",
      BinOp::Mul => "*",
      BinOp::Div => "/",
      BinOp::Mod => "%",
    }
  }
}

/// Unary operators. Negation is spelled `u-` in diagnostics to keep it
/// apart from binary subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
  Not,
  Neg,
}

impl UnOp {
  pub fn symbol(self) -> &'static str {
    match self {
      UnOp::Not => "!",
      UnOp::Neg => "u-",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
  Program,
  GlobalVar,
  Var,
  Func,
  Sig,
  Formals,
  Formal,
  Block,
  If,
  Else,
  For,
  Break,
  Return,
  FuncCall,
  Actuals,
  Assign,
  Binary(BinOp),
  Unary(UnOp),
  Int,
  Str,
  Bool,
  Id,
  NewId,
  TypeId,
  Empty,
}

/// One tree node. `attr` holds the identifier name or literal text for the
/// leaf kinds and is empty otherwise.
#[derive(Debug, Clone)]
pub struct Node {
  pub kind: NodeKind,
  pub attr: String,
  pub children: Vec<NodeId>,
  pub span: Span,
}

impl Node {
  pub fn new(kind: NodeKind, span: Span) -> Self {
    Self {
      kind,
      attr: String::new(),
      children: Vec::new(),
      span,
    }
  }

  pub fn leaf(kind: NodeKind, attr: impl Into<String>, span: Span) -> Self {
    Self {
      kind,
      attr: attr.into(),
      children: Vec::new(),
      span,
    }
  }

  pub fn with_children(kind: NodeKind, children: Vec<NodeId>, span: Span) -> Self {
    Self {
      kind,
      attr: String::new(),
      children,
      span,
    }
  }
}

#[derive(Debug, Default)]
pub struct Ast {
  nodes: Vec<Node>,
}

impl Ast {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, node: Node) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(node);
    id
  }

  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id]
  }

  pub fn kind(&self, id: NodeId) -> NodeKind {
    self.nodes[id].kind
  }

  pub fn attr(&self, id: NodeId) -> &str {
    &self.nodes[id].attr
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    &self.nodes[id].children
  }

  pub fn span(&self, id: NodeId) -> Span {
    self.nodes[id].span
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Indented tree listing, one node per line. Used by the driver's debug
  /// dump and handy in test failures.
  pub fn dump(&self, root: NodeId) -> String {
    let mut out = String::new();
    self.dump_into(root, 0, &mut out);
    out
  }

  fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
    let node = &self.nodes[id];
    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!("{:?}", node.kind));
    if !node.attr.is_empty() {
      out.push_str(&format!(" '{}'", node.attr));
    }
    out.push('\n');
    for &child in &node.children {
      self.dump_into(child, depth + 1, out);
    }
  }
}
