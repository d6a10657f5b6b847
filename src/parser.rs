//! Recursive-descent parser with one token of lookahead.
//!
//! Each grammar rule is a method that consumes tokens and returns the id of
//! the node it built. The token vector always ends in `Eof`, and `advance`
//! never moves past it, so the lookahead cannot run off the end.

use snafu::ensure;

use crate::ast::{Ast, BinOp, Node, NodeId, NodeKind, UnOp};
use crate::error::{CompileResult, ExpectedExpressionSnafu, Span, UnexpectedTokenSnafu};
use crate::tokenizer::{Token, TokenKind, kind_text};

/// Parse a token stream into a syntax tree. Returns the arena and the id of
/// the `Program` root.
pub fn parse(tokens: Vec<Token>) -> CompileResult<(Ast, NodeId)> {
  let mut parser = Parser {
    tokens,
    pos: 0,
    ast: Ast::new(),
  };
  let root = parser.program()?;
  Ok((parser.ast, root))
}

struct Parser {
  tokens: Vec<Token>,
  pos: usize,
  ast: Ast,
}

impl Parser {
  fn peek(&self) -> &Token {
    &self.tokens[self.pos]
  }

  fn at(&self, kind: TokenKind) -> bool {
    self.peek().kind == kind
  }

  fn advance(&mut self) -> Token {
    let token = self.tokens[self.pos].clone();
    if token.kind != TokenKind::Eof {
      self.pos += 1;
    }
    token
  }

  fn eat(&mut self, kind: TokenKind) -> Option<Token> {
    if self.at(kind) { Some(self.advance()) } else { None }
  }

  fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
    ensure!(
      self.at(kind),
      UnexpectedTokenSnafu {
        expected: kind_text(kind),
        found: self.peek().describe(),
        span: self.peek().span,
      }
    );
    Ok(self.advance())
  }

  // Program = { VarDecl ';' | FuncDecl ';' }
  fn program(&mut self) -> CompileResult<NodeId> {
    let start = self.peek().span;
    let mut decls = Vec::new();
    while !self.at(TokenKind::Eof) {
      let decl = match self.peek().kind {
        TokenKind::Var => self.var_decl(true)?,
        TokenKind::Func => self.func_decl()?,
        _ => {
          return UnexpectedTokenSnafu {
            expected: "a declaration",
            found: self.peek().describe(),
            span: self.peek().span,
          }
          .fail();
        }
      };
      self.expect(TokenKind::Semicolon)?;
      decls.push(decl);
    }
    Ok(self.ast.add(Node::with_children(NodeKind::Program, decls, start)))
  }

  // VarDecl = 'var' Ident Type
  fn var_decl(&mut self, global: bool) -> CompileResult<NodeId> {
    self.expect(TokenKind::Var)?;
    let name = self.expect(TokenKind::Ident)?;
    let span = name.span;
    let new_id = self.ast.add(Node::leaf(NodeKind::NewId, name.lexeme, span));
    let ty = self.type_name()?;
    let kind = if global { NodeKind::GlobalVar } else { NodeKind::Var };
    Ok(self.ast.add(Node::with_children(kind, vec![new_id, ty], span)))
  }

  fn type_name(&mut self) -> CompileResult<NodeId> {
    let token = self.expect(TokenKind::Ident)?;
    let span = token.span;
    Ok(self.ast.add(Node::leaf(NodeKind::TypeId, token.lexeme, span)))
  }

  // FuncDecl = 'func' Ident Signature Block
  fn func_decl(&mut self) -> CompileResult<NodeId> {
    self.expect(TokenKind::Func)?;
    let name = self.expect(TokenKind::Ident)?;
    let span = name.span;
    let new_id = self.ast.add(Node::leaf(NodeKind::NewId, name.lexeme, span));
    let sig = self.signature()?;
    let body = self.block()?;
    Ok(self.ast.add(Node::with_children(NodeKind::Func, vec![new_id, sig, body], span)))
  }

  // Signature = '(' [ Formal { ',' Formal } ] ')' [ Type ]
  //
  // A missing result type stands for "no value"; the analyzer resolves the
  // synthesized `$void` name against the universe scope.
  fn signature(&mut self) -> CompileResult<NodeId> {
    let open = self.expect(TokenKind::LParen)?;
    let mut formals = Vec::new();
    if !self.at(TokenKind::RParen) {
      loop {
        let name = self.expect(TokenKind::Ident)?;
        let span = name.span;
        let new_id = self.ast.add(Node::leaf(NodeKind::NewId, name.lexeme, span));
        let ty = self.type_name()?;
        formals.push(self.ast.add(Node::with_children(NodeKind::Formal, vec![new_id, ty], span)));
        if self.eat(TokenKind::Comma).is_none() {
          break;
        }
      }
    }
    let close = self.expect(TokenKind::RParen)?;
    let formals_node = self.ast.add(Node::with_children(NodeKind::Formals, formals, open.span));
    let result = if self.at(TokenKind::Ident) {
      self.type_name()?
    } else {
      self.ast.add(Node::leaf(NodeKind::TypeId, "$void", close.span))
    };
    Ok(self.ast.add(Node::with_children(NodeKind::Sig, vec![formals_node, result], open.span)))
  }

  // Block = '{' { Statement ';' } '}'
  fn block(&mut self) -> CompileResult<NodeId> {
    let open = self.expect(TokenKind::LBrace)?;
    let mut statements = Vec::new();
    while !self.at(TokenKind::RBrace) {
      let stmt = self.statement()?;
      self.expect(TokenKind::Semicolon)?;
      statements.push(stmt);
    }
    self.expect(TokenKind::RBrace)?;
    Ok(self.ast.add(Node::with_children(NodeKind::Block, statements, open.span)))
  }

  fn statement(&mut self) -> CompileResult<NodeId> {
    match self.peek().kind {
      TokenKind::Var => self.var_decl(false),
      TokenKind::If => self.if_stmt(),
      TokenKind::For => self.for_stmt(),
      TokenKind::LBrace => self.block(),
      TokenKind::Break => {
        let token = self.advance();
        Ok(self.ast.add(Node::new(NodeKind::Break, token.span)))
      }
      TokenKind::Return => self.return_stmt(),
      // A bare ';' is an empty statement; the caller consumes the ';'.
      TokenKind::Semicolon => Ok(self.ast.add(Node::new(NodeKind::Empty, self.peek().span))),
      _ => self.simple_stmt(),
    }
  }

  // IfStmt = 'if' Expr Block [ 'else' (IfStmt | Block) ]
  fn if_stmt(&mut self) -> CompileResult<NodeId> {
    let keyword = self.expect(TokenKind::If)?;
    let cond = self.expr()?;
    let then = self.block()?;
    let mut children = vec![cond, then];
    if let Some(else_token) = self.eat(TokenKind::Else) {
      if self.at(TokenKind::If) {
        children.push(self.if_stmt()?);
      } else {
        let body = self.block()?;
        children.push(self.ast.add(Node::with_children(NodeKind::Else, vec![body], else_token.span)));
      }
    }
    Ok(self.ast.add(Node::with_children(NodeKind::If, children, keyword.span)))
  }

  // ForStmt = 'for' [ Expr ] Block; a missing condition loops forever.
  fn for_stmt(&mut self) -> CompileResult<NodeId> {
    let keyword = self.expect(TokenKind::For)?;
    let cond = if self.at(TokenKind::LBrace) {
      self.ast.add(Node::leaf(NodeKind::Bool, "$true", keyword.span))
    } else {
      self.expr()?
    };
    let body = self.block()?;
    Ok(self.ast.add(Node::with_children(NodeKind::For, vec![cond, body], keyword.span)))
  }

  // ReturnStmt = 'return' [ Expr ]
  fn return_stmt(&mut self) -> CompileResult<NodeId> {
    let keyword = self.expect(TokenKind::Return)?;
    let mut children = Vec::new();
    if !self.at(TokenKind::Semicolon) {
      children.push(self.expr()?);
    }
    Ok(self.ast.add(Node::with_children(NodeKind::Return, children, keyword.span)))
  }

  // SimpleStmt = Expr [ '=' Expr ]
  fn simple_stmt(&mut self) -> CompileResult<NodeId> {
    let expr = self.expr()?;
    if let Some(equals) = self.eat(TokenKind::Assign) {
      let value = self.expr()?;
      return Ok(self.ast.add(Node::with_children(NodeKind::Assign, vec![expr, value], equals.span)));
    }
    Ok(expr)
  }

  fn expr(&mut self) -> CompileResult<NodeId> {
    self.or_expr()
  }

  fn or_expr(&mut self) -> CompileResult<NodeId> {
    let mut node = self.and_expr()?;
    while let Some(token) = self.eat(TokenKind::Or) {
      let rhs = self.and_expr()?;
      node = self.ast.add(Node::with_children(NodeKind::Binary(BinOp::Or), vec![node, rhs], token.span));
    }
    Ok(node)
  }

  fn and_expr(&mut self) -> CompileResult<NodeId> {
    let mut node = self.rel_expr()?;
    while let Some(token) = self.eat(TokenKind::And) {
      let rhs = self.rel_expr()?;
      node = self.ast.add(Node::with_children(NodeKind::Binary(BinOp::And), vec![node, rhs], token.span));
    }
    Ok(node)
  }

  fn rel_expr(&mut self) -> CompileResult<NodeId> {
    let mut node = self.add_expr()?;
    loop {
      let op = match self.peek().kind {
        TokenKind::Eq => BinOp::Eq,
        TokenKind::Ne => BinOp::Ne,
        TokenKind::Lt => BinOp::Lt,
        TokenKind::Le => BinOp::Le,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::Ge => BinOp::Ge,
        _ => return Ok(node),
      };
      let token = self.advance();
      let rhs = self.add_expr()?;
      node = self.ast.add(Node::with_children(NodeKind::Binary(op), vec![node, rhs], token.span));
    }
  }

  fn add_expr(&mut self) -> CompileResult<NodeId> {
    let mut node = self.mul_expr()?;
    loop {
      let op = match self.peek().kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        _ => return Ok(node),
      };
      let token = self.advance();
      let rhs = self.mul_expr()?;
      node = self.ast.add(Node::with_children(NodeKind::Binary(op), vec![node, rhs], token.span));
    }
  }

  fn mul_expr(&mut self) -> CompileResult<NodeId> {
    let mut node = self.unary_expr()?;
    loop {
      let op = match self.peek().kind {
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        _ => return Ok(node),
      };
      let token = self.advance();
      let rhs = self.unary_expr()?;
      node = self.ast.add(Node::with_children(NodeKind::Binary(op), vec![node, rhs], token.span));
    }
  }

  fn unary_expr(&mut self) -> CompileResult<NodeId> {
    let op = match self.peek().kind {
      TokenKind::Not => UnOp::Not,
      TokenKind::Minus => UnOp::Neg,
      _ => return self.operand(),
    };
    let token = self.advance();
    let operand = self.unary_expr()?;
    Ok(self.ast.add(Node::with_children(NodeKind::Unary(op), vec![operand], token.span)))
  }

  // Operand = Int | Str | Ident [ '(' Actuals ')' ] | '(' Expr ')'
  fn operand(&mut self) -> CompileResult<NodeId> {
    match self.peek().kind {
      TokenKind::Int => {
        let token = self.advance();
        let span = token.span;
        Ok(self.ast.add(Node::leaf(NodeKind::Int, token.lexeme, span)))
      }
      TokenKind::Str => {
        let token = self.advance();
        let span = token.span;
        Ok(self.ast.add(Node::leaf(NodeKind::Str, token.lexeme, span)))
      }
      TokenKind::Ident => {
        let token = self.advance();
        let span = token.span;
        let id = self.ast.add(Node::leaf(NodeKind::Id, token.lexeme, span));
        if self.at(TokenKind::LParen) {
          return self.call(id, span);
        }
        Ok(id)
      }
      TokenKind::LParen => {
        self.advance();
        let inner = self.expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(inner)
      }
      _ => ExpectedExpressionSnafu {
        found: self.peek().describe(),
        span: self.peek().span,
      }
      .fail(),
    }
  }

  fn call(&mut self, callee: NodeId, span: Span) -> CompileResult<NodeId> {
    let open = self.expect(TokenKind::LParen)?;
    let mut actuals = Vec::new();
    if !self.at(TokenKind::RParen) {
      loop {
        actuals.push(self.expr()?);
        if self.eat(TokenKind::Comma).is_none() {
          break;
        }
      }
    }
    self.expect(TokenKind::RParen)?;
    let actuals_node = self.ast.add(Node::with_children(NodeKind::Actuals, actuals, open.span));
    Ok(self.ast.add(Node::with_children(NodeKind::FuncCall, vec![callee, actuals_node], span)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{CompileError, Diagnostics};
  use crate::tokenizer::tokenize;

  fn parse_source(source: &str) -> CompileResult<(Ast, NodeId)> {
    let tokens = tokenize(source, &mut Diagnostics::new())?;
    parse(tokens)
  }

  fn tree(source: &str) -> String {
    let (ast, root) = parse_source(source).unwrap();
    ast.dump(root)
  }

  #[test]
  fn declarations_build_the_expected_shape() {
    let dump = tree("var count int\nfunc main() {\n}");
    assert_eq!(
      dump,
      "Program\n\
       \x20 GlobalVar\n\
       \x20   NewId 'count'\n\
       \x20   TypeId 'int'\n\
       \x20 Func\n\
       \x20   NewId 'main'\n\
       \x20   Sig\n\
       \x20     Formals\n\
       \x20     TypeId '$void'\n\
       \x20   Block\n"
    );
  }

  #[test]
  fn formals_and_result_type() {
    let dump = tree("func add(a int, b int) int {\n}");
    assert!(dump.contains("Formal\n          NewId 'a'\n          TypeId 'int'\n"));
    assert!(dump.contains("Formal\n          NewId 'b'\n"));
    assert!(dump.ends_with("      TypeId 'int'\n    Block\n"));
  }

  #[test]
  fn else_if_chains_nest_inside_the_if() {
    let dump = tree("func main() {\n  if a {\n  } else if b {\n  } else {\n  }\n}");
    assert_eq!(
      dump,
      "Program\n\
       \x20 Func\n\
       \x20   NewId 'main'\n\
       \x20   Sig\n\
       \x20     Formals\n\
       \x20     TypeId '$void'\n\
       \x20   Block\n\
       \x20     If\n\
       \x20       Id 'a'\n\
       \x20       Block\n\
       \x20       If\n\
       \x20         Id 'b'\n\
       \x20         Block\n\
       \x20         Else\n\
       \x20           Block\n"
    );
  }

  #[test]
  fn operator_precedence() {
    let dump = tree("func main() {\n  x = 1 + 2 * 3 == 7 || !done\n}");
    assert!(dump.contains(
      "Assign\n\
       \x20       Id 'x'\n\
       \x20       Binary(Or)\n\
       \x20         Binary(Eq)\n\
       \x20           Binary(Add)\n\
       \x20             Int '1'\n\
       \x20             Binary(Mul)\n\
       \x20               Int '2'\n\
       \x20               Int '3'\n\
       \x20           Int '7'\n\
       \x20         Unary(Not)\n\
       \x20           Id 'done'\n"
    ));
  }

  #[test]
  fn parenthesized_groups_override_precedence() {
    let dump = tree("func main() {\n  x = (1 + 2) * 3\n}");
    assert!(dump.contains(
      "Binary(Mul)\n\
       \x20         Binary(Add)\n\
       \x20           Int '1'\n\
       \x20           Int '2'\n\
       \x20         Int '3'\n"
    ));
  }

  #[test]
  fn for_without_condition_loops_on_true() {
    let dump = tree("func main() {\n  for {\n    break\n  }\n}");
    assert!(dump.contains("For\n        Bool '$true'\n        Block\n          Break\n"));
  }

  #[test]
  fn calls_wrap_the_callee_and_actuals() {
    let dump = tree("func main() {\n  f(1, g())\n}");
    assert!(dump.contains(
      "FuncCall\n\
       \x20       Id 'f'\n\
       \x20       Actuals\n\
       \x20         Int '1'\n\
       \x20         FuncCall\n\
       \x20           Id 'g'\n\
       \x20           Actuals\n"
    ));
  }

  #[test]
  fn return_takes_an_optional_value() {
    assert!(tree("func f() int {\n  return 1\n}").contains("Return\n        Int '1'\n"));
    assert!(tree("func f() {\n  return\n}").contains("Return\n"));
  }

  #[test]
  fn unary_minus_binds_tighter_than_subtraction() {
    let dump = tree("func main() {\n  x = -a - b\n}");
    assert!(dump.contains(
      "Binary(Sub)\n\
       \x20         Unary(Neg)\n\
       \x20           Id 'a'\n\
       \x20         Id 'b'\n"
    ));
  }

  #[test]
  fn top_level_statement_is_rejected() {
    let result = parse_source("x = 1\n");
    match result {
      Err(CompileError::UnexpectedToken { expected, found, .. }) => {
        assert_eq!(expected, "a declaration");
        assert_eq!(found, "'x'");
      }
      other => panic!("expected a parse error, got {other:?}"),
    }
  }

  #[test]
  fn missing_type_name_is_reported_at_the_token() {
    let result = parse_source("var x\n");
    match result {
      Err(CompileError::UnexpectedToken { expected, found, span }) => {
        assert_eq!(expected, "an identifier");
        assert_eq!(found, "';'");
        assert_eq!((span.line, span.column), (1, 6));
      }
      other => panic!("expected a parse error, got {other:?}"),
    }
  }

  #[test]
  fn dangling_operator_wants_an_expression() {
    let result = parse_source("func main() {\n  x = 1 +\n}");
    assert!(matches!(result, Err(CompileError::ExpectedExpression { .. })));
  }

  #[test]
  fn block_statements_need_semicolons() {
    let result = parse_source("func main() { x = 1 }");
    match result {
      Err(CompileError::UnexpectedToken { expected, found, .. }) => {
        assert_eq!(expected, "';'");
        assert_eq!(found, "'}'");
      }
      other => panic!("expected a parse error, got {other:?}"),
    }
  }
}
