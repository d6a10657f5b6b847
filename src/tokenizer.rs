//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows two things beyond plain scanning. First, the
//! language is newline-sensitive in the Go style: a line break inserts a
//! semicolon when the previous token could end a statement. Second, string
//! escapes are validated here but kept *encoded* in the lexeme; decoding
//! happens when the code generator lays the literal out as bytes.

use crate::error::{
  BitwiseOperatorSnafu, CompileResult, Diagnostics, MultilineStringSnafu, Span,
  UnknownEscapeSnafu, UnterminatedStringSnafu,
};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  LBrace,
  RBrace,
  LParen,
  RParen,
  Semicolon,
  Comma,
  Or,
  And,
  Not,
  Ne,
  Assign,
  Eq,
  Gt,
  Ge,
  Lt,
  Le,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  Ident,
  Int,
  Str,
  Break,
  Else,
  For,
  Func,
  If,
  Return,
  Var,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages. String
/// tokens hold the text between the quotes, escapes still encoded.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub span: Span,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      span,
    }
  }

  /// Human-friendly rendering used in diagnostics.
  pub fn describe(&self) -> String {
    match self.kind {
      TokenKind::Eof => "end of file".to_string(),
      TokenKind::Str => format!("\"{}\"", self.lexeme),
      _ => format!("'{}'", self.lexeme),
    }
  }
}

/// Spelling of a token kind, for "expected X" messages.
pub fn kind_text(kind: TokenKind) -> &'static str {
  match kind {
    TokenKind::LBrace => "'{'",
    TokenKind::RBrace => "'}'",
    TokenKind::LParen => "'('",
    TokenKind::RParen => "')'",
    TokenKind::Semicolon => "';'",
    TokenKind::Comma => "','",
    TokenKind::Or => "'||'",
    TokenKind::And => "'&&'",
    TokenKind::Not => "'!'",
    TokenKind::Ne => "'!='",
    TokenKind::Assign => "'='",
    TokenKind::Eq => "'=='",
    TokenKind::Gt => "'>'",
    TokenKind::Ge => "'>='",
    TokenKind::Lt => "'<'",
    TokenKind::Le => "'<='",
    TokenKind::Plus => "'+'",
    TokenKind::Minus => "'-'",
    TokenKind::Star => "'*'",
    TokenKind::Slash => "'/'",
    TokenKind::Percent => "'%'",
    TokenKind::Ident => "an identifier",
    TokenKind::Int => "an integer literal",
    TokenKind::Str => "a string literal",
    TokenKind::Break => "'break'",
    TokenKind::Else => "'else'",
    TokenKind::For => "'for'",
    TokenKind::Func => "'func'",
    TokenKind::If => "'if'",
    TokenKind::Return => "'return'",
    TokenKind::Var => "'var'",
    TokenKind::Eof => "end of file",
  }
}

/// A newline becomes a semicolon after any token that can end a statement.
fn wants_semicolon(last: Option<&Token>) -> bool {
  matches!(
    last.map(|token| token.kind),
    Some(
      TokenKind::Ident
        | TokenKind::Int
        | TokenKind::Str
        | TokenKind::Break
        | TokenKind::Return
        | TokenKind::RParen
        | TokenKind::RBrace
    )
  )
}

/// Lex the input into a flat vector of tokens terminated by an `Eof`
/// marker. Unknown characters are skipped with a warning.
pub fn tokenize(source: &str, diagnostics: &mut Diagnostics) -> CompileResult<Vec<Token>> {
  let bytes = source.as_bytes();
  let mut tokens: Vec<Token> = Vec::new();
  let mut i = 0;
  let mut line = 1;
  let mut column = 1;

  while i < bytes.len() {
    let c = bytes[i];

    if c == b'\n' {
      if wants_semicolon(tokens.last()) {
        tokens.push(Token::new(TokenKind::Semicolon, ";", Span::new(line, column, 1)));
      }
      i += 1;
      line += 1;
      column = 1;
      continue;
    }

    if c.is_ascii_whitespace() {
      i += 1;
      column += 1;
      continue;
    }

    // Line comments run to the newline but leave it in place so the
    // semicolon rule above still fires.
    if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
      while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
        column += 1;
      }
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &source[start..i];
      tokens.push(Token::new(TokenKind::Int, text, Span::new(line, column, text.len())));
      column += text.len();
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let text = &source[start..i];
      let kind = match text {
        "break" => TokenKind::Break,
        "else" => TokenKind::Else,
        "for" => TokenKind::For,
        "func" => TokenKind::Func,
        "if" => TokenKind::If,
        "return" => TokenKind::Return,
        "var" => TokenKind::Var,
        _ => TokenKind::Ident,
      };
      tokens.push(Token::new(kind, text, Span::new(line, column, text.len())));
      column += text.len();
      continue;
    }

    if c == b'"' {
      let start_column = column;
      let content_start = i + 1;
      i += 1;
      column += 1;
      loop {
        match bytes.get(i) {
          None => {
            return UnterminatedStringSnafu {
              span: Span::new(line, start_column, column - start_column),
            }
            .fail();
          }
          Some(b'\n') => {
            return MultilineStringSnafu {
              span: Span::new(line, start_column, column - start_column),
            }
            .fail();
          }
          Some(b'"') => {
            let text = &source[content_start..i];
            i += 1;
            column += 1;
            tokens.push(Token::new(
              TokenKind::Str,
              text,
              Span::new(line, start_column, column - start_column),
            ));
            break;
          }
          Some(b'\\') => match bytes.get(i + 1) {
            Some(b'b' | b't' | b'n' | b'f' | b'r' | b'"' | b'\'' | b'\\') => {
              i += 2;
              column += 2;
            }
            Some(&other) => {
              return UnknownEscapeSnafu {
                escape: other as char,
                span: Span::new(line, column, 2),
              }
              .fail();
            }
            None => {
              return UnterminatedStringSnafu {
                span: Span::new(line, start_column, column - start_column),
              }
              .fail();
            }
          },
          Some(_) => {
            i += 1;
            column += 1;
          }
        }
      }
      continue;
    }

    let next_is = |b: u8| bytes.get(i + 1) == Some(&b);
    let (kind, len) = match c {
      b'{' => (TokenKind::LBrace, 1),
      b'}' => (TokenKind::RBrace, 1),
      b'(' => (TokenKind::LParen, 1),
      b')' => (TokenKind::RParen, 1),
      b';' => (TokenKind::Semicolon, 1),
      b',' => (TokenKind::Comma, 1),
      b'+' => (TokenKind::Plus, 1),
      b'-' => (TokenKind::Minus, 1),
      b'*' => (TokenKind::Star, 1),
      b'/' => (TokenKind::Slash, 1),
      b'%' => (TokenKind::Percent, 1),
      b'|' if next_is(b'|') => (TokenKind::Or, 2),
      b'|' => {
        return BitwiseOperatorSnafu {
          op: '|',
          span: Span::new(line, column, 1),
        }
        .fail();
      }
      b'&' if next_is(b'&') => (TokenKind::And, 2),
      b'&' => {
        return BitwiseOperatorSnafu {
          op: '&',
          span: Span::new(line, column, 1),
        }
        .fail();
      }
      b'=' if next_is(b'=') => (TokenKind::Eq, 2),
      b'=' => (TokenKind::Assign, 1),
      b'!' if next_is(b'=') => (TokenKind::Ne, 2),
      b'!' => (TokenKind::Not, 1),
      b'<' if next_is(b'=') => (TokenKind::Le, 2),
      b'<' => (TokenKind::Lt, 1),
      b'>' if next_is(b'=') => (TokenKind::Ge, 2),
      b'>' => (TokenKind::Gt, 1),
      _ => {
        let ch = source[i..].chars().next().unwrap_or('\u{fffd}');
        diagnostics.warn(Span::new(line, column, 1), format!("unknown character '{ch}'"))?;
        i += ch.len_utf8();
        column += 1;
        continue;
      }
    };
    tokens.push(Token::new(kind, &source[i..i + len], Span::new(line, column, len)));
    i += len;
    column += len;
  }

  // Files rarely end in a newline when fed from tests; treat end of input
  // like one.
  if wants_semicolon(tokens.last()) {
    tokens.push(Token::new(TokenKind::Semicolon, ";", Span::new(line, column, 1)));
  }
  tokens.push(Token::new(TokenKind::Eof, "", Span::new(line, column, 1)));
  Ok(tokens)
}
