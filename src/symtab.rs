//! Scoped symbol table shared by the semantic passes.
//!
//! Records live in one flat arena so a binding can be referred to by index
//! after its scope is gone. Scopes are a stack of name-to-record maps; the
//! bottom scope holds the universe and is never popped.

use std::collections::HashMap;

use crate::ty::Sig;

/// Index of a record in the table's arena.
pub type RecordId = usize;

/// Everything the analyzer knows about one name.
#[derive(Debug, Clone)]
pub struct Record {
  /// Signature of the name itself; `Sig::Func` for functions.
  pub sig: Sig,
  /// Return signature, meaningful only for functions.
  pub rt_sig: Sig,
  pub is_const: bool,
  pub is_type: bool,
}

impl Record {
  pub fn var(sig: Sig) -> Self {
    Self {
      sig,
      rt_sig: Sig::None,
      is_const: false,
      is_type: false,
    }
  }

  pub fn constant(sig: Sig) -> Self {
    Self {
      sig,
      rt_sig: Sig::None,
      is_const: true,
      is_type: false,
    }
  }

  pub fn ty(sig: Sig) -> Self {
    Self {
      sig,
      rt_sig: Sig::None,
      is_const: false,
      is_type: true,
    }
  }

  pub fn func(params: Vec<Sig>, ret: Sig) -> Self {
    Self {
      sig: Sig::Func(params),
      rt_sig: ret,
      is_const: false,
      is_type: false,
    }
  }

  /// Reserves a name before its signature is known. The forward
  /// declaration pass fills the record in afterwards.
  pub fn placeholder() -> Self {
    Self {
      sig: Sig::None,
      rt_sig: Sig::None,
      is_const: false,
      is_type: false,
    }
  }
}

#[derive(Debug)]
pub struct SymbolTable {
  records: Vec<Record>,
  scopes: Vec<HashMap<String, RecordId>>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self {
      records: Vec::new(),
      scopes: vec![HashMap::new()],
    }
  }

  pub fn open_scope(&mut self) {
    self.scopes.push(HashMap::new());
  }

  pub fn close_scope(&mut self) {
    assert!(self.scopes.len() > 1, "cannot pop the universe scope");
    self.scopes.pop();
  }

  /// Adds a record under `name` in the innermost scope. Returns `None`
  /// when the name is already taken there; shadowing an outer scope is
  /// fine.
  pub fn define(&mut self, name: &str, record: Record) -> Option<RecordId> {
    let scope = self.scopes.len() - 1;
    if self.scopes[scope].contains_key(name) {
      return None;
    }
    let id = self.records.len();
    self.records.push(record);
    self.scopes[scope].insert(name.to_string(), id);
    Some(id)
  }

  /// Resolves `name` from the innermost scope outwards.
  pub fn lookup(&self, name: &str) -> Option<RecordId> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.get(name).copied())
  }

  pub fn record(&self, id: RecordId) -> &Record {
    &self.records[id]
  }

  pub fn record_mut(&mut self, id: RecordId) -> &mut Record {
    &mut self.records[id]
  }

  pub fn depth(&self) -> usize {
    self.scopes.len()
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}
