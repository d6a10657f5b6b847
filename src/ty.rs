use std::fmt;

/// Type signature of a bound name or an expression. `Func` encodes only the
/// parameter list; a callable's return type lives in its record's `rt_sig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sig {
  /// Placeholder for a forward declaration that has not been resolved yet.
  None,
  Void,
  Bool,
  Int,
  Str,
  Func(Vec<Sig>),
}

impl Sig {
  pub fn is_func(&self) -> bool {
    matches!(self, Sig::Func(_))
  }
}

impl fmt::Display for Sig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Sig::None => Ok(()),
      Sig::Void => f.write_str("void"),
      Sig::Bool => f.write_str("bool"),
      Sig::Int => f.write_str("int"),
      Sig::Str => f.write_str("str"),
      Sig::Func(params) => {
        f.write_str("f(")?;
        for (i, param) in params.iter().enumerate() {
          if i > 0 {
            f.write_str(",")?;
          }
          write!(f, "{param}")?;
        }
        f.write_str(")")
      }
    }
  }
}
