//! String & literal interning (C1). Both identifiers and string literals are interned into a
//! single process-wide pool; equality between two `Symbol`s is an integer comparison, and
//! recovering the text requires going back through the pool.

use std::cell::RefCell;
use hashbrown::HashMap;

/// An interned string. Cheap to copy, cheap to compare; two `Symbol`s are equal iff the text
/// they denote is equal, because [`Interner::intern`] deduplicates.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    with_interner(|i| write!(f, "{:?}", i.resolve(*self)))
  }
}

impl Symbol {
  /// Every interner reserves slot 0 for the empty/placeholder identifier `_`, so that
  /// wildcard patterns and unnamed template parameters don't need an `Option`.
  pub const UNDER: Symbol = Symbol(0);

  #[must_use] pub fn as_str(self) -> String { with_interner(|i| i.resolve(self).to_owned()) }

  #[must_use] pub fn starts_with_underscore(self) -> bool {
    with_interner(|i| i.resolve(self).starts_with('_'))
  }
}

/// The string pool itself. One per compilation; identifiers and literals share the same table
/// since both are just immutable text.
pub struct Interner {
  map: HashMap<Box<str>, Symbol>,
  strings: Vec<Box<str>>,
}

impl Default for Interner {
  fn default() -> Self {
    let mut i = Self { map: HashMap::new(), strings: Vec::new() };
    let sym = i.intern("_");
    debug_assert_eq!(sym, Symbol::UNDER);
    i
  }
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let sym = Symbol(self.strings.len() as u32);
    self.strings.push(s.into());
    self.map.insert(s.into(), sym);
    sym
  }

  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str { &self.strings[sym.0 as usize] }
}

thread_local! {
  static INTERNER: RefCell<Interner> = RefCell::new(Interner::new());
}

fn with_interner<R>(f: impl FnOnce(&Interner) -> R) -> R {
  INTERNER.with(|i| f(&i.borrow()))
}

/// Intern a string into the process-wide pool.
pub fn intern(s: &str) -> Symbol {
  INTERNER.with(|i| i.borrow_mut().intern(s))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_deduplicates() {
    let a = intern("foo");
    let b = intern("foo");
    assert_eq!(a, b);
    assert_ne!(a, intern("bar"));
  }

  #[test]
  fn underscore_detection() {
    assert!(intern("_x").starts_with_underscore());
    assert!(!intern("x").starts_with_underscore());
  }
}
