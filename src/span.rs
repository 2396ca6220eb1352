//! Source spans (§3.2). Spans are carried on every node for diagnostics only; nothing in the
//! resolver branches on span contents.

use std::rc::Rc;

/// A source file, identified by its path. Cheaply cloneable since most spans in a compilation
/// unit share the same file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FileId(pub Rc<str>);

/// A half-open source span `(file, start_line, start_col, end_line, end_col)`.
///
/// Spans are never semantically load-bearing: two otherwise-equal nodes with different spans
/// are the same node as far as unification and instantiation are concerned.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Span {
  pub file: FileId,
  pub start_line: u32,
  pub start_col: u32,
  pub end_line: u32,
  pub end_col: u32,
}

impl Span {
  #[must_use] pub fn new(file: FileId, start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
    Self { file, start_line, start_col, end_line, end_col }
  }
}
