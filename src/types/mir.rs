//! The typed expression/pattern arena (C2, §3.4): the output form produced by the elaborator.
//!
//! Every node carries its own span and resolved type; place mutability and the purity/
//! addressability flags ride along on expressions specifically, since those properties only
//! make sense for something you can evaluate or take the address of.

use crate::hir::Literal;
use crate::idx::IdxVec;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::ty::{TypeValue, MutValue};
use crate::types::{ExprHandle, PatHandle, LocalVarTag, EnumInfoId, StructInfoId, FunctionInfoId};

#[derive(Clone, Debug)]
pub struct MatchArm {
  pub pattern: PatHandle,
  pub body: ExprHandle,
}

#[derive(Clone, Debug)]
pub enum FieldAccessKind {
  Named(Symbol),
  Tuple(usize),
}

#[derive(Clone, Debug)]
pub enum ExprKind {
  Literal(Literal),
  Tuple(Vec<ExprHandle>),
  ArrayLiteral(Vec<ExprHandle>),
  /// A block's type, mutability and addressability follow the tail; `is_pure` is the
  /// conjunction of every child's purity (§4.6).
  Block { effects: Vec<ExprHandle>, result: ExprHandle },
  /// A plain `loop`'s type is the join of every `break` it directly contains; lowered
  /// `while`/`for` bodies require their breaks to carry unit (§4.6).
  Loop { label: Option<Symbol>, body: ExprHandle },
  Break { label: Option<Symbol>, result: Option<ExprHandle> },
  Continue { label: Option<Symbol> },
  If { cond: ExprHandle, then_branch: ExprHandle, else_branch: Option<ExprHandle> },
  Match { scrutinee: ExprHandle, arms: Vec<MatchArm> },
  Let { pattern: PatHandle, init: ExprHandle },
  LocalAlias { name: Symbol, ty: TypeValue },
  Reference { mutability: MutValue, operand: ExprHandle },
  Dereference(ExprHandle),
  /// Only constructed while `current_safety_status == unsafe` (§4.6).
  UnsafeDereference(ExprHandle),
  Addressof(ExprHandle),
  Move(ExprHandle),
  Sizeof(TypeValue),
  Invocation { callee: ExprHandle, args: Vec<ExprHandle> },
  EnumCtorRef { info: EnumInfoId, ctor: Symbol },
  EnumCtorInvocation { info: EnumInfoId, ctor: Symbol, payload: ExprHandle },
  FunctionRef { info: FunctionInfoId, is_application: bool },
  LocalVarRef(LocalVarTag),
  StructInit { info: StructInfoId, fields: Vec<(Symbol, ExprHandle)> },
  FieldAccess { base: ExprHandle, field: FieldAccessKind },
  SelfValue,
  Hole,
  /// A placeholder recorded after a sub-expression failed to elaborate, so that elaboration of
  /// the enclosing expression can continue and surface further independent diagnostics (§7).
  Error,
}

bitflags::bitflags! {
  /// Derived properties of a typed expression node, used by the block/loop/reference rules in
  /// §4.6. Both bits only make sense for something evaluable, so they travel together rather
  /// than as two independent booleans.
  #[derive(Copy, Clone, PartialEq, Eq, Debug)]
  pub struct ExprFlags: u8 {
    /// Has an observable address: an l-value. Required by `&`, `&mut`, `addressof`, `move`.
    const ADDRESSABLE = 1 << 0;
    /// Free of side effects and non-local control flow. A block warns if a non-tail, non-unit
    /// side effect expression has this set (§4.6: "pure side-effect has no effect").
    const PURE        = 1 << 1;
  }
}

/// A fully typed expression node (§3.4): variant, type, span, place mutability, and the
/// derived flags used by the block/loop/reference rules in §4.6.
#[derive(Clone, Debug)]
pub struct Expression {
  pub kind: ExprKind,
  pub ty: TypeValue,
  pub span: Span,
  pub place_mutability: MutValue,
  pub flags: ExprFlags,
}

impl Expression {
  #[must_use] pub fn is_addressable(&self) -> bool { self.flags.contains(ExprFlags::ADDRESSABLE) }
  #[must_use] pub fn is_pure(&self) -> bool { self.flags.contains(ExprFlags::PURE) }
}

#[derive(Clone, Debug)]
pub enum PatKind {
  Wildcard,
  Literal(Literal),
  Name { var: LocalVarTag, mutability: MutValue },
  Tuple(Vec<PatHandle>),
  Slice(Vec<PatHandle>),
  Ctor { info: EnumInfoId, ctor: Symbol, payload: Option<PatHandle> },
  As(PatHandle, LocalVarTag),
  Guarded(PatHandle, ExprHandle),
  Error,
}

/// A fully typed pattern node. `is_exhaustive_by_itself` is true iff the pattern matches every
/// value of its type; `let`-bound patterns and function parameters must satisfy this (§3.4).
#[derive(Clone, Debug)]
pub struct Pattern {
  pub kind: PatKind,
  pub ty: TypeValue,
  pub span: Span,
  pub is_exhaustive_by_itself: bool,
}

/// The arena backing every typed expression and pattern node produced during resolution.
#[derive(Default)]
pub struct MirArena {
  pub exprs: IdxVec<ExprHandle, Expression>,
  pub pats: IdxVec<PatHandle, Pattern>,
}

impl MirArena {
  #[must_use] pub fn new() -> Self { Self::default() }
  pub fn alloc_expr(&mut self, e: Expression) -> ExprHandle { self.exprs.push(e) }
  pub fn alloc_pat(&mut self, p: Pattern) -> PatHandle { self.pats.push(p) }
}
