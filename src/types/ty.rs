//! Type and mutability value objects (C5, §3.3).
//!
//! A *value* (`TypeValue`/`MutValue`) is a handle into the corresponding arena plus the span it
//! was written at (or synthesized at, for machine-generated types). `pure_value` looks up the
//! bare variant; `flattened_value` additionally chases a chain of solved unification-variable
//! states to the canonical underlying variant, compressing the chain as it goes.

use crate::idx::IdxVec;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::{TypeHandle, MutHandle, TypeVarTag, MutVarTag, TemplateParamTag, IntTy, ExprHandle, StructInfoId, EnumInfoId};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TypeVarKind { General, Integral }

/// `{ handle, span }`: a reference to a type node plus the span it was mentioned at.
#[derive(Clone, Debug)]
pub struct TypeValue {
  pub handle: TypeHandle,
  pub span: Span,
}

/// `{ handle, span }`: a reference to a mutability node plus the span it was mentioned at.
#[derive(Clone, Debug)]
pub struct MutValue {
  pub handle: MutHandle,
  pub span: Span,
}

impl TypeValue {
  #[must_use] pub fn at(handle: TypeHandle, span: Span) -> Self { Self { handle, span } }
}
impl MutValue {
  #[must_use] pub fn at(handle: MutHandle, span: Span) -> Self { Self { handle, span } }
}

/// The length of an array type, `[T; N]`: a value-typed expression handle, not a constant —
/// full value evaluation is a non-goal (§4.4); equality of lengths is structural (same handle
/// or, after instantiation, the same re-substituted expression).
#[derive(Clone, Debug)]
pub struct ArrayLen {
  pub expr: ExprHandle,
  pub ty: TypeValue,
}

#[derive(Clone, Debug)]
pub enum TypeVariant {
  SignedInt(IntTy),
  UnsignedInt(IntTy),
  Floating,
  Character,
  Boolean,
  Str,
  Tuple(Vec<TypeValue>),
  Array(TypeValue, ArrayLen),
  Slice(TypeValue),
  Pointer { mutability: MutValue, pointee: TypeValue },
  Reference { mutability: MutValue, referent: TypeValue },
  Function { params: Vec<TypeValue>, ret: TypeValue },
  Structure { info: StructInfoId, is_application: bool },
  Enumeration { info: EnumInfoId, is_application: bool },
  /// Valid only inside typeclass / impl / inst blocks (§3.8).
  SelfPlaceholder,
  TemplateParameterRef { identifier: Option<Symbol>, tag: TemplateParamTag },
  Variable(TypeVarKind, TypeVarTag),
  /// A type that already failed to resolve; suppresses cascading diagnostics.
  Error,
}

#[derive(Clone, Debug)]
pub enum MutVariant {
  Concrete { is_mutable: bool },
  Parameterized { identifier: Option<Symbol>, tag: TemplateParamTag },
  Variable(MutVarTag),
}

/// `Unsolved { tag, class_constraints? } | Solved { solution }` (§3.3). Monotone: once Solved,
/// never rewritten (§3.8).
#[derive(Clone, Debug)]
pub enum TypeVarState {
  Unsolved { kind: TypeVarKind, class_constraints: Vec<crate::hir::QualifiedName> },
  Solved(TypeValue),
}

#[derive(Clone, Debug)]
pub enum MutVarState {
  Unsolved,
  Solved(MutValue),
}

impl TypeVarState {
  #[must_use] pub fn is_solved(&self) -> bool { matches!(self, TypeVarState::Solved(_)) }
  /// Panics if already solved: a solved state is never rewritten (§3.8, an invariant the
  /// unification engine itself is responsible for upholding).
  pub fn solve(&mut self, solution: TypeValue) -> Vec<crate::hir::QualifiedName> {
    match std::mem::replace(self, TypeVarState::Solved(solution)) {
      TypeVarState::Unsolved { class_constraints, .. } => class_constraints,
      TypeVarState::Solved(_) => unreachable!("variable state solved twice"),
    }
  }
}

/// The arenas that own every type, mutability, and unification-variable-state node produced
/// during one compilation (C2, C5). Allocation is monotone; handles obtained from one of the
/// `alloc_*`/`fresh_*` methods remain valid for the arena's whole lifetime.
#[derive(Default)]
pub struct TyArena {
  types: IdxVec<TypeHandle, TypeVariant>,
  muts: IdxVec<MutHandle, MutVariant>,
  pub type_vars: IdxVec<TypeVarTag, TypeVarState>,
  pub mut_vars: IdxVec<MutVarTag, MutVarState>,
}

impl TyArena {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn alloc_type(&mut self, variant: TypeVariant, span: Span) -> TypeValue {
    TypeValue::at(self.types.push(variant), span)
  }
  pub fn alloc_mut(&mut self, variant: MutVariant, span: Span) -> MutValue {
    MutValue::at(self.muts.push(variant), span)
  }

  pub fn fresh_type_var(&mut self, kind: TypeVarKind, class_constraints: Vec<crate::hir::QualifiedName>, span: Span) -> TypeValue {
    let tag = self.type_vars.push(TypeVarState::Unsolved { kind, class_constraints });
    self.alloc_type(TypeVariant::Variable(kind, tag), span)
  }
  pub fn fresh_mut_var(&mut self, span: Span) -> MutValue {
    let tag = self.mut_vars.push(MutVarState::Unsolved);
    self.alloc_mut(MutVariant::Variable(tag), span)
  }

  /// `pure_value`: the bare variant, with no chain-chasing.
  #[must_use] pub fn pure_type(&self, v: &TypeValue) -> &TypeVariant { &self.types[v.handle] }
  #[must_use] pub fn pure_mut(&self, v: &MutValue) -> &MutVariant { &self.muts[v.handle] }

  /// `flattened_value`: chase a chain of solved unification states to the canonical variant,
  /// compressing the chain in place as we go so later lookups are O(1) (§3.3, §9).
  pub fn flatten_type(&mut self, v: &TypeValue) -> TypeVariant {
    let mut current = v.clone();
    let mut chased_tags = Vec::new();
    loop {
      match self.pure_type(&current).clone() {
        TypeVariant::Variable(_, tag) => {
          match &self.type_vars[tag] {
            TypeVarState::Solved(sol) => {
              // Tolerate a cycle of solved variables (§4.4): stop at the first repeated tag.
              if chased_tags.contains(&tag) { return TypeVariant::Variable(TypeVarKind::General, tag) }
              chased_tags.push(tag);
              current = sol.clone();
            }
            TypeVarState::Unsolved { kind, .. } => return TypeVariant::Variable(*kind, tag),
          }
        }
        other => {
          if current.handle != v.handle {
            // Path compression: point the original handle's node directly at the final result.
            self.types[v.handle] = other.clone();
          }
          return other;
        }
      }
    }
  }

  pub fn flatten_mut(&mut self, v: &MutValue) -> MutVariant {
    let mut current = v.clone();
    let mut chased = Vec::new();
    loop {
      match self.pure_mut(&current).clone() {
        MutVariant::Variable(tag) => match &self.mut_vars[tag] {
          MutVarState::Solved(sol) => {
            if chased.contains(&tag) { return MutVariant::Variable(tag) }
            chased.push(tag);
            current = sol.clone();
          }
          MutVarState::Unsolved => return MutVariant::Variable(tag),
        },
        other => {
          if current.handle != v.handle { self.muts[v.handle] = other.clone() }
          return other;
        }
      }
    }
  }

  #[must_use] pub fn unit_type(&mut self, span: Span) -> TypeValue { self.alloc_type(TypeVariant::Tuple(vec![]), span) }
  #[must_use] pub fn bool_type(&mut self, span: Span) -> TypeValue { self.alloc_type(TypeVariant::Boolean, span) }
  #[must_use] pub fn concrete_mut(&mut self, is_mutable: bool, span: Span) -> MutValue {
    self.alloc_mut(MutVariant::Concrete { is_mutable }, span)
  }
}
