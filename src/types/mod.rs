//! Typed-IR handle types and the arenas that own them (C2, §3.1).
//!
//! Every recursive node — expressions, patterns, types, mutabilities, definition info records —
//! lives in one `IdxVec` per kind and is addressed by one of the small `Copy` handles declared
//! here. Cycles among typed nodes (recursive types, mutually recursive functions) are fine:
//! handles give identity without ownership, so nothing needs to be boxed or reference-counted
//! just to tie a knot.

pub mod ty;
pub mod mir;
pub mod entity;
pub mod namespace;

use crate::mk_idx;

mk_idx! {
  /// Identifies a general or integral unification-variable's state cell (§3.3, §3.7).
  pub struct TypeVarTag;
}
mk_idx! {
  /// Identifies a mutability unification-variable's state cell.
  pub struct MutVarTag;
}
mk_idx! {
  /// Process-unique id of a template parameter, used as the substitution-map key during
  /// instantiation (§4.8) and minted fresh during generalisation (§4.10).
  pub struct TemplateParamTag;
}
mk_idx! {
  /// Process-unique id of a local variable (`let`/parameter binding), carried through to
  /// reification for frame-offset computation (§4.10).
  pub struct LocalVarTag;
}

mk_idx! { /// Handle into the type-node arena. pub struct TypeHandle; }
mk_idx! { /// Handle into the mutability-node arena. pub struct MutHandle; }
mk_idx! { /// Handle into the typed-expression arena. pub struct ExprHandle; }
mk_idx! { /// Handle into the typed-pattern arena. pub struct PatHandle; }
mk_idx! { /// Handle into the namespace arena (C3). pub struct NamespaceId; }

mk_idx! { pub struct FunctionInfoId; }
mk_idx! { pub struct FunctionTemplateInfoId; }
mk_idx! { pub struct StructInfoId; }
mk_idx! { pub struct StructTemplateInfoId; }
mk_idx! { pub struct EnumInfoId; }
mk_idx! { pub struct EnumTemplateInfoId; }
mk_idx! { pub struct AliasInfoId; }
mk_idx! { pub struct AliasTemplateInfoId; }
mk_idx! { pub struct TypeclassInfoId; }
mk_idx! { pub struct TypeclassTemplateInfoId; }
mk_idx! { pub struct ImplInfoId; }
mk_idx! { pub struct ImplTemplateInfoId; }
mk_idx! { pub struct InstInfoId; }
mk_idx! { pub struct InstTemplateInfoId; }

/// Integer primitive width/signedness, shared between the type system and literal reification.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum IntTy { I8, I16, I32, I64, U8, U16, U32, U64 }

impl IntTy {
  #[must_use] pub fn is_signed(self) -> bool {
    matches!(self, IntTy::I8 | IntTy::I16 | IntTy::I32 | IntTy::I64)
  }
  #[must_use] pub fn size_bytes(self) -> u32 {
    match self {
      IntTy::I8 | IntTy::U8 => 1,
      IntTy::I16 | IntTy::U16 => 2,
      IntTy::I32 | IntTy::U32 => 4,
      IntTy::I64 | IntTy::U64 => 8,
    }
  }
  /// Inclusive value range, used for the overflow check at reification (§4.10, §9).
  #[must_use] pub fn range(self) -> (num::BigInt, num::BigInt) {
    use num::BigInt;
    let bits = self.size_bytes() * 8;
    if self.is_signed() {
      let half = BigInt::from(1) << (bits - 1);
      (-half.clone(), half - 1)
    } else {
      (BigInt::from(0), (BigInt::from(1) << bits) - 1)
    }
  }
}
