//! Type and mutability unification (C6, §4.4): the core constraint solver.
//!
//! A single call to [`unify_types`]/[`unify_mutabilities`] either succeeds — at which point its
//! pending variable solutions are committed according to `do_destructive_unification` and
//! `gather_variable_solutions` — or fails, in which case nothing it touched is written anywhere:
//! no variable is solved, no deferred constraint stays queued, no soft solution is recorded.
//! Recursive sub-unifications (struct fields, tuple elements, reference targets) accumulate their
//! pending writes into one map for the whole top-level call, so a failure partway through a
//! composite type discards everything, not just the failing piece.

use crate::context::{Context, Explanation, InstanceConstraint, MutEquality, TypeEquality};
use crate::types::entity::TemplateArgumentValue;
use crate::types::ty::{MutValue, MutVarState, MutVariant, TypeValue, TypeVarKind, TypeVariant};
use crate::types::{MutVarTag, TypeVarTag};

#[derive(Copy, Clone)]
pub struct UnifyOptions {
  pub allow_coercion: bool,
  pub do_destructive_unification: bool,
  pub gather_variable_solutions: bool,
}

impl UnifyOptions {
  /// The usual mode: solve for real, commit the result.
  #[must_use] pub fn destructive() -> Self {
    Self { allow_coercion: true, do_destructive_unification: true, gather_variable_solutions: true }
  }
  /// Used by method/instance lookup (C11): a yes/no probe that never writes anything, win or
  /// lose.
  #[must_use] pub fn pure_speculative() -> Self {
    Self { allow_coercion: true, do_destructive_unification: false, gather_variable_solutions: false }
  }
}

enum Pending {
  Type(TypeVarTag, TypeValue),
  Mut(MutVarTag, MutValue),
}

#[derive(Default)]
struct DestructiveMap(Vec<Pending>);

impl DestructiveMap {
  fn solve_type(&mut self, opts: &UnifyOptions, tag: TypeVarTag, solution: TypeValue) {
    if opts.do_destructive_unification || opts.gather_variable_solutions {
      self.0.push(Pending::Type(tag, solution));
    }
  }
  fn solve_mut(&mut self, opts: &UnifyOptions, tag: MutVarTag, solution: MutValue) {
    if opts.do_destructive_unification || opts.gather_variable_solutions {
      self.0.push(Pending::Mut(tag, solution));
    }
  }

  /// Applied only once the whole top-level attempt has succeeded; on failure this map is simply
  /// dropped, so nothing in it is ever written regardless of `do_destructive_unification`.
  fn apply(self, ctx: &mut Context, opts: &UnifyOptions) {
    for p in self.0 {
      match p {
        Pending::Type(tag, sol) => {
          if opts.do_destructive_unification && !ctx.ty.type_vars[tag].is_solved() {
            let freed = ctx.ty.type_vars[tag].solve(sol.clone());
            for class in freed {
              ctx.deferred.instances.push(InstanceConstraint {
                ty: sol.clone(),
                class,
                explanation: Explanation { span: sol.span.clone(), note: "bound on this type variable".into() },
              });
            }
          }
          if opts.gather_variable_solutions {
            ctx.solutions.types.insert(tag, sol);
          }
        }
        Pending::Mut(tag, sol) => {
          if opts.do_destructive_unification && matches!(ctx.ty.mut_vars[tag], MutVarState::Unsolved) {
            ctx.ty.mut_vars[tag] = MutVarState::Solved(sol.clone());
          }
          if opts.gather_variable_solutions {
            ctx.solutions.mutabilities.insert(tag, sol);
          }
        }
      }
    }
  }
}

/// Does a type-variable tag occur anywhere in `ty`? Guards against constructing an infinite type
/// like `T = (T, i32)` (§4.4).
fn occurs_in_type(ctx: &mut Context, tag: TypeVarTag, ty: &TypeValue) -> bool {
  match ctx.ty.flatten_type(ty) {
    TypeVariant::Variable(_, t) => t == tag,
    TypeVariant::Array(elem, len) => occurs_in_type(ctx, tag, &elem) || occurs_in_type(ctx, tag, &len.ty),
    TypeVariant::Slice(elem) => occurs_in_type(ctx, tag, &elem),
    TypeVariant::Tuple(fields) => fields.iter().any(|f| occurs_in_type(ctx, tag, f)),
    TypeVariant::Function { params, ret } => params.iter().any(|p| occurs_in_type(ctx, tag, p)) || occurs_in_type(ctx, tag, &ret),
    TypeVariant::Reference { referent, .. } => occurs_in_type(ctx, tag, &referent),
    TypeVariant::Pointer { pointee, .. } => occurs_in_type(ctx, tag, &pointee),
    TypeVariant::Structure { info, is_application } => {
      if !is_application { return false }
      let Some(inst) = ctx.structs[info].template_instantiation_info.clone() else { return false };
      inst.template_arguments.iter().any(|a| occurs_in_template_argument(ctx, tag, a))
    }
    TypeVariant::Enumeration { info, is_application } => {
      if !is_application { return false }
      let Some(inst) = ctx.enums[info].template_instantiation_info.clone() else { return false };
      inst.template_arguments.iter().any(|a| occurs_in_template_argument(ctx, tag, a))
    }
    TypeVariant::SignedInt(_) | TypeVariant::UnsignedInt(_) | TypeVariant::Floating | TypeVariant::Character
    | TypeVariant::Boolean | TypeVariant::Str | TypeVariant::SelfPlaceholder
    | TypeVariant::TemplateParameterRef { .. } | TypeVariant::Error => false,
  }
}

fn occurs_in_template_argument(ctx: &mut Context, tag: TypeVarTag, arg: &TemplateArgumentValue) -> bool {
  match arg {
    TemplateArgumentValue::Type(t) => occurs_in_type(ctx, tag, t),
    TemplateArgumentValue::Mutability(_) | TemplateArgumentValue::Value(_) => false,
  }
}

fn unify_mutabilities_rec(
  ctx: &mut Context,
  constrainer: &MutValue,
  constrained: &MutValue,
  original: &MutEquality,
  opts: &UnifyOptions,
  dmap: &mut DestructiveMap,
) -> bool {
  let lf = ctx.ty.flatten_mut(constrainer);
  let rf = ctx.ty.flatten_mut(constrained);
  match (lf, rf) {
    (MutVariant::Variable(lt), MutVariant::Variable(rt)) => {
      if lt == rt {
        true
      } else if original.is_deferred {
        // A deferred mutability constraint that is still unresolved on retry defaults both
        // sides to `immut` rather than deferring forever (§4.5).
        let imm_l = ctx.ty.concrete_mut(false, constrainer.span.clone());
        let imm_r = ctx.ty.concrete_mut(false, constrained.span.clone());
        dmap.solve_mut(opts, lt, imm_l);
        dmap.solve_mut(opts, rt, imm_r);
        true
      } else {
        let mut deferred = original.clone();
        deferred.is_deferred = true;
        ctx.deferred.mutabilities.push(deferred);
        true
      }
    }
    (MutVariant::Variable(lt), _) => { dmap.solve_mut(opts, lt, constrained.clone()); true }
    (_, MutVariant::Variable(rt)) => { dmap.solve_mut(opts, rt, constrainer.clone()); true }
    (MutVariant::Concrete { is_mutable: lm }, MutVariant::Concrete { is_mutable: rm }) => {
      if lm == rm {
        true
      } else if lm {
        // `mut` constrainer into an `immut` constrained slot: never allowed.
        false
      } else {
        // `immut` constrainer into a `mut` constrained slot: allowed only under coercion.
        opts.allow_coercion
      }
    }
    (MutVariant::Parameterized { tag: lt, .. }, MutVariant::Parameterized { tag: rt, .. }) => lt == rt,
    _ => false,
  }
}

/// Unifies two mutabilities under `opts`, reporting a diagnostic through `on_failure` if they
/// don't match. Returns whether unification succeeded.
pub fn unify_mutabilities(ctx: &mut Context, constraint: MutEquality, opts: UnifyOptions) -> bool {
  let checkpoint = ctx.deferred.mutabilities.len();
  let mut dmap = DestructiveMap::default();
  let constrainer = constraint.constrainer.clone();
  let constrained = constraint.constrained.clone();
  let ok = unify_mutabilities_rec(ctx, &constrainer, &constrained, &constraint, &opts, &mut dmap);
  if ok {
    dmap.apply(ctx, &opts);
  } else {
    ctx.deferred.mutabilities.truncate(checkpoint);
  }
  ok
}

fn unify_types_rec(
  ctx: &mut Context,
  constrainer: &TypeValue,
  constrained: &TypeValue,
  original: &TypeEquality,
  opts: &UnifyOptions,
  dmap: &mut DestructiveMap,
) -> bool {
  let lf = ctx.ty.flatten_type(constrainer);
  let rf = ctx.ty.flatten_type(constrained);
  match (lf, rf) {
    (TypeVariant::Floating, TypeVariant::Floating)
    | (TypeVariant::Character, TypeVariant::Character)
    | (TypeVariant::Boolean, TypeVariant::Boolean)
    | (TypeVariant::Str, TypeVariant::Str)
    | (TypeVariant::SelfPlaceholder, TypeVariant::SelfPlaceholder) => true,

    (TypeVariant::SignedInt(a), TypeVariant::SignedInt(b)) => a == b,
    (TypeVariant::UnsignedInt(a), TypeVariant::UnsignedInt(b)) => a == b,

    (TypeVariant::TemplateParameterRef { tag: lt, .. }, TypeVariant::TemplateParameterRef { tag: rt, .. }) => lt == rt,

    (TypeVariant::Variable(TypeVarKind::General, lt), TypeVariant::Variable(TypeVarKind::General, rt))
    | (TypeVariant::Variable(TypeVarKind::Integral, lt), TypeVariant::Variable(TypeVarKind::Integral, rt)) => {
      if lt == rt {
        true
      } else if original.is_deferred {
        // Point each variable at the other rather than at a default; `flatten_type` tolerates
        // the resulting cycle (§3.3) and the pair stays on the unsolved list for reification.
        ctx.unsolved.push((lt, constrainer.span.clone()));
        ctx.unsolved.push((rt, constrained.span.clone()));
        dmap.solve_type(opts, lt, constrained.clone());
        dmap.solve_type(opts, rt, constrainer.clone());
        true
      } else {
        let mut deferred = original.clone();
        deferred.is_deferred = true;
        ctx.deferred.types.push(deferred);
        true
      }
    }

    (TypeVariant::SignedInt(_) | TypeVariant::UnsignedInt(_), TypeVariant::Variable(TypeVarKind::Integral, rt)) => {
      dmap.solve_type(opts, rt, constrainer.clone());
      true
    }
    (TypeVariant::Variable(TypeVarKind::Integral, lt), TypeVariant::SignedInt(_) | TypeVariant::UnsignedInt(_)) => {
      dmap.solve_type(opts, lt, constrained.clone());
      true
    }

    (TypeVariant::Variable(TypeVarKind::General, lt), _) => {
      if occurs_in_type(ctx, lt, constrained) { false } else { dmap.solve_type(opts, lt, constrained.clone()); true }
    }
    (_, TypeVariant::Variable(TypeVarKind::General, rt)) => {
      if occurs_in_type(ctx, rt, constrainer) { false } else { dmap.solve_type(opts, rt, constrainer.clone()); true }
    }

    (TypeVariant::Reference { mutability: lm, referent: lr }, TypeVariant::Reference { mutability: rm, referent: rr }) => {
      unify_types_rec(ctx, &lr, &rr, original, opts, dmap) && unify_mutability_inline(ctx, &lm, &rm, original, opts, dmap)
    }
    (TypeVariant::Pointer { mutability: lm, pointee: lp }, TypeVariant::Pointer { mutability: rm, pointee: rp }) => {
      unify_types_rec(ctx, &lp, &rp, original, opts, dmap) && unify_mutability_inline(ctx, &lm, &rm, original, opts, dmap)
    }

    (TypeVariant::Tuple(ls), TypeVariant::Tuple(rs)) => {
      ls.len() == rs.len() && ls.iter().zip(rs.iter()).all(|(l, r)| unify_types_rec(ctx, l, r, original, opts, dmap))
    }

    (TypeVariant::Function { params: lp, ret: lr }, TypeVariant::Function { params: rp, ret: rr }) => {
      lp.len() == rp.len()
        && lp.iter().zip(rp.iter()).all(|(l, r)| unify_types_rec(ctx, l, r, original, opts, dmap))
        && unify_types_rec(ctx, &lr, &rr, original, opts, dmap)
    }

    (TypeVariant::Structure { info: li, is_application: la }, TypeVariant::Structure { info: ri, is_application: ra }) => {
      if li == ri {
        true
      } else if !la || !ra {
        false
      } else {
        let a = ctx.structs[li].template_instantiation_info.clone();
        let b = ctx.structs[ri].template_instantiation_info.clone();
        unify_same_template_arguments(ctx, &a, &b, original, opts, dmap)
      }
    }
    (TypeVariant::Enumeration { info: li, is_application: la }, TypeVariant::Enumeration { info: ri, is_application: ra }) => {
      if li == ri {
        true
      } else if !la || !ra {
        false
      } else {
        let a = ctx.enums[li].template_instantiation_info.clone();
        let b = ctx.enums[ri].template_instantiation_info.clone();
        unify_same_template_arguments(ctx, &a, &b, original, opts, dmap)
      }
    }

    // Array and slice unification is not implemented, matching the original resolver (§9); any
    // occurrence falls through to the catch-all failure below.
    _ => false,
  }
}

fn unify_same_template_arguments<T: PartialEq>(
  ctx: &mut Context,
  a: &Option<crate::types::entity::TemplateInstantiationInfo<T>>,
  b: &Option<crate::types::entity::TemplateInstantiationInfo<T>>,
  original: &TypeEquality,
  opts: &UnifyOptions,
  dmap: &mut DestructiveMap,
) -> bool {
  let (Some(a), Some(b)) = (a, b) else { return false };
  if a.template != b.template { return false }
  if a.template_arguments.len() != b.template_arguments.len() { return false }
  a.template_arguments.iter().zip(b.template_arguments.iter()).all(|(l, r)| match (l, r) {
    (TemplateArgumentValue::Type(lt), TemplateArgumentValue::Type(rt)) => unify_types_rec(ctx, lt, rt, original, opts, dmap),
    (TemplateArgumentValue::Mutability(lm), TemplateArgumentValue::Mutability(rm)) => {
      let dummy = crate::context::MutEquality {
        constrainer: lm.clone(), constrained: rm.clone(),
        constrainer_note: crate::context::Explanation { span: lm.span.clone(), note: "template argument".into() },
        constrained_note: crate::context::Explanation { span: rm.span.clone(), note: "template argument".into() },
        is_deferred: original.is_deferred,
      };
      unify_mutabilities_rec(ctx, lm, rm, &dummy, opts, dmap)
    }
    (TemplateArgumentValue::Value(le), TemplateArgumentValue::Value(re)) => le == re,
    _ => unreachable!("template arguments at the same position of the same template always share a kind"),
  })
}

/// Mutability unification nested inside a type-unification call: shares the type call's
/// `DestructiveMap` rather than opening its own, so a failure anywhere in the enclosing type
/// rolls this piece back along with everything else (§4.4).
fn unify_mutability_inline(
  ctx: &mut Context,
  constrainer: &MutValue,
  constrained: &MutValue,
  original: &TypeEquality,
  opts: &UnifyOptions,
  dmap: &mut DestructiveMap,
) -> bool {
  let wrapped = MutEquality {
    constrainer: constrainer.clone(),
    constrained: constrained.clone(),
    constrainer_note: original.constrainer_note.clone().unwrap_or_else(|| Explanation { span: constrainer.span.clone(), note: String::new() }),
    constrained_note: Explanation { span: constrained.span.clone(), note: original.constrained_note.note.clone() },
    is_deferred: original.is_deferred,
  };
  unify_mutabilities_rec(ctx, constrainer, constrained, &wrapped, opts, dmap)
}

/// Unifies two types under `opts`. Returns whether unification succeeded; on failure, no variable
/// state, deferred queue, or soft solution touched during the attempt is left changed.
pub fn unify_types(ctx: &mut Context, constraint: TypeEquality, opts: UnifyOptions) -> bool {
  let checkpoint = (ctx.deferred.types.len(), ctx.deferred.mutabilities.len(), ctx.unsolved.len());
  let mut dmap = DestructiveMap::default();
  let constrainer = constraint.constrainer.clone();
  let constrained = constraint.constrained.clone();
  let ok = unify_types_rec(ctx, &constrainer, &constrained, &constraint, &opts, &mut dmap);
  if ok {
    dmap.apply(ctx, &opts);
  } else {
    ctx.deferred.types.truncate(checkpoint.0);
    ctx.deferred.mutabilities.truncate(checkpoint.1);
    ctx.unsolved.truncate(checkpoint.2);
  }
  ok
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::{FileId, Span};
  use std::rc::Rc;

  fn span() -> Span {
    Span { file: FileId(Rc::from("test")), start_line: 1, start_col: 1, end_line: 1, end_col: 1 }
  }

  #[test]
  fn unifying_two_fresh_variables_defers_then_links_them_on_retry() {
    let mut ctx = Context::new();
    let a = ctx.fresh_general_type_var(vec![], span());
    let b = ctx.fresh_general_type_var(vec![], span());
    let constraint = TypeEquality {
      constrainer: a.clone(),
      constrained: b.clone(),
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    // First pass: neither side solves outright, the equality is queued instead (§4.5).
    assert!(unify_types(&mut ctx, constraint, UnifyOptions::destructive()));
    assert_eq!(ctx.deferred.types.len(), 1);
    assert!(matches!(ctx.ty.flatten_type(&a), TypeVariant::Variable(..)));

    // Draining retries the queued constraint with `is_deferred` set, which links the pair.
    ctx.drain_deferred_constraints();
    assert!(ctx.deferred.types.is_empty());
    assert!(matches!(ctx.ty.flatten_type(&a), TypeVariant::Variable(..)));
    assert!(matches!(ctx.ty.flatten_type(&b), TypeVariant::Variable(..)));
  }

  #[test]
  fn unifying_an_int_variable_with_a_concrete_int_solves_it() {
    let mut ctx = Context::new();
    let v = ctx.fresh_integral_type_var(span());
    let concrete = ctx.ty.alloc_type(TypeVariant::SignedInt(crate::types::IntTy::I32), span());
    let constraint = TypeEquality {
      constrainer: v.clone(),
      constrained: concrete,
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    assert!(unify_types(&mut ctx, constraint, UnifyOptions::destructive()));
    assert!(matches!(ctx.ty.flatten_type(&v), TypeVariant::SignedInt(crate::types::IntTy::I32)));
  }

  #[test]
  fn failed_speculative_unification_leaves_state_untouched() {
    let mut ctx = Context::new();
    let a = ctx.ty.bool_type(span());
    let b = ctx.ty.unit_type(span());
    let before_types = ctx.ty.type_vars.len();
    let constraint = TypeEquality {
      constrainer: a,
      constrained: b,
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    assert!(!unify_types(&mut ctx, constraint, UnifyOptions::pure_speculative()));
    assert_eq!(before_types, ctx.ty.type_vars.len());
    assert!(ctx.deferred.types.is_empty());
  }

  #[test]
  fn immut_cannot_coerce_to_mut() {
    let mut ctx = Context::new();
    let immut = ctx.ty.concrete_mut(false, span());
    let mutable = ctx.ty.concrete_mut(true, span());
    let constraint = MutEquality {
      constrainer: mutable,
      constrained: immut,
      constrainer_note: Explanation { span: span(), note: "test".into() },
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    let mut opts = UnifyOptions::destructive();
    opts.allow_coercion = true;
    assert!(!unify_mutabilities(&mut ctx, constraint, opts));
  }

  #[test]
  fn unification_is_symmetric_for_both_matching_and_mismatched_concrete_types() {
    let mut ctx = Context::new();
    let bool_a = ctx.ty.bool_type(span());
    let bool_b = ctx.ty.bool_type(span());
    let forward = TypeEquality {
      constrainer: bool_a.clone(),
      constrained: bool_b.clone(),
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    let backward = TypeEquality {
      constrainer: bool_b,
      constrained: bool_a,
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    assert!(unify_types(&mut ctx, forward, UnifyOptions::pure_speculative()));
    assert!(unify_types(&mut ctx, backward, UnifyOptions::pure_speculative()));

    let mut ctx = Context::new();
    let s = ctx.ty.alloc_type(TypeVariant::Str, span());
    let b = ctx.ty.bool_type(span());
    let forward = TypeEquality {
      constrainer: s.clone(),
      constrained: b.clone(),
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    let backward = TypeEquality {
      constrainer: b,
      constrained: s,
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    assert!(!unify_types(&mut ctx, forward, UnifyOptions::pure_speculative()));
    assert!(!unify_types(&mut ctx, backward, UnifyOptions::pure_speculative()));
  }

  #[test]
  fn occurs_check_rejects_a_variable_unified_with_a_tuple_containing_itself() {
    let mut ctx = Context::new();
    let v = ctx.fresh_general_type_var(vec![], span());
    let int = ctx.ty.alloc_type(TypeVariant::SignedInt(crate::types::IntTy::I32), span());
    let cyclic_tuple = ctx.ty.alloc_type(TypeVariant::Tuple(vec![v.clone(), int]), span());
    let constraint = TypeEquality {
      constrainer: v,
      constrained: cyclic_tuple,
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "test".into() },
      is_deferred: false,
    };
    assert!(!unify_types(&mut ctx, constraint, UnifyOptions::destructive()));
    assert!(ctx.deferred.types.is_empty());
  }
}
