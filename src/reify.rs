//! Generalisation & reification (C12, §4.10): the pass that runs once every definition in a
//! module has gone through [`crate::resolve::resolve_module`]'s registration/resolution/
//! deferred-constraint loop.
//!
//! Three independent sweeps, each over state the earlier phases already built:
//!  - every unification variable still on `ctx.unsolved` is diagnosed (§4.10 offers generalising
//!    it into a fresh template parameter instead; this implementation always takes the diagnostic
//!    branch — see `DESIGN.md` for why),
//!  - every integer literal is checked against its inferred type's value range,
//!  - every resolved struct/enum gets a structural byte size, guarded against definition cycles
//!    with a bitset keyed by struct/enum id rather than recursing unboundedly.
//!
//! None of these three needs the others' output, so they run as three independent passes over
//! the arenas rather than one combined walk.

use bit_set::BitSet;
use hashbrown::HashSet;

use crate::context::Context;
use crate::hir::Literal;
use crate::idx::Idx;
use crate::types::entity::{DefBody, ResolvedEnum, ResolvedStruct};
use crate::types::mir::ExprKind;
use crate::types::ty::{TypeValue, TypeVarKind, TypeVarState, TypeVariant};
use crate::types::{EnumInfoId, ExprHandle, IntTy, StructInfoId};

/// Runs every reification sweep over `ctx`. Called once, at the very end of
/// [`crate::resolve::resolve_module`].
pub fn reify_module(ctx: &mut Context) {
  log::debug!("reifying {} unsolved type variable(s)", ctx.unsolved.len());
  diagnose_unsolved_variables(ctx);
  check_integer_literal_ranges(ctx);
  compute_definition_sizes(ctx);
  report_unresolved_instances(ctx);
  log::debug!("reification complete");
}

/// Typeclass/inst instance search is out of scope (§9 open question): every `T : Class`
/// constraint raised along the way was simply recorded, never solved. Reification's final pass
/// is where that gets surfaced, rather than silently dropping a class bound the user wrote.
fn report_unresolved_instances(ctx: &mut Context) {
  for constraint in std::mem::take(&mut ctx.pending_instances) {
    ctx.diags.warning_at(
      vec![crate::diag::TextSection { span: constraint.explanation.span.clone(), note: constraint.explanation.note.clone() }],
      format!("unresolved instance constraint for class `{}`", constraint.class.last().symbol.as_str()),
      Some("typeclass instance search is not implemented; this constraint was recorded but never checked".into()),
    );
  }
}

/// §4.10's two options for a variable still unsolved once resolution is otherwise done are
/// generalisation into a template parameter, or a diagnostic. For general variables this
/// implementation always takes the diagnostic: see `DESIGN.md` for the reasoning (in short,
/// `FunctionInfo`/`StructInfo` have no template-parameter list to append to — only their
/// `*_template` counterparts do, and those are a different, already-instantiable record by the
/// time reification runs). An integral variable left unsolved is an unconstrained integer
/// literal rather than a missing annotation, so it defaults to `I32` instead — the same
/// default-instead-of-error treatment §9 gives unsolved mutability variables at drain time.
fn diagnose_unsolved_variables(ctx: &mut Context) {
  let pending = std::mem::take(&mut ctx.unsolved);
  let mut reported = HashSet::new();
  for (tag, span) in pending {
    let kind = match &ctx.ty.type_vars[tag] {
      TypeVarState::Solved(_) => continue,
      TypeVarState::Unsolved { kind, .. } => *kind,
    };
    if !reported.insert(tag) { continue }
    match kind {
      TypeVarKind::Integral => {
        let default = ctx.ty.alloc_type(TypeVariant::SignedInt(IntTy::I32), span);
        ctx.ty.type_vars[tag].solve(default);
      }
      TypeVarKind::General => ctx.diags.error(span, "unsolved type variable — add a type annotation"),
    }
  }
}

/// Every integer literal's inferred type is, by the time reification runs, either a concrete
/// `IntTy` or an error placeholder — any variable left on it would already have been caught by
/// `diagnose_unsolved_variables`. A literal whose value falls outside that type's inclusive range
/// is a reification-time diagnostic (§4.10, §9): no separate exception type, just `IntTy::range`.
fn check_integer_literal_ranges(ctx: &mut Context) {
  let mut flagged = 0usize;
  for i in 0..ctx.mir.exprs.len() {
    let handle = ExprHandle::from_usize(i);
    let value = match &ctx.mir.exprs[handle].kind {
      ExprKind::Literal(Literal::Int(n)) => n.clone(),
      _ => continue,
    };
    let ty = ctx.mir.exprs[handle].ty.clone();
    let span = ctx.mir.exprs[handle].span.clone();
    let (lo, hi) = match ctx.ty.flatten_type(&ty) {
      TypeVariant::SignedInt(t) | TypeVariant::UnsignedInt(t) => t.range(),
      _ => continue,
    };
    if value < lo || value > hi {
      ctx.diags.error(span, format!("integer literal `{value}` is out of range for its inferred type"));
      flagged += 1;
    }
  }
  log::debug!("flagged {flagged} out-of-range integer literal(s)");
}

/// Cycle guard for size computation (§4.10): a struct/enum currently being sized is recorded here
/// so a member that recurses back into it (directly, or through a chain of other structs/enums)
/// is treated as unsizeable rather than walked forever.
#[derive(Default)]
struct Visiting {
  structs: BitSet,
  enums: BitSet,
}

const MACHINE_WORD_BYTES: u32 = 8;
const DISCRIMINANT_BYTES: u32 = 4;

fn compute_definition_sizes(ctx: &mut Context) {
  let mut visiting = Visiting::default();
  let struct_ids: Vec<StructInfoId> = ctx.structs.enumerate().map(|(id, _)| id).collect();
  let enum_ids: Vec<EnumInfoId> = ctx.enums.enumerate().map(|(id, _)| id).collect();
  let mut sized = 0usize;
  let total = struct_ids.len() + enum_ids.len();
  for id in struct_ids {
    if struct_size(ctx, id, &mut visiting).is_some() { sized += 1 }
  }
  for id in enum_ids {
    if enum_size(ctx, id, &mut visiting).is_some() { sized += 1 }
  }
  log::debug!("computed sizes for {sized}/{total} struct/enum definition(s)");
}

fn struct_size(ctx: &mut Context, id: StructInfoId, visiting: &mut Visiting) -> Option<u32> {
  if let Some(&size) = ctx.struct_sizes.get(&id) { return Some(size) }
  if !visiting.structs.insert(id.into_usize()) { return None }
  let resolved = resolved_struct(ctx, id)?;
  let mut total = 0u32;
  let mut ok = true;
  for (_, field_ty) in &resolved.members {
    match type_size(ctx, field_ty, visiting) {
      Some(s) => total += s,
      None => { ok = false; break }
    }
  }
  visiting.structs.remove(id.into_usize());
  if !ok { return None }
  ctx.struct_sizes.insert(id, total);
  Some(total)
}

fn enum_size(ctx: &mut Context, id: EnumInfoId, visiting: &mut Visiting) -> Option<u32> {
  if let Some(&size) = ctx.enum_sizes.get(&id) { return Some(size) }
  if !visiting.enums.insert(id.into_usize()) { return None }
  let resolved = resolved_enum(ctx, id)?;
  let mut max_payload = 0u32;
  let mut ok = true;
  for (_, payload) in &resolved.ctors {
    if let Some(payload_ty) = payload {
      match type_size(ctx, payload_ty, visiting) {
        Some(s) => max_payload = max_payload.max(s),
        None => { ok = false; break }
      }
    }
  }
  visiting.enums.remove(id.into_usize());
  if !ok { return None }
  let total = DISCRIMINANT_BYTES + max_payload;
  ctx.enum_sizes.insert(id, total);
  Some(total)
}

fn resolved_struct(ctx: &Context, id: StructInfoId) -> Option<ResolvedStruct> {
  match &ctx.structs[id].body { DefBody::Resolved(r) => Some(r.clone()), DefBody::Unresolved(_) => None }
}
fn resolved_enum(ctx: &Context, id: EnumInfoId) -> Option<ResolvedEnum> {
  match &ctx.enums[id].body { DefBody::Resolved(r) => Some(r.clone()), DefBody::Unresolved(_) => None }
}

/// Structural size of a single type (§4.10): primitives have fixed widths, tuples sum their
/// fields, references/pointers and function values are one machine word, arrays multiply the
/// element size by an evaluated constant length, and structs/enums recurse through
/// `struct_size`/`enum_size`. Anything whose size genuinely isn't known yet — a slice, a bare
/// `str`, an unsolved variable, a template parameter, or an array length that isn't a literal,
/// since evaluating arbitrary constant expressions is out of scope — sizes as `None`.
fn type_size(ctx: &mut Context, ty: &TypeValue, visiting: &mut Visiting) -> Option<u32> {
  match ctx.ty.flatten_type(ty) {
    TypeVariant::SignedInt(t) | TypeVariant::UnsignedInt(t) => Some(t.size_bytes()),
    TypeVariant::Floating => Some(8),
    TypeVariant::Character => Some(4),
    TypeVariant::Boolean => Some(1),
    TypeVariant::Str | TypeVariant::Slice(_) => None,
    TypeVariant::Tuple(fields) => {
      let mut total = 0u32;
      for f in &fields { total += type_size(ctx, f, visiting)? }
      Some(total)
    }
    TypeVariant::Array(elem, len) => {
      let elem_size = type_size(ctx, &elem, visiting)?;
      let ExprKind::Literal(Literal::Int(n)) = &ctx.mir.exprs[len.expr].kind else { return None };
      let n: u32 = n.try_into().ok()?;
      Some(elem_size * n)
    }
    TypeVariant::Pointer { .. } | TypeVariant::Reference { .. } | TypeVariant::Function { .. } => Some(MACHINE_WORD_BYTES),
    TypeVariant::Structure { info, .. } => struct_size(ctx, info, visiting),
    TypeVariant::Enumeration { info, .. } => enum_size(ctx, info, visiting),
    TypeVariant::SelfPlaceholder | TypeVariant::TemplateParameterRef { .. }
    | TypeVariant::Variable(..) | TypeVariant::Error => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::FileId;
  use std::rc::Rc;

  fn span() -> crate::span::Span {
    crate::span::Span { file: FileId(Rc::from("test")), start_line: 1, start_col: 1, end_line: 1, end_col: 1 }
  }

  #[test]
  fn an_unsolved_general_variable_is_diagnosed_once() {
    let mut ctx = Context::new();
    let v = ctx.fresh_general_type_var(Vec::new(), span());
    let tag = if let TypeVariant::Variable(_, t) = ctx.ty.pure_type(&v) { *t } else { unreachable!() };
    ctx.unsolved.push((tag, span()));
    reify_module(&mut ctx);
    assert_eq!(ctx.diags.diagnostics().len(), 1);
    assert!(ctx.diags.diagnostics()[0].headline.contains("unsolved type variable"));
  }

  #[test]
  fn a_solved_variable_is_not_diagnosed() {
    let mut ctx = Context::new();
    let v = ctx.fresh_general_type_var(Vec::new(), span());
    let tag = if let TypeVariant::Variable(_, t) = ctx.ty.pure_type(&v) { *t } else { unreachable!() };
    let bool_ty = ctx.ty.bool_type(span());
    ctx.ty.type_vars[tag].solve(bool_ty);
    ctx.unsolved.push((tag, span()));
    reify_module(&mut ctx);
    assert_eq!(ctx.diags.diagnostics().len(), 0);
  }

  #[test]
  fn an_out_of_range_literal_is_flagged() {
    let mut ctx = Context::new();
    let i8_ty = ctx.ty.alloc_type(TypeVariant::SignedInt(crate::types::IntTy::I8), span());
    let unit_mut = ctx.ty.concrete_mut(false, span());
    let expr = ctx.mir.alloc_expr(crate::types::mir::Expression {
      kind: ExprKind::Literal(Literal::Int(num::BigInt::from(200))),
      ty: i8_ty,
      span: span(),
      place_mutability: unit_mut,
      flags: crate::types::mir::ExprFlags::PURE,
    });
    let _ = expr;
    reify_module(&mut ctx);
    assert_eq!(ctx.diags.diagnostics().len(), 1);
    assert!(ctx.diags.diagnostics()[0].headline.contains("out of range"));
  }
}
