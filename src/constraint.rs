//! Constraint dispatch (C7, §4.5): the five kinds of equality/membership fact the elaborator can
//! raise against the type system, and how each is actually discharged against [`crate::unify`].
//!
//! A constraint raised during elaboration is solved immediately; one raised during retry of the
//! deferred queue (i.e. with `is_deferred` already set) is solved with whatever default the
//! unification rules fall back to rather than being deferred a second time (§4.4, §4.5).

use crate::context::{Context, Explanation, MutEquality, StructFieldConstraint, TupleFieldConstraint, TypeEquality};
use crate::diag::TextSection;
use crate::types::ty::TypeVariant;
use crate::unify::{self, UnifyOptions};

fn report_type_mismatch(ctx: &mut Context, constraint: &TypeEquality) {
  let mut sections = vec![TextSection {
    span: constraint.constrained_note.span.clone(),
    note: constraint.constrained_note.note.clone(),
  }];
  if let Some(note) = &constraint.constrainer_note {
    sections.push(TextSection { span: note.span.clone(), note: note.note.clone() });
  }
  ctx.diags.error_at(sections, "type mismatch", None);
}

fn report_mutability_mismatch(ctx: &mut Context, constraint: &MutEquality) {
  ctx.diags.error_at(
    vec![
      TextSection { span: constraint.constrainer_note.span.clone(), note: constraint.constrainer_note.note.clone() },
      TextSection { span: constraint.constrained_note.span.clone(), note: constraint.constrained_note.note.clone() },
    ],
    "mutability mismatch: `mut` is required here, but an `immut` reference was provided",
    None,
  );
}

/// Raises `constrainer ~ constrained`, unifying destructively and reporting a diagnostic on
/// failure. Used directly by the elaborator (§4.6); also the retry path for the deferred queue.
pub fn solve_type_equality(ctx: &mut Context, constraint: TypeEquality) -> bool {
  let ok = unify::unify_types(ctx, constraint.clone(), UnifyOptions::destructive());
  if !ok {
    report_type_mismatch(ctx, &constraint);
  }
  ok
}

pub fn solve_mutability_equality(ctx: &mut Context, constraint: MutEquality) -> bool {
  let ok = unify::unify_mutabilities(ctx, constraint.clone(), UnifyOptions::destructive());
  if !ok {
    report_mutability_mismatch(ctx, &constraint);
  }
  ok
}

/// `struct_ty.field_name : field_ty` (§4.5): flattens `struct_ty`, looks the field up by name,
/// and equates its declared type with `field_ty`. Raised by field-access elaboration before the
/// struct's own type is necessarily solved yet, so it always goes through the deferred queue.
pub fn raise_struct_field_constraint(ctx: &mut Context, constraint: StructFieldConstraint) {
  match ctx.ty.flatten_type(&constraint.struct_ty) {
    TypeVariant::Structure { info, .. } => {
      let members = ctx.structs[info].body.resolved().map(|r| r.members.clone());
      match members.and_then(|ms| ms.into_iter().find(|(name, _)| *name == constraint.field_name)) {
        Some((_, declared)) => {
          solve_type_equality(ctx, TypeEquality {
            constrainer: declared,
            constrained: constraint.field_ty,
            constrainer_note: None,
            constrained_note: constraint.explanation.clone(),
            is_deferred: false,
          });
        }
        None => {
          ctx.diags.error(constraint.explanation.span.clone(), format!("no field named `{}`", constraint.field_name));
        }
      }
    }
    TypeVariant::Variable(..) => {
      // Struct type not solved yet; defer and retry later (§4.5).
      ctx.deferred.struct_fields.push(constraint);
    }
    TypeVariant::Error => {}
    _ => ctx.diags.error(constraint.explanation.span.clone(), "field access on a non-struct type"),
  }
}

/// `tuple_ty.index : field_ty` (§4.5), the tuple analogue of [`raise_struct_field_constraint`].
pub fn raise_tuple_field_constraint(ctx: &mut Context, constraint: TupleFieldConstraint) {
  match ctx.ty.flatten_type(&constraint.tuple_ty) {
    TypeVariant::Tuple(fields) => match fields.get(constraint.index) {
      Some(declared) => {
        solve_type_equality(ctx, TypeEquality {
          constrainer: declared.clone(),
          constrained: constraint.field_ty,
          constrainer_note: None,
          constrained_note: constraint.explanation,
          is_deferred: false,
        });
      }
      None => {
        ctx.diags.error(constraint.explanation.span.clone(), format!("tuple has no field `.{}`", constraint.index));
      }
    },
    TypeVariant::Variable(..) => {
      ctx.deferred.tuple_fields.push(constraint);
    }
    TypeVariant::Error => {}
    _ => ctx.diags.error(constraint.explanation.span.clone(), "tuple-index access on a non-tuple type"),
  }
}

/// `ty : class` — recorded for the final reification pass and never actively solved (§9 open
/// question: typeclass instance search is out of scope for this design).
pub fn raise_instance_constraint(ctx: &mut Context, constraint: crate::context::InstanceConstraint) {
  ctx.deferred.instances.push(constraint);
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
  fn mismatched_concrete_types_report_one_diagnostic() {
    let mut ctx = Context::new();
    let a = ctx.ty.bool_type(span());
    let b = ctx.ty.unit_type(span());
    let constraint = TypeEquality {
      constrainer: a,
      constrained: b,
      constrainer_note: None,
      constrained_note: Explanation { span: span(), note: "expected here".into() },
      is_deferred: false,
    };
    assert!(!solve_type_equality(&mut ctx, constraint));
    assert_eq!(ctx.diags.diagnostics().len(), 1);
  }
}
