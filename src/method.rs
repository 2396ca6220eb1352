//! Method resolution over nameless impl blocks (C11, §4.9). Typeclass instance lookup against
//! `inst` blocks is a documented non-goal (§9 open questions): the constraint is raised and
//! recorded, never solved.

use crate::context::Context;
use crate::diag::TextSection;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::entity::ResolutionState;
use crate::types::ty::{TypeValue, TypeVariant};
use crate::types::{FunctionInfoId, FunctionTemplateInfoId, ImplInfoId};
use crate::unify::{self, UnifyOptions};

pub enum MethodCallee {
  Function(FunctionInfoId),
  FunctionTemplate(FunctionTemplateInfoId),
}

/// Strips away any number of reference layers, the same autoref/autoderef a caller gets for
/// free on an ordinary value: `v.method()` considers `v`'s type regardless of how many `&`s
/// separate it from the Self type an impl block was written against (§4.9).
fn peel_references(ctx: &mut Context, ty: &TypeValue) -> TypeValue {
  let mut current = ty.clone();
  loop {
    match ctx.ty.flatten_type(&current) {
      TypeVariant::Reference { referent, .. } => current = referent,
      _ => return current,
    }
  }
}

/// Scans every registered `impl` block, speculatively unifying the receiver's type against each
/// one's Self type, and looks the method name up in whichever impls match. More than one match
/// is an ambiguity error; zero is "no appropriate method" (§4.9).
pub fn resolve_method(ctx: &mut Context, receiver_ty: &TypeValue, method: Symbol, call_span: Span) -> Option<MethodCallee> {
  let impls = ctx.ns.nameless.implementations.clone();
  let mut matches: Vec<(ImplInfoId, MethodCallee)> = Vec::new();
  let dereffed_receiver = peel_references(ctx, receiver_ty);

  for impl_id in impls {
    if ctx.impls[impl_id].state != ResolutionState::Resolved {
      // Impl not resolved yet in this pass; skip rather than force it — C8 resolves impls in
      // registration order before any body that could call into them.
      continue
    }
    let Some(resolved) = ctx.impls[impl_id].body.resolved().cloned() else { continue };
    let self_ty = resolved.self_type.clone();

    let constraint = crate::context::TypeEquality {
      constrainer: self_ty,
      constrained: dereffed_receiver.clone(),
      constrainer_note: None,
      constrained_note: crate::context::Explanation { span: call_span.clone(), note: "receiver here".into() },
      is_deferred: false,
    };
    if !unify::unify_types(ctx, constraint, UnifyOptions::pure_speculative()) {
      continue
    }

    if let Some(&fn_id) = resolved.functions.get(&method) {
      matches.push((impl_id, MethodCallee::Function(fn_id)));
    } else if let Some(&tmpl_id) = resolved.function_templates.get(&method) {
      matches.push((impl_id, MethodCallee::FunctionTemplate(tmpl_id)));
    }
  }

  match matches.len() {
    0 => {
      ctx.diags.error(call_span, format!("no appropriate method named `{method}` found for this type"));
      None
    }
    1 => Some(matches.pop().unwrap().1),
    _ => {
      let sections = matches.iter().map(|(id, _)| TextSection {
        span: ctx.impls[*id].span.clone(),
        note: "a candidate implementation is here".to_string(),
      }).collect::<Vec<_>>();
      ctx.diags.error_at(sections, format!("ambiguous method call: multiple implementations provide `{method}`"), None);
      None
    }
  }
}
