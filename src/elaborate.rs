//! Bidirectional elaboration (C9, §4.6): walks the desugared surface tree, producing the typed
//! MIR and raising constraints against [`crate::unify`] as it goes. `for` loops, lambdas, casts,
//! `ret`, and named-argument invocations are rejected outright — `hir`'s desugaring pass never
//! produces the first two, and the other three have no elaboration rule at all (§7, §9 open
//! questions).
//!
//! A failure that is local to one sub-expression (an unknown field, a non-callable callee) is
//! recorded as a diagnostic and papered over with a `TypeVariant::Error`/`ExprKind::Error` node so
//! the rest of the enclosing expression keeps elaborating; a failure that makes it impossible to
//! know what to build next (an unresolvable path segment, a cyclic definition, the instantiation
//! depth limit) unwinds the current definition via `Err(Aborted)` instead.

use hashbrown::HashSet;
use num::BigInt;
use crate::context::{Context, Explanation, MutEquality, StructFieldConstraint, TupleFieldConstraint, TypeEquality};
use crate::diag::{Aborted, RResult, TextSection};
use crate::hir;
use crate::instantiate::ExplicitArgs;
use crate::intern::{self, Symbol};
use crate::method::{self, MethodCallee};
use crate::span::Span;
use crate::types::mir::{Expression, ExprFlags, ExprKind, FieldAccessKind, MatchArm, PatKind, Pattern};
use crate::types::namespace::{LowerEntry, UpperEntry};
use crate::types::ty::{ArrayLen, MutValue, MutVariant, TypeValue, TypeVariant};
use crate::types::{ExprHandle, FunctionInfoId, IntTy, NamespaceId, PatHandle};

fn literal_type(ctx: &mut Context, lit: &hir::Literal, span: &Span) -> TypeValue {
  match lit {
    hir::Literal::Int(_) => ctx.fresh_integral_type_var(span.clone()),
    hir::Literal::Float(_) => ctx.ty.alloc_type(TypeVariant::Floating, span.clone()),
    hir::Literal::Bool(_) => ctx.ty.bool_type(span.clone()),
    hir::Literal::Char(_) => ctx.ty.alloc_type(TypeVariant::Character, span.clone()),
    hir::Literal::Str(_) => {
      let byte = ctx.ty.alloc_type(TypeVariant::UnsignedInt(IntTy::U8), span.clone());
      let slice = ctx.ty.alloc_type(TypeVariant::Slice(byte), span.clone());
      let immut = ctx.ty.concrete_mut(false, span.clone());
      ctx.ty.alloc_type(TypeVariant::Reference { mutability: immut, referent: slice }, span.clone())
    }
  }
}

fn synth_usize_literal(ctx: &mut Context, n: usize, span: &Span) -> ExprHandle {
  let ty = ctx.ty.alloc_type(TypeVariant::UnsignedInt(IntTy::U64), span.clone());
  let place_mutability = ctx.ty.concrete_mut(false, span.clone());
  ctx.mir.alloc_expr(Expression {
    kind: ExprKind::Literal(hir::Literal::Int(BigInt::from(n))),
    ty, span: span.clone(), place_mutability, flags: ExprFlags::PURE,
  })
}

fn error_expr(ctx: &mut Context, span: &Span) -> ExprHandle {
  let ty = ctx.ty.alloc_type(TypeVariant::Error, span.clone());
  let place_mutability = ctx.ty.concrete_mut(false, span.clone());
  ctx.mir.alloc_expr(Expression { kind: ExprKind::Error, ty, span: span.clone(), place_mutability, flags: ExprFlags::empty() })
}

// ---- path resolution -------------------------------------------------------------------------

fn try_step_into_namespace(ctx: &mut Context, ns: NamespaceId, seg: &hir::Name) -> Option<NamespaceId> {
  if let Some(LowerEntry::Namespace(child)) = ctx.ns.find_lower(ns, seg.symbol) {
    return Some(child)
  }
  if let Some(UpperEntry::Enum(enum_id)) = ctx.ns.find_upper(ns, seg.symbol) {
    if crate::resolve::ensure_resolved_enum(ctx, enum_id).is_ok() {
      if let Some(resolved) = ctx.enums[enum_id].body.resolved() {
        return Some(resolved.ctor_namespace)
      }
    }
  }
  None
}

fn step_into_namespace(ctx: &mut Context, ns: NamespaceId, seg: &hir::Name) -> RResult<NamespaceId> {
  match try_step_into_namespace(ctx, ns, seg) {
    Some(n) => Ok(n),
    None => {
      ctx.diags.error(seg.span.clone(), format!("no namespace named `{}` found here", seg.symbol.as_str()));
      Err(Aborted)
    }
  }
}

fn try_resolve_lower(ctx: &mut Context, qname: &hir::QualifiedName, ns: NamespaceId) -> Option<LowerEntry> {
  let mut current = ns;
  for seg in &qname.segments[..qname.segments.len() - 1] {
    current = try_step_into_namespace(ctx, current, seg)?;
  }
  ctx.ns.find_lower(current, qname.last().symbol)
}

fn resolve_lower(ctx: &mut Context, qname: &hir::QualifiedName, ns: NamespaceId) -> RResult<LowerEntry> {
  match try_resolve_lower(ctx, qname, ns) {
    Some(e) => Ok(e),
    None => {
      ctx.diags.error(qname.last().span.clone(), format!("no value, function, or constructor named `{}` found here", qname.last().symbol.as_str()));
      Err(Aborted)
    }
  }
}

fn resolve_upper(ctx: &mut Context, qname: &hir::QualifiedName, ns: NamespaceId) -> RResult<UpperEntry> {
  let mut current = ns;
  for seg in &qname.segments[..qname.segments.len() - 1] {
    current = step_into_namespace(ctx, current, seg)?;
  }
  match ctx.ns.find_upper(current, qname.last().symbol) {
    Some(e) => Ok(e),
    None => {
      ctx.diags.error(qname.last().span.clone(), format!("no type named `{}` found here", qname.last().symbol.as_str()));
      Err(Aborted)
    }
  }
}

// ---- types and mutabilities -------------------------------------------------------------------

/// Primitive type names, recognised directly rather than through the namespace: the source has
/// no prelude module to seed these into, so the elaborator matches on spelling the same way it
/// already builds `IntTy`/`Boolean`/`Str` values for literals (§3.3, §4.6, `DESIGN.md`).
fn builtin_type_variant(name: &str) -> Option<TypeVariant> {
  Some(match name {
    "I8" => TypeVariant::SignedInt(IntTy::I8),
    "I16" => TypeVariant::SignedInt(IntTy::I16),
    "I32" => TypeVariant::SignedInt(IntTy::I32),
    "I64" => TypeVariant::SignedInt(IntTy::I64),
    "U8" => TypeVariant::UnsignedInt(IntTy::U8),
    "U16" => TypeVariant::UnsignedInt(IntTy::U16),
    "U32" => TypeVariant::UnsignedInt(IntTy::U32),
    "U64" => TypeVariant::UnsignedInt(IntTy::U64),
    "F64" => TypeVariant::Floating,
    "Bool" => TypeVariant::Boolean,
    "Char" => TypeVariant::Character,
    "Str" => TypeVariant::Str,
    _ => return None,
  })
}

fn elaborate_named_type(ctx: &mut Context, qname: &hir::QualifiedName, args: &[hir::TemplateArgument], span: &Span, ns: NamespaceId) -> RResult<TypeValue> {
  if qname.is_unqualified() && args.is_empty() {
    if let Some(binding) = ctx.scopes.find_type(qname.last().symbol) {
      return Ok(binding.ty.clone())
    }
    if let Some(variant) = builtin_type_variant(&qname.last().symbol.as_str()) {
      return Ok(ctx.ty.alloc_type(variant, span.clone()))
    }
  }
  let entry = resolve_upper(ctx, qname, ns)?;
  let last_span = qname.last().span.clone();
  match entry {
    UpperEntry::Struct(id) => {
      if !args.is_empty() {
        ctx.diags.error(last_span, "this struct is not generic");
        return Err(Aborted);
      }
      Ok(ctx.ty.alloc_type(TypeVariant::Structure { info: id, is_application: false }, span.clone()))
    }
    UpperEntry::Enum(id) => {
      if !args.is_empty() {
        ctx.diags.error(last_span, "this enum is not generic");
        return Err(Aborted);
      }
      Ok(ctx.ty.alloc_type(TypeVariant::Enumeration { info: id, is_application: false }, span.clone()))
    }
    UpperEntry::Alias(id) => {
      if !args.is_empty() {
        ctx.diags.error(last_span, "this alias is not generic");
        return Err(Aborted);
      }
      crate::resolve::ensure_resolved_alias(ctx, id)?;
      ctx.aliases[id].body.resolved().cloned().ok_or(Aborted)
    }
    UpperEntry::StructTemplate(tmpl_id) => {
      let id = crate::instantiate::instantiate_struct_template(ctx, tmpl_id, ExplicitArgs::Ast(args), ns, span.clone())?;
      Ok(ctx.ty.alloc_type(TypeVariant::Structure { info: id, is_application: true }, span.clone()))
    }
    UpperEntry::EnumTemplate(tmpl_id) => {
      let id = crate::instantiate::instantiate_enum_template(ctx, tmpl_id, ExplicitArgs::Ast(args), ns, span.clone())?;
      Ok(ctx.ty.alloc_type(TypeVariant::Enumeration { info: id, is_application: true }, span.clone()))
    }
    UpperEntry::AliasTemplate(tmpl_id) => {
      let id = crate::instantiate::instantiate_alias_template(ctx, tmpl_id, ExplicitArgs::Ast(args), ns, span.clone())?;
      ctx.aliases[id].body.resolved().cloned().ok_or(Aborted)
    }
    UpperEntry::Typeclass(_) | UpperEntry::TypeclassTemplate(_) => {
      ctx.diags.error(last_span, "a typeclass name cannot be used as a type");
      Err(Aborted)
    }
  }
}

/// Elaborates a surface type, instantiating any template application it names (§4.6, §4.8).
pub fn elaborate_type(ctx: &mut Context, ty: &hir::Type, ns: NamespaceId) -> RResult<TypeValue> {
  match &ty.kind {
    hir::TypeKind::Hole => Ok(ctx.fresh_general_type_var(vec![], ty.span.clone())),
    hir::TypeKind::SelfPlaceholder => match ctx.current_self_type.clone() {
      Some(t) => Ok(t),
      None => {
        ctx.diags.error(ty.span.clone(), "`Self` is only valid inside a typeclass, impl, or inst block");
        Err(Aborted)
      }
    },
    hir::TypeKind::Tuple(parts) => {
      let mut values = Vec::with_capacity(parts.len());
      for p in parts { values.push(elaborate_type(ctx, p, ns)?); }
      Ok(ctx.ty.alloc_type(TypeVariant::Tuple(values), ty.span.clone()))
    }
    hir::TypeKind::Array(elem, len_expr) => {
      let elem_ty = elaborate_type(ctx, elem, ns)?;
      let len_handle = elaborate_expr(ctx, len_expr, ns)?;
      let len_ty = ctx.mir.exprs[len_handle].ty.clone();
      Ok(ctx.ty.alloc_type(TypeVariant::Array(elem_ty, ArrayLen { expr: len_handle, ty: len_ty }), ty.span.clone()))
    }
    hir::TypeKind::Slice(elem) => {
      let elem_ty = elaborate_type(ctx, elem, ns)?;
      Ok(ctx.ty.alloc_type(TypeVariant::Slice(elem_ty), ty.span.clone()))
    }
    hir::TypeKind::Pointer(is_mut, pointee) => {
      let mutability = ctx.ty.concrete_mut(*is_mut, ty.span.clone());
      let pointee_ty = elaborate_type(ctx, pointee, ns)?;
      Ok(ctx.ty.alloc_type(TypeVariant::Pointer { mutability, pointee: pointee_ty }, ty.span.clone()))
    }
    hir::TypeKind::Reference(mast, referent) => {
      let mutability = elaborate_mutability(ctx, mast, &ty.span)?;
      let referent_ty = elaborate_type(ctx, referent, ns)?;
      Ok(ctx.ty.alloc_type(TypeVariant::Reference { mutability, referent: referent_ty }, ty.span.clone()))
    }
    hir::TypeKind::Function(params, ret) => {
      let mut param_tys = Vec::with_capacity(params.len());
      for p in params { param_tys.push(elaborate_type(ctx, p, ns)?); }
      let ret_ty = elaborate_type(ctx, ret, ns)?;
      Ok(ctx.ty.alloc_type(TypeVariant::Function { params: param_tys, ret: ret_ty }, ty.span.clone()))
    }
    hir::TypeKind::Named(qname, args) => elaborate_named_type(ctx, qname, args, &ty.span, ns),
  }
}

/// Elaborates a surface mutability annotation. `fallback_span` supplies a span for `Immut`/`Mut`,
/// which carry none of their own in `hir` (§3.2, §4.6).
pub fn elaborate_mutability(ctx: &mut Context, m: &hir::MutabilityAst, fallback_span: &Span) -> RResult<MutValue> {
  match m {
    hir::MutabilityAst::Immut => Ok(ctx.ty.concrete_mut(false, fallback_span.clone())),
    hir::MutabilityAst::Mut => Ok(ctx.ty.concrete_mut(true, fallback_span.clone())),
    hir::MutabilityAst::Hole(span) => Ok(ctx.fresh_mutability_var(span.clone())),
    hir::MutabilityAst::Parameter(name) => match ctx.scopes.find_mutability(name.symbol) {
      Some(binding) => {
        let tag = binding.tag;
        Ok(ctx.ty.alloc_mut(MutVariant::Parameterized { identifier: Some(name.symbol), tag }, name.span.clone()))
      }
      None => {
        ctx.diags.error(name.span.clone(), format!("no mutability parameter named `{}` found here", name.symbol.as_str()));
        Err(Aborted)
      }
    },
  }
}

// ---- patterns -----------------------------------------------------------------------------

/// Elaborates a pattern, binding any names it introduces into the current scope. `expected`
/// supplies the scrutinee's type when known (match arms, `let` with a declared or inferred
/// initializer type); patterns elaborated without one synthesize a fresh type variable (§4.6).
pub fn elaborate_pattern(ctx: &mut Context, pat: &hir::Pattern, expected: Option<&TypeValue>, ns: NamespaceId) -> RResult<PatHandle> {
  match &pat.kind {
    hir::PatternKind::Wildcard => {
      let ty = expected.cloned().unwrap_or_else(|| ctx.fresh_general_type_var(vec![], pat.span.clone()));
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Wildcard, ty, span: pat.span.clone(), is_exhaustive_by_itself: true }))
    }
    hir::PatternKind::Literal(lit) => {
      let ty = literal_type(ctx, lit, &pat.span);
      if let Some(e) = expected {
        crate::constraint::solve_type_equality(ctx, TypeEquality {
          constrainer: e.clone(), constrained: ty.clone(), constrainer_note: None,
          constrained_note: Explanation { span: pat.span.clone(), note: "literal pattern here".into() },
          is_deferred: false,
        });
      }
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Literal(lit.clone()), ty, span: pat.span.clone(), is_exhaustive_by_itself: false }))
    }
    hir::PatternKind::Name(name, mast) => {
      let ty = expected.cloned().unwrap_or_else(|| ctx.fresh_general_type_var(vec![], name.span.clone()));
      let mutability = elaborate_mutability(ctx, mast, &name.span)?;
      let var = ctx.fresh_local_var_tag();
      let binding = crate::scope::VariableBinding::new(var, ty.clone(), mutability.clone(), name.span.clone());
      ctx.scopes.bind_variable(&mut ctx.diags, name.symbol, binding);
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Name { var, mutability }, ty, span: pat.span.clone(), is_exhaustive_by_itself: true }))
    }
    hir::PatternKind::Tuple(parts) => {
      let expected_fields = expected.and_then(|e| match ctx.ty.flatten_type(e) {
        TypeVariant::Tuple(fs) if fs.len() == parts.len() => Some(fs),
        _ => None,
      });
      let mut new_parts = Vec::with_capacity(parts.len());
      let mut tys = Vec::with_capacity(parts.len());
      let mut exhaustive = true;
      for (i, p) in parts.iter().enumerate() {
        let e = expected_fields.as_ref().and_then(|fs| fs.get(i).cloned());
        let handle = elaborate_pattern(ctx, p, e.as_ref(), ns)?;
        exhaustive &= ctx.mir.pats[handle].is_exhaustive_by_itself;
        tys.push(ctx.mir.pats[handle].ty.clone());
        new_parts.push(handle);
      }
      let ty = ctx.ty.alloc_type(TypeVariant::Tuple(tys), pat.span.clone());
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Tuple(new_parts), ty, span: pat.span.clone(), is_exhaustive_by_itself: exhaustive }))
    }
    hir::PatternKind::Slice(parts) => {
      let elem_expected = expected.and_then(|e| match ctx.ty.flatten_type(e) {
        TypeVariant::Array(elem, _) | TypeVariant::Slice(elem) => Some(elem),
        _ => None,
      });
      let mut new_parts = Vec::with_capacity(parts.len());
      let mut elem_ty = elem_expected;
      for p in parts {
        let handle = elaborate_pattern(ctx, p, elem_ty.as_ref(), ns)?;
        if elem_ty.is_none() { elem_ty = Some(ctx.mir.pats[handle].ty.clone()); }
        new_parts.push(handle);
      }
      let elem = elem_ty.unwrap_or_else(|| ctx.fresh_general_type_var(vec![], pat.span.clone()));
      let ty = ctx.ty.alloc_type(TypeVariant::Slice(elem), pat.span.clone());
      // Fixed arity against an unevaluated array length is never provably exhaustive (§4.4, §4.6).
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Slice(new_parts), ty, span: pat.span.clone(), is_exhaustive_by_itself: false }))
    }
    hir::PatternKind::Ctor(qname, payload) => {
      let entry = resolve_lower(ctx, qname, ns)?;
      let LowerEntry::EnumConstructor { enum_info, ctor } = entry else {
        ctx.diags.error(qname.last().span.clone(), "expected an enum constructor here");
        return Err(Aborted);
      };
      crate::resolve::ensure_resolved_enum(ctx, enum_info)?;
      let resolved = ctx.enums[enum_info].body.resolved().cloned().ok_or(Aborted)?;
      let payload_ty = resolved.ctors.iter().find(|(n, _)| *n == ctor).and_then(|(_, p)| p.clone());
      let new_payload = match (payload, &payload_ty) {
        (Some(p), Some(pty)) => Some(elaborate_pattern(ctx, p, Some(pty), ns)?),
        (None, None) => None,
        (Some(p), None) => {
          ctx.diags.error(p.span.clone(), format!("constructor `{}` carries no payload", ctor.as_str()));
          return Err(Aborted);
        }
        (None, Some(_)) => {
          ctx.diags.error(pat.span.clone(), format!("constructor `{}` requires a payload pattern", ctor.as_str()));
          return Err(Aborted);
        }
      };
      let is_app = ctx.enums[enum_info].template_instantiation_info.is_some();
      let ty = ctx.ty.alloc_type(TypeVariant::Enumeration { info: enum_info, is_application: is_app }, pat.span.clone());
      let is_exhaustive_by_itself = resolved.ctors.len() == 1
        && new_payload.as_ref().is_none_or(|p| ctx.mir.pats[*p].is_exhaustive_by_itself);
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Ctor { info: enum_info, ctor, payload: new_payload }, ty, span: pat.span.clone(), is_exhaustive_by_itself }))
    }
    hir::PatternKind::As(inner, name) => {
      let inner_handle = elaborate_pattern(ctx, inner, expected, ns)?;
      let ty = ctx.mir.pats[inner_handle].ty.clone();
      let var = ctx.fresh_local_var_tag();
      let mutability = ctx.ty.concrete_mut(false, name.span.clone());
      let binding = crate::scope::VariableBinding::new(var, ty.clone(), mutability, name.span.clone());
      ctx.scopes.bind_variable(&mut ctx.diags, name.symbol, binding);
      let exhaustive = ctx.mir.pats[inner_handle].is_exhaustive_by_itself;
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::As(inner_handle, var), ty, span: pat.span.clone(), is_exhaustive_by_itself: exhaustive }))
    }
    hir::PatternKind::Guarded(inner, guard) => {
      let inner_handle = elaborate_pattern(ctx, inner, expected, ns)?;
      let ty = ctx.mir.pats[inner_handle].ty.clone();
      let guard_handle = elaborate_expr(ctx, guard, ns)?;
      let bool_ty = ctx.ty.bool_type(guard.span.clone());
      crate::constraint::solve_type_equality(ctx, TypeEquality {
        constrainer: bool_ty, constrained: ctx.mir.exprs[guard_handle].ty.clone(), constrainer_note: None,
        constrained_note: Explanation { span: guard.span.clone(), note: "match guard here".into() },
        is_deferred: false,
      });
      // A guard can still reject the value even when the inner pattern is irrefutable.
      Ok(ctx.mir.alloc_pat(Pattern { kind: PatKind::Guarded(inner_handle, guard_handle), ty, span: pat.span.clone(), is_exhaustive_by_itself: false }))
    }
  }
}

// ---- expressions --------------------------------------------------------------------------

fn build_function_ref_expr(ctx: &mut Context, fn_id: FunctionInfoId, is_application: bool, span: &Span) -> RResult<ExprHandle> {
  let resolved = ctx.functions[fn_id].body.resolved().cloned().ok_or(Aborted)?;
  let params = resolved.signature.params.iter().map(|(_, _, t)| t.clone()).collect();
  let ty = ctx.ty.alloc_type(TypeVariant::Function { params, ret: resolved.signature.ret.clone() }, span.clone());
  let place_mutability = ctx.ty.concrete_mut(false, span.clone());
  Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::FunctionRef { info: fn_id, is_application }, ty, span: span.clone(), place_mutability, flags: ExprFlags::PURE }))
}

/// Auto-references the receiver of a method call if the method's first parameter is a reference
/// and the receiver isn't one already (§4.9, mirroring ordinary `&`/`&mut` coercion rules).
fn adapt_receiver(ctx: &mut Context, receiver: ExprHandle, first_param_ty: &TypeValue, call_span: &Span) -> ExprHandle {
  let TypeVariant::Reference { mutability, .. } = ctx.ty.flatten_type(first_param_ty) else { return receiver };
  if matches!(ctx.ty.flatten_type(&ctx.mir.exprs[receiver].ty), TypeVariant::Reference { .. }) {
    return receiver
  }
  if !ctx.mir.exprs[receiver].is_addressable() {
    ctx.diags.error(call_span.clone(), "this method requires a `self` reference, but the receiver is not addressable");
  }
  let operand_ty = ctx.mir.exprs[receiver].ty.clone();
  let ty = ctx.ty.alloc_type(TypeVariant::Reference { mutability: mutability.clone(), referent: operand_ty }, call_span.clone());
  let place_mutability = ctx.ty.concrete_mut(false, call_span.clone());
  ctx.mir.alloc_expr(Expression { kind: ExprKind::Reference { mutability, operand: receiver }, ty, span: call_span.clone(), place_mutability, flags: ExprFlags::PURE })
}

/// Recognises `Ctor(payload)` written as a plain call before falling back to ordinary invocation
/// elaboration, since a payload-carrying constructor has no `FunctionInfo` to call through (§4.6).
fn try_enum_ctor_invocation(ctx: &mut Context, callee: &hir::Expression, args: &[hir::Expression], span: &Span, ns: NamespaceId) -> RResult<Option<ExprHandle>> {
  let hir::ExpressionKind::Variable(qname) = &callee.kind else { return Ok(None) };
  let Some(entry) = try_resolve_lower(ctx, qname, ns) else { return Ok(None) };
  let LowerEntry::EnumConstructor { enum_info, ctor } = entry else { return Ok(None) };
  crate::resolve::ensure_resolved_enum(ctx, enum_info)?;
  let resolved = ctx.enums[enum_info].body.resolved().cloned().ok_or(Aborted)?;
  let Some(payload_ty) = resolved.ctors.iter().find(|(n, _)| *n == ctor).and_then(|(_, p)| p.clone()) else {
    ctx.diags.error(span.clone(), format!("constructor `{}` carries no payload and cannot be invoked", ctor.as_str()));
    return Err(Aborted);
  };
  if args.len() != 1 {
    ctx.diags.error(span.clone(), format!("constructor `{}` takes exactly one payload argument", ctor.as_str()));
    return Err(Aborted);
  }
  let arg_handle = elaborate_expr(ctx, &args[0], ns)?;
  crate::constraint::solve_type_equality(ctx, TypeEquality {
    constrainer: payload_ty, constrained: ctx.mir.exprs[arg_handle].ty.clone(), constrainer_note: None,
    constrained_note: Explanation { span: args[0].span.clone(), note: "constructor payload here".into() },
    is_deferred: false,
  });
  let is_app = ctx.enums[enum_info].template_instantiation_info.is_some();
  let ty = ctx.ty.alloc_type(TypeVariant::Enumeration { info: enum_info, is_application: is_app }, span.clone());
  let place_mutability = ctx.ty.concrete_mut(false, span.clone());
  Ok(Some(ctx.mir.alloc_expr(Expression {
    kind: ExprKind::EnumCtorInvocation { info: enum_info, ctor, payload: arg_handle },
    ty, span: span.clone(), place_mutability, flags: ExprFlags::PURE,
  })))
}

/// Elaborates a surface expression into a typed MIR node, raising constraints as it goes (§4.6).
pub fn elaborate_expr(ctx: &mut Context, expr: &hir::Expression, ns: NamespaceId) -> RResult<ExprHandle> {
  match &expr.kind {
    hir::ExpressionKind::Literal(lit) => {
      let ty = literal_type(ctx, lit, &expr.span);
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Literal(lit.clone()), ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::PURE }))
    }

    hir::ExpressionKind::Tuple(parts) => {
      let mut handles = Vec::with_capacity(parts.len());
      for p in parts { handles.push(elaborate_expr(ctx, p, ns)?); }
      let tys = handles.iter().map(|h| ctx.mir.exprs[*h].ty.clone()).collect();
      let ty = ctx.ty.alloc_type(TypeVariant::Tuple(tys), expr.span.clone());
      let flags = if handles.iter().all(|h| ctx.mir.exprs[*h].is_pure()) { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Tuple(handles), ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::ArrayLiteral(parts) => {
      let mut handles = Vec::with_capacity(parts.len());
      let mut elem_ty: Option<TypeValue> = None;
      for p in parts {
        let h = elaborate_expr(ctx, p, ns)?;
        match &elem_ty {
          Some(expected) => {
            crate::constraint::solve_type_equality(ctx, TypeEquality {
              constrainer: expected.clone(), constrained: ctx.mir.exprs[h].ty.clone(), constrainer_note: None,
              constrained_note: Explanation { span: p.span.clone(), note: "array element here".into() },
              is_deferred: false,
            });
          }
          None => elem_ty = Some(ctx.mir.exprs[h].ty.clone()),
        }
        handles.push(h);
      }
      let elem = elem_ty.unwrap_or_else(|| ctx.fresh_general_type_var(vec![], expr.span.clone()));
      let len_expr = synth_usize_literal(ctx, handles.len(), &expr.span);
      let len_ty = ctx.mir.exprs[len_expr].ty.clone();
      let ty = ctx.ty.alloc_type(TypeVariant::Array(elem, ArrayLen { expr: len_expr, ty: len_ty }), expr.span.clone());
      let flags = if handles.iter().all(|h| ctx.mir.exprs[*h].is_pure()) { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::ArrayLiteral(handles), ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::Block(block) => elaborate_block(ctx, block, &expr.span, ns),

    hir::ExpressionKind::Loop { label, body, is_lowered_while } => {
      ctx.loop_stack.push(crate::context::LoopInfo {
        label: label.as_ref().map(|n| n.symbol),
        break_ty: None,
        requires_unit: *is_lowered_while,
      });
      let body_handle = elaborate_block(ctx, body, &expr.span, ns)?;
      let info = ctx.loop_stack.pop().expect("loop stack underflow");
      let ty = info.break_ty.unwrap_or_else(|| ctx.fresh_general_type_var(vec![], expr.span.clone()));
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression {
        kind: ExprKind::Loop { label: label.as_ref().map(|n| n.symbol), body: body_handle },
        ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::empty(),
      }))
    }

    hir::ExpressionKind::Break { label, result } => {
      let label_sym = label.as_ref().map(|n| n.symbol);
      let target_idx = match &label_sym {
        Some(sym) => ctx.loop_stack.iter().rposition(|l| l.label == Some(*sym)),
        None => if ctx.loop_stack.is_empty() { None } else { Some(ctx.loop_stack.len() - 1) },
      };
      let Some(idx) = target_idx else {
        ctx.diags.error(expr.span.clone(), "`break` outside of a loop");
        return Err(Aborted);
      };
      let result_handle = match result {
        Some(r) => Some(elaborate_expr(ctx, r, ns)?),
        None => None,
      };
      let result_ty = match &result_handle {
        Some(h) => ctx.mir.exprs[*h].ty.clone(),
        None => ctx.ty.unit_type(expr.span.clone()),
      };
      if ctx.loop_stack[idx].requires_unit {
        let unit = ctx.ty.unit_type(expr.span.clone());
        crate::constraint::solve_type_equality(ctx, TypeEquality {
          constrainer: unit, constrained: result_ty, constrainer_note: None,
          constrained_note: Explanation { span: expr.span.clone(), note: "break value here".into() },
          is_deferred: false,
        });
      } else {
        match ctx.loop_stack[idx].break_ty.clone() {
          Some(expected) => {
            crate::constraint::solve_type_equality(ctx, TypeEquality {
              constrainer: expected, constrained: result_ty, constrainer_note: None,
              constrained_note: Explanation { span: expr.span.clone(), note: "break value here".into() },
              is_deferred: false,
            });
          }
          None => ctx.loop_stack[idx].break_ty = Some(result_ty),
        }
      }
      // `break` never produces a value to its own syntactic position; a fresh variable stands in
      // for the absent bottom type (§3.3, §9: no `Never` variant exists).
      let ty = ctx.fresh_general_type_var(vec![], expr.span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Break { label: label_sym, result: result_handle }, ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::empty() }))
    }

    hir::ExpressionKind::Continue { label } => {
      let label_sym = label.as_ref().map(|n| n.symbol);
      let found = match &label_sym {
        Some(sym) => ctx.loop_stack.iter().any(|l| l.label == Some(*sym)),
        None => !ctx.loop_stack.is_empty(),
      };
      if !found {
        ctx.diags.error(expr.span.clone(), "`continue` outside of a loop");
        return Err(Aborted);
      }
      let ty = ctx.fresh_general_type_var(vec![], expr.span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Continue { label: label_sym }, ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::empty() }))
    }

    hir::ExpressionKind::If { cond, then_branch, else_branch } => {
      let cond_handle = elaborate_expr(ctx, cond, ns)?;
      let bool_ty = ctx.ty.bool_type(cond.span.clone());
      crate::constraint::solve_type_equality(ctx, TypeEquality {
        constrainer: bool_ty, constrained: ctx.mir.exprs[cond_handle].ty.clone(), constrainer_note: None,
        constrained_note: Explanation { span: cond.span.clone(), note: "`if` condition here".into() },
        is_deferred: false,
      });
      let then_handle = elaborate_expr(ctx, then_branch, ns)?;
      let then_ty = ctx.mir.exprs[then_handle].ty.clone();
      let (else_handle, ty, is_pure) = match else_branch {
        Some(e) => {
          let h = elaborate_expr(ctx, e, ns)?;
          crate::constraint::solve_type_equality(ctx, TypeEquality {
            constrainer: then_ty.clone(), constrained: ctx.mir.exprs[h].ty.clone(),
            constrainer_note: Some(Explanation { span: then_branch.span.clone(), note: "`then` branch here".into() }),
            constrained_note: Explanation { span: e.span.clone(), note: "`else` branch here".into() },
            is_deferred: false,
          });
          let pure = ctx.mir.exprs[cond_handle].is_pure() && ctx.mir.exprs[then_handle].is_pure() && ctx.mir.exprs[h].is_pure();
          (Some(h), then_ty.clone(), pure)
        }
        None => {
          let unit = ctx.ty.unit_type(expr.span.clone());
          crate::constraint::solve_type_equality(ctx, TypeEquality {
            constrainer: unit.clone(), constrained: then_ty, constrainer_note: None,
            constrained_note: Explanation { span: then_branch.span.clone(), note: "`if` without `else` must produce unit".into() },
            is_deferred: false,
          });
          let pure = ctx.mir.exprs[cond_handle].is_pure() && ctx.mir.exprs[then_handle].is_pure();
          (None, unit, pure)
        }
      };
      let flags = if is_pure { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::If { cond: cond_handle, then_branch: then_handle, else_branch: else_handle }, ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::Match { scrutinee, arms } => {
      let scrut_handle = elaborate_expr(ctx, scrutinee, ns)?;
      let scrut_ty = ctx.mir.exprs[scrut_handle].ty.clone();
      let mut result_ty: Option<TypeValue> = None;
      let mut new_arms = Vec::with_capacity(arms.len());
      let mut is_pure = ctx.mir.exprs[scrut_handle].is_pure();
      for arm in arms {
        ctx.scopes.push();
        let pat_handle = elaborate_pattern(ctx, &arm.pattern, Some(&scrut_ty), ns)?;
        crate::constraint::solve_type_equality(ctx, TypeEquality {
          constrainer: scrut_ty.clone(), constrained: ctx.mir.pats[pat_handle].ty.clone(), constrainer_note: None,
          constrained_note: Explanation { span: arm.pattern.span.clone(), note: "match arm pattern here".into() },
          is_deferred: false,
        });
        let body_handle = elaborate_expr(ctx, &arm.body, ns)?;
        ctx.scopes.pop(&mut ctx.diags);
        is_pure &= ctx.mir.exprs[body_handle].is_pure();
        let body_ty = ctx.mir.exprs[body_handle].ty.clone();
        match &result_ty {
          Some(expected) => {
            crate::constraint::solve_type_equality(ctx, TypeEquality {
              constrainer: expected.clone(), constrained: body_ty, constrainer_note: None,
              constrained_note: Explanation { span: arm.body.span.clone(), note: "match arm here".into() },
              is_deferred: false,
            });
          }
          None => result_ty = Some(body_ty),
        }
        new_arms.push(MatchArm { pattern: pat_handle, body: body_handle });
      }
      let ty = result_ty.unwrap_or_else(|| ctx.ty.unit_type(expr.span.clone()));
      let flags = if is_pure { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Match { scrutinee: scrut_handle, arms: new_arms }, ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::Let { pattern, ty, init } => {
      let init_handle = elaborate_expr(ctx, init, ns)?;
      let init_ty = ctx.mir.exprs[init_handle].ty.clone();
      let expected = match ty {
        Some(t) => {
          let declared = elaborate_type(ctx, t, ns)?;
          crate::constraint::solve_type_equality(ctx, TypeEquality {
            constrainer: declared.clone(), constrained: init_ty, constrainer_note: None,
            constrained_note: Explanation { span: init.span.clone(), note: "let-binding initializer here".into() },
            is_deferred: false,
          });
          declared
        }
        None => init_ty,
      };
      let pat_handle = elaborate_pattern(ctx, pattern, Some(&expected), ns)?;
      if !ctx.mir.pats[pat_handle].is_exhaustive_by_itself {
        ctx.diags.error(pattern.span.clone(), "a `let` pattern must be irrefutable");
      }
      let unit = ctx.ty.unit_type(expr.span.clone());
      let flags = if ctx.mir.exprs[init_handle].is_pure() { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Let { pattern: pat_handle, init: init_handle }, ty: unit, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::LocalAlias { name, ty } => {
      let resolved = elaborate_type(ctx, ty, ns)?;
      ctx.scopes.bind_type(&mut ctx.diags, name.symbol, crate::scope::TypeBinding::new(resolved.clone(), name.span.clone()));
      let unit = ctx.ty.unit_type(expr.span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::LocalAlias { name: name.symbol, ty: resolved }, ty: unit, span: expr.span.clone(), place_mutability, flags: ExprFlags::PURE }))
    }

    hir::ExpressionKind::Reference { mutability, operand } => {
      let op_handle = elaborate_expr(ctx, operand, ns)?;
      if !ctx.mir.exprs[op_handle].is_addressable() {
        ctx.diags.error(operand.span.clone(), "cannot take a reference to a temporary value");
      }
      let required = elaborate_mutability(ctx, mutability, &expr.span)?;
      let actual = ctx.mir.exprs[op_handle].place_mutability.clone();
      crate::constraint::solve_mutability_equality(ctx, MutEquality {
        constrainer: required.clone(), constrained: actual,
        constrainer_note: Explanation { span: expr.span.clone(), note: "this reference's mutability here".into() },
        constrained_note: Explanation { span: operand.span.clone(), note: "referenced place here".into() },
        is_deferred: false,
      });
      let operand_ty = ctx.mir.exprs[op_handle].ty.clone();
      let ty = ctx.ty.alloc_type(TypeVariant::Reference { mutability: required.clone(), referent: operand_ty }, expr.span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Reference { mutability: required, operand: op_handle }, ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::PURE }))
    }

    hir::ExpressionKind::Dereference(operand) => {
      let op_handle = elaborate_expr(ctx, operand, ns)?;
      let op_ty = ctx.mir.exprs[op_handle].ty.clone();
      match ctx.ty.flatten_type(&op_ty) {
        TypeVariant::Reference { mutability, referent } => {
          let op_pure = ctx.mir.exprs[op_handle].is_pure();
          let flags = if op_pure { ExprFlags::ADDRESSABLE | ExprFlags::PURE } else { ExprFlags::ADDRESSABLE };
          Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Dereference(op_handle), ty: referent, span: expr.span.clone(), place_mutability: mutability, flags }))
        }
        TypeVariant::Error => {
          let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
          Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Error, ty: op_ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::empty() }))
        }
        _ => {
          ctx.diags.error(operand.span.clone(), "cannot dereference a non-reference type; pointer dereference requires `unsafe`");
          Ok(error_expr(ctx, &expr.span))
        }
      }
    }

    hir::ExpressionKind::UnsafeDereference(operand) => {
      let op_handle = elaborate_expr(ctx, operand, ns)?;
      if ctx.current_safety != crate::context::Safety::Unsafe {
        ctx.diags.error(expr.span.clone(), "raw pointer dereference requires an `unsafe` block");
      }
      let op_ty = ctx.mir.exprs[op_handle].ty.clone();
      let (ty, place_mutability) = match ctx.ty.flatten_type(&op_ty) {
        TypeVariant::Pointer { mutability, pointee } => (pointee, mutability),
        TypeVariant::Error => (op_ty, ctx.ty.concrete_mut(false, expr.span.clone())),
        _ => {
          ctx.diags.error(operand.span.clone(), "expected a raw pointer here");
          let err = ctx.ty.alloc_type(TypeVariant::Error, expr.span.clone());
          (err, ctx.ty.concrete_mut(false, expr.span.clone()))
        }
      };
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::UnsafeDereference(op_handle), ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::ADDRESSABLE }))
    }

    hir::ExpressionKind::Addressof(operand) => {
      let op_handle = elaborate_expr(ctx, operand, ns)?;
      if !ctx.mir.exprs[op_handle].is_addressable() {
        ctx.diags.error(operand.span.clone(), "cannot take the address of a temporary value");
      }
      let mutability = ctx.mir.exprs[op_handle].place_mutability.clone();
      let pointee = ctx.mir.exprs[op_handle].ty.clone();
      let ty = ctx.ty.alloc_type(TypeVariant::Pointer { mutability, pointee }, expr.span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Addressof(op_handle), ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::PURE }))
    }

    hir::ExpressionKind::Move(operand) => {
      let op_handle = elaborate_expr(ctx, operand, ns)?;
      if !ctx.mir.exprs[op_handle].is_addressable() {
        ctx.diags.error(operand.span.clone(), "`move` requires an addressable place");
      }
      let ty = ctx.mir.exprs[op_handle].ty.clone();
      let place_mutability = ctx.mir.exprs[op_handle].place_mutability.clone();
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Move(op_handle), ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::ADDRESSABLE }))
    }

    hir::ExpressionKind::Sizeof(t) => {
      let target = elaborate_type(ctx, t, ns)?;
      // No `usize` variant exists in `IntTy`; `u64` stands in as the sizing integer (§3.2, `DESIGN.md`).
      let ty = ctx.ty.alloc_type(TypeVariant::UnsignedInt(IntTy::U64), expr.span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Sizeof(target), ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::PURE }))
    }

    hir::ExpressionKind::Invocation { callee, args } => {
      if let Some(h) = try_enum_ctor_invocation(ctx, callee, args, &expr.span, ns)? {
        return Ok(h)
      }
      let callee_handle = elaborate_expr(ctx, callee, ns)?;
      let mut arg_handles = Vec::with_capacity(args.len());
      for a in args { arg_handles.push(elaborate_expr(ctx, a, ns)?); }
      let callee_ty = ctx.mir.exprs[callee_handle].ty.clone();
      let (param_tys, ret_ty) = match ctx.ty.flatten_type(&callee_ty) {
        TypeVariant::Function { params, ret } => (params, ret),
        TypeVariant::Error => return Ok(error_expr(ctx, &expr.span)),
        _ => {
          ctx.diags.error(callee.span.clone(), "this expression is not callable");
          return Ok(error_expr(ctx, &expr.span));
        }
      };
      if param_tys.len() != arg_handles.len() {
        ctx.diags.error(expr.span.clone(), format!("expected {} arguments, found {}", param_tys.len(), arg_handles.len()));
      } else {
        for (p, a) in param_tys.iter().zip(arg_handles.iter()) {
          crate::constraint::solve_type_equality(ctx, TypeEquality {
            constrainer: p.clone(), constrained: ctx.mir.exprs[*a].ty.clone(), constrainer_note: None,
            constrained_note: Explanation { span: expr.span.clone(), note: "argument here".into() },
            is_deferred: false,
          });
        }
      }
      let is_pure = ctx.mir.exprs[callee_handle].is_pure() && arg_handles.iter().all(|h| ctx.mir.exprs[*h].is_pure());
      let flags = if is_pure { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Invocation { callee: callee_handle, args: arg_handles }, ty: ret_ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::MethodCall { receiver, method: method_name, template_args, args } => {
      let receiver_handle = elaborate_expr(ctx, receiver, ns)?;
      let receiver_ty = ctx.mir.exprs[receiver_handle].ty.clone();
      let Some(callee_info) = method::resolve_method(ctx, &receiver_ty, method_name.symbol, method_name.span.clone()) else {
        return Ok(error_expr(ctx, &expr.span));
      };
      let fn_id = match callee_info {
        MethodCallee::Function(id) => id,
        MethodCallee::FunctionTemplate(tmpl_id) => {
          let explicit = match template_args {
            Some(a) => ExplicitArgs::Ast(a),
            None => ExplicitArgs::Wildcards,
          };
          crate::instantiate::instantiate_function_template(ctx, tmpl_id, explicit, ns, expr.span.clone())?
        }
      };
      crate::resolve::ensure_resolved_function(ctx, fn_id)?;
      let Some(resolved) = ctx.functions[fn_id].body.resolved().cloned() else { return Err(Aborted) };
      if resolved.signature.params.is_empty() {
        ctx.diags.error(method_name.span.clone(), "this function does not take a `self` parameter and cannot be called as a method");
        return Ok(error_expr(ctx, &expr.span));
      }
      let first_param_ty = resolved.signature.params[0].2.clone();
      let adapted_receiver = adapt_receiver(ctx, receiver_handle, &first_param_ty, &method_name.span);
      crate::constraint::solve_type_equality(ctx, TypeEquality {
        constrainer: first_param_ty, constrained: ctx.mir.exprs[adapted_receiver].ty.clone(), constrainer_note: None,
        constrained_note: Explanation { span: receiver.span.clone(), note: "method receiver here".into() },
        is_deferred: false,
      });
      let mut arg_handles = Vec::with_capacity(args.len() + 1);
      arg_handles.push(adapted_receiver);
      for a in args { arg_handles.push(elaborate_expr(ctx, a, ns)?); }
      let rest_params = &resolved.signature.params[1..];
      if rest_params.len() != args.len() {
        ctx.diags.error(expr.span.clone(), format!("expected {} arguments, found {}", rest_params.len(), args.len()));
      } else {
        for (p, a) in rest_params.iter().zip(arg_handles[1..].iter()) {
          crate::constraint::solve_type_equality(ctx, TypeEquality {
            constrainer: p.2.clone(), constrained: ctx.mir.exprs[*a].ty.clone(), constrainer_note: None,
            constrained_note: Explanation { span: expr.span.clone(), note: "argument here".into() },
            is_deferred: false,
          });
        }
      }
      let is_application = ctx.functions[fn_id].template_instantiation_info.is_some();
      let fn_ty_variant = TypeVariant::Function {
        params: resolved.signature.params.iter().map(|(_, _, t)| t.clone()).collect(),
        ret: resolved.signature.ret.clone(),
      };
      let callee_ty = ctx.ty.alloc_type(fn_ty_variant, method_name.span.clone());
      let callee_place = ctx.ty.concrete_mut(false, method_name.span.clone());
      let callee_expr = ctx.mir.alloc_expr(Expression {
        kind: ExprKind::FunctionRef { info: fn_id, is_application },
        ty: callee_ty, span: method_name.span.clone(), place_mutability: callee_place, flags: ExprFlags::PURE,
      });
      let ret_ty = resolved.signature.ret.clone();
      let is_pure = arg_handles.iter().all(|h| ctx.mir.exprs[*h].is_pure());
      let flags = if is_pure { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Invocation { callee: callee_expr, args: arg_handles }, ty: ret_ty, span: expr.span.clone(), place_mutability, flags }))
    }

    // Scoped narrowly to function templates: generic structs/enums/aliases are addressed through
    // type position, and typeclasses/namespaces are never first-class values (§4.6, `DESIGN.md`).
    hir::ExpressionKind::TemplateApplication { name, args } => {
      let entry = resolve_lower(ctx, name, ns)?;
      match entry {
        LowerEntry::FunctionTemplate(tmpl_id) => {
          let fn_id = crate::instantiate::instantiate_function_template(ctx, tmpl_id, ExplicitArgs::Ast(args), ns, expr.span.clone())?;
          crate::resolve::ensure_resolved_function(ctx, fn_id)?;
          build_function_ref_expr(ctx, fn_id, true, &expr.span)
        }
        LowerEntry::Function(_) => {
          ctx.diags.error(expr.span.clone(), "this function is not generic");
          Err(Aborted)
        }
        _ => {
          ctx.diags.error(expr.span.clone(), "only a generic function can be instantiated as a value here");
          Err(Aborted)
        }
      }
    }

    hir::ExpressionKind::Variable(qname) => {
      if qname.is_unqualified() {
        if let Some(binding) = ctx.scopes.find_variable(qname.last().symbol) {
          let ty = binding.ty.clone();
          let place_mutability = binding.mutability.clone();
          let var = binding.var;
          return Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::LocalVarRef(var), ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::ADDRESSABLE | ExprFlags::PURE }));
        }
      }
      match resolve_lower(ctx, qname, ns)? {
        LowerEntry::Function(id) => {
          crate::resolve::ensure_resolved_function(ctx, id)?;
          build_function_ref_expr(ctx, id, false, &expr.span)
        }
        LowerEntry::FunctionTemplate(tmpl_id) => {
          let id = crate::instantiate::instantiate_function_template(ctx, tmpl_id, ExplicitArgs::Wildcards, ns, expr.span.clone())?;
          build_function_ref_expr(ctx, id, true, &expr.span)
        }
        LowerEntry::EnumConstructor { enum_info, ctor } => {
          crate::resolve::ensure_resolved_enum(ctx, enum_info)?;
          let resolved = ctx.enums[enum_info].body.resolved().cloned().ok_or(Aborted)?;
          let payload_ty = resolved.ctors.iter().find(|(n, _)| *n == ctor).and_then(|(_, p)| p.clone());
          let is_app = ctx.enums[enum_info].template_instantiation_info.is_some();
          let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
          let ty = match payload_ty {
            None => ctx.ty.alloc_type(TypeVariant::Enumeration { info: enum_info, is_application: is_app }, expr.span.clone()),
            Some(payload) => {
              let enum_ty = ctx.ty.alloc_type(TypeVariant::Enumeration { info: enum_info, is_application: is_app }, expr.span.clone());
              ctx.ty.alloc_type(TypeVariant::Function { params: vec![payload], ret: enum_ty }, expr.span.clone())
            }
          };
          Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::EnumCtorRef { info: enum_info, ctor }, ty, span: expr.span.clone(), place_mutability, flags: ExprFlags::PURE }))
        }
        LowerEntry::Namespace(_) => {
          ctx.diags.error(expr.span.clone(), "a namespace cannot be used as a value");
          Err(Aborted)
        }
      }
    }

    hir::ExpressionKind::StructInit { ty, template_args, fields } => {
      let entry = resolve_upper(ctx, ty, ns)?;
      let last_span = ty.last().span.clone();
      let struct_id = match entry {
        UpperEntry::Struct(id) => {
          if !template_args.is_empty() {
            ctx.diags.error(last_span, "this struct is not generic");
          }
          id
        }
        UpperEntry::StructTemplate(tmpl_id) => {
          crate::instantiate::instantiate_struct_template(ctx, tmpl_id, ExplicitArgs::Ast(template_args), ns, expr.span.clone())?
        }
        _ => {
          ctx.diags.error(last_span, "expected a struct name here");
          return Err(Aborted);
        }
      };
      crate::resolve::ensure_resolved_struct(ctx, struct_id)?;
      let members = ctx.structs[struct_id].body.resolved().map(|r| r.members.clone()).unwrap_or_default();
      let mut seen = HashSet::new();
      let mut new_fields = Vec::with_capacity(fields.len());
      for (name, value) in fields {
        let value_handle = elaborate_expr(ctx, value, ns)?;
        if !seen.insert(name.symbol) {
          ctx.diags.error(name.span.clone(), format!("field `{}` specified more than once", name.symbol.as_str()));
        }
        match members.iter().find(|(n, _)| *n == name.symbol) {
          Some((_, declared)) => {
            crate::constraint::solve_type_equality(ctx, TypeEquality {
              constrainer: declared.clone(), constrained: ctx.mir.exprs[value_handle].ty.clone(), constrainer_note: None,
              constrained_note: Explanation { span: value.span.clone(), note: "field initializer here".into() },
              is_deferred: false,
            });
          }
          None => ctx.diags.error(name.span.clone(), format!("struct has no field named `{}`", name.symbol.as_str())),
        }
        new_fields.push((name.symbol, value_handle));
      }
      for (member_name, _) in &members {
        if !seen.contains(member_name) {
          ctx.diags.error(expr.span.clone(), format!("missing field `{}`", member_name.as_str()));
        }
      }
      let is_app = ctx.structs[struct_id].template_instantiation_info.is_some();
      let result_ty = ctx.ty.alloc_type(TypeVariant::Structure { info: struct_id, is_application: is_app }, expr.span.clone());
      let flags = if new_fields.iter().all(|(_, h)| ctx.mir.exprs[*h].is_pure()) { ExprFlags::PURE } else { ExprFlags::empty() };
      let place_mutability = ctx.ty.concrete_mut(false, expr.span.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::StructInit { info: struct_id, fields: new_fields }, ty: result_ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::FieldAccess { base, field } => {
      let base_handle = elaborate_expr(ctx, base, ns)?;
      let is_addressable = ctx.mir.exprs[base_handle].is_addressable();
      let place_mutability = ctx.mir.exprs[base_handle].place_mutability.clone();
      let base_ty = ctx.mir.exprs[base_handle].ty.clone();
      let field_ty = ctx.fresh_general_type_var(vec![], expr.span.clone());
      let kind_field = match field {
        hir::FieldName::Named(name) => {
          ctx.deferred.struct_fields.push(StructFieldConstraint {
            struct_ty: base_ty, field_ty: field_ty.clone(), field_name: name.symbol,
            explanation: Explanation { span: name.span.clone(), note: "field access here".into() },
          });
          FieldAccessKind::Named(name.symbol)
        }
        hir::FieldName::Tuple(index, fspan) => {
          ctx.deferred.tuple_fields.push(TupleFieldConstraint {
            tuple_ty: base_ty, field_ty: field_ty.clone(), index: *index,
            explanation: Explanation { span: fspan.clone(), note: "tuple field access here".into() },
          });
          FieldAccessKind::Tuple(*index)
        }
      };
      let flags = if is_addressable { ExprFlags::ADDRESSABLE | ExprFlags::PURE } else { ExprFlags::PURE };
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::FieldAccess { base: base_handle, field: kind_field }, ty: field_ty, span: expr.span.clone(), place_mutability, flags }))
    }

    hir::ExpressionKind::SelfValue(self_span) => {
      let self_symbol = intern::intern("self");
      match ctx.scopes.find_variable(self_symbol) {
        Some(binding) => {
          let ty = binding.ty.clone();
          let place_mutability = binding.mutability.clone();
          let var = binding.var;
          Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::LocalVarRef(var), ty, span: self_span.clone(), place_mutability, flags: ExprFlags::ADDRESSABLE | ExprFlags::PURE }))
        }
        None => {
          ctx.diags.error(self_span.clone(), "`self` is only valid inside a method body");
          Err(Aborted)
        }
      }
    }

    hir::ExpressionKind::Hole(hspan) => {
      let ty = ctx.fresh_general_type_var(vec![], hspan.clone());
      let place_mutability = ctx.ty.concrete_mut(false, hspan.clone());
      Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Hole, ty, span: hspan.clone(), place_mutability, flags: ExprFlags::empty() }))
    }

    hir::ExpressionKind::Unsafe(block) => {
      let prev = ctx.current_safety;
      ctx.current_safety = crate::context::Safety::Unsafe;
      let result = elaborate_block(ctx, block, &expr.span, ns);
      ctx.current_safety = prev;
      result
    }

    hir::ExpressionKind::For { span: s }
    | hir::ExpressionKind::Lambda { span: s }
    | hir::ExpressionKind::Cast { span: s }
    | hir::ExpressionKind::Ret { span: s }
    | hir::ExpressionKind::NamedArgInvocation { span: s } => {
      ctx.diags.error(s.clone(), "not supported yet");
      Err(Aborted)
    }
  }
}

/// Elaborates a block's effects and tail in a fresh child scope (§4.6). `enclosing_span` stands
/// in for the span `hir::Block` itself doesn't carry.
fn elaborate_block(ctx: &mut Context, block: &hir::Block, enclosing_span: &Span, ns: NamespaceId) -> RResult<ExprHandle> {
  ctx.scopes.push();
  let mut effect_handles = Vec::with_capacity(block.effects.len());
  for e in &block.effects {
    match elaborate_expr(ctx, e, ns) {
      Ok(h) => {
        if ctx.mir.exprs[h].is_pure() {
          let is_unit = matches!(ctx.ty.flatten_type(&ctx.mir.exprs[h].ty), TypeVariant::Tuple(f) if f.is_empty());
          if !is_unit {
            ctx.diags.warning_at(
              vec![TextSection { span: e.span.clone(), note: "this expression's value is discarded".into() }],
              "pure side-effect expression has no effect",
              None,
            );
          }
        }
        effect_handles.push(h);
      }
      // Recoverable at the statement level: keep elaborating the rest of the block (§7).
      Err(Aborted) => {}
    }
  }
  let result_handle = match &block.tail {
    Some(tail) => elaborate_expr(ctx, tail, ns)?,
    None => {
      let unit = ctx.ty.unit_type(enclosing_span.clone());
      let place_mutability = ctx.ty.concrete_mut(false, enclosing_span.clone());
      ctx.mir.alloc_expr(Expression { kind: ExprKind::Tuple(vec![]), ty: unit, span: enclosing_span.clone(), place_mutability, flags: ExprFlags::PURE })
    }
  };
  ctx.scopes.pop(&mut ctx.diags);
  let ty = ctx.mir.exprs[result_handle].ty.clone();
  let place_mutability = ctx.mir.exprs[result_handle].place_mutability.clone();
  let is_pure = effect_handles.iter().all(|h| ctx.mir.exprs[*h].is_pure()) && ctx.mir.exprs[result_handle].is_pure();
  let flags = if is_pure { ExprFlags::PURE } else { ExprFlags::empty() };
  Ok(ctx.mir.alloc_expr(Expression { kind: ExprKind::Block { effects: effect_handles, result: result_handle }, ty, span: enclosing_span.clone(), place_mutability, flags }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::Context;
  use crate::span::FileId;
  use crate::types::ty::TypeVarKind;
  use std::rc::Rc;

  fn span() -> Span {
    Span { file: FileId(Rc::from("test")), start_line: 1, start_col: 1, end_line: 1, end_col: 1 }
  }

  #[test]
  fn literal_int_gets_a_fresh_integral_variable() {
    let mut ctx = Context::new();
    let lit = hir::Literal::Int(BigInt::from(1));
    let ty = literal_type(&mut ctx, &lit, &span());
    assert!(matches!(ctx.ty.pure_type(&ty), TypeVariant::Variable(TypeVarKind::Integral, _)));
  }

  #[test]
  fn break_outside_a_loop_is_rejected() {
    let mut ctx = Context::new();
    let ns = ctx.global_namespace;
    let expr = hir::Expression { kind: hir::ExpressionKind::Break { label: None, result: None }, span: span() };
    assert!(elaborate_expr(&mut ctx, &expr, ns).is_err());
  }
}
