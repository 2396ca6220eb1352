//! Template instantiation (C10, §4.8): argument resolution against a template's parameter list,
//! followed by substitution of the template's already-resolved generic body.
//!
//! A template is resolved exactly once, generically — its body refers to its own parameters as
//! [`crate::types::ty::TypeVariant::TemplateParameterRef`]/[`crate::types::ty::MutVariant::Parameterized`]
//! nodes, never to a concrete type. Instantiating it for a particular argument list re-walks that
//! resolved body substituting concrete values for those nodes, allocating fresh arena nodes as it
//! goes; nothing is shared between two instantiations of the same template, including local
//! variable identity (a fresh [`LocalVarTag`] is minted per instantiation for every `let`/parameter
//! binding the substituted body introduces).
//!
//! Instantiations are not deduplicated against a structurally-equal prior instantiation — every
//! call mints a new `*InfoId` and records it on the originating template's `instantiations` list
//! (§4.8, `DESIGN.md`).

use bit_vec::BitVec;
use hashbrown::HashMap;
use smallvec::SmallVec;
use crate::context::{Context, Explanation, InstanceConstraint, TypeEquality};
use crate::diag::{Aborted, RResult};
use crate::elaborate;
use crate::hir;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::entity::{
  AliasInfo, DefBody, EnumInfo, FnBody, FunctionInfo, FunctionSignature, ResolutionState,
  ResolvedEnum, ResolvedFunction, ResolvedStruct, StructInfo, TemplateArgumentValue,
  TemplateInstantiationInfo, TemplateParameter, TemplateParamKind,
};
use crate::types::mir::{Expression, ExprKind, MatchArm, PatKind, Pattern};
use crate::types::namespace::LowerEntry;
use crate::types::ty::{ArrayLen, MutValue, MutVariant, TypeValue, TypeVariant};
use crate::types::{
  AliasInfoId, AliasTemplateInfoId, EnumInfoId, EnumTemplateInfoId, ExprHandle,
  FunctionInfoId, FunctionTemplateInfoId, LocalVarTag, NamespaceId, PatHandle, StructInfoId,
  StructTemplateInfoId,
};

/// The three ways a template application's arguments can arrive.
pub enum ExplicitArgs<'a> {
  /// Surface syntax `name[arg, arg, ...]`, resolved against the parameter list's arity bounds.
  Ast(&'a [hir::TemplateArgument]),
  /// Already-resolved values, one per parameter, with no arity checking — used when substitution
  /// re-instantiates a nested template application (§4.8).
  Values(Vec<TemplateArgumentValue>),
  /// A bare reference to a generic function with no `[...]` at all: every parameter gets a fresh
  /// unification variable (§4.6: "instantiated with synthetic wildcard arguments").
  Wildcards,
}

/// A template-parameter-tag-keyed substitution, built once per instantiation and threaded through
/// the whole body-rewrite. `var_remap` is not part of the template's parameter list at all: it
/// tracks the fresh [`LocalVarTag`] minted for each `let`/parameter binding encountered so far in
/// *this* instantiation, so that a `LocalVarRef` later in the same body is rewritten consistently.
pub struct Substitution {
  pub types: HashMap<crate::types::TemplateParamTag, TypeValue>,
  pub muts: HashMap<crate::types::TemplateParamTag, MutValue>,
  var_remap: HashMap<LocalVarTag, LocalVarTag>,
}

impl Substitution {
  #[must_use] pub fn empty() -> Self {
    Self { types: HashMap::new(), muts: HashMap::new(), var_remap: HashMap::new() }
  }
  pub fn bind(&mut self, param: &TemplateParameter, value: &TemplateArgumentValue) {
    match value {
      TemplateArgumentValue::Type(t) => { self.types.insert(param.tag, t.clone()); }
      TemplateArgumentValue::Mutability(m) => { self.muts.insert(param.tag, m.clone()); }
      // A value parameter's uses in the body are ordinary `LocalVarRef`s, not
      // `TemplateParameterRef`s, and so are already handled by `var_remap` — see `DESIGN.md`.
      TemplateArgumentValue::Value(_) => {}
    }
  }
}

fn arg_bounds(params: &[TemplateParameter]) -> (usize, usize) {
  let min = params.iter().take_while(|p| p.default.is_none()).count();
  let max = params.iter().position(|p| p.is_implicit).unwrap_or(params.len());
  (min, max)
}

fn build_substitution(params: &[TemplateParameter], values: &[TemplateArgumentValue]) -> Substitution {
  let mut subst = Substitution::empty();
  for (p, v) in params.iter().zip(values.iter()) {
    subst.bind(p, v);
  }
  subst
}

fn resolve_one_argument(
  ctx: &mut Context,
  param: &TemplateParameter,
  arg: Option<&hir::TemplateArgument>,
  ns: NamespaceId,
  span: &Span,
) -> RResult<TemplateArgumentValue> {
  match (&param.kind, arg) {
    (TemplateParamKind::Type { class_constraints }, Some(hir::TemplateArgument::Type(t))) => {
      let ty = elaborate::elaborate_type(ctx, t, ns)?;
      for class in class_constraints {
        ctx.deferred.instances.push(InstanceConstraint {
          ty: ty.clone(),
          class: class.clone(),
          explanation: Explanation { span: t.span.clone(), note: "template argument bound by this class constraint".into() },
        });
      }
      Ok(TemplateArgumentValue::Type(ty))
    }
    (TemplateParamKind::Type { class_constraints }, Some(hir::TemplateArgument::Wildcard(wspan))) => {
      Ok(TemplateArgumentValue::Type(ctx.fresh_general_type_var(class_constraints.clone(), wspan.clone())))
    }
    (TemplateParamKind::Type { class_constraints }, None) => {
      Ok(TemplateArgumentValue::Type(ctx.fresh_general_type_var(class_constraints.clone(), span.clone())))
    }
    (TemplateParamKind::Mutability, Some(hir::TemplateArgument::Mutability(m))) => {
      Ok(TemplateArgumentValue::Mutability(elaborate::elaborate_mutability(ctx, m, span)?))
    }
    (TemplateParamKind::Mutability, Some(hir::TemplateArgument::Wildcard(wspan))) => {
      Ok(TemplateArgumentValue::Mutability(ctx.fresh_mutability_var(wspan.clone())))
    }
    (TemplateParamKind::Mutability, None) => {
      Ok(TemplateArgumentValue::Mutability(ctx.fresh_mutability_var(span.clone())))
    }
    (TemplateParamKind::Value { ty }, Some(hir::TemplateArgument::Value(e))) => {
      let expected = elaborate::elaborate_type(ctx, ty, ns)?;
      let handle = elaborate::elaborate_expr(ctx, e, ns)?;
      let actual = ctx.mir.exprs[handle].ty.clone();
      crate::constraint::solve_type_equality(ctx, TypeEquality {
        constrainer: expected,
        constrained: actual,
        constrainer_note: None,
        constrained_note: Explanation { span: e.span.clone(), note: "value template argument here".into() },
        is_deferred: false,
      });
      Ok(TemplateArgumentValue::Value(handle))
    }
    (TemplateParamKind::Value { .. }, Some(hir::TemplateArgument::Wildcard(wspan))) => {
      ctx.diags.error(wspan.clone(), "value template parameters cannot be inferred from a wildcard");
      Err(Aborted)
    }
    (TemplateParamKind::Value { .. }, None) => {
      ctx.diags.error(span.clone(), "value template parameter requires an explicit argument");
      Err(Aborted)
    }
    _ => {
      ctx.diags.error(span.clone(), "template argument does not match the parameter's kind");
      Err(Aborted)
    }
  }
}

/// Binds `prior_params[i]` (by name) to `prior_values[i]` in a fresh scope, so that a default
/// expression like `fn foo[T, n: usize = sizeof(T)]` can refer to the earlier parameter `T`, then
/// elaborates `default` in the template's home namespace (§4.8).
fn resolve_default_argument(
  ctx: &mut Context,
  param: &TemplateParameter,
  default: &hir::TemplateArgument,
  home: NamespaceId,
  prior_params: &[TemplateParameter],
  prior_values: &[TemplateArgumentValue],
  span: &Span,
) -> RResult<TemplateArgumentValue> {
  ctx.scopes.push();
  for (p, v) in prior_params.iter().zip(prior_values.iter()) {
    if let Some(name) = p.name {
      match v {
        TemplateArgumentValue::Type(ty) => {
          let binding = crate::scope::TypeBinding::new(ty.clone(), span.clone());
          ctx.scopes.bind_type(&mut ctx.diags, name, binding);
        }
        TemplateArgumentValue::Mutability(_) => {
          let binding = crate::scope::MutabilityBinding::new(p.tag, span.clone());
          ctx.scopes.bind_mutability(&mut ctx.diags, name, binding);
        }
        TemplateArgumentValue::Value(expr_handle) => {
          let ty = ctx.mir.exprs[*expr_handle].ty.clone();
          let mutability = ctx.ty.concrete_mut(false, span.clone());
          let var = ctx.fresh_local_var_tag();
          let binding = crate::scope::VariableBinding::new(var, ty, mutability, span.clone());
          ctx.scopes.bind_variable(&mut ctx.diags, name, binding);
        }
      }
    }
  }

  let result = match (&param.kind, default) {
    (TemplateParamKind::Type { class_constraints }, hir::TemplateArgument::Type(t)) => {
      elaborate::elaborate_type(ctx, t, home).map(|ty| {
        for class in class_constraints {
          ctx.deferred.instances.push(InstanceConstraint {
            ty: ty.clone(), class: class.clone(),
            explanation: Explanation { span: span.clone(), note: "defaulted template argument".into() },
          });
        }
        TemplateArgumentValue::Type(ty)
      })
    }
    (TemplateParamKind::Mutability, hir::TemplateArgument::Mutability(m)) => {
      elaborate::elaborate_mutability(ctx, m, span).map(TemplateArgumentValue::Mutability)
    }
    (TemplateParamKind::Value { ty }, hir::TemplateArgument::Value(e)) => (|| {
      let expected = elaborate::elaborate_type(ctx, ty, home)?;
      let handle = elaborate::elaborate_expr(ctx, e, home)?;
      let actual = ctx.mir.exprs[handle].ty.clone();
      crate::constraint::solve_type_equality(ctx, TypeEquality {
        constrainer: expected, constrained: actual, constrainer_note: None,
        constrained_note: Explanation { span: span.clone(), note: "defaulted value template argument here".into() },
        is_deferred: false,
      });
      Ok(TemplateArgumentValue::Value(handle))
    })(),
    _ => {
      ctx.diags.error(span.clone(), "defaulted template argument does not match the parameter's kind");
      Err(Aborted)
    }
  };
  ctx.scopes.pop(&mut ctx.diags);
  result
}

fn resolve_arguments(
  ctx: &mut Context,
  params: &[TemplateParameter],
  args: ExplicitArgs,
  home: NamespaceId,
  caller_ns: NamespaceId,
  span: &Span,
) -> RResult<Vec<TemplateArgumentValue>> {
  match args {
    ExplicitArgs::Values(values) => {
      if values.len() != params.len() {
        ctx.diags.error(span.clone(), "internal: template argument count mismatch on re-instantiation");
        return Err(Aborted);
      }
      Ok(values)
    }
    ExplicitArgs::Wildcards => {
      let mut out = SmallVec::<[TemplateArgumentValue; 4]>::new();
      for p in params {
        out.push(resolve_one_argument(ctx, p, None, caller_ns, span)?);
      }
      Ok(out.into_vec())
    }
    ExplicitArgs::Ast(asts) => {
      let (min, max) = arg_bounds(params);
      let n = asts.len();
      let bound_ok = if min == max { n == min } else { n >= min && n <= max };
      // A bitmap of which parameter positions the call site is allowed to touch at all — mirrors
      // the arity check conceptually (everything from `max` on is implicit-only).
      let mut in_range = BitVec::from_elem(params.len(), false);
      for i in 0..n.min(max) { in_range.set(i, true); }
      if !bound_ok {
        ctx.diags.error(span.clone(), format!("expected between {min} and {max} template arguments, found {n}"));
        return Err(Aborted);
      }
      let mut out: Vec<TemplateArgumentValue> = Vec::with_capacity(params.len());
      for (i, p) in params.iter().enumerate() {
        let value = if in_range[i] && i < n {
          resolve_one_argument(ctx, p, Some(&asts[i]), caller_ns, span)?
        } else if let Some(default) = p.default.clone() {
          resolve_default_argument(ctx, p, &default, home, &params[..i], &out, span)?
        } else {
          resolve_one_argument(ctx, p, None, caller_ns, span)?
        };
        out.push(value);
      }
      Ok(out)
    }
  }
}

fn subst_template_argument(ctx: &mut Context, subst: &mut Substitution, a: &TemplateArgumentValue) -> TemplateArgumentValue {
  match a {
    TemplateArgumentValue::Type(t) => TemplateArgumentValue::Type(subst_type(ctx, subst, t)),
    TemplateArgumentValue::Mutability(m) => TemplateArgumentValue::Mutability(subst_mut(ctx, subst, m)),
    TemplateArgumentValue::Value(e) => TemplateArgumentValue::Value(subst_expr(ctx, subst, *e)),
  }
}

fn subst_function_info(ctx: &mut Context, subst: &mut Substitution, info: FunctionInfoId, is_application: bool) -> FunctionInfoId {
  if !is_application { return info }
  let Some(inst) = ctx.functions[info].template_instantiation_info.clone() else { return info };
  let new_args: Vec<_> = inst.template_arguments.iter().map(|a| subst_template_argument(ctx, subst, a)).collect();
  let span = ctx.functions[info].span.clone();
  let ns = ctx.functions[info].home;
  instantiate_function_template(ctx, inst.template, ExplicitArgs::Values(new_args), ns, span).unwrap_or(info)
}

fn subst_struct_info(ctx: &mut Context, subst: &mut Substitution, info: StructInfoId) -> StructInfoId {
  let Some(inst) = ctx.structs[info].template_instantiation_info.clone() else { return info };
  let new_args: Vec<_> = inst.template_arguments.iter().map(|a| subst_template_argument(ctx, subst, a)).collect();
  let span = ctx.structs[info].span.clone();
  let home = ctx.structs[info].home;
  instantiate_struct_template(ctx, inst.template, ExplicitArgs::Values(new_args), home, span).unwrap_or(info)
}

fn subst_enum_info(ctx: &mut Context, subst: &mut Substitution, info: EnumInfoId) -> EnumInfoId {
  let Some(inst) = ctx.enums[info].template_instantiation_info.clone() else { return info };
  let new_args: Vec<_> = inst.template_arguments.iter().map(|a| subst_template_argument(ctx, subst, a)).collect();
  let span = ctx.enums[info].span.clone();
  let home = ctx.enums[info].home;
  instantiate_enum_template(ctx, inst.template, ExplicitArgs::Values(new_args), home, span).unwrap_or(info)
}

/// Rewrites `ty` through `subst`: template-parameter references are replaced by their bound
/// argument, already-solved unification variables are flattened away, and a structure/enumeration
/// produced by an earlier template application is re-instantiated against the substituted
/// arguments (§4.8).
pub fn subst_type(ctx: &mut Context, subst: &mut Substitution, ty: &TypeValue) -> TypeValue {
  let variant = ctx.ty.flatten_type(ty);
  let span = ty.span.clone();
  match variant {
    TypeVariant::TemplateParameterRef { tag, .. } => subst.types.get(&tag).cloned().unwrap_or_else(|| ty.clone()),
    TypeVariant::SignedInt(_) | TypeVariant::UnsignedInt(_) | TypeVariant::Floating | TypeVariant::Character
    | TypeVariant::Boolean | TypeVariant::Str | TypeVariant::SelfPlaceholder | TypeVariant::Error
    | TypeVariant::Variable(..) => ty.clone(),
    TypeVariant::Tuple(fields) => {
      let fields = fields.iter().map(|f| subst_type(ctx, subst, f)).collect();
      ctx.ty.alloc_type(TypeVariant::Tuple(fields), span)
    }
    TypeVariant::Array(elem, len) => {
      let elem = subst_type(ctx, subst, &elem);
      let new_len_ty = subst_type(ctx, subst, &len.ty);
      let new_len_expr = subst_expr(ctx, subst, len.expr);
      ctx.ty.alloc_type(TypeVariant::Array(elem, ArrayLen { expr: new_len_expr, ty: new_len_ty }), span)
    }
    TypeVariant::Slice(elem) => {
      let elem = subst_type(ctx, subst, &elem);
      ctx.ty.alloc_type(TypeVariant::Slice(elem), span)
    }
    TypeVariant::Pointer { mutability, pointee } => {
      let mutability = subst_mut(ctx, subst, &mutability);
      let pointee = subst_type(ctx, subst, &pointee);
      ctx.ty.alloc_type(TypeVariant::Pointer { mutability, pointee }, span)
    }
    TypeVariant::Reference { mutability, referent } => {
      let mutability = subst_mut(ctx, subst, &mutability);
      let referent = subst_type(ctx, subst, &referent);
      ctx.ty.alloc_type(TypeVariant::Reference { mutability, referent }, span)
    }
    TypeVariant::Function { params, ret } => {
      let params = params.iter().map(|p| subst_type(ctx, subst, p)).collect();
      let ret = subst_type(ctx, subst, &ret);
      ctx.ty.alloc_type(TypeVariant::Function { params, ret }, span)
    }
    TypeVariant::Structure { info, is_application } => {
      if !is_application { return ty.clone() }
      let new_info = subst_struct_info(ctx, subst, info);
      ctx.ty.alloc_type(TypeVariant::Structure { info: new_info, is_application: true }, span)
    }
    TypeVariant::Enumeration { info, is_application } => {
      if !is_application { return ty.clone() }
      let new_info = subst_enum_info(ctx, subst, info);
      ctx.ty.alloc_type(TypeVariant::Enumeration { info: new_info, is_application: true }, span)
    }
  }
}

pub fn subst_mut(ctx: &mut Context, subst: &mut Substitution, m: &MutValue) -> MutValue {
  let variant = ctx.ty.flatten_mut(m);
  match variant {
    MutVariant::Parameterized { tag, .. } => subst.muts.get(&tag).cloned().unwrap_or_else(|| m.clone()),
    MutVariant::Concrete { .. } | MutVariant::Variable(_) => m.clone(),
  }
}

pub fn subst_expr(ctx: &mut Context, subst: &mut Substitution, e: ExprHandle) -> ExprHandle {
  let node = ctx.mir.exprs[e].clone();
  let ty = subst_type(ctx, subst, &node.ty);
  let place_mutability = subst_mut(ctx, subst, &node.place_mutability);
  let kind = match node.kind {
    ExprKind::Literal(l) => ExprKind::Literal(l),
    ExprKind::Tuple(es) => ExprKind::Tuple(es.into_iter().map(|x| subst_expr(ctx, subst, x)).collect()),
    ExprKind::ArrayLiteral(es) => ExprKind::ArrayLiteral(es.into_iter().map(|x| subst_expr(ctx, subst, x)).collect()),
    ExprKind::Block { effects, result } => ExprKind::Block {
      effects: effects.into_iter().map(|x| subst_expr(ctx, subst, x)).collect(),
      result: subst_expr(ctx, subst, result),
    },
    ExprKind::Loop { label, body } => ExprKind::Loop { label, body: subst_expr(ctx, subst, body) },
    ExprKind::Break { label, result } => ExprKind::Break { label, result: result.map(|r| subst_expr(ctx, subst, r)) },
    ExprKind::Continue { label } => ExprKind::Continue { label },
    ExprKind::If { cond, then_branch, else_branch } => ExprKind::If {
      cond: subst_expr(ctx, subst, cond),
      then_branch: subst_expr(ctx, subst, then_branch),
      else_branch: else_branch.map(|b| subst_expr(ctx, subst, b)),
    },
    ExprKind::Match { scrutinee, arms } => ExprKind::Match {
      scrutinee: subst_expr(ctx, subst, scrutinee),
      arms: arms.into_iter().map(|a| MatchArm { pattern: subst_pat(ctx, subst, a.pattern), body: subst_expr(ctx, subst, a.body) }).collect(),
    },
    ExprKind::Let { pattern, init } => ExprKind::Let { pattern: subst_pat(ctx, subst, pattern), init: subst_expr(ctx, subst, init) },
    ExprKind::LocalAlias { name, ty: t } => ExprKind::LocalAlias { name, ty: subst_type(ctx, subst, &t) },
    ExprKind::Reference { mutability, operand } => ExprKind::Reference { mutability: subst_mut(ctx, subst, &mutability), operand: subst_expr(ctx, subst, operand) },
    ExprKind::Dereference(x) => ExprKind::Dereference(subst_expr(ctx, subst, x)),
    ExprKind::UnsafeDereference(x) => ExprKind::UnsafeDereference(subst_expr(ctx, subst, x)),
    ExprKind::Addressof(x) => ExprKind::Addressof(subst_expr(ctx, subst, x)),
    ExprKind::Move(x) => ExprKind::Move(subst_expr(ctx, subst, x)),
    ExprKind::Sizeof(t) => ExprKind::Sizeof(subst_type(ctx, subst, &t)),
    ExprKind::Invocation { callee, args } => ExprKind::Invocation {
      callee: subst_expr(ctx, subst, callee),
      args: args.into_iter().map(|a| subst_expr(ctx, subst, a)).collect(),
    },
    ExprKind::EnumCtorRef { info, ctor } => ExprKind::EnumCtorRef { info: subst_enum_info(ctx, subst, info), ctor },
    ExprKind::EnumCtorInvocation { info, ctor, payload } => ExprKind::EnumCtorInvocation {
      info: subst_enum_info(ctx, subst, info), ctor, payload: subst_expr(ctx, subst, payload),
    },
    ExprKind::FunctionRef { info, is_application } => ExprKind::FunctionRef { info: subst_function_info(ctx, subst, info, is_application), is_application },
    ExprKind::LocalVarRef(tag) => ExprKind::LocalVarRef(*subst.var_remap.get(&tag).unwrap_or(&tag)),
    ExprKind::StructInit { info, fields } => ExprKind::StructInit {
      info: subst_struct_info(ctx, subst, info),
      fields: fields.into_iter().map(|(n, x)| (n, subst_expr(ctx, subst, x))).collect(),
    },
    ExprKind::FieldAccess { base, field } => ExprKind::FieldAccess { base: subst_expr(ctx, subst, base), field },
    ExprKind::SelfValue => ExprKind::SelfValue,
    ExprKind::Hole => ExprKind::Hole,
    ExprKind::Error => ExprKind::Error,
  };
  ctx.mir.alloc_expr(Expression { kind, ty, span: node.span, place_mutability, flags: node.flags })
}

pub fn subst_pat(ctx: &mut Context, subst: &mut Substitution, p: PatHandle) -> PatHandle {
  let node = ctx.mir.pats[p].clone();
  let ty = subst_type(ctx, subst, &node.ty);
  let kind = match node.kind {
    PatKind::Wildcard => PatKind::Wildcard,
    PatKind::Literal(l) => PatKind::Literal(l),
    PatKind::Name { var, mutability } => {
      let new_var = ctx.fresh_local_var_tag();
      subst.var_remap.insert(var, new_var);
      PatKind::Name { var: new_var, mutability: subst_mut(ctx, subst, &mutability) }
    }
    PatKind::Tuple(ps) => PatKind::Tuple(ps.into_iter().map(|x| subst_pat(ctx, subst, x)).collect()),
    PatKind::Slice(ps) => PatKind::Slice(ps.into_iter().map(|x| subst_pat(ctx, subst, x)).collect()),
    PatKind::Ctor { info, ctor, payload } => PatKind::Ctor {
      info: subst_enum_info(ctx, subst, info), ctor, payload: payload.map(|x| subst_pat(ctx, subst, x)),
    },
    PatKind::As(inner, var) => {
      let inner = subst_pat(ctx, subst, inner);
      let new_var = ctx.fresh_local_var_tag();
      subst.var_remap.insert(var, new_var);
      PatKind::As(inner, new_var)
    }
    PatKind::Guarded(inner, guard) => PatKind::Guarded(subst_pat(ctx, subst, inner), subst_expr(ctx, subst, guard)),
    PatKind::Error => PatKind::Error,
  };
  ctx.mir.alloc_pat(Pattern { kind, ty, span: node.span, is_exhaustive_by_itself: node.is_exhaustive_by_itself })
}

pub fn instantiate_function_template(ctx: &mut Context, tmpl_id: FunctionTemplateInfoId, args: ExplicitArgs, ns: NamespaceId, span: Span) -> RResult<FunctionInfoId> {
  ctx.enter_instantiation(span.clone())?;
  let result = (|| {
    crate::resolve::ensure_resolved_function_template(ctx, tmpl_id)?;
    let params = ctx.function_templates[tmpl_id].parameters.clone();
    let home = ctx.function_templates[tmpl_id].home;
    let values = resolve_arguments(ctx, &params, args, home, ns, &span)?;
    let mut subst = build_substitution(&params, &values);
    let Some(ResolvedFunction { signature, body }) = ctx.function_templates[tmpl_id].body.resolved().cloned() else {
      return Err(Aborted)
    };
    let new_params = signature.params.iter()
      .map(|(tag, pat, ty)| (*tag, subst_pat(ctx, &mut subst, *pat), subst_type(ctx, &mut subst, ty)))
      .collect::<Vec<_>>();
    let new_ret = subst_type(ctx, &mut subst, &signature.ret);
    let new_body = subst_expr(ctx, &mut subst, body);
    let self_type = ctx.function_templates[tmpl_id].self_type.clone().map(|t| subst_type(ctx, &mut subst, &t));
    let name = ctx.function_templates[tmpl_id].name;
    let info = FunctionInfo {
      name,
      span: span.clone(),
      home,
      state: ResolutionState::Resolved,
      self_type,
      body: FnBody::Resolved(ResolvedFunction { signature: FunctionSignature { params: new_params, ret: new_ret }, body: new_body }),
      template_instantiation_info: Some(TemplateInstantiationInfo { template: tmpl_id, template_arguments: values }),
    };
    let id = ctx.functions.push(info);
    ctx.function_templates[tmpl_id].instantiations.push(id);
    Ok(id)
  })();
  ctx.exit_instantiation();
  result
}

pub fn instantiate_struct_template(ctx: &mut Context, tmpl_id: StructTemplateInfoId, args: ExplicitArgs, ns: NamespaceId, span: Span) -> RResult<StructInfoId> {
  ctx.enter_instantiation(span.clone())?;
  let result = (|| {
    crate::resolve::ensure_resolved_struct_template(ctx, tmpl_id)?;
    let params = ctx.struct_templates[tmpl_id].parameters.clone();
    let home = ctx.struct_templates[tmpl_id].home;
    let values = resolve_arguments(ctx, &params, args, home, ns, &span)?;
    let mut subst = build_substitution(&params, &values);
    let Some(resolved) = ctx.struct_templates[tmpl_id].body.resolved().cloned() else { return Err(Aborted) };
    let members = resolved.members.iter().map(|(n, t)| (*n, subst_type(ctx, &mut subst, t))).collect();
    let name = ctx.struct_templates[tmpl_id].name;
    let info = StructInfo {
      name, span: span.clone(), home, state: ResolutionState::Resolved,
      body: DefBody::Resolved(ResolvedStruct { members }),
      template_instantiation_info: Some(TemplateInstantiationInfo { template: tmpl_id, template_arguments: values }),
    };
    let id = ctx.structs.push(info);
    ctx.struct_templates[tmpl_id].instantiations.push(id);
    Ok(id)
  })();
  ctx.exit_instantiation();
  result
}

pub fn instantiate_enum_template(ctx: &mut Context, tmpl_id: EnumTemplateInfoId, args: ExplicitArgs, ns: NamespaceId, span: Span) -> RResult<EnumInfoId> {
  ctx.enter_instantiation(span.clone())?;
  let result = (|| {
    crate::resolve::ensure_resolved_enum_template(ctx, tmpl_id)?;
    let params = ctx.enum_templates[tmpl_id].parameters.clone();
    let home = ctx.enum_templates[tmpl_id].home;
    let values = resolve_arguments(ctx, &params, args, home, ns, &span)?;
    let mut subst = build_substitution(&params, &values);
    let Some(resolved) = ctx.enum_templates[tmpl_id].body.resolved().cloned() else { return Err(Aborted) };
    let ctors: Vec<(Symbol, Option<TypeValue>)> = resolved.ctors.iter()
      .map(|(n, p)| (*n, p.as_ref().map(|t| subst_type(ctx, &mut subst, t))))
      .collect();
    let name = ctx.enum_templates[tmpl_id].name;
    let ctor_namespace = ctx.ns.new_namespace(Some(home), Some(name));
    let id = ctx.enums.push(EnumInfo {
      name, span: span.clone(), home, state: ResolutionState::Resolved,
      body: DefBody::Resolved(ResolvedEnum { ctors, ctor_namespace }),
      template_instantiation_info: Some(TemplateInstantiationInfo { template: tmpl_id, template_arguments: values }),
    });
    let ctor_names: Vec<Symbol> = ctx.enums[id].body.resolved().unwrap().ctors.iter().map(|(n, _)| *n).collect();
    for ctor in ctor_names {
      ctx.ns.insert_lower(ctor_namespace, ctor, span.clone(), LowerEntry::EnumConstructor { enum_info: id, ctor });
    }
    ctx.enum_templates[tmpl_id].instantiations.push(id);
    Ok(id)
  })();
  ctx.exit_instantiation();
  result
}

pub fn instantiate_alias_template(ctx: &mut Context, tmpl_id: AliasTemplateInfoId, args: ExplicitArgs, ns: NamespaceId, span: Span) -> RResult<AliasInfoId> {
  ctx.enter_instantiation(span.clone())?;
  let result = (|| {
    crate::resolve::ensure_resolved_alias_template(ctx, tmpl_id)?;
    let params = ctx.alias_templates[tmpl_id].parameters.clone();
    let home = ctx.alias_templates[tmpl_id].home;
    let values = resolve_arguments(ctx, &params, args, home, ns, &span)?;
    let mut subst = build_substitution(&params, &values);
    let Some(resolved_ty) = ctx.alias_templates[tmpl_id].body.resolved().cloned() else { return Err(Aborted) };
    let ty = subst_type(ctx, &mut subst, &resolved_ty);
    let name = ctx.alias_templates[tmpl_id].name;
    let id = ctx.aliases.push(AliasInfo {
      name, span: span.clone(), home, state: ResolutionState::Resolved,
      body: DefBody::Resolved(ty),
      template_instantiation_info: Some(TemplateInstantiationInfo { template: tmpl_id, template_arguments: values }),
    });
    ctx.alias_templates[tmpl_id].instantiations.push(id);
    Ok(id)
  })();
  ctx.exit_instantiation();
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::FileId;
  use std::rc::Rc;

  fn span() -> Span {
    Span { file: FileId(Rc::from("test")), start_line: 1, start_col: 1, end_line: 1, end_col: 1 }
  }

  #[test]
  fn argument_bounds_stop_at_first_implicit_parameter() {
    let params = vec![
      TemplateParameter { name: None, kind: TemplateParamKind::Mutability, default: None, is_implicit: false, tag: crate::types::TemplateParamTag(0), span: span() },
      TemplateParameter { name: None, kind: TemplateParamKind::Mutability, default: Some(hir::TemplateArgument::Mutability(hir::MutabilityAst::Immut)), is_implicit: false, tag: crate::types::TemplateParamTag(1), span: span() },
      TemplateParameter { name: None, kind: TemplateParamKind::Mutability, default: None, is_implicit: true, tag: crate::types::TemplateParamTag(2), span: span() },
    ];
    assert_eq!(arg_bounds(&params), (1, 2));
  }

  /// §8: `instantiate(T, [I32])` twice returns `Info` records with structurally identical
  /// resolved bodies, each recorded on the template's own `instantiations` memo list rather than
  /// deduplicated against one another (per this crate's documented non-goal, see module docs).
  #[test]
  fn instantiating_the_same_template_twice_records_two_structurally_equal_instantiations() {
    let mut ctx = Context::new();
    let home = ctx.global_namespace;
    let t_tag = ctx.fresh_template_parameter_tag();
    let param = TemplateParameter {
      name: Some(crate::intern::intern("T")),
      kind: TemplateParamKind::Type { class_constraints: vec![] },
      default: None,
      is_implicit: false,
      tag: t_tag,
      span: span(),
    };
    let param_ty = ctx.ty.alloc_type(TypeVariant::TemplateParameterRef { tag: t_tag, identifier: param.name }, span());
    let local = ctx.fresh_local_var_tag();
    let binding_mutability = ctx.ty.concrete_mut(false, span());
    let pat = ctx.mir.alloc_pat(crate::types::mir::Pattern {
      kind: crate::types::mir::PatKind::Name { var: local, mutability: binding_mutability.clone() },
      ty: param_ty.clone(),
      span: span(),
      is_exhaustive_by_itself: true,
    });
    let body = ctx.mir.alloc_expr(crate::types::mir::Expression {
      kind: crate::types::mir::ExprKind::LocalVarRef(local),
      ty: param_ty.clone(),
      span: span(),
      place_mutability: binding_mutability,
      flags: crate::types::mir::ExprFlags::PURE,
    });
    let signature = FunctionSignature { params: vec![(local, pat, param_ty.clone())], ret: param_ty };
    let tmpl_id = ctx.function_templates.push(FunctionTemplateInfo {
      name: crate::intern::intern("id"),
      span: span(),
      home,
      state: ResolutionState::Resolved,
      self_type: None,
      parameters: vec![param],
      body: FnBody::Resolved(ResolvedFunction { signature, body }),
      instantiations: vec![],
    });

    let i32_ty = ctx.ty.alloc_type(TypeVariant::SignedInt(crate::types::IntTy::I32), span());
    let first = instantiate_function_template(&mut ctx, tmpl_id, ExplicitArgs::Values(vec![TemplateArgumentValue::Type(i32_ty.clone())]), home, span())
      .expect("first instantiation resolves");
    let second = instantiate_function_template(&mut ctx, tmpl_id, ExplicitArgs::Values(vec![TemplateArgumentValue::Type(i32_ty)]), home, span())
      .expect("second instantiation resolves");

    assert_ne!(first, second, "each instantiation mints its own record, never deduplicated");
    assert_eq!(ctx.function_templates[tmpl_id].instantiations, vec![first, second]);

    let first_body = ctx.functions[first].body.resolved().expect("resolved").clone();
    let second_body = ctx.functions[second].body.resolved().expect("resolved").clone();
    assert!(matches!(ctx.ty.flatten_type(&first_body.signature.ret), TypeVariant::SignedInt(crate::types::IntTy::I32)));
    assert!(matches!(ctx.ty.flatten_type(&second_body.signature.ret), TypeVariant::SignedInt(crate::types::IntTy::I32)));
  }
}
