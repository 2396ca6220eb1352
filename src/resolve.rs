//! Namespace construction and on-demand resolution (C8, §4.2, §4.7). Registration walks the
//! desugared module tree once, creating an `Info` record (in `Unresolved` state) for every
//! definition and wiring it into the namespace graph; the `ensure_resolved_*` functions below
//! then resolve each record idempotently, either from the driver's own top-level pass or lazily
//! when [`crate::instantiate`] or [`crate::elaborate`] reaches for one early.
//!
//! Functions get a `PartiallyResolved` signature stage (§4.7) so that direct recursion type-checks
//! without needing the body resolved first — but only when the return type is written down; an
//! inferred return type on a self-recursive function is a genuine "cannot infer" error, not a
//! resolver bug.

use hashbrown::HashMap;
use crate::context::{Context, Explanation, TypeEquality};
use crate::diag::{Aborted, RResult};
use crate::hir;
use crate::intern::Symbol;
use crate::scope::{MutabilityBinding, TypeBinding, VariableBinding};
use crate::span::Span;
use crate::types::entity::{
  self, DefBody, FnBody, FunctionSignature, ResolutionState, ResolvedEnum, ResolvedFunction,
  ResolvedImplementation, ResolvedInstantiation, ResolvedStruct, ResolvedTypeclass,
  TemplateInstantiationInfo,
};
use crate::types::mir::PatKind;
use crate::types::namespace::{LowerEntry, UpperEntry};
use crate::types::ty::{MutVariant, TypeValue, TypeVariant};
use crate::types::{
  AliasInfoId, AliasTemplateInfoId, EnumInfoId, EnumTemplateInfoId, FunctionInfoId,
  FunctionTemplateInfoId, ImplInfoId, ImplTemplateInfoId, InstInfoId, InstTemplateInfoId,
  NamespaceId, StructInfoId, StructTemplateInfoId, TypeclassInfoId, TypeclassTemplateInfoId,
};

/// What registration found at the top level, for the driver's own resolution pass. Nested
/// namespaces are flattened into this single list rather than walked again in a second tree
/// traversal.
enum WorkItem {
  Function(FunctionInfoId),
  FunctionTemplate(FunctionTemplateInfoId),
  Struct(StructInfoId),
  StructTemplate(StructTemplateInfoId),
  Enum(EnumInfoId),
  EnumTemplate(EnumTemplateInfoId),
  Alias(AliasInfoId),
  AliasTemplate(AliasTemplateInfoId),
  Typeclass(TypeclassInfoId),
  TypeclassTemplate(TypeclassTemplateInfoId),
  Impl(ImplInfoId),
  ImplTemplate(ImplTemplateInfoId),
  Inst(InstInfoId),
  InstTemplate(InstTemplateInfoId),
}

fn duplicate_name_error(ctx: &mut Context, name: &hir::Name, prior: Span) {
  use crate::diag::TextSection;
  ctx.diags.error_at(
    vec![
      TextSection { span: prior, note: "first declared here".into() },
      TextSection { span: name.span.clone(), note: "redeclared here".into() },
    ],
    format!("`{}` is already declared in this namespace", name.symbol.as_str()),
    None,
  );
}

fn register_template_parameters(ctx: &mut Context, raw: &[hir::TemplateParameter], home: NamespaceId) -> RResult<Vec<entity::TemplateParameter>> {
  let mut out = Vec::with_capacity(raw.len());
  for p in raw {
    let tag = ctx.fresh_template_parameter_tag();
    let kind = match &p.kind {
      hir::TemplateParameterKind::Type { class_constraints } => {
        let ident = p.name.as_ref().map(|n| n.symbol);
        let ty_val = ctx.ty.alloc_type(TypeVariant::TemplateParameterRef { identifier: ident, tag }, p.span.clone());
        if let Some(name) = &p.name {
          ctx.scopes.bind_type(&mut ctx.diags, name.symbol, TypeBinding::new(ty_val, p.span.clone()));
        }
        entity::TemplateParamKind::Type { class_constraints: class_constraints.clone() }
      }
      hir::TemplateParameterKind::Mutability => {
        if let Some(name) = &p.name {
          ctx.scopes.bind_mutability(&mut ctx.diags, name.symbol, MutabilityBinding::new(tag, p.span.clone()));
        }
        entity::TemplateParamKind::Mutability
      }
      hir::TemplateParameterKind::Value { ty } => {
        let resolved_ty = crate::elaborate::elaborate_type(ctx, ty, home)?;
        if let Some(name) = &p.name {
          let var = ctx.fresh_local_var_tag();
          let mutability = ctx.ty.concrete_mut(false, p.span.clone());
          ctx.scopes.bind_variable(&mut ctx.diags, name.symbol, VariableBinding::new(var, resolved_ty, mutability, p.span.clone()));
        }
        entity::TemplateParamKind::Value { ty: ty.clone() }
      }
    };
    out.push(entity::TemplateParameter {
      name: p.name.as_ref().map(|n| n.symbol),
      kind,
      default: p.default.clone(),
      is_implicit: p.is_implicit,
      tag,
      span: p.span.clone(),
    });
  }
  Ok(out)
}

// ---- registration -------------------------------------------------------------------------

fn register_definitions(ctx: &mut Context, defs: &[hir::Definition], ns: NamespaceId, work: &mut Vec<WorkItem>) {
  for def in defs {
    register_one(ctx, def, ns, work);
  }
}

fn register_one(ctx: &mut Context, def: &hir::Definition, ns: NamespaceId, work: &mut Vec<WorkItem>) {
  match def {
    hir::Definition::Function(d) => {
      let id = ctx.functions.push(entity::FunctionInfo {
        name: d.name.symbol, span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        self_type: None, body: FnBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      if let Some(prior) = ctx.ns.insert_lower(ns, d.name.symbol, d.name.span.clone(), LowerEntry::Function(id)) {
        duplicate_name_error(ctx, &d.name, prior);
      }
      work.push(WorkItem::Function(id));
    }
    hir::Definition::FunctionTemplate(t) => {
      let name = t.inner.name.clone();
      let id = ctx.function_templates.push(entity::FunctionTemplateInfo {
        name: name.symbol, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        self_type: None, parameters: Vec::new(),
        body: FnBody::Unresolved((t.parameters.clone(), t.inner.clone())), instantiations: Vec::new(),
      });
      if let Some(prior) = ctx.ns.insert_lower(ns, name.symbol, name.span.clone(), LowerEntry::FunctionTemplate(id)) {
        duplicate_name_error(ctx, &name, prior);
      }
      work.push(WorkItem::FunctionTemplate(id));
    }
    hir::Definition::Struct(d) => {
      let id = ctx.structs.push(entity::StructInfo {
        name: d.name.symbol, span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        body: DefBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      if let Some(prior) = ctx.ns.insert_upper(ns, d.name.symbol, d.name.span.clone(), UpperEntry::Struct(id)) {
        duplicate_name_error(ctx, &d.name, prior);
      }
      work.push(WorkItem::Struct(id));
    }
    hir::Definition::StructTemplate(t) => {
      let name = t.inner.name.clone();
      let id = ctx.struct_templates.push(entity::StructTemplateInfo {
        name: name.symbol, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        parameters: Vec::new(), body: DefBody::Unresolved(t.inner.clone()), instantiations: Vec::new(),
      });
      ctx.struct_template_params.insert(id, t.parameters.clone());
      if let Some(prior) = ctx.ns.insert_upper(ns, name.symbol, name.span.clone(), UpperEntry::StructTemplate(id)) {
        duplicate_name_error(ctx, &name, prior);
      }
      work.push(WorkItem::StructTemplate(id));
    }
    hir::Definition::Enum(d) => {
      let ctor_ns = ctx.ns.new_namespace(Some(ns), Some(d.name.symbol));
      let id = ctx.enums.push(entity::EnumInfo {
        name: d.name.symbol, span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        body: DefBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      ctx.enum_ctor_namespaces.insert(id, ctor_ns);
      if let Some(prior) = ctx.ns.insert_upper(ns, d.name.symbol, d.name.span.clone(), UpperEntry::Enum(id)) {
        duplicate_name_error(ctx, &d.name, prior);
      }
      work.push(WorkItem::Enum(id));
    }
    hir::Definition::EnumTemplate(t) => {
      let name = t.inner.name.clone();
      let ctor_ns = ctx.ns.new_namespace(Some(ns), Some(name.symbol));
      let id = ctx.enum_templates.push(entity::EnumTemplateInfo {
        name: name.symbol, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        parameters: Vec::new(), body: DefBody::Unresolved(t.inner.clone()), instantiations: Vec::new(),
      });
      ctx.enum_template_params.insert(id, t.parameters.clone());
      ctx.enum_template_ctor_namespaces.insert(id, ctor_ns);
      if let Some(prior) = ctx.ns.insert_upper(ns, name.symbol, name.span.clone(), UpperEntry::EnumTemplate(id)) {
        duplicate_name_error(ctx, &name, prior);
      }
      work.push(WorkItem::EnumTemplate(id));
    }
    hir::Definition::Alias(d) => {
      let id = ctx.aliases.push(entity::AliasInfo {
        name: d.name.symbol, span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        body: DefBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      if let Some(prior) = ctx.ns.insert_upper(ns, d.name.symbol, d.name.span.clone(), UpperEntry::Alias(id)) {
        duplicate_name_error(ctx, &d.name, prior);
      }
      work.push(WorkItem::Alias(id));
    }
    hir::Definition::AliasTemplate(t) => {
      let name = t.inner.name.clone();
      let id = ctx.alias_templates.push(entity::AliasTemplateInfo {
        name: name.symbol, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        parameters: Vec::new(), body: DefBody::Unresolved(t.inner.clone()), instantiations: Vec::new(),
      });
      ctx.alias_template_params.insert(id, t.parameters.clone());
      if let Some(prior) = ctx.ns.insert_upper(ns, name.symbol, name.span.clone(), UpperEntry::AliasTemplate(id)) {
        duplicate_name_error(ctx, &name, prior);
      }
      work.push(WorkItem::AliasTemplate(id));
    }
    hir::Definition::Typeclass(d) => {
      let id = ctx.typeclasses.push(entity::TypeclassInfo {
        name: d.name.symbol, span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        body: DefBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      if let Some(prior) = ctx.ns.insert_upper(ns, d.name.symbol, d.name.span.clone(), UpperEntry::Typeclass(id)) {
        duplicate_name_error(ctx, &d.name, prior);
      }
      work.push(WorkItem::Typeclass(id));
    }
    hir::Definition::TypeclassTemplate(t) => {
      let name = t.inner.name.clone();
      let id = ctx.typeclass_templates.push(entity::TypeclassTemplateInfo {
        name: name.symbol, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        parameters: Vec::new(), body: DefBody::Unresolved(t.inner.clone()), instantiations: Vec::new(),
      });
      ctx.typeclass_template_params.insert(id, t.parameters.clone());
      if let Some(prior) = ctx.ns.insert_upper(ns, name.symbol, name.span.clone(), UpperEntry::TypeclassTemplate(id)) {
        duplicate_name_error(ctx, &name, prior);
      }
      work.push(WorkItem::TypeclassTemplate(id));
    }
    hir::Definition::Implementation(d) => {
      let id = ctx.impls.push(entity::ImplInfo {
        name: d.name.as_ref().map(|n| n.symbol).unwrap_or_else(|| crate::intern::intern("<impl>")),
        span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        body: DefBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      ctx.ns.nameless.implementations.push(id);
      work.push(WorkItem::Impl(id));
    }
    hir::Definition::ImplementationTemplate(t) => {
      let name = t.inner.name.as_ref().map(|n| n.symbol).unwrap_or_else(|| crate::intern::intern("<impl>"));
      let id = ctx.impl_templates.push(entity::ImplTemplateInfo {
        name, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        parameters: Vec::new(), body: DefBody::Unresolved(t.inner.clone()), instantiations: Vec::new(),
      });
      ctx.impl_template_params.insert(id, t.parameters.clone());
      ctx.ns.nameless.implementation_templates.push(id);
      work.push(WorkItem::ImplTemplate(id));
    }
    hir::Definition::Instantiation(d) => {
      let id = ctx.insts.push(entity::InstInfo {
        name: d.name.as_ref().map(|n| n.symbol).unwrap_or_else(|| crate::intern::intern("<inst>")),
        span: d.span.clone(), home: ns, state: ResolutionState::Unresolved,
        body: DefBody::Unresolved(d.clone()), template_instantiation_info: None,
      });
      ctx.ns.nameless.instantiations.push(id);
      work.push(WorkItem::Inst(id));
    }
    hir::Definition::InstantiationTemplate(t) => {
      let name = t.inner.name.as_ref().map(|n| n.symbol).unwrap_or_else(|| crate::intern::intern("<inst>"));
      let id = ctx.inst_templates.push(entity::InstTemplateInfo {
        name, span: t.inner.span.clone(), home: ns, state: ResolutionState::Unresolved,
        parameters: Vec::new(), body: DefBody::Unresolved(t.inner.clone()), instantiations: Vec::new(),
      });
      ctx.inst_template_params.insert(id, t.parameters.clone());
      ctx.ns.nameless.instantiation_templates.push(id);
      work.push(WorkItem::InstTemplate(id));
    }
    hir::Definition::Namespace(d) => {
      let child = ctx.ns.new_namespace(Some(ns), Some(d.name.symbol));
      if let Some(prior) = ctx.ns.insert_lower(ns, d.name.symbol, d.name.span.clone(), LowerEntry::Namespace(child)) {
        duplicate_name_error(ctx, &d.name, prior);
      }
      register_definitions(ctx, &d.definitions, child, work);
    }
  }
}

// ---- function resolution ------------------------------------------------------------------

/// The function's type as known so far: from its `PartiallyResolved` signature if it has one
/// (declared return type lets a self-recursive call type-check before the body finishes), or
/// its fully `Resolved` one. `None` means the body must finish first — true only for an inferred
/// return type, and then only until resolution completes (§4.7).
pub fn function_signature(ctx: &Context, id: FunctionInfoId) -> Option<FunctionSignature> {
  match &ctx.functions[id].body {
    FnBody::Resolved(r) => Some(r.signature.clone()),
    FnBody::PartiallyResolved(s) => Some(s.clone()),
    FnBody::Unresolved(_) => None,
  }
}

fn resolve_params(ctx: &mut Context, params: &[hir::Param], home: NamespaceId) -> RResult<Vec<(crate::types::LocalVarTag, crate::types::PatHandle, TypeValue)>> {
  let mut out = Vec::with_capacity(params.len());
  for p in params {
    let ty = crate::elaborate::elaborate_type(ctx, &p.ty, home)?;
    let pat = crate::elaborate::elaborate_pattern(ctx, &p.pattern, Some(&ty), home)?;
    let var = match &ctx.mir.pats[pat].kind {
      PatKind::Name { var, .. } => *var,
      _ => ctx.fresh_local_var_tag(),
    };
    out.push((var, pat, ty));
  }
  Ok(out)
}

/// Resolves one function body in the current scope/self-type context. Shared by plain functions,
/// typeclass method defaults, and the functions nested in `impl`/`inst` blocks (§4.2, §4.7, §4.9).
fn resolve_function_body(ctx: &mut Context, def: &hir::FunctionDef, home: NamespaceId, params: Vec<(crate::types::LocalVarTag, crate::types::PatHandle, TypeValue)>, declared_ret: Option<TypeValue>) -> RResult<ResolvedFunction> {
  let body_handle = crate::elaborate::elaborate_expr(ctx, &def.body, home)?;
  let body_ty = ctx.mir.exprs[body_handle].ty.clone();
  let ret = match declared_ret {
    Some(declared) => {
      crate::constraint::solve_type_equality(ctx, TypeEquality {
        constrainer: declared.clone(),
        constrained: body_ty,
        constrainer_note: Some(Explanation { span: declared.span.clone(), note: "return type declared here".into() }),
        constrained_note: Explanation { span: def.body.span.clone(), note: "function body here".into() },
        is_deferred: false,
      });
      declared
    }
    None => body_ty,
  };
  Ok(ResolvedFunction { signature: FunctionSignature { params, ret }, body: body_handle })
}

pub fn ensure_resolved_function(ctx: &mut Context, id: FunctionInfoId) -> RResult<()> {
  if ctx.functions[id].body.resolved().is_some() { return Ok(()) }
  if ctx.functions[id].state == ResolutionState::OnStack {
    // The `PartiallyResolved` signature (if any) is already visible to the caller via
    // `function_signature`; re-entering here just means "use what's already known".
    return Ok(())
  }
  ctx.functions[id].state = ResolutionState::OnStack;
  let def = match &ctx.functions[id].body { FnBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.functions[id].home;
  let self_type = ctx.functions[id].self_type.clone();
  let prev_self = ctx.current_self_type.take();
  ctx.current_self_type = self_type;
  ctx.scopes.push();
  let result = (|| -> RResult<()> {
    let params = resolve_params(ctx, &def.params, home)?;
    let declared = match &def.return_ty {
      Some(t) => {
        let declared = crate::elaborate::elaborate_type(ctx, t, home)?;
        ctx.functions[id].body = FnBody::PartiallyResolved(FunctionSignature { params: params.clone(), ret: declared.clone() });
        Some(declared)
      }
      None => None,
    };
    let resolved = resolve_function_body(ctx, &def, home, params, declared)?;
    ctx.functions[id].body = FnBody::Resolved(resolved);
    Ok(())
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.current_self_type = prev_self;
  ctx.functions[id].state = ResolutionState::Resolved;
  ctx.drain_deferred_constraints();
  result
}

pub fn ensure_resolved_function_template(ctx: &mut Context, id: FunctionTemplateInfoId) -> RResult<()> {
  match ctx.function_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.function_templates[id].span.clone(), "cyclic dependency while resolving this function template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.function_templates[id].state = ResolutionState::OnStack;
  let (raw_params, def) = match &ctx.function_templates[id].body {
    FnBody::Unresolved(u) => u.clone(),
    _ => unreachable!(),
  };
  let home = ctx.function_templates[id].home;
  ctx.scopes.push();
  let result = (|| -> RResult<()> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.function_templates[id].parameters = params;
    let sig_params = resolve_params(ctx, &def.params, home)?;
    let declared = match &def.return_ty {
      Some(t) => Some(crate::elaborate::elaborate_type(ctx, t, home)?),
      None => None,
    };
    let resolved = resolve_function_body(ctx, &def, home, sig_params, declared)?;
    ctx.function_templates[id].body = FnBody::Resolved(resolved);
    Ok(())
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.function_templates[id].state = ResolutionState::Resolved;
  ctx.drain_deferred_constraints();
  result
}

// ---- structs --------------------------------------------------------------------------

pub fn ensure_resolved_struct(ctx: &mut Context, id: StructInfoId) -> RResult<()> {
  match ctx.structs[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.structs[id].span.clone(), "cyclic dependency while resolving this struct");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.structs[id].state = ResolutionState::OnStack;
  let def = match &ctx.structs[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.structs[id].home;
  let result = (|| -> RResult<ResolvedStruct> {
    let mut members = Vec::with_capacity(def.members.len());
    for (name, ty) in &def.members {
      let resolved = crate::elaborate::elaborate_type(ctx, ty, home)?;
      members.push((name.symbol, resolved));
    }
    Ok(ResolvedStruct { members })
  })();
  ctx.structs[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.structs[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_struct_template(ctx: &mut Context, id: StructTemplateInfoId) -> RResult<()> {
  match ctx.struct_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.struct_templates[id].span.clone(), "cyclic dependency while resolving this struct template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.struct_templates[id].state = ResolutionState::OnStack;
  let def = match &ctx.struct_templates[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let raw_params = ctx.struct_template_params.get(&id).cloned().unwrap_or_default();
  let home = ctx.struct_templates[id].home;
  ctx.scopes.push();
  let result = (|| -> RResult<ResolvedStruct> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.struct_templates[id].parameters = params;
    let mut members = Vec::with_capacity(def.members.len());
    for (name, ty) in &def.members {
      let resolved = crate::elaborate::elaborate_type(ctx, ty, home)?;
      members.push((name.symbol, resolved));
    }
    Ok(ResolvedStruct { members })
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.struct_templates[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.struct_templates[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

// ---- enums ----------------------------------------------------------------------------

fn populate_ctor_namespace(ctx: &mut Context, ctor_ns: NamespaceId, enum_id: EnumInfoId, ctors: &[(Symbol, Option<TypeValue>)]) {
  for (ctor, _) in ctors {
    ctx.ns.insert_lower(ctor_ns, *ctor, ctx.enums[enum_id].span.clone(), LowerEntry::EnumConstructor { enum_info: enum_id, ctor: *ctor });
  }
}

pub fn ensure_resolved_enum(ctx: &mut Context, id: EnumInfoId) -> RResult<()> {
  match ctx.enums[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.enums[id].span.clone(), "cyclic dependency while resolving this enum");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.enums[id].state = ResolutionState::OnStack;
  let def = match &ctx.enums[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.enums[id].home;
  let ctor_namespace = *ctx.enum_ctor_namespaces.get(&id).expect("enum registered without a constructor namespace");
  let result = (|| -> RResult<ResolvedEnum> {
    let mut ctors = Vec::with_capacity(def.ctors.len());
    for c in &def.ctors {
      let payload = match &c.payload {
        Some(t) => Some(crate::elaborate::elaborate_type(ctx, t, home)?),
        None => None,
      };
      ctors.push((c.name.symbol, payload));
    }
    Ok(ResolvedEnum { ctors, ctor_namespace })
  })();
  ctx.enums[id].state = ResolutionState::Resolved;
  let resolved = result?;
  populate_ctor_namespace(ctx, ctor_namespace, id, &resolved.ctors);
  ctx.enums[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_enum_template(ctx: &mut Context, id: EnumTemplateInfoId) -> RResult<()> {
  match ctx.enum_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.enum_templates[id].span.clone(), "cyclic dependency while resolving this enum template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.enum_templates[id].state = ResolutionState::OnStack;
  let def = match &ctx.enum_templates[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let raw_params = ctx.enum_template_params.get(&id).cloned().unwrap_or_default();
  let home = ctx.enum_templates[id].home;
  let ctor_namespace = *ctx.enum_template_ctor_namespaces.get(&id).expect("enum template registered without a constructor namespace");
  ctx.scopes.push();
  let result = (|| -> RResult<ResolvedEnum> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.enum_templates[id].parameters = params;
    let mut ctors = Vec::with_capacity(def.ctors.len());
    for c in &def.ctors {
      let payload = match &c.payload {
        Some(t) => Some(crate::elaborate::elaborate_type(ctx, t, home)?),
        None => None,
      };
      ctors.push((c.name.symbol, payload));
    }
    Ok(ResolvedEnum { ctors, ctor_namespace })
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.enum_templates[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.enum_templates[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

// ---- aliases --------------------------------------------------------------------------

pub fn ensure_resolved_alias(ctx: &mut Context, id: AliasInfoId) -> RResult<()> {
  match ctx.aliases[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.aliases[id].span.clone(), "cyclic dependency while resolving this alias");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.aliases[id].state = ResolutionState::OnStack;
  let def = match &ctx.aliases[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.aliases[id].home;
  let resolved = crate::elaborate::elaborate_type(ctx, &def.ty, home);
  ctx.aliases[id].state = ResolutionState::Resolved;
  let resolved = resolved?;
  ctx.aliases[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_alias_template(ctx: &mut Context, id: AliasTemplateInfoId) -> RResult<()> {
  match ctx.alias_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.alias_templates[id].span.clone(), "cyclic dependency while resolving this alias template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.alias_templates[id].state = ResolutionState::OnStack;
  let def = match &ctx.alias_templates[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let raw_params = ctx.alias_template_params.get(&id).cloned().unwrap_or_default();
  let home = ctx.alias_templates[id].home;
  ctx.scopes.push();
  let result = (|| -> RResult<TypeValue> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.alias_templates[id].parameters = params;
    crate::elaborate::elaborate_type(ctx, &def.ty, home)
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.alias_templates[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.alias_templates[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

// ---- typeclasses, impls, insts ---------------------------------------------------------

/// Typeclass methods are ordinary functions with `Self` left abstract (§4.9); an `inst` block is
/// accepted without checking that its function set actually satisfies the class's method set —
/// instance-conformance checking is out of scope here (see `DESIGN.md`).
pub fn ensure_resolved_typeclass(ctx: &mut Context, id: TypeclassInfoId) -> RResult<()> {
  match ctx.typeclasses[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.typeclasses[id].span.clone(), "cyclic dependency while resolving this typeclass");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.typeclasses[id].state = ResolutionState::OnStack;
  let def = match &ctx.typeclasses[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.typeclasses[id].home;
  let self_ty = ctx.ty.alloc_type(TypeVariant::SelfPlaceholder, def.span.clone());
  let result = (|| -> RResult<ResolvedTypeclass> {
    let mut method_signatures = HashMap::new();
    for method in &def.methods {
      let fn_id = register_plain_function(ctx, method, home, Some(self_ty.clone()));
      ensure_resolved_function(ctx, fn_id)?;
      method_signatures.insert(method.name.symbol, fn_id);
    }
    Ok(ResolvedTypeclass { method_signatures })
  })();
  ctx.typeclasses[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.typeclasses[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_typeclass_template(ctx: &mut Context, id: TypeclassTemplateInfoId) -> RResult<()> {
  match ctx.typeclass_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.typeclass_templates[id].span.clone(), "cyclic dependency while resolving this typeclass template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.typeclass_templates[id].state = ResolutionState::OnStack;
  let def = match &ctx.typeclass_templates[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let raw_params = ctx.typeclass_template_params.get(&id).cloned().unwrap_or_default();
  let home = ctx.typeclass_templates[id].home;
  let self_ty = ctx.ty.alloc_type(TypeVariant::SelfPlaceholder, def.span.clone());
  ctx.scopes.push();
  let result = (|| -> RResult<ResolvedTypeclass> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.typeclass_templates[id].parameters = params;
    let mut method_signatures = HashMap::new();
    for method in &def.methods {
      let fn_id = register_plain_function(ctx, method, home, Some(self_ty.clone()));
      ensure_resolved_function(ctx, fn_id)?;
      method_signatures.insert(method.name.symbol, fn_id);
    }
    Ok(ResolvedTypeclass { method_signatures })
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.typeclass_templates[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.typeclass_templates[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

fn register_plain_function(ctx: &mut Context, def: &hir::FunctionDef, home: NamespaceId, self_type: Option<TypeValue>) -> FunctionInfoId {
  ctx.functions.push(entity::FunctionInfo {
    name: def.name.symbol, span: def.span.clone(), home, state: ResolutionState::Unresolved,
    self_type, body: FnBody::Unresolved(def.clone()), template_instantiation_info: None,
  })
}

fn register_function_template(ctx: &mut Context, params: &[hir::TemplateParameter], def: &hir::FunctionDef, home: NamespaceId, self_type: Option<TypeValue>) -> FunctionTemplateInfoId {
  ctx.function_templates.push(entity::FunctionTemplateInfo {
    name: def.name.symbol, span: def.span.clone(), home, state: ResolutionState::Unresolved,
    self_type, parameters: Vec::new(),
    body: FnBody::Unresolved((params.to_vec(), def.clone())), instantiations: Vec::new(),
  })
}

pub fn ensure_resolved_impl(ctx: &mut Context, id: ImplInfoId) -> RResult<()> {
  match ctx.impls[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.impls[id].span.clone(), "cyclic dependency while resolving this impl block");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.impls[id].state = ResolutionState::OnStack;
  let def = match &ctx.impls[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.impls[id].home;
  let result = (|| -> RResult<ResolvedImplementation> {
    let self_type = crate::elaborate::elaborate_type(ctx, &def.self_ty, home)?;
    let mut functions = HashMap::new();
    for f in &def.functions {
      let fn_id = register_plain_function(ctx, f, home, Some(self_type.clone()));
      ensure_resolved_function(ctx, fn_id)?;
      functions.insert(f.name.symbol, fn_id);
    }
    let mut function_templates = HashMap::new();
    for (params, f) in &def.function_templates {
      let tmpl_id = register_function_template(ctx, params, f, home, Some(self_type.clone()));
      function_templates.insert(f.name.symbol, tmpl_id);
    }
    Ok(ResolvedImplementation { self_type, functions, function_templates })
  })();
  ctx.impls[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.impls[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_impl_template(ctx: &mut Context, id: ImplTemplateInfoId) -> RResult<()> {
  match ctx.impl_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.impl_templates[id].span.clone(), "cyclic dependency while resolving this impl template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.impl_templates[id].state = ResolutionState::OnStack;
  let def = match &ctx.impl_templates[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let raw_params = ctx.impl_template_params.get(&id).cloned().unwrap_or_default();
  let home = ctx.impl_templates[id].home;
  ctx.scopes.push();
  let result = (|| -> RResult<ResolvedImplementation> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.impl_templates[id].parameters = params;
    let self_type = crate::elaborate::elaborate_type(ctx, &def.self_ty, home)?;
    let mut functions = HashMap::new();
    for f in &def.functions {
      let fn_id = register_plain_function(ctx, f, home, Some(self_type.clone()));
      ensure_resolved_function(ctx, fn_id)?;
      functions.insert(f.name.symbol, fn_id);
    }
    let mut function_templates = HashMap::new();
    for (fparams, f) in &def.function_templates {
      let tmpl_id = register_function_template(ctx, fparams, f, home, Some(self_type.clone()));
      function_templates.insert(f.name.symbol, tmpl_id);
    }
    Ok(ResolvedImplementation { self_type, functions, function_templates })
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.impl_templates[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.impl_templates[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_inst(ctx: &mut Context, id: InstInfoId) -> RResult<()> {
  match ctx.insts[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.insts[id].span.clone(), "cyclic dependency while resolving this inst block");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.insts[id].state = ResolutionState::OnStack;
  let def = match &ctx.insts[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let home = ctx.insts[id].home;
  let result = (|| -> RResult<ResolvedInstantiation> {
    let self_type = crate::elaborate::elaborate_type(ctx, &def.self_ty, home)?;
    let mut functions = HashMap::new();
    for f in &def.functions {
      let fn_id = register_plain_function(ctx, f, home, Some(self_type.clone()));
      ensure_resolved_function(ctx, fn_id)?;
      functions.insert(f.name.symbol, fn_id);
    }
    Ok(ResolvedInstantiation { class: def.class.clone(), self_type, functions })
  })();
  ctx.insts[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.insts[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

pub fn ensure_resolved_inst_template(ctx: &mut Context, id: InstTemplateInfoId) -> RResult<()> {
  match ctx.inst_templates[id].state {
    ResolutionState::Resolved => return Ok(()),
    ResolutionState::OnStack => {
      ctx.diags.error(ctx.inst_templates[id].span.clone(), "cyclic dependency while resolving this inst template");
      return Err(Aborted);
    }
    ResolutionState::Unresolved => {}
  }
  ctx.inst_templates[id].state = ResolutionState::OnStack;
  let def = match &ctx.inst_templates[id].body { DefBody::Unresolved(d) => d.clone(), _ => unreachable!() };
  let raw_params = ctx.inst_template_params.get(&id).cloned().unwrap_or_default();
  let home = ctx.inst_templates[id].home;
  ctx.scopes.push();
  let result = (|| -> RResult<ResolvedInstantiation> {
    let params = register_template_parameters(ctx, &raw_params, home)?;
    ctx.inst_templates[id].parameters = params;
    let self_type = crate::elaborate::elaborate_type(ctx, &def.self_ty, home)?;
    let mut functions = HashMap::new();
    for f in &def.functions {
      let fn_id = register_plain_function(ctx, f, home, Some(self_type.clone()));
      ensure_resolved_function(ctx, fn_id)?;
      functions.insert(f.name.symbol, fn_id);
    }
    Ok(ResolvedInstantiation { class: def.class.clone(), self_type, functions })
  })();
  ctx.scopes.pop(&mut ctx.diags);
  ctx.inst_templates[id].state = ResolutionState::Resolved;
  let resolved = result?;
  ctx.inst_templates[id].body = DefBody::Resolved(resolved);
  ctx.drain_deferred_constraints();
  Ok(())
}

// ---- driver -------------------------------------------------------------------------------

fn resolve_work_item(ctx: &mut Context, item: &WorkItem) {
  let _ = match item {
    WorkItem::Function(id) => ensure_resolved_function(ctx, *id),
    WorkItem::FunctionTemplate(id) => ensure_resolved_function_template(ctx, *id),
    WorkItem::Struct(id) => ensure_resolved_struct(ctx, *id),
    WorkItem::StructTemplate(id) => ensure_resolved_struct_template(ctx, *id),
    WorkItem::Enum(id) => ensure_resolved_enum(ctx, *id),
    WorkItem::EnumTemplate(id) => ensure_resolved_enum_template(ctx, *id),
    WorkItem::Alias(id) => ensure_resolved_alias(ctx, *id),
    WorkItem::AliasTemplate(id) => ensure_resolved_alias_template(ctx, *id),
    WorkItem::Typeclass(id) => ensure_resolved_typeclass(ctx, *id),
    WorkItem::TypeclassTemplate(id) => ensure_resolved_typeclass_template(ctx, *id),
    WorkItem::Impl(id) => ensure_resolved_impl(ctx, *id),
    WorkItem::ImplTemplate(id) => ensure_resolved_impl_template(ctx, *id),
    WorkItem::Inst(id) => ensure_resolved_inst(ctx, *id),
    WorkItem::InstTemplate(id) => ensure_resolved_inst_template(ctx, *id),
  };
}

/// Registers every definition in `module` into the namespace rooted at `ctx.global_namespace`,
/// then resolves each one (idempotently — a forward reference resolved early by one item's own
/// elaboration is simply skipped when the driver reaches it in turn) (§4.2, §5).
pub fn resolve_module(ctx: &mut Context, module: &hir::Module) {
  log::debug!("registering {} top-level definitions", module.definitions.len());
  let mut work = Vec::new();
  let global = ctx.global_namespace;
  register_definitions(ctx, &module.definitions, global, &mut work);
  log::debug!("resolving {} registered definitions", work.len());
  for item in &work {
    resolve_work_item(ctx, item);
  }
  ctx.drain_deferred_constraints();
  crate::reify::reify_module(ctx);
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
  fn a_function_with_no_return_type_infers_unit() {
    let mut ctx = Context::new();
    let name = hir::Name { symbol: crate::intern::intern("main"), span: span() };
    let def = hir::FunctionDef {
      name: name.clone(),
      params: Vec::new(),
      return_ty: None,
      body: hir::Expression { kind: hir::ExpressionKind::Tuple(Vec::new()), span: span() },
      span: span(),
    };
    let module = hir::Module { definitions: vec![hir::Definition::Function(def)] };
    resolve_module(&mut ctx, &module);
    assert_eq!(ctx.diags.diagnostics().len(), 0);
    let entry = ctx.ns.find_lower(ctx.global_namespace, name.symbol);
    assert!(matches!(entry, Some(LowerEntry::Function(_))));
  }

  #[test]
  fn redeclaring_a_name_in_the_same_namespace_is_an_error() {
    let mut ctx = Context::new();
    let name = hir::Name { symbol: crate::intern::intern("dup"), span: span() };
    let make = || hir::FunctionDef {
      name: name.clone(), params: Vec::new(), return_ty: None,
      body: hir::Expression { kind: hir::ExpressionKind::Tuple(Vec::new()), span: span() },
      span: span(),
    };
    let module = hir::Module { definitions: vec![
      hir::Definition::Function(make()),
      hir::Definition::Function(make()),
    ] };
    resolve_module(&mut ctx, &module);
    assert_eq!(ctx.diags.diagnostics().len(), 1);
  }
}
