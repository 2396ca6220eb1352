//! Definition info records (C3.5, §3.5): for every kind of top-level definition and every
//! `*_template` variant of it, an `Info` record tracking resolution progress, home namespace,
//! and (for monomorphised records) which template produced it and with what arguments.

use hashbrown::HashMap;
use crate::hir;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::ty::TypeValue;
use crate::types::{
  ExprHandle, PatHandle, LocalVarTag, TemplateParamTag, NamespaceId,
  FunctionInfoId, FunctionTemplateInfoId, StructInfoId, StructTemplateInfoId,
  EnumInfoId, EnumTemplateInfoId, AliasInfoId, AliasTemplateInfoId,
  TypeclassInfoId, TypeclassTemplateInfoId, ImplInfoId, ImplTemplateInfoId,
  InstInfoId, InstTemplateInfoId,
};

/// `Unresolved | OnStack | Resolved` (§3.5, §4.7). A definition whose state is `OnStack` is
/// mid-resolution on the current call stack; re-entering it is a circular-dependency error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolutionState { Unresolved, OnStack, Resolved }

/// Template-parameter kind: type, value, or mutability (§1, §4.8).
#[derive(Clone, Debug)]
pub enum TemplateParamKind {
  Type { class_constraints: Vec<hir::QualifiedName> },
  Value { ty: Box<hir::Type> },
  Mutability,
}

/// A resolved (but not yet instantiated) template parameter, still carrying its unresolved
/// default so the default can be resolved lazily, in the template's home namespace, once earlier
/// arguments are known (§4.8).
#[derive(Clone, Debug)]
pub struct TemplateParameter {
  pub name: Option<Symbol>,
  pub kind: TemplateParamKind,
  pub default: Option<hir::TemplateArgument>,
  pub is_implicit: bool,
  pub tag: TemplateParamTag,
  pub span: Span,
}

/// Which template produced a monomorphised record, and with what arguments (§3.5, §4.8). Not
/// deduplicated against structurally-equal prior instantiations — see `DESIGN.md`.
#[derive(Clone, Debug)]
pub struct TemplateInstantiationInfo<TemplateId> {
  pub template: TemplateId,
  pub template_arguments: Vec<TemplateArgumentValue>,
}

/// A single resolved template argument, as recorded on an instantiated record for later
/// re-substitution (e.g. re-instantiating `Vec[T]` inside `fn foo[T]()` when `foo` itself is
/// instantiated — §4.8).
#[derive(Clone, Debug)]
pub enum TemplateArgumentValue {
  Type(TypeValue),
  Mutability(crate::types::ty::MutValue),
  Value(ExprHandle),
}

/// `Unresolved(U) | Resolved(R)`: the tagged-union body shared by every definition kind except
/// functions, which additionally have a `PartiallyResolved` stage (§3.5, §4.7).
#[derive(Clone, Debug)]
pub enum DefBody<U, R> {
  Unresolved(U),
  Resolved(R),
}

impl<U, R> DefBody<U, R> {
  pub fn resolved(&self) -> Option<&R> { if let DefBody::Resolved(r) = self { Some(r) } else { None } }
  pub fn resolved_mut(&mut self) -> Option<&mut R> { if let DefBody::Resolved(r) = self { Some(r) } else { None } }
}

/// `Unresolved(U) | PartiallyResolved(P) | Resolved(R)` (§4.7): a function whose return type is
/// explicitly declared is resolved in two steps, signature then body; one whose return type is
/// inferred has its body resolved eagerly as part of the signature step, and so never passes
/// through `PartiallyResolved`.
#[derive(Clone, Debug)]
pub enum FnBody<U, P, R> {
  Unresolved(U),
  PartiallyResolved(P),
  Resolved(R),
}

impl<U, P, R> FnBody<U, P, R> {
  pub fn resolved(&self) -> Option<&R> { if let FnBody::Resolved(r) = self { Some(r) } else { None } }
}

#[derive(Clone, Debug)]
pub struct FunctionSignature {
  pub params: Vec<(LocalVarTag, PatHandle, TypeValue)>,
  pub ret: TypeValue,
}

#[derive(Clone, Debug)]
pub struct ResolvedFunction {
  pub signature: FunctionSignature,
  pub body: ExprHandle,
}

pub struct FunctionInfo {
  pub name: Symbol,
  pub span: Span,
  pub home: NamespaceId,
  pub state: ResolutionState,
  pub self_type: Option<TypeValue>,
  pub body: FnBody<hir::FunctionDef, FunctionSignature, ResolvedFunction>,
  pub template_instantiation_info: Option<TemplateInstantiationInfo<FunctionTemplateInfoId>>,
}

pub struct FunctionTemplateInfo {
  pub name: Symbol,
  pub span: Span,
  pub home: NamespaceId,
  pub state: ResolutionState,
  pub self_type: Option<TypeValue>,
  pub parameters: Vec<TemplateParameter>,
  pub body: FnBody<(Vec<hir::TemplateParameter>, hir::FunctionDef), FunctionSignature, ResolvedFunction>,
  /// Every instantiation produced from this template so far, in creation order (§4.8).
  pub instantiations: Vec<FunctionInfoId>,
}

/// Declares a simple (non-function) definition kind: an `Info` and `*_template` `Info` pair
/// sharing the same `DefBody` shape, differing only in resolved-body type and whether template
/// parameters/instantiation bookkeeping are present.
macro_rules! simple_info_kind {
  ($info:ident, $tinfo:ident, $unresolved:ty, $resolved:ty, $tmpl_id:ty, $info_id:ty) => {
    pub struct $info {
      pub name: Symbol,
      pub span: Span,
      pub home: NamespaceId,
      pub state: ResolutionState,
      pub body: DefBody<$unresolved, $resolved>,
      pub template_instantiation_info: Option<TemplateInstantiationInfo<$tmpl_id>>,
    }

    /// The raw template-parameter list is kept in `Context`'s side table (keyed by this info's
    /// own id) rather than folded into `body`, since it must be readable before the surrounding
    /// scope needed to resolve it (§4.7) exists.
    pub struct $tinfo {
      pub name: Symbol,
      pub span: Span,
      pub home: NamespaceId,
      pub state: ResolutionState,
      pub parameters: Vec<TemplateParameter>,
      pub body: DefBody<$unresolved, $resolved>,
      pub instantiations: Vec<$info_id>,
    }
  };
}

simple_info_kind!(StructInfo, StructTemplateInfo, hir::StructDef, ResolvedStruct, StructTemplateInfoId, StructInfoId);
simple_info_kind!(EnumInfo, EnumTemplateInfo, hir::EnumDef, ResolvedEnum, EnumTemplateInfoId, EnumInfoId);
simple_info_kind!(AliasInfo, AliasTemplateInfo, hir::AliasDef, TypeValue, AliasTemplateInfoId, AliasInfoId);
simple_info_kind!(TypeclassInfo, TypeclassTemplateInfo, hir::TypeclassDef, ResolvedTypeclass, TypeclassTemplateInfoId, TypeclassInfoId);
simple_info_kind!(ImplInfo, ImplTemplateInfo, hir::ImplementationDef, ResolvedImplementation, ImplTemplateInfoId, ImplInfoId);
simple_info_kind!(InstInfo, InstTemplateInfo, hir::InstantiationDef, ResolvedInstantiation, InstTemplateInfoId, InstInfoId);

#[derive(Clone, Debug)]
pub struct ResolvedStruct {
  pub members: Vec<(Symbol, TypeValue)>,
}

#[derive(Clone, Debug)]
pub struct ResolvedEnum {
  pub ctors: Vec<(Symbol, Option<TypeValue>)>,
  /// Populated when the enum is resolved, not at registration time (§4.2).
  pub ctor_namespace: NamespaceId,
}

pub struct ResolvedTypeclass {
  pub method_signatures: HashMap<Symbol, FunctionInfoId>,
}

pub struct ResolvedImplementation {
  pub self_type: TypeValue,
  pub functions: HashMap<Symbol, FunctionInfoId>,
  pub function_templates: HashMap<Symbol, FunctionTemplateInfoId>,
}

pub struct ResolvedInstantiation {
  pub class: hir::QualifiedName,
  pub self_type: TypeValue,
  pub functions: HashMap<Symbol, FunctionInfoId>,
}
