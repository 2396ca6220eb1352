//! The resolution context: the process-wide state threaded through every phase (§3.7, §5).
//! Mirrors the source's monolithic `Context` object — arenas, namespace graph, deferred
//! constraints, and per-construct stack-scoped fields (current loop, current safety status,
//! current `Self` type) all live here, because nearly every resolver function needs some subset
//! of them and splitting the struct up finer would just mean passing five references instead
//! of one.

use arrayvec::ArrayVec;
use hashbrown::HashMap;
use crate::diag::{Builder, RResult};
use crate::hir;
use crate::idx::IdxVec;
use crate::intern::Symbol;
use crate::scope::ScopeStack;
use crate::span::Span;
use crate::types::entity::*;
use crate::types::mir::MirArena;
use crate::types::namespace::NamespaceArena;
use crate::types::ty::{MutValue, TyArena, TypeValue, TypeVarKind};
use crate::types::*;

/// Template instantiation has no natural termination guarantee (a template can re-instantiate
/// itself with an ever-larger argument through substitution); this crate bounds the call stack
/// rather than overflow the host stack (§4.8, §5, §9: "implementations should add one [limit]
/// (e.g. 256)").
pub const MAX_INSTANTIATION_DEPTH: usize = 256;

/// `Type₁ ~ Type₂` with explanatory notes on each side (§4.5).
#[derive(Clone, Debug)]
pub struct Explanation {
  pub span: Span,
  pub note: String,
}

#[derive(Clone, Debug)]
pub struct TypeEquality {
  pub constrainer: TypeValue,
  pub constrained: TypeValue,
  pub constrainer_note: Option<Explanation>,
  pub constrained_note: Explanation,
  pub is_deferred: bool,
}

#[derive(Clone, Debug)]
pub struct MutEquality {
  pub constrainer: MutValue,
  pub constrained: MutValue,
  pub constrainer_note: Explanation,
  pub constrained_note: Explanation,
  pub is_deferred: bool,
}

#[derive(Clone, Debug)]
pub struct StructFieldConstraint {
  pub struct_ty: TypeValue,
  pub field_ty: TypeValue,
  pub field_name: Symbol,
  pub explanation: Explanation,
}

#[derive(Clone, Debug)]
pub struct TupleFieldConstraint {
  pub tuple_ty: TypeValue,
  pub field_ty: TypeValue,
  pub index: usize,
  pub explanation: Explanation,
}

/// `T : Class` — a placeholder constraint (§4.5, §9 open questions): recorded but never solved,
/// since typeclass instance resolution is out of scope for this design.
#[derive(Clone, Debug)]
pub struct InstanceConstraint {
  pub ty: TypeValue,
  pub class: hir::QualifiedName,
  pub explanation: Explanation,
}

#[derive(Default)]
pub struct DeferredQueues {
  pub types: Vec<TypeEquality>,
  pub mutabilities: Vec<MutEquality>,
  pub instances: Vec<InstanceConstraint>,
  pub struct_fields: Vec<StructFieldConstraint>,
  pub tuple_fields: Vec<TupleFieldConstraint>,
}

/// Soft, rollback-friendly solutions recorded alongside (but independent of) the hard
/// `Solved`/`Unsolved` state in the arena — used when `gather_variable_solutions` is set without
/// `do_destructive_unification`, so a caller can inspect "what this variable would resolve to"
/// without committing to it (§4.4).
#[derive(Default)]
pub struct VarSolutions {
  pub types: HashMap<TypeVarTag, TypeValue>,
  pub mutabilities: HashMap<MutVarTag, MutValue>,
}

/// Which safety context elaboration is currently inside; toggled by entering/leaving an
/// `unsafe { .. }` block (§4.6).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Safety { Safe, Unsafe }

/// The loop an in-progress `break`/`continue` targets; re-entrant across nested loops, restored
/// on exit by the elaborator (§4.6, §5).
pub struct LoopInfo {
  pub label: Option<Symbol>,
  pub break_ty: Option<TypeValue>,
  pub requires_unit: bool,
}

pub struct Context {
  pub ty: TyArena,
  pub mir: MirArena,
  pub ns: NamespaceArena,
  pub diags: Builder,
  pub scopes: ScopeStack,

  pub functions: IdxVec<FunctionInfoId, FunctionInfo>,
  pub function_templates: IdxVec<FunctionTemplateInfoId, FunctionTemplateInfo>,
  pub structs: IdxVec<StructInfoId, StructInfo>,
  pub struct_templates: IdxVec<StructTemplateInfoId, StructTemplateInfo>,
  pub enums: IdxVec<EnumInfoId, EnumInfo>,
  pub enum_templates: IdxVec<EnumTemplateInfoId, EnumTemplateInfo>,
  pub aliases: IdxVec<AliasInfoId, AliasInfo>,
  pub alias_templates: IdxVec<AliasTemplateInfoId, AliasTemplateInfo>,
  pub typeclasses: IdxVec<TypeclassInfoId, TypeclassInfo>,
  pub typeclass_templates: IdxVec<TypeclassTemplateInfoId, TypeclassTemplateInfo>,
  pub impls: IdxVec<ImplInfoId, ImplInfo>,
  pub impl_templates: IdxVec<ImplTemplateInfoId, ImplTemplateInfo>,
  pub insts: IdxVec<InstInfoId, InstInfo>,
  pub inst_templates: IdxVec<InstTemplateInfoId, InstTemplateInfo>,

  pub deferred: DeferredQueues,
  pub solutions: VarSolutions,
  /// Every general/integral variable minted so far that might still be unsolved once resolution
  /// finishes, paired with the span it was first mentioned at so reification (§4.10) has
  /// somewhere to point an "add a type annotation" diagnostic. Re-filtered down to the variables
  /// still actually unsolved at the end of every `drain_deferred_constraints` call.
  pub unsolved: Vec<(TypeVarTag, Span)>,

  next_template_param_tag: u32,
  next_local_var_tag: u32,

  pub current_self_type: Option<TypeValue>,
  pub current_safety: Safety,
  pub loop_stack: Vec<LoopInfo>,

  pub global_namespace: NamespaceId,

  /// Raw template-parameter lists, keyed by the template's own id, stashed at registration time
  /// and consumed once when that template is first resolved (§4.2, §4.7) — kept out of `body`
  /// because resolving them needs a scope that doesn't exist yet at registration time.
  pub struct_template_params: HashMap<StructTemplateInfoId, Vec<hir::TemplateParameter>>,
  pub enum_template_params: HashMap<EnumTemplateInfoId, Vec<hir::TemplateParameter>>,
  pub alias_template_params: HashMap<AliasTemplateInfoId, Vec<hir::TemplateParameter>>,
  pub typeclass_template_params: HashMap<TypeclassTemplateInfoId, Vec<hir::TemplateParameter>>,
  pub impl_template_params: HashMap<ImplTemplateInfoId, Vec<hir::TemplateParameter>>,
  pub inst_template_params: HashMap<InstTemplateInfoId, Vec<hir::TemplateParameter>>,

  /// An enum's constructor namespace is created at registration time (so paths into it resolve
  /// before the enum itself is resolved) but only populated with constructors once the enum
  /// resolves (§4.2); these side tables let `ensure_resolved_enum[_template]` find the namespace
  /// it already created.
  pub enum_ctor_namespaces: HashMap<EnumInfoId, NamespaceId>,
  pub enum_template_ctor_namespaces: HashMap<EnumTemplateInfoId, NamespaceId>,

  /// Instance constraints collected over the whole run, for a final "no instance found"
  /// diagnostic pass during reification (§9 open question: instance search is out of scope, but
  /// the constraint is still recorded against its class for later reporting).
  pub pending_instances: Vec<InstanceConstraint>,

  /// Byte sizes computed for resolved structs/enums during reification (§4.10), keyed the same
  /// way as the template-parameter side tables above. Absent for anything reification couldn't
  /// size (a cycle, or a member that is itself unsized).
  pub struct_sizes: HashMap<StructInfoId, u32>,
  pub enum_sizes: HashMap<EnumInfoId, u32>,

  /// Spans of the template instantiations currently on the call stack, innermost last. Bounds
  /// recursive re-instantiation through substitution (`fn foo[T]() { let _: Vec[Vec[T]]; }`
  /// nested arbitrarily by a caller) at `MAX_INSTANTIATION_DEPTH` frames.
  instantiation_stack: ArrayVec<Span, MAX_INSTANTIATION_DEPTH>,
}

impl Context {
  #[must_use] pub fn new() -> Self {
    let mut ns = NamespaceArena::new();
    let global_namespace = ns.new_namespace(None, None);
    Self {
      ty: TyArena::new(),
      mir: MirArena::new(),
      ns,
      diags: Builder::new(),
      scopes: ScopeStack::new(),
      functions: IdxVec::new(),
      function_templates: IdxVec::new(),
      structs: IdxVec::new(),
      struct_templates: IdxVec::new(),
      enums: IdxVec::new(),
      enum_templates: IdxVec::new(),
      aliases: IdxVec::new(),
      alias_templates: IdxVec::new(),
      typeclasses: IdxVec::new(),
      typeclass_templates: IdxVec::new(),
      impls: IdxVec::new(),
      impl_templates: IdxVec::new(),
      insts: IdxVec::new(),
      inst_templates: IdxVec::new(),
      deferred: DeferredQueues::default(),
      solutions: VarSolutions::default(),
      unsolved: Vec::new(),
      next_template_param_tag: 0,
      next_local_var_tag: 0,
      current_self_type: None,
      current_safety: Safety::Safe,
      loop_stack: Vec::new(),
      global_namespace,
      struct_template_params: HashMap::new(),
      enum_template_params: HashMap::new(),
      alias_template_params: HashMap::new(),
      typeclass_template_params: HashMap::new(),
      impl_template_params: HashMap::new(),
      inst_template_params: HashMap::new(),
      enum_ctor_namespaces: HashMap::new(),
      enum_template_ctor_namespaces: HashMap::new(),
      pending_instances: Vec::new(),
      struct_sizes: HashMap::new(),
      enum_sizes: HashMap::new(),
      instantiation_stack: ArrayVec::new(),
    }
  }

  /// Pushes one frame onto the instantiation-recursion guard, reporting a diagnostic instead of
  /// growing past `MAX_INSTANTIATION_DEPTH` (§4.8, §9: "implementations should add one [limit]").
  pub fn enter_instantiation(&mut self, span: Span) -> RResult<()> {
    if self.instantiation_stack.is_full() {
      self.diags.error(span, "template instantiation recursion limit reached");
      return Err(crate::diag::Aborted);
    }
    self.instantiation_stack.push(span);
    Ok(())
  }
  pub fn exit_instantiation(&mut self) {
    self.instantiation_stack.pop();
  }

  pub fn fresh_template_parameter_tag(&mut self) -> TemplateParamTag {
    let tag = TemplateParamTag(self.next_template_param_tag);
    self.next_template_param_tag += 1;
    tag
  }
  pub fn fresh_local_var_tag(&mut self) -> LocalVarTag {
    let tag = LocalVarTag(self.next_local_var_tag);
    self.next_local_var_tag += 1;
    tag
  }

  pub fn fresh_general_type_var(&mut self, class_constraints: Vec<hir::QualifiedName>, span: Span) -> TypeValue {
    let v = self.ty.fresh_type_var(TypeVarKind::General, class_constraints, span);
    if let crate::types::ty::TypeVariant::Variable(_, tag) = self.ty.pure_type(&v) { self.unsolved.push((*tag, v.span.clone())); }
    v
  }
  pub fn fresh_integral_type_var(&mut self, span: Span) -> TypeValue {
    let v = self.ty.fresh_type_var(TypeVarKind::Integral, vec![], span);
    if let crate::types::ty::TypeVariant::Variable(_, tag) = self.ty.pure_type(&v) { self.unsolved.push((*tag, v.span.clone())); }
    v
  }
  pub fn fresh_mutability_var(&mut self, span: Span) -> MutValue { self.ty.fresh_mut_var(span) }

  /// Re-solves every deferred constraint, clearing the queues (§4.5). Run after the signature
  /// pass of a namespace, after each function body, and again at the very end of resolution.
  pub fn drain_deferred_constraints(&mut self) {
    let types = std::mem::take(&mut self.deferred.types);
    let muts = std::mem::take(&mut self.deferred.mutabilities);
    let instances = std::mem::take(&mut self.deferred.instances);
    let struct_fields = std::mem::take(&mut self.deferred.struct_fields);
    let tuple_fields = std::mem::take(&mut self.deferred.tuple_fields);
    for c in types { crate::constraint::solve_type_equality(self, c); }
    for c in muts { crate::constraint::solve_mutability_equality(self, c); }
    for c in struct_fields { crate::constraint::raise_struct_field_constraint(self, c); }
    for c in tuple_fields { crate::constraint::raise_tuple_field_constraint(self, c); }
    self.pending_instances.extend(instances);
    // Chase any solutions that arrived after a variable was queued (§4.5).
    let unsolved = std::mem::take(&mut self.unsolved);
    self.unsolved = unsolved.into_iter().filter(|(tag, _)| !self.ty.type_vars[*tag].is_solved()).collect();
  }
}
