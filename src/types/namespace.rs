//! The namespace graph (C3, §3.6). A tree of [`Namespace`]s, each holding a lower-name table
//! (values, functions, namespaces, enum constructors) and an upper-name table (types, type
//! templates, typeclasses). Impl/inst blocks are not name-addressable and instead live in the
//! process-wide [`NamelessEntities`] list, scanned during method/instance lookup (C11).

use hashbrown::HashMap;
use crate::idx::IdxVec;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::{
  NamespaceId, FunctionInfoId, FunctionTemplateInfoId, StructInfoId, StructTemplateInfoId,
  EnumInfoId, EnumTemplateInfoId, AliasInfoId, AliasTemplateInfoId,
  TypeclassInfoId, TypeclassTemplateInfoId, ImplInfoId, ImplTemplateInfoId,
  InstInfoId, InstTemplateInfoId,
};

/// Everything a lowercase identifier can resolve to.
#[derive(Copy, Clone, Debug)]
pub enum LowerEntry {
  Function(FunctionInfoId),
  FunctionTemplate(FunctionTemplateInfoId),
  Namespace(NamespaceId),
  /// Added to the enum's namespace when the enum itself is resolved, not at registration time
  /// (§4.2) — the `Symbol` is the constructor name, stored again here for quick display.
  EnumConstructor { enum_info: EnumInfoId, ctor: Symbol },
}

/// Everything a capitalised identifier can resolve to.
#[derive(Copy, Clone, Debug)]
pub enum UpperEntry {
  Struct(StructInfoId),
  StructTemplate(StructTemplateInfoId),
  Enum(EnumInfoId),
  EnumTemplate(EnumTemplateInfoId),
  Alias(AliasInfoId),
  AliasTemplate(AliasTemplateInfoId),
  Typeclass(TypeclassInfoId),
  TypeclassTemplate(TypeclassTemplateInfoId),
}

#[derive(Default)]
pub struct Namespace {
  pub name: Option<Symbol>,
  pub parent: Option<NamespaceId>,
  pub lower: HashMap<Symbol, (LowerEntry, Span)>,
  pub upper: HashMap<Symbol, (UpperEntry, Span)>,
}

/// The impl/inst blocks, which have no name and so cannot live in a `Namespace`'s tables
/// (§3.6, §9 "nameless entity").
#[derive(Default)]
pub struct NamelessEntities {
  pub implementations: Vec<ImplInfoId>,
  pub implementation_templates: Vec<ImplTemplateInfoId>,
  pub instantiations: Vec<InstInfoId>,
  pub instantiation_templates: Vec<InstTemplateInfoId>,
}

#[derive(Default)]
pub struct NamespaceArena {
  pub namespaces: IdxVec<NamespaceId, Namespace>,
  pub nameless: NamelessEntities,
}

impl NamespaceArena {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn new_namespace(&mut self, parent: Option<NamespaceId>, name: Option<Symbol>) -> NamespaceId {
    self.namespaces.push(Namespace { name, parent, ..Namespace::default() })
  }

  /// Inserts a lower-name binding, returning the span of a pre-existing binding with the same
  /// name if there was one (duplicate-definition diagnostics name both spans — §4.2).
  pub fn insert_lower(&mut self, ns: NamespaceId, name: Symbol, span: Span, entry: LowerEntry) -> Option<Span> {
    let table = &mut self.namespaces[ns].lower;
    if let Some((_, prev_span)) = table.get(&name) {
      return Some(prev_span.clone())
    }
    table.insert(name, (entry, span));
    None
  }

  pub fn insert_upper(&mut self, ns: NamespaceId, name: Symbol, span: Span, entry: UpperEntry) -> Option<Span> {
    let table = &mut self.namespaces[ns].upper;
    if let Some((_, prev_span)) = table.get(&name) {
      return Some(prev_span.clone())
    }
    table.insert(name, (entry, span));
    None
  }

  #[must_use] pub fn find_lower(&self, ns: NamespaceId, name: Symbol) -> Option<LowerEntry> {
    self.namespaces[ns].lower.get(&name).map(|(e, _)| *e)
  }
  #[must_use] pub fn find_upper(&self, ns: NamespaceId, name: Symbol) -> Option<UpperEntry> {
    self.namespaces[ns].upper.get(&name).map(|(e, _)| *e)
  }
}
