//! The scope stack (C4, §4.3). Implemented as a `Vec` of frames rather than a parent-linked
//! tree of owned nodes: pushing a child scope is a `Vec::push`, and lookup walks the frames
//! innermost-first, which gives the same "chain to parent" semantics as a linked structure
//! without fighting the borrow checker over who owns the parent.

use crate::diag::{Builder, Level, TextSection};
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::ty::MutValue;
use crate::types::ty::TypeValue;
use crate::types::{LocalVarTag, TemplateParamTag};

#[derive(Clone, Debug)]
pub struct VariableBinding {
  pub var: LocalVarTag,
  pub ty: TypeValue,
  pub mutability: MutValue,
  pub span: Span,
  mentioned: bool,
}

#[derive(Clone, Debug)]
pub struct TypeBinding {
  pub ty: TypeValue,
  pub span: Span,
  mentioned: bool,
}

#[derive(Clone, Debug)]
pub struct MutabilityBinding {
  pub tag: TemplateParamTag,
  pub span: Span,
  mentioned: bool,
}

trait Mentionable { fn mentioned(&self) -> bool; fn set_mentioned(&mut self, b: bool); fn span(&self) -> &Span; }
macro_rules! impl_mentionable {
  ($t:ty) => {
    impl Mentionable for $t {
      fn mentioned(&self) -> bool { self.mentioned }
      fn set_mentioned(&mut self, b: bool) { self.mentioned = b }
      fn span(&self) -> &Span { &self.span }
    }
  };
}
impl_mentionable!(VariableBinding);
impl_mentionable!(TypeBinding);
impl_mentionable!(MutabilityBinding);

impl VariableBinding {
  #[must_use] pub fn new(var: LocalVarTag, ty: TypeValue, mutability: MutValue, span: Span) -> Self {
    Self { var, ty, mutability, span, mentioned: false }
  }
}
impl TypeBinding {
  #[must_use] pub fn new(ty: TypeValue, span: Span) -> Self { Self { ty, span, mentioned: false } }
}
impl MutabilityBinding {
  #[must_use] pub fn new(tag: TemplateParamTag, span: Span) -> Self { Self { tag, span, mentioned: false } }
}

#[derive(Default)]
struct Frame {
  variables: Vec<(Symbol, VariableBinding)>,
  types: Vec<(Symbol, TypeBinding)>,
  mutabilities: Vec<(Symbol, MutabilityBinding)>,
}

/// Per-lexical-block bindings for variables, type aliases, and mutability parameters, plus
/// unused-binding tracking (§4.3).
#[derive(Default)]
pub struct ScopeStack {
  frames: Vec<Frame>,
}

fn add_binding<B: Mentionable + Clone>(
  diags: &mut Builder,
  bindings: &mut Vec<(Symbol, B)>,
  name: Symbol,
  mut binding: B,
  description: &str,
) {
  binding.set_mentioned(name.starts_with_underscore());
  if let Some((_, existing)) = bindings.iter_mut().find(|(n, _)| *n == name) {
    if !existing.mentioned() && diags.level_enabled(Level::Warning) {
      diags.warning_at(
        vec![
          TextSection { span: existing.span().clone(), note: format!("first declared here") },
          TextSection { span: binding.span().clone(), note: format!("later shadowed here") },
        ],
        format!("local {description} shadows an unused local {description}"),
        Some(format!("if this is intentional, prefix the first {description} with an underscore")),
      );
      existing.set_mentioned(true);
    }
    *existing = binding;
  } else {
    bindings.push((name, binding));
  }
}

fn warn_unused<B: Mentionable>(diags: &mut Builder, bindings: &[(Symbol, B)], description: &str) {
  for (_, binding) in bindings {
    if !binding.mentioned() {
      diags.warning_at(
        vec![TextSection { span: binding.span().clone(), note: format!("unused {description}") }],
        format!("unused local {description}"),
        Some(format!("if this is intentional, prefix the {description} with an underscore")),
      );
    }
  }
}

impl ScopeStack {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Opens a fresh child scope (§4.3).
  pub fn push(&mut self) { self.frames.push(Frame::default()) }

  /// Closes the innermost scope, warning about any un-mentioned, non-underscore bindings.
  pub fn pop(&mut self, diags: &mut Builder) {
    let frame = self.frames.pop().expect("scope stack underflow");
    warn_unused(diags, &frame.variables, "variable");
    warn_unused(diags, &frame.types, "type alias");
    warn_unused(diags, &frame.mutabilities, "mutability binding");
  }

  fn top(&mut self) -> &mut Frame { self.frames.last_mut().expect("no scope is open") }

  pub fn bind_variable(&mut self, diags: &mut Builder, name: Symbol, binding: VariableBinding) {
    add_binding(diags, &mut self.top().variables, name, binding, "variable");
  }
  pub fn bind_type(&mut self, diags: &mut Builder, name: Symbol, binding: TypeBinding) {
    add_binding(diags, &mut self.top().types, name, binding, "type alias");
  }
  pub fn bind_mutability(&mut self, diags: &mut Builder, name: Symbol, binding: MutabilityBinding) {
    add_binding(diags, &mut self.top().mutabilities, name, binding, "mutability binding");
  }

  fn find<'a, B: Mentionable>(frames: &'a mut [Frame], name: Symbol, select: impl Fn(&mut Frame) -> &mut Vec<(Symbol, B)>) -> Option<&'a mut B> {
    for frame in frames.iter_mut().rev() {
      if let Some((_, b)) = select(frame).iter_mut().find(|(n, _)| *n == name) {
        b.set_mentioned_true_if_found();
        return Some(b)
      }
    }
    None
  }

  pub fn find_variable(&mut self, name: Symbol) -> Option<&mut VariableBinding> {
    Self::find(&mut self.frames, name, |f| &mut f.variables)
  }
  pub fn find_type(&mut self, name: Symbol) -> Option<&mut TypeBinding> {
    Self::find(&mut self.frames, name, |f| &mut f.types)
  }
  pub fn find_mutability(&mut self, name: Symbol) -> Option<&mut MutabilityBinding> {
    Self::find(&mut self.frames, name, |f| &mut f.mutabilities)
  }
}

trait MarkMentioned { fn set_mentioned_true_if_found(&mut self); }
impl<B: Mentionable> MarkMentioned for B {
  fn set_mentioned_true_if_found(&mut self) { self.set_mentioned(true) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::Context;
  use crate::span::FileId;
  use std::rc::Rc;

  fn span() -> Span {
    Span { file: FileId(Rc::from("test")), start_line: 1, start_col: 1, end_line: 1, end_col: 1 }
  }

  fn binding(ctx: &mut Context) -> VariableBinding {
    let ty = ctx.ty.bool_type(span());
    let m = ctx.ty.concrete_mut(false, span());
    VariableBinding::new(ctx.fresh_local_var_tag(), ty, m, span())
  }

  #[test]
  fn shadowing_an_unmentioned_binding_warns_once() {
    let mut ctx = Context::new();
    let mut scopes = ScopeStack::new();
    scopes.push();
    let name = crate::intern::intern("x");
    let first = binding(&mut ctx);
    scopes.bind_variable(&mut ctx.diags, name, first);
    let second = binding(&mut ctx);
    scopes.bind_variable(&mut ctx.diags, name, second);
    scopes.find_variable(name); // mark the shadowing binding mentioned, isolating the shadow warning
    scopes.pop(&mut ctx.diags);
    assert_eq!(ctx.diags.diagnostics().len(), 1);
    assert!(ctx.diags.diagnostics()[0].headline.contains("shadows"));
  }

  #[test]
  fn underscore_prefixed_shadowing_is_silent() {
    let mut ctx = Context::new();
    let mut scopes = ScopeStack::new();
    scopes.push();
    let name = crate::intern::intern("_x");
    let first = binding(&mut ctx);
    scopes.bind_variable(&mut ctx.diags, name, first);
    let second = binding(&mut ctx);
    scopes.bind_variable(&mut ctx.diags, name, second);
    scopes.pop(&mut ctx.diags);
    assert_eq!(ctx.diags.diagnostics().len(), 0);
  }
}
