//! A handful of hand-built modules taken through `resolve_module`, standing in for the
//! out-of-scope parser (§8).

use std::rc::Rc;

use resolvc::hir;
use resolvc::types::namespace::LowerEntry;
use resolvc::types::ty::TypeVariant;
use resolvc::types::IntTy;
use resolvc::span::{FileId, Span};
use resolvc::{resolve_module, Context};

fn span() -> Span {
  Span { file: FileId(Rc::from("test")), start_line: 1, start_col: 1, end_line: 1, end_col: 1 }
}

fn name(s: &str) -> hir::Name {
  hir::Name { symbol: resolvc::intern::intern(s), span: span() }
}

fn qualified(s: &str) -> hir::QualifiedName {
  hir::QualifiedName { segments: vec![name(s)] }
}

fn named_ty(s: &str) -> hir::Type {
  hir::Type { kind: hir::TypeKind::Named(qualified(s), vec![]), span: span() }
}

#[test]
fn scenario_1_a_plain_function_resolves_cleanly() {
  let mut ctx = Context::new();
  let def = hir::FunctionDef {
    name: name("f"),
    params: vec![hir::Param {
      pattern: hir::Pattern { kind: hir::PatternKind::Name(name("x"), hir::MutabilityAst::Immut), span: span() },
      ty: named_ty("I32"),
    }],
    return_ty: Some(named_ty("I32")),
    body: hir::Expression { kind: hir::ExpressionKind::Variable(qualified("x")), span: span() },
    span: span(),
  };
  let module = hir::Module { definitions: vec![hir::Definition::Function(def)] };
  resolve_module(&mut ctx, &module);
  assert_eq!(ctx.diags.diagnostics().len(), 0);
}

#[test]
fn scenario_2_a_generic_identity_instantiated_on_an_integer_literal_defaults_to_i32() {
  let mut ctx = Context::new();
  let id_def = hir::FunctionDef {
    name: name("id"),
    params: vec![hir::Param {
      pattern: hir::Pattern { kind: hir::PatternKind::Name(name("x"), hir::MutabilityAst::Immut), span: span() },
      ty: named_ty("T"),
    }],
    return_ty: Some(named_ty("T")),
    body: hir::Expression { kind: hir::ExpressionKind::Variable(qualified("x")), span: span() },
    span: span(),
  };
  let id_template = hir::Template {
    parameters: vec![hir::TemplateParameter {
      name: Some(name("T")),
      kind: hir::TemplateParameterKind::Type { class_constraints: vec![] },
      default: None,
      is_implicit: false,
      span: span(),
    }],
    inner: id_def,
  };
  let g_def = hir::FunctionDef {
    name: name("g"),
    params: vec![],
    return_ty: None,
    body: hir::Expression {
      kind: hir::ExpressionKind::Invocation {
        callee: Box::new(hir::Expression { kind: hir::ExpressionKind::Variable(qualified("id")), span: span() }),
        args: vec![hir::Expression { kind: hir::ExpressionKind::Literal(hir::Literal::Int(5.into())), span: span() }],
      },
      span: span(),
    },
    span: span(),
  };
  let module = hir::Module { definitions: vec![
    hir::Definition::FunctionTemplate(id_template),
    hir::Definition::Function(g_def),
  ] };
  resolve_module(&mut ctx, &module);
  assert_eq!(ctx.diags.diagnostics().len(), 0);

  let g_sym = resolvc::intern::intern("g");
  let g_id = match ctx.ns.find_lower(ctx.global_namespace, g_sym) {
    Some(LowerEntry::Function(id)) => id,
    other => panic!("expected g to resolve to a function, got {other:?}"),
  };
  let ret = ctx.functions[g_id].body.resolved().expect("g's body is resolved").signature.ret.clone();
  assert!(matches!(ctx.ty.flatten_type(&ret), TypeVariant::SignedInt(IntTy::I32)));
}

#[test]
fn scenario_3_a_mismatched_declared_return_type_reports_both_sides() {
  let mut ctx = Context::new();
  let def = hir::FunctionDef {
    name: name("bad"),
    params: vec![],
    return_ty: Some(named_ty("I32")),
    body: hir::Expression { kind: hir::ExpressionKind::Literal(hir::Literal::Bool(true)), span: span() },
    span: span(),
  };
  let module = hir::Module { definitions: vec![hir::Definition::Function(def)] };
  resolve_module(&mut ctx, &module);
  assert_eq!(ctx.diags.diagnostics().len(), 1);
  assert_eq!(ctx.diags.diagnostics()[0].sections.len(), 2);
}

#[test]
fn scenario_4_a_struct_init_missing_a_field_is_diagnosed() {
  let mut ctx = Context::new();
  let struct_def = hir::StructDef { name: name("S"), members: vec![(name("x"), named_ty("I32"))], span: span() };
  let h_def = hir::FunctionDef {
    name: name("h"),
    params: vec![],
    return_ty: None,
    body: hir::Expression {
      kind: hir::ExpressionKind::StructInit { ty: qualified("S"), template_args: vec![], fields: vec![] },
      span: span(),
    },
    span: span(),
  };
  let module = hir::Module { definitions: vec![
    hir::Definition::Struct(struct_def),
    hir::Definition::Function(h_def),
  ] };
  resolve_module(&mut ctx, &module);
  assert!(ctx.diags.has_errors());
}

#[test]
fn scenario_5_calling_a_mut_self_method_on_an_immut_reference_is_a_coercion_error() {
  let mut ctx = Context::new();
  let struct_def = hir::StructDef { name: name("S"), members: vec![], span: span() };

  let self_ref_mut = hir::Type {
    kind: hir::TypeKind::Reference(hir::MutabilityAst::Mut, Box::new(hir::Type { kind: hir::TypeKind::SelfPlaceholder, span: span() })),
    span: span(),
  };
  let method_def = hir::FunctionDef {
    name: name("r"),
    params: vec![hir::Param { pattern: hir::Pattern { kind: hir::PatternKind::Wildcard, span: span() }, ty: self_ref_mut }],
    return_ty: None,
    body: hir::Expression { kind: hir::ExpressionKind::Tuple(vec![]), span: span() },
    span: span(),
  };
  let impl_def = hir::ImplementationDef {
    name: None,
    self_ty: named_ty("S"),
    functions: vec![method_def],
    function_templates: vec![],
    span: span(),
  };

  let call_def = hir::FunctionDef {
    name: name("call"),
    params: vec![],
    return_ty: None,
    body: hir::Expression {
      kind: hir::ExpressionKind::Block(hir::Block {
        effects: vec![
          hir::Expression {
            kind: hir::ExpressionKind::Let {
              pattern: hir::Pattern { kind: hir::PatternKind::Name(name("s"), hir::MutabilityAst::Immut), span: span() },
              ty: None,
              init: Box::new(hir::Expression {
                kind: hir::ExpressionKind::StructInit { ty: qualified("S"), template_args: vec![], fields: vec![] },
                span: span(),
              }),
            },
            span: span(),
          },
          hir::Expression {
            kind: hir::ExpressionKind::Let {
              pattern: hir::Pattern { kind: hir::PatternKind::Name(name("v"), hir::MutabilityAst::Immut), span: span() },
              ty: None,
              init: Box::new(hir::Expression {
                kind: hir::ExpressionKind::Reference {
                  mutability: hir::MutabilityAst::Immut,
                  operand: Box::new(hir::Expression { kind: hir::ExpressionKind::Variable(qualified("s")), span: span() }),
                },
                span: span(),
              }),
            },
            span: span(),
          },
        ],
        tail: Some(Box::new(hir::Expression {
          kind: hir::ExpressionKind::MethodCall {
            receiver: Box::new(hir::Expression { kind: hir::ExpressionKind::Variable(qualified("v")), span: span() }),
            method: name("r"),
            template_args: None,
            args: vec![],
          },
          span: span(),
        })),
      }),
      span: span(),
    },
    span: span(),
  };

  let module = hir::Module { definitions: vec![
    hir::Definition::Struct(struct_def),
    hir::Definition::Implementation(impl_def),
    hir::Definition::Function(call_def),
  ] };
  resolve_module(&mut ctx, &module);
  assert_eq!(ctx.diags.diagnostics().len(), 1);
  assert!(ctx.diags.diagnostics()[0].headline.contains("mismatch"));
}

#[test]
fn scenario_6_a_self_referential_alias_is_a_cyclic_dependency_error() {
  let mut ctx = Context::new();
  let alias_def = hir::AliasDef { name: name("A"), ty: named_ty("A"), span: span() };
  let module = hir::Module { definitions: vec![hir::Definition::Alias(alias_def)] };
  resolve_module(&mut ctx, &module);
  assert_eq!(ctx.diags.diagnostics().len(), 1);
  assert!(ctx.diags.diagnostics()[0].headline.contains("cyclic"));
}
