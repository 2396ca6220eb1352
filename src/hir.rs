//! The desugared surface tree (§6 input boundary).
//!
//! This is produced by the parser and the desugaring pass (both out of scope for this crate;
//! see the module docs in `lib.rs`). By the time a [`Module`] reaches [`crate::resolve`],
//! `if let`/`while let` have already become `match`, `while` has become a labelled `loop`, and
//! `discard e` has become `{ let _ = e; }`. `for` loops and lambdas are *not* desugared here:
//! the elaborator (C9) rejects them on sight, per the open questions in the specification.

use std::rc::Rc;
use num::BigInt;
use crate::intern::Symbol;
use crate::span::Span;

/// An identifier together with the span it was written at. Lowercase names bind values,
/// functions, namespaces and enum constructors; capitalised names bind types, type templates
/// and typeclasses (§6).
#[derive(Clone, Debug)]
pub struct Name {
  pub symbol: Symbol,
  pub span: Span,
}

/// A possibly-qualified path, e.g. `Foo::Bar::baz`.
#[derive(Clone, Debug)]
pub struct QualifiedName {
  pub segments: Vec<Name>,
}

impl QualifiedName {
  #[must_use] pub fn last(&self) -> &Name { self.segments.last().expect("empty qualified name") }
  #[must_use] pub fn is_unqualified(&self) -> bool { self.segments.len() == 1 }
}

#[derive(Clone, Debug)]
pub enum MutabilityAst {
  Immut,
  Mut,
  /// A reference to an in-scope mutability template parameter.
  Parameter(Name),
  /// A unification variable to be inferred, used for elided reference mutability.
  Hole(Span),
}

/// A template parameter declaration, of kind type, value, or mutability.
#[derive(Clone, Debug)]
pub struct TemplateParameter {
  pub name: Option<Name>,
  pub kind: TemplateParameterKind,
  pub default: Option<TemplateArgument>,
  /// Implicit (wildcard-only) parameters may be omitted entirely at the call site; they sit
  /// after all defaulted parameters (§4.8).
  pub is_implicit: bool,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub enum TemplateParameterKind {
  Type { class_constraints: Vec<QualifiedName> },
  Value { ty: Box<Type> },
  Mutability,
}

#[derive(Clone, Debug)]
pub enum TemplateArgument {
  Type(Box<Type>),
  Mutability(MutabilityAst),
  Value(Box<Expression>),
  /// `_`: resolve to a fresh unification variable (possibly seeded with class constraints).
  Wildcard(Span),
}

#[derive(Clone, Debug)]
pub struct Type {
  pub kind: TypeKind,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub enum TypeKind {
  Named(QualifiedName, Vec<TemplateArgument>),
  Tuple(Vec<Type>),
  Array(Box<Type>, Box<Expression>),
  Slice(Box<Type>),
  Pointer(bool, Box<Type>),
  Reference(MutabilityAst, Box<Type>),
  Function(Vec<Type>, Box<Type>),
  SelfPlaceholder,
  /// `_`: to be solved by a fresh general unification variable.
  Hole,
}

#[derive(Clone, Debug)]
pub struct Pattern {
  pub kind: PatternKind,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub enum PatternKind {
  Wildcard,
  Literal(Literal),
  Name(Name, MutabilityAst),
  Tuple(Vec<Pattern>),
  Slice(Vec<Pattern>),
  Ctor(QualifiedName, Option<Box<Pattern>>),
  As(Box<Pattern>, Name),
  Guarded(Box<Pattern>, Box<Expression>),
}

#[derive(Clone, Debug)]
pub enum Literal {
  Int(BigInt),
  Float(Rc<str>),
  Bool(bool),
  Char(char),
  Str(Rc<str>),
}

#[derive(Clone, Debug)]
pub struct Expression {
  pub kind: ExpressionKind,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Block {
  pub effects: Vec<Expression>,
  pub tail: Option<Box<Expression>>,
}

#[derive(Clone, Debug)]
pub struct MatchArm {
  pub pattern: Pattern,
  pub body: Expression,
}

#[derive(Clone, Debug)]
pub enum ExpressionKind {
  Literal(Literal),
  Tuple(Vec<Expression>),
  ArrayLiteral(Vec<Expression>),
  Block(Block),
  /// A plain `loop { .. }`. Already-desugared `while`/`for` bodies also end up here, wrapped
  /// so that their `break`s are known (by the elaborator) to carry unit.
  Loop { label: Option<Name>, body: Box<Block>, is_lowered_while: bool },
  Break { label: Option<Name>, result: Option<Box<Expression>> },
  Continue { label: Option<Name> },
  If { cond: Box<Expression>, then_branch: Box<Expression>, else_branch: Option<Box<Expression>> },
  Match { scrutinee: Box<Expression>, arms: Vec<MatchArm> },
  Let { pattern: Pattern, ty: Option<Box<Type>>, init: Box<Expression> },
  LocalAlias { name: Name, ty: Box<Type> },
  Reference { mutability: MutabilityAst, operand: Box<Expression> },
  Dereference(Box<Expression>),
  /// `*p` where `p` is (or will turn out to be) an unsafe pointer; only legal inside `unsafe`.
  UnsafeDereference(Box<Expression>),
  Addressof(Box<Expression>),
  Move(Box<Expression>),
  Sizeof(Box<Type>),
  Invocation { callee: Box<Expression>, args: Vec<Expression> },
  MethodCall { receiver: Box<Expression>, method: Name, template_args: Option<Vec<TemplateArgument>>, args: Vec<Expression> },
  TemplateApplication { name: QualifiedName, args: Vec<TemplateArgument> },
  Variable(QualifiedName),
  StructInit { ty: QualifiedName, template_args: Vec<TemplateArgument>, fields: Vec<(Name, Expression)> },
  FieldAccess { base: Box<Expression>, field: FieldName },
  SelfValue(Span),
  Hole(Span),
  /// Enters an unsafe context for the duration of `body`; consumed by the elaborator and does
  /// not appear in the typed output (§3.4).
  Unsafe(Box<Block>),
  /// Rejected by the elaborator: `not supported yet` (§7, §9 open questions).
  For { span: Span },
  Lambda { span: Span },
  Cast { span: Span },
  Ret { span: Span },
  NamedArgInvocation { span: Span },
}

#[derive(Clone, Debug)]
pub enum FieldName {
  Named(Name),
  Tuple(usize, Span),
}

// ---- top-level definitions --------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Param {
  pub pattern: Pattern,
  pub ty: Type,
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
  pub name: Name,
  pub params: Vec<Param>,
  /// `None` means the return type is inferred from the body (§4.7: partially-resolved
  /// functions only exist when this is `Some`).
  pub return_ty: Option<Type>,
  pub body: Expression,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct StructDef {
  pub name: Name,
  pub members: Vec<(Name, Type)>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct EnumCtorDef {
  pub name: Name,
  pub payload: Option<Type>,
}

#[derive(Clone, Debug)]
pub struct EnumDef {
  pub name: Name,
  pub ctors: Vec<EnumCtorDef>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct AliasDef {
  pub name: Name,
  pub ty: Type,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypeclassDef {
  pub name: Name,
  pub methods: Vec<FunctionDef>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ImplementationDef {
  pub name: Option<Name>,
  pub self_ty: Type,
  pub functions: Vec<FunctionDef>,
  pub function_templates: Vec<(Vec<TemplateParameter>, FunctionDef)>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct InstantiationDef {
  pub name: Option<Name>,
  pub class: QualifiedName,
  pub self_ty: Type,
  pub functions: Vec<FunctionDef>,
  pub span: Span,
}

#[derive(Clone, Debug)]
pub struct NamespaceDef {
  pub name: Name,
  pub definitions: Vec<Definition>,
  pub span: Span,
}

/// A `D` alongside the template parameters it is generic over. Only meaningful for the
/// `*_template` variants of [`Definition`].
#[derive(Clone, Debug)]
pub struct Template<D> {
  pub parameters: Vec<TemplateParameter>,
  pub inner: D,
}

#[derive(Clone, Debug)]
pub enum Definition {
  Function(FunctionDef),
  FunctionTemplate(Template<FunctionDef>),
  Struct(StructDef),
  StructTemplate(Template<StructDef>),
  Enum(EnumDef),
  EnumTemplate(Template<EnumDef>),
  Alias(AliasDef),
  AliasTemplate(Template<AliasDef>),
  Typeclass(TypeclassDef),
  TypeclassTemplate(Template<TypeclassDef>),
  Implementation(ImplementationDef),
  ImplementationTemplate(Template<ImplementationDef>),
  Instantiation(InstantiationDef),
  InstantiationTemplate(Template<InstantiationDef>),
  Namespace(NamespaceDef),
}

/// The whole desugared input to the resolver.
#[derive(Clone, Debug, Default)]
pub struct Module {
  pub definitions: Vec<Definition>,
}
