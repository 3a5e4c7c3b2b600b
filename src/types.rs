//! The algebraic type model and its submodules.
//!
//! `Type` is the tagged sum every other component (the expression evaluator, the class/function
//! builder, the call resolver, the assignability engine, the TypeVar solver, the narrower, and
//! the synthesis pipeline) passes around. Every payload that isn't a bare unit variant is
//! `Rc`-backed, so `Type::clone()` never re-walks a class or function body.

pub mod assignability;
pub mod call;
pub mod class;
pub mod display;
pub mod function;
pub mod generics;
pub mod mro;
pub mod narrow;
pub mod synthesis;

use crate::name::Name;
use class::ClassDetails;
use function::FunctionDetails;
use generics::TypeVarDetails;
use std::rc::Rc;

pub use class::ClassRef;
pub use function::FunctionType;

/// The value a `Literal` type narrows to; only ever carried on `Object`, only for these classes.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    /// `EnumClass.MEMBER`.
    EnumMember { class_name: Name, member_name: Name },
}

impl std::fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralValue::Bool(b) => write!(f, "{b}"),
            LiteralValue::Int(i) => write!(f, "{i}"),
            LiteralValue::Str(s) => write!(f, "{s:?}"),
            LiteralValue::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            LiteralValue::EnumMember { class_name, member_name } => {
                write!(f, "{class_name}.{member_name}")
            }
        }
    }
}

/// A module object.
#[derive(Debug, Clone)]
pub struct ModuleType {
    pub fields: crate::symbol::SymbolTableRef,
    /// Names contributed by the module-loader protocol (`__name__`, `__file__`, ...), looked up
    /// only after `fields` misses (a two-tier module member lookup).
    pub loader_fields: crate::symbol::SymbolTableRef,
    pub doc: Option<Rc<str>>,
}

/// The tagged sum at the center of this crate.
#[derive(Debug, Clone)]
pub enum Type {
    /// Name declared but not yet assigned on some path.
    Unbound,
    /// Dynamically-typed value whose type could not be inferred; diagnostically distinct from
    /// `Any` ("we gave up" vs. "annotation said so").
    Unknown,
    /// Dynamic top/bottom. `is_ellipsis` renders as `...` (a bare `...` default-value
    /// placeholder, or a stub-file annotation converted under `ConvertEllipsisToAny`).
    Any { is_ellipsis: bool },
    None,
    Never,
    /// The class object itself.
    Class(ClassRef, Option<LiteralValue>),
    /// An instance of a class. Always shares `details`/`type_args` with its `Class` counterpart.
    Object(ClassRef, Option<LiteralValue>),
    Function(FunctionType),
    /// Ordered overload candidates; never empty.
    OverloadedFunction(Rc<[FunctionType]>),
    Module(ModuleType),
    /// Flattened, deduplicated, never-singleton, never-nested.
    Union(Rc<[Type]>),
    TypeVar(Rc<TypeVarDetails>),
}

// Invariant 7 (SPEC_FULL.md §3): every `Type` clone must be O(1) — no payload may carry an
// owned `Vec`/`String` that a clone would have to walk. `Rc` and `Copy` payloads only.
static_assertions::assert_impl_all!(Type: Clone, std::fmt::Debug);
static_assertions::assert_impl_all!(ClassRef: Clone);
static_assertions::assert_impl_all!(FunctionType: Clone);

impl Type {
    pub fn any() -> Self {
        Type::Any { is_ellipsis: false }
    }

    pub fn ellipsis_any() -> Self {
        Type::Any { is_ellipsis: true }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// `Any` absorbs in assignability both ways; `Unknown` behaves like `Any`.
    pub fn is_any_or_unknown(&self) -> bool {
        self.is_any() || self.is_unknown()
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Type::None)
    }

    pub fn is_union(&self) -> bool {
        matches!(self, Type::Union(_))
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Type::Class(..))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Object(..))
    }

    pub fn is_type_var(&self) -> bool {
        matches!(self, Type::TypeVar(_))
    }

    pub fn as_class_ref(&self) -> Option<&ClassRef> {
        match self {
            Type::Class(c, _) | Type::Object(c, _) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_type_var(&self) -> Option<&Rc<TypeVarDetails>> {
        match self {
            Type::TypeVar(tv) => Some(tv),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&LiteralValue> {
        match self {
            Type::Class(_, lit) | Type::Object(_, lit) => lit.as_ref(),
            _ => None,
        }
    }

    /// Strip a literal, keeping only the class shape. Used when no expected type forces literal
    /// preservation.
    pub fn widen_literal(&self) -> Type {
        match self {
            Type::Object(class, Some(_)) => Type::Object(class.clone(), None),
            other => other.clone(),
        }
    }

    /// `Type[X]` -> `X`: the instance type of a class-object type. `Object`/other non-class
    /// types are their own "instance" here for the member-access transform's convenience.
    pub fn to_instance(&self) -> Type {
        match self {
            Type::Class(class, lit) => Type::Object(class.clone(), lit.clone()),
            other => other.clone(),
        }
    }

    /// The reverse of [`Type::to_instance`]: `X` -> `Type[X]`.
    pub fn to_class_object(&self) -> Option<Type> {
        match self {
            Type::Object(class, lit) => Some(Type::Class(class.clone(), lit.clone())),
            _ => None,
        }
    }

    /// Structural-ish equality used for union deduplication and TypeVar-map compatibility checks.
    /// Class/function identity is by `Rc` pointer (detail records are shared, never duplicated),
    /// the same "compares by identity" rule applied to `TypeVar`s extended here to class/function
    /// details for the same reason: two distinct `ClassDetails` can legitimately have the same
    /// name (shadowing, different modules).
    pub fn same_type(&self, other: &Type) -> bool {
        use Type::*;
        match (self, other) {
            (Unbound, Unbound) | (Unknown, Unknown) | (None, None) | (Never, Never) => true,
            (Any { is_ellipsis: a }, Any { is_ellipsis: b }) => a == b,
            (Class(a, la), Class(b, lb)) | (Object(a, la), Object(b, lb)) => {
                a.same_ref(b) && la == lb
            }
            (Function(a), Function(b)) => Rc::ptr_eq(&a.details, &b.details),
            (OverloadedFunction(a), OverloadedFunction(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| Rc::ptr_eq(&x.details, &y.details))
            }
            (Module(a), Module(b)) => Rc::ptr_eq(&a.fields, &b.fields),
            (Union(a), Union(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_type(y))
            }
            (TypeVar(a), TypeVar(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Every `Object`/`Class` subtype contained in a (possibly non-union) type.
    pub fn subtypes(&self) -> Vec<Type> {
        match self {
            Type::Union(members) => members.to_vec(),
            other => vec![other.clone()],
        }
    }
}

/// Builds a [`Type::Union`], flattening nested unions, dropping `Never`, and collapsing a
/// singleton result to its one element.
#[derive(Debug, Default)]
pub struct UnionBuilder {
    members: Vec<Type>,
}

impl UnionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, ty: Type) -> Self {
        self.push(ty);
        self
    }

    fn push(&mut self, ty: Type) {
        match ty {
            Type::Never => {}
            Type::Union(members) => {
                for member in members.iter() {
                    self.push(member.clone());
                }
            }
            other => {
                if !self.members.iter().any(|existing| existing.same_type(&other)) {
                    self.members.push(other);
                }
            }
        }
    }

    pub fn build(self) -> Type {
        flatten_union(self.members)
    }
}

pub fn flatten_union(members: Vec<Type>) -> Type {
    let mut builder = UnionBuilder::new();
    for member in members {
        builder.push(member);
    }
    let mut members = builder.members.into_iter();
    match members.len() {
        0 => Type::Never,
        1 => members.next().unwrap_or(Type::Never),
        _ => Type::Union(members.collect()),
    }
}

pub fn union_of(types: impl IntoIterator<Item = Type>) -> Type {
    flatten_union(types.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_dedups() {
        let ty = union_of([Type::None, union_of([Type::Unknown, Type::None]), Type::Unknown]);
        match ty {
            Type::Union(members) => assert_eq!(members.len(), 2),
            other => panic!("expected Union, got {other:?}"),
        }
    }

    #[test]
    fn union_of_zero_is_never() {
        assert!(matches!(flatten_union(vec![]), Type::Never));
    }

    #[test]
    fn union_of_one_collapses() {
        assert!(matches!(union_of([Type::None]), Type::None));
    }
}
