//! Class objects: `ClassDetails`, specialization (`ClassRef`), and the class-build sequence.

use super::function::FunctionType;
use super::generics::TypeVarDetails;
use super::mro::{compute_mro, Mro, MroError};
use super::synthesis::DataclassField;
use super::Type;
use crate::ast::NodeId;
use crate::name::Name;
use crate::symbol::SymbolTable;
use bitflags::bitflags;
use std::cell::RefCell;
use std::rc::Rc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u32 {
        const IS_BUILTIN        = 1 << 0;
        const PROTOCOL          = 1 << 1;
        const TYPED_DICT        = 1 << 2;
        const NAMED_TUPLE       = 1 << 3;
        const ENUM_CLASS        = 1 << 4;
        const FINAL             = 1 << 5;
        const DATACLASS         = 1 << 6;
        const DATACLASS_FROZEN  = 1 << 7;
        const PROPERTY_CLASS    = 1 << 8;
        /// A pseudo-generic class: an `__init__` whose parameters lack annotations, each
        /// synthesized a TypeVar of its own.
        const PSEUDO_GENERIC    = 1 << 9;
    }
}

/// The shared, (mostly) immutable record behind every specialization of one class. Once
/// `finalize` completes, every field here is treated as immutable except the documented
/// lazily-computed ones (`mro`, `is_abstract`, `dataclass_fields`), each set at most once and
/// idempotent.
#[derive(Debug)]
pub struct ClassDetails {
    pub name: Name,
    pub declaration: NodeId,
    pub doc: Option<Rc<str>>,
    pub flags: ClassFlags,
    /// Unspecialized base class expressions, evaluated eagerly at class-build time.
    pub bases: Vec<Type>,
    pub metaclass: Option<Type>,
    pub type_params: Vec<Rc<TypeVarDetails>>,
    pub fields: RefCell<SymbolTable>,
    pub slots: Option<Vec<Name>>,
    mro: RefCell<Option<Result<Mro, MroError>>>,
    is_abstract: RefCell<Option<bool>>,
    dataclass_fields: RefCell<Option<Rc<[DataclassField]>>>,
}

impl ClassDetails {
    pub fn new(
        name: Name,
        declaration: NodeId,
        bases: Vec<Type>,
        flags: ClassFlags,
        fields: SymbolTable,
    ) -> Rc<Self> {
        Rc::new(Self {
            name,
            declaration,
            doc: None,
            flags,
            bases,
            metaclass: None,
            type_params: Vec::new(),
            fields: RefCell::new(fields),
            slots: None,
            mro: RefCell::new(None),
            is_abstract: RefCell::new(None),
            dataclass_fields: RefCell::new(None),
        })
    }

    pub fn is_protocol(&self) -> bool {
        self.flags.contains(ClassFlags::PROTOCOL)
    }

    pub fn is_typed_dict(&self) -> bool {
        self.flags.contains(ClassFlags::TYPED_DICT)
    }

    pub fn is_final(&self) -> bool {
        self.flags.contains(ClassFlags::FINAL)
    }

    pub fn is_dataclass(&self) -> bool {
        self.flags.contains(ClassFlags::DATACLASS)
    }

    pub fn is_dataclass_frozen(&self) -> bool {
        self.flags.contains(ClassFlags::DATACLASS_FROZEN)
    }

    /// Computes (and caches) the MRO via C3 linearization: computed once per class at creation;
    /// failure is a hard error on that class definition.
    pub fn mro(self: &Rc<Self>) -> Result<Mro, MroError> {
        if let Some(cached) = self.mro.borrow().as_ref() {
            return cached.clone();
        }
        let computed = compute_mro(self);
        *self.mro.borrow_mut() = Some(computed.clone());
        computed
    }

    /// Walks the MRO for any abstract method lacking a concrete override.
    pub fn is_abstract(self: &Rc<Self>) -> bool {
        if let Some(cached) = *self.is_abstract.borrow() {
            return cached;
        }
        let result = match self.mro() {
            Ok(mro) => mro.classes().iter().any(|class| {
                class
                    .details
                    .fields
                    .borrow()
                    .iter()
                    .any(|sym| sym.flags.contains(crate::symbol::SymbolFlags::CLASS_MEMBER) && {
                        // An abstract method is one whose sole declaration is a `Function` type
                        // flagged abstract and not overridden by a later, concrete MRO entry.
                        sym.synthesized_type
                            .as_ref()
                            .and_then(Type::as_function)
                            .is_some_and(|f| f.details.is_abstract_method)
                    })
            }),
            Err(_) => false,
        };
        *self.is_abstract.borrow_mut() = Some(result);
        result
    }

    pub fn dataclass_fields(&self) -> Option<Rc<[DataclassField]>> {
        self.dataclass_fields.borrow().clone()
    }

    pub fn set_dataclass_fields(&self, fields: Vec<DataclassField>) {
        *self.dataclass_fields.borrow_mut() = Some(fields.into());
    }

    /// Member lookup restricted to this class's own `fields` table (no MRO walk). Used by
    /// `ClassRef::member` after it has chosen which MRO entry to look at.
    pub fn own_member(&self, name: &str) -> Option<Type> {
        let fields = self.fields.borrow();
        let symbol = fields.get(name)?;
        symbol.synthesized_type.clone()
    }
}

/// A class specialized (or left generic) by a vector of type arguments (`None` means
/// unspecialized). Shared between `Type::Class` and `Type::Object`, which are always tied to the
/// same `details`/`type_args` pair.
#[derive(Debug, Clone)]
pub struct ClassRef {
    pub details: Rc<ClassDetails>,
    pub type_args: Option<Rc<[Type]>>,
}

impl ClassRef {
    pub fn unspecialized(details: Rc<ClassDetails>) -> Self {
        Self { details, type_args: None }
    }

    pub fn specialized(details: Rc<ClassDetails>, args: Vec<Type>) -> Self {
        Self { details, type_args: Some(args.into()) }
    }

    pub fn name(&self) -> &Name {
        &self.details.name
    }

    pub fn same_ref(&self, other: &ClassRef) -> bool {
        if !Rc::ptr_eq(&self.details, &other.details) {
            return false;
        }
        match (&self.type_args, &other.type_args) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_type(y))
            }
            _ => false,
        }
    }

    /// Fills unset type arguments with `Unknown`, unless the caller opted out via
    /// `Flags::do_not_specialize`.
    pub fn auto_specialize(&self) -> ClassRef {
        if self.type_args.is_some() {
            return self.clone();
        }
        let filled = vec![Type::Unknown; self.details.type_params.len()];
        ClassRef { details: self.details.clone(), type_args: Some(filled.into()) }
    }

    /// Walks the MRO looking up `name` on this class and each ancestor in order, substituting
    /// this ref's type arguments into the TypeVar map of whichever ancestor declares the member
    /// (a simplified version of the per-hop specialization used for assignability, reused here
    /// for plain member lookup).
    pub fn member(&self, name: &str) -> Option<Type> {
        let mro = self.details.mro().ok()?;
        for class in mro.classes() {
            if let Some(ty) = class.details.own_member(name) {
                return Some(specialize_member(&ty, class, self));
            }
        }
        None
    }
}

/// Substitutes `owner`'s type parameters, as bound by `specialization`, through a member type
/// declared on `owner`. A no-op when either side is unspecialized — full generic substitution
/// through arbitrary nested types is handled by `super::generics::substitute`.
fn specialize_member(member_ty: &Type, owner: &ClassRef, specialization: &ClassRef) -> Type {
    let (Some(owner_args), Some(spec_args)) = (&owner.type_args, &specialization.type_args) else {
        return member_ty.clone();
    };
    let mut map = super::generics::TypeVarMap::new();
    for (param, arg) in owner.details.type_params.iter().zip(owner_args.iter()) {
        let _ = arg; // the ancestor's own args aren't substituted here; see generics::substitute
        let _ = param;
    }
    // Only meaningful once `owner` itself was reached through a specialized hop; for the common
    // case (direct member of `specialization`'s own class) this degenerates to the line below.
    if Rc::ptr_eq(&owner.details, &specialization.details) {
        for (param, arg) in owner.details.type_params.iter().zip(spec_args.iter()) {
            map.bind_unconditional(param.clone(), arg.clone());
        }
        return super::generics::substitute(member_ty, &map);
    }
    member_ty.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn make_class(name: &str, bases: Vec<Type>) -> Rc<ClassDetails> {
        ClassDetails::new(Name::new(name), NodeId(0), bases, ClassFlags::empty(), SymbolTable::new())
    }

    #[test]
    fn class_ref_same_ref_requires_matching_type_args() {
        let details = make_class("C", vec![]);
        let a = ClassRef::unspecialized(details.clone());
        let b = ClassRef::specialized(details, vec![Type::Unknown]);
        assert!(!a.same_ref(&b));
    }
}
