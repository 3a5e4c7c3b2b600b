//! The minimal known-class registry (spec §4.4's numeric tower, §4.2's synthesized dunder
//! defaults), grounded in the teacher's `types/class.rs` `KnownClass` enum.
//!
//! A real embedding resolves `builtins.object`, `builtins.int`, etc. by importing the actual
//! `builtins` module through [`crate::module::ImportLookup`]; this registry exists so the
//! evaluator and its tests have a self-contained, dependency-free set of the handful of classes
//! the core's own logic (numeric tower, `object` fallback members, `bool`/`str` literal widening)
//! needs to reason about without requiring a real `builtins.pyi` to be loaded.

use crate::ast::NodeId;
use crate::name::Name;
use crate::symbol::SymbolTable;
use crate::types::class::{ClassDetails, ClassFlags, ClassRef};
use crate::types::Type;
use std::rc::Rc;

/// The built-in classes this core's own logic (not user code) needs to name directly.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub object: Rc<ClassDetails>,
    pub bool_: Rc<ClassDetails>,
    pub int: Rc<ClassDetails>,
    pub float: Rc<ClassDetails>,
    pub complex: Rc<ClassDetails>,
    pub str_: Rc<ClassDetails>,
    pub bytes: Rc<ClassDetails>,
    pub type_: Rc<ClassDetails>,
    pub tuple: Rc<ClassDetails>,
    pub list: Rc<ClassDetails>,
    pub dict: Rc<ClassDetails>,
    pub none_type: Rc<ClassDetails>,
    pub base_exception: Rc<ClassDetails>,
}

fn builtin_class(name: &str, bases: Vec<Type>, flags: ClassFlags) -> Rc<ClassDetails> {
    ClassDetails::new(Name::new(name), NodeId(u32::MAX), bases, flags | ClassFlags::IS_BUILTIN, SymbolTable::new())
}

impl Builtins {
    /// Builds the fixed set of built-in classes, wired up with the numeric-tower/`object`
    /// inheritance relationships the assignability engine and class builder assume are present
    /// (spec §4.2: "every class implicitly gains ... members resolved against `object`").
    pub fn bootstrap() -> Self {
        let object = builtin_class("object", vec![], ClassFlags::empty());
        let object_ty = || Type::Class(ClassRef::unspecialized(object.clone()), None);

        let bool_ = builtin_class("bool", vec![object_ty()], ClassFlags::FINAL);
        let int = builtin_class("int", vec![object_ty()], ClassFlags::empty());
        let float = builtin_class("float", vec![object_ty()], ClassFlags::empty());
        let complex = builtin_class("complex", vec![object_ty()], ClassFlags::empty());
        let str_ = builtin_class("str", vec![object_ty()], ClassFlags::empty());
        let bytes = builtin_class("bytes", vec![object_ty()], ClassFlags::empty());
        let type_ = builtin_class("type", vec![object_ty()], ClassFlags::empty());
        let tuple = builtin_class("tuple", vec![object_ty()], ClassFlags::empty());
        let list = builtin_class("list", vec![object_ty()], ClassFlags::empty());
        let dict = builtin_class("dict", vec![object_ty()], ClassFlags::empty());
        let none_type = builtin_class("NoneType", vec![object_ty()], ClassFlags::FINAL);
        let base_exception = builtin_class("BaseException", vec![object_ty()], ClassFlags::empty());

        Self { object, bool_, int, float, complex, str_, bytes, type_, tuple, list, dict, none_type, base_exception }
    }

    pub fn object_instance(&self) -> Type {
        Type::Object(ClassRef::unspecialized(self.object.clone()), None)
    }

    pub fn bool_instance(&self, value: bool) -> Type {
        Type::Object(ClassRef::unspecialized(self.bool_.clone()), Some(crate::types::LiteralValue::Bool(value)))
    }

    pub fn int_instance(&self, value: Option<i64>) -> Type {
        Type::Object(ClassRef::unspecialized(self.int.clone()), value.map(crate::types::LiteralValue::Int))
    }

    pub fn str_instance(&self, value: Option<&str>) -> Type {
        Type::Object(
            ClassRef::unspecialized(self.str_.clone()),
            value.map(|s| crate::types::LiteralValue::Str(s.into())),
        )
    }

    pub fn by_name(&self, name: &str) -> Option<&Rc<ClassDetails>> {
        match name {
            "object" => Some(&self.object),
            "bool" => Some(&self.bool_),
            "int" => Some(&self.int),
            "float" => Some(&self.float),
            "complex" => Some(&self.complex),
            "str" => Some(&self.str_),
            "bytes" => Some(&self.bytes),
            "type" => Some(&self.type_),
            "tuple" => Some(&self.tuple),
            "list" => Some(&self.list),
            "dict" => Some(&self.dict),
            "NoneType" => Some(&self.none_type),
            "BaseException" => Some(&self.base_exception),
            _ => None,
        }
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::bootstrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_is_subclass_of_object() {
        let builtins = Builtins::bootstrap();
        let mro = builtins.bool_.mro().unwrap();
        let names: Vec<_> = mro.classes().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["bool", "object"]);
    }

    #[test]
    fn by_name_finds_every_registered_class() {
        let builtins = Builtins::bootstrap();
        for name in ["object", "int", "float", "str", "bytes", "dict"] {
            assert!(builtins.by_name(name).is_some(), "missing {name}");
        }
        assert!(builtins.by_name("nope").is_none());
    }
}
