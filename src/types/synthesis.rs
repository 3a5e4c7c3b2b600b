//! The dataclass/TypedDict/NamedTuple/Enum synthesis pipeline (spec §4.7), grounded in the
//! teacher's `types/known_instance.rs` class-decorator handling.

use super::class::{ClassDetails, ClassFlags, ClassRef};
use super::function::{FunctionDetails, FunctionFlags, FunctionType, Parameter};
use super::Type;
use crate::ast::{NodeId, ParameterKind};
use crate::name::Name;
use crate::symbol::{Symbol, SymbolFlags};
use std::rc::Rc;

/// One collected dataclass/NamedTuple field (spec §4.7): name, declared type, and whether a
/// default value makes it optional in the synthesized `__init__`.
#[derive(Debug, Clone)]
pub struct DataclassField {
    pub name: Name,
    pub annotation: Type,
    pub has_default: bool,
    /// `field(init=False)` / NamedTuple fields never lack this — kept for dataclass-only callers.
    pub include_in_init: bool,
}

fn field_parameter(field: &DataclassField) -> Parameter {
    Parameter {
        name: field.name.clone(),
        annotation: field.annotation.clone(),
        has_default: field.has_default,
        kind: ParameterKind::PositionalOrKeyword,
        param_spec: None,
    }
}

fn synthesized_function(
    name: &str,
    declaration: NodeId,
    parameters: Vec<Parameter>,
    declared_return: Type,
) -> Type {
    Type::Function(FunctionType::new(Rc::new(FunctionDetails {
        name: Name::new(name),
        declaration,
        doc: None,
        parameters,
        declared_return: Some(declared_return),
        flags: FunctionFlags::empty(),
        built_in_name: None,
        is_abstract_method: false,
    })))
}

/// Synthesizes `__init__` (and, for frozen dataclasses, marks every field `Final`) from the
/// collected fields and installs both onto `class` (spec §4.7: "carried forward unchanged for all
/// four synthesized families"; frozen-field-final marking is the ADDED fifth-family supplement).
pub fn synthesize_dataclass(class: &Rc<ClassDetails>, fields: Vec<DataclassField>) {
    let self_param = Parameter {
        name: Name::new("self"),
        annotation: Type::Unknown,
        has_default: false,
        kind: ParameterKind::PositionalOrKeyword,
        param_spec: None,
    };
    let mut params = vec![self_param];
    params.extend(fields.iter().filter(|f| f.include_in_init).map(field_parameter));
    let init = synthesized_function("__init__", class.declaration, params, Type::None);

    let mut table = class.fields.borrow_mut();
    table.insert({
        let mut sym = Symbol::new(Name::new("__init__"));
        sym.flags |= SymbolFlags::CLASS_MEMBER | SymbolFlags::SYNTHESIZED;
        sym.synthesized_type = Some(init);
        sym
    });

    let frozen = class.is_dataclass_frozen();
    for field in &fields {
        let mut sym = Symbol::new(field.name.clone());
        sym.flags |= SymbolFlags::INSTANCE_MEMBER | SymbolFlags::SYNTHESIZED;
        if frozen {
            sym.flags |= SymbolFlags::FINAL;
        }
        sym.synthesized_type = Some(field.annotation.clone());
        table.insert(sym);
    }
    drop(table);
    class.set_dataclass_fields(fields);
}

/// TypedDict's structural shape needs no synthesized methods, only per-key required/optional flags
/// (spec §4.7.b / §4.4.b): this just stamps `TYPED_DICT_REQUIRED` onto the declared key symbols.
/// `total` is the class-level default (`class D(TypedDict)` defaults to `total=True`);
/// `not_required_keys` lists keys whose per-field `Required[]`/`NotRequired[]` annotation (or, for
/// `total=False`, presence in an explicit `Required[]`) flips that default.
pub fn finalize_typed_dict(class: &Rc<ClassDetails>, not_required_keys: &[Name], total: bool) {
    let mut table = class.fields.borrow_mut();
    let names: Vec<Name> = table.names().cloned().collect();
    for name in names {
        let overridden = not_required_keys.contains(&name);
        let required = if total { !overridden } else { overridden };
        if let Some(sym) = table.get_mut(name.as_str()) {
            if required {
                sym.flags |= SymbolFlags::TYPED_DICT_REQUIRED;
            } else {
                sym.flags.remove(SymbolFlags::TYPED_DICT_REQUIRED);
            }
        }
    }
}

/// Synthesizes a `NamedTuple`'s `__new__` (spec §4.7: "skip-constructor-check flag" lets the
/// call resolver prefer this over a synthesized `__init__`) from its positional fields.
pub fn synthesize_named_tuple(class: &Rc<ClassDetails>, fields: Vec<DataclassField>) {
    let cls_param = Parameter {
        name: Name::new("cls"),
        annotation: Type::Unknown,
        has_default: false,
        kind: ParameterKind::PositionalOrKeyword,
        param_spec: None,
    };
    let mut params = vec![cls_param];
    params.extend(fields.iter().map(field_parameter));
    let self_ty = Type::Object(ClassRef::unspecialized(class.clone()), None);
    let new_fn = synthesized_function("__new__", class.declaration, params, self_ty);

    let mut table = class.fields.borrow_mut();
    table.insert({
        let mut sym = Symbol::new(Name::new("__new__"));
        sym.flags |= SymbolFlags::CLASS_MEMBER | SymbolFlags::SYNTHESIZED;
        sym.synthesized_type = Some(new_fn);
        sym
    });
    for field in &fields {
        let mut sym = Symbol::new(field.name.clone());
        sym.flags |= SymbolFlags::INSTANCE_MEMBER | SymbolFlags::SYNTHESIZED | SymbolFlags::FINAL;
        sym.synthesized_type = Some(field.annotation.clone());
        table.insert(sym);
    }
    drop(table);
    class.set_dataclass_fields(fields);
}

/// One member of a synthesized `Enum`, from either the class body (`RED = 1`) or the functional
/// API (`Enum('Color', ['RED', 'GREEN'])`). `underlying_value` is what `Member.value` evaluates to
/// (an `int`/`str`/... instance), kept separate from the member's own `Literal[EnumClass.MEMBER]`
/// type that gets installed on the class.
#[derive(Debug, Clone)]
pub struct EnumMember {
    pub name: Name,
    pub underlying_value: Type,
}

/// Installs each member as a `Literal[EnumClass.MEMBER]`-typed class attribute plus a `_value_`
/// slot carrying its underlying value (spec §4.7): both the class-body form and the functional API
/// converge here once the caller has collected members.
pub fn synthesize_enum(class: &Rc<ClassDetails>, members: Vec<EnumMember>) {
    let mut table = class.fields.borrow_mut();
    for member in members {
        let literal = super::LiteralValue::EnumMember {
            class_name: class.name.clone(),
            member_name: member.name.clone(),
        };
        let member_ty = Type::Object(ClassRef::unspecialized(class.clone()), Some(literal));
        let mut sym = Symbol::new(member.name.clone());
        sym.flags |= SymbolFlags::CLASS_MEMBER | SymbolFlags::FINAL | SymbolFlags::SYNTHESIZED;
        sym.synthesized_type = Some(member_ty);
        table.insert(sym);

        let mut value_sym = Symbol::new(Name::new(&format!("{}__value", member.name.as_str())));
        value_sym.flags |= SymbolFlags::INSTANCE_MEMBER | SymbolFlags::SYNTHESIZED;
        value_sym.synthesized_type = Some(member.underlying_value);
        table.insert(value_sym);
    }
}

/// The `Enum('Color', ['RED', 'GREEN', 'BLUE'])` functional API (spec §4.7's ADDED supplement):
/// builds a fresh `ClassDetails` deriving from `enum_base`, then synthesizes its members as
/// sequential integer values (the common case; string-valued functional calls build their own
/// `EnumMember::underlying_value` instead of calling this helper).
pub fn synthesize_functional_enum(
    class_name: Name,
    declaration: NodeId,
    enum_base: Type,
    int_class: &Rc<ClassDetails>,
    member_names: &[Name],
) -> Rc<ClassDetails> {
    let details = ClassDetails::new(
        class_name,
        declaration,
        vec![enum_base],
        ClassFlags::ENUM_CLASS,
        crate::symbol::SymbolTable::new(),
    );
    let members = member_names
        .iter()
        .enumerate()
        .map(|(i, name)| EnumMember {
            name: name.clone(),
            underlying_value: Type::Object(
                ClassRef::unspecialized(int_class.clone()),
                Some(super::LiteralValue::Int(i as i64 + 1)),
            ),
        })
        .collect();
    synthesize_enum(&details, members);
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn class(name: &str, flags: ClassFlags) -> Rc<ClassDetails> {
        ClassDetails::new(Name::new(name), NodeId(0), vec![], flags, SymbolTable::new())
    }

    #[test]
    fn dataclass_synthesizes_init_with_one_param_per_field() {
        let class = class("Point", ClassFlags::DATACLASS);
        synthesize_dataclass(
            &class,
            vec![
                DataclassField { name: Name::new("x"), annotation: Type::Unknown, has_default: false, include_in_init: true },
                DataclassField { name: Name::new("y"), annotation: Type::Unknown, has_default: true, include_in_init: true },
            ],
        );
        let init = class.own_member("__init__").unwrap();
        let Type::Function(f) = init else { panic!("expected function") };
        assert_eq!(f.details.parameters.len(), 3); // self, x, y
    }

    #[test]
    fn frozen_dataclass_marks_fields_final() {
        let class = class("Point", ClassFlags::DATACLASS | ClassFlags::DATACLASS_FROZEN);
        synthesize_dataclass(
            &class,
            vec![DataclassField { name: Name::new("x"), annotation: Type::Unknown, has_default: false, include_in_init: true }],
        );
        let fields = class.fields.borrow();
        let x = fields.get("x").unwrap();
        assert!(x.flags.contains(SymbolFlags::FINAL));
    }

    #[test]
    fn functional_enum_assigns_sequential_literals() {
        let object = class("object", ClassFlags::empty());
        let base = Type::Class(ClassRef::unspecialized(object.clone()), None);
        let int_class = class("int", ClassFlags::empty());
        let color = synthesize_functional_enum(
            Name::new("Color"),
            NodeId(0),
            base,
            &int_class,
            &[Name::new("RED"), Name::new("GREEN")],
        );
        let red = color.own_member("RED").unwrap();
        assert_eq!(red.literal(), Some(&super::super::LiteralValue::EnumMember {
            class_name: Name::new("Color"),
            member_name: Name::new("RED"),
        }));
    }
}
