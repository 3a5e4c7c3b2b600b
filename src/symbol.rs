//! Symbols and declarations (spec §3), produced by the external binder and consumed read-only by
//! the evaluator except for the `synthesized_type` slot, which §4.7's synthesis pipeline fills in.

use crate::ast::NodeId;
use crate::name::Name;
use crate::types::Type;
use bitflags::bitflags;
use std::fmt;
use std::rc::Rc;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFlags: u16 {
        const CLASS_MEMBER              = 1 << 0;
        const INSTANCE_MEMBER           = 1 << 1;
        const CLASS_VAR                 = 1 << 2;
        const FINAL                     = 1 << 3;
        const PRIVATE                   = 1 << 4;
        const SYNTHESIZED               = 1 << 5;
        const IGNORED_FOR_PROTOCOL_MATCH = 1 << 6;
        /// A `TypedDict` key that must be present (spec §4.7's `isRequired`).
        const TYPED_DICT_REQUIRED       = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DeclarationKind {
    Variable,
    Parameter,
    Function,
    Class,
    Alias,
    Intrinsic,
    SpecialBuiltInClass,
}

/// An immutable record of one place a symbol is declared/assigned.
///
/// Declarations never move once produced; this core refers to them by value (cheap to clone,
/// `Rc`-backed) rather than by index into a binder-owned arena, since the binder is external.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub node: NodeId,
    pub kind: DeclarationKind,
    pub is_constant: bool,
    /// Present when the declaration carries an explicit type annotation (a "typed declaration").
    pub type_annotation: Option<NodeId>,
    pub inferred_type_source: Option<NodeId>,
    pub alias: Option<AliasInfo>,
}

impl Declaration {
    pub fn is_typed(&self) -> bool {
        self.type_annotation.is_some()
    }
}

impl fmt::Display for Declaration {
    /// Used in diagnostic messages, e.g. "redeclaration of `x` (previously declared as a
    /// `variable`)".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

#[derive(Debug, Clone)]
pub struct AliasInfo {
    pub module_path: Name,
    pub local_rename: bool,
    pub submodule_fallback: bool,
    pub symbol_name_in_target: Option<Name>,
}

/// A named binding: the full set of places it's declared, plus any class/instance-member flags.
#[derive(Debug, Clone, Default)]
pub struct Symbol {
    pub name: Name,
    pub declarations: Vec<Declaration>,
    pub flags: SymbolFlags,
    pub synthesized_type: Option<Type>,
}

impl Symbol {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            declarations: Vec::new(),
            flags: SymbolFlags::empty(),
            synthesized_type: None,
        }
    }

    pub fn typed_declarations(&self) -> impl DoubleEndedIterator<Item = &Declaration> {
        self.declarations.iter().filter(|d| d.is_typed())
    }

    pub fn is_class_member(&self) -> bool {
        self.flags.contains(SymbolFlags::CLASS_MEMBER)
    }

    pub fn is_instance_member(&self) -> bool {
        self.flags.contains(SymbolFlags::INSTANCE_MEMBER)
    }

    pub fn is_class_var(&self) -> bool {
        self.flags.contains(SymbolFlags::CLASS_VAR)
    }

    pub fn ignored_for_protocol_match(&self) -> bool {
        self.flags.contains(SymbolFlags::IGNORED_FOR_PROTOCOL_MATCH)
    }
}

/// The result of looking a name up in a scope/class/module: a type plus whether it might be
/// unbound on some path (spec's `Boundness`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundness {
    Bound,
    MayBeUnbound,
}

#[derive(Debug, Clone)]
pub enum LookupResult {
    Type(Type, Boundness),
    Unbound,
}

impl LookupResult {
    pub fn is_unbound(&self) -> bool {
        matches!(self, LookupResult::Unbound)
    }

    pub fn may_be_unbound(&self) -> bool {
        match self {
            LookupResult::Type(_, Boundness::MayBeUnbound) | LookupResult::Unbound => true,
            LookupResult::Type(_, Boundness::Bound) => false,
        }
    }

    pub fn unwrap_or_unknown(self) -> Type {
        match self {
            LookupResult::Type(ty, _) => ty,
            LookupResult::Unbound => Type::Unknown,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            LookupResult::Type(ty, _) => Some(ty),
            LookupResult::Unbound => None,
        }
    }
}

/// An ordered table of symbols owned by a scope, class, or module (spec §3).
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    order: Vec<Name>,
    by_name: rustc_hash::FxHashMap<Name, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) -> SymbolId {
        let name = symbol.name.clone();
        let id = match self.order.iter().position(|n| *n == name) {
            Some(index) => index,
            None => {
                self.order.push(name.clone());
                self.order.len() - 1
            }
        };
        self.by_name.insert(name, symbol);
        SymbolId(id as u32)
    }

    pub fn symbol_id_by_name(&self, name: &str) -> Option<SymbolId> {
        self.order.iter().position(|n| n == name).map(|i| SymbolId(i as u32))
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.by_name.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.by_name.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.order.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.order.iter().filter_map(|n| self.by_name.get(n))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub type SymbolTableRef = Rc<SymbolTable>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn declaration_kind_displays_snake_case() {
        assert_eq!(DeclarationKind::SpecialBuiltInClass.to_string(), "special_built_in_class");
        assert_eq!(DeclarationKind::Variable.to_string(), "variable");
    }

    #[test]
    fn declaration_kind_round_trips_through_parsing() {
        let kind = DeclarationKind::from_str("function").unwrap();
        assert_eq!(kind, DeclarationKind::Function);
        assert!(DeclarationKind::from_str("not_a_kind").is_err());
    }

    #[test]
    fn declaration_display_delegates_to_kind() {
        let decl = Declaration {
            node: NodeId(0),
            kind: DeclarationKind::Class,
            is_constant: false,
            type_annotation: None,
            inferred_type_source: None,
            alias: None,
        };
        assert_eq!(decl.to_string(), "class");
    }
}
