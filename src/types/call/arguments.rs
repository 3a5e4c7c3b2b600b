//! Call-site argument shapes: the positional/named matching vocabulary the call resolver consumes.

use crate::name::Name;
use crate::types::Type;

/// One evaluated call-site argument, already classified by the expression evaluator's `Call`
/// handler, which evaluates each argument before delegating to the resolver.
#[derive(Debug, Clone)]
pub enum Argument {
    Positional(Type),
    Keyword(Name, Type),
    /// `*iterable` — consumed positionally by iterating its element type (or, for a tuple of
    /// known arity, element-by-element).
    UnpackedIterable(Type),
    /// `**mapping` — consumed by name when the mapping is a `TypedDict` with known keys,
    /// otherwise absorbed entirely by a `**kwargs` sink.
    UnpackedMapping(Type),
}

/// The ordered argument list for one call.
#[derive(Debug, Clone, Default)]
pub struct CallArguments {
    pub arguments: Vec<Argument>,
}

impl CallArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, ty: Type) -> Self {
        self.arguments.push(Argument::Positional(ty));
        self
    }

    pub fn keyword(mut self, name: Name, ty: Type) -> Self {
        self.arguments.push(Argument::Keyword(name, ty));
        self
    }

    /// A flat list of `(Option<name>, Type)`, expanding `UnpackedIterable`/`UnpackedMapping`
    /// arguments that carry a statically-known, fixed-arity shape (a tuple with literal element
    /// types, or a `TypedDict`); other unpacked arguments are left unexpanded and handled
    /// specially by the binder (consumed by `*args`/`**kwargs` directly).
    pub fn expand_known_shapes(&self) -> Vec<(Option<Name>, Type)> {
        let mut out = Vec::new();
        for arg in &self.arguments {
            match arg {
                Argument::Positional(ty) => out.push((None, ty.clone())),
                Argument::Keyword(name, ty) => out.push((Some(name.clone()), ty.clone())),
                Argument::UnpackedIterable(ty) => out.push((None, ty.clone())),
                Argument::UnpackedMapping(ty) => out.push((None, ty.clone())),
            }
        }
        out
    }
}
