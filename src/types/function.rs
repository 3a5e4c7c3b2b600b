//! Function objects and their parameter signatures.

use super::generics::TypeVarDetails;
use super::Type;
use crate::ast::{NodeId, ParameterKind as AstParameterKind};
use crate::name::Name;
use bitflags::bitflags;
use std::rc::Rc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionFlags: u32 {
        const IS_ASYNC           = 1 << 0;
        const IS_GENERATOR       = 1 << 1;
        const IS_ABSTRACT_METHOD = 1 << 2;
        const IS_STATIC_METHOD   = 1 << 3;
        const IS_CLASS_METHOD    = 1 << 4;
        const IS_FINAL           = 1 << 5;
        const IS_OVERLOAD        = 1 << 6;
        const IS_PROPERTY        = 1 << 7;
        /// Declared in a stub (`.pyi`-equivalent) context with no explicit return annotation:
        /// defaults to `Unknown` rather than being inferred from a (nonexistent) body, except
        /// `__init__` which defaults to `None`.
        const IMPLICIT_STUB_RETURN = 1 << 8;
    }
}

/// A single parameter, already bucketed by the binder into one of the five kinds: the
/// positional-only/name-only/vararg/kwvararg segmentation reads off `kind` directly.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: Name,
    pub annotation: Type,
    pub has_default: bool,
    pub kind: AstParameterKind,
    /// Present only on the trailing `*args`/`**kwargs` pair that together stand for a
    /// `ParamSpec` (`*args: P.args, **kwargs: P.kwargs`), bound as a unit.
    pub param_spec: Option<Rc<TypeVarDetails>>,
}

impl Parameter {
    pub fn is_vararg(&self) -> bool {
        self.kind == AstParameterKind::Vararg
    }

    pub fn is_kwvararg(&self) -> bool {
        self.kind == AstParameterKind::KwVararg
    }

    pub fn is_positional(&self) -> bool {
        matches!(
            self.kind,
            AstParameterKind::PositionalOnly | AstParameterKind::PositionalOrKeyword
        )
    }

    pub fn is_keyword(&self) -> bool {
        matches!(self.kind, AstParameterKind::PositionalOrKeyword | AstParameterKind::KeywordOnly)
    }
}

/// The shared, immutable-after-finalization record for one function. Overload members of an
/// `OverloadedFunction` each carry their own `FunctionDetails`.
#[derive(Debug)]
pub struct FunctionDetails {
    pub name: Name,
    pub declaration: NodeId,
    pub doc: Option<Rc<str>>,
    pub parameters: Vec<Parameter>,
    pub declared_return: Option<Type>,
    pub flags: FunctionFlags,
    /// Name recognized as a compiler intrinsic (`isinstance`, `reveal_type`, ...), consulted by
    /// the call resolver and narrower before doing ordinary binding.
    pub built_in_name: Option<Name>,
    pub is_abstract_method: bool,
}

impl FunctionDetails {
    pub fn is_async(&self) -> bool {
        self.flags.contains(FunctionFlags::IS_ASYNC)
    }

    pub fn is_generator(&self) -> bool {
        self.flags.contains(FunctionFlags::IS_GENERATOR)
    }

    pub fn is_static_method(&self) -> bool {
        self.flags.contains(FunctionFlags::IS_STATIC_METHOD)
    }

    pub fn is_class_method(&self) -> bool {
        self.flags.contains(FunctionFlags::IS_CLASS_METHOD)
    }

    pub fn is_overload(&self) -> bool {
        self.flags.contains(FunctionFlags::IS_OVERLOAD)
    }

    pub fn is_property(&self) -> bool {
        self.flags.contains(FunctionFlags::IS_PROPERTY)
    }

    /// The effective return type before call-site specialization: the declared annotation if
    /// present, else `Unknown` for a stub-defaulted non-`__init__`, else `None` for `__init__`.
    pub fn effective_return(&self) -> Type {
        if let Some(declared) = &self.declared_return {
            return declared.clone();
        }
        if self.name.as_str() == "__init__" {
            Type::None
        } else {
            Type::Unknown
        }
    }
}

/// A function value: its shared `details`, plus the two things that vary per occurrence (spec
/// §3): a call-site-inferred return type (populated by the contextual return-type inference
/// stack, §4.8) and whether the first parameter has already been stripped (method binding, §4.2).
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub details: Rc<FunctionDetails>,
    pub inferred_return: Option<Box<Type>>,
    pub ignore_first_param: bool,
}

impl FunctionType {
    pub fn new(details: Rc<FunctionDetails>) -> Self {
        Self { details, inferred_return: None, ignore_first_param: false }
    }

    /// Parameters as seen by a caller: the first parameter is skipped when this is a bound
    /// method view.
    pub fn visible_parameters(&self) -> &[Parameter] {
        let params = &self.details.parameters;
        if self.ignore_first_param && !params.is_empty() {
            &params[1..]
        } else {
            params
        }
    }

    pub fn return_type(&self) -> Type {
        self.inferred_return
            .as_deref()
            .cloned()
            .unwrap_or_else(|| self.details.effective_return())
    }

    /// Bind this function to an owning class/instance: partially specialize the first
    /// parameter's type against `self_type` (filling any TypeVar it contains) and mark it to be
    /// stripped from the visible parameter list.
    pub fn bind_to(&self, self_type: &Type) -> FunctionType {
        if self.details.is_static_method() || self.details.parameters.is_empty() {
            return self.clone();
        }
        let mut map = super::generics::TypeVarMap::new();
        let first = &self.details.parameters[0];
        if let Type::TypeVar(tv) = &first.annotation {
            map.bind_unconditional(tv.clone(), self_type.clone());
        }
        let mut bound = self.clone();
        bound.ignore_first_param = true;
        if !map.is_empty() {
            if let Some(declared) = &self.details.declared_return {
                bound.inferred_return = Some(Box::new(super::generics::substitute(declared, &map)));
            }
        }
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, kind: AstParameterKind) -> Parameter {
        Parameter { name: Name::new(name), annotation: Type::Unknown, has_default: false, kind, param_spec: None }
    }

    #[test]
    fn visible_parameters_strips_first_when_bound() {
        let details = Rc::new(FunctionDetails {
            name: Name::new("f"),
            declaration: NodeId(0),
            doc: None,
            parameters: vec![
                param("self", AstParameterKind::PositionalOrKeyword),
                param("x", AstParameterKind::PositionalOrKeyword),
            ],
            declared_return: None,
            flags: FunctionFlags::empty(),
            built_in_name: None,
            is_abstract_method: false,
        });
        let method = FunctionType::new(details);
        let bound = method.bind_to(&Type::Unknown);
        assert_eq!(bound.visible_parameters().len(), 1);
        assert_eq!(bound.visible_parameters()[0].name.as_str(), "x");
    }
}
