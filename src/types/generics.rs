//! The TypeVar constraint solver.

use super::assignability::{can_assign, AssignFlags};
use super::class::ClassRef;
use super::function::FunctionType;
use super::Type;
use crate::ast::NodeId;
use crate::diagnostic::{rules, DiagnosticSink};
use crate::name::Name;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

/// A named placeholder type variable. Compares by identity of `(name, scope)`, realized here as
/// `Rc` pointer identity of the `TypeVarDetails` itself — the binder/class-builder never
/// constructs two `Rc<TypeVarDetails>` for the same declared TypeVar.
#[derive(Debug)]
pub struct TypeVarDetails {
    pub name: Name,
    /// The node (function/class type-parameter list, or synthesized site) that scopes this var,
    /// kept only for debugging/printing — identity is by `Rc` pointer, not by this field.
    pub scope: NodeId,
    pub constraints: Vec<Type>,
    pub bound: Option<Type>,
    pub variance: Variance,
    pub is_synthesized: bool,
    pub is_param_spec: bool,
}

impl TypeVarDetails {
    pub fn unconstrained(name: Name, scope: NodeId) -> Rc<Self> {
        Rc::new(Self {
            name,
            scope,
            constraints: Vec::new(),
            bound: None,
            variance: Variance::Invariant,
            is_synthesized: false,
            is_param_spec: false,
        })
    }

    pub fn synthesized_self(name: Name, scope: NodeId, bound: Type) -> Rc<Self> {
        Rc::new(Self {
            name,
            scope,
            constraints: Vec::new(),
            bound: Some(bound),
            variance: Variance::Invariant,
            is_synthesized: true,
            is_param_spec: false,
        })
    }
}

fn key(tv: &Rc<TypeVarDetails>) -> usize {
    Rc::as_ptr(tv) as usize
}

/// A captured parameter-specification value: either a concrete signature or a partial capture
/// mid-solve. Two non-identical captured signatures fail to unify — `ParamSpec` assignment is
/// equality-only, not variant.
#[derive(Debug, Clone)]
pub enum ParamSpecValue {
    Signature(Rc<[super::function::Parameter]>),
    Captured(Rc<[Type]>),
}

#[derive(Debug, Clone)]
struct MapEntry {
    ty: Type,
    is_narrowable: bool,
}

/// `{var_name -> (type, is_narrowable)}` plus the separate `ParamSpec` slot.
#[derive(Debug, Clone, Default)]
pub struct TypeVarMap {
    entries: HashMap<usize, MapEntry>,
    param_specs: HashMap<usize, ParamSpecValue>,
    locked: bool,
}

impl TypeVarMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.param_specs.is_empty()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn get(&self, tv: &Rc<TypeVarDetails>) -> Option<&Type> {
        self.entries.get(&key(tv)).map(|e| &e.ty)
    }

    pub fn get_param_spec(&self, tv: &Rc<TypeVarDetails>) -> Option<&ParamSpecValue> {
        self.param_specs.get(&key(tv))
    }

    /// Writes `ty` for `tv` unconditionally, bypassing the narrow/widen rule. Used by method
    /// binding and specialization construction, where the caller already knows the exact value
    /// rather than accumulating it from several call arguments.
    pub fn bind_unconditional(&mut self, tv: Rc<TypeVarDetails>, ty: Type) {
        if self.locked {
            return;
        }
        self.entries.insert(key(&tv), MapEntry { ty, is_narrowable: true });
    }

    pub fn bind_param_spec(&mut self, tv: Rc<TypeVarDetails>, value: ParamSpecValue) {
        if self.locked {
            return;
        }
        self.param_specs.insert(key(&tv), value);
    }
}

/// Whether we're matching a destination parameter position (narrowing / contravariant) or a
/// return-type-like position (widening / covariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    Narrowing,
    Widening,
}

/// The assignment rule: given `dst = TypeVar`, the current mapping, and an incoming `src`, update
/// `map` (unless locked) and report whether the assignment is compatible.
pub fn assign_to_type_var(
    tv: &Rc<TypeVarDetails>,
    src: &Type,
    map: &mut TypeVarMap,
    mode: SolveMode,
    diag: &DiagnosticSink,
) -> bool {
    if !tv.constraints.is_empty() {
        let chosen = tv
            .constraints
            .iter()
            .find(|constraint| can_assign(constraint, src, diag, None, AssignFlags::empty()));
        let Some(chosen) = chosen else {
            diag.error(
                rules::INVALID_TYPE_VARIABLE_CONSTRAINTS,
                Default::default(),
                format!("{src:?} does not satisfy any constraint of {}", tv.name),
            );
            return false;
        };
        if let Some(existing) = map.get(tv) {
            if !existing.same_type(chosen) {
                diag.error(
                    rules::INVALID_TYPE_VARIABLE_CONSTRAINTS,
                    Default::default(),
                    format!("{} was already solved to a different constraint", tv.name),
                );
                return false;
            }
            return true;
        }
        if !map.locked {
            map.bind_unconditional(tv.clone(), chosen.clone());
        }
        return true;
    }

    let compatible = match map.entries.get(&key(tv)).cloned() {
        None => true,
        Some(cur) => match mode {
            SolveMode::Narrowing => {
                if cur.is_narrowable && can_assign(&cur.ty, src, diag, None, AssignFlags::empty())
                {
                    if cur.ty.is_unknown() && !map.locked {
                        map.entries.insert(
                            key(tv),
                            MapEntry { ty: src.clone(), is_narrowable: true },
                        );
                    }
                    true
                } else if can_assign(src, &cur.ty, diag, None, AssignFlags::empty()) {
                    if !cur.is_narrowable && !map.locked {
                        map.entries.insert(
                            key(tv),
                            MapEntry { ty: src.clone(), is_narrowable: false },
                        );
                    }
                    true
                } else if !map.locked {
                    let widened = super::union_of([cur.ty.clone(), src.clone()]);
                    map.entries.insert(key(tv), MapEntry { ty: widened, is_narrowable: false });
                    true
                } else {
                    false
                }
            }
            SolveMode::Widening => {
                if can_assign(&cur.ty, src, diag, None, AssignFlags::empty()) {
                    if cur.ty.is_unknown() && !map.locked {
                        map.entries.insert(
                            key(tv),
                            MapEntry { ty: src.clone(), is_narrowable: false },
                        );
                    }
                    true
                } else if can_assign(src, &cur.ty, diag, None, AssignFlags::empty()) {
                    if !map.locked {
                        map.entries.insert(
                            key(tv),
                            MapEntry { ty: src.clone(), is_narrowable: false },
                        );
                    }
                    true
                } else {
                    if !map.locked {
                        let widened = super::union_of([cur.ty.clone(), src.clone()]);
                        map.entries.insert(key(tv), MapEntry { ty: widened, is_narrowable: false });
                    }
                    true
                }
            }
        },
    };

    if !compatible {
        return false;
    }

    if map.get(tv).is_none() && !map.locked {
        map.bind_unconditional(tv.clone(), src.clone());
    }

    if let Some(bound) = &tv.bound {
        if let Some(resolved) = map.get(tv) {
            if !can_assign(bound, resolved, diag, None, AssignFlags::empty()) {
                return false;
            }
        }
    }

    true
}

/// Whole-tree substitution of every `TypeVar` appearing in `ty` per `map`: replacing a `TypeVar`
/// everywhere is performed via this one helper. TypeVars with no entry in `map` are left as-is
/// (relevant for partially-solved speculative passes during overload resolution).
pub fn substitute(ty: &Type, map: &TypeVarMap) -> Type {
    match ty {
        Type::TypeVar(tv) => map.get(tv).cloned().unwrap_or_else(|| ty.clone()),
        Type::Union(members) => {
            super::union_of(members.iter().map(|m| substitute(m, map)))
        }
        Type::Class(class, lit) => Type::Class(substitute_class_ref(class, map), lit.clone()),
        Type::Object(class, lit) => Type::Object(substitute_class_ref(class, map), lit.clone()),
        Type::Function(f) => Type::Function(substitute_function(f, map)),
        Type::OverloadedFunction(overloads) => Type::OverloadedFunction(
            overloads.iter().map(|f| substitute_function(f, map)).collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_class_ref(class: &ClassRef, map: &TypeVarMap) -> ClassRef {
    match &class.type_args {
        None => class.clone(),
        Some(args) => ClassRef {
            details: class.details.clone(),
            type_args: Some(args.iter().map(|a| substitute(a, map)).collect()),
        },
    }
}

fn substitute_function(f: &FunctionType, map: &TypeVarMap) -> FunctionType {
    let details = Rc::new(super::function::FunctionDetails {
        name: f.details.name.clone(),
        declaration: f.details.declaration,
        doc: f.details.doc.clone(),
        parameters: f
            .details
            .parameters
            .iter()
            .map(|p| super::function::Parameter {
                name: p.name.clone(),
                annotation: substitute(&p.annotation, map),
                has_default: p.has_default,
                kind: p.kind,
                param_spec: p.param_spec.clone(),
            })
            .collect(),
        declared_return: f.details.declared_return.as_ref().map(|r| substitute(r, map)),
        flags: f.details.flags,
        built_in_name: f.details.built_in_name.clone(),
        is_abstract_method: f.details.is_abstract_method,
    });
    FunctionType {
        details,
        inferred_return: f.inferred_return.as_ref().map(|r| Box::new(substitute(r, map))),
        ignore_first_param: f.ignore_first_param,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticSink;

    #[test]
    fn unconstrained_widening_unions_incompatible_args() {
        let tv = TypeVarDetails::unconstrained(Name::new("T"), NodeId(0));
        let mut map = TypeVarMap::new();
        let diag = DiagnosticSink::new();
        assert!(assign_to_type_var(&tv, &Type::None, &mut map, SolveMode::Widening, &diag));
        assert!(assign_to_type_var(&tv, &Type::Never, &mut map, SolveMode::Widening, &diag));
        // Never is assignable to anything, so the map should still just hold `None`.
        assert!(map.get(&tv).unwrap().same_type(&Type::None));
    }

    #[test]
    fn constrained_type_var_picks_first_matching_constraint() {
        let tv = Rc::new(TypeVarDetails {
            name: Name::new("T"),
            scope: NodeId(0),
            constraints: vec![Type::None, Type::Never],
            bound: None,
            variance: Variance::Invariant,
            is_synthesized: false,
            is_param_spec: false,
        });
        let mut map = TypeVarMap::new();
        let diag = DiagnosticSink::new();
        assert!(assign_to_type_var(&tv, &Type::None, &mut map, SolveMode::Widening, &diag));
        assert!(map.get(&tv).unwrap().same_type(&Type::None));
    }

    #[test]
    fn constrained_type_var_rejects_src_matching_no_constraint() {
        let tv = Rc::new(TypeVarDetails {
            name: Name::new("T"),
            scope: NodeId(0),
            constraints: vec![Type::None, Type::Never],
            bound: None,
            variance: Variance::Invariant,
            is_synthesized: false,
            is_param_spec: false,
        });
        let widget = crate::types::class::ClassDetails::new(
            Name::new("Widget"),
            NodeId(99),
            vec![],
            crate::types::class::ClassFlags::empty(),
            crate::symbol::SymbolTable::new(),
        );
        let widget_instance = Type::Object(ClassRef::unspecialized(widget), None);
        let mut map = TypeVarMap::new();
        let diag = DiagnosticSink::new();
        assert!(!assign_to_type_var(&tv, &widget_instance, &mut map, SolveMode::Widening, &diag));
        assert_eq!(diag.iter().len(), 1);
        assert_eq!(diag.iter()[0].rule, rules::INVALID_TYPE_VARIABLE_CONSTRAINTS);
    }

    #[test]
    fn substitute_replaces_type_var_inside_union() {
        let tv = TypeVarDetails::unconstrained(Name::new("T"), NodeId(0));
        let mut map = TypeVarMap::new();
        map.bind_unconditional(tv.clone(), Type::None);
        let ty = super::super::union_of([Type::TypeVar(tv), Type::Unknown]);
        let substituted = substitute(&ty, &map);
        match substituted {
            Type::Union(members) => assert!(members.iter().any(|m| m.is_none())),
            other => panic!("expected union, got {other:?}"),
        }
    }
}
