//! C3 linearization (spec §4.2, §9, invariant 2), grounded in the teacher's `types/mro.rs`.

use super::class::{ClassDetails, ClassRef};
use super::Type;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MroError {
    /// One or more base-class expressions did not evaluate to a class (or `Any`/`Unknown`).
    InvalidBases(Vec<(usize, String)>),
    /// The base classes' linearizations cannot be merged consistently.
    UnresolvableMro,
}

#[derive(Debug, Clone)]
pub enum ClassBase {
    Any,
    Unknown,
    Class(ClassRef),
}

impl ClassBase {
    fn from_type(ty: &Type) -> Option<ClassBase> {
        match ty {
            Type::Any { .. } => Some(ClassBase::Any),
            Type::Unknown => Some(ClassBase::Unknown),
            Type::Class(class, _) => Some(ClassBase::Class(class.clone())),
            _ => None,
        }
    }

    fn same_class(&self, other: &ClassBase) -> bool {
        match (self, other) {
            (ClassBase::Any, ClassBase::Any) | (ClassBase::Unknown, ClassBase::Unknown) => true,
            (ClassBase::Class(a), ClassBase::Class(b)) => Rc::ptr_eq(&a.details, &b.details),
            _ => false,
        }
    }
}

/// One class's fully-linearized ancestor list, self included, most-derived first.
#[derive(Debug, Clone)]
pub struct Mro(Vec<ClassBase>);

impl Mro {
    /// The `Class(...)` entries only, in MRO order (dynamic `Any`/`Unknown` bases dropped). This
    /// is what member lookup and abstractness-checking walk.
    pub fn classes(&self) -> Vec<ClassRef> {
        self.0
            .iter()
            .filter_map(|base| match base {
                ClassBase::Class(class) => Some(class.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn bases(&self) -> &[ClassBase] {
        &self.0
    }

    /// The degraded MRO used when linearization fails: `[self, Unknown]` (spec §9: "reduce the
    /// possibility of cascading errors elsewhere").
    fn from_error(class: &Rc<ClassDetails>) -> Self {
        Self(vec![ClassBase::Class(ClassRef::unspecialized(class.clone())), ClassBase::Unknown])
    }
}

/// Computes the MRO of `class` from its already-evaluated `bases` (spec §4.2's class-build
/// sequence calls this once, right after evaluating each base-class expression).
pub fn compute_mro(class: &Rc<ClassDetails>) -> Result<Mro, MroError> {
    if class.bases.is_empty() {
        return Ok(Mro(vec![ClassBase::Class(ClassRef::unspecialized(class.clone()))]));
    }

    let mut invalid = Vec::new();
    let mut bases = Vec::new();
    for (i, base_ty) in class.bases.iter().enumerate() {
        match ClassBase::from_type(base_ty) {
            Some(base) => bases.push(base),
            None => invalid.push((i, format!("{base_ty:?}"))),
        }
    }
    if !invalid.is_empty() {
        return Err(MroError::InvalidBases(invalid));
    }

    if let [single] = bases.as_slice() {
        let mut linearized = vec![ClassBase::Class(ClassRef::unspecialized(class.clone()))];
        linearized.extend(mro_of_base(single));
        return Ok(Mro(linearized));
    }

    let mut sequences: Vec<VecDeque<ClassBase>> =
        vec![VecDeque::from([ClassBase::Class(ClassRef::unspecialized(class.clone()))])];
    for base in &bases {
        sequences.push(mro_of_base(base).into());
    }
    sequences.push(bases.iter().cloned().collect());

    match c3_merge(sequences) {
        Some(merged) => Ok(Mro(merged)),
        None => Err(MroError::UnresolvableMro),
    }
}

fn mro_of_base(base: &ClassBase) -> Vec<ClassBase> {
    match base {
        ClassBase::Any => vec![ClassBase::Any],
        ClassBase::Unknown => vec![ClassBase::Unknown],
        ClassBase::Class(class) => match class.details.mro() {
            Ok(mro) => mro.0,
            Err(_) => Mro::from_error(&class.details).0,
        },
    }
}

/// The C3-merge algorithm (spec §9): repeatedly take the first head that doesn't appear in the
/// tail of any other sequence.
fn c3_merge(mut sequences: Vec<VecDeque<ClassBase>>) -> Option<Vec<ClassBase>> {
    let mut mro = Vec::with_capacity(8);
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Some(mro);
        }

        let candidate = sequences.iter().find_map(|seq| {
            let head = &seq[0];
            let is_in_some_tail = sequences
                .iter()
                .any(|other| other.iter().skip(1).any(|base| base.same_class(head)));
            (!is_in_some_tail).then(|| head.clone())
        })?;

        for seq in &mut sequences {
            if seq[0].same_class(&candidate) {
                seq.pop_front();
            }
        }
        mro.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;
    use crate::name::Name;
    use crate::symbol::SymbolTable;
    use crate::types::class::ClassFlags;

    fn class(name: &str, bases: Vec<Type>) -> Rc<ClassDetails> {
        ClassDetails::new(Name::new(name), NodeId(0), bases, ClassFlags::empty(), SymbolTable::new())
    }

    #[test]
    fn single_inheritance_mro_is_linear() {
        let object = class("object", vec![]);
        let base = class("Base", vec![Type::Class(ClassRef::unspecialized(object.clone()), None)]);
        let derived =
            class("Derived", vec![Type::Class(ClassRef::unspecialized(base.clone()), None)]);
        let mro = derived.mro().unwrap();
        let names: Vec<_> = mro.classes().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["Derived", "Base", "object"]);
    }

    #[test]
    fn diamond_inheritance_resolves_with_c3() {
        let object = class("object", vec![]);
        let obj_ty = Type::Class(ClassRef::unspecialized(object.clone()), None);
        let a = class("A", vec![obj_ty.clone()]);
        let b = class("B", vec![Type::Class(ClassRef::unspecialized(a.clone()), None)]);
        let c = class("C", vec![Type::Class(ClassRef::unspecialized(a.clone()), None)]);
        let d = class(
            "D",
            vec![
                Type::Class(ClassRef::unspecialized(b.clone()), None),
                Type::Class(ClassRef::unspecialized(c.clone()), None),
            ],
        );
        let mro = d.mro().unwrap();
        let names: Vec<_> = mro.classes().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["D", "B", "C", "A", "object"]);
    }

    #[test]
    fn inconsistent_bases_fail_to_linearize() {
        let object = class("object", vec![]);
        let obj_ty = Type::Class(ClassRef::unspecialized(object.clone()), None);
        let a = class("A", vec![obj_ty.clone()]);
        let b = class("B", vec![obj_ty.clone()]);
        // X(A, B), Y(B, A): merging X then Y bases directly triggers an inconsistent order.
        let x = class(
            "X",
            vec![
                Type::Class(ClassRef::unspecialized(a.clone()), None),
                Type::Class(ClassRef::unspecialized(b.clone()), None),
            ],
        );
        let y = class(
            "Y",
            vec![
                Type::Class(ClassRef::unspecialized(b.clone()), None),
                Type::Class(ClassRef::unspecialized(a.clone()), None),
            ],
        );
        let z = class(
            "Z",
            vec![
                Type::Class(ClassRef::unspecialized(x.clone()), None),
                Type::Class(ClassRef::unspecialized(y.clone()), None),
            ],
        );
        assert!(matches!(z.mro(), Err(MroError::UnresolvableMro)));
    }

    #[test_case::test_case(1; "one ancestor")]
    #[test_case::test_case(2; "two ancestors")]
    #[test_case::test_case(4; "four ancestors")]
    fn linear_chain_mro_has_depth_plus_self(depth: usize) {
        let mut chain = class("object", vec![]);
        for i in 0..depth {
            chain = class(&format!("C{i}"), vec![Type::Class(ClassRef::unspecialized(chain), None)]);
        }
        assert_eq!(chain.mro().unwrap().classes().len(), depth + 1);
    }
}
