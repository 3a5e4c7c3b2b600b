//! The code-flow narrower (spec §4.6), grounded in the teacher's `types/narrow.rs`.
//!
//! Two halves: the narrowing-callback catalogue (`NarrowingCallback::apply`, a pure `Type ->
//! Type` function built from a test expression) and the flow-graph walk (`walk_flow`) that
//! threads such callbacks through `TrueCondition`/`FalseCondition` nodes. The walk needs to
//! re-enter the expression evaluator to read off an `Assignment` node's right-hand-side type and
//! to ask whether a `Call` node's callee returns `NoReturn`; rather than depending on
//! `crate::evaluator` directly (which itself depends on this module), it takes a
//! `&dyn FlowTypeProvider` supplied by the caller.

use super::class::ClassRef;
use super::Type;
use crate::ast::NodeId;
use crate::scope::{FlowGraph, FlowNode, FlowNodeId};
use crate::symbol::SymbolId;
use std::rc::Rc;

/// A narrowing test, represented as a small enum of callback kinds (spec §9: "in a language
/// without closures, represent as a small enum of callback kinds with per-kind payload").
#[derive(Debug, Clone)]
pub enum NarrowingCallback {
    /// `X is None` / `X == None` (positive) or their negations.
    IsNone { positive: bool },
    /// `type(X) is C` / `type(X) is not C`: exact generic-class identity.
    TypeIs { class: ClassRef, positive: bool },
    /// `X == <literal>` / `X != <literal>`.
    LiteralEquals { literal: super::LiteralValue, positive: bool, enumerable_universe: Option<Vec<super::LiteralValue>> },
    /// `isinstance(X, C)` / `issubclass(X, C)`, `C` possibly a tuple of classes.
    IsInstance { classes: Vec<ClassRef>, positive: bool, is_subclass_check: bool },
    /// `callable(X)`.
    Callable { positive: bool },
    /// A bare truthy test (`if x:`).
    Truthy { positive: bool },
    And(Vec<NarrowingCallback>),
    Or(Vec<NarrowingCallback>),
}

impl NarrowingCallback {
    pub fn negate(&self) -> NarrowingCallback {
        match self {
            NarrowingCallback::IsNone { positive } => NarrowingCallback::IsNone { positive: !positive },
            NarrowingCallback::TypeIs { class, positive } => {
                NarrowingCallback::TypeIs { class: class.clone(), positive: !positive }
            }
            NarrowingCallback::LiteralEquals { literal, positive, enumerable_universe } => {
                NarrowingCallback::LiteralEquals {
                    literal: literal.clone(),
                    positive: !positive,
                    enumerable_universe: enumerable_universe.clone(),
                }
            }
            NarrowingCallback::IsInstance { classes, positive, is_subclass_check } => {
                NarrowingCallback::IsInstance {
                    classes: classes.clone(),
                    positive: !positive,
                    is_subclass_check: *is_subclass_check,
                }
            }
            NarrowingCallback::Callable { positive } => NarrowingCallback::Callable { positive: !positive },
            NarrowingCallback::Truthy { positive } => NarrowingCallback::Truthy { positive: !positive },
            // `not (A and B)` == `(not A) or (not B)`; composing at negation time keeps
            // `apply` itself simple (spec's ADDED `not` rule: "flips polarity and recurses").
            NarrowingCallback::And(parts) => NarrowingCallback::Or(parts.iter().map(Self::negate).collect()),
            NarrowingCallback::Or(parts) => NarrowingCallback::And(parts.iter().map(Self::negate).collect()),
        }
    }

    /// Refines `ty` along this narrowing test. Idempotent (spec §8): applying the same callback
    /// twice to its own output yields the same type.
    pub fn apply(&self, ty: &Type) -> Type {
        match self {
            NarrowingCallback::IsNone { positive } => {
                let subtypes = ty.subtypes();
                let filtered = subtypes.into_iter().filter(|t| t.is_none() == *positive);
                super::union_of(filtered)
            }
            NarrowingCallback::TypeIs { class, positive } => {
                let subtypes = ty.subtypes();
                let filtered = subtypes.into_iter().filter(|t| {
                    let matches = matches!(t.as_class_ref(), Some(c) if Rc::ptr_eq(&c.details, &class.details));
                    matches == *positive
                });
                super::union_of(filtered)
            }
            NarrowingCallback::LiteralEquals { literal, positive, enumerable_universe } => {
                let subtypes = ty.subtypes();
                if *positive {
                    super::union_of(subtypes.into_iter().filter(|t| t.literal() == Some(literal)))
                } else if let Some(universe) = enumerable_universe {
                    // All inhabitants are enumerable (bool, Enum): drop the matching literal,
                    // keep the rest (spec §4.6).
                    super::union_of(subtypes.into_iter().filter(|t| {
                        t.literal().map(|l| l != literal).unwrap_or(true) || !universe.contains(literal)
                    }))
                } else {
                    ty.clone()
                }
            }
            NarrowingCallback::IsInstance { classes, positive, .. } => {
                let subtypes = ty.subtypes();
                super::union_of(subtypes.into_iter().filter(|t| {
                    match is_instance_relationship(t, classes) {
                        Some(related) => related == *positive,
                        // Indeterminate relationship disables narrowing for this subtype
                        // (spec §4.6): keep it regardless of polarity.
                        None => true,
                    }
                }))
            }
            NarrowingCallback::Callable { positive } => {
                let subtypes = ty.subtypes();
                super::union_of(subtypes.into_iter().filter(|t| is_callable_ish(t) == *positive))
            }
            NarrowingCallback::Truthy { positive } => {
                let subtypes = ty.subtypes();
                super::union_of(subtypes.into_iter().filter(|t| {
                    if *positive {
                        can_be_truthy(t)
                    } else {
                        can_be_falsy(t)
                    }
                }))
            }
            NarrowingCallback::And(parts) => {
                parts.iter().fold(ty.clone(), |acc, part| part.apply(&acc))
            }
            NarrowingCallback::Or(parts) => {
                let results: Vec<_> = parts.iter().map(|part| part.apply(ty)).collect();
                super::union_of(results)
            }
        }
    }
}

fn is_instance_relationship(ty: &Type, classes: &[ClassRef]) -> Option<bool> {
    let subject = ty.as_class_ref()?;
    for candidate in classes {
        if let Ok(mro) = subject.details.mro() {
            if mro.classes().iter().any(|c| Rc::ptr_eq(&c.details, &candidate.details)) {
                return Some(true);
            }
        }
    }
    if ty.is_any_or_unknown() {
        None
    } else {
        Some(false)
    }
}

fn is_callable_ish(ty: &Type) -> bool {
    match ty {
        Type::Function(_) | Type::OverloadedFunction(_) | Type::Class(..) => true,
        Type::Object(class, _) => class.member("__call__").is_some(),
        _ => false,
    }
}

fn can_be_truthy(ty: &Type) -> bool {
    match ty.literal() {
        Some(super::LiteralValue::Bool(b)) => *b,
        Some(super::LiteralValue::Int(i)) => *i != 0,
        Some(super::LiteralValue::Str(s)) => !s.is_empty(),
        Some(super::LiteralValue::Bytes(b)) => !b.is_empty(),
        _ => !matches!(ty, Type::None | Type::Never),
    }
}

fn can_be_falsy(ty: &Type) -> bool {
    match ty.literal() {
        Some(super::LiteralValue::Bool(b)) => !*b,
        Some(super::LiteralValue::Int(i)) => *i == 0,
        Some(super::LiteralValue::Str(s)) => s.is_empty(),
        Some(super::LiteralValue::Bytes(b)) => b.is_empty(),
        _ => matches!(ty, Type::None),
    }
}

/// What the flow walker needs from the expression evaluator without depending on it directly.
pub trait FlowTypeProvider {
    /// The type of the expression at `value_node` (an `Assignment` flow node's RHS, or a
    /// `for`/`with` binder target), as the evaluator would compute via §4.1.
    fn type_of_value_node(&self, value_node: NodeId) -> Type;
    /// Whether the callee at `callee_node` has a declared return type of `NoReturn` (spec §4.6's
    /// `Call` rule).
    fn callee_is_noreturn(&self, callee_node: NodeId) -> bool;
    /// The narrowing callback that `test_node` places on `reference`, if any.
    fn narrowing_callback_for(&self, test_node: NodeId, reference: SymbolId) -> Option<NarrowingCallback>;
    /// The type of a wildcard-imported name, if `name` was actually exported by `module`.
    fn wildcard_import_type(&self, module: &crate::name::Name, name: SymbolId) -> Option<Type>;
}

/// A result still being computed in a `LoopLabel` fixed point (spec §4.6, §4.8's incomplete-type
/// tracker): the walker returns this partial value to its recursive caller to avoid
/// non-termination rather than looping forever.
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub ty: Type,
    pub is_incomplete: bool,
}

impl FlowResult {
    fn complete(ty: Type) -> Self {
        Self { ty, is_incomplete: false }
    }
}

/// Maximum fixed-point iterations for a `LoopLabel` before the last computed value is accepted
/// as converged; guards against pathological flow graphs rather than modeling true non-termination.
const LOOP_FIXED_POINT_LIMIT: u32 = 4;

/// Walks `graph` from `start` back to `Start`, applying the flow-node rules of spec §4.6.
/// `reference` is the symbol whose type is being resolved; `type_at_start` seeds the `Start` node.
pub fn walk_flow(
    graph: &FlowGraph,
    start: FlowNodeId,
    reference: SymbolId,
    type_at_start: &Type,
    provider: &dyn FlowTypeProvider,
    in_progress: &mut Vec<FlowNodeId>,
) -> FlowResult {
    if in_progress.contains(&start) {
        // Recursive re-entry into a loop label already being computed: return `Unknown` as the
        // partial value (spec §4.6: "the partial result is returned to avoid non-termination").
        return FlowResult { ty: Type::Unknown, is_incomplete: true };
    }

    match graph.get(start) {
        FlowNode::Start => FlowResult::complete(type_at_start.clone()),

        FlowNode::Unreachable { .. } => FlowResult::complete(Type::Never),

        FlowNode::Call { antecedent, callee_node } => {
            if provider.callee_is_noreturn(*callee_node) {
                FlowResult::complete(Type::Never)
            } else {
                walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress)
            }
        }

        FlowNode::Assignment { antecedent, target_symbol, value_node, is_unbind } => {
            if *target_symbol == reference {
                if *is_unbind {
                    FlowResult::complete(Type::Unbound)
                } else {
                    FlowResult::complete(provider.type_of_value_node(*value_node))
                }
            } else {
                walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress)
            }
        }

        FlowNode::AssignmentAlias { antecedent, from_symbol, to_symbol } => {
            let next_reference = if reference == *to_symbol { *from_symbol } else { reference };
            walk_flow(graph, *antecedent, next_reference, type_at_start, provider, in_progress)
        }

        FlowNode::BranchLabel { antecedents } => {
            let mut results = Vec::with_capacity(antecedents.len());
            let mut incomplete = false;
            for antecedent in antecedents {
                let result = walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress);
                incomplete |= result.is_incomplete;
                results.push(result.ty);
            }
            FlowResult { ty: super::union_of(results), is_incomplete: incomplete }
        }

        FlowNode::LoopLabel { antecedents } => {
            in_progress.push(start);
            let mut combined = Type::Unknown;
            let mut first_complete = true;
            for _ in 0..LOOP_FIXED_POINT_LIMIT {
                let mut results = Vec::with_capacity(antecedents.len());
                let mut any_incomplete = false;
                for (i, antecedent) in antecedents.iter().enumerate() {
                    let result = walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress);
                    if i == 0 {
                        first_complete = !result.is_incomplete;
                    }
                    any_incomplete |= result.is_incomplete;
                    results.push(result.ty);
                }
                combined = super::union_of(results);
                if !any_incomplete {
                    in_progress.pop();
                    return FlowResult::complete(combined);
                }
            }
            in_progress.pop();
            FlowResult { ty: combined, is_incomplete: !first_complete }
        }

        FlowNode::TrueCondition { antecedent, test_node } | FlowNode::FalseCondition { antecedent, test_node } => {
            let positive = matches!(graph.get(start), FlowNode::TrueCondition { .. });
            let base = walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress);
            let narrowed = match provider.narrowing_callback_for(*test_node, reference) {
                Some(callback) => {
                    let callback = if positive { callback } else { callback.negate() };
                    callback.apply(&base.ty)
                }
                None => base.ty,
            };
            FlowResult { ty: narrowed, is_incomplete: base.is_incomplete }
        }

        FlowNode::PreFinallyGate { antecedent, closed } => {
            if *closed {
                FlowResult::complete(Type::Never)
            } else {
                walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress)
            }
        }

        FlowNode::PostFinally { try_antecedent, finally_antecedent } => {
            // The `finally` route alone determines post-finally resolution (spec §4.6).
            let _ = try_antecedent;
            walk_flow(graph, *finally_antecedent, reference, type_at_start, provider, in_progress)
        }

        FlowNode::WildcardImport { antecedent, module } => {
            match provider.wildcard_import_type(module, reference) {
                Some(ty) => FlowResult::complete(ty),
                None => walk_flow(graph, *antecedent, reference, type_at_start, provider, in_progress),
            }
        }
    }
}

/// Spec §6's `isNodeReachable`: whether control flow can reach `node` at all, walking backward
/// through the same flow-node rules `walk_flow` uses for a reference's type, but answering a
/// plain reachability question instead of computing a narrowed type. `Unreachable` and a `Call` to
/// a `NoReturn` callee are the only nodes that block a path; everything else just defers to its
/// antecedent(s).
pub fn is_node_reachable(graph: &FlowGraph, node: FlowNodeId, provider: &dyn FlowTypeProvider) -> bool {
    match graph.get(node) {
        FlowNode::Start => true,
        FlowNode::Unreachable { .. } => false,
        FlowNode::Call { antecedent, callee_node } => {
            if provider.callee_is_noreturn(*callee_node) {
                false
            } else {
                is_node_reachable(graph, *antecedent, provider)
            }
        }
        FlowNode::Assignment { antecedent, .. }
        | FlowNode::AssignmentAlias { antecedent, .. }
        | FlowNode::TrueCondition { antecedent, .. }
        | FlowNode::FalseCondition { antecedent, .. }
        | FlowNode::WildcardImport { antecedent, .. } => is_node_reachable(graph, *antecedent, provider),
        FlowNode::PreFinallyGate { antecedent, closed } => {
            !*closed && is_node_reachable(graph, *antecedent, provider)
        }
        FlowNode::PostFinally { finally_antecedent, .. } => is_node_reachable(graph, *finally_antecedent, provider),
        FlowNode::BranchLabel { antecedents } | FlowNode::LoopLabel { antecedents } => {
            antecedents.iter().any(|a| is_node_reachable(graph, *a, provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;
    impl FlowTypeProvider for StubProvider {
        fn type_of_value_node(&self, _value_node: NodeId) -> Type {
            Type::Unknown
        }
        fn callee_is_noreturn(&self, _callee_node: NodeId) -> bool {
            false
        }
        fn narrowing_callback_for(&self, _test_node: NodeId, _reference: SymbolId) -> Option<NarrowingCallback> {
            None
        }
        fn wildcard_import_type(&self, _module: &crate::name::Name, _name: SymbolId) -> Option<Type> {
            None
        }
    }

    #[test]
    fn unreachable_node_is_not_reachable() {
        let mut graph = FlowGraph::new();
        let start = graph.push(FlowNode::Start);
        let unreachable = graph.push(FlowNode::Unreachable { antecedent: start });
        assert!(is_node_reachable(&graph, start, &StubProvider));
        assert!(!is_node_reachable(&graph, unreachable, &StubProvider));
    }

    #[test]
    fn branch_label_reachable_if_any_antecedent_is() {
        let mut graph = FlowGraph::new();
        let start = graph.push(FlowNode::Start);
        let dead = graph.push(FlowNode::Unreachable { antecedent: start });
        let label = graph.push(FlowNode::BranchLabel { antecedents: vec![dead, start] });
        assert!(is_node_reachable(&graph, label, &StubProvider));
    }

    #[test]
    fn is_none_narrows_union() {
        let ty = super::super::union_of([Type::None, Type::Unknown]);
        let positive = NarrowingCallback::IsNone { positive: true }.apply(&ty);
        assert!(positive.is_none());
        let negative = NarrowingCallback::IsNone { positive: false }.apply(&ty);
        assert!(matches!(negative, Type::Unknown));
    }

    #[test]
    fn narrowing_is_idempotent() {
        let ty = super::super::union_of([Type::None, Type::Unknown]);
        let callback = NarrowingCallback::IsNone { positive: false };
        let once = callback.apply(&ty);
        let twice = callback.apply(&once);
        assert!(once.same_type(&twice));
    }

    #[test]
    fn negate_flips_polarity() {
        let callback = NarrowingCallback::IsNone { positive: true };
        let negated = callback.negate();
        assert!(matches!(negated, NarrowingCallback::IsNone { positive: false }));
    }
}
