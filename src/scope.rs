//! Scopes and flow nodes, as produced by the external binder/scope-builder.
//!
//! The evaluator never constructs these; it only walks them. They are modeled here as plain,
//! read-only data rather than as an incremental, recomputed-on-edit structure, since recomputing
//! them on source edits is explicitly the binder's job (see DESIGN.md for why this core does not
//! use a Salsa-tracked semantic index for this layer).

use crate::ast::NodeId;
use crate::name::Name;
use crate::symbol::{SymbolId, SymbolTable};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    /// The node that introduces this scope (class/function/module/lambda/comprehension).
    pub node: NodeId,
    /// This scope's own bindings (spec §3). `Rc<RefCell<_>>` so a driver can finish populating a
    /// scope's symbols after attaching it (e.g. while still walking the scope's body).
    pub symbols: Rc<RefCell<SymbolTable>>,
}

/// A reference (`Name` load) as attached by the binder: which scope it's looked up from, and,
/// when it's a narrowing subject, the flow graph and position to resolve it against (spec §4.6,
/// §4.9). Stored per-`NodeId` on the evaluator rather than carried on `Expr` itself, since the
/// core's AST is binder-independent (spec §1).
#[derive(Debug, Clone)]
pub struct ReferenceBinding {
    pub scope: ScopeId,
    pub flow: Option<(FlowGraphRef, FlowNodeId)>,
}

/// A node in the binder's control-flow DAG, walked by the code-flow narrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowNodeId(pub u32);

#[derive(Debug, Clone)]
pub enum FlowNode {
    Start,
    Unreachable {
        antecedent: FlowNodeId,
    },
    Assignment {
        antecedent: FlowNodeId,
        target_symbol: SymbolId,
        /// The node whose evaluated type is read off when this assignment is the one
        /// narrowing a reference (the RHS of `x = <value>`, or the bound-to node of `with`/`for`).
        value_node: NodeId,
        /// A deliberate `del x` / loop-exit unbind rather than a real assignment.
        is_unbind: bool,
    },
    AssignmentAlias {
        antecedent: FlowNodeId,
        from_symbol: SymbolId,
        to_symbol: SymbolId,
    },
    Call {
        antecedent: FlowNodeId,
        callee_node: NodeId,
    },
    BranchLabel {
        antecedents: Vec<FlowNodeId>,
    },
    LoopLabel {
        antecedents: Vec<FlowNodeId>,
    },
    TrueCondition {
        antecedent: FlowNodeId,
        test_node: NodeId,
    },
    FalseCondition {
        antecedent: FlowNodeId,
        test_node: NodeId,
    },
    PreFinallyGate {
        antecedent: FlowNodeId,
        /// Whether the gate currently hides the `try` path (closed during `finally` analysis).
        closed: bool,
    },
    PostFinally {
        try_antecedent: FlowNodeId,
        finally_antecedent: FlowNodeId,
    },
    WildcardImport {
        antecedent: FlowNodeId,
        module: Name,
    },
}

/// A DAG of [`FlowNode`]s for one execution scope, plus the set of references that are actually
/// narrowing subjects in that scope: for any reference not in this set, flow narrowing is
/// skipped.
#[derive(Debug, Default)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    /// References (by the `NodeId` of the `Name`/`MemberAccess` expression) that appear as
    /// narrowing subjects somewhere in this scope.
    narrowing_subjects: rustc_hash::FxHashSet<NodeId>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: FlowNode) -> FlowNodeId {
        let id = FlowNodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: FlowNodeId) -> &FlowNode {
        &self.nodes[id.0 as usize]
    }

    pub fn mark_narrowing_subject(&mut self, reference: NodeId) {
        self.narrowing_subjects.insert(reference);
    }

    pub fn is_narrowing_subject(&self, reference: NodeId) -> bool {
        self.narrowing_subjects.contains(&reference)
    }
}

pub type FlowGraphRef = Rc<FlowGraph>;
